//! Listing output for LIST and MLSD

use chrono::{DateTime, Duration, Local, Utc};

use crate::server::storage::DirItem;

/// Entries older than this show a year instead of a time, like `ls -l`.
const RECENT_DAYS: i64 = 180;

/// One `ls -l` style line: permissions, links, owner, group, size, date
/// (three tokens) and the name.
pub fn format_long_line(item: &DirItem, now: DateTime<Local>) -> String {
    let mode = if item.is_dir { "drwxr-xr-x" } else { "-rw-r--r--" };
    let modified: DateTime<Local> = item.modified.into();
    let date = if now.signed_duration_since(modified) > Duration::days(RECENT_DAYS) {
        modified.format("%b %d  %Y")
    } else {
        modified.format("%b %d %H:%M")
    };
    format!(
        "{} {:>3} {:<8} {:<8} {:>8} {} {}",
        mode, 1, "owner", "group", item.size, date, item.name
    )
}

/// One MLSD fact line, e.g. `type=file;size=5;modify=20240101120000; a.txt`.
pub fn format_mlsd_line(item: &DirItem) -> String {
    let kind = if item.is_dir { "dir" } else { "file" };
    let modified: DateTime<Utc> = item.modified.into();
    format!(
        "type={};size={};modify={}; {}",
        kind,
        item.size,
        modified.format("%Y%m%d%H%M%S"),
        item.name
    )
}

/// Render a whole listing, CRLF terminated.
pub fn render(items: &[DirItem], structured: bool) -> String {
    let now = Local::now();
    items
        .iter()
        .map(|item| {
            let line = if structured {
                format_mlsd_line(item)
            } else {
                format_long_line(item, now)
            };
            line + "\r\n"
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use crate::listing::{EntryKind, parse_long_format, parse_structured_lines};

    fn item(name: &str, is_dir: bool, size: u64) -> DirItem {
        DirItem {
            name: name.into(),
            is_dir,
            size,
            modified: SystemTime::now(),
        }
    }

    #[test]
    fn test_long_line_parses_back() {
        let items = [item("my report.txt", false, 1234), item("sub", true, 0)];
        let text = render(&items, false);
        let entries = parse_long_format(text.lines());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "my report.txt");
        assert_eq!(entries[0].size, 1234);
        assert_eq!(entries[1].kind, EntryKind::Directory);
    }

    #[test]
    fn test_old_entries_show_year() {
        let mut old = item("old.txt", false, 1);
        old.modified = SystemTime::UNIX_EPOCH;
        let line = format_long_line(&old, Local::now());
        assert!(line.contains("1970") || line.contains("1969"));
        assert_eq!(line.split_whitespace().count(), 9);
    }

    #[test]
    fn test_mlsd_line_parses_back() {
        let text = render(&[item("a b", false, 5), item("d", true, 0)], true);
        assert!(text.starts_with("type=file;size=5;modify="));
        let entries = parse_structured_lines(text.lines());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a b");
        assert!(entries[1].is_dir());
    }
}
