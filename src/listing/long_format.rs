//! `LIST` output parser.
//!
//! Lines look like `ls -l`:
//! ```text
//! drwxr-xr-x   2 owner group  4096 Jan 01 12:00 some dir
//! -rw-r--r--   1 owner group    12 Jan 01  2025 notes.txt
//! ```
//! The name is everything from the ninth token on; the format has no quoting
//! so names with spaces are rebuilt by joining those tokens.

use crate::listing::entry::{EntryKind, ListingEntry, is_acceptable_name};

const MIN_TOKENS: usize = 9;
const SIZE_TOKEN: usize = 4;
const NAME_TOKEN: usize = 8;

/// Parse long-format listing lines. Lines with fewer than nine tokens are
/// skipped (totals, continuation lines).
pub fn parse_long_format<I, S>(lines: I) -> Vec<ListingEntry>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_line(line.as_ref()))
        .collect()
}

fn parse_line(line: &str) -> Option<ListingEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return None;
    }

    let kind = if tokens[0].starts_with('d') {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    let size = tokens[SIZE_TOKEN].parse::<u64>().unwrap_or(0);
    let name = tokens[NAME_TOKEN..].join(" ").trim().to_string();

    if !is_acceptable_name(&name) {
        return None;
    }
    Some(ListingEntry::new(name, kind, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_files_and_directories() {
        let entries = parse_long_format([
            "drwxrwxrwx   1 owner    group        0 Jan 01 12:00 docs",
            "-rw-rw-rw-   1 owner    group     1234 Jan 01 12:00 notes.txt",
        ]);
        assert_eq!(
            entries,
            vec![
                ListingEntry::new("docs", EntryKind::Directory, 0),
                ListingEntry::new("notes.txt", EntryKind::File, 1234),
            ]
        );
    }

    #[test]
    fn test_name_with_spaces_is_rejoined() {
        let entries =
            parse_long_format(["-rw-r--r-- 1 u g 7 Mar  3  2024 my   holiday  photo.jpg  "]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "my holiday photo.jpg");
    }

    #[test]
    fn test_short_lines_are_skipped() {
        let entries = parse_long_format(["total 8", "-rw-r--r-- 1 u g 7 Mar 3 x", ""]);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_dot_entries_dropped() {
        let entries = parse_long_format([
            "drwxr-xr-x 2 u g 0 Jan 1 00:00 .",
            "drwxr-xr-x 2 u g 0 Jan 1 00:00 ..",
            "drwxr-xr-x 2 u g 0 Jan 1 00:00 ...",
        ]);
        assert_eq!(entries, vec![ListingEntry::new("...", EntryKind::Directory, 0)]);
    }

    #[test]
    fn test_non_directory_kinds_are_files() {
        let entries = parse_long_format(["lrwxrwxrwx 1 u g 9 Jan 1 00:00 link"]);
        assert_eq!(entries[0].kind, EntryKind::File);
    }

    #[test]
    fn test_unparseable_size_defaults_to_zero() {
        let entries = parse_long_format(["-rw-r--r-- 1 u g ?? Jan 1 00:00 odd"]);
        assert_eq!(entries[0].size, 0);
    }

    #[test]
    fn test_order_preserved() {
        let lines: Vec<String> = ["b", "a", "c"]
            .iter()
            .map(|n| format!("-rw-r--r-- 1 u g 1 Jan 1 00:00 {}", n))
            .collect();
        let names: Vec<String> = parse_long_format(&lines)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_names_with_separators_dropped() {
        let entries = parse_long_format([
            "-rw-r--r-- 1 u g 3 Jan 1 00:00 ..\\escape.txt",
            "-rw-r--r-- 1 u g 3 Jan 1 00:00 kept.txt",
        ]);
        assert_eq!(entries, vec![ListingEntry::new("kept.txt", EntryKind::File, 3)]);
    }
}
