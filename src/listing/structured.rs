//! `MLSD` output parser.
//!
//! Each line is a set of `fact=value;` pairs, one space, then the name:
//! `type=file;size=1234;modify=20260101120000; notes.txt`.

use crate::listing::entry::{EntryKind, ListingEntry, is_acceptable_name};
use std::collections::HashMap;

/// A machine-listing line split into its name and facts (keys lower-cased).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactEntry {
    pub name: String,
    pub facts: HashMap<String, String>,
}

impl FactEntry {
    pub fn fact(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }
}

/// Split one MLSD line into facts and name. Returns `None` when the line has
/// no fact section.
pub fn parse_fact_line(line: &str) -> Option<FactEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (facts_str, name) = line.split_once(' ')?;
    if !facts_str.contains('=') {
        return None;
    }

    let facts = facts_str
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.to_string()))
        .collect();

    Some(FactEntry {
        name: name.to_string(),
        facts,
    })
}

/// Map fact entries onto listing entries. Only `type=dir` and `type=file`
/// survive; `cdir`, `pdir`, links and unknown types are dropped.
pub fn parse_structured<I>(entries: I) -> Vec<ListingEntry>
where
    I: IntoIterator<Item = FactEntry>,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            let kind = match entry.fact("type").map(str::to_ascii_lowercase).as_deref() {
                Some("dir") => EntryKind::Directory,
                Some("file") => EntryKind::File,
                _ => return None,
            };
            if !is_acceptable_name(&entry.name) {
                return None;
            }
            let size = entry
                .fact("size")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            Some(ListingEntry::new(entry.name, kind, size))
        })
        .collect()
}

/// Convenience: parse raw MLSD lines straight into listing entries.
pub fn parse_structured_lines<I, S>(lines: I) -> Vec<ListingEntry>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parse_structured(lines.into_iter().filter_map(|l| parse_fact_line(l.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_line_split() {
        let entry = parse_fact_line("Type=file;Size=12;modify=20260101120000; a b.txt").unwrap();
        assert_eq!(entry.name, "a b.txt");
        assert_eq!(entry.fact("type"), Some("file"));
        assert_eq!(entry.fact("size"), Some("12"));
    }

    #[test]
    fn test_types_mapped_and_filtered() {
        let entries = parse_structured_lines([
            "type=cdir;size=0; .",
            "type=pdir;size=0; ..",
            "type=dir;size=0; photos",
            "type=file;size=42; report.pdf",
            "type=OS.unix=symlink;size=3; link",
            "type=file;size=1; ..",
        ]);
        assert_eq!(
            entries,
            vec![
                ListingEntry::new("photos", EntryKind::Directory, 0),
                ListingEntry::new("report.pdf", EntryKind::File, 42),
            ]
        );
    }

    #[test]
    fn test_missing_size_is_zero() {
        let entries = parse_structured_lines(["type=file; empty.bin"]);
        assert_eq!(entries[0].size, 0);
    }

    #[test]
    fn test_line_without_facts_ignored() {
        assert!(parse_fact_line("plainname").is_none());
        assert!(parse_structured_lines(["just words here"]).is_empty());
    }
}
