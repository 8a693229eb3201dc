//! Listing entry types

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "dir"),
        }
    }
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

impl ListingEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Names that never describe a real child: empty, `.`, `..`, or anything
/// carrying a path separator of either platform.
pub fn is_acceptable_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Which listing command to issue and which parser reads its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFormat {
    /// `LIST`: human-readable `ls -l` lines.
    LongFormat,
    /// `MLSD`: fact lines with explicit type and size.
    Structured,
}

impl ListingFormat {
    pub fn command(&self) -> &'static str {
        match self {
            ListingFormat::LongFormat => "LIST",
            ListingFormat::Structured => "MLSD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptable_names() {
        assert!(is_acceptable_name("report.pdf"));
        assert!(is_acceptable_name("..hidden"));
        assert!(!is_acceptable_name(""));
        assert!(!is_acceptable_name(".."));
        assert!(!is_acceptable_name("a/b"));
        assert!(!is_acceptable_name("..\\evil.txt"));
    }
}
