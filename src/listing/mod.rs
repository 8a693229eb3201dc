//! Directory listing parsers
//!
//! Both listing forms produce the same `ListingEntry` type; the caller picks
//! a parser through `ListingFormat`.

pub mod entry;
pub mod long_format;
pub mod structured;

pub use entry::{EntryKind, ListingEntry, ListingFormat};
pub use long_format::parse_long_format;
pub use structured::{FactEntry, parse_fact_line, parse_structured, parse_structured_lines};

/// Parse listing text with the parser matching `format`.
pub fn parse_listing(format: ListingFormat, text: &str) -> Vec<ListingEntry> {
    let lines = text.lines().filter(|l| !l.trim().is_empty());
    match format {
        ListingFormat::LongFormat => parse_long_format(lines),
        ListingFormat::Structured => parse_structured_lines(lines),
    }
}
