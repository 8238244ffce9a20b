//! Section framing for the snapshot file.
//!
//! A snapshot is three contiguous blocks, each wrapped in a start/end marker:
//!
//! ```text
//! --KDB-INFO-START--\r\n<info-json>--KDB-INFO-END--\r\n
//! --KDB-DATA-START--\r\n<command-log>--KDB-DATA-END--\r\n
//! --KDB-COLLECTIONS-START--\r\n<collections-json>--KDB-COLLECTIONS-END--\r\n
//! ```
//!
//! The start marker is matched together with its line terminator, the end
//! marker is not: a body that itself ends in `\r\n` keeps those bytes.

use crate::error::{Result, SnapshotError};
use std::fmt;

/// Terminator written after every marker.
pub const LINE_END: &str = "\r\n";

/// The three top-level blocks of a snapshot file, in file order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionName {
    Info,
    Data,
    Collections,
}

impl SectionName {
    /// All sections in the order they are written.
    pub const ALL: [SectionName; 3] = [
        SectionName::Info,
        SectionName::Data,
        SectionName::Collections,
    ];

    pub fn start_marker(self) -> &'static str {
        match self {
            SectionName::Info => "--KDB-INFO-START--",
            SectionName::Data => "--KDB-DATA-START--",
            SectionName::Collections => "--KDB-COLLECTIONS-START--",
        }
    }

    pub fn end_marker(self) -> &'static str {
        match self {
            SectionName::Info => "--KDB-INFO-END--",
            SectionName::Data => "--KDB-DATA-END--",
            SectionName::Collections => "--KDB-COLLECTIONS-END--",
        }
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionName::Info => "INFO",
            SectionName::Data => "DATA",
            SectionName::Collections => "COLLECTIONS",
        };
        f.write_str(name)
    }
}

/// Byte range of a section body inside the file content.
pub fn section_bounds(content: &str, section: SectionName) -> Result<(usize, usize)> {
    let start_line = format!("{}{}", section.start_marker(), LINE_END);

    let start = content
        .find(&start_line)
        .map(|pos| pos + start_line.len())
        .ok_or_else(|| {
            SnapshotError::MalformedFormat(format!("missing {} start marker", section))
        })?;

    let end = content[start..]
        .find(section.end_marker())
        .map(|pos| pos + start)
        .ok_or_else(|| {
            SnapshotError::MalformedFormat(format!("missing {} end marker", section))
        })?;

    Ok((start, end))
}

/// Slice out the raw body of `section`.
pub fn extract_section(content: &str, section: SectionName) -> Result<&str> {
    let (start, end) = section_bounds(content, section)?;
    Ok(&content[start..end])
}

/// Append `body` to `out` wrapped in the section's markers.
pub fn frame_section_into(out: &mut String, section: SectionName, body: &str) {
    out.push_str(section.start_marker());
    out.push_str(LINE_END);
    out.push_str(body);
    out.push_str(section.end_marker());
    out.push_str(LINE_END);
}

/// Wrap `body` in the section's markers.
pub fn frame_section(section: SectionName, body: &str) -> String {
    let mut out = String::with_capacity(
        section.start_marker().len() + section.end_marker().len() + body.len() + 2 * LINE_END.len(),
    );
    frame_section_into(&mut out, section, body);
    out
}
