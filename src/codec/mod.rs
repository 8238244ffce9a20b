//! Snapshot file codec.
//!
//! Pure functions: no I/O happens here. Structured sections (info and
//! collections) go through `serde_json`; the data section uses the
//! delimiter scheme in [`commands`].

pub mod commands;
pub mod sections;

pub use commands::{
    command_key, compose_command, decode_command_log, encode_command_log, split_command,
};
pub use sections::{extract_section, frame_section, section_bounds, SectionName, LINE_END};

use crate::error::{Result, SnapshotError};
use crate::types::{CollectionRecord, SnapshotInfo, COMMAND_DELIMITER};
use std::collections::HashSet;

/// Decode the info section body.
pub fn decode_info(slice: &str) -> Result<SnapshotInfo> {
    serde_json::from_str(slice)
        .map_err(|e| SnapshotError::MalformedFormat(format!("info section: {}", e)))
}

/// Decode the collections section body, preserving order.
pub fn decode_collections(slice: &str) -> Result<Vec<CollectionRecord>> {
    serde_json::from_str(slice)
        .map_err(|e| SnapshotError::MalformedFormat(format!("collections section: {}", e)))
}

pub fn encode_info(info: &SnapshotInfo) -> Result<String> {
    Ok(serde_json::to_string(info)?)
}

pub fn encode_collections(collections: &[CollectionRecord]) -> Result<String> {
    Ok(serde_json::to_string(collections)?)
}

/// All three sections of a snapshot, decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotFile {
    pub info: SnapshotInfo,
    /// Raw records in file order, including the empty tail entry.
    pub commands: Vec<String>,
    pub collections: Vec<CollectionRecord>,
}

impl SnapshotFile {
    /// Decode a whole snapshot file.
    pub fn parse(content: &str) -> Result<Self> {
        let info = decode_info(extract_section(content, SectionName::Info)?)?;
        let commands = decode_command_log(extract_section(content, SectionName::Data)?)
            .into_iter()
            .map(String::from)
            .collect();
        let collections =
            decode_collections(extract_section(content, SectionName::Collections)?)?;

        Ok(Self {
            info,
            commands,
            collections,
        })
    }

    /// Byte length of the data section body these records were split from.
    pub fn data_len(&self) -> usize {
        let records: usize = self.commands.iter().map(String::len).sum();
        records + self.commands.len().saturating_sub(1) * COMMAND_DELIMITER.len()
    }

    /// Number of distinct keys in the command log.
    pub fn distinct_keys(&self) -> usize {
        self.commands
            .iter()
            .filter_map(|record| command_key(record))
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Concatenate already-encoded section bodies into file content.
pub fn assemble(info_json: &str, command_log: &str, collections_json: &str) -> String {
    let capacity = info_json.len() + command_log.len() + collections_json.len() + 128;
    let mut out = String::with_capacity(capacity);
    sections::frame_section_into(&mut out, SectionName::Info, info_json);
    sections::frame_section_into(&mut out, SectionName::Data, command_log);
    sections::frame_section_into(&mut out, SectionName::Collections, collections_json);
    out
}
