//! Core types for the snapshot file.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Format version written into every info section.
pub const FORMAT_VERSION: &str = "1.0.0";

/// Separates a command's key from its payload.
pub const KEY_DELIMITER: &str = "<-KC->";

/// Terminates every command record in the data section.
pub const COMMAND_DELIMITER: &str = "<-KCOMMAND->";

/// Header block describing one snapshot.
///
/// A fresh info block is built on every write. `byte_size` counts only the
/// encoded command-data section, not the whole file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub version: String,
    pub id: String,
    pub path: String,
    pub snapshot_time: String,
    pub collection_count: u64,
    pub point_count: u64,
    pub byte_size: u64,
}

impl SnapshotInfo {
    /// Whether this snapshot was written in the current format version.
    pub fn is_current_version(&self) -> bool {
        self.version == FORMAT_VERSION
    }
}

/// Identifier of a snapshot: `{store_id}-{role}-{epoch_millis}`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new(store_id: &str, role: &str, epoch_millis: i64) -> Self {
        SnapshotId(format!("{}-{}-{}", store_id, role, epoch_millis))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A collection definition as persisted in the collections section.
///
/// Only `id` is interpreted here; every other field is carried through
/// untouched for the validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: String,
    #[serde(flatten)]
    pub definition: Map<String, Value>,
}

impl CollectionRecord {
    /// Collection with no definition fields beyond its id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            definition: Map::new(),
        }
    }

    /// Attach a schema object (field name -> type name).
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.definition.insert("schema".to_string(), schema);
        self
    }

    /// Attach an arbitrary definition field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.definition.insert(name.into(), value);
        self
    }

    pub fn schema(&self) -> Option<&Value> {
        self.definition.get("schema")
    }
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current time as an RFC 3339 string with millisecond precision.
pub fn snapshot_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
