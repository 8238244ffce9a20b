//! Command lookup table: last write per key wins.

use crate::codec::command_key;
use std::collections::HashMap;
use tracing::warn;

/// Key-unique view over a command log.
///
/// Insertion-ordered: overwriting a key replaces its record in place, so a
/// key keeps the position of its first write. Re-encoding the table
/// therefore yields the same log on every cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandTable {
    /// Key -> index into `entries`.
    slots: HashMap<String, usize>,
    /// (key, full record) in first-write order.
    entries: Vec<(String, String)>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table by replaying `records` front to back.
    ///
    /// Empty entries are skipped silently; non-empty entries without a key
    /// delimiter are skipped with a warning.
    pub fn from_log<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut table = Self::new();
        for record in records {
            if record.is_empty() {
                continue;
            }
            match command_key(record) {
                Some(key) => {
                    table.insert(key, record.to_string());
                }
                None => warn!(record_len = record.len(), "skipping command without key delimiter"),
            }
        }
        table
    }

    /// Insert or overwrite `key`. Returns true if the key was new.
    pub fn insert(&mut self, key: &str, record: String) -> bool {
        if let Some(&slot) = self.slots.get(key) {
            self.entries[slot].1 = record;
            false
        } else {
            self.slots.insert(key.to_string(), self.entries.len());
            self.entries.push((key.to_string(), record));
            true
        }
    }

    /// Most recent record for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.slots
            .get(key)
            .map(|&slot| self.entries[slot].1.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in table order.
    pub fn records(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(_, record)| record.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .iter()
            .map(|(key, record)| (key.as_str(), record.as_str()))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.entries.clear();
    }
}
