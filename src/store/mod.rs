//! In-memory store state that snapshots persist.
//!
//! The store owns the raw command log, the collection definitions and the
//! structures derived from them. The snapshot loader populates it; the
//! writer only reads it.

mod table;
mod validator;

pub use table::CommandTable;
pub use validator::{CollectionValidator, FieldType};

use crate::codec::compose_command;
use crate::error::{Result, SnapshotError};
use crate::types::CollectionRecord;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Store shared between the scheduler thread and the code mutating it.
pub type SharedStore = Arc<RwLock<Store>>;

/// Key-value store state.
#[derive(Debug, Default)]
pub struct Store {
    /// Raw command records in write order.
    commands: Vec<String>,

    /// Collection definitions in registration order.
    collections: Vec<CollectionRecord>,

    /// Collection ids, parallel to `collections`.
    collection_ids: Vec<String>,

    /// Validator per collection id.
    validators: HashMap<String, CollectionValidator>,

    /// Last record per key.
    table: CommandTable,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh store for sharing.
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Replace all state with the contents of a snapshot.
    ///
    /// `commands` is replayed front to back into the lookup table. Every
    /// collection must yield a validator, otherwise nothing is changed.
    pub fn populate(
        &mut self,
        commands: Vec<String>,
        collections: Vec<CollectionRecord>,
    ) -> Result<()> {
        let mut validators = HashMap::with_capacity(collections.len());
        let mut collection_ids = Vec::with_capacity(collections.len());
        for collection in &collections {
            validators.insert(
                collection.id.clone(),
                CollectionValidator::from_collection(collection)?,
            );
            collection_ids.push(collection.id.clone());
        }

        let commands: Vec<String> = commands.into_iter().filter(|c| !c.is_empty()).collect();
        let table = CommandTable::from_log(commands.iter().map(String::as_str));

        self.commands = commands;
        self.collections = collections;
        self.collection_ids = collection_ids;
        self.validators = validators;
        self.table = table;
        Ok(())
    }

    /// Append a command and make it the current value for `key`.
    pub fn record_command(&mut self, key: &str, payload: &str) -> Result<()> {
        let record = compose_command(key, payload)?;
        self.table.insert(key, record.clone());
        self.commands.push(record);
        Ok(())
    }

    /// Register a collection, replacing any definition with the same id.
    pub fn add_collection(&mut self, collection: CollectionRecord) -> Result<()> {
        let validator = CollectionValidator::from_collection(&collection)?;
        let id = collection.id.clone();

        match self.collection_ids.iter().position(|c| *c == id) {
            Some(pos) => self.collections[pos] = collection,
            None => {
                self.collections.push(collection);
                self.collection_ids.push(id.clone());
            }
        }
        self.validators.insert(id, validator);
        Ok(())
    }

    /// Validate a document against a registered collection.
    pub fn validate(&self, collection_id: &str, doc: &Value) -> Result<()> {
        self.validators
            .get(collection_id)
            .ok_or_else(|| {
                SnapshotError::Validation(format!("unknown collection {}", collection_id))
            })?
            .validate(doc)
    }

    /// Current record for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.table.get(key)
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn collections(&self) -> &[CollectionRecord] {
        &self.collections
    }

    pub fn collection_ids(&self) -> &[String] {
        &self.collection_ids
    }

    pub fn validator(&self, collection_id: &str) -> Option<&CollectionValidator> {
        self.validators.get(collection_id)
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Number of distinct keys.
    pub fn point_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.collections.is_empty()
    }
}
