//! Document validators derived from collection definitions.

use crate::error::{Result, SnapshotError};
use crate::types::CollectionRecord;
use serde_json::Value;

/// Type expected for one field of a collection document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl FieldType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "boolean" => Some(FieldType::Boolean),
            "object" => Some(FieldType::Object),
            "array" => Some(FieldType::Array),
            "any" => Some(FieldType::Any),
            _ => None,
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
            FieldType::Any => true,
        }
    }
}

/// Validator for documents of one collection.
///
/// Built from the collection's `schema` (field name -> type name) and
/// optional `required` (list of field names). A collection without a schema
/// accepts any JSON object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionValidator {
    collection_id: String,
    fields: Vec<(String, FieldType)>,
    required: Vec<String>,
}

impl CollectionValidator {
    pub fn from_collection(record: &CollectionRecord) -> Result<Self> {
        let invalid = |msg: String| {
            SnapshotError::Validation(format!("collection {}: {}", record.id, msg))
        };

        let mut fields = Vec::new();
        match record.schema() {
            None | Some(Value::Null) => {}
            Some(Value::Object(schema)) => {
                for (name, ty) in schema {
                    let ty = ty
                        .as_str()
                        .and_then(FieldType::parse)
                        .ok_or_else(|| invalid(format!("unknown type for field {}", name)))?;
                    fields.push((name.clone(), ty));
                }
            }
            Some(_) => return Err(invalid("schema must be an object".into())),
        }

        let required = match record.definition.get("required") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| {
                    n.as_str()
                        .map(String::from)
                        .ok_or_else(|| invalid("required entries must be strings".into()))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(invalid("required must be an array".into())),
        };

        Ok(Self {
            collection_id: record.id.clone(),
            fields,
            required,
        })
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Check a document against this collection's schema.
    pub fn validate(&self, doc: &Value) -> Result<()> {
        let obj = doc.as_object().ok_or_else(|| {
            SnapshotError::Validation(format!(
                "collection {}: document must be an object",
                self.collection_id
            ))
        })?;

        for name in &self.required {
            if !obj.contains_key(name) {
                return Err(SnapshotError::Validation(format!(
                    "collection {}: missing required field {}",
                    self.collection_id, name
                )));
            }
        }

        for (name, ty) in &self.fields {
            if let Some(value) = obj.get(name) {
                if !value.is_null() && !ty.matches(value) {
                    return Err(SnapshotError::Validation(format!(
                        "collection {}: field {} expected {:?}",
                        self.collection_id, name, ty
                    )));
                }
            }
        }

        Ok(())
    }
}
