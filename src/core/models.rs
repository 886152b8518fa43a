use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Partition key path of collections this crate creates.
pub const PARTITION_KEY_PATH: &str = "/id";

/// A document the repository can store: serializable both ways and addressed
/// by a string id that is unique within its collection.
pub trait StoreDocument: Serialize + DeserializeOwned + Send + Sync {
    fn id(&self) -> &str;
}

/// Metadata the store returns for a resource it read or wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreReceipt {
    pub id: String,
    #[serde(rename = "_rid", default)]
    pub resource_id: Option<String>,
    #[serde(rename = "_self", default)]
    pub self_link: Option<String>,
    #[serde(rename = "_etag", default)]
    pub etag: Option<String>,
    #[serde(rename = "_ts", default)]
    pub timestamp: Option<i64>,
    /// Only present on collections, and only when they are partitioned.
    #[serde(rename = "partitionKey", default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<PartitionKeyDefinition>,
    #[serde(skip)]
    pub request_charge: Option<f64>,
    #[serde(skip)]
    pub activity_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionKeyDefinition {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl PartitionKeyDefinition {
    #[must_use]
    pub fn by_id() -> Self {
        Self {
            paths: vec![PARTITION_KEY_PATH.to_string()],
            kind: Some("Hash".to_string()),
        }
    }
}

/// How point operations address documents of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partitioning {
    /// Single-partition collection; requests carry no partition key.
    Unpartitioned,
    /// Partitioned on `/id`; the document id is its partition key.
    ById,
}

impl Partitioning {
    /// Reads the partitioning from a collection's partition key definition.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for any partition key path other than
    /// `/id`: such documents cannot be addressed by id alone.
    pub fn from_definition(
        definition: Option<&PartitionKeyDefinition>,
    ) -> Result<Self, StoreError> {
        match definition.map(|d| d.paths.as_slice()) {
            None | Some([]) => Ok(Partitioning::Unpartitioned),
            Some([path]) if path.as_str() == PARTITION_KEY_PATH => Ok(Partitioning::ById),
            Some(paths) => Err(StoreError::ConfigurationError(format!(
                "collection is partitioned on {paths:?}; documents can only be addressed \
                 by id in collections partitioned on '{PARTITION_KEY_PATH}' or unpartitioned"
            ))),
        }
    }

    /// Partition key value for the document `id`, if the collection has one.
    #[must_use]
    pub fn key_for(self, id: &str) -> Option<&str> {
        match self {
            Partitioning::Unpartitioned => None,
            Partitioning::ById => Some(id),
        }
    }
}

/// A to-do entry, the document type the `todo` front end manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub category: Option<String>,
}

impl Item {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            completed: false,
            category: None,
        }
    }
}

impl StoreDocument for Item {
    fn id(&self) -> &str {
        &self.id
    }
}
