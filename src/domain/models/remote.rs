#[cfg(test)]
#[path = "remote_test.rs"]
mod tests;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

use super::ComponentType;
use super::Project;

/// A project mirrored in the remote collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    #[serde(rename = "localId")]
    pub local_id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "lastModified", default)]
    pub last_modified: i64,
}

impl RemoteRecord {
    pub fn component_data(&self, index: usize) -> Option<&Value> {
        return self.data.pointer(&format!("/components/{index}/data"));
    }

    /// Kind of the remote component at `index`. `None` when the slot is
    /// missing or its type isn't one we know.
    pub fn component_kind(&self, index: usize) -> Option<ComponentType> {
        let kind = self.data.pointer(&format!("/components/{index}/type"))?;
        return serde_json::from_value::<ComponentType>(kind.clone()).ok();
    }
}

/// Body written by `add` and `update`. The remote assigns the record id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    #[serde(rename = "localId")]
    pub local_id: String,
    pub data: Value,
    #[serde(rename = "lastModified")]
    pub last_modified: i64,
}

impl RecordPayload {
    pub fn from_project(project: &Project, last_modified: i64) -> Result<RecordPayload> {
        return Ok(RecordPayload {
            local_id: project.id.to_string(),
            data: project.to_record_data()?,
            last_modified,
        });
    }
}

#[async_trait]
pub trait Collection {
    async fn get_all(&self) -> Result<Vec<RemoteRecord>>;

    /// Creates a record and returns the id the remote assigned to it.
    async fn add(&self, record: RecordPayload) -> Result<String>;

    async fn update(&self, id: &str, record: RecordPayload) -> Result<()>;
}

pub type CollectionBox = Arc<dyn Collection + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CollectionName {
    Http,
    None,
}

impl CollectionName {
    pub fn parse(text: String) -> Option<CollectionName> {
        return CollectionName::iter().find(|e| return e.to_string() == text);
    }
}

/// Whether the user is signed in, and the collection handle that comes with it.
#[derive(Clone, Default)]
pub struct AuthSession {
    pub signed_in: bool,
    pub collection: Option<CollectionBox>,
}

impl AuthSession {
    pub fn signed_in(collection: CollectionBox) -> AuthSession {
        return AuthSession {
            signed_in: true,
            collection: Some(collection),
        };
    }

    pub fn signed_out() -> AuthSession {
        return AuthSession::default();
    }

    /// Collection to sync against, or `None` when syncing is disabled.
    pub fn collection(&self) -> Option<&CollectionBox> {
        if !self.signed_in {
            return None;
        }

        return self.collection.as_ref();
    }

    pub fn is_active(&self) -> bool {
        return self.collection().is_some();
    }
}
