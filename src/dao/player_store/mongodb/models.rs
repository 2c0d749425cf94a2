use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{Identity, PersistedRecord, PlayerSnapshot};

/// Player record as laid out in the `players` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    name_lower: String,
    #[serde(flatten)]
    snapshot: PlayerSnapshot,
    #[serde(default)]
    updated_at: Option<DateTime>,
}

impl MongoPlayerDocument {
    pub fn new(identity: Identity, name: String, snapshot: PlayerSnapshot) -> Self {
        Self {
            id: identity.to_string(),
            name_lower: name.to_lowercase(),
            name,
            snapshot: snapshot.normalized(),
            updated_at: Some(DateTime::now()),
        }
    }

    /// Convert into a record; `None` when the stored id is not a UUID.
    pub fn into_record(self) -> Option<PersistedRecord> {
        let identity = Uuid::parse_str(&self.id).ok()?;
        Some(PersistedRecord::stored(
            identity,
            self.name,
            self.snapshot,
            self.updated_at.map(DateTime::to_system_time),
        ))
    }
}

pub fn doc_id(id: Identity) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn name_filter(name: &str) -> Document {
    doc! {"name_lower": name.to_lowercase()}
}
