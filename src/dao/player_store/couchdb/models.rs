use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{Identity, PersistedRecord, PlayerSnapshot};

use super::error::CouchDaoError;

pub const PLAYER_PREFIX: &str = "player::";
pub const NAME_INDEX_DESIGN: &str = "_design/players";
pub const NAME_INDEX_VIEW: &str = "_design/players/_view/by_name";

#[derive(Debug, Deserialize)]
pub struct ViewResponse {
    pub rows: Vec<ViewRow>,
}

#[derive(Debug, Deserialize)]
pub struct ViewRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPlayerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub snapshot: PlayerSnapshot,
    #[serde(default)]
    pub updated_at: Option<SystemTime>,
}

impl CouchPlayerDocument {
    pub fn new(identity: Identity, name: String, snapshot: PlayerSnapshot) -> Self {
        Self {
            id: player_doc_id(identity),
            rev: None,
            name,
            snapshot: snapshot.normalized(),
            updated_at: Some(SystemTime::now()),
        }
    }

    pub fn try_into_record(self) -> Result<PersistedRecord, CouchDaoError> {
        let identity = parse_player_doc_id(&self.id)?;
        Ok(PersistedRecord::stored(
            identity,
            self.name,
            self.snapshot,
            self.updated_at,
        ))
    }
}

/// Design document holding the case-insensitive name view.
pub fn name_index_design() -> Value {
    serde_json::json!({
        "_id": NAME_INDEX_DESIGN,
        "views": {
            "by_name": {
                "map": "function (doc) { if (doc._id.indexOf('player::') === 0 && doc.name) { emit(doc.name.toLowerCase(), null); } }"
            }
        }
    })
}

pub fn player_doc_id(identity: Identity) -> String {
    format!("{PLAYER_PREFIX}{identity}")
}

fn parse_player_doc_id(doc_id: &str) -> Result<Identity, CouchDaoError> {
    doc_id
        .strip_prefix(PLAYER_PREFIX)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| CouchDaoError::ForeignDocument {
            doc_id: doc_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_round_trips() {
        let id = Uuid::new_v4();
        assert_eq!(parse_player_doc_id(&player_doc_id(id)).unwrap(), id);
        assert!(parse_player_doc_id("game::whatever").is_err());
    }
}
