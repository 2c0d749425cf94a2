use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Collection, Database,
    bson::{self, DateTime, Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::{establish_connection, ping},
    error::{MongoDaoError, MongoResult},
    models::{MongoPlayerDocument, doc_id, name_filter},
};
use crate::dao::{
    models::{Identity, OfflineLookup, PersistedRecord, PlayerSnapshot},
    player_store::PlayerStore,
    storage::{StorageError, StorageResult},
};

const PLAYER_COLLECTION_NAME: &str = "players";

/// Player store backed by the `players` collection.
#[derive(Clone)]
pub struct MongoPlayerStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        ping(&database)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.database = database;
        Ok(())
    }
}

impl MongoPlayerStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"name_lower": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_name_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "name_lower",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoPlayerDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME)
    }

    async fn find_record(&self, identity: Identity) -> StorageResult<Option<PersistedRecord>> {
        let document = self
            .collection()
            .await
            .find_one(doc_id(identity))
            .await
            .map_err(|source| MongoDaoError::LoadRecord {
                id: identity,
                source,
            })?;

        match document {
            None => Ok(None),
            Some(document) => document.into_record().map(Some).ok_or_else(|| {
                StorageError::Malformed {
                    identity: identity.to_string(),
                    reason: "stored `_id` is not a UUID".into(),
                }
            }),
        }
    }

    async fn find_by_name(&self, name: &str) -> StorageResult<Option<PersistedRecord>> {
        let document = self
            .collection()
            .await
            .find_one(name_filter(name))
            .await
            .map_err(|source| MongoDaoError::LookupName {
                name: name.to_owned(),
                source,
            })?;

        Ok(document.and_then(MongoPlayerDocument::into_record))
    }

    async fn replace_record(
        &self,
        identity: Identity,
        name: String,
        snapshot: PlayerSnapshot,
    ) -> MongoResult<()> {
        let document = MongoPlayerDocument::new(identity, name, snapshot);
        self.collection()
            .await
            .replace_one(doc_id(identity), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRecord {
                id: identity,
                source,
            })?;
        Ok(())
    }

    /// Upsert only the given fields, leaving the rest of the document untouched.
    async fn set_fields(&self, record: &PersistedRecord, mut fields: Document) -> MongoResult<()> {
        fields.insert("name", record.name.clone());
        fields.insert("name_lower", record.name.to_lowercase());
        fields.insert("updated_at", DateTime::now());
        self.collection()
            .await
            .update_one(doc_id(record.identity), doc! {"$set": fields})
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRecord {
                id: record.identity,
                source,
            })?;
        Ok(())
    }
}

fn encode<T: serde::Serialize>(
    id: Identity,
    field: &'static str,
    value: &T,
) -> MongoResult<bson::Bson> {
    bson::serialize_to_bson(value).map_err(|source| MongoDaoError::Encode { id, field, source })
}

impl PlayerStore for MongoPlayerStore {
    fn load_record(&self, identity: Identity) -> BoxFuture<'static, StorageResult<PersistedRecord>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .find_record(identity)
                .await?
                .unwrap_or_else(|| PersistedRecord::absent(identity, "")))
        })
    }

    fn save_record(
        &self,
        identity: Identity,
        name: String,
        snapshot: PlayerSnapshot,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_record(identity, name, snapshot)
                .await
                .map_err(Into::into)
        })
    }

    fn load_offline_record(
        &self,
        lookup: OfflineLookup,
    ) -> BoxFuture<'static, StorageResult<Option<PersistedRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            match lookup {
                OfflineLookup::Identity(identity) => Ok(store.find_record(identity).await?),
                OfflineLookup::Name(name) => store.find_by_name(&name).await,
            }
        })
    }

    fn save_offline_main_inventory(
        &self,
        record: PersistedRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = record.identity;
            let snapshot = &record.snapshot;
            let fields = doc! {
                "inventory": encode(id, "inventory", &snapshot.inventory)?,
                "armor": encode(id, "armor", &snapshot.armor)?,
                "offhand": encode(id, "offhand", &snapshot.offhand)?,
            };
            store.set_fields(&record, fields).await.map_err(Into::into)
        })
    }

    fn save_offline_ender_storage(
        &self,
        record: PersistedRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = record.identity;
            let fields = doc! {
                "ender_storage": encode(id, "ender_storage", &record.snapshot.ender_storage)?,
            };
            store.set_fields(&record, fields).await.map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
