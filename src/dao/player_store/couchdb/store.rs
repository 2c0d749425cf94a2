use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use tracing::debug;

use crate::dao::{
    models::{Identity, OfflineLookup, PersistedRecord, PlayerSnapshot},
    player_store::PlayerStore,
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        CouchPlayerDocument, NAME_INDEX_DESIGN, NAME_INDEX_VIEW, ViewResponse, name_index_design,
        player_doc_id,
    },
};

/// Player store backed by one CouchDB database.
#[derive(Clone)]
pub struct CouchPlayerStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchPlayerStore {
    /// Establish a connection to CouchDB and ensure the database and name view exist.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| CouchDaoError::HttpClient { source })?;

        let base_url = Arc::<str>::from(config.base_url);
        let database = Arc::<str>::from(config.database);
        let auth = config.credentials.map(|credentials| {
            (
                Arc::<str>::from(credentials.username),
                Arc::<str>::from(credentials.password),
            )
        });

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        store.ensure_name_index().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseUnreachable {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreation {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseRejected {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseRejected {
                database,
                status: other,
            }),
        }
    }

    async fn ensure_name_index(&self) -> CouchResult<()> {
        if self
            .get_document::<serde_json::Value>(NAME_INDEX_DESIGN)
            .await?
            .is_some()
        {
            return Ok(());
        }
        self.put_document(NAME_INDEX_DESIGN, &name_index_design())
            .await
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::Unreachable {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::MalformedResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::DocumentRejected {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::Unreachable {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::DocumentRejected {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn find_player(&self, identity: Identity) -> CouchResult<Option<CouchPlayerDocument>> {
        self.get_document::<CouchPlayerDocument>(&player_doc_id(identity))
            .await
    }

    async fn find_by_name(&self, name: &str) -> CouchResult<Option<PersistedRecord>> {
        let key = serde_json::to_string(&name.to_lowercase()).map_err(|source| {
            CouchDaoError::MalformedDocument {
                path: NAME_INDEX_VIEW.to_string(),
                source,
            }
        })?;
        let query = [
            ("include_docs", "true".to_string()),
            ("limit", "1".to_string()),
            ("key", key),
        ];

        let response = self
            .request(Method::GET, NAME_INDEX_VIEW)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::Unreachable {
                path: NAME_INDEX_VIEW.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::DocumentRejected {
                path: NAME_INDEX_VIEW.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<ViewResponse>().await.map_err(|source| {
            CouchDaoError::MalformedResponse {
                path: NAME_INDEX_VIEW.to_string(),
                source,
            }
        })?;

        let Some(doc) = payload.rows.into_iter().find_map(|row| row.doc) else {
            return Ok(None);
        };
        let document: CouchPlayerDocument =
            from_value(doc).map_err(|source| CouchDaoError::MalformedDocument {
                path: NAME_INDEX_VIEW.to_string(),
                source,
            })?;
        document.try_into_record().map(Some)
    }

    /// Read-modify-write of a player document, carrying the current revision.
    async fn update_player(
        &self,
        record: PersistedRecord,
        apply: impl FnOnce(&mut PlayerSnapshot, PlayerSnapshot),
    ) -> CouchResult<()> {
        let doc_id = player_doc_id(record.identity);
        let mut document = match self.find_player(record.identity).await? {
            Some(existing) => existing,
            None => CouchPlayerDocument::new(
                record.identity,
                record.name.clone(),
                PlayerSnapshot::default(),
            ),
        };
        apply(&mut document.snapshot, record.snapshot);
        document.snapshot = std::mem::take(&mut document.snapshot).normalized();
        document.name = record.name;
        document.updated_at = Some(std::time::SystemTime::now());
        self.put_document(&doc_id, &document).await
    }
}

impl PlayerStore for CouchPlayerStore {
    fn load_record(&self, identity: Identity) -> BoxFuture<'static, StorageResult<PersistedRecord>> {
        let store = self.clone();
        Box::pin(async move {
            match store.find_player(identity).await? {
                Some(document) => document.try_into_record().map_err(Into::into),
                None => Ok(PersistedRecord::absent(identity, "")),
            }
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
            let doc_id = player_doc_id(identity);
            let mut document = CouchPlayerDocument::new(identity, name, snapshot);
            // The live session owns the record, so a racing writer only moved `_rev`.
            for attempt in 0..2 {
                document.rev = store
                    .find_player(identity)
                    .await?
                    .and_then(|existing| existing.rev);
                match store.put_document(&doc_id, &document).await {
                    Err(err) if err.is_conflict() && attempt == 0 => {
                        debug!(%identity, "player document revision moved, retrying save");
                    }
                    result => return result.map_err(StorageError::from),
                }
            }
            Err(StorageError::from(CouchDaoError::RevisionConflict {
                path: doc_id,
            }))
        })
    }

    fn load_offline_record(
        &self,
        lookup: OfflineLookup,
    ) -> BoxFuture<'static, StorageResult<Option<PersistedRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            match lookup {
                OfflineLookup::Identity(identity) => match store.find_player(identity).await? {
                    Some(document) => Ok(Some(document.try_into_record()?)),
                    None => Ok(None),
                },
                OfflineLookup::Name(name) => store.find_by_name(&name).await.map_err(Into::into),
            }
        })
    }

    fn save_offline_main_inventory(
        &self,
        record: PersistedRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_player(record, |stored, edited| {
                    stored.inventory = edited.inventory;
                    stored.armor = edited.armor;
                    stored.offhand = edited.offhand;
                })
                .await
                .map_err(Into::into)
        })
    }

    fn save_offline_ender_storage(
        &self,
        record: PersistedRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_player(record, |stored, edited| {
                    stored.ender_storage = edited.ender_storage;
                })
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
