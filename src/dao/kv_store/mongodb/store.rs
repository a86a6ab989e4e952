use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use mongodb::{Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoEntryDocument, key_filter},
};
use crate::dao::{kv_store::KeyValueStore, storage::StorageResult};

const ENTRY_COLLECTION_NAME: &str = "entries";

/// Key-value backend storing one document per key in a TTL-indexed collection.
#[derive(Clone)]
pub struct MongoKeyValueStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoKeyValueStore {
    /// Establish a connection to MongoDB and ensure the TTL index is present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"expires_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("entry_ttl_idx".to_owned()))
                    .expire_after(Some(Duration::ZERO))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ENTRY_COLLECTION_NAME,
                index: "expires_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoEntryDocument> {
        let guard = self.inner.database.read().await;
        guard.collection::<MongoEntryDocument>(ENTRY_COLLECTION_NAME)
    }

    async fn read(&self, key: String) -> MongoResult<Option<String>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(key_filter(&key))
            .await
            .map_err(|source| MongoDaoError::ReadKey {
                key: key.clone(),
                source,
            })?;

        Ok(document
            .filter(|entry| entry.is_live(SystemTime::now()))
            .map(|entry| entry.value))
    }

    async fn write(&self, key: String, value: String, ttl: Option<Duration>) -> MongoResult<()> {
        let collection = self.collection().await;
        let document = MongoEntryDocument::new(key.clone(), value, ttl, SystemTime::now());
        collection
            .replace_one(key_filter(&key), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::WriteKey { key, source })?;
        Ok(())
    }
}

impl KeyValueStore for MongoKeyValueStore {
    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let store = self.clone();
        Box::pin(async move { store.read(key).await.map_err(Into::into) })
    }

    fn set(
        &self,
        key: String,
        value: String,
        ttl: Option<Duration>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.write(key, value, ttl).await.map_err(Into::into) })
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
