use std::time::Duration;
use async_trait::async_trait;
use futures::TryStreamExt;
use bson::Document;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::ClientOptions,
    results::UpdateResult,
};
use softdoc_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    change::ChangeInfo,
    document::is_operator_document,
    error::{DocumentStoreError, DocumentStoreResult},
    query::Query,
};

/// Connect timeout used when the builder is not given one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maps driver errors, keeping the server code of rejected writes.
fn map_error(error: MongoError) -> DocumentStoreError {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) => DocumentStoreError::Write {
            code: Some(failure.code),
            message: failure.message.clone(),
        },
        ErrorKind::Write(WriteFailure::WriteConcernError(failure)) => DocumentStoreError::Write {
            code: Some(failure.code),
            message: failure.message.clone(),
        },
        _ => DocumentStoreError::Backend(error.to_string()),
    }
}

/// Converts a cursor limit for the driver, saturating instead of wrapping negative.
fn driver_limit(limit: u64) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn change_info(result: UpdateResult) -> ChangeInfo {
    ChangeInfo {
        matched: result.matched_count,
        updated: result.modified_count,
        removed: 0,
        upserted_id: result.upserted_id,
    }
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// The underlying driver client, for operations outside the soft-delete layer.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    async fn update_first(
        &self,
        selector: &Document,
        update: &Document,
        collection: &str,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateResult> {
        let collection = self.get_collection(collection);

        if is_operator_document(update) {
            collection
                .update_one(selector.clone(), update.clone())
                .upsert(upsert)
                .await
                .map_err(map_error)
        } else {
            collection
                .replace_one(selector.clone(), update)
                .upsert(upsert)
                .await
                .map_err(map_error)
        }
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find_documents(&self, query: &Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let collection = self.get_collection(collection);
        let mut find = collection.find(query.filter.clone());

        if let Some(sort) = query.sort_document() {
            find = find.sort(sort);
        }
        if let Some(skip) = query.offset {
            find = find.skip(skip);
        }
        if let Some(limit) = query.limit {
            find = find.limit(driver_limit(limit));
        }

        find.await
            .map_err(map_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(map_error)
    }

    async fn count_documents(&self, filter: &Document, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(filter.clone())
            .await
            .map_err(map_error)
    }

    async fn update_one(&self, selector: &Document, update: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        let result = self
            .update_first(selector, update, collection, false)
            .await?;

        if result.matched_count == 0 {
            return Err(DocumentStoreError::NotFound(collection.to_string()));
        }

        Ok(change_info(result))
    }

    async fn update_many(&self, selector: &Document, update: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        Ok(change_info(
            self.get_collection(collection)
                .update_many(selector.clone(), update.clone())
                .await
                .map_err(map_error)?,
        ))
    }

    async fn upsert(&self, selector: &Document, update: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        Ok(change_info(
            self.update_first(selector, update, collection, true)
                .await?,
        ))
    }

    async fn insert_document(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .insert_one(document)
            .await
            .map_err(map_error)?;

        Ok(())
    }

    async fn delete_one(&self, selector: &Document, collection: &str) -> DocumentStoreResult<()> {
        let result = self
            .get_collection(collection)
            .delete_one(selector.clone())
            .await
            .map_err(map_error)?;

        if result.deleted_count == 0 {
            return Err(DocumentStoreError::NotFound(collection.to_string()));
        }

        Ok(())
    }

    async fn delete_many(&self, selector: &Document, collection: &str) -> DocumentStoreResult<ChangeInfo> {
        let result = self
            .get_collection(collection)
            .delete_many(selector.clone())
            .await
            .map_err(map_error)?;

        Ok(ChangeInfo::removed(result.deleted_count))
    }

    async fn close(&self) -> DocumentStoreResult<()> {
        log::debug!("shutting down mongodb client for {}", self.database);
        self.client.clone().shutdown().await;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    connect_timeout: Duration,
    app_name: Option<String>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            app_name: None,
        }
    }

    /// Sets how long to wait for a connection to the server.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the application name reported to the server.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        options.connect_timeout = Some(self.connect_timeout);
        if self.app_name.is_some() {
            options.app_name = self.app_name;
        }

        log::debug!("connecting to mongodb database {}", self.database);

        Ok(MongoDbStore::new(
            Client::with_options(options)
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
