/**
 * Document-store (MongoDB) Backplane
 *
 * Envelopes are inserted into a relay collection as
 * `{ payload: <json text>, createdAt: <date> }` and picked up by every node
 * through a change stream on that collection. A TTL index on `createdAt`
 * expires relayed documents.
 *
 * # Client Reuse
 *
 * - an application-wide client exists and no adapter URI is configured, or
 *   the URIs match: the existing client is reused and its database name wins
 * - an adapter URI is configured that differs from the existing client's: a
 *   new client is opened
 * - neither a client nor a URI: configuration error
 *
 * Change streams need a replica set or sharded cluster.
 */

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::change_stream::event::ChangeStreamEvent;
use mongodb::change_stream::ChangeStream;
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use tokio::sync::OnceCell;

use super::{BackplaneAdapter, BackplanePublisher, BackplaneSubscriber};
use crate::backend::error::BackendError;
use crate::shared::config::DocumentStoreParams;
use crate::shared::{AdapterKind, Envelope};

/// Database used when neither the configuration nor the URI names one
pub const DEFAULT_DATABASE: &str = "cinder";

/// Application-wide MongoDB client
#[derive(Clone, Debug)]
pub struct ExistingDocumentStore {
    pub client: Client,
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone)]
enum ClientSource {
    Existing { client: Client, database: String },
    Uri { uri: String, database: Option<String> },
}

pub struct DocumentStoreBackplane {
    source: ClientSource,
    collection_name: String,
    expire_after_seconds: u64,
    background: bool,
    collection: OnceCell<Collection<Document>>,
}

impl DocumentStoreBackplane {
    /// Decide which client the adapter will use, without connecting
    pub fn resolve(
        params: &DocumentStoreParams,
        existing: Option<&ExistingDocumentStore>,
    ) -> Result<Self, BackendError> {
        let uri = params.uri.as_deref().filter(|u| !u.trim().is_empty());

        let source = match (existing, uri) {
            (Some(existing), None) => ClientSource::Existing {
                client: existing.client.clone(),
                database: existing.database.clone(),
            },
            (Some(existing), Some(uri)) if uri == existing.uri => ClientSource::Existing {
                client: existing.client.clone(),
                database: existing.database.clone(),
            },
            (_, Some(uri)) => ClientSource::Uri {
                uri: uri.to_string(),
                database: params.database.clone(),
            },
            (None, None) => {
                return Err(BackendError::configuration(
                    "sockets.adapters.document_store.uri is required when no database connection exists",
                ))
            }
        };

        Ok(Self {
            source,
            collection_name: params.collection.clone(),
            expire_after_seconds: params.expire_after_seconds,
            background: params.background,
            collection: OnceCell::new(),
        })
    }

    /// Whether the application-wide client is reused
    pub fn reuses_existing_client(&self) -> bool {
        matches!(self.source, ClientSource::Existing { .. })
    }

    /// Database name known before connecting, if any
    pub fn database_name(&self) -> Option<&str> {
        match &self.source {
            ClientSource::Existing { database, .. } => Some(database),
            ClientSource::Uri { database, .. } => database.as_deref(),
        }
    }

    async fn collection(&self) -> Result<&Collection<Document>, BackendError> {
        self.collection.get_or_try_init(|| self.connect()).await
    }

    async fn connect(&self) -> Result<Collection<Document>, BackendError> {
        let unreachable =
            |e: mongodb::error::Error| BackendError::connection(AdapterKind::DocumentStore, e.to_string());

        let (client, database) = match &self.source {
            ClientSource::Existing { client, database } => (client.clone(), database.clone()),
            ClientSource::Uri { uri, database } => {
                let client = Client::with_uri_str(uri).await.map_err(unreachable)?;
                let database = database
                    .clone()
                    .or_else(|| client.default_database().map(|db| db.name().to_string()))
                    .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
                (client, database)
            }
        };

        let db = client.database(&database);
        db.run_command(doc! { "ping": 1 }).await.map_err(unreachable)?;

        let collection = db.collection::<Document>(&self.collection_name);
        collection
            .create_index(ttl_index(self.expire_after_seconds, self.background))
            .await
            .map_err(|e| {
                BackendError::connection(
                    AdapterKind::DocumentStore,
                    format!("TTL index on {}.{}: {}", database, self.collection_name, e),
                )
            })?;

        tracing::info!(
            "[Backplane] Document store ready: {}.{} (expire after {}s)",
            database,
            self.collection_name,
            self.expire_after_seconds
        );
        Ok(collection)
    }
}

/// TTL index on `createdAt`
pub fn ttl_index(expire_after_seconds: u64, background: bool) -> IndexModel {
    let options = IndexOptions::builder()
        .expire_after(Duration::from_secs(expire_after_seconds))
        .background(background)
        .build();

    IndexModel::builder()
        .keys(doc! { "createdAt": 1 })
        .options(options)
        .build()
}

#[async_trait]
impl BackplaneAdapter for DocumentStoreBackplane {
    fn kind(&self) -> AdapterKind {
        AdapterKind::DocumentStore
    }

    async fn prepare(&self) -> Result<(), BackendError> {
        self.collection().await.map(|_| ())
    }

    async fn open_publisher(&self) -> Result<Arc<dyn BackplanePublisher>, BackendError> {
        let collection = self.collection().await?.clone();
        Ok(Arc::new(DocumentPublisher { collection }))
    }

    async fn open_subscriber(&self) -> Result<Box<dyn BackplaneSubscriber>, BackendError> {
        let stream = self
            .collection()
            .await?
            .watch()
            .pipeline(vec![doc! { "$match": { "operationType": "insert" } }])
            .await
            .map_err(|e| {
                BackendError::connection(AdapterKind::DocumentStore, format!("change stream: {}", e))
            })?;

        Ok(Box::new(DocumentSubscriber {
            stream: Box::pin(stream),
        }))
    }
}

struct DocumentPublisher {
    collection: Collection<Document>,
}

#[async_trait]
impl BackplanePublisher for DocumentPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), BackendError> {
        let record = doc! {
            "payload": envelope.encode()?,
            "createdAt": BsonDateTime::now(),
        };
        self.collection
            .insert_one(record)
            .await
            .map_err(|e| BackendError::backplane(format!("document store insert failed: {}", e)))?;
        Ok(())
    }
}

struct DocumentSubscriber {
    stream: Pin<Box<ChangeStream<ChangeStreamEvent<Document>>>>,
}

#[async_trait]
impl BackplaneSubscriber for DocumentSubscriber {
    async fn next(&mut self) -> Result<Option<Envelope>, BackendError> {
        while let Some(event) = self.stream.next().await {
            let event = event
                .map_err(|e| BackendError::backplane(format!("change stream failed: {}", e)))?;

            let Some(document) = event.full_document else {
                continue;
            };

            match document.get_str("payload") {
                Ok(payload) => match Envelope::decode(payload) {
                    Ok(envelope) => return Ok(Some(envelope)),
                    Err(e) => tracing::warn!("[Backplane] Malformed envelope ignored: {}", e),
                },
                Err(e) => tracing::warn!("[Backplane] Relay document without payload: {}", e),
            }
        }
        Ok(None)
    }
}
