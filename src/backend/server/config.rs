/**
 * Server Configuration
 *
 * This module opens the optional application-wide MongoDB client described
 * by the `[database]` section (or `MONGO_URI`).
 *
 * # Error Handling
 *
 * A client that cannot be built is logged and left out; the server starts
 * without it. Adapters that need a database then fall back to their own URI
 * or fail with a configuration error.
 */

use crate::backend::realtime::ExistingConnections;
use crate::shared::Settings;

/// Open the connections the application shares with the real-time layer
pub async fn load_connections(settings: &Settings) -> ExistingConnections {
    #[cfg(feature = "document-store")]
    {
        ExistingConnections {
            document_store: load_database(settings).await,
        }
    }

    #[cfg(not(feature = "document-store"))]
    {
        if settings.database.uri.is_some() {
            tracing::warn!("[Startup] [database] is configured but document-store support is not built in");
        }
        ExistingConnections::default()
    }
}

/// Build the application-wide MongoDB client
///
/// # Returns
///
/// - `Some(ExistingDocumentStore)` when a URI is configured and accepted
/// - `None` when no URI is set or the client cannot be built
#[cfg(feature = "document-store")]
pub async fn load_database(
    settings: &Settings,
) -> Option<crate::backend::realtime::backplane::ExistingDocumentStore> {
    use crate::backend::realtime::backplane::document::DEFAULT_DATABASE;
    use crate::backend::realtime::backplane::ExistingDocumentStore;

    let uri = settings.database.uri.as_deref().filter(|u| !u.trim().is_empty())?;

    let client = match mongodb::Client::with_uri_str(uri).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("[Startup] Failed to create database client: {}", e);
            tracing::warn!("[Startup] Continuing without an application database");
            return None;
        }
    };

    let database = settings
        .database
        .database
        .clone()
        .or_else(|| client.default_database().map(|db| db.name().to_string()))
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

    tracing::info!("[Startup] Application database: {}", database);
    Some(ExistingDocumentStore {
        client,
        uri: uri.to_string(),
        database,
    })
}
