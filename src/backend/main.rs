/**
 * Cinder Server Entry Point
 *
 * Loads settings, brings the real-time layer up and serves HTTP until
 * Ctrl+C or SIGTERM.
 */

use cinder::backend::server::Cinder;
use cinder::shared::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let settings = Settings::load()?;
    tracing::info!(
        "[Startup] Settings loaded for {} (sockets {})",
        settings.environment,
        if settings.sockets.enabled { "enabled" } else { "disabled" }
    );

    if let Err(e) = Cinder::builder(settings)
        .build()
        .serve(|addr| tracing::info!("[Startup] Ready on http://{}", addr))
        .await
    {
        tracing::error!("[Startup] Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
