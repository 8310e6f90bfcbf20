//! Standalone Peerlink relay on the well-known port.

use peerlink::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), PeerlinkError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = RelayServer::builder()
        .bind(&format!("0.0.0.0:{DEFAULT_RELAY_PORT}"))
        .config(RelayConfig::default())
        .build()
        .await?;
    server.run().await
}
