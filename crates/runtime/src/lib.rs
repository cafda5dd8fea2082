use std::sync::Arc;

use anyhow::{Context, Result};
use parley_config::ClientConfig;
use parley_transport::RemoteTransport;
use tracing::info;

pub mod client;
pub mod error;

pub use client::ChatClient;
pub use error::{ClientError, ClientResult};
pub use parley_chats::{SyncPhase, SyncUpdate};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Connect to the configured server and build a client over it.
pub async fn connect(config: &ClientConfig) -> Result<ChatClient<RemoteTransport>> {
    let transport = RemoteTransport::connect(config)
        .await
        .with_context(|| format!("failed to connect to {}", config.channel.url))?;
    info!(api = %config.api.base_url, channel = %config.channel.url, "transport ready");

    Ok(ChatClient::new(Arc::new(transport), config))
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
