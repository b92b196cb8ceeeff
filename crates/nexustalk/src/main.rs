use std::sync::Arc;

use tokio::sync::watch;

use nexus_proxy::ProxyState;
use nexustalk::config::{ConfigStore, build_generator};

/// Service entry point: loads configuration and serves the completion proxy
/// until ctrl-c. Session state, relay sync, and export live client-side and
/// are exposed through the library crates.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let config_store = ConfigStore::load();
    let config = config_store.config();

    let generator = build_generator(&config)?;
    tracing::info!(
        generator = generator.name(),
        model = generator.default_model(),
        "response generator ready"
    );

    let state = Arc::new(ProxyState::new(generator));
    let addr = config.proxy.bind_addr()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    nexus_proxy::serve(addr, state, shutdown_rx).await?;
    Ok(())
}
