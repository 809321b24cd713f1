use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use publisher::config::PublisherConfig;
use publisher::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "publisher=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PlanetFlare Publisher");

    dotenvy::dotenv().ok();
    let config = PublisherConfig::from_env()?;

    match &config.token_store_path {
        Some(path) => info!("Token store: {}", path.display()),
        None => info!("Token store: in-memory"),
    }
    info!("Signing key: {}", config.signing_key_path.display());
    info!("Listening on: {}", config.bind_addr());

    let state = Arc::new(AppState::new(config)?);
    info!(
        "Future payments signed with key {}",
        state.ledger.signer().fingerprint()
    );

    server::run(state).await?;
    Ok(())
}
