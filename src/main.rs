use anyhow::{Context, Result};
use loopback_auth::{AuthConfig, TokenStore};
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "loopback_auth=debug,warn".into()
            } else {
                "loopback_auth=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    let config = AuthConfig::from_env().context("Failed to read configuration")?;
    debug!(config = ?config, "Resolved configuration");

    let store = TokenStore::open(&config)
        .await
        .context("Failed to open token storage")?;
    let token = store.get_token().await.context("Failed to load token")?;

    println!("{}", serde_json::to_string_pretty(&token)?);
    Ok(())
}
