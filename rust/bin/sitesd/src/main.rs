//! `sitesd`: HTTP server for monitoring site records.
//!
//! Usage:
//!   sitesd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/sites/<name>.toml`.
//! If a path with `/` or `.toml` is given, it's used directly.

mod auth_middleware;
mod bootstrap;
mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use sites_store::{AdminRegistry, SiteOps};
use tracing::info;

use auth_middleware::JwtState;
use config::ServerConfig;
use routes::AppState;

/// Site records server.
#[derive(Parser, Debug)]
#[command(name = "sitesd", about = "Site records server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;
    bootstrap::verify_config(&server_config)?;

    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = sites_core::ServiceConfig {
        data_dir: Some(data_dir),
        listen: cli.listen.clone(),
        ..Default::default()
    };

    let kv: Arc<dyn sites_kv::KVStore> = Arc::new(
        sites_kv::RedbStore::open(&core_config.resolve_db_path())
            .map_err(|e| anyhow::anyhow!("failed to open KV store: {}", e))?,
    );

    let admins = Arc::new(AdminRegistry::new(Arc::clone(&kv)));
    bootstrap::ensure_bootstrap_admin(&admins, &server_config)?;

    let sites = Arc::new(SiteOps::new(kv, admins.clone()));
    info!(
        "Site store ready ({} policies, {} triggers on '{}')",
        sites.rules().policies().count(),
        sites.rules().triggers().count(),
        sites.rules().table()
    );

    let jwt_state = Arc::new(JwtState::from_secret(&server_config.jwt.secret));
    let app = routes::build_router(AppState { sites, admins }, jwt_state);

    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("sitesd listening on {}", core_config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
