//! Bootstrap: first-start checks and the initial approved admin.
//!
//! When sitesd starts:
//! 1. Verify the config has a JWT secret and data dir; refuse to start otherwise.
//! 2. If `admin.bootstrap_email` is set, make sure it is approved.

use sites_store::AdminRegistry;
use tracing::info;

use crate::config::ServerConfig;

/// Recorded as `approved_by` for bootstrapped entries.
pub const BOOTSTRAP_APPROVER: &str = "sitesd:bootstrap";

/// Verify server configuration is usable.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.jwt.secret.is_empty() {
        anyhow::bail!("JWT secret is empty in configuration.");
    }
    if config.storage.data_dir.is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    Ok(())
}

/// Approve the configured bootstrap email, if any.
pub fn ensure_bootstrap_admin(
    registry: &AdminRegistry,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    match config.admin.bootstrap_email.as_deref() {
        Some(email) if !email.is_empty() => {
            registry
                .ensure_approved(email, BOOTSTRAP_APPROVER)
                .map_err(|e| anyhow::anyhow!("failed to approve bootstrap admin: {}", e))?;
            Ok(())
        }
        _ => {
            info!("No bootstrap admin configured");
            Ok(())
        }
    }
}
