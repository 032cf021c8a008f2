//! Server configuration file (`/etc/sites/<name>.toml`).
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/sites"
//!
//! [jwt]
//! secret = "..."
//!
//! [admin]
//! bootstrap_email = "admin@example.org"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `sites.redb`.
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret used to verify bearer tokens.
    pub secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Email approved on every start, so a fresh install has one writer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_email: Option<String>,
}

impl ServerConfig {
    /// Resolve a context name or path to a config file path.
    ///
    /// Anything containing `/` or ending in `.toml` is used as-is;
    /// a bare name maps to `/etc/sites/<name>.toml`.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.ends_with(".toml") {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from("/etc/sites").join(format!("{}.toml", name_or_path))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            ServerConfig::resolve_path("prod"),
            PathBuf::from("/etc/sites/prod.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("./local.toml"),
            PathBuf::from("./local.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("dev.toml"),
            PathBuf::from("dev.toml")
        );
    }

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.toml");
        std::fs::write(
            &path,
            r#"
[storage]
data_dir = "/var/lib/sites"

[jwt]
secret = "s3cret"

[admin]
bootstrap_email = "admin@x.org"
"#,
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.storage.data_dir, "/var/lib/sites");
        assert_eq!(config.jwt.secret, "s3cret");
        assert_eq!(config.admin.bootstrap_email.as_deref(), Some("admin@x.org"));
    }

    #[test]
    fn test_admin_section_optional() {
        let config: ServerConfig = toml::from_str(
            "[storage]\ndata_dir = \"/d\"\n[jwt]\nsecret = \"k\"\n",
        )
        .unwrap();
        assert!(config.admin.bootstrap_email.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(ServerConfig::load(Path::new("/nonexistent/sites.toml")).is_err());
    }
}
