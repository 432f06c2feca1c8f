//! Application and upload configuration

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// How many notes roots are remembered
const MAX_RECENT_ROOTS: usize = 10;

/// Default key prefix for uploaded objects
pub const DEFAULT_KEY_PREFIX: &str = "press/";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Last opened notes directory
    pub last_root: Option<PathBuf>,
    /// Recently opened notes directories, most recent first
    pub recent_roots: Vec<PathBuf>,
    /// `.env` file holding storage credentials
    pub env_path: Option<PathBuf>,
    /// Directory used by the local object store
    pub local_store: Option<PathBuf>,
}

impl AppConfig {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "notepress", "Notepress")
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from the platform config directory
    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config directory")?;
        Self::load_from(&path)
    }

    /// Load configuration from a file, defaulting when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the platform config directory
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Remember a notes root as the most recent one
    pub fn add_recent_root(&mut self, path: PathBuf) {
        self.recent_roots.retain(|p| p != &path);
        self.recent_roots.insert(0, path.clone());
        self.recent_roots.truncate(MAX_RECENT_ROOTS);
        self.last_root = Some(path);
    }

    /// Directory for the local object store
    pub fn local_store_dir(&self) -> PathBuf {
        self.local_store.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("objects"))
                .unwrap_or_else(|| PathBuf::from("objects"))
        })
    }
}

/// Object storage settings read from a `.env` file
#[derive(Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub secret_id: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Always empty or ending in `/`
    pub key_prefix: String,
    pub cdn_host: String,
}

impl StorageConfig {
    /// Read a `.env` file. `Ok(None)` when bucket or region is not configured.
    pub fn from_env_file(path: &Path) -> Result<Option<Self>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read .env file at {}", path.display()))?;
        Ok(Self::parse_env(&content))
    }

    /// Parse `KEY=value` lines
    pub fn parse_env(content: &str) -> Option<Self> {
        let mut values: HashMap<&str, &str> = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim(), unquote(value.trim()));
            }
        }

        let get = |key: &str| values.get(key).copied().unwrap_or_default().to_string();

        let bucket = get("COS_BUCKET");
        let region = get("COS_REGION");
        if bucket.is_empty() || region.is_empty() {
            return None;
        }

        let mut key_prefix = values
            .get("COS_PREFIX")
            .copied()
            .unwrap_or(DEFAULT_KEY_PREFIX)
            .trim_start_matches('/')
            .to_string();
        if !key_prefix.is_empty() && !key_prefix.ends_with('/') {
            key_prefix.push('/');
        }

        let cdn_host = match values.get("COS_CDN_HOST").copied() {
            Some(host) if !host.is_empty() => host.trim_end_matches('/').to_string(),
            _ => format!("{bucket}.cos.{region}.myqcloud.com"),
        };

        Some(Self {
            secret_id: get("TENCENT_SECRET_ID"),
            secret_key: get("TENCENT_SECRET_KEY"),
            bucket,
            region,
            key_prefix,
            cdn_host,
        })
    }

    /// Base every public URL starts with
    pub fn public_base(&self) -> String {
        let host = self
            .cdn_host
            .strip_prefix("https://")
            .or_else(|| self.cdn_host.strip_prefix("http://"))
            .unwrap_or(&self.cdn_host);
        format!("https://{host}/")
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("secret_id", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("key_prefix", &self.key_prefix)
            .field("cdn_host", &self.cdn_host)
            .finish()
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_defaults() {
        let config = StorageConfig::parse_env(
            "TENCENT_SECRET_ID=id\nTENCENT_SECRET_KEY=key\nCOS_BUCKET=notes-123\nCOS_REGION=ap-shanghai\n",
        )
        .unwrap();
        assert_eq!(config.key_prefix, "press/");
        assert_eq!(config.cdn_host, "notes-123.cos.ap-shanghai.myqcloud.com");
        assert_eq!(config.public_base(), "https://notes-123.cos.ap-shanghai.myqcloud.com/");
        assert_eq!(config.secret_id, "id");
    }

    #[test]
    fn test_parse_env_overrides() {
        let config = StorageConfig::parse_env(
            "# storage\nexport COS_BUCKET=\"b\"\nCOS_REGION = r\nCOS_PREFIX=blog\nCOS_CDN_HOST=https://cdn.example.com/\n",
        )
        .unwrap();
        assert_eq!(config.bucket, "b");
        assert_eq!(config.region, "r");
        assert_eq!(config.key_prefix, "blog/");
        assert_eq!(config.public_base(), "https://cdn.example.com/");
    }

    #[test]
    fn test_parse_env_missing_bucket() {
        assert!(StorageConfig::parse_env("COS_REGION=r\n").is_none());
        assert!(StorageConfig::parse_env("COS_BUCKET=\nCOS_REGION=r\n").is_none());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = StorageConfig::parse_env("TENCENT_SECRET_KEY=hunter2\nCOS_BUCKET=b\nCOS_REGION=r\n").unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_from_env_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StorageConfig::from_env_file(&dir.path().join(".env")).is_err());
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        for i in 0..12 {
            config.add_recent_root(PathBuf::from(format!("/notes/{i}")));
        }
        config.add_recent_root(PathBuf::from("/notes/3"));
        assert_eq!(config.recent_roots.len(), 10);
        assert_eq!(config.recent_roots[0], PathBuf::from("/notes/3"));
        assert_eq!(config.last_root, Some(PathBuf::from("/notes/3")));

        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
        assert_eq!(AppConfig::load_from(&dir.path().join("absent.json")).unwrap(), AppConfig::default());
    }
}
