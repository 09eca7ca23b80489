use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KeepsakeError, KeepsakeResult};

/// Top-level configuration (loaded from keepsake.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepsakeConfig {
    pub log: LogConfig,
    pub kdf: KdfConfig,
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub release: ReleaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Owner passphrase stretching.
///
/// Only the passphrase KDF is tunable. The release-token KDF is fixed, since a
/// trustee holding nothing but the token has to reproduce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// PBKDF2-HMAC-SHA256 iterations (default: 100000)
    pub iterations: u32,
}

/// Which OpenDAL service holds ciphertext blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    Memory,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Refuse plaintext HTTP endpoints for the s3 backend
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON ledger holding the user record, items, and bundles
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// How long a released bundle stays fetchable after its first fetch
    pub access_window_hours: u64,
    /// Minimum passphrase length accepted at enrollment
    pub min_passphrase_len: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self { iterations: 100_000 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            root: PathBuf::from("~/.local/share/keepsake/blobs"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "keepsake".into(),
            enforce_tls: false,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/keepsake/ledger.json"),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            access_window_hours: 24,
            min_passphrase_len: 8,
        }
    }
}

impl ReleaseConfig {
    pub fn access_window_secs(&self) -> u64 {
        self.access_window_hours.saturating_mul(3600)
    }
}

impl KeepsakeConfig {
    /// Load from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> KeepsakeResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| KeepsakeError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> KeepsakeResult<()> {
        if self.kdf.iterations == 0 {
            return Err(KeepsakeError::Config("kdf.iterations must be > 0".into()));
        }
        if !matches!(self.log.format.as_str(), "json" | "text") {
            return Err(KeepsakeError::Config(format!(
                "log.format must be \"json\" or \"text\", got {:?}",
                self.log.format
            )));
        }
        Ok(())
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[kdf]
iterations = 250000

[storage]
backend = "s3"
endpoint = "https://s3.example.com"
region = "eu-west-1"
bucket = "memories"
enforce_tls = true

[ledger]
path = "/var/lib/keepsake/ledger.json"

[release]
access_window_hours = 48
min_passphrase_len = 12
"#;
        let config: KeepsakeConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.kdf.iterations, 250_000);
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.bucket, "memories");
        assert!(config.storage.enforce_tls);
        assert_eq!(
            config.ledger.path,
            PathBuf::from("/var/lib/keepsake/ledger.json")
        );
        assert_eq!(config.release.access_window_secs(), 48 * 3600);
        assert_eq!(config.release.min_passphrase_len, 12);
    }

    #[test]
    fn test_parse_defaults() {
        let config: KeepsakeConfig = toml::from_str("").unwrap();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.kdf.iterations, 100_000);
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.release.access_window_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[storage]
backend = "memory"
"#;
        let config: KeepsakeConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.kdf.iterations, 100_000);
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut config = KeepsakeConfig::default();
        config.kdf.iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = KeepsakeConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.kdf.iterations, 100_000);
    }

    #[test]
    fn test_load_rejects_bad_log_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keepsake.toml");
        std::fs::write(&path, "[log]\nformat = \"xml\"\n").unwrap();

        let err = KeepsakeConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("log.format"));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = KeepsakeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: KeepsakeConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.ledger.path, parsed.ledger.path);
        assert_eq!(config.storage.backend, parsed.storage.backend);
    }

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_tilde(Path::new("~/vault/ledger.json")),
            PathBuf::from("/home/tester/vault/ledger.json")
        );
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
