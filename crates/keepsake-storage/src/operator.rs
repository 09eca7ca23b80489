//! OpenDAL Operator factory for keepsake blob backends

use anyhow::{Context, Result};
use keepsake_core::config::{expand_tilde, StorageBackend, StorageConfig};
use opendal::Operator;

/// Credentials for the S3 backend. Unused by fs and memory.
#[derive(Clone, Default)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

fn layered(op: Operator) -> Operator {
    op.layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
}

/// Build an in-process operator. Contents are lost when it is dropped.
pub fn build_memory_operator() -> Result<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish();
    Ok(layered(op))
}

fn build_fs_operator(cfg: &StorageConfig) -> Result<Operator> {
    let root = expand_tilde(&cfg.root);
    let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
    let op = Operator::new(builder)
        .with_context(|| format!("creating OpenDAL fs operator at {}", root.display()))?
        .finish();
    Ok(layered(op))
}

/// S3-compatible endpoint with path-style addressing (the opendal default).
fn build_s3_operator(cfg: &StorageConfig, creds: &S3Credentials) -> Result<Operator> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                cfg.endpoint
            );
        }
        tracing::warn!(
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(&creds.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .finish();
    Ok(layered(op))
}

/// Build the operator selected by `storage.backend`.
///
/// For S3, an `http://` endpoint is refused when `enforce_tls` is set and
/// warned about otherwise.
pub fn build_from_core_config(cfg: &StorageConfig, creds: &S3Credentials) -> Result<Operator> {
    tracing::debug!(backend = ?cfg.backend, "building storage operator");
    match cfg.backend {
        StorageBackend::Fs => build_fs_operator(cfg),
        StorageBackend::Memory => build_memory_operator(),
        StorageBackend::S3 => build_s3_operator(cfg, creds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3(endpoint: &str, enforce_tls: bool) -> StorageConfig {
        StorageConfig {
            backend: StorageBackend::S3,
            endpoint: endpoint.into(),
            enforce_tls,
            ..Default::default()
        }
    }

    fn creds() -> S3Credentials {
        S3Credentials {
            access_key_id: "test-key".into(),
            secret_access_key: "test-secret".into(),
        }
    }

    #[test]
    fn test_build_s3_http_warning() {
        // HTTP endpoint with enforce_tls=false should succeed (but log warning)
        let result = build_from_core_config(&s3("http://localhost:8333", false), &creds());
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_s3_http_enforce_tls() {
        let result = build_from_core_config(&s3("http://insecure:8333", true), &creds());
        assert!(result.is_err(), "HTTP + enforce_tls must fail");
        assert!(
            result.unwrap_err().to_string().contains("enforce_tls"),
            "error message should mention enforce_tls"
        );
    }

    #[test]
    fn test_build_s3_https() {
        let result = build_from_core_config(&s3("https://s3.example.com", true), &creds());
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_fs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            backend: StorageBackend::Fs,
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(build_from_core_config(&cfg, &S3Credentials::default()).is_ok());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let rendered = format!("{:?}", creds());
        assert!(rendered.contains("test-key"));
        assert!(!rendered.contains("test-secret"));
    }
}
