use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// JSON array of usage rows preloaded into the in-memory store.
    pub fixture_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
    /// When unset, `/api` routes are served without authentication.
    pub auth_bearer_token: Option<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    pub database: Option<DatabaseConfig>,
    pub http: HttpConfig,
    #[serde(default)]
    pub import: ImportConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path =
            env::var("STARLINK_CONFIG").unwrap_or_else(|_| "starlink-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.storage.kind == StoreKind::Postgres && cfg.database.is_none() {
            anyhow::bail!("storage.kind = \"postgres\" requires a [database] section");
        }
        if cfg.import.batch_size == 0 {
            anyhow::bail!("import.batch_size must be at least 1");
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [database]
            uri = "postgres://localhost/ops"
            max_connections = 4

            [http]
            bind_addr = "127.0.0.1:8080"
            auth_bearer_token = "s3cret"
            max_body_bytes = 2048

            [import]
            batch_size = 50
            max_retries = 1
            retry_backoff_ms = 10

            [metrics]
            bind_addr = "127.0.0.1:9090"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.storage.kind, StoreKind::Postgres);
        assert_eq!(cfg.database.unwrap().max_connections, 4);
        assert_eq!(cfg.http.auth_bearer_token.as_deref(), Some("s3cret"));
        assert_eq!(cfg.http.max_body_bytes, 2048);
        assert_eq!(cfg.import.batch_size, 50);
        assert_eq!(cfg.metrics.unwrap().bind_addr, "127.0.0.1:9090");
    }

    #[test]
    fn memory_store_needs_no_database() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [storage]
            kind = "memory"
            fixture_path = "fixtures/usage.json"

            [http]
            bind_addr = "127.0.0.1:8080"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.storage.kind, StoreKind::Memory);
        assert!(cfg.database.is_none());
        assert!(cfg.http.auth_bearer_token.is_none());
        assert_eq!(cfg.http.max_body_bytes, 1024 * 1024);
        assert_eq!(cfg.import.batch_size, 500);
    }

    #[test]
    fn postgres_store_without_database_is_rejected() {
        let err = AppConfig::from_toml_str(
            r#"
            [http]
            bind_addr = "127.0.0.1:8080"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[database]"));
    }
}
