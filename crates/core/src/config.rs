//! Environment-driven configuration, profiled the way every teacher binary
//! in this workspace loads its settings: `{PROFILE}_{KEY}` is tried first,
//! falling back to the unprefixed `{KEY}`, so one binary can serve several
//! named environments side by side.

use std::env;

use serde::{Deserialize, Serialize};

/// Load a `.env` file if present (silently ignored if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{profile}_{key}");
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn profiled_env_i32(profile: &str, key: &str, default: i32) -> i32 {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub object_store: ObjectStoreConfig,
    pub collector: CollectorConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &["PG_HOST", "S3_BUCKET", "AWS_ACCESS_KEY_ID"];

impl Config {
    /// Build config from environment variables (call [`load_dotenv`] first).
    /// Profile is read from `COLLECTOR_PROFILE`.
    pub fn from_env() -> Self {
        let profile = env_or("COLLECTOR_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            object_store: ObjectStoreConfig::from_env_profiled(p),
            collector: CollectorConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for
    /// `{PREFIX}_{MARKER_KEY}` patterns. Always includes "default".
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{marker}")) {
                    if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:    host={}, port={}", self.server.host, self.server.port);
        tracing::info!("  postgres:  host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!(
            "  object store: backend={}",
            if self.object_store.is_s3_configured() { "s3" } else { "local" }
        );
        tracing::info!(
            "  collector: finalizer_interval={}s, cleanup_interval={}s, retention={}d",
            self.collector.finalizer_interval_secs,
            self.collector.cleanup_interval_secs,
            self.collector.retention_period_days,
        );
    }

    /// Redacted view safe for API responses (no credentials).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
            },
            "object_store": {
                "backend": if self.object_store.is_s3_configured() { "s3" } else { "local" },
                "bucket": self.object_store.s3_bucket,
            },
            "collector": {
                "cache_update_interval_secs": self.collector.cache_update_interval_secs,
                "finalizer_interval_secs": self.collector.finalizer_interval_secs,
                "finalizer_concurrency": self.collector.finalizer_concurrency,
                "finalizer_max_collections": self.collector.finalizer_max_collections,
                "cleanup_interval_secs": self.collector.cleanup_interval_secs,
                "retention_period_days": self.collector.retention_period_days,
                "max_requests_per_collection": self.collector.max_requests_per_collection,
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8080),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "collector"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Object store (local filesystem or S3-compatible) ───────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub local_dir: std::path::PathBuf,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub endpoint_url: Option<String>,
    /// Minimum 5 MiB per the object-store multipart-upload contract.
    pub write_chunk_size_bytes: u64,
    pub read_chunk_size_bytes: u64,
}

impl ObjectStoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            local_dir: std::path::PathBuf::from(profiled_env_or(p, "OBJECT_STORE_DIR", "data/archives")),
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            s3_bucket: profiled_env_opt(p, "S3_BUCKET"),
            s3_prefix: profiled_env_opt(p, "S3_PREFIX"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
            write_chunk_size_bytes: profiled_env_u64(p, "WRITE_CHUNK_SIZE_BYTES", 5 * 1024 * 1024),
            read_chunk_size_bytes: profiled_env_u64(p, "READ_CHUNK_SIZE_BYTES", 1024 * 1024),
        }
    }

    pub fn is_s3_configured(&self) -> bool {
        self.access_key_id.is_some() && self.s3_bucket.is_some()
    }
}

// ── Collection engine tuning ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub cache_update_interval_secs: u64,
    pub cache_update_interval_jitter_secs: u64,
    pub finalizer_interval_secs: u64,
    pub finalizer_interval_jitter_secs: u64,
    pub finalizer_concurrency: usize,
    pub finalizer_max_collections: usize,
    pub finalizer_result_batch_size: usize,
    pub cleanup_interval_secs: u64,
    pub cleanup_interval_jitter_secs: u64,
    pub retention_period_days: u32,
    pub max_requests_per_collection: i32,
}

impl CollectorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            cache_update_interval_secs: profiled_env_u64(p, "CACHE_UPDATE_INTERVAL_SECS", 5),
            cache_update_interval_jitter_secs: profiled_env_u64(p, "CACHE_UPDATE_INTERVAL_JITTER_SECS", 2),
            finalizer_interval_secs: profiled_env_u64(p, "FINALIZER_INTERVAL_SECS", 10),
            finalizer_interval_jitter_secs: profiled_env_u64(p, "FINALIZER_INTERVAL_JITTER_SECS", 3),
            finalizer_concurrency: profiled_env_u32(p, "FINALIZER_CONCURRENCY", 4) as usize,
            finalizer_max_collections: profiled_env_u32(p, "FINALIZER_MAX_COLLECTIONS", 100) as usize,
            finalizer_result_batch_size: profiled_env_u32(p, "FINALIZER_RESULT_BATCH_SIZE", 500) as usize,
            cleanup_interval_secs: profiled_env_u64(p, "CLEANUP_INTERVAL_SECS", 300),
            cleanup_interval_jitter_secs: profiled_env_u64(p, "CLEANUP_INTERVAL_JITTER_SECS", 60),
            retention_period_days: profiled_env_u32(p, "RETENTION_PERIOD_DAYS", 30),
            max_requests_per_collection: profiled_env_i32(p, "MAX_REQUESTS_PER_COLLECTION", 100_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiled_lookup_prefers_prefixed_over_unprefixed() {
        std::env::set_var("SOME_KEY_TEST_B", "unprefixed");
        std::env::set_var("PROF_SOME_KEY_TEST_B", "prefixed");
        assert_eq!(profiled_env_or("PROF", "SOME_KEY_TEST_B", "default"), "prefixed");
        assert_eq!(profiled_env_or("OTHER", "SOME_KEY_TEST_B", "default"), "unprefixed");
        std::env::remove_var("SOME_KEY_TEST_B");
        std::env::remove_var("PROF_SOME_KEY_TEST_B");
    }

    #[test]
    fn object_store_not_s3_configured_without_credentials() {
        let cfg = ObjectStoreConfig::from_env_profiled("NONEXISTENT_PROFILE_XYZ");
        assert!(!cfg.is_s3_configured());
    }
}
