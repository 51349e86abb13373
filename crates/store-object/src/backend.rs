//! Selects between a local filesystem backend and S3 based on which
//! credentials are present in configuration, the same config-driven
//! selection the wider workspace's storage layer uses elsewhere.

use std::sync::Arc;

use collector_core::ObjectStoreConfig;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;

use crate::error::StoreObjectError;

/// Builds the configured [`ObjectStore`] and the key prefix archives are
/// written under.
pub fn build_store(config: &ObjectStoreConfig) -> Result<(Arc<dyn ObjectStore>, String), StoreObjectError> {
    if config.is_s3_configured() {
        let mut builder = AmazonS3Builder::new()
            .with_region(&config.region)
            .with_bucket_name(config.s3_bucket.as_deref().unwrap_or_default());
        if let Some(key) = &config.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(token) = &config.session_token {
            builder = builder.with_token(token);
        }
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.with_endpoint(endpoint);
        }
        let store = builder.build()?;
        Ok((Arc::new(store), config.s3_prefix.clone().unwrap_or_default()))
    } else {
        std::fs::create_dir_all(&config.local_dir)?;
        let store = LocalFileSystem::new_with_prefix(&config.local_dir)?;
        Ok((Arc::new(store), String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_backend_is_default_without_s3_credentials() {
        let config = ObjectStoreConfig {
            local_dir: std::env::temp_dir().join("collector-store-object-tests"),
            region: "us-east-1".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            s3_bucket: None,
            s3_prefix: None,
            endpoint_url: None,
            write_chunk_size_bytes: 5 * 1024 * 1024,
            read_chunk_size_bytes: 1024 * 1024,
        };
        assert!(!config.is_s3_configured());
        let (_store, prefix) = build_store(&config).unwrap();
        assert!(prefix.is_empty());
    }
}
