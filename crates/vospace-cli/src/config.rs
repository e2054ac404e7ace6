//! Command-line configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vospace_core::DEFAULT_EXCHANGE;
use vospace_storage::{
    NodeAddress, NodePath, StorageConfig, SwiftConfig, DEFAULT_CHUNKED_CONTAINER,
    DEFAULT_PAGE_SIZE,
};

/// Environment prefix, e.g. `VOSPACE__STORAGE__AUTH_TOKEN`
pub const ENV_PREFIX: &str = "VOSPACE";

/// Object storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Swift storage URL including the account
    pub storage_url: String,
    /// X-Auth-Token sent with every request
    pub auth_token: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Idle connections kept per host
    pub max_connections_per_host: usize,
    /// Objects requested per listing page
    pub page_size: usize,
    /// Container holding chunked-upload segments
    pub chunked_container: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let swift = SwiftConfig::default();
        Self {
            storage_url: swift.storage_url,
            auth_token: swift.auth_token,
            timeout_secs: swift.timeout.as_secs(),
            max_connections_per_host: swift.max_connections_per_host,
            page_size: DEFAULT_PAGE_SIZE,
            chunked_container: DEFAULT_CHUNKED_CONTAINER.to_string(),
        }
    }
}

/// Everything the `vospace` binary needs to open a node tree
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VoSpaceConfig {
    /// Authority part of node addresses
    pub authority: String,
    /// Default owner for created nodes
    pub owner: String,
    /// Object storage
    pub storage: StorageSettings,
    /// Use in-memory object storage (nothing persists)
    pub use_memory_store: bool,
    /// Metadata snapshot file, loaded on start and saved after changes
    pub metadata_snapshot: Option<PathBuf>,
    /// Offer the region extension of the metadata store
    pub distributed_metadata: bool,
    /// Publish node change events
    pub events_enabled: bool,
    /// Fanout exchange for node change events
    pub exchange: String,
}

impl Default for VoSpaceConfig {
    fn default() -> Self {
        Self {
            authority: "localhost!vospace".to_string(),
            owner: "anonymous".to_string(),
            storage: StorageSettings::default(),
            use_memory_store: false,
            metadata_snapshot: None,
            distributed_metadata: false,
            events_enabled: true,
            exchange: DEFAULT_EXCHANGE.to_string(),
        }
    }
}

impl VoSpaceConfig {
    /// Defaults, then `file` (if any), then `VOSPACE__*` variables
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .context("invalid configuration")
    }

    pub fn swift_config(&self) -> SwiftConfig {
        SwiftConfig::new(&self.storage.storage_url, &self.storage.auth_token)
            .with_timeout(Duration::from_secs(self.storage.timeout_secs))
            .with_max_connections(self.storage.max_connections_per_host)
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            page_size: self.storage.page_size,
            chunked_container: self.storage.chunked_container.clone(),
        }
    }

    /// Address of `path` under the configured authority
    pub fn address(&self, path: &str) -> anyhow::Result<NodeAddress> {
        let path = NodePath::parse(path).with_context(|| format!("invalid path {}", path))?;
        Ok(NodeAddress::new(&self.authority, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = VoSpaceConfig::default();
        assert_eq!(config.storage.page_size, 1000);
        assert_eq!(config.storage.chunked_container, "chunked");
        assert_eq!(config.storage.timeout_secs, 600);
        assert_eq!(config.exchange, "vospace.exchange.nodechanged");
        assert!(config.metadata_snapshot.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vospace.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
authority = "edu.jhu!vospace"
use_memory_store = true

[storage]
page_size = 250
auth_token = "secret"
"#
        )
        .unwrap();

        let config = VoSpaceConfig::load(Some(&path)).unwrap();
        assert_eq!(config.authority, "edu.jhu!vospace");
        assert!(config.use_memory_store);
        assert_eq!(config.storage.page_size, 250);
        assert_eq!(config.storage.auth_token, "secret");
        assert_eq!(config.storage.chunked_container, "chunked");

        let swift = config.swift_config();
        assert_eq!(swift.auth_token, "secret");
        assert_eq!(swift.timeout, Duration::from_secs(600));
        assert_eq!(config.storage_config().page_size, 250);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VoSpaceConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_address_uses_authority() {
        let config = VoSpaceConfig {
            authority: "edu.jhu!vospace".into(),
            ..Default::default()
        };
        let address = config.address("/photos/a.jpg").unwrap();
        assert_eq!(address.to_string(), "vos://edu.jhu!vospace/photos/a.jpg");
    }
}
