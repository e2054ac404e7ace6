//! Node tree opened from configuration

use crate::config::VoSpaceConfig;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use vospace_core::events::drain_events;
use vospace_core::{
    BroadcastPool, ContainerNode, EventPublisher, MemoryMetaStore, Node, NodeEvent, NodeFactory,
};
use vospace_storage::{
    MemoryObjectClient, NodeAddress, ObjectStorage, StorageBackend, SwiftClient,
};

/// Factory plus the stores behind it
pub struct VoSpaceState {
    pub config: VoSpaceConfig,
    pub factory: NodeFactory,
    metastore: MemoryMetaStore,
    events: Option<broadcast::Receiver<bytes::Bytes>>,
}

impl VoSpaceState {
    /// Open the backend and metadata snapshot named by `config`
    pub async fn new(config: VoSpaceConfig) -> anyhow::Result<Self> {
        let storage: Arc<dyn StorageBackend> = if config.use_memory_store {
            warn!("Using in-memory object storage - data will NOT persist");
            Arc::new(ObjectStorage::with_config(
                MemoryObjectClient::new(),
                config.storage_config(),
            ))
        } else {
            let client = SwiftClient::new(config.swift_config())
                .context("failed to build Swift client")?;
            info!(url = %config.storage.storage_url, "using Swift object storage");
            Arc::new(ObjectStorage::with_config(client, config.storage_config()))
        };

        let metastore = match &config.metadata_snapshot {
            Some(path) => {
                let store = MemoryMetaStore::load_snapshot(path, config.distributed_metadata)
                    .await
                    .with_context(|| format!("failed to load {}", path.display()))?;
                debug!(path = %path.display(), records = store.len(), "loaded metadata snapshot");
                store
            }
            None if config.distributed_metadata => MemoryMetaStore::distributed(),
            None => MemoryMetaStore::new(),
        };

        Ok(Self::with_parts(config, storage, metastore))
    }

    /// Assemble a state from already opened stores
    pub fn with_parts(
        config: VoSpaceConfig,
        storage: Arc<dyn StorageBackend>,
        metastore: MemoryMetaStore,
    ) -> Self {
        let (publisher, events) = if config.events_enabled {
            let pool = BroadcastPool::default();
            let receiver = pool.subscribe(&config.exchange);
            (EventPublisher::new(Arc::new(pool), &config.exchange), Some(receiver))
        } else {
            (EventPublisher::disabled(), None)
        };

        let factory = NodeFactory::new(Arc::new(metastore.clone()), storage, publisher);
        Self {
            config,
            factory,
            metastore,
            events,
        }
    }

    pub fn address(&self, path: &str) -> anyhow::Result<NodeAddress> {
        self.config.address(path)
    }

    pub async fn node(&self, path: &str) -> anyhow::Result<Node> {
        let address = self.address(path)?;
        self.factory
            .get_node(&address)
            .await
            .with_context(|| format!("{}", address))
    }

    pub async fn container(&self, path: &str) -> anyhow::Result<ContainerNode> {
        Ok(self.node(path).await?.into_container()?)
    }

    pub fn metastore(&self) -> &MemoryMetaStore {
        &self.metastore
    }

    /// Events published since the last call
    pub fn take_events(&mut self) -> Vec<NodeEvent> {
        self.events.as_mut().map(drain_events).unwrap_or_default()
    }

    /// Write the metadata snapshot, if one is configured
    pub async fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.config.metadata_snapshot {
            self.metastore
                .save_snapshot(path)
                .await
                .with_context(|| format!("failed to save {}", path.display()))?;
        }
        Ok(())
    }
}
