//! In-memory metadata store with JSON snapshots

use crate::metastore::{
    DistributedMetaStore, MetaStore, NodeKind, NodeRecord, NodesList, Properties, Regions,
};
use crate::{Result, VoError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};
use vospace_storage::{NodeAddress, NodeInfo};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredNode {
    record: NodeRecord,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    regions: Regions,
}

/// Metadata store keeping records ordered by address.
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryMetaStore {
    nodes: Arc<RwLock<BTreeMap<String, StoredNode>>>,
    distributed: bool,
}

fn key(address: &NodeAddress) -> String {
    address.to_string()
}

/// Key prefix shared by every descendant of `address`
fn child_prefix(address: &NodeAddress) -> String {
    let mut prefix = key(address);
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

fn not_found() -> VoError {
    VoError::node_not_found()
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that also offers the region extension
    pub fn distributed() -> Self {
        Self {
            distributed: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Write every record to `path` as JSON
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let nodes: Vec<StoredNode> = self.nodes.read().values().cloned().collect();
        let json = serde_json::to_vec_pretty(&nodes)?;
        tokio::fs::write(path.as_ref(), json).await?;
        debug!(path = %path.as_ref().display(), count = nodes.len(), "saved metadata snapshot");
        Ok(())
    }

    /// Load a snapshot written by [`Self::save_snapshot`]; a missing file
    /// yields an empty store
    pub async fn load_snapshot(path: impl AsRef<Path>, distributed: bool) -> Result<Self> {
        let store = Self {
            distributed,
            ..Self::default()
        };
        let data = match tokio::fs::read(path.as_ref()).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(e) => return Err(e.into()),
        };
        let nodes: Vec<StoredNode> = serde_json::from_slice(&data).map_err(|e| {
            VoError::InternalServerError(format!("Error reading metadata snapshot: {}", e))
        })?;
        {
            let mut map = store.nodes.write();
            for node in nodes {
                map.insert(key(&node.record.address), node);
            }
        }
        Ok(store)
    }

    fn with_node<T>(
        &self,
        address: &NodeAddress,
        f: impl FnOnce(&mut StoredNode) -> T,
    ) -> Result<T> {
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&key(address)).ok_or_else(not_found)?;
        Ok(f(node))
    }
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn is_stored(&self, address: &NodeAddress) -> Result<bool> {
        Ok(self.nodes.read().contains_key(&key(address)))
    }

    #[instrument(skip(self, info), fields(address = %address))]
    async fn store_node(
        &self,
        address: &NodeAddress,
        kind: NodeKind,
        info: &NodeInfo,
    ) -> Result<()> {
        let mut nodes = self.nodes.write();
        let record = NodeRecord {
            address: address.clone(),
            kind,
            info: info.clone(),
        };
        match nodes.get_mut(&key(address)) {
            Some(existing) => existing.record = record,
            None => {
                nodes.insert(
                    key(address),
                    StoredNode {
                        record,
                        properties: Properties::new(),
                        regions: Regions::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_node(&self, address: &NodeAddress) -> Result<Option<NodeRecord>> {
        Ok(self
            .nodes
            .read()
            .get(&key(address))
            .map(|node| node.record.clone()))
    }

    async fn store_info(&self, address: &NodeAddress, info: &NodeInfo) -> Result<()> {
        let mut nodes = self.nodes.write();
        nodes
            .entry(key(address))
            .and_modify(|node| node.record.info = info.clone())
            .or_insert_with(|| StoredNode {
                record: NodeRecord {
                    address: address.clone(),
                    kind: NodeKind::Data,
                    info: info.clone(),
                },
                properties: Properties::new(),
                regions: Regions::new(),
            });
        Ok(())
    }

    async fn get_user_properties(&self, address: &NodeAddress) -> Result<Properties> {
        self.nodes
            .read()
            .get(&key(address))
            .map(|node| node.properties.clone())
            .ok_or_else(not_found)
    }

    async fn update_user_properties(
        &self,
        address: &NodeAddress,
        properties: &Properties,
    ) -> Result<()> {
        self.with_node(address, |node| {
            for (name, value) in properties {
                if value.is_empty() {
                    node.properties.remove(name);
                } else {
                    node.properties.insert(name.clone(), value.clone());
                }
            }
        })
    }

    async fn get_children(
        &self,
        address: &NodeAddress,
        recursive: bool,
        include_deleted: bool,
        start: usize,
        count: Option<usize>,
    ) -> Result<NodesList> {
        let prefix = child_prefix(address);
        let depth = address.path().depth() + 1;
        let nodes = self.nodes.read();

        let matching: Vec<&NodeRecord> = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, node)| &node.record)
            .filter(|r| recursive || r.address.path().depth() == depth)
            .filter(|r| include_deleted || !r.info.deleted)
            .collect();

        Ok(NodesList {
            total: matching.len(),
            nodes: matching
                .into_iter()
                .skip(start)
                .take(count.unwrap_or(usize::MAX))
                .cloned()
                .collect(),
        })
    }

    async fn mark_removed(&self, address: &NodeAddress, is_removed: bool) -> Result<()> {
        self.with_node(address, |node| node.record.info.deleted = is_removed)
    }

    async fn set_kind(&self, address: &NodeAddress, kind: NodeKind) -> Result<()> {
        self.with_node(address, |node| node.record.kind = kind)
    }

    async fn remove(&self, address: &NodeAddress) -> Result<()> {
        self.nodes.write().remove(&key(address));
        Ok(())
    }

    async fn search(
        &self,
        root: &NodeAddress,
        query: &str,
        limit: usize,
        include_deleted: bool,
    ) -> Result<Vec<NodeAddress>> {
        let prefix = child_prefix(root);
        let query = query.to_lowercase();
        let nodes = self.nodes.read();

        Ok(nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, node)| &node.record)
            .filter(|r| include_deleted || !r.info.deleted)
            .filter(|r| r.address.path().node_name().to_lowercase().contains(&query))
            .take(limit)
            .map(|r| r.address.clone())
            .collect())
    }

    fn as_distributed(&self) -> Option<&dyn DistributedMetaStore> {
        if self.distributed {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl DistributedMetaStore for MemoryMetaStore {
    async fn get_regions(&self, address: &NodeAddress) -> Result<Regions> {
        self.nodes
            .read()
            .get(&key(address))
            .map(|node| node.regions.clone())
            .ok_or_else(not_found)
    }

    async fn set_regions(&self, address: &NodeAddress, regions: &Regions) -> Result<()> {
        self.with_node(address, |node| node.regions = regions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(path: &str) -> NodeAddress {
        NodeAddress::parse(&format!("vos://test!vospace{}", path)).unwrap()
    }

    async fn store_with(paths: &[&str]) -> MemoryMetaStore {
        let store = MemoryMetaStore::new();
        for p in paths {
            store
                .store_node(&addr(p), NodeKind::Data, &NodeInfo::new("alice"))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_direct_children_only() {
        let store = store_with(&["/A", "/A/b", "/A/b/c", "/A/d", "/AB", "/AB/x"]).await;

        let children = store.get_children(&addr("/A"), false, false, 0, None).await.unwrap();
        let names: Vec<String> = children.nodes.iter().map(|r| r.address.to_string()).collect();
        assert_eq!(
            names,
            vec!["vos://test!vospace/A/b", "vos://test!vospace/A/d"]
        );

        let all = store.get_children(&addr("/A"), true, false, 0, None).await.unwrap();
        assert_eq!(all.total, 3);
    }

    #[tokio::test]
    async fn test_root_children() {
        let store = store_with(&["/A", "/A/b", "/B"]).await;
        let root = NodeAddress::parse("vos://test!vospace/").unwrap();
        let children = store.get_children(&root, false, false, 0, None).await.unwrap();
        assert_eq!(children.total, 2);
    }

    #[tokio::test]
    async fn test_paging_is_stable() {
        let paths: Vec<String> = (0..10).map(|i| format!("/A/f{}", i)).collect();
        let mut all = vec!["/A"];
        all.extend(paths.iter().map(String::as_str));
        let store = store_with(&all).await;

        let mut seen = Vec::new();
        for start in (0..10).step_by(3) {
            let page = store
                .get_children(&addr("/A"), false, false, start, Some(3))
                .await
                .unwrap();
            assert_eq!(page.total, 10);
            seen.extend(page.nodes.into_iter().map(|r| r.address));
        }
        assert_eq!(seen.len(), 10);
        let mut sorted = seen.clone();
        sorted.sort_by_key(|a| a.to_string());
        assert_eq!(seen, sorted);
    }

    #[tokio::test]
    async fn test_mark_removed_does_not_cascade() {
        let store = store_with(&["/A", "/A/b"]).await;
        store.mark_removed(&addr("/A"), true).await.unwrap();

        assert!(store.get_node(&addr("/A")).await.unwrap().unwrap().info.deleted);
        assert!(!store.get_node(&addr("/A/b")).await.unwrap().unwrap().info.deleted);

        let root = NodeAddress::parse("vos://test!vospace/").unwrap();
        let visible = store.get_children(&root, false, false, 0, None).await.unwrap();
        assert_eq!(visible.total, 0);
        let with_deleted = store.get_children(&root, false, true, 0, None).await.unwrap();
        assert_eq!(with_deleted.total, 1);
    }

    #[tokio::test]
    async fn test_properties_merge() {
        let store = store_with(&["/A"]).await;
        let mut props = Properties::new();
        props.insert("color".into(), "red".into());
        props.insert("shape".into(), "round".into());
        store.update_user_properties(&addr("/A"), &props).await.unwrap();

        let mut update = Properties::new();
        update.insert("color".into(), String::new());
        update.insert("size".into(), "xl".into());
        store.update_user_properties(&addr("/A"), &update).await.unwrap();

        let stored = store.get_user_properties(&addr("/A")).await.unwrap();
        assert_eq!(stored.get("shape").map(String::as_str), Some("round"));
        assert_eq!(stored.get("size").map(String::as_str), Some("xl"));
        assert!(!stored.contains_key("color"));

        let missing = store.update_user_properties(&addr("/Z"), &update).await;
        assert!(matches!(missing, Err(VoError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_search_scoped_to_subtree() {
        let store = store_with(&["/A", "/A/report.txt", "/A/sub/Report2.txt", "/B/report.txt"]).await;
        let found = store.search(&addr("/A"), "REPORT", 10, false).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|a| a.path().container_name() == "A"));

        let limited = store.search(&addr("/A"), "report", 1, false).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_regions_need_distributed_store() {
        let plain = store_with(&["/A"]).await;
        assert!(plain.as_distributed().is_none());

        let store = MemoryMetaStore::distributed();
        store
            .store_node(&addr("/A"), NodeKind::Container, &NodeInfo::new("alice"))
            .await
            .unwrap();
        let regions: Regions = [("eu".to_string(), "https://eu.example/v1".to_string())].into();
        let dist = store.as_distributed().unwrap();
        dist.set_regions(&addr("/A"), &regions).await.unwrap();
        assert_eq!(dist.get_regions(&addr("/A")).await.unwrap(), regions);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("meta.json");

        let store = store_with(&["/A", "/A/b"]).await;
        let mut props = Properties::new();
        props.insert("k".into(), "v".into());
        store.update_user_properties(&addr("/A/b"), &props).await.unwrap();
        store.save_snapshot(&file).await.unwrap();

        let loaded = MemoryMetaStore::load_snapshot(&file, false).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get_user_properties(&addr("/A/b")).await.unwrap(), props);

        let empty = MemoryMetaStore::load_snapshot(dir.path().join("none.json"), false)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }
}
