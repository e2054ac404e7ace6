//! Metadata store contract
//!
//! The metadata store records which addresses exist, their kind, info and
//! user properties. It never cascades: recursive operations walk the tree
//! themselves through [`MetaStore::get_children`].

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use vospace_storage::{NodeAddress, NodeInfo};

/// User-defined node properties
pub type Properties = BTreeMap<String, String>;

/// Region name to region endpoint, kept by distributed stores
pub type Regions = BTreeMap<String, String>;

/// Node kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Container,
    Data,
    StructuredData,
}

impl NodeKind {
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Container)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Container => "ContainerNode",
            NodeKind::Data => "DataNode",
            NodeKind::StructuredData => "StructuredDataNode",
        };
        f.write_str(name)
    }
}

/// One stored node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub address: NodeAddress,
    pub kind: NodeKind,
    pub info: NodeInfo,
}

/// A page of child records plus the number of matches before paging
#[derive(Clone, Debug, Default)]
pub struct NodesList {
    pub nodes: Vec<NodeRecord>,
    pub total: usize,
}

/// Persistence of node existence, info, properties and soft-delete flags
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Existence check
    async fn is_stored(&self, address: &NodeAddress) -> Result<bool>;

    /// Create the record of a node, or replace kind and info of an existing one
    async fn store_node(&self, address: &NodeAddress, kind: NodeKind, info: &NodeInfo)
        -> Result<()>;

    async fn get_node(&self, address: &NodeAddress) -> Result<Option<NodeRecord>>;

    /// Upsert the info of a node; new records are data nodes
    async fn store_info(&self, address: &NodeAddress, info: &NodeInfo) -> Result<()>;

    async fn get_user_properties(&self, address: &NodeAddress) -> Result<Properties>;

    /// Merge `properties` into the stored set; an empty value removes the key
    async fn update_user_properties(
        &self,
        address: &NodeAddress,
        properties: &Properties,
    ) -> Result<()>;

    /// Children of `address` in a stable order. `count = None` returns
    /// everything from `start`.
    async fn get_children(
        &self,
        address: &NodeAddress,
        recursive: bool,
        include_deleted: bool,
        start: usize,
        count: Option<usize>,
    ) -> Result<NodesList>;

    /// Toggle the soft-delete flag of exactly this node
    async fn mark_removed(&self, address: &NodeAddress, is_removed: bool) -> Result<()>;

    async fn set_kind(&self, address: &NodeAddress, kind: NodeKind) -> Result<()>;

    /// Delete the record of exactly this node
    async fn remove(&self, address: &NodeAddress) -> Result<()>;

    /// Addresses below `root` whose name contains `query`
    async fn search(
        &self,
        root: &NodeAddress,
        query: &str,
        limit: usize,
        include_deleted: bool,
    ) -> Result<Vec<NodeAddress>>;

    /// Region extension, present only on distributed stores
    fn as_distributed(&self) -> Option<&dyn DistributedMetaStore> {
        None
    }
}

/// Region metadata of distributed stores
#[async_trait]
pub trait DistributedMetaStore: Send + Sync {
    async fn get_regions(&self, address: &NodeAddress) -> Result<Regions>;

    async fn set_regions(&self, address: &NodeAddress, regions: &Regions) -> Result<()>;
}
