//! Node model
//!
//! A [`Node`] is either a [`ContainerNode`] or a [`DataNode`]. Both wrap the
//! same core state (address, kind, info) and reach the metadata store,
//! the storage backend and the event publisher through a [`NodeFactory`].
//!
//! Nodes do not hold their children. Every recursive operation asks the
//! metadata store for the children of the node at the time it runs.

mod container;
mod data;

pub use container::ContainerNode;
pub use data::DataNode;

use crate::events::{EventPublisher, NodeEvent};
use crate::export::{Detail, ExportFormat, ExportOutput};
use crate::metastore::{MetaStore, NodeKind, NodeRecord, Properties};
use crate::{Result, VoError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::debug;
use vospace_storage::{
    ByteStream, NodeAddress, NodeInfo, NodePath, StorageBackend, DIRECTORY_CONTENT_TYPE,
};

/// Resolves addresses to nodes and hands them their collaborators
#[derive(Clone)]
pub struct NodeFactory {
    metastore: Arc<dyn MetaStore>,
    storage: Arc<dyn StorageBackend>,
    events: EventPublisher,
}

impl NodeFactory {
    pub fn new(
        metastore: Arc<dyn MetaStore>,
        storage: Arc<dyn StorageBackend>,
        events: EventPublisher,
    ) -> Self {
        Self {
            metastore,
            storage,
            events,
        }
    }

    pub fn metastore(&self) -> &dyn MetaStore {
        self.metastore.as_ref()
    }

    pub fn storage(&self) -> &dyn StorageBackend {
        self.storage.as_ref()
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// The stored node at `address`
    pub async fn get_node(&self, address: &NodeAddress) -> Result<Node> {
        let record = self
            .metastore
            .get_node(address)
            .await?
            .ok_or_else(VoError::node_not_found)?;
        let mut node = self.node_from_record(record);
        // keep the caller's view of the path (app container flag)
        node.core_mut().address = address.clone();
        Ok(node)
    }

    /// A handle for a node that is not stored yet
    pub fn new_node(&self, address: NodeAddress, owner: &str, kind: NodeKind) -> Node {
        let mut info = NodeInfo::new(owner);
        if kind.is_container() {
            info.content_type = DIRECTORY_CONTENT_TYPE.to_string();
        }
        self.node_from_record(NodeRecord {
            address,
            kind,
            info,
        })
    }

    /// Create a node and store its backend and metadata records
    pub async fn create_node(&self, address: NodeAddress, owner: &str, kind: NodeKind) -> Result<Node> {
        let mut node = self.new_node(address, owner, kind);
        node.set_node().await?;
        Ok(node)
    }

    pub fn node_from_record(&self, record: NodeRecord) -> Node {
        let core = NodeCore {
            address: record.address,
            kind: record.kind,
            info: record.info,
            factory: self.clone(),
        };
        if core.kind.is_container() {
            Node::Container(ContainerNode::new(core))
        } else {
            Node::Data(DataNode::new(core))
        }
    }
}

/// State shared by both node kinds
#[derive(Clone)]
pub(crate) struct NodeCore {
    address: NodeAddress,
    kind: NodeKind,
    info: NodeInfo,
    factory: NodeFactory,
}

impl NodeCore {
    fn path(&self) -> &NodePath {
        self.address.path()
    }

    fn metastore(&self) -> &dyn MetaStore {
        self.factory.metastore()
    }

    fn storage(&self) -> &dyn StorageBackend {
        self.factory.storage()
    }

    async fn is_stored(&self) -> Result<bool> {
        self.metastore().is_stored(&self.address).await
    }

    async fn ensure_stored(&self) -> Result<()> {
        if self.is_stored().await? {
            Ok(())
        } else {
            Err(VoError::node_not_found())
        }
    }

    /// Create the backend side of the node, refresh its info and store the
    /// metadata record
    async fn set_node(&mut self) -> Result<()> {
        if self.kind.is_container() {
            self.storage().create_container(self.path()).await?;
        }
        self.update_info().await?;
        self.factory
            .metastore()
            .store_node(&self.address, self.kind, &self.info)
            .await
    }

    /// Size and content type from the backend; containers keep the
    /// directory type
    async fn update_info(&mut self) -> Result<()> {
        self.factory
            .storage
            .update_node_info(self.address.path(), &mut self.info)
            .await?;
        if self.kind.is_container() {
            self.info.content_type = DIRECTORY_CONTENT_TYPE.to_string();
        }
        Ok(())
    }

    async fn refresh_info(&mut self) -> Result<()> {
        self.update_info().await?;
        self.factory
            .metastore()
            .store_info(&self.address, &self.info)
            .await
    }

    /// Refresh after a content change and bump the revision
    async fn content_changed(&mut self) -> Result<()> {
        self.update_info().await?;
        self.info.touch();
        self.factory
            .metastore()
            .store_info(&self.address, &self.info)
            .await
    }

    /// Fail unless this node is stored and `target` is free
    async fn check_copy(&self, target: &NodeAddress) -> Result<()> {
        self.ensure_stored().await?;
        if self.metastore().is_stored(target).await? {
            return Err(VoError::Forbidden("DestinationNodeExists".to_string()));
        }
        Ok(())
    }

    /// Store a node of the same kind at `target` with this node's properties
    async fn copy_record(&self, target: &NodeAddress) -> Result<()> {
        let mut copy = NodeCore {
            address: target.clone(),
            kind: self.kind,
            info: NodeInfo::new(self.info.owner.clone()),
            factory: self.factory.clone(),
        };
        if self.kind.is_container() {
            copy.info.content_type = DIRECTORY_CONTENT_TYPE.to_string();
        }
        copy.set_node().await?;

        let properties = self.metastore().get_user_properties(&self.address).await?;
        if !properties.is_empty() {
            self.metastore()
                .update_user_properties(target, &properties)
                .await?;
        }
        if self.info.deleted {
            self.metastore().mark_removed(target, true).await?;
        }
        debug!(from = %self.address, to = %target, "copied node record");
        Ok(())
    }

    async fn publish(&self, address: &NodeAddress) {
        self.factory
            .events()
            .publish(&NodeEvent::for_node(address, &self.info.owner))
            .await;
    }
}

/// A stored (or about to be stored) node
#[derive(Clone)]
pub enum Node {
    Container(ContainerNode),
    Data(DataNode),
}

impl Node {
    fn core(&self) -> &NodeCore {
        match self {
            Node::Container(c) => &c.core,
            Node::Data(d) => &d.core,
        }
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        match self {
            Node::Container(c) => &mut c.core,
            Node::Data(d) => &mut d.core,
        }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.core().address
    }

    pub fn path(&self) -> &NodePath {
        self.core().path()
    }

    pub fn kind(&self) -> NodeKind {
        self.core().kind
    }

    pub fn info(&self) -> &NodeInfo {
        &self.core().info
    }

    pub fn owner(&self) -> &str {
        &self.core().info.owner
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Node::Container(_))
    }

    pub fn as_container(&self) -> Option<&ContainerNode> {
        match self {
            Node::Container(c) => Some(c),
            Node::Data(_) => None,
        }
    }

    pub fn as_data_mut(&mut self) -> Option<&mut DataNode> {
        match self {
            Node::Data(d) => Some(d),
            Node::Container(_) => None,
        }
    }

    /// The node as a container, or BadRequest
    pub fn into_container(self) -> Result<ContainerNode> {
        match self {
            Node::Container(c) => Ok(c),
            Node::Data(d) => Err(VoError::BadRequest(format!(
                "{} is not a container",
                d.core.address
            ))),
        }
    }

    pub async fn is_stored(&self) -> Result<bool> {
        self.core().is_stored().await
    }

    /// Store the backend side and the metadata record of this node
    pub async fn set_node(&mut self) -> Result<()> {
        self.core_mut().set_node().await
    }

    /// Recompute size and content type from the backend
    pub async fn refresh_info(&mut self) -> Result<()> {
        self.core_mut().refresh_info().await
    }

    pub async fn properties(&self) -> Result<Properties> {
        let core = self.core();
        core.metastore().get_user_properties(&core.address).await
    }

    pub async fn update_properties(&self, properties: &Properties) -> Result<()> {
        let core = self.core();
        core.metastore()
            .update_user_properties(&core.address, properties)
            .await
    }

    /// Copy (or move, when `keep_bytes` is false) this node to `new_address`
    pub fn copy<'a>(&'a self, new_address: &'a NodeAddress, keep_bytes: bool) -> BoxFuture<'a, Result<()>> {
        match self {
            Node::Container(c) => c.copy(new_address, keep_bytes).boxed(),
            Node::Data(d) => d.copy(new_address, keep_bytes).boxed(),
        }
    }

    /// Soft delete (`true`) or restore (`false`)
    pub fn mark_removed(&self, is_removed: bool) -> BoxFuture<'_, Result<()>> {
        match self {
            Node::Container(c) => c.mark_removed(is_removed).boxed(),
            Node::Data(d) => d.mark_removed(is_removed).boxed(),
        }
    }

    /// Hard removal of the node and everything below it
    pub fn remove(&self) -> BoxFuture<'_, Result<()>> {
        match self {
            Node::Container(c) => c.remove().boxed(),
            Node::Data(d) => d.remove().boxed(),
        }
    }

    pub async fn export(
        &self,
        format: ExportFormat,
        detail: Detail,
        include_deleted: bool,
    ) -> Result<ExportOutput> {
        match self {
            Node::Container(c) => c.export(format, detail, include_deleted).await,
            Node::Data(d) => d.export(format, detail, include_deleted).await,
        }
    }

    /// Node content: the object bytes of a data node, a tar archive of the
    /// subtree for a container
    pub async fn export_data(&self) -> Result<ByteStream> {
        match self {
            Node::Container(c) => Ok(c.export_data()),
            Node::Data(d) => d.export_data().await,
        }
    }

    pub async fn make_structured(&mut self, is_structured: bool) -> Result<()> {
        match self {
            Node::Container(c) => c.make_structured(is_structured),
            Node::Data(d) => d.make_structured(is_structured).await,
        }
    }
}
