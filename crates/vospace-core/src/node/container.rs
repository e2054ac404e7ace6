use super::{Node, NodeCore};
use crate::export::{archive, structured, xml, Detail, ExportFormat, ExportOutput};
use crate::metastore::{NodeKind, NodeRecord, NodesList, Regions};
use crate::{Result, VoError};
use serde_json::Value;
use tracing::{debug, instrument};
use vospace_storage::{ByteStream, NodeAddress, NodeInfo, NodePath};

/// A node that can hold children. First-level containers map to backend
/// containers; deeper ones only exist as a path prefix.
#[derive(Clone)]
pub struct ContainerNode {
    pub(super) core: NodeCore,
}

impl ContainerNode {
    pub(super) fn new(core: NodeCore) -> Self {
        Self { core }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.core.address
    }

    pub fn path(&self) -> &NodePath {
        self.core.path()
    }

    pub fn info(&self) -> &NodeInfo {
        &self.core.info
    }

    pub fn owner(&self) -> &str {
        &self.core.info.owner
    }

    /// One page of direct children
    pub async fn direct_children(
        &self,
        include_deleted: bool,
        start: usize,
        count: Option<usize>,
    ) -> Result<NodesList> {
        self.core
            .metastore()
            .get_children(self.address(), false, include_deleted, start, count)
            .await
    }

    /// All direct children as nodes, in metadata store order
    pub async fn child_nodes(&self, include_deleted: bool) -> Result<Vec<Node>> {
        let children = self.direct_children(include_deleted, 0, None).await?;
        Ok(children
            .nodes
            .into_iter()
            .map(|record| self.child_from_record(record))
            .collect())
    }

    fn child_from_record(&self, record: NodeRecord) -> Node {
        let mut node = self.core.factory.node_from_record(record);
        let path = node
            .path()
            .clone()
            .with_app_container(self.path().is_app_container());
        let address = node.address().with_path(path);
        node.core_mut().address = address;
        node
    }

    /// Copy the subtree to `new_address`. With `keep_bytes` false this is a
    /// move: children move one by one, then this record goes and a
    /// first-level backend container is deleted.
    ///
    /// The destination check and the creation are two separate steps.
    #[instrument(skip(self), fields(from = %self.core.address, to = %new_address))]
    pub async fn copy(&self, new_address: &NodeAddress, keep_bytes: bool) -> Result<()> {
        self.core.check_copy(new_address).await?;
        let target = new_address.path();
        if target == self.path() || target.is_descendant_of(self.path()) {
            return Err(VoError::Forbidden("Forbidden to copy into itself".to_string()));
        }

        self.core.copy_record(new_address).await?;

        // a move must not leave soft-deleted children behind
        for child in self.child_nodes(!keep_bytes).await? {
            let relative = child.path().relative_to(self.path())?;
            let child_target = new_address.append_path(&relative);
            debug!(child = %child.address(), to = %child_target, "copying child");
            child.copy(&child_target, keep_bytes).await?;
        }

        if !keep_bytes {
            self.core.metastore().remove(self.address()).await?;
            if self.path().is_first_level() {
                self.core.storage().remove(self.path(), false).await?;
            }
        }

        self.core.publish(new_address).await;
        if !keep_bytes {
            self.core.publish(self.address()).await;
        }
        Ok(())
    }

    /// Soft delete or restore the subtree, children first. Every child is
    /// visited whatever its current flag, so live nodes below a deleted
    /// child are reached too.
    #[instrument(skip(self), fields(address = %self.core.address))]
    pub async fn mark_removed(&self, is_removed: bool) -> Result<()> {
        self.core.ensure_stored().await?;

        for child in self.child_nodes(true).await? {
            child.mark_removed(is_removed).await?;
        }

        self.core
            .metastore()
            .mark_removed(self.address(), is_removed)
            .await?;
        self.core.publish(self.address()).await;
        Ok(())
    }

    /// Hard removal of the subtree: records are deleted and backend objects
    /// reclaimed including chunk segments
    #[instrument(skip(self), fields(address = %self.core.address))]
    pub async fn remove(&self) -> Result<()> {
        self.core.ensure_stored().await?;

        for child in self.child_nodes(true).await? {
            child.remove().await?;
        }

        self.core.metastore().remove(self.address()).await?;
        if !self.path().is_root() {
            self.core.storage().remove(self.path(), true).await?;
        }
        self.core.publish(self.address()).await;
        Ok(())
    }

    /// Write `data` to `filename` below this container. The child record is
    /// created only if it does not exist yet.
    #[instrument(skip(self, data), fields(address = %self.core.address))]
    pub async fn set_data(&self, filename: &str, data: ByteStream) -> Result<Node> {
        let relative = NodePath::parse(filename)?;
        if relative.is_root() {
            return Err(VoError::BadRequest("empty file name".to_string()));
        }
        let child_address = self.address().append_path(&relative);

        self.core
            .storage()
            .put_bytes(child_address.path(), data)
            .await?;

        match self.core.metastore().get_node(&child_address).await? {
            None => {
                self.core
                    .factory
                    .create_node(child_address, self.owner(), NodeKind::Data)
                    .await
            }
            Some(record) => {
                let mut node = self.child_from_record(record);
                node.core_mut().content_changed().await?;
                Ok(node)
            }
        }
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        include_deleted: bool,
    ) -> Result<Vec<NodeAddress>> {
        self.core
            .metastore()
            .search(self.address(), query, limit, include_deleted)
            .await
    }

    pub async fn get_node_regions(&self) -> Result<Regions> {
        match self.core.metastore().as_distributed() {
            Some(store) => store.get_regions(self.address()).await,
            None => Err(VoError::unsupported()),
        }
    }

    pub async fn set_node_regions(&self, regions: &Regions) -> Result<()> {
        match self.core.metastore().as_distributed() {
            Some(store) => store.set_regions(self.address(), regions).await,
            None => Err(VoError::unsupported()),
        }
    }

    /// Replication target of the backing container
    pub async fn get_node_sync_to(&self) -> Result<Option<String>> {
        Ok(self
            .core
            .storage()
            .get_sync_address(self.path().container_name())
            .await?)
    }

    pub async fn set_node_sync_to(&self, sync_to: &str, key: &str) -> Result<()> {
        Ok(self
            .core
            .storage()
            .set_sync_to(self.path().container_name(), sync_to, key)
            .await?)
    }

    pub fn make_structured(&self, _is_structured: bool) -> Result<()> {
        Err(VoError::Forbidden(
            "Can't change ContainerNode type to DataNode".to_string(),
        ))
    }

    pub async fn export(
        &self,
        format: ExportFormat,
        detail: Detail,
        include_deleted: bool,
    ) -> Result<ExportOutput> {
        self.export_page(format, detail, 0, None, include_deleted)
            .await
    }

    /// Export with a window over the children listed at maximum detail
    pub async fn export_page(
        &self,
        format: ExportFormat,
        detail: Detail,
        start: usize,
        count: Option<usize>,
        include_deleted: bool,
    ) -> Result<ExportOutput> {
        let children = if detail == Detail::Max {
            self.direct_children(include_deleted, start, count).await?
        } else {
            NodesList::default()
        };

        if !format.is_structured() {
            let properties = if detail >= Detail::Properties {
                self.core
                    .metastore()
                    .get_user_properties(self.address())
                    .await?
            } else {
                Default::default()
            };
            let doc = xml::node_document(
                self.address(),
                self.core.kind,
                self.info(),
                detail,
                &properties,
                &children.nodes,
            )?;
            return Ok(ExportOutput::Bytes(doc));
        }

        let mut entry =
            structured::entry(self.path(), self.core.kind, self.info(), include_deleted);
        if detail == Detail::Max {
            let app_container = self.path().is_app_container();
            let contents: Vec<Value> = children
                .nodes
                .iter()
                .map(|child| {
                    let path = child.address.path().clone().with_app_container(app_container);
                    Value::Object(structured::entry(&path, child.kind, &child.info, include_deleted))
                })
                .collect();
            entry.insert("items".into(), children.total.into());
            entry.insert("contents".into(), Value::Array(contents));
            structured::append_hash(&mut entry)?;
        }
        structured::render(entry, format)
    }

    /// Tar archive of the subtree, produced by a background task
    pub fn export_data(&self) -> ByteStream {
        archive::tar_stream(self.clone())
    }
}
