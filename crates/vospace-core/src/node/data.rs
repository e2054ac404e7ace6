use super::NodeCore;
use crate::export::{structured, xml, Detail, ExportFormat, ExportOutput};
use crate::metastore::NodeKind;
use crate::{Result, VoError};
use tracing::{debug, instrument};
use vospace_storage::{ByteStream, NodeAddress, NodeInfo, NodePath};

/// A leaf node whose content is one backend object
#[derive(Clone)]
pub struct DataNode {
    pub(super) core: NodeCore,
}

impl DataNode {
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

    pub fn is_structured(&self) -> bool {
        self.core.kind == NodeKind::StructuredData
    }

    /// Copy the object and its record to `new_address`; with `keep_bytes`
    /// false the source object and record are removed afterwards
    #[instrument(skip(self), fields(from = %self.core.address, to = %new_address))]
    pub async fn copy(&self, new_address: &NodeAddress, keep_bytes: bool) -> Result<()> {
        self.core.check_copy(new_address).await?;

        self.core
            .storage()
            .copy_bytes(self.path(), new_address.path(), keep_bytes)
            .await?;
        self.core.copy_record(new_address).await?;

        if !keep_bytes {
            self.core.metastore().remove(self.address()).await?;
        }
        Ok(())
    }

    pub async fn mark_removed(&self, is_removed: bool) -> Result<()> {
        self.core.ensure_stored().await?;
        self.core
            .metastore()
            .mark_removed(self.address(), is_removed)
            .await
    }

    /// Delete the object, its segments and its record
    #[instrument(skip(self), fields(address = %self.core.address))]
    pub async fn remove(&self) -> Result<()> {
        self.core.ensure_stored().await?;
        self.core.storage().remove(self.path(), true).await?;
        self.core.metastore().remove(self.address()).await
    }

    /// Replace the content and record the change
    #[instrument(skip(self, data), fields(address = %self.core.address))]
    pub async fn set_data(&mut self, data: ByteStream) -> Result<()> {
        self.core.storage().put_bytes(self.path(), data).await?;
        self.finish_write().await
    }

    /// Point the content at an uploaded segment group
    #[instrument(skip(self), fields(address = %self.core.address))]
    pub async fn set_chunked_data(&mut self, chunk_id: &str) -> Result<()> {
        self.core
            .storage()
            .put_chunked_bytes(self.path(), chunk_id)
            .await?;
        self.finish_write().await
    }

    async fn finish_write(&mut self) -> Result<()> {
        if self.core.is_stored().await? {
            self.core.content_changed().await
        } else {
            debug!("storing record for new data node");
            self.core.set_node().await
        }
    }

    pub async fn export(
        &self,
        format: ExportFormat,
        detail: Detail,
        include_deleted: bool,
    ) -> Result<ExportOutput> {
        if format.is_structured() {
            let mut entry =
                structured::entry(self.path(), self.core.kind, self.info(), include_deleted);
            if detail == Detail::Max {
                structured::append_hash(&mut entry)?;
            }
            return structured::render(entry, format);
        }

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
            &[],
        )?;
        Ok(ExportOutput::Bytes(doc))
    }

    /// The object content; empty when nothing was written yet
    pub async fn export_data(&self) -> Result<ByteStream> {
        Ok(self.core.storage().get_bytes(self.path()).await?)
    }

    /// Switch between structured and unstructured data
    pub async fn make_structured(&mut self, is_structured: bool) -> Result<()> {
        let kind = if is_structured {
            NodeKind::StructuredData
        } else {
            NodeKind::Data
        };
        if kind == self.core.kind {
            return Ok(());
        }
        if !self.core.is_stored().await? {
            return Err(VoError::node_not_found());
        }
        self.core.metastore().set_kind(self.address(), kind).await?;
        self.core.kind = kind;
        Ok(())
    }
}
