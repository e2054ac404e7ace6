//! Operations behind each subcommand

use crate::state::VoSpaceState;
use anyhow::{bail, Context};
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};
use uuid::Uuid;
use vospace_core::{Detail, ExportFormat, Node, NodeKind, Properties, Regions};
use vospace_storage::{bytes_stream, ByteStream, NodeAddress};

/// One line per child: kind, size, revision, modification time, name
pub async fn list(
    state: &VoSpaceState,
    path: &str,
    include_deleted: bool,
    start: usize,
    count: Option<usize>,
) -> anyhow::Result<String> {
    let container = state.container(path).await?;
    let children = container
        .direct_children(include_deleted, start, count)
        .await?;

    let mut out = String::new();
    for child in &children.nodes {
        let mut name = child.address.path().node_name().to_string();
        if child.kind.is_container() {
            name.push('/');
        }
        if child.info.deleted {
            name.push_str(" (deleted)");
        }
        out.push_str(&format!(
            "{:<18} {:>12} {:>4} {} {}\n",
            child.kind.to_string(),
            child.info.size,
            child.info.revision,
            child.info.mtime.format("%Y-%m-%d %H:%M:%S"),
            name
        ));
    }
    if count.is_some() {
        out.push_str(&format!(
            "{} of {} children\n",
            children.nodes.len(),
            children.total
        ));
    }
    Ok(out)
}

/// Metadata export of one node
pub async fn stat(
    state: &VoSpaceState,
    path: &str,
    format: &str,
    detail: Detail,
    include_deleted: bool,
) -> anyhow::Result<Bytes> {
    let node = state.node(path).await?;
    let output = node
        .export(ExportFormat::from_name(format), detail, include_deleted)
        .await?;
    if let Some(value) = output.as_json() {
        return Ok(Bytes::from(serde_json::to_vec_pretty(value)?));
    }
    Ok(output.into_bytes()?)
}

/// Create a container; the parent must exist unless it is the root
#[instrument(skip(state))]
pub async fn mkdir(state: &VoSpaceState, path: &str, owner: &str) -> anyhow::Result<Node> {
    let address = state.address(path)?;
    ensure_parent(state, &address).await?;
    if state.factory.metastore().is_stored(&address).await? {
        bail!("{} already exists", address);
    }
    Ok(state
        .factory
        .create_node(address, owner, NodeKind::Container)
        .await?)
}

async fn ensure_parent(state: &VoSpaceState, address: &NodeAddress) -> anyhow::Result<()> {
    let parent = address.parent();
    if parent.path().is_root() {
        return Ok(());
    }
    state
        .factory
        .get_node(&parent)
        .await
        .with_context(|| format!("parent {}", parent))?
        .into_container()?;
    Ok(())
}

/// Write `data` to a data node. With `segment_size` the content is uploaded
/// as numbered segments of a fresh group and the node points at them.
#[instrument(skip(state, data), fields(len = data.len()))]
pub async fn put(
    state: &VoSpaceState,
    path: &str,
    data: Bytes,
    segment_size: Option<usize>,
    owner: &str,
) -> anyhow::Result<Node> {
    let address = state.address(path)?;
    if address.path().depth() < 2 {
        bail!("data nodes live inside a container: {}", address);
    }

    let Some(segment_size) = segment_size else {
        let parent = state
            .factory
            .get_node(&address.parent())
            .await
            .with_context(|| format!("parent {}", address.parent()))?
            .into_container()?;
        return Ok(parent
            .set_data(address.path().node_name(), bytes_stream(data))
            .await?);
    };

    if segment_size == 0 {
        bail!("segment size must be positive");
    }
    ensure_parent(state, &address).await?;

    let chunk_id = Uuid::new_v4().to_string();
    let storage = state.factory.storage();
    let mut offset = 0;
    let mut sequence = 0u32;
    while offset < data.len() {
        let end = (offset + segment_size).min(data.len());
        storage
            .put_object_segment(&chunk_id, sequence, bytes_stream(data.slice(offset..end)))
            .await?;
        debug!(chunk_id = %chunk_id, sequence, "uploaded segment");
        offset = end;
        sequence += 1;
    }

    let mut node = match state.factory.get_node(&address).await {
        Ok(node) => node,
        Err(e) if e.status_code() == 404 => state.factory.new_node(address, owner, NodeKind::Data),
        Err(e) => return Err(e.into()),
    };
    if node.is_container() {
        bail!("{} is a container", node.address());
    }
    if let Some(data_node) = node.as_data_mut() {
        data_node.set_chunked_data(&chunk_id).await?;
    }
    info!(chunk_id = %chunk_id, segments = sequence, "chunked upload complete");
    Ok(node)
}

/// Node content: object bytes, or a tar archive for a container
pub async fn read_to<W>(state: &VoSpaceState, path: &str, out: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let node = state.node(path).await?;
    let data = node.export_data().await?;
    copy_stream(data, out).await
}

async fn copy_stream<W>(mut data: ByteStream, out: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = data.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

/// Copy, or move when `keep` is false
#[instrument(skip(state))]
pub async fn copy(state: &VoSpaceState, from: &str, to: &str, keep: bool) -> anyhow::Result<()> {
    let node = state.node(from).await?;
    let target = state.address(to)?;
    ensure_parent(state, &target).await?;
    node.copy(&target, keep).await?;
    Ok(())
}

/// Soft delete, or hard removal of records and objects
pub async fn remove(state: &VoSpaceState, path: &str, hard: bool) -> anyhow::Result<()> {
    let node = state.node(path).await?;
    if hard {
        node.remove().await?;
    } else {
        node.mark_removed(true).await?;
    }
    Ok(())
}

pub async fn restore(state: &VoSpaceState, path: &str) -> anyhow::Result<()> {
    state.node(path).await?.mark_removed(false).await?;
    Ok(())
}

pub async fn search(
    state: &VoSpaceState,
    path: &str,
    query: &str,
    limit: usize,
    include_deleted: bool,
) -> anyhow::Result<Vec<NodeAddress>> {
    let container = state.container(path).await?;
    Ok(container.search(query, limit, include_deleted).await?)
}

/// Merge `updates` into the user properties; an empty value removes one
pub async fn set_properties(
    state: &VoSpaceState,
    path: &str,
    updates: &[(String, String)],
) -> anyhow::Result<Properties> {
    let node = state.node(path).await?;
    if !updates.is_empty() {
        let updates: Properties = updates.iter().cloned().collect();
        node.update_properties(&updates).await?;
    }
    Ok(node.properties().await?)
}

pub async fn regions(
    state: &VoSpaceState,
    path: &str,
    updates: &[(String, String)],
) -> anyhow::Result<Regions> {
    let container = state.container(path).await?;
    if !updates.is_empty() {
        let regions: Regions = updates.iter().cloned().collect();
        container.set_node_regions(&regions).await?;
    }
    Ok(container.get_node_regions().await?)
}

/// Current sync target; with `target` set, configure it first
pub async fn sync(
    state: &VoSpaceState,
    path: &str,
    target: Option<(&str, &str)>,
) -> anyhow::Result<Option<String>> {
    let container = state.container(path).await?;
    if let Some((sync_to, key)) = target {
        container.set_node_sync_to(sync_to, key).await?;
    }
    Ok(container.get_node_sync_to().await?)
}

pub async fn set_structured(
    state: &VoSpaceState,
    path: &str,
    structured: bool,
) -> anyhow::Result<()> {
    let mut node = state.node(path).await?;
    node.make_structured(structured).await?;
    Ok(())
}

pub async fn usage(state: &VoSpaceState) -> anyhow::Result<u64> {
    Ok(state.factory.storage().get_bytes_used().await?)
}

/// Parse `key=value`
pub fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoSpaceConfig;
    use rstest::rstest;
    use std::sync::Arc;
    use vospace_core::MemoryMetaStore;
    use vospace_storage::{MemoryObjectClient, ObjectStorage};

    const OWNER: &str = "bob";

    fn state() -> (VoSpaceState, MemoryObjectClient) {
        let client = MemoryObjectClient::new();
        let storage = Arc::new(ObjectStorage::new(client.clone()));
        let config = VoSpaceConfig {
            authority: "test!vospace".into(),
            use_memory_store: true,
            ..Default::default()
        };
        (
            VoSpaceState::with_parts(config, storage, MemoryMetaStore::new()),
            client,
        )
    }

    async fn read(state: &VoSpaceState, path: &str) -> Vec<u8> {
        let mut out = Vec::new();
        read_to(state, path, &mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_mkdir_put_cat() {
        let (state, _) = state();
        mkdir(&state, "/photos", OWNER).await.unwrap();
        put(&state, "/photos/a.txt", Bytes::from_static(b"hello"), None, OWNER)
            .await
            .unwrap();

        assert_eq!(read(&state, "/photos/a.txt").await, b"hello");
        let listing = list(&state, "/photos", false, 0, None).await.unwrap();
        assert!(listing.contains("DataNode"));
        assert!(listing.trim_end().ends_with("a.txt"));
    }

    #[tokio::test]
    async fn test_mkdir_requires_parent_and_rejects_duplicates() {
        let (state, _) = state();
        assert!(mkdir(&state, "/a/b", OWNER).await.is_err());
        mkdir(&state, "/a", OWNER).await.unwrap();
        assert!(mkdir(&state, "/a", OWNER).await.is_err());
        mkdir(&state, "/a/b", OWNER).await.unwrap();
    }

    #[tokio::test]
    async fn test_segmented_put_reads_back_whole() {
        let (state, client) = state();
        mkdir(&state, "/big", OWNER).await.unwrap();
        let data = Bytes::from((0u8..=250).collect::<Vec<u8>>());

        let node = put(&state, "/big/blob", data.clone(), Some(100), OWNER)
            .await
            .unwrap();

        assert_eq!(node.info().size, data.len() as u64);
        assert_eq!(read(&state, "/big/blob").await, data.as_ref());
        assert_eq!(client.object_names("chunked").len(), 3);

        remove(&state, "/big/blob", true).await.unwrap();
        assert!(client.object_names("chunked").is_empty());
    }

    #[tokio::test]
    async fn test_move_and_soft_delete_cycle() {
        let (mut state, _) = state();
        mkdir(&state, "/src", OWNER).await.unwrap();
        put(&state, "/src/f", Bytes::from_static(b"x"), None, OWNER)
            .await
            .unwrap();
        state.take_events();

        copy(&state, "/src", "/dst", false).await.unwrap();
        assert!(state.node("/src").await.is_err());
        assert_eq!(read(&state, "/dst/f").await, b"x");
        assert!(!state.take_events().is_empty());

        remove(&state, "/dst", false).await.unwrap();
        assert!(list(&state, "/dst", false, 0, None).await.unwrap().is_empty());
        let with_deleted = list(&state, "/dst", true, 0, None).await.unwrap();
        assert!(with_deleted.contains("(deleted)"));

        restore(&state, "/dst").await.unwrap();
        assert!(!state.node("/dst/f").await.unwrap().info().deleted);
    }

    #[tokio::test]
    async fn test_stat_object_format_is_pretty_json() {
        let (state, _) = state();
        mkdir(&state, "/docs", OWNER).await.unwrap();
        let out = stat(&state, "/docs", "json-dropbox-object", Detail::Max, false)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["path"], "/docs");
        assert_eq!(value["items"], 0);
    }

    #[tokio::test]
    async fn test_properties_merge() {
        let (state, _) = state();
        mkdir(&state, "/p", OWNER).await.unwrap();
        let set = vec![("color".to_string(), "red".to_string())];
        set_properties(&state, "/p", &set).await.unwrap();
        let cleared = vec![("color".to_string(), String::new())];
        let props = set_properties(&state, "/p", &cleared).await.unwrap();
        assert!(props.is_empty());
    }

    #[tokio::test]
    async fn test_regions_need_distributed_store() {
        let (state, _) = state();
        mkdir(&state, "/r", OWNER).await.unwrap();
        let err = regions(&state, "/r", &[]).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }

    #[rstest]
    #[case("a=b", Some(("a", "b")))]
    #[case("a=", Some(("a", "")))]
    #[case("k=v=w", Some(("k", "v=w")))]
    #[case("=v", None)]
    #[case("novalue", None)]
    fn test_parse_pair(#[case] raw: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = parse_pair(raw).ok();
        let expected = expected.map(|(k, v)| (k.to_string(), v.to_string()));
        assert_eq!(parsed, expected);
    }
}
