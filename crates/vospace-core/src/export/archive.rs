//! Streaming tar export of a container subtree
//!
//! A producer task walks the subtree depth-first and writes ustar entries
//! into a bounded channel; the returned stream drains the other end. The
//! producer blocks while the channel is full. Dropping the stream stops the
//! walk at the next write.

use crate::node::{ContainerNode, Node};
use crate::{Result, VoError};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::io;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use vospace_storage::ByteStream;

/// Chunks buffered between the producer and the consumer
pub const ARCHIVE_PIPE_CAPACITY: usize = 16;

const BLOCK: usize = 512;
const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const LONG_LINK: &str = "././@LongLink";
/// Largest size expressible in 11 octal digits
const MAX_OCTAL_SIZE: u64 = 0o77777777777;

#[derive(Clone, Copy)]
enum EntryType {
    File,
    Directory,
    LongName,
}

impl EntryType {
    fn flag(self) -> u8 {
        match self {
            EntryType::File => b'0',
            EntryType::Directory => b'5',
            EntryType::LongName => b'L',
        }
    }

    fn mode(self) -> &'static [u8] {
        match self {
            EntryType::Directory => b"0000755",
            _ => b"0000644",
        }
    }
}

fn write_octal(field: &mut [u8], value: u64) {
    let width = field.len() - 1;
    let digits = format!("{:0width$o}", value, width = width);
    field[..width].copy_from_slice(&digits.as_bytes()[digits.len() - width..]);
    field[width] = 0;
}

fn write_size(field: &mut [u8], size: u64) {
    if size <= MAX_OCTAL_SIZE {
        write_octal(field, size);
    } else {
        // base-256: high bit marks binary, value big-endian in the rest
        field.fill(0);
        field[0] = 0x80;
        let bytes = size.to_be_bytes();
        let start = field.len() - bytes.len();
        field[start..].copy_from_slice(&bytes);
    }
}

fn raw_header(name: &[u8], prefix: &[u8], size: u64, mtime: i64, kind: EntryType) -> [u8; BLOCK] {
    let mut h = [0u8; BLOCK];
    h[..name.len()].copy_from_slice(name);
    h[100..107].copy_from_slice(kind.mode());
    write_octal(&mut h[108..116], 0);
    write_octal(&mut h[116..124], 0);
    write_size(&mut h[124..136], size);
    write_octal(&mut h[136..148], mtime.max(0) as u64);
    h[148..156].fill(b' ');
    h[156] = kind.flag();
    h[257..263].copy_from_slice(b"ustar\0");
    h[263..265].copy_from_slice(b"00");
    h[345..345 + prefix.len()].copy_from_slice(prefix);

    let checksum: u32 = h.iter().map(|&b| u32::from(b)).sum();
    let digits = format!("{:06o}", checksum);
    h[148..154].copy_from_slice(digits.as_bytes());
    h[154] = 0;
    h[155] = b' ';
    h
}

/// Split `name` into ustar prefix and name parts at a separator
fn split_name(name: &str) -> Option<(&str, &str)> {
    if name.len() <= NAME_LEN {
        return Some(("", name));
    }
    let bytes = name.as_bytes();
    // skip a trailing separator when choosing the split point
    let search_end = name.len() - usize::from(name.ends_with('/'));
    (0..search_end)
        .rev()
        .filter(|&i| bytes[i] == b'/')
        .map(|i| (&name[..i], &name[i + 1..]))
        .find(|(prefix, rest)| prefix.len() <= PREFIX_LEN && !rest.is_empty() && rest.len() <= NAME_LEN)
}

fn pad_len(len: u64) -> usize {
    let rem = (len % BLOCK as u64) as usize;
    if rem == 0 {
        0
    } else {
        BLOCK - rem
    }
}

/// Header block(s) for one entry; names that do not fit ustar get a GNU
/// long-name record first
pub fn entry_header(name: &str, size: u64, mtime: i64, is_dir: bool) -> Bytes {
    let kind = if is_dir {
        EntryType::Directory
    } else {
        EntryType::File
    };
    let mut out = BytesMut::new();
    match split_name(name) {
        Some((prefix, short)) => {
            out.extend_from_slice(&raw_header(short.as_bytes(), prefix.as_bytes(), size, mtime, kind));
        }
        None => {
            let mut long = name.as_bytes().to_vec();
            long.push(0);
            out.extend_from_slice(&raw_header(
                LONG_LINK.as_bytes(),
                b"",
                long.len() as u64,
                0,
                EntryType::LongName,
            ));
            let padding = pad_len(long.len() as u64);
            out.extend_from_slice(&long);
            out.extend_from_slice(&vec![0u8; padding]);

            let truncated = &name.as_bytes()[..NAME_LEN];
            out.extend_from_slice(&raw_header(truncated, b"", size, mtime, kind));
        }
    }
    out.freeze()
}

struct TarWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl TarWriter {
    async fn send(&self, data: Bytes) -> Result<()> {
        self.tx
            .send(Ok(data))
            .await
            .map_err(|_| VoError::InternalServerError("archive reader went away".to_string()))
    }

    async fn directory(&self, name: &str, mtime: i64) -> Result<()> {
        self.send(entry_header(name, 0, mtime, true)).await
    }

    /// Write exactly `size` body bytes from `body` followed by block padding.
    /// A short or failing body is zero-filled, a long one truncated.
    async fn file(&self, name: &str, size: u64, mtime: i64, mut body: ByteStream) -> Result<()> {
        self.send(entry_header(name, size, mtime, false)).await?;

        let mut remaining = size;
        while remaining > 0 {
            match body.next().await {
                Some(Ok(chunk)) => {
                    let take = remaining.min(chunk.len() as u64) as usize;
                    if take > 0 {
                        self.send(chunk.slice(..take)).await?;
                        remaining -= take as u64;
                    }
                }
                Some(Err(e)) => {
                    warn!(entry = name, error = %e, "body failed, zero-filling");
                    break;
                }
                None => {
                    warn!(entry = name, missing = remaining, "body shorter than declared size");
                    break;
                }
            }
        }
        while remaining > 0 {
            let n = remaining.min(64 * 1024);
            self.send(Bytes::from(vec![0u8; n as usize])).await?;
            remaining -= n;
        }

        let padding = pad_len(size);
        if padding > 0 {
            self.send(Bytes::from(vec![0u8; padding])).await?;
        }
        Ok(())
    }

    async fn finish(&self) -> Result<()> {
        self.send(Bytes::from(vec![0u8; BLOCK * 2])).await
    }
}

/// Write the children of `container` under `parent` (which ends with `/`)
fn write_children<'a>(
    container: &'a ContainerNode,
    parent: String,
    out: &'a TarWriter,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let children = container.child_nodes(false).await?;
        for child in children {
            let name = format!("{}{}", parent, child.path().node_name());
            let mtime = child.info().mtime.timestamp();
            match &child {
                Node::Container(sub) => {
                    let dir = format!("{}/", name);
                    out.directory(&dir, mtime).await?;
                    if let Err(e) = write_children(sub, dir, out).await {
                        if out.tx.is_closed() {
                            return Err(e);
                        }
                        warn!(entry = %name, error = %e, "skipping container in archive");
                    }
                }
                Node::Data(data) => match data.export_data().await {
                    Ok(body) => out.file(&name, child.info().size, mtime, body).await?,
                    Err(e) => warn!(entry = %name, error = %e, "skipping file in archive"),
                },
            }
        }
        Ok(())
    }
    .boxed()
}

/// Tar archive of everything below `root`, rooted at a directory named
/// after it
pub fn tar_stream(root: ContainerNode) -> ByteStream {
    let (tx, rx) = mpsc::channel(ARCHIVE_PIPE_CAPACITY);

    tokio::spawn(async move {
        let out = TarWriter { tx };
        let top = format!("{}/", root.path().node_name());
        let result = async {
            out.directory(&top, root.info().mtime.timestamp()).await?;
            write_children(&root, top.clone(), &out).await?;
            out.finish().await
        }
        .await;

        match result {
            Ok(()) => debug!(root = %root.address(), "archive complete"),
            Err(e) => {
                error!(root = %root.address(), error = %e, "archive aborted");
                let _ = out.tx.send(Err(io::Error::other(e.to_string()))).await;
            }
        }
    });

    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_str(h: &[u8], range: std::ops::Range<usize>) -> String {
        String::from_utf8_lossy(&h[range])
            .trim_end_matches('\0')
            .to_string()
    }

    #[test]
    fn test_header_layout() {
        let h = entry_header("A/f.txt", 10, 1_000, false);
        assert_eq!(h.len(), BLOCK);
        assert_eq!(field_str(&h, 0..100), "A/f.txt");
        assert_eq!(field_str(&h, 124..136), "00000000012");
        assert_eq!(field_str(&h, 136..148), "00000001750");
        assert_eq!(h[156], b'0');
        assert_eq!(&h[257..262], b"ustar");

        let stored: u32 = u32::from_str_radix(field_str(&h, 148..154).trim(), 8).unwrap();
        let mut copy = h.to_vec();
        copy[148..156].fill(b' ');
        assert_eq!(stored, copy.iter().map(|&b| u32::from(b)).sum::<u32>());
    }

    #[test]
    fn test_directory_header() {
        let h = entry_header("A/", 0, 0, true);
        assert_eq!(h[156], b'5');
        assert_eq!(field_str(&h, 100..107), "0000755");
    }

    #[test]
    fn test_long_name_uses_prefix() {
        let dir = "d".repeat(120);
        let name = format!("{}/file.txt", dir);
        let h = entry_header(&name, 0, 0, false);
        assert_eq!(h.len(), BLOCK);
        assert_eq!(field_str(&h, 0..100), "file.txt");
        assert_eq!(field_str(&h, 345..500), dir);
    }

    #[test]
    fn test_unsplittable_name_uses_long_link() {
        let name = "x".repeat(300);
        let h = entry_header(&name, 5, 0, false);
        // long-name header, one block of name, real header
        assert_eq!(h.len(), BLOCK * 3);
        assert_eq!(h[156], b'L');
        assert_eq!(field_str(&h, BLOCK..BLOCK * 2), name);
        assert_eq!(h[BLOCK * 2 + 156], b'0');
    }

    #[test]
    fn test_pad_len() {
        assert_eq!(pad_len(0), 0);
        assert_eq!(pad_len(10), 502);
        assert_eq!(pad_len(512), 0);
    }

    #[test]
    fn test_large_size_is_base256() {
        let h = entry_header("big", MAX_OCTAL_SIZE + 1, 0, false);
        assert_eq!(h[124], 0x80);
    }
}
