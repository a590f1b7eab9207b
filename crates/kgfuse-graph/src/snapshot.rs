//! Binary graph snapshots.
//!
//! Layout:
//!
//! ```text
//! b"KGFG" | version: u32 LE | body_len: u64 LE | body (bincode)
//! ```
//!
//! The body holds the id watermark, the indexed property names, the node
//! table and the relation set. Derived indexes are not stored; they are
//! rebuilt on load.

use crate::{GraphError, GraphNode, PropertyGraph, Relation, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"KGFG";
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = 16;

#[derive(Serialize)]
struct BodyRef<'a> {
    next_id: u32,
    indexed_properties: &'a BTreeSet<String>,
    nodes: Vec<&'a GraphNode>,
    relations: Vec<&'a Relation>,
}

#[derive(Deserialize)]
struct Body {
    next_id: u32,
    indexed_properties: BTreeSet<String>,
    nodes: Vec<GraphNode>,
    relations: Vec<Relation>,
}

impl PropertyGraph {
    /// Serialize to the snapshot format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (next_id, indexed_properties, nodes, relations) = self.parts();
        let body = bincode::serialize(&BodyRef {
            next_id,
            indexed_properties,
            nodes,
            relations,
        })?;

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&(body.len() as u64).to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Deserialize a snapshot and rebuild the indexes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(GraphError::InvalidSnapshot(
                "missing KGFG header".to_string(),
            ));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != SNAPSHOT_VERSION {
            return Err(GraphError::InvalidSnapshot(format!(
                "unsupported snapshot version {version}"
            )));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[8..HEADER_LEN]);
        let body_len = u64::from_le_bytes(len_bytes) as usize;
        let body_bytes = bytes
            .get(HEADER_LEN..HEADER_LEN.saturating_add(body_len))
            .ok_or_else(|| GraphError::InvalidSnapshot("truncated body".to_string()))?;

        let body: Body = bincode::deserialize(body_bytes)?;
        PropertyGraph::from_parts(
            body.next_id,
            body.indexed_properties,
            body.nodes,
            body.relations,
        )
    }

    /// Write a snapshot atomically: the bytes go to a temp file next to
    /// `path` which then replaces it.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        write_atomic(path, &bytes)?;
        tracing::debug!(
            path = %path.display(),
            nodes = self.node_count(),
            relations = self.relation_count(),
            "graph snapshot saved"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let graph = Self::from_bytes(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            nodes = graph.node_count(),
            relations = graph.relation_count(),
            "graph snapshot loaded"
        );
        Ok(graph)
    }
}

/// Replace `path` with `bytes` via a sibling temp file + rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |source: std::io::Error| GraphError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
