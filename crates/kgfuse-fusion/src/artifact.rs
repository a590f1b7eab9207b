//! JSON artifacts (batches, caches, alias maps, linking records).

use crate::error::{FusionError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|source| FusionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| FusionError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Like [`read_json`], but a missing file yields `T::default()`.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no persisted file, starting empty");
        return Ok(T::default());
    }
    read_json(path)
}

/// Pretty-print `value` and atomically replace `path` with it.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| FusionError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    kgfuse_graph::snapshot::write_atomic(path, &bytes)?;
    Ok(())
}
