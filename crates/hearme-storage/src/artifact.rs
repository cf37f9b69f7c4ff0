//! Reference embedding artifacts.
//!
//! One `.npy` file per lesson video holding a single `(1, L)` float32 row.
//! Files are written to a temporary sibling and renamed into place, so a
//! reader never observes a partial artifact and an existing file always
//! means a completed build.

use std::path::{Path, PathBuf};

use hearme_models::Embedding;
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Result of [`store_embedding`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Written,
    /// An artifact already existed and was left untouched.
    AlreadyExists,
}

/// Whether an artifact exists at `path`.
pub async fn artifact_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Persist an embedding unless an artifact is already present.
pub async fn store_embedding(path: &Path, embedding: &Embedding) -> StorageResult<StoreOutcome> {
    if artifact_exists(path).await {
        return Ok(StoreOutcome::AlreadyExists);
    }
    if embedding.is_empty() {
        return Err(StorageError::invalid_artifact(path, "empty embedding"));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let target = path.to_path_buf();
    let values = embedding.as_slice().to_vec();
    tokio::task::spawn_blocking(move || write_atomic(&target, values))
        .await
        .map_err(|e| StorageError::internal(format!("Artifact write task failed: {e}")))??;

    debug!(path = %path.display(), len = embedding.len(), "Stored reference embedding");
    Ok(StoreOutcome::Written)
}

/// Load an embedding artifact. A missing file is an `Io` error with
/// `NotFound`; callers that know the lesson map it to `MissingReference`.
pub async fn load_embedding(path: &Path) -> StorageResult<Embedding> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_artifact(&target))
        .await
        .map_err(|e| StorageError::internal(format!("Artifact read task failed: {e}")))?
}

fn write_atomic(path: &Path, values: Vec<f32>) -> StorageResult<()> {
    let len = values.len();
    let array = Array2::from_shape_vec((1, len), values)
        .map_err(|e| StorageError::invalid_artifact(path, e.to_string()))?;

    let tmp = temp_path(path);
    write_npy(&tmp, &array).map_err(|e| StorageError::invalid_artifact(path, e.to_string()))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_artifact(path: &Path) -> StorageResult<Embedding> {
    if !path.exists() {
        return Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )));
    }

    let array: Array2<f32> =
        read_npy(path).map_err(|e| StorageError::invalid_artifact(path, e.to_string()))?;

    if array.nrows() != 1 || array.ncols() == 0 {
        return Err(StorageError::invalid_artifact(
            path,
            format!("expected shape (1, L), found {:?}", array.shape()),
        ));
    }

    Ok(Embedding::new(array.iter().copied().collect()))
}

/// Unique sibling of `path`; concurrent writers of one artifact never share it.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}
