//! Key-addressed artifact store.
//!
//! Whether a product has been computed is a property of the store, not of a
//! file happening to exist on disk. Artifacts are keyed by
//! `(event id, product, algorithm)` and treated as immutable once put;
//! replacing one means removing and re-putting under the same key.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contour::ContourFeature;
use crate::impact::ImpactSummary;
use crate::raster::IntensityRaster;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub event_id: String,
    pub product: String,
    pub algorithm: String,
}

impl ArtifactKey {
    pub fn new(
        event_id: impl Into<String>,
        product: impl Into<String>,
        algorithm: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            product: product.into(),
            algorithm: algorithm.into(),
        }
    }

    fn file_name(&self) -> String {
        format!("{}-{}.json", self.product, self.algorithm)
    }
}

/// A persistable pipeline product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Artifact {
    Raster(IntensityRaster),
    Contours(Vec<ContourFeature>),
    Impact(ImpactSummary),
}

/// Storage seam for computed artifacts.
pub trait ArtifactStore {
    fn get(&self, key: &ArtifactKey) -> Option<Artifact>;
    fn put(&self, key: ArtifactKey, artifact: Artifact) -> Result<()>;
    /// Remove is idempotent: removing an absent key is not an error.
    fn remove(&self, key: &ArtifactKey) -> Result<()>;
}

/// In-memory store; the default for tests and single-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: Mutex<HashMap<ArtifactKey, Artifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, key: &ArtifactKey) -> Option<Artifact> {
        self.artifacts
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned()
    }

    fn put(&self, key: ArtifactKey, artifact: Artifact) -> Result<()> {
        self.artifacts
            .lock()
            .expect("store mutex poisoned")
            .insert(key, artifact);
        Ok(())
    }

    fn remove(&self, key: &ArtifactKey) -> Result<()> {
        self.artifacts
            .lock()
            .expect("store mutex poisoned")
            .remove(key);
        Ok(())
    }
}

/// JSON-file-backed store rooted at a directory, one subdirectory per event.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(&key.event_id).join(key.file_name())
    }
}

impl ArtifactStore for FileStore {
    fn get(&self, key: &ArtifactKey) -> Option<Artifact> {
        let path = self.path_for(key);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                // A stale or truncated artifact is a cache miss, not a crash.
                debug!(path = %path.display(), %err, "unreadable artifact ignored");
                None
            }
        }
    }

    fn put(&self, key: ArtifactKey, artifact: Artifact) -> Result<()> {
        let path = self.path_for(&key);
        let dir = path.parent().expect("artifact path has a parent");
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create artifact dir {}", dir.display()))?;
        let json = serde_json::to_string(&artifact)
            .with_context(|| format!("Failed to serialize artifact {}", key.file_name()))?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write artifact {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &ArtifactKey) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to remove artifact {}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rectangle;

    fn raster_artifact() -> Artifact {
        let raster =
            IntensityRaster::new(Rectangle::new(0.0, 0.0, 2.0, 2.0), 2, 2, vec![1.0; 4]).unwrap();
        Artifact::Raster(raster)
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        let key = ArtifactKey::new("20120726022003", "mmi", "nearest");
        assert!(store.get(&key).is_none());
        store.put(key.clone(), raster_artifact()).unwrap();
        assert_eq!(store.get(&key), Some(raster_artifact()));
        store.remove(&key).unwrap();
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = ArtifactKey::new("20120726022003", "mmi", "nearest");
        store.put(key.clone(), raster_artifact()).unwrap();
        assert_eq!(store.get(&key), Some(raster_artifact()));

        // Distinct algorithm, distinct slot.
        let other = ArtifactKey::new("20120726022003", "mmi", "invdist");
        assert!(store.get(&other).is_none());
    }

    #[test]
    fn file_store_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = ArtifactKey::new("event", "contours", "nearest");
        store.remove(&key).unwrap();
        store.put(key.clone(), raster_artifact()).unwrap();
        store.remove(&key).unwrap();
        store.remove(&key).unwrap();
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn corrupt_artifact_reads_as_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = ArtifactKey::new("event", "mmi", "nearest");
        let path = dir.path().join("event").join("mmi-nearest.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(store.get(&key).is_none());
    }
}
