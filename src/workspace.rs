//! Explicit per-event workspace.
//!
//! Components receive an [`EventWorkspace`] value instead of reading output
//! directories from ambient process state; the workspace owns the event's
//! directory and key namespace.

use std::path::{Path, PathBuf};

use crate::store::ArtifactKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWorkspace {
    event_id: String,
    root: PathBuf,
}

impl EventWorkspace {
    pub fn new(event_id: impl Into<String>, root: impl AsRef<Path>) -> Self {
        Self {
            event_id: event_id.into(),
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding this event's artifacts.
    pub fn event_dir(&self) -> PathBuf {
        self.root.join(&self.event_id)
    }

    /// Store key for one of this event's products.
    pub fn key(&self, product: &str, algorithm: &str) -> ArtifactKey {
        ArtifactKey::new(self.event_id.clone(), product, algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_event() {
        let workspace = EventWorkspace::new("20120726022003", "/tmp/shakemaps");
        let key = workspace.key("mmi", "nearest");
        assert_eq!(key.event_id, "20120726022003");
        assert_eq!(key.product, "mmi");
        assert_eq!(key.algorithm, "nearest");
        assert_eq!(
            workspace.event_dir(),
            PathBuf::from("/tmp/shakemaps/20120726022003")
        );
    }
}
