//! Shader source assets.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while opening an asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset `{0}` was not found")]
    NotFound(String),

    #[error("failed to read asset `{name}`")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// A named collection of text assets.
///
/// The renderer loads its shader sources by name through this trait; the
/// store behind it is opaque (a directory, an embedded table, a test map).
pub trait AssetSource: Send + Sync {
    /// Returns the asset's full text content.
    fn open(&self, name: &str) -> Result<String, AssetError>;
}

/// Asset source backed by a directory tree.
///
/// Names are resolved as paths relative to the root, so
/// `"triangle/triangle.vert"` reads `<root>/triangle/triangle.vert`.
pub struct DirAssetStore {
    root: PathBuf,
}

impl DirAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirAssetStore {
    fn open(&self, name: &str) -> Result<String, AssetError> {
        let path = self.root.join(name);
        fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => AssetError::NotFound(name.to_owned()),
            _ => AssetError::Io {
                name: name.to_owned(),
                source,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_not_found() {
        let store = DirAssetStore::new("/nonexistent-asset-root");
        match store.open("triangle/triangle.vert") {
            Err(AssetError::NotFound(name)) => assert_eq!(name, "triangle/triangle.vert"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn reads_relative_to_the_root() {
        let dir = std::env::temp_dir().join("trigon-asset-test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("hello.txt"), "hi").unwrap();

        let store = DirAssetStore::new(&dir);
        assert_eq!(store.open("hello.txt").unwrap(), "hi");
    }
}
