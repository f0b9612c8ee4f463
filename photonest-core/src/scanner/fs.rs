//! Minimal async filesystem abstraction used by the scanner.
//!
//! Two handles flow through every scan: one for the content tree (albums)
//! and one for the cache-artifact tree. Either may be remote or virtual.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::{Result, ScanError};

/// Lightweight metadata needed by the scanner.
#[derive(Debug, Clone, Copy)]
pub struct FileMeta {
    pub is_dir: bool,
    pub is_file: bool,
    pub len: u64,
    /// Last modified time if the backend reports one.
    pub modified: Option<SystemTime>,
}

/// Capability surface the scanner needs from a filesystem.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Whether `path` exists. Permission errors read as absent.
    async fn exists(&self, path: &Path) -> bool;

    /// Direct children of `path`, sorted for deterministic traversal.
    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    async fn metadata(&self, path: &Path) -> Result<FileMeta>;

    async fn read_to_string(&self, path: &Path) -> Result<String>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

/// Real filesystem backed by `tokio::fs`.
#[derive(Debug, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut reader = tokio::fs::read_dir(path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMeta> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(FileMeta {
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::create_dir_all(path).await?)
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::remove_dir_all(path).await?)
    }
}

#[derive(Clone, Debug)]
enum Node {
    Dir,
    File { len: u64, content: String },
}

/// In-memory filesystem for tests. Paths are matched literally; use
/// consistent absolute paths throughout a test.
#[derive(Default)]
pub struct InMemoryFs {
    nodes: RwLock<HashMap<PathBuf, Node>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut nodes = self.write();
        ensure_parents(&mut nodes, &path);
        nodes.entry(path).or_insert(Node::Dir);
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, len: u64) {
        let path = path.into();
        let mut nodes = self.write();
        ensure_parents(&mut nodes, &path);
        nodes.insert(
            path,
            Node::File {
                len,
                content: String::new(),
            },
        );
    }

    pub fn add_text_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        let path = path.into();
        let content = content.into();
        let mut nodes = self.write();
        ensure_parents(&mut nodes, &path);
        nodes.insert(
            path,
            Node::File {
                len: content.len() as u64,
                content,
            },
        );
    }

    pub fn remove(&self, path: &Path) {
        let mut nodes = self.write();
        nodes.retain(|existing, _| !existing.starts_with(path));
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Node>> {
        self.nodes.read().expect("fs lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, Node>> {
        self.nodes.write().expect("fs lock poisoned")
    }
}

fn ensure_parents(nodes: &mut HashMap<PathBuf, Node>, path: &Path) {
    let mut current = path.parent();
    while let Some(parent) = current {
        if parent.as_os_str().is_empty() {
            break;
        }
        nodes.entry(parent.to_path_buf()).or_insert(Node::Dir);
        current = parent.parent();
    }
}

impl fmt::Debug for InMemoryFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryFs")
            .field("nodes", &self.read().len())
            .finish()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn exists(&self, path: &Path) -> bool {
        self.read().contains_key(path)
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let nodes = self.read();
        match nodes.get(path) {
            Some(Node::Dir) => {
                let mut entries: Vec<PathBuf> = nodes
                    .keys()
                    .filter(|candidate| candidate.parent() == Some(path))
                    .cloned()
                    .collect();
                entries.sort();
                Ok(entries)
            }
            Some(Node::File { .. }) => Err(ScanError::Internal(format!(
                "read_dir on file: {}",
                path.display()
            ))),
            None => Err(ScanError::NotFound(format!(
                "read_dir on missing path: {}",
                path.display()
            ))),
        }
    }

    async fn metadata(&self, path: &Path) -> Result<FileMeta> {
        match self.read().get(path) {
            Some(Node::Dir) => Ok(FileMeta {
                is_dir: true,
                is_file: false,
                len: 0,
                modified: None,
            }),
            Some(Node::File { len, .. }) => Ok(FileMeta {
                is_dir: false,
                is_file: true,
                len: *len,
                modified: None,
            }),
            None => Err(ScanError::NotFound(format!(
                "metadata on missing path: {}",
                path.display()
            ))),
        }
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.read().get(path) {
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(Node::Dir) => Err(ScanError::Internal(format!(
                "read_to_string on directory: {}",
                path.display()
            ))),
            None => Err(ScanError::NotFound(format!(
                "read_to_string on missing path: {}",
                path.display()
            ))),
        }
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.add_dir(path.to_path_buf());
        Ok(())
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_fs_lists_direct_children_sorted() {
        let fs = InMemoryFs::new();
        fs.add_file("/photos/b.jpg", 10);
        fs.add_file("/photos/a.jpg", 10);
        fs.add_dir("/photos/nested");
        fs.add_file("/photos/nested/deep.jpg", 10);

        let entries = fs.read_dir(Path::new("/photos")).await.expect("read_dir");
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/photos/a.jpg"),
                PathBuf::from("/photos/b.jpg"),
                PathBuf::from("/photos/nested"),
            ]
        );
    }

    #[tokio::test]
    async fn add_file_creates_parent_directories() {
        let fs = InMemoryFs::new();
        fs.add_file("/a/b/c/photo.jpg", 1);

        assert!(fs.exists(Path::new("/a/b/c")).await);
        let meta = fs.metadata(Path::new("/a/b")).await.expect("metadata");
        assert!(meta.is_dir);
    }

    #[tokio::test]
    async fn remove_drops_subtree() {
        let fs = InMemoryFs::new();
        fs.add_file("/a/b/photo.jpg", 1);
        fs.remove(Path::new("/a/b"));

        assert!(!fs.exists(Path::new("/a/b")).await);
        assert!(!fs.exists(Path::new("/a/b/photo.jpg")).await);
        assert!(fs.exists(Path::new("/a")).await);
    }
}
