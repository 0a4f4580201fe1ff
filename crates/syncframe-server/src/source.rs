//! Template sources.
//!
//! Routes, layouts, partials and error pages are all read through a
//! [`TemplateSource`]. Paths are `/`-separated and relative to the routes
//! root (`home/index.html`, `_layout.html`).

use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

use crate::error::SourceError;

/// Read access to the routes tree.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Every file under the root, sorted.
    async fn list(&self) -> Result<Vec<String>, SourceError>;

    /// Contents of one file. `Ok(None)` if it does not exist.
    async fn read(&self, path: &str) -> Result<Option<String>, SourceError>;
}

/// Routes directory on disk.
#[derive(Debug, Clone)]
pub struct DiskSource {
    root: PathBuf,
}

impl DiskSource {
    /// Serve files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The routes directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(SourceError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl TemplateSource for DiskSource {
    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let io = |path: &Path, source: std::io::Error| SourceError::Io { path: path.display().to_string(), source };

        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| io(&dir, e))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| io(&dir, e))? {
                let path = entry.path();
                let kind = entry.file_type().await.map_err(|e| io(&path, e))?;
                if kind.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let segments: Vec<_> =
                        relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
                    files.push(segments.join("/"));
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn read(&self, path: &str) -> Result<Option<String>, SourceError> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SourceError::Io { path: path.to_string(), source }),
        }
    }
}

/// In-memory routes tree for tests and embedding.
///
/// Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemorySource {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with_file(self, path: &str, contents: &str) -> Self {
        self.insert(path, contents);
        self
    }

    /// Add or replace a file.
    pub fn insert(&self, path: &str, contents: &str) {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files.insert(path.trim_start_matches('/').to_string(), contents.to_string());
    }
}

#[async_trait]
impl TemplateSource for MemorySource {
    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(files.keys().cloned().collect())
    }

    async fn read(&self, path: &str) -> Result<Option<String>, SourceError> {
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(files.get(path.trim_start_matches('/')).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_source_lists_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("home")).unwrap();
        std::fs::write(dir.path().join("home/index.html"), "<p>home</p>").unwrap();
        std::fs::write(dir.path().join("_layout.html"), "{{ slot }}").unwrap();

        let source = DiskSource::new(dir.path());

        assert_eq!(source.list().await.unwrap(), vec!["_layout.html", "home/index.html"]);
        assert_eq!(source.read("home/index.html").await.unwrap().as_deref(), Some("<p>home</p>"));
        assert_eq!(source.read("missing.html").await.unwrap(), None);
    }

    #[tokio::test]
    async fn disk_source_rejects_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let source = DiskSource::new(dir.path());

        assert!(matches!(source.read("../etc/passwd").await, Err(SourceError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn memory_source_normalizes_leading_slash() {
        let source = MemorySource::new().with_file("/a.html", "x");

        assert_eq!(source.list().await.unwrap(), vec!["a.html"]);
        assert_eq!(source.read("a.html").await.unwrap().as_deref(), Some("x"));
    }
}
