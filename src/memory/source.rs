use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;

/// Source label for files found in the agent workspace.
pub const SOURCE_MEMORY: &str = "memory";

/// Source label for files found under configured extra paths.
pub const SOURCE_EXTRA: &str = "extra";

/// One document of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Stable document identity, used as the chunk path.
    pub path: String,
    pub text: String,
    /// Collection or owner label carried onto search results.
    pub source: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<String>, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Lists the full corpus for one sync pass.
///
/// An error means the corpus could not be read at all; the sync pass is
/// aborted and the current index stays in place.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<SourceDocument>>;
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// Markdown memory files of an agent workspace.
///
/// Picks up `MEMORY.md`, `memory.md` and everything under `memory/`, plus any
/// configured extra files or directories. Paths are reported relative to the
/// workspace with `/` separators when possible.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    workspace: PathBuf,
    extra_paths: Vec<PathBuf>,
}

impl FsDocumentSource {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            extra_paths: Vec::new(),
        }
    }

    pub fn with_extra_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.extra_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    fn scan(&self) -> Result<Vec<SourceDocument>> {
        let mut found: BTreeMap<String, SourceDocument> = BTreeMap::new();

        let roots = [
            self.workspace.join("MEMORY.md"),
            self.workspace.join("memory.md"),
            self.workspace.join("memory"),
        ];
        for root in &roots {
            self.scan_root(root, SOURCE_MEMORY, &mut found)?;
        }

        for extra in &self.extra_paths {
            let root = if extra.is_absolute() {
                extra.clone()
            } else {
                self.workspace.join(extra)
            };
            self.scan_root(&root, SOURCE_EXTRA, &mut found)?;
        }

        Ok(found.into_values().collect())
    }

    fn scan_root(
        &self,
        root: &Path,
        source: &str,
        found: &mut BTreeMap<String, SourceDocument>,
    ) -> Result<()> {
        let meta = match std::fs::symlink_metadata(root) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %root.display(), "memory path does not exist, skipping");
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("cannot stat '{}'", root.display()));
            }
        };
        if meta.file_type().is_symlink() {
            debug!(root = %root.display(), "skipping symlinked memory path");
            return Ok(());
        }

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.with_context(|| format!("cannot walk '{}'", root.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_markdown(path) {
                continue;
            }

            let key = self.display_path(path);
            if found.contains_key(&key) {
                continue;
            }

            let bytes = std::fs::read(path)
                .with_context(|| format!("cannot read memory file '{}'", path.display()))?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            found.insert(key.clone(), SourceDocument::new(key, text, source));
        }

        Ok(())
    }

    fn display_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.workspace).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown")
    )
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn list_documents(&self) -> Result<Vec<SourceDocument>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.scan())
            .await
            .context("memory scan task failed")?
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// A fixed, replaceable set of documents.
#[derive(Debug, Default)]
pub struct StaticDocumentSource {
    docs: parking_lot::RwLock<Vec<SourceDocument>>,
}

impl StaticDocumentSource {
    pub fn new(docs: Vec<SourceDocument>) -> Self {
        Self {
            docs: parking_lot::RwLock::new(docs),
        }
    }

    /// Replace the corpus seen by subsequent syncs.
    pub fn set(&self, docs: Vec<SourceDocument>) {
        *self.docs.write() = docs;
    }

    /// Insert or replace one document by path.
    pub fn upsert(&self, doc: SourceDocument) {
        let mut docs = self.docs.write();
        match docs.iter_mut().find(|d| d.path == doc.path) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }

    pub fn remove(&self, path: &str) {
        self.docs.write().retain(|d| d.path != path);
    }
}

#[async_trait]
impl DocumentSource for StaticDocumentSource {
    async fn list_documents(&self) -> Result<Vec<SourceDocument>> {
        Ok(self.docs.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn scans_workspace_memory_files() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path();
        fs::write(ws.join("MEMORY.md"), "long term").unwrap();
        fs::create_dir_all(ws.join("memory/2024")).unwrap();
        fs::write(ws.join("memory/2024/01-15.md"), "daily log").unwrap();
        fs::write(ws.join("memory/notes.txt"), "ignored").unwrap();
        fs::write(ws.join("README.md"), "not memory").unwrap();

        let docs = FsDocumentSource::new(ws).list_documents().await.unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["MEMORY.md", "memory/2024/01-15.md"]);
        assert!(docs.iter().all(|d| d.source == SOURCE_MEMORY));
    }

    #[tokio::test]
    async fn extra_paths_are_labelled() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path();
        fs::create_dir_all(ws.join("docs")).unwrap();
        fs::write(ws.join("docs/runbook.md"), "restart the gateway").unwrap();

        let docs = FsDocumentSource::new(ws)
            .with_extra_paths(["docs"])
            .list_documents()
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, "docs/runbook.md");
        assert_eq!(docs[0].source, SOURCE_EXTRA);
    }

    #[tokio::test]
    async fn missing_workspace_is_empty_not_error() {
        let tmp = TempDir::new().unwrap();
        let docs = FsDocumentSource::new(tmp.path().join("nope"))
            .list_documents()
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn static_source_upsert_and_remove() {
        let source = StaticDocumentSource::default();
        source.upsert(SourceDocument::new("a.md", "one", "memory"));
        source.upsert(SourceDocument::new("a.md", "two", "memory"));
        source.upsert(SourceDocument::new("b.md", "three", "memory"));
        source.remove("b.md");

        let docs = tokio_test::block_on(source.list_documents()).unwrap();
        assert_eq!(docs, vec![SourceDocument::new("a.md", "two", "memory")]);
    }
}
