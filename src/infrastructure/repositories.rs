//! Catalog entry storage backed by a directory of JSON files

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::cache::TtlCache;
use crate::application::errors::ApplicationError;
use crate::domain::CatalogEntry;

/// One parsed entry file
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogFile {
    pub path: PathBuf,
    pub entry: CatalogEntry,
}

/// A file that could not be read or parsed as an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableEntry {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogListing {
    pub files: Vec<CatalogFile>,
    pub unreadable: Vec<UnreadableEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Serialized bytes matched the file; nothing was touched
    Unchanged,
}

/// Repository trait for catalog entry access
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// All entries, served from the list cache while fresh
    async fn list_entries(&self) -> Result<Arc<CatalogListing>, ApplicationError>;

    /// All entries, read from disk and re-cached
    async fn refresh_entries(&self) -> Result<Arc<CatalogListing>, ApplicationError>;

    /// Persist `entry` to `path` unless its serialization is unchanged
    async fn write_entry(
        &self,
        path: &Path,
        entry: &CatalogEntry,
    ) -> Result<WriteOutcome, ApplicationError>;
}

/// Read and parse a single entry file. The slug is the file stem.
pub async fn read_entry_file(path: &Path) -> Result<CatalogEntry, ApplicationError> {
    let content = fs::read_to_string(path).await?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| ApplicationError::InvalidEntry {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let slug = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(CatalogEntry::from_value(slug, value)?)
}

/// Directory-of-JSON catalog with a TTL list cache and atomic per-file writes
pub struct FileCatalogRepository {
    root: PathBuf,
    listing_cache: TtlCache<PathBuf, Arc<CatalogListing>>,
    /// Mutex per file so concurrent writers to one entry serialize
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileCatalogRepository {
    pub fn new(root: impl Into<PathBuf>, list_ttl: Duration) -> Self {
        Self {
            root: root.into(),
            listing_cache: TtlCache::new(list_ttl),
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn get_file_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.file_locks.lock().await;
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Every `*.json` file below the root, sorted, skipping hidden directories
    async fn collect_entry_paths(&self) -> Result<Vec<PathBuf>, ApplicationError> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(ApplicationError::CatalogNotFound {
                    path: self.root.clone(),
                });
            }
        }

        let mut paths = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut reader = fs::read_dir(&dir).await?;
            while let Some(item) = reader.next_entry().await? {
                let path = item.path();
                let hidden = item.file_name().to_string_lossy().starts_with('.');
                let file_type = item.file_type().await?;
                if file_type.is_dir() {
                    if !hidden {
                        pending.push(path);
                    }
                } else if !hidden && path.extension().is_some_and(|ext| ext == "json") {
                    paths.push(path);
                }
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn load_listing(&self) -> Result<CatalogListing, ApplicationError> {
        let mut listing = CatalogListing::default();
        for path in self.collect_entry_paths().await? {
            match read_entry_file(&path).await {
                Ok(entry) => listing.files.push(CatalogFile { path, entry }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    listing.unreadable.push(UnreadableEntry {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            root = %self.root.display(),
            entries = listing.files.len(),
            unreadable = listing.unreadable.len(),
            "loaded catalog"
        );
        Ok(listing)
    }

    /// Write to `<file>.tmp` then rename over the original
    async fn atomic_write(&self, path: &Path, content: &str) -> Result<(), ApplicationError> {
        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content).await.map_err(|e| {
            error!("Failed to write temporary entry file {:?}: {}", temp_path, e);
            ApplicationError::Io(e)
        })?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            error!("Failed to replace entry file {:?}: {}", path, e);
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!("Failed to remove temporary file {:?}: {}", temp_path, cleanup);
            }
            return Err(ApplicationError::Io(e));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for FileCatalogRepository {
    async fn list_entries(&self) -> Result<Arc<CatalogListing>, ApplicationError> {
        if let Some(hit) = self.listing_cache.get(&self.root).await {
            debug!("catalog listing served from cache");
            return Ok(hit.value);
        }
        self.refresh_entries().await
    }

    async fn refresh_entries(&self) -> Result<Arc<CatalogListing>, ApplicationError> {
        let listing = Arc::new(self.load_listing().await?);
        self.listing_cache
            .put(self.root.clone(), listing.clone())
            .await;
        Ok(listing)
    }

    async fn write_entry(
        &self,
        path: &Path,
        entry: &CatalogEntry,
    ) -> Result<WriteOutcome, ApplicationError> {
        let lock = self.get_file_lock(path).await;
        let _guard = lock.lock().await;

        let current = match fs::read_to_string(path).await {
            Ok(current) => Some(current),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(ApplicationError::Io(e)),
        };

        // Formatting differences alone never cause a write
        if let Some(current) = &current {
            let on_disk = serde_json::from_str::<serde_json::Value>(current).ok();
            if on_disk.is_some_and(|value| entry.same_content(&value)) {
                debug!(path = %path.display(), "entry unchanged, skipping write");
                return Ok(WriteOutcome::Unchanged);
            }
        }

        let indent = current.as_deref().map_or(DEFAULT_INDENT, detect_indent);
        let content = entry.to_json_with_indent(indent)?;
        self.atomic_write(path, &content).await?;
        self.listing_cache.invalidate(&self.root).await;
        debug!(path = %path.display(), "entry written");
        Ok(WriteOutcome::Written)
    }
}

const DEFAULT_INDENT: &str = "  ";

/// Indentation unit of an existing file: the leading whitespace of its first
/// indented line
fn detect_indent(content: &str) -> &str {
    content
        .lines()
        .skip(1)
        .find_map(|line| {
            let body = line.trim_start_matches(|c: char| c == ' ' || c == '\t');
            let width = line.len() - body.len();
            (width > 0 && !body.is_empty()).then(|| &line[..width])
        })
        .unwrap_or(DEFAULT_INDENT)
}
