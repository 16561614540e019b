//! On-disk layout and file primitives.
//!
//! One directory tree per database under a configurable data root:
//!
//! ```text
//! <root>/<db>/collections/<coll>.json            document array
//! <root>/<db>/schemas/<coll>Schema.json          collection schema
//! <root>/<db>/indexes/<coll>/<coll>_collection_index.txt
//! <root>/<db>/indexes/<coll>/<prop>_property_index.txt
//! ```
//!
//! Index files are line-oriented `key,value` records. Every file rewrite
//! goes through a temp file in the same directory followed by a rename, so
//! a crash never leaves a half-written array or index behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::error::{NodeError, Result};

pub const COLLECTION_INDEX_SUFFIX: &str = "_collection_index.txt";
pub const PROPERTY_INDEX_SUFFIX: &str = "_property_index.txt";

/// Resource names become path components, so anything empty, whitespace-y
/// or separator-carrying is rejected before any file is touched.
pub fn invalid_resource_name(name: &str) -> bool {
    name.trim().is_empty()
        || name.chars().any(char::is_whitespace)
        || name.contains('/')
        || name.contains('\\')
}

pub fn is_collection_index_file(file_name: &str) -> bool {
    file_name.ends_with(COLLECTION_INDEX_SUFFIX)
}

pub fn is_property_index_file(file_name: &str) -> bool {
    file_name.ends_with(PROPERTY_INDEX_SUFFIX)
}

#[derive(Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| NodeError::operation_failed(format!("create data root: {e}")))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_dir(&self, db: &str) -> PathBuf {
        self.root.join(db)
    }

    pub fn schemas_dir(&self, db: &str) -> PathBuf {
        self.database_dir(db).join("schemas")
    }

    pub fn collections_dir(&self, db: &str) -> PathBuf {
        self.database_dir(db).join("collections")
    }

    pub fn indexes_dir(&self, db: &str) -> PathBuf {
        self.database_dir(db).join("indexes")
    }

    pub fn collection_indexes_dir(&self, db: &str, coll: &str) -> PathBuf {
        self.indexes_dir(db).join(coll)
    }

    pub fn collection_file(&self, db: &str, coll: &str) -> PathBuf {
        self.collections_dir(db).join(format!("{coll}.json"))
    }

    pub fn schema_file(&self, db: &str, coll: &str) -> PathBuf {
        self.schemas_dir(db).join(format!("{coll}Schema.json"))
    }

    pub fn collection_index_file(&self, db: &str, coll: &str) -> PathBuf {
        self.collection_indexes_dir(db, coll)
            .join(format!("{coll}{COLLECTION_INDEX_SUFFIX}"))
    }

    pub fn property_index_file(&self, db: &str, coll: &str, prop: &str) -> PathBuf {
        self.collection_indexes_dir(db, coll)
            .join(format!("{prop}{PROPERTY_INDEX_SUFFIX}"))
    }

    pub fn database_exists(&self, db: &str) -> bool {
        self.database_dir(db).is_dir()
    }

    pub fn collection_exists(&self, db: &str, coll: &str) -> bool {
        self.collection_file(db, coll).is_file()
    }

    pub fn list_databases(&self) -> Vec<String> {
        list_dir_names(&self.root, |entry| entry.is_dir())
    }

    pub fn list_collections(&self, db: &str) -> Vec<String> {
        list_dir_names(&self.collections_dir(db), |entry| entry.is_file())
            .into_iter()
            .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
            .collect()
    }

    pub fn create_dir_if_missing(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .map_err(|e| NodeError::operation_failed(format!("create {}: {e}", path.display())))
    }

    /// Reads a collection's document array. A missing file is a not-found
    /// condition; an empty file reads as an empty array.
    pub fn read_documents(&self, path: &Path) -> Result<Vec<Map<String, Value>>> {
        if !path.is_file() {
            return Err(NodeError::not_found("collection file"));
        }
        let bytes = fs::read(path)
            .map_err(|_| NodeError::operation_failed("read the existing collection"))?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes)
            .map_err(|_| NodeError::operation_failed("read the existing collection"))
    }

    pub fn write_documents(&self, path: &Path, docs: &[Map<String, Value>]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(docs)
            .map_err(|e| NodeError::operation_failed(format!("serialize collection: {e}")))?;
        self.write_atomic(path, &bytes)
    }

    pub fn write_pretty_json(&self, path: &Path, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| NodeError::operation_failed(format!("serialize json: {e}")))?;
        self.write_atomic(path, &bytes)
    }

    /// Appends a `key,value` record to an index file, replacing any earlier
    /// record for the same key.
    pub fn append_index_record(&self, path: &Path, key: &str, value: &str) -> Result<()> {
        let mut lines = self.read_index_lines(path)?;
        lines.retain(|(k, _)| k != key);
        lines.push((key.to_string(), value.to_string()));
        self.write_index_lines(path, &lines)
    }

    /// Rewrites an index file from the full entry set. An empty entry set
    /// removes the file instead of leaving a zero-length one behind.
    pub fn rewrite_index_file(&self, path: &Path, entries: &[(String, String)]) -> Result<()> {
        if entries.is_empty() {
            if path.is_file() {
                fs::remove_file(path).map_err(|e| {
                    NodeError::operation_failed(format!("remove empty index file: {e}"))
                })?;
            }
            return Ok(());
        }
        self.write_index_lines(path, entries)
    }

    /// Reads `key,value` lines from an index file. Malformed lines are
    /// skipped, a missing file reads as empty.
    pub fn read_index_lines(&self, path: &Path) -> Result<Vec<(String, String)>> {
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| NodeError::operation_failed(format!("read index file: {e}")))?;
        let mut entries = Vec::new();
        for line in content.lines() {
            match line.split_once(',') {
                Some((key, value)) if !key.trim().is_empty() => {
                    entries.push((key.trim().to_string(), value.trim().to_string()));
                }
                _ => {
                    if !line.trim().is_empty() {
                        tracing::warn!("Skipping malformed index record: {}", line);
                    }
                }
            }
        }
        Ok(entries)
    }

    pub fn remove_dir_recursive(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            fs::remove_dir_all(path)
                .map_err(|e| NodeError::operation_failed(format!("remove {}: {e}", path.display())))?;
        }
        Ok(())
    }

    pub fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .map_err(|e| NodeError::operation_failed(format!("remove {}: {e}", path.display())))
    }

    pub fn touch(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_if_missing(parent)?;
        }
        if !path.exists() {
            fs::File::create(path).map_err(|e| {
                NodeError::operation_failed(format!("create {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }

    fn write_index_lines(&self, path: &Path, entries: &[(String, String)]) -> Result<()> {
        let mut content = String::new();
        for (key, value) in entries {
            content.push_str(key);
            content.push(',');
            content.push_str(value);
            content.push('\n');
        }
        self.write_atomic(path, content.as_bytes())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| NodeError::operation_failed("resolve parent directory"))?;
        self.create_dir_if_missing(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|e| NodeError::operation_failed(format!("create temp file: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| NodeError::operation_failed(format!("write temp file: {e}")))?;
        tmp.persist(path)
            .map_err(|e| NodeError::operation_failed(format!("persist {}: {e}", path.display())))?;
        Ok(())
    }
}

fn list_dir_names(dir: &Path, keep: impl Fn(&Path) -> bool) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| keep(&entry.path()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}
