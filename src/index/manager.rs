//! Index families and their write-through persistence.
//!
//! Three index families exist per collection, each backed by a [`BPlusTree`]
//! and mirrored into a line-oriented file under the collection's index
//! directory:
//!
//! - the **collection index** maps document id to its position in the
//!   collection's JSON array (`<coll>_collection_index.txt`),
//! - a **forward property index** per schema property maps document id to
//!   the stringified property value (`<prop>_property_index.txt`),
//! - a typed **inverted index** per schema property maps a property value
//!   to the ids of the documents carrying it. The inverted indexes are
//!   in-memory only and rebuild from the forward files at load time.
//!
//! Mutations write through to the files immediately. Callers hold the
//! relevant collection lock around every mutation, so each tree only ever
//! sees one writer at a time.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::Result;
use crate::index::btree::BPlusTree;
use crate::index::typed::{PropertyType, TypedValue};
use crate::storage::layout::{self, Layout};
use crate::storage::schema::Schema;

/// Document id -> position in the collection's on-disk array.
#[derive(Debug, Default)]
struct CollectionIndex {
    tree: BPlusTree<String, usize>,
}

/// Document id -> stringified property value.
#[derive(Debug, Default)]
struct PropertyIndex {
    tree: BPlusTree<String, String>,
}

/// Typed property value -> ids of documents carrying it.
#[derive(Debug)]
struct InvertedPropertyIndex {
    value_type: PropertyType,
    tree: BPlusTree<TypedValue, Vec<String>>,
}

impl InvertedPropertyIndex {
    fn new(value_type: PropertyType) -> Self {
        Self {
            value_type,
            tree: BPlusTree::new(),
        }
    }

    fn add(&mut self, value: TypedValue, id: &str) {
        let mut ids = self.tree.search(&value).cloned().unwrap_or_default();
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
        self.tree.insert(value, ids);
    }

    fn remove(&mut self, value: &TypedValue, id: &str) {
        let Some(ids) = self.tree.search(value) else {
            return;
        };
        let mut ids = ids.clone();
        ids.retain(|existing| existing != id);
        if ids.is_empty() {
            self.tree.delete(value);
        } else {
            self.tree.insert(value.clone(), ids);
        }
    }
}

/// Owns every in-memory index and keeps the index files in sync with them.
#[derive(Debug)]
pub struct IndexManager {
    layout: Arc<Layout>,
    collection_indexes: DashMap<String, CollectionIndex>,
    property_indexes: DashMap<String, PropertyIndex>,
    inverted_indexes: DashMap<String, InvertedPropertyIndex>,
}

fn collection_key(db: &str, coll: &str) -> String {
    format!("{db}::{coll}")
}

fn property_key(db: &str, coll: &str, prop: &str) -> String {
    format!("{db}::{coll}::{prop}")
}

impl IndexManager {
    pub fn new(layout: Arc<Layout>) -> Self {
        Self {
            layout,
            collection_indexes: DashMap::new(),
            property_indexes: DashMap::new(),
            inverted_indexes: DashMap::new(),
        }
    }

    /// Registers the index set for a freshly created collection and creates
    /// its collection-index file on disk.
    pub fn create_collection_indexes(&self, db: &str, coll: &str, schema: &Schema) -> Result<()> {
        self.collection_indexes
            .insert(collection_key(db, coll), CollectionIndex::default());
        for (prop, spec) in &schema.properties {
            let key = property_key(db, coll, prop);
            self.property_indexes.insert(key.clone(), PropertyIndex::default());
            self.inverted_indexes
                .insert(key, InvertedPropertyIndex::new(spec.property_type));
        }
        self.layout
            .touch(&self.layout.collection_index_file(db, coll))
    }

    /// Records a new document at the end of the collection array and indexes
    /// its schema properties. A duplicate id is logged and skipped rather
    /// than corrupting positions.
    pub fn insert_document(
        &self,
        db: &str,
        coll: &str,
        schema: &Schema,
        id: &str,
        doc: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let key = collection_key(db, coll);
        let mut index = self.collection_indexes.entry(key).or_default();
        if index.tree.search(&id.to_string()).is_some() {
            tracing::warn!("Document {} is already indexed in {}/{}, skipping", id, db, coll);
            return Ok(());
        }
        let position = index.tree.len();
        index.tree.insert(id.to_string(), position);
        drop(index);
        self.layout.append_index_record(
            &self.layout.collection_index_file(db, coll),
            id,
            &position.to_string(),
        )?;

        for (prop, spec) in &schema.properties {
            let Some(value) = doc.get(prop) else {
                continue;
            };
            self.insert_property_entry(db, coll, prop, spec.property_type, id, value)?;
        }
        Ok(())
    }

    fn insert_property_entry(
        &self,
        db: &str,
        coll: &str,
        prop: &str,
        value_type: PropertyType,
        id: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        let raw = crate::index::typed::index_string(value);
        let key = property_key(db, coll, prop);

        let mut forward = self.property_indexes.entry(key.clone()).or_default();
        forward.tree.insert(id.to_string(), raw.clone());
        drop(forward);
        self.layout
            .append_index_record(&self.layout.property_index_file(db, coll, prop), id, &raw)?;

        let typed = value_type.cast(&raw)?;
        let mut inverted = self
            .inverted_indexes
            .entry(key)
            .or_insert_with(|| InvertedPropertyIndex::new(value_type));
        inverted.add(typed, id);
        Ok(())
    }

    /// Position of a document in its collection array, if indexed.
    pub fn position_of(&self, db: &str, coll: &str, id: &str) -> Option<usize> {
        self.collection_indexes
            .get(&collection_key(db, coll))
            .and_then(|index| index.tree.search(&id.to_string()).copied())
    }

    pub fn collection_size(&self, db: &str, coll: &str) -> usize {
        self.collection_indexes
            .get(&collection_key(db, coll))
            .map(|index| index.tree.len())
            .unwrap_or(0)
    }

    /// Indexed value of one document's property, straight from the forward
    /// index.
    pub fn property_value(&self, db: &str, coll: &str, prop: &str, id: &str) -> Option<String> {
        self.property_indexes
            .get(&property_key(db, coll, prop))
            .and_then(|index| index.tree.search(&id.to_string()).cloned())
    }

    /// Ids of every document whose `prop` equals `raw` cast to the index's
    /// declared type, in insertion order. An absent index matches nothing.
    pub fn search_by_property(&self, db: &str, coll: &str, prop: &str, raw: &str) -> Result<Vec<String>> {
        let Some(index) = self.inverted_indexes.get(&property_key(db, coll, prop)) else {
            return Ok(Vec::new());
        };
        let typed = index.value_type.cast(raw)?;
        Ok(index.tree.search(&typed).cloned().unwrap_or_default())
    }

    /// Re-derives every property entry for an updated document. Its position
    /// in the collection index does not move on update.
    pub fn reindex_document(
        &self,
        db: &str,
        coll: &str,
        schema: &Schema,
        id: &str,
        doc: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        for (prop, spec) in &schema.properties {
            self.delete_property_entry(db, coll, prop, spec.property_type, id)?;
            if let Some(value) = doc.get(prop) {
                self.insert_property_entry(db, coll, prop, spec.property_type, id, value)?;
            }
        }
        Ok(())
    }

    /// Removes every index entry for one document: its property entries and
    /// its collection-index slot, shifting the positions of all documents
    /// that sat after it down by one.
    pub fn delete_document(
        &self,
        db: &str,
        coll: &str,
        schema: &Schema,
        id: &str,
    ) -> Result<()> {
        for (prop, spec) in &schema.properties {
            self.delete_property_entry(db, coll, prop, spec.property_type, id)?;
        }
        self.delete_from_collection_index(db, coll, id)
    }

    fn delete_property_entry(
        &self,
        db: &str,
        coll: &str,
        prop: &str,
        value_type: PropertyType,
        id: &str,
    ) -> Result<()> {
        let key = property_key(db, coll, prop);
        let removed_value = {
            let Some(mut forward) = self.property_indexes.get_mut(&key) else {
                return Ok(());
            };
            let value = forward.tree.search(&id.to_string()).cloned();
            forward.tree.delete(&id.to_string());
            value
        };
        let Some(raw) = removed_value else {
            return Ok(());
        };

        if let Some(mut inverted) = self.inverted_indexes.get_mut(&key) {
            let typed = value_type.cast(&raw)?;
            inverted.remove(&typed, id);
        }

        let entries: Vec<(String, String)> = self
            .property_indexes
            .get(&key)
            .map(|index| index.tree.all_entries())
            .unwrap_or_default();
        self.layout
            .rewrite_index_file(&self.layout.property_index_file(db, coll, prop), &entries)
    }

    fn delete_from_collection_index(&self, db: &str, coll: &str, id: &str) -> Result<()> {
        let key = collection_key(db, coll);
        let entries = {
            let Some(mut index) = self.collection_indexes.get_mut(&key) else {
                return Ok(());
            };
            let Some(position) = index.tree.search(&id.to_string()).copied() else {
                return Ok(());
            };
            index.tree.delete(&id.to_string());
            // Close the gap left in the array: everything past the removed
            // position slides down one slot.
            let shifted: Vec<(String, usize)> = index
                .tree
                .all_entries()
                .into_iter()
                .map(|(doc_id, pos)| {
                    if pos > position {
                        (doc_id, pos - 1)
                    } else {
                        (doc_id, pos)
                    }
                })
                .collect();
            for (doc_id, pos) in &shifted {
                index.tree.insert(doc_id.clone(), *pos);
            }
            shifted
        };
        let records: Vec<(String, String)> = entries
            .into_iter()
            .map(|(doc_id, pos)| (doc_id, pos.to_string()))
            .collect();
        self.layout
            .rewrite_index_file(&self.layout.collection_index_file(db, coll), &records)
    }

    /// Drops every index for a collection, in memory and on disk. Safe to
    /// call for collections that were never indexed.
    pub fn delete_collection_indexes(&self, db: &str, coll: &str) -> Result<()> {
        self.collection_indexes.remove(&collection_key(db, coll));
        let prefix = format!("{db}::{coll}::");
        self.property_indexes.retain(|key, _| !key.starts_with(&prefix));
        self.inverted_indexes.retain(|key, _| !key.starts_with(&prefix));
        self.layout
            .remove_dir_recursive(&self.layout.collection_indexes_dir(db, coll))
    }

    /// Drops every index belonging to a database.
    pub fn delete_database_indexes(&self, db: &str) -> Result<()> {
        let prefix = format!("{db}::");
        self.collection_indexes.retain(|key, _| !key.starts_with(&prefix));
        self.property_indexes.retain(|key, _| !key.starts_with(&prefix));
        self.inverted_indexes.retain(|key, _| !key.starts_with(&prefix));
        self.layout.remove_dir_recursive(&self.layout.indexes_dir(db))
    }

    /// Rebuilds every in-memory index from the index files of every database
    /// under the data root. Called once at startup.
    pub fn load_all(&self, schema_for: impl Fn(&str, &str) -> Option<Schema>) -> Result<()> {
        for db in self.layout.list_databases() {
            let indexes_dir = self.layout.indexes_dir(&db);
            let Ok(entries) = std::fs::read_dir(&indexes_dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                if !entry.path().is_dir() {
                    continue;
                }
                let Ok(coll) = entry.file_name().into_string() else {
                    continue;
                };
                let schema = schema_for(&db, &coll);
                self.load_collection(&db, &coll, schema.as_ref())?;
            }
        }
        Ok(())
    }

    fn load_collection(&self, db: &str, coll: &str, schema: Option<&Schema>) -> Result<()> {
        let dir = self.layout.collection_indexes_dir(db, coll);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Ok(());
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if layout::is_collection_index_file(&file_name) {
                self.load_collection_index(db, coll, &entry.path())?;
            } else if layout::is_property_index_file(&file_name) {
                let Some(prop) = file_name.strip_suffix(layout::PROPERTY_INDEX_SUFFIX) else {
                    continue;
                };
                let value_type = schema
                    .and_then(|s| s.property_type(prop))
                    .unwrap_or(PropertyType::String);
                self.load_property_index(db, coll, prop, value_type, &entry.path())?;
            }
        }
        Ok(())
    }

    fn load_collection_index(&self, db: &str, coll: &str, path: &std::path::Path) -> Result<()> {
        let mut index = CollectionIndex::default();
        for (id, position) in self.layout.read_index_lines(path)? {
            match position.parse::<usize>() {
                Ok(position) => index.tree.insert(id, position),
                Err(_) => {
                    tracing::warn!("Skipping collection index record with bad position: {}", id)
                }
            }
        }
        tracing::info!(
            "Loaded collection index {}/{} with {} documents",
            db,
            coll,
            index.tree.len()
        );
        self.collection_indexes.insert(collection_key(db, coll), index);
        Ok(())
    }

    fn load_property_index(
        &self,
        db: &str,
        coll: &str,
        prop: &str,
        value_type: PropertyType,
        path: &std::path::Path,
    ) -> Result<()> {
        let mut forward = PropertyIndex::default();
        let mut inverted = InvertedPropertyIndex::new(value_type);
        for (id, raw) in self.layout.read_index_lines(path)? {
            match value_type.cast(&raw) {
                Ok(typed) => {
                    forward.tree.insert(id.clone(), raw);
                    inverted.add(typed, &id);
                }
                Err(_) => {
                    tracing::warn!(
                        "Skipping property index record with uncastable value for {}: {}",
                        id,
                        raw
                    );
                }
            }
        }
        let key = property_key(db, coll, prop);
        self.property_indexes.insert(key.clone(), forward);
        self.inverted_indexes.insert(key, inverted);
        Ok(())
    }
}
