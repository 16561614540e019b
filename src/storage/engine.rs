//! Disk storage engine.
//!
//! All database, collection and document operations against the local
//! filesystem. Every mutation takes the affected resource locks in
//! containment order (database, then collection, then document), applies the
//! change to the collection file through an atomic rewrite, and then updates
//! the index families through the [`IndexManager`].
//!
//! Documents carry a `_version` counter for optimistic concurrency: updates
//! name the version they read, and a mismatch with the stored version fails
//! with a conflict instead of silently overwriting a newer write.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{NodeError, Result};
use crate::index::manager::IndexManager;
use crate::storage::layout::{invalid_resource_name, Layout};
use crate::storage::locks::LocksManager;
use crate::storage::schema::Schema;
use crate::storage::types::{Document, ID_FIELD};

#[derive(Debug)]
pub struct DiskStorage {
    layout: Arc<Layout>,
    indexes: Arc<IndexManager>,
    locks: Arc<LocksManager>,
}

impl DiskStorage {
    pub fn new(layout: Arc<Layout>, indexes: Arc<IndexManager>, locks: Arc<LocksManager>) -> Self {
        Self {
            layout,
            indexes,
            locks,
        }
    }

    /// Rebuilds locks and indexes for everything already on disk. Called
    /// once before the node starts serving.
    pub fn bootstrap(&self) -> Result<()> {
        for db in self.layout.list_databases() {
            self.locks.register_existing_database(&db);
            for coll in self.layout.list_collections(&db) {
                self.locks.register_existing_collection(&db, &coll);
                let path = self.layout.collection_file(&db, &coll);
                for fields in self.layout.read_documents(&path)? {
                    if let Some(id) = fields.get(ID_FIELD).and_then(Value::as_str) {
                        self.locks.register_existing_document(&db, &coll, id);
                    }
                }
            }
        }
        self.indexes
            .load_all(|db, coll| self.read_schema(db, coll).ok())?;
        tracing::info!("Storage bootstrap complete, {} databases", self.layout.list_databases().len());
        Ok(())
    }

    // ============================================================
    // DATABASES
    // ============================================================

    pub fn create_database(&self, db: &str) -> Result<()> {
        if invalid_resource_name(db) {
            return Err(NodeError::InvalidResourceName("database"));
        }
        // The atomic lock claim is the duplicate check: of any number of
        // concurrent creators exactly one gets past this line.
        self.locks.create_database_lock(db)?;
        if self.layout.database_exists(db) {
            // Directory present without a registered lock, left by an
            // external writer. Keep the claim so the registry matches disk.
            return Err(NodeError::ResourceAlreadyExists("database"));
        }
        if let Err(err) = self.create_database_dirs(db) {
            self.locks.delete_database_lock(db);
            return Err(err);
        }
        tracing::info!("Created database {}", db);
        Ok(())
    }

    fn create_database_dirs(&self, db: &str) -> Result<()> {
        self.layout.create_dir_if_missing(&self.layout.collections_dir(db))?;
        self.layout.create_dir_if_missing(&self.layout.schemas_dir(db))?;
        self.layout.create_dir_if_missing(&self.layout.indexes_dir(db))
    }

    pub fn delete_database(&self, db: &str) -> Result<()> {
        let lock = self.locks.database_lock(db)?;
        let _guard = lock.lock();
        if !self.layout.database_exists(db) {
            return Err(NodeError::not_found("database"));
        }
        self.indexes.delete_database_indexes(db)?;
        self.layout.remove_dir_recursive(&self.layout.database_dir(db))?;
        drop(_guard);
        self.locks.delete_database_lock(db);
        tracing::info!("Deleted database {}", db);
        Ok(())
    }

    pub fn read_databases(&self) -> Vec<String> {
        self.layout.list_databases()
    }

    // ============================================================
    // COLLECTIONS
    // ============================================================

    pub fn create_collection(&self, db: &str, coll: &str, schema: Schema) -> Result<()> {
        if invalid_resource_name(coll) {
            return Err(NodeError::InvalidResourceName("collection"));
        }
        let db_lock = self.locks.database_lock(db)?;
        let _db_guard = db_lock.lock();
        if self.layout.collection_exists(db, coll) {
            return Err(NodeError::ResourceAlreadyExists("collection"));
        }
        self.locks.create_collection_lock(db, coll)?;
        self.layout
            .write_documents(&self.layout.collection_file(db, coll), &[])?;
        let schema_value = serde_json::to_value(&schema)
            .map_err(|e| NodeError::operation_failed(format!("serialize schema: {e}")))?;
        self.layout
            .write_pretty_json(&self.layout.schema_file(db, coll), &schema_value)?;
        self.indexes.create_collection_indexes(db, coll, &schema)?;
        tracing::info!("Created collection {}/{}", db, coll);
        Ok(())
    }

    pub fn delete_collection(&self, db: &str, coll: &str) -> Result<()> {
        let db_lock = self.locks.database_lock(db)?;
        let _db_guard = db_lock.lock();
        let coll_lock = self.locks.collection_lock(db, coll)?;
        let _coll_guard = coll_lock.lock();
        if !self.layout.collection_exists(db, coll) {
            return Err(NodeError::not_found("collection"));
        }
        self.indexes.delete_collection_indexes(db, coll)?;
        self.layout.remove_file(&self.layout.collection_file(db, coll))?;
        let schema_file = self.layout.schema_file(db, coll);
        if schema_file.is_file() {
            self.layout.remove_file(&schema_file)?;
        }
        drop(_coll_guard);
        self.locks.delete_collection_lock(db, coll);
        tracing::info!("Deleted collection {}/{}", db, coll);
        Ok(())
    }

    pub fn read_collections(&self, db: &str) -> Result<Vec<String>> {
        if !self.layout.database_exists(db) {
            return Err(NodeError::not_found("database"));
        }
        Ok(self.layout.list_collections(db))
    }

    pub fn read_schema(&self, db: &str, coll: &str) -> Result<Schema> {
        let path = self.layout.schema_file(db, coll);
        if !path.is_file() {
            return Err(NodeError::not_found("collection schema"));
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| NodeError::operation_failed(format!("read schema file: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| NodeError::operation_failed(format!("parse schema file: {e}")))
    }

    // ============================================================
    // DOCUMENTS
    // ============================================================

    /// Creates a document from a client-supplied body: assigns a fresh id
    /// and version 0, then stores it.
    pub fn create_document(&self, db: &str, coll: &str, body: Map<String, Value>) -> Result<Document> {
        let doc = Document::new_from_body(body)?;
        self.insert_document(db, coll, doc)
    }

    /// Stores an already-stamped document at the end of the collection
    /// array. Replication uses this path directly so replicas keep the
    /// owner-assigned id and version.
    pub fn insert_document(&self, db: &str, coll: &str, doc: Document) -> Result<Document> {
        let schema = self.read_schema(db, coll)?;
        schema.validate_document(doc.fields())?;
        let id = doc
            .id()
            .ok_or_else(|| NodeError::operation_failed("read document id"))?
            .to_string();

        let coll_lock = self.locks.collection_lock(db, coll)?;
        let _coll_guard = coll_lock.lock();
        if self.indexes.position_of(db, coll, &id).is_some() {
            return Err(NodeError::ResourceAlreadyExists("document"));
        }
        let doc_lock = self.locks.create_document_lock(db, coll, &id);
        let _doc_guard = doc_lock.lock();

        let result = self.append_locked(db, coll, &schema, &doc);
        if result.is_err() {
            drop(_doc_guard);
            self.locks.delete_document_lock(db, coll, &id);
        }
        result?;
        tracing::info!("Stored document {} in {}/{}", id, db, coll);
        Ok(doc)
    }

    fn append_locked(&self, db: &str, coll: &str, schema: &Schema, doc: &Document) -> Result<()> {
        let path = self.layout.collection_file(db, coll);
        let mut docs = self.layout.read_documents(&path)?;
        docs.push(doc.fields().clone());
        self.layout.write_documents(&path, &docs)?;
        let id = doc
            .id()
            .ok_or_else(|| NodeError::operation_failed("read document id"))?;
        if let Err(err) = self.indexes.insert_document(db, coll, schema, id, doc.fields()) {
            // The document is on disk but unindexed. The next bootstrap
            // cannot repair this on its own, so make it loud.
            tracing::error!("Indexes out of sync for {}/{}/{}: {}", db, coll, id, err);
            return Err(err);
        }
        Ok(())
    }

    /// Replaces a document's body if `expected_version` still matches the
    /// stored `_version`, bumping the version by one.
    pub fn update_document(
        &self,
        db: &str,
        coll: &str,
        id: &str,
        body: Map<String, Value>,
        expected_version: u64,
    ) -> Result<Document> {
        let schema = self.read_schema(db, coll)?;
        let coll_lock = self.locks.collection_lock(db, coll)?;
        let _coll_guard = coll_lock.lock();
        let doc_lock = self.locks.document_lock(db, coll, id)?;
        let _doc_guard = doc_lock.lock();

        let path = self.layout.collection_file(db, coll);
        let mut docs = self.layout.read_documents(&path)?;
        let position = self.position_in(&docs, db, coll, id)?;

        let mut doc = Document::from_stored(docs[position].clone());
        if doc.version() != Some(expected_version) {
            return Err(NodeError::VersionMismatch);
        }
        doc.replace_body(body)?;
        schema.validate_document(doc.fields())?;

        docs[position] = doc.fields().clone();
        self.layout.write_documents(&path, &docs)?;
        if let Err(err) = self.indexes.reindex_document(db, coll, &schema, id, doc.fields()) {
            tracing::error!("Indexes out of sync for {}/{}/{}: {}", db, coll, id, err);
            return Err(err);
        }
        tracing::info!("Updated document {} in {}/{} to version {:?}", id, db, coll, doc.version());
        Ok(doc)
    }

    /// Stores a replica copy of a document the owner already updated,
    /// overwriting whatever version this node holds.
    pub fn replace_document(&self, db: &str, coll: &str, doc: Document) -> Result<()> {
        let schema = self.read_schema(db, coll)?;
        let id = doc
            .id()
            .ok_or_else(|| NodeError::operation_failed("read document id"))?
            .to_string();
        let coll_lock = self.locks.collection_lock(db, coll)?;
        let _coll_guard = coll_lock.lock();
        let doc_lock = self.locks.document_lock(db, coll, &id)?;
        let _doc_guard = doc_lock.lock();

        let path = self.layout.collection_file(db, coll);
        let mut docs = self.layout.read_documents(&path)?;
        let position = self.position_in(&docs, db, coll, &id)?;
        docs[position] = doc.fields().clone();
        self.layout.write_documents(&path, &docs)?;
        self.indexes.reindex_document(db, coll, &schema, &id, doc.fields())
    }

    pub fn delete_document(&self, db: &str, coll: &str, id: &str) -> Result<()> {
        let schema = self.read_schema(db, coll)?;
        let coll_lock = self.locks.collection_lock(db, coll)?;
        let _coll_guard = coll_lock.lock();
        let doc_lock = self.locks.document_lock(db, coll, id)?;
        let _doc_guard = doc_lock.lock();

        let path = self.layout.collection_file(db, coll);
        let mut docs = self.layout.read_documents(&path)?;
        let position = self.position_in(&docs, db, coll, id)?;
        docs.remove(position);
        self.layout.write_documents(&path, &docs)?;
        self.indexes.delete_document(db, coll, &schema, id)?;
        drop(_doc_guard);
        self.locks.delete_document_lock(db, coll, id);
        tracing::info!("Deleted document {} from {}/{}", id, db, coll);
        Ok(())
    }

    pub fn fetch_document(&self, db: &str, coll: &str, id: &str) -> Result<Document> {
        let path = self.layout.collection_file(db, coll);
        let docs = self.layout.read_documents(&path)?;
        let position = self.position_in(&docs, db, coll, id)?;
        Ok(Document::from_stored(docs[position].clone()))
    }

    pub fn fetch_all(&self, db: &str, coll: &str) -> Result<Vec<Map<String, Value>>> {
        let path = self.layout.collection_file(db, coll);
        self.layout.read_documents(&path)
    }

    /// Equality query against one schema property, served from the inverted
    /// index.
    pub fn fetch_documents_by_property(
        &self,
        db: &str,
        coll: &str,
        prop: &str,
        raw: &str,
    ) -> Result<Vec<Map<String, Value>>> {
        let schema = self.read_schema(db, coll)?;
        if schema.property_type(prop).is_none() {
            return Err(NodeError::not_found("property"));
        }
        let ids = self.indexes.search_by_property(db, coll, prop, raw)?;
        let path = self.layout.collection_file(db, coll);
        let docs = self.layout.read_documents(&path)?;
        let mut hits = Vec::with_capacity(ids.len());
        for id in ids {
            let position = self.position_in(&docs, db, coll, &id)?;
            hits.push(docs[position].clone());
        }
        Ok(hits)
    }

    /// Single property of a single document, served from the forward
    /// property index. Values come back in their stringified indexed form.
    pub fn read_document_property(&self, db: &str, coll: &str, id: &str, prop: &str) -> Result<String> {
        let schema = self.read_schema(db, coll)?;
        if schema.property_type(prop).is_none() {
            return Err(NodeError::not_found("property"));
        }
        self.indexes
            .property_value(db, coll, prop, id)
            .ok_or_else(|| NodeError::not_found("document property"))
    }

    /// Resolves a document's array position, preferring the collection
    /// index and falling back to a scan when the index is cold.
    fn position_in(
        &self,
        docs: &[Map<String, Value>],
        db: &str,
        coll: &str,
        id: &str,
    ) -> Result<usize> {
        if let Some(position) = self.indexes.position_of(db, coll, id) {
            if position < docs.len()
                && docs[position].get(ID_FIELD).and_then(Value::as_str) == Some(id)
            {
                return Ok(position);
            }
            tracing::warn!("Stale collection index position for {}/{}/{}", db, coll, id);
        }
        docs.iter()
            .position(|fields| fields.get(ID_FIELD).and_then(Value::as_str) == Some(id))
            .ok_or_else(|| NodeError::not_found("document"))
    }
}
