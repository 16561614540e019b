//! Per-resource lock registry.
//!
//! One mutex per database, collection and document, created when the
//! resource is created and discarded when it is deleted. Lookups for a
//! resource whose lock was never registered fail with not-found, which
//! doubles as a cheap existence check on the hot paths.
//!
//! Lock acquisition always follows resource containment order, database
//! before collection before document, and a held guard is never re-acquired
//! on the same task. Guards release in reverse order when they drop.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{NodeError, Result};

type ResourceLock = Arc<Mutex<()>>;

fn collection_key(db: &str, coll: &str) -> String {
    format!("{db}::{coll}")
}

fn document_key(db: &str, coll: &str, id: &str) -> String {
    format!("{db}::{coll}::{id}")
}

#[derive(Debug, Default)]
pub struct LocksManager {
    database_locks: DashMap<String, ResourceLock>,
    collection_locks: DashMap<String, ResourceLock>,
    document_locks: DashMap<String, ResourceLock>,
}

impl LocksManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a lock for a new database. The entry claim is atomic, so
    /// of any number of concurrent creators exactly one wins and the rest
    /// fail with AlreadyExists.
    pub fn create_database_lock(&self, db: &str) -> Result<()> {
        match self.database_locks.entry(db.to_string()) {
            Entry::Occupied(_) => Err(NodeError::ResourceAlreadyExists("database")),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(())));
                Ok(())
            }
        }
    }

    /// Registers a lock for a new collection, with the same atomic claim as
    /// database locks.
    pub fn create_collection_lock(&self, db: &str, coll: &str) -> Result<()> {
        match self.collection_locks.entry(collection_key(db, coll)) {
            Entry::Occupied(_) => Err(NodeError::ResourceAlreadyExists("collection")),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(())));
                Ok(())
            }
        }
    }

    /// Registers a lock for a new document, replacing any stale one.
    pub fn create_document_lock(&self, db: &str, coll: &str, id: &str) -> ResourceLock {
        let lock: ResourceLock = Arc::new(Mutex::new(()));
        self.document_locks
            .insert(document_key(db, coll, id), Arc::clone(&lock));
        lock
    }

    pub fn database_lock(&self, db: &str) -> Result<ResourceLock> {
        self.database_locks
            .get(db)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| NodeError::not_found("database"))
    }

    pub fn collection_lock(&self, db: &str, coll: &str) -> Result<ResourceLock> {
        self.collection_locks
            .get(&collection_key(db, coll))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| NodeError::not_found("collection"))
    }

    pub fn document_lock(&self, db: &str, coll: &str, id: &str) -> Result<ResourceLock> {
        self.document_locks
            .get(&document_key(db, coll, id))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| NodeError::not_found("document"))
    }

    pub fn delete_database_lock(&self, db: &str) {
        self.database_locks.remove(db);
        let prefix = format!("{db}::");
        self.collection_locks.retain(|key, _| !key.starts_with(&prefix));
        self.document_locks.retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn delete_collection_lock(&self, db: &str, coll: &str) {
        self.collection_locks.remove(&collection_key(db, coll));
        let prefix = format!("{db}::{coll}::");
        self.document_locks.retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn delete_document_lock(&self, db: &str, coll: &str, id: &str) {
        self.document_locks.remove(&document_key(db, coll, id));
    }

    /// Rebuilds the registry for resources found on disk at startup.
    pub fn register_existing_database(&self, db: &str) {
        self.database_locks
            .entry(db.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())));
    }

    pub fn register_existing_collection(&self, db: &str, coll: &str) {
        self.collection_locks
            .entry(collection_key(db, coll))
            .or_insert_with(|| Arc::new(Mutex::new(())));
    }

    pub fn register_existing_document(&self, db: &str, coll: &str, id: &str) {
        self.document_locks
            .entry(document_key(db, coll, id))
            .or_insert_with(|| Arc::new(Mutex::new(())));
    }
}
