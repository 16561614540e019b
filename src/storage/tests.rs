//! Storage Module Tests
//!
//! Validates the disk engine's lifecycle operations and concurrency guards.
//!
//! ## Test Scopes
//! - **Lifecycle**: Database and collection creation, duplication conflicts,
//!   name validation, deletion.
//! - **Documents**: Id and version stamping, schema validation, optimistic
//!   version checks, property queries.
//! - **Bootstrap**: A fresh engine over an existing data root serves the
//!   same documents and indexes.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Barrier};

    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    use crate::error::NodeError;
    use crate::index::manager::IndexManager;
    use crate::index::typed::PropertyType;
    use crate::storage::engine::DiskStorage;
    use crate::storage::layout::Layout;
    use crate::storage::locks::LocksManager;
    use crate::storage::schema::{PropertySpec, Schema};

    fn engine_at(dir: &TempDir) -> DiskStorage {
        let layout = Arc::new(Layout::new(dir.path()).unwrap());
        let indexes = Arc::new(IndexManager::new(Arc::clone(&layout)));
        let locks = Arc::new(LocksManager::new());
        DiskStorage::new(layout, indexes, locks)
    }

    fn orders_schema() -> Schema {
        let mut properties = BTreeMap::new();
        properties.insert(
            "item".to_string(),
            PropertySpec {
                property_type: PropertyType::String,
                required: true,
            },
        );
        properties.insert(
            "quantity".to_string(),
            PropertySpec {
                property_type: PropertyType::Integer,
                required: false,
            },
        );
        Schema {
            object_type: "object".to_string(),
            properties,
        }
    }

    fn order(item: &str, quantity: i64) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("item".to_string(), json!(item));
        map.insert("quantity".to_string(), json!(quantity));
        map
    }

    fn seeded_engine(dir: &TempDir) -> DiskStorage {
        let engine = engine_at(dir);
        engine.create_database("shop").unwrap();
        engine.create_collection("shop", "orders", orders_schema()).unwrap();
        engine
    }

    // ============================================================
    // DATABASE & COLLECTION LIFECYCLE
    // ============================================================

    #[test]
    fn test_create_database_rejects_duplicates_and_bad_names() {
        let dir = TempDir::new().unwrap();
        let engine = engine_at(&dir);

        engine.create_database("shop").unwrap();
        assert!(matches!(
            engine.create_database("shop"),
            Err(NodeError::ResourceAlreadyExists("database"))
        ));
        assert!(matches!(
            engine.create_database(""),
            Err(NodeError::InvalidResourceName("database"))
        ));
        assert!(matches!(
            engine.create_database("sh op"),
            Err(NodeError::InvalidResourceName("database"))
        ));
        assert!(matches!(
            engine.create_database("../escape"),
            Err(NodeError::InvalidResourceName("database"))
        ));
        assert_eq!(engine.read_databases(), vec!["shop".to_string()]);
    }

    #[test]
    fn test_create_collection_requires_database() {
        let dir = TempDir::new().unwrap();
        let engine = engine_at(&dir);

        assert!(matches!(
            engine.create_collection("ghost", "orders", orders_schema()),
            Err(NodeError::ResourceNotFound(_))
        ));

        engine.create_database("shop").unwrap();
        engine.create_collection("shop", "orders", orders_schema()).unwrap();
        assert!(matches!(
            engine.create_collection("shop", "orders", orders_schema()),
            Err(NodeError::ResourceAlreadyExists("collection"))
        ));
        assert_eq!(engine.read_collections("shop").unwrap(), vec!["orders".to_string()]);
    }

    #[test]
    fn test_delete_collection_allows_recreation() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);
        engine.create_document("shop", "orders", order("mouse", 2)).unwrap();

        engine.delete_collection("shop", "orders").unwrap();
        assert!(engine.read_collections("shop").unwrap().is_empty());
        assert!(matches!(
            engine.delete_collection("shop", "orders"),
            Err(NodeError::ResourceNotFound(_))
        ));

        engine.create_collection("shop", "orders", orders_schema()).unwrap();
        assert!(engine.fetch_all("shop", "orders").unwrap().is_empty());
    }

    #[test]
    fn test_delete_database_removes_everything() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);
        engine.create_document("shop", "orders", order("mouse", 2)).unwrap();

        engine.delete_database("shop").unwrap();
        assert!(engine.read_databases().is_empty());
        assert!(matches!(
            engine.delete_database("shop"),
            Err(NodeError::ResourceNotFound(_))
        ));
        assert!(matches!(
            engine.fetch_all("shop", "orders"),
            Err(NodeError::ResourceNotFound(_))
        ));
    }

    // ============================================================
    // DOCUMENT CRUD
    // ============================================================

    #[test]
    fn test_create_document_stamps_id_and_version_zero() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);

        let doc = engine.create_document("shop", "orders", order("mouse", 2)).unwrap();
        let id = doc.id().unwrap().to_string();
        assert_eq!(doc.version(), Some(0));

        let fetched = engine.fetch_document("shop", "orders", &id).unwrap();
        assert_eq!(fetched.get("item"), Some(&json!("mouse")));
        assert_eq!(fetched.get("quantity"), Some(&json!(2)));
        assert_eq!(fetched.version(), Some(0));
    }

    #[test]
    fn test_create_document_validates_against_schema() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);

        // Missing required property.
        let mut missing = Map::new();
        missing.insert("quantity".to_string(), json!(1));
        assert!(matches!(
            engine.create_document("shop", "orders", missing),
            Err(NodeError::SchemaMismatch(_))
        ));

        // Wrong type.
        let mut wrong_type = order("mouse", 1);
        wrong_type.insert("quantity".to_string(), json!("two"));
        assert!(matches!(
            engine.create_document("shop", "orders", wrong_type),
            Err(NodeError::SchemaMismatch(_))
        ));

        // Undeclared property.
        let mut unknown = order("mouse", 1);
        unknown.insert("color".to_string(), json!("red"));
        assert!(matches!(
            engine.create_document("shop", "orders", unknown),
            Err(NodeError::SchemaMismatch(_))
        ));

        // The version counter belongs to the node, not the client.
        let mut forged_version = order("mouse", 1);
        forged_version.insert("_version".to_string(), json!(7));
        assert!(matches!(
            engine.create_document("shop", "orders", forged_version),
            Err(NodeError::SchemaMismatch(_))
        ));

        assert!(engine.fetch_all("shop", "orders").unwrap().is_empty());
    }

    #[test]
    fn test_create_document_accepts_explicit_id_once() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);

        let mut explicit = order("mouse", 1);
        explicit.insert("_id".to_string(), json!("o1"));
        let doc = engine.create_document("shop", "orders", explicit.clone()).unwrap();
        assert_eq!(doc.id(), Some("o1"));
        assert_eq!(doc.version(), Some(0));

        assert!(matches!(
            engine.create_document("shop", "orders", explicit),
            Err(NodeError::ResourceAlreadyExists("document"))
        ));
    }

    #[test]
    fn test_update_bumps_version_and_guards_against_stale_writers() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);
        let doc = engine.create_document("shop", "orders", order("mouse", 2)).unwrap();
        let id = doc.id().unwrap().to_string();

        let updated = engine
            .update_document("shop", "orders", &id, order("mouse", 5), 0)
            .unwrap();
        assert_eq!(updated.version(), Some(1));
        assert_eq!(updated.id(), Some(id.as_str()));

        // A writer still holding version 0 must conflict.
        assert!(matches!(
            engine.update_document("shop", "orders", &id, order("mouse", 9), 0),
            Err(NodeError::VersionMismatch)
        ));
        let stored = engine.fetch_document("shop", "orders", &id).unwrap();
        assert_eq!(stored.get("quantity"), Some(&json!(5)));
        assert_eq!(stored.version(), Some(1));

        // The property indexes follow the update.
        assert_eq!(
            engine.read_document_property("shop", "orders", &id, "quantity").unwrap(),
            "5"
        );
        let hits = engine
            .fetch_documents_by_property("shop", "orders", "quantity", "2")
            .unwrap();
        assert!(hits.is_empty(), "The stale indexed value must be gone");
    }

    #[test]
    fn test_update_missing_document_is_not_found() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);

        assert!(matches!(
            engine.update_document("shop", "orders", "ghost", order("mouse", 1), 0),
            Err(NodeError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_delete_document_compacts_the_array() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);
        let a = engine.create_document("shop", "orders", order("mouse", 1)).unwrap();
        let b = engine.create_document("shop", "orders", order("keyboard", 1)).unwrap();
        let c = engine.create_document("shop", "orders", order("screen", 1)).unwrap();
        let b_id = b.id().unwrap().to_string();

        engine.delete_document("shop", "orders", &b_id).unwrap();

        let remaining = engine.fetch_all("shop", "orders").unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].get("_id"), a.get("_id"));
        assert_eq!(remaining[1].get("_id"), c.get("_id"));
        assert!(matches!(
            engine.fetch_document("shop", "orders", &b_id),
            Err(NodeError::ResourceNotFound(_))
        ));
        assert!(matches!(
            engine.delete_document("shop", "orders", &b_id),
            Err(NodeError::ResourceNotFound(_))
        ));
    }

    // ============================================================
    // CONCURRENCY
    // ============================================================

    #[test]
    fn test_concurrent_database_creates_agree_on_one_winner() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine_at(&dir));

        for i in 0..500 {
            let name = format!("db{i}");
            let barrier = Arc::new(Barrier::new(4));
            let successes = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|_| {
                        let engine = Arc::clone(&engine);
                        let barrier = Arc::clone(&barrier);
                        let name = name.clone();
                        scope.spawn(move || {
                            barrier.wait();
                            engine.create_database(&name).is_ok()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap())
                    .filter(|&won| won)
                    .count()
            });
            assert_eq!(
                successes, 1,
                "Exactly one concurrent create of {name} should win"
            );
        }
    }

    #[test]
    fn test_concurrent_creates_on_empty_collection_take_positions_zero_and_one() {
        let dir = TempDir::new().unwrap();
        let layout = Arc::new(Layout::new(dir.path()).unwrap());
        let indexes = Arc::new(IndexManager::new(Arc::clone(&layout)));
        let locks = Arc::new(LocksManager::new());
        let engine = Arc::new(DiskStorage::new(layout, Arc::clone(&indexes), locks));
        engine.create_database("shop").unwrap();
        engine.create_collection("shop", "orders", orders_schema()).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let ids: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["mouse", "keyboard"]
                .into_iter()
                .map(|item| {
                    let engine = Arc::clone(&engine);
                    let barrier = Arc::clone(&barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        let doc = engine.create_document("shop", "orders", order(item, 1)).unwrap();
                        doc.id().unwrap().to_string()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_ne!(ids[0], ids[1], "Concurrent creates must get distinct ids");
        assert_eq!(engine.fetch_all("shop", "orders").unwrap().len(), 2);
        assert_eq!(indexes.collection_size("shop", "orders"), 2);
        let mut positions: Vec<usize> = ids
            .iter()
            .map(|id| indexes.position_of("shop", "orders", id).unwrap())
            .collect();
        positions.sort();
        assert_eq!(positions, vec![0, 1]);
    }

    // ============================================================
    // PROPERTY QUERIES
    // ============================================================

    #[test]
    fn test_fetch_documents_by_property_matches_typed_values() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);
        engine.create_document("shop", "orders", order("mouse", 2)).unwrap();
        engine.create_document("shop", "orders", order("keyboard", 2)).unwrap();
        engine.create_document("shop", "orders", order("screen", 7)).unwrap();

        let hits = engine
            .fetch_documents_by_property("shop", "orders", "quantity", "2")
            .unwrap();
        assert_eq!(hits.len(), 2);

        let none = engine
            .fetch_documents_by_property("shop", "orders", "quantity", "3")
            .unwrap();
        assert!(none.is_empty());

        assert!(matches!(
            engine.fetch_documents_by_property("shop", "orders", "quantity", "lots"),
            Err(NodeError::SchemaMismatch(_))
        ));
        assert!(matches!(
            engine.fetch_documents_by_property("shop", "orders", "color", "red"),
            Err(NodeError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_read_document_property_returns_indexed_value() {
        let dir = TempDir::new().unwrap();
        let engine = seeded_engine(&dir);
        let doc = engine.create_document("shop", "orders", order("mouse", 2)).unwrap();
        let id = doc.id().unwrap();

        assert_eq!(
            engine.read_document_property("shop", "orders", id, "item").unwrap(),
            "mouse"
        );
        assert_eq!(
            engine.read_document_property("shop", "orders", id, "quantity").unwrap(),
            "2"
        );
        assert!(matches!(
            engine.read_document_property("shop", "orders", id, "color"),
            Err(NodeError::ResourceNotFound(_))
        ));
    }

    // ============================================================
    // BOOTSTRAP
    // ============================================================

    #[test]
    fn test_bootstrap_restores_documents_and_indexes() {
        let dir = TempDir::new().unwrap();
        let id = {
            let engine = seeded_engine(&dir);
            let doc = engine.create_document("shop", "orders", order("mouse", 2)).unwrap();
            engine.create_document("shop", "orders", order("screen", 7)).unwrap();
            doc.id().unwrap().to_string()
        };

        let engine = engine_at(&dir);
        engine.bootstrap().unwrap();

        let fetched = engine.fetch_document("shop", "orders", &id).unwrap();
        assert_eq!(fetched.get("item"), Some(&json!("mouse")));
        let hits = engine
            .fetch_documents_by_property("shop", "orders", "quantity", "7")
            .unwrap();
        assert_eq!(hits.len(), 1);

        // Locks were re-registered, so updates work straight away.
        let updated = engine
            .update_document("shop", "orders", &id, order("mouse", 3), 0)
            .unwrap();
        assert_eq!(updated.version(), Some(1));
    }
}
