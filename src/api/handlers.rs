//! HTTP handlers.
//!
//! Thin boundary over the storage engine plus the cluster control flow.
//! Document updates and deletes consult the affinity ring first: a request
//! for a document this node does not own (and that is not already a
//! broadcast replay) is forwarded to the owner and the owner's reply is
//! relayed as-is. Requests applied locally fan out to the peers afterwards,
//! marked with the broadcast header so replicas neither redirect nor
//! re-broadcast.
//!
//! Database and collection writes, and document creation, apply locally and
//! broadcast without redirection. Creation is ordered by whichever node the
//! client reached, matching the single-writer-per-document model only for
//! documents that already exist.

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use reqwest::Method;
use serde_json::{Map, Value};

use crate::api::protocol::{
    CollectionListResponse, DatabaseListResponse, MessageResponse, PropertyQuery,
};
use crate::cluster::broadcast::Broadcaster;
use crate::cluster::protocol::{PeerRequest, BROADCAST_HEADER};
use crate::cluster::redirect::{Redirector, RemoteResponse};
use crate::cluster::ring::AffinityRing;
use crate::cluster::types::NodeConfig;
use crate::error::{NodeError, Result};
use crate::storage::engine::DiskStorage;
use crate::storage::schema::Schema;
use crate::storage::types::{Document, ID_FIELD, VERSION_FIELD};

/// Everything the handlers need to talk to the rest of the cluster.
#[derive(Debug)]
pub struct ClusterHandle {
    pub config: Arc<NodeConfig>,
    pub ring: AffinityRing,
    pub broadcaster: Broadcaster,
    pub redirector: Redirector,
}

impl ClusterHandle {
    pub fn new(config: Arc<NodeConfig>) -> Self {
        Self {
            ring: AffinityRing::new(config.cluster_size, config.replica_factor),
            broadcaster: Broadcaster::new(Arc::clone(&config)),
            redirector: Redirector::new(Arc::clone(&config)),
            config,
        }
    }

    fn owner_elsewhere(&self, key: &str) -> Option<u32> {
        if self.config.is_single_node() {
            return None;
        }
        match self.ring.owning_node(key) {
            Some(owner) if owner != self.config.node_id => Some(owner),
            _ => None,
        }
    }

    /// Fans a committed local write out to the peers.
    async fn replicate(&self, method: Method, path: &str, body: Option<Value>) {
        if self.config.is_single_node() {
            return;
        }
        let base = self.config.peer_url_template.trim_end_matches('/');
        let request = PeerRequest::new(method, format!("{base}{path}"), body);
        let outcomes = self.broadcaster.broadcast(&request).await;
        let failures = outcomes.iter().filter(|o| !o.is_success()).count();
        if failures > 0 {
            tracing::warn!("{} of {} peers missed replication of {}", failures, outcomes.len(), path);
        }
    }
}

fn is_broadcast(headers: &HeaderMap) -> bool {
    headers
        .get(BROADCAST_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn relay(remote: RemoteResponse) -> Response {
    let status = StatusCode::from_u16(remote.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(remote.body)).into_response()
}

// ============================================================
// DATABASES
// ============================================================

pub async fn handle_list_databases(
    Extension(storage): Extension<Arc<DiskStorage>>,
) -> Json<DatabaseListResponse> {
    Json(DatabaseListResponse {
        databases: storage.read_databases(),
    })
}

pub async fn handle_create_database(
    Path(db): Path<String>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<DiskStorage>>,
    Extension(cluster): Extension<Arc<ClusterHandle>>,
) -> Result<Response> {
    storage.create_database(&db)?;
    if !is_broadcast(&headers) {
        cluster
            .replicate(Method::POST, &format!("/databases/{db}"), None)
            .await;
    }
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(format!("database {db} created"))),
    )
        .into_response())
}

pub async fn handle_delete_database(
    Path(db): Path<String>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<DiskStorage>>,
    Extension(cluster): Extension<Arc<ClusterHandle>>,
) -> Result<Response> {
    storage.delete_database(&db)?;
    if !is_broadcast(&headers) {
        cluster
            .replicate(Method::DELETE, &format!("/databases/{db}"), None)
            .await;
    }
    Ok(Json(MessageResponse::new(format!("database {db} deleted"))).into_response())
}

// ============================================================
// COLLECTIONS
// ============================================================

pub async fn handle_list_collections(
    Path(db): Path<String>,
    Extension(storage): Extension<Arc<DiskStorage>>,
) -> Result<Json<CollectionListResponse>> {
    Ok(Json(CollectionListResponse {
        collections: storage.read_collections(&db)?,
    }))
}

pub async fn handle_create_collection(
    Path((db, coll)): Path<(String, String)>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<DiskStorage>>,
    Extension(cluster): Extension<Arc<ClusterHandle>>,
    Json(schema): Json<Schema>,
) -> Result<Response> {
    storage.create_collection(&db, &coll, schema.clone())?;
    if !is_broadcast(&headers) {
        let body = serde_json::to_value(&schema)
            .map_err(|e| NodeError::operation_failed(format!("serialize schema: {e}")))?;
        cluster
            .replicate(
                Method::POST,
                &format!("/databases/{db}/collections/{coll}"),
                Some(body),
            )
            .await;
    }
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(format!("collection {coll} created"))),
    )
        .into_response())
}

pub async fn handle_delete_collection(
    Path((db, coll)): Path<(String, String)>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<DiskStorage>>,
    Extension(cluster): Extension<Arc<ClusterHandle>>,
) -> Result<Response> {
    storage.delete_collection(&db, &coll)?;
    if !is_broadcast(&headers) {
        cluster
            .replicate(
                Method::DELETE,
                &format!("/databases/{db}/collections/{coll}"),
                None,
            )
            .await;
    }
    Ok(Json(MessageResponse::new(format!("collection {coll} deleted"))).into_response())
}

// ============================================================
// DOCUMENTS
// ============================================================

pub async fn handle_list_documents(
    Path((db, coll)): Path<(String, String)>,
    Query(query): Query<PropertyQuery>,
    Extension(storage): Extension<Arc<DiskStorage>>,
) -> Result<Json<Vec<Map<String, Value>>>> {
    let docs = match query.property_name {
        Some(prop) => {
            let value = query.property_value.unwrap_or_default();
            storage.fetch_documents_by_property(&db, &coll, &prop, &value)?
        }
        None => storage.fetch_all(&db, &coll)?,
    };
    Ok(Json(docs))
}

pub async fn handle_create_document(
    Path((db, coll)): Path<(String, String)>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<DiskStorage>>,
    Extension(cluster): Extension<Arc<ClusterHandle>>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Response> {
    let stored = if is_broadcast(&headers) {
        // Replica path: keep the owner-assigned id and version.
        storage.insert_document(&db, &coll, Document::from_stored(body))?
    } else {
        let stored = storage.create_document(&db, &coll, body)?;
        cluster
            .replicate(
                Method::POST,
                &format!("/databases/{db}/collections/{coll}/documents"),
                Some(Value::Object(stored.fields().clone())),
            )
            .await;
        stored
    };
    Ok((StatusCode::CREATED, Json(Value::Object(stored.into_fields()))).into_response())
}

pub async fn handle_get_document(
    Path((db, coll, id)): Path<(String, String, String)>,
    Extension(storage): Extension<Arc<DiskStorage>>,
) -> Result<Json<Value>> {
    let doc = storage.fetch_document(&db, &coll, &id)?;
    Ok(Json(Value::Object(doc.into_fields())))
}

pub async fn handle_update_document(
    Path((db, coll, id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<DiskStorage>>,
    Extension(cluster): Extension<Arc<ClusterHandle>>,
    Json(mut body): Json<Map<String, Value>>,
) -> Result<Response> {
    let path = format!("/databases/{db}/collections/{coll}/documents/{id}");
    if !is_broadcast(&headers) {
        if let Some(owner) = cluster.owner_elsewhere(&id) {
            let remote = cluster
                .redirector
                .forward(owner, Method::PUT, &path, Some(Value::Object(body)))
                .await?;
            return Ok(relay(remote));
        }
    } else {
        // Replica path: the owner already ran the version check, store its
        // result verbatim.
        storage.replace_document(&db, &coll, Document::from_stored(body))?;
        return Ok(Json(MessageResponse::new(format!("document {id} replicated"))).into_response());
    }

    match body.remove(ID_FIELD) {
        None => {}
        Some(Value::String(body_id)) if body_id == id => {}
        Some(_) => {
            return Err(NodeError::schema_mismatch(
                "'_id' in the body must match the document being updated".to_string(),
            ))
        }
    }
    let expected_version = body
        .remove(VERSION_FIELD)
        .and_then(|value| value.as_u64())
        .ok_or_else(|| {
            NodeError::schema_mismatch("update body must carry the expected '_version'".to_string())
        })?;

    let updated = storage.update_document(&db, &coll, &id, body, expected_version)?;
    cluster
        .replicate(
            Method::PUT,
            &path,
            Some(Value::Object(updated.fields().clone())),
        )
        .await;
    Ok(Json(Value::Object(updated.into_fields())).into_response())
}

pub async fn handle_delete_document(
    Path((db, coll, id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<DiskStorage>>,
    Extension(cluster): Extension<Arc<ClusterHandle>>,
) -> Result<Response> {
    let path = format!("/databases/{db}/collections/{coll}/documents/{id}");
    if !is_broadcast(&headers) {
        if let Some(owner) = cluster.owner_elsewhere(&id) {
            let remote = cluster
                .redirector
                .forward(owner, Method::DELETE, &path, None)
                .await?;
            return Ok(relay(remote));
        }
    }

    storage.delete_document(&db, &coll, &id)?;
    if !is_broadcast(&headers) {
        cluster.replicate(Method::DELETE, &path, None).await;
    }
    Ok(Json(MessageResponse::new(format!("document {id} deleted"))).into_response())
}

pub async fn handle_get_document_property(
    Path((db, coll, id, prop)): Path<(String, String, String, String)>,
    Extension(storage): Extension<Arc<DiskStorage>>,
) -> Result<Json<Value>> {
    let value = storage.read_document_property(&db, &coll, &id, &prop)?;
    Ok(Json(Value::String(value)))
}
