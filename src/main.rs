use axum::extract::Extension;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;

use docnode::api::handlers::*;
use docnode::cluster::types::{NodeConfig, DEFAULT_REPLICA_FACTOR};
use docnode::index::manager::IndexManager;
use docnode::storage::engine::DiskStorage;
use docnode::storage::layout::Layout;
use docnode::storage::locks::LocksManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> --node-id <n> --cluster-size <n> [options]",
            args[0]
        );
        eprintln!("Options:");
        eprintln!("  --data-dir <path>        data root (default ./data)");
        eprintln!("  --peer-template <url>    peer base URL with a NODE_ID token");
        eprintln!("                           (default http://localhost:770NODE_ID)");
        eprintln!("  --replicas <n>           virtual nodes per node on the ring (default 300)");
        eprintln!("  --username <user>        basic-auth user for node-to-node calls");
        eprintln!("  --password <pass>        basic-auth password for node-to-node calls");
        eprintln!();
        eprintln!(
            "Example: {} --bind 127.0.0.1:7701 --node-id 1 --cluster-size 3",
            args[0]
        );
        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut node_id: u32 = 1;
    let mut cluster_size: u32 = 1;
    let mut data_dir = "./data".to_string();
    let mut peer_template = "http://localhost:770NODE_ID".to_string();
    let mut replica_factor = DEFAULT_REPLICA_FACTOR;
    let mut username: Option<String> = None;
    let mut password: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--node-id" => {
                node_id = args[i + 1].parse()?;
                i += 2;
            }
            "--cluster-size" => {
                cluster_size = args[i + 1].parse()?;
                i += 2;
            }
            "--data-dir" => {
                data_dir = args[i + 1].clone();
                i += 2;
            }
            "--peer-template" => {
                peer_template = args[i + 1].clone();
                i += 2;
            }
            "--replicas" => {
                replica_factor = args[i + 1].parse()?;
                i += 2;
            }
            "--username" => {
                username = Some(args[i + 1].clone());
                i += 2;
            }
            "--password" => {
                password = Some(args[i + 1].clone());
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.ok_or_else(|| anyhow::anyhow!("--bind is required"))?;
    if node_id == 0 || node_id > cluster_size {
        anyhow::bail!("--node-id must be in 1..=cluster-size");
    }

    tracing::info!(
        "Starting node {} of {} on {}, data in {}",
        node_id,
        cluster_size,
        bind_addr,
        data_dir
    );

    // 1. Cluster configuration:
    let mut config = NodeConfig::new(node_id, cluster_size, peer_template);
    config.replica_factor = replica_factor;
    config.username = username;
    config.password = password;
    let config = Arc::new(config);

    // 2. Storage layer:
    let layout = Arc::new(Layout::new(&data_dir)?);
    let indexes = Arc::new(IndexManager::new(Arc::clone(&layout)));
    let locks = Arc::new(LocksManager::new());
    let storage = Arc::new(DiskStorage::new(layout, indexes, locks));
    storage.bootstrap()?;

    // 3. Cluster plumbing (ring, broadcast, redirection):
    let cluster = Arc::new(ClusterHandle::new(config));

    // 4. HTTP router:
    let app = Router::new()
        .route("/databases", get(handle_list_databases))
        .route(
            "/databases/:db",
            post(handle_create_database).delete(handle_delete_database),
        )
        .route("/databases/:db/collections", get(handle_list_collections))
        .route(
            "/databases/:db/collections/:coll",
            post(handle_create_collection).delete(handle_delete_collection),
        )
        .route(
            "/databases/:db/collections/:coll/documents",
            get(handle_list_documents).post(handle_create_document),
        )
        .route(
            "/databases/:db/collections/:coll/documents/:id",
            get(handle_get_document)
                .put(handle_update_document)
                .delete(handle_delete_document),
        )
        .route(
            "/databases/:db/collections/:coll/documents/:id/properties/:prop",
            get(handle_get_document_property),
        )
        .layer(Extension(storage))
        .layer(Extension(cluster));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
