//! BlockFS Name Server
//!
//! Serves one namespace shard over gRPC and, when registry endpoints are
//! configured, publishes this host's config so clients can discover it.
//!
//! ## Configuration
//!
//! All configuration is via environment variables:
//!
//! - `BLOCKFS_LISTEN_ADDR`: gRPC bind address (default: 0.0.0.0:60051)
//! - `BLOCKFS_ADVERTISE_ADDR`: address clients should dial (default: the
//!   listen address)
//! - `BLOCKFS_NAMESPACE`: namespace database directory (default: ./data/ns)
//! - `BLOCKFS_HOST_ID`: registry host id (default: hostname:port)
//! - `BLOCKFS_ETCD_ENDPOINTS`: comma-separated etcd endpoints; when unset
//!   the server runs unregistered
//! - `BLOCKFS_REGISTRY_PREFIX`: registry root prefix (default: /bfs)

use blockfs_proto::nameservice::name_service_server::NameServiceServer;
use blockfs_registry::{
    paths, EtcdRegistry, HostConfig, NameServiceConfig, RegistryStore,
};
use blockfs_server::NameServiceImpl;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let listen_addr: SocketAddr = std::env::var("BLOCKFS_LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:60051".to_string())
        .parse()?;

    let advertise_addr = std::env::var("BLOCKFS_ADVERTISE_ADDR")
        .unwrap_or_else(|_| listen_addr.to_string());

    let namespace_path =
        std::env::var("BLOCKFS_NAMESPACE").unwrap_or_else(|_| "./data/ns".to_string());

    let hostname = hostname();
    let host_id = std::env::var("BLOCKFS_HOST_ID")
        .unwrap_or_else(|_| format!("{}:{}", hostname, listen_addr.port()));

    let registry_prefix =
        std::env::var("BLOCKFS_REGISTRY_PREFIX").unwrap_or_else(|_| paths::DEFAULT_PREFIX.to_string());

    tracing::info!(namespace = %namespace_path, "opening namespace");
    let mut namespace = blockfs_ns::Namespace::new(&namespace_path);
    namespace.open()?;
    let namespace = Arc::new(namespace);

    // Publish this host into the registry so clients can route to it.
    let registry = match std::env::var("BLOCKFS_ETCD_ENDPOINTS") {
        Ok(endpoints) => {
            let endpoints: Vec<String> =
                endpoints.split(',').map(|e| e.trim().to_string()).collect();
            tracing::info!(?endpoints, "connecting to registry");
            let registry = EtcdRegistry::connect(&endpoints).await?;

            let config = HostConfig {
                id: host_id.clone(),
                hostname,
                name_service: NameServiceConfig {
                    bind_address: listen_addr.to_string(),
                    advertise_address: advertise_addr.clone(),
                },
                ..Default::default()
            };
            registry
                .put(
                    &paths::host_key(&registry_prefix, &host_id),
                    serde_json::to_vec(&config)?,
                )
                .await?;
            tracing::info!(%host_id, %advertise_addr, "registered host");
            Some(registry)
        }
        Err(_) => {
            tracing::warn!("no registry endpoints configured, running unregistered");
            None
        }
    };

    let service = NameServiceImpl::new(namespace.clone());

    tracing::info!(%listen_addr, %host_id, "name server starting");

    Server::builder()
        .add_service(NameServiceServer::new(service))
        .serve_with_shutdown(listen_addr, async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("received shutdown signal"),
                Err(err) => tracing::error!(%err, "shutdown signal handler failed"),
            }
        })
        .await?;

    if let Some(registry) = registry {
        if let Err(err) = registry
            .delete(&paths::host_key(&registry_prefix, &host_id))
            .await
        {
            tracing::warn!(%err, "failed to deregister host");
        }
    }

    match Arc::try_unwrap(namespace) {
        Ok(mut namespace) => namespace.close()?,
        Err(_) => tracing::warn!("namespace still shared at shutdown, skipping close"),
    }

    tracing::info!("name server shut down");
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
