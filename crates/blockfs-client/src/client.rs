//! Client Facade
//!
//! [`BfsClient`] composes the registry view, the consistent-hash ring, and
//! the connection cache into the public per-path API. Construction
//! bootstraps the view from the coordination store and starts its watches;
//! from then on every operation resolves its path to a host through the
//! ring, looks the host up in the view, and borrows a pooled channel from
//! the cache.
//!
//! ## Rename Semantics
//!
//! A rename whose source and destination hash to the same host is one
//! atomic RPC on that host. Across hosts it degrades to three separate
//! calls (get source, add destination, delete source) with no compensation:
//! a partial failure is surfaced as
//! [`ClientError::RenameIncomplete`](crate::ClientError::RenameIncomplete)
//! naming the step that broke, and the caller owns reconciliation.
//!
//! ## List Semantics
//!
//! List fans one streaming RPC out to every known host and merges the
//! per-host batches into a single stream. Entries arrive in ascending path
//! order per host but interleave arbitrarily across hosts. The first
//! per-host error terminates the aggregate stream.

use crate::conn_cache::ConnectionCache;
use crate::error::{ClientError, RenameStage, Result};
use crate::file::{FileReader, FileWriter};
use crate::ring::HashRing;
use crate::view::RegistryView;
use blockfs_proto::blockservice::block_service_client::BlockServiceClient;
use blockfs_proto::nameservice::name_service_client::NameServiceClient;
use blockfs_proto::nameservice::{
    AddRequest, DeleteRequest, Entry, GetRequest, ListRequest, RenameRequest,
};
use blockfs_registry::paths;
use blockfs_registry::{EtcdRegistry, HostConfig, LogicalVolumeConfig, RegistryStore};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tonic::transport::{Channel, Endpoint};

/// Channels held per endpoint address.
const CONNECTION_CACHE_SIZE: usize = 2;

/// Buffered entries between the List producer tasks and the consumer.
const LIST_BUFFER: usize = 1024;

/// A pooled channel with its derived service stubs, ready to use.
#[derive(Clone)]
pub struct ServiceClient {
    pub name: NameServiceClient<Channel>,
    pub block: BlockServiceClient<Channel>,
}

/// The BlockFS client.
pub struct BfsClient {
    registry: Arc<dyn RegistryStore>,
    registry_prefix: String,
    view: RegistryView,
    ring: Arc<HashRing>,
    connections: Arc<ConnectionCache<ServiceClient>>,
}

impl BfsClient {
    /// Connect to the coordination store at `endpoints` and bootstrap the
    /// registry view under `registry_prefix`.
    pub async fn connect(endpoints: &[String], registry_prefix: &str) -> Result<Self> {
        let registry = Arc::new(EtcdRegistry::connect(endpoints).await?);
        Self::with_store(registry, registry_prefix).await
    }

    /// Build a client over an already-open coordination store.
    pub async fn with_store(
        registry: Arc<dyn RegistryStore>,
        registry_prefix: &str,
    ) -> Result<Self> {
        let ring = Arc::new(HashRing::new());
        let view = RegistryView::bootstrap(registry.clone(), registry_prefix, ring.clone()).await?;

        let connections = Arc::new(ConnectionCache::new(
            CONNECTION_CACHE_SIZE,
            Box::new(|address: String| {
                Box::pin(async move {
                    let uri = if address.contains("://") {
                        address
                    } else {
                        format!("http://{address}")
                    };
                    // Connect eagerly so cache hits hand out ready channels.
                    let channel = Endpoint::from_shared(uri)?.connect().await?;
                    Ok(ServiceClient {
                        name: NameServiceClient::new(channel.clone()),
                        block: BlockServiceClient::new(channel),
                    })
                })
            }),
            Box::new(|address, _client| {
                tracing::debug!(%address, "destroying connection");
            }),
        ));

        Ok(Self {
            registry,
            registry_prefix: registry_prefix.to_string(),
            view,
            ring,
            connections,
        })
    }

    /// The host id responsible for `path` under the current membership.
    pub fn responsible_host(&self, path: &str) -> Result<String> {
        self.ring.get(path)
    }

    /// Snapshot of every known host.
    pub fn hosts(&self) -> Vec<HostConfig> {
        self.view.hosts()
    }

    async fn connection_for_path(&self, path: &str) -> Result<(ServiceClient, String)> {
        let host_id = self.ring.get(path)?;
        let host = self
            .view
            .host(&host_id)
            .ok_or_else(|| ClientError::UnknownHost {
                host_id: host_id.clone(),
            })?;
        let client = self
            .connections
            .get(&host.name_service.advertise_address)
            .await?;
        Ok((client, host_id))
    }

    /// Create a file, returning a writer bound to the volume that mounts
    /// the longest matching prefix of `path`.
    pub async fn create(&self, path: &str, block_size: u64) -> Result<FileWriter> {
        let volumes = self.view.volumes();
        let volume = match_volume(&volumes, path).ok_or_else(|| ClientError::NoVolumeForPath {
            path: path.to_string(),
        })?;

        if volume.pv_ids.is_empty() {
            return Err(ClientError::NoVolumeForPath {
                path: path.to_string(),
            });
        }

        let (conn, _) = self.connection_for_path(path).await?;
        Ok(FileWriter::new(
            conn.name,
            conn.block,
            volume.id.clone(),
            volume.pv_ids.clone(),
            path.to_string(),
            block_size,
        ))
    }

    /// Open a file for reading; the entry metadata is fetched eagerly.
    pub async fn open(&self, path: &str) -> Result<FileReader> {
        let (conn, _) = self.connection_for_path(path).await?;
        let mut reader = FileReader::new(conn.name, conn.block, path.to_string());
        reader.open().await?;
        Ok(reader)
    }

    /// The entry at `path`.
    pub async fn stat(&self, path: &str) -> Result<Entry> {
        let (mut conn, _) = self.connection_for_path(path).await?;
        let response = conn
            .name
            .get(GetRequest {
                path: path.to_string(),
            })
            .await?
            .into_inner();
        response
            .entry
            .ok_or_else(|| ClientError::Malformed("get response missing entry".to_string()))
    }

    /// Remove the entry at `path`.
    pub async fn remove(&self, path: &str) -> Result<()> {
        let (mut conn, _) = self.connection_for_path(path).await?;
        conn.name
            .delete(DeleteRequest {
                path: path.to_string(),
                recursive: false,
            })
            .await?;
        Ok(())
    }

    /// Move `source_path` to `destination_path`.
    pub async fn rename(&self, source_path: &str, destination_path: &str) -> Result<()> {
        let (mut source_conn, source_host) = self.connection_for_path(source_path).await?;
        let (mut dest_conn, dest_host) = self.connection_for_path(destination_path).await?;

        if source_host == dest_host {
            source_conn
                .name
                .rename(RenameRequest {
                    source_path: source_path.to_string(),
                    destination_path: destination_path.to_string(),
                })
                .await?;
            return Ok(());
        }

        // The paths live on different hosts; relocate in three steps. Each
        // step's failure is reported with no compensation for the earlier
        // ones.
        let incomplete = |stage: RenameStage| {
            let source_path = source_path.to_string();
            let destination_path = destination_path.to_string();
            move |status: tonic::Status| ClientError::RenameIncomplete {
                source_path,
                destination_path,
                stage,
                cause: Box::new(ClientError::Rpc(status)),
            }
        };

        let response = source_conn
            .name
            .get(GetRequest {
                path: source_path.to_string(),
            })
            .await
            .map_err(incomplete(RenameStage::GetSource))?
            .into_inner();
        let mut entry = response
            .entry
            .ok_or_else(|| ClientError::Malformed("get response missing entry".to_string()))?;
        entry.path = destination_path.to_string();

        dest_conn
            .name
            .add(AddRequest { entry: Some(entry) })
            .await
            .map_err(incomplete(RenameStage::AddDestination))?;

        source_conn
            .name
            .delete(DeleteRequest {
                path: source_path.to_string(),
                recursive: false,
            })
            .await
            .map_err(incomplete(RenameStage::DeleteSource))?;

        Ok(())
    }

    /// Stream every entry with a path in `[start_key, end_key)` from every
    /// known host.
    pub fn list(&self, start_key: &str, end_key: &str) -> ListStream {
        let hosts = self.view.hosts();
        let (tx, rx) = mpsc::channel(LIST_BUFFER);

        for host in hosts {
            let tx = tx.clone();
            let connections = self.connections.clone();
            let start_key = start_key.to_string();
            let end_key = end_key.to_string();

            tokio::spawn(async move {
                tracing::debug!(host = %host.hostname, "list fan-out");

                let outcome: Result<()> = async {
                    let conn = connections
                        .get(&host.name_service.advertise_address)
                        .await?;
                    let mut stream = conn
                        .name
                        .clone()
                        .list(ListRequest { start_key, end_key })
                        .await?
                        .into_inner();

                    while let Some(response) = stream.message().await? {
                        for entry in response.entries {
                            if tx.send(Ok(entry)).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Ok(())
                }
                .await;

                if let Err(err) = outcome {
                    tracing::debug!(host = %host.hostname, %err, "closing list stream");
                    let _ = tx.send(Err(err)).await;
                }
            });
        }

        ListStream { rx, done: false }
    }

    /// Publish a logical volume record directly to the registry.
    pub async fn create_logical_volume(&self, config: &LogicalVolumeConfig) -> Result<()> {
        let value = serde_json::to_vec(config)?;
        self.registry
            .put(&paths::volume_key(&self.registry_prefix, &config.id), value)
            .await?;
        Ok(())
    }

    /// Remove a logical volume record. Returns whether one existed.
    pub async fn delete_logical_volume(&self, volume_id: &str) -> Result<bool> {
        let deleted = self
            .registry
            .delete(&paths::volume_key(&self.registry_prefix, volume_id))
            .await?;
        Ok(deleted)
    }

    /// Every logical volume record in the registry.
    pub async fn list_volumes(&self) -> Result<Vec<LogicalVolumeConfig>> {
        let (kvs, _) = self
            .registry
            .get_prefix(&paths::volumes_prefix(&self.registry_prefix))
            .await?;
        kvs.iter()
            .map(|kv| serde_json::from_slice(&kv.value).map_err(ClientError::Encoding))
            .collect()
    }

    /// Purge pooled connections, cancel both registry watches, and close
    /// the coordination-store client.
    pub async fn close(self) {
        self.connections.purge().await;
        self.view.close();
        if let Err(err) = self.registry.close().await {
            tracing::warn!(%err, "failed to close registry client");
        }
    }
}

/// Longest mount-prefix match over a volume snapshot.
fn match_volume<'a>(
    volumes: &'a [(String, LogicalVolumeConfig)],
    path: &str,
) -> Option<&'a LogicalVolumeConfig> {
    volumes
        .iter()
        .filter(|(mount, _)| path.starts_with(mount.as_str()))
        .max_by_key(|(mount, _)| mount.len())
        .map(|(_, config)| config)
}

/// Aggregate of the per-host List streams.
///
/// Ends when every per-host producer has finished, or immediately after
/// yielding the first producer error.
pub struct ListStream {
    rx: mpsc::Receiver<Result<Entry>>,
    done: bool,
}

impl Stream for ListStream {
    type Item = Result<Entry>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(err))) => {
                self.done = true;
                self.rx.close();
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::match_volume;
    use blockfs_registry::{Label, LogicalVolumeConfig};

    fn volume(id: &str, mount: &str) -> (String, LogicalVolumeConfig) {
        (
            mount.to_string(),
            LogicalVolumeConfig {
                id: id.to_string(),
                pv_ids: vec![format!("{id}-pv")],
                labels: vec![Label {
                    key: "mount".to_string(),
                    value: mount.to_string(),
                }],
            },
        )
    }

    #[test]
    fn longest_mount_prefix_wins() {
        let volumes = vec![volume("lv-root", "/"), volume("lv-data", "/data/")];
        assert_eq!(match_volume(&volumes, "/data/a.txt").unwrap().id, "lv-data");
        assert_eq!(match_volume(&volumes, "/etc/a.txt").unwrap().id, "lv-root");
    }

    #[test]
    fn no_matching_mount_yields_none() {
        let volumes = vec![volume("lv-data", "/data/")];
        assert!(match_volume(&volumes, "/var/a.txt").is_none());
    }
}
