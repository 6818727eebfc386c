//! etcd-Backed Registry
//!
//! Production [`RegistryStore`] implementation over `etcd-client`. Watches
//! are pumped from the etcd watch stream into a channel by a background
//! task; cancelling the [`RegistryWatch`] aborts the task, which drops the
//! etcd watcher and tears the server-side watch down with it.

use crate::error::{RegistryError, Result};
use crate::store::{RegistryEvent, RegistryKv, RegistryStore, RegistryWatch};
use async_trait::async_trait;
use etcd_client::{Client, EventType, GetOptions, KeyValue, WatchOptions};
use std::sync::Mutex;
use tokio::sync::mpsc;

const WATCH_BUFFER: usize = 64;

pub struct EtcdRegistry {
    // Dropped by close(); operations on a closed registry fail.
    client: Mutex<Option<Client>>,
}

impl EtcdRegistry {
    /// Connect to the etcd cluster at `endpoints`.
    pub async fn connect(endpoints: &[String]) -> Result<Self> {
        let client = Client::connect(endpoints, None).await?;
        Ok(Self {
            client: Mutex::new(Some(client)),
        })
    }

    fn client(&self) -> Result<Client> {
        self.client
            .lock()
            .unwrap()
            .clone()
            .ok_or(RegistryError::Closed)
    }
}

fn decode_kv(kv: &KeyValue) -> Result<RegistryKv> {
    Ok(RegistryKv {
        key: String::from_utf8(kv.key().to_vec())?,
        value: kv.value().to_vec(),
    })
}

#[async_trait]
impl RegistryStore for EtcdRegistry {
    async fn get_prefix(&self, prefix: &str) -> Result<(Vec<RegistryKv>, i64)> {
        let mut client = self.client()?;
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        let revision = response.header().map(|h| h.revision()).unwrap_or(0);
        let kvs = response
            .kvs()
            .iter()
            .map(decode_kv)
            .collect::<Result<Vec<_>>>()?;

        Ok((kvs, revision))
    }

    async fn watch_prefix(&self, prefix: &str, start_revision: i64) -> Result<RegistryWatch> {
        let mut client = self.client()?;
        let options = WatchOptions::new()
            .with_prefix()
            .with_start_revision(start_revision);
        let (watcher, mut stream) = client.watch(prefix, Some(options)).await?;

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let producer = tokio::spawn(async move {
            // Keep the watcher alive for as long as the task runs; dropping
            // it cancels the watch on the etcd side.
            let _watcher = watcher;

            loop {
                match stream.message().await {
                    Ok(Some(response)) => {
                        for event in response.events() {
                            let mapped = match (event.event_type(), event.kv()) {
                                (EventType::Put, Some(kv)) => decode_kv(kv)
                                    .map(RegistryEvent::Put),
                                (EventType::Delete, Some(kv)) => String::from_utf8(
                                    kv.key().to_vec(),
                                )
                                .map(RegistryEvent::Delete)
                                .map_err(Into::into),
                                (kind, None) => {
                                    tracing::warn!(?kind, "watch event without kv, ignoring");
                                    continue;
                                }
                            };

                            if tx.send(mapped).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        let _ = tx.send(Err(err.into())).await;
                        return;
                    }
                }
            }
        });

        Ok(RegistryWatch::new(rx, producer))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut client = self.client()?;
        client.put(key, value, None).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut client = self.client()?;
        let response = client.delete(key, None).await?;
        Ok(response.deleted() > 0)
    }

    async fn close(&self) -> Result<()> {
        self.client.lock().unwrap().take();
        Ok(())
    }
}
