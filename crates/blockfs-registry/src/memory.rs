//! In-Memory Registry
//!
//! A [`RegistryStore`] with the same revision and watch semantics as the
//! etcd backend, kept entirely in process. Tests use it to exercise
//! bootstrap-then-watch flows without a running cluster.
//!
//! Revisions start at 0 and every successful mutation increments them. A
//! full change log is retained so a watch can replay history from any
//! `start_revision` before following live events, exactly like a
//! revision-anchored etcd watch.

use crate::error::Result;
use crate::store::{RegistryEvent, RegistryKv, RegistryStore, RegistryWatch};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

const WATCH_BUFFER: usize = 64;
const BROADCAST_BUFFER: usize = 1024;

#[derive(Default)]
struct Inner {
    kvs: BTreeMap<String, Vec<u8>>,
    revision: i64,
    log: Vec<(i64, RegistryEvent)>,
}

#[derive(Clone)]
pub struct MemoryRegistry {
    inner: Arc<Mutex<Inner>>,
    changes: broadcast::Sender<(i64, RegistryEvent)>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(BROADCAST_BUFFER);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            changes,
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn event_key(event: &RegistryEvent) -> &str {
    match event {
        RegistryEvent::Put(kv) => &kv.key,
        RegistryEvent::Delete(key) => key,
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn get_prefix(&self, prefix: &str) -> Result<(Vec<RegistryKv>, i64)> {
        let inner = self.inner.lock().unwrap();
        let kvs = inner
            .kvs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| RegistryKv {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        Ok((kvs, inner.revision))
    }

    async fn watch_prefix(&self, prefix: &str, start_revision: i64) -> Result<RegistryWatch> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);

        // Snapshot the backlog and subscribe under one lock acquisition so
        // no change can fall between replay and the live feed.
        let (backlog, mut live) = {
            let inner = self.inner.lock().unwrap();
            let backlog: Vec<RegistryEvent> = inner
                .log
                .iter()
                .filter(|(revision, event)| {
                    *revision >= start_revision && event_key(event).starts_with(prefix)
                })
                .map(|(_, event)| event.clone())
                .collect();
            (backlog, self.changes.subscribe())
        };

        let prefix = prefix.to_string();
        let producer = tokio::spawn(async move {
            for event in backlog {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }

            loop {
                match live.recv().await {
                    Ok((revision, event)) => {
                        if revision < start_revision || !event_key(&event).starts_with(&prefix) {
                            continue;
                        }
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "memory registry watch lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(RegistryWatch::new(rx, producer))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.revision += 1;
        let revision = inner.revision;
        inner.kvs.insert(key.to_string(), value.clone());

        let event = RegistryEvent::Put(RegistryKv {
            key: key.to_string(),
            value,
        });
        inner.log.push((revision, event.clone()));
        let _ = self.changes.send((revision, event));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.kvs.remove(key).is_none() {
            return Ok(false);
        }

        inner.revision += 1;
        let revision = inner.revision;
        let event = RegistryEvent::Delete(key.to_string());
        inner.log.push((revision, event.clone()));
        let _ = self.changes.send((revision, event));
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        // Nothing to release; the store lives in process memory.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_prefix_reports_the_read_revision() {
        let registry = MemoryRegistry::new();
        registry.put("/bfs/hosts/h1", b"one".to_vec()).await.unwrap();
        registry.put("/bfs/hosts/h2", b"two".to_vec()).await.unwrap();
        registry.put("/bfs/volumes/lv0", b"lv".to_vec()).await.unwrap();

        let (kvs, revision) = registry.get_prefix("/bfs/hosts/").await.unwrap();
        assert_eq!(revision, 3);
        assert_eq!(kvs.len(), 2);
        assert_eq!(kvs[0].key, "/bfs/hosts/h1");
    }

    #[tokio::test]
    async fn watch_replays_from_start_revision_then_follows() {
        let registry = MemoryRegistry::new();
        registry.put("/bfs/hosts/h1", b"one".to_vec()).await.unwrap();

        let (_, revision) = registry.get_prefix("/bfs/hosts/").await.unwrap();
        let mut watch = registry
            .watch_prefix("/bfs/hosts/", revision + 1)
            .await
            .unwrap();

        registry.put("/bfs/hosts/h2", b"two".to_vec()).await.unwrap();
        registry.delete("/bfs/hosts/h1").await.unwrap();

        match watch.recv().await.unwrap().unwrap() {
            RegistryEvent::Put(kv) => assert_eq!(kv.key, "/bfs/hosts/h2"),
            other => panic!("unexpected event {:?}", other),
        }
        match watch.recv().await.unwrap().unwrap() {
            RegistryEvent::Delete(key) => assert_eq!(key, "/bfs/hosts/h1"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn watch_ignores_other_prefixes() {
        let registry = MemoryRegistry::new();
        let mut watch = registry.watch_prefix("/bfs/hosts/", 1).await.unwrap();

        registry.put("/bfs/volumes/lv0", b"lv".to_vec()).await.unwrap();
        registry.put("/bfs/hosts/h1", b"one".to_vec()).await.unwrap();

        match watch.recv().await.unwrap().unwrap() {
            RegistryEvent::Put(kv) => assert_eq!(kv.key, "/bfs/hosts/h1"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn delete_of_absent_key_is_observable() {
        let registry = MemoryRegistry::new();
        assert!(!registry.delete("/bfs/hosts/ghost").await.unwrap());
        registry.put("/bfs/hosts/h1", b"one".to_vec()).await.unwrap();
        assert!(registry.delete("/bfs/hosts/h1").await.unwrap());
    }
}
