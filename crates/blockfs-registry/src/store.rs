//! Coordination-Store Contract
//!
//! The narrow interface BlockFS requires of its coordination store: prefix
//! reads that report the revision they were taken at, prefix watches that
//! resume from a revision, and plain put/delete. Everything the client
//! builds on top (the registry view, volume management) goes through this
//! trait, so tests can substitute [`crate::MemoryRegistry`] for a live etcd
//! cluster.

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A key/value pair read from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryKv {
    pub key: String,
    pub value: Vec<u8>,
}

/// A single change observed by a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Put(RegistryKv),
    Delete(String),
}

/// A live watch over a key prefix.
///
/// Events arrive in revision order. Dropping the watch, or calling
/// [`RegistryWatch::cancel`], stops the producer task; the store side of
/// the watch is torn down with it.
pub struct RegistryWatch {
    events: mpsc::Receiver<Result<RegistryEvent>>,
    producer: JoinHandle<()>,
}

impl RegistryWatch {
    pub(crate) fn new(
        events: mpsc::Receiver<Result<RegistryEvent>>,
        producer: JoinHandle<()>,
    ) -> Self {
        Self { events, producer }
    }

    /// Next change, or `None` once the watch has ended.
    pub async fn recv(&mut self) -> Option<Result<RegistryEvent>> {
        self.events.recv().await
    }

    /// Stop the watch. Idempotent.
    pub fn cancel(&self) {
        self.producer.abort();
    }
}

impl Drop for RegistryWatch {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

/// The watch/get contract the client depends on.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// All key/value pairs under `prefix`, plus the revision the read was
    /// taken at. Watches seeded with `revision + 1` observe exactly the
    /// changes that happen after this snapshot.
    async fn get_prefix(&self, prefix: &str) -> Result<(Vec<RegistryKv>, i64)>;

    /// Watch `prefix` for changes from `start_revision` onward.
    async fn watch_prefix(&self, prefix: &str, start_revision: i64) -> Result<RegistryWatch>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete `key`. Returns whether a record was actually removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Release the store client. Idempotent; operations after close fail
    /// where the backend holds real resources.
    async fn close(&self) -> Result<()>;
}
