//! Namespace State Machine
//!
//! A [`Namespace`] owns one [`EntryStore`] exclusively from `open()` until
//! `close()`. The lifecycle is strictly Initial → Open → Closed: a closed
//! namespace cannot be reopened, and every domain operation refuses with
//! [`NsError::StateViolation`] unless the state is Open.
//!
//! State is written only by `open`/`close` (which take `&mut self`); domain
//! operations read it. A namespace is not expected to be opened or closed
//! concurrently with in-flight operations — servers open it once, share it
//! behind an `Arc`, and close it after the last handler has drained.

use crate::error::{NsError, Result};
use crate::keys::{self, Table};
use crate::store::{EntryStore, Scan};
use crate::types::Entry;
use rocksdb::WriteBatch;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a [`Namespace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceState {
    Initial,
    Open,
    Closed,
}

impl fmt::Display for NamespaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NamespaceState::Initial => "INITIAL",
            NamespaceState::Open => "OPEN",
            NamespaceState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// The durable namespace of one name-service host.
pub struct Namespace {
    path: PathBuf,
    store: Option<EntryStore>,
    state: NamespaceState,
}

impl Namespace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store: None,
            state: NamespaceState::Initial,
        }
    }

    pub fn state(&self) -> NamespaceState {
        self.state
    }

    /// Open the underlying store and seed the global block-id counter.
    ///
    /// Succeeds only from the Initial state.
    pub fn open(&mut self) -> Result<()> {
        tracing::debug!(path = %self.path.display(), "opening namespace");

        if self.state != NamespaceState::Initial {
            return Err(NsError::StateViolation(self.state));
        }

        let store = EntryStore::open(&self.path)?;
        store.seed_block_id()?;

        self.store = Some(store);
        self.state = NamespaceState::Open;
        Ok(())
    }

    /// Release the underlying store. Succeeds only from the Open state.
    pub fn close(&mut self) -> Result<()> {
        tracing::debug!(path = %self.path.display(), "closing namespace");

        if self.state != NamespaceState::Open {
            return Err(NsError::StateViolation(self.state));
        }

        self.store = None;
        self.state = NamespaceState::Closed;
        Ok(())
    }

    fn store(&self) -> Result<&EntryStore> {
        match self.state {
            NamespaceState::Open => Ok(self
                .store
                .as_ref()
                .expect("open namespace always holds a store")),
            other => Err(NsError::StateViolation(other)),
        }
    }

    /// Persist an entry and its block-assignment records.
    pub fn add(&self, entry: &Entry) -> Result<()> {
        tracing::debug!(path = %entry.path, blocks = entry.blocks.len(), "adding entry");
        self.store()?.put_entry(entry)
    }

    /// Fetch the entry at `path`.
    pub fn get(&self, path: &str) -> Result<Entry> {
        tracing::debug!(%path, "getting entry");
        self.store()?.get_entry(path)
    }

    /// Scan entries with paths in `[from, to)`, in ascending path order.
    ///
    /// Empty bounds open the corresponding end of the range.
    pub fn list(&self, from: &str, to: &str) -> Result<Scan<'_>> {
        tracing::debug!(%from, %to, "listing entries");
        Ok(self.store()?.scan(from, to))
    }

    /// Delete the entry at `path`, or the whole subtree under it.
    ///
    /// Recursive deletion removes every entry whose path starts with `path`;
    /// non-recursive deletion removes the exact path only. All staged
    /// deletes commit in a single batch. Returns the number of entries
    /// removed.
    ///
    /// Block-assignment rows for the deleted entries are left in place for
    /// the block garbage collector to reclaim.
    pub fn delete(&self, path: &str, recursive: bool) -> Result<u32> {
        tracing::debug!(%path, recursive, "deleting entries");

        let store = self.store()?;
        let mut batch = WriteBatch::default();
        let mut deleted: u32 = 0;

        for item in store.scan(path, "") {
            let entry = item?;

            if recursive {
                if !entry.path.starts_with(path) {
                    break;
                }
            } else if entry.path != path {
                break;
            }

            batch.delete(keys::key_for(Table::Entry, &entry.path));
            deleted += 1;
        }

        store.batch_write(batch)?;
        Ok(deleted)
    }

    /// Move the entry at `from` to `to` in a single atomic batch.
    ///
    /// Fails if the source is absent. The block list is carried unchanged;
    /// block-assignment rows key by block id and are not touched. Renaming
    /// an existing path onto itself is a no-op that reports success without
    /// writing.
    pub fn rename(&self, from: &str, to: &str) -> Result<bool> {
        tracing::debug!(%from, %to, "renaming entry");

        let store = self.store()?;
        let mut entry = store.get_entry(from)?;

        // The source exists; a self-rename changes nothing.
        if from == to {
            return Ok(true);
        }

        entry.path = to.to_string();
        let value = serde_json::to_vec(&entry)?;

        let mut batch = WriteBatch::default();
        batch.put(keys::key_for(Table::Entry, to), value);
        batch.delete(keys::key_for(Table::Entry, from));
        store.batch_write(batch)?;

        Ok(true)
    }

    /// Physical-volume ids backing a logical volume.
    pub fn volume(&self, volume_id: &str) -> Result<Vec<String>> {
        self.store()?.get_volume(volume_id)
    }

    /// Record the physical-volume ids backing a logical volume.
    pub fn add_volume(&self, volume_id: &str, pv_ids: &[String]) -> Result<()> {
        tracing::debug!(%volume_id, pvs = pv_ids.len(), "adding volume");
        self.store()?.put_volume(volume_id, pv_ids)
    }
}
