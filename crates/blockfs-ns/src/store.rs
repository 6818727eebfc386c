//! Entry Store
//!
//! Persistence layer for namespace records over an ordered, crash-durable
//! RocksDB instance. Every write is flushed to disk before the call returns
//! (`WriteOptions::set_sync(true)`), so an acknowledged mutation survives a
//! crash.
//!
//! ## Write Paths
//!
//! - [`EntryStore::put_entry`] writes the entry row first, then one
//!   block-assignment row per block. The N+1 puts are individually durable
//!   but **not** atomic as a group: a crash between them can leave an entry
//!   whose block-assignment rows are absent. Callers tolerate such dangling
//!   entries after recovery.
//! - [`EntryStore::batch_write`] applies a set of puts and deletes as one
//!   sync-flushed RocksDB batch; delete and rename use it for their
//!   all-or-nothing commits.
//!
//! ## Scans
//!
//! [`EntryStore::scan`] walks a half-open range `[from, to)` of the Entry
//! table lazily. The iterator defensively re-checks the table byte of every
//! key it visits and skips foreign rows, tolerating storage engines that do
//! not honor an exact upper bound. Exhaustion of the iterator is the end
//! signal; there is no separate sentinel value.

use crate::error::{NsError, Result};
use crate::keys::{self, Table};
use crate::types::Entry;
use rocksdb::{DBIteratorWithThreadMode, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB};
use std::path::Path;

/// Key of the global block-id counter seed.
const BLOCK_ID_KEY: &str = "blockId";

fn sync_writes() -> WriteOptions {
    let mut opts = WriteOptions::default();
    opts.set_sync(true);
    opts
}

/// RocksDB-backed store for entry, volume, and block-assignment records.
pub struct EntryStore {
    db: DB,
}

impl EntryStore {
    /// Open (or create) the store at the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref())?;
        Ok(Self { db })
    }

    /// Write an entry row, then one block-assignment row per block.
    ///
    /// Each put is individually sync-flushed; the group is not atomic.
    pub fn put_entry(&self, entry: &Entry) -> Result<()> {
        let value = serde_json::to_vec(entry)?;
        tracing::trace!(path = %entry.path, bytes = value.len(), "serialized entry");

        self.db
            .put_opt(keys::key_for(Table::Entry, &entry.path), value, &sync_writes())?;

        for block in &entry.blocks {
            let value = serde_json::to_vec(block)?;
            self.db.put_opt(
                keys::key_for(Table::BlockAssignment, &block.block),
                value,
                &sync_writes(),
            )?;
        }

        Ok(())
    }

    /// Point lookup of the entry at `path`.
    pub fn get_entry(&self, path: &str) -> Result<Entry> {
        match self.db.get_pinned(keys::key_for(Table::Entry, path))? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(NsError::NoSuchEntry {
                path: path.to_string(),
            }),
        }
    }

    /// Lazy scan over entries with paths in `[from, to)`.
    ///
    /// An empty `from` starts at the beginning of the Entry table; an empty
    /// `to` runs to the end of it.
    pub fn scan(&self, from: &str, to: &str) -> Scan<'_> {
        let start = if from.is_empty() {
            vec![Table::Entry.prefix()]
        } else {
            keys::key_for(Table::Entry, from)
        };

        let end = if to.is_empty() {
            keys::table_end(Table::Entry)
        } else {
            keys::key_for(Table::Entry, to)
        };

        let iter = self
            .db
            .iterator(IteratorMode::From(&start, Direction::Forward));

        Scan {
            iter,
            end,
            done: false,
        }
    }

    /// Apply a set of puts and deletes as one sync-flushed atomic batch.
    pub fn batch_write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write_opt(batch, &sync_writes())?;
        Ok(())
    }

    /// Seed the global block-id counter with a single zero byte, if absent.
    pub fn seed_block_id(&self) -> Result<()> {
        let key = keys::key_for(Table::GlobalMetadata, BLOCK_ID_KEY);
        if self.db.get_pinned(&key)?.is_some() {
            tracing::debug!("last blockId exists");
        } else {
            self.db.put_opt(&key, [0u8], &sync_writes())?;
            tracing::debug!("initialized blockId for the namespace");
        }
        Ok(())
    }

    /// Record the physical-volume ids backing a logical volume.
    pub fn put_volume(&self, volume_id: &str, pv_ids: &[String]) -> Result<()> {
        let value = serde_json::to_vec(pv_ids)?;
        self.db
            .put_opt(keys::key_for(Table::Volume, volume_id), value, &sync_writes())?;
        Ok(())
    }

    /// Physical-volume ids backing a logical volume.
    pub fn get_volume(&self, volume_id: &str) -> Result<Vec<String>> {
        match self.db.get_pinned(keys::key_for(Table::Volume, volume_id))? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(NsError::NoSuchVolume {
                id: volume_id.to_string(),
            }),
        }
    }
}

/// Lazy iterator over a half-open range of the Entry table.
///
/// Yields entries in ascending path order. A storage or decode failure is
/// yielded once and terminates the scan. Consumers stop early by dropping
/// the iterator.
pub struct Scan<'a> {
    iter: DBIteratorWithThreadMode<'a, DB>,
    end: Vec<u8>,
    done: bool,
}

impl Iterator for Scan<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let item = match self.iter.next() {
                Some(item) => item,
                None => {
                    self.done = true;
                    return None;
                }
            };

            let (key, value) = match item {
                Ok(kv) => kv,
                Err(err) => {
                    self.done = true;
                    return Some(Err(NsError::Storage(err)));
                }
            };

            if key.as_ref() >= self.end.as_slice() {
                self.done = true;
                return None;
            }

            // Tolerate rows from other tables leaking into the range.
            if keys::table_byte(&key) != Some(Table::Entry.prefix()) {
                continue;
            }

            match serde_json::from_slice(&value) {
                Ok(entry) => return Some(Ok(entry)),
                Err(err) => {
                    self.done = true;
                    return Some(Err(NsError::Encoding(err)));
                }
            }
        }
    }
}
