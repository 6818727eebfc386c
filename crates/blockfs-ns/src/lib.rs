//! BlockFS Namespace Engine
//!
//! This crate implements the metadata namespace for a single name-service
//! host: the durable directory of file entries and block-assignment records
//! that one host is responsible for.
//!
//! ## What Lives Here
//!
//! - **Entry / BlockMetadata** ([`types`]): the canonical file record and its
//!   per-block placement records
//! - **Keyspace codec** ([`keys`]): typed (table byte, string) pairs encoded
//!   into ordered RocksDB keys
//! - **Entry store** ([`store`]): sync-flushed puts, point lookups, and lazy
//!   range scans over the ordered keyspace
//! - **Namespace** ([`namespace`]): the stateful service wrapper enforcing
//!   the Initial → Open → Closed lifecycle and translating domain operations
//!   (add, get, list, delete, rename) into store operations
//!
//! ## Durability Model
//!
//! Every acknowledged write is flushed (`WriteOptions::set_sync(true)`)
//! before the call returns. Multi-key mutations (delete, rename) go through a
//! single `WriteBatch` so they commit atomically. The entry-plus-blocks write
//! path in [`store::EntryStore::put_entry`] is deliberately *not* atomic
//! across its N+1 puts; a crash mid-add can leave an entry whose
//! block-assignment rows are missing, and readers must tolerate that.
//!
//! ## Usage
//!
//! ```ignore
//! use blockfs_ns::{Entry, Namespace};
//!
//! let mut ns = Namespace::new("/var/lib/blockfs/ns");
//! ns.open()?;
//! ns.add(&entry)?;
//! let found = ns.get("/a.txt")?;
//! for entry in ns.list("/", "/z")? {
//!     println!("{}", entry?.path);
//! }
//! ns.close()?;
//! ```

pub mod error;
pub mod keys;
pub mod namespace;
pub mod store;
pub mod types;

pub use error::{NsError, Result};
pub use keys::Table;
pub use namespace::{Namespace, NamespaceState};
pub use store::EntryStore;
pub use types::{BlockMetadata, Entry, FileStatus};
