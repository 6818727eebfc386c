//! Namespace Error Types
//!
//! ## Error Categories
//!
//! - `StateViolation`: an operation was invoked outside the Open lifecycle
//!   state
//! - `NoSuchEntry` / `NoSuchVolume`: lookup misses, distinguishable from
//!   storage failures and carrying the key that missed
//! - `Encoding`: entry or block record failed to (de)serialize
//! - `Storage`: the underlying RocksDB operation failed
//!
//! All namespace operations return `Result<T>`, aliased to
//! `Result<T, NsError>`, so call sites propagate with `?` and match on the
//! specific variants they care about (a name service maps `NoSuchEntry` to
//! NOT_FOUND and `StateViolation` to FAILED_PRECONDITION, for example).

use crate::namespace::NamespaceState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NsError>;

#[derive(Debug, Error)]
pub enum NsError {
    #[error("unable to perform operation in state {0}")]
    StateViolation(NamespaceState),

    #[error("no such entry - {path}")]
    NoSuchEntry { path: String },

    #[error("no such volume - {id}")]
    NoSuchVolume { id: String },

    #[error("serialization error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
}
