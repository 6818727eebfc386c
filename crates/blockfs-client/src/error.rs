//! Client Error Types
//!
//! ## Error Categories
//!
//! - Routing: `EmptyRing`, `NoVolumeForPath`, `UnknownHost` — no retry is
//!   attempted, the caller sees these immediately
//! - Transport: `Connect` (channel establishment) and `Rpc` (a call or
//!   stream failed)
//! - `Registry`: the coordination store misbehaved
//! - `RenameIncomplete`: a cross-host rename failed partway; the stage
//!   field says which of the three steps broke so the caller can reason
//!   about residual state. No compensation is attempted.

use blockfs_registry::RegistryError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// The step of a cross-host rename that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameStage {
    GetSource,
    AddDestination,
    DeleteSource,
}

impl fmt::Display for RenameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenameStage::GetSource => "get-source",
            RenameStage::AddDestination => "add-destination",
            RenameStage::DeleteSource => "delete-source",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("consistent-hash ring is empty")]
    EmptyRing,

    #[error("unable to find volume for file {path}")]
    NoVolumeForPath { path: String },

    #[error("host {host_id} is not in the registry view")]
    UnknownHost { host_id: String },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("serialization error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("connect error: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("rpc error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rename of {source_path} to {destination_path} incomplete at {stage}: {cause}")]
    RenameIncomplete {
        source_path: String,
        destination_path: String,
        stage: RenameStage,
        #[source]
        cause: Box<ClientError>,
    },
}
