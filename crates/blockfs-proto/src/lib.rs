//! BlockFS Protocol Buffer Definitions
//!
//! gRPC service definitions and message types for communication between
//! BlockFS clients, name-service hosts, and physical-volume daemons.
//!
//! ## Services
//!
//! - **NameService**: per-host metadata operations (Get, Add, Delete,
//!   Rename, streaming List, VolumeInfo, AddVolume)
//! - **BlockService**: the block data plane (Write, streaming Read), served
//!   by physical-volume daemons and consumed here only through client stubs
//!
//! ## Usage
//!
//! ```ignore
//! use blockfs_proto::nameservice::{
//!     name_service_client::NameServiceClient, GetRequest,
//! };
//!
//! let mut client = NameServiceClient::connect("http://localhost:60051").await?;
//! let response = client.get(GetRequest { path: "/a.txt".into() }).await?;
//! ```

/// Name-service metadata API.
pub mod nameservice {
    tonic::include_proto!("blockfs.nameservice");
}

/// Block data-plane API.
pub mod blockservice {
    tonic::include_proto!("blockfs.blockservice");
}
