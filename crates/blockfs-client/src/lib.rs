//! BlockFS Client Library
//!
//! The client side of BlockFS: discovers name- and block-service hosts
//! through the shared registry, routes each path to its responsible host
//! with consistent hashing, pools gRPC channels, and exposes per-path file
//! operations.
//!
//! ## How a Call Flows
//!
//! ```text
//! BfsClient::stat("/data/a.txt")
//!         │
//!         ▼
//! HashRing::get ──► responsible host id
//!         │
//!         ▼
//! RegistryView ──► advertise address for that host
//!         │
//!         ▼
//! ConnectionCache ──► ready-to-use channel + stubs
//!         │
//!         ▼
//! NameService::Get RPC
//! ```
//!
//! The [`view::RegistryView`] keeps the host and volume maps (and the ring)
//! live by consuming registry watch events; routing decisions always see
//! the latest applied membership. List fans out to every known host and
//! merges the per-host streams; see [`client::BfsClient::list`].

pub mod client;
pub mod conn_cache;
pub mod error;
pub mod file;
pub mod ring;
pub mod view;

pub use client::{BfsClient, ListStream, ServiceClient};
pub use conn_cache::ConnectionCache;
pub use error::{ClientError, RenameStage, Result};
pub use file::{FileReader, FileWriter};
pub use ring::HashRing;
pub use view::RegistryView;
