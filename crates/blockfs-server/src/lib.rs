//! BlockFS Name-Service Server
//!
//! Exposes one host's [`blockfs_ns::Namespace`] over the gRPC name-service
//! API. Unary metadata operations map straight onto the namespace; List is
//! server-streaming with entries batched up to
//! [`service::DEFAULT_LIST_BATCH_SIZE`] per response.
//!
//! The `blockfs-nameserver` binary wires a namespace, the gRPC server, and
//! registry self-registration together; see `src/main.rs`.

pub mod service;

pub use service::{NameServiceImpl, DEFAULT_LIST_BATCH_SIZE};
