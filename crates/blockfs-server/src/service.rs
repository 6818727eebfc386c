//! Name-Service gRPC Implementation
//!
//! Translates wire requests into namespace operations and domain errors
//! into gRPC status codes: a missing entry is NOT_FOUND, a lifecycle
//! violation is FAILED_PRECONDITION, everything else is INTERNAL.
//!
//! The List handler produces its stream from a blocking task: the
//! namespace scan is synchronous RocksDB iteration, so it runs on the
//! blocking pool and feeds batches through a channel into the response
//! stream. A full batch is sent as soon as it fills; the final batch is
//! sent at end-of-scan even when it is partial or empty.

use blockfs_ns::{BlockMetadata, Entry, FileStatus, Namespace, NsError};
use blockfs_proto::nameservice::name_service_server::NameService;
use blockfs_proto::nameservice::{
    AddRequest, AddResponse, AddVolumeRequest, AddVolumeResponse, DeleteRequest, DeleteResponse,
    GetRequest, GetResponse, ListRequest, ListResponse, RenameRequest, RenameResponse,
    VolumeInfoRequest, VolumeInfoResponse,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

/// Entries per streamed List response.
pub const DEFAULT_LIST_BATCH_SIZE: usize = 512;

/// Batches buffered between the scan task and the response stream.
const LIST_CHANNEL_DEPTH: usize = 4;

/// gRPC name service over one host's namespace.
pub struct NameServiceImpl {
    namespace: Arc<Namespace>,
}

impl NameServiceImpl {
    pub fn new(namespace: Arc<Namespace>) -> Self {
        Self { namespace }
    }
}

fn to_status(err: NsError) -> Status {
    match err {
        NsError::NoSuchEntry { .. } | NsError::NoSuchVolume { .. } => {
            Status::not_found(err.to_string())
        }
        NsError::StateViolation(_) => Status::failed_precondition(err.to_string()),
        other => Status::internal(other.to_string()),
    }
}

fn entry_to_proto(entry: &Entry) -> blockfs_proto::nameservice::Entry {
    blockfs_proto::nameservice::Entry {
        path: entry.path.clone(),
        lv_id: entry.volume_name.clone(),
        blocks: entry
            .blocks
            .iter()
            .map(|block| blockfs_proto::nameservice::BlockMetadata {
                block_id: block.block.clone(),
                pv_id: block.pv_id.clone(),
            })
            .collect(),
        permissions: entry.permissions as u32,
        status: u8::from(entry.status) as i32,
        block_size: entry.block_size,
        size: entry.size,
        replication_level: entry.replication_level,
        ctime_ns: entry.ctime.timestamp_nanos_opt().unwrap_or_default(),
        mtime_ns: entry.mtime.timestamp_nanos_opt().unwrap_or_default(),
    }
}

fn entry_from_proto(entry: blockfs_proto::nameservice::Entry) -> Entry {
    let status = u8::try_from(entry.status)
        .ok()
        .and_then(|value| FileStatus::try_from(value).ok())
        .unwrap_or_default();

    Entry {
        volume_name: entry.lv_id.clone(),
        path: entry.path,
        blocks: entry
            .blocks
            .into_iter()
            .map(|block| BlockMetadata {
                block: block.block_id,
                lv_name: entry.lv_id.clone(),
                pv_id: block.pv_id,
            })
            .collect(),
        permissions: entry.permissions as u8,
        status,
        block_size: entry.block_size,
        size: entry.size,
        replication_level: entry.replication_level,
        ctime: Utc.timestamp_nanos(entry.ctime_ns),
        mtime: Utc.timestamp_nanos(entry.mtime_ns),
    }
}

#[tonic::async_trait]
impl NameService for NameServiceImpl {
    #[tracing::instrument(skip(self, request), fields(path = %request.get_ref().path))]
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();
        let entry = self.namespace.get(&req.path).map_err(to_status)?;

        Ok(Response::new(GetResponse {
            entry: Some(entry_to_proto(&entry)),
        }))
    }

    async fn add(&self, request: Request<AddRequest>) -> Result<Response<AddResponse>, Status> {
        let req = request.into_inner();
        let entry = req
            .entry
            .ok_or_else(|| Status::invalid_argument("add request without entry"))?;

        self.namespace
            .add(&entry_from_proto(entry))
            .map_err(to_status)?;

        Ok(Response::new(AddResponse {}))
    }

    #[tracing::instrument(skip(self, request), fields(path = %request.get_ref().path, recursive = request.get_ref().recursive))]
    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let req = request.into_inner();
        let entries_deleted = self
            .namespace
            .delete(&req.path, req.recursive)
            .map_err(to_status)?;

        Ok(Response::new(DeleteResponse { entries_deleted }))
    }

    async fn rename(
        &self,
        request: Request<RenameRequest>,
    ) -> Result<Response<RenameResponse>, Status> {
        let req = request.into_inner();
        let success = self
            .namespace
            .rename(&req.source_path, &req.destination_path)
            .map_err(to_status)?;

        Ok(Response::new(RenameResponse { success }))
    }

    type ListStream = ReceiverStream<Result<ListResponse, Status>>;

    #[tracing::instrument(skip(self, request), fields(start = %request.get_ref().start_key, end = %request.get_ref().end_key))]
    async fn list(
        &self,
        request: Request<ListRequest>,
    ) -> Result<Response<Self::ListStream>, Status> {
        let req = request.into_inner();
        let namespace = self.namespace.clone();
        let (tx, rx) = mpsc::channel(LIST_CHANNEL_DEPTH);

        tokio::task::spawn_blocking(move || {
            let scan = match namespace.list(&req.start_key, &req.end_key) {
                Ok(scan) => scan,
                Err(err) => {
                    let _ = tx.blocking_send(Err(to_status(err)));
                    return;
                }
            };

            let mut entries = Vec::with_capacity(DEFAULT_LIST_BATCH_SIZE);
            for item in scan {
                match item {
                    Ok(entry) => {
                        entries.push(entry_to_proto(&entry));
                        if entries.len() == DEFAULT_LIST_BATCH_SIZE {
                            let batch = ListResponse {
                                entries: std::mem::take(&mut entries),
                            };
                            if tx.blocking_send(Ok(batch)).is_err() {
                                // Consumer went away; stop scanning.
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.blocking_send(Err(to_status(err)));
                        return;
                    }
                }
            }

            let _ = tx.blocking_send(Ok(ListResponse { entries }));
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn volume_info(
        &self,
        request: Request<VolumeInfoRequest>,
    ) -> Result<Response<VolumeInfoResponse>, Status> {
        let req = request.into_inner();
        let pv_ids = self.namespace.volume(&req.volume_id).map_err(to_status)?;

        Ok(Response::new(VolumeInfoResponse { pv_ids }))
    }

    async fn add_volume(
        &self,
        request: Request<AddVolumeRequest>,
    ) -> Result<Response<AddVolumeResponse>, Status> {
        let req = request.into_inner();
        self.namespace
            .add_volume(&req.volume_id, &req.pv_ids)
            .map_err(to_status)?;

        Ok(Response::new(AddVolumeResponse {}))
    }
}
