//! File Writer and Reader
//!
//! The client side of the block data plane. A [`FileWriter`] cuts the byte
//! stream into fixed-size blocks, spreads them round-robin across the
//! volume's physical volumes through the block service, and publishes the
//! finished entry to the responsible name service on close. A
//! [`FileReader`] fetches the entry and streams the block payloads back in
//! order.
//!
//! Block storage itself lives in the physical-volume daemons; this module
//! only drives their RPC interface and shapes the metadata the namespace
//! keeps.

use crate::error::{ClientError, Result};
use blockfs_proto::blockservice::block_service_client::BlockServiceClient;
use blockfs_proto::blockservice::{ReadRequest, WriteRequest};
use blockfs_proto::nameservice::name_service_client::NameServiceClient;
use blockfs_proto::nameservice::{
    AddRequest, BlockMetadata, Entry, FileStatus, GetRequest,
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use tonic::transport::Channel;
use uuid::Uuid;

/// Streams file content into blocks and registers the entry on close.
pub struct FileWriter {
    name_client: NameServiceClient<Channel>,
    block_client: BlockServiceClient<Channel>,
    lv_id: String,
    pv_ids: Vec<String>,
    path: String,
    block_size: u64,
    buffer: BytesMut,
    blocks: Vec<BlockMetadata>,
    size: u64,
    next_pv: usize,
}

impl FileWriter {
    pub(crate) fn new(
        name_client: NameServiceClient<Channel>,
        block_client: BlockServiceClient<Channel>,
        lv_id: String,
        pv_ids: Vec<String>,
        path: String,
        block_size: u64,
    ) -> Self {
        Self {
            name_client,
            block_client,
            lv_id,
            pv_ids,
            path,
            block_size,
            buffer: BytesMut::new(),
            blocks: Vec::new(),
            size: 0,
            next_pv: 0,
        }
    }

    /// Append bytes; full blocks are shipped as they accumulate.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.buffer.extend_from_slice(data);

        while self.block_size > 0 && self.buffer.len() as u64 >= self.block_size {
            let len = self.block_size as usize;
            self.cut_block(len).await?;
        }

        Ok(data.len())
    }

    async fn cut_block(&mut self, len: usize) -> Result<()> {
        let data = self.buffer.split_to(len);
        let block_id = Uuid::new_v4().to_string();
        let pv_id = self.pv_ids[self.next_pv % self.pv_ids.len()].clone();
        self.next_pv += 1;

        tracing::debug!(block = %block_id, pv = %pv_id, bytes = len, "writing block");

        self.block_client
            .write(WriteRequest {
                block_id: block_id.clone(),
                pv_id: pv_id.clone(),
                data: data.to_vec(),
            })
            .await?;

        self.size += len as u64;
        self.blocks.push(BlockMetadata { block_id, pv_id });
        Ok(())
    }

    /// Flush the trailing partial block and publish the entry.
    pub async fn close(mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            let len = self.buffer.len();
            self.cut_block(len).await?;
        }

        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let entry = Entry {
            path: self.path.clone(),
            lv_id: self.lv_id.clone(),
            blocks: std::mem::take(&mut self.blocks),
            permissions: 0,
            status: FileStatus::Ok as i32,
            block_size: self.block_size,
            size: self.size,
            replication_level: 1,
            ctime_ns: now,
            mtime_ns: now,
        };

        tracing::debug!(path = %self.path, blocks = entry.blocks.len(), "committing entry");
        self.name_client.add(AddRequest { entry: Some(entry) }).await?;
        Ok(())
    }
}

/// Reads a file's entry and streams its blocks back in order.
pub struct FileReader {
    name_client: NameServiceClient<Channel>,
    block_client: BlockServiceClient<Channel>,
    path: String,
    entry: Option<Entry>,
    next_block: usize,
}

impl FileReader {
    pub(crate) fn new(
        name_client: NameServiceClient<Channel>,
        block_client: BlockServiceClient<Channel>,
        path: String,
    ) -> Self {
        Self {
            name_client,
            block_client,
            path,
            entry: None,
            next_block: 0,
        }
    }

    /// Fetch the entry metadata. Must precede block reads.
    pub async fn open(&mut self) -> Result<()> {
        let response = self
            .name_client
            .get(GetRequest {
                path: self.path.clone(),
            })
            .await?
            .into_inner();

        let entry = response
            .entry
            .ok_or_else(|| ClientError::Malformed("get response missing entry".to_string()))?;
        self.entry = Some(entry);
        Ok(())
    }

    /// The entry fetched by [`FileReader::open`].
    pub fn entry(&self) -> Option<&Entry> {
        self.entry.as_ref()
    }

    /// The next block's payload, or `None` past the last block.
    pub async fn next_block(&mut self) -> Result<Option<Bytes>> {
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| ClientError::Malformed("reader not opened".to_string()))?;

        let block = match entry.blocks.get(self.next_block) {
            Some(block) => block.clone(),
            None => return Ok(None),
        };
        self.next_block += 1;

        let mut stream = self
            .block_client
            .read(ReadRequest {
                block_id: block.block_id,
                pv_id: block.pv_id,
            })
            .await?
            .into_inner();

        let mut data = BytesMut::new();
        while let Some(chunk) = stream.message().await? {
            data.extend_from_slice(&chunk.data);
        }

        Ok(Some(data.freeze()))
    }
}
