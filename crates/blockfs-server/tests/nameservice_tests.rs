//! Service-level tests for the name-service gRPC implementation, driving
//! the handlers directly without a network listener.

use blockfs_ns::Namespace;
use blockfs_proto::nameservice::name_service_server::NameService;
use blockfs_proto::nameservice::{
    AddRequest, AddVolumeRequest, BlockMetadata, DeleteRequest, Entry, FileStatus, GetRequest,
    ListRequest, RenameRequest, VolumeInfoRequest,
};
use blockfs_server::{NameServiceImpl, DEFAULT_LIST_BATCH_SIZE};
use std::sync::Arc;
use tempfile::TempDir;
use tonic::{Code, Request};

fn service(dir: &TempDir) -> NameServiceImpl {
    let mut namespace = Namespace::new(dir.path().join("db"));
    namespace.open().expect("open failed");
    NameServiceImpl::new(Arc::new(namespace))
}

fn entry(path: &str, blocks: &[(&str, &str)]) -> Entry {
    Entry {
        path: path.to_string(),
        lv_id: "/".to_string(),
        blocks: blocks
            .iter()
            .map(|(block_id, pv_id)| BlockMetadata {
                block_id: block_id.to_string(),
                pv_id: pv_id.to_string(),
            })
            .collect(),
        permissions: 0o644,
        status: FileStatus::Ok as i32,
        block_size: 1024,
        size: 2048,
        replication_level: 1,
        ctime_ns: 1_714_564_800_123_456_789,
        mtime_ns: 1_714_564_800_123_456_789,
    }
}

async fn add(service: &NameServiceImpl, entry: Entry) {
    service
        .add(Request::new(AddRequest { entry: Some(entry) }))
        .await
        .expect("add failed");
}

#[tokio::test]
async fn add_then_get_round_trips_the_entry() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    let original = entry("/a.txt", &[("1", "1"), ("2", "1")]);
    add(&service, original.clone()).await;

    let response = service
        .get(Request::new(GetRequest {
            path: "/a.txt".to_string(),
        }))
        .await
        .unwrap()
        .into_inner();

    let found = response.entry.unwrap();
    assert_eq!(found, original);
    // Nanosecond timestamps survive the store round trip.
    assert_eq!(found.ctime_ns, 1_714_564_800_123_456_789);
}

#[tokio::test]
async fn get_missing_entry_is_not_found() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    let status = service
        .get(Request::new(GetRequest {
            path: "/missing".to_string(),
        }))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::NotFound);
    assert!(status.message().contains("/missing"));
}

#[tokio::test]
async fn delete_reports_the_number_of_entries_removed() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    add(&service, entry("/d/1", &[])).await;
    add(&service, entry("/d/2", &[])).await;
    add(&service, entry("/e/1", &[])).await;

    let response = service
        .delete(Request::new(DeleteRequest {
            path: "/d/".to_string(),
            recursive: true,
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.entries_deleted, 2);

    let response = service
        .delete(Request::new(DeleteRequest {
            path: "/e/1".to_string(),
            recursive: false,
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.entries_deleted, 1);
}

#[tokio::test]
async fn rename_moves_the_entry_on_one_host() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    add(&service, entry("/old.txt", &[("7", "2")])).await;

    let response = service
        .rename(Request::new(RenameRequest {
            source_path: "/old.txt".to_string(),
            destination_path: "/new.txt".to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(response.success);

    let found = service
        .get(Request::new(GetRequest {
            path: "/new.txt".to_string(),
        }))
        .await
        .unwrap()
        .into_inner()
        .entry
        .unwrap();
    assert_eq!(found.path, "/new.txt");
    assert_eq!(found.blocks.len(), 1);

    let status = service
        .get(Request::new(GetRequest {
            path: "/old.txt".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn list_streams_batches_of_up_to_512_entries() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    let total = DEFAULT_LIST_BATCH_SIZE + 1;
    for i in 0..total {
        add(&service, entry(&format!("/f/{i:05}"), &[])).await;
    }

    let response = service
        .list(Request::new(ListRequest {
            start_key: String::new(),
            end_key: String::new(),
        }))
        .await
        .unwrap();

    let mut rx = response.into_inner().into_inner();
    let mut batch_sizes = Vec::new();
    let mut paths = Vec::new();
    while let Some(batch) = rx.recv().await {
        let batch = batch.unwrap();
        batch_sizes.push(batch.entries.len());
        paths.extend(batch.entries.into_iter().map(|e| e.path));
    }

    assert_eq!(batch_sizes, vec![DEFAULT_LIST_BATCH_SIZE, 1]);
    assert_eq!(paths.len(), total);
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted, "entries must stream in ascending path order");
}

#[tokio::test]
async fn list_of_empty_range_sends_one_empty_batch() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    let response = service
        .list(Request::new(ListRequest {
            start_key: "/".to_string(),
            end_key: "/z".to_string(),
        }))
        .await
        .unwrap();

    let mut rx = response.into_inner().into_inner();
    let first = rx.recv().await.unwrap().unwrap();
    assert!(first.entries.is_empty());
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn volumes_are_served_from_the_namespace() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    service
        .add_volume(Request::new(AddVolumeRequest {
            volume_id: "lv0".to_string(),
            pv_ids: vec!["pv-1".to_string(), "pv-2".to_string()],
        }))
        .await
        .unwrap();

    let response = service
        .volume_info(Request::new(VolumeInfoRequest {
            volume_id: "lv0".to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.pv_ids, vec!["pv-1", "pv-2"]);

    let status = service
        .volume_info(Request::new(VolumeInfoRequest {
            volume_id: "lv9".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn closed_namespace_fails_precondition() {
    let dir = TempDir::new().unwrap();
    let mut namespace = Namespace::new(dir.path().join("db"));
    namespace.open().unwrap();
    namespace.close().unwrap();
    let service = NameServiceImpl::new(Arc::new(namespace));

    let status = service
        .get(Request::new(GetRequest {
            path: "/a.txt".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
}

/// A cross-host rename that dies between "add on destination" and "delete
/// on source" leaves the entry visible on both hosts; reconciliation is the
/// caller's problem.
#[tokio::test]
async fn interrupted_relocation_leaves_the_entry_on_both_hosts() {
    let source_dir = TempDir::new().unwrap();
    let dest_dir = TempDir::new().unwrap();
    let source = service(&source_dir);
    let dest = service(&dest_dir);

    add(&source, entry("/move-me.txt", &[("1", "1")])).await;

    // Relocation steps one and two, as the client performs them.
    let mut moved = source
        .get(Request::new(GetRequest {
            path: "/move-me.txt".to_string(),
        }))
        .await
        .unwrap()
        .into_inner()
        .entry
        .unwrap();
    moved.path = "/moved.txt".to_string();
    add(&dest, moved).await;

    // Step three (delete on source) never runs. Both lookups succeed.
    assert!(source
        .get(Request::new(GetRequest {
            path: "/move-me.txt".to_string(),
        }))
        .await
        .is_ok());
    assert!(dest
        .get(Request::new(GetRequest {
            path: "/moved.txt".to_string(),
        }))
        .await
        .is_ok());
}
