//! Registry View
//!
//! An in-memory mirror of the host and volume records in the coordination
//! store, kept live by two long-lived watches.
//!
//! Bootstrap reads both subtrees at a recorded revision and seeds the maps
//! (and the consistent-hash ring with every host id); the watches then
//! consume changes from the next revision onward, so no event is lost
//! between snapshot and follow. Volumes are indexed by the value of their
//! `mount` label; volumes without one are logged and dropped.
//!
//! The maps are written only by the watch tasks and read by every client
//! operation, so they sit behind `std::sync::RwLock` with snapshot-read
//! accessors. Writers hold the lock only for the map update, never across
//! I/O.

use crate::error::Result;
use crate::ring::HashRing;
use blockfs_registry::paths;
use blockfs_registry::{
    HostConfig, LogicalVolumeConfig, RegistryEvent, RegistryStore, RegistryWatch,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;

type HostMap = Arc<RwLock<HashMap<String, HostConfig>>>;
type VolumeMap = Arc<RwLock<HashMap<String, LogicalVolumeConfig>>>;

/// Live mirror of registry host and volume records.
pub struct RegistryView {
    hosts: HostMap,
    volumes: VolumeMap,
    hosts_task: JoinHandle<()>,
    volumes_task: JoinHandle<()>,
}

impl RegistryView {
    /// Seed the view from the store and start both watch loops.
    pub async fn bootstrap(
        store: Arc<dyn RegistryStore>,
        prefix: &str,
        ring: Arc<HashRing>,
    ) -> Result<Self> {
        let hosts: HostMap = Arc::new(RwLock::new(HashMap::new()));
        let volumes: VolumeMap = Arc::new(RwLock::new(HashMap::new()));

        let volumes_prefix = paths::volumes_prefix(prefix);
        let (kvs, volumes_revision) = store.get_prefix(&volumes_prefix).await?;
        for kv in kvs {
            tracing::debug!(key = %kv.key, "found volume");
            match serde_json::from_slice::<LogicalVolumeConfig>(&kv.value) {
                Ok(config) => apply_volume_put(&volumes, config),
                Err(err) => {
                    tracing::warn!(key = %kv.key, %err, "unable to deserialize volume config")
                }
            }
        }

        let hosts_prefix = paths::hosts_prefix(prefix);
        let (kvs, hosts_revision) = store.get_prefix(&hosts_prefix).await?;
        for kv in kvs {
            tracing::debug!(key = %kv.key, "found host");
            match serde_json::from_slice::<HostConfig>(&kv.value) {
                Ok(config) => {
                    ring.add(&config.id);
                    hosts.write().unwrap().insert(config.id.clone(), config);
                }
                Err(err) => {
                    tracing::warn!(key = %kv.key, %err, "unable to deserialize host config")
                }
            }
        }

        let volumes_watch = store
            .watch_prefix(&volumes_prefix, volumes_revision + 1)
            .await?;
        let hosts_watch = store.watch_prefix(&hosts_prefix, hosts_revision + 1).await?;

        let volumes_task = tokio::spawn(run_volumes_watch(
            volumes_watch,
            volumes.clone(),
            volumes_prefix,
        ));
        let hosts_task = tokio::spawn(run_hosts_watch(
            hosts_watch,
            hosts.clone(),
            ring,
            hosts_prefix,
        ));

        Ok(Self {
            hosts,
            volumes,
            hosts_task,
            volumes_task,
        })
    }

    pub fn host(&self, host_id: &str) -> Option<HostConfig> {
        self.hosts.read().unwrap().get(host_id).cloned()
    }

    /// Snapshot of every known host.
    pub fn hosts(&self) -> Vec<HostConfig> {
        self.hosts.read().unwrap().values().cloned().collect()
    }

    /// Snapshot of the mount → volume map.
    pub fn volumes(&self) -> Vec<(String, LogicalVolumeConfig)> {
        self.volumes
            .read()
            .unwrap()
            .iter()
            .map(|(mount, config)| (mount.clone(), config.clone()))
            .collect()
    }

    /// Cancel both watches.
    pub fn close(&self) {
        self.hosts_task.abort();
        self.volumes_task.abort();
    }
}

impl Drop for RegistryView {
    fn drop(&mut self) {
        self.close();
    }
}

fn apply_volume_put(volumes: &VolumeMap, config: LogicalVolumeConfig) {
    match config.mount() {
        Some(mount) => {
            volumes
                .write()
                .unwrap()
                .insert(mount.to_string(), config.clone());
        }
        None => tracing::warn!(volume = %config.id, "volume has no mount label"),
    }
}

async fn run_volumes_watch(mut watch: RegistryWatch, volumes: VolumeMap, prefix: String) {
    tracing::debug!("volume watcher starting");

    while let Some(event) = watch.recv().await {
        match event {
            Ok(RegistryEvent::Put(kv)) => {
                tracing::debug!(key = %kv.key, "update to volume");
                match serde_json::from_slice::<LogicalVolumeConfig>(&kv.value) {
                    Ok(config) => apply_volume_put(&volumes, config),
                    Err(err) => {
                        tracing::warn!(key = %kv.key, %err, "unable to deserialize volume config")
                    }
                }
            }
            Ok(RegistryEvent::Delete(key)) => {
                tracing::debug!(%key, "volume removed");
                let volume_id = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
                volumes
                    .write()
                    .unwrap()
                    .retain(|_, config| config.id != volume_id);
            }
            Err(err) => {
                tracing::warn!(%err, "volume watch failed");
                break;
            }
        }
    }

    tracing::debug!("volume watcher complete");
}

async fn run_hosts_watch(
    mut watch: RegistryWatch,
    hosts: HostMap,
    ring: Arc<HashRing>,
    prefix: String,
) {
    tracing::debug!("host watcher starting");

    while let Some(event) = watch.recv().await {
        match event {
            Ok(RegistryEvent::Put(kv)) => {
                tracing::debug!(key = %kv.key, "update to host");
                match serde_json::from_slice::<HostConfig>(&kv.value) {
                    Ok(config) => {
                        ring.add(&config.id);
                        hosts.write().unwrap().insert(config.id.clone(), config);
                    }
                    Err(err) => {
                        tracing::warn!(key = %kv.key, %err, "unable to deserialize host config")
                    }
                }
            }
            Ok(RegistryEvent::Delete(key)) => {
                tracing::debug!(%key, "host removed");
                let host_id = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
                hosts.write().unwrap().remove(&host_id);
                ring.remove(&host_id);
            }
            Err(err) => {
                tracing::warn!(%err, "host watch failed");
                break;
            }
        }
    }

    tracing::debug!("host watcher complete");
}
