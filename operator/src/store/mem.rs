//! In-memory `SnapshotStore` for tests. Patches are applied through the
//! same merge-patch diff as the production store, so concurrent-write
//! behavior is exercised for real.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    CSIPersistentVolumeSource, ObjectReference, PersistentVolume,
    PersistentVolumeClaim, PersistentVolumeSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::{CreateOutcome, SnapshotStore, StoreError, merge_diff};
use crate::crd::group_snapshot::{
    VolumeGroupSnapshot, VolumeGroupSnapshotContent,
};
use crate::crd::snapshot::{VolumeSnapshot, VolumeSnapshotStatus};

#[derive(Default)]
pub struct MemState {
    pub group_snapshots: BTreeMap<(String, String), VolumeGroupSnapshot>,
    pub contents: BTreeMap<String, VolumeGroupSnapshotContent>,
    pub snapshots: BTreeMap<(String, String), VolumeSnapshot>,
    pub claims: BTreeMap<(String, String), PersistentVolumeClaim>,
    pub volumes: Vec<PersistentVolume>,
    /// Names whose `get_volume_snapshot` fails with a non-404 error.
    pub failing_snapshots: BTreeSet<String>,
    /// Simulates the driver writing status between our read and our patch:
    /// applied to the stored object right after it is served.
    pub driver_status_after_read: Option<(String, VolumeSnapshotStatus)>,
    /// Names of snapshots patched, in call order.
    pub patched: Vec<String>,
}

#[derive(Default)]
pub struct MemStore {
    state: Mutex<MemState>,
}

impl MemStore {
    pub fn seed_group(&self, group: VolumeGroupSnapshot) {
        let key = (
            group.namespace().unwrap_or_default(),
            group.name_any(),
        );
        self.state.lock().unwrap().group_snapshots.insert(key, group);
    }

    pub fn seed_content(&self, content: VolumeGroupSnapshotContent) {
        self.state
            .lock()
            .unwrap()
            .contents
            .insert(content.name_any(), content);
    }

    pub fn seed_snapshot(&self, snapshot: VolumeSnapshot) {
        let key = (
            snapshot.namespace().unwrap_or_default(),
            snapshot.name_any(),
        );
        self.state.lock().unwrap().snapshots.insert(key, snapshot);
    }

    pub fn seed_claim(&self, claim: PersistentVolumeClaim) {
        let key = (
            claim.namespace().unwrap_or_default(),
            claim.name_any(),
        );
        self.state.lock().unwrap().claims.insert(key, claim);
    }

    /// A CSI-backed volume with the given handle, owned by a claim.
    pub fn seed_volume(&self, handle: &str, claim_ns: &str, claim_name: &str) {
        let volume = PersistentVolume {
            metadata: ObjectMeta {
                name: Some(format!("pv-{handle}")),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                csi: Some(CSIPersistentVolumeSource {
                    driver: "csi.example.com".into(),
                    volume_handle: handle.into(),
                    ..Default::default()
                }),
                claim_ref: Some(ObjectReference {
                    name: Some(claim_name.into()),
                    namespace: Some(claim_ns.into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            status: None,
        };
        self.state.lock().unwrap().volumes.push(volume);
    }

    /// A volume without a CSI handle or claim reference; never resolvable.
    pub fn seed_unindexable_volume(&self, name: &str) {
        let volume = PersistentVolume {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec::default()),
            status: None,
        };
        self.state.lock().unwrap().volumes.push(volume);
    }

    pub fn remove_snapshot(&self, ns: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .remove(&(ns.to_string(), name.to_string()));
    }

    pub fn remove_claim(&self, ns: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .claims
            .remove(&(ns.to_string(), name.to_string()));
    }

    pub fn fail_snapshot_get(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_snapshots
            .insert(name.into());
    }

    pub fn driver_writes_status_after_read(
        &self,
        name: &str,
        status: VolumeSnapshotStatus,
    ) {
        self.state.lock().unwrap().driver_status_after_read =
            Some((name.into(), status));
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().unwrap().group_snapshots.len()
    }

    pub fn snapshot(&self, ns: &str, name: &str) -> Option<VolumeSnapshot> {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .get(&(ns.to_string(), name.to_string()))
            .cloned()
    }

    pub fn group(&self, ns: &str, name: &str) -> Option<VolumeGroupSnapshot> {
        self.state
            .lock()
            .unwrap()
            .group_snapshots
            .get(&(ns.to_string(), name.to_string()))
            .cloned()
    }

    pub fn update_group(
        &self,
        ns: &str,
        name: &str,
        f: impl FnOnce(&mut VolumeGroupSnapshot),
    ) {
        let mut state = self.state.lock().unwrap();
        let group = state
            .group_snapshots
            .get_mut(&(ns.to_string(), name.to_string()))
            .expect("group snapshot not seeded");
        f(group);
    }

    pub fn patched(&self) -> Vec<String> {
        self.state.lock().unwrap().patched.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemStore {
    async fn create_group_snapshot(
        &self,
        snapshot: &VolumeGroupSnapshot,
    ) -> Result<CreateOutcome, StoreError> {
        let key = (
            snapshot.namespace().unwrap_or_default(),
            snapshot.name_any(),
        );
        let mut state = self.state.lock().unwrap();
        if state.group_snapshots.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.group_snapshots.insert(key, snapshot.clone());
        Ok(CreateOutcome::Created)
    }

    async fn get_group_snapshot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VolumeGroupSnapshot>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .group_snapshots
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_group_snapshot_content(
        &self,
        name: &str,
    ) -> Result<Option<VolumeGroupSnapshotContent>, StoreError> {
        Ok(self.state.lock().unwrap().contents.get(name).cloned())
    }

    async fn get_volume_snapshot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VolumeSnapshot>, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_snapshots.contains(name) {
            return Err(StoreError::Other(format!(
                "injected api failure reading {name}"
            )));
        }
        let key = (namespace.to_string(), name.to_string());
        let served = state.snapshots.get(&key).cloned();
        let drifts = matches!(
            &state.driver_status_after_read,
            Some((target, _)) if target.as_str() == name
        );
        if served.is_some() && drifts {
            if let Some((_, status)) = state.driver_status_after_read.take() {
                if let Some(stored) = state.snapshots.get_mut(&key) {
                    stored.status = Some(status);
                }
            }
        }
        Ok(served)
    }

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .claims
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_persistent_volumes(
        &self,
    ) -> Result<Vec<PersistentVolume>, StoreError> {
        Ok(self.state.lock().unwrap().volumes.clone())
    }

    async fn patch_volume_snapshot(
        &self,
        modified: &VolumeSnapshot,
        base: &VolumeSnapshot,
    ) -> Result<(), StoreError> {
        let key = (
            modified.namespace().unwrap_or_default(),
            modified.name_any(),
        );
        let diff = merge_diff(
            &serde_json::to_value(base)?,
            &serde_json::to_value(modified)?,
        );
        let mut state = self.state.lock().unwrap();
        let stored = state.snapshots.get_mut(&key).ok_or_else(|| {
            StoreError::Other(format!("patch target {} missing", key.1))
        })?;
        let mut doc = serde_json::to_value(&*stored)?;
        json_patch::merge(&mut doc, &diff);
        *stored = serde_json::from_value(doc)?;
        let name = key.1;
        state.patched.push(name);
        Ok(())
    }
}
