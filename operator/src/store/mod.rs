use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use serde_json::Value;

use crate::crd::group_snapshot::{
    VolumeGroupSnapshot, VolumeGroupSnapshotContent,
};
use crate::crd::snapshot::VolumeSnapshot;

pub mod k8s;
#[cfg(test)]
pub mod mem;

pub use k8s::KubeStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Api(#[from] kube::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The object already exists; treated as "in progress", never an error.
    AlreadyExists,
}

/// The slice of the API server this reconciler talks to. Every `get_*`
/// maps a not-found response to `Ok(None)`; any other failure is fatal
/// for the current pass and retried by re-invocation.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn create_group_snapshot(
        &self,
        snapshot: &VolumeGroupSnapshot,
    ) -> Result<CreateOutcome, StoreError>;

    async fn get_group_snapshot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VolumeGroupSnapshot>, StoreError>;

    async fn get_group_snapshot_content(
        &self,
        name: &str,
    ) -> Result<Option<VolumeGroupSnapshotContent>, StoreError>;

    async fn get_volume_snapshot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VolumeSnapshot>, StoreError>;

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, StoreError>;

    async fn list_persistent_volumes(
        &self,
    ) -> Result<Vec<PersistentVolume>, StoreError>;

    /// Apply `modified` as a merge patch computed against `base`, so fields
    /// changed by other writers since `base` was read stay untouched.
    async fn patch_volume_snapshot(
        &self,
        modified: &VolumeSnapshot,
        base: &VolumeSnapshot,
    ) -> Result<(), StoreError>;
}

/// RFC 7386 merge-patch diff: keys added or changed in `modified` appear
/// recursively, keys removed appear as null, equal keys are dropped.
///
/// `json_patch::diff` would give an RFC 6902 patch instead, whose add and
/// replace operations assume the target document has not drifted since
/// `base` was read; a merge patch stays applicable under concurrent writes.
pub fn merge_diff(base: &Value, modified: &Value) -> Value {
    match (base, modified) {
        (Value::Object(b), Value::Object(m)) => {
            let mut out = serde_json::Map::new();
            for (key, new) in m {
                match b.get(key) {
                    Some(old) if old == new => {}
                    Some(old) => {
                        out.insert(key.clone(), merge_diff(old, new));
                    }
                    None => {
                        out.insert(key.clone(), new.clone());
                    }
                }
            }
            for key in b.keys() {
                if !m.contains_key(key) {
                    out.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(out)
        }
        _ => modified.clone(),
    }
}
