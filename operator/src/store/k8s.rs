use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

use super::{CreateOutcome, SnapshotStore, StoreError, merge_diff};
use crate::crd::group_snapshot::{
    VolumeGroupSnapshot, VolumeGroupSnapshotContent,
};
use crate::crd::snapshot::VolumeSnapshot;

/// Production store backed by typed `kube` APIs.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnapshotStore for KubeStore {
    async fn create_group_snapshot(
        &self,
        snapshot: &VolumeGroupSnapshot,
    ) -> Result<CreateOutcome, StoreError> {
        let ns = snapshot
            .metadata
            .namespace
            .as_deref()
            .unwrap_or("default");
        let api: Api<VolumeGroupSnapshot> =
            Api::namespaced(self.client.clone(), ns);
        match api.create(&PostParams::default(), snapshot).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_group_snapshot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VolumeGroupSnapshot>, StoreError> {
        let api: Api<VolumeGroupSnapshot> =
            Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_group_snapshot_content(
        &self,
        name: &str,
    ) -> Result<Option<VolumeGroupSnapshotContent>, StoreError> {
        let api: Api<VolumeGroupSnapshotContent> =
            Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn get_volume_snapshot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VolumeSnapshot>, StoreError> {
        let api: Api<VolumeSnapshot> =
            Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, StoreError> {
        let api: Api<PersistentVolumeClaim> =
            Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_persistent_volumes(
        &self,
    ) -> Result<Vec<PersistentVolume>, StoreError> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_volume_snapshot(
        &self,
        modified: &VolumeSnapshot,
        base: &VolumeSnapshot,
    ) -> Result<(), StoreError> {
        let ns = modified
            .metadata
            .namespace
            .as_deref()
            .unwrap_or("default");
        let name = modified.name_any();
        let diff = merge_diff(
            &serde_json::to_value(base)?,
            &serde_json::to_value(modified)?,
        );
        let api: Api<VolumeSnapshot> =
            Api::namespaced(self.client.clone(), ns);
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&diff))
            .await?;
        Ok(())
    }
}
