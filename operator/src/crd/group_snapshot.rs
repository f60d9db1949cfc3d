use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group snapshot request (groupsnapshot.storage.k8s.io/v1beta1). This
/// operator creates it once per backup; the status is written exclusively
/// by the external CSI driver.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "groupsnapshot.storage.k8s.io",
    version = "v1beta1",
    kind = "VolumeGroupSnapshot",
    plural = "volumegroupsnapshots",
    namespaced,
    status = "VolumeGroupSnapshotStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotSpec {
    pub source: VolumeGroupSnapshotSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_class_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotSource {
    /// Selects the volumes to group by label; the operator matches on the
    /// instance-name label of the target pod.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<GroupSnapshotSelector>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshotSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotStatus {
    /// One reference per member snapshot the driver has materialized.
    /// Index-aligned with the bound content's volume handles once the
    /// group is fully bound.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_snapshot_ref_list: Vec<SnapshotRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_volume_group_snapshot_content_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Bound, driver-populated record of which physical volumes were grouped
/// (cluster-scoped).
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "groupsnapshot.storage.k8s.io",
    version = "v1beta1",
    kind = "VolumeGroupSnapshotContent",
    plural = "volumegroupsnapshotcontents"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotContentSpec {
    pub source: VolumeGroupSnapshotContentSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_ref: Option<SnapshotRef>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotContentSource {
    /// Storage-system handles of the volumes actually grouped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_handles: Vec<String>,
}
