use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "dbops.io",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    namespaced,
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Number of database instances
    pub instances: i32,
    /// Backup configuration defaults for the whole cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupConfiguration>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Name of the pod currently acting as primary; snapshot backups
    /// target this instance's volumes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_primary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_instances: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_snapshot: Option<VolumeSnapshotConfiguration>,
}

/// Settings applied to every snapshot object produced for this cluster.
/// A Backup may override them for a single run.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotConfiguration {
    /// VolumeGroupSnapshotClass to request; the driver default applies
    /// when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Extra labels stamped onto the produced snapshot objects
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Extra annotations stamped onto the produced snapshot objects
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Cluster {
    /// Cluster-wide snapshot defaults, when configured.
    pub fn snapshot_defaults(&self) -> Option<&VolumeSnapshotConfiguration> {
        self.spec
            .backup
            .as_ref()
            .and_then(|b| b.volume_snapshot.as_ref())
    }
}
