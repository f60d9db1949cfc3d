use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::cluster::VolumeSnapshotConfiguration;

pub const PHASE_RUNNING: &str = "running";
pub const PHASE_COMPLETED: &str = "completed";
pub const PHASE_FAILED: &str = "failed";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "dbops.io",
    version = "v1alpha1",
    kind = "Backup",
    plural = "backups",
    namespaced,
    status = "BackupStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    /// The cluster to back up
    pub cluster: ClusterRef,
    /// Per-backup overrides of the cluster's snapshot configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_snapshot: Option<VolumeSnapshotConfiguration>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ClusterRef {
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
}

impl Backup {
    /// Effective snapshot configuration for this backup: cluster defaults
    /// with backup-level settings layered on top. Maps are overlaid
    /// key-wise, the class name is replaced wholesale.
    pub fn volume_snapshot_configuration(
        &self,
        defaults: Option<&VolumeSnapshotConfiguration>,
    ) -> VolumeSnapshotConfiguration {
        let mut cfg = defaults.cloned().unwrap_or_default();
        if let Some(overrides) = &self.spec.volume_snapshot {
            if overrides.class_name.is_some() {
                cfg.class_name = overrides.class_name.clone();
            }
            cfg.labels.extend(overrides.labels.clone());
            cfg.annotations.extend(overrides.annotations.clone());
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_overrides_win_over_cluster_defaults() {
        let defaults = VolumeSnapshotConfiguration {
            class_name: Some("csi-default".into()),
            labels: [("tier".to_string(), "cluster".to_string())]
                .into_iter()
                .collect(),
            annotations: Default::default(),
        };
        let mut backup = Backup::new(
            "b",
            BackupSpec {
                cluster: ClusterRef { name: "pg".into() },
                volume_snapshot: Some(VolumeSnapshotConfiguration {
                    class_name: None,
                    labels: [("tier".to_string(), "backup".to_string())]
                        .into_iter()
                        .collect(),
                    annotations: Default::default(),
                }),
            },
        );
        backup.metadata.namespace = Some("default".into());

        let cfg = backup.volume_snapshot_configuration(Some(&defaults));
        assert_eq!(cfg.class_name.as_deref(), Some("csi-default"));
        assert_eq!(cfg.labels.get("tier").map(String::as_str), Some("backup"));
    }

    #[test]
    fn missing_defaults_yield_backup_only_configuration() {
        let backup = Backup::new(
            "b",
            BackupSpec {
                cluster: ClusterRef { name: "pg".into() },
                volume_snapshot: None,
            },
        );
        let cfg = backup.volume_snapshot_configuration(None);
        assert!(cfg.class_name.is_none());
        assert!(cfg.labels.is_empty());
    }
}
