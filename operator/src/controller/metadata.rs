//! Well-known metadata keys and the merge/enrichment primitives shared by
//! the group request and its member snapshots.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::backup::Backup;
use crate::crd::cluster::Cluster;

pub const INSTANCE_NAME_LABEL: &str = "dbops.io/instanceName";
pub const CLUSTER_LABEL: &str = "dbops.io/cluster";
pub const BACKUP_NAME_LABEL: &str = "dbops.io/backupName";
pub const BACKUP_DATE_ANNOTATION: &str = "dbops.io/backupDate";
pub const BACKUP_START_TIME_LABEL: &str = "dbops.io/backupStartTime";
pub const BACKUP_END_TIME_LABEL: &str = "dbops.io/backupEndTime";

/// Point-in-time keys that belong in annotations on the final object:
/// label selectors must never match on them.
const TRANSFERRED_LABELS: &[&str] =
    &[BACKUP_START_TIME_LABEL, BACKUP_END_TIME_LABEL];

/// Copy every entry of `src` into `dst`, overwriting on collision.
/// Precedence therefore comes from call order: the last source merged
/// wins.
pub fn merge_map(
    dst: &mut BTreeMap<String, String>,
    src: &BTreeMap<String, String>,
) {
    for (key, value) in src {
        dst.insert(key.clone(), value.clone());
    }
}

/// Move the policy-listed keys from the merged label set into the
/// annotation set.
pub fn transfer_labels_to_annotations(
    labels: &mut BTreeMap<String, String>,
    annotations: &mut BTreeMap<String, String>,
) {
    for key in TRANSFERRED_LABELS {
        if let Some(value) = labels.remove(*key) {
            annotations.insert((*key).to_string(), value);
        }
    }
}

/// Stamp the identifying labels and annotations for a snapshot object
/// belonging to `backup`. Deterministic: derived only from the passed
/// objects, never from the clock.
pub fn enrich_snapshot_metadata(
    meta: &mut ObjectMeta,
    cluster: &Cluster,
    backup: &Backup,
    target_pod: &str,
) {
    let labels = meta.labels.get_or_insert_with(Default::default);
    labels.insert(CLUSTER_LABEL.to_string(), cluster.name_any());
    labels.insert(BACKUP_NAME_LABEL.to_string(), backup.name_any());
    labels.insert(INSTANCE_NAME_LABEL.to_string(), target_pod.to_string());

    let annotations = meta.annotations.get_or_insert_with(Default::default);
    if let Some(created) = &backup.metadata.creation_timestamp {
        annotations
            .insert(BACKUP_DATE_ANNOTATION.to_string(), created.0.to_rfc3339());
    }
}
