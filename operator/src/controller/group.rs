//! Volume group snapshot protocol: request the group, wait for the external
//! CSI driver to materialize and bind the members, then propagate ownership
//! metadata onto each member snapshot.
//!
//! Every pass re-derives its state from live reads; the source objects are
//! the only state machine. That keeps the whole operation idempotent under
//! re-invocation, crash-restart and concurrent driver writes.

use std::collections::HashMap;

use kube::ResourceExt;
use tracing::{debug, info};

use crate::crd::backup::Backup;
use crate::crd::cluster::Cluster;
use crate::crd::group_snapshot::{
    GroupSnapshotSelector, SnapshotRef, VolumeGroupSnapshot,
    VolumeGroupSnapshotSource, VolumeGroupSnapshotSpec,
};
use crate::store::{CreateOutcome, SnapshotStore};

use super::ReconcileErr;
use super::metadata::{
    self, INSTANCE_NAME_LABEL, merge_map, transfer_labels_to_annotations,
};

/// Outcome of one request pass.
#[derive(Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    Created,
    /// The request already existed; carries how far enrichment got.
    InProgress(GroupEnrichment),
}

/// Readiness of the group, re-derived from live reads on every call.
#[derive(Debug, PartialEq, Eq)]
pub enum GroupEnrichment {
    /// Enrichment ran over the full member list.
    Progressed { patched: usize, skipped: usize },
    /// Driver still assembling the group: no members yet, content not
    /// bound, or handle/member counts not matching.
    NotReady,
    /// Request or bound content not visible yet; benign under eventual
    /// consistency.
    NotFound,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MemberEnrichment {
    Patched,
    /// Member snapshot or claim not propagated yet; retried next pass.
    SkippedNotFound,
}

/// Claim owning one resolved volume handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRef {
    pub name: String,
    pub namespace: Option<String>,
}

/// Request a group snapshot of every volume attached to `target_pod`.
/// Idempotent: an already-existing request is "in progress" and
/// immediately tries to advance enrichment of any members the driver has
/// produced so far.
pub async fn request_group_snapshot<S: SnapshotStore>(
    store: &S,
    cluster: &Cluster,
    backup: &Backup,
    target_pod: &str,
) -> Result<RequestOutcome, ReconcileErr> {
    let config =
        backup.volume_snapshot_configuration(cluster.snapshot_defaults());

    let mut group = VolumeGroupSnapshot::new(
        &backup.name_any(),
        VolumeGroupSnapshotSpec {
            source: VolumeGroupSnapshotSource {
                selector: Some(GroupSnapshotSelector {
                    match_labels: [(
                        INSTANCE_NAME_LABEL.to_string(),
                        target_pod.to_string(),
                    )]
                    .into(),
                }),
            },
            volume_group_snapshot_class_name: config.class_name.clone(),
        },
    );
    group.metadata.namespace = backup.namespace();
    metadata::enrich_snapshot_metadata(
        &mut group.metadata,
        cluster,
        backup,
        target_pod,
    );
    merge_map(
        group.metadata.labels.get_or_insert_with(Default::default),
        &config.labels,
    );
    merge_map(
        group
            .metadata
            .annotations
            .get_or_insert_with(Default::default),
        &config.annotations,
    );

    match store.create_group_snapshot(&group).await {
        Ok(CreateOutcome::Created) => {
            info!(group = %group.name_any(), "volume group snapshot created");
            Ok(RequestOutcome::Created)
        }
        Ok(CreateOutcome::AlreadyExists) => {
            debug!(
                group = %group.name_any(),
                "volume group snapshot already exists, advancing enrichment"
            );
            let progress =
                advance_group_enrichment(store, cluster, backup).await?;
            Ok(RequestOutcome::InProgress(progress))
        }
        Err(e) => Err(ReconcileErr::CreateGroupSnapshot {
            name: group.name_any(),
            source: e,
        }),
    }
}

/// Inspect the group request and its bound content, and enrich every
/// member snapshot once the group is fully bound.
pub async fn advance_group_enrichment<S: SnapshotStore>(
    store: &S,
    cluster: &Cluster,
    backup: &Backup,
) -> Result<GroupEnrichment, ReconcileErr> {
    let ns = backup.namespace().unwrap_or_else(|| "default".to_string());
    let name = backup.name_any();

    let Some(group) = store.get_group_snapshot(&ns, &name).await? else {
        return Ok(GroupEnrichment::NotFound);
    };

    let refs: &[SnapshotRef] = group
        .status
        .as_ref()
        .map(|s| s.volume_snapshot_ref_list.as_slice())
        .unwrap_or_default();
    // The driver has not produced any member snapshots yet.
    if refs.is_empty() {
        return Ok(GroupEnrichment::NotReady);
    }

    let Some(content_name) = group
        .status
        .as_ref()
        .and_then(|s| s.bound_volume_group_snapshot_content_name.as_deref())
        .filter(|n| !n.is_empty())
    else {
        return Ok(GroupEnrichment::NotReady);
    };

    let Some(content) =
        store.get_group_snapshot_content(content_name).await?
    else {
        // The driver may not have published the content object yet.
        return Ok(GroupEnrichment::NotFound);
    };

    // Ordering between handles and member refs is only guaranteed to be
    // consistent once every member is bound; enriching earlier would
    // mis-pair members with handles.
    let handles = &content.spec.source.volume_handles;
    if handles.len() != refs.len() {
        debug!(
            handles = handles.len(),
            members = refs.len(),
            "group only partially bound"
        );
        return Ok(GroupEnrichment::NotReady);
    }

    let claims = resolve_claims(store, handles).await?;

    let mut patched = 0;
    let mut skipped = 0;
    for (claim, member) in claims.iter().zip(refs) {
        match enrich_member(store, cluster, backup, &group, member, claim)
            .await?
        {
            MemberEnrichment::Patched => patched += 1,
            MemberEnrichment::SkippedNotFound => skipped += 1,
        }
    }

    Ok(GroupEnrichment::Progressed { patched, skipped })
}

/// Map volume handles back to the claims owning them, preserving input
/// order so the caller can pair handle[i] with member[i]. All-or-nothing:
/// one unknown handle fails the whole call.
pub async fn resolve_claims<S: SnapshotStore>(
    store: &S,
    handles: &[String],
) -> Result<Vec<ClaimRef>, ReconcileErr> {
    let volumes = store.list_persistent_volumes().await?;

    let mut by_handle: HashMap<&str, ClaimRef> = HashMap::new();
    for volume in &volumes {
        let Some(spec) = volume.spec.as_ref() else { continue };
        let Some(csi) = spec.csi.as_ref() else { continue };
        if csi.volume_handle.is_empty() {
            continue;
        }
        let Some(claim) = spec.claim_ref.as_ref() else { continue };
        let Some(claim_name) = claim.name.clone() else { continue };
        by_handle.insert(
            csi.volume_handle.as_str(),
            ClaimRef {
                name: claim_name,
                namespace: claim.namespace.clone(),
            },
        );
    }

    let mut result = Vec::with_capacity(handles.len());
    for handle in handles {
        let claim = by_handle
            .get(handle.as_str())
            .ok_or_else(|| ReconcileErr::UnresolvedHandle(handle.clone()))?;
        result.push(claim.clone());
    }
    Ok(result)
}

/// Merge ownership metadata onto one member snapshot and patch it against
/// a pristine copy, so fields the driver wrote concurrently survive.
pub async fn enrich_member<S: SnapshotStore>(
    store: &S,
    cluster: &Cluster,
    backup: &Backup,
    group: &VolumeGroupSnapshot,
    member: &SnapshotRef,
    claim_ref: &ClaimRef,
) -> Result<MemberEnrichment, ReconcileErr> {
    let member_ns = member
        .namespace
        .clone()
        .or_else(|| backup.namespace())
        .unwrap_or_else(|| "default".to_string());
    let Some(mut snapshot) =
        store.get_volume_snapshot(&member_ns, &member.name).await?
    else {
        debug!(member = %member.name, "member snapshot not visible yet, skipping");
        return Ok(MemberEnrichment::SkippedNotFound);
    };

    // The volume's claimRef names the authoritative namespace; fall back
    // to the cluster's own namespace for volumes bound before the claimRef
    // namespace was recorded.
    let claim_ns = claim_ref
        .namespace
        .clone()
        .or_else(|| cluster.namespace())
        .unwrap_or_else(|| "default".to_string());
    let Some(claim) = store.get_claim(&claim_ns, &claim_ref.name).await? else {
        debug!(claim = %claim_ref.name, %claim_ns, "claim not visible yet, skipping");
        return Ok(MemberEnrichment::SkippedNotFound);
    };

    let config =
        backup.volume_snapshot_configuration(cluster.snapshot_defaults());

    if snapshot.metadata.labels.is_none() {
        snapshot.metadata.labels = Some(Default::default());
    }
    if snapshot.metadata.annotations.is_none() {
        snapshot.metadata.annotations = Some(Default::default());
    }

    // Patch base: everything written before this read must survive the
    // merge diff untouched.
    let base = snapshot.clone();

    let meta = &mut snapshot.metadata;
    let labels = meta.labels.get_or_insert_with(Default::default);
    let annotations = meta.annotations.get_or_insert_with(Default::default);

    // Fixed precedence: group metadata, then claim metadata, then the
    // backup-declared snapshot metadata. Later sources win.
    merge_map(labels, group.labels());
    merge_map(labels, claim.labels());
    merge_map(labels, &config.labels);
    merge_map(annotations, group.annotations());
    merge_map(annotations, claim.annotations());
    merge_map(annotations, &config.annotations);
    transfer_labels_to_annotations(labels, annotations);

    store.patch_volume_snapshot(&snapshot, &base).await?;
    info!(member = %member.name, claim = %claim_ref.name, "member snapshot enriched");
    Ok(MemberEnrichment::Patched)
}
