use std::sync::Arc;

use chrono::Utc;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde_json::json;
use tokio::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::crd::backup::{
    Backup, PHASE_COMPLETED, PHASE_FAILED, PHASE_RUNNING,
};
use crate::crd::cluster::Cluster;
use crate::store::KubeStore;

use super::events::{
    REASON_ENRICHED, REASON_FAILED, REASON_REQUESTED, emit_event, emit_warning,
};
use super::group::{self, GroupEnrichment, RequestOutcome};
use super::{ControllerContext, ReconcileErr, into_internal};

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_else(|| "default".into()), name = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<Backup>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();
    let uid = obj.meta().uid.clone();

    // Retention and cleanup belong to a different controller.
    if obj.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let phase = obj
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or_default();
    if phase == PHASE_COMPLETED || phase == PHASE_FAILED {
        return Ok(Action::await_change());
    }

    let backup_api: Api<Backup> = Api::namespaced(ctx.client.clone(), &ns);
    let cluster_api: Api<Cluster> = Api::namespaced(ctx.client.clone(), &ns);

    let Some(cluster) = cluster_api
        .get_opt(&obj.spec.cluster.name)
        .await
        .map_err(into_internal)?
    else {
        warn!(cluster = %obj.spec.cluster.name, "owning cluster not found; marking backup failed");
        patch_status(
            &backup_api,
            &name,
            json!({
                "phase": PHASE_FAILED,
                "message": format!("cluster {} not found", obj.spec.cluster.name),
                "stoppedAt": Utc::now().to_rfc3339(),
            }),
        )
        .await?;
        return Ok(Action::await_change());
    };

    let Some(target_pod) = cluster
        .status
        .as_ref()
        .and_then(|s| s.current_primary.clone())
    else {
        info!("cluster has no current primary yet; waiting");
        return Ok(Action::requeue(Duration::from_secs(ctx.cfg.poll_secs)));
    };

    let store = KubeStore::new(ctx.client.clone());
    let outcome =
        match group::request_group_snapshot(&store, &cluster, &obj, &target_pod)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "snapshot pass failed");
                emit_warning(
                    &ctx.event_recorder,
                    &ns,
                    &name,
                    uid.as_deref(),
                    REASON_FAILED,
                    "Reconcile",
                    Some(err.to_string()),
                )
                .await;
                if is_terminal(&err) {
                    patch_status(
                        &backup_api,
                        &name,
                        failure_status(&err, Utc::now().to_rfc3339()),
                    )
                    .await?;
                    return Ok(Action::await_change());
                }
                // Surface transient failures on the status too; the retry
                // itself is driven by error_policy.
                let _ = patch_status(
                    &backup_api,
                    &name,
                    json!({ "message": err.to_string() }),
                )
                .await;
                return Err(err);
            }
        };
    match outcome {
        RequestOutcome::Created => {
            info!(%target_pod, "volume group snapshot requested");
            emit_event(
                &ctx.event_recorder,
                &ns,
                &name,
                uid.as_deref(),
                REASON_REQUESTED,
                "Request",
                Some(format!(
                    "Requested volume group snapshot of {target_pod}"
                )),
            )
            .await;
            patch_status(
                &backup_api,
                &name,
                json!({
                    "phase": PHASE_RUNNING,
                    "startedAt": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
            Ok(Action::requeue(Duration::from_secs(ctx.cfg.poll_secs)))
        }
        RequestOutcome::InProgress(GroupEnrichment::Progressed {
            patched,
            skipped: 0,
        }) => {
            info!(patched, "all group members enriched");
            emit_event(
                &ctx.event_recorder,
                &ns,
                &name,
                uid.as_deref(),
                REASON_ENRICHED,
                "Enrich",
                Some(format!("Enriched {patched} volume snapshots")),
            )
            .await;
            patch_status(
                &backup_api,
                &name,
                json!({
                    "phase": PHASE_COMPLETED,
                    "stoppedAt": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
            Ok(Action::await_change())
        }
        RequestOutcome::InProgress(progress) => {
            debug!(?progress, "group snapshot not fully enriched yet");
            Ok(Action::requeue(requeue_after(&ctx.cfg, &progress)))
        }
    }
}

/// Errors that no amount of requeueing can resolve end the backup.
fn is_terminal(err: &ReconcileErr) -> bool {
    matches!(err, ReconcileErr::UnresolvedHandle(_))
}

fn failure_status(err: &ReconcileErr, now: String) -> serde_json::Value {
    json!({
        "phase": PHASE_FAILED,
        "message": err.to_string(),
        "stoppedAt": now,
    })
}

/// A pass that enriched some members but skipped others re-checks at the
/// slower interval; an incomplete group keeps the tight poll cadence.
fn requeue_after(cfg: &OperatorConfig, progress: &GroupEnrichment) -> Duration {
    match progress {
        GroupEnrichment::Progressed { .. } => {
            Duration::from_secs(cfg.requeue_secs)
        }
        _ => Duration::from_secs(cfg.poll_secs),
    }
}

async fn patch_status(
    api: &Api<Backup>,
    name: &str,
    status: serde_json::Value,
) -> Result<(), ReconcileErr> {
    let patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(into_internal)?;
    Ok(())
}
