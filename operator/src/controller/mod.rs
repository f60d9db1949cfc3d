use std::sync::Arc;

use futures_util::StreamExt;
use kube::runtime::events::{Recorder, Reporter};
use kube::{
    Api, Client,
    runtime::{Controller, controller::Action, watcher::Config},
};
use tokio::time::Duration;
use tracing::{error, info};

use crate::config::OperatorConfig;
use crate::crd::backup::Backup;
use crate::store::StoreError;

pub mod events;
pub mod group;
pub mod metadata;
pub mod reconcile;


pub use reconcile::reconcile;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("while creating VolumeGroupSnapshot {name}: {source}")]
    CreateGroupSnapshot {
        name: String,
        #[source]
        source: StoreError,
    },
    /// A handle listed in bound content maps to no known claim-carrying
    /// volume; repeats identically until cluster state changes, so it must
    /// surface rather than be swallowed.
    #[error("cannot find a claim for volume handle {0}")]
    UnresolvedHandle(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub(crate) fn into_internal<E: std::fmt::Display>(e: E) -> ReconcileErr {
    ReconcileErr::Internal(e.to_string())
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub cfg: OperatorConfig,
    pub event_recorder: Recorder,
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let api: Api<Backup> = Api::all(client.clone());
    let reporter = Reporter {
        controller: "groupsnap-operator".into(),
        instance: None,
    };
    let ctx = Arc::new(ControllerContext {
        client: client.clone(),
        event_recorder: Recorder::new(client, reporter),
        cfg,
    });

    Controller::new(api, Config::default())
        .run(reconcile::reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((_obj_ref, action)) => {
                    info!("reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

fn error_policy(
    _obj: Arc<Backup>,
    _error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    Action::requeue(Duration::from_secs(ctx.cfg.retry_secs))
}
