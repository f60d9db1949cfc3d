use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};

pub const REASON_REQUESTED: &str = "GroupSnapshotRequested";
pub const REASON_ENRICHED: &str = "SnapshotsEnriched";
pub const REASON_FAILED: &str = "SnapshotPassFailed";

pub fn backup_obj_ref(
    ns: &str,
    name: &str,
    uid: Option<&str>,
) -> ObjectReference {
    ObjectReference {
        api_version: Some("dbops.io/v1alpha1".into()),
        kind: Some("Backup".into()),
        namespace: Some(ns.into()),
        name: Some(name.into()),
        uid: uid.map(|u| u.into()),
        ..Default::default()
    }
}

pub async fn emit_event(
    recorder: &Recorder,
    ns: &str,
    name: &str,
    uid: Option<&str>,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    let _ = recorder
        .publish(
            &Event {
                type_: EventType::Normal,
                reason: reason.into(),
                note,
                action: action.into(),
                secondary: None,
            },
            &backup_obj_ref(ns, name, uid),
        )
        .await;
}

pub async fn emit_warning(
    recorder: &Recorder,
    ns: &str,
    name: &str,
    uid: Option<&str>,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    let _ = recorder
        .publish(
            &Event {
                type_: EventType::Warning,
                reason: reason.into(),
                note,
                action: action.into(),
                secondary: None,
            },
            &backup_obj_ref(ns, name, uid),
        )
        .await;
}
