use std::{collections::BTreeMap, future::Future, time::Duration};

use derive_builder::Builder;
use k8s_openapi::api::{apps::v1::ReplicaSet, core::v1::Pod};
use log::{debug, info};
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    classify::Workload,
    kubernetes::{list_typed, try_get, ListQuery, ObjectIdentity, ObjectStore, StoreError},
    resources::labels::join_labels,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("Couldn't check workload readiness! Reason: {}", .0)]
    Store(#[from] StoreError),
    #[error("Workload {} exists but has no uid assigned!", .0)]
    MissingIdentity(ObjectIdentity),
    #[error("Workload {} has no pod selector!", .0)]
    MissingSelector(ObjectIdentity),
}

impl ReadinessError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReadinessError::Store(StoreError::Cancelled))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

#[derive(Debug, Clone, Builder)]
pub struct ReadinessCheck {
    pub workload: Workload,
    /// overrides the workload's own `spec.selector.matchLabels`
    #[builder(default, setter(strip_option, into))]
    pub selector: Option<String>,
    /// only pods owned by this uid count, defaults to the live workload's uid
    #[builder(default, setter(strip_option, into))]
    pub owner_uid: Option<String>,
    #[builder(default = "DEFAULT_POLL_INTERVAL")]
    pub interval: Duration,
    #[builder(default = "DEFAULT_READINESS_TIMEOUT")]
    pub timeout: Duration,
    /// a workload that exists without a uid is an error instead of "not yet"
    #[builder(default)]
    pub strict_identity: bool,
}

/// Runs `check` every `interval` until it reports true or `timeout` elapses. Only the
/// calling task is suspended.
pub async fn poll_until<F, Fut>(
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<Readiness, ReadinessError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ReadinessError>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if check().await? {
            return Ok(Readiness::Ready);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(Readiness::TimedOut);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled.into()),
            _ = sleep_until(deadline.min(now + interval)) => {}
        }
    }
}

pub async fn wait_for_ready(
    store: &dyn ObjectStore,
    check: &ReadinessCheck,
    cancel: &CancellationToken,
) -> Result<Readiness, ReadinessError> {
    let identity = check.workload.identity();
    info!("Waiting for {identity} pods to become ready...");

    let readiness = poll_until(check.interval, check.timeout, cancel, || {
        is_ready(store, check, cancel)
    })
    .await?;

    match readiness {
        Readiness::Ready => info!("{identity} is ready"),
        Readiness::TimedOut => info!(
            "{identity} didn't become ready within {}s, moving on",
            check.timeout.as_secs()
        ),
    }

    Ok(readiness)
}

fn selector_of(check: &ReadinessCheck, workload: &kube::api::DynamicObject) -> Option<String> {
    if let Some(selector) = &check.selector {
        return Some(selector.to_owned());
    }

    workload
        .data
        .pointer("/spec/selector/matchLabels")
        .cloned()
        .and_then(|labels| serde_json::from_value::<BTreeMap<String, String>>(labels).ok())
        .filter(|labels| !labels.is_empty())
        .map(|labels| join_labels(&labels))
}

fn is_owned_by(pod_owners: &[String], owner_uids: &[String]) -> bool {
    pod_owners.iter().any(|uid| owner_uids.contains(uid))
}

fn owner_uids_of(pod: &Pod) -> Vec<String> {
    pod.metadata
        .owner_references
        .iter()
        .flatten()
        .map(|owner| owner.uid.to_owned())
        .collect()
}

fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
        .map(|primary| primary.ready)
        .unwrap_or(false)
}

/// Deployment pods are owned by its ReplicaSets, not by the Deployment itself.
async fn replica_set_uids(
    store: &dyn ObjectStore,
    namespace: &str,
    selector: &str,
    deployment_uid: &str,
    cancel: &CancellationToken,
) -> Result<Vec<String>, StoreError> {
    let query = ListQuery::of::<ReplicaSet>()
        .in_namespace(namespace)
        .with_labels(selector);
    let replica_sets: Vec<ReplicaSet> = list_typed(store, &query, cancel).await?;

    Ok(replica_sets
        .into_iter()
        .filter(|replica_set| {
            replica_set
                .metadata
                .owner_references
                .iter()
                .flatten()
                .any(|owner| owner.uid == deployment_uid)
        })
        .filter_map(|replica_set| replica_set.metadata.uid)
        .collect())
}

async fn is_ready(
    store: &dyn ObjectStore,
    check: &ReadinessCheck,
    cancel: &CancellationToken,
) -> Result<bool, ReadinessError> {
    let identity = check.workload.identity();
    let Some(workload) = try_get(store, &identity, cancel).await? else {
        debug!("{identity} doesn't exist yet");
        return Ok(false);
    };

    let uid = match workload.metadata.uid.as_deref().filter(|uid| !uid.is_empty()) {
        Some(uid) => uid.to_owned(),
        None if check.strict_identity => return Err(ReadinessError::MissingIdentity(identity)),
        None => return Ok(false),
    };
    let owner_uid = check.owner_uid.clone().unwrap_or(uid);

    let selector = selector_of(check, &workload)
        .ok_or_else(|| ReadinessError::MissingSelector(identity.clone()))?;
    let namespace = &check.workload.reference().namespace;

    let owner_uids = match &check.workload {
        Workload::DaemonSet(_) => vec![owner_uid],
        Workload::Deployment(_) => {
            replica_set_uids(store, namespace, &selector, &owner_uid, cancel).await?
        }
    };

    let query = ListQuery::of::<Pod>()
        .in_namespace(namespace)
        .with_labels(&selector);
    let pods: Vec<Pod> = list_typed(store, &query, cancel).await?;

    if pods.is_empty() {
        debug!("{identity} has no pods yet");
        return Ok(false);
    }

    // pods left over from a previous instance of the workload don't count either way
    let not_ready = pods
        .iter()
        .filter(|pod| is_owned_by(&owner_uids_of(pod), &owner_uids))
        .filter(|pod| !is_pod_ready(pod))
        .count();
    if not_ready > 0 {
        debug!("{identity} has {not_ready} pods that aren't ready");
        return Ok(false);
    }

    Ok(true)
}
