use std::time::Duration;

use cluster_netop_core::kubernetes::{
    cancellable, list_typed, to_dynamic, try_get_typed, ListQuery, ObjectStore, StoreError,
};
use k8s_openapi::{
    api::{
        apps::v1::DaemonSet,
        core::v1::{Namespace, Pod},
    },
    chrono::{DateTime, Utc},
};
use log::info;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Couldn't sweep the namespace! Reason: {}", .0)]
    Store(#[from] StoreError),
}

impl SweepError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SweepError::Store(StoreError::Cancelled))
    }
}

/// Where a namespace stands after one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    NamespaceAbsent,
    NotTerminating,
    AlreadyFinalized,
    RecheckAfter(Duration),
    PodsRemaining(usize),
    DaemonSetsRemaining(usize),
    FinalizerRemoved,
}

pub struct SweepTarget<'a> {
    pub namespace: &'a str,
    pub finalizer: &'a str,
    pub grace_period: Duration,
}

fn has_finalizer(namespace: &Namespace, finalizer: &str) -> bool {
    namespace
        .spec
        .as_ref()
        .and_then(|spec| spec.finalizers.as_ref())
        .map(|finalizers| finalizers.iter().any(|entry| entry == finalizer))
        .unwrap_or(false)
}

/// Strips `target.finalizer` off a terminating namespace once its grace period is over
/// and nothing is left running in it. The namespace itself is never deleted.
pub async fn sweep_namespace(
    store: &dyn ObjectStore,
    target: &SweepTarget<'_>,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<SweepOutcome, SweepError> {
    let Some(mut namespace) =
        try_get_typed::<Namespace>(store, None, target.namespace, cancel).await?
    else {
        return Ok(SweepOutcome::NamespaceAbsent);
    };

    let Some(deleted_at) = namespace.metadata.deletion_timestamp.as_ref() else {
        return Ok(SweepOutcome::NotTerminating);
    };

    if !has_finalizer(&namespace, target.finalizer) {
        return Ok(SweepOutcome::AlreadyFinalized);
    }

    let elapsed = (now - deleted_at.0).to_std().unwrap_or_default();
    if elapsed < target.grace_period {
        return Ok(SweepOutcome::RecheckAfter(target.grace_period - elapsed));
    }

    let pods: Vec<Pod> = list_typed(
        store,
        &ListQuery::of::<Pod>().in_namespace(target.namespace),
        cancel,
    )
    .await?;
    if !pods.is_empty() {
        return Ok(SweepOutcome::PodsRemaining(pods.len()));
    }

    let daemonsets: Vec<DaemonSet> = list_typed(
        store,
        &ListQuery::of::<DaemonSet>().in_namespace(target.namespace),
        cancel,
    )
    .await?;
    if !daemonsets.is_empty() {
        return Ok(SweepOutcome::DaemonSetsRemaining(daemonsets.len()));
    }

    if let Some(finalizers) = namespace
        .spec
        .as_mut()
        .and_then(|spec| spec.finalizers.as_mut())
    {
        finalizers.retain(|entry| entry != target.finalizer);
    }

    info!(
        "Removing '{}' finalizer from '{}' namespace...",
        target.finalizer, target.namespace
    );
    cancellable(
        cancel,
        store.update_subresource("finalize", &to_dynamic(&namespace)?),
    )
    .await?;

    Ok(SweepOutcome::FinalizerRemoved)
}
