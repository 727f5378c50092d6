use std::{sync::Arc, time::Duration};

use cluster_netop_core::{
    apply::apply_all,
    classify::Workload,
    helpers::RequireMetadata,
    kubernetes::{cancellable, try_get, ObjectIdentity, StoreError},
    readiness::{wait_for_ready, Readiness, ReadinessCheckBuilder},
    resources::RenderedObject,
    status::{StatusComponent, WorkloadReference},
    ALLOWLIST_CONFIG_NAME, ALLOWLIST_DAEMONSET_NAME,
};
use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::ConfigMap};
use kube::{runtime::controller::Action, Resource};
use log::{info, warn};

use super::{context::ReconcilerContext, error::ReconcilerError, ReconcileOutcome};

const ERROR_REQUEUE_SECS: u64 = 10;

/// Rolls the sysctl allowlist out to every node with a short lived daemonset.
pub async fn reconcile_allowlist(
    object: Arc<ConfigMap>,
    context: Arc<ReconcilerContext>,
) -> Result<Action, ReconcilerError> {
    let name = object.require_name_or(ReconcilerError::MissingObjectMetadata)?;
    let namespace = object.require_namespace_or(ReconcilerError::MissingObjectMetadata)?;

    if name != ALLOWLIST_CONFIG_NAME || namespace != context.release.multus_namespace {
        return Ok(Action::await_change());
    }

    ReconcileOutcome::guard(try_reconcile(&object, &context))
        .await
        .report(&context, StatusComponent::AllowlistConfig)
        .await
}

pub fn reconcile_allowlist_error(
    _object: Arc<ConfigMap>,
    _error: &ReconcilerError,
    _context: Arc<ReconcilerContext>,
) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}

async fn try_reconcile(
    object: &ConfigMap,
    context: &ReconcilerContext,
) -> Result<Action, ReconcilerError> {
    let store = context.store.as_ref();
    let cancel = &context.cancel;
    let release = &context.release;
    let identity =
        ObjectIdentity::of::<DaemonSet>(Some(&release.multus_namespace), ALLOWLIST_DAEMONSET_NAME);

    // pods of a leftover daemonset already copied an older allowlist and would pass the check
    if try_get(store, &identity, cancel)
        .await
        .map_err(ReconcilerError::AllowlistCleanup)?
        .is_some()
    {
        warn!("Allowlist daemonset already exists, deleting it and retrying...");
        delete_daemonset(context, &identity).await?;
        return Err(ReconcilerError::AllowlistLeftover);
    }

    let default_allowlist =
        RenderedObject::from_resource(&release.generate_default_allowlist_configmap())
            .map_err(ReconcilerError::AllowlistGeneration)?;
    let daemonset = release
        .generate_allowlist_daemonset()
        .and_then(|daemonset| RenderedObject::from_resource(&daemonset))
        .map_err(ReconcilerError::AllowlistGeneration)?;
    let owner = object
        .controller_owner_ref(&())
        .ok_or(ReconcilerError::MissingObjectMetadata)?;

    apply_all(store, &[default_allowlist, daemonset], Some(&owner), cancel)
        .await
        .map_err(ReconcilerError::Apply)?;

    let check = ReadinessCheckBuilder::default()
        .workload(Workload::DaemonSet(WorkloadReference::new(
            &release.multus_namespace,
            ALLOWLIST_DAEMONSET_NAME,
        )))
        .interval(context.settings.readiness_interval)
        .timeout(context.settings.readiness_timeout)
        .strict_identity(true)
        .build()
        .map_err(ReconcilerError::ReadinessCheckBuilder)?;
    let readiness = wait_for_ready(store, &check, cancel).await;

    delete_daemonset(context, &identity).await?;

    match readiness.map_err(ReconcilerError::Readiness)? {
        Readiness::Ready => info!("Sysctl allowlist was copied to every node"),
        Readiness::TimedOut => warn!("Not every node picked up the sysctl allowlist in time"),
    }

    context
        .status
        .set_not_degraded(StatusComponent::AllowlistConfig)
        .await;

    Ok(Action::await_change())
}

async fn delete_daemonset(
    context: &ReconcilerContext,
    identity: &ObjectIdentity,
) -> Result<(), ReconcilerError> {
    match cancellable(&context.cancel, context.store.delete(identity)).await {
        Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
        Err(error) => Err(ReconcilerError::AllowlistCleanup(error)),
    }
}
