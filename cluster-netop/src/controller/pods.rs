use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::runtime::Controller;
use log::info;
use tokio::join;

use crate::{
    controller::reconciler::pods::{reconcile_workload, reconcile_workload_error},
    helpers::handle_reconciliation_result,
};

use super::{
    managed_objects,
    reconciler::context::{ReconcilerContext, WatchContext},
};

/// Watches the rendered workloads so rollout progress shows up in the operator status
/// between full reconciles.
pub async fn start_pod_status_controllers(watch: &WatchContext, context: Arc<ReconcilerContext>) {
    info!("Creating pod status controllers...");

    let daemonsets = Controller::new(watch.global_api::<DaemonSet>(), managed_objects())
        .shutdown_on_signal()
        .run(
            reconcile_workload::<DaemonSet>,
            reconcile_workload_error::<DaemonSet>,
            context.clone(),
        )
        .for_each(handle_reconciliation_result);
    let deployments = Controller::new(watch.global_api::<Deployment>(), managed_objects())
        .shutdown_on_signal()
        .run(
            reconcile_workload::<Deployment>,
            reconcile_workload_error::<Deployment>,
            context,
        )
        .for_each(handle_reconciliation_result);

    info!("Pod status controllers created!");

    join!(daemonsets, deployments);
}
