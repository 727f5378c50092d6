use std::sync::Arc;

use cluster_netop_core::ALLOWLIST_CONFIG_NAME;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::{watcher::Config, Controller};
use log::info;

use crate::{
    controller::reconciler::allowlist::{reconcile_allowlist, reconcile_allowlist_error},
    helpers::handle_reconciliation_result,
};

use super::reconciler::context::{ReconcilerContext, WatchContext};

pub async fn start_allowlist_controller(watch: &WatchContext, context: Arc<ReconcilerContext>) {
    info!("Creating sysctl allowlist controller...");

    let watcher_config = Config::default().fields(&format!("metadata.name={ALLOWLIST_CONFIG_NAME}"));
    let api = watch.namespaced_api::<ConfigMap>(&context.release.multus_namespace);
    let controller = Controller::new(api, watcher_config)
        .shutdown_on_signal()
        .run(reconcile_allowlist, reconcile_allowlist_error, context)
        .for_each(handle_reconciliation_result);

    info!("Sysctl allowlist controller created!");

    controller.await
}
