use std::sync::Arc;

use cluster_netop_core::resources::crd::v1::network::Network;
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    core::v1::ConfigMap,
};
use kube::runtime::{watcher::Config, Controller};
use log::info;

use crate::{
    controller::reconciler::network::{reconcile_network, reconcile_network_error},
    helpers::handle_reconciliation_result,
};

use super::{
    managed_objects,
    reconciler::context::{ReconcilerContext, WatchContext},
};

pub async fn start_network_controller(watch: &WatchContext, context: Arc<ReconcilerContext>) {
    info!("Creating network controller...");

    let owned_config = managed_objects();
    let controller = Controller::new(watch.global_api::<Network>(), Config::default())
        .owns(watch.global_api::<DaemonSet>(), owned_config.clone())
        .owns(watch.global_api::<Deployment>(), owned_config.clone())
        .owns(watch.global_api::<ConfigMap>(), owned_config)
        .shutdown_on_signal()
        .run(reconcile_network, reconcile_network_error, context)
        .for_each(handle_reconciliation_result);

    info!("Network controller created!");

    controller.await
}
