use std::sync::Arc;

use cluster_netop_core::{
    bootstrap::PlatformBootstrap,
    kubernetes::{store::KubeStore, ObjectStore},
    resources::{labels::MANAGED_BY_LABEL, release::OperatorRelease, render::ManifestRenderer},
    status::StatusManager,
    FIELD_MANAGER, OPERATOR_CONFIG_NAME,
};
use kube::{runtime::watcher::Config, Client};
use tokio::join;
use tokio_util::sync::CancellationToken;

use crate::{namespace_sweeper::run_namespace_sweeper, settings::OperatorSettings};

use self::{
    allowlist::start_allowlist_controller,
    network::start_network_controller,
    pods::start_pod_status_controllers,
    reconciler::context::{ReconcilerContext, WatchContext},
};

pub mod allowlist;
pub mod network;
pub mod pods;
pub mod reconciler;

/// Only objects this operator rendered are worth a watch event.
fn managed_objects() -> Config {
    Config::default().labels(&format!("{MANAGED_BY_LABEL}={FIELD_MANAGER}"))
}

pub async fn main_controller(
    client: Client,
    release: OperatorRelease,
    settings: OperatorSettings,
    cancel: CancellationToken,
) {
    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client.clone()));
    let status = Arc::new(StatusManager::new(
        store.clone(),
        cancel.clone(),
        OPERATOR_CONFIG_NAME,
        &release.release_version,
    ));

    let context = Arc::new(ReconcilerContext {
        renderer: Arc::new(ManifestRenderer::new(release.clone())),
        bootstrapper: Arc::new(PlatformBootstrap::new(store.clone(), cancel.clone())),
        status,
        store,
        release,
        settings,
        cancel,
    });
    let watch = WatchContext { client };

    join!(
        start_network_controller(&watch, context.clone()),
        start_pod_status_controllers(&watch, context.clone()),
        start_allowlist_controller(&watch, context.clone()),
        run_namespace_sweeper(context),
    );
}
