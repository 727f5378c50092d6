use std::sync::Arc;

use cluster_netop_core::{
    bootstrap::Bootstrapper,
    kubernetes::ObjectStore,
    resources::{release::OperatorRelease, render::Renderer},
    status::StatusReporter,
};
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use tokio_util::sync::CancellationToken;

use crate::settings::OperatorSettings;

/// Shared by every control loop.
pub struct ReconcilerContext {
    pub release: OperatorRelease,
    pub settings: OperatorSettings,
    pub store: Arc<dyn ObjectStore>,
    pub renderer: Arc<dyn Renderer>,
    pub bootstrapper: Arc<dyn Bootstrapper>,
    pub status: Arc<dyn StatusReporter>,
    pub cancel: CancellationToken,
}

/// Watch sources for the controllers, split off so the reconcilers stay testable
/// without a client.
pub struct WatchContext {
    pub client: Client,
}

impl WatchContext {
    pub fn global_api<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }

    pub fn namespaced_api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}
