use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    kubernetes::{list_typed, ListQuery, ObjectStore, StoreError},
    resources::crd::v1::network::NetworkSpec,
};

const CONTROL_PLANE_ROLE_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Platform facts gathered right before rendering, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapResult {
    pub node_count: usize,
    pub control_plane_nodes: usize,
}

impl BootstrapResult {
    pub fn is_single_node(&self) -> bool {
        self.node_count <= 1
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Couldn't list cluster nodes! Reason: {}", .0)]
    NodeList(#[source] StoreError),
    #[error("The cluster doesn't have any nodes yet!")]
    NoNodes,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn bootstrap(&self, config: &NetworkSpec) -> Result<BootstrapResult, BootstrapError>;
}

pub struct PlatformBootstrap {
    store: Arc<dyn ObjectStore>,
    cancel: CancellationToken,
}

impl PlatformBootstrap {
    pub fn new(store: Arc<dyn ObjectStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }
}

fn is_control_plane(node: &Node) -> bool {
    node.metadata
        .labels
        .as_ref()
        .map(|labels| {
            CONTROL_PLANE_ROLE_LABELS
                .iter()
                .any(|label| labels.contains_key(*label))
        })
        .unwrap_or(false)
}

#[async_trait]
impl Bootstrapper for PlatformBootstrap {
    async fn bootstrap(&self, _config: &NetworkSpec) -> Result<BootstrapResult, BootstrapError> {
        let nodes: Vec<Node> = list_typed(self.store.as_ref(), &ListQuery::of::<Node>(), &self.cancel)
            .await
            .map_err(BootstrapError::NodeList)?;

        if nodes.is_empty() {
            return Err(BootstrapError::NoNodes);
        }

        Ok(BootstrapResult {
            node_count: nodes.len(),
            control_plane_nodes: nodes.iter().filter(|node| is_control_plane(node)).count(),
        })
    }
}
