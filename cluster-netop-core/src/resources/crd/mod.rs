use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

use self::v1::{cluster_network::ClusterNetwork, network::Network};

pub mod v1;

/// CRDs owned by the operator. NetworkAttachmentDefinition belongs to multus and isn't listed.
pub fn create_v1_crds() -> Vec<CustomResourceDefinition> {
    vec![Network::crd(), ClusterNetwork::crd()]
}
