use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::network::ClusterNetworkEntry;

/// Administrator facing network configuration, merged into the operator config.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "config.netop.dev",
    version = "v1",
    kind = "ClusterNetwork",
    status = "ClusterNetworkStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_network: Vec<ClusterNetworkEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_network: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_type: String,
}

/// What the cluster network actually runs with, as last applied.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_network: Vec<ClusterNetworkEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_network: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_type: String,
    #[serde(
        rename = "clusterNetworkMTU",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cluster_network_mtu: Option<u32>,
}
