use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const OPENSHIFT_SDN: &str = "OpenShiftSDN";
pub const OVN_KUBERNETES: &str = "OVNKubernetes";

pub const SDN_MODE_NETWORK_POLICY: &str = "NetworkPolicy";
pub const SDN_MODE_MULTITENANT: &str = "Multitenant";
pub const SDN_MODE_SUBNET: &str = "Subnet";

pub const ADDITIONAL_NETWORK_RAW: &str = "Raw";
pub const ADDITIONAL_NETWORK_SIMPLE_MACVLAN: &str = "SimpleMacvlan";

/// Desired state of the cluster network, only the object named `cluster` is acted upon.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.netop.dev",
    version = "v1",
    kind = "Network",
    status = "NetworkStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// IP address pools for pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_network: Vec<ClusterNetworkEntry>,
    /// IP address pools for services, at most one per IP family
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_network: Vec<String>,
    /// the "default" network all pods receive
    #[serde(default)]
    pub default_network: DefaultNetworkDefinition,
    /// extra networks available to pods through NetworkAttachmentDefinitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_networks: Vec<AdditionalNetworkDefinition>,
    /// disables multus entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_multi_network: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_kube_proxy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_proxy_config: Option<ProxyConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkEntry {
    pub cidr: String,
    /// size of the per-node slice of `cidr`
    pub host_prefix: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DefaultNetworkDefinition {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(
        rename = "openshiftSDNConfig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub openshift_sdn_config: Option<SdnConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovn_kubernetes_config: Option<OvnKubernetesConfig>,
}

impl DefaultNetworkDefinition {
    pub fn network_type(&self) -> NetworkType {
        NetworkType::parse(&self.type_)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SdnConfig {
    /// NetworkPolicy, Multitenant or Subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vxlan_port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvnKubernetesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geneve_port: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalNetworkDefinition {
    /// Raw or SimpleMacvlan
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
    /// namespace the NetworkAttachmentDefinition is created in, defaults to "default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(
        rename = "rawCNIConfig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw_cni_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_macvlan_config: Option<SimpleMacvlanConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimpleMacvlanConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_config: Option<IpamConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct IpamConfig {
    /// DHCP or Static
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iptables_sync_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub proxy_arguments: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<OperatorCondition>,
    /// release version of the last fully applied configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// objects worth looking at when debugging the cluster network
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_objects: Vec<RelatedObject>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelatedObject {
    pub group: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl RelatedObject {
    pub fn namespace(name: &str) -> Self {
        Self {
            group: String::new(),
            resource: "namespaces".to_owned(),
            namespace: None,
            name: name.to_owned(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperatorCondition {
    #[serde(rename = "type")]
    pub type_: String,
    /// True, False or Unknown
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkType {
    OpenShiftSdn,
    OvnKubernetes,
    Other(String),
}

impl NetworkType {
    /// Case-insensitive, unknown names are kept verbatim.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if raw.eq_ignore_ascii_case(OPENSHIFT_SDN) {
            NetworkType::OpenShiftSdn
        } else if raw.eq_ignore_ascii_case(OVN_KUBERNETES) {
            NetworkType::OvnKubernetes
        } else {
            NetworkType::Other(raw.to_owned())
        }
    }

    pub fn canonical_name(&self) -> &str {
        match self {
            NetworkType::OpenShiftSdn => OPENSHIFT_SDN,
            NetworkType::OvnKubernetes => OVN_KUBERNETES,
            NetworkType::Other(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, NetworkType::Other(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{NetworkSpec, NetworkType};

    #[test]
    fn network_type_is_matched_case_insensitively() {
        assert_eq!(NetworkType::parse("openshiftsdn"), NetworkType::OpenShiftSdn);
        assert_eq!(NetworkType::parse(" OVNKUBERNETES "), NetworkType::OvnKubernetes);
        assert_eq!(
            NetworkType::parse("Calico").canonical_name(),
            "Calico"
        );
    }

    #[test]
    fn spec_reads_the_wire_field_names() {
        let spec: NetworkSpec = serde_json::from_value(serde_json::json!({
            "clusterNetwork": [{ "cidr": "10.128.0.0/14", "hostPrefix": 23 }],
            "serviceNetwork": ["172.30.0.0/16"],
            "defaultNetwork": {
                "type": "OpenShiftSDN",
                "openshiftSDNConfig": { "mode": "Subnet", "vxlanPort": 4790 }
            },
            "additionalNetworks": [{
                "type": "Raw",
                "name": "storage",
                "rawCNIConfig": "{}"
            }]
        }))
        .unwrap();

        assert_eq!(spec.cluster_network[0].host_prefix, 23);
        assert_eq!(
            spec.default_network
                .openshift_sdn_config
                .as_ref()
                .and_then(|sdn| sdn.vxlan_port),
            Some(4790)
        );
        assert_eq!(spec.additional_networks[0].raw_cni_config.as_deref(), Some("{}"));
    }
}
