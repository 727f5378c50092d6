use std::env::{var, VarError};

use kube::core::ObjectMeta;
use thiserror::Error;

use super::labels::get_operator_labels;

pub const OPERATOR_NAMESPACE_VAR: &str = "NETOP_NAMESPACE";
pub const MULTUS_NAMESPACE_VAR: &str = "NETOP_MULTUS_NAMESPACE";
pub const RELEASE_VERSION_VAR: &str = "NETOP_RELEASE_VERSION";
pub const MULTUS_IMAGE_VAR: &str = "NETOP_MULTUS_IMAGE";
pub const CNI_PLUGINS_IMAGE_VAR: &str = "NETOP_CNI_PLUGINS_IMAGE";
pub const SDN_IMAGE_VAR: &str = "NETOP_SDN_IMAGE";
pub const OVN_IMAGE_VAR: &str = "NETOP_OVN_IMAGE";
pub const KUBE_PROXY_IMAGE_VAR: &str = "NETOP_KUBE_PROXY_IMAGE";

/// Everything about the running operator release that rendering depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorRelease {
    pub namespace: String,
    pub multus_namespace: String,
    pub release_version: String,
    pub multus_image: String,
    pub cni_plugins_image: String,
    pub sdn_image: String,
    pub ovn_image: String,
    pub kube_proxy_image: String,
}

#[derive(Debug, Error)]
pub enum FromError {
    #[error("Env var {} unavailable: {}", .0, .1)]
    VarUnset(&'static str, VarError),
}

fn require(name: &'static str) -> Result<String, FromError> {
    var(name).map_err(|error| FromError::VarUnset(name, error))
}

impl OperatorRelease {
    pub fn from_env() -> Result<Self, FromError> {
        Ok(Self {
            namespace: require(OPERATOR_NAMESPACE_VAR)?,
            multus_namespace: require(MULTUS_NAMESPACE_VAR)?,
            release_version: require(RELEASE_VERSION_VAR)?,
            multus_image: require(MULTUS_IMAGE_VAR)?,
            cni_plugins_image: require(CNI_PLUGINS_IMAGE_VAR)?,
            sdn_image: require(SDN_IMAGE_VAR)?,
            ovn_image: require(OVN_IMAGE_VAR)?,
            kube_proxy_image: require(KUBE_PROXY_IMAGE_VAR)?,
        })
    }

    pub fn generate_metadata(&self, namespace: &str, name: &str, component: &str) -> ObjectMeta {
        ObjectMeta {
            labels: Some(get_operator_labels(component)),
            namespace: Some(namespace.to_owned()),
            name: Some(name.to_owned()),
            ..Default::default()
        }
    }

    pub fn generate_clusterwide_metadata(&self, name: &str, component: &str) -> ObjectMeta {
        ObjectMeta {
            labels: Some(get_operator_labels(component)),
            name: Some(name.to_owned()),
            ..Default::default()
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod test_release {
    use super::OperatorRelease;

    pub fn release() -> OperatorRelease {
        OperatorRelease {
            namespace: "netop".to_owned(),
            multus_namespace: "netop-multus".to_owned(),
            release_version: "4.14.0".to_owned(),
            multus_image: "quay.io/netop/multus:4.14".to_owned(),
            cni_plugins_image: "quay.io/netop/cni-plugins:4.14".to_owned(),
            sdn_image: "quay.io/netop/sdn:4.14".to_owned(),
            ovn_image: "quay.io/netop/ovn-kubernetes:4.14".to_owned(),
            kube_proxy_image: "quay.io/netop/kube-proxy:4.14".to_owned(),
        }
    }
}
