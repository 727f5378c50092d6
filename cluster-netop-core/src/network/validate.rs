use std::net::IpAddr;

use ipnet::IpNet;
use itertools::Itertools;
use regex::Regex;

use crate::{
    ip::{is_ipv4, overlaps, parse_cidr},
    resources::crd::v1::network::{
        AdditionalNetworkDefinition, NetworkSpec, NetworkType, ADDITIONAL_NETWORK_RAW,
        ADDITIONAL_NETWORK_SIMPLE_MACVLAN, SDN_MODE_MULTITENANT, SDN_MODE_NETWORK_POLICY,
        SDN_MODE_SUBNET,
    },
};

const DNS_1123_LABEL: &str = r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$";
const DNS_1123_SUBDOMAIN: &str = r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$";

fn is_dns_1123(pattern: &str, max_length: usize, value: &str) -> bool {
    value.len() <= max_length
        && Regex::new(pattern)
            .map(|regex| regex.is_match(value))
            .unwrap_or(false)
}

/// Checks the whole spec and reports every problem found, not just the first one.
pub fn validate(spec: &NetworkSpec) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    errors.extend(validate_ip_pools(spec));
    errors.extend(validate_default_network(spec));
    errors.extend(validate_additional_networks(&spec.additional_networks));
    errors.extend(validate_kube_proxy(spec));

    match errors.is_empty() {
        true => Ok(()),
        false => Err(errors),
    }
}

fn validate_ip_pools(spec: &NetworkSpec) -> Vec<String> {
    let mut errors = Vec::new();
    let mut pools: Vec<(String, IpNet)> = Vec::new();

    if spec.cluster_network.is_empty() {
        errors.push("clusterNetwork cannot be empty".to_owned());
    }

    for entry in spec.cluster_network.iter() {
        let Some(net) = parse_cidr(&entry.cidr) else {
            errors.push(format!("could not parse clusterNetwork CIDR {}", entry.cidr));
            continue;
        };

        let max_prefix = match is_ipv4(&net) {
            true => 32,
            false => 128,
        };
        if entry.host_prefix < net.prefix_len() as u32 || entry.host_prefix > max_prefix {
            errors.push(format!(
                "hostPrefix {} is out of range for clusterNetwork {}",
                entry.host_prefix, entry.cidr
            ));
        }

        pools.push((format!("clusterNetwork {}", entry.cidr), net));
    }

    if spec.service_network.is_empty() {
        errors.push("serviceNetwork cannot be empty".to_owned());
    }

    let mut service_nets = Vec::new();
    for cidr in spec.service_network.iter() {
        match parse_cidr(cidr) {
            Some(net) => {
                service_nets.push(net);
                pools.push((format!("serviceNetwork {cidr}"), net));
            }
            None => errors.push(format!("could not parse serviceNetwork CIDR {cidr}")),
        }
    }

    let ipv4 = service_nets.iter().filter(|net| is_ipv4(net)).count();
    if ipv4 > 1 || service_nets.len() - ipv4 > 1 {
        errors.push("serviceNetwork must contain at most one network per IP family".to_owned());
    }

    for ((left_name, left), (right_name, right)) in pools.iter().tuple_combinations() {
        if overlaps(left, right) {
            errors.push(format!("{left_name} overlaps with {right_name}"));
        }
    }

    errors
}

fn validate_default_network(spec: &NetworkSpec) -> Vec<String> {
    let mut errors = Vec::new();
    let default_network = &spec.default_network;

    if default_network.type_.trim().is_empty() {
        errors.push("defaultNetwork.type must be specified".to_owned());
        return errors;
    }

    let network_type = default_network.network_type();

    if default_network.openshift_sdn_config.is_some() && network_type != NetworkType::OpenShiftSdn {
        errors.push(format!(
            "defaultNetwork.openshiftSDNConfig cannot be set with type {}",
            network_type.canonical_name()
        ));
    }
    if default_network.ovn_kubernetes_config.is_some() && network_type != NetworkType::OvnKubernetes
    {
        errors.push(format!(
            "defaultNetwork.ovnKubernetesConfig cannot be set with type {}",
            network_type.canonical_name()
        ));
    }

    if let Some(mode) = default_network
        .openshift_sdn_config
        .as_ref()
        .and_then(|sdn| sdn.mode.as_deref())
    {
        if ![SDN_MODE_NETWORK_POLICY, SDN_MODE_MULTITENANT, SDN_MODE_SUBNET].contains(&mode) {
            errors.push(format!("invalid openshiftSDNConfig.mode {mode}"));
        }
    }

    errors
}

fn validate_additional_networks(networks: &[AdditionalNetworkDefinition]) -> Vec<String> {
    let mut errors = Vec::new();

    for duplicate in networks
        .iter()
        .map(|network| (network.namespace.as_deref().unwrap_or("default"), network.name.as_str()))
        .duplicates()
    {
        errors.push(format!(
            "additional network name {} is not unique in namespace {}",
            duplicate.1, duplicate.0
        ));
    }

    for network in networks {
        if !is_dns_1123(DNS_1123_SUBDOMAIN, 253, &network.name) {
            errors.push(format!("invalid additional network name {:?}", network.name));
        }
        if let Some(namespace) = network.namespace.as_deref() {
            if !is_dns_1123(DNS_1123_LABEL, 63, namespace) {
                errors.push(format!(
                    "invalid namespace {namespace:?} for additional network {}",
                    network.name
                ));
            }
        }

        match network.type_.as_str() {
            ADDITIONAL_NETWORK_RAW => match network.raw_cni_config.as_deref() {
                Some(raw) if serde_json::from_str::<serde_json::Value>(raw).is_ok() => {}
                Some(_) => errors.push(format!(
                    "rawCNIConfig of additional network {} is not valid JSON",
                    network.name
                )),
                None => errors.push(format!(
                    "additional network {} of type Raw requires rawCNIConfig",
                    network.name
                )),
            },
            ADDITIONAL_NETWORK_SIMPLE_MACVLAN => {
                if network.raw_cni_config.is_some() {
                    errors.push(format!(
                        "additional network {} of type SimpleMacvlan cannot set rawCNIConfig",
                        network.name
                    ));
                }
            }
            other => errors.push(format!(
                "unknown type {other:?} for additional network {}",
                network.name
            )),
        }
    }

    errors
}

fn validate_kube_proxy(spec: &NetworkSpec) -> Vec<String> {
    let mut errors = Vec::new();

    if spec.deploy_kube_proxy == Some(true)
        && spec.default_network.network_type() == NetworkType::OvnKubernetes
    {
        errors.push("deployKubeProxy cannot be enabled with OVNKubernetes".to_owned());
    }

    if let Some(address) = spec
        .kube_proxy_config
        .as_ref()
        .and_then(|proxy| proxy.bind_address.as_deref())
    {
        if address.parse::<IpAddr>().is_err() {
            errors.push(format!("kubeProxyConfig.bindAddress {address} is not an IP address"));
        }
    }

    errors
}
