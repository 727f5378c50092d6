use crate::resources::crd::v1::network::NetworkSpec;

/// Compares two defaulted specs and lists every field that changed but can't be changed
/// on a running cluster.
pub fn is_change_safe(previous: &NetworkSpec, next: &NetworkSpec) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if previous.default_network.network_type() != next.default_network.network_type() {
        errors.push(format!(
            "cannot change default network type from {} to {}",
            previous.default_network.type_, next.default_network.type_
        ));
    }

    if previous.cluster_network != next.cluster_network {
        errors.push("cannot change clusterNetwork".to_owned());
    }
    if previous.service_network != next.service_network {
        errors.push("cannot change serviceNetwork".to_owned());
    }

    if let (Some(previous), Some(next)) = (
        previous.default_network.openshift_sdn_config.as_ref(),
        next.default_network.openshift_sdn_config.as_ref(),
    ) {
        if previous.mode != next.mode {
            errors.push("cannot change openshiftSDNConfig.mode".to_owned());
        }
        if previous.vxlan_port != next.vxlan_port {
            errors.push("cannot change openshiftSDNConfig.vxlanPort".to_owned());
        }
        if previous.mtu != next.mtu {
            errors.push("cannot change openshiftSDNConfig.mtu".to_owned());
        }
    }

    if let (Some(previous), Some(next)) = (
        previous.default_network.ovn_kubernetes_config.as_ref(),
        next.default_network.ovn_kubernetes_config.as_ref(),
    ) {
        if previous.geneve_port != next.geneve_port {
            errors.push("cannot change ovnKubernetesConfig.genevePort".to_owned());
        }
        if previous.mtu != next.mtu {
            errors.push("cannot change ovnKubernetesConfig.mtu".to_owned());
        }
    }

    if previous.disable_multi_network.unwrap_or(false) != next.disable_multi_network.unwrap_or(false)
    {
        errors.push("cannot change disableMultiNetwork".to_owned());
    }

    match errors.is_empty() {
        true => Ok(()),
        false => Err(errors),
    }
}
