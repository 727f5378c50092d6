use crate::{
    ip::canonical_cidr,
    resources::crd::v1::network::{
        NetworkSpec, NetworkType, ADDITIONAL_NETWORK_RAW, ADDITIONAL_NETWORK_SIMPLE_MACVLAN,
        SDN_MODE_MULTITENANT, SDN_MODE_NETWORK_POLICY, SDN_MODE_SUBNET,
    },
};

fn canonical_name(raw: &str, known: &[&str]) -> String {
    let raw = raw.trim();

    known
        .iter()
        .find(|name| name.eq_ignore_ascii_case(raw))
        .map(|name| name.to_string())
        .unwrap_or_else(|| raw.to_owned())
}

/// Rewrites the spec so that equivalent configurations compare equal.
pub fn canonicalize(spec: &mut NetworkSpec) {
    for entry in spec.cluster_network.iter_mut() {
        entry.cidr = canonical_cidr(&entry.cidr);
    }

    for cidr in spec.service_network.iter_mut() {
        *cidr = canonical_cidr(cidr);
    }

    let network_type = spec.default_network.network_type();
    spec.default_network.type_ = network_type.canonical_name().to_owned();

    if let (NetworkType::OpenShiftSdn, Some(sdn)) =
        (network_type, spec.default_network.openshift_sdn_config.as_mut())
    {
        if let Some(mode) = sdn.mode.as_mut() {
            *mode = canonical_name(
                mode,
                &[SDN_MODE_NETWORK_POLICY, SDN_MODE_MULTITENANT, SDN_MODE_SUBNET],
            );
        }
    }

    for network in spec.additional_networks.iter_mut() {
        network.type_ = canonical_name(
            &network.type_,
            &[ADDITIONAL_NETWORK_RAW, ADDITIONAL_NETWORK_SIMPLE_MACVLAN],
        );
    }
    spec.additional_networks
        .sort_by(|left, right| left.name.cmp(&right.name));
}

#[cfg(test)]
mod tests {
    use crate::resources::crd::v1::network::{
        AdditionalNetworkDefinition, ClusterNetworkEntry, DefaultNetworkDefinition, NetworkSpec,
        SdnConfig,
    };

    use super::canonicalize;

    fn messy() -> NetworkSpec {
        NetworkSpec {
            cluster_network: vec![ClusterNetworkEntry {
                cidr: "10.128.12.1/14".to_owned(),
                host_prefix: 23,
            }],
            service_network: vec![" 172.30.5.0/16".to_owned()],
            default_network: DefaultNetworkDefinition {
                type_: "openshiftsdn".to_owned(),
                openshift_sdn_config: Some(SdnConfig {
                    mode: Some("multitenant".to_owned()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            additional_networks: vec![
                AdditionalNetworkDefinition {
                    type_: "raw".to_owned(),
                    name: "zeta".to_owned(),
                    ..Default::default()
                },
                AdditionalNetworkDefinition {
                    type_: "SIMPLEMACVLAN".to_owned(),
                    name: "alpha".to_owned(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn canonical_form_is_spelled_out() {
        let mut spec = messy();
        canonicalize(&mut spec);

        assert_eq!(spec.cluster_network[0].cidr, "10.128.0.0/14");
        assert_eq!(spec.service_network, vec!["172.30.0.0/16"]);
        assert_eq!(spec.default_network.type_, "OpenShiftSDN");
        assert_eq!(
            spec.default_network.openshift_sdn_config.unwrap().mode.as_deref(),
            Some("Multitenant")
        );
        assert_eq!(spec.additional_networks[0].name, "alpha");
        assert_eq!(spec.additional_networks[0].type_, "SimpleMacvlan");
        assert_eq!(spec.additional_networks[1].type_, "Raw");
    }

    #[test]
    fn canonicalization_is_stable() {
        let mut once = messy();
        canonicalize(&mut once);
        let mut twice = once.clone();
        canonicalize(&mut twice);

        assert_eq!(once, twice);
    }
}
