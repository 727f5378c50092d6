use crate::resources::crd::v1::network::{
    NetworkSpec, NetworkType, OvnKubernetesConfig, ProxyConfig, SdnConfig,
    SDN_MODE_NETWORK_POLICY,
};

pub const DEFAULT_VXLAN_PORT: u32 = 4789;
pub const DEFAULT_SDN_MTU: u32 = 1450;
pub const DEFAULT_GENEVE_PORT: u32 = 6081;
pub const DEFAULT_OVN_MTU: u32 = 1400;
pub const DEFAULT_IPTABLES_SYNC_PERIOD: &str = "30s";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Explicitly sets every optional field.
///
/// MTUs are carried over from `previous` when it runs the same plugin, so a cluster
/// that was brought up with a detected MTU keeps it. Running this twice is a no-op.
pub fn fill_defaults(spec: &mut NetworkSpec, previous: Option<&NetworkSpec>) {
    let network_type = spec.default_network.network_type();

    match network_type {
        NetworkType::OpenShiftSdn => {
            let previous_mtu = previous
                .and_then(|previous| previous.default_network.openshift_sdn_config.as_ref())
                .and_then(|sdn| sdn.mtu);
            let sdn = spec
                .default_network
                .openshift_sdn_config
                .get_or_insert_with(SdnConfig::default);

            sdn.mode
                .get_or_insert_with(|| SDN_MODE_NETWORK_POLICY.to_owned());
            sdn.vxlan_port.get_or_insert(DEFAULT_VXLAN_PORT);
            sdn.mtu.get_or_insert(previous_mtu.unwrap_or(DEFAULT_SDN_MTU));
        }
        NetworkType::OvnKubernetes => {
            let previous_mtu = previous
                .and_then(|previous| previous.default_network.ovn_kubernetes_config.as_ref())
                .and_then(|ovn| ovn.mtu);
            let ovn = spec
                .default_network
                .ovn_kubernetes_config
                .get_or_insert_with(OvnKubernetesConfig::default);

            ovn.geneve_port.get_or_insert(DEFAULT_GENEVE_PORT);
            ovn.mtu.get_or_insert(previous_mtu.unwrap_or(DEFAULT_OVN_MTU));
        }
        NetworkType::Other(_) => {}
    }

    spec.disable_multi_network.get_or_insert(false);
    spec.deploy_kube_proxy.get_or_insert(!network_type.is_builtin());

    let proxy = spec.kube_proxy_config.get_or_insert_with(ProxyConfig::default);
    proxy
        .iptables_sync_period
        .get_or_insert_with(|| DEFAULT_IPTABLES_SYNC_PERIOD.to_owned());
    proxy
        .bind_address
        .get_or_insert_with(|| DEFAULT_BIND_ADDRESS.to_owned());
}
