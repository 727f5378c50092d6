use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;

use crate::{
    bootstrap::BootstrapResult,
    resources::{
        annotations::get_wait_for_ready_annotations,
        crd::v1::network::{NetworkSpec, NetworkType},
        release::OperatorRelease,
        RenderedObject, ResourceGenerationError,
    },
};

use super::WorkloadTemplate;

pub const OVN_NAMESPACE: &str = "netop-ovn-kubernetes";
pub const OVN_NODE_NAME: &str = "ovnkube-node";
pub const OVN_CONTROL_PLANE_NAME: &str = "ovnkube-control-plane";
pub const OVN_CONFIG_NAME: &str = "ovnkube-config";

pub const SDN_NAMESPACE: &str = "netop-sdn";
pub const SDN_NAME: &str = "sdn";
pub const SDN_CONFIG_NAME: &str = "sdn-config";

fn joined_cluster_networks(config: &NetworkSpec) -> String {
    config
        .cluster_network
        .iter()
        .map(|entry| format!("{}/{}", entry.cidr, entry.host_prefix))
        .collect::<Vec<_>>()
        .join(",")
}

fn missing(field: &'static str) -> ResourceGenerationError {
    ResourceGenerationError::MissingData(field.into())
}

impl OperatorRelease {
    pub fn render_default_network(
        &self,
        config: &NetworkSpec,
        bootstrap: &BootstrapResult,
    ) -> Result<Vec<RenderedObject>, ResourceGenerationError> {
        match config.default_network.network_type() {
            NetworkType::OvnKubernetes => self.render_ovn_kubernetes(config, bootstrap),
            NetworkType::OpenShiftSdn => self.render_openshift_sdn(config),
            // third party plugins bring their own manifests
            NetworkType::Other(_) => Ok(Vec::new()),
        }
    }

    fn render_ovn_kubernetes(
        &self,
        config: &NetworkSpec,
        bootstrap: &BootstrapResult,
    ) -> Result<Vec<RenderedObject>, ResourceGenerationError> {
        let ovn = config
            .default_network
            .ovn_kubernetes_config
            .as_ref()
            .ok_or_else(|| missing("ovnKubernetesConfig"))?;
        let mtu = ovn.mtu.ok_or_else(|| missing("ovnKubernetesConfig.mtu"))?;
        let geneve_port = ovn
            .geneve_port
            .ok_or_else(|| missing("ovnKubernetesConfig.genevePort"))?;

        let config_map = ConfigMap {
            metadata: self.generate_metadata(OVN_NAMESPACE, OVN_CONFIG_NAME, "ovn-kubernetes"),
            data: Some(BTreeMap::from([
                ("cluster-subnets".to_owned(), joined_cluster_networks(config)),
                ("service-cidrs".to_owned(), config.service_network.join(",")),
                ("mtu".to_owned(), mtu.to_string()),
                ("geneve-port".to_owned(), geneve_port.to_string()),
            ])),
            ..Default::default()
        };
        let node = self.generate_daemonset(
            &WorkloadTemplate::new(OVN_NAMESPACE, OVN_NODE_NAME, "ovn-kubernetes", &self.ovn_image)
                .node_agent()
                .command(&["/usr/bin/ovnkube", "--init-node", "--config-file=/run/ovnkube-config/ovnkube.conf"])
                .env("OVN_GENEVE_PORT", &geneve_port.to_string())
                .env("OVN_MTU", &mtu.to_string())
                .host_path("/etc/cni/net.d")
                .host_path("/var/run/openvswitch"),
        )?;
        let replicas = match bootstrap.is_single_node() {
            true => 1,
            false => bootstrap.control_plane_nodes.clamp(1, 3) as i32,
        };
        let control_plane = self.generate_deployment(
            &WorkloadTemplate::new(
                OVN_NAMESPACE,
                OVN_CONTROL_PLANE_NAME,
                "ovn-kubernetes",
                &self.ovn_image,
            )
            .command(&["/usr/bin/ovnkube", "--init-cluster-manager"])
            .env("OVN_CLUSTER_SUBNETS", &joined_cluster_networks(config))
            .env("OVN_SERVICE_CIDRS", &config.service_network.join(",")),
            replicas,
        )?;

        Ok(vec![
            RenderedObject::from_resource(&self.generate_namespace(OVN_NAMESPACE, "ovn-kubernetes"))?,
            RenderedObject::from_resource(&config_map)?,
            RenderedObject::from_resource(&node)?.with_annotations(get_wait_for_ready_annotations()),
            RenderedObject::from_resource(&control_plane)?,
        ])
    }

    fn render_openshift_sdn(
        &self,
        config: &NetworkSpec,
    ) -> Result<Vec<RenderedObject>, ResourceGenerationError> {
        let sdn = config
            .default_network
            .openshift_sdn_config
            .as_ref()
            .ok_or_else(|| missing("openshiftSDNConfig"))?;
        let mode = sdn.mode.as_deref().ok_or_else(|| missing("openshiftSDNConfig.mode"))?;
        let vxlan_port = sdn
            .vxlan_port
            .ok_or_else(|| missing("openshiftSDNConfig.vxlanPort"))?;
        let mtu = sdn.mtu.ok_or_else(|| missing("openshiftSDNConfig.mtu"))?;

        let config_map = ConfigMap {
            metadata: self.generate_metadata(SDN_NAMESPACE, SDN_CONFIG_NAME, "sdn"),
            data: Some(BTreeMap::from([
                ("cluster-network".to_owned(), joined_cluster_networks(config)),
                ("service-network".to_owned(), config.service_network.join(",")),
                ("mode".to_owned(), mode.to_owned()),
                ("vxlan-port".to_owned(), vxlan_port.to_string()),
                ("mtu".to_owned(), mtu.to_string()),
            ])),
            ..Default::default()
        };
        let daemonset = self.generate_daemonset(
            &WorkloadTemplate::new(SDN_NAMESPACE, SDN_NAME, "sdn", &self.sdn_image)
                .node_agent()
                .command(&["/usr/bin/openshift-sdn-node", "--config=/config/sdn-config.yaml"])
                .env("SDN_MODE", mode)
                .host_path("/etc/cni/net.d")
                .host_path("/var/run/openvswitch"),
        )?;

        Ok(vec![
            RenderedObject::from_resource(&self.generate_namespace(SDN_NAMESPACE, "sdn"))?,
            RenderedObject::from_resource(&config_map)?,
            RenderedObject::from_resource(&daemonset)?.with_annotations(get_wait_for_ready_annotations()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bootstrap::BootstrapResult,
        network::defaults::fill_defaults,
        resources::{
            crd::v1::network::{DefaultNetworkDefinition, NetworkSpec},
            release::test_release::release,
        },
    };

    fn render(network_type: &str) -> Vec<String> {
        let mut spec = NetworkSpec {
            default_network: DefaultNetworkDefinition {
                type_: network_type.to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };
        fill_defaults(&mut spec, None);

        release()
            .render_default_network(&spec, &BootstrapResult::default())
            .unwrap()
            .iter()
            .map(|object| object.object.metadata.name.clone().unwrap())
            .collect()
    }

    #[test]
    fn each_plugin_renders_its_own_workloads() {
        assert!(render("OVNKubernetes").contains(&"ovnkube-node".to_owned()));
        assert!(render("OpenShiftSDN").contains(&"sdn".to_owned()));
        assert!(render("Calico").is_empty());
    }

    #[test]
    fn unfilled_plugin_config_is_a_generation_error() {
        let spec = NetworkSpec {
            default_network: DefaultNetworkDefinition {
                type_: "OpenShiftSDN".to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(release()
            .render_default_network(&spec, &BootstrapResult::default())
            .is_err());
    }
}
