use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::json;

use crate::resources::{
    crd::v1::network::NetworkSpec, release::OperatorRelease, RenderedObject,
    ResourceGenerationError,
};

use super::WorkloadTemplate;

pub const KUBE_PROXY_NAMESPACE: &str = "netop-kube-proxy";
pub const KUBE_PROXY_NAME: &str = "kube-proxy";
pub const KUBE_PROXY_CONFIG_NAME: &str = "proxy-config";

const COMPONENT: &str = "kube-proxy";

impl OperatorRelease {
    pub fn render_kube_proxy(
        &self,
        config: &NetworkSpec,
    ) -> Result<Vec<RenderedObject>, ResourceGenerationError> {
        let proxy = config
            .kube_proxy_config
            .as_ref()
            .ok_or(ResourceGenerationError::MissingData("kubeProxyConfig".into()))?;
        let proxy_config = json!({
            "apiVersion": "kubeproxy.config.k8s.io/v1alpha1",
            "kind": "KubeProxyConfiguration",
            "bindAddress": proxy.bind_address,
            "clusterCIDR": config.cluster_network.first().map(|entry| entry.cidr.as_str()),
            "iptables": { "syncPeriod": proxy.iptables_sync_period },
            "featureGates": {},
        });
        let proxy_config = serde_json::to_string_pretty(&proxy_config)
            .map_err(|error| ResourceGenerationError::InvalidData(error.to_string().into()))?;

        let config_map = ConfigMap {
            metadata: self.generate_metadata(KUBE_PROXY_NAMESPACE, KUBE_PROXY_CONFIG_NAME, COMPONENT),
            data: Some(BTreeMap::from([("kube-proxy-config.yaml".to_owned(), proxy_config)])),
            ..Default::default()
        };

        let mut command = vec![
            "/usr/bin/kube-proxy".to_owned(),
            "--config=/config/kube-proxy-config.yaml".to_owned(),
        ];
        command.extend(proxy.proxy_arguments.iter().flat_map(|(argument, values)| {
            values
                .iter()
                .map(move |value| format!("--{argument}={value}"))
        }));
        let mut template =
            WorkloadTemplate::new(KUBE_PROXY_NAMESPACE, KUBE_PROXY_NAME, COMPONENT, &self.kube_proxy_image)
                .node_agent();
        template.command = command;

        Ok(vec![
            RenderedObject::from_resource(&self.generate_namespace(KUBE_PROXY_NAMESPACE, COMPONENT))?,
            RenderedObject::from_resource(&config_map)?,
            RenderedObject::from_resource(&self.generate_daemonset(&template)?)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::apps::v1::DaemonSet;

    use crate::{
        kubernetes::to_typed,
        network::defaults::fill_defaults,
        resources::{
            crd::v1::network::{DefaultNetworkDefinition, NetworkSpec},
            release::test_release::release,
        },
    };

    #[test]
    fn proxy_arguments_become_flags() {
        let mut spec = NetworkSpec {
            default_network: DefaultNetworkDefinition {
                type_: "Calico".to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };
        fill_defaults(&mut spec, None);
        if let Some(proxy) = spec.kube_proxy_config.as_mut() {
            proxy.proxy_arguments =
                BTreeMap::from([("metrics-port".to_owned(), vec!["9102".to_owned()])]);
        }

        let objects = release().render_kube_proxy(&spec).unwrap();
        let daemonset: DaemonSet = to_typed(&objects[2].object).unwrap();
        let command = daemonset.spec.unwrap().template.spec.unwrap().containers[0]
            .command
            .clone()
            .unwrap();

        assert!(command.contains(&"--metrics-port=9102".to_owned()));
    }
}
