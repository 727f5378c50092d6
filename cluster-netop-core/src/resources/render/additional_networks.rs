use serde_json::{json, Value};

use crate::resources::{
    annotations::get_ignore_errors_annotations,
    crd::v1::{
        netattachdef::{NetworkAttachmentDefinition, NetworkAttachmentDefinitionSpec},
        network::{
            AdditionalNetworkDefinition, NetworkSpec, ADDITIONAL_NETWORK_RAW,
            ADDITIONAL_NETWORK_SIMPLE_MACVLAN,
        },
    },
    release::OperatorRelease,
    RenderedObject, ResourceGenerationError,
};

use super::WorkloadTemplate;

pub const DHCP_DAEMON_NAME: &str = "dhcp-daemon";
pub const DEFAULT_ATTACHMENT_NAMESPACE: &str = "default";

const COMPONENT: &str = "additional-networks";

fn raw_ipam_type(raw_config: &str) -> Option<String> {
    serde_json::from_str::<Value>(raw_config)
        .ok()?
        .pointer("/ipam/type")?
        .as_str()
        .map(str::to_owned)
}

/// Whether any attachment hands out addresses through DHCP, which needs the node local daemon.
pub fn uses_dhcp(config: &NetworkSpec) -> bool {
    config.additional_networks.iter().any(|network| {
        let ipam_type = match network.type_.as_str() {
            ADDITIONAL_NETWORK_RAW => network.raw_cni_config.as_deref().and_then(raw_ipam_type),
            ADDITIONAL_NETWORK_SIMPLE_MACVLAN => network
                .simple_macvlan_config
                .as_ref()
                .and_then(|macvlan| macvlan.ipam_config.as_ref())
                .map(|ipam| ipam.type_.to_owned()),
            _ => None,
        };

        ipam_type
            .map(|ipam_type| ipam_type.eq_ignore_ascii_case("dhcp"))
            .unwrap_or(false)
    })
}

fn cni_config(network: &AdditionalNetworkDefinition) -> Result<String, ResourceGenerationError> {
    match network.type_.as_str() {
        ADDITIONAL_NETWORK_RAW => network.raw_cni_config.clone().ok_or_else(|| {
            ResourceGenerationError::MissingData(format!("rawCNIConfig of {}", network.name).into())
        }),
        ADDITIONAL_NETWORK_SIMPLE_MACVLAN => {
            let macvlan = network.simple_macvlan_config.clone().unwrap_or_default();
            let mut config = json!({
                "cniVersion": "0.3.1",
                "name": network.name,
                "type": "macvlan",
                "mode": macvlan.mode.unwrap_or_else(|| "bridge".to_owned()),
                "ipam": {
                    "type": macvlan
                        .ipam_config
                        .map(|ipam| ipam.type_.to_lowercase())
                        .unwrap_or_else(|| "dhcp".to_owned()),
                },
            });
            if let Some(master) = macvlan.master {
                config["master"] = Value::String(master);
            }
            if let Some(mtu) = macvlan.mtu {
                config["mtu"] = Value::from(mtu);
            }

            Ok(config.to_string())
        }
        other => Err(ResourceGenerationError::InvalidData(
            format!("unknown additional network type {other}").into(),
        )),
    }
}

impl OperatorRelease {
    pub fn render_additional_networks(
        &self,
        config: &NetworkSpec,
    ) -> Result<Vec<RenderedObject>, ResourceGenerationError> {
        let mut objects = Vec::new();

        for network in config.additional_networks.iter() {
            let namespace = network
                .namespace
                .as_deref()
                .unwrap_or(DEFAULT_ATTACHMENT_NAMESPACE);
            let attachment = NetworkAttachmentDefinition {
                metadata: self.generate_metadata(namespace, &network.name, COMPONENT),
                spec: NetworkAttachmentDefinitionSpec {
                    config: cni_config(network)?,
                },
            };

            // the attachment CRD may not be served yet
            objects.push(
                RenderedObject::from_resource(&attachment)?
                    .with_annotations(get_ignore_errors_annotations()),
            );
        }

        if uses_dhcp(config) {
            let daemonset = self.generate_daemonset(
                &WorkloadTemplate::new(
                    &self.multus_namespace,
                    DHCP_DAEMON_NAME,
                    COMPONENT,
                    &self.cni_plugins_image,
                )
                .node_agent()
                .command(&["/usr/src/plugins/bin/dhcp", "daemon"])
                .host_path("/run/cni")
                .host_path("/var/run/netns"),
            )?;
            objects.push(RenderedObject::from_resource(&daemonset)?);
        }

        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use crate::resources::{
        crd::v1::network::{AdditionalNetworkDefinition, NetworkSpec},
        release::test_release::release,
    };

    use super::{uses_dhcp, DHCP_DAEMON_NAME};

    fn raw(name: &str, config: &str) -> AdditionalNetworkDefinition {
        AdditionalNetworkDefinition {
            type_: "Raw".to_owned(),
            name: name.to_owned(),
            raw_cni_config: Some(config.to_owned()),
            ..Default::default()
        }
    }

    fn spec(networks: Vec<AdditionalNetworkDefinition>) -> NetworkSpec {
        NetworkSpec {
            additional_networks: networks,
            ..Default::default()
        }
    }

    #[test]
    fn dhcp_daemon_is_rendered_only_for_dhcp_ipam() {
        let dhcp = spec(vec![raw(
            "net-attach-dhcp",
            r#"{"cniVersion":"0.3.0","type":"macvlan","master":"eth0","mode":"bridge","ipam":{"type":"dhcp"}}"#,
        )]);
        let static_only = spec(vec![raw("net-attach-1", "{}"), raw("net-attach-2", "{}")]);

        assert!(uses_dhcp(&dhcp));
        assert!(!uses_dhcp(&static_only));

        let names = |config: &NetworkSpec| {
            release()
                .render_additional_networks(config)
                .unwrap()
                .iter()
                .map(|object| object.object.metadata.name.clone().unwrap())
                .collect::<Vec<_>>()
        };
        assert!(names(&dhcp).contains(&DHCP_DAEMON_NAME.to_owned()));
        assert_eq!(names(&static_only), vec!["net-attach-1", "net-attach-2"]);
    }

    #[test]
    fn attachments_tolerate_apply_errors() {
        let objects = release()
            .render_additional_networks(&spec(vec![raw("storage", "{}")]))
            .unwrap();

        assert!(objects[0].ignores_errors());
        assert_eq!(objects[0].object.metadata.namespace.as_deref(), Some("default"));
    }
}
