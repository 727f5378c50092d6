use std::collections::BTreeMap;

use k8s_openapi::api::{
    apps::v1::DaemonSet,
    core::v1::{ConfigMap, ConfigMapVolumeSource, Volume, VolumeMount},
};

use crate::{
    resources::{release::OperatorRelease, ResourceGenerationError},
    ALLOWLIST_CONFIG_NAME, ALLOWLIST_DAEMONSET_NAME,
};

use super::WorkloadTemplate;

pub const DEFAULT_ALLOWLIST_CONFIG_NAME: &str = "default-cni-sysctl-allowlist";
pub const ALLOWLIST_CONFIG_KEY: &str = "allowlist.conf";
pub const ALLOWLIST_HOST_DIR: &str = "/etc/cni/tuning";

const COMPONENT: &str = "sysctl-allowlist";
const CONFIG_VOLUME: &str = "cni-sysctl-allowlist";
const CONFIG_MOUNT: &str = "/etc/cni-sysctl-allowlist";

/// Interface-scoped sysctls the tuning plugin may set, IFNAME is substituted per interface.
const DEFAULT_SYSCTLS: [&str; 10] = [
    r"^net.ipv4.conf.IFNAME.accept_redirects$",
    r"^net.ipv4.conf.IFNAME.accept_source_route$",
    r"^net.ipv4.conf.IFNAME.arp_accept$",
    r"^net.ipv4.conf.IFNAME.arp_notify$",
    r"^net.ipv4.conf.IFNAME.disable_policy$",
    r"^net.ipv4.conf.IFNAME.secure_redirects$",
    r"^net.ipv4.conf.IFNAME.send_redirects$",
    r"^net.ipv6.conf.IFNAME.accept_ra$",
    r"^net.ipv6.conf.IFNAME.accept_redirects$",
    r"^net.ipv6.neigh.IFNAME.base_reachable_time_ms$",
];

pub fn default_allowlist() -> String {
    let mut allowlist = DEFAULT_SYSCTLS.join("\n");
    allowlist.push('\n');
    allowlist
}

impl OperatorRelease {
    fn generate_allowlist_configmap_named(&self, name: &str) -> ConfigMap {
        ConfigMap {
            metadata: self.generate_metadata(&self.multus_namespace, name, COMPONENT),
            data: Some(BTreeMap::from([(
                ALLOWLIST_CONFIG_KEY.to_owned(),
                default_allowlist(),
            )])),
            ..Default::default()
        }
    }

    /// Operator managed copy, overwritten on every reconcile.
    pub fn generate_default_allowlist_configmap(&self) -> ConfigMap {
        self.generate_allowlist_configmap_named(DEFAULT_ALLOWLIST_CONFIG_NAME)
    }

    /// Administrator editable allowlist, only ever created, never updated.
    pub fn generate_allowlist_configmap(&self) -> ConfigMap {
        self.generate_allowlist_configmap_named(ALLOWLIST_CONFIG_NAME)
    }

    /// Short lived daemonset copying the allowlist onto every node.
    pub fn generate_allowlist_daemonset(&self) -> Result<DaemonSet, ResourceGenerationError> {
        let copy_command = format!(
            "cp {CONFIG_MOUNT}/{ALLOWLIST_CONFIG_KEY} {ALLOWLIST_HOST_DIR}/{ALLOWLIST_CONFIG_KEY} && sleep infinity"
        );
        let mut daemonset = self.generate_daemonset(
            &WorkloadTemplate::new(
                &self.multus_namespace,
                ALLOWLIST_DAEMONSET_NAME,
                COMPONENT,
                &self.multus_image,
            )
            .node_agent()
            .command(&["/bin/bash", "-c", &copy_command])
            .host_path(ALLOWLIST_HOST_DIR),
        )?;

        let pod = daemonset
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .ok_or(ResourceGenerationError::MissingData("pod spec".into()))?;
        pod.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: CONFIG_VOLUME.to_owned(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(ALLOWLIST_CONFIG_NAME.to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        });
        for container in pod.containers.iter_mut() {
            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .push(VolumeMount {
                    name: CONFIG_VOLUME.to_owned(),
                    mount_path: CONFIG_MOUNT.to_owned(),
                    read_only: Some(true),
                    ..Default::default()
                });
        }

        Ok(daemonset)
    }
}
