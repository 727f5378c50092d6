use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec},
        core::v1::{
            Container, EnvVar, HostPathVolumeSource, Namespace, PodSpec, PodTemplateSpec,
            SecurityContext, Toleration, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use kube::core::ObjectMeta;
use log::debug;
use thiserror::Error;

use crate::bootstrap::BootstrapResult;

use super::{
    crd::v1::network::NetworkSpec,
    labels::{get_app_labels, get_workload_labels},
    release::OperatorRelease,
    RenderedObject, ResourceGenerationError,
};

pub mod additional_networks;
pub mod allowlist;
pub mod default_network;
pub mod kube_proxy;
pub mod multus;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Couldn't generate {} manifests! Reason: {}", .component, .source)]
    Generation {
        component: &'static str,
        source: ResourceGenerationError,
    },
}

impl RenderError {
    pub fn generation(component: &'static str) -> impl FnOnce(ResourceGenerationError) -> Self {
        move |source| RenderError::Generation { component, source }
    }
}

/// Pure function from configuration and platform facts to the ordered set of objects
/// the applier should converge the cluster to.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        config: &NetworkSpec,
        bootstrap: &BootstrapResult,
    ) -> Result<Vec<RenderedObject>, RenderError>;
}

pub struct ManifestRenderer {
    release: OperatorRelease,
}

impl ManifestRenderer {
    pub fn new(release: OperatorRelease) -> Self {
        Self { release }
    }
}

impl Renderer for ManifestRenderer {
    fn render(
        &self,
        config: &NetworkSpec,
        bootstrap: &BootstrapResult,
    ) -> Result<Vec<RenderedObject>, RenderError> {
        let mut objects = Vec::new();

        if !config.disable_multi_network.unwrap_or(false) {
            objects.extend(
                self.release
                    .render_multus(bootstrap)
                    .map_err(RenderError::generation("multus"))?,
            );
            objects.extend(
                self.release
                    .render_additional_networks(config)
                    .map_err(RenderError::generation("additional network"))?,
            );
        }

        objects.extend(
            self.release
                .render_default_network(config, bootstrap)
                .map_err(RenderError::generation("default network"))?,
        );

        if config.deploy_kube_proxy.unwrap_or(false) {
            objects.extend(
                self.release
                    .render_kube_proxy(config)
                    .map_err(RenderError::generation("kube-proxy"))?,
            );
        }

        debug!("Rendered {} objects", objects.len());

        Ok(objects)
    }
}

/// Shape shared by every node agent and control plane workload the operator renders.
pub struct WorkloadTemplate<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub component: &'a str,
    pub image: &'a str,
    pub command: Vec<String>,
    pub env: Vec<EnvVar>,
    pub host_network: bool,
    pub privileged: bool,
    /// host paths mounted at the same location inside the container
    pub host_paths: Vec<&'a str>,
}

impl<'a> WorkloadTemplate<'a> {
    pub fn new(namespace: &'a str, name: &'a str, component: &'a str, image: &'a str) -> Self {
        Self {
            namespace,
            name,
            component,
            image,
            command: Vec::new(),
            env: Vec::new(),
            host_network: false,
            privileged: false,
            host_paths: Vec::new(),
        }
    }

    pub fn node_agent(mut self) -> Self {
        self.host_network = true;
        self.privileged = true;
        self
    }

    pub fn command(mut self, command: &[&str]) -> Self {
        self.command = command.iter().map(|arg| arg.to_string()).collect();
        self
    }

    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.env.push(EnvVar {
            name: name.to_owned(),
            value: Some(value.to_owned()),
            ..Default::default()
        });
        self
    }

    pub fn host_path(mut self, path: &'a str) -> Self {
        self.host_paths.push(path);
        self
    }
}

fn volume_name(path: &str) -> String {
    let name = path.trim_matches('/').replace(['/', '.', '_'], "-");

    match name.is_empty() {
        true => "host-root".to_owned(),
        false => name,
    }
}

impl OperatorRelease {
    pub fn generate_namespace(&self, name: &str, component: &str) -> Namespace {
        Namespace {
            metadata: self.generate_clusterwide_metadata(name, component),
            ..Default::default()
        }
    }

    fn generate_pod_template(&self, template: &WorkloadTemplate) -> PodTemplateSpec {
        let volumes = template
            .host_paths
            .iter()
            .map(|path| Volume {
                name: volume_name(path),
                host_path: Some(HostPathVolumeSource {
                    path: path.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect::<Vec<_>>();
        let volume_mounts = template
            .host_paths
            .iter()
            .map(|path| VolumeMount {
                name: volume_name(path),
                mount_path: path.to_string(),
                ..Default::default()
            })
            .collect::<Vec<_>>();

        let mut env = vec![EnvVar {
            name: "RELEASE_VERSION".to_owned(),
            value: Some(self.release_version.to_owned()),
            ..Default::default()
        }];
        env.extend(template.env.iter().cloned());

        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(get_workload_labels(template.name, template.component)),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![Container {
                    command: match template.command.is_empty() {
                        true => None,
                        false => Some(template.command.clone()),
                    },
                    env: Some(env),
                    image: Some(template.image.to_owned()),
                    image_pull_policy: Some("IfNotPresent".to_owned()),
                    name: template.name.to_owned(),
                    security_context: template.privileged.then(|| SecurityContext {
                        privileged: Some(true),
                        ..Default::default()
                    }),
                    volume_mounts: match volume_mounts.is_empty() {
                        true => None,
                        false => Some(volume_mounts),
                    },
                    ..Default::default()
                }],
                host_network: template.host_network.then_some(true),
                priority_class_name: Some("system-node-critical".to_owned()),
                tolerations: template.host_network.then(|| {
                    vec![Toleration {
                        operator: Some("Exists".to_owned()),
                        ..Default::default()
                    }]
                }),
                volumes: match volumes.is_empty() {
                    true => None,
                    false => Some(volumes),
                },
                ..Default::default()
            }),
        }
    }

    pub fn generate_daemonset(
        &self,
        template: &WorkloadTemplate,
    ) -> Result<DaemonSet, ResourceGenerationError> {
        if template.image.is_empty() {
            return Err(ResourceGenerationError::MissingData(
                format!("image for {}", template.name).into(),
            ));
        }

        Ok(DaemonSet {
            metadata: self.generate_metadata(template.namespace, template.name, template.component),
            spec: Some(DaemonSetSpec {
                selector: LabelSelector {
                    match_expressions: None,
                    match_labels: Some(get_app_labels(template.name)),
                },
                template: self.generate_pod_template(template),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    pub fn generate_deployment(
        &self,
        template: &WorkloadTemplate,
        replicas: i32,
    ) -> Result<Deployment, ResourceGenerationError> {
        if template.image.is_empty() {
            return Err(ResourceGenerationError::MissingData(
                format!("image for {}", template.name).into(),
            ));
        }

        Ok(Deployment {
            metadata: self.generate_metadata(template.namespace, template.name, template.component),
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_expressions: None,
                    match_labels: Some(get_app_labels(template.name)),
                },
                template: self.generate_pod_template(template),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
