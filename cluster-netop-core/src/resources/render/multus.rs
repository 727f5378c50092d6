use k8s_openapi::api::core::v1::ServiceAccount;

use crate::{
    bootstrap::BootstrapResult,
    resources::{
        annotations::get_wait_for_ready_annotations, release::OperatorRelease, RenderedObject,
        ResourceGenerationError,
    },
};

use super::WorkloadTemplate;

pub const MULTUS_DAEMONSET_NAME: &str = "multus";
pub const MULTUS_ADMISSION_CONTROLLER_NAME: &str = "multus-admission-controller";

const COMPONENT: &str = "multus";

impl OperatorRelease {
    pub fn render_multus(
        &self,
        bootstrap: &BootstrapResult,
    ) -> Result<Vec<RenderedObject>, ResourceGenerationError> {
        let namespace = self.multus_namespace.as_str();
        let service_account = ServiceAccount {
            metadata: self.generate_metadata(namespace, MULTUS_DAEMONSET_NAME, COMPONENT),
            ..Default::default()
        };

        let mut daemonset = self.generate_daemonset(
            &WorkloadTemplate::new(namespace, MULTUS_DAEMONSET_NAME, COMPONENT, &self.multus_image)
                .node_agent()
                .command(&["/entrypoint.sh", "--multus-conf-file=auto", "--cni-version=0.3.1"])
                .host_path("/etc/cni/net.d")
                .host_path("/opt/cni/bin")
                .host_path("/run/netns"),
        )?;
        if let Some(spec) = daemonset.spec.as_mut() {
            if let Some(pod) = spec.template.spec.as_mut() {
                pod.service_account_name = Some(MULTUS_DAEMONSET_NAME.to_owned());
            }
        }

        let admission_controller = self.generate_deployment(
            &WorkloadTemplate::new(
                namespace,
                MULTUS_ADMISSION_CONTROLLER_NAME,
                COMPONENT,
                &self.multus_image,
            )
            .command(&["/usr/bin/webhook", "--bind-address=0.0.0.0", "--port=6443"]),
            match bootstrap.is_single_node() {
                true => 1,
                false => 2,
            },
        )?;

        Ok(vec![
            RenderedObject::from_resource(&self.generate_namespace(namespace, COMPONENT))?,
            RenderedObject::from_resource(&service_account)?,
            RenderedObject::from_resource(&self.generate_default_allowlist_configmap())?,
            RenderedObject::from_resource(&daemonset)?
                .with_annotations(get_wait_for_ready_annotations()),
            RenderedObject::from_resource(&admission_controller)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::Deployment;

    use crate::{
        bootstrap::BootstrapResult,
        kubernetes::to_typed,
        resources::release::test_release::release,
    };

    use super::MULTUS_ADMISSION_CONTROLLER_NAME;

    fn admission_replicas(bootstrap: BootstrapResult) -> Option<i32> {
        release()
            .render_multus(&bootstrap)
            .unwrap()
            .iter()
            .find(|object| {
                object.object.metadata.name.as_deref() == Some(MULTUS_ADMISSION_CONTROLLER_NAME)
            })
            .map(|object| to_typed::<Deployment>(&object.object).unwrap())
            .and_then(|deployment| deployment.spec)
            .and_then(|spec| spec.replicas)
    }

    #[test]
    fn admission_controller_scales_with_the_cluster() {
        assert_eq!(
            admission_replicas(BootstrapResult {
                node_count: 1,
                control_plane_nodes: 1
            }),
            Some(1)
        );
        assert_eq!(
            admission_replicas(BootstrapResult {
                node_count: 5,
                control_plane_nodes: 3
            }),
            Some(2)
        );
    }

    #[test]
    fn multus_daemonset_is_waited_on() {
        let objects = release()
            .render_multus(&BootstrapResult::default())
            .unwrap();
        let waited = objects
            .iter()
            .filter(|object| object.waits_for_ready())
            .map(|object| object.object.metadata.name.clone().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(waited, vec!["multus".to_owned()]);
    }
}
