use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::core::ApiResource;

use crate::{
    kubernetes::{ObjectIdentity, StoreError},
    resources::{ObjectRole, RenderedObject},
    status::{RelatedObject, WorkloadReference},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workload {
    DaemonSet(WorkloadReference),
    Deployment(WorkloadReference),
}

impl Workload {
    pub fn reference(&self) -> &WorkloadReference {
        match self {
            Workload::DaemonSet(reference) | Workload::Deployment(reference) => reference,
        }
    }

    pub fn identity(&self) -> ObjectIdentity {
        match self {
            Workload::DaemonSet(reference) => {
                ObjectIdentity::of::<DaemonSet>(Some(&reference.namespace), &reference.name)
            }
            Workload::Deployment(reference) => {
                ObjectIdentity::of::<Deployment>(Some(&reference.namespace), &reference.name)
            }
        }
    }
}

/// What the status reporter and the readiness poller need to know about one rendered set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub daemon_sets: Vec<WorkloadReference>,
    pub deployments: Vec<WorkloadReference>,
    pub related_objects: Vec<RelatedObject>,
    /// workloads annotated with wait-for-ready, in render order
    pub readiness_targets: Vec<Workload>,
}

fn related_object(identity: &ObjectIdentity) -> RelatedObject {
    RelatedObject {
        group: identity.group().to_owned(),
        resource: ApiResource::from_gvk(&identity.gvk()).plural,
        namespace: identity.namespace.clone(),
        name: identity.name.clone(),
    }
}

fn workload_reference(identity: &ObjectIdentity) -> Result<WorkloadReference, StoreError> {
    let namespace = identity.namespace.as_deref().ok_or_else(|| {
        StoreError::InvalidObject(format!("workload {identity} is missing a namespace").into())
    })?;

    Ok(WorkloadReference::new(namespace, &identity.name))
}

pub fn classify(objects: &[RenderedObject]) -> Result<Classification, StoreError> {
    let mut classification = Classification::default();

    for rendered in objects.iter().filter(|rendered| rendered.role == ObjectRole::Resource) {
        let identity = rendered.identity()?;
        classification.related_objects.push(related_object(&identity));

        let workload = if identity.is::<DaemonSet>() {
            let reference = workload_reference(&identity)?;
            classification.daemon_sets.push(reference.clone());
            Workload::DaemonSet(reference)
        } else if identity.is::<Deployment>() {
            let reference = workload_reference(&identity)?;
            classification.deployments.push(reference.clone());
            Workload::Deployment(reference)
        } else {
            continue;
        };

        if rendered.waits_for_ready() {
            classification.readiness_targets.push(workload);
        }
    }

    classification.related_objects.sort();
    classification.related_objects.dedup();

    Ok(classification)
}

#[cfg(test)]
mod tests {
    use crate::{
        bootstrap::BootstrapResult,
        network::{defaults::fill_defaults, test_config::sdn_spec},
        resources::{
            crd::v1::cluster_network::{ClusterNetwork, ClusterNetworkSpec},
            release::test_release::release,
            render::{ManifestRenderer, Renderer},
            RenderedObject,
        },
        status::WorkloadReference,
    };

    use super::{classify, Workload};

    fn bootstrap() -> BootstrapResult {
        BootstrapResult {
            node_count: 3,
            control_plane_nodes: 3,
        }
    }

    #[test]
    fn rendered_sdn_cluster_is_partitioned() {
        let mut spec = sdn_spec();
        fill_defaults(&mut spec, None);
        let objects = ManifestRenderer::new(release())
            .render(&spec, &bootstrap())
            .unwrap();

        let classification = classify(&objects).unwrap();

        assert!(classification
            .daemon_sets
            .contains(&WorkloadReference::new("netop-multus", "multus")));
        assert!(classification
            .daemon_sets
            .contains(&WorkloadReference::new("netop-sdn", "sdn")));
        assert_eq!(classification.deployments.len(), 1);
        assert!(classification
            .readiness_targets
            .contains(&Workload::DaemonSet(WorkloadReference::new("netop-sdn", "sdn"))));
        assert!(classification
            .related_objects
            .iter()
            .any(|related| related.resource == "daemonsets" && related.group == "apps"));
    }

    #[test]
    fn status_objects_are_not_related() {
        let status = RenderedObject::status(&ClusterNetwork::new(
            "cluster",
            ClusterNetworkSpec::default(),
        ))
        .unwrap();

        let classification = classify(&[status]).unwrap();

        assert!(classification.related_objects.is_empty());
    }
}
