use log::info;
use tokio_util::sync::CancellationToken;

use crate::{
    kubernetes::{cancellable, to_dynamic, to_typed, try_get_typed, ObjectStore, StoreError},
    resources::{
        crd::v1::{
            cluster_network::{ClusterNetwork, ClusterNetworkStatus},
            network::{Network, NetworkSpec, NetworkType},
        },
        ObjectRole, RenderedObject,
    },
    CLUSTER_CONFIG_NAME,
};

use super::ConfigError;

fn merge_into(cluster: &ClusterNetwork, spec: &mut NetworkSpec) {
    if !cluster.spec.cluster_network.is_empty() {
        spec.cluster_network = cluster.spec.cluster_network.clone();
    }
    if !cluster.spec.service_network.is_empty() {
        spec.service_network = cluster.spec.service_network.clone();
    }
    if !cluster.spec.network_type.is_empty() {
        spec.default_network.type_ = cluster.spec.network_type.clone();
    }
}

/// Copies the administrator owned fields of the `ClusterNetwork` into the operator config,
/// writing the operator config back when something changed. Returns whether it did.
pub async fn merge_cluster_config(
    store: &dyn ObjectStore,
    network: &mut Network,
    cancel: &CancellationToken,
) -> Result<bool, ConfigError> {
    let Some(cluster) =
        try_get_typed::<ClusterNetwork>(store, None, CLUSTER_CONFIG_NAME, cancel)
            .await
            .map_err(ConfigError::Merge)?
    else {
        return Ok(false);
    };

    let mut merged = network.spec.clone();
    merge_into(&cluster, &mut merged);

    if merged == network.spec {
        return Ok(false);
    }

    info!("Cluster network configuration changed, updating the operator configuration...");

    let mut updated = network.clone();
    updated.spec = merged;
    let object = to_dynamic(&updated).map_err(ConfigError::Merge)?;
    let written = cancellable(cancel, store.update(&object))
        .await
        .map_err(ConfigError::Merge)?;
    *network = to_typed(&written).map_err(ConfigError::Merge)?;

    Ok(true)
}

fn status_from_spec(spec: &NetworkSpec) -> ClusterNetworkStatus {
    let default_network = &spec.default_network;
    let mtu = match default_network.network_type() {
        NetworkType::OpenShiftSdn => default_network
            .openshift_sdn_config
            .as_ref()
            .and_then(|sdn| sdn.mtu),
        NetworkType::OvnKubernetes => default_network
            .ovn_kubernetes_config
            .as_ref()
            .and_then(|ovn| ovn.mtu),
        NetworkType::Other(_) => None,
    };

    ClusterNetworkStatus {
        cluster_network: spec.cluster_network.clone(),
        service_network: spec.service_network.clone(),
        network_type: default_network.type_.clone(),
        cluster_network_mtu: mtu,
    }
}

/// Status the `ClusterNetwork` should report for the applied `spec`, `None` when there's
/// no `ClusterNetwork` or its status is already up to date.
pub async fn cluster_network_status(
    store: &dyn ObjectStore,
    spec: &NetworkSpec,
    cancel: &CancellationToken,
) -> Result<Option<RenderedObject>, StoreError> {
    let Some(mut cluster) =
        try_get_typed::<ClusterNetwork>(store, None, CLUSTER_CONFIG_NAME, cancel).await?
    else {
        return Ok(None);
    };

    let status = status_from_spec(spec);
    if cluster.status.as_ref() == Some(&status) {
        return Ok(None);
    }

    cluster.status = Some(status);

    Ok(Some(RenderedObject {
        object: to_dynamic(&cluster)?,
        role: ObjectRole::Status,
    }))
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use crate::{
        kubernetes::{memory::MemoryStore, to_typed, ObjectStore},
        network::{defaults::fill_defaults, test_config::sdn_spec},
        resources::{
            crd::v1::{
                cluster_network::{ClusterNetwork, ClusterNetworkSpec},
                network::{ClusterNetworkEntry, Network, NetworkSpec},
            },
            ObjectRole,
        },
    };

    use super::{cluster_network_status, merge_cluster_config};

    fn seed_network(store: &MemoryStore, spec: NetworkSpec) -> Network {
        let object = store.insert_typed(&Network::new("cluster", spec)).unwrap();
        to_typed(&object).unwrap()
    }

    #[tokio::test]
    async fn missing_cluster_config_is_a_noop() {
        let store = MemoryStore::new();
        let mut network = seed_network(&store, sdn_spec());

        let changed = merge_cluster_config(&store, &mut network, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!changed);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn non_empty_cluster_fields_overwrite_the_operator_config() {
        let store = MemoryStore::new();
        let mut network = seed_network(&store, sdn_spec());
        store
            .insert_typed(&ClusterNetwork::new(
                "cluster",
                ClusterNetworkSpec {
                    cluster_network: vec![ClusterNetworkEntry {
                        cidr: "10.132.0.0/14".to_owned(),
                        host_prefix: 23,
                    }],
                    ..Default::default()
                },
            ))
            .unwrap();
        let cancel = CancellationToken::new();

        assert!(merge_cluster_config(&store, &mut network, &cancel).await.unwrap());
        assert!(!merge_cluster_config(&store, &mut network, &cancel).await.unwrap());

        let stored = store.typed::<Network>(None, "cluster").unwrap();
        assert_eq!(stored.spec.cluster_network[0].cidr, "10.132.0.0/14");
        assert_eq!(stored.spec.service_network, vec!["172.30.0.0/16"]);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn status_is_only_produced_when_stale() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let mut spec = sdn_spec();
        fill_defaults(&mut spec, None);

        assert!(cluster_network_status(&store, &spec, &cancel)
            .await
            .unwrap()
            .is_none());

        store
            .insert_typed(&ClusterNetwork::new("cluster", ClusterNetworkSpec::default()))
            .unwrap();
        let status = cluster_network_status(&store, &spec, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.role, ObjectRole::Status);

        store
            .update_subresource("status", &status.object)
            .await
            .unwrap();
        assert!(cluster_network_status(&store, &spec, &cancel)
            .await
            .unwrap()
            .is_none());
    }
}
