use std::{sync::Arc, time::Duration};

use cluster_netop_core::{
    apply::apply_all,
    classify::classify,
    helpers::RequireMetadata,
    kubernetes::{cancellable, try_get_typed, StoreError},
    network::{
        applied::{applied_configuration, get_applied_configuration},
        merge::{cluster_network_status, merge_cluster_config},
        reconcile_config,
    },
    readiness::{wait_for_ready, Readiness, ReadinessCheckBuilder},
    resources::{crd::v1::network::Network, render::RenderError, RenderedObject},
    status::{RelatedObject, StatusComponent},
    OPERATOR_CONFIG_NAME,
};
use kube::{runtime::controller::Action, Resource};
use log::{debug, info, warn};

use super::{context::ReconcilerContext, error::ReconcilerError, ReconcileOutcome};

const DEFAULT_ERROR_REQUEUE_SECS: u64 = 10;
const USER_ERROR_REQUEUE_SECS: u64 = 60 * 5;

pub async fn reconcile_network(
    object: Arc<Network>,
    context: Arc<ReconcilerContext>,
) -> Result<Action, ReconcilerError> {
    ensure_allowlist_config(&context).await;

    let name = object.require_name_or(ReconcilerError::MissingObjectMetadata)?;
    if name != OPERATOR_CONFIG_NAME {
        info!("Ignoring network '{name}', only '{OPERATOR_CONFIG_NAME}' is reconciled");
        return Ok(Action::await_change());
    }

    ReconcileOutcome::guard(try_reconcile(name, &context))
        .await
        .report(&context, StatusComponent::OperatorConfig)
        .await
}

pub fn reconcile_network_error(
    _object: Arc<Network>,
    error: &ReconcilerError,
    _context: Arc<ReconcilerContext>,
) -> Action {
    Action::requeue(match error.is_user_actionable() {
        true => Duration::from_secs(USER_ERROR_REQUEUE_SECS),
        false => Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECS),
    })
}

/// Creates the administrator editable allowlist unless it's already there. Failures only
/// get logged, the allowlist controller retries on its own.
async fn ensure_allowlist_config(context: &ReconcilerContext) {
    let config_map = context.release.generate_allowlist_configmap();
    let object = match RenderedObject::from_resource(&config_map) {
        Ok(rendered) => rendered.object,
        Err(error) => {
            warn!("Couldn't generate the sysctl allowlist! Reason: {error}");
            return;
        }
    };
    let store = context.store.as_ref();

    match cancellable(&context.cancel, store.create(&object)).await {
        Ok(_) => info!("Created the default sysctl allowlist"),
        Err(StoreError::NotFound(_)) => {
            debug!("Multus namespace doesn't exist yet, not creating the sysctl allowlist")
        }
        Err(StoreError::Api(kube::Error::Api(response))) if response.code == 409 => (),
        Err(error) => warn!("Couldn't create the sysctl allowlist! Reason: {error}"),
    }
}

async fn try_reconcile(name: &str, context: &ReconcilerContext) -> Result<Action, ReconcilerError> {
    let store = context.store.as_ref();
    let cancel = &context.cancel;
    let release = &context.release;

    let Some(mut network) = try_get_typed::<Network>(store, None, name, cancel)
        .await
        .map_err(ReconcilerError::OperatorConfig)?
    else {
        context
            .status
            .set_degraded(
                StatusComponent::OperatorConfig,
                "NoOperatorConfig",
                &format!("Operator configuration '{name}' was deleted"),
            )
            .await;
        return Ok(Action::await_change());
    };

    merge_cluster_config(store, &mut network, cancel)
        .await
        .map_err(ReconcilerError::Config)?;
    let previous = get_applied_configuration(store, &release.namespace, name, cancel)
        .await
        .map_err(ReconcilerError::Config)?;
    let spec = reconcile_config(&network, previous).map_err(ReconcilerError::Config)?;

    let bootstrap = context
        .bootstrapper
        .bootstrap(&spec)
        .await
        .map_err(ReconcilerError::Bootstrap)?;

    let mut objects = vec![applied_configuration(&release.namespace, name, &spec)
        .map_err(RenderError::generation("applied configuration"))
        .map_err(ReconcilerError::Render)?];
    objects.extend(
        context
            .renderer
            .render(&spec, &bootstrap)
            .map_err(ReconcilerError::Render)?,
    );

    let classification = classify(&objects).map_err(ReconcilerError::Classify)?;
    let mut related_objects = classification.related_objects;
    related_objects.push(RelatedObject::namespace(&release.multus_namespace));
    related_objects.sort();
    related_objects.dedup();

    context.status.set_daemon_sets(classification.daemon_sets);
    context.status.set_deployments(classification.deployments);
    context.status.set_related_objects(related_objects);

    let owner = network
        .controller_owner_ref(&())
        .ok_or(ReconcilerError::MissingObjectMetadata)?;
    apply_all(store, &objects, Some(&owner), cancel)
        .await
        .map_err(ReconcilerError::Apply)?;

    for workload in classification.readiness_targets {
        let check = ReadinessCheckBuilder::default()
            .workload(workload)
            .interval(context.settings.readiness_interval)
            .timeout(context.settings.readiness_timeout)
            .build()
            .map_err(ReconcilerError::ReadinessCheckBuilder)?;

        match wait_for_ready(store, &check, cancel).await {
            Ok(Readiness::Ready) => (),
            Ok(Readiness::TimedOut) => {
                info!("Not all {} pods are ready, continuing anyway", check.workload.reference())
            }
            Err(error) if error.is_cancelled() => return Err(ReconcilerError::Readiness(error)),
            Err(error) => warn!("Couldn't check {} readiness! {error}", check.workload.reference()),
        }
    }

    context.status.refresh_from_pods().await;

    if let Some(status) = cluster_network_status(store, &spec, cancel)
        .await
        .map_err(ReconcilerError::Status)?
    {
        apply_all(store, &[status], None, cancel)
            .await
            .map_err(ReconcilerError::StatusApply)?;
    }

    context
        .status
        .set_not_degraded(StatusComponent::OperatorConfig)
        .await;

    Ok(Action::requeue(context.settings.resync_period))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc, time::Duration};

    use cluster_netop_core::{
        kubernetes::{memory::MemoryStore, to_typed, ObjectIdentity},
        network::{
            applied::APPLIED_KEY,
            test_config::{network, sdn_spec},
        },
        resources::{
            annotations::NETWORK_MIGRATION_ANNOTATION,
            crd::v1::{
                cluster_network::{ClusterNetwork, ClusterNetworkSpec},
                network::{Network, NetworkSpec, OVN_KUBERNETES},
            },
            release::test_release::release,
        },
        status::{MockStatusReporter, StatusComponent, StatusManager},
        ALLOWLIST_CONFIG_NAME,
    };
    use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::ConfigMap};
    use kube::runtime::controller::Action;
    use mockall::predicate::{always, eq};

    use crate::controller::reconciler::{error::ReconcilerError, test_context::context};

    use super::{reconcile_network, reconcile_network_error};

    fn seed(store: &MemoryStore, spec: NetworkSpec) -> Arc<Network> {
        let object = store.insert_typed(&network(spec)).unwrap();
        Arc::new(to_typed(&object).unwrap())
    }

    fn manager(store: &Arc<MemoryStore>) -> Arc<StatusManager> {
        Arc::new(StatusManager::new(
            store.clone(),
            Default::default(),
            "cluster",
            "4.14.0",
        ))
    }

    fn applied_spec(store: &MemoryStore) -> String {
        store
            .typed::<ConfigMap>(Some("netop"), "applied-cluster")
            .and_then(|config_map| config_map.data)
            .map(|mut data| data.remove(APPLIED_KEY).unwrap_or_default())
            .unwrap_or_default()
    }

    fn degraded_reason(store: &MemoryStore) -> Option<String> {
        store
            .typed::<Network>(None, "cluster")
            .and_then(|network| network.status)
            .and_then(|status| {
                status
                    .conditions
                    .into_iter()
                    .find(|condition| condition.type_ == "Degraded" && condition.status == "True")
            })
            .and_then(|condition| condition.reason)
    }

    #[tokio::test(start_paused = true)]
    async fn full_pass_applies_owned_objects_and_requeues() {
        let store = Arc::new(MemoryStore::new());
        let object = seed(&store, sdn_spec());
        let context = Arc::new(context(store.clone(), manager(&store)));

        let action = reconcile_network(object, context).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(300)));
        assert!(!applied_spec(&store).is_empty());
        let sdn = store.typed::<DaemonSet>(Some("netop-sdn"), "sdn").unwrap();
        let owners = sdn.metadata.owner_references.unwrap();
        assert_eq!(owners[0].kind, "Network");
        assert_eq!(owners[0].name, "cluster");
        assert_eq!(degraded_reason(&store), None);
    }

    #[tokio::test(start_paused = true)]
    async fn second_pass_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let object = seed(&store, sdn_spec());
        let context = Arc::new(context(store.clone(), manager(&store)));

        reconcile_network(object.clone(), context.clone()).await.unwrap();
        let writes = store.write_count();
        reconcile_network(object, context).await.unwrap();

        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test(start_paused = true)]
    async fn unsafe_change_is_degraded_and_keeps_the_applied_record() {
        let store = Arc::new(MemoryStore::new());
        let object = seed(&store, sdn_spec());
        let context = Arc::new(context(store.clone(), manager(&store)));
        reconcile_network(object, context.clone()).await.unwrap();
        let recorded = applied_spec(&store);

        let mut changed = sdn_spec();
        changed.default_network.type_ = OVN_KUBERNETES.to_owned();
        let object = seed(&store, changed);
        let result = reconcile_network(object.clone(), context.clone()).await;

        let error = result.unwrap_err();
        assert!(matches!(error, ReconcilerError::Config(_)));
        assert_eq!(
            reconcile_network_error(object, &error, context),
            Action::requeue(Duration::from_secs(300))
        );
        assert_eq!(applied_spec(&store), recorded);
        assert_eq!(
            degraded_reason(&store).as_deref(),
            Some("InvalidOperatorConfig")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn migration_annotation_allows_the_change() {
        let store = Arc::new(MemoryStore::new());
        let object = seed(&store, sdn_spec());
        let context = Arc::new(context(store.clone(), manager(&store)));
        reconcile_network(object, context.clone()).await.unwrap();

        let mut migrated = network(sdn_spec());
        migrated.spec.default_network.type_ = OVN_KUBERNETES.to_owned();
        migrated.metadata.annotations = Some(BTreeMap::from([(
            NETWORK_MIGRATION_ANNOTATION.to_owned(),
            "true".to_owned(),
        )]));
        let object = store.insert_typed(&migrated).unwrap();

        reconcile_network(Arc::new(to_typed(&object).unwrap()), context)
            .await
            .unwrap();

        assert!(applied_spec(&store).contains(OVN_KUBERNETES));
        assert!(store
            .typed::<DaemonSet>(Some("netop-ovn-kubernetes"), "ovnkube-node")
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn other_networks_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let mut other = network(sdn_spec());
        other.metadata.name = Some("secondary".to_owned());
        let context = Arc::new(context(store.clone(), Arc::new(MockStatusReporter::new())));

        let action = reconcile_network(Arc::new(other), context).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert!(store.typed::<DaemonSet>(Some("netop-sdn"), "sdn").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_config_reports_no_operator_config() {
        let store = Arc::new(MemoryStore::new());
        let mut status = MockStatusReporter::new();
        status
            .expect_set_degraded()
            .with(
                eq(StatusComponent::OperatorConfig),
                eq("NoOperatorConfig"),
                always(),
            )
            .times(1)
            .return_const(());
        let context = Arc::new(context(store.clone(), Arc::new(status)));

        let action = reconcile_network(Arc::new(network(sdn_spec())), context)
            .await
            .unwrap();

        assert_eq!(action, Action::await_change());
    }

    #[tokio::test(start_paused = true)]
    async fn editable_allowlist_is_ensured() {
        let store = Arc::new(MemoryStore::new());
        let object = seed(&store, sdn_spec());
        let context = Arc::new(context(store.clone(), manager(&store)));

        reconcile_network(object, context).await.unwrap();

        let allowlist = ObjectIdentity::of::<ConfigMap>(
            Some(&release().multus_namespace),
            ALLOWLIST_CONFIG_NAME,
        );
        assert!(store.contains(&allowlist));
    }

    #[tokio::test(start_paused = true)]
    async fn cluster_network_status_is_published() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_typed(&ClusterNetwork::new("cluster", ClusterNetworkSpec::default()))
            .unwrap();
        let object = seed(&store, sdn_spec());
        let context = Arc::new(context(store.clone(), manager(&store)));

        reconcile_network(object, context).await.unwrap();

        let status = store
            .typed::<ClusterNetwork>(None, "cluster")
            .and_then(|cluster| cluster.status)
            .unwrap();
        assert_eq!(status.network_type, "OpenShiftSDN");
        assert_eq!(status.cluster_network_mtu, Some(1450));
        let cluster = store.typed::<ClusterNetwork>(None, "cluster").unwrap();
        assert!(cluster.metadata.owner_references.is_none());
    }
}
