use std::{
    collections::BTreeMap,
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use k8s_openapi::{
    api::apps::v1::{DaemonSet, Deployment},
    chrono::Utc,
};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    kubernetes::{cancellable, to_dynamic, try_get_typed, ObjectStore, StoreError},
    resources::crd::v1::network::{Network, OperatorCondition},
};

pub use crate::resources::crd::v1::network::RelatedObject;

pub const CONDITION_DEGRADED: &str = "Degraded";
pub const CONDITION_PROGRESSING: &str = "Progressing";
pub const CONDITION_AVAILABLE: &str = "Available";

/// Part of the operator that raises or clears its own degraded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusComponent {
    OperatorConfig,
    PodDeployment,
    AllowlistConfig,
}

impl Display for StatusComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatusComponent::OperatorConfig => "OperatorConfig",
            StatusComponent::PodDeployment => "PodDeployment",
            StatusComponent::AllowlistConfig => "AllowlistConfig",
        };

        f.write_str(name)
    }
}

/// Namespace and name of a rendered DaemonSet or Deployment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkloadReference {
    pub namespace: String,
    pub name: String,
}

impl WorkloadReference {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl Display for WorkloadReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn set_degraded(&self, component: StatusComponent, reason: &str, message: &str);
    async fn set_not_degraded(&self, component: StatusComponent);
    fn set_daemon_sets(&self, daemon_sets: Vec<WorkloadReference>);
    fn set_deployments(&self, deployments: Vec<WorkloadReference>);
    fn set_related_objects(&self, related_objects: Vec<RelatedObject>);
    async fn refresh_from_pods(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    reason: String,
    message: String,
}

#[derive(Debug, Default)]
struct StatusState {
    failures: BTreeMap<StatusComponent, Failure>,
    daemon_sets: Vec<WorkloadReference>,
    deployments: Vec<WorkloadReference>,
    related_objects: Vec<RelatedObject>,
    progressing: Vec<String>,
    unavailable: Vec<String>,
}

fn condition(type_: &str, status: bool, reason: Option<&str>, message: Option<String>) -> OperatorCondition {
    OperatorCondition {
        type_: type_.to_owned(),
        status: if status { "True" } else { "False" }.to_owned(),
        reason: reason.map(str::to_owned),
        message,
        last_transition_time: None,
    }
}

impl StatusState {
    fn conditions(&self) -> Vec<OperatorCondition> {
        let degraded = match self.failures.values().next() {
            Some(first) => condition(
                CONDITION_DEGRADED,
                true,
                Some(&first.reason),
                Some(
                    self.failures
                        .values()
                        .map(|failure| failure.message.as_str())
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
            ),
            None => condition(CONDITION_DEGRADED, false, None, None),
        };

        let progressing = match self.progressing.is_empty() {
            true => condition(CONDITION_PROGRESSING, false, None, None),
            false => condition(
                CONDITION_PROGRESSING,
                true,
                Some("Deploying"),
                Some(self.progressing.join("\n")),
            ),
        };

        let available = match self.unavailable.is_empty() {
            true => condition(CONDITION_AVAILABLE, true, None, None),
            false => condition(
                CONDITION_AVAILABLE,
                false,
                Some("Startup"),
                Some(self.unavailable.join("\n")),
            ),
        };

        vec![degraded, progressing, available]
    }

    fn is_settled(&self) -> bool {
        self.failures.is_empty() && self.progressing.is_empty() && self.unavailable.is_empty()
    }
}

/// Keeps transition times of conditions whose status didn't flip.
fn merge_conditions(
    previous: &[OperatorCondition],
    next: Vec<OperatorCondition>,
    now: &str,
) -> Vec<OperatorCondition> {
    next.into_iter()
        .map(|mut condition| {
            let transitioned_at = previous
                .iter()
                .find(|old| old.type_ == condition.type_ && old.status == condition.status)
                .and_then(|old| old.last_transition_time.clone());

            condition.last_transition_time = transitioned_at.or_else(|| Some(now.to_owned()));
            condition
        })
        .collect()
}

#[derive(Debug, Default)]
struct Rollout {
    progressing: Vec<String>,
    unavailable: Vec<String>,
}

impl Rollout {
    fn daemon_set(&mut self, reference: &WorkloadReference, daemon_set: Option<DaemonSet>) {
        let Some(daemon_set) = daemon_set else {
            self.progressing
                .push(format!("DaemonSet \"{reference}\" is not yet scheduled"));
            self.unavailable
                .push(format!("DaemonSet \"{reference}\" is not yet scheduled"));
            return;
        };
        let Some(status) = daemon_set.status else {
            self.progressing
                .push(format!("DaemonSet \"{reference}\" is waiting for status"));
            return;
        };

        let generation = daemon_set.metadata.generation.unwrap_or_default();
        if status.observed_generation.unwrap_or_default() < generation {
            self.progressing
                .push(format!("DaemonSet \"{reference}\" update is being processed"));
        }

        let unavailable = status.number_unavailable.unwrap_or_default();
        if unavailable > 0 {
            self.progressing.push(format!(
                "DaemonSet \"{reference}\" is not available (awaiting {unavailable} nodes)"
            ));
            if status.number_available.unwrap_or_default() == 0 {
                self.unavailable
                    .push(format!("DaemonSet \"{reference}\" has no available pods"));
            }
        } else if status.updated_number_scheduled.unwrap_or_default()
            < status.desired_number_scheduled
        {
            self.progressing.push(format!(
                "DaemonSet \"{reference}\" is rolling out ({} out of {} updated)",
                status.updated_number_scheduled.unwrap_or_default(),
                status.desired_number_scheduled
            ));
        }
    }

    fn deployment(&mut self, reference: &WorkloadReference, deployment: Option<Deployment>) {
        let Some(deployment) = deployment else {
            self.progressing
                .push(format!("Deployment \"{reference}\" is not yet scheduled"));
            self.unavailable
                .push(format!("Deployment \"{reference}\" is not yet scheduled"));
            return;
        };
        let status = deployment.status.unwrap_or_default();

        let unavailable = status.unavailable_replicas.unwrap_or_default();
        if unavailable > 0 {
            self.progressing.push(format!(
                "Deployment \"{reference}\" is not available (awaiting {unavailable} replicas)"
            ));
            if status.available_replicas.unwrap_or_default() == 0 {
                self.unavailable
                    .push(format!("Deployment \"{reference}\" has no available pods"));
            }
        }
    }
}

/// Aggregates health signals of every control loop and publishes them as conditions of
/// the operator config's status.
pub struct StatusManager {
    store: Arc<dyn ObjectStore>,
    cancel: CancellationToken,
    config_name: String,
    version: String,
    state: Mutex<StatusState>,
}

impl StatusManager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cancel: CancellationToken,
        config_name: &str,
        version: &str,
    ) -> Self {
        Self {
            store,
            cancel,
            config_name: config_name.to_owned(),
            version: version.to_owned(),
            state: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn publish(&self) {
        let (conditions, related_objects, settled) = {
            let state = self.lock();
            (
                state.conditions(),
                state.related_objects.clone(),
                state.is_settled(),
            )
        };

        if let Err(error) = self
            .write_status(conditions, related_objects, settled)
            .await
        {
            warn!("Couldn't publish operator status! Reason: {error}");
        }
    }

    async fn write_status(
        &self,
        conditions: Vec<OperatorCondition>,
        related_objects: Vec<RelatedObject>,
        settled: bool,
    ) -> Result<(), StoreError> {
        let store = self.store.as_ref();
        let Some(mut network) =
            try_get_typed::<Network>(store, None, &self.config_name, &self.cancel).await?
        else {
            debug!("Operator config '{}' is gone, not publishing status", self.config_name);
            return Ok(());
        };

        let mut status = network.status.clone().unwrap_or_default();
        status.conditions = merge_conditions(
            &status.conditions,
            conditions,
            &Utc::now().to_rfc3339(),
        );
        status.related_objects = related_objects;
        if settled {
            status.version = Some(self.version.clone());
        }

        if network.status.as_ref() == Some(&status) {
            return Ok(());
        }

        network.status = Some(status);
        cancellable(
            &self.cancel,
            store.update_subresource("status", &to_dynamic(&network)?),
        )
        .await?;

        Ok(())
    }

    async fn collect_rollout(&self) -> Result<Rollout, StoreError> {
        let (daemon_sets, deployments) = {
            let state = self.lock();
            (state.daemon_sets.clone(), state.deployments.clone())
        };
        let store = self.store.as_ref();
        let mut rollout = Rollout::default();

        for reference in &daemon_sets {
            let daemon_set = try_get_typed::<DaemonSet>(
                store,
                Some(&reference.namespace),
                &reference.name,
                &self.cancel,
            )
            .await?;
            rollout.daemon_set(reference, daemon_set);
        }

        for reference in &deployments {
            let deployment = try_get_typed::<Deployment>(
                store,
                Some(&reference.namespace),
                &reference.name,
                &self.cancel,
            )
            .await?;
            rollout.deployment(reference, deployment);
        }

        Ok(rollout)
    }
}

#[async_trait]
impl StatusReporter for StatusManager {
    async fn set_degraded(&self, component: StatusComponent, reason: &str, message: &str) {
        info!("{component} is degraded ({reason}): {message}");

        let failure = Failure {
            reason: reason.to_owned(),
            message: message.to_owned(),
        };
        self.lock().failures.insert(component, failure);
        self.publish().await;
    }

    async fn set_not_degraded(&self, component: StatusComponent) {
        if self.lock().failures.remove(&component).is_some() {
            info!("{component} is no longer degraded");
        }
        self.publish().await;
    }

    fn set_daemon_sets(&self, daemon_sets: Vec<WorkloadReference>) {
        self.lock().daemon_sets = daemon_sets;
    }

    fn set_deployments(&self, deployments: Vec<WorkloadReference>) {
        self.lock().deployments = deployments;
    }

    fn set_related_objects(&self, related_objects: Vec<RelatedObject>) {
        self.lock().related_objects = related_objects;
    }

    async fn refresh_from_pods(&self) {
        match self.collect_rollout().await {
            Ok(rollout) => {
                let mut state = self.lock();
                state.progressing = rollout.progressing;
                state.unavailable = rollout.unavailable;
            }
            Err(error) => {
                warn!("Couldn't read workload status! Reason: {error}");
                return;
            }
        }

        self.publish().await;
    }
}
