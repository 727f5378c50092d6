use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Service, ServiceAccount},
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::api::DynamicObject;
use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    kubernetes::{cancellable, try_get, ObjectIdentity, ObjectStore, StoreError},
    resources::{ObjectRole, RenderedObject},
};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Rendered object is invalid! Reason: {}", .0)]
    InvalidObject(#[source] StoreError),
    #[error("Couldn't apply {}! Reason: {}", .identity, .source)]
    Failed {
        identity: ObjectIdentity,
        source: StoreError,
    },
}

impl ApplyError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ApplyError::Failed {
                source: StoreError::Cancelled,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Applies `objects` strictly in order.
///
/// Resource objects get `owner` as their controller reference. A failing object carrying
/// the ignore-errors annotation is logged and skipped, any other failure stops the run.
pub async fn apply_all(
    store: &dyn ObjectStore,
    objects: &[RenderedObject],
    owner: Option<&OwnerReference>,
    cancel: &CancellationToken,
) -> Result<(), ApplyError> {
    for rendered in objects {
        let identity = rendered.identity().map_err(ApplyError::InvalidObject)?;
        let mut object = rendered.object.clone();

        if let (ObjectRole::Resource, Some(owner)) = (rendered.role, owner) {
            set_controller_reference(&mut object, owner);
        }

        match apply_object(store, &object, rendered.role, cancel).await {
            Ok(outcome) => debug!("{identity}: {outcome:?}"),
            Err(StoreError::Cancelled) => {
                return Err(ApplyError::Failed {
                    identity,
                    source: StoreError::Cancelled,
                })
            }
            Err(error) if rendered.ignores_errors() => {
                warn!("Couldn't apply {identity}, object has ignore-errors annotation set, continuing... Reason: {error}");
            }
            Err(error) => {
                return Err(ApplyError::Failed {
                    identity,
                    source: error,
                })
            }
        }
    }

    Ok(())
}

/// Creates or updates a single object, skipping the write when the live object already
/// matches. `Status` objects are only ever written through the status sub-resource.
pub async fn apply_object(
    store: &dyn ObjectStore,
    object: &DynamicObject,
    role: ObjectRole,
    cancel: &CancellationToken,
) -> Result<ApplyOutcome, StoreError> {
    let identity = ObjectIdentity::from_object(object)?;
    let live = try_get(store, &identity, cancel).await?;

    match (live, role) {
        (None, ObjectRole::Status) => Err(StoreError::NotFound(identity)),
        (None, ObjectRole::Resource) => {
            info!("Creating {identity}...");
            cancellable(cancel, store.create(object)).await?;
            Ok(ApplyOutcome::Created)
        }
        (Some(live), ObjectRole::Status) => {
            let desired = object.data.get("status").cloned().unwrap_or(Value::Null);
            let current = live.data.get("status").cloned().unwrap_or(Value::Null);

            if is_subset(&desired, &current) {
                return Ok(ApplyOutcome::Unchanged);
            }

            let mut merged = live;
            merged.data["status"] = desired;
            info!("Updating status of {identity}...");
            cancellable(cancel, store.update_subresource("status", &merged)).await?;
            Ok(ApplyOutcome::Updated)
        }
        (Some(live), ObjectRole::Resource) => {
            if is_up_to_date(&live, object) {
                return Ok(ApplyOutcome::Unchanged);
            }

            let merged = merge_object(&live, object, &identity);
            info!("Updating {identity}...");
            cancellable(cancel, store.update(&merged)).await?;
            Ok(ApplyOutcome::Updated)
        }
    }
}

/// Replaces any existing controller reference with `owner`, other owners are kept.
pub fn set_controller_reference(object: &mut DynamicObject, owner: &OwnerReference) {
    let mut owner = owner.clone();
    owner.controller = Some(true);

    let references = object.metadata.owner_references.get_or_insert_with(Vec::new);
    references.retain(|reference| reference.controller != Some(true) && reference.uid != owner.uid);
    references.push(owner);
}

/// True when every field of `desired` is present with the same value in `live`. Fields
/// defaulted by the server are therefore not treated as drift.
fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Null, _) => true,
        (Value::Object(desired), Value::Object(live)) => desired.iter().all(|(key, value)| {
            value.is_null() || live.get(key).map_or(false, |live| is_subset(value, live))
        }),
        (Value::Array(desired), Value::Array(live)) => {
            desired.len() == live.len()
                && desired
                    .iter()
                    .zip(live.iter())
                    .all(|(desired, live)| is_subset(desired, live))
        }
        (desired, live) => desired == live,
    }
}

fn map_contains(desired: &Option<BTreeMap<String, String>>, live: &Option<BTreeMap<String, String>>) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    let live = live.as_ref();

    desired
        .iter()
        .all(|(key, value)| live.and_then(|live| live.get(key)) == Some(value))
}

fn without_status(object: &DynamicObject) -> Value {
    let mut data = object.data.clone();
    if let Value::Object(fields) = &mut data {
        fields.remove("status");
    }
    data
}

fn is_up_to_date(live: &DynamicObject, desired: &DynamicObject) -> bool {
    let owners_present = desired
        .metadata
        .owner_references
        .iter()
        .flatten()
        .all(|owner| {
            live.metadata
                .owner_references
                .iter()
                .flatten()
                .any(|live_owner| live_owner == owner)
        });

    owners_present
        && map_contains(&desired.metadata.labels, &live.metadata.labels)
        && map_contains(&desired.metadata.annotations, &live.metadata.annotations)
        && is_subset(&without_status(desired), &without_status(live))
}

fn merge_maps(
    live: &Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    match (live, desired) {
        (None, None) => None,
        _ => {
            let mut merged = live.clone().unwrap_or_default();
            merged.extend(desired.clone().unwrap_or_default());
            Some(merged)
        }
    }
}

fn merge_owner_references(
    live: &Option<Vec<OwnerReference>>,
    desired: &Option<Vec<OwnerReference>>,
) -> Option<Vec<OwnerReference>> {
    let Some(desired) = desired else {
        return live.clone();
    };
    let desired_has_controller = desired.iter().any(|owner| owner.controller == Some(true));

    let mut merged = live
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|owner| !desired.iter().any(|desired| desired.uid == owner.uid))
        .filter(|owner| !(desired_has_controller && owner.controller == Some(true)))
        .collect::<Vec<_>>();
    merged.extend(desired.iter().cloned());

    Some(merged)
}

/// Rendered object on top of the live one: rendered labels, annotations and owners win,
/// the live object keeps its server assigned metadata, status and a few allocated fields.
fn merge_object(live: &DynamicObject, desired: &DynamicObject, identity: &ObjectIdentity) -> DynamicObject {
    let mut merged = desired.clone();

    merged.metadata = live.metadata.clone();
    merged.metadata.labels = merge_maps(&live.metadata.labels, &desired.metadata.labels);
    merged.metadata.annotations =
        merge_maps(&live.metadata.annotations, &desired.metadata.annotations);
    merged.metadata.owner_references = merge_owner_references(
        &live.metadata.owner_references,
        &desired.metadata.owner_references,
    );

    if let Some(status) = live.data.get("status") {
        merged.data["status"] = status.clone();
    }

    if identity.is::<Service>() {
        for field in ["clusterIP", "clusterIPs"] {
            let pointer = format!("/spec/{field}");
            if let (None, Some(allocated)) =
                (desired.data.pointer(&pointer), live.data.pointer(&pointer))
            {
                merged.data["spec"][field] = allocated.clone();
            }
        }
    }

    if identity.is::<ServiceAccount>() && desired.data.get("secrets").is_none() {
        if let Some(secrets) = live.data.get("secrets") {
            merged.data["secrets"] = secrets.clone();
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::{
        api::core::v1::{ConfigMap, Service, ServiceSpec},
        apimachinery::pkg::apis::meta::v1::OwnerReference,
    };
    use kube::core::ObjectMeta;
    use tokio_util::sync::CancellationToken;

    use crate::{
        kubernetes::{memory::MemoryStore, ObjectIdentity},
        resources::{annotations::get_ignore_errors_annotations, RenderedObject},
    };

    use super::{apply_all, ApplyError};

    fn config_map(name: &str, value: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("netop".to_owned()),
                labels: Some(BTreeMap::from([("app".to_owned(), name.to_owned())])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("value".to_owned(), value.to_owned())])),
            ..Default::default()
        }
    }

    fn rendered(name: &str, value: &str) -> RenderedObject {
        RenderedObject::from_resource(&config_map(name, value)).unwrap()
    }

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "operator.netop.dev/v1".to_owned(),
            kind: "Network".to_owned(),
            name: "cluster".to_owned(),
            uid: "network-uid".to_owned(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[tokio::test]
    async fn second_apply_writes_nothing() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let objects = vec![rendered("first", "1"), rendered("second", "2")];

        apply_all(&store, &objects, Some(&owner()), &cancel).await.unwrap();
        let writes = store.write_count();
        apply_all(&store, &objects, Some(&owner()), &cancel).await.unwrap();

        assert_eq!(writes, 2);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn changed_data_is_updated_and_foreign_labels_survive() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let mut live = config_map("first", "1");
        live.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert("team".to_owned(), "network".to_owned());
        store.insert_typed(&live).unwrap();

        apply_all(&store, &[rendered("first", "2")], None, &cancel)
            .await
            .unwrap();

        let stored = store.typed::<ConfigMap>(Some("netop"), "first").unwrap();
        assert_eq!(stored.data.unwrap()["value"], "2");
        assert_eq!(stored.metadata.labels.unwrap()["team"], "network");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn resources_are_owned_by_the_operator_config() {
        let store = MemoryStore::new();

        apply_all(
            &store,
            &[rendered("first", "1")],
            Some(&owner()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let stored = store.typed::<ConfigMap>(Some("netop"), "first").unwrap();
        let owners = stored.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "network-uid");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[tokio::test]
    async fn ignored_failures_do_not_stop_the_run() {
        let store = MemoryStore::new();
        store.fail_writes_for(ObjectIdentity::of::<ConfigMap>(Some("netop"), "flaky"));
        let objects = vec![
            rendered("flaky", "1").with_annotations(get_ignore_errors_annotations()),
            rendered("after", "2"),
        ];

        apply_all(&store, &objects, None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(store.typed::<ConfigMap>(Some("netop"), "after").is_some());
    }

    #[tokio::test]
    async fn other_failures_abort_and_name_the_object() {
        let store = MemoryStore::new();
        let flaky = ObjectIdentity::of::<ConfigMap>(Some("netop"), "flaky");
        store.fail_writes_for(flaky.clone());
        let objects = vec![rendered("flaky", "1"), rendered("after", "2")];

        let result = apply_all(&store, &objects, None, &CancellationToken::new()).await;

        match result {
            Err(ApplyError::Failed { identity, .. }) => assert_eq!(identity, flaky),
            other => panic!("expected the apply to fail, got {other:?}"),
        }
        assert!(store.typed::<ConfigMap>(Some("netop"), "after").is_none());
    }

    #[tokio::test]
    async fn allocated_cluster_ip_is_kept() {
        let store = MemoryStore::new();
        let service = |cluster_ip: Option<&str>| Service {
            metadata: ObjectMeta {
                name: Some("multus-admission-controller".to_owned()),
                namespace: Some("netop-multus".to_owned()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: cluster_ip.map(str::to_owned),
                type_: Some("ClusterIP".to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.insert_typed(&service(Some("172.30.0.10"))).unwrap();

        apply_all(
            &store,
            &[RenderedObject::from_resource(&service(None)).unwrap()],
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let stored = store
            .typed::<Service>(Some("netop-multus"), "multus-admission-controller")
            .unwrap();
        assert_eq!(stored.spec.unwrap().cluster_ip.as_deref(), Some("172.30.0.10"));
    }

    #[tokio::test]
    async fn cancellation_is_never_ignored() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let objects = vec![rendered("first", "1").with_annotations(get_ignore_errors_annotations())];

        let result = apply_all(&store, &objects, None, &cancel).await;

        assert!(result.unwrap_err().is_cancelled());
    }
}
