use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use k8s_openapi::serde::{de::DeserializeOwned, Serialize};
use kube::{api::DynamicObject, core::ErrorResponse, Resource};
use serde_json::Value;

use super::{to_dynamic, to_typed, ListQuery, ObjectIdentity, ObjectStore, StoreError};

/// In-process [`ObjectStore`] used by tests, it keeps whole objects keyed by identity
/// and hands out uids and resource versions the way an apiserver would.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<ObjectIdentity, DynamicObject>,
    failing: BTreeSet<ObjectIdentity>,
    next_uid: u64,
    next_version: u64,
    writes: usize,
}

impl MemoryState {
    fn stamp_version(&mut self, object: &mut DynamicObject) {
        self.next_version += 1;
        object.metadata.resource_version = Some(self.next_version.to_string());
    }

    fn stamp_uid(&mut self, object: &mut DynamicObject) {
        if object.metadata.uid.is_none() {
            self.next_uid += 1;
            object.metadata.uid = Some(format!("uid-{}", self.next_uid));
        }
    }

    fn check_writable(&self, identity: &ObjectIdentity) -> Result<(), StoreError> {
        if self.failing.contains(identity) {
            return Err(api_error(500, "InternalError", "injected failure"));
        }

        Ok(())
    }
}

fn api_error(code: u16, reason: &str, message: &str) -> StoreError {
    StoreError::Api(kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message: message.to_owned(),
        reason: reason.to_owned(),
        code,
    }))
}

fn matches_selector(object: &DynamicObject, selector: &str) -> bool {
    let labels = object.metadata.labels.clone().unwrap_or_default();

    selector
        .split(',')
        .map(str::trim)
        .filter(|requirement| !requirement.is_empty())
        .all(|requirement| match requirement.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(requirement),
        })
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seeds an object as if some other actor had created it.
    pub fn insert(&self, mut object: DynamicObject) -> Result<DynamicObject, StoreError> {
        let identity = ObjectIdentity::from_object(&object)?;
        let mut state = self.lock();

        state.stamp_uid(&mut object);
        state.stamp_version(&mut object);
        state.objects.insert(identity, object.clone());

        Ok(object)
    }

    pub fn insert_typed<K>(&self, resource: &K) -> Result<DynamicObject, StoreError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        self.insert(to_dynamic(resource)?)
    }

    pub fn object(&self, identity: &ObjectIdentity) -> Option<DynamicObject> {
        self.lock().objects.get(identity).cloned()
    }

    pub fn typed<K>(&self, namespace: Option<&str>, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.object(&ObjectIdentity::of::<K>(namespace, name))
            .and_then(|object| to_typed(&object).ok())
    }

    pub fn contains(&self, identity: &ObjectIdentity) -> bool {
        self.lock().objects.contains_key(identity)
    }

    /// Number of successful create, update, sub-resource and delete calls so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Makes every write against `identity` fail with an internal server error.
    pub fn fail_writes_for(&self, identity: ObjectIdentity) {
        self.lock().failing.insert(identity);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, identity: &ObjectIdentity) -> Result<DynamicObject, StoreError> {
        self.object(identity)
            .ok_or_else(|| StoreError::NotFound(identity.to_owned()))
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let identity = ObjectIdentity::from_object(object)?;
        let mut state = self.lock();

        state.check_writable(&identity)?;
        if state.objects.contains_key(&identity) {
            return Err(api_error(409, "AlreadyExists", "object already exists"));
        }

        let mut created = object.to_owned();
        created.metadata.uid = None;
        state.stamp_uid(&mut created);
        state.stamp_version(&mut created);
        state.objects.insert(identity, created.clone());
        state.writes += 1;

        Ok(created)
    }

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let identity = ObjectIdentity::from_object(object)?;
        let mut state = self.lock();

        state.check_writable(&identity)?;
        let uid = state
            .objects
            .get(&identity)
            .ok_or_else(|| StoreError::NotFound(identity.clone()))?
            .metadata
            .uid
            .clone();

        let mut updated = object.to_owned();
        updated.metadata.uid = uid;
        state.stamp_version(&mut updated);
        state.objects.insert(identity, updated.clone());
        state.writes += 1;

        Ok(updated)
    }

    async fn update_subresource(
        &self,
        subresource: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let identity = ObjectIdentity::from_object(object)?;
        let mut state = self.lock();

        state.check_writable(&identity)?;
        let mut stored = state
            .objects
            .get(&identity)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(identity.clone()))?;

        match subresource {
            "status" => {
                stored.data["status"] = object.data.get("status").cloned().unwrap_or(Value::Null);
            }
            "finalize" => {
                let finalizers = object
                    .data
                    .pointer("/spec/finalizers")
                    .cloned()
                    .unwrap_or(Value::Array(vec![]));
                stored.data["spec"]["finalizers"] = finalizers;
            }
            other => {
                return Err(StoreError::InvalidObject(
                    format!("unsupported sub-resource '{other}'").into(),
                ))
            }
        }

        state.stamp_version(&mut stored);
        state.objects.insert(identity, stored.clone());
        state.writes += 1;

        Ok(stored)
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<DynamicObject>, StoreError> {
        let state = self.lock();

        Ok(state
            .objects
            .iter()
            .filter(|(identity, _)| {
                identity.api_version == query.api_version
                    && identity.kind == query.kind
                    && (query.namespace.is_none() || identity.namespace == query.namespace)
            })
            .filter(|(_, object)| match &query.label_selector {
                Some(selector) => matches_selector(object, selector),
                None => true,
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn delete(&self, identity: &ObjectIdentity) -> Result<(), StoreError> {
        let mut state = self.lock();

        state.check_writable(identity)?;
        state
            .objects
            .remove(identity)
            .ok_or_else(|| StoreError::NotFound(identity.clone()))?;
        state.writes += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{ConfigMap, Pod};
    use kube::core::ObjectMeta;

    use crate::kubernetes::{to_dynamic, ListQuery, ObjectIdentity, ObjectStore, StoreError};

    use super::MemoryStore;

    fn pod(name: &str, app: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("netop".to_owned()),
                labels: Some(BTreeMap::from([("app".to_owned(), app.to_owned())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn created_objects_get_a_uid_and_conflict_on_recreate() {
        let store = MemoryStore::new();
        let config = to_dynamic(&ConfigMap {
            metadata: ObjectMeta {
                name: Some("applied-cluster".to_owned()),
                namespace: Some("netop".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

        let created = store.create(&config).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(matches!(
            store.create(&config).await,
            Err(StoreError::Api(_))
        ));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_namespace_and_labels() {
        let store = MemoryStore::new();
        store.insert_typed(&pod("multus-a", "multus")).unwrap();
        store.insert_typed(&pod("multus-b", "multus")).unwrap();
        store.insert_typed(&pod("sdn-a", "sdn")).unwrap();

        let multus = store
            .list(&ListQuery::of::<Pod>().in_namespace("netop").with_labels("app=multus"))
            .await
            .unwrap();
        let elsewhere = store
            .list(&ListQuery::of::<Pod>().in_namespace("default"))
            .await
            .unwrap();

        assert_eq!(multus.len(), 2);
        assert!(elsewhere.is_empty());
    }

    #[tokio::test]
    async fn injected_failures_only_hit_writes() {
        let store = MemoryStore::new();
        store.insert_typed(&pod("multus-a", "multus")).unwrap();
        let identity = ObjectIdentity::of::<Pod>(Some("netop"), "multus-a");
        store.fail_writes_for(identity.clone());

        assert!(store.get(&identity).await.is_ok());
        assert!(store.delete(&identity).await.is_err());
    }
}
