use async_trait::async_trait;
use kube::{
    api::{ApiResource, DeleteParams, DynamicObject, ListParams, PostParams},
    core::{ErrorResponse, TypeMeta},
    Api, Client,
};
use log::debug;

use crate::FIELD_MANAGER;

use super::{ListQuery, ObjectIdentity, ObjectStore, StoreError};

/// [`ObjectStore`] backed by the Kubernetes API, every kind is addressed dynamically.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        let identity = ObjectIdentity::new(api_version, kind, None, "");
        let resource = ApiResource::from_gvk(&identity.gvk());

        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn api_for(&self, identity: &ObjectIdentity) -> Api<DynamicObject> {
        self.api(
            &identity.api_version,
            &identity.kind,
            identity.namespace.as_deref(),
        )
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_owned()),
        ..Default::default()
    }
}

fn map_error(error: kube::Error, identity: &ObjectIdentity) -> StoreError {
    match error {
        kube::Error::Api(ErrorResponse { code: 404, .. }) => {
            StoreError::NotFound(identity.to_owned())
        }
        error => StoreError::Api(error),
    }
}

// list items and some responses come back without their type information
fn with_types(mut object: DynamicObject, api_version: &str, kind: &str) -> DynamicObject {
    if object.types.is_none() {
        object.types = Some(TypeMeta {
            api_version: api_version.to_owned(),
            kind: kind.to_owned(),
        });
    }

    object
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, identity: &ObjectIdentity) -> Result<DynamicObject, StoreError> {
        let object = self
            .api_for(identity)
            .get(&identity.name)
            .await
            .map_err(|error| map_error(error, identity))?;

        Ok(with_types(object, &identity.api_version, &identity.kind))
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let identity = ObjectIdentity::from_object(object)?;

        debug!("Creating {identity}...");

        let created = self
            .api_for(&identity)
            .create(&post_params(), object)
            .await
            .map_err(|error| map_error(error, &identity))?;

        Ok(with_types(created, &identity.api_version, &identity.kind))
    }

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let identity = ObjectIdentity::from_object(object)?;

        debug!("Updating {identity}...");

        let updated = self
            .api_for(&identity)
            .replace(&identity.name, &post_params(), object)
            .await
            .map_err(|error| map_error(error, &identity))?;

        Ok(with_types(updated, &identity.api_version, &identity.kind))
    }

    async fn update_subresource(
        &self,
        subresource: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let identity = ObjectIdentity::from_object(object)?;
        let body = serde_json::to_vec(object).map_err(StoreError::Conversion)?;

        debug!("Updating {subresource} of {identity}...");

        let updated = self
            .api_for(&identity)
            .replace_subresource(subresource, &identity.name, &post_params(), body)
            .await
            .map_err(|error| map_error(error, &identity))?;

        Ok(with_types(updated, &identity.api_version, &identity.kind))
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<DynamicObject>, StoreError> {
        let api = self.api(&query.api_version, &query.kind, query.namespace.as_deref());
        let params = match &query.label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };

        let list = api.list(&params).await.map_err(StoreError::Api)?;

        Ok(list
            .items
            .into_iter()
            .map(|object| with_types(object, &query.api_version, &query.kind))
            .collect())
    }

    async fn delete(&self, identity: &ObjectIdentity) -> Result<(), StoreError> {
        debug!("Deleting {identity}...");

        self.api_for(identity)
            .delete(&identity.name, &DeleteParams::default())
            .await
            .map_err(|error| map_error(error, identity))?;

        Ok(())
    }
}
