use std::{borrow::Cow, fmt::Display, future::Future};

use async_trait::async_trait;
use k8s_openapi::serde::{de::DeserializeOwned, Serialize};
use kube::{
    api::DynamicObject,
    core::{GroupVersionKind, TypeMeta},
    Resource,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod operations;
pub mod store;

/// apiVersion/kind/namespace/name, the identity every rendered or live object is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentity {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectIdentity {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.map(|namespace| namespace.to_owned()),
            name: name.into(),
        }
    }

    pub fn of<K: Resource<DynamicType = ()>>(namespace: Option<&str>, name: &str) -> Self {
        Self::new(K::api_version(&()), K::kind(&()), namespace, name)
    }

    pub fn from_object(object: &DynamicObject) -> Result<Self, StoreError> {
        let types = object
            .types
            .as_ref()
            .ok_or(StoreError::InvalidObject("object is missing apiVersion/kind".into()))?;
        let name = object
            .metadata
            .name
            .as_ref()
            .ok_or(StoreError::InvalidObject("object is missing a name".into()))?;

        Ok(Self::new(
            &types.api_version,
            &types.kind,
            object.metadata.namespace.as_deref(),
            name,
        ))
    }

    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn version(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((_, version)) => version,
            None => &self.api_version,
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(self.group(), self.version(), &self.kind)
    }

    pub fn is<K: Resource<DynamicType = ()>>(&self) -> bool {
        self.api_version == K::api_version(&()) && self.kind == K::kind(&())
    }
}

impl Display for ObjectIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(
                f,
                "({}, Kind={}) {}/{}",
                self.api_version, self.kind, namespace, self.name
            ),
            None => write!(f, "({}, Kind={}) {}", self.api_version, self.kind, self.name),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{} doesn't exist!", .0)]
    NotFound(ObjectIdentity),
    #[error("Kubernetes API call failed! Reason: {}", .0)]
    Api(#[source] kube::Error),
    #[error("Couldn't convert the object! Reason: {}", .0)]
    Conversion(#[source] serde_json::Error),
    #[error("Object is invalid ({})!", .0)]
    InvalidObject(Cow<'static, str>),
    #[error("Operation was cancelled!")]
    Cancelled,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

impl ListQuery {
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            namespace: None,
            label_selector: None,
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_owned());
        self
    }

    pub fn with_labels(mut self, selector: &str) -> Self {
        self.label_selector = Some(selector.to_owned());
        self
    }
}

/// The narrow slice of the object store the reconcilers depend on.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fails with [`StoreError::NotFound`] when the object doesn't exist.
    async fn get(&self, identity: &ObjectIdentity) -> Result<DynamicObject, StoreError>;
    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;
    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;
    /// Writes `object` through one of its sub-resources, `status` or `finalize`.
    async fn update_subresource(
        &self,
        subresource: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;
    async fn list(&self, query: &ListQuery) -> Result<Vec<DynamicObject>, StoreError>;
    async fn delete(&self, identity: &ObjectIdentity) -> Result<(), StoreError>;
}

pub fn to_typed<K: DeserializeOwned>(object: &DynamicObject) -> Result<K, StoreError> {
    let value = serde_json::to_value(object).map_err(StoreError::Conversion)?;

    serde_json::from_value(value).map_err(StoreError::Conversion)
}

pub fn to_dynamic<K>(resource: &K) -> Result<DynamicObject, StoreError>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let value = serde_json::to_value(resource).map_err(StoreError::Conversion)?;
    let mut object: DynamicObject =
        serde_json::from_value(value).map_err(StoreError::Conversion)?;

    object.types = Some(TypeMeta {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
    });

    Ok(object)
}

/// Races `future` against the shutdown token, the token wins ties.
pub async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        result = future => result,
    }
}

pub async fn try_get(
    store: &dyn ObjectStore,
    identity: &ObjectIdentity,
    cancel: &CancellationToken,
) -> Result<Option<DynamicObject>, StoreError> {
    match cancellable(cancel, store.get(identity)).await {
        Ok(object) => Ok(Some(object)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(error) => Err(error),
    }
}

pub async fn try_get_typed<K>(
    store: &dyn ObjectStore,
    namespace: Option<&str>,
    name: &str,
    cancel: &CancellationToken,
) -> Result<Option<K>, StoreError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let identity = ObjectIdentity::of::<K>(namespace, name);

    try_get(store, &identity, cancel)
        .await?
        .map(|object| to_typed(&object))
        .transpose()
}

pub async fn list_typed<K>(
    store: &dyn ObjectStore,
    query: &ListQuery,
    cancel: &CancellationToken,
) -> Result<Vec<K>, StoreError>
where
    K: DeserializeOwned,
{
    cancellable(cancel, store.list(query))
        .await?
        .iter()
        .map(to_typed)
        .collect()
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::Namespace};
    use kube::core::ObjectMeta;
    use tokio_util::sync::CancellationToken;

    use super::{cancellable, to_dynamic, to_typed, ObjectIdentity, StoreError};

    #[test]
    fn identity_splits_group_and_version() {
        let apps = ObjectIdentity::of::<DaemonSet>(Some("netop-multus"), "multus");
        let core = ObjectIdentity::of::<Namespace>(None, "netop-multus");

        assert_eq!(apps.group(), "apps");
        assert_eq!(apps.version(), "v1");
        assert_eq!(core.group(), "");
        assert_eq!(core.version(), "v1");
        assert_eq!(
            apps.to_string(),
            "(apps/v1, Kind=DaemonSet) netop-multus/multus"
        );
        assert_eq!(core.to_string(), "(v1, Kind=Namespace) netop-multus");
    }

    #[test]
    fn typed_objects_survive_the_dynamic_boundary() {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some("netop-multus".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        };

        let dynamic = to_dynamic(&namespace).unwrap();
        let identity = ObjectIdentity::from_object(&dynamic).unwrap();
        let typed: Namespace = to_typed(&dynamic).unwrap();

        assert!(identity.is::<Namespace>());
        assert_eq!(typed.metadata.name.as_deref(), Some("netop-multus"));
    }

    #[tokio::test]
    async fn cancelled_token_wins_over_ready_future() {
        let token = CancellationToken::new();
        token.cancel();

        let result = cancellable(&token, async { Ok::<_, StoreError>(()) }).await;

        assert!(matches!(result, Err(StoreError::Cancelled)));
    }
}
