use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::core::ObjectMeta;
use tokio_util::sync::CancellationToken;

use crate::{
    kubernetes::{try_get_typed, ObjectStore},
    resources::{
        crd::v1::network::NetworkSpec, labels::get_operator_labels, RenderedObject,
        ResourceGenerationError,
    },
};

use super::ConfigError;

pub const APPLIED_PREFIX: &str = "applied-";
pub const APPLIED_KEY: &str = "applied";

pub fn applied_configuration_name(name: &str) -> String {
    format!("{APPLIED_PREFIX}{name}")
}

/// Reads back the spec recorded by the last successful reconcile, `None` on first run.
pub async fn get_applied_configuration(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
    cancel: &CancellationToken,
) -> Result<Option<NetworkSpec>, ConfigError> {
    let config_map = try_get_typed::<ConfigMap>(
        store,
        Some(namespace),
        &applied_configuration_name(name),
        cancel,
    )
    .await
    .map_err(ConfigError::AppliedConfiguration)?;

    let Some(applied) = config_map
        .and_then(|config_map| config_map.data)
        .and_then(|mut data| data.remove(APPLIED_KEY))
    else {
        return Ok(None);
    };

    serde_json::from_str(&applied)
        .map(Some)
        .map_err(ConfigError::CorruptAppliedConfiguration)
}

/// Record of `spec`, the first object applied on every reconcile.
pub fn applied_configuration(
    namespace: &str,
    name: &str,
    spec: &NetworkSpec,
) -> Result<RenderedObject, ResourceGenerationError> {
    let applied = serde_json::to_string(spec)
        .map_err(|error| ResourceGenerationError::InvalidData(error.to_string().into()))?;
    let config_map = ConfigMap {
        metadata: ObjectMeta {
            labels: Some(get_operator_labels("operator")),
            namespace: Some(namespace.to_owned()),
            name: Some(applied_configuration_name(name)),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(APPLIED_KEY.to_owned(), applied)])),
        ..Default::default()
    };

    RenderedObject::from_resource(&config_map)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::core::ObjectMeta;
    use tokio_util::sync::CancellationToken;

    use crate::{
        kubernetes::memory::MemoryStore,
        network::{test_config::sdn_spec, ConfigError},
    };

    use super::{applied_configuration, get_applied_configuration};

    #[tokio::test]
    async fn recorded_spec_reads_back() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();

        assert_eq!(
            get_applied_configuration(&store, "netop", "cluster", &cancel)
                .await
                .unwrap(),
            None
        );

        let record = applied_configuration("netop", "cluster", &sdn_spec()).unwrap();
        store.insert(record.object).unwrap();

        assert_eq!(
            get_applied_configuration(&store, "netop", "cluster", &cancel)
                .await
                .unwrap(),
            Some(sdn_spec())
        );
    }

    #[tokio::test]
    async fn garbage_record_is_reported() {
        let store = MemoryStore::new();
        store
            .insert_typed(&ConfigMap {
                metadata: ObjectMeta {
                    name: Some("applied-cluster".to_owned()),
                    namespace: Some("netop".to_owned()),
                    ..Default::default()
                },
                data: Some(BTreeMap::from([("applied".to_owned(), "{".to_owned())])),
                ..Default::default()
            })
            .unwrap();

        let result =
            get_applied_configuration(&store, "netop", "cluster", &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(ConfigError::CorruptAppliedConfiguration(_))
        ));
    }
}
