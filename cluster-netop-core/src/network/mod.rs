use log::info;
use thiserror::Error;

use crate::{
    kubernetes::StoreError,
    resources::{
        annotations::{has_annotation, NETWORK_MIGRATION_ANNOTATION},
        crd::v1::network::{Network, NetworkSpec},
    },
};

pub mod applied;
pub mod canonicalize;
pub mod defaults;
pub mod merge;
pub mod safety;
pub mod validate;

const EDIT_HINT: &str = "Use 'kubectl edit network.operator.netop.dev cluster' to fix.";
const UNDO_HINT: &str = "Use 'kubectl edit network.operator.netop.dev cluster' to undo the change.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The operator configuration is invalid ({})!", .0.join(", "))]
    Invalid(Vec<String>),
    #[error("Not applying unsafe configuration change ({})!", .0.join(", "))]
    UnsafeChange(Vec<String>),
    #[error("Couldn't merge the cluster network configuration! Reason: {}", .0)]
    Merge(#[source] StoreError),
    #[error("Couldn't retrieve the previously applied configuration! Reason: {}", .0)]
    AppliedConfiguration(#[source] StoreError),
    #[error("Previously applied configuration is corrupt! Reason: {}", .0)]
    CorruptAppliedConfiguration(#[source] serde_json::Error),
}

impl ConfigError {
    /// Degraded condition reason this error is reported under.
    pub fn reason(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) | ConfigError::UnsafeChange(_) => "InvalidOperatorConfig",
            ConfigError::Merge(_) => "MergeClusterConfig",
            ConfigError::AppliedConfiguration(_) | ConfigError::CorruptAppliedConfiguration(_) => {
                "AppliedConfigurationError"
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            ConfigError::Invalid(_) => format!("{self} {EDIT_HINT}"),
            ConfigError::UnsafeChange(_) => format!("{self} {UNDO_HINT}"),
            _ => self.to_string(),
        }
    }

    /// Errors only an administrator editing the config can resolve, retrying won't help.
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, ConfigError::Invalid(_) | ConfigError::UnsafeChange(_))
    }
}

/// Turns the observed operator config into the spec that will be rendered.
///
/// The spec is canonicalized and validated, then every unset field is filled from
/// `previous` (itself brought up to date first) or from static defaults. Unless the
/// network migration annotation is set, changes to fields that can't be altered on a
/// running cluster are rejected.
pub fn reconcile_config(
    observed: &Network,
    previous: Option<NetworkSpec>,
) -> Result<NetworkSpec, ConfigError> {
    let mut spec = observed.spec.clone();

    canonicalize::canonicalize(&mut spec);
    validate::validate(&spec).map_err(ConfigError::Invalid)?;

    let previous = previous.map(|mut previous| {
        canonicalize::canonicalize(&mut previous);
        defaults::fill_defaults(&mut previous, None);
        previous
    });

    defaults::fill_defaults(&mut spec, previous.as_ref());

    if let Some(previous) = previous.as_ref() {
        if has_annotation(&observed.metadata.annotations, NETWORK_MIGRATION_ANNOTATION) {
            info!("Network migration annotation is set, skipping the change safety check");
        } else {
            safety::is_change_safe(previous, &spec).map_err(ConfigError::UnsafeChange)?;
        }
    }

    Ok(spec)
}

#[cfg(any(test, feature = "testing"))]
pub mod test_config {
    use crate::resources::crd::v1::network::{
        ClusterNetworkEntry, DefaultNetworkDefinition, Network, NetworkSpec,
    };

    pub fn sdn_spec() -> NetworkSpec {
        NetworkSpec {
            cluster_network: vec![ClusterNetworkEntry {
                cidr: "10.128.0.0/14".to_owned(),
                host_prefix: 23,
            }],
            service_network: vec!["172.30.0.0/16".to_owned()],
            default_network: DefaultNetworkDefinition {
                type_: "OpenShiftSDN".to_owned(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn network(spec: NetworkSpec) -> Network {
        Network::new("cluster", spec)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::resources::{
        annotations::NETWORK_MIGRATION_ANNOTATION,
        crd::v1::network::{ClusterNetworkEntry, OVN_KUBERNETES},
    };

    use super::{
        reconcile_config,
        test_config::{network, sdn_spec},
        ConfigError,
    };

    #[test]
    fn first_apply_skips_the_safety_check() {
        let spec = reconcile_config(&network(sdn_spec()), None).unwrap();

        assert_eq!(
            spec.default_network
                .openshift_sdn_config
                .and_then(|sdn| sdn.mtu),
            Some(1450)
        );
    }

    #[test]
    fn unsafe_change_is_rejected() {
        let previous = reconcile_config(&network(sdn_spec()), None).unwrap();
        let mut changed = sdn_spec();
        changed.cluster_network = vec![ClusterNetworkEntry {
            cidr: "10.0.0.0/14".to_owned(),
            host_prefix: 23,
        }];

        let result = reconcile_config(&network(changed), Some(previous));

        match result {
            Err(error @ ConfigError::UnsafeChange(_)) => {
                assert!(error.is_user_actionable());
                assert_eq!(error.reason(), "InvalidOperatorConfig");
                assert!(error.message().contains("undo the change"));
            }
            other => panic!("expected an unsafe change, got {other:?}"),
        }
    }

    #[test]
    fn migration_annotation_allows_switching_network_type() {
        let previous = reconcile_config(&network(sdn_spec()), None).unwrap();
        let mut changed = sdn_spec();
        changed.default_network.type_ = OVN_KUBERNETES.to_owned();

        let mut observed = network(changed);
        assert!(reconcile_config(&observed, Some(previous.clone())).is_err());

        observed.metadata.annotations = Some(BTreeMap::from([(
            NETWORK_MIGRATION_ANNOTATION.to_owned(),
            String::new(),
        )]));
        let spec = reconcile_config(&observed, Some(previous)).unwrap();

        assert_eq!(spec.default_network.type_, OVN_KUBERNETES);
    }

    #[test]
    fn reconciling_twice_yields_the_same_spec() {
        let first = reconcile_config(&network(sdn_spec()), None).unwrap();
        let second = reconcile_config(&network(sdn_spec()), Some(first.clone())).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn invalid_config_reports_every_problem() {
        let mut spec = sdn_spec();
        spec.service_network = vec!["garbage".to_owned()];
        spec.default_network.type_ = String::new();

        match reconcile_config(&network(spec), None) {
            Err(ConfigError::Invalid(problems)) => assert!(problems.len() >= 2),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }
}
