use cluster_netop_core::{
    apply::ApplyError,
    bootstrap::BootstrapError,
    kubernetes::StoreError,
    network::ConfigError,
    readiness::{ReadinessCheckBuilderError, ReadinessError},
    resources::{render::RenderError, ResourceGenerationError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Object is missing metadata!")]
    MissingObjectMetadata,
    #[error("Couldn't read the operator configuration! Reason: {}", .0)]
    OperatorConfig(#[source] StoreError),
    #[error("{}", .0)]
    Config(#[source] ConfigError),
    #[error("Couldn't gather platform facts! Reason: {}", .0)]
    Bootstrap(#[source] BootstrapError),
    #[error("{}", .0)]
    Render(#[source] RenderError),
    #[error("Couldn't classify the rendered objects! Reason: {}", .0)]
    Classify(#[source] StoreError),
    #[error("{}", .0)]
    Apply(#[source] ApplyError),
    #[error("Couldn't prepare a readiness check! Reason: {}", .0)]
    ReadinessCheckBuilder(#[source] ReadinessCheckBuilderError),
    #[error("{}", .0)]
    Readiness(#[source] ReadinessError),
    #[error("Couldn't update the cluster network status! Reason: {}", .0)]
    Status(#[source] StoreError),
    #[error("Couldn't apply the cluster network status! Reason: {}", .0)]
    StatusApply(#[source] ApplyError),
    #[error("Couldn't generate the allowlist resources! Reason: {}", .0)]
    AllowlistGeneration(#[source] ResourceGenerationError),
    #[error("Couldn't clean up the allowlist daemonset! Reason: {}", .0)]
    AllowlistCleanup(#[source] StoreError),
    #[error("Leftover allowlist daemonset was removed, retrying")]
    AllowlistLeftover,
    #[error("Reconciliation panicked: {}", .0)]
    Panicked(String),
}

impl ReconcilerError {
    /// Degraded condition reason this error is reported under.
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::MissingObjectMetadata | ReconcilerError::OperatorConfig(_) => {
                "OperatorConfigError"
            }
            ReconcilerError::Config(error) => error.reason(),
            ReconcilerError::Bootstrap(_) => "BootstrapError",
            ReconcilerError::Render(_) | ReconcilerError::Classify(_) => "RenderError",
            ReconcilerError::Apply(_) => "ApplyOperatorConfig",
            ReconcilerError::ReadinessCheckBuilder(_) | ReconcilerError::Readiness(_) => {
                "ReadinessError"
            }
            ReconcilerError::Status(_) | ReconcilerError::StatusApply(_) => "StatusError",
            ReconcilerError::AllowlistGeneration(_)
            | ReconcilerError::AllowlistCleanup(_)
            | ReconcilerError::AllowlistLeftover => "AllowlistError",
            ReconcilerError::Panicked(_) => "OperatorPanic",
        }
    }

    pub fn degraded_message(&self) -> String {
        match self {
            ReconcilerError::Config(error) => error.message(),
            other => other.to_string(),
        }
    }

    pub fn is_user_actionable(&self) -> bool {
        matches!(self, ReconcilerError::Config(error) if error.is_user_actionable())
    }

    /// Plain retries and shutdowns don't degrade the operator.
    pub fn is_degrading(&self) -> bool {
        !self.is_cancelled() && !matches!(self, ReconcilerError::AllowlistLeftover)
    }

    /// Shutdown in progress, nothing to report.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ReconcilerError::OperatorConfig(error)
            | ReconcilerError::Classify(error)
            | ReconcilerError::Status(error)
            | ReconcilerError::AllowlistCleanup(error) => matches!(error, StoreError::Cancelled),
            ReconcilerError::Config(ConfigError::Merge(error))
            | ReconcilerError::Config(ConfigError::AppliedConfiguration(error)) => {
                matches!(error, StoreError::Cancelled)
            }
            ReconcilerError::Bootstrap(BootstrapError::NodeList(error)) => {
                matches!(error, StoreError::Cancelled)
            }
            ReconcilerError::Apply(error) | ReconcilerError::StatusApply(error) => {
                error.is_cancelled()
            }
            ReconcilerError::Readiness(error) => error.is_cancelled(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use cluster_netop_core::{kubernetes::StoreError, network::ConfigError};

    use super::ReconcilerError;

    #[test]
    fn config_errors_keep_their_reason_and_hint() {
        let error = ReconcilerError::Config(ConfigError::UnsafeChange(vec![
            "cannot change serviceNetwork".to_owned(),
        ]));

        assert_eq!(error.reason(), "InvalidOperatorConfig");
        assert!(error.is_user_actionable());
        assert!(error.degraded_message().contains("to undo the change"));
    }

    #[test]
    fn transient_errors_are_retried_quickly() {
        let error = ReconcilerError::Config(ConfigError::Merge(StoreError::Cancelled));

        assert!(!error.is_user_actionable());
        assert!(error.is_cancelled());
        assert!(!error.is_degrading());
    }

    #[test]
    fn leftover_allowlist_is_a_quiet_retry() {
        assert!(!ReconcilerError::AllowlistLeftover.is_degrading());
        assert!(!ReconcilerError::AllowlistLeftover.is_cancelled());
        assert!(ReconcilerError::Panicked("boom".to_owned()).is_degrading());
    }
}
