use std::future::{ready, Ready};

use cluster_netop_core::helpers::pretty_type_name;
use kube::{
    runtime::{
        controller::{Action, Error as ControllerError},
        reflector::ObjectRef,
        watcher::Error as WatcherError,
    },
    Resource,
};
use log::{debug, error, log, Level};

use crate::controller::reconciler::error::ReconcilerError;

/// How loud a failed reconcile is. Shutdowns and quiet retries stay out of the
/// default log, config mistakes wait on the administrator and only warn.
fn failure_level(error: &ReconcilerError) -> Level {
    if error.is_cancelled() {
        Level::Debug
    } else if !error.is_degrading() {
        Level::Info
    } else if error.is_user_actionable() {
        Level::Warn
    } else {
        Level::Error
    }
}

pub fn handle_reconciliation_result<K>(
    result: Result<(ObjectRef<K>, Action), ControllerError<ReconcilerError, WatcherError>>,
) -> Ready<()>
where
    K: Resource,
{
    let kind = pretty_type_name::<K>().to_lowercase();

    match result {
        Ok((object, action)) => debug!(
            "Reconciled {kind} '{}' in '{}' namespace. Next action: {action:?}",
            object.name,
            object.namespace.as_deref().unwrap_or("---"),
        ),
        Err(ControllerError::ObjectNotFound(object)) => {
            debug!("{kind} '{}' is gone, skipping", object.name)
        }
        Err(ControllerError::ReconcilerFailed(reconciler_error, object)) => log!(
            failure_level(&reconciler_error),
            "Reconciling {kind} '{}' (namespace {}) failed [{}]: {reconciler_error}",
            object.name,
            object.namespace.as_deref().unwrap_or("---"),
            reconciler_error.reason(),
        ),
        Err(ControllerError::QueueError(watcher_error)) => {
            error!("Watcher for {kind} has failed! {watcher_error:#?}")
        }
    }

    ready(())
}

#[cfg(test)]
mod tests {
    use cluster_netop_core::{kubernetes::StoreError, network::ConfigError};
    use log::Level;

    use crate::controller::reconciler::error::ReconcilerError;

    use super::failure_level;

    #[test]
    fn failures_are_logged_by_kind() {
        assert_eq!(
            failure_level(&ReconcilerError::OperatorConfig(StoreError::Cancelled)),
            Level::Debug
        );
        assert_eq!(failure_level(&ReconcilerError::AllowlistLeftover), Level::Info);
        assert_eq!(
            failure_level(&ReconcilerError::Config(ConfigError::UnsafeChange(vec![
                "cannot change clusterNetwork".to_owned()
            ]))),
            Level::Warn
        );
        assert_eq!(
            failure_level(&ReconcilerError::Panicked("boom".to_owned())),
            Level::Error
        );
    }
}
