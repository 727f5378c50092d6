use std::{sync::Arc, time::Duration};

use kube::runtime::controller::Action;

use super::{context::ReconcilerContext, error::ReconcilerError};

const ERROR_REQUEUE_SECS: u64 = 10;

/// Any change to a rendered workload re-derives aggregate health from pod status.
pub async fn reconcile_workload<K>(
    _object: Arc<K>,
    context: Arc<ReconcilerContext>,
) -> Result<Action, ReconcilerError> {
    context.status.refresh_from_pods().await;

    Ok(Action::await_change())
}

pub fn reconcile_workload_error<K>(
    _object: Arc<K>,
    _error: &ReconcilerError,
    _context: Arc<ReconcilerContext>,
) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}
