use std::{any::Any, future::Future, panic::AssertUnwindSafe};

use cluster_netop_core::status::StatusComponent;
use futures::FutureExt;
use log::error;

use self::{context::ReconcilerContext, error::ReconcilerError};

pub mod allowlist;
pub mod context;
pub mod error;
pub mod network;
pub mod pods;

/// Result of one guarded reconcile, a panic inside it ends up as `Crashed` instead of
/// taking the whole process down.
#[derive(Debug)]
pub enum ReconcileOutcome<T> {
    Completed(T),
    Failed(ReconcilerError),
    Crashed(String),
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "unknown panic".to_owned(),
        },
    }
}

impl<T> ReconcileOutcome<T> {
    pub async fn guard<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, ReconcilerError>>,
    {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(value)) => ReconcileOutcome::Completed(value),
            Ok(Err(error)) => ReconcileOutcome::Failed(error),
            Err(panic) => ReconcileOutcome::Crashed(panic_message(panic)),
        }
    }

    /// Reports failures as degraded `component` and hands the error to the controller.
    pub async fn report(
        self,
        context: &ReconcilerContext,
        component: StatusComponent,
    ) -> Result<T, ReconcilerError> {
        let error = match self {
            ReconcileOutcome::Completed(value) => return Ok(value),
            ReconcileOutcome::Failed(error) => error,
            ReconcileOutcome::Crashed(message) => {
                error!("{component} reconciliation panicked: {message}");
                ReconcilerError::Panicked(message)
            }
        };

        if error.is_degrading() {
            context
                .status
                .set_degraded(component, error.reason(), &error.degraded_message())
                .await;
        }

        Err(error)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cluster_netop_core::{
        kubernetes::{memory::MemoryStore, StoreError},
        status::{MockStatusReporter, StatusComponent},
    };
    use mockall::predicate::{always, eq};

    use super::{error::ReconcilerError, test_context::context, ReconcileOutcome};

    async fn explode() -> Result<(), ReconcilerError> {
        panic!("rendered object set is empty")
    }

    #[tokio::test]
    async fn panics_are_caught_and_reported() {
        let mut status = MockStatusReporter::new();
        status
            .expect_set_degraded()
            .with(
                eq(StatusComponent::OperatorConfig),
                eq("OperatorPanic"),
                always(),
            )
            .times(1)
            .return_const(());
        let context = context(Arc::new(MemoryStore::new()), Arc::new(status));

        let outcome = ReconcileOutcome::guard(explode()).await;
        assert!(matches!(
            &outcome,
            ReconcileOutcome::Crashed(message) if message == "rendered object set is empty"
        ));

        let result = outcome
            .report(&context, StatusComponent::OperatorConfig)
            .await;
        assert!(matches!(result, Err(ReconcilerError::Panicked(_))));
    }

    #[tokio::test]
    async fn cancellation_is_not_reported() {
        let status = MockStatusReporter::new();
        let context = context(Arc::new(MemoryStore::new()), Arc::new(status));
        let outcome = ReconcileOutcome::<()>::Failed(ReconcilerError::OperatorConfig(
            StoreError::Cancelled,
        ));

        assert!(outcome
            .report(&context, StatusComponent::OperatorConfig)
            .await
            .is_err());
    }
}
