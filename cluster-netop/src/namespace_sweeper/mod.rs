use std::{sync::Arc, time::Duration};

use k8s_openapi::chrono::Utc;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::controller::reconciler::context::ReconcilerContext;

use self::reconciler::{sweep_namespace, SweepOutcome, SweepTarget};

pub mod reconciler;

/// Periodically releases a stuck finalizer from the configured namespace until shutdown.
pub async fn run_namespace_sweeper(context: Arc<ReconcilerContext>) {
    let settings = &context.settings.sweep;
    let Some(namespace) = settings.namespace.as_deref() else {
        info!("No namespace to sweep, namespace sweeper disabled.");
        return;
    };

    info!("Sweeping '{}' finalizer from '{namespace}' namespace...", settings.finalizer);

    let target = SweepTarget {
        namespace,
        finalizer: &settings.finalizer,
        grace_period: settings.grace_period,
    };

    loop {
        let delay = match sweep_namespace(
            context.store.as_ref(),
            &target,
            Utc::now(),
            &context.cancel,
        )
        .await
        {
            Ok(SweepOutcome::RecheckAfter(remaining)) => remaining,
            Ok(outcome) => {
                debug!("Namespace '{namespace}' swept: {outcome:?}");
                settings.resync_period
            }
            Err(error) if error.is_cancelled() => break,
            Err(error) => {
                warn!("{error}");
                settings.resync_period
            }
        };

        if !sleep_or_cancel(delay, &context.cancel).await {
            break;
        }
    }

    info!("Namespace sweeper stopped.");
}

/// Returns `false` when cancelled before the delay elapsed.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use cluster_netop_core::{kubernetes::memory::MemoryStore, status::MockStatusReporter};

    use crate::controller::reconciler::test_context::context;

    use super::run_namespace_sweeper;

    #[tokio::test(start_paused = true)]
    async fn disabled_sweeper_returns_immediately() {
        let context = context(Arc::new(MemoryStore::new()), Arc::new(MockStatusReporter::new()));

        tokio::time::timeout(Duration::from_secs(1), run_namespace_sweeper(Arc::new(context)))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_shutdown() {
        let mut context =
            context(Arc::new(MemoryStore::new()), Arc::new(MockStatusReporter::new()));
        context.settings.sweep.namespace = Some("netop-sdn".to_owned());
        let cancel = context.cancel.clone();
        let sweeper = tokio::spawn(run_namespace_sweeper(Arc::new(context)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .unwrap()
            .unwrap();
    }
}
