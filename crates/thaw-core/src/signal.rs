//! Signal handling for interrupting a run.

use std::future::Future;

use tracing::{info, warn};

/// Wait for a shutdown signal (SIGINT, SIGTERM, or SIGQUIT on Unix).
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to set up SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to set up SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("Failed to set up SIGQUIT handler");

    tokio::select! {
        _ = sigint.recv() => {
            info!(message = "Signal received.", signal = "SIGINT");
        }
        _ = sigterm.recv() => {
            info!(message = "Signal received.", signal = "SIGTERM");
        }
        _ = sigquit.recv() => {
            info!(message = "Signal received.", signal = "SIGQUIT");
        }
    }
}

/// Wait for Ctrl-C on platforms without Unix signals.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(message = "Signal received.", signal = "CTRL_C");
}

/// Drive `work` to completion unless `interrupt` resolves first.
///
/// Returns `None` when interrupted. The in-flight work is dropped, so no
/// later stage of a run starts after an interrupt.
pub async fn run_until<F, I>(work: F, interrupt: I) -> Option<F::Output>
where
    F: Future,
    I: Future<Output = ()>,
{
    tokio::select! {
        biased;

        output = work => Some(output),
        _ = interrupt => {
            warn!("Run interrupted before completion");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_work_completes_before_interrupt() {
        let result = run_until(async { 42 }, std::future::pending()).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_interrupt_drops_pending_work() {
        let work = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "finished"
        };

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            run_until(work, async {}),
        )
        .await
        .expect("interrupt should resolve quickly");

        assert_eq!(result, None);
    }
}
