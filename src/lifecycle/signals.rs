//! OS signal handling.
//!
//! Ctrl+C cancels the running batch: pending targets are reported as
//! cancelled instead of the process dying mid-report.

use crate::lifecycle::Shutdown;

/// Wait for Ctrl+C and trigger `shutdown`. Returns early if shutdown was
/// triggered by something else.
pub async fn shutdown_on_ctrl_c(shutdown: Shutdown) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                tracing::warn!("Interrupt received, cancelling batch");
                shutdown.trigger();
            }
            Err(e) => tracing::error!(error = %e, "Failed to install Ctrl+C handler"),
        },
        _ = shutdown.triggered() => {}
    }
}
