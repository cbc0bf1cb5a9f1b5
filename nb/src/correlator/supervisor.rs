//! Timeout supervisor
//!
//! One sleeping task per armed token. When the sleep completes the task asks
//! the Correlator to expire the token; if the entry resolves first the
//! Correlator aborts the task through its `AbortHandle`, so it never fires.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use super::messages::CorrRequest;
use super::token::CorrelationToken;

/// Shortest deadline that will be armed
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Longest deadline that will be armed
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Clamp a requested timeout into `[MIN_TIMEOUT, MAX_TIMEOUT]`
///
/// A zero timeout still expires (almost immediately) and an enormous one
/// cannot overflow deadline arithmetic.
pub fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT)
}

/// Spawn the expiry task for `token`
pub(crate) fn arm(token: CorrelationToken, timeout: Duration, tx: mpsc::Sender<CorrRequest>) -> AbortHandle {
    debug!(%token, ?timeout, "supervisor::arm: called");
    let task = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        debug!(%token, "supervisor: deadline elapsed");
        let _ = tx.send(CorrRequest::Expire { token }).await;
    });
    task.abort_handle()
}
