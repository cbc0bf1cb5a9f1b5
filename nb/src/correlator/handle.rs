//! CorrelatorHandle and Waiter - client interface to the Correlator task

use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{CallbackResult, CorrRequest, CorrelatorError, CorrelatorMetrics, ResolutionOutcome};
use super::token::CorrelationToken;

/// Handle for registering, resolving and expiring pending requests
///
/// This handle is cloneable and can be shared by the outbound dispatcher, the
/// inbound receiver and anything else that needs the correlation table.
#[derive(Clone)]
pub struct CorrelatorHandle {
    tx: mpsc::Sender<CorrRequest>,
}

impl CorrelatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CorrRequest>) -> Self {
        Self { tx }
    }

    /// Register a new pending request
    ///
    /// Returns the freshly issued token (to embed in the outbound payload) and
    /// the waiter the caller suspends on.
    pub async fn register(&self) -> Result<(CorrelationToken, Waiter), CorrelatorError> {
        debug!("CorrelatorHandle::register: called");
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CorrRequest::Register { outcome_tx, reply_tx })
            .await
            .map_err(|_| CorrelatorError::ChannelClosed)?;

        let token = reply_rx.await.map_err(|_| CorrelatorError::NoReply)?;
        debug!(%token, "CorrelatorHandle::register: token issued");
        Ok((token, Waiter::new(token, outcome_rx, self.tx.clone())))
    }

    /// Deliver a callback result for `token`
    ///
    /// Returns true only for the call that resolved the entry. Unknown,
    /// already resolved and expired tokens return false.
    pub async fn resolve(&self, token: CorrelationToken, result: CallbackResult) -> Result<bool, CorrelatorError> {
        debug!(%token, "CorrelatorHandle::resolve: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CorrRequest::Resolve {
                token,
                result,
                reply_tx,
            })
            .await
            .map_err(|_| CorrelatorError::ChannelClosed)?;

        reply_rx.await.map_err(|_| CorrelatorError::NoReply)
    }

    /// Expire `token` now; a no-op if it already resolved
    pub async fn expire(&self, token: CorrelationToken) -> Result<(), CorrelatorError> {
        debug!(%token, "CorrelatorHandle::expire: called");
        self.tx
            .send(CorrRequest::Expire { token })
            .await
            .map_err(|_| CorrelatorError::ChannelClosed)
    }

    /// Get current correlator metrics
    pub async fn metrics(&self) -> Result<CorrelatorMetrics, CorrelatorError> {
        debug!("CorrelatorHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CorrRequest::GetMetrics { reply_tx })
            .await
            .map_err(|_| CorrelatorError::ChannelClosed)?;

        reply_rx.await.map_err(|_| CorrelatorError::NoReply)
    }

    /// Cancel every outstanding waiter and stop the Correlator
    pub async fn shutdown(&self) -> Result<(), CorrelatorError> {
        debug!("CorrelatorHandle::shutdown: called");
        self.tx
            .send(CorrRequest::Shutdown)
            .await
            .map_err(|_| CorrelatorError::ChannelClosed)
    }
}

/// Suspension point for one registered request
///
/// Consumed by [`Waiter::wait`] or [`Waiter::fail`], so each waiter can be
/// awaited at most once. Dropping an unsettled waiter abandons its entry,
/// which is released as `Cancelled`.
pub struct Waiter {
    token: CorrelationToken,
    outcome_rx: Option<oneshot::Receiver<ResolutionOutcome>>,
    tx: mpsc::Sender<CorrRequest>,
    settled: bool,
}

impl Waiter {
    fn new(
        token: CorrelationToken,
        outcome_rx: oneshot::Receiver<ResolutionOutcome>,
        tx: mpsc::Sender<CorrRequest>,
    ) -> Self {
        Self {
            token,
            outcome_rx: Some(outcome_rx),
            tx,
            settled: false,
        }
    }

    pub fn token(&self) -> CorrelationToken {
        self.token
    }

    /// Arm the deadline and suspend until the entry resolves
    ///
    /// `timeout` is clamped to the supervisor's bounds. If the Correlator goes
    /// away while waiting the outcome is `Cancelled`.
    pub async fn wait(mut self, timeout: Duration) -> ResolutionOutcome {
        debug!(token = %self.token, ?timeout, "Waiter::wait: called");
        if self
            .tx
            .send(CorrRequest::Arm {
                token: self.token,
                timeout,
            })
            .await
            .is_err()
        {
            debug!(token = %self.token, "Waiter::wait: correlator gone before arming");
        }
        self.settle().await
    }

    /// Release the entry because the outbound call failed
    ///
    /// A callback that beat the failure report still wins, so the returned
    /// outcome is not necessarily `TransportFailed`.
    pub async fn fail(mut self, reason: impl Into<String>) -> ResolutionOutcome {
        let reason = reason.into();
        debug!(token = %self.token, %reason, "Waiter::fail: called");
        if self
            .tx
            .send(CorrRequest::Fail {
                token: self.token,
                reason: reason.clone(),
            })
            .await
            .is_err()
        {
            // Nobody left to race with, report the failure directly
            self.settled = true;
            return ResolutionOutcome::TransportFailed(reason);
        }
        self.settle().await
    }

    async fn settle(&mut self) -> ResolutionOutcome {
        let outcome = match self.outcome_rx.take() {
            Some(rx) => rx.await.unwrap_or(ResolutionOutcome::Cancelled),
            None => ResolutionOutcome::Cancelled,
        };
        self.settled = true;
        debug!(token = %self.token, kind = outcome.kind(), "Waiter: settled");
        outcome
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        debug!(token = %self.token, "Waiter dropped unsettled, abandoning");
        match self.tx.try_send(CorrRequest::Abandon { token: self.token }) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(req)) => {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let tx = self.tx.clone();
                    runtime.spawn(async move {
                        let _ = tx.send(req).await;
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::{Correlator, CorrelatorConfig};

    #[tokio::test]
    async fn test_register_resolve_wait() {
        let (handle, _task) = Correlator::spawn(CorrelatorConfig::default());

        let (token, waiter) = handle.register().await.unwrap();
        assert_eq!(waiter.token(), token);

        assert!(handle.resolve(token, CallbackResult::answer("lights on")).await.unwrap());
        let outcome = waiter.wait(Duration::from_secs(30)).await;
        assert_eq!(outcome, ResolutionOutcome::Delivered(CallbackResult::answer("lights on")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_at_deadline() {
        let (handle, _task) = Correlator::spawn(CorrelatorConfig::default());
        let (token, waiter) = handle.register().await.unwrap();
        let start = tokio::time::Instant::now();

        assert_eq!(waiter.wait(Duration::from_secs(1)).await, ResolutionOutcome::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1010));

        // The late answer is acknowledged as a duplicate, not delivered
        assert!(!handle.resolve(token, CallbackResult::answer("late")).await.unwrap());
        assert_eq!(handle.metrics().await.unwrap().duplicate_callbacks, 1);
    }

    #[tokio::test]
    async fn test_fail_reports_transport_failure() {
        let (handle, _task) = Correlator::spawn(CorrelatorConfig::default());
        let (_token, waiter) = handle.register().await.unwrap();

        let outcome = waiter.fail("connection refused").await;
        assert_eq!(outcome, ResolutionOutcome::TransportFailed("connection refused".to_string()));

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.transport_failed, 1);
        assert_eq!(metrics.pending, 0);
    }

    #[tokio::test]
    async fn test_callback_before_failure_report_wins() {
        let (handle, _task) = Correlator::spawn(CorrelatorConfig::default());
        let (token, waiter) = handle.register().await.unwrap();

        assert!(handle.resolve(token, CallbackResult::answer("fast")).await.unwrap());
        let outcome = waiter.fail("ack timed out").await;
        assert_eq!(outcome, ResolutionOutcome::Delivered(CallbackResult::answer("fast")));
    }

    #[tokio::test]
    async fn test_dropped_waiter_releases_entry() {
        let (handle, _task) = Correlator::spawn(CorrelatorConfig::default());
        let (token, waiter) = handle.register().await.unwrap();
        drop(waiter);

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.pending, 0);
        assert_eq!(metrics.cancelled, 1);
        assert!(!handle.resolve(token, CallbackResult::answer("late")).await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_is_cancelled() {
        let (handle, task) = Correlator::spawn(CorrelatorConfig::default());
        let (_token, waiter) = handle.register().await.unwrap();

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(waiter.wait(Duration::from_secs(30)).await, ResolutionOutcome::Cancelled);
        assert_eq!(handle.register().await.err(), Some(CorrelatorError::ChannelClosed));
    }
}
