//! Dispatcher - sends one request and waits for its correlated answer

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::TransportError;
use super::payload::{OutboundPayload, Utterance};
use super::target::BackendTarget;
use super::transport::Transport;
use crate::correlator::{CorrelatorHandle, ResolutionOutcome, clamp_timeout};

/// Sends utterances to the backend and suspends until the matching callback,
/// the deadline, or a failure resolves them
#[derive(Clone)]
pub struct Dispatcher {
    correlator: CorrelatorHandle,
    transport: Arc<dyn Transport>,
    target: Arc<BackendTarget>,
    agent_id: String,
    reply_to: Option<String>,
}

impl Dispatcher {
    pub fn new(
        correlator: CorrelatorHandle,
        transport: Arc<dyn Transport>,
        target: Arc<BackendTarget>,
        agent_id: impl Into<String>,
        reply_to: Option<String>,
    ) -> Self {
        let agent_id = agent_id.into();
        debug!(%agent_id, ?reply_to, "Dispatcher::new: called");
        Self {
            correlator,
            transport,
            target,
            agent_id,
            reply_to,
        }
    }

    pub fn target(&self) -> &Arc<BackendTarget> {
        &self.target
    }

    /// Send `utterance` and wait up to `timeout` for the answer
    ///
    /// Always returns exactly one outcome. With no backend address nothing is
    /// registered and the outcome is an immediate `TransportFailed`.
    ///
    /// `timeout` covers the whole exchange. The acknowledgment must arrive
    /// within it, and the callback deadline gets whatever is left.
    pub async fn send(&self, utterance: &Utterance, timeout: Duration) -> ResolutionOutcome {
        let timeout = clamp_timeout(timeout);
        debug!(?timeout, "Dispatcher::send: called");

        let Some(url) = self.target.current() else {
            warn!("No backend address configured, dropping request");
            return ResolutionOutcome::TransportFailed(TransportError::NotConfigured.to_string());
        };

        let (token, waiter) = match self.correlator.register().await {
            Ok(registered) => registered,
            Err(e) => {
                warn!(error = %e, "Dispatcher::send: correlator unavailable");
                return ResolutionOutcome::Cancelled;
            }
        };

        let payload = OutboundPayload::new(token, utterance, &self.agent_id, self.reply_to.clone());
        info!(%token, %url, "Dispatching request to backend");

        let started = Instant::now();
        let acked = match tokio::time::timeout(timeout, self.transport.post(&url, &payload)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        let outcome = match acked {
            Ok(()) => {
                let remaining = timeout.saturating_sub(started.elapsed());
                debug!(%token, ?remaining, "Dispatcher::send: backend acknowledged, waiting");
                waiter.wait(remaining).await
            }
            Err(e) if e.reached_backend() => {
                warn!(%token, error = %e, "Backend rejected request");
                waiter.fail(e.to_string()).await
            }
            Err(e) => {
                warn!(%token, error = %e, "Backend did not acknowledge request");
                waiter.fail(e.to_string()).await
            }
        };

        info!(%token, outcome = outcome.kind(), "Request resolved");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::{CallbackResult, Correlator, CorrelatorConfig};
    use crate::dispatch::transport::mock::{MockReply, MockTransport};

    type SentRx = tokio::sync::mpsc::UnboundedReceiver<(String, OutboundPayload)>;

    struct Fixture {
        dispatcher: Dispatcher,
        handle: CorrelatorHandle,
        task: tokio::task::JoinHandle<()>,
        transport: Arc<MockTransport>,
        sent_rx: SentRx,
    }

    fn fixture(reply: MockReply, url: Option<&str>) -> Fixture {
        let (handle, task) = Correlator::spawn(CorrelatorConfig::default());
        let (transport, sent_rx) = MockTransport::new(reply);
        let transport = Arc::new(transport);
        let target = Arc::new(BackendTarget::new(url.map(str::to_string)));
        let dispatcher = Dispatcher::new(
            handle.clone(),
            transport.clone(),
            target,
            "agent-1",
            Some("http://bridge/api/webhook/abc".to_string()),
        );
        Fixture {
            dispatcher,
            handle,
            task,
            transport,
            sent_rx,
        }
    }

    #[tokio::test]
    async fn test_send_delivers_callback_answer() {
        let Fixture {
            dispatcher,
            handle,
            mut sent_rx,
            ..
        } = fixture(MockReply::Accept, Some("http://agent/hook"));

        let backend = tokio::spawn(async move {
            let (url, payload) = sent_rx.recv().await.unwrap();
            assert_eq!(url, "http://agent/hook");
            assert_eq!(payload.reply_to.as_deref(), Some("http://bridge/api/webhook/abc"));
            handle
                .resolve(payload.conversation_id, CallbackResult::answer("It is 21 degrees"))
                .await
                .unwrap()
        });

        let outcome = dispatcher
            .send(&Utterance::new("how warm is it"), Duration::from_secs(10))
            .await;
        assert_eq!(outcome, ResolutionOutcome::Delivered(CallbackResult::answer("It is 21 degrees")));
        assert!(backend.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_without_callback() {
        let Fixture {
            dispatcher,
            handle,
            sent_rx: _sent_rx,
            ..
        } = fixture(MockReply::Accept, Some("http://agent/hook"));

        let start = tokio::time::Instant::now();
        let outcome = dispatcher.send(&Utterance::new("hello"), Duration::from_secs(5)).await;

        assert_eq!(outcome, ResolutionOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_secs(5));
        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.timed_out, 1);
        assert_eq!(metrics.pending, 0);
    }

    #[tokio::test]
    async fn test_send_reports_rejection() {
        let Fixture {
            dispatcher,
            handle,
            sent_rx: _sent_rx,
            ..
        } = fixture(MockReply::Reject(503), Some("http://agent/hook"));

        let outcome = dispatcher.send(&Utterance::new("hello"), Duration::from_secs(5)).await;
        assert_eq!(
            outcome,
            ResolutionOutcome::TransportFailed("Backend returned HTTP 503".to_string())
        );
        assert_eq!(handle.metrics().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_send_without_target_registers_nothing() {
        let Fixture {
            dispatcher,
            handle,
            transport,
            ..
        } = fixture(MockReply::Accept, None);

        let outcome = dispatcher.send(&Utterance::new("hello"), Duration::from_secs(5)).await;
        assert!(matches!(outcome, ResolutionOutcome::TransportFailed(_)));
        assert_eq!(transport.call_count(), 0);
        assert_eq!(handle.metrics().await.unwrap().registered, 0);
    }

    #[tokio::test]
    async fn test_send_uses_registered_target() {
        let Fixture {
            dispatcher,
            handle,
            mut sent_rx,
            ..
        } = fixture(MockReply::Accept, None);
        dispatcher.target().register("http://announced/hook");

        let backend = tokio::spawn(async move {
            let (url, payload) = sent_rx.recv().await.unwrap();
            handle
                .resolve(payload.conversation_id, CallbackResult::error("agent crashed"))
                .await
                .unwrap();
            url
        });

        let outcome = dispatcher.send(&Utterance::new("hello"), Duration::from_secs(5)).await;
        assert_eq!(outcome, ResolutionOutcome::Delivered(CallbackResult::error("agent crashed")));
        assert_eq!(backend.await.unwrap(), "http://announced/hook");
    }

    #[tokio::test]
    async fn test_send_after_shutdown_is_cancelled() {
        let Fixture {
            dispatcher,
            handle,
            task,
            transport,
            ..
        } = fixture(MockReply::Accept, Some("http://agent/hook"));
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let outcome = dispatcher.send(&Utterance::new("hello"), Duration::from_secs(5)).await;
        assert_eq!(outcome, ResolutionOutcome::Cancelled);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_never_arms_deadline() {
        let Fixture {
            dispatcher,
            handle,
            sent_rx: _sent_rx,
            ..
        } = fixture(MockReply::Reject(500), Some("http://agent/hook"));

        let outcome = dispatcher.send(&Utterance::new("hello"), Duration::from_secs(2)).await;
        assert!(matches!(outcome, ResolutionOutcome::TransportFailed(_)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.transport_failed, 1);
        assert_eq!(metrics.timed_out, 0);
        assert_eq!(metrics.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ack_bounded_by_caller_timeout() {
        let Fixture {
            dispatcher,
            handle,
            sent_rx: _sent_rx,
            ..
        } = fixture(MockReply::Stall(Duration::from_secs(4)), Some("http://agent/hook"));

        let start = tokio::time::Instant::now();
        let outcome = dispatcher
            .send(&Utterance::new("hello"), Duration::from_millis(500))
            .await;
        let elapsed = start.elapsed();

        assert_eq!(
            outcome,
            ResolutionOutcome::TransportFailed("Backend did not acknowledge within 500ms".to_string())
        );
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(600));
        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.transport_failed, 1);
        assert_eq!(metrics.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_time_counts_against_deadline() {
        let Fixture {
            dispatcher,
            handle,
            sent_rx: _sent_rx,
            ..
        } = fixture(MockReply::Stall(Duration::from_millis(300)), Some("http://agent/hook"));

        let start = tokio::time::Instant::now();
        let outcome = dispatcher.send(&Utterance::new("hello"), Duration::from_secs(1)).await;
        let elapsed = start.elapsed();

        assert_eq!(outcome, ResolutionOutcome::TimedOut);
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1100));
        assert_eq!(handle.metrics().await.unwrap().timed_out, 1);
    }
}
