//! Transport trait and the HTTP implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use super::error::TransportError;
use super::payload::OutboundPayload;

/// Timeout used when probing a backend for reachability
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers an outbound payload and reports whether the backend accepted it
///
/// An `Ok` only means the backend acknowledged receipt. The answer itself
/// arrives later through the inbound callback.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, payload: &OutboundPayload) -> Result<(), TransportError>;
}

/// Transport over HTTP POST with a JSON body
pub struct HttpTransport {
    http: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self, TransportError> {
        debug!(?timeout, ?connect_timeout, "HttpTransport::new: called");
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(TransportError::Network)?;
        Ok(Self { http, timeout })
    }

    fn map_send_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Network(e)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, payload: &OutboundPayload) -> Result<(), TransportError> {
        debug!(%url, token = %payload.conversation_id, "HttpTransport::post: called");
        let url = parse_url(url)?;

        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "HttpTransport::post: backend rejected request");
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        debug!("HttpTransport::post: acknowledged");
        Ok(())
    }
}

/// Parse and check a backend address
pub fn parse_url(url: &str) -> Result<Url, TransportError> {
    let parsed = Url::parse(url.trim()).map_err(|e| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(TransportError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// GET `url` and return the HTTP status
///
/// Used by `nb check` to see whether a backend is listening at all.
pub async fn probe(url: &str) -> Result<u16, TransportError> {
    debug!(%url, "probe: called");
    let url = parse_url(url)?;
    let http = Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(TransportError::Network)?;

    let response = http.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TransportError::Timeout(PROBE_TIMEOUT)
        } else {
            TransportError::Network(e)
        }
    })?;

    let status = response.status().as_u16();
    debug!(%status, "probe: response");
    Ok(status)
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// How the mock answers each post
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Accept,
        Reject(u16),
        /// Accept only after the given delay
        Stall(Duration),
    }

    /// Mock transport for unit tests
    ///
    /// Every payload is forwarded on the channel returned by
    /// [`MockTransport::new`], so a test can play the backend and answer it.
    pub struct MockTransport {
        reply: MockReply,
        sent_tx: mpsc::UnboundedSender<(String, OutboundPayload)>,
        call_count: AtomicUsize,
    }

    impl MockTransport {
        pub fn new(reply: MockReply) -> (Self, mpsc::UnboundedReceiver<(String, OutboundPayload)>) {
            debug!(?reply, "MockTransport::new: called");
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let transport = Self {
                reply,
                sent_tx,
                call_count: AtomicUsize::new(0),
            };
            (transport, sent_rx)
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post(&self, url: &str, payload: &OutboundPayload) -> Result<(), TransportError> {
            debug!(%url, "MockTransport::post: called");
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let _ = self.sent_tx.send((url.to_string(), payload.clone()));
            match &self.reply {
                MockReply::Accept => Ok(()),
                MockReply::Reject(status) => Err(TransportError::Status { status: *status }),
                MockReply::Stall(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_accepts_http() {
        assert!(parse_url("http://localhost:8000/webhook").is_ok());
        assert!(parse_url(" https://agent.example.com/hook ").is_ok());
    }

    #[test]
    fn test_parse_url_rejects_bad_input() {
        assert!(matches!(parse_url("not a url"), Err(TransportError::InvalidUrl { .. })));
        assert!(matches!(
            parse_url("ftp://example.com/file"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_http_transport_invalid_url() {
        let transport = HttpTransport::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let payload = OutboundPayload::new(
            crate::correlator::CorrelationToken::generate(),
            &crate::dispatch::Utterance::new("hi"),
            "agent",
            None,
        );
        let err = transport.post("::nope::", &payload).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_http_transport_connection_refused() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(Duration::from_secs(2), Duration::from_secs(1)).unwrap();
        let payload = OutboundPayload::new(
            crate::correlator::CorrelationToken::generate(),
            &crate::dispatch::Utterance::new("hi"),
            "agent",
            None,
        );
        let err = transport
            .post(&format!("http://{}/hook", addr), &payload)
            .await
            .unwrap_err();
        assert!(!err.reached_backend());
    }
}
