//! InboundReceiver - validates callbacks and hands them to the Correlator

use tracing::{debug, info, warn};

use super::messages::{AckStatus, CallbackError, CallbackPayload};
use crate::correlator::{CallbackResult, CorrelationToken, CorrelatorHandle};

/// Entry point for out-of-band answers from the backend
#[derive(Clone)]
pub struct InboundReceiver {
    correlator: CorrelatorHandle,
}

impl InboundReceiver {
    pub fn new(correlator: CorrelatorHandle) -> Self {
        Self { correlator }
    }

    /// Validate a raw callback body
    ///
    /// Text wins over error when both are present. Whitespace-only values
    /// count as absent.
    pub fn parse(raw: &[u8]) -> Result<(CorrelationToken, CallbackResult), CallbackError> {
        let payload: CallbackPayload =
            serde_json::from_slice(raw).map_err(|e| CallbackError::InvalidJson(e.to_string()))?;

        let token_str = payload
            .conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(CallbackError::MissingToken)?;
        let token = CorrelationToken::parse(token_str).map_err(|_| CallbackError::InvalidToken(token_str.to_string()))?;

        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

        let result = match (non_empty(&payload.text), non_empty(&payload.error)) {
            (Some(text), _) => CallbackResult::answer(text),
            (None, Some(message)) => CallbackResult::error(message),
            (None, None) => return Err(CallbackError::MissingResult),
        };

        Ok((token, result))
    }

    /// Deliver a raw callback body
    ///
    /// Only malformed bodies are rejected. Unknown, duplicate and late
    /// callbacks are acknowledged as `Discarded` and never reach a caller.
    pub async fn deliver(&self, raw: &[u8]) -> AckStatus {
        debug!(len = raw.len(), "InboundReceiver::deliver: called");
        let (token, result) = match Self::parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed callback");
                return AckStatus::Malformed(e);
            }
        };

        match self.correlator.resolve(token, result).await {
            Ok(true) => {
                info!(%token, "Callback resolved pending request");
                AckStatus::Resolved
            }
            Ok(false) => {
                debug!(%token, "InboundReceiver::deliver: callback discarded");
                AckStatus::Discarded
            }
            Err(e) => {
                warn!(%token, error = %e, "Correlator unavailable, discarding callback");
                AckStatus::Discarded
            }
        }
    }
}
