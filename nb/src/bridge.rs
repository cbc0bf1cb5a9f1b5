//! Synchronous ask-and-answer facade over the correlation engine

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::correlator::{CallbackResult, ResolutionOutcome, clamp_timeout};
use crate::dispatch::{Dispatcher, Utterance};

/// Errors surfaced to a caller of [`Bridge::process_utterance`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("{agent} did not respond within {timeout:?}; increase the timeout or check that the backend is healthy")]
    TimedOut { agent: String, timeout: Duration },

    #[error("Could not reach {agent}: {reason}")]
    Transport { agent: String, reason: String },

    #[error("{agent} reported an error: {message}")]
    Backend { agent: String, message: String },

    #[error("Request was cancelled before {agent} answered")]
    Cancelled { agent: String },

    #[error("Utterance text is empty")]
    EmptyUtterance,
}

/// A successful answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Echo of the caller's conversation id, or a fresh one
    pub conversation_id: String,
    pub text: String,
}

/// Turns one utterance into one answer, hiding the asynchronous round trip
#[derive(Clone)]
pub struct Bridge {
    dispatcher: Dispatcher,
    agent_name: Arc<str>,
    default_timeout: Duration,
}

impl Bridge {
    pub fn new(dispatcher: Dispatcher, agent_name: impl Into<String>, default_timeout: Duration) -> Self {
        let agent_name: String = agent_name.into();
        debug!(%agent_name, ?default_timeout, "Bridge::new: called");
        Self {
            dispatcher,
            agent_name: Arc::from(agent_name),
            default_timeout,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Send `utterance` and wait for the answer
    ///
    /// `timeout` falls back to the configured default.
    pub async fn process_utterance(
        &self,
        utterance: Utterance,
        timeout: Option<Duration>,
    ) -> Result<Reply, BridgeError> {
        if utterance.text.trim().is_empty() {
            return Err(BridgeError::EmptyUtterance);
        }
        let timeout = clamp_timeout(timeout.unwrap_or(self.default_timeout));
        debug!(?timeout, "Bridge::process_utterance: called");

        let conversation_id = utterance
            .conversation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let agent = self.agent_name.to_string();
        match self.dispatcher.send(&utterance, timeout).await {
            ResolutionOutcome::Delivered(CallbackResult::Answer { text }) => Ok(Reply { conversation_id, text }),
            ResolutionOutcome::Delivered(CallbackResult::Error { message }) => {
                warn!(%message, "Backend answered with an error");
                Err(BridgeError::Backend { agent, message })
            }
            ResolutionOutcome::TimedOut => {
                warn!(?timeout, "Timed out waiting for backend answer");
                Err(BridgeError::TimedOut { agent, timeout })
            }
            ResolutionOutcome::TransportFailed(reason) => Err(BridgeError::Transport { agent, reason }),
            ResolutionOutcome::Cancelled => Err(BridgeError::Cancelled { agent }),
        }
    }
}
