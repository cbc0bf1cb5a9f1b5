//! Message types for the Correlator

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use super::token::CorrelationToken;

/// Result payload carried by an inbound callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallbackResult {
    /// The backend answered with text
    Answer { text: String },

    /// The backend reported that it could not answer
    Error { message: String },
}

impl CallbackResult {
    pub fn answer(text: impl Into<String>) -> Self {
        Self::Answer { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Terminal state of a pending request, handed to its waiter exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// An inbound callback matched the token
    Delivered(CallbackResult),

    /// The deadline elapsed with no matching callback
    TimedOut,

    /// The outbound call failed before any answer could be awaited
    TransportFailed(String),

    /// The wait was abandoned (caller went away or the process is shutting down)
    Cancelled,
}

impl ResolutionOutcome {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionOutcome::Delivered(_) => "delivered",
            ResolutionOutcome::TimedOut => "timed_out",
            ResolutionOutcome::TransportFailed(_) => "transport_failed",
            ResolutionOutcome::Cancelled => "cancelled",
        }
    }
}

/// Internal requests to the Correlator task
#[derive(Debug)]
pub(crate) enum CorrRequest {
    /// Allocate a token and park an entry for it
    Register {
        outcome_tx: oneshot::Sender<ResolutionOutcome>,
        reply_tx: oneshot::Sender<CorrelationToken>,
    },

    /// Start the deadline for an entry (sent when its caller begins waiting)
    Arm { token: CorrelationToken, timeout: Duration },

    /// Inbound callback for a token
    Resolve {
        token: CorrelationToken,
        result: CallbackResult,
        reply_tx: oneshot::Sender<bool>,
    },

    /// Deadline elapsed for a token
    Expire { token: CorrelationToken },

    /// Outbound call failed for a registered token
    Fail { token: CorrelationToken, reason: String },

    /// Waiter dropped before resolution
    Abandon { token: CorrelationToken },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CorrelatorMetrics>,
    },

    /// Cancel everything outstanding and stop
    Shutdown,
}

/// Correlator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatorMetrics {
    /// Entries currently in the table
    pub pending: usize,
    /// Tokens currently held in quarantine
    pub quarantined: usize,
    pub registered: u64,
    pub delivered: u64,
    pub timed_out: u64,
    pub transport_failed: u64,
    pub cancelled: u64,
    /// Callbacks for tokens that were already resolved or expired
    pub duplicate_callbacks: u64,
    /// Callbacks for tokens this process never issued (or forgot)
    pub unknown_callbacks: u64,
}

/// Errors talking to the Correlator task
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelatorError {
    #[error("Correlator channel closed")]
    ChannelClosed,

    #[error("Correlator shut down before replying")]
    NoReply,
}
