//! Callback wire format and acknowledgment types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON body the backend POSTs back with its answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    #[serde(default)]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub sender_id: Option<String>,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Why a callback was rejected before reaching the correlator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("Callback body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Callback is missing 'conversation_id'")]
    MissingToken,

    #[error("Callback 'conversation_id' is not a valid token: {0}")]
    InvalidToken(String),

    #[error("Callback carries neither 'text' nor 'error'")]
    MissingResult,
}

/// Acknowledgment returned to the callback sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckStatus {
    /// The callback resolved a waiting request
    Resolved,
    /// Well-formed, but unknown, duplicate or late
    Discarded,
    /// Rejected at the receiver
    Malformed(CallbackError),
}

impl AckStatus {
    /// HTTP status to answer the sender with
    pub fn http_status(&self) -> u16 {
        match self {
            AckStatus::Resolved | AckStatus::Discarded => 200,
            AckStatus::Malformed(_) => 400,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AckStatus::Resolved => "resolved",
            AckStatus::Discarded => "discarded",
            AckStatus::Malformed(_) => "malformed",
        }
    }
}
