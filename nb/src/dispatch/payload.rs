//! Outbound wire payload and the caller's utterance

use serde::{Deserialize, Serialize};

use crate::correlator::CorrelationToken;

/// Sender id used when the caller does not name one
pub const DEFAULT_SENDER_ID: &str = "ha_user";

/// Language used when the caller does not name one
pub const DEFAULT_LANGUAGE: &str = "en";

/// What the caller wants answered, plus routing context for the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,

    /// The caller's own conversation id, passed through for backend context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// Routing metadata attached to every outbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMetadata {
    pub device_id: Option<String>,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_ref: Option<String>,
}

/// JSON body POSTed to the backend
///
/// The backend echoes `conversation_id` in its callback, which is why the
/// correlation token travels under that name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub sender_id: String,
    pub conversation_id: CorrelationToken,
    pub text: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub metadata: OutboundMetadata,
}

impl OutboundPayload {
    pub fn new(token: CorrelationToken, utterance: &Utterance, agent_id: &str, reply_to: Option<String>) -> Self {
        Self {
            sender_id: utterance
                .sender_id
                .clone()
                .unwrap_or_else(|| DEFAULT_SENDER_ID.to_string()),
            conversation_id: token,
            text: utterance.text.clone(),
            language: utterance
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            reply_to,
            metadata: OutboundMetadata {
                device_id: utterance.device_id.clone(),
                agent_id: agent_id.to_string(),
                conversation_ref: utterance.conversation_id.clone(),
            },
        }
    }
}
