//! Inbound side: callback validation and delivery to the Correlator

mod messages;
mod receiver;

pub use messages::{AckStatus, CallbackError, CallbackPayload};
pub use receiver::InboundReceiver;
