//! Outbound side: payload construction, backend transport and dispatch

mod dispatcher;
mod error;
mod payload;
mod target;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use error::TransportError;
pub use payload::{DEFAULT_LANGUAGE, DEFAULT_SENDER_ID, OutboundMetadata, OutboundPayload, Utterance};
pub use target::BackendTarget;
pub use transport::{HttpTransport, Transport, parse_url, probe};
