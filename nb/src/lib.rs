//! nanobridge - synchronous bridge to an asynchronous agent backend
//!
//! A caller asks a question and blocks for the answer. The backend only
//! acknowledges the question and delivers the answer later, on a separate
//! HTTP callback. nanobridge matches that callback back to the waiting
//! caller by a correlation token.
//!
//! # Modules
//!
//! - [`correlator`] - table of in-flight requests, tokens and deadlines
//! - [`dispatch`] - outbound payloads, backend transport and dispatch
//! - [`inbound`] - callback validation and delivery
//! - [`bridge`] - ask-and-answer facade used by the HTTP API and the CLI
//! - [`server`] - axum routes and the bound service
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod bridge;
pub mod cli;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod inbound;
pub mod server;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeError, Reply};
pub use config::{BackendConfig, Config, ServerConfig};
pub use correlator::{
    CallbackResult, CorrelationToken, Correlator, CorrelatorConfig, CorrelatorError, CorrelatorHandle,
    CorrelatorMetrics, ResolutionOutcome, Waiter,
};
pub use dispatch::{BackendTarget, Dispatcher, HttpTransport, OutboundPayload, Transport, TransportError, Utterance};
pub use inbound::{AckStatus, CallbackError, InboundReceiver};
pub use server::BridgeService;
