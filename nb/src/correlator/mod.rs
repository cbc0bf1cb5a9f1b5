//! Correlator for out-of-band request/response matching
//!
//! The Correlator owns the table of in-flight requests. It issues a token per
//! request, parks the caller on a one-shot channel, and wakes exactly that
//! caller when one of these happens first:
//! - **Resolve:** an inbound callback carrying the token arrives
//! - **Expire:** the per-request deadline elapses
//! - **Fail / Abandon / Shutdown:** the request can no longer be answered

mod config;
mod core;
mod handle;
mod messages;
pub mod supervisor;
mod token;

pub use config::CorrelatorConfig;
pub use self::core::Correlator;
pub use handle::{CorrelatorHandle, Waiter};
pub use messages::{CallbackResult, CorrelatorError, CorrelatorMetrics, ResolutionOutcome};
pub use supervisor::{MAX_TIMEOUT, MIN_TIMEOUT, clamp_timeout};
pub use token::CorrelationToken;
