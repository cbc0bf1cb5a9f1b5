//! HTTP adapter around the bridge

mod routes;
mod service;

pub use routes::{ApiError, AppState, ConversationRequest, router};
pub use service::BridgeService;
