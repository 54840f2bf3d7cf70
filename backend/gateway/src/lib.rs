//! ChatITP HTTP API.
//!
//! JSON endpoints under `/llm` front the conversation engine; `/api/health`
//! reports liveness.

pub mod auth;
pub mod error;
pub mod health_api;
pub mod llm_api;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, start_server, GatewayState};
