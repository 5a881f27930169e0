//! OpenAI Responses API backend.
//!
//! Vendor-specific wire details live here so the orchestrator stays
//! backend-agnostic.
mod adapter;
mod config;
pub(crate) mod transport;

pub use adapter::OpenAiBackend;
pub use config::OpenAiClientConfig;
