//! ollama-relay: a thin HTTP relay between a chat front end and an
//! Ollama text-generation server.
//!
//! ```text
//! caller ── GET /ask ──▶ relay ── POST /api/generate ──▶ ollama
//! ```
//!
//! The relay depends only on the `GenerationClient` capability, so
//! the backend can be swapped or faked without touching the routes.
//! Backend faults are data (`GenerationResult::Failure`), never panics
//! or escaped errors.

pub mod error;
pub mod config;
pub mod request;
pub mod client;
pub mod providers;
pub mod relay;
pub mod caller;

pub use error::Error;
pub use config::{BackendConfig, RelayConfig};
pub use client::{GenerationClient, SharedClient};
pub use providers::OllamaClient;
pub use request::
{   Failure
  , FailureKind
  , Generation
  , GenerationOptions
  , GenerationRequest
  , GenerationResult
  , ModelTag
};
pub use caller::RelayCaller;

// ===== Defaults =====

pub const DEFAULT_BACKEND_URL: &str = "http://ollama:11434";
pub const DEFAULT_MODEL: &str = "gemma3n";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8000";

/// Seconds a generation may take
pub const DEFAULT_GENERATE_TIMEOUT_SECS: u64 = 180;
/// Seconds a health probe may take
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 5;
/// Seconds a model listing may take
pub const DEFAULT_LIST_MODELS_TIMEOUT_SECS: u64 = 10;
