//! Code generation backends.
//!
//! [`GenerationBackend`] is the seam the orchestrator depends on. The crate
//! ships an OpenAI-compatible chat completions implementation and a disabled
//! backend for deployments without an API key.

pub mod backend;
pub mod client;
pub mod error;
pub mod traits;
pub mod types;

pub use backend::{build_prompt, ChatGenerationBackend, DisabledBackend, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use client::{ChatClient, RetryConfig};
pub use error::{GenerationError, GenerationResult};
pub use traits::GenerationBackend;
pub use types::{ChatMessage, Role};
