//! AI Integration Layer
//!
//! Provider abstraction, output validation, and timeout handling for the
//! external generation calls the workflow depends on.

pub mod provider;
pub mod timeout;
pub mod validation;

pub use provider::{
    GenerationProvider, LlmResponse, OpenAiProvider, ProviderConfig, ResponseMetadata,
    SharedProvider, TokenUsage, create_provider,
};
pub use timeout::with_timeout;
pub use validation::extract_json_from_response;
