//! Provider adapters for remote food analysis backends.
//!
//! Provides one trait over several inference backends (Anthropic, OpenAI,
//! Hyperbolic, Ollama), shared failure classification, and a factory that
//! builds the configured set.

pub(crate) mod adapter;
pub(crate) mod anthropic;
pub(crate) mod factory;
pub(crate) mod hyperbolic;
pub(crate) mod ollama;
pub(crate) mod openai;
pub(crate) mod retry;

pub use adapter::{
    parse_analysis, resolve_env_var, tracked_call, DispatchSettings, EncodedImage, HealthCheck,
    Payload, PromptOptions, ProviderAdapter, ProviderRequest, ProviderResponse,
};
pub use anthropic::AnthropicAdapter;
pub use factory::{ProviderFactory, PROVIDER_NAMES};
pub use hyperbolic::HyperbolicAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use retry::{
    backoff_duration, backoff_with_jitter, classify_status, classify_transport, retry_after,
};
