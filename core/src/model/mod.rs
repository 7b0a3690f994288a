//! Arena Model Provider Layer
//!
//! This module provides a unified abstraction over the provider wire formats
//! Arena compares: OpenAI Responses, Anthropic Messages, Gemini and the many
//! Chat Completions clones.
//!
//! Architecture:
//! - [EndpointRegistry]: static catalog of providers and known models
//! - [CapabilityResolver]: reasoning detection and parameter gating
//! - [ProviderClientFactory]: builds a [ModelProvider] per model entry
//! - Wire clients in [providers], sharing the SSE [StreamingProcessor]

pub mod capability;
pub mod error;
pub mod factory;
pub mod metadata;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod streaming;
pub mod types;

// Re-exports
pub use capability::{
  CapabilityCatalog, CapabilityResolver, ModelCapabilities, ReasoningRule, ResolvedCapabilities,
  default_rules,
};
pub use error::{ModelError, Result};
pub use factory::{
  ProviderClientFactory, ProviderFactory, ResolvedProviderClient, normalize_base_url,
};
pub use metadata::{ModelMetadata, ModelMetadataManager};
pub use provider::{ChunkStream, ModelProvider};
pub use registry::{BuiltinModel, CUSTOM_PROVIDER_ID, EndpointRegistry, ProviderEndpoint, RegistryError};
pub use streaming::{StreamParser, StreamingConfig, StreamingProcessor};
pub use types::*;
