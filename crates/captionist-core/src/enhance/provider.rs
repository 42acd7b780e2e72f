//! Text-generation provider trait and request/response types.

use async_trait::async_trait;

use crate::error::EnhanceError;

/// Decoding parameters sent with every generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodingParameters {
    /// Token selection strategy as named by the service ("sample", "greedy")
    pub method: &'static str,
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl DecodingParameters {
    /// Fixed parameters for caption refinement.
    pub const REFINEMENT: Self = Self {
        method: "sample",
        max_new_tokens: 100,
        temperature: 0.7,
        top_p: 1.0,
    };
}

/// A text-generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Full prompt text
    pub prompt: String,
    /// Decoding parameters
    pub parameters: DecodingParameters,
}

impl GenerationRequest {
    /// Build the refinement prompt for a caption and purpose.
    ///
    /// The caption is embedded verbatim.
    pub fn refine_caption(caption: &str, purpose: &str) -> Self {
        let prompt = format!(
            "Enhance and refine the following image caption for the purpose of {purpose}. \
             Make it clear, engaging, and well suited to that purpose.\n\n\
             Original Caption: {caption}\n\n\
             Refined Caption:"
        );

        Self {
            prompt,
            parameters: DecodingParameters::REFINEMENT,
        }
    }
}

/// The response from a generation call.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Generated text, trimmed
    pub text: String,
    /// Model identifier used
    pub model: String,
    /// Tokens generated, if reported
    pub generated_tokens: Option<u32>,
    /// Round-trip latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that text-generation backends implement.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (we need `Arc<dyn TextGenerator>` for dynamic dispatch).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name for logging (e.g., "watsonx").
    fn name(&self) -> &str;

    /// Generate text for the request.
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationResponse, EnhanceError>;
}

/// Resolve `${ENV_VAR}` references in config strings.
///
/// Empty values and unset variables resolve to `None`.
pub fn resolve_env_var(value: &str) -> Option<String> {
    resolve_with(value, |name| std::env::var(name).ok())
}

/// Resolve `${VAR}` references through an arbitrary lookup.
pub fn resolve_with<F>(value: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let resolved = if value.starts_with("${") && value.ends_with('}') {
        lookup(&value[2..value.len() - 1])
    } else {
        Some(value.to_string())
    };
    resolved.filter(|v| !v.trim().is_empty())
}
