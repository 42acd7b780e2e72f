//! Caption refinement through a hosted text-generation service.
//!
//! Provides a provider abstraction over text-generation backends (currently
//! IBM watsonx.ai) and the [`CaptionEnhancer`] that callers use.

pub(crate) mod enhancer;
pub(crate) mod provider;
pub(crate) mod watsonx;

pub use enhancer::{CaptionEnhancer, DEFAULT_PURPOSE};
pub use provider::{
    resolve_env_var, DecodingParameters, GenerationRequest, GenerationResponse,
    TextGenerator,
};
pub use watsonx::{WatsonxCredentials, WatsonxProvider, IAM_TOKEN_URL, WATSONX_SERVICE_URL};
