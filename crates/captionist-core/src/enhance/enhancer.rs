//! Caption refinement with an optional remote backend.
//!
//! The enhancer is built once at startup. If credentials are missing it is
//! permanently disabled: it holds no client and `refine_caption` returns
//! [`EnhanceError::NotConfigured`] without touching the network.

use std::sync::Arc;

use super::provider::{resolve_env_var, resolve_with, GenerationRequest, TextGenerator};
use super::watsonx::{WatsonxCredentials, WatsonxProvider, WATSONX_SERVICE_URL};
use crate::config::EnhancerConfig;
use crate::error::EnhanceError;

/// Purpose used when the caller gives none.
pub const DEFAULT_PURPOSE: &str = "general description";

/// Rewrites captions for a stated purpose.
#[derive(Clone)]
pub struct CaptionEnhancer {
    backend: Option<Arc<dyn TextGenerator>>,
}

impl CaptionEnhancer {
    /// Build from config, resolving `${VAR}` credentials from the process environment.
    pub fn from_env(config: &EnhancerConfig) -> Self {
        Self::from_credentials(
            resolve_env_var(&config.api_key),
            resolve_env_var(&config.project_id),
            &config.model_id,
        )
    }

    /// Build from config, resolving `${VAR}` credentials through `lookup`.
    pub fn from_lookup<F>(config: &EnhancerConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_credentials(
            resolve_with(&config.api_key, &lookup),
            resolve_with(&config.project_id, &lookup),
            &config.model_id,
        )
    }

    fn from_credentials(
        api_key: Option<String>,
        project_id: Option<String>,
        model_id: &str,
    ) -> Self {
        match (api_key, project_id) {
            (Some(api_key), Some(project_id)) => {
                let credentials = WatsonxCredentials {
                    api_key,
                    service_url: WATSONX_SERVICE_URL.to_string(),
                    project_id,
                };
                tracing::info!("Caption enhancer enabled (watsonx.ai, model {model_id})");
                Self::with_generator(Arc::new(WatsonxProvider::new(credentials, model_id)))
            }
            (api_key, project_id) => {
                let mut missing = Vec::new();
                if api_key.is_none() {
                    missing.push("API key");
                }
                if project_id.is_none() {
                    missing.push("project ID");
                }
                tracing::warn!(
                    "Caption enhancer disabled: missing {}. Set IBM_CLOUD_API_KEY and WATSONX_AI_PROJECT_ID.",
                    missing.join(" and ")
                );
                Self::disabled()
            }
        }
    }

    /// An enhancer backed by the given generator.
    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            backend: Some(generator),
        }
    }

    /// An enhancer that never refines.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    /// Whether a backend is available.
    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Rewrite `caption` for `purpose`. A blank purpose means [`DEFAULT_PURPOSE`].
    pub async fn refine_caption(&self, caption: &str, purpose: &str) -> Result<String, EnhanceError> {
        let Some(backend) = &self.backend else {
            return Err(EnhanceError::NotConfigured);
        };

        let purpose = match purpose.trim() {
            "" => DEFAULT_PURPOSE,
            p => p,
        };

        let request = GenerationRequest::refine_caption(caption, purpose);
        let response = backend.generate(&request).await.inspect_err(|e| {
            tracing::warn!("Refinement via {} failed: {e}", backend.name());
        })?;

        tracing::debug!(
            "Refined caption via {} ({}) in {}ms",
            backend.name(),
            response.model,
            response.latency_ms
        );

        Ok(response.text)
    }
}
