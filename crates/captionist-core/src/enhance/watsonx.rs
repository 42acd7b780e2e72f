//! IBM watsonx.ai text generation provider.
//!
//! Each call exchanges the API key for an IAM bearer token, then posts to the
//! foundation-model text generation endpoint. Nothing is cached between calls.

use super::provider::{GenerationRequest, GenerationResponse, TextGenerator};
use crate::error::EnhanceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Fixed watsonx.ai service URL.
pub const WATSONX_SERVICE_URL: &str = "https://us-south.ml.cloud.ibm.com";

/// IBM Cloud IAM token endpoint.
pub const IAM_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";

/// API version date sent with every generation call.
const API_VERSION: &str = "2023-05-29";

const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// The three values the service needs. All must be present.
#[derive(Debug, Clone)]
pub struct WatsonxCredentials {
    pub api_key: String,
    pub service_url: String,
    pub project_id: String,
}

/// watsonx.ai provider.
pub struct WatsonxProvider {
    credentials: WatsonxCredentials,
    model_id: String,
    iam_url: String,
    client: reqwest::Client,
}

impl WatsonxProvider {
    pub fn new(credentials: WatsonxCredentials, model_id: &str) -> Self {
        Self::with_iam_url(credentials, model_id, IAM_TOKEN_URL)
    }

    /// Create with a custom IAM endpoint.
    pub fn with_iam_url(credentials: WatsonxCredentials, model_id: &str, iam_url: &str) -> Self {
        Self {
            credentials: WatsonxCredentials {
                service_url: credentials.service_url.trim_end_matches('/').to_string(),
                ..credentials
            },
            model_id: model_id.to_string(),
            iam_url: iam_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn access_token(&self) -> Result<String, EnhanceError> {
        let resp = self
            .client
            .post(&self.iam_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", IAM_GRANT_TYPE),
                ("apikey", self.credentials.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| refinement(format!("IAM token request failed: {e}"), None))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(refinement(
                format!("IAM HTTP {status}: {text}"),
                Some(status.as_u16()),
            ));
        }

        let token: IamTokenResponse = resp
            .json()
            .await
            .map_err(|e| refinement(format!("Failed to parse IAM token response: {e}"), None))?;

        Ok(token.access_token)
    }
}

fn refinement(message: String, status_code: Option<u16>) -> EnhanceError {
    EnhanceError::Refinement {
        message,
        status_code,
    }
}

// --- Request types ---

#[derive(Serialize)]
struct TextGenerationRequest<'a> {
    input: &'a str,
    model_id: &'a str,
    project_id: &'a str,
    parameters: TextGenerationParameters,
}

#[derive(Serialize)]
struct TextGenerationParameters {
    decoding_method: &'static str,
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
}

// --- Response types ---

#[derive(Deserialize)]
struct IamTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct TextGenerationResponse {
    model_id: Option<String>,
    results: Vec<TextGenerationResult>,
}

#[derive(Deserialize)]
struct TextGenerationResult {
    generated_text: String,
    generated_token_count: Option<u32>,
}

#[async_trait]
impl TextGenerator for WatsonxProvider {
    fn name(&self) -> &str {
        "watsonx"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, EnhanceError> {
        let start = Instant::now();
        let token = self.access_token().await?;

        let params = &request.parameters;
        let body = TextGenerationRequest {
            input: &request.prompt,
            model_id: &self.model_id,
            project_id: &self.credentials.project_id,
            parameters: TextGenerationParameters {
                decoding_method: params.method,
                max_new_tokens: params.max_new_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
            },
        };

        let url = format!("{}/ml/v1/text/generation", self.credentials.service_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("version", API_VERSION)])
            .bearer_auth(&token)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| refinement(format!("watsonx.ai request failed: {e}"), None))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(refinement(
                format!("watsonx.ai HTTP {status}: {text}"),
                Some(status.as_u16()),
            ));
        }

        let gen_resp: TextGenerationResponse = resp
            .json()
            .await
            .map_err(|e| refinement(format!("Failed to parse watsonx.ai response: {e}"), None))?;

        let result = gen_resp.results.into_iter().next().ok_or_else(|| {
            refinement(
                "watsonx.ai returned empty results array; no content generated".to_string(),
                None,
            )
        })?;

        let text = result.generated_text.trim().to_string();
        if text.is_empty() {
            return Err(refinement(
                "watsonx.ai returned empty text; no content generated".to_string(),
                None,
            ));
        }

        Ok(GenerationResponse {
            text,
            model: gen_resp.model_id.unwrap_or_else(|| self.model_id.clone()),
            generated_tokens: result.generated_token_count,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
