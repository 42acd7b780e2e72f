//! Request orchestration: validate, store, caption, refine.

use crate::caption::CaptionGenerator;
use crate::config::Config;
use crate::enhance::{CaptionEnhancer, DEFAULT_PURPOSE};
use crate::error::{self, CaptionError, EnhanceError};
use crate::types::{
    CaptionOutcome, CaptionRequest, CaptionResult, Notice, UNEXPECTED_ERROR_MESSAGE,
};

use super::upload::{self, UploadStore};

/// Handles caption requests end to end.
///
/// Built once at startup from already-loaded parts and shared between
/// requests. Cloning is cheap.
#[derive(Clone)]
pub struct CaptionService {
    generator: CaptionGenerator,
    enhancer: CaptionEnhancer,
    store: UploadStore,
}

impl CaptionService {
    pub fn new(generator: CaptionGenerator, enhancer: CaptionEnhancer, store: UploadStore) -> Self {
        Self {
            generator,
            enhancer,
            store,
        }
    }

    /// Open the upload directory, resolve enhancer credentials, and load the
    /// configured caption model.
    ///
    /// Loading the model is blocking work; call from `spawn_blocking` inside a runtime.
    pub fn from_config(config: &Config) -> error::Result<Self> {
        let store = UploadStore::open(config.upload_dir())?;
        let enhancer = CaptionEnhancer::from_env(&config.enhancer);
        let generator = CaptionGenerator::load(config)?;
        tracing::info!("Caption model ready ({})", generator.model_name());
        Ok(Self::new(generator, enhancer, store))
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    /// Handle one request. Never fails; every error is folded into the outcome.
    pub async fn handle(&self, request: CaptionRequest) -> CaptionOutcome {
        let file = match upload::validate(request.file.as_ref()) {
            Ok(file) => file,
            Err(err) => {
                tracing::info!("Rejected upload: {err}");
                return CaptionOutcome::Rejected(err);
            }
        };

        let stored = match self.store.save(file).await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::error!("{err}");
                return unexpected();
            }
        };

        let generator = self.generator.clone();
        let path = stored.path.clone();
        let prompt = request.prompt.clone();
        let captioned = tokio::task::spawn_blocking(move || {
            generator.generate_caption(&path, prompt.as_deref())
        })
        .await;

        let caption = match captioned {
            Ok(Ok(caption)) => caption,
            Ok(Err(err @ (CaptionError::ImageNotFound { .. } | CaptionError::ImageOpen { .. }))) => {
                tracing::warn!("{err}");
                return CaptionOutcome::Failed {
                    error: err.to_string(),
                };
            }
            Ok(Err(err)) => {
                tracing::error!("Captioning {:?} failed: {err}", stored.path);
                return unexpected();
            }
            Err(join_err) => {
                tracing::error!("Caption task failed: {join_err}");
                return unexpected();
            }
        };

        let purpose = request
            .purpose
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PURPOSE);

        let (shown, notice) = if self.enhancer.is_configured() {
            match self.enhancer.refine_caption(&caption, purpose).await {
                Ok(refined) => (refined, None),
                Err(err @ EnhanceError::Refinement { .. }) => {
                    (caption.clone(), Some(Notice::RefinementFailed(err.to_string())))
                }
                Err(EnhanceError::NotConfigured) => {
                    (caption.clone(), Some(Notice::EnhancerNotConfigured))
                }
            }
        } else {
            (caption.clone(), Some(Notice::EnhancerNotConfigured))
        };

        let original_caption = (shown != caption).then_some(caption);

        CaptionOutcome::Captioned(CaptionResult {
            caption: shown,
            original_caption,
            image_url: stored.url,
            notice,
        })
    }
}

fn unexpected() -> CaptionOutcome {
    CaptionOutcome::Unexpected {
        error: UNEXPECTED_ERROR_MESSAGE.to_string(),
    }
}
