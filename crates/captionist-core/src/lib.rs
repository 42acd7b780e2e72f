//! Captionist Core - image captioning with optional caption refinement.
//!
//! Captionist turns an uploaded image into a short natural-language caption
//! using a BLIP model running on ONNX Runtime, then optionally rewrites the
//! caption for a stated purpose through IBM watsonx.ai.
//!
//! # Architecture
//!
//! ```text
//! Upload → Validate → Store → Caption (BLIP, beam search) → Refine (watsonx.ai) → Outcome
//! ```
//!
//! The caption model and the enhancer are built once and injected into a
//! [`CaptionService`], which every request shares.
//!
//! # Usage
//!
//! ```rust,ignore
//! use captionist_core::{CaptionEnhancer, CaptionGenerator, CaptionService, Config, UploadStore};
//!
//! #[tokio::main]
//! async fn main() -> captionist_core::Result<()> {
//!     let config = Config::load()?;
//!     let service = CaptionService::new(
//!         CaptionGenerator::load(&config)?,
//!         CaptionEnhancer::from_env(&config.enhancer),
//!         UploadStore::open(config.upload_dir())?,
//!     );
//!     let outcome = service.handle(request).await;
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod caption;
pub mod config;
pub mod enhance;
pub mod error;
pub(crate) mod math;
pub mod pipeline;
pub mod types;

// Re-exports for convenient access
pub use caption::{BlipModel, CaptionGenerator, CaptionModel};
pub use config::{Config, Device};
pub use enhance::{CaptionEnhancer, TextGenerator, WatsonxProvider};
pub use error::{
    CaptionError, CaptionistError, ConfigError, EnhanceError, PipelineError, PipelineResult,
    Result, UploadError,
};
pub use pipeline::{CaptionService, UploadStore};
pub use types::{
    CaptionOutcome, CaptionRecord, CaptionRequest, CaptionResult, Notice, UploadedFile,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
