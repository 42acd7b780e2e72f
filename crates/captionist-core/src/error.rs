//! Error types for the Captionist pipeline.
//!
//! Each stage has its own error enum so the orchestrator can branch on the
//! kind of failure instead of inspecting message text. Display strings are
//! user-facing: they are rendered verbatim on the result page.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Captionist operations.
#[derive(Error, Debug)]
pub enum CaptionistError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Model loading and runtime errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Caption generation errors
    #[error(transparent)]
    Caption(#[from] CaptionError),

    /// Upload validation and storage errors
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Model loading and ONNX runtime errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A model file is missing or could not be loaded
    #[error("Model error for {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    /// Tokenizer failed to load, encode, or decode
    #[error("Tokenizer error: {message}")]
    Tokenizer { message: String },

    /// An ONNX session call failed or produced unexpected output
    #[error("Inference error: {message}")]
    Inference { message: String },
}

/// Caption generation errors.
///
/// The two image variants keep the exact wording shown to users; everything
/// else is an inference failure the caller is expected to handle broadly.
#[derive(Error, Debug)]
pub enum CaptionError {
    /// The image path does not exist
    #[error("Error: Image not found at {}", path.display())]
    ImageNotFound { path: PathBuf },

    /// The file exists but could not be opened or decoded
    #[error("Error opening image: {detail}")]
    ImageOpen { path: PathBuf, detail: String },

    /// The model failed while generating
    #[error("Caption generation failed: {0}")]
    Inference(#[from] PipelineError),
}

/// Caption refinement errors.
#[derive(Error, Debug)]
pub enum EnhanceError {
    /// Credentials were missing at construction; no client exists
    #[error("Error: IBM Watsonx.ai enhancer is not configured.")]
    NotConfigured,

    /// The remote call failed (auth, network, quota, malformed response)
    #[error("Error during IBM Watsonx.ai refinement: {message}")]
    Refinement {
        message: String,
        status_code: Option<u16>,
    },
}

/// Upload validation and storage errors.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The form carried no file field
    #[error("No image file part")]
    NoFilePart,

    /// The file field was submitted without a filename
    #[error("No selected image file")]
    NoSelectedFile,

    /// The extension is not in the allow-list
    #[error("Invalid file type. Allowed types: png, jpg, jpeg, gif.")]
    InvalidFileType { file_name: String },

    /// Writing the upload to disk failed
    #[error("Failed to store upload {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Captionist results.
pub type Result<T> = std::result::Result<T, CaptionistError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
