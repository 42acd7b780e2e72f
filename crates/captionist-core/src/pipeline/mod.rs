//! Request pipeline.
//!
//! - **upload**: validate the form upload and store it on disk
//! - **service**: run captioning and refinement for one request

pub mod service;
pub mod upload;

pub use service::CaptionService;
pub use upload::{
    sanitize_filename, validate, StoredUpload, UploadStore, ALLOWED_EXTENSIONS, UPLOAD_URL_PREFIX,
};
