//! Request and outcome types for the captioning pipeline.
//!
//! A request carries at most one uploaded file plus the two optional text
//! fields from the form. Every request ends in exactly one [`CaptionOutcome`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Caption shown when the pipeline failed for a reason the user cannot fix.
pub const PLACEHOLDER_CAPTION: &str = "Caption unavailable";

/// Message shown alongside [`PLACEHOLDER_CAPTION`].
pub const UNEXPECTED_ERROR_MESSAGE: &str =
    "An unexpected error occurred while generating the caption. Please try again.";

/// A file received from the upload form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename, possibly empty
    pub file_name: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
}

/// One caption request.
#[derive(Debug, Clone, Default)]
pub struct CaptionRequest {
    /// The image field, `None` when the form had no file part
    pub file: Option<UploadedFile>,
    /// Optional steering prompt for the caption model
    pub prompt: Option<String>,
    /// Optional purpose label for refinement
    pub purpose: Option<String>,
}

/// Why the shown caption is the unrefined one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// No enhancer credentials were configured
    EnhancerNotConfigured,
    /// The enhancer was called and failed; holds the error text
    RefinementFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::EnhancerNotConfigured => write!(
                f,
                "IBM Watsonx.ai enhancer is not configured. Showing the original caption."
            ),
            Notice::RefinementFailed(detail) => {
                write!(f, "{detail} Showing the original caption.")
            }
        }
    }
}

/// A successfully captioned upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionResult {
    /// The caption to show: refined if refinement succeeded, otherwise the model's
    pub caption: String,
    /// The model's caption, only when refinement changed it
    pub original_caption: Option<String>,
    /// Where the stored upload can be fetched for display
    pub image_url: String,
    /// Set when refinement was skipped or failed
    pub notice: Option<Notice>,
}

/// The single result of handling a [`CaptionRequest`].
#[derive(Debug)]
pub enum CaptionOutcome {
    /// A caption was produced
    Captioned(CaptionResult),
    /// The upload was refused before any model call
    Rejected(UploadError),
    /// The stored image could not be opened; no caption
    Failed { error: String },
    /// Anything else went wrong; rendered with [`PLACEHOLDER_CAPTION`]
    Unexpected { error: String },
}

impl CaptionOutcome {
    /// The caption to display, if any.
    pub fn caption(&self) -> Option<&str> {
        match self {
            CaptionOutcome::Captioned(result) => Some(&result.caption),
            CaptionOutcome::Unexpected { .. } => Some(PLACEHOLDER_CAPTION),
            CaptionOutcome::Rejected(_) | CaptionOutcome::Failed { .. } => None,
        }
    }

    /// The error or warning line to display, if any.
    pub fn message(&self) -> Option<String> {
        match self {
            CaptionOutcome::Captioned(result) => result.notice.as_ref().map(ToString::to_string),
            CaptionOutcome::Rejected(err) => Some(err.to_string()),
            CaptionOutcome::Failed { error } | CaptionOutcome::Unexpected { error } => {
                Some(error.clone())
            }
        }
    }
}

/// Serializable caption record for command-line output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionRecord {
    /// Path of the captioned image as given
    pub image: String,

    /// Final caption
    pub caption: String,

    /// Model caption, when refinement changed it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_caption: Option<String>,

    /// Purpose used for refinement, when refinement was attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Refinement notice, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captioned(notice: Option<Notice>) -> CaptionOutcome {
        CaptionOutcome::Captioned(CaptionResult {
            caption: "a cat".to_string(),
            original_caption: None,
            image_url: "/uploads/cat.jpg".to_string(),
            notice,
        })
    }

    #[test]
    fn test_outcome_caption_and_message() {
        let plain = captioned(None);
        assert_eq!(plain.caption(), Some("a cat"));
        assert_eq!(plain.message(), None);

        let rejected = CaptionOutcome::Rejected(UploadError::NoFilePart);
        assert_eq!(rejected.caption(), None);
        assert_eq!(rejected.message().as_deref(), Some("No image file part"));

        let unexpected = CaptionOutcome::Unexpected {
            error: UNEXPECTED_ERROR_MESSAGE.to_string(),
        };
        assert_eq!(unexpected.caption(), Some(PLACEHOLDER_CAPTION));
    }

    #[test]
    fn test_notice_mentions_not_configured() {
        let outcome = captioned(Some(Notice::EnhancerNotConfigured));
        assert!(outcome.message().unwrap().contains("not configured"));
    }

    #[test]
    fn test_refinement_failed_notice_keeps_detail() {
        let notice = Notice::RefinementFailed(
            "Error during IBM Watsonx.ai refinement: quota exceeded".to_string(),
        );
        let text = notice.to_string();
        assert!(text.starts_with("Error during IBM Watsonx.ai refinement: quota exceeded"));
    }

    #[test]
    fn test_record_skips_empty_fields() {
        let record = CaptionRecord {
            image: "cat.jpg".to_string(),
            caption: "a cat".to_string(),
            original_caption: None,
            purpose: None,
            notice: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"image":"cat.jpg","caption":"a cat"}"#);
    }
}
