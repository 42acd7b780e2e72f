//! Image captioning.
//!
//! [`CaptionGenerator`] is the entry point: it opens an image from disk,
//! converts it to RGB, and asks a [`CaptionModel`] for a caption. The model is
//! loaded once and shared; [`BlipModel`] is the production implementation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use captionist_core::{CaptionGenerator, Config};
//!
//! let config = Config::load()?;
//! let generator = CaptionGenerator::load(&config)?;
//! let caption = generator.generate_caption("./cat.jpg".as_ref(), Some("a photograph of"))?;
//! ```

pub(crate) mod beam;
pub(crate) mod blip;
pub(crate) mod preprocess;

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use crate::config::Config;
use crate::error::{CaptionError, PipelineError};

pub use self::beam::{beam_search, BeamSearchParams, StepScorer};
pub use self::blip::{BlipModel, MAX_LENGTH, NUM_BEAMS};
pub use self::preprocess::{preprocess, IMAGE_SIZE};

/// An image-to-text model.
///
/// Implementations must be safe to call from several threads; each call is
/// independent.
pub trait CaptionModel: Send + Sync {
    /// Model name for logging.
    fn name(&self) -> &str;

    /// Caption an RGB image, optionally continuing `prompt`.
    ///
    /// `None` means unconditional generation; callers never pass an empty prompt.
    fn caption(&self, image: &RgbImage, prompt: Option<&str>) -> Result<String, PipelineError>;
}

/// Generates captions for images on disk.
#[derive(Clone)]
pub struct CaptionGenerator {
    model: Arc<dyn CaptionModel>,
}

impl CaptionGenerator {
    /// Wrap an already-loaded model.
    pub fn new(model: Arc<dyn CaptionModel>) -> Self {
        Self { model }
    }

    /// Load the configured BLIP model.
    pub fn load(config: &Config) -> Result<Self, PipelineError> {
        let model = BlipModel::load(&config.caption_model_dir(), config.caption.device)?;
        Ok(Self::new(Arc::new(model)))
    }

    /// Name of the underlying model.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Generate a caption for the image at `image_path`.
    ///
    /// A blank prompt is treated as no prompt. Missing and undecodable files
    /// come back as [`CaptionError::ImageNotFound`] and
    /// [`CaptionError::ImageOpen`]; model failures as [`CaptionError::Inference`].
    pub fn generate_caption(
        &self,
        image_path: &Path,
        prompt: Option<&str>,
    ) -> Result<String, CaptionError> {
        let image = open_rgb(image_path)?;
        let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());

        let start = std::time::Instant::now();
        let caption = self.model.caption(&image, prompt)?;
        tracing::debug!(
            "Captioned {:?} with {} ({}) in {:?}",
            image_path,
            self.model.name(),
            if prompt.is_some() { "conditional" } else { "unconditional" },
            start.elapsed()
        );

        Ok(caption)
    }
}

/// Open an image and convert it to 8-bit RGB.
pub fn open_rgb(path: &Path) -> Result<RgbImage, CaptionError> {
    let open_error = |detail: String| CaptionError::ImageOpen {
        path: path.to_path_buf(),
        detail,
    };

    let reader = image::ImageReader::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CaptionError::ImageNotFound {
            path: path.to_path_buf(),
        },
        _ => open_error(e.to_string()),
    })?;

    let image = reader
        .with_guessed_format()
        .map_err(|e| open_error(e.to_string()))?
        .decode()
        .map_err(|e| open_error(e.to_string()))?;

    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes which generation path was taken.
    struct EchoModel {
        calls: AtomicUsize,
    }

    impl CaptionModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        fn caption(&self, image: &RgbImage, prompt: Option<&str>) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match prompt {
                Some(p) => format!("{p} a {}x{} picture", image.width(), image.height()),
                None => format!("a {}x{} picture", image.width(), image.height()),
            })
        }
    }

    struct FailingModel;

    impl CaptionModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        fn caption(&self, _: &RgbImage, _: Option<&str>) -> Result<String, PipelineError> {
            Err(PipelineError::Inference {
                message: "out of memory".to_string(),
            })
        }
    }

    fn echo_generator() -> (CaptionGenerator, Arc<EchoModel>) {
        let model = Arc::new(EchoModel {
            calls: AtomicUsize::new(0),
        });
        (CaptionGenerator::new(model.clone()), model)
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(12, 8, image::Rgb([73, 109, 137]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_missing_image_message_is_exact() {
        let (generator, model) = echo_generator();
        let path = PathBuf::from("/nonexistent/non_existent_image.jpg");
        let err = generator.generate_caption(&path, None).unwrap_err();

        assert!(matches!(err, CaptionError::ImageNotFound { .. }));
        assert_eq!(
            err.to_string(),
            "Error: Image not found at /nonexistent/non_existent_image.jpg"
        );
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_corrupt_image_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let (generator, model) = echo_generator();
        let err = generator.generate_caption(&path, None).unwrap_err();

        assert!(matches!(err, CaptionError::ImageOpen { .. }));
        assert!(err.to_string().starts_with("Error opening image: "));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unconditional_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "test_image.png");
        let (generator, _) = echo_generator();

        let caption = generator.generate_caption(&path, None).unwrap();
        assert_eq!(caption, "a 12x8 picture");
    }

    #[test]
    fn test_conditional_with_prompt_differs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "test_image.png");
        let (generator, _) = echo_generator();

        let plain = generator.generate_caption(&path, None).unwrap();
        let steered = generator
            .generate_caption(&path, Some("a photo of"))
            .unwrap();
        assert_ne!(plain, steered);
        assert!(steered.starts_with("a photo of"));
    }

    #[test]
    fn test_blank_prompt_is_unconditional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "test_image.png");
        let (generator, _) = echo_generator();

        let caption = generator.generate_caption(&path, Some("   ")).unwrap();
        assert_eq!(caption, "a 12x8 picture");
    }

    #[test]
    fn test_format_detected_by_content() {
        // A PNG saved under a .jpg name still decodes.
        let dir = tempfile::tempdir().unwrap();
        let png = write_png(dir.path(), "real.png");
        let misnamed = dir.path().join("misnamed.jpg");
        std::fs::copy(&png, &misnamed).unwrap();

        let image = open_rgb(&misnamed).unwrap();
        assert_eq!(image.dimensions(), (12, 8));
    }

    #[test]
    fn test_grayscale_is_converted_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(5, 5, image::Luma([200])).save(&path).unwrap();

        let image = open_rgb(&path).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "test_image.png");
        let generator = CaptionGenerator::new(Arc::new(FailingModel));

        let err = generator.generate_caption(&path, None).unwrap_err();
        assert!(matches!(err, CaptionError::Inference(_)));
    }
}
