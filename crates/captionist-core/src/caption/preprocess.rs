//! Image preprocessing for the BLIP vision encoder.
//!
//! BLIP base expects:
//! - Input size: 384×384 pixels, bicubic resize
//! - Normalization: pixels scaled to [0, 1], then CLIP mean/std per channel
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// Side length of the square BLIP input.
pub const IMAGE_SIZE: u32 = 384;

/// CLIP normalization mean (per-channel).
const NORM_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std (per-channel).
const NORM_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Preprocess an RGB image for BLIP inference.
///
/// Resizes to `image_size × image_size`, normalizes each channel, and returns
/// an NCHW tensor suitable for ONNX Runtime.
pub fn preprocess(image: &RgbImage, image_size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(image, image_size, image_size, FilterType::CatmullRom);

    let size = image_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));

    // Index the flat buffer directly; `zeros` is always standard layout.
    let plane = size * size;
    if let Some(tensor_data) = tensor.as_slice_mut() {
        for (i, pixel) in resized.as_raw().chunks_exact(CHANNELS).enumerate() {
            for (c, &val) in pixel.iter().enumerate() {
                tensor_data[c * plane + i] = (val as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
            }
        }
    }

    tensor
}
