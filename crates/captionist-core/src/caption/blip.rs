//! BLIP ONNX sessions, tokenizer, and generation loop.
//!
//! Loads the BLIP vision encoder and text decoder exported to ONNX, plus the
//! BERT WordPiece tokenizer. Captions are produced by encoding the image once
//! and beam-searching the decoder against the encoder states.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::RgbImage;
use ort::ep::{ExecutionProvider, CUDA as CUDAExecutionProvider};
use ort::session::Session;
use ort::value::{DynValue, Value};

use super::beam::{beam_search, BeamSearchParams, StepScorer};
use super::preprocess::{preprocess, IMAGE_SIZE};
use super::CaptionModel;
use crate::config::Device;
use crate::error::{PipelineError, PipelineResult};

/// Vision encoder ONNX filename.
pub const VISION_MODEL_FILENAME: &str = "vision_model.onnx";

/// Text decoder ONNX filename.
pub const TEXT_DECODER_FILENAME: &str = "text_decoder_model.onnx";

/// Tokenizer filename.
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// `[DEC]`, the decoder start token.
const BOS_TOKEN_ID: i64 = 30522;

/// `[SEP]`, which BLIP uses as end-of-sequence.
const EOS_TOKEN_ID: i64 = 102;

/// `[PAD]`.
const PAD_TOKEN_ID: i64 = 0;

/// Beam width for every caption.
pub const NUM_BEAMS: usize = 3;

/// Maximum caption length in tokens, prompt included.
pub const MAX_LENGTH: usize = 50;

/// BLIP captioning model running on ONNX Runtime.
///
/// Sessions sit behind a `Mutex` because `Session::run` requires `&mut self`.
pub struct BlipModel {
    vision: Mutex<Session>,
    decoder: Mutex<Session>,
    /// Name of the vision encoder's pixel input.
    vision_input: String,
    /// Decoder input names, as declared by the model.
    decoder_inputs: Vec<String>,
    tokenizer: tokenizers::Tokenizer,
}

impl BlipModel {
    /// Load the encoder, decoder, and tokenizer from `model_dir`.
    pub fn load(model_dir: &Path, requested: Device) -> PipelineResult<Self> {
        let vision_path = model_dir.join(VISION_MODEL_FILENAME);
        let decoder_path = model_dir.join(TEXT_DECODER_FILENAME);
        let tokenizer_path = model_dir.join(TOKENIZER_FILENAME);

        for path in [&vision_path, &decoder_path, &tokenizer_path] {
            if !path.exists() {
                return Err(PipelineError::ModelLoad {
                    path: path.clone(),
                    message: "Model not found. Run `captionist models download` first."
                        .to_string(),
                });
            }
        }

        let device = resolve_device(requested);
        tracing::info!("Loading BLIP model from {:?} on {}", model_dir, device);

        let vision = build_session(&vision_path, device)?;
        let decoder = build_session(&decoder_path, device)?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            PipelineError::Tokenizer {
                message: format!("Failed to load tokenizer from {:?}: {e}", tokenizer_path),
            }
        })?;

        let vision_input = vision
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());
        let decoder_inputs: Vec<String> = decoder
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();

        tracing::debug!(
            "BLIP sessions ready (vision input: {:?}, decoder inputs: {:?})",
            vision_input,
            decoder_inputs
        );

        Ok(Self {
            vision: Mutex::new(vision),
            decoder: Mutex::new(decoder),
            vision_input,
            decoder_inputs,
            tokenizer,
        })
    }

    /// Check whether all model files exist.
    pub fn model_exists(model_dir: &Path) -> bool {
        Self::model_files(model_dir).iter().all(|p| p.exists())
    }

    /// Paths of every file the model needs.
    pub fn model_files(model_dir: &Path) -> [PathBuf; 3] {
        [
            model_dir.join(VISION_MODEL_FILENAME),
            model_dir.join(TEXT_DECODER_FILENAME),
            model_dir.join(TOKENIZER_FILENAME),
        ]
    }

    /// Run the vision encoder and return its last hidden state.
    fn encode_image(&self, image: &RgbImage) -> PipelineResult<EncoderStates> {
        let tensor = preprocess(image, IMAGE_SIZE);
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = tensor.iter().copied().collect();

        let input_value =
            Value::from_array((shape, flat_data)).map_err(|e| PipelineError::Inference {
                message: format!("Failed to create pixel tensor: {e}"),
            })?;

        let mut session = self.vision.lock().map_err(|e| PipelineError::Inference {
            message: format!("Vision session lock poisoned: {e}"),
        })?;

        let outputs = session
            .run(ort::inputs![self.vision_input.as_str() => input_value])
            .map_err(|e| PipelineError::Inference {
                message: format!("Vision encoder inference failed: {e}"),
            })?;

        let hidden = outputs
            .iter()
            .find(|(name, _)| *name == "last_hidden_state")
            .ok_or_else(|| PipelineError::Inference {
                message: "Vision encoder did not produce last_hidden_state".to_string(),
            })?;

        let (shape, data) =
            hidden
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Inference {
                    message: format!("Failed to extract last_hidden_state: {e}"),
                })?;

        // [1, tokens, hidden]
        if shape.len() != 3 {
            return Err(PipelineError::Inference {
                message: format!("Unexpected last_hidden_state shape: {:?}", shape),
            });
        }

        Ok(EncoderStates {
            tokens: shape[1] as usize,
            hidden: shape[2] as usize,
            data: data.to_vec(),
        })
    }

    /// Build the decoder start sequence for an optional prompt.
    fn start_sequence(&self, prompt: Option<&str>) -> PipelineResult<Vec<i64>> {
        let Some(prompt) = prompt else {
            return Ok(vec![BOS_TOKEN_ID]);
        };

        let encoding =
            self.tokenizer
                .encode(prompt, true)
                .map_err(|e| PipelineError::Tokenizer {
                    message: format!("Failed to tokenize prompt: {e}"),
                })?;

        Ok(prompt_prefix(encoding.get_ids()))
    }

    /// Decode generated ids, dropping control tokens.
    fn decode(&self, ids: &[i64]) -> PipelineResult<String> {
        let text = self
            .tokenizer
            .decode(&caption_ids(ids), true)
            .map_err(|e| PipelineError::Tokenizer {
                message: format!("Failed to decode caption: {e}"),
            })?;

        Ok(text.trim().to_string())
    }
}

/// Turn a tokenized prompt into a decoder prefix.
///
/// The prompt is tokenized as `[CLS] … [SEP]`; `[CLS]` becomes `[DEC]` and
/// the trailing `[SEP]` is dropped so generation continues the prompt. The
/// result is never empty and never longer than [`MAX_LENGTH`].
fn prompt_prefix(ids: &[u32]) -> Vec<i64> {
    let mut ids: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
    if ids.last() == Some(&EOS_TOKEN_ID) {
        ids.pop();
    }
    match ids.first_mut() {
        Some(first) => *first = BOS_TOKEN_ID,
        None => ids.push(BOS_TOKEN_ID),
    }
    ids.truncate(MAX_LENGTH);
    ids
}

/// Generated ids without BOS, EOS, or padding.
fn caption_ids(ids: &[i64]) -> Vec<u32> {
    ids.iter()
        .filter(|&&id| id != BOS_TOKEN_ID && id != EOS_TOKEN_ID && id != PAD_TOKEN_ID)
        .map(|&id| id as u32)
        .collect()
}

impl CaptionModel for BlipModel {
    fn name(&self) -> &str {
        "blip"
    }

    fn caption(&self, image: &RgbImage, prompt: Option<&str>) -> Result<String, PipelineError> {
        let encoder = self.encode_image(image)?;
        let prefix = self.start_sequence(prompt)?;

        let mut session = self.decoder.lock().map_err(|e| PipelineError::Inference {
            message: format!("Decoder session lock poisoned: {e}"),
        })?;

        let mut scorer = DecoderScorer {
            session: &mut *session,
            input_names: &self.decoder_inputs,
            encoder: &encoder,
        };

        let params = BeamSearchParams {
            num_beams: NUM_BEAMS,
            max_length: MAX_LENGTH,
            eos_token_id: EOS_TOKEN_ID,
            length_penalty: 1.0,
        };
        let ids = beam_search(&mut scorer, prefix, &params)?;
        drop(session);

        self.decode(&ids)
    }
}

/// Vision encoder output for a single image.
struct EncoderStates {
    tokens: usize,
    hidden: usize,
    data: Vec<f32>,
}

/// Runs the text decoder for one beam search step.
///
/// The exported decoder has no KV cache, so every step re-feeds the full
/// sequences.
struct DecoderScorer<'a> {
    session: &'a mut Session,
    input_names: &'a [String],
    encoder: &'a EncoderStates,
}

impl DecoderScorer<'_> {
    fn tensor_i64(shape: Vec<i64>, data: Vec<i64>) -> PipelineResult<DynValue> {
        Value::from_array((shape, data))
            .map(|v| v.into_dyn())
            .map_err(|e| PipelineError::Inference {
                message: format!("Failed to create decoder tensor: {e}"),
            })
    }
}

impl StepScorer for DecoderScorer<'_> {
    fn next_token_logits(&mut self, sequences: &[Vec<i64>]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let batch = sequences.len();
        let seq_len = sequences.first().map(Vec::len).unwrap_or(0);
        let enc = self.encoder;

        let mut inputs: Vec<(String, DynValue)> = Vec::with_capacity(self.input_names.len());
        for name in self.input_names {
            let value = match name.as_str() {
                "input_ids" => {
                    let ids: Vec<i64> = sequences.iter().flatten().copied().collect();
                    Self::tensor_i64(vec![batch as i64, seq_len as i64], ids)?
                }
                "attention_mask" => {
                    Self::tensor_i64(vec![batch as i64, seq_len as i64], vec![1; batch * seq_len])?
                }
                "encoder_attention_mask" => Self::tensor_i64(
                    vec![batch as i64, enc.tokens as i64],
                    vec![1; batch * enc.tokens],
                )?,
                "encoder_hidden_states" => {
                    let mut states = Vec::with_capacity(batch * enc.data.len());
                    for _ in 0..batch {
                        states.extend_from_slice(&enc.data);
                    }
                    Value::from_array((
                        vec![batch as i64, enc.tokens as i64, enc.hidden as i64],
                        states,
                    ))
                    .map(|v| v.into_dyn())
                    .map_err(|e| PipelineError::Inference {
                        message: format!("Failed to create encoder state tensor: {e}"),
                    })?
                }
                other => {
                    return Err(PipelineError::Inference {
                        message: format!(
                            "Unsupported decoder input '{other}' (expected an export without KV cache)"
                        ),
                    });
                }
            };
            inputs.push((name.clone(), value));
        }

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| PipelineError::Inference {
                message: format!("Text decoder inference failed: {e}"),
            })?;

        let logits = outputs
            .iter()
            .find(|(name, _)| *name == "logits")
            .ok_or_else(|| PipelineError::Inference {
                message: "Text decoder did not produce logits".to_string(),
            })?;

        let (shape, data) =
            logits
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Inference {
                    message: format!("Failed to extract logits: {e}"),
                })?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        last_position_logits(&dims, data, batch)
    }
}

/// Slice `[batch, seq, vocab]` logits down to the last position of each row.
fn last_position_logits(
    dims: &[i64],
    data: &[f32],
    batch: usize,
) -> PipelineResult<Vec<Vec<f32>>> {
    let malformed = || PipelineError::Inference {
        message: format!("Unexpected logits shape: {:?}", dims),
    };

    let [rows, steps, vocab] = dims else {
        return Err(malformed());
    };
    let (rows, steps, vocab) = (*rows as usize, *steps as usize, *vocab as usize);
    if rows != batch || steps == 0 || vocab == 0 || data.len() != rows * steps * vocab {
        return Err(malformed());
    }

    Ok((0..batch)
        .map(|b| {
            let start = (b * steps + steps - 1) * vocab;
            data[start..start + vocab].to_vec()
        })
        .collect())
}

/// Pick the concrete device for a requested one.
fn resolve_device(requested: Device) -> Device {
    if requested == Device::Cpu {
        return Device::Cpu;
    }

    let cuda_available = CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false);

    match requested {
        _ if cuda_available => Device::Cuda,
        Device::Cuda => {
            tracing::warn!("CUDA requested but not available; falling back to CPU");
            Device::Cpu
        }
        _ => Device::Cpu,
    }
}

/// Build an ONNX session for `path`, registering CUDA when selected.
fn build_session(path: &Path, device: Device) -> PipelineResult<Session> {
    let mut builder = Session::builder().map_err(|e| PipelineError::ModelLoad {
        path: path.to_path_buf(),
        message: format!("Failed to create ONNX session builder: {e}"),
    })?;

    if device == Device::Cuda {
        builder = builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|e| PipelineError::ModelLoad {
                path: path.to_path_buf(),
                message: format!("Failed to register CUDA execution provider: {e}"),
            })?;
    }

    builder
        .commit_from_file(path)
        .map_err(|e| PipelineError::ModelLoad {
            path: path.to_path_buf(),
            message: format!("Failed to load ONNX model: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = match BlipModel::load(dir.path(), Device::Cpu) {
            Ok(_) => panic!("loading from an empty directory should fail"),
            Err(e) => e,
        };
        let msg = err.to_string();
        assert!(msg.contains(VISION_MODEL_FILENAME), "{msg}");
        assert!(msg.contains("captionist models download"), "{msg}");
    }

    #[test]
    fn test_model_exists_requires_all_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!BlipModel::model_exists(dir.path()));

        for path in BlipModel::model_files(dir.path()) {
            std::fs::write(path, b"stub").unwrap();
        }
        assert!(BlipModel::model_exists(dir.path()));
    }

    #[test]
    fn test_cpu_request_never_touches_cuda() {
        assert_eq!(resolve_device(Device::Cpu), Device::Cpu);
    }

    #[test]
    fn test_prompt_prefix_replaces_cls_and_drops_sep() {
        // "[CLS] a photograph of [SEP]"
        let prefix = prompt_prefix(&[101, 1037, 9982, 1997, 102]);
        assert_eq!(prefix, vec![BOS_TOKEN_ID, 1037, 9982, 1997]);
    }

    #[test]
    fn test_prompt_prefix_without_trailing_sep() {
        let prefix = prompt_prefix(&[101, 1037, 9982]);
        assert_eq!(prefix, vec![BOS_TOKEN_ID, 1037, 9982]);
    }

    #[test]
    fn test_prompt_prefix_empty_encoding() {
        assert_eq!(prompt_prefix(&[]), vec![BOS_TOKEN_ID]);
        // A lone [SEP] leaves nothing to replace.
        assert_eq!(prompt_prefix(&[102]), vec![BOS_TOKEN_ID]);
    }

    #[test]
    fn test_prompt_prefix_truncated_to_max_length() {
        let mut ids = vec![101];
        ids.extend(std::iter::repeat(2000).take(MAX_LENGTH + 10));
        ids.push(102);

        let prefix = prompt_prefix(&ids);
        assert_eq!(prefix.len(), MAX_LENGTH);
        assert_eq!(prefix[0], BOS_TOKEN_ID);
        assert!(prefix[1..].iter().all(|&id| id == 2000));
    }

    #[test]
    fn test_caption_ids_drop_control_tokens() {
        let ids = [BOS_TOKEN_ID, 1037, 4937, PAD_TOKEN_ID, 2006, EOS_TOKEN_ID];
        assert_eq!(caption_ids(&ids), vec![1037, 4937, 2006]);
        assert!(caption_ids(&[BOS_TOKEN_ID, EOS_TOKEN_ID]).is_empty());
    }

    #[test]
    fn test_last_position_logits() {
        // 2 rows, 2 steps, vocab 3
        let data = [0.0, 0.1, 0.2, 1.0, 1.1, 1.2, 2.0, 2.1, 2.2, 3.0, 3.1, 3.2];
        let rows = last_position_logits(&[2, 2, 3], &data, 2).unwrap();
        assert_eq!(rows, vec![vec![1.0, 1.1, 1.2], vec![3.0, 3.1, 3.2]]);
    }

    #[test]
    fn test_last_position_logits_rejects_malformed_shapes() {
        assert!(last_position_logits(&[1, 0, 3], &[], 1).is_err());
        assert!(last_position_logits(&[2, 1, 3], &[0.0; 6], 1).is_err());
        assert!(last_position_logits(&[1, 1, 3], &[0.0; 2], 1).is_err());
        assert!(last_position_logits(&[1, 3], &[0.0; 3], 1).is_err());
    }

    #[test]
    fn test_generation_policy_constants() {
        assert_eq!(NUM_BEAMS, 3);
        assert_eq!(MAX_LENGTH, 50);
    }
}
