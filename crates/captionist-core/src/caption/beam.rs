//! Beam search decoding over a step-wise token scorer.
//!
//! The search keeps `num_beams` running sequences. Each step scores every
//! running sequence, expands each with its `2 × num_beams` most likely tokens,
//! and keeps the best continuations. Sequences that emit EOS move into a
//! bounded pool of finished hypotheses scored by length-normalized log
//! probability.

use crate::error::PipelineError;
use crate::math::{log_softmax, top_k_indices};

/// Produces next-token logits for a batch of sequences of equal length.
pub trait StepScorer {
    /// Return one logits row (vocabulary-sized) per input sequence.
    fn next_token_logits(&mut self, sequences: &[Vec<i64>]) -> Result<Vec<Vec<f32>>, PipelineError>;
}

/// Fixed decoding policy for a beam search run.
#[derive(Debug, Clone, Copy)]
pub struct BeamSearchParams {
    /// Number of sequences kept alive per step
    pub num_beams: usize,
    /// Maximum total sequence length, prefix included
    pub max_length: usize,
    /// Token that terminates a hypothesis
    pub eos_token_id: i64,
    /// Exponent applied to the length when normalizing scores
    pub length_penalty: f32,
}

/// Pool of finished hypotheses, capped at `num_beams`.
struct Hypotheses {
    entries: Vec<(f32, Vec<i64>)>,
    num_beams: usize,
    length_penalty: f32,
}

impl Hypotheses {
    fn new(num_beams: usize, length_penalty: f32) -> Self {
        Self {
            entries: Vec::with_capacity(num_beams + 1),
            num_beams,
            length_penalty,
        }
    }

    fn normalize(&self, sum_logprobs: f32, len: usize) -> f32 {
        sum_logprobs / (len.max(1) as f32).powf(self.length_penalty)
    }

    fn worst_score(&self) -> f32 {
        self.entries
            .iter()
            .map(|(score, _)| *score)
            .fold(f32::INFINITY, f32::min)
    }

    fn add(&mut self, tokens: Vec<i64>, sum_logprobs: f32) {
        let score = self.normalize(sum_logprobs, tokens.len());
        if self.entries.len() < self.num_beams || score > self.worst_score() {
            self.entries.push((score, tokens));
            if self.entries.len() > self.num_beams {
                if let Some(worst) = self
                    .entries
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                    .map(|(i, _)| i)
                {
                    self.entries.swap_remove(worst);
                }
            }
        }
    }

    /// Whether no running beam can still beat the worst finished hypothesis.
    fn is_done(&self, best_running_sum: f32, cur_len: usize) -> bool {
        if self.entries.len() < self.num_beams {
            return false;
        }
        self.worst_score() >= self.normalize(best_running_sum, cur_len)
    }

    fn into_best(self) -> Option<Vec<i64>> {
        self.entries
            .into_iter()
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, tokens)| tokens)
    }
}

/// Run beam search from `prefix` and return the best sequence.
///
/// The returned sequence starts with `prefix` and never contains the EOS token.
pub fn beam_search<S: StepScorer + ?Sized>(
    scorer: &mut S,
    prefix: Vec<i64>,
    params: &BeamSearchParams,
) -> Result<Vec<i64>, PipelineError> {
    if prefix.is_empty() {
        return Err(PipelineError::Inference {
            message: "Beam search needs at least one start token".to_string(),
        });
    }
    if params.num_beams == 0 {
        return Err(PipelineError::Inference {
            message: "Beam search needs num_beams > 0".to_string(),
        });
    }
    if prefix.len() >= params.max_length {
        return Ok(prefix);
    }

    let num_beams = params.num_beams;
    let mut running: Vec<(f32, Vec<i64>)> = vec![(0.0, prefix)];
    let mut finished = Hypotheses::new(num_beams, params.length_penalty);
    let mut cur_len = running[0].1.len();

    while cur_len < params.max_length {
        let sequences: Vec<Vec<i64>> = running.iter().map(|(_, seq)| seq.clone()).collect();
        let logits = scorer.next_token_logits(&sequences)?;
        if logits.len() != running.len() {
            return Err(PipelineError::Inference {
                message: format!(
                    "Scorer returned {} rows for {} sequences",
                    logits.len(),
                    running.len()
                ),
            });
        }

        let mut candidates: Vec<(f32, usize, i64)> = Vec::with_capacity(running.len() * 2 * num_beams);
        for (beam_idx, ((score, _), row)) in running.iter().zip(logits.iter()).enumerate() {
            let logprobs = log_softmax(row);
            for token in top_k_indices(&logprobs, 2 * num_beams) {
                candidates.push((score + logprobs[token], beam_idx, token as i64));
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut next: Vec<(f32, Vec<i64>)> = Vec::with_capacity(num_beams);
        for (rank, (score, beam_idx, token)) in candidates.into_iter().enumerate() {
            if token == params.eos_token_id {
                // EOS only counts when it ranks among the top `num_beams` candidates.
                if rank < num_beams {
                    finished.add(running[beam_idx].1.clone(), score);
                }
                continue;
            }
            let mut seq = running[beam_idx].1.clone();
            seq.push(token);
            next.push((score, seq));
            if next.len() == num_beams {
                break;
            }
        }

        cur_len += 1;
        running = next;

        match running.first() {
            Some((best, _)) if finished.is_done(*best, cur_len) => break,
            Some(_) => {}
            None => break,
        }
    }

    for (score, seq) in running {
        finished.add(seq, score);
    }

    finished.into_best().ok_or_else(|| PipelineError::Inference {
        message: "Beam search produced no hypothesis".to_string(),
    })
}
