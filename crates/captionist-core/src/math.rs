//! Shared math utilities.

/// Log-softmax over a logits row, computed with the max-shift for stability.
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![f32::NEG_INFINITY; logits.len()];
    }
    let sum: f32 = logits.iter().map(|&x| (x - max).exp()).sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|&x| x - log_sum).collect()
}

/// Indices of the `k` largest values, highest first.
///
/// Ties keep the lower index first.
pub fn top_k_indices(values: &[f32], k: usize) -> Vec<usize> {
    let cmp = |a: &usize, b: &usize| values[*b].total_cmp(&values[*a]).then(a.cmp(b));
    let mut indices: Vec<usize> = (0..values.len()).collect();
    // Partial selection first; vocab rows are ~30k wide and we only need a handful.
    if k > 0 && k < indices.len() {
        indices.select_nth_unstable_by(k - 1, cmp);
        indices.truncate(k);
    }
    indices.sort_by(cmp);
    indices.truncate(k);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_softmax_sums_to_one() {
        let out = log_softmax(&[1.0, 2.0, 3.0]);
        let total: f32 = out.iter().map(|x| x.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(out[2] > out[1] && out[1] > out[0]);
    }

    #[test]
    fn test_log_softmax_large_logits_stay_finite() {
        let out = log_softmax(&[1000.0, 1000.0]);
        assert!((out[0] - (0.5f32).ln()).abs() < 1e-5);
        assert!(out.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_top_k_indices() {
        let idx = top_k_indices(&[0.1, 0.7, 0.3, 0.7], 3);
        assert_eq!(idx, vec![1, 3, 2]);
    }

    #[test]
    fn test_top_k_larger_than_len() {
        assert_eq!(top_k_indices(&[0.5, 0.2], 5), vec![0, 1]);
    }
}
