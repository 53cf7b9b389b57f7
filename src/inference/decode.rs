//! Greedy autoregressive decoding.
//!
//! Repeatedly extends the generated sequence with the argmax of the last
//! position's logits. No sampling, no beam search, no stopping condition
//! other than reaching `max_len`; deterministic for fixed weights and input.

use candle_core::Tensor;

use crate::error::Result;
use crate::model::{GridTransformer, START_TOKEN};

/// Generate exactly `max_len` tokens for the given feature sequence.
///
/// The decoder input is seeded with the start marker, which is not part of
/// the returned sequence.
///
/// # Errors
/// Returns an error if a forward pass or tensor conversion fails.
pub fn greedy_decode(
    model: &GridTransformer,
    features: &[f32],
    max_len: usize,
) -> Result<Vec<u32>> {
    let device = model.device();
    let src = Tensor::from_vec(features.to_vec(), (1, features.len()), device)?;

    let mut generated = vec![START_TOKEN];
    let mut out_tokens = Vec::with_capacity(max_len);

    for _ in 0..max_len {
        let tgt = Tensor::from_vec(generated.clone(), (1, generated.len()), device)?;
        let logits = model.forward(&src, &tgt)?;
        let (_b, tgt_len, _v) = logits.dims3()?;

        let last = logits.narrow(1, tgt_len - 1, 1)?.squeeze(1)?.squeeze(0)?;
        let scores = last.to_vec1::<f32>()?;
        let next = argmax(&scores);

        generated.push(next);
        out_tokens.push(next);
    }

    Ok(out_tokens)
}

/// Index of the largest score. Ties resolve to the earliest index, keeping
/// decoding fully deterministic.
#[allow(clippy::cast_possible_truncation)]
fn argmax(scores: &[f32]) -> u32 {
    let mut best = 0usize;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = i;
        }
    }
    best as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn tiny_model() -> GridTransformer {
        let device = Device::Cpu;
        let config = ModelConfig {
            d_model: 16,
            n_head: 4,
            n_layer: 1,
            max_pos_len: 64,
            ..ModelConfig::with_lengths(8, 8)
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        GridTransformer::new(config, vb).unwrap()
    }

    #[test]
    fn argmax_prefers_earliest_on_ties() {
        assert_eq!(argmax(&[0.0, 1.0, 1.0]), 1);
        assert_eq!(argmax(&[2.0, 2.0, 2.0]), 0);
        assert_eq!(argmax(&[-1.0, -2.0]), 0);
    }

    #[test]
    fn output_length_equals_max_len() {
        let model = tiny_model();
        let features = vec![0.1f32, 0.2, 0.3];

        for max_len in [1usize, 5, 12] {
            let tokens = greedy_decode(&model, &features, max_len).unwrap();
            assert_eq!(tokens.len(), max_len);
        }
    }

    #[test]
    fn tokens_stay_in_vocabulary() {
        let model = tiny_model();
        let tokens = greedy_decode(&model, &[0.7f32], 10).unwrap();
        assert!(tokens.iter().all(|&t| t < 4));
    }

    #[test]
    fn decoding_is_deterministic() {
        let model = tiny_model();
        let features = vec![0.4f32, -0.1, 0.9];

        let first = greedy_decode(&model, &features, 16).unwrap();
        let second = greedy_decode(&model, &features, 16).unwrap();
        assert_eq!(first, second);
    }
}
