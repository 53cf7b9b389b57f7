//! Embedding paths feeding the encoder and decoder.
//!
//! Continuous features pass through a learned affine projection; discrete
//! tokens through a lookup table. Both streams then receive a fixed
//! sinusoidal position signal.

use candle_core::{D, Device, Result, Tensor};
use candle_nn::{Embedding, Linear, Module, VarBuilder};

use super::config::ModelConfig;

/// Continuous input path: each scalar feature is treated as a length-1
/// vector and projected to the model width.
pub struct FeatureEmbedding {
    proj: Linear,
}

impl FeatureEmbedding {
    /// Create a new feature embedding layer.
    ///
    /// # Errors
    /// Returns an error if weight creation fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let proj = candle_nn::linear(1, config.d_model, vb)?;
        Ok(Self { proj })
    }

    /// Project features of shape (batch, seq_len) to (batch, seq_len, d_model).
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    pub fn forward(&self, features: &Tensor) -> Result<Tensor> {
        let x = features.unsqueeze(D::Minus1)?;
        self.proj.forward(&x)
    }
}

/// Discrete output path: token lookup embedding.
pub struct TokenEmbedding {
    embedding: Embedding,
}

impl TokenEmbedding {
    /// Create a new token embedding layer.
    ///
    /// # Errors
    /// Returns an error if weight creation fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let embedding = candle_nn::embedding(config.vocab_size, config.d_model, vb)?;
        Ok(Self { embedding })
    }

    /// Look up token IDs of shape (batch, seq_len) as (batch, seq_len, d_model).
    ///
    /// # Errors
    /// Returns an error if the lookup fails.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        self.embedding.forward(token_ids)
    }
}

/// Fixed sinusoidal positional encoding.
///
/// The table is precomputed once up to `max_pos_len` positions and sliced to
/// the needed length on every call. Position p, channel 2i carries
/// sin(p / 10000^(2i/d)); channel 2i+1 the matching cosine. No learned
/// parameters; purely additive and stateless.
pub struct SinusoidalEncoding {
    table: Tensor,
}

impl SinusoidalEncoding {
    /// Precompute the positional table.
    ///
    /// # Errors
    /// Returns an error if tensor creation fails.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn new(config: &ModelConfig, device: &Device) -> Result<Self> {
        let max_len = config.max_pos_len;
        let d_model = config.d_model;

        let mut data = vec![0f32; max_len * d_model];
        for pos in 0..max_len {
            for i in (0..d_model).step_by(2) {
                let div_term = (-(i as f64) * (10_000f64).ln() / d_model as f64).exp();
                let angle = pos as f64 * div_term;
                data[pos * d_model + i] = angle.sin() as f32;
                if i + 1 < d_model {
                    data[pos * d_model + i + 1] = angle.cos() as f32;
                }
            }
        }

        let table = Tensor::from_vec(data, (max_len, d_model), device)?;
        Ok(Self { table })
    }

    /// Add the position signal to an embedded sequence of shape
    /// (batch, seq_len, d_model), returning the same shape.
    ///
    /// # Errors
    /// Returns an error if `seq_len` exceeds the precomputed table.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (_b, seq_len, _d) = x.dims3()?;
        let pe = self.table.narrow(0, 0, seq_len)?.unsqueeze(0)?;
        x.broadcast_add(&pe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn small_config() -> ModelConfig {
        ModelConfig {
            d_model: 8,
            n_head: 2,
            max_pos_len: 64,
            ..ModelConfig::with_lengths(16, 16)
        }
    }

    #[test]
    fn position_zero_alternates_zero_one() {
        let device = Device::Cpu;
        let enc = SinusoidalEncoding::new(&small_config(), &device).unwrap();
        let row: Vec<f32> = enc.table.narrow(0, 0, 1).unwrap().squeeze(0).unwrap().to_vec1().unwrap();

        // sin(0) = 0 on even channels, cos(0) = 1 on odd channels.
        for (i, v) in row.iter().enumerate() {
            if i % 2 == 0 {
                assert!((v - 0.0).abs() < 1e-6);
            } else {
                assert!((v - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn signal_is_bounded() {
        let device = Device::Cpu;
        let enc = SinusoidalEncoding::new(&small_config(), &device).unwrap();
        let all: Vec<f32> = enc.table.flatten_all().unwrap().to_vec1().unwrap();
        assert!(all.iter().all(|v| v.abs() <= 1.0 + 1e-6));
    }

    #[test]
    fn forward_preserves_shape() {
        let device = Device::Cpu;
        let enc = SinusoidalEncoding::new(&small_config(), &device).unwrap();
        let x = Tensor::zeros((2, 10, 8), DType::F32, &device).unwrap();
        let y = enc.forward(&x).unwrap();
        assert_eq!(y.dims(), &[2, 10, 8]);
    }

    #[test]
    fn feature_embedding_projects_scalars() {
        let device = Device::Cpu;
        let config = small_config();
        let varmap = VarMap::new();
        let vb = candle_nn::VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let embed = FeatureEmbedding::new(&config, vb).unwrap();

        let features = Tensor::from_vec(vec![0.1f32, 0.2, 0.3], (1, 3), &device).unwrap();
        let out = embed.forward(&features).unwrap();
        assert_eq!(out.dims(), &[1, 3, config.d_model]);
    }

    #[test]
    fn token_embedding_covers_full_vocabulary() {
        let device = Device::Cpu;
        let config = small_config();
        let varmap = VarMap::new();
        let vb = candle_nn::VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let embed = TokenEmbedding::new(&config, vb).unwrap();

        let tokens = Tensor::from_vec(vec![0u32, 1, 2, 3], (1, 4), &device).unwrap();
        let out = embed.forward(&tokens).unwrap();
        assert_eq!(out.dims(), &[1, 4, config.d_model]);
    }
}
