//! Encoder-decoder transformer mapping feature sequences to token grids.
//!
//! The encoder consumes an embedded continuous feature sequence; the decoder
//! consumes an embedded token sequence under a causal mask and cross-attends
//! to the full encoder output, producing per-position logits over the output
//! vocabulary.

use candle_core::{Device, Result, Tensor};
use candle_nn::{LayerNorm, Linear, Module, VarBuilder};

use super::attention::create_causal_mask;
use super::config::ModelConfig;
use super::embedding::{FeatureEmbedding, SinusoidalEncoding, TokenEmbedding};
use super::layers::{DecoderBlock, EncoderBlock};

/// Sequence-to-grid transformer.
///
/// Both driving modes share this forward pass: teacher-forced training feeds
/// the shifted true token grid as `tgt`, greedy decoding feeds the
/// in-progress generation.
pub struct GridTransformer {
    /// Continuous input embedding
    feature_embedding: FeatureEmbedding,
    /// Position signal for the encoder stream
    pos_encoder: SinusoidalEncoding,
    /// Discrete token embedding
    token_embedding: TokenEmbedding,
    /// Position signal for the decoder stream
    pos_decoder: SinusoidalEncoding,
    /// Encoder stack
    encoder: Vec<EncoderBlock>,
    /// Decoder stack
    decoder: Vec<DecoderBlock>,
    /// Final layer norm over the decoder output
    ln_f: LayerNorm,
    /// Output projection (d_model -> vocab_size)
    fc_out: Linear,
    /// Model configuration
    config: ModelConfig,
    /// Device for tensor operations
    device: Device,
}

impl GridTransformer {
    /// Build the model, creating or loading parameters through `vb`.
    ///
    /// # Errors
    /// Returns an error if the configuration is inconsistent or parameter
    /// creation fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        config
            .validate()
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;

        let device = vb.device().clone();

        let feature_embedding = FeatureEmbedding::new(&config, vb.pp("input_embed"))?;
        let token_embedding = TokenEmbedding::new(&config, vb.pp("output_embed"))?;

        // Independent instances for the two streams; same formula.
        let pos_encoder = SinusoidalEncoding::new(&config, &device)?;
        let pos_decoder = SinusoidalEncoding::new(&config, &device)?;

        let mut encoder = Vec::with_capacity(config.n_layer);
        for i in 0..config.n_layer {
            encoder.push(EncoderBlock::new(&config, vb.pp(format!("encoder.{i}")))?);
        }

        let mut decoder = Vec::with_capacity(config.n_layer);
        for i in 0..config.n_layer {
            decoder.push(DecoderBlock::new(&config, vb.pp(format!("decoder.{i}")))?);
        }

        let ln_f = candle_nn::layer_norm(
            config.d_model,
            candle_nn::LayerNormConfig::default(),
            vb.pp("ln_f"),
        )?;

        let fc_out = candle_nn::linear(config.d_model, config.vocab_size, vb.pp("fc_out"))?;

        Ok(Self {
            feature_embedding,
            pos_encoder,
            token_embedding,
            pos_decoder,
            encoder,
            decoder,
            ln_f,
            fc_out,
            config,
            device,
        })
    }

    /// Full forward pass.
    ///
    /// # Arguments
    /// * `src` - Feature sequence of shape (batch, src_len), f32
    /// * `tgt` - Token sequence of shape (batch, tgt_len), u32
    ///
    /// # Returns
    /// Logits of shape (batch, tgt_len, vocab_size)
    ///
    /// # Errors
    /// Returns an error if either sequence exceeds the positional table or a
    /// tensor operation fails.
    pub fn forward(&self, src: &Tensor, tgt: &Tensor) -> Result<Tensor> {
        let (_, src_len) = src.dims2()?;
        let (_, tgt_len) = tgt.dims2()?;

        let max_len = self.config.max_pos_len;
        if src_len > max_len || tgt_len > max_len {
            return Err(candle_core::Error::Msg(format!(
                "Sequence length {}/{} exceeds positional table length {}",
                src_len, tgt_len, max_len
            )));
        }

        let s = self.feature_embedding.forward(src)?;
        let mut memory = self.pos_encoder.forward(&s)?;
        for block in &self.encoder {
            memory = block.forward(&memory)?;
        }

        let t = self.token_embedding.forward(tgt)?;
        let mut x = self.pos_decoder.forward(&t)?;

        let mask = create_causal_mask(tgt_len, &self.device)?;
        for block in &self.decoder {
            x = block.forward(&x, &memory, &mask)?;
        }

        let x = self.ln_f.forward(&x)?;
        self.fc_out.forward(&x)
    }

    /// Get the model configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Get the device.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            d_model: 16,
            n_head: 4,
            n_layer: 1,
            max_pos_len: 64,
            ..ModelConfig::with_lengths(8, 8)
        }
    }

    #[test]
    fn forward_shapes_with_random_init() {
        let device = Device::Cpu;
        let config = tiny_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let model = GridTransformer::new(config.clone(), vb).unwrap();
        let src = Tensor::zeros((1, 5), DType::F32, &device).unwrap();
        let tgt = Tensor::zeros((1, 7), DType::U32, &device).unwrap();

        let logits = model.forward(&src, &tgt).unwrap();
        assert_eq!(logits.dims(), &[1, 7, config.vocab_size]);
    }

    #[test]
    fn source_and_target_lengths_are_independent() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = GridTransformer::new(tiny_config(), vb).unwrap();

        // Lengths other than the configured ones still run; the configured
        // lengths are advisory for the forward pass.
        let src = Tensor::zeros((1, 3), DType::F32, &device).unwrap();
        let tgt = Tensor::zeros((1, 1), DType::U32, &device).unwrap();
        let logits = model.forward(&src, &tgt).unwrap();
        assert_eq!(logits.dims(), &[1, 1, 4]);
    }

    #[test]
    fn oversized_sequence_is_rejected() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = GridTransformer::new(tiny_config(), vb).unwrap();

        let src = Tensor::zeros((1, 65), DType::F32, &device).unwrap();
        let tgt = Tensor::zeros((1, 1), DType::U32, &device).unwrap();
        assert!(model.forward(&src, &tgt).is_err());
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let config = ModelConfig {
            n_head: 5,
            ..tiny_config()
        };
        assert!(GridTransformer::new(config, vb).is_err());
    }
}
