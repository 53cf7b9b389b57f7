//! Encoder and decoder blocks.
//!
//! Pre-norm residual blocks with a GELU feed-forward network. The decoder
//! block adds causal self-attention and cross-attention to the encoder
//! output.

use candle_core::{Result, Tensor};
use candle_nn::{LayerNorm, Linear, Module, VarBuilder};

use super::attention::MultiHeadAttention;
use super::config::ModelConfig;

/// Feed-forward network with GELU activation and 4x expansion.
pub struct FeedForward {
    /// Up projection (d_model -> 4 * d_model)
    c_fc: Linear,
    /// Down projection (4 * d_model -> d_model)
    c_proj: Linear,
}

impl FeedForward {
    /// Create a new feed-forward layer.
    ///
    /// # Errors
    /// Returns an error if weight creation fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let d_model = config.d_model;
        let hidden_dim = 4 * d_model;

        let c_fc = candle_nn::linear(d_model, hidden_dim, vb.pp("c_fc"))?;
        let c_proj = candle_nn::linear(hidden_dim, d_model, vb.pp("c_proj"))?;

        Ok(Self { c_fc, c_proj })
    }

    /// Forward pass, shape-preserving over (batch, seq_len, d_model).
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.c_fc.forward(x)?;
        let h = h.gelu()?;
        self.c_proj.forward(&h)
    }
}

/// Encoder block: self-attention over the source sequence, no masking.
pub struct EncoderBlock {
    ln_1: LayerNorm,
    attn: MultiHeadAttention,
    ln_2: LayerNorm,
    ff: FeedForward,
}

impl EncoderBlock {
    /// Create a new encoder block.
    ///
    /// # Errors
    /// Returns an error if weight creation fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let d_model = config.d_model;

        let ln_1 =
            candle_nn::layer_norm(d_model, candle_nn::LayerNormConfig::default(), vb.pp("ln_1"))?;
        let attn = MultiHeadAttention::new(config, vb.pp("attn"))?;
        let ln_2 =
            candle_nn::layer_norm(d_model, candle_nn::LayerNormConfig::default(), vb.pp("ln_2"))?;
        let ff = FeedForward::new(config, vb.pp("ff"))?;

        Ok(Self {
            ln_1,
            attn,
            ln_2,
            ff,
        })
    }

    /// Forward pass over (batch, seq_len, d_model).
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.ln_1.forward(x)?;
        let h = self.attn.forward(&h, &h, None)?;
        let x = (x + h)?;

        let h = self.ln_2.forward(&x)?;
        let h = self.ff.forward(&h)?;
        x + h
    }
}

/// Decoder block: causal self-attention, cross-attention to the encoder
/// output, feed-forward.
pub struct DecoderBlock {
    ln_1: LayerNorm,
    self_attn: MultiHeadAttention,
    ln_2: LayerNorm,
    cross_attn: MultiHeadAttention,
    ln_3: LayerNorm,
    ff: FeedForward,
}

impl DecoderBlock {
    /// Create a new decoder block.
    ///
    /// # Errors
    /// Returns an error if weight creation fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let d_model = config.d_model;

        let ln_1 =
            candle_nn::layer_norm(d_model, candle_nn::LayerNormConfig::default(), vb.pp("ln_1"))?;
        let self_attn = MultiHeadAttention::new(config, vb.pp("self_attn"))?;
        let ln_2 =
            candle_nn::layer_norm(d_model, candle_nn::LayerNormConfig::default(), vb.pp("ln_2"))?;
        let cross_attn = MultiHeadAttention::new(config, vb.pp("cross_attn"))?;
        let ln_3 =
            candle_nn::layer_norm(d_model, candle_nn::LayerNormConfig::default(), vb.pp("ln_3"))?;
        let ff = FeedForward::new(config, vb.pp("ff"))?;

        Ok(Self {
            ln_1,
            self_attn,
            ln_2,
            cross_attn,
            ln_3,
            ff,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `x` - Decoder stream of shape (batch, tgt_len, d_model)
    /// * `memory` - Encoder output of shape (batch, src_len, d_model)
    /// * `causal_mask` - Additive mask of shape (1, 1, tgt_len, tgt_len)
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    pub fn forward(&self, x: &Tensor, memory: &Tensor, causal_mask: &Tensor) -> Result<Tensor> {
        let h = self.ln_1.forward(x)?;
        let h = self.self_attn.forward(&h, &h, Some(causal_mask))?;
        let x = (x + h)?;

        // Cross-attention sees the full encoder output, unmasked.
        let h = self.ln_2.forward(&x)?;
        let h = self.cross_attn.forward(&h, memory, None)?;
        let x = (x + h)?;

        let h = self.ln_3.forward(&x)?;
        let h = self.ff.forward(&h)?;
        x + h
    }
}
