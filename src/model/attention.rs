//! Multi-head attention.
//!
//! One attention implementation serves all three uses: encoder
//! self-attention, decoder causal self-attention and decoder cross-attention.

use candle_core::{D, Device, Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

use super::config::ModelConfig;

/// Multi-head scaled dot-product attention.
///
/// Queries come from `x`; keys and values from a separate context tensor,
/// which equals `x` for self-attention.
pub struct MultiHeadAttention {
    /// Query projection (d_model -> d_model)
    q_proj: Linear,
    /// Key projection (d_model -> d_model)
    k_proj: Linear,
    /// Value projection (d_model -> d_model)
    v_proj: Linear,
    /// Output projection (d_model -> d_model)
    out_proj: Linear,
    /// Number of attention heads
    n_head: usize,
    /// Embedding dimension
    d_model: usize,
    /// Dimension per head
    head_dim: usize,
}

impl MultiHeadAttention {
    /// Create a new attention layer.
    ///
    /// # Errors
    /// Returns an error if weight creation fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let d_model = config.d_model;

        let q_proj = candle_nn::linear(d_model, d_model, vb.pp("q_proj"))?;
        let k_proj = candle_nn::linear(d_model, d_model, vb.pp("k_proj"))?;
        let v_proj = candle_nn::linear(d_model, d_model, vb.pp("v_proj"))?;
        let out_proj = candle_nn::linear(d_model, d_model, vb.pp("out_proj"))?;

        Ok(Self {
            q_proj,
            k_proj,
            v_proj,
            out_proj,
            n_head: config.n_head,
            d_model,
            head_dim: config.head_dim(),
        })
    }

    /// Attention forward pass.
    ///
    /// # Arguments
    /// * `x` - Query source of shape (batch, q_len, d_model)
    /// * `ctx` - Key/value source of shape (batch, kv_len, d_model)
    /// * `mask` - Optional additive mask broadcast over (batch, n_head, q_len, kv_len)
    ///
    /// # Returns
    /// Output tensor of shape (batch, q_len, d_model)
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    pub fn forward(&self, x: &Tensor, ctx: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let (b, q_len, _c) = x.dims3()?;
        let (_, kv_len, _) = ctx.dims3()?;

        let q = self.q_proj.forward(x)?;
        let k = self.k_proj.forward(ctx)?;
        let v = self.v_proj.forward(ctx)?;

        // Split heads: (B, T, C) -> (B, n_head, T, head_dim)
        let q = q
            .reshape((b, q_len, self.n_head, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let k = k
            .reshape((b, kv_len, self.n_head, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let v = v
            .reshape((b, kv_len, self.n_head, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;

        // Scaled dot-product attention: softmax(QK^T / sqrt(d_k)) * V
        #[allow(clippy::cast_precision_loss)]
        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let k_t = k.transpose(D::Minus2, D::Minus1)?.contiguous()?;
        let att = (q.matmul(&k_t)? * scale)?;

        let att = match mask {
            Some(mask) => att.broadcast_add(mask)?,
            None => att,
        };

        let att = candle_nn::ops::softmax_last_dim(&att)?;

        // (B, n_head, q_len, kv_len) @ (B, n_head, kv_len, head_dim)
        let y = att.matmul(&v)?;

        // Merge heads: (B, n_head, q_len, head_dim) -> (B, q_len, C)
        let y = y
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, q_len, self.d_model))?;

        self.out_proj.forward(&y)
    }
}

/// Create a causal attention mask.
///
/// Returns a mask where position (i, j) is -inf if j > i, else 0. Recomputed
/// for every forward pass from the current decoder length, never cached.
///
/// # Errors
/// Returns an error if tensor creation fails.
pub fn create_causal_mask(seq_len: usize, device: &Device) -> Result<Tensor> {
    let neg_inf = f32::NEG_INFINITY;
    let mut mask_data = Vec::with_capacity(seq_len * seq_len);

    for i in 0..seq_len {
        for j in 0..seq_len {
            if j <= i {
                mask_data.push(0.0f32);
            } else {
                mask_data.push(neg_inf);
            }
        }
    }

    let mask = Tensor::from_vec(mask_data, (seq_len, seq_len), device)?;

    // Add batch and head dimensions: (T, T) -> (1, 1, T, T)
    mask.unsqueeze(0)?.unsqueeze(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn causal_mask_shape() {
        let device = Device::Cpu;
        let mask = create_causal_mask(4, &device).unwrap();
        assert_eq!(mask.dims(), &[1, 1, 4, 4]);
    }

    #[test]
    fn causal_mask_blocks_future_positions() {
        let device = Device::Cpu;
        let mask = create_causal_mask(3, &device).unwrap();
        let mask = mask.squeeze(0).unwrap().squeeze(0).unwrap();
        let values: Vec<Vec<f32>> = mask.to_vec2().unwrap();

        for (i, row) in values.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                if j <= i {
                    assert!(v.is_finite());
                } else {
                    assert!(v.is_infinite() && *v < 0.0);
                }
            }
        }
    }

    #[test]
    fn cross_attention_output_follows_query_length() {
        let device = Device::Cpu;
        let config = ModelConfig {
            d_model: 32,
            n_head: 4,
            ..ModelConfig::with_lengths(8, 8)
        };
        let varmap = VarMap::new();
        let vb = candle_nn::VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let attn = MultiHeadAttention::new(&config, vb).unwrap();

        let x = Tensor::zeros((1, 5, 32), DType::F32, &device).unwrap();
        let ctx = Tensor::zeros((1, 9, 32), DType::F32, &device).unwrap();
        let out = attn.forward(&x, &ctx, None).unwrap();
        assert_eq!(out.dims(), &[1, 5, 32]);
    }
}
