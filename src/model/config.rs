use serde::{Deserialize, Serialize};

use crate::grid::GRID_LEN;

/// Number of token classes plus the reserved start marker.
pub const VOCAB_SIZE: usize = 4;

/// Reserved vocabulary symbol used only to seed autoregressive decoding.
/// Never a valid prediction target in stored grids.
pub const START_TOKEN: u32 = 3;

/// Model hyperparameters.
///
/// Layer count, head count and width are fixed at construction and frozen for
/// the model's lifetime; changing them requires a full reinitialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Encoder sequence length the model was constructed for
    pub input_seq_len: usize,
    /// Decoder sequence length the model was constructed for
    pub target_seq_len: usize,
    /// Embedding dimension
    pub d_model: usize,
    /// Number of attention heads
    pub n_head: usize,
    /// Number of encoder layers (the decoder uses the same count)
    pub n_layer: usize,
    /// Output vocabulary size
    pub vocab_size: usize,
    /// Maximum sequence length covered by the positional tables
    pub max_pos_len: usize,
}

impl ModelConfig {
    /// Dimension per attention head.
    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.d_model / self.n_head
    }

    /// Validate that the configuration is internally consistent.
    ///
    /// # Errors
    /// Returns an error if the configuration is internally inconsistent.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.d_model % self.n_head != 0 {
            return Err("d_model must be divisible by n_head");
        }
        if self.vocab_size == 0 {
            return Err("vocab_size must be positive");
        }
        if self.n_layer == 0 {
            return Err("n_layer must be positive");
        }
        if self.max_pos_len < self.input_seq_len.max(self.target_seq_len) {
            return Err("max_pos_len must cover both configured sequence lengths");
        }
        Ok(())
    }

    /// Configuration with the given encoder/decoder lengths and the standard
    /// width (d_model 128, 8 heads, 3 layers).
    #[must_use]
    pub fn with_lengths(input_seq_len: usize, target_seq_len: usize) -> Self {
        Self {
            input_seq_len,
            target_seq_len,
            d_model: 128,
            n_head: 8,
            n_layer: 3,
            vocab_size: VOCAB_SIZE,
            max_pos_len: 6000,
        }
    }

    /// Canonical 441/441 shape used for checkpoint restore and reset.
    #[must_use]
    pub fn canonical() -> Self {
        Self::with_lengths(GRID_LEN, GRID_LEN)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::canonical()
    }
}
