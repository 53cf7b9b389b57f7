pub mod attention;
pub mod config;
pub mod embedding;
pub mod layers;
pub mod transformer;

// Re-exports for convenience
pub use attention::{MultiHeadAttention, create_causal_mask};
pub use config::{ModelConfig, START_TOKEN, VOCAB_SIZE};
pub use embedding::{FeatureEmbedding, SinusoidalEncoding, TokenEmbedding};
pub use layers::{DecoderBlock, EncoderBlock, FeedForward};
pub use transformer::GridTransformer;
