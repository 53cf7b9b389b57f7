//! Model lifecycle and the train/predict/reset operations.
//!
//! [`ModelService`] owns the single live model instance and its backing
//! checkpoint file, replacing ambient global state with an explicit object
//! injected into whatever front-end drives it. All operations run
//! synchronously on the calling thread and block for the full compute;
//! there is no internal locking, so callers must serialize access.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use serde::Serialize;

use crate::checkpoint;
use crate::error::{GridError, Result};
use crate::grid::{self, GRID_LEN};
use crate::inference::greedy_decode;
use crate::model::{GridTransformer, ModelConfig};
use crate::training;

/// Upper bound on the epoch count of a single train request.
pub const MAX_EPOCHS: usize = 5000;
/// Learning rate bounds for a single train request.
pub const MIN_LEARNING_RATE: f64 = 1e-6;
pub const MAX_LEARNING_RATE: f64 = 0.1;

/// A live model together with its trainable variable store.
pub struct GridModel {
    net: GridTransformer,
    varmap: VarMap,
}

impl GridModel {
    fn fresh(config: ModelConfig, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let net = GridTransformer::new(config, vb)?;
        Ok(Self { net, varmap })
    }

    /// The model configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        self.net.config()
    }
}

/// Result of a train operation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrainOutcome {
    pub epochs: usize,
    pub last_loss: f32,
    pub avg_loss: f32,
}

/// Result of a predict operation: a 21x21 matrix of class tokens.
#[derive(Debug, Clone, Serialize)]
pub struct PredictOutcome {
    pub predicted: Vec<Vec<u32>>,
}

/// Result of a reset operation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResetOutcome {
    pub input_len: usize,
    pub target_len: usize,
}

/// Owns the single live model and its checkpoint file.
pub struct ModelService {
    checkpoint_path: PathBuf,
    device: Device,
    model: Option<GridModel>,
}

impl ModelService {
    /// Create a service backed by the given checkpoint path. No model is
    /// constructed until the first operation needs one.
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            device: Device::Cpu,
            model: None,
        }
    }

    /// The backing checkpoint path.
    #[must_use]
    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Configuration of the live model, if one exists yet.
    #[must_use]
    pub fn model_config(&self) -> Option<&ModelConfig> {
        self.model.as_ref().map(GridModel::config)
    }

    /// Return the live model, restoring or constructing it on first use.
    ///
    /// Restore is attempted at the canonical 441/441 shape; a fresh model
    /// uses the caller's requested lengths. Once an instance exists its
    /// shape configuration is frozen for the service lifetime: later calls
    /// requesting different lengths silently reuse the live instance.
    ///
    /// # Errors
    /// Returns an error if fresh construction fails.
    pub fn get_or_create(&mut self, input_len: usize, target_len: usize) -> Result<&mut GridModel> {
        if self.model.is_none() {
            let restored = checkpoint::try_restore(&self.checkpoint_path, &self.device);
            let model = match restored {
                Some((net, varmap)) => GridModel { net, varmap },
                None => {
                    tracing::info!(input_len, target_len, "initializing fresh model");
                    GridModel::fresh(ModelConfig::with_lengths(input_len, target_len), &self.device)?
                }
            };
            self.model = Some(model);
        }
        Ok(self.model.as_mut().expect("model initialized above"))
    }

    /// Run an incremental training request.
    ///
    /// Labels are length-normalized to the 441-token grid; when absent, an
    /// all-zero pseudo-target is used, which performs a real gradient step
    /// toward predicting all zeros. Epochs and learning rate are clamped to
    /// the service bounds. The checkpoint is rewritten after the last epoch.
    ///
    /// # Errors
    /// Returns [`GridError::MalformedInput`] for an empty feature sequence,
    /// or a model/IO error if training or persistence fails.
    pub fn train(
        &mut self,
        features: &[f32],
        labels: Option<&[u32]>,
        epochs: usize,
        learning_rate: f64,
    ) -> Result<TrainOutcome> {
        if features.is_empty() {
            return Err(GridError::MalformedInput(
                "empty feature sequence".to_string(),
            ));
        }

        let target = match labels {
            Some(labels) => grid::normalize_tokens(labels),
            None => vec![0u32; GRID_LEN],
        };

        let epochs = epochs.clamp(1, MAX_EPOCHS);
        let learning_rate = learning_rate.clamp(MIN_LEARNING_RATE, MAX_LEARNING_RATE);

        let model = self.get_or_create(features.len(), GRID_LEN)?;
        let report = training::run_epochs(
            &model.net,
            &model.varmap,
            features,
            &target,
            learning_rate,
            epochs,
        )?;
        tracing::info!(
            epochs = report.epochs,
            last_loss = report.last_loss,
            avg_loss = report.avg_loss,
            "training finished"
        );

        self.save()?;
        Ok(TrainOutcome {
            epochs: report.epochs,
            last_loss: report.last_loss,
            avg_loss: report.avg_loss,
        })
    }

    /// Predict a 21x21 grid for the given feature sequence.
    ///
    /// # Errors
    /// Returns [`GridError::MalformedInput`] for an empty feature sequence,
    /// or a model error if decoding fails.
    pub fn predict(&mut self, features: &[f32]) -> Result<PredictOutcome> {
        if features.is_empty() {
            return Err(GridError::MalformedInput(
                "empty feature sequence".to_string(),
            ));
        }

        let model = self.get_or_create(features.len(), GRID_LEN)?;
        let max_len = model.net.config().target_seq_len;

        let tokens = greedy_decode(&model.net, features, max_len)?;
        let tokens = grid::normalize_tokens(&tokens);
        Ok(PredictOutcome {
            predicted: grid::to_matrix(&tokens),
        })
    }

    /// Discard the live instance, rebuild at the canonical 441/441 shape and
    /// persist the fresh parameters immediately.
    ///
    /// # Errors
    /// Returns an error if construction or persistence fails.
    pub fn reset(&mut self) -> Result<ResetOutcome> {
        let config = ModelConfig::canonical();
        let outcome = ResetOutcome {
            input_len: config.input_seq_len,
            target_len: config.target_seq_len,
        };

        self.model = Some(GridModel::fresh(config, &self.device)?);
        self.save()?;
        tracing::info!("model reset to canonical shape");
        Ok(outcome)
    }

    fn save(&self) -> Result<()> {
        if let Some(model) = &self.model {
            checkpoint::save(&model.varmap, &self.checkpoint_path)?;
        }
        Ok(())
    }
}
