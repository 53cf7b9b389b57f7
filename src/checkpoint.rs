//! Model persistence.
//!
//! Checkpoints are safetensors files written through the live variable store:
//! an opaque parameter mapping keyed by layer name. Restore builds a fresh
//! model at the canonical 441/441 shape and matches parameters by name and
//! shape; any mismatch falls back to fresh initialization rather than
//! surfacing an error.

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use safetensors::SafeTensors;

use crate::error::Result;
use crate::model::{GridTransformer, ModelConfig};

/// Persist the variable store to `path`, overwriting in place.
///
/// The write is blocking with no atomic rename; interrupting the process
/// mid-write can corrupt the file, which the next restore treats as absent.
///
/// # Errors
/// Returns an error if the parent directory cannot be created or the write
/// fails.
pub fn save(varmap: &VarMap, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    varmap.save(path)?;
    tracing::debug!(path = %path.display(), "checkpoint written");
    Ok(())
}

/// Attempt to restore a model from `path` at the canonical shape.
///
/// Returns `None` when the file is absent, unreadable, not safetensors, or
/// its parameters do not line up with the canonical architecture. Every one
/// of those cases falls back to fresh initialization at the caller.
#[must_use]
pub fn try_restore(path: &Path, device: &Device) -> Option<(GridTransformer, VarMap)> {
    if !path.exists() {
        return None;
    }

    let Ok(data) = std::fs::read(path) else {
        tracing::warn!(path = %path.display(), "checkpoint unreadable, starting fresh");
        return None;
    };
    if SafeTensors::deserialize(&data).is_err() {
        tracing::warn!(path = %path.display(), "checkpoint is not valid safetensors, starting fresh");
        return None;
    }

    let config = ModelConfig::canonical();
    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let net = GridTransformer::new(config, vb).ok()?;

    match varmap.load(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "model restored from checkpoint");
            Some((net, varmap))
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "checkpoint does not match the canonical architecture, starting fresh"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(tag: &str) -> PathBuf {
        let uniq = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("timestamp")
            .as_nanos();
        std::env::temp_dir().join(format!("gridcast_{tag}_{uniq}.safetensors"))
    }

    #[test]
    fn missing_file_restores_nothing() {
        let device = Device::Cpu;
        assert!(try_restore(Path::new("/nonexistent/model.safetensors"), &device).is_none());
    }

    #[test]
    fn garbage_file_falls_back_without_error() {
        let path = temp_path("garbage");
        std::fs::write(&path, b"definitely not safetensors").unwrap();

        let device = Device::Cpu;
        assert!(try_restore(&path, &device).is_none());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mismatched_parameters_fall_back_without_error() {
        let device = Device::Cpu;

        // A valid safetensors file whose tensors have the wrong names.
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        candle_nn::linear(3, 5, vb.pp("some.other")).unwrap();

        let path = temp_path("mismatch");
        varmap.save(&path).unwrap();

        assert!(try_restore(&path, &device).is_none());

        std::fs::remove_file(&path).ok();
    }
}
