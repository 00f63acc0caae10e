use std::io;
use std::path::Path;

use candle_core::{DType, Device, Result as CandleResult, Shape, Tensor};
use candle_nn::VarBuilder;
use candle_nn::init::Init;
use serde::de::DeserializeOwned;
use tokenizers::Tokenizer;

use super::error::ModelError;

/// Weights file expected in every model directory.
pub const WEIGHTS_FILENAME: &str = "model.safetensors";

/// Model configuration expected in every model directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Loads a tokenizer from a model directory or explicit tokenizer.json path.
pub fn load_tokenizer(model_path: &Path) -> io::Result<Tokenizer> {
    let tokenizer_path = if model_path
        .file_name()
        .is_some_and(|name| name == std::ffi::OsStr::new("tokenizer.json"))
    {
        model_path.to_path_buf()
    } else if model_path.is_dir() {
        model_path.join("tokenizer.json")
    } else {
        model_path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Model path has no parent"))?
            .join("tokenizer.json")
    };

    Tokenizer::from_file(&tokenizer_path).map_err(io::Error::other)
}

/// Reads and parses `config.json` from a HuggingFace-style model directory.
pub fn read_model_config<T: DeserializeOwned>(model_dir: &Path) -> Result<T, ModelError> {
    let config_path = model_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Err(ModelError::ModelLoadFailed {
            reason: format!("Missing {CONFIG_FILENAME} in {}", model_dir.display()),
        });
    }

    let content = std::fs::read_to_string(&config_path)?;
    serde_json::from_str(&content).map_err(|e| ModelError::InvalidConfig {
        reason: format!("{}: {}", config_path.display(), e),
    })
}

/// Memory-maps `model.safetensors` from a model directory.
pub fn mmap_model_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>, ModelError> {
    if !model_dir.exists() {
        return Err(ModelError::ModelNotFound {
            path: model_dir.to_path_buf(),
        });
    }

    let weights_path = model_dir.join(WEIGHTS_FILENAME);
    if !weights_path.exists() {
        return Err(ModelError::ModelLoadFailed {
            reason: format!("Missing {WEIGHTS_FILENAME} in {}", model_dir.display()),
        });
    }

    mmap_safetensors(&weights_path, device)
}

/// Memory-maps a single safetensors file.
pub fn mmap_safetensors(path: &Path, device: &Device) -> Result<VarBuilder<'static>, ModelError> {
    // SAFETY: the file is treated as read-only for the lifetime of the process.
    unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }.map_err(|e| {
        ModelError::ModelLoadFailed {
            reason: format!("{}: {}", path.display(), e),
        }
    })
}

/// Fetches a learned parameter (position table, class token, bias vector).
///
/// Safetensors-backed builders ignore the init hint; `VarMap` builders use it
/// so randomly initialised models stay non-degenerate.
pub(crate) fn param<S: Into<Shape>>(vb: &VarBuilder, shape: S, name: &str) -> CandleResult<Tensor> {
    vb.get_with_hints(
        shape,
        name,
        Init::Randn {
            mean: 0.0,
            stdev: 0.02,
        },
    )
}
