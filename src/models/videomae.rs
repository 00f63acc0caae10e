//! VideoMAE action encoder (`MCG-NJU/videomae-base` layout).
//!
//! The tubelet embedding is a Conv3d whose kernel equals its stride, so it is
//! computed as an unfold into non-overlapping tubelets followed by one matmul.

use std::path::Path;

use candle_core::{Device, Module, Result, Tensor};
use candle_nn::{LayerNorm, VarBuilder};
use serde::Deserialize;
use tracing::info;

use super::error::ModelError;
use super::transformer::{EncoderDims, EncoderLayer, load_layers, run_layers};
use super::utils::{mmap_model_weights, read_model_config};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoMaeConfig {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub layer_norm_eps: f64,
    pub image_size: usize,
    pub patch_size: usize,
    pub num_channels: usize,
    pub num_frames: usize,
    pub tubelet_size: usize,
    pub use_mean_pooling: bool,
}

impl Default for VideoMaeConfig {
    fn default() -> Self {
        Self {
            hidden_size: 768,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            intermediate_size: 3072,
            layer_norm_eps: 1e-12,
            image_size: 224,
            patch_size: 16,
            num_channels: 3,
            num_frames: 16,
            tubelet_size: 2,
            use_mean_pooling: true,
        }
    }
}

impl VideoMaeConfig {
    pub fn num_patches(&self) -> usize {
        let side = self.image_size / self.patch_size;
        (self.num_frames / self.tubelet_size) * side * side
    }

    fn tubelet_volume(&self) -> usize {
        self.num_channels * self.tubelet_size * self.patch_size * self.patch_size
    }

    fn dims(&self) -> EncoderDims {
        EncoderDims {
            hidden_size: self.hidden_size,
            num_heads: self.num_attention_heads,
            intermediate_size: self.intermediate_size,
            layer_norm_eps: self.layer_norm_eps,
        }
    }
}

/// Fixed sinusoid position table, `[positions, dim]`.
///
/// Even columns hold `sin(pos / 10000^(2i/dim))`, odd columns the matching cosine.
pub fn sinusoid_table(positions: usize, dim: usize) -> Vec<f32> {
    let mut table = Vec::with_capacity(positions * dim);
    for pos in 0..positions {
        for j in 0..dim {
            let exponent = (2 * (j / 2)) as f64 / dim as f64;
            let angle = pos as f64 / 10000f64.powf(exponent);
            let value = if j % 2 == 0 { angle.sin() } else { angle.cos() };
            table.push(value as f32);
        }
    }
    table
}

pub struct VideoMaeEncoder {
    tubelet_weight: Tensor,
    tubelet_bias: Tensor,
    position_embeddings: Tensor,
    layers: Vec<EncoderLayer>,
    layernorm: Option<LayerNorm>,
    config: VideoMaeConfig,
}

impl VideoMaeEncoder {
    /// Loads `config.json` + `model.safetensors` from a model directory.
    pub fn load(model_dir: &Path, device: &Device) -> std::result::Result<Self, ModelError> {
        let config: VideoMaeConfig = read_model_config(model_dir)?;
        if config.num_frames % config.tubelet_size != 0 {
            return Err(ModelError::InvalidConfig {
                reason: format!(
                    "num_frames ({}) must be a multiple of tubelet_size ({})",
                    config.num_frames, config.tubelet_size
                ),
            });
        }

        let vb = mmap_model_weights(model_dir, device)?;
        let encoder = Self::new(vb, config).map_err(|e| ModelError::ModelLoadFailed {
            reason: format!("Failed to load VideoMAE weights: {}", e),
        })?;

        info!(
            model_dir = %model_dir.display(),
            hidden_size = encoder.config.hidden_size,
            num_layers = encoder.config.num_hidden_layers,
            num_frames = encoder.config.num_frames,
            mean_pooling = encoder.config.use_mean_pooling,
            "VideoMAE action encoder loaded"
        );

        Ok(encoder)
    }

    /// Builds the encoder from a var builder; weights may sit under `videomae.` or at the root.
    pub fn new(vb: VarBuilder, config: VideoMaeConfig) -> Result<Self> {
        let vb = if vb.contains_tensor("videomae.embeddings.patch_embeddings.projection.weight") {
            vb.pp("videomae")
        } else {
            vb
        };

        let h = config.hidden_size;
        let projection = vb.pp("embeddings").pp("patch_embeddings").pp("projection");
        let tubelet_weight = projection.get_with_hints(
            (
                h,
                config.num_channels,
                config.tubelet_size,
                config.patch_size,
                config.patch_size,
            ),
            "weight",
            candle_nn::init::DEFAULT_KAIMING_NORMAL,
        )?;
        let tubelet_weight = tubelet_weight.reshape((h, config.tubelet_volume()))?;
        let tubelet_bias = projection.get(h, "bias")?;

        let num_patches = config.num_patches();
        let position_embeddings = Tensor::from_vec(
            sinusoid_table(num_patches, h),
            (1, num_patches, h),
            vb.device(),
        )?;

        let layers = load_layers(
            vb.pp("encoder").pp("layer"),
            config.num_hidden_layers,
            &config.dims(),
        )?;

        let layernorm = if config.use_mean_pooling {
            None
        } else {
            Some(candle_nn::layer_norm(
                h,
                config.layer_norm_eps,
                vb.pp("layernorm"),
            )?)
        };

        Ok(Self {
            tubelet_weight,
            tubelet_bias,
            position_embeddings,
            layers,
            layernorm,
            config,
        })
    }

    /// Tubelet tokens for a `[frames, channels, size, size]` clip, `[1, tokens, hidden]`.
    fn embed_tubelets(&self, pixels: &Tensor) -> Result<Tensor> {
        let (t, c, height, width) = pixels.dims4()?;
        let cfg = &self.config;
        if t != cfg.num_frames
            || c != cfg.num_channels
            || height != cfg.image_size
            || width != cfg.image_size
        {
            candle_core::bail!(
                "VideoMAE expects [{}, {}, {}, {}] pixels, got [{t}, {c}, {height}, {width}]",
                cfg.num_frames,
                cfg.num_channels,
                cfg.image_size,
                cfg.image_size
            );
        }

        let p = cfg.patch_size;
        let tub = cfg.tubelet_size;
        let (tt, gh, gw) = (t / tub, height / p, width / p);

        // [T, C, H, W] -> [T', H', W', C, tub, p, p], one row per tubelet.
        let tubelets = pixels
            .permute((1, 0, 2, 3))?
            .reshape(vec![c, tt, tub, gh, p, gw, p])?
            .permute(vec![1, 3, 5, 0, 2, 4, 6])?
            .contiguous()?
            .reshape((tt * gh * gw, cfg.tubelet_volume()))?;

        tubelets
            .matmul(&self.tubelet_weight.t()?.contiguous()?)?
            .broadcast_add(&self.tubelet_bias)?
            .unsqueeze(0)
    }

    /// Last hidden state for a single clip, `[1, tokens, hidden]`.
    pub fn forward(&self, pixels: &Tensor) -> Result<Tensor> {
        let tokens = self
            .embed_tubelets(pixels)?
            .broadcast_add(&self.position_embeddings)?;
        let hidden = run_layers(&self.layers, &tokens)?;
        match &self.layernorm {
            Some(ln) => ln.forward(&hidden),
            None => Ok(hidden),
        }
    }

    /// Mean-pooled action embedding, `[hidden]`.
    pub fn action(&self, pixels: &Tensor) -> Result<Tensor> {
        self.forward(pixels)?.mean(1)?.squeeze(0)
    }

    pub fn config(&self) -> &VideoMaeConfig {
        &self.config
    }
}
