//! ViT appearance encoder (`google/vit-base-patch16-224` layout).

use std::path::Path;

use candle_core::{Device, IndexOp, Module, Result, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, LayerNorm, VarBuilder};
use serde::Deserialize;
use tracing::info;

use super::error::ModelError;
use super::transformer::{EncoderDims, EncoderLayer, load_layers, run_layers};
use super::utils::{mmap_model_weights, param, read_model_config};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VitConfig {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub layer_norm_eps: f64,
    pub image_size: usize,
    pub patch_size: usize,
    pub num_channels: usize,
}

impl Default for VitConfig {
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
        }
    }
}

impl VitConfig {
    pub fn num_patches(&self) -> usize {
        let side = self.image_size / self.patch_size;
        side * side
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

pub struct VitEncoder {
    patch_embed: Conv2d,
    cls_token: Tensor,
    position_embeddings: Tensor,
    layers: Vec<EncoderLayer>,
    layernorm: LayerNorm,
    config: VitConfig,
}

impl VitEncoder {
    /// Loads `config.json` + `model.safetensors` from a model directory.
    pub fn load(model_dir: &Path, device: &Device) -> std::result::Result<Self, ModelError> {
        let config: VitConfig = read_model_config(model_dir)?;
        let vb = mmap_model_weights(model_dir, device)?;

        let encoder = Self::new(vb, config).map_err(|e| ModelError::ModelLoadFailed {
            reason: format!("Failed to load ViT weights: {}", e),
        })?;

        info!(
            model_dir = %model_dir.display(),
            hidden_size = encoder.config.hidden_size,
            num_layers = encoder.config.num_hidden_layers,
            "ViT appearance encoder loaded"
        );

        Ok(encoder)
    }

    /// Builds the encoder from a var builder; weights may sit under `vit.` or at the root.
    pub fn new(vb: VarBuilder, config: VitConfig) -> Result<Self> {
        let vb = if vb.contains_tensor("vit.embeddings.cls_token") {
            vb.pp("vit")
        } else {
            vb
        };

        let h = config.hidden_size;
        let embeddings = vb.pp("embeddings");
        let patch_embed = candle_nn::conv2d(
            config.num_channels,
            h,
            config.patch_size,
            Conv2dConfig {
                stride: config.patch_size,
                ..Default::default()
            },
            embeddings.pp("patch_embeddings").pp("projection"),
        )?;
        let cls_token = param(&embeddings, (1, 1, h), "cls_token")?;
        let position_embeddings = param(
            &embeddings,
            (1, config.num_patches() + 1, h),
            "position_embeddings",
        )?;

        let layers = load_layers(
            vb.pp("encoder").pp("layer"),
            config.num_hidden_layers,
            &config.dims(),
        )?;
        let layernorm = candle_nn::layer_norm(h, config.layer_norm_eps, vb.pp("layernorm"))?;

        Ok(Self {
            patch_embed,
            cls_token,
            position_embeddings,
            layers,
            layernorm,
            config,
        })
    }

    /// Full last hidden state for a `[batch, channels, size, size]` batch.
    pub fn forward(&self, pixels: &Tensor) -> Result<Tensor> {
        let (b, c, height, width) = pixels.dims4()?;
        let size = self.config.image_size;
        if c != self.config.num_channels || height != size || width != size {
            candle_core::bail!(
                "ViT expects [{}, {size}, {size}] pixels, got [{c}, {height}, {width}]",
                self.config.num_channels
            );
        }

        let patches = self
            .patch_embed
            .forward(pixels)?
            .flatten_from(2)?
            .transpose(1, 2)?;
        let cls = self
            .cls_token
            .broadcast_as((b, 1, self.config.hidden_size))?;
        let embeddings = Tensor::cat(&[&cls, &patches], 1)?
            .broadcast_add(&self.position_embeddings)?;

        let hidden = run_layers(&self.layers, &embeddings)?;
        self.layernorm.forward(&hidden)
    }

    /// CLS-token appearance embedding for a single `[channels, size, size]` image.
    pub fn appearance(&self, pixels: &Tensor) -> Result<Tensor> {
        let hidden = self.forward(&pixels.unsqueeze(0)?)?;
        hidden.i((0, 0))
    }

    pub fn config(&self) -> &VitConfig {
        &self.config
    }
}
