//! GPT-2 language model driven from input embeddings.
//!
//! The captioner never feeds token ids for the first step: a visual soft prompt is
//! concatenated in embedding space, so the model exposes [`Gpt2Model::embed_tokens`]
//! and [`Gpt2Model::forward_embeds`] instead of an id-based forward.

use std::path::Path;

use candle_core::{D, Device, IndexOp, Module, Result, Tensor};
use candle_nn::{Embedding, LayerNorm, VarBuilder};
use serde::Deserialize;
use tracing::info;

use super::error::ModelError;
use super::utils::{mmap_model_weights, param, read_model_config};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Gpt2Config {
    pub vocab_size: usize,
    pub n_positions: usize,
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    pub n_inner: Option<usize>,
    pub layer_norm_epsilon: f64,
}

impl Default for Gpt2Config {
    fn default() -> Self {
        Self {
            vocab_size: 50257,
            n_positions: 1024,
            n_embd: 768,
            n_layer: 12,
            n_head: 12,
            n_inner: None,
            layer_norm_epsilon: 1e-5,
        }
    }
}

impl Gpt2Config {
    fn inner_size(&self) -> usize {
        self.n_inner.unwrap_or(4 * self.n_embd)
    }
}

/// GPT-2's transposed linear layer: weight is `[in, out]`.
struct Conv1D {
    weight: Tensor,
    bias: Tensor,
}

impl Conv1D {
    fn load(vb: VarBuilder, nx: usize, nf: usize) -> Result<Self> {
        let weight = param(&vb, (nx, nf), "weight")?;
        let bias = vb.get(nf, "bias")?;
        Ok(Self { weight, bias })
    }
}

impl Module for Conv1D {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.broadcast_matmul(&self.weight)?.broadcast_add(&self.bias)
    }
}

/// Per-layer key/value cache for incremental decoding.
#[derive(Debug, Clone, Default)]
pub struct Gpt2Cache {
    layers: Vec<Option<(Tensor, Tensor)>>,
}

impl Gpt2Cache {
    pub fn new(num_layers: usize) -> Self {
        Self {
            layers: vec![None; num_layers],
        }
    }

    /// Number of cached positions.
    pub fn seq_len(&self) -> usize {
        self.layers
            .first()
            .and_then(|entry| entry.as_ref())
            .and_then(|(k, _)| k.dim(2).ok())
            .unwrap_or(0)
    }
}

struct Attention {
    c_attn: Conv1D,
    c_proj: Conv1D,
    num_heads: usize,
    head_dim: usize,
}

impl Attention {
    fn load(vb: VarBuilder, config: &Gpt2Config) -> Result<Self> {
        let h = config.n_embd;
        if config.n_head == 0 || h % config.n_head != 0 {
            candle_core::bail!("n_embd {} is not divisible by n_head {}", h, config.n_head);
        }
        Ok(Self {
            c_attn: Conv1D::load(vb.pp("c_attn"), h, 3 * h)?,
            c_proj: Conv1D::load(vb.pp("c_proj"), h, h)?,
            num_heads: config.n_head,
            head_dim: h / config.n_head,
        })
    }

    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (b, t, _) = x.dims3()?;
        x.reshape((b, t, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn forward(
        &self,
        x: &Tensor,
        mask: Option<&Tensor>,
        cache: &mut Option<(Tensor, Tensor)>,
    ) -> Result<Tensor> {
        let (b, t, h) = x.dims3()?;
        let qkv = self.c_attn.forward(x)?;
        let q = self.split_heads(&qkv.narrow(D::Minus1, 0, h)?)?;
        let k = self.split_heads(&qkv.narrow(D::Minus1, h, h)?)?;
        let v = self.split_heads(&qkv.narrow(D::Minus1, 2 * h, h)?)?;

        let (k, v) = match cache.take() {
            Some((past_k, past_v)) => (
                Tensor::cat(&[&past_k, &k], 2)?,
                Tensor::cat(&[&past_v, &v], 2)?,
            ),
            None => (k, v),
        };
        *cache = Some((k.clone(), v.clone()));

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let mut scores = (q.matmul(&k.t()?.contiguous()?)? * scale)?;
        if let Some(mask) = mask {
            let mask = mask.broadcast_as(scores.shape())?;
            let neg_inf =
                Tensor::new(f32::NEG_INFINITY, scores.device())?.broadcast_as(scores.shape())?;
            scores = mask.where_cond(&neg_inf, &scores)?;
        }
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;

        let context = probs
            .matmul(&v.contiguous()?)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, t, h))?;
        self.c_proj.forward(&context)
    }
}

struct Block {
    ln_1: LayerNorm,
    attn: Attention,
    ln_2: LayerNorm,
    c_fc: Conv1D,
    mlp_proj: Conv1D,
}

impl Block {
    fn load(vb: VarBuilder, config: &Gpt2Config) -> Result<Self> {
        let h = config.n_embd;
        let eps = config.layer_norm_epsilon;
        let inner = config.inner_size();
        Ok(Self {
            ln_1: candle_nn::layer_norm(h, eps, vb.pp("ln_1"))?,
            attn: Attention::load(vb.pp("attn"), config)?,
            ln_2: candle_nn::layer_norm(h, eps, vb.pp("ln_2"))?,
            c_fc: Conv1D::load(vb.pp("mlp").pp("c_fc"), h, inner)?,
            mlp_proj: Conv1D::load(vb.pp("mlp").pp("c_proj"), inner, h)?,
        })
    }

    fn forward(
        &self,
        x: &Tensor,
        mask: Option<&Tensor>,
        cache: &mut Option<(Tensor, Tensor)>,
    ) -> Result<Tensor> {
        let attn = self.attn.forward(&self.ln_1.forward(x)?, mask, cache)?;
        let x = (x + attn)?;
        // gelu_new: tanh approximation.
        let mlp = self.c_fc.forward(&self.ln_2.forward(&x)?)?.gelu()?;
        let mlp = self.mlp_proj.forward(&mlp)?;
        x + mlp
    }
}

/// Boolean mask (1 = hidden) for `t` new positions after `offset` cached ones.
fn causal_mask(t: usize, offset: usize, device: &Device) -> Result<Tensor> {
    let total = offset + t;
    let mask: Vec<u8> = (0..t)
        .flat_map(|i| (0..total).map(move |j| u8::from(j > offset + i)))
        .collect();
    Tensor::from_vec(mask, (t, total), device)
}

pub struct Gpt2Model {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    config: Gpt2Config,
}

impl Gpt2Model {
    /// Loads `config.json` + `model.safetensors` from a model directory.
    pub fn load(model_dir: &Path, device: &Device) -> std::result::Result<Self, ModelError> {
        let config: Gpt2Config = read_model_config(model_dir)?;
        let vb = mmap_model_weights(model_dir, device)?;
        let model = Self::new(vb, config).map_err(|e| ModelError::ModelLoadFailed {
            reason: format!("Failed to load GPT-2 weights: {}", e),
        })?;

        info!(
            model_dir = %model_dir.display(),
            n_embd = model.config.n_embd,
            n_layer = model.config.n_layer,
            vocab_size = model.config.vocab_size,
            "GPT-2 loaded"
        );

        Ok(model)
    }

    /// Builds the model from a var builder; weights may sit under `transformer.` or at the root.
    pub fn new(vb: VarBuilder, config: Gpt2Config) -> Result<Self> {
        let vb = if vb.contains_tensor("transformer.wte.weight") {
            vb.pp("transformer")
        } else {
            vb
        };

        let h = config.n_embd;
        let wte = candle_nn::embedding(config.vocab_size, h, vb.pp("wte"))?;
        let wpe = candle_nn::embedding(config.n_positions, h, vb.pp("wpe"))?;
        let blocks = (0..config.n_layer)
            .map(|i| Block::load(vb.pp("h").pp(i.to_string()), &config))
            .collect::<Result<Vec<_>>>()?;
        let ln_f = candle_nn::layer_norm(h, config.layer_norm_epsilon, vb.pp("ln_f"))?;

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            config,
        })
    }

    /// Token embeddings for `[batch, seq]` ids.
    pub fn embed_tokens(&self, ids: &Tensor) -> Result<Tensor> {
        self.wte.forward(ids)
    }

    /// Runs `[1, seq, n_embd]` embeddings starting at position `offset` and returns
    /// next-token logits for the last position, `[1, vocab]`.
    pub fn forward_embeds(
        &self,
        embeds: &Tensor,
        offset: usize,
        cache: &mut Gpt2Cache,
    ) -> Result<Tensor> {
        let (_, t, _) = embeds.dims3()?;
        if t == 0 {
            candle_core::bail!("GPT-2 forward called with an empty sequence");
        }
        if offset + t > self.config.n_positions {
            candle_core::bail!(
                "sequence of {} positions exceeds n_positions {}",
                offset + t,
                self.config.n_positions
            );
        }
        if cache.layers.len() != self.blocks.len() {
            *cache = Gpt2Cache::new(self.blocks.len());
        }

        let device = embeds.device();
        let positions = Tensor::arange(offset as u32, (offset + t) as u32, device)?;
        let mut hidden = embeds.broadcast_add(&self.wpe.forward(&positions)?)?;

        let mask = if t > 1 {
            Some(causal_mask(t, offset, device)?)
        } else {
            None
        };

        for (block, layer_cache) in self.blocks.iter().zip(cache.layers.iter_mut()) {
            hidden = block.forward(&hidden, mask.as_ref(), layer_cache)?;
        }

        let last = self.ln_f.forward(&hidden)?.i((.., t - 1, ..))?;
        last.matmul(&self.wte.embeddings().t()?)
    }

    pub fn config(&self) -> &Gpt2Config {
        &self.config
    }

    pub fn new_cache(&self) -> Gpt2Cache {
        Gpt2Cache::new(self.blocks.len())
    }
}
