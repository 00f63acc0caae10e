//! Pre-norm encoder block shared by the ViT and VideoMAE encoders.
//!
//! Both checkpoints use the same HuggingFace layer layout:
//! `attention.attention.{query,key,value}`, `attention.output.dense`,
//! `intermediate.dense`, `output.dense`, `layernorm_before`, `layernorm_after`.
//! They differ only in where the q/v biases live (`query.bias` vs `q_bias`).

use candle_core::{D, Module, Result, Tensor};
use candle_nn::{LayerNorm, Linear, VarBuilder};

/// Shape parameters of an encoder stack.
#[derive(Debug, Clone, Copy)]
pub struct EncoderDims {
    pub hidden_size: usize,
    pub num_heads: usize,
    pub intermediate_size: usize,
    pub layer_norm_eps: f64,
}

struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn load(vb: VarBuilder, dims: &EncoderDims) -> Result<Self> {
        let h = dims.hidden_size;
        let projection = |name: &str, shared_bias: Option<&str>| -> Result<Linear> {
            let weight = vb.get_with_hints(
                (h, h),
                &format!("{name}.weight"),
                candle_nn::init::DEFAULT_KAIMING_NORMAL,
            )?;
            let bias = if vb.contains_tensor(&format!("{name}.bias")) {
                Some(vb.get(h, &format!("{name}.bias"))?)
            } else if let Some(shared) = shared_bias
                && vb.contains_tensor(shared)
            {
                Some(vb.get(h, shared)?)
            } else {
                None
            };
            Ok(Linear::new(weight, bias))
        };

        if dims.num_heads == 0 || h % dims.num_heads != 0 {
            candle_core::bail!(
                "hidden_size {} is not divisible by num_heads {}",
                h,
                dims.num_heads
            );
        }

        Ok(Self {
            query: projection("query", Some("q_bias"))?,
            key: projection("key", None)?,
            value: projection("value", Some("v_bias"))?,
            num_heads: dims.num_heads,
            head_dim: h / dims.num_heads,
        })
    }

    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (b, n, _) = x.dims3()?;
        x.reshape((b, n, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, n, h) = x.dims3()?;
        let q = self.split_heads(&self.query.forward(x)?)?;
        let k = self.split_heads(&self.key.forward(x)?)?;
        let v = self.split_heads(&self.value.forward(x)?)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.t()?.contiguous()?)? * scale)?;
        let probs = candle_nn::ops::softmax(&scores, D::Minus1)?;

        probs
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, n, h))
    }
}

/// One pre-norm transformer block with exact-GELU MLP.
pub(crate) struct EncoderLayer {
    attention: SelfAttention,
    attention_output: Linear,
    intermediate: Linear,
    output: Linear,
    layernorm_before: LayerNorm,
    layernorm_after: LayerNorm,
}

impl EncoderLayer {
    pub(crate) fn load(vb: VarBuilder, dims: &EncoderDims) -> Result<Self> {
        let attention = SelfAttention::load(vb.pp("attention").pp("attention"), dims)?;
        let attention_output = candle_nn::linear(
            dims.hidden_size,
            dims.hidden_size,
            vb.pp("attention").pp("output").pp("dense"),
        )?;
        let intermediate = candle_nn::linear(
            dims.hidden_size,
            dims.intermediate_size,
            vb.pp("intermediate").pp("dense"),
        )?;
        let output = candle_nn::linear(
            dims.intermediate_size,
            dims.hidden_size,
            vb.pp("output").pp("dense"),
        )?;
        let layernorm_before =
            candle_nn::layer_norm(dims.hidden_size, dims.layer_norm_eps, vb.pp("layernorm_before"))?;
        let layernorm_after =
            candle_nn::layer_norm(dims.hidden_size, dims.layer_norm_eps, vb.pp("layernorm_after"))?;

        Ok(Self {
            attention,
            attention_output,
            intermediate,
            output,
            layernorm_before,
            layernorm_after,
        })
    }

    pub(crate) fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let attn = self
            .attention
            .forward(&self.layernorm_before.forward(x)?)?;
        let x = (self.attention_output.forward(&attn)? + x)?;

        let mlp = self
            .intermediate
            .forward(&self.layernorm_after.forward(&x)?)?
            .gelu_erf()?;
        self.output.forward(&mlp)? + x
    }
}

/// Loads `num_layers` blocks from `{vb}.{i}`.
pub(crate) fn load_layers(
    vb: VarBuilder,
    num_layers: usize,
    dims: &EncoderDims,
) -> Result<Vec<EncoderLayer>> {
    (0..num_layers)
        .map(|i| EncoderLayer::load(vb.pp(i.to_string()), dims))
        .collect()
}

/// Runs `x` through every block in order.
pub(crate) fn run_layers(layers: &[EncoderLayer], x: &Tensor) -> Result<Tensor> {
    let mut hidden = x.clone();
    for layer in layers {
        hidden = layer.forward(&hidden)?;
    }
    Ok(hidden)
}
