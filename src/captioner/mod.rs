//! Visual soft-prompt captioner (GPT-2 + projection prefix).
//!
//! Use [`Captioner::stub`] for tests and local runs without model files.

/// Sampling parameters.
pub mod config;
/// Logits processing and token selection.
pub mod generation;


pub use config::{
    DEFAULT_MAX_NEW_TOKENS, DEFAULT_REPETITION_PENALTY, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
    DEFAULT_TOP_P, GenerationConfig,
};
pub use generation::TokenSampler;

use std::path::Path;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{LayerNorm, Linear, VarBuilder, VarMap};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::constants::{CAPTION_PROMPT, DEFAULT_EOS_TOKEN_ID, EOS_TOKEN, PREFIX_LEN};
use crate::fusion::Emotion;
use crate::models::utils::{load_tokenizer, mmap_safetensors, read_model_config};
use crate::models::{Gpt2Config, Gpt2Model, ModelError};

/// Checkpoint key under which fine-tuned GPT-2 weights are stored.
const CHECKPOINT_GPT2_PREFIX: &str = "gpt2";

/// Continuations used by the stub backend.
const STUB_CONTINUATIONS: &[&str] = &[
    "person waving at the camera",
    "cat jumping onto a table",
    "dog running across the grass",
    "man dancing in a crowded room",
    "woman laughing with her friends",
    "child spinning around in circles",
    "car driving down an empty road",
    "group of people cheering together",
];

/// Projects the fused visual vector into GPT-2's embedding space.
///
/// `Linear(visual_dim -> prefix_len * embed_dim)` reshaped to `[1, prefix_len, embed_dim]`,
/// then `LayerNorm(embed_dim)`. Weights live under `projection.*` and `ln.*`.
pub struct VisualPrefix {
    projection: Linear,
    ln: LayerNorm,
    prefix_len: usize,
    embed_dim: usize,
}

impl VisualPrefix {
    pub fn new(
        vb: VarBuilder,
        visual_dim: usize,
        prefix_len: usize,
        embed_dim: usize,
    ) -> candle_core::Result<Self> {
        let projection = candle_nn::linear(visual_dim, prefix_len * embed_dim, vb.pp("projection"))?;
        let ln = candle_nn::layer_norm(embed_dim, 1e-5, vb.pp("ln"))?;
        Ok(Self {
            projection,
            ln,
            prefix_len,
            embed_dim,
        })
    }

    /// `[visual_dim]` -> `[1, prefix_len, embed_dim]`.
    pub fn forward(&self, fused: &Tensor) -> candle_core::Result<Tensor> {
        let projected = self
            .projection
            .forward(&fused.flatten_all()?.unsqueeze(0)?)?
            .reshape((1, self.prefix_len, self.embed_dim))?;
        self.ln.forward(&projected)
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }
}

struct ModelBackend {
    gpt2: Gpt2Model,
    prefix: VisualPrefix,
    tokenizer: Tokenizer,
    eos_token_id: u32,
    device: Device,
}

enum CaptionerBackend {
    Model(Box<ModelBackend>),
    Stub,
}

/// Generates caption text from a fused visual vector.
pub struct Captioner {
    backend: CaptionerBackend,
    config: GenerationConfig,
}

impl std::fmt::Debug for Captioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Captioner")
            .field(
                "backend",
                &match &self.backend {
                    CaptionerBackend::Model(m) => format!("Model({:?})", m.device),
                    CaptionerBackend::Stub => "Stub".to_string(),
                },
            )
            .field("config", &self.config)
            .finish()
    }
}

impl Captioner {
    /// Loads GPT-2 + tokenizer from `gpt2_dir` and the trained prefix from `checkpoint_path`.
    ///
    /// A missing checkpoint is tolerated: the prefix is randomly initialised and the base
    /// GPT-2 weights are used. When the checkpoint carries `gpt2.*` weights they replace
    /// the base model.
    pub fn load(
        gpt2_dir: &Path,
        checkpoint_path: &Path,
        visual_dim: usize,
        device: &Device,
        config: GenerationConfig,
    ) -> Result<Self, ModelError> {
        config
            .validate()
            .map_err(|reason| ModelError::InvalidConfig { reason })?;

        let tokenizer = load_tokenizer(gpt2_dir).map_err(|e| ModelError::ModelLoadFailed {
            reason: format!("Failed to load tokenizer: {}", e),
        })?;

        let (gpt2, prefix) = if checkpoint_path.is_file() {
            let vb = mmap_safetensors(checkpoint_path, device)?;
            let gpt2 = if vb.contains_tensor(&format!(
                "{CHECKPOINT_GPT2_PREFIX}.transformer.wte.weight"
            )) {
                let gpt2_config: Gpt2Config = read_model_config(gpt2_dir)?;
                info!("Using fine-tuned GPT-2 weights from checkpoint");
                Gpt2Model::new(vb.pp(CHECKPOINT_GPT2_PREFIX), gpt2_config).map_err(|e| {
                    ModelError::ModelLoadFailed {
                        reason: format!("Failed to load checkpoint GPT-2 weights: {}", e),
                    }
                })?
            } else {
                Gpt2Model::load(gpt2_dir, device)?
            };

            let prefix = VisualPrefix::new(vb, visual_dim, PREFIX_LEN, gpt2.config().n_embd)
                .map_err(|e| ModelError::ModelLoadFailed {
                    reason: format!("Failed to load visual prefix: {}", e),
                })?;

            info!(checkpoint = %checkpoint_path.display(), "Captioner checkpoint loaded");
            (gpt2, prefix)
        } else {
            warn!(
                checkpoint = %checkpoint_path.display(),
                "Checkpoint not found; using base weights with an untrained prefix"
            );
            let gpt2 = Gpt2Model::load(gpt2_dir, device)?;
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
            let prefix = VisualPrefix::new(vb, visual_dim, PREFIX_LEN, gpt2.config().n_embd)?;
            (gpt2, prefix)
        };

        Ok(Self::from_parts(gpt2, prefix, tokenizer, device.clone(), config))
    }

    /// Assembles a model-backed captioner from already-loaded parts.
    pub fn from_parts(
        gpt2: Gpt2Model,
        prefix: VisualPrefix,
        tokenizer: Tokenizer,
        device: Device,
        config: GenerationConfig,
    ) -> Self {
        let eos_token_id = tokenizer
            .token_to_id(EOS_TOKEN)
            .unwrap_or(DEFAULT_EOS_TOKEN_ID);

        Self {
            backend: CaptionerBackend::Model(Box::new(ModelBackend {
                gpt2,
                prefix,
                tokenizer,
                eos_token_id,
                device,
            })),
            config,
        }
    }

    pub fn stub(config: GenerationConfig) -> Self {
        warn!("Captioner running in STUB mode (testing only)");
        Self {
            backend: CaptionerBackend::Stub,
            config,
        }
    }

    /// Samples a continuation for `fused` and returns only the newly generated text.
    pub fn generate(&self, fused: &Tensor, seed: u64) -> Result<String, ModelError> {
        match &self.backend {
            CaptionerBackend::Model(backend) => backend.generate(fused, seed, &self.config),
            CaptionerBackend::Stub => stub_continuation(fused),
        }
    }

    pub fn is_stub(&self) -> bool {
        matches!(self.backend, CaptionerBackend::Stub)
    }

    /// End-of-text id (`None` in stub mode).
    pub fn eos_token_id(&self) -> Option<u32> {
        match &self.backend {
            CaptionerBackend::Model(backend) => Some(backend.eos_token_id),
            CaptionerBackend::Stub => None,
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

impl ModelBackend {
    fn generate(
        &self,
        fused: &Tensor,
        seed: u64,
        config: &GenerationConfig,
    ) -> Result<String, ModelError> {
        let prefix = self.prefix.forward(&fused.to_device(&self.device)?)?;

        let encoding = self
            .tokenizer
            .encode(config.prompt.as_str(), false)
            .map_err(|e| ModelError::TokenizationFailed {
                reason: e.to_string(),
            })?;
        let prompt_ids = encoding.get_ids();

        let embeds = if prompt_ids.is_empty() {
            prefix
        } else {
            let ids = Tensor::new(prompt_ids, &self.device)?.unsqueeze(0)?;
            let prompt_embeds = self.gpt2.embed_tokens(&ids)?;
            Tensor::cat(&[&prefix, &prompt_embeds], 1)?
        };

        let mut offset = embeds.dim(1)?;
        let max_new_tokens = config
            .max_new_tokens
            .min(self.gpt2.config().n_positions.saturating_sub(offset));

        debug!(
            prefix_len = self.prefix.prefix_len(),
            prompt_tokens = prompt_ids.len(),
            max_new_tokens,
            seed,
            "Generating caption"
        );

        let mut cache = self.gpt2.new_cache();
        let mut sampler = TokenSampler::new(seed, config);
        let mut generated: Vec<u32> = Vec::with_capacity(max_new_tokens);
        let mut logits = self.gpt2.forward_embeds(&embeds, 0, &mut cache)?;

        while generated.len() < max_new_tokens {
            let next = sampler.sample(&logits, &generated)?;
            if next == self.eos_token_id {
                break;
            }
            generated.push(next);
            if generated.len() == max_new_tokens {
                break;
            }

            let ids = Tensor::new(&[next], &self.device)?.unsqueeze(0)?;
            logits = self
                .gpt2
                .forward_embeds(&self.gpt2.embed_tokens(&ids)?, offset, &mut cache)?;
            offset += 1;
        }

        debug!(generated_tokens = generated.len(), "Caption tokens sampled");

        self.tokenizer
            .decode(&generated, true)
            .map_err(|e| ModelError::TokenizationFailed {
                reason: e.to_string(),
            })
    }
}

fn stub_continuation(fused: &Tensor) -> Result<String, ModelError> {
    let values = fused.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?;

    let mut hasher = blake3::Hasher::new();
    for value in &values {
        hasher.update(&value.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut index_bytes = [0u8; 8];
    index_bytes.copy_from_slice(&digest.as_bytes()[..8]);
    let index = u64::from_le_bytes(index_bytes) as usize % STUB_CONTINUATIONS.len();

    debug!(index, "Generating stub caption");
    Ok(STUB_CONTINUATIONS[index].to_string())
}

/// `"A video of a {label} {text}"`, with any echoed prompt removed from `decoded`.
pub fn compose_caption(emotion: Emotion, decoded: &str) -> String {
    let text = decoded.replace(CAPTION_PROMPT, "");
    format!("{CAPTION_PROMPT} a {} {}", emotion.label(), text.trim())
        .trim_end()
        .to_string()
}
