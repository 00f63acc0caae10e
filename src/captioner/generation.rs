//! Token sampling: repetition penalty, then temperature, then top-k, then top-p.

use candle_core::{DType, Result, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::utils::apply_repeat_penalty;

use super::config::GenerationConfig;

pub struct TokenSampler {
    processor: LogitsProcessor,
    repetition_penalty: f32,
}

impl TokenSampler {
    pub fn new(seed: u64, config: &GenerationConfig) -> Self {
        let temperature = config.temperature;
        let sampling = if temperature <= 0.0 {
            Sampling::ArgMax
        } else {
            match (config.top_k, config.top_p < 1.0) {
                (Some(k), true) => Sampling::TopKThenTopP {
                    k,
                    p: config.top_p,
                    temperature,
                },
                (Some(k), false) => Sampling::TopK { k, temperature },
                (None, true) => Sampling::TopP {
                    p: config.top_p,
                    temperature,
                },
                (None, false) => Sampling::All { temperature },
            }
        };

        Self {
            processor: LogitsProcessor::from_sampling(seed, sampling),
            repetition_penalty: config.repetition_penalty,
        }
    }

    /// Picks the next token from `[vocab]` or `[1, vocab]` logits.
    ///
    /// `history` holds the tokens generated so far; each distinct id is penalized once.
    pub fn sample(&mut self, logits: &Tensor, history: &[u32]) -> Result<u32> {
        let logits = logits.flatten_all()?.to_dtype(DType::F32)?;
        let logits = if self.repetition_penalty != 1.0 && !history.is_empty() {
            apply_repeat_penalty(&logits, self.repetition_penalty, history)?
        } else {
            logits
        };
        self.processor.sample(&logits)
    }
}
