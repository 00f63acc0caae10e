use crate::constants::CAPTION_PROMPT;

pub const DEFAULT_MAX_NEW_TOKENS: usize = 25;

pub const DEFAULT_TEMPERATURE: f64 = 0.8;

pub const DEFAULT_TOP_K: usize = 50;

pub const DEFAULT_TOP_P: f64 = 0.9;

pub const DEFAULT_REPETITION_PENALTY: f32 = 2.0;

/// Sampling parameters for caption generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Text appended after the visual prefix. Default: `"A video of"`.
    pub prompt: String,

    pub max_new_tokens: usize,

    /// `0.0` switches to greedy decoding.
    pub temperature: f64,

    /// Candidates kept before the nucleus cut; `None` keeps the whole vocabulary.
    pub top_k: Option<usize>,

    /// Nucleus mass; `1.0` samples from the full distribution.
    pub top_p: f64,

    pub repetition_penalty: f32,

    /// Base seed; `None` derives one from the clock at startup.
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prompt: CAPTION_PROMPT.to_string(),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_k: Some(DEFAULT_TOP_K),
            top_p: DEFAULT_TOP_P,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Greedy decoding with no penalty; useful for reproducible output.
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            top_k: None,
            top_p: 1.0,
            repetition_penalty: 1.0,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt cannot be empty".to_string());
        }

        if self.max_new_tokens == 0 {
            return Err("max_new_tokens must be greater than 0".to_string());
        }

        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(format!(
                "temperature must be non-negative, got {}",
                self.temperature
            ));
        }

        if self.top_k == Some(0) {
            return Err("top_k must be greater than 0 when set".to_string());
        }

        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(format!(
                "top_p must be in (0.0, 1.0], got {}",
                self.top_p
            ));
        }

        if !(self.repetition_penalty > 0.0) {
            return Err(format!(
                "repetition_penalty must be greater than 0, got {}",
                self.repetition_penalty
            ));
        }

        Ok(())
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_new_tokens = std::env::var("SENTIVUE_MAX_NEW_TOKENS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.max_new_tokens);

        let temperature = std::env::var("SENTIVUE_TEMPERATURE")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.temperature);

        // 0 disables the top-k cut.
        let top_k = match std::env::var("SENTIVUE_TOP_K")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            Some(0) => None,
            Some(k) => Some(k),
            None => defaults.top_k,
        };

        let top_p = std::env::var("SENTIVUE_TOP_P")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.top_p);

        let repetition_penalty = std::env::var("SENTIVUE_REPETITION_PENALTY")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.repetition_penalty);

        let seed = std::env::var("SENTIVUE_SEED")
            .ok()
            .and_then(|v| v.trim().parse().ok());

        Self {
            max_new_tokens,
            temperature,
            top_k,
            top_p,
            repetition_penalty,
            seed,
            ..defaults
        }
    }
}
