//! Cross-cutting, shared constants.
//!
//! The feature dimensions are fixed by the pretrained checkpoints: both encoders are
//! base-size transformers (768 hidden) and the fused vector is three of them side by side.
//! Derive secondary values from the primary ones to avoid drift.

/// Hidden size of the appearance encoder (ViT-B/16).
pub const APPEARANCE_DIM: usize = 768;

/// Hidden size of the action encoder (VideoMAE-B).
pub const ACTION_DIM: usize = 768;

/// Fused feature size: `[appearance ‖ action ‖ emotion]`.
pub const VISUAL_FEATURE_DIM: usize = APPEARANCE_DIM + ACTION_DIM + APPEARANCE_DIM;

/// Scale applied to the appearance features to build the emotion slice.
pub const EMOTION_FEATURE_SCALE: f64 = 5.0;

/// Epsilon used when L2-normalizing the fused vector.
pub const NORMALIZE_EPS: f32 = 1e-12;

/// Frames fed to the action encoder.
pub const NUM_SAMPLED_FRAMES: usize = 16;

/// Number of soft-prompt tokens produced from the fused vector.
pub const PREFIX_LEN: usize = 1;

/// Text every caption starts with.
pub const CAPTION_PROMPT: &str = "A video of";

/// GPT-2 end-of-text token.
pub const EOS_TOKEN: &str = "<|endoftext|>";

/// Fallback id for [`EOS_TOKEN`] when the tokenizer does not list it.
pub const DEFAULT_EOS_TOKEN_ID: u32 = 50256;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default checkpoint holding the trained projection (and optionally GPT-2 weights).
pub const DEFAULT_CHECKPOINT_FILENAME: &str = "model_final_v5.safetensors";

/// Default upload size limit (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Default cap on decoded animation frames.
pub const DEFAULT_MAX_FRAMES: usize = 2048;

/// Default cap on canvas pixels decoded across all frames of one upload (128 Mi).
pub const DEFAULT_MAX_DECODED_PIXELS: usize = 128 * 1024 * 1024;

/// Response header carrying the request outcome.
pub const SENTIVUE_STATUS_HEADER: &str = "x-sentivue-status";

pub const SENTIVUE_STATUS_HEALTHY: &str = "healthy";
pub const SENTIVUE_STATUS_READY: &str = "ready";
pub const SENTIVUE_STATUS_CAPTIONED: &str = "captioned";
