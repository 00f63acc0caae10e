//! Sentivue library crate (used by the server and integration tests).
//!
//! # Public API Surface
//!
//! ## Core Types
//! - [`Config`], [`ConfigError`] - Server configuration
//! - [`CaptionPipeline`], [`PipelineConfig`], [`CaptionResult`] - End-to-end captioning
//!
//! ## Models
//! - [`VitEncoder`], [`VideoMaeEncoder`] - Frozen appearance/action encoders
//! - [`Gpt2Model`] - Caption language model
//! - [`Captioner`], [`GenerationConfig`] - Soft-prompt decoding
//!
//! ## Media & Fusion
//! - [`decode_frames`], [`sample_frame_indices`] - Upload decoding and frame sampling
//! - [`fuse`], [`Emotion`] - Feature fusion and the emotion heuristic
//!
//! ## HTTP
//! - [`gateway::create_router`], [`AppState`] - Axum router and shared state

pub mod captioner;
pub mod config;
pub mod constants;
pub mod fusion;
pub mod gateway;
pub mod media;
pub mod models;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use captioner::{Captioner, GenerationConfig, TokenSampler, VisualPrefix, compose_caption};
pub use config::{Config, ConfigError};
pub use constants::{
    SENTIVUE_STATUS_CAPTIONED, SENTIVUE_STATUS_HEADER, SENTIVUE_STATUS_HEALTHY,
    SENTIVUE_STATUS_READY, VISUAL_FEATURE_DIM,
};
pub use fusion::{Emotion, classify_emotion, fuse};
pub use gateway::{AppState, GatewayError};
pub use media::{
    DecodeLimits, MediaError, decode_frames, decode_frames_with_limits, sample_frame_indices,
};
pub use models::{
    Gpt2Config, Gpt2Model, ModelError, VideoMaeConfig, VideoMaeEncoder, VitConfig, VitEncoder,
    select_device,
};
pub use pipeline::{
    CaptionPipeline, CaptionResult, PipelineConfig, PipelineError, VisualEncoder, VisualFeatures,
};
