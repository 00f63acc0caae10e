//! Candle model implementations.
//!
//! - [`vit`] provides the appearance encoder.
//! - [`videomae`] provides the action encoder.
//! - [`gpt2`] provides the caption language model.

/// Device selection (CPU / Metal / CUDA).
pub mod device;
mod error;
/// GPT-2 with a KV cache, driven from embeddings.
pub mod gpt2;
mod transformer;
/// Tokenizer/weight loading helpers.
pub mod utils;
/// VideoMAE action encoder.
pub mod videomae;
/// ViT appearance encoder.
pub mod vit;


pub use device::{device_label, select_device};
pub use error::ModelError;
pub use gpt2::{Gpt2Cache, Gpt2Config, Gpt2Model};
pub use videomae::{VideoMaeConfig, VideoMaeEncoder, sinusoid_table};
pub use vit::{VitConfig, VitEncoder};
