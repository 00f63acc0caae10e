//! Upload decoding and encoder preprocessing.
//!
//! - [`decode_frames`] turns GIF (or still image) bytes into RGB frames.
//! - [`sample_frame_indices`] picks the frames shown to the action encoder.
//! - [`vit_pixels`] / [`videomae_pixels`] build normalized pixel tensors.

mod decode;
mod error;
mod preprocess;
mod sampling;


pub use decode::{DecodeLimits, decode_frames, decode_frames_with_limits};
pub use error::MediaError;
pub use preprocess::{
    IMAGENET_MEAN, IMAGENET_STD, VIT_MEAN, VIT_STD, shortest_edge_dims, videomae_pixels,
    vit_pixels,
};
pub use sampling::sample_frame_indices;
