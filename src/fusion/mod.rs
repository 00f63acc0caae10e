//! Feature fusion and the emotion heuristic.
//!
//! The fused vector is `normalize([appearance ‖ action ‖ appearance * 5])`. The emotion
//! label is read off its L2 norm.


use std::fmt;

use candle_core::{D, Result, Tensor};
use serde::Serialize;

use crate::constants::{EMOTION_FEATURE_SCALE, NORMALIZE_EPS};

/// Norm above which the clip reads as energetic.
pub const ENERGETIC_THRESHOLD: f32 = 0.5;

/// Norm above which the clip reads as focused.
pub const FOCUSED_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Emotion {
    #[serde(rename = "energetic and happy")]
    Energetic,
    #[serde(rename = "focused")]
    Focused,
    #[serde(rename = "calm")]
    Calm,
}

impl Emotion {
    pub fn from_magnitude(magnitude: f32) -> Self {
        if magnitude > ENERGETIC_THRESHOLD {
            Emotion::Energetic
        } else if magnitude > FOCUSED_THRESHOLD {
            Emotion::Focused
        } else {
            Emotion::Calm
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Energetic => "energetic and happy",
            Emotion::Focused => "focused",
            Emotion::Calm => "calm",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// L2-normalizes along the last dimension, `x / max(‖x‖, eps)`.
pub fn l2_normalize(x: &Tensor) -> Result<Tensor> {
    let norm = x.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?;
    x.broadcast_div(&norm.maximum(NORMALIZE_EPS)?)
}

/// Concatenates appearance, action and scaled appearance, then normalizes.
pub fn fuse(appearance: &Tensor, action: &Tensor) -> Result<Tensor> {
    let emotion = (appearance * EMOTION_FEATURE_SCALE)?;
    let visual = Tensor::cat(&[appearance, action, &emotion], D::Minus1)?;
    l2_normalize(&visual)
}

/// L2 norm of the whole tensor.
pub fn magnitude(x: &Tensor) -> Result<f32> {
    x.sqr()?.sum_all()?.sqrt()?.to_scalar::<f32>()
}

pub fn classify_emotion(fused: &Tensor) -> Result<Emotion> {
    Ok(Emotion::from_magnitude(magnitude(fused)?))
}
