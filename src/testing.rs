//! Tiny randomly-initialised model directories for unit tests.

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

use crate::models::utils::{CONFIG_FILENAME, WEIGHTS_FILENAME};
use crate::models::{
    Gpt2Config, Gpt2Model, VideoMaeConfig, VideoMaeEncoder, VitConfig, VitEncoder,
};

pub const TINY_HIDDEN: usize = 8;
pub const TINY_IMAGE_SIZE: usize = 16;
pub const TINY_FRAMES: usize = 4;

pub const TINY_WORDS: &[&str] = &[
    "<|endoftext|>",
    "<unk>",
    "A",
    "video",
    "of",
    "cat",
    "dog",
    "runs",
    "jumps",
    "the",
    "park",
    "ball",
    "happy",
    "red",
    "car",
    "room",
];

pub fn tiny_vit_config() -> VitConfig {
    VitConfig {
        hidden_size: TINY_HIDDEN,
        num_hidden_layers: 1,
        num_attention_heads: 2,
        intermediate_size: 16,
        image_size: TINY_IMAGE_SIZE,
        patch_size: 8,
        ..Default::default()
    }
}

pub fn tiny_videomae_config() -> VideoMaeConfig {
    VideoMaeConfig {
        hidden_size: TINY_HIDDEN,
        num_hidden_layers: 1,
        num_attention_heads: 2,
        intermediate_size: 16,
        image_size: TINY_IMAGE_SIZE,
        patch_size: 8,
        num_frames: TINY_FRAMES,
        tubelet_size: 2,
        ..Default::default()
    }
}

pub fn tiny_gpt2_config() -> Gpt2Config {
    Gpt2Config {
        vocab_size: TINY_WORDS.len(),
        n_positions: 64,
        n_embd: TINY_HIDDEN,
        n_layer: 2,
        n_head: 2,
        ..Default::default()
    }
}

/// Word-level tokenizer over [`TINY_WORDS`], whitespace pre-tokenized.
pub fn tiny_tokenizer_json() -> String {
    let vocab: serde_json::Map<String, serde_json::Value> = TINY_WORDS
        .iter()
        .enumerate()
        .map(|(id, word)| (word.to_string(), serde_json::json!(id)))
        .collect();

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [{
            "id": 0,
            "content": "<|endoftext|>",
            "single_word": false,
            "lstrip": false,
            "rstrip": false,
            "normalized": false,
            "special": true
        }],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "<unk>"
        }
    })
    .to_string()
}

pub fn tiny_tokenizer() -> tokenizers::Tokenizer {
    tiny_tokenizer_json().parse().expect("tiny tokenizer")
}

fn write_json(dir: &Path, value: serde_json::Value) {
    std::fs::write(dir.join(CONFIG_FILENAME), value.to_string()).expect("write config.json");
}

fn varmap_builder(varmap: &VarMap) -> VarBuilder<'static> {
    VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu)
}

pub fn write_tiny_vit(dir: &Path) {
    let config = tiny_vit_config();
    let varmap = VarMap::new();
    VitEncoder::new(varmap_builder(&varmap), config.clone()).expect("build vit");
    varmap.save(dir.join(WEIGHTS_FILENAME)).expect("save vit");
    write_json(
        dir,
        serde_json::json!({
            "hidden_size": config.hidden_size,
            "num_hidden_layers": config.num_hidden_layers,
            "num_attention_heads": config.num_attention_heads,
            "intermediate_size": config.intermediate_size,
            "image_size": config.image_size,
            "patch_size": config.patch_size
        }),
    );
}

pub fn write_tiny_videomae(dir: &Path) {
    let config = tiny_videomae_config();
    let varmap = VarMap::new();
    VideoMaeEncoder::new(varmap_builder(&varmap), config.clone()).expect("build videomae");
    varmap.save(dir.join(WEIGHTS_FILENAME)).expect("save videomae");
    write_json(
        dir,
        serde_json::json!({
            "hidden_size": config.hidden_size,
            "num_hidden_layers": config.num_hidden_layers,
            "num_attention_heads": config.num_attention_heads,
            "intermediate_size": config.intermediate_size,
            "image_size": config.image_size,
            "patch_size": config.patch_size,
            "num_frames": config.num_frames,
            "tubelet_size": config.tubelet_size
        }),
    );
}

pub fn write_tiny_gpt2(dir: &Path) {
    let config = tiny_gpt2_config();
    let varmap = VarMap::new();
    Gpt2Model::new(varmap_builder(&varmap).pp("transformer"), config.clone())
        .expect("build gpt2");
    varmap.save(dir.join(WEIGHTS_FILENAME)).expect("save gpt2");
    write_json(
        dir,
        serde_json::json!({
            "vocab_size": config.vocab_size,
            "n_positions": config.n_positions,
            "n_embd": config.n_embd,
            "n_layer": config.n_layer,
            "n_head": config.n_head
        }),
    );
    std::fs::write(dir.join("tokenizer.json"), tiny_tokenizer_json()).expect("write tokenizer");
}

/// Animated GIF whose frames fade between two colours.
pub fn gif_bytes(frame_count: usize, width: u32, height: u32) -> Vec<u8> {
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgba, RgbaImage};

    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        let frames = (0..frame_count).map(|i| {
            let shade = (i * 255 / frame_count.max(1)) as u8;
            Frame::new(RgbaImage::from_pixel(
                width,
                height,
                Rgba([shade, 255 - shade, 64, 255]),
            ))
        });
        encoder.encode_frames(frames).expect("encode gif");
    }
    bytes
}
