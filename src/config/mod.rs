//! Environment-backed configuration.
//!
//! Every setting has a default. Override with `SENTIVUE_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_CHECKPOINT_FILENAME, DEFAULT_MAX_DECODED_PIXELS, DEFAULT_MAX_FRAMES,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT,
};

/// Server configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `SENTIVUE_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port. Default: `8000`.
    pub port: u16,

    /// IP address to bind to. Default: `127.0.0.1`.
    pub bind_addr: IpAddr,

    /// ViT model directory (`config.json` + `model.safetensors`).
    pub vit_path: Option<PathBuf>,

    /// VideoMAE model directory (`config.json` + `model.safetensors`).
    pub videomae_path: Option<PathBuf>,

    /// GPT-2 model directory (`config.json`, `model.safetensors`, `tokenizer.json`).
    pub gpt2_path: Option<PathBuf>,

    /// Trained captioner checkpoint. A missing file is tolerated. Default: `./model_final_v5.safetensors`.
    pub checkpoint_path: PathBuf,

    /// Directory that receives spooled uploads. Default: the OS temp dir.
    pub upload_dir: PathBuf,

    /// Largest accepted upload in bytes. Default: 20 MiB.
    pub max_upload_bytes: usize,

    /// Largest number of animation frames decoded per upload. Default: `2048`.
    pub max_frames: usize,

    /// Canvas pixels decoded per upload, summed over frames. Default: 128 Mi.
    pub max_decoded_pixels: usize,

    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            vit_path: None,
            videomae_path: None,
            gpt2_path: None,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_FILENAME),
            upload_dir: env::temp_dir(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_frames: DEFAULT_MAX_FRAMES,
            max_decoded_pixels: DEFAULT_MAX_DECODED_PIXELS,
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "SENTIVUE_PORT";
    const ENV_BIND_ADDR: &'static str = "SENTIVUE_BIND_ADDR";
    const ENV_VIT_PATH: &'static str = "SENTIVUE_VIT_PATH";
    const ENV_VIDEOMAE_PATH: &'static str = "SENTIVUE_VIDEOMAE_PATH";
    const ENV_GPT2_PATH: &'static str = "SENTIVUE_GPT2_PATH";
    const ENV_CHECKPOINT_PATH: &'static str = "SENTIVUE_CHECKPOINT_PATH";
    const ENV_UPLOAD_DIR: &'static str = "SENTIVUE_UPLOAD_DIR";
    const ENV_MAX_UPLOAD_BYTES: &'static str = "SENTIVUE_MAX_UPLOAD_BYTES";
    const ENV_MAX_FRAMES: &'static str = "SENTIVUE_MAX_FRAMES";
    const ENV_MAX_DECODED_PIXELS: &'static str = "SENTIVUE_MAX_DECODED_PIXELS";
    const ENV_CORS_ORIGINS: &'static str = "SENTIVUE_CORS_ORIGINS";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let vit_path = Self::parse_optional_path_from_env(Self::ENV_VIT_PATH);
        let videomae_path = Self::parse_optional_path_from_env(Self::ENV_VIDEOMAE_PATH);
        let gpt2_path = Self::parse_optional_path_from_env(Self::ENV_GPT2_PATH);
        let checkpoint_path =
            Self::parse_path_from_env(Self::ENV_CHECKPOINT_PATH, defaults.checkpoint_path);
        let upload_dir = Self::parse_path_from_env(Self::ENV_UPLOAD_DIR, defaults.upload_dir);
        let max_upload_bytes =
            Self::parse_usize_from_env(Self::ENV_MAX_UPLOAD_BYTES, defaults.max_upload_bytes);
        let max_frames = Self::parse_usize_from_env(Self::ENV_MAX_FRAMES, defaults.max_frames);
        let max_decoded_pixels =
            Self::parse_usize_from_env(Self::ENV_MAX_DECODED_PIXELS, defaults.max_decoded_pixels);
        let cors_origins = Self::parse_list_from_env(Self::ENV_CORS_ORIGINS);

        Ok(Self {
            port,
            bind_addr,
            vit_path,
            videomae_path,
            gpt2_path,
            checkpoint_path,
            upload_dir,
            max_upload_bytes,
            max_frames,
            max_decoded_pixels,
            cors_origins,
        })
    }

    /// Validates paths and basic invariants (does not create directories).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let model_paths = [
            (Self::ENV_VIT_PATH, &self.vit_path),
            (Self::ENV_VIDEOMAE_PATH, &self.videomae_path),
            (Self::ENV_GPT2_PATH, &self.gpt2_path),
        ];

        let configured = model_paths.iter().filter(|(_, p)| p.is_some()).count();
        if configured != 0 && configured != model_paths.len() {
            let missing = model_paths
                .iter()
                .filter(|(_, p)| p.is_none())
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ConfigError::IncompleteModelPaths { missing });
        }

        for (_, path) in model_paths {
            if let Some(path) = path {
                Self::require_dir(path)?;
            }
        }

        if self.upload_dir.exists() && !self.upload_dir.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.upload_dir.clone(),
            });
        }

        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidLimit {
                name: Self::ENV_MAX_UPLOAD_BYTES,
            });
        }

        if self.max_frames == 0 {
            return Err(ConfigError::InvalidLimit {
                name: Self::ENV_MAX_FRAMES,
            });
        }

        if self.max_decoded_pixels == 0 {
            return Err(ConfigError::InvalidLimit {
                name: Self::ENV_MAX_DECODED_PIXELS,
            });
        }

        Ok(())
    }

    /// Returns `"{bind_addr}:{port}"` (useful for logging/binding).
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Returns `true` when no model directories are configured.
    pub fn uses_stub_models(&self) -> bool {
        self.vit_path.is_none() && self.videomae_path.is_none() && self.gpt2_path.is_none()
    }

    fn require_dir(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            return Err(ConfigError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        if !path.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        Self::parse_optional_path_from_env(var_name).unwrap_or(default)
    }

    fn parse_optional_path_from_env(var_name: &str) -> Option<PathBuf> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn parse_usize_from_env(var_name: &str, default: usize) -> usize {
        env::var(var_name)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_list_from_env(var_name: &str) -> Vec<String> {
        env::var(var_name)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}
