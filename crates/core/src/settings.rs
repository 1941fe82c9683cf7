//! Generation settings for a single image-to-video job.
//!
//! Deserialized from the job payload's `settings` object. Every field
//! has a default matching the generation script this worker drives, so
//! a payload may supply any subset.

use serde::Deserialize;

/// Requested output resolution.
///
/// Either a symbolic tier or an explicit pair. Explicit dimensions are
/// snapped to multiples of 8 before use (model tiling constraint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Resolution {
    /// Pick from the supported catalog based on the input image.
    #[serde(rename = "auto")]
    Auto,
    /// 640x640 (the model prefers square frames at this tier).
    #[serde(rename = "720p")]
    P720,
    /// 1024x1024.
    #[serde(rename = "1080p")]
    P1080,
    /// Caller-specified dimensions.
    #[serde(untagged)]
    Exact { width: u32, height: u32 },
}

/// How latent frames are decoded to pixels.
///
/// Tiled decode trades speed for bounded memory; the standard decoder
/// becomes unreliable at high frame counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaeDecodeMode {
    /// Pick based on frame count.
    Auto,
    Standard,
    Tiled,
}

/// Value object holding all tunable generation parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    pub resolution: Resolution,
    /// Output duration in seconds.
    #[serde(alias = "durationSeconds")]
    pub duration: f64,
    pub fps: u32,
    pub prompt: String,
    pub negative_prompt: String,
    /// Negative means "assign randomly at build time".
    pub seed: i64,
    pub sampler_name: String,
    pub scheduler: String,
    pub steps: u32,
    #[serde(alias = "cfgScale")]
    pub cfg: f64,
    pub denoise: f64,
    #[serde(alias = "modelShift")]
    pub shift: f64,
    pub crf: u32,
    #[serde(alias = "vaeDecodeMethod")]
    pub vae_decode: VaeDecodeMode,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::P720,
            duration: 4.0,
            fps: 8,
            prompt: String::new(),
            negative_prompt: String::new(),
            seed: -1,
            sampler_name: "sa_solver".to_string(),
            scheduler: "beta".to_string(),
            steps: 4,
            cfg: 1.0,
            denoise: 1.0,
            shift: 8.0,
            crf: 19,
            vae_decode: VaeDecodeMode::Auto,
        }
    }
}

impl GenerationSettings {
    /// Number of frames to render: `round(duration * fps)`, at least 1.
    pub fn frame_count(&self) -> u32 {
        let frames = (self.duration * f64::from(self.fps)).round();
        if frames < 1.0 {
            1
        } else {
            frames as u32
        }
    }
}
