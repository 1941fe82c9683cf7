//! Wan2.2 image-to-video workflow construction.
//!
//! Emits the fixed node topology the render server executes: load the
//! input image, encode it with the vision model, condition on the
//! positive/negative prompts, sample latent frames, decode them, and
//! combine the frames into an H.264 file. Only the parameters vary per
//! job; the topology never does.

use std::collections::BTreeMap;

use image::GenericImageView;
use rand::Rng;

use i2v_core::naming;
use i2v_core::resolution;
use i2v_core::settings::{GenerationSettings, VaeDecodeMode};
use i2v_core::workflow::{NodeInput, WorkflowGraph, WorkflowNode};

/// Checkpoint file the sampler node loads.
pub const CHECKPOINT_FILE: &str = "wan2.2-i2v-rapid-aio-v10.safetensors";

/// CLIP vision encoder weights.
pub const CLIP_VISION_FILE: &str = "clip_vision_vit_h.safetensors";

/// Separate VAE used for decoding latent frames.
pub const VAE_FILE: &str = "wan2.2_vae.safetensors";

/// Above this frame count the standard VAE decoder becomes unreliable;
/// auto mode switches to tiled decoding.
const TILED_DECODE_THRESHOLD: u32 = 60;

/// Tile size handed to the tiled decoder.
const DECODE_TILE_SIZE: u32 = 512;

/// A workflow ready for submission, plus the resolved parameters the
/// caller reports back (chosen dimensions, seed, filename prefix).
#[derive(Debug, Clone)]
pub struct BuiltWorkflow {
    pub graph: WorkflowGraph,
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub seed: i64,
    pub filename_prefix: String,
}

/// Read width/height from an encoded image's header.
///
/// Failures fall back to the default dimensions rather than failing
/// the job; resolution selection is a heuristic, not a contract.
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    match image::load_from_memory(bytes) {
        Ok(img) => Some(img.dimensions()),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read input image dimensions");
            None
        }
    }
}

/// Build the image-to-video workflow for one job.
///
/// * `image_filename` - staged input image name (bare filename).
/// * `image_bytes` - raw input image, consulted only for auto
///   resolution.
pub fn build(
    image_filename: &str,
    settings: &GenerationSettings,
    image_bytes: Option<&[u8]>,
) -> BuiltWorkflow {
    let input_dims = image_bytes.and_then(probe_dimensions);
    let (width, height) = resolution::resolve_dimensions(settings.resolution, input_dims);

    let seed = resolve_seed(settings.seed);
    let frames = settings.frame_count();
    let filename_prefix = naming::filename_prefix(&settings.prompt);

    if frames > TILED_DECODE_THRESHOLD {
        tracing::warn!(
            frames,
            "High frame count; decode time grows steeply past {TILED_DECODE_THRESHOLD} frames",
        );
    }

    tracing::info!(
        width,
        height,
        frames,
        fps = settings.fps,
        seed,
        prefix = %filename_prefix,
        "Building image-to-video workflow",
    );

    let mut graph = WorkflowGraph::new();

    graph.insert(
        "1",
        node(
            "LoadImage",
            [
                ("image", NodeInput::value(image_filename)),
                ("upload", NodeInput::value("image")),
            ],
        ),
    );
    graph.insert(
        "2",
        node(
            "CheckpointLoaderSimple",
            [("ckpt_name", NodeInput::value(CHECKPOINT_FILE))],
        ),
    );
    graph.insert(
        "3",
        node(
            "CLIPVisionLoader",
            [("clip_name", NodeInput::value(CLIP_VISION_FILE))],
        ),
    );
    graph.insert(
        "12",
        node("VAELoader", [("vae_name", NodeInput::value(VAE_FILE))]),
    );
    graph.insert(
        "4",
        node(
            "CLIPVisionEncode",
            [
                ("crop", NodeInput::value("center")),
                ("image", NodeInput::link("1", 0)),
                ("clip_vision", NodeInput::link("3", 0)),
            ],
        ),
    );
    graph.insert(
        "5",
        node(
            "CLIPTextEncode",
            [
                ("text", NodeInput::value(settings.prompt.as_str())),
                ("clip", NodeInput::link("2", 1)),
            ],
        ),
    );
    graph.insert(
        "6",
        node(
            "CLIPTextEncode",
            [
                ("text", NodeInput::value(settings.negative_prompt.as_str())),
                ("clip", NodeInput::link("2", 1)),
            ],
        ),
    );
    graph.insert(
        "7",
        node(
            "ModelSamplingSD3",
            [
                ("shift", NodeInput::value(settings.shift)),
                ("model", NodeInput::link("2", 0)),
            ],
        ),
    );
    graph.insert(
        "8",
        node(
            "WanImageToVideo",
            [
                ("positive", NodeInput::link("5", 0)),
                ("negative", NodeInput::link("6", 0)),
                ("vae", NodeInput::link("12", 0)),
                ("clip_vision_output", NodeInput::link("4", 0)),
                ("start_image", NodeInput::link("1", 0)),
                ("width", NodeInput::value(width)),
                ("height", NodeInput::value(height)),
                ("length", NodeInput::value(frames)),
                ("batch_size", NodeInput::value(1)),
            ],
        ),
    );
    graph.insert(
        "9",
        node(
            "KSampler",
            [
                ("seed", NodeInput::value(seed)),
                ("steps", NodeInput::value(settings.steps)),
                ("cfg", NodeInput::value(settings.cfg)),
                ("sampler_name", NodeInput::value(settings.sampler_name.as_str())),
                ("scheduler", NodeInput::value(settings.scheduler.as_str())),
                ("denoise", NodeInput::value(settings.denoise)),
                ("model", NodeInput::link("7", 0)),
                ("positive", NodeInput::link("8", 0)),
                ("negative", NodeInput::link("8", 1)),
                ("latent_image", NodeInput::link("8", 2)),
            ],
        ),
    );
    graph.insert("10", decode_node(settings.vae_decode, frames));
    graph.insert(
        "11",
        node(
            "VHS_VideoCombine",
            [
                ("images", NodeInput::link("10", 0)),
                ("frame_rate", NodeInput::value(settings.fps)),
                ("loop_count", NodeInput::value(0)),
                ("filename_prefix", NodeInput::value(filename_prefix.as_str())),
                ("format", NodeInput::value("video/h264-mp4")),
                ("pix_fmt", NodeInput::value("yuv420p")),
                ("crf", NodeInput::value(settings.crf)),
                ("save_metadata", NodeInput::value(true)),
                ("pingpong", NodeInput::value(false)),
                ("save_output", NodeInput::value(true)),
            ],
        ),
    );

    BuiltWorkflow {
        graph,
        width,
        height,
        frames,
        seed,
        filename_prefix,
    }
}

/// Negative seeds mean "pick one"; drawn fresh per build.
fn resolve_seed(seed: i64) -> i64 {
    if seed < 0 {
        rand::rng().random_range(0..i64::MAX)
    } else {
        seed
    }
}

/// Latent-to-pixels decode node, tiled or standard.
fn decode_node(mode: VaeDecodeMode, frames: u32) -> WorkflowNode {
    let tiled = match mode {
        VaeDecodeMode::Standard => false,
        VaeDecodeMode::Tiled => true,
        VaeDecodeMode::Auto => frames > TILED_DECODE_THRESHOLD,
    };

    if tiled {
        node(
            "VAEDecodeTiled",
            [
                ("samples", NodeInput::link("9", 0)),
                ("vae", NodeInput::link("12", 0)),
                ("tile_size", NodeInput::value(DECODE_TILE_SIZE)),
            ],
        )
    } else {
        node(
            "VAEDecode",
            [
                ("samples", NodeInput::link("9", 0)),
                ("vae", NodeInput::link("12", 0)),
            ],
        )
    }
}

fn node<const N: usize>(class_type: &str, inputs: [(&str, NodeInput); N]) -> WorkflowNode {
    WorkflowNode {
        class_type: class_type.to_string(),
        inputs: inputs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use i2v_core::settings::Resolution;

    fn settings() -> GenerationSettings {
        GenerationSettings {
            prompt: "a cat dancing".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn negative_seed_resolves_to_non_negative() {
        for _ in 0..50 {
            assert!(resolve_seed(-1) >= 0);
        }
    }

    #[test]
    fn explicit_seed_passes_through() {
        assert_eq!(resolve_seed(42), 42);
        assert_eq!(resolve_seed(0), 0);
    }

    #[test]
    fn built_graph_validates() {
        let built = build("input.png", &settings(), None);
        assert!(built.graph.validate().is_ok());
    }

    #[test]
    fn built_dimensions_are_multiples_of_8() {
        let s = GenerationSettings {
            resolution: Resolution::Exact {
                width: 999,
                height: 555,
            },
            ..settings()
        };
        let built = build("input.png", &s, None);
        assert_eq!(built.width % 8, 0);
        assert_eq!(built.height % 8, 0);
    }

    #[test]
    fn sampler_receives_resolved_seed() {
        let s = GenerationSettings {
            seed: 1234,
            ..settings()
        };
        let built = build("input.png", &s, None);
        assert_eq!(
            built.graph.nodes["9"].inputs["seed"],
            NodeInput::value(1234)
        );
        assert_eq!(built.seed, 1234);
    }

    #[test]
    fn fresh_random_seed_per_build() {
        let s = GenerationSettings {
            seed: -1,
            ..settings()
        };
        // Two builds drawing the same random seed is vanishingly
        // unlikely; ten identical draws means the RNG is not consulted.
        let seeds: Vec<i64> = (0..10).map(|_| build("a.png", &s, None).seed).collect();
        assert!(seeds.iter().any(|&x| x != seeds[0]));
        assert!(seeds.iter().all(|&x| x >= 0));
    }

    #[test]
    fn auto_mode_picks_decoder_by_frame_count() {
        let short = GenerationSettings {
            duration: 4.0,
            fps: 8,
            ..settings()
        };
        let built = build("a.png", &short, None);
        assert_eq!(built.graph.nodes["10"].class_type, "VAEDecode");

        let long = GenerationSettings {
            duration: 5.0,
            fps: 24,
            ..settings()
        };
        let built = build("a.png", &long, None);
        assert_eq!(built.graph.nodes["10"].class_type, "VAEDecodeTiled");
    }

    #[test]
    fn prompt_lands_in_positive_encoder_and_prefix() {
        let built = build("a.png", &settings(), None);
        assert_eq!(
            built.graph.nodes["5"].inputs["text"],
            NodeInput::value("a cat dancing")
        );
        assert_eq!(built.filename_prefix, "a_cat_dancing_I2V");
        assert_eq!(
            built.graph.nodes["11"].inputs["filename_prefix"],
            NodeInput::value("a_cat_dancing_I2V")
        );
    }

    #[test]
    fn video_combine_carries_encoding_parameters() {
        let built = build("a.png", &settings(), None);
        let combine = &built.graph.nodes["11"];
        assert_eq!(combine.inputs["format"], NodeInput::value("video/h264-mp4"));
        assert_eq!(combine.inputs["pix_fmt"], NodeInput::value("yuv420p"));
        assert_eq!(combine.inputs["crf"], NodeInput::value(19));
        assert_eq!(combine.inputs["frame_rate"], NodeInput::value(8));
    }

    #[test]
    fn unreadable_image_bytes_fall_back_to_default_dimensions() {
        let s = GenerationSettings {
            resolution: Resolution::Auto,
            ..settings()
        };
        let built = build("a.png", &s, Some(b"not an image"));
        assert_eq!(
            (built.width, built.height),
            i2v_core::resolution::DEFAULT_DIMENSIONS
        );
    }
}
