//! Domain types for the image-to-video generation worker.
//!
//! Pure logic only: generation settings, resolution selection, the
//! workflow-graph model with validation, output filename derivation,
//! and the job error taxonomy. Everything that talks to the ComfyUI
//! server lives in `i2v-comfyui`.

pub mod error;
pub mod naming;
pub mod resolution;
pub mod settings;
pub mod workflow;
