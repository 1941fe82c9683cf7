//! Serverless job worker for ComfyUI image-to-video generation.
//!
//! One invocation handles one job: decode the payload, make sure the
//! render server is up, stage inputs, submit the workflow, wait for
//! completion, and return the produced video base64-encoded. Every
//! failure becomes a structured error payload; the process never
//! crashes outward.

pub mod config;
pub mod handler;
pub mod job;
