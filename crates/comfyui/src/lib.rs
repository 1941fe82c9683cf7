//! ComfyUI integration for the image-to-video worker.
//!
//! Everything that talks to or about the render server: the REST API
//! client, typed history parsing, server process lifecycle, input
//! staging, workflow construction, completion polling, and artifact
//! discovery.

pub mod api;
pub mod artifact;
pub mod builder;
pub mod history;
pub mod poller;
pub mod server;
pub mod staging;
pub mod submit;
