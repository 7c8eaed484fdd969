//! CLI command implementations.

pub mod common;
pub mod envelope;
pub mod info;
pub mod presets;
pub mod render;
