//! Host-side material and environment preprocessing for physically based
//! rendering: cubemap cross packing, SVBRDF importance-sampling tables,
//! per-face environment prefiltering and post-process chains.
//!
//! GPU work goes through the [`render::Renderer`] trait; see the
//! `rendkit-gpu` crate for a wgpu implementation.

pub mod cubemap;
pub mod image;
pub mod material;
pub mod postprocess;
pub mod prefilter;
pub mod render;
pub mod roughness;
pub mod sampling;
pub mod special;

#[cfg(test)]
mod testing;

pub use cubemap::{CrossLayout, CubeFace, CubeFaceSet};
pub use image::{Image, ImageShape};
pub use postprocess::{PostprocessPipeline, Stage};
pub use render::Renderer;
