//! Headless wgpu backend for `rendkit-core`'s [`Renderer`](rendkit_core::Renderer).

pub mod context;
pub mod renderer;
pub mod shaders;

pub use context::{GpuContext, GpuInitError};
pub use renderer::WgpuRenderer;
