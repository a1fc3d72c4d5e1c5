//! The narrow contract between the orchestration code and a GPU backend.
//!
//! Orchestrators only compile programs by name, allocate render targets,
//! upload images, issue draws and read pixels back. Shader source, binding
//! layouts and API objects all live behind [`Renderer`].

use crate::cubemap::CubeFaceSet;
use crate::image::Image;

#[derive(Debug)]
pub enum RenderError {
    CompileFailed(String),
    AllocationFailed(String),
    UploadFailed(String),
    DrawFailed(String),
    ReadbackFailed(String),
    UnknownHandle(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CompileFailed(msg) => write!(f, "Program compilation failed: {}", msg),
            Self::AllocationFailed(msg) => write!(f, "Render target allocation failed: {}", msg),
            Self::UploadFailed(msg) => write!(f, "Texture upload failed: {}", msg),
            Self::DrawFailed(msg) => write!(f, "Draw failed: {}", msg),
            Self::ReadbackFailed(msg) => write!(f, "Pixel readback failed: {}", msg),
            Self::UnknownHandle(msg) => write!(f, "Unknown renderer handle: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub usize);

/// Per-texel channel layout of a render target, 32-bit float per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFormat {
    R32F,
    Rgb32F,
    Rgba32F,
}

impl ChannelFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::R32F => 1,
            Self::Rgb32F => 3,
            Self::Rgba32F => 4,
        }
    }

    /// Format able to hold `channels` channels without loss.
    pub fn for_channels(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(Self::R32F),
            3 => Some(Self::Rgb32F),
            4 => Some(Self::Rgba32F),
            _ => None,
        }
    }
}

/// A shader program referenced by vertex and fragment shader identifiers,
/// e.g. `"postprocessing/quad.vert"`. Backends map identifiers to sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramDesc {
    pub vertex: &'static str,
    pub fragment: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    TriangleStrip,
}

/// Sampled input bound to a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureBinding {
    /// An uploaded 2D texture.
    Texture(TextureId),
    /// An uploaded cube texture.
    Cubemap(TextureId),
    /// The color output of an earlier offscreen draw.
    Target(TargetId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
    Texture(TextureBinding),
}

/// Named uniform values, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Uniforms {
    entries: Vec<(&'static str, UniformValue)>,
}

impl Uniforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any earlier value.
    pub fn set(&mut self, name: &'static str, value: UniformValue) -> &mut Self {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn with(mut self, name: &'static str, value: UniformValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &UniformValue)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTarget {
    Offscreen(TargetId),
    /// The renderer's display surface at its native resolution.
    Display,
}

/// Everything needed to issue one draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub primitive: Primitive,
    pub vertex_count: u32,
    pub uniforms: Uniforms,
    pub target: DrawTarget,
    /// Viewport size in pixels as (width, height).
    pub viewport: (u32, u32),
    pub depth_test: bool,
    pub clear: bool,
}

impl DrawCall {
    /// A full-screen quad drawn as a 4-vertex triangle strip with depth
    /// testing off.
    pub fn fullscreen_quad(
        program: ProgramId,
        uniforms: Uniforms,
        target: DrawTarget,
        viewport: (u32, u32),
    ) -> Self {
        Self {
            program,
            primitive: Primitive::TriangleStrip,
            vertex_count: 4,
            uniforms,
            target,
            viewport,
            depth_test: false,
            clear: true,
        }
    }
}

/// Clip-space corners of the full-screen quad in strip order.
pub const QUAD_POSITIONS: [[f32; 2]; 4] = [[-1.0, -1.0], [-1.0, 1.0], [1.0, -1.0], [1.0, 1.0]];
/// Texture coordinates matching [`QUAD_POSITIONS`].
pub const QUAD_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];

/// A GPU backend. All calls block until the work they describe is done.
pub trait Renderer {
    fn compile(&mut self, desc: &ProgramDesc) -> Result<ProgramId, RenderError>;

    fn allocate_target(
        &mut self,
        width: u32,
        height: u32,
        format: ChannelFormat,
    ) -> Result<TargetId, RenderError>;

    fn upload_texture(&mut self, image: &Image) -> Result<TextureId, RenderError>;

    fn upload_cubemap(&mut self, faces: &CubeFaceSet) -> Result<TextureId, RenderError>;

    fn draw(&mut self, call: &DrawCall) -> Result<(), RenderError>;

    /// Read back a target's color attachment with the target's channel count.
    fn read_pixels(&mut self, target: TargetId) -> Result<Image, RenderError>;

    /// Native display size as (width, height).
    fn display_size(&self) -> (u32, u32);
}
