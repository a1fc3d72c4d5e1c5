//! Per-face environment prefiltering.
//!
//! The whole cube is bound as an environment lookup and a full-screen quad is
//! drawn once per face into a face-sized offscreen target, selecting the
//! output face with `u_cube_face`. Faces are rendered strictly in index
//! order and the first failure aborts the remaining faces.

use crate::cubemap::{CubeFace, CubeFaceSet, CubemapError};
use crate::render::{
    ChannelFormat, DrawCall, DrawTarget, ProgramDesc, RenderError, Renderer, TextureBinding,
    UniformValue, Uniforms,
};

/// Cosine-weighted (Lambertian) irradiance convolution.
pub const LAMBERT_PROGRAM: ProgramDesc = ProgramDesc {
    vertex: "cubemap/lambert.vert",
    fragment: "cubemap/lambert.frag",
};

#[derive(Debug)]
pub enum PrefilterError {
    UnsupportedChannels(usize),
    Render { face: Option<CubeFace>, source: RenderError },
    ReadbackShape { face: CubeFace, message: String },
    Cubemap(CubemapError),
}

impl std::fmt::Display for PrefilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedChannels(n) => {
                write!(f, "Cannot prefilter faces with {} channels", n)
            }
            Self::Render {
                face: Some(face),
                source,
            } => write!(f, "Prefilter failed on face {}: {}", face, source),
            Self::Render { face: None, source } => write!(f, "Prefilter setup failed: {}", source),
            Self::ReadbackShape { face, message } => {
                write!(f, "Face {} read back with wrong shape: {}", face, message)
            }
            Self::Cubemap(e) => write!(f, "Prefilter output error: {}", e),
        }
    }
}

impl std::error::Error for PrefilterError {}

impl From<CubemapError> for PrefilterError {
    fn from(e: CubemapError) -> Self {
        Self::Cubemap(e)
    }
}

fn setup(source: RenderError) -> PrefilterError {
    PrefilterError::Render { face: None, source }
}

/// Render `program` once per face over `faces` and collect the results.
pub fn prefilter<R: Renderer>(
    renderer: &mut R,
    faces: &CubeFaceSet,
    program: &ProgramDesc,
) -> Result<CubeFaceSet, PrefilterError> {
    let shape = faces.face_shape();
    let format = ChannelFormat::for_channels(shape.channels)
        .ok_or(PrefilterError::UnsupportedChannels(shape.channels))?;
    let (width, height) = (shape.width as u32, shape.height as u32);

    let compiled = renderer.compile(program).map_err(setup)?;
    let target = renderer.allocate_target(width, height, format).map_err(setup)?;
    let cubemap = renderer.upload_cubemap(faces).map_err(setup)?;

    let result = CubeFaceSet::try_from_fn(|face| {
        let render_err = |source| PrefilterError::Render {
            face: Some(face),
            source,
        };
        let uniforms = Uniforms::new()
            .with("u_cubemap", UniformValue::Texture(TextureBinding::Cubemap(cubemap)))
            .with("u_cube_face", UniformValue::Int(face.index() as i32));
        let call = DrawCall::fullscreen_quad(
            compiled,
            uniforms,
            DrawTarget::Offscreen(target),
            (width, height),
        );
        renderer.draw(&call).map_err(render_err)?;
        let pixels = renderer.read_pixels(target).map_err(render_err)?;
        if pixels.shape() != shape {
            return Err(PrefilterError::ReadbackShape {
                face,
                message: format!("got {}, expected {}", pixels.shape(), shape),
            });
        }
        tracing::debug!("Prefiltered face {}", face);
        Ok(pixels)
    })?;

    tracing::info!("Prefiltered cubemap with {}x{} faces", width, height);
    Ok(result)
}

/// Lambertian irradiance prefilter.
pub fn prefilter_irradiance<R: Renderer>(
    renderer: &mut R,
    faces: &CubeFaceSet,
) -> Result<CubeFaceSet, PrefilterError> {
    prefilter(renderer, faces, &LAMBERT_PROGRAM)
}
