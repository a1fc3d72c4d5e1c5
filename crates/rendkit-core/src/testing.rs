//! In-memory renderer that records every call, for orchestration tests.

use crate::cubemap::CubeFaceSet;
use crate::image::Image;
use crate::render::{
    ChannelFormat, DrawCall, DrawTarget, ProgramDesc, ProgramId, RenderError, Renderer, TargetId,
    TextureId, UniformValue,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Compile(ProgramDesc),
    Allocate { width: u32, height: u32, format: ChannelFormat },
    UploadTexture,
    UploadCubemap,
    Draw(DrawCall),
    Read(TargetId),
}

#[derive(Debug, Clone, Copy)]
pub struct RecordedTarget {
    pub width: u32,
    pub height: u32,
    pub format: ChannelFormat,
    /// Value written by the last draw, filled into every channel on readback.
    pub fill: f32,
}

/// Fails the n-th call of a kind (0-based) when set.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailurePlan {
    pub compile_at: Option<usize>,
    pub allocate_at: Option<usize>,
    pub draw_at: Option<usize>,
}

pub struct RecordingRenderer {
    pub calls: Vec<Call>,
    pub targets: Vec<RecordedTarget>,
    pub display: (u32, u32),
    pub fail: FailurePlan,
    programs: usize,
    textures: usize,
    compiles: usize,
    allocations: usize,
    draws: usize,
}

impl RecordingRenderer {
    pub fn new(display: (u32, u32)) -> Self {
        Self {
            calls: Vec::new(),
            targets: Vec::new(),
            display,
            fail: FailurePlan::default(),
            programs: 0,
            textures: 0,
            compiles: 0,
            allocations: 0,
            draws: 0,
        }
    }

    pub fn draws(&self) -> Vec<&DrawCall> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Draw(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn allocations(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Allocate { .. }))
            .count()
    }
}

impl Renderer for RecordingRenderer {
    fn compile(&mut self, desc: &ProgramDesc) -> Result<ProgramId, RenderError> {
        let n = self.compiles;
        self.compiles += 1;
        self.calls.push(Call::Compile(*desc));
        if self.fail.compile_at == Some(n) {
            return Err(RenderError::CompileFailed(desc.fragment.to_string()));
        }
        self.programs += 1;
        Ok(ProgramId(self.programs - 1))
    }

    fn allocate_target(
        &mut self,
        width: u32,
        height: u32,
        format: ChannelFormat,
    ) -> Result<TargetId, RenderError> {
        let n = self.allocations;
        self.allocations += 1;
        self.calls.push(Call::Allocate {
            width,
            height,
            format,
        });
        if self.fail.allocate_at == Some(n) {
            return Err(RenderError::AllocationFailed(format!("{}x{}", width, height)));
        }
        self.targets.push(RecordedTarget {
            width,
            height,
            format,
            fill: 0.0,
        });
        Ok(TargetId(self.targets.len() - 1))
    }

    fn upload_texture(&mut self, _image: &Image) -> Result<TextureId, RenderError> {
        self.calls.push(Call::UploadTexture);
        self.textures += 1;
        Ok(TextureId(self.textures - 1))
    }

    fn upload_cubemap(&mut self, _faces: &CubeFaceSet) -> Result<TextureId, RenderError> {
        self.calls.push(Call::UploadCubemap);
        self.textures += 1;
        Ok(TextureId(self.textures - 1))
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), RenderError> {
        let n = self.draws;
        self.draws += 1;
        self.calls.push(Call::Draw(call.clone()));
        if self.fail.draw_at == Some(n) {
            return Err(RenderError::DrawFailed(format!("draw {}", n)));
        }
        if let DrawTarget::Offscreen(id) = call.target {
            let fill = match call.uniforms.get("u_cube_face") {
                Some(UniformValue::Int(face)) => *face as f32,
                _ => n as f32,
            };
            let target = self
                .targets
                .get_mut(id.0)
                .ok_or_else(|| RenderError::UnknownHandle(format!("{:?}", id)))?;
            target.fill = fill;
        }
        Ok(())
    }

    fn read_pixels(&mut self, target: TargetId) -> Result<Image, RenderError> {
        self.calls.push(Call::Read(target));
        let t = self
            .targets
            .get(target.0)
            .ok_or_else(|| RenderError::UnknownHandle(format!("{:?}", target)))?;
        let fill = t.fill;
        Ok(Image::from_fn(
            t.height as usize,
            t.width as usize,
            t.format.channels(),
            |_, _, _| fill,
        ))
    }

    fn display_size(&self) -> (u32, u32) {
        self.display
    }
}
