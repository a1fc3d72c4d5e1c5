use std::path::Path;

use serde::Deserialize;

use crate::render::{
    ChannelFormat, DrawCall, DrawTarget, ProgramDesc, ProgramId, RenderError, Renderer, TargetId,
    TextureBinding, UniformValue, Uniforms,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum PostprocessError {
    UnsupportedScale(u32),
    Render { stage: usize, source: RenderError },
    Poisoned,
    IoError(std::io::Error),
    ParseError(serde_yaml::Error),
}

impl std::fmt::Display for PostprocessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedScale(scale) => write!(
                f,
                "Unsupported downsample scale {} (supported: 2, 3)",
                scale
            ),
            Self::Render { stage, source } => write!(f, "Post-process stage {}: {}", stage, source),
            Self::Poisoned => write!(
                f,
                "Post-process pipeline failed earlier and must be rebuilt"
            ),
            Self::IoError(e) => write!(f, "Post-process config IO error: {}", e),
            Self::ParseError(e) => write!(f, "Post-process config parse error: {}", e),
        }
    }
}

impl std::error::Error for PostprocessError {}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Largest supported downsample factor.
pub const MAX_DOWNSAMPLE_SCALE: u32 = 3;

/// 4-tap Lanczos weights for 2x and 3x supersample resolve, indexed by
/// `scale - 2`.
pub const LANCZOS_KERNELS: [[f32; 4]; 2] = [
    [
        0.440_311_3,
        0.298_804_38,
        0.045_356_43,
        -0.064_316_46,
    ],
    [
        0.279_756_45,
        0.231_071_7,
        0.117_976_53,
        0.011_073_543,
    ],
];

pub const DEFAULT_GAMMA: f32 = 2.2;

const QUAD_VERTEX: &str = "postprocessing/quad.vert";

/// What every post-process stage must provide to the pipeline.
pub trait PostprocessStage {
    fn program(&self) -> ProgramDesc;

    /// Stage uniforms given the `(height, width)` of its input image.
    fn contribute_uniforms(&self, input_shape: (u32, u32)) -> Uniforms;

    /// Channel format of the offscreen target the stage renders into.
    fn required_output_format(&self) -> ChannelFormat;

    /// Reject configurations the stage cannot run with.
    fn validate(&self) -> Result<(), PostprocessError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stage {
    Identity,
    /// Supersample resolve with a Lanczos kernel.
    Downsample { scale: u32 },
    GammaCorrection {
        #[serde(default = "default_gamma")]
        gamma: f32,
    },
    ReinhardTonemap { thres: f32 },
    ExposureTonemap { exposure: f32 },
}

fn default_gamma() -> f32 {
    DEFAULT_GAMMA
}

impl Stage {
    pub fn gamma_correction() -> Self {
        Self::GammaCorrection {
            gamma: DEFAULT_GAMMA,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Downsample { .. } => "downsample",
            Self::GammaCorrection { .. } => "gamma_correction",
            Self::ReinhardTonemap { .. } => "reinhard_tonemap",
            Self::ExposureTonemap { .. } => "exposure_tonemap",
        }
    }
}

impl PostprocessStage for Stage {
    fn program(&self) -> ProgramDesc {
        let fragment = match self {
            Self::Identity => "postprocessing/identity.frag",
            Self::Downsample { .. } => "postprocessing/ssaa.frag",
            Self::GammaCorrection { .. } => "postprocessing/gamma_correction.frag",
            Self::ReinhardTonemap { .. } => "postprocessing/reinhard_tonemap.frag",
            Self::ExposureTonemap { .. } => "postprocessing/exposure_tonemap.frag",
        };
        ProgramDesc {
            vertex: QUAD_VERTEX,
            fragment,
        }
    }

    fn contribute_uniforms(&self, input_shape: (u32, u32)) -> Uniforms {
        let mut uniforms = Uniforms::new();
        match *self {
            Self::Identity => {}
            Self::Downsample { scale } => {
                if let Some(kernel) = LANCZOS_KERNELS.get(scale.wrapping_sub(2) as usize) {
                    uniforms.set("u_aa_kernel", UniformValue::Vec4(*kernel));
                }
                uniforms.set(
                    "u_texture_shape",
                    UniformValue::Vec2([input_shape.0 as f32, input_shape.1 as f32]),
                );
            }
            Self::GammaCorrection { gamma } => {
                uniforms.set("u_gamma", UniformValue::Float(gamma));
            }
            Self::ReinhardTonemap { thres } => {
                uniforms.set("u_thres", UniformValue::Float(thres));
            }
            Self::ExposureTonemap { exposure } => {
                uniforms.set("u_exposure", UniformValue::Float(exposure));
            }
        }
        uniforms
    }

    fn required_output_format(&self) -> ChannelFormat {
        ChannelFormat::Rgba32F
    }

    fn validate(&self) -> Result<(), PostprocessError> {
        match *self {
            Self::Downsample { scale } if !(2..=MAX_DOWNSAMPLE_SCALE).contains(&scale) => {
                Err(PostprocessError::UnsupportedScale(scale))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

struct CompiledStage {
    stage: Stage,
    program: ProgramId,
    target: TargetId,
}

/// The image fed into the first stage.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInput {
    pub texture: TextureBinding,
    /// `(height, width)` of the input image.
    pub shape: (u32, u32),
}

/// An ordered chain of full-screen stages at a fixed resolution.
///
/// Every appended stage owns an offscreen target of the configured size,
/// allocated once at append time. At draw time the last stage renders to
/// the display instead of its target.
pub struct PostprocessPipeline {
    width: u32,
    height: u32,
    stages: Vec<CompiledStage>,
    poisoned: bool,
}

impl PostprocessPipeline {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stages: Vec::new(),
            poisoned: false,
        }
    }

    /// Configured `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().map(|s| &s.stage)
    }

    /// Offscreen targets in stage order.
    pub fn targets(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.stages.iter().map(|s| s.target)
    }

    pub fn append<R: Renderer>(&mut self, renderer: &mut R, stage: Stage) -> Result<(), PostprocessError> {
        stage.validate()?;
        let index = self.stages.len();
        let render_err = |source| PostprocessError::Render {
            stage: index,
            source,
        };

        let program = renderer.compile(&stage.program()).map_err(render_err)?;
        let target = renderer
            .allocate_target(self.width, self.height, stage.required_output_format())
            .map_err(render_err)?;

        tracing::debug!(
            "Appended post-process stage {} '{}' with {}x{} target",
            index,
            stage.name(),
            self.width,
            self.height
        );
        self.stages.push(CompiledStage {
            stage,
            program,
            target,
        });
        Ok(())
    }

    /// Run every stage once, in order, ending on the display.
    pub fn draw<R: Renderer>(&mut self, renderer: &mut R, input: PipelineInput) -> Result<(), PostprocessError> {
        if self.poisoned {
            return Err(PostprocessError::Poisoned);
        }
        let result = self.draw_stages(renderer, input);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn draw_stages<R: Renderer>(&self, renderer: &mut R, input: PipelineInput) -> Result<(), PostprocessError> {
        let mut current = input;
        let last = self.stages.len().saturating_sub(1);

        for (i, compiled) in self.stages.iter().enumerate() {
            let mut uniforms = compiled.stage.contribute_uniforms(current.shape);
            uniforms.set("u_rendtex", UniformValue::Texture(current.texture));

            let (target, viewport) = if i == last {
                (DrawTarget::Display, renderer.display_size())
            } else {
                (DrawTarget::Offscreen(compiled.target), (self.width, self.height))
            };

            let call = DrawCall::fullscreen_quad(compiled.program, uniforms, target, viewport);
            renderer
                .draw(&call)
                .map_err(|source| PostprocessError::Render { stage: i, source })?;

            current = PipelineInput {
                texture: TextureBinding::Target(compiled.target),
                shape: (self.height, self.width),
            };
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// YAML configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PostprocessFile {
    pub version: u32,
    #[serde(default)]
    pub settings: PostprocessSettings,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

#[derive(Debug, Deserialize)]
pub struct PostprocessSettings {
    #[serde(default = "default_resolution")]
    pub resolution: [u32; 2],
}

impl Default for PostprocessSettings {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
        }
    }
}

fn default_resolution() -> [u32; 2] {
    [1280, 720]
}

pub fn load_postprocess(path: &Path) -> Result<PostprocessFile, PostprocessError> {
    let contents = std::fs::read_to_string(path).map_err(PostprocessError::IoError)?;
    let file = parse_postprocess(&contents)?;
    tracing::info!(
        "Loaded post-process chain v{} with {} stages",
        file.version,
        file.stages.len()
    );
    Ok(file)
}

pub fn parse_postprocess(yaml: &str) -> Result<PostprocessFile, PostprocessError> {
    serde_yaml::from_str(yaml).map_err(PostprocessError::ParseError)
}

impl PostprocessFile {
    /// Build a pipeline at the configured resolution with every stage
    /// appended in file order.
    pub fn build<R: Renderer>(&self, renderer: &mut R) -> Result<PostprocessPipeline, PostprocessError> {
        let [width, height] = self.settings.resolution;
        let mut pipeline = PostprocessPipeline::new(width, height);
        for stage in &self.stages {
            pipeline.append(renderer, *stage)?;
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::TextureId;
    use crate::testing::{Call, RecordingRenderer};

    fn input() -> PipelineInput {
        PipelineInput {
            texture: TextureBinding::Texture(TextureId(0)),
            shape: (1440, 2560),
        }
    }

    #[test]
    fn test_append_allocates_one_target_per_stage() {
        let mut renderer = RecordingRenderer::new((1920, 1080));
        let mut pipeline = PostprocessPipeline::new(1280, 720);
        pipeline.append(&mut renderer, Stage::Downsample { scale: 2 }).unwrap();
        pipeline.append(&mut renderer, Stage::ReinhardTonemap { thres: 3.0 }).unwrap();
        pipeline.append(&mut renderer, Stage::gamma_correction()).unwrap();

        assert_eq!(pipeline.len(), 3);
        assert_eq!(renderer.allocations(), 3);
        for target in &renderer.targets {
            assert_eq!((target.width, target.height), (1280, 720));
            assert_eq!(target.format, ChannelFormat::Rgba32F);
        }
    }

    #[test]
    fn test_draw_issues_one_call_per_stage() {
        let mut renderer = RecordingRenderer::new((1920, 1080));
        let mut pipeline = PostprocessPipeline::new(1280, 720);
        pipeline.append(&mut renderer, Stage::Identity).unwrap();
        pipeline.append(&mut renderer, Stage::ExposureTonemap { exposure: 1.5 }).unwrap();
        pipeline.append(&mut renderer, Stage::gamma_correction()).unwrap();
        let allocations = renderer.allocations();

        pipeline.draw(&mut renderer, input()).unwrap();

        let draws = renderer.draws();
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[0].target, DrawTarget::Offscreen(TargetId(0)));
        assert_eq!(draws[0].viewport, (1280, 720));
        assert_eq!(draws[1].target, DrawTarget::Offscreen(TargetId(1)));
        assert_eq!(draws[1].viewport, (1280, 720));
        assert_eq!(draws[2].target, DrawTarget::Display);
        assert_eq!(draws[2].viewport, (1920, 1080));
        assert!(draws.iter().all(|d| !d.depth_test));

        // Drawing never allocates.
        assert_eq!(renderer.allocations(), allocations);
    }

    #[test]
    fn test_stage_inputs_chain() {
        let mut renderer = RecordingRenderer::new((800, 600));
        let mut pipeline = PostprocessPipeline::new(640, 480);
        pipeline.append(&mut renderer, Stage::Identity).unwrap();
        pipeline.append(&mut renderer, Stage::Identity).unwrap();
        pipeline.append(&mut renderer, Stage::Identity).unwrap();
        pipeline.draw(&mut renderer, input()).unwrap();

        let draws = renderer.draws();
        assert_eq!(
            draws[0].uniforms.get("u_rendtex"),
            Some(&UniformValue::Texture(TextureBinding::Texture(TextureId(0))))
        );
        assert_eq!(
            draws[1].uniforms.get("u_rendtex"),
            Some(&UniformValue::Texture(TextureBinding::Target(TargetId(0))))
        );
        assert_eq!(
            draws[2].uniforms.get("u_rendtex"),
            Some(&UniformValue::Texture(TextureBinding::Target(TargetId(1))))
        );
    }

    #[test]
    fn test_downsample_receives_input_shape() {
        let mut renderer = RecordingRenderer::new((800, 600));
        let mut pipeline = PostprocessPipeline::new(1280, 720);
        pipeline.append(&mut renderer, Stage::Downsample { scale: 2 }).unwrap();
        pipeline.append(&mut renderer, Stage::Downsample { scale: 3 }).unwrap();
        pipeline.draw(&mut renderer, input()).unwrap();

        let draws = renderer.draws();
        assert_eq!(
            draws[0].uniforms.get("u_texture_shape"),
            Some(&UniformValue::Vec2([1440.0, 2560.0]))
        );
        assert_eq!(
            draws[0].uniforms.get("u_aa_kernel"),
            Some(&UniformValue::Vec4(LANCZOS_KERNELS[0]))
        );
        // Second stage reads the pipeline-sized target.
        assert_eq!(
            draws[1].uniforms.get("u_texture_shape"),
            Some(&UniformValue::Vec2([720.0, 1280.0]))
        );
        assert_eq!(
            draws[1].uniforms.get("u_aa_kernel"),
            Some(&UniformValue::Vec4(LANCZOS_KERNELS[1]))
        );
    }

    #[test]
    fn test_single_stage_draws_to_display() {
        let mut renderer = RecordingRenderer::new((300, 200));
        let mut pipeline = PostprocessPipeline::new(64, 64);
        pipeline.append(&mut renderer, Stage::Identity).unwrap();
        pipeline.draw(&mut renderer, input()).unwrap();
        let draws = renderer.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].target, DrawTarget::Display);
        assert_eq!(draws[0].viewport, (300, 200));
    }

    #[test]
    fn test_unsupported_scale_fails_at_append() {
        let mut renderer = RecordingRenderer::new((300, 200));
        let mut pipeline = PostprocessPipeline::new(64, 64);
        for scale in [0, 1, 4] {
            match pipeline.append(&mut renderer, Stage::Downsample { scale }) {
                Err(PostprocessError::UnsupportedScale(s)) => assert_eq!(s, scale),
                other => panic!("Expected UnsupportedScale, got: {:?}", other),
            }
        }
        assert!(pipeline.is_empty());
        assert!(renderer.calls.is_empty());
    }

    #[test]
    fn test_failed_draw_poisons_pipeline() {
        let mut renderer = RecordingRenderer::new((300, 200));
        let mut pipeline = PostprocessPipeline::new(64, 64);
        pipeline.append(&mut renderer, Stage::Identity).unwrap();
        pipeline.append(&mut renderer, Stage::Identity).unwrap();
        pipeline.append(&mut renderer, Stage::Identity).unwrap();
        renderer.fail.draw_at = Some(1);

        match pipeline.draw(&mut renderer, input()) {
            Err(PostprocessError::Render { stage: 1, .. }) => {}
            other => panic!("Expected failure at stage 1, got: {:?}", other),
        }
        // Stage 2 was never attempted.
        assert_eq!(renderer.draws().len(), 2);

        renderer.fail.draw_at = None;
        assert!(matches!(
            pipeline.draw(&mut renderer, input()),
            Err(PostprocessError::Poisoned)
        ));
        assert_eq!(renderer.draws().len(), 2);
    }

    #[test]
    fn test_allocation_failure_leaves_pipeline_unchanged() {
        let mut renderer = RecordingRenderer::new((300, 200));
        renderer.fail.allocate_at = Some(1);
        let mut pipeline = PostprocessPipeline::new(64, 64);
        pipeline.append(&mut renderer, Stage::Identity).unwrap();
        assert!(matches!(
            pipeline.append(&mut renderer, Stage::Identity),
            Err(PostprocessError::Render { stage: 1, .. })
        ));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_stage_uniforms() {
        assert!(Stage::Identity.contribute_uniforms((4, 4)).is_empty());
        assert_eq!(
            Stage::gamma_correction().contribute_uniforms((4, 4)).get("u_gamma"),
            Some(&UniformValue::Float(2.2))
        );
        assert_eq!(
            Stage::ReinhardTonemap { thres: 5.0 }
                .contribute_uniforms((4, 4))
                .get("u_thres"),
            Some(&UniformValue::Float(5.0))
        );
        assert_eq!(
            Stage::ExposureTonemap { exposure: 0.5 }
                .contribute_uniforms((4, 4))
                .get("u_exposure"),
            Some(&UniformValue::Float(0.5))
        );
    }

    #[test]
    fn test_parse_postprocess_yaml() {
        let yaml = r#"
version: 1
settings:
  resolution: [1920, 1080]

stages:
  - type: downsample
    scale: 2
  - type: reinhard_tonemap
    thres: 3.0
  - type: exposure_tonemap
    exposure: 1.25
  - type: gamma_correction
  - type: identity
"#;
        let file = parse_postprocess(yaml).unwrap();
        assert_eq!(file.version, 1);
        assert_eq!(file.settings.resolution, [1920, 1080]);
        assert_eq!(
            file.stages,
            vec![
                Stage::Downsample { scale: 2 },
                Stage::ReinhardTonemap { thres: 3.0 },
                Stage::ExposureTonemap { exposure: 1.25 },
                Stage::GammaCorrection { gamma: 2.2 },
                Stage::Identity,
            ]
        );
    }

    #[test]
    fn test_parse_rejects_unknown_stage() {
        let yaml = r#"
version: 1
stages:
  - type: bloom
"#;
        assert!(matches!(
            parse_postprocess(yaml),
            Err(PostprocessError::ParseError(_))
        ));
    }

    #[test]
    fn test_build_from_file() {
        let yaml = r#"
version: 1
settings:
  resolution: [320, 240]
stages:
  - type: downsample
    scale: 3
  - type: gamma_correction
    gamma: 1.8
"#;
        let file = parse_postprocess(yaml).unwrap();
        let mut renderer = RecordingRenderer::new((640, 480));
        let pipeline = file.build(&mut renderer).unwrap();
        assert_eq!(pipeline.size(), (320, 240));
        assert_eq!(pipeline.len(), 2);
        let compiled: Vec<_> = renderer
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Compile(desc) => Some(desc.fragment),
                _ => None,
            })
            .collect();
        assert_eq!(
            compiled,
            vec!["postprocessing/ssaa.frag", "postprocessing/gamma_correction.frag"]
        );
    }

    #[test]
    fn test_build_rejects_bad_scale_from_file() {
        let file = parse_postprocess("version: 1\nstages:\n  - type: downsample\n    scale: 5\n").unwrap();
        let mut renderer = RecordingRenderer::new((640, 480));
        assert!(matches!(
            file.build(&mut renderer),
            Err(PostprocessError::UnsupportedScale(5))
        ));
    }
}
