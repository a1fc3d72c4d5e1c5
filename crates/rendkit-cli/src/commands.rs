use std::path::{Path, PathBuf};

use rendkit_core::cubemap::{self, CrossLayout, CubeFaceSet, CubemapError};
use rendkit_core::image::Image;
use rendkit_core::material::{self, MaterialError, MaterialFile, SvbrdfSampling};
use rendkit_core::postprocess::{self, PipelineInput, PostprocessError};
use rendkit_core::prefilter::{self, PrefilterError};
use rendkit_core::render::{RenderError, Renderer, TextureBinding};
use rendkit_core::sampling::SampleTables;
use rendkit_gpu::{GpuContext, GpuInitError, WgpuRenderer};
use serde::Serialize;

use crate::cli::{Command, FaceSource};
use crate::io::{self, IoError};

#[derive(Debug)]
pub enum CommandError {
    Io(IoError),
    Cubemap(CubemapError),
    Material(MaterialError),
    Prefilter(PrefilterError),
    Postprocess(PostprocessError),
    Gpu(GpuInitError),
    Render(RenderError),
    Metadata(std::io::Error),
    Json(serde_json::Error),
    NoFaceSource,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{}", e),
            Self::Cubemap(e) => write!(f, "{}", e),
            Self::Material(e) => write!(f, "{}", e),
            Self::Prefilter(e) => write!(f, "{}", e),
            Self::Postprocess(e) => write!(f, "{}", e),
            Self::Gpu(e) => write!(f, "GPU init error: {}", e),
            Self::Render(e) => write!(f, "{}", e),
            Self::Metadata(e) => write!(f, "Failed to write table metadata: {}", e),
            Self::Json(e) => write!(f, "Failed to encode table metadata: {}", e),
            Self::NoFaceSource => write!(f, "Either --cross or --faces is required"),
        }
    }
}

impl std::error::Error for CommandError {}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(impl From<$source> for CommandError {
            fn from(e: $source) -> Self {
                Self::$variant(e)
            }
        })*
    };
}

impl_from! {
    IoError => Io,
    CubemapError => Cubemap,
    MaterialError => Material,
    PrefilterError => Prefilter,
    PostprocessError => Postprocess,
    GpuInitError => Gpu,
    RenderError => Render,
    serde_json::Error => Json,
}

pub fn run(command: Command) -> Result<(), CommandError> {
    match command {
        Command::StackCross {
            faces,
            size,
            layout,
            output,
        } => stack_cross(&faces, size, layout.into(), &output),
        Command::UnstackCross {
            input,
            output,
            format,
        } => unstack_cross(&input, &output, &format),
        Command::Restack {
            input,
            layout,
            output,
        } => restack(&input, layout.into(), &output),
        Command::SampleTables {
            material,
            output,
            sigma_output,
        } => sample_tables(&material, &output, sigma_output.as_deref()),
        Command::Prefilter {
            source,
            size,
            layout,
            output,
        } => prefilter(&source, size, layout.into(), &output),
        Command::Postprocess {
            config,
            input,
            output,
        } => postprocess(&config, &input, &output),
    }
}

// ---------------------------------------------------------------------------
// Cross packing
// ---------------------------------------------------------------------------

pub fn stack_cross(
    faces_dir: &Path,
    size: u32,
    layout: CrossLayout,
    output: &Path,
) -> Result<(), CommandError> {
    let faces = io::load_faces(faces_dir, size)?;
    let cross = cubemap::pack(&faces, layout)?;
    io::save_image(output, &cross)?;
    Ok(())
}

pub fn unstack_cross(input: &Path, output_dir: &Path, extension: &str) -> Result<(), CommandError> {
    let cross = io::load_image(input)?;
    let faces = cubemap::unpack(&cross)?;
    io::save_faces(output_dir, &faces, extension)?;
    Ok(())
}

pub fn restack(input: &Path, layout: CrossLayout, output: &Path) -> Result<(), CommandError> {
    let cross = io::load_image(input)?;
    let restacked = cubemap::restack(&cross, layout)?;
    io::save_image(output, &restacked)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Sampling tables
// ---------------------------------------------------------------------------

/// JSON written next to the table image.
#[derive(Debug, Serialize)]
pub struct TableMetadata {
    pub alpha: f32,
    pub sigma_min: f32,
    pub sigma_max: f32,
    pub sigma_samples: usize,
    pub xi_samples: usize,
    pub table_image: String,
}

impl TableMetadata {
    fn new(sampling: &SvbrdfSampling, table_image: &Path) -> Self {
        Self {
            alpha: sampling.alpha,
            sigma_min: sampling.tables.sigma_min,
            sigma_max: sampling.tables.sigma_max,
            sigma_samples: sampling.tables.cdf.rows(),
            xi_samples: sampling.tables.cdf.cols(),
            table_image: table_image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Tables as one image: R = cdf (polar angle), G = pdf, B = 0.
pub fn tables_image(tables: &SampleTables) -> Image {
    Image::from_fn(tables.cdf.rows(), tables.cdf.cols(), 3, |row, col, ch| match ch {
        0 => tables.cdf.get(row, col),
        1 => tables.pdf.get(row, col),
        _ => 0.0,
    })
}

pub fn metadata_path(table_image: &Path) -> PathBuf {
    table_image.with_extension("json")
}

pub fn sample_tables(
    material_path: &Path,
    output: &Path,
    sigma_output: Option<&Path>,
) -> Result<(), CommandError> {
    let material = material::load_material(material_path)?;
    let shape_map = io::load_image(&MaterialFile::resolve(
        material_path,
        &material.spec_shape_map,
    ))?;

    let sampling = SvbrdfSampling::compute(&material.table_builder(), &shape_map)?;
    io::save_image(output, &tables_image(&sampling.tables))?;

    let metadata = TableMetadata::new(&sampling, output);
    let json = serde_json::to_string_pretty(&metadata)?;
    let json_path = metadata_path(output);
    std::fs::write(&json_path, json).map_err(CommandError::Metadata)?;
    tracing::info!("Wrote table metadata to {:?}", json_path);

    if let Some(path) = sigma_output {
        io::save_image(path, &sampling.sigma)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// GPU commands
// ---------------------------------------------------------------------------

fn load_source(source: &FaceSource, size: u32) -> Result<CubeFaceSet, CommandError> {
    match (&source.cross, &source.faces) {
        (Some(cross), _) => Ok(cubemap::unpack(&io::load_image(cross)?)?),
        (None, Some(dir)) => Ok(io::load_faces(dir, size)?),
        (None, None) => Err(CommandError::NoFaceSource),
    }
}

pub fn prefilter(
    source: &FaceSource,
    size: u32,
    layout: CrossLayout,
    output: &Path,
) -> Result<(), CommandError> {
    let faces = load_source(source, size)?;
    let shape = faces.face_shape();

    let context = GpuContext::new_headless()?;
    let mut renderer = WgpuRenderer::new(context, (shape.width as u32, shape.height as u32))?;
    let irradiance = prefilter::prefilter_irradiance(&mut renderer, &faces)?;

    let cross = cubemap::pack(&irradiance, layout)?;
    io::save_image(output, &cross)?;
    Ok(())
}

pub fn postprocess(config: &Path, input: &Path, output: &Path) -> Result<(), CommandError> {
    let chain = postprocess::load_postprocess(config)?;
    let frame = io::load_image(input)?;

    let [width, height] = chain.settings.resolution;
    let context = GpuContext::new_headless()?;
    let mut renderer = WgpuRenderer::new(context, (width, height))?;
    let mut pipeline = chain.build(&mut renderer)?;

    let texture = renderer.upload_texture(&frame)?;
    pipeline.draw(
        &mut renderer,
        PipelineInput {
            texture: TextureBinding::Texture(texture),
            shape: (frame.height() as u32, frame.width() as u32),
        },
    )?;

    let display = renderer.read_display()?;
    let rgb = Image::from_fn(display.height(), display.width(), 3, |row, col, ch| {
        display.pixel(row, col)[ch]
    });
    io::save_image(output, &rgb)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rendkit-cmd-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn asymmetric_faces(size: usize) -> CubeFaceSet {
        CubeFaceSet::new(std::array::from_fn(|i| {
            Image::from_fn(size, size, 3, |r, c, ch| {
                (i * 1000 + r * 10 + c) as f32 + ch as f32 * 0.5
            })
        }))
        .unwrap()
    }

    #[test]
    fn test_unstack_then_stack_cross_round_trip() {
        let dir = scratch_dir("roundtrip");
        let faces = asymmetric_faces(4);
        let cross_path = dir.join("cross.exr");
        io::save_image(&cross_path, &cubemap::pack(&faces, CrossLayout::Vertical).unwrap()).unwrap();

        let faces_dir = dir.join("faces");
        unstack_cross(&cross_path, &faces_dir, "exr").unwrap();
        assert!(faces_dir.join("-z.exr").is_file());

        let restacked_path = dir.join("restacked.exr");
        stack_cross(&faces_dir, 4, CrossLayout::Horizontal, &restacked_path).unwrap();
        let restacked = io::load_image(&restacked_path).unwrap();
        assert_eq!(restacked.shape().height, 12);
        assert_eq!(restacked.shape().width, 16);
        assert_eq!(cubemap::unpack(&restacked).unwrap(), faces);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_restack_command() {
        let dir = scratch_dir("restack");
        let faces = asymmetric_faces(3);
        let input = dir.join("h.exr");
        io::save_image(&input, &cubemap::pack(&faces, CrossLayout::Horizontal).unwrap()).unwrap();

        let output = dir.join("v.exr");
        restack(&input, CrossLayout::Vertical, &output).unwrap();
        let vertical = io::load_image(&output).unwrap();
        assert_eq!((vertical.height(), vertical.width()), (12, 9));
        assert_eq!(cubemap::unpack(&vertical).unwrap(), faces);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_sample_tables_writes_image_and_metadata() {
        let dir = scratch_dir("tables");
        let shape_map = Image::from_fn(2, 2, 3, |r, c, ch| match ch {
            2 => 0.0,
            _ => 4.0 + (r * 2 + c) as f32 * 4.0,
        });
        io::save_image(&dir.join("shape.exr"), &shape_map).unwrap();
        std::fs::write(
            dir.join("material.yaml"),
            "alpha: 1.0\nspec_shape_map: shape.exr\nsampling:\n  sigma_samples: 8\n  xi_samples: 16\n",
        )
        .unwrap();

        let output = dir.join("tables.exr");
        let sigma = dir.join("sigma.exr");
        sample_tables(&dir.join("material.yaml"), &output, Some(&sigma)).unwrap();

        let tables = io::load_image(&output).unwrap();
        assert_eq!((tables.height(), tables.width()), (8, 16));
        assert!(sigma.is_file());

        let json = std::fs::read_to_string(metadata_path(&output)).unwrap();
        let metadata: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata["sigma_samples"], 8);
        assert_eq!(metadata["xi_samples"], 16);
        assert_eq!(metadata["sigma_max"], 0.5);
        assert_eq!(metadata["table_image"], "tables.exr");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_tables_image_channels() {
        let builder = rendkit_core::sampling::TableBuilder::new(1.0).with_resolution(4, 5);
        let sigma = Image::from_vec(1, 2, 1, vec![0.5, 1.0]).unwrap();
        let tables = builder.build(&sigma).unwrap();
        let image = tables_image(&tables);
        assert_eq!((image.height(), image.width(), image.channels()), (4, 5, 3));
        assert_eq!(image.pixel(2, 3)[0], tables.cdf.get(2, 3));
        assert_eq!(image.pixel(2, 3)[1], tables.pdf.get(2, 3));
        assert_eq!(image.pixel(2, 3)[2], 0.0);
    }
}
