use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::image::Image;
use crate::roughness::{self, RoughnessError};
use crate::sampling::{SampleTables, SamplingError, TableBuilder};

#[derive(Debug)]
pub enum MaterialError {
    IoError(std::io::Error),
    ParseError(serde_yaml::Error),
    Roughness(RoughnessError),
    Sampling(SamplingError),
}

impl std::fmt::Display for MaterialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "Material IO error: {}", e),
            Self::ParseError(e) => write!(f, "Material parse error: {}", e),
            Self::Roughness(e) => write!(f, "Material roughness error: {}", e),
            Self::Sampling(e) => write!(f, "Material sampling error: {}", e),
        }
    }
}

impl std::error::Error for MaterialError {}

impl From<RoughnessError> for MaterialError {
    fn from(e: RoughnessError) -> Self {
        Self::Roughness(e)
    }
}

impl From<SamplingError> for MaterialError {
    fn from(e: SamplingError) -> Self {
        Self::Sampling(e)
    }
}

/// SVBRDF material YAML. Map paths are relative to the file.
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialFile {
    pub alpha: f32,
    pub spec_shape_map: String,
    #[serde(default)]
    pub diffuse_map: Option<String>,
    #[serde(default)]
    pub specular_map: Option<String>,
    #[serde(default)]
    pub normal_map: Option<String>,
    #[serde(default)]
    pub sampling: SamplingSettings,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SamplingSettings {
    #[serde(default = "default_samples")]
    pub sigma_samples: usize,
    #[serde(default = "default_samples")]
    pub xi_samples: usize,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            sigma_samples: default_samples(),
            xi_samples: default_samples(),
        }
    }
}

fn default_samples() -> usize {
    crate::sampling::DEFAULT_SIGMA_SAMPLES
}

pub fn load_material(path: &Path) -> Result<MaterialFile, MaterialError> {
    let contents = std::fs::read_to_string(path).map_err(MaterialError::IoError)?;
    let material: MaterialFile =
        serde_yaml::from_str(&contents).map_err(MaterialError::ParseError)?;
    tracing::info!("Loaded material: {:?} (alpha = {})", path, material.alpha);
    Ok(material)
}

impl MaterialFile {
    /// Resolve `relative` against the directory containing `material_path`.
    pub fn resolve(material_path: &Path, relative: &str) -> PathBuf {
        material_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(relative)
    }

    pub fn table_builder(&self) -> TableBuilder {
        TableBuilder::new(self.alpha)
            .with_resolution(self.sampling.sigma_samples, self.sampling.xi_samples)
    }
}

/// Importance-sampling data derived from an SVBRDF's shape map.
#[derive(Debug, Clone)]
pub struct SvbrdfSampling {
    pub alpha: f32,
    pub sigma: Image,
    pub tables: SampleTables,
}

impl SvbrdfSampling {
    pub fn compute(builder: &TableBuilder, spec_shape_map: &Image) -> Result<Self, MaterialError> {
        let sigma = roughness::reduce(spec_shape_map)?;
        let tables = builder.build(&sigma)?;
        Ok(Self {
            alpha: builder.alpha,
            sigma,
            tables,
        })
    }

    pub fn uniform(&self) -> SamplingUniform {
        SamplingUniform {
            alpha: self.alpha,
            sigma_min: self.tables.sigma_min,
            sigma_max: self.tables.sigma_max,
            _pad: 0.0,
        }
    }
}

/// GPU-side sampling parameters (`u_alpha`, `u_sigma_range`).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SamplingUniform {
    pub alpha: f32,
    pub sigma_min: f32,
    pub sigma_max: f32,
    pub _pad: f32,
}
