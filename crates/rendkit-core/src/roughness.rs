//! Specular-shape tensor to scalar roughness.
//!
//! The shape map stores a symmetric 2x2 matrix per pixel in three channels
//! `(Sxx, Syy, Sxy)`. Roughness is `sigma = 1 / sqrt(beta)` where `beta` is
//! the larger eigenvalue of that matrix.
//!
//! NOTE: the material pipeline this feeds describes the isotropic
//! approximation as using the *smallest* eigenvalue of S, but the formula the
//! shading code depends on takes the larger root of the characteristic
//! polynomial. The formula is kept as-is.
//!
//! Non-positive `beta` is not trapped: `sigma` becomes `inf` or NaN and is
//! passed through to the caller.

use glam::Mat2;

use crate::image::{Image, ImageShape};

#[derive(Debug)]
pub enum RoughnessError {
    ChannelCount(ImageShape),
}

impl std::fmt::Display for RoughnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelCount(shape) => write!(
                f,
                "Specular shape map must have 3 channels (xx, yy, xy), got shape {}",
                shape
            ),
        }
    }
}

impl std::error::Error for RoughnessError {}

/// The symmetric shape matrix stored in one shape-map pixel.
pub fn shape_matrix(pixel: &[f32]) -> Mat2 {
    let (xx, yy, xy) = (pixel[0], pixel[1], pixel[2]);
    Mat2::from_cols_array(&[xx, xy, xy, yy])
}

/// Larger eigenvalue of a symmetric 2x2 matrix.
///
/// The discriminant is clamped at zero so near-degenerate input cannot take
/// the square root of a small negative number.
pub fn larger_eigenvalue(s: Mat2) -> f32 {
    let trace = s.x_axis.x + s.y_axis.y;
    let det = s.determinant();
    let root = (trace * trace - 4.0 * det).max(0.0).sqrt();
    (trace + root) / 2.0
}

/// Roughness of a single shape-map pixel.
pub fn pixel_roughness(pixel: &[f32]) -> f32 {
    1.0 / larger_eigenvalue(shape_matrix(pixel)).sqrt()
}

/// Reduce a 3-channel shape map to a single-channel roughness field.
pub fn reduce(shape_map: &Image) -> Result<Image, RoughnessError> {
    let shape = shape_map.shape();
    if shape.channels != 3 {
        return Err(RoughnessError::ChannelCount(shape));
    }

    let data: Vec<f32> = shape_map.pixels().map(pixel_roughness).collect();
    let field = Image::from_vec(shape.height, shape.width, 1, data)
        .map_err(|_| RoughnessError::ChannelCount(shape))?;

    let non_finite = field.as_slice().iter().filter(|s| !s.is_finite()).count();
    if non_finite > 0 {
        tracing::warn!(
            "{} of {} roughness values are not finite (non-positive eigenvalue)",
            non_finite,
            shape.height * shape.width
        );
    }
    Ok(field)
}
