//! Importance-sampling lookup tables for the SVBRDF specular lobe.
//!
//! The lobe is a generalized Gaussian in the half-vector slope with shape
//! exponent `alpha`. Each table row corresponds to one roughness value in
//! `[sigma_min, sigma_max]`; each column to a quantile `xi` in `[0, 1]`.
//!
//! - CDF table: the sampled polar angle `theta(xi) = atan(sigma * u(xi))`,
//!   read directly by the shader as an inverse-CDF lookup.
//! - PDF table: the lobe density at that angle.
//!
//! with `p = alpha / 2` and `u(xi) = P^-1(1/p, xi)^p`.

use std::f64::consts::PI;

use crate::image::Image;
use crate::special::{gamma, gamma_p_inv};

/// Default number of roughness rows.
pub const DEFAULT_SIGMA_SAMPLES: usize = 256;
/// Default number of quantile columns.
pub const DEFAULT_XI_SAMPLES: usize = 256;

#[derive(Debug)]
pub enum SamplingError {
    InvalidAlpha(f32),
    EmptyResolution { sigma_samples: usize, xi_samples: usize },
    NoFiniteRoughness,
    ChannelCount(usize),
}

impl std::fmt::Display for SamplingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAlpha(alpha) => {
                write!(f, "Shape exponent alpha must be positive and finite, got {}", alpha)
            }
            Self::EmptyResolution {
                sigma_samples,
                xi_samples,
            } => write!(
                f,
                "Sample table resolution must be non-zero, got {}x{}",
                sigma_samples, xi_samples
            ),
            Self::NoFiniteRoughness => write!(f, "Roughness field has no finite values"),
            Self::ChannelCount(n) => {
                write!(f, "Roughness field must have 1 channel, got {}", n)
            }
        }
    }
}

impl std::error::Error for SamplingError {}

/// A dense `rows x cols` table of `f32`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl SampleTable {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// View the table as a single-channel image for texture upload.
    pub fn to_image(&self) -> Image {
        Image::from_fn(self.rows, self.cols, 1, |r, c, _| self.get(r, c))
    }
}

/// Output of [`TableBuilder::build`].
#[derive(Debug, Clone)]
pub struct SampleTables {
    pub cdf: SampleTable,
    pub pdf: SampleTable,
    pub sigma_min: f32,
    pub sigma_max: f32,
}

impl SampleTables {
    /// Fractional row index for a shading-time roughness value, clamped to
    /// the table. A flat roughness range always maps to row 0.
    pub fn row_coordinate(&self, sigma: f32) -> f32 {
        let span = self.sigma_max - self.sigma_min;
        if span <= 0.0 {
            return 0.0;
        }
        let t = ((sigma - self.sigma_min) / span).clamp(0.0, 1.0);
        t * (self.cdf.rows() - 1) as f32
    }
}

/// `n` evenly spaced samples over `[start, stop]`, both ends included.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Inverse-CDF angle for one roughness value.
pub fn lobe_angle(sigma: f64, u: f64) -> f64 {
    (sigma * u).atan()
}

/// Lobe density at the angle produced by [`lobe_angle`].
pub fn lobe_density(sigma: f64, alpha: f64, u: f64) -> f64 {
    let p = alpha / 2.0;
    let theta = lobe_angle(sigma, u);
    let sigma2 = sigma * sigma;
    let norm = p / (sigma2 * PI * gamma(1.0 / p));
    norm * (-((theta.tan().powi(2) / sigma2).powf(p))).exp()
}

/// Builds CDF/PDF sample tables from a roughness field.
#[derive(Debug, Clone, Copy)]
pub struct TableBuilder {
    pub alpha: f32,
    pub sigma_samples: usize,
    pub xi_samples: usize,
}

impl TableBuilder {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            sigma_samples: DEFAULT_SIGMA_SAMPLES,
            xi_samples: DEFAULT_XI_SAMPLES,
        }
    }

    pub fn with_resolution(mut self, sigma_samples: usize, xi_samples: usize) -> Self {
        self.sigma_samples = sigma_samples;
        self.xi_samples = xi_samples;
        self
    }

    fn validate(&self) -> Result<(), SamplingError> {
        if !(self.alpha > 0.0 && self.alpha.is_finite()) {
            return Err(SamplingError::InvalidAlpha(self.alpha));
        }
        if self.sigma_samples == 0 || self.xi_samples == 0 {
            return Err(SamplingError::EmptyResolution {
                sigma_samples: self.sigma_samples,
                xi_samples: self.xi_samples,
            });
        }
        Ok(())
    }

    /// The roughness-independent quantile transform `u(xi)`.
    pub fn quantile_transform(&self) -> Vec<f64> {
        let p = self.alpha as f64 / 2.0;
        linspace(0.0, 1.0, self.xi_samples)
            .into_iter()
            .map(|xi| gamma_p_inv(1.0 / p, xi).powf(p))
            .collect()
    }

    /// Build tables over the finite range of `sigma_field`.
    ///
    /// Non-finite roughness values are skipped when computing the range.
    pub fn build(&self, sigma_field: &Image) -> Result<SampleTables, SamplingError> {
        if sigma_field.channels() != 1 {
            return Err(SamplingError::ChannelCount(sigma_field.channels()));
        }
        let (sigma_min, sigma_max) = sigma_field
            .finite_range()
            .ok_or(SamplingError::NoFiniteRoughness)?;
        self.build_for_range(sigma_min, sigma_max)
    }

    /// Build tables for an explicit roughness range.
    pub fn build_for_range(
        &self,
        sigma_min: f32,
        sigma_max: f32,
    ) -> Result<SampleTables, SamplingError> {
        self.validate()?;
        if !(sigma_min.is_finite() && sigma_max.is_finite()) {
            return Err(SamplingError::NoFiniteRoughness);
        }
        if sigma_min == sigma_max {
            tracing::warn!(
                "Flat roughness range (sigma = {}); all table rows are identical",
                sigma_min
            );
        }

        let alpha = self.alpha as f64;
        let u = self.quantile_transform();
        let sigmas = linspace(sigma_min as f64, sigma_max as f64, self.sigma_samples);

        let len = self.sigma_samples * self.xi_samples;
        let mut cdf = Vec::with_capacity(len);
        let mut pdf = Vec::with_capacity(len);
        for &sigma in &sigmas {
            for &u_xi in &u {
                cdf.push(lobe_angle(sigma, u_xi) as f32);
                pdf.push(lobe_density(sigma, alpha, u_xi) as f32);
            }
        }

        tracing::info!(
            "Precomputed {}x{} sampling tables (alpha = {}, sigma in [{}, {}])",
            self.sigma_samples,
            self.xi_samples,
            self.alpha,
            sigma_min,
            sigma_max
        );

        Ok(SampleTables {
            cdf: SampleTable {
                rows: self.sigma_samples,
                cols: self.xi_samples,
                data: cdf,
            },
            pdf: SampleTable {
                rows: self.sigma_samples,
                cols: self.xi_samples,
                data: pdf,
            },
            sigma_min,
            sigma_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(values: &[f32]) -> Image {
        Image::from_vec(1, values.len(), 1, values.to_vec()).unwrap()
    }

    #[test]
    fn test_linspace_endpoints() {
        let xs = linspace(0.0, 1.0, 256);
        assert_eq!(xs.len(), 256);
        assert_eq!(xs[0], 0.0);
        assert_eq!(xs[255], 1.0);
        assert!((xs[1] - 1.0 / 255.0).abs() < 1e-15);
        assert_eq!(linspace(2.0, 5.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_default_table_shape() {
        let tables = TableBuilder::new(1.3).build(&field(&[0.1, 0.4, 0.25])).unwrap();
        assert_eq!(tables.cdf.rows(), 256);
        assert_eq!(tables.cdf.cols(), 256);
        assert_eq!(tables.pdf.rows(), 256);
        assert_eq!(tables.pdf.cols(), 256);
        assert_eq!(tables.sigma_min, 0.1);
        assert_eq!(tables.sigma_max, 0.4);
    }

    #[test]
    fn test_cdf_monotone_in_xi() {
        for &alpha in &[0.5f32, 1.0, 1.5, 2.0] {
            let tables = TableBuilder::new(alpha)
                .with_resolution(16, 64)
                .build(&field(&[0.05, 0.9]))
                .unwrap();
            for r in 0..tables.cdf.rows() {
                let row = tables.cdf.row(r);
                for pair in row.windows(2) {
                    assert!(pair[1] >= pair[0], "alpha = {}, row = {}", alpha, r);
                }
            }
        }
    }

    #[test]
    fn test_cdf_spans_zero_to_half_pi() {
        let tables = TableBuilder::new(1.0)
            .with_resolution(4, 32)
            .build(&field(&[0.2, 0.6]))
            .unwrap();
        for r in 0..4 {
            assert_eq!(tables.cdf.get(r, 0), 0.0);
            assert!((tables.cdf.get(r, 31) - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pdf_non_negative() {
        for &alpha in &[0.3f32, 1.0, 2.0] {
            let tables = TableBuilder::new(alpha)
                .with_resolution(32, 64)
                .build(&field(&[0.01, 1.5]))
                .unwrap();
            assert!(tables.pdf.as_slice().iter().all(|&v| v >= 0.0 && v.is_finite()));
        }
    }

    #[test]
    fn test_gaussian_case_matches_closed_form() {
        // alpha = 2 gives p = 1: u(xi) = -ln(1 - xi), a Beckmann-like lobe.
        let sigma = 0.3f64;
        let builder = TableBuilder::new(2.0).with_resolution(1, 5);
        let tables = builder.build_for_range(sigma as f32, sigma as f32).unwrap();
        for (j, xi) in linspace(0.0, 1.0, 5).into_iter().enumerate().take(4) {
            let u = -(1.0 - xi).ln();
            let theta = (sigma * u).atan();
            assert!((tables.cdf.get(0, j) as f64 - theta).abs() < 1e-6);
            let pdf = (-(theta.tan().powi(2) / (sigma * sigma))).exp() / (sigma * sigma * PI);
            assert!((tables.pdf.get(0, j) as f64 - pdf).abs() < 1e-4 * pdf.max(1.0));
        }
    }

    #[test]
    fn test_pdf_peak_at_zero_angle() {
        let sigma = 0.5f64;
        let alpha = 1.2f64;
        let p = alpha / 2.0;
        let expected = p / (sigma * sigma * PI * gamma(1.0 / p));
        assert!((lobe_density(sigma, alpha, 0.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_flat_field_rows_identical() {
        let tables = TableBuilder::new(1.0)
            .with_resolution(8, 16)
            .build(&field(&[0.3, 0.3, 0.3]))
            .unwrap();
        assert_eq!(tables.sigma_min, tables.sigma_max);
        for r in 1..8 {
            assert_eq!(tables.cdf.row(r), tables.cdf.row(0));
            assert_eq!(tables.pdf.row(r), tables.pdf.row(0));
        }
        assert_eq!(tables.row_coordinate(0.3), 0.0);
        assert_eq!(tables.row_coordinate(10.0), 0.0);
    }

    #[test]
    fn test_non_finite_roughness_is_skipped() {
        let tables = TableBuilder::new(1.0)
            .with_resolution(4, 4)
            .build(&field(&[f32::NAN, 0.2, f32::INFINITY, 0.8]))
            .unwrap();
        assert_eq!(tables.sigma_min, 0.2);
        assert_eq!(tables.sigma_max, 0.8);

        let result = TableBuilder::new(1.0).build(&field(&[f32::NAN, f32::INFINITY]));
        assert!(matches!(result, Err(SamplingError::NoFiniteRoughness)));
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        let f = field(&[0.2, 0.4]);
        assert!(matches!(
            TableBuilder::new(0.0).build(&f),
            Err(SamplingError::InvalidAlpha(_))
        ));
        assert!(matches!(
            TableBuilder::new(-1.0).build(&f),
            Err(SamplingError::InvalidAlpha(_))
        ));
        assert!(matches!(
            TableBuilder::new(1.0).with_resolution(0, 16).build(&f),
            Err(SamplingError::EmptyResolution { .. })
        ));
        assert!(matches!(
            TableBuilder::new(1.0).build(&Image::zeros(2, 2, 3)),
            Err(SamplingError::ChannelCount(3))
        ));
    }

    #[test]
    fn test_row_coordinate() {
        let tables = TableBuilder::new(1.0)
            .with_resolution(11, 4)
            .build(&field(&[1.0, 2.0]))
            .unwrap();
        assert_eq!(tables.row_coordinate(1.0), 0.0);
        assert_eq!(tables.row_coordinate(2.0), 10.0);
        assert!((tables.row_coordinate(1.5) - 5.0).abs() < 1e-6);
        assert_eq!(tables.row_coordinate(-3.0), 0.0);
    }
}
