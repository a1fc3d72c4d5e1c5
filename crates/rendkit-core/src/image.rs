//! Dense float images shared by every transform in the crate.
//!
//! Pixels are stored row-major with interleaved channels, so the value at
//! `(row, col, channel)` lives at `(row * width + col) * channels + channel`.

#[derive(Debug)]
pub enum ImageError {
    LengthMismatch { expected: usize, actual: usize },
    OutOfBounds(String),
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LengthMismatch { expected, actual } => write!(
                f,
                "Image buffer has {} values, expected {}",
                actual, expected
            ),
            Self::OutOfBounds(msg) => write!(f, "Image region out of bounds: {}", msg),
        }
    }
}

impl std::error::Error for ImageError {}

/// Height, width and channel count of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    shape: ImageShape,
    data: Vec<f32>,
}

impl Image {
    /// A zero-filled image.
    pub fn zeros(height: usize, width: usize, channels: usize) -> Self {
        let shape = ImageShape::new(height, width, channels);
        Self {
            shape,
            data: vec![0.0; shape.len()],
        }
    }

    pub fn from_vec(
        height: usize,
        width: usize,
        channels: usize,
        data: Vec<f32>,
    ) -> Result<Self, ImageError> {
        let shape = ImageShape::new(height, width, channels);
        if data.len() != shape.len() {
            return Err(ImageError::LengthMismatch {
                expected: shape.len(),
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Build an image by evaluating `f(row, col, channel)` for every value.
    pub fn from_fn(
        height: usize,
        width: usize,
        channels: usize,
        mut f: impl FnMut(usize, usize, usize) -> f32,
    ) -> Self {
        let shape = ImageShape::new(height, width, channels);
        let mut data = Vec::with_capacity(shape.len());
        for row in 0..height {
            for col in 0..width {
                for ch in 0..channels {
                    data.push(f(row, col, ch));
                }
            }
        }
        Self { shape, data }
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn height(&self) -> usize {
        self.shape.height
    }

    pub fn width(&self) -> usize {
        self.shape.width
    }

    pub fn channels(&self) -> usize {
        self.shape.channels
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    fn offset(&self, row: usize, col: usize) -> usize {
        (row * self.shape.width + col) * self.shape.channels
    }

    /// Channel values of one pixel.
    pub fn pixel(&self, row: usize, col: usize) -> &[f32] {
        let start = self.offset(row, col);
        &self.data[start..start + self.shape.channels]
    }

    pub fn pixel_mut(&mut self, row: usize, col: usize) -> &mut [f32] {
        let start = self.offset(row, col);
        let channels = self.shape.channels;
        &mut self.data[start..start + channels]
    }

    /// Iterate over pixels in row-major order.
    pub fn pixels(&self) -> std::slice::Chunks<'_, f32> {
        self.data.chunks(self.shape.channels.max(1))
    }

    /// Rotate by 180 degrees (flip both axes).
    pub fn rotated_180(&self) -> Self {
        let ImageShape { height, width, .. } = self.shape;
        let mut out = Self::zeros(height, width, self.shape.channels);
        for row in 0..height {
            for col in 0..width {
                out.pixel_mut(height - 1 - row, width - 1 - col)
                    .copy_from_slice(self.pixel(row, col));
            }
        }
        out
    }

    /// Copy a `height x width` window starting at `(top, left)`.
    pub fn crop(&self, top: usize, left: usize, height: usize, width: usize) -> Result<Self, ImageError> {
        if top + height > self.shape.height || left + width > self.shape.width {
            return Err(ImageError::OutOfBounds(format!(
                "crop {}x{} at ({}, {}) from {}",
                height, width, top, left, self.shape
            )));
        }
        let channels = self.shape.channels;
        let mut data = Vec::with_capacity(height * width * channels);
        for row in top..top + height {
            let start = self.offset(row, left);
            data.extend_from_slice(&self.data[start..start + width * channels]);
        }
        Ok(Self {
            shape: ImageShape::new(height, width, channels),
            data,
        })
    }

    /// Overwrite the window at `(top, left)` with `src`.
    pub fn paste(&mut self, top: usize, left: usize, src: &Image) -> Result<(), ImageError> {
        let src_shape = src.shape();
        if src_shape.channels != self.shape.channels
            || top + src_shape.height > self.shape.height
            || left + src_shape.width > self.shape.width
        {
            return Err(ImageError::OutOfBounds(format!(
                "paste {} at ({}, {}) into {}",
                src_shape, top, left, self.shape
            )));
        }
        let row_len = src_shape.width * src_shape.channels;
        for row in 0..src_shape.height {
            let dst = self.offset(top + row, left);
            let from = row * row_len;
            self.data[dst..dst + row_len].copy_from_slice(&src.data[from..from + row_len]);
        }
        Ok(())
    }

    /// Minimum and maximum over finite values, ignoring NaN and infinities.
    pub fn finite_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
