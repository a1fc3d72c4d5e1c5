//! Cube face sets and cross-image packing.
//!
//! A cross lays the six faces of a cube on a grid of face-sized cells. Two
//! conventions are supported:
//!
//! ```text
//!   vertical (4 x 3)        horizontal (3 x 4)
//!   .  +y  .                .  +y  .   .
//!   -x +z  +x               -x +z  +x  -z
//!   .  -y  .                .  -y  .   .
//!   .  -z  .
//! ```
//!
//! The vertical layout stores -z rotated by 180 degrees; the horizontal
//! layout stores it as-is.

use serde::Deserialize;

use crate::image::{Image, ImageError, ImageShape};

#[derive(Debug)]
pub enum CubemapError {
    UnknownCrossFormat { height: usize, width: usize },
    UnknownLayout(String),
    UnknownFaceLabel(String),
    MismatchedFaces { expected: ImageShape, face: CubeFace, actual: ImageShape },
    Image(ImageError),
}

impl std::fmt::Display for CubemapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownCrossFormat { height, width } => write!(
                f,
                "Unknown cross format: {}x{} matches neither 3Hx4W nor 4Hx3W",
                height, width
            ),
            Self::UnknownLayout(name) => write!(f, "Unknown cross layout: '{}'", name),
            Self::UnknownFaceLabel(label) => write!(f, "Unknown cube face label: '{}'", label),
            Self::MismatchedFaces {
                expected,
                face,
                actual,
            } => write!(
                f,
                "Cube face {} has shape {}, expected {}",
                face, actual, expected
            ),
            Self::Image(e) => write!(f, "Cubemap image error: {}", e),
        }
    }
}

impl std::error::Error for CubemapError {}

impl From<ImageError> for CubemapError {
    fn from(e: ImageError) -> Self {
        Self::Image(e)
    }
}

// ---------------------------------------------------------------------------
// Faces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// All faces in storage (and GPU layer) order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PositiveX => "+x",
            Self::NegativeX => "-x",
            Self::PositiveY => "+y",
            Self::NegativeY => "-y",
            Self::PositiveZ => "+z",
            Self::NegativeZ => "-z",
        }
    }

    pub fn from_label(label: &str) -> Result<Self, CubemapError> {
        Self::ALL
            .into_iter()
            .find(|face| face.label() == label)
            .ok_or_else(|| CubemapError::UnknownFaceLabel(label.to_string()))
    }
}

impl std::fmt::Display for CubeFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Six same-shaped face images indexed by [`CubeFace`].
#[derive(Debug, Clone, PartialEq)]
pub struct CubeFaceSet {
    faces: [Image; 6],
}

impl CubeFaceSet {
    pub fn new(faces: [Image; 6]) -> Result<Self, CubemapError> {
        let expected = faces[0].shape();
        for face in CubeFace::ALL {
            let actual = faces[face.index()].shape();
            if actual != expected {
                return Err(CubemapError::MismatchedFaces {
                    expected,
                    face,
                    actual,
                });
            }
        }
        Ok(Self { faces })
    }

    /// Build a face set by producing each face in index order.
    pub fn try_from_fn<E>(
        mut f: impl FnMut(CubeFace) -> Result<Image, E>,
    ) -> Result<Self, E>
    where
        E: From<CubemapError>,
    {
        let faces = [
            f(CubeFace::PositiveX)?,
            f(CubeFace::NegativeX)?,
            f(CubeFace::PositiveY)?,
            f(CubeFace::NegativeY)?,
            f(CubeFace::PositiveZ)?,
            f(CubeFace::NegativeZ)?,
        ];
        Ok(Self::new(faces)?)
    }

    /// Shape shared by all six faces.
    pub fn face_shape(&self) -> ImageShape {
        self.faces[0].shape()
    }

    pub fn face(&self, face: CubeFace) -> &Image {
        &self.faces[face.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CubeFace, &Image)> {
        CubeFace::ALL.into_iter().zip(self.faces.iter())
    }

    pub fn into_faces(self) -> [Image; 6] {
        self.faces
    }
}

impl std::ops::Index<CubeFace> for CubeFaceSet {
    type Output = Image;

    fn index(&self, face: CubeFace) -> &Image {
        self.face(face)
    }
}

// ---------------------------------------------------------------------------
// Cross layouts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossLayout {
    Vertical,
    Horizontal,
}

/// One face's cell in a cross grid.
struct Cell {
    face: CubeFace,
    row: usize,
    col: usize,
    rotated: bool,
}

const fn cell(face: CubeFace, row: usize, col: usize, rotated: bool) -> Cell {
    Cell {
        face,
        row,
        col,
        rotated,
    }
}

const VERTICAL_CELLS: [Cell; 6] = [
    cell(CubeFace::PositiveY, 0, 1, false),
    cell(CubeFace::NegativeX, 1, 0, false),
    cell(CubeFace::PositiveZ, 1, 1, false),
    cell(CubeFace::PositiveX, 1, 2, false),
    cell(CubeFace::NegativeY, 2, 1, false),
    cell(CubeFace::NegativeZ, 3, 1, true),
];

const HORIZONTAL_CELLS: [Cell; 6] = [
    cell(CubeFace::PositiveX, 1, 2, false),
    cell(CubeFace::NegativeX, 1, 0, false),
    cell(CubeFace::PositiveY, 0, 1, false),
    cell(CubeFace::NegativeY, 2, 1, false),
    cell(CubeFace::PositiveZ, 1, 1, false),
    cell(CubeFace::NegativeZ, 1, 3, false),
];

impl CrossLayout {
    /// Grid size in cells as (rows, cols).
    pub fn grid(self) -> (usize, usize) {
        match self {
            Self::Vertical => (4, 3),
            Self::Horizontal => (3, 4),
        }
    }

    fn cells(self) -> &'static [Cell; 6] {
        match self {
            Self::Vertical => &VERTICAL_CELLS,
            Self::Horizontal => &HORIZONTAL_CELLS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
        }
    }
}

impl std::str::FromStr for CrossLayout {
    type Err = CubemapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vertical" => Ok(Self::Vertical),
            "horizontal" => Ok(Self::Horizontal),
            _ => Err(CubemapError::UnknownLayout(s.to_string())),
        }
    }
}

impl std::fmt::Display for CrossLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Infer the layout and face size of a cross from its pixel dimensions.
///
/// Horizontal is tested first, so a shape divisible both ways is treated as
/// horizontal. Returns `(layout, face_height, face_width)`.
pub fn detect_layout(height: usize, width: usize) -> Result<(CrossLayout, usize, usize), CubemapError> {
    if height % 3 == 0 && width % 4 == 0 {
        Ok((CrossLayout::Horizontal, height / 3, width / 4))
    } else if height % 4 == 0 && width % 3 == 0 {
        Ok((CrossLayout::Vertical, height / 4, width / 3))
    } else {
        Err(CubemapError::UnknownCrossFormat { height, width })
    }
}

/// Pack six faces into a cross image. Cells outside the cross stay zero.
pub fn pack(faces: &CubeFaceSet, layout: CrossLayout) -> Result<Image, CubemapError> {
    let ImageShape {
        height,
        width,
        channels,
    } = faces.face_shape();
    let (rows, cols) = layout.grid();
    let mut cross = Image::zeros(height * rows, width * cols, channels);

    for cell in layout.cells() {
        let face = &faces[cell.face];
        if cell.rotated {
            cross.paste(cell.row * height, cell.col * width, &face.rotated_180())?;
        } else {
            cross.paste(cell.row * height, cell.col * width, face)?;
        }
    }

    tracing::debug!(
        "Packed {} faces into {} cross {}",
        faces.face_shape(),
        layout,
        cross.shape()
    );
    Ok(cross)
}

/// Unpack a cross image, detecting its layout from the dimensions.
pub fn unpack(cross: &Image) -> Result<CubeFaceSet, CubemapError> {
    let (layout, height, width) = detect_layout(cross.height(), cross.width())?;
    let cells = layout.cells();

    let face_set = CubeFaceSet::try_from_fn(|face| {
        let cell = cells
            .iter()
            .find(|c| c.face == face)
            .ok_or(CubemapError::UnknownCrossFormat {
                height: cross.height(),
                width: cross.width(),
            })?;
        let window = cross.crop(cell.row * height, cell.col * width, height, width)?;
        Ok::<_, CubemapError>(if cell.rotated {
            window.rotated_180()
        } else {
            window
        })
    })?;

    tracing::debug!(
        "Unpacked {} cross {} into {}x{} faces",
        layout,
        cross.shape(),
        height,
        width
    );
    Ok(face_set)
}

/// Convert a cross of any supported layout into `layout`.
pub fn restack(cross: &Image, layout: CrossLayout) -> Result<Image, CubemapError> {
    pack(&unpack(cross)?, layout)
}
