//! Image files on disk. Everything is converted to linear `f32`; 8-bit
//! sources end up in [0, 1].

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb, Rgba};
use rendkit_core::cubemap::{CubeFace, CubeFaceSet, CubemapError};
use rendkit_core::image::{Image, ImageError};

/// Extensions tried, in order, when looking up a face file.
const FACE_EXTENSIONS: &[&str] = &["png", "exr", "hdr", "jpg", "jpeg"];

#[derive(Debug)]
pub enum IoError {
    Decode { path: PathBuf, source: image::ImageError },
    Encode { path: PathBuf, source: image::ImageError },
    MissingFace { dir: PathBuf, face: CubeFace },
    UnsupportedChannels(usize),
    CreateDir(std::io::Error),
    Image(ImageError),
    Cubemap(CubemapError),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode { path, source } => write!(f, "Failed to read {:?}: {}", path, source),
            Self::Encode { path, source } => write!(f, "Failed to write {:?}: {}", path, source),
            Self::MissingFace { dir, face } => {
                write!(f, "No image for face {} in {:?}", face, dir)
            }
            Self::UnsupportedChannels(n) => write!(f, "Cannot save an image with {} channels", n),
            Self::CreateDir(e) => write!(f, "Failed to create output directory: {}", e),
            Self::Image(e) => write!(f, "{}", e),
            Self::Cubemap(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for IoError {}

impl From<ImageError> for IoError {
    fn from(e: ImageError) -> Self {
        Self::Image(e)
    }
}

impl From<CubemapError> for IoError {
    fn from(e: CubemapError) -> Self {
        Self::Cubemap(e)
    }
}

pub fn load_image(path: &Path) -> Result<Image, IoError> {
    let decoded = image::open(path).map_err(|source| IoError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let image = from_dynamic(decoded)?;
    tracing::debug!("Loaded {:?} {}", path, image.shape());
    Ok(image)
}

fn from_dynamic(decoded: DynamicImage) -> Result<Image, IoError> {
    let rgb = decoded.into_rgb32f();
    let (width, height) = rgb.dimensions();
    Ok(Image::from_vec(
        height as usize,
        width as usize,
        3,
        rgb.into_raw(),
    )?)
}

/// Write `image`. EXR and HDR keep full float precision; any other
/// extension is clamped and quantised to 8 bits.
pub fn save_image(path: &Path, image: &Image) -> Result<(), IoError> {
    let dynamic = to_dynamic(image)?;
    let float_output = matches!(
        extension(path).as_deref(),
        Some("exr") | Some("hdr")
    );
    let dynamic = if float_output {
        dynamic
    } else if image.channels() == 4 {
        DynamicImage::ImageRgba8(dynamic.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(dynamic.to_rgb8())
    };
    dynamic.save(path).map_err(|source| IoError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Wrote {:?} {}", path, image.shape());
    Ok(())
}

fn to_dynamic(image: &Image) -> Result<DynamicImage, IoError> {
    let (width, height) = (image.width() as u32, image.height() as u32);
    let buffer_err = || IoError::UnsupportedChannels(image.channels());
    match image.channels() {
        1 => {
            let data: Vec<f32> = image.as_slice().iter().flat_map(|&v| [v, v, v]).collect();
            ImageBuffer::<Rgb<f32>, _>::from_raw(width, height, data)
                .map(DynamicImage::ImageRgb32F)
                .ok_or_else(buffer_err)
        }
        3 => ImageBuffer::<Rgb<f32>, _>::from_raw(width, height, image.as_slice().to_vec())
            .map(DynamicImage::ImageRgb32F)
            .ok_or_else(buffer_err),
        4 => ImageBuffer::<Rgba<f32>, _>::from_raw(width, height, image.as_slice().to_vec())
            .map(DynamicImage::ImageRgba32F)
            .ok_or_else(buffer_err),
        n => Err(IoError::UnsupportedChannels(n)),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn find_face(dir: &Path, face: CubeFace) -> Option<PathBuf> {
    FACE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", face.label(), ext)))
        .find(|path| path.is_file())
}

/// Load six faces named by label (`+x.png`, `-z.exr`, ...) from `dir`,
/// each resized to `size` x `size`.
pub fn load_faces(dir: &Path, size: u32) -> Result<CubeFaceSet, IoError> {
    let faces = CubeFaceSet::try_from_fn(|face| {
        let path = find_face(dir, face).ok_or_else(|| IoError::MissingFace {
            dir: dir.to_path_buf(),
            face,
        })?;
        let decoded = image::open(&path).map_err(|source| IoError::Decode {
            path: path.clone(),
            source,
        })?;
        if decoded.width() == size && decoded.height() == size {
            return from_dynamic(decoded);
        }
        from_dynamic(decoded.resize_exact(size, size, FilterType::Triangle))
    })?;
    tracing::info!("Loaded cube faces from {:?} at {}x{}", dir, size, size);
    Ok(faces)
}

/// Write each face to `dir/<label>.<extension>`.
pub fn save_faces(dir: &Path, faces: &CubeFaceSet, extension: &str) -> Result<(), IoError> {
    std::fs::create_dir_all(dir).map_err(IoError::CreateDir)?;
    for (face, image) in faces.iter() {
        save_image(&dir.join(format!("{}.{}", face.label(), extension)), image)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rendkit-io-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_exr_round_trip_is_exact() {
        let dir = scratch_dir("exr");
        let image = Image::from_fn(3, 5, 3, |r, c, ch| r as f32 * 10.0 + c as f32 + ch as f32 * 0.25);
        let path = dir.join("img.exr");
        save_image(&path, &image).unwrap();
        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded, image);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_png_faces_are_normalised() {
        let dir = scratch_dir("faces");
        for face in CubeFace::ALL {
            let value = (face.index() * 50) as u8;
            let png = image::RgbImage::from_pixel(4, 4, Rgb([value, value, value]));
            png.save(dir.join(format!("{}.png", face.label()))).unwrap();
        }

        let faces = load_faces(&dir, 2).unwrap();
        assert_eq!(faces.face_shape().height, 2);
        assert_eq!(faces.face_shape().channels, 3);
        for (face, image) in faces.iter() {
            let expected = (face.index() * 50) as f32 / 255.0;
            assert!(image.as_slice().iter().all(|&v| (v - expected).abs() < 1e-6));
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_face() {
        let dir = scratch_dir("missing");
        match load_faces(&dir, 4) {
            Err(IoError::MissingFace {
                face: CubeFace::PositiveX,
                ..
            }) => {}
            other => panic!("Expected missing +x, got: {:?}", other.map(|_| ())),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_single_channel_saved_as_gray() {
        let image = Image::from_vec(1, 2, 1, vec![0.25, 0.5]).unwrap();
        let dynamic = to_dynamic(&image).unwrap();
        let rgb = dynamic.into_rgb32f();
        assert_eq!(rgb.into_raw(), vec![0.25, 0.25, 0.25, 0.5, 0.5, 0.5]);
        assert!(matches!(
            to_dynamic(&Image::zeros(1, 1, 2)),
            Err(IoError::UnsupportedChannels(2))
        ));
    }
}
