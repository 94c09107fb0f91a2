//! Image loading utilities for texture data
//!
//! Every image is converted to tightly packed RGBA8, the only layout the
//! texture upload path accepts.

use std::path::Path;

use crate::assets::AssetError;

/// Decoded RGBA8 pixels ready for staging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data, row-major, top row first
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }

        let img = image::open(path)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to load image {}: {e}", path.display())))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::info!("Loaded image {}x{} from {}", width, height, path.display());

        Self::from_rgba(rgba.into_raw(), width, height)
    }

    /// Decode an image held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to load image from bytes: {e}")))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::debug!("Loaded image {}x{} from memory", width, height);

        Self::from_rgba(rgba.into_raw(), width, height)
    }

    /// Wrap existing RGBA8 pixels, checking the size
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Result<Self, AssetError> {
        if width == 0 || height == 0 {
            return Err(AssetError::InvalidData(format!("Image has zero extent {width}x{height}")));
        }
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(AssetError::InvalidData(format!(
                "Expected {expected} bytes for {width}x{height} RGBA8, got {}",
                data.len()
            )));
        }
        Ok(Self { data, width, height })
    }

    /// Single-color image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        Self {
            data: color.repeat(pixel_count),
            width,
            height,
        }
    }

    /// Two-color checkerboard with `cell`-pixel squares, used in place of missing textures
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let data = (0..size)
            .flat_map(|y| (0..size).map(move |x| if (x / cell + y / cell) % 2 == 0 { a } else { b }))
            .flatten()
            .collect();
        Self {
            data,
            width: size,
            height: size,
        }
    }

    /// Size of the pixel data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 4, [255, 0, 0, 255]);
        assert_eq!(img.width, 4);
        assert_eq!(img.height, 4);
        assert_eq!(img.size_bytes(), 4 * 4 * 4);
        assert_eq!(&img.data[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_checkerboard_alternates() {
        let white = [255; 4];
        let black = [0, 0, 0, 255];
        let img = ImageData::checkerboard(4, 2, white, black);

        let pixel = |x: usize, y: usize| &img.data[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(pixel(0, 0), &white);
        assert_eq!(pixel(2, 0), &black);
        assert_eq!(pixel(0, 2), &black);
        assert_eq!(pixel(3, 3), &white);
        assert_eq!(img.size_bytes(), 64);
    }

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(ImageData::from_rgba(vec![0; 16], 2, 2).is_ok());
        assert!(matches!(
            ImageData::from_rgba(vec![0; 15], 2, 2),
            Err(AssetError::InvalidData(_))
        ));
        assert!(matches!(ImageData::from_rgba(Vec::new(), 0, 4), Err(AssetError::InvalidData(_))));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        assert!(matches!(
            ImageData::from_file("does/not/exist.png"),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn test_png_round_trip_through_memory() {
        let source = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut encoded = std::io::Cursor::new(Vec::new());
        source.write_to(&mut encoded, image::ImageFormat::Png).unwrap();

        let decoded = ImageData::from_bytes(encoded.get_ref()).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(&decoded.data[..4], &[10, 20, 30, 255]);
    }
}
