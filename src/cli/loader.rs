use crate::common::{FacesError, Result};
use image::{imageops::FilterType, DynamicImage};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct ImageOptions {
    /// Longer side of the image after scaling.
    pub target_size: u32,
    /// Counter-clockwise rotation in degrees: 0, 90, 180 or 270.
    pub rotate: u32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self { target_size: 1000, rotate: 0 }
    }
}

pub fn load_image(path: &Path, options: &ImageOptions) -> Result<DynamicImage> {
    let image = image::open(path)?;
    preprocess(image, options)
}

pub fn preprocess(image: DynamicImage, options: &ImageOptions) -> Result<DynamicImage> {
    let image = if image.width().max(image.height()) != options.target_size {
        image.resize(options.target_size, options.target_size, FilterType::Triangle)
    } else {
        image
    };

    match options.rotate {
        0 => Ok(image),
        90 => Ok(image.rotate270()),
        180 => Ok(image.rotate180()),
        270 => Ok(image.rotate90()),
        other => Err(FacesError::InvalidOperation(format!(
            "cannot rotate by {} degrees, use 0, 90, 180 or 270", other
        ))),
    }
}
