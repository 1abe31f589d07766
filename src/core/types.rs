use crate::common::{FacesError, Result};
use ndarray::{Array1, Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Label naming a known person, or the configured "unknown" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive an identity from a file stem or folder name.
    ///
    /// `Eric-Idle.jpg` and `eric_idle.jpg` both become `eric idle`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_string_lossy();
        let name = stem.to_lowercase().replace('-', "_").replace('_', " ");
        if name.trim().is_empty() {
            return None;
        }
        Some(Self(name))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Normalized face crop, laid out channel x height x width.
///
/// Patches compare by value: two independently extracted crops with the
/// same contents are the same patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacePatch(Array3<f32>);

impl FacePatch {
    pub fn new(data: Array3<f32>) -> Self {
        Self(data)
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.0.view()
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.0.dim()
    }
}

impl From<Array3<f32>> for FacePatch {
    fn from(data: Array3<f32>) -> Self {
        Self(data)
    }
}

pub type FaceEncoding = Array1<f32>;

pub type FaceProbability = f32;

/// A rectangle that supposedly encloses a face, in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Result<Self> {
        if !(left <= right) {
            return Err(FacesError::InvalidOperation(format!(
                "bounding box left ({}) must not exceed right ({})",
                left, right
            )));
        }
        if !(top <= bottom) {
            return Err(FacesError::InvalidOperation(format!(
                "bounding box top ({}) must not exceed bottom ({})",
                top, bottom
            )));
        }
        Ok(Self { left, top, right, bottom })
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn right(&self) -> f32 {
        self.right
    }

    pub fn bottom(&self) -> f32 {
        self.bottom
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);

        let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    pub fn as_tuple(&self) -> (f32, f32, f32, f32) {
        (self.left, self.top, self.right, self.bottom)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.0}, {:.0}, {:.0}, {:.0}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn identity_from_path_normalizes_separators() {
        let identity = Identity::from_path(Path::new("/photos/Eric-Idle.jpg")).unwrap();
        assert_eq!(identity.as_str(), "eric idle");

        let identity = Identity::from_path(Path::new("terry_jones.png")).unwrap();
        assert_eq!(identity.as_str(), "terry jones");

        let identity = Identity::from_path(Path::new("/photos/Graham-Chapman")).unwrap();
        assert_eq!(identity, Identity::from("graham chapman"));
    }

    #[test]
    fn patches_compare_by_value() {
        let a = FacePatch::new(Array3::from_elem((3, 4, 4), 0.5));
        let b = FacePatch::new(Array3::from_elem((3, 4, 4), 0.5));
        let c = FacePatch::new(Array3::from_elem((3, 4, 4), 0.25));
        let d = FacePatch::new(Array3::from_elem((3, 2, 8), 0.5));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn bounding_box_rejects_inverted_corners() {
        assert!(BoundingBox::new(10.0, 10.0, 5.0, 20.0).is_err());
        assert!(BoundingBox::new(10.0, 10.0, 20.0, 5.0).is_err());
        assert!(BoundingBox::new(f32::NAN, 0.0, 1.0, 1.0).is_err());

        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 20.0).unwrap();
        assert_eq!(bbox.width(), 10.0);
        assert_eq!(bbox.height(), 20.0);
        assert_eq!(bbox.as_tuple(), (0.0, 0.0, 10.0, 20.0));
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0).unwrap();
        let c = BoundingBox::new(5.0, 0.0, 15.0, 10.0).unwrap();
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&c) - 50.0 / 150.0).abs() < 1e-6);
    }
}
