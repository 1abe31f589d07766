use crate::core::types::{BoundingBox, FaceProbability, Identity};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const CYAN: Rgb<u8> = Rgb([0, 255, 255]);

/// Annotate an image with bounding boxes.
pub trait Annotate {
    fn boxes(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> RgbImage;

    /// Boxes coloured by the likelihood of enclosing a face.
    fn with_probability(
        &self,
        image: &DynamicImage,
        boxes: &[(BoundingBox, FaceProbability)],
    ) -> RgbImage;

    /// Boxes coloured by whether their face was identified.
    fn with_identity(
        &self,
        image: &DynamicImage,
        boxes: &[(BoundingBox, Identity)],
        sentinel: &Identity,
    ) -> RgbImage;
}

/// Draws hollow rectangles with `imageproc`.
#[derive(Debug, Default, Clone)]
pub struct ImageAnnotator;

impl ImageAnnotator {
    pub fn new() -> Self {
        Self
    }

    fn draw(img: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
        if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return;
        }

        let x1 = bbox.left().max(0.0) as i32;
        let y1 = bbox.top().max(0.0) as i32;
        let x2 = bbox.right().min(img.width() as f32) as i32;
        let y2 = bbox.bottom().min(img.height() as f32) as i32;

        let rect_width = (x2 - x1).max(1) as u32;
        let rect_height = (y2 - y1).max(1) as u32;

        draw_hollow_rect_mut(img, Rect::at(x1, y1).of_size(rect_width, rect_height), color);

        // second pass for a two pixel border
        if rect_width > 2 && rect_height > 2 {
            let inner = Rect::at(x1 + 1, y1 + 1).of_size(rect_width - 2, rect_height - 2);
            draw_hollow_rect_mut(img, inner, color);
        }
    }
}

impl Annotate for ImageAnnotator {
    fn boxes(&self, image: &DynamicImage, boxes: &[BoundingBox]) -> RgbImage {
        let mut img = image.to_rgb8();
        for bbox in boxes {
            Self::draw(&mut img, bbox, CYAN);
        }
        img
    }

    fn with_probability(
        &self,
        image: &DynamicImage,
        boxes: &[(BoundingBox, FaceProbability)],
    ) -> RgbImage {
        let mut img = image.to_rgb8();
        for (bbox, probability) in boxes {
            let color = if *probability > 0.9 {
                GREEN
            } else if *probability > 0.7 {
                YELLOW
            } else {
                RED
            };
            Self::draw(&mut img, bbox, color);
        }
        img
    }

    fn with_identity(
        &self,
        image: &DynamicImage,
        boxes: &[(BoundingBox, Identity)],
        sentinel: &Identity,
    ) -> RgbImage {
        let mut img = image.to_rgb8();
        for (bbox, identity) in boxes {
            let color = if identity == sentinel { RED } else { GREEN };
            Self::draw(&mut img, bbox, color);
        }
        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(50, 50))
    }

    #[test]
    fn identity_boxes_are_coloured_by_match() {
        let sentinel = Identity::from("unknown");
        let boxes = vec![
            (BoundingBox::new(5.0, 5.0, 20.0, 20.0).unwrap(), Identity::from("alice")),
            (BoundingBox::new(25.0, 25.0, 45.0, 45.0).unwrap(), sentinel.clone()),
        ];

        let img = ImageAnnotator::new().with_identity(&blank(), &boxes, &sentinel);
        assert_eq!(*img.get_pixel(5, 5), GREEN);
        assert_eq!(*img.get_pixel(25, 25), RED);
        // interior untouched
        assert_eq!(*img.get_pixel(12, 12), Rgb([0, 0, 0]));
    }

    #[test]
    fn probability_tiers() {
        let boxes = vec![
            (BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap(), 0.95),
            (BoundingBox::new(20.0, 0.0, 30.0, 10.0).unwrap(), 0.8),
            (BoundingBox::new(0.0, 20.0, 10.0, 30.0).unwrap(), 0.5),
        ];

        let img = ImageAnnotator::new().with_probability(&blank(), &boxes);
        assert_eq!(*img.get_pixel(0, 0), GREEN);
        assert_eq!(*img.get_pixel(20, 0), YELLOW);
        assert_eq!(*img.get_pixel(0, 20), RED);
    }

    #[test]
    fn boxes_outside_the_image_are_clipped() {
        let bbox = BoundingBox::new(40.0, 40.0, 200.0, 200.0).unwrap();
        let img = ImageAnnotator::new().boxes(&blank(), &[bbox]);
        assert_eq!(*img.get_pixel(40, 40), CYAN);
    }
}
