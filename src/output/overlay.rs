use image::{Rgb, RgbImage};

use crate::geometry::BoundingBox;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: u32 = 2;

/// Copy of `image` with an outline for every box.
pub fn render_overlay(image: &RgbImage, boxes: &[BoundingBox]) -> RgbImage {
    let mut canvas = image.clone();
    for bbox in boxes {
        draw_rect(&mut canvas, bbox, BOX_COLOR, BOX_THICKNESS);
    }
    canvas
}

/// Draw a rectangle border growing inward from the box edges, with corners
/// at `(x, y)` and `(x + width, y + height)`. Parts outside the image are
/// clipped.
pub fn draw_rect(img: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let (x0, y0) = (bbox.x as i64, bbox.y as i64);
    let (x1, y1) = (bbox.right(), bbox.bottom());
    for t in 0..thickness as i64 {
        let (xx0, yy0, xx1, yy1) = (x0 + t, y0 + t, x1 - t, y1 - t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for y in [yy0, yy1] {
            if (0..h).contains(&y) {
                for x in xx0.max(0)..=xx1.min(w - 1) {
                    img.put_pixel(x as u32, y as u32, color);
                }
            }
        }
        for x in [xx0, xx1] {
            if (0..w).contains(&x) {
                for y in yy0.max(0)..=yy1.min(h - 1) {
                    img.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}
