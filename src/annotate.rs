use crate::core::engine::FacialArea;
use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Draw one hollow rectangle per facial area onto a copy of the image.
/// Rectangles are clamped to the image bounds; a nested inner rectangle
/// gives a 2 px border.
pub fn annotate_faces(image: &DynamicImage, areas: &[FacialArea]) -> DynamicImage {
    let mut img = image.to_rgb8();

    for area in areas {
        let x1 = area.x.max(0);
        let y1 = area.y.max(0);
        let x2 = (area.x + area.w as i32).min(img.width() as i32);
        let y2 = (area.y + area.h as i32).min(img.height() as i32);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        let rect_width = (x2 - x1) as u32;
        let rect_height = (y2 - y1) as u32;

        let rect = Rect::at(x1, y1).of_size(rect_width, rect_height);
        draw_hollow_rect_mut(&mut img, rect, BOX_COLOR);

        if rect_width > 2 && rect_height > 2 {
            let inner = Rect::at(x1 + 1, y1 + 1).of_size(rect_width - 2, rect_height - 2);
            draw_hollow_rect_mut(&mut img, inner, BOX_COLOR);
        }
    }

    DynamicImage::ImageRgb8(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_border_pixels() {
        let image = DynamicImage::new_rgb8(32, 32);
        let area = FacialArea { x: 4, y: 4, w: 10, h: 10 };
        let annotated = annotate_faces(&image, &[area]).to_rgb8();
        assert_eq!(*annotated.get_pixel(4, 4), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(13, 4), BOX_COLOR);
        // Interior stays untouched
        assert_eq!(*annotated.get_pixel(9, 9), Rgb([0, 0, 0]));
    }

    #[test]
    fn no_areas_leaves_image_unchanged() {
        let image = DynamicImage::new_rgb8(8, 8);
        let annotated = annotate_faces(&image, &[]);
        assert_eq!(annotated.to_rgb8().as_raw(), image.to_rgb8().as_raw());
    }

    #[test]
    fn area_partially_outside_does_not_panic() {
        let image = DynamicImage::new_rgb8(16, 16);
        let area = FacialArea { x: 10, y: 10, w: 20, h: 20 };
        let annotated = annotate_faces(&image, &[area]).to_rgb8();
        assert_eq!(*annotated.get_pixel(10, 10), BOX_COLOR);
    }

    #[test]
    fn area_fully_outside_is_skipped() {
        let image = DynamicImage::new_rgb8(16, 16);
        let area = FacialArea { x: 40, y: 40, w: 5, h: 5 };
        let annotated = annotate_faces(&image, &[area]);
        assert_eq!(annotated.to_rgb8().as_raw(), image.to_rgb8().as_raw());
    }
}
