use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use perimeter_core::Contour;
use std::io::Cursor;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);

/// Draw closed contours as green outlines over a copy of the drawing
pub fn overlay_contours(base: &RgbImage, contours: &[Contour], thickness: u32) -> RgbImage {
    let mut canvas = base.clone();
    let half = (thickness.max(1) / 2) as i32;

    for contour in contours {
        let n = contour.points.len();
        if n < 2 {
            continue;
        }
        for i in 0..n {
            let a = contour.points[i];
            let b = contour.points[(i + 1) % n];
            for offset in -half..=half {
                // Thicken across the dominant direction of the segment
                let (ox, oy) = if (b.x - a.x).abs() >= (b.y - a.y).abs() {
                    (0, offset)
                } else {
                    (offset, 0)
                };
                draw_line_segment_mut(
                    &mut canvas,
                    ((a.x + ox) as f32, (a.y + oy) as f32),
                    ((b.x + ox) as f32, (b.y + oy) as f32),
                    OUTLINE,
                );
            }
        }
    }

    canvas
}

pub fn encode_png(image: &RgbImage) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perimeter_core::Point;

    #[test]
    fn test_overlay_draws_closed_outline() {
        let base = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        let contour = Contour::new(vec![
            Point::new(10, 10),
            Point::new(90, 10),
            Point::new(90, 90),
            Point::new(10, 90),
        ]);

        let overlay = overlay_contours(&base, &[contour], 3);

        assert_eq!(*overlay.get_pixel(50, 10), OUTLINE);
        assert_eq!(*overlay.get_pixel(50, 11), OUTLINE);
        // Closing edge from the last point back to the first
        assert_eq!(*overlay.get_pixel(10, 50), OUTLINE);
        assert_eq!(*overlay.get_pixel(50, 50), Rgb([255, 255, 255]));
        assert_eq!(*base.get_pixel(50, 10), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_encode_png_round_trips() {
        let image = RgbImage::from_pixel(4, 3, Rgb([0, 255, 0]));
        let bytes = encode_png(&image).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(*decoded.get_pixel(3, 2), Rgb([0, 255, 0]));
    }
}
