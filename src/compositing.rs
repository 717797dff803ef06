//! Recompositing of background-free cutouts onto a new background.
//!
//! The cutout's alpha channel is the mask: opaque pixels stay, transparent
//! pixels show the new background.

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

use crate::errors::AppResult;

/// Place `foreground` over a solid canvas of the same size.
pub fn composite_over_color(foreground: &[u8], color: Rgba<u8>) -> AppResult<Vec<u8>> {
    let cutout = image::load_from_memory(foreground)?.to_rgba8();
    let mut canvas = RgbaImage::from_pixel(cutout.width(), cutout.height(), color);

    imageops::overlay(&mut canvas, &cutout, 0, 0);
    debug!(
        width = cutout.width(),
        height = cutout.height(),
        color = ?color.0,
        "Composited over solid color"
    );

    encode_png(&canvas)
}

/// Place `foreground` over `background`, resized to the foreground's dimensions.
pub fn composite_over_image(foreground: &[u8], background: &[u8]) -> AppResult<Vec<u8>> {
    let cutout = image::load_from_memory(foreground)?.to_rgba8();
    let mut canvas = image::load_from_memory(background)?
        .resize_exact(cutout.width(), cutout.height(), FilterType::Lanczos3)
        .to_rgba8();

    imageops::overlay(&mut canvas, &cutout, 0, 0);
    debug!(width = cutout.width(), height = cutout.height(), "Composited over supplied image");

    encode_png(&canvas)
}

pub fn encode_png(image: &RgbaImage) -> AppResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    /// 2x1 cutout: opaque red on the left, fully transparent on the right
    fn cutout() -> Vec<u8> {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 0]));
        encode_png(&img).unwrap()
    }

    #[test]
    fn test_composite_over_color_uses_alpha_as_mask() {
        let out = composite_over_color(&cutout(), Rgba([0, 0, 255, 255])).unwrap();
        let decoded = image::load_from_memory(&out).unwrap().to_rgba8();

        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(*decoded.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*decoded.get_pixel(1, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_composite_over_image_resizes_background() {
        let background = encode_png(&RgbaImage::from_pixel(8, 8, Rgba([0, 200, 0, 255]))).unwrap();
        let out = composite_over_image(&cutout(), &background).unwrap();
        let decoded = image::load_from_memory(&out).unwrap().to_rgba8();

        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(*decoded.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*decoded.get_pixel(1, 0), Rgba([0, 200, 0, 255]));
    }

    #[test]
    fn test_garbage_input_is_an_image_error() {
        let err = composite_over_color(b"not an image", Rgba([0, 0, 0, 255])).unwrap_err();
        assert!(matches!(err, AppError::Image(_)));
    }
}
