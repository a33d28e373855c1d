//! Downsampling and color normalization for extracted images.

use image::{ColorType, DynamicImage, imageops::FilterType};

/// Default bounding box for cached images.
pub const DEFAULT_MAX_WIDTH: u32 = 800;
/// Default bounding box for cached images.
pub const DEFAULT_MAX_HEIGHT: u32 = 600;

/// Shrink `image` to fit within `max_width` x `max_height` and normalize its color mode.
///
/// Aspect ratio is preserved and images are never upscaled. The result is always 8-bit RGB or
/// 8-bit grayscale; every other mode is converted to RGB. Degenerate inputs (a zero dimension
/// or a zero bound) are returned unchanged.
pub fn optimize(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    if image.width() == 0 || image.height() == 0 || max_width == 0 || max_height == 0 {
        tracing::warn!(
            width = image.width(),
            height = image.height(),
            "Failed to optimize image; keeping original"
        );
        return image;
    }

    let resized = if image.width() > max_width || image.height() > max_height {
        image.resize(max_width, max_height, FilterType::Lanczos3)
    } else {
        image
    };

    match resized.color() {
        ColorType::Rgb8 | ColorType::L8 => resized,
        _ => DynamicImage::ImageRgb8(resized.to_rgb8()),
    }
}

/// [`optimize`] with the default 800x600 bounding box.
pub fn optimize_default(image: DynamicImage) -> DynamicImage {
    optimize(image, DEFAULT_MAX_WIDTH, DEFAULT_MAX_HEIGHT)
}
