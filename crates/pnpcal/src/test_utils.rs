//! Shared test utilities for image-based unit tests.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Render a solid disc on a flat background.
///
/// Pixels at distance `d < radius` from `center` get `disc_pix`, all others
/// `bg_pix`.
pub(crate) fn draw_disc_image(
    w: u32,
    h: u32,
    center: [f64; 2],
    radius: f64,
    disc_pix: u8,
    bg_pix: u8,
) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| {
        let d = (x as f64 - center[0]).hypot(y as f64 - center[1]);
        Luma([if d < radius { disc_pix } else { bg_pix }])
    })
}

/// Color variant of [`draw_disc_image`].
pub(crate) fn draw_disc_rgb(
    w: u32,
    h: u32,
    center: [f64; 2],
    radius: f64,
    disc_pix: [u8; 3],
    bg_pix: [u8; 3],
) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        let d = (x as f64 - center[0]).hypot(y as f64 - center[1]);
        Rgb(if d < radius { disc_pix } else { bg_pix })
    })
}

/// Gaussian-blur a `GrayImage` via `imageproc`.
pub(crate) fn blur_gray(img: &GrayImage, sigma: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let f = image::ImageBuffer::<Luma<f32>, Vec<f32>>::from_fn(w, h, |x, y| {
        Luma([img.get_pixel(x, y)[0] as f32 / 255.0])
    });
    let blurred = imageproc::filter::gaussian_blur_f32(&f, sigma);
    GrayImage::from_fn(w, h, |x, y| {
        let v = blurred.get_pixel(x, y)[0].clamp(0.0, 1.0);
        Luma([(v * 255.0).round() as u8])
    })
}
