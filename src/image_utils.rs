//! In-place downscaling of persisted image attachments.

use std::path::Path;

use image::imageops::FilterType;
use log::debug;

use crate::Result;

/// Extensions eligible for resizing. Everything else is left untouched.
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Shrinks the image at `path` so that width <= `max_width` and
/// height <= `max_height`, preserving aspect ratio, and rewrites the file
/// in place. Returns `Ok(false)` when nothing was done: unsupported
/// extension, or the image already fits the bounds (the file on disk is
/// left byte-identical in that case).
pub fn resize_in_place(path: &Path, max_width: u32, max_height: u32) -> Result<bool> {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_ascii_lowercase(),
        None => return Ok(false),
    };
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Ok(false);
    }

    let image = image::open(path)?;
    let (width, height) = (image.width(), image.height());

    // Width bound wins when both are exceeded.
    let (new_width, new_height) = if width > max_width {
        let scaled = (max_width as f64 / width as f64 * height as f64).round() as u32;
        (max_width, scaled)
    } else if height > max_height {
        let scaled = (max_height as f64 / height as f64 * width as f64).round() as u32;
        (scaled, max_height)
    } else {
        return Ok(false);
    };

    debug!(
        "Resizing {} from {}x{} to {}x{}",
        path.display(),
        width,
        height,
        new_width,
        new_height
    );

    image
        .resize_exact(new_width, new_height, FilterType::Lanczos3)
        .save(path)?;
    Ok(true)
}
