//! Image encoding, both directions of the pipeline.
//!
//! * [`encode_page`]: page raster → base64 PNG `ImageData` for the vision
//!   request. PNG keeps printed text crisp; `detail: "high"` keeps the model
//!   from downsampling the page to a single tile.
//! * [`encode_crop`]: extracted crop → bytes written under `images/`.
//!   Crops wider than the configured maximum are downscaled with Lanczos3,
//!   then re-encoded as JPEG. The original pixels are not kept.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the vision API.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Width and height after capping the width at `max_width`, aspect preserved.
pub fn fit_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let ratio = max_width as f64 / width as f64;
    let new_h = ((height as f64 * ratio) as u32).max(1);
    (max_width, new_h)
}

/// Resize (if needed) and JPEG-encode one crop.
pub fn encode_crop(
    crop: &DynamicImage,
    max_width: u32,
    quality: u8,
) -> Result<Vec<u8>, image::ImageError> {
    let (w, h) = fit_width(crop.width(), crop.height(), max_width);
    let resized;
    let source = if (w, h) != (crop.width(), crop.height()) {
        resized = crop.resize_exact(w, h, FilterType::Lanczos3);
        &resized
    } else {
        crop
    };

    // JPEG has no alpha channel.
    let rgb = source.to_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}
