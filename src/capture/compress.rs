use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageResult};
use std::time::Instant;

use crate::config::ImageConfig;

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_warn};

/// Re-encode `bytes` as JPEG, downscaling to fit `max_width` x `max_height`
/// when larger. Aspect ratio is preserved and smaller images keep their size.
pub fn compress_jpeg(
    bytes: &[u8],
    max_width: u32,
    max_height: u32,
    quality: u8,
) -> ImageResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let img = if img.width() > max_width || img.height() > max_height {
        img.resize(max_width, max_height, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
    Ok(out)
}

/// Shrink a captured frame for upload, sending the original when it cannot be
/// decoded.
pub fn prepare_upload(bytes: &[u8], config: &ImageConfig) -> Vec<u8> {
    if !config.compress {
        return bytes.to_vec();
    }
    let started = Instant::now();
    match compress_jpeg(bytes, config.max_width, config.max_height, config.jpeg_quality) {
        Ok(compressed) => {
            log_debug!(
                "Compressed frame {} -> {} bytes in {}ms",
                bytes.len(),
                compressed.len(),
                started.elapsed().as_millis()
            );
            compressed
        }
        Err(err) => {
            log_warn!("image compression failed, uploading original: {err}");
            bytes.to_vec()
        }
    }
}
