//! DDS to PNG conversion for textures extracted from swatchbins.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image_dds::image::codecs::png::PngEncoder;
use image_dds::image::{ExtendedColorType, ImageEncoder, RgbaImage};
use rootcause::Report;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to parse DDS: {0}")]
    DdsParse(String),
    #[error("failed to decode DDS image: {0}")]
    DdsDecode(String),
    #[error("failed to encode PNG: {0}")]
    PngEncode(String),
    #[error("failed to write '{path}': {message}")]
    Write { path: String, message: String },
}

/// Decode the top mip of an in-memory DDS file to RGBA8.
pub fn decode_dds(dds_bytes: &[u8]) -> Result<RgbaImage, Report<TextureError>> {
    let dds = image_dds::ddsfile::Dds::read(&mut Cursor::new(dds_bytes))
        .map_err(|e| Report::new(TextureError::DdsParse(e.to_string())))?;
    image_dds::image_from_dds(&dds, 0)
        .map_err(|e| Report::new(TextureError::DdsDecode(e.to_string())))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, Report<TextureError>> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| Report::new(TextureError::PngEncode(e.to_string())))?;
    Ok(png)
}

/// Convert DDS bytes and write the PNG to `out`, creating parent directories.
pub fn write_dds_as_png(dds_bytes: &[u8], out: &Path) -> Result<(), Report<TextureError>> {
    let png = encode_png(&decode_dds(dds_bytes)?)?;
    let write_error = |e: std::io::Error| {
        Report::new(TextureError::Write {
            path: out.display().to_string(),
            message: e.to_string(),
        })
    };
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(out, png).map_err(write_error)
}
