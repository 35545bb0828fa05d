// compression.rs - Per-format encoders used by the optimizer

use color_quant::NeuQuant;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat, RgbaImage};
use mozjpeg::{ColorSpace, Compress};
use std::collections::HashMap;
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::error::OptimizeError;
use crate::formats::SourceFormat;
use crate::request::{OptimizeOptions, Quality};

/// Largest palette an 8-bit indexed PNG can hold.
pub const PALETTE_SIZE: usize = 256;
/// NeuQuant sampling factor; 1 is slowest/best, 30 fastest.
const NEUQUANT_SAMPLE_FACTOR: i32 = 10;
/// Below this many pixels NeuQuant looks at every pixel.
const SMALL_IMAGE_PIXELS: usize = 512 * 512;
/// libwebp effort setting, 6 is the slowest and smallest.
const WEBP_SLOWEST_METHOD: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// Optimized Huffman tables, progressive scans.
    ProgressiveJpeg,
    /// Lossless PNG at maximum deflate effort.
    Png,
    /// Adaptive palette quantization, then PNG.
    PalettePng,
    /// Lossy WebP at the slowest method.
    WebPLossy,
    /// Whatever the output extension implies, encoder defaults.
    Default,
}

pub struct CompressionResult {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub algorithm_used: CompressionAlgorithm,
}

impl CompressionAlgorithm {
    /// Picks the encoder for a decoded image. Forced JPEG wins, otherwise the
    /// sniffed source format decides, never the output extension.
    pub fn select(source: SourceFormat, options: &OptimizeOptions) -> Self {
        if options.force_jpeg {
            return Self::ProgressiveJpeg;
        }
        match source {
            SourceFormat::Jpeg => Self::ProgressiveJpeg,
            SourceFormat::Png if options.optimize_palette => Self::PalettePng,
            SourceFormat::Png => Self::Png,
            SourceFormat::WebP => Self::WebPLossy,
            SourceFormat::Other(_) => Self::Default,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ProgressiveJpeg => "Progressive JPEG with optimized coding",
            Self::Png => "PNG, best compression",
            Self::PalettePng => "PNG with adaptive palette",
            Self::WebPLossy => "WebP lossy, slowest method",
            Self::Default => "Default encoder for the output extension",
        }
    }
}

/// Encodes `image` with `algorithm`. `output_path` is only consulted by
/// [`CompressionAlgorithm::Default`].
pub fn compress(
    image: &DynamicImage,
    algorithm: CompressionAlgorithm,
    quality: Quality,
    output_path: &Path,
) -> Result<CompressionResult, OptimizeError> {
    let (data, format) = match algorithm {
        CompressionAlgorithm::ProgressiveJpeg => (encode_jpeg(image, quality)?, ImageFormat::Jpeg),
        CompressionAlgorithm::Png => (encode_png(image)?, ImageFormat::Png),
        CompressionAlgorithm::PalettePng => (encode_palette_png(image)?, ImageFormat::Png),
        CompressionAlgorithm::WebPLossy => (encode_webp(image, quality)?, ImageFormat::WebP),
        CompressionAlgorithm::Default => encode_for_extension(image, output_path)?,
    };

    Ok(CompressionResult {
        data,
        format,
        algorithm_used: algorithm,
    })
}

/// Grayscale stays grayscale; every other mode, alpha and palette sources
/// included, is flattened to 8-bit RGB with the alpha channel dropped.
pub fn encode_jpeg(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, OptimizeError> {
    let (color_space, pixels) = match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => {
            (ColorSpace::JCS_GRAYSCALE, image.to_luma8().into_raw())
        }
        _ => (ColorSpace::JCS_RGB, image.to_rgb8().into_raw()),
    };
    let (width, height) = (image.width() as usize, image.height() as usize);

    // libjpeg reports fatal errors by unwinding out of its error handler.
    let encoded = panic::catch_unwind(AssertUnwindSafe(|| -> std::io::Result<Vec<u8>> {
        let mut comp = Compress::new(color_space);
        comp.set_size(width, height);
        comp.set_quality(f32::from(quality.get()));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let mut started = comp.start_compress(Vec::new())?;
        started.write_scanlines(&pixels)?;
        started.finish()
    }));

    match encoded {
        Ok(Ok(data)) => Ok(data),
        Ok(Err(e)) => Err(OptimizeError::encode("JPEG", e.to_string())),
        Err(_) => Err(OptimizeError::encode("JPEG", "libjpeg aborted the encode")),
    }
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OptimizeError> {
    let mut data = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        &mut data,
        CompressionType::Best,
        FilterType::Adaptive,
    );
    image
        .write_with_encoder(encoder)
        .map_err(|e| OptimizeError::encode("PNG", e.to_string()))?;
    Ok(data)
}

/// Writes an indexed PNG with at most [`PALETTE_SIZE`] colours. Images that
/// already fit keep their exact colours; larger ones go through NeuQuant.
/// Translucent palette entries are kept through a tRNS chunk.
pub fn encode_palette_png(image: &DynamicImage) -> Result<Vec<u8>, OptimizeError> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    let (color_map, indices) = match exact_palette(&rgba) {
        Some(exact) => exact,
        None => quantize(&rgba),
    };

    let palette: Vec<u8> = color_map
        .iter()
        .flat_map(|entry| [entry[0], entry[1], entry[2]])
        .collect();
    let alpha: Vec<u8> = color_map.iter().map(|entry| entry[3]).collect();

    let mut data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut data, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette);
        if alpha.iter().any(|&a| a < u8::MAX) {
            encoder.set_trns(alpha);
        }
        encoder.set_compression(png::Compression::Best);
        encoder.set_adaptive_filter(png::AdaptiveFilterType::Adaptive);

        let mut writer = encoder.write_header().map_err(png_error)?;
        writer.write_image_data(&indices).map_err(png_error)?;
        writer.finish().map_err(png_error)?;
    }
    Ok(data)
}

/// Palette and indices built straight from the pixels, or `None` once more
/// than [`PALETTE_SIZE`] distinct colours show up.
fn exact_palette(rgba: &RgbaImage) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let mut lookup: HashMap<[u8; 4], u8> = HashMap::new();
    let mut color_map = Vec::new();
    let mut indices = Vec::with_capacity(rgba.as_raw().len() / 4);

    for pixel in rgba.pixels() {
        let index = match lookup.get(&pixel.0) {
            Some(&index) => index,
            None => {
                if color_map.len() == PALETTE_SIZE {
                    return None;
                }
                let index = color_map.len() as u8;
                color_map.push(pixel.0);
                lookup.insert(pixel.0, index);
                index
            }
        };
        indices.push(index);
    }
    Some((color_map, indices))
}

fn quantize(rgba: &RgbaImage) -> (Vec<[u8; 4]>, Vec<u8>) {
    let pixel_count = rgba.as_raw().len() / 4;
    let sample_factor = if pixel_count < SMALL_IMAGE_PIXELS {
        1
    } else {
        NEUQUANT_SAMPLE_FACTOR
    };

    let quantizer = NeuQuant::new(sample_factor, PALETTE_SIZE, rgba.as_raw());
    let indices = rgba
        .pixels()
        .map(|pixel| quantizer.index_of(&pixel.0) as u8)
        .collect();
    let color_map = quantizer
        .color_map_rgba()
        .chunks_exact(4)
        .map(|entry| [entry[0], entry[1], entry[2], entry[3]])
        .collect();
    (color_map, indices)
}

fn png_error(err: png::EncodingError) -> OptimizeError {
    OptimizeError::encode("PNG", err.to_string())
}

pub fn encode_webp(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, OptimizeError> {
    let (width, height) = (image.width(), image.height());
    if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        compress_webp(&webp::Encoder::from_rgba(rgba.as_raw(), width, height), quality)
    } else {
        let rgb = image.to_rgb8();
        compress_webp(&webp::Encoder::from_rgb(rgb.as_raw(), width, height), quality)
    }
}

fn compress_webp(encoder: &webp::Encoder<'_>, quality: Quality) -> Result<Vec<u8>, OptimizeError> {
    let mut config = libwebp_sys::WebPConfig::new()
        .map_err(|()| OptimizeError::encode("WebP", "libwebp rejected the default configuration"))?;
    config.lossless = 0;
    config.quality = f32::from(quality.get());
    config.method = WEBP_SLOWEST_METHOD;

    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| OptimizeError::encode("WebP", format!("{:?}", e)))?;
    Ok(memory.to_vec())
}

/// Falls back to the format named by the output extension, default settings.
pub fn encode_for_extension(
    image: &DynamicImage,
    output_path: &Path,
) -> Result<(Vec<u8>, ImageFormat), OptimizeError> {
    let format = ImageFormat::from_path(output_path)
        .map_err(|e| OptimizeError::encode("image", e.to_string()))?;
    let name = format.extensions_str().first().copied().unwrap_or("image");

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .map_err(|e| OptimizeError::encode(name, e.to_string()))?;
    Ok((buffer.into_inner(), format))
}
