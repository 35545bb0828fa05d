#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};

pub const WIDTH: u32 = 48;
pub const HEIGHT: u32 = 32;

pub fn gradient() -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        Rgb([(x * 5) as u8, (y * 7) as u8, ((x + y) * 3) as u8])
    })
}

pub fn translucent() -> RgbaImage {
    RgbaImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let alpha = if x < WIDTH / 2 { 0 } else { 255 };
        Rgba([(x * 5) as u8, (y * 7) as u8, 90, alpha])
    })
}

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
}

pub fn write_jpeg(path: &Path) -> PathBuf {
    ensure_parent(path);
    DynamicImage::ImageRgb8(gradient())
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
    path.to_path_buf()
}

pub fn write_png(path: &Path) -> PathBuf {
    ensure_parent(path);
    DynamicImage::ImageRgba8(translucent())
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
    path.to_path_buf()
}

pub fn write_webp(path: &Path) -> PathBuf {
    ensure_parent(path);
    let rgb = gradient();
    let encoded = webp::Encoder::from_rgb(rgb.as_raw(), WIDTH, HEIGHT).encode(80.0);
    fs::write(path, &*encoded).unwrap();
    path.to_path_buf()
}

pub fn write_bmp(path: &Path) -> PathBuf {
    ensure_parent(path);
    DynamicImage::ImageRgb8(gradient())
        .save_with_format(path, ImageFormat::Bmp)
        .unwrap();
    path.to_path_buf()
}

pub fn write_corrupt(path: &Path) -> PathBuf {
    ensure_parent(path);
    fs::write(path, b"definitely not an image").unwrap();
    path.to_path_buf()
}

pub fn write_text(path: &Path) -> PathBuf {
    ensure_parent(path);
    fs::write(path, b"notes").unwrap();
    path.to_path_buf()
}

/// Inserts an EXIF APP1 segment right after the JPEG SOI marker.
pub fn with_exif(jpeg: &[u8]) -> Vec<u8> {
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(b"MM\0\x2a\0\0\0\x08\0\0secret-camera-serial");
    let length = (payload.len() + 2) as u16;

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

pub fn png_color_type(path: &Path) -> png::ColorType {
    let file = fs::File::open(path).unwrap();
    let reader = png::Decoder::new(file).read_info().unwrap();
    reader.info().color_type
}
