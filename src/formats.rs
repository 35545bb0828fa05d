use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Extensions picked up by the folder walker, lowercase.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// How the optimizer treats a decoded source, judged from its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    WebP,
    Other(Option<ImageFormat>),
}

impl From<Option<ImageFormat>> for SourceFormat {
    fn from(format: Option<ImageFormat>) -> Self {
        match format {
            Some(ImageFormat::Jpeg) => Self::Jpeg,
            Some(ImageFormat::Png) => Self::Png,
            Some(ImageFormat::WebP) => Self::WebP,
            other => Self::Other(other),
        }
    }
}

/// Matches on the end of the file name, so a bare `.png` counts too.
pub fn is_image_file(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|&ext| {
        name.strip_suffix(ext)
            .is_some_and(|rest| rest.ends_with('.'))
    })
}

/// Destination file name for `source`: the stem plus `.jpg` when forcing
/// JPEG, otherwise the original extension untouched.
pub fn output_file_name(source: &Path, force_jpeg: bool) -> PathBuf {
    let mut name = source.file_stem().unwrap_or_default().to_os_string();
    if force_jpeg {
        name.push(".jpg");
    } else if let Some(ext) = source.extension() {
        name.push(".");
        name.push(ext);
    }
    PathBuf::from(name)
}
