//! Single-image optimization: decode, pick an encoder, write the result.

use image::io::Reader as ImageReader;
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::compression::{self, CompressionAlgorithm};
use crate::error::OptimizeError;
use crate::formats::SourceFormat;
use crate::request::OptimizationRequest;

/// A successfully written output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimized {
    /// Where the file landed; differs from the requested path when JPEG was
    /// forced.
    pub output_path: PathBuf,
    pub format: ImageFormat,
    pub algorithm_used: CompressionAlgorithm,
    pub original_size: u64,
    pub new_size: u64,
}

/// Re-encodes one image according to `request`.
///
/// Every decode, encode or filesystem problem comes back as an
/// [`OptimizeError`]; nothing is written unless the encode succeeded.
pub fn optimize(request: &OptimizationRequest) -> Result<Optimized, OptimizeError> {
    let result = run(request);
    if let Err(e) = &result {
        warn!("Failed to optimize {}: {}", request.input_path.display(), e);
    }
    result
}

fn run(request: &OptimizationRequest) -> Result<Optimized, OptimizeError> {
    let input = request.input_path.as_path();
    let original_size = fs::metadata(input)
        .map_err(|e| OptimizeError::filesystem(input, e))?
        .len();

    let (image, source) = decode(input)?;
    let algorithm = CompressionAlgorithm::select(source, &request.options);
    let output_path = request.resolved_output();
    debug!(
        "Optimizing {} ({:?}, {}x{}) with {:?}",
        input.display(),
        source,
        image.width(),
        image.height(),
        algorithm
    );

    let compressed =
        compression::compress(&image, algorithm, request.options.quality, &output_path)?;
    write_atomically(&output_path, &compressed.data)?;

    let new_size = compressed.data.len() as u64;
    debug!(
        "Wrote {} ({} -> {} bytes)",
        output_path.display(),
        original_size,
        new_size
    );

    Ok(Optimized {
        output_path,
        format: compressed.format,
        algorithm_used: compressed.algorithm_used,
        original_size,
        new_size,
    })
}

/// Decodes by sniffing the content, not the extension. The returned buffer
/// holds pixels only, so EXIF, XMP and ICC blocks never reach an encoder.
fn decode(path: &Path) -> Result<(DynamicImage, SourceFormat), OptimizeError> {
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| OptimizeError::filesystem(path, e))?;
    let source = SourceFormat::from(reader.format());
    let image = reader.decode().map_err(|source| OptimizeError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((image, source))
}

/// Writes through a temporary sibling and renames it into place, so a
/// failure never leaves a truncated file and overwriting the input is safe.
/// A replaced file keeps its permissions; a new one gets the usual
/// umask-filtered mode.
fn write_atomically(path: &Path, data: &[u8]) -> Result<(), OptimizeError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let existing = fs::metadata(path).ok().map(|meta| meta.permissions());

    let mut builder = tempfile::Builder::new();
    builder.prefix(".optimizing-");
    // Temporary files are otherwise created owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }

    let mut file = builder
        .tempfile_in(dir)
        .map_err(|e| OptimizeError::filesystem(dir, e))?;
    file.write_all(data)
        .map_err(|e| OptimizeError::filesystem(file.path(), e))?;
    file.persist(path)
        .map_err(|e| OptimizeError::filesystem(path, e.error))?;

    if let Some(permissions) = existing {
        fs::set_permissions(path, permissions)
            .map_err(|e| OptimizeError::filesystem(path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::OptimizeOptions;

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        fs::write(&target, b"old contents that are longer").unwrap();

        write_atomically(&target, b"new").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".optimizing-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_keeps_permissions_of_replaced_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("private.png");
        fs::write(&target, b"old").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o600)).unwrap();

        write_atomically(&target, b"new").unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_new_file_uses_default_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fresh.png");

        write_atomically(&target, b"new").unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o600, 0o600);
        assert_eq!(mode & 0o111, 0);
    }

    #[test]
    fn missing_input_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let request = OptimizationRequest::new(
            dir.path().join("absent.jpg"),
            dir.path().join("out.jpg"),
            OptimizeOptions::default(),
        );
        assert!(matches!(
            optimize(&request),
            Err(OptimizeError::Filesystem { .. })
        ));
        assert!(!dir.path().join("out.jpg").exists());
    }
}
