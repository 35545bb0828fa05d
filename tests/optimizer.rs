mod common;

use common::{HEIGHT, WIDTH};
use image::{GenericImageView, ImageFormat};
use image_optimizer::compression::CompressionAlgorithm;
use image_optimizer::{optimize, OptimizationRequest, OptimizeError, OptimizeOptions, Quality};
use std::fs;
use std::path::Path;

fn options(optimize_palette: bool, force_jpeg: bool) -> OptimizeOptions {
    OptimizeOptions {
        quality: Quality::new(70).unwrap(),
        optimize_palette,
        force_jpeg,
    }
}

fn decoded_format(path: &Path) -> ImageFormat {
    image::guess_format(&fs::read(path).unwrap()).unwrap()
}

#[test]
fn jpeg_source_stays_progressive_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_jpeg(&dir.path().join("photo.jpg"));
    let output = dir.path().join("out").join("photo.jpg");
    fs::create_dir_all(output.parent().unwrap()).unwrap();

    let optimized = optimize(&OptimizationRequest::new(&input, &output, options(true, false))).unwrap();

    assert_eq!(optimized.output_path, output);
    assert_eq!(optimized.format, ImageFormat::Jpeg);
    assert_eq!(optimized.algorithm_used, CompressionAlgorithm::ProgressiveJpeg);
    assert_eq!(optimized.new_size, fs::metadata(&output).unwrap().len());

    let data = fs::read(&output).unwrap();
    // SOF2 marks a progressive frame.
    assert!(common::contains(&data, &[0xFF, 0xC2]));
    assert_eq!(image::open(&output).unwrap().dimensions(), (WIDTH, HEIGHT));
}

#[test]
fn metadata_is_stripped() {
    let dir = tempfile::tempdir().unwrap();
    let plain = common::write_jpeg(&dir.path().join("plain.jpg"));
    let tagged = dir.path().join("tagged.jpg");
    fs::write(&tagged, common::with_exif(&fs::read(&plain).unwrap())).unwrap();
    assert!(common::contains(&fs::read(&tagged).unwrap(), b"secret-camera-serial"));

    let output = dir.path().join("clean.jpg");
    optimize(&OptimizationRequest::new(&tagged, &output, options(true, false))).unwrap();

    let data = fs::read(&output).unwrap();
    assert!(!common::contains(&data, b"Exif\0\0"));
    assert!(!common::contains(&data, b"secret-camera-serial"));
}

#[test]
fn png_without_palette_keeps_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_png(&dir.path().join("icon.png"));
    let output = dir.path().join("icon-out.png");

    let optimized = optimize(&OptimizationRequest::new(&input, &output, options(false, false))).unwrap();

    assert_eq!(optimized.algorithm_used, CompressionAlgorithm::Png);
    assert_eq!(decoded_format(&output), ImageFormat::Png);
    let decoded = image::open(&output).unwrap();
    assert_eq!(decoded.dimensions(), (WIDTH, HEIGHT));
    assert!(decoded.color().has_alpha());
    assert_eq!(decoded.to_rgba8().get_pixel(0, 0)[3], 0);
}

#[test]
fn png_with_palette_is_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_png(&dir.path().join("icon.png"));
    let output = dir.path().join("icon-out.png");

    let optimized = optimize(&OptimizationRequest::new(&input, &output, options(true, false))).unwrap();

    assert_eq!(optimized.algorithm_used, CompressionAlgorithm::PalettePng);
    assert_eq!(common::png_color_type(&output), png::ColorType::Indexed);
    assert_eq!(image::open(&output).unwrap().dimensions(), (WIDTH, HEIGHT));
}

#[test]
fn palette_mode_keeps_colours_of_small_images() {
    let dir = tempfile::tempdir().unwrap();
    let solid = image::RgbaImage::from_pixel(1, 1, image::Rgba([10, 200, 30, 255]));
    let input = dir.path().join("dot.png");
    solid.save_with_format(&input, ImageFormat::Png).unwrap();
    let output = dir.path().join("dot-out.png");

    optimize(&OptimizationRequest::new(&input, &output, options(true, false))).unwrap();

    assert_eq!(common::png_color_type(&output), png::ColorType::Indexed);
    assert_eq!(image::open(&output).unwrap().to_rgba8(), solid);
}

#[test]
fn palette_mode_is_exact_for_few_colours() {
    let dir = tempfile::tempdir().unwrap();
    // Blocks of 8x8 with half the image transparent: 24 colours.
    let original = image::RgbaImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let alpha = if x < WIDTH / 2 { 0 } else { 255 };
        image::Rgba([(x / 8 * 40) as u8, (y / 8 * 60) as u8, 90, alpha])
    });
    let input = dir.path().join("blocks.png");
    original.save_with_format(&input, ImageFormat::Png).unwrap();
    let output = dir.path().join("blocks-out.png");

    optimize(&OptimizationRequest::new(&input, &output, options(true, false))).unwrap();

    assert_eq!(image::open(&output).unwrap().to_rgba8(), original);
}

#[test]
fn webp_source_stays_webp() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_webp(&dir.path().join("banner.webp"));
    let output = dir.path().join("banner-out.webp");

    let optimized = optimize(&OptimizationRequest::new(&input, &output, options(true, false))).unwrap();

    assert_eq!(optimized.algorithm_used, CompressionAlgorithm::WebPLossy);
    assert_eq!(decoded_format(&output), ImageFormat::WebP);
    assert_eq!(image::open(&output).unwrap().dimensions(), (WIDTH, HEIGHT));
}

#[test]
fn source_format_is_sniffed_not_taken_from_extension() {
    let dir = tempfile::tempdir().unwrap();
    // A BMP hiding behind a .png name takes the default path.
    let input = common::write_bmp(&dir.path().join("disguised.png"));
    let output = dir.path().join("disguised-out.png");

    let optimized = optimize(&OptimizationRequest::new(&input, &output, options(true, false))).unwrap();

    assert_eq!(optimized.algorithm_used, CompressionAlgorithm::Default);
    assert_eq!(optimized.format, ImageFormat::Png);
    assert_eq!(decoded_format(&output), ImageFormat::Png);
}

#[test]
fn force_jpeg_rewrites_extension_and_drops_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let sources = [
        common::write_png(&dir.path().join("a.png")),
        common::write_webp(&dir.path().join("b.webp")),
        common::write_jpeg(&dir.path().join("c.jpeg")),
    ];

    for input in &sources {
        let nominal = dir.path().join("out").join(input.file_name().unwrap());
        fs::create_dir_all(nominal.parent().unwrap()).unwrap();

        let optimized =
            optimize(&OptimizationRequest::new(input, &nominal, options(true, true))).unwrap();

        assert_eq!(optimized.output_path.extension().unwrap(), "jpg");
        if nominal.extension().unwrap() != "jpg" {
            assert!(!nominal.exists());
        }
        assert_eq!(decoded_format(&optimized.output_path), ImageFormat::Jpeg);
        let decoded = image::open(&optimized.output_path).unwrap();
        assert_eq!(decoded.dimensions(), (WIDTH, HEIGHT));
        assert!(!decoded.color().has_alpha());
    }
}

#[test]
fn rerunning_on_own_output_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        (common::write_jpeg(&dir.path().join("a.jpg")), ImageFormat::Jpeg),
        (common::write_png(&dir.path().join("b.png")), ImageFormat::Png),
        (common::write_webp(&dir.path().join("c.webp")), ImageFormat::WebP),
    ];

    for (input, format) in &cases {
        let first = dir.path().join("first").join(input.file_name().unwrap());
        let second = dir.path().join("second").join(input.file_name().unwrap());
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::create_dir_all(second.parent().unwrap()).unwrap();

        optimize(&OptimizationRequest::new(input, &first, options(true, false))).unwrap();
        optimize(&OptimizationRequest::new(&first, &second, options(true, false))).unwrap();

        assert_eq!(decoded_format(&second), *format);
        assert_eq!(image::open(&second).unwrap().dimensions(), (WIDTH, HEIGHT));
    }
}

#[test]
fn overwriting_the_input_in_place_works() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_jpeg(&dir.path().join("photo.jpg"));

    optimize(&OptimizationRequest::new(&input, &input, options(true, false))).unwrap();

    assert_eq!(decoded_format(&input), ImageFormat::Jpeg);
    assert_eq!(image::open(&input).unwrap().dimensions(), (WIDTH, HEIGHT));
}

#[test]
fn corrupt_input_is_a_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_corrupt(&dir.path().join("broken.jpg"));
    let output = dir.path().join("broken-out.jpg");

    let result = optimize(&OptimizationRequest::new(&input, &output, options(true, false)));

    assert!(matches!(result, Err(OptimizeError::Decode { .. })));
    assert!(!output.exists());
    assert!(result.unwrap_err().to_string().contains("broken.jpg"));
}

#[test]
fn unwritable_destination_is_a_filesystem_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_jpeg(&dir.path().join("photo.jpg"));
    let output = dir.path().join("missing-dir").join("photo.jpg");

    let result = optimize(&OptimizationRequest::new(&input, &output, options(true, false)));

    assert!(matches!(result, Err(OptimizeError::Filesystem { .. })));
}
