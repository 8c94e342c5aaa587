use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use log::info;
use crate::error::ComposeError;

/// Logo width as a share of the background width.
pub const LOGO_WIDTH_RATIO: f64 = 0.4;

pub const JPEG_QUALITY: u8 = 95;

/// `combined_<stem>.jpg` next to the background.
pub fn combined_path(background: &Path) -> PathBuf {
    let stem = background
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    background.with_file_name(format!("combined_{stem}.jpg"))
}

/// Centres a PNG logo, scaled to 40% of the background width, over the
/// background and writes the result as a JPEG.
pub fn combine_logo(logo_path: &Path, background_path: &Path, output_path: &Path) -> Result<(), ComposeError> {
    let (format, logo) = open(logo_path)?;
    if format != Some(ImageFormat::Png) {
        return Err(ComposeError::LogoNotPng {
            path: logo_path.to_path_buf(),
        });
    }
    let (_, background) = open(background_path)?;
    let mut canvas = background.to_rgba8();

    let logo = logo.to_rgba8();

    let (bg_width, bg_height) = canvas.dimensions();
    let (logo_width, logo_height) = logo.dimensions();
    let width = (bg_width as f64 * LOGO_WIDTH_RATIO) as u32;
    let height = (width as f64 * logo_height as f64 / logo_width.max(1) as f64) as u32;
    if width == 0 || height == 0 {
        return Err(ComposeError::EmptyLogo { width, height });
    }

    let logo = imageops::resize(&logo, width, height, FilterType::Lanczos3);
    let x = (bg_width as i64 - width as i64).div_euclid(2);
    let y = (bg_height as i64 - height as i64).div_euclid(2);
    imageops::overlay(&mut canvas, &logo, x, y);

    let write_err = |source: ImageError| ComposeError::Write {
        path: output_path.to_path_buf(),
        source,
    };
    let file = File::create(output_path).map_err(|e| write_err(ImageError::IoError(e)))?;
    let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
    DynamicImage::ImageRgba8(canvas)
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(write_err)?;

    info!(
        "Combined {} onto {} at ({x}, {y}) as {}",
        logo_path.display(),
        background_path.display(),
        output_path.display()
    );
    Ok(())
}

fn open(path: &Path) -> Result<(Option<ImageFormat>, DynamicImage), ComposeError> {
    let read_err = |source: ImageError| ComposeError::Read {
        path: path.to_path_buf(),
        source,
    };
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| read_err(ImageError::IoError(e)))?;
    let format = reader.format();
    let image = reader.decode().map_err(read_err)?;
    Ok((format, image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn blue_background(dir: &Path) -> PathBuf {
        let path = dir.join("generated_image_20250101_101010.png");
        RgbImage::from_pixel(100, 50, Rgb([0, 0, 255])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_rejects_non_png_logo() {
        let dir = tempfile::tempdir().unwrap();
        let background = blue_background(dir.path());
        // A JPEG with a .png name is still not a PNG.
        let logo = dir.path().join("logo.png");
        RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]))
            .save_with_format(&logo, ImageFormat::Jpeg)
            .unwrap();

        let out = dir.path().join("out.jpg");
        let err = combine_logo(&logo, &background, &out).unwrap_err();
        assert!(matches!(err, ComposeError::LogoNotPng { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_logo_is_centred_and_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let background = blue_background(dir.path());
        let logo = dir.path().join("logo.png");
        RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])).save(&logo).unwrap();

        let out = combined_path(&background);
        combine_logo(&logo, &background, &out).unwrap();
        assert_eq!(out.file_name().unwrap(), "combined_generated_image_20250101_101010.jpg");

        let result = image::open(&out).unwrap();
        assert_eq!(image::guess_format(&std::fs::read(&out).unwrap()).unwrap(), ImageFormat::Jpeg);
        let result = result.to_rgb8();
        assert_eq!(result.dimensions(), (100, 50));

        // 40x40 logo at (30, 5).
        let red = |x, y| {
            let Rgb([r, _, b]) = *result.get_pixel(x, y);
            r > 200 && b < 60
        };
        let blue = |x, y| {
            let Rgb([r, _, b]) = *result.get_pixel(x, y);
            b > 200 && r < 60
        };
        assert!(red(50, 25));
        assert!(red(33, 8));
        assert!(red(66, 41));
        assert!(blue(25, 25));
        assert!(blue(75, 25));
        assert!(blue(50, 2));
        assert!(blue(50, 48));
    }

    #[test]
    fn test_transparent_logo_keeps_background() {
        let dir = tempfile::tempdir().unwrap();
        let background = blue_background(dir.path());
        let logo = dir.path().join("logo.png");
        RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 0])).save(&logo).unwrap();

        let out = dir.path().join("out.jpg");
        combine_logo(&logo, &background, &out).unwrap();
        let Rgb([r, _, b]) = *image::open(&out).unwrap().to_rgb8().get_pixel(50, 25);
        assert!(b > 200 && r < 60);
    }

    #[test]
    fn test_missing_background_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("logo.png");
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])).save(&logo).unwrap();
        let err = combine_logo(&logo, &dir.path().join("missing.png"), &dir.path().join("o.jpg")).unwrap_err();
        assert!(matches!(err, ComposeError::Read { .. }));
    }
}
