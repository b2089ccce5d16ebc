//! File-backed geometric transformer.
//!
//! Opens the source image from disk, applies the planned operations in
//! order and writes the result as a new PNG. Right-angle rotations are
//! exact; other angles use bilinear sampling on an expanded, transparent
//! canvas.

use crate::error::RasterError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use photonote_core::storage::BoxFuture;
use photonote_core::transform::{normalize_degrees, rotated_bounds};
use photonote_core::{EngineResult, ImageOp, ImageSize, ImageTransformer};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Map an image reference to a filesystem path, accepting `file://` URIs.
pub fn resolve_image_path(image_ref: &str) -> PathBuf {
    PathBuf::from(image_ref.strip_prefix("file://").unwrap_or(image_ref))
}

/// Decode the image behind `image_ref`.
pub fn open_image(image_ref: &str) -> Result<DynamicImage, RasterError> {
    let path = resolve_image_path(image_ref);
    image::open(&path).map_err(|source| RasterError::Open {
        path: path.display().to_string(),
        source,
    })
}

/// Apply `ops` to `image` in order.
pub fn apply_ops(image: DynamicImage, ops: &[ImageOp]) -> Result<DynamicImage, RasterError> {
    ops.iter().try_fold(image, apply_op)
}

fn apply_op(image: DynamicImage, op: &ImageOp) -> Result<DynamicImage, RasterError> {
    match *op {
        ImageOp::Resize { width, height } => {
            if width == 0 || height == 0 {
                return Err(RasterError::InvalidResize { width, height });
            }
            if image.width() == width && image.height() == height {
                return Ok(image);
            }
            Ok(image.resize_exact(width, height, FilterType::Lanczos3))
        }
        ImageOp::Rotate { degrees } => Ok(rotate(image, degrees)),
        ImageOp::FlipHorizontal => Ok(image.fliph()),
        ImageOp::FlipVertical => Ok(image.flipv()),
        ImageOp::Crop {
            x,
            y,
            width,
            height,
        } => crop(image, x, y, width, height),
    }
}

/// Rotate clockwise by `degrees`.
fn rotate(image: DynamicImage, degrees: f64) -> DynamicImage {
    let angle = normalize_degrees(degrees);
    if angle == 0.0 {
        image
    } else if angle == 90.0 {
        image.rotate90()
    } else if angle == 180.0 {
        image.rotate180()
    } else if angle == 270.0 {
        image.rotate270()
    } else {
        DynamicImage::ImageRgba8(rotate_bilinear(&image.to_rgba8(), angle))
    }
}

/// Inverse-mapped rotation around the image center. Pixels that map outside
/// the source stay transparent.
fn rotate_bilinear(src: &RgbaImage, degrees: f64) -> RgbaImage {
    let bounds = rotated_bounds(ImageSize::new(src.width(), src.height()), degrees);
    let (sin, cos) = degrees.to_radians().sin_cos();

    let src_cx = src.width() as f64 / 2.0;
    let src_cy = src.height() as f64 / 2.0;
    let dst_cx = bounds.width as f64 / 2.0;
    let dst_cy = bounds.height as f64 / 2.0;

    RgbaImage::from_fn(bounds.width, bounds.height, |dst_x, dst_y| {
        let dx = dst_x as f64 + 0.5 - dst_cx;
        let dy = dst_y as f64 + 0.5 - dst_cy;
        // y points down, so this undoes a clockwise turn
        let src_x = dx * cos + dy * sin + src_cx - 0.5;
        let src_y = -dx * sin + dy * cos + src_cy - 0.5;
        sample_bilinear(src, src_x, src_y)
    })
}

fn sample_bilinear(src: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (w, h) = (src.width() as i64, src.height() as i64);

    let mut acc = [0.0f64; 4];
    let taps = [
        (0, 0, (1.0 - fx) * (1.0 - fy)),
        (1, 0, fx * (1.0 - fy)),
        (0, 1, (1.0 - fx) * fy),
        (1, 1, fx * fy),
    ];
    for (ox, oy, weight) in taps {
        let px = x0 as i64 + ox;
        let py = y0 as i64 + oy;
        if px < 0 || py < 0 || px >= w || py >= h || weight == 0.0 {
            continue;
        }
        let pixel = src.get_pixel(px as u32, py as u32).0;
        for (sum, channel) in acc.iter_mut().zip(pixel) {
            *sum += channel as f64 * weight;
        }
    }
    Rgba(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
}

/// Crop, clamping the rectangle to the image bounds.
fn crop(
    image: DynamicImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<DynamicImage, RasterError> {
    let right = x.saturating_add(width).min(image.width());
    let bottom = y.saturating_add(height).min(image.height());
    if x >= right || y >= bottom {
        return Err(RasterError::EmptyCrop {
            x,
            y,
            width,
            height,
            image_width: image.width(),
            image_height: image.height(),
        });
    }
    Ok(image.crop_imm(x, y, right - x, bottom - y))
}

/// Transformer that reads images from disk and writes results as PNG files
/// named by UUID in `output_dir`.
pub struct FileImageTransformer {
    output_dir: PathBuf,
}

impl FileImageTransformer {
    pub fn new(output_dir: PathBuf) -> Result<Self, RasterError> {
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn transform_blocking(&self, source: &str, ops: &[ImageOp]) -> Result<String, RasterError> {
        let image = open_image(source)?;
        let result = apply_ops(image, ops)?;

        let path = self.output_dir.join(format!("{}.png", Uuid::new_v4()));
        result
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|source| RasterError::Write {
                path: path.display().to_string(),
                source,
            })?;
        log::debug!(
            "Wrote {}x{} transform output to {}",
            result.width(),
            result.height(),
            path.display()
        );
        Ok(path.to_string_lossy().into_owned())
    }
}

impl ImageTransformer for FileImageTransformer {
    fn transform<'a>(
        &'a self,
        source: &'a str,
        ops: &'a [ImageOp],
    ) -> BoxFuture<'a, EngineResult<String>> {
        Box::pin(async move {
            self.transform_blocking(source, ops)
                .map_err(RasterError::into_transform_failure)
        })
    }
}
