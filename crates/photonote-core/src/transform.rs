//! Transform pipeline: turns a crop/rotate/flip gesture into an ordered list
//! of geometric image operations and bakes it into a new base image.
//!
//! # Operation order
//!
//! 1. Resize (only when target dimensions differ from the source)
//! 2. Rotate by the normalized angle (skipped at 0)
//! 3. Flip horizontal
//! 4. Flip vertical
//! 5. Crop (always last)
//!
//! Rotation angles are in degrees, positive = clockwise in image space
//! (y pointing down). The crop rectangle is in output-pixel space, i.e. the
//! space produced by steps 1-4.

use crate::error::{EngineError, EngineResult};
use crate::storage::BoxFuture;
use serde::{Deserialize, Serialize};

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Crop rectangle in output-pixel space. Parts outside the image are clipped
/// when the transform is planned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole image of the given size.
    pub fn full(size: ImageSize) -> Self {
        Self::new(0.0, 0.0, size.width as f64, size.height as f64)
    }

    fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width.round() >= 1.0
            && self.height.round() >= 1.0
    }
}

/// One geometric operation handed to an [`ImageTransformer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageOp {
    Resize { width: u32, height: u32 },
    Rotate { degrees: f64 },
    FlipHorizontal,
    FlipVertical,
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// Normalize an angle in degrees to `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if normalized >= 360.0 || normalized == 0.0 {
        0.0
    } else {
        normalized
    }
}

/// Bounding box of an image of `size` rotated by `degrees`.
pub fn rotated_bounds(size: ImageSize, degrees: f64) -> ImageSize {
    let angle = normalize_degrees(degrees);
    if angle == 0.0 || angle == 180.0 {
        return size;
    }
    if angle == 90.0 || angle == 270.0 {
        return ImageSize::new(size.height, size.width);
    }

    let rad = angle.to_radians();
    let (cos, sin) = (rad.cos().abs(), rad.sin().abs());
    let (w, h) = (size.width as f64, size.height as f64);
    let new_w = (w * cos + h * sin).round() as u32;
    let new_h = (w * sin + h * cos).round() as u32;
    ImageSize::new(new_w.max(1), new_h.max(1))
}

/// The crop/rotate/flip gesture held while the crop tool is active.
///
/// Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransform {
    source: ImageSize,
    crop: CropRect,
    rotation: f64,
    flip_horizontal: bool,
    flip_vertical: bool,
    resize: Option<ImageSize>,
}

impl PendingTransform {
    /// Start an untouched gesture against an image of `source` size.
    pub fn new(source: ImageSize) -> Self {
        Self {
            source,
            crop: CropRect::full(source),
            rotation: 0.0,
            flip_horizontal: false,
            flip_vertical: false,
            resize: None,
        }
    }

    pub fn source(&self) -> ImageSize {
        self.source
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn flip_horizontal(&self) -> bool {
        self.flip_horizontal
    }

    pub fn flip_vertical(&self) -> bool {
        self.flip_vertical
    }

    pub fn resize(&self) -> Option<ImageSize> {
        self.resize
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = normalize_degrees(degrees);
        self
    }

    pub fn with_flip_horizontal(mut self, flip: bool) -> Self {
        self.flip_horizontal = flip;
        self
    }

    pub fn with_flip_vertical(mut self, flip: bool) -> Self {
        self.flip_vertical = flip;
        self
    }

    pub fn with_resize(mut self, size: Option<ImageSize>) -> Self {
        self.resize = size;
        self
    }

    pub fn set_crop(&mut self, crop: CropRect) {
        self.crop = crop;
    }

    pub fn rotate_by(&mut self, degrees: f64) {
        self.rotation = normalize_degrees(self.rotation + degrees);
    }

    pub fn toggle_flip_horizontal(&mut self) {
        self.flip_horizontal = !self.flip_horizontal;
    }

    pub fn toggle_flip_vertical(&mut self) {
        self.flip_vertical = !self.flip_vertical;
    }

    /// Set the resize target from a scale factor reported by the crop tool.
    ///
    /// A factor of 1 clears any resize.
    pub fn set_scale(&mut self, factor: f64) -> EngineResult<()> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(EngineError::Validation(format!(
                "Scale factor must be positive, got {factor}"
            )));
        }
        if factor == 1.0 {
            self.resize = None;
            return Ok(());
        }
        let width = ((self.source.width as f64) * factor).round().max(1.0) as u32;
        let height = ((self.source.height as f64) * factor).round().max(1.0) as u32;
        self.resize = Some(ImageSize::new(width, height));
        Ok(())
    }

    fn effective_resize(&self) -> Option<ImageSize> {
        self.resize.filter(|size| *size != self.source)
    }

    /// Size of the image after resize, rotate and flips, before cropping.
    pub fn pre_crop_size(&self) -> ImageSize {
        let resized = self.effective_resize().unwrap_or(self.source);
        rotated_bounds(resized, self.rotation)
    }

    /// True when applying this gesture would reproduce the source image.
    pub fn is_identity(&self) -> bool {
        self.rotation == 0.0
            && !self.flip_horizontal
            && !self.flip_vertical
            && self.effective_resize().is_none()
            && self.pixel_crop() == Some((0, 0, self.source.width, self.source.height))
    }

    /// The crop in whole pixels, clipped to [`pre_crop_size`](Self::pre_crop_size).
    ///
    /// `None` when the rectangle is invalid or misses the image entirely.
    fn pixel_crop(&self) -> Option<(u32, u32, u32, u32)> {
        if !self.crop.is_valid() {
            return None;
        }
        let bounds = self.pre_crop_size();
        let x = self.crop.x.round() as u32;
        let y = self.crop.y.round() as u32;
        let right = x
            .saturating_add(self.crop.width.round() as u32)
            .min(bounds.width);
        let bottom = y
            .saturating_add(self.crop.height.round() as u32)
            .min(bounds.height);
        if x >= right || y >= bottom {
            return None;
        }
        Some((x, y, right - x, bottom - y))
    }

    /// Size of the image the plan produces.
    pub fn output_size(&self) -> EngineResult<ImageSize> {
        let (_, _, width, height) = self.checked_crop()?;
        Ok(ImageSize::new(width, height))
    }

    fn checked_crop(&self) -> EngineResult<(u32, u32, u32, u32)> {
        self.pixel_crop().ok_or_else(|| {
            let bounds = self.pre_crop_size();
            EngineError::TransformFailure(format!(
                "Invalid crop rectangle {:?} for a {}x{} image",
                self.crop, bounds.width, bounds.height
            ))
        })
    }

    /// The ordered operation list for this gesture.
    pub fn plan(&self) -> EngineResult<Vec<ImageOp>> {
        let (x, y, width, height) = self.checked_crop()?;

        let mut ops = Vec::with_capacity(5);
        if let Some(size) = self.effective_resize() {
            ops.push(ImageOp::Resize {
                width: size.width,
                height: size.height,
            });
        }
        if self.rotation != 0.0 {
            ops.push(ImageOp::Rotate {
                degrees: self.rotation,
            });
        }
        if self.flip_horizontal {
            ops.push(ImageOp::FlipHorizontal);
        }
        if self.flip_vertical {
            ops.push(ImageOp::FlipVertical);
        }
        ops.push(ImageOp::Crop {
            x,
            y,
            width,
            height,
        });
        Ok(ops)
    }
}

/// Geometric image transformer collaborator.
///
/// Given an image reference and an ordered operation list, produces a new
/// image reference. Implementations report failures as
/// [`EngineError::TransformFailure`].
pub trait ImageTransformer: Send + Sync {
    fn transform<'a>(
        &'a self,
        source: &'a str,
        ops: &'a [ImageOp],
    ) -> BoxFuture<'a, EngineResult<String>>;
}

/// Result of baking a pending transform.
#[derive(Debug, Clone, PartialEq)]
pub struct BakedImage {
    pub image_ref: String,
    pub size: ImageSize,
}

/// Plan `pending` and run it through `transformer` against `source`.
pub async fn bake(
    transformer: &dyn ImageTransformer,
    source: &str,
    pending: &PendingTransform,
) -> EngineResult<BakedImage> {
    let ops = pending.plan()?;
    log::debug!("Baking {} op(s) into {}: {:?}", ops.len(), source, ops);

    let image_ref = transformer.transform(source, &ops).await?;
    if image_ref.trim().is_empty() {
        return Err(EngineError::TransformFailure(
            "Transformer returned an empty image reference".to_string(),
        ));
    }

    Ok(BakedImage {
        image_ref,
        size: pending.output_size()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture() -> PendingTransform {
        PendingTransform::new(ImageSize::new(400, 300))
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(450.0), 90.0);
        assert_eq!(normalize_degrees(-1e-20), 0.0);
        assert_eq!(normalize_degrees(f64::NAN), 0.0);
    }

    #[test]
    fn test_untouched_gesture_is_identity() {
        let pending = gesture();
        assert!(pending.is_identity());
        assert_eq!(
            pending.plan().unwrap(),
            vec![ImageOp::Crop {
                x: 0,
                y: 0,
                width: 400,
                height: 300
            }]
        );
    }

    #[test]
    fn test_full_plan_order() {
        let mut pending = gesture()
            .with_rotation(90.0)
            .with_flip_horizontal(true)
            .with_flip_vertical(true)
            .with_crop(CropRect::new(10.0, 20.0, 100.0, 50.0));
        pending.set_scale(0.5).unwrap();

        let ops = pending.plan().unwrap();
        assert_eq!(
            ops,
            vec![
                ImageOp::Resize {
                    width: 200,
                    height: 150
                },
                ImageOp::Rotate { degrees: 90.0 },
                ImageOp::FlipHorizontal,
                ImageOp::FlipVertical,
                ImageOp::Crop {
                    x: 10,
                    y: 20,
                    width: 100,
                    height: 50
                },
            ]
        );
        assert!(!pending.is_identity());
    }

    #[test]
    fn test_crop_is_always_last() {
        let pending = gesture().with_rotation(45.0).with_flip_vertical(true);
        let ops = pending.plan().unwrap();
        assert!(matches!(ops.last(), Some(ImageOp::Crop { .. })));
        assert_eq!(ops.len(), 3);
    }

    #[test]
    fn test_zero_rotation_skipped() {
        let pending = gesture().with_rotation(720.0).with_flip_horizontal(true);
        let ops = pending.plan().unwrap();
        assert!(!ops.iter().any(|op| matches!(op, ImageOp::Rotate { .. })));
    }

    #[test]
    fn test_scale_of_one_clears_resize() {
        let mut pending = gesture();
        pending.set_scale(2.0).unwrap();
        assert_eq!(pending.resize(), Some(ImageSize::new(800, 600)));
        pending.set_scale(1.0).unwrap();
        assert_eq!(pending.resize(), None);
        assert!(pending.set_scale(0.0).is_err());
    }

    #[test]
    fn test_resize_to_source_size_is_skipped() {
        let pending = gesture().with_resize(Some(ImageSize::new(400, 300)));
        assert!(pending.is_identity());
        assert_eq!(pending.plan().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_crop_fails_plan() {
        let pending = gesture().with_crop(CropRect::new(0.0, 0.0, 0.0, 10.0));
        assert!(matches!(
            pending.plan(),
            Err(EngineError::TransformFailure(_))
        ));

        let pending = gesture().with_crop(CropRect::new(-5.0, 0.0, 10.0, 10.0));
        assert!(pending.plan().is_err());
    }

    #[test]
    fn test_crop_is_clipped_to_rotated_image() {
        let pending = gesture()
            .with_rotation(90.0)
            .with_crop(CropRect::new(0.0, 0.0, 1000.0, 1000.0));
        assert_eq!(
            pending.plan().unwrap(),
            vec![
                ImageOp::Rotate { degrees: 90.0 },
                ImageOp::Crop {
                    x: 0,
                    y: 0,
                    width: 300,
                    height: 400
                },
            ]
        );
        assert_eq!(pending.output_size().unwrap(), ImageSize::new(300, 400));

        let pending = gesture()
            .with_rotation(90.0)
            .with_crop(CropRect::new(250.0, 350.0, 100.0, 100.0));
        assert_eq!(pending.output_size().unwrap(), ImageSize::new(50, 50));

        let outside = gesture()
            .with_rotation(90.0)
            .with_crop(CropRect::new(300.0, 0.0, 10.0, 10.0));
        assert!(matches!(
            outside.plan(),
            Err(EngineError::TransformFailure(_))
        ));
    }

    #[test]
    fn test_oversized_full_frame_crop_is_identity() {
        let pending = gesture().with_crop(CropRect::new(0.0, 0.0, 5000.0, 5000.0));
        assert!(pending.is_identity());
    }

    #[test]
    fn test_rotate_by_accumulates() {
        let mut pending = gesture();
        pending.rotate_by(-90.0);
        pending.rotate_by(-90.0);
        assert_eq!(pending.rotation(), 180.0);
        pending.rotate_by(180.0);
        assert_eq!(pending.rotation(), 0.0);
    }

    #[test]
    fn test_pre_crop_size() {
        let pending = gesture().with_rotation(90.0);
        assert_eq!(pending.pre_crop_size(), ImageSize::new(300, 400));

        let mut pending = gesture().with_rotation(270.0);
        pending.set_scale(0.5).unwrap();
        assert_eq!(pending.pre_crop_size(), ImageSize::new(150, 200));
    }

    #[test]
    fn test_rotated_bounds_arbitrary_angle() {
        let size = rotated_bounds(ImageSize::new(100, 100), 45.0);
        assert_eq!(size, ImageSize::new(141, 141));
    }
}
