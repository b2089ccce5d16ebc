use photonote_core::EngineError;
use thiserror::Error;

/// Errors from decoding, transforming and encoding raster images.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Failed to open image {path}: {source}")]
    Open {
        path: String,
        source: image::ImageError,
    },
    #[error("Failed to write image {path}: {source}")]
    Write {
        path: String,
        source: image::ImageError,
    },
    #[error("Invalid resize target {width}x{height}")]
    InvalidResize { width: u32, height: u32 },
    #[error("Crop rectangle ({x}, {y}) {width}x{height} does not intersect a {image_width}x{image_height} image")]
    EmptyCrop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RasterError {
    pub fn into_transform_failure(self) -> EngineError {
        EngineError::TransformFailure(self.to_string())
    }

    pub fn into_render_failure(self) -> EngineError {
        EngineError::RenderFailure(self.to_string())
    }
}
