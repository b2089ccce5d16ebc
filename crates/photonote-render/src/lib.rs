//! PhotoNote Render Library
//!
//! CPU implementations of the core's image collaborators: a file-backed
//! geometric transformer and a preview rasterizer that paints strokes over
//! the current base image.

mod error;
mod raster;
mod transformer;

pub use error::RasterError;
pub use raster::{RasterRenderer, encode_png};
pub use transformer::{FileImageTransformer, apply_ops, open_image, resolve_image_path};
