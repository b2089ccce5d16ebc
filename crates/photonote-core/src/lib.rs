//! PhotoNote Core Library
//!
//! Editing-session engine for annotated photos: freehand strokes over a base
//! image, crop/rotate/flip transforms baked into new images, and durable
//! session records with rasterized previews.

pub mod annotation;
pub mod config;
pub mod document;
pub mod error;
pub mod input;
pub mod path_codec;
pub mod session;
pub mod storage;
pub mod tools;
pub mod transform;

pub use annotation::{AnnotationError, AnnotationLayer, Brush, Stroke, StrokeColor};
pub use config::EngineConfig;
pub use document::{CanvasRenderer, CanvasSize, EditorState, capture_snapshot};
pub use error::{EngineError, EngineResult};
pub use input::{GestureEffect, GestureEvent};
pub use session::{EditSession, SharedSession, ToolChange, TransformOutcome};
pub use storage::{
    FileSessionCatalog, PreviewUpdate, SessionCatalog, SessionId, SessionRecord,
    create_file_catalog,
};
pub use tools::{ToolMode, ToolTransition};
pub use transform::{BakedImage, CropRect, ImageOp, ImageSize, ImageTransformer, PendingTransform};
