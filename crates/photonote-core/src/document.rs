//! Session document model and its versioned JSON form.
//!
//! The schema is additive-only: loaders tolerate missing optional fields and
//! drop individual malformed strokes instead of failing the whole load.

use crate::annotation::{AnnotationLayer, Stroke, StrokeColor};
use crate::error::{EngineError, EngineResult};
use crate::path_codec;
use crate::storage::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current version written into serialized state.
pub const STATE_VERSION: u32 = 1;

/// Logical drawing-surface dimensions at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// The editable document of one session.
#[derive(Debug, Clone)]
pub struct EditorState {
    /// Untouched source image.
    pub original_image_ref: String,
    /// Image after all baked transforms.
    pub current_image_ref: String,
    pub note_text: String,
    pub annotations: AnnotationLayer,
    pub canvas_size: CanvasSize,
}

impl EditorState {
    /// Start a document over a freshly imported image.
    pub fn new(image_ref: impl Into<String>, canvas_size: CanvasSize) -> Self {
        let image_ref = image_ref.into();
        Self {
            original_image_ref: image_ref.clone(),
            current_image_ref: image_ref,
            note_text: String::new(),
            annotations: AnnotationLayer::new(),
            canvas_size,
        }
    }

    /// Committed strokes in paint order.
    pub fn strokes(&self) -> &[Stroke] {
        self.annotations.strokes()
    }

    /// Serialize to the persisted JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let document = StateDocument {
            version: STATE_VERSION,
            original_uri: &self.original_image_ref,
            current_uri: &self.current_image_ref,
            note_text: &self.note_text,
            strokes: self.strokes().iter().map(StrokeRecord::from_stroke).collect(),
            canvas: self.canvas_size,
        };
        serde_json::to_string(&document)
    }

    /// Parse the persisted JSON form.
    ///
    /// Fails with [`EngineError::CorruptState`] if the blob is not a JSON
    /// object or lacks the image references. Malformed strokes are dropped.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let document: LoadedDocument = serde_json::from_str(json)
            .map_err(|e| EngineError::CorruptState(e.to_string()))?;

        let version: Option<u32> = optional_field("version", document.version);
        if let Some(version) = version.filter(|v| *v > STATE_VERSION) {
            log::debug!("Loading state version {version} with a version {STATE_VERSION} reader");
        }

        let raw_strokes = match document.strokes {
            Some(serde_json::Value::Array(strokes)) => strokes,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(other) => {
                log::warn!("Ignoring non-array strokes field: {other}");
                Vec::new()
            }
        };
        let total = raw_strokes.len();
        let strokes: Vec<Stroke> = raw_strokes
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| {
                let stroke = StrokeRecord::decode(value);
                if stroke.is_none() {
                    log::warn!("Dropping malformed stroke at index {index}");
                }
                stroke
            })
            .collect();
        if strokes.len() != total {
            log::warn!("Loaded {} of {} stroke(s)", strokes.len(), total);
        }

        Ok(Self {
            original_image_ref: document.original_uri,
            current_image_ref: document.current_uri,
            note_text: optional_field("noteText", document.note_text).unwrap_or_default(),
            annotations: AnnotationLayer::with_strokes(strokes),
            canvas_size: optional_field("canvas", document.canvas).unwrap_or_default(),
        })
    }
}

/// Decode an optional field, treating a malformed value like a missing one.
fn optional_field<T: DeserializeOwned>(
    name: &str,
    value: Option<serde_json::Value>,
) -> Option<T> {
    match serde_json::from_value(value?) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Ignoring malformed {name} field: {e}");
            None
        }
    }
}

/// Serialize `state` into its persisted blob.
pub fn serialize(state: &EditorState) -> EngineResult<String> {
    state
        .to_json()
        .map_err(|e| EngineError::CorruptState(format!("Failed to serialize state: {e}")))
}

/// Restore an [`EditorState`] from its persisted blob.
pub fn deserialize(blob: &str) -> EngineResult<EditorState> {
    EditorState::from_json(blob)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateDocument<'a> {
    version: u32,
    original_uri: &'a str,
    current_uri: &'a str,
    note_text: &'a str,
    strokes: Vec<StrokeRecord>,
    canvas: CanvasSize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadedDocument {
    #[serde(default)]
    version: Option<serde_json::Value>,
    original_uri: String,
    current_uri: String,
    #[serde(default)]
    note_text: Option<serde_json::Value>,
    #[serde(default)]
    strokes: Option<serde_json::Value>,
    #[serde(default)]
    canvas: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrokeRecord {
    path_svg: String,
    color: String,
    width: f64,
}

impl StrokeRecord {
    fn from_stroke(stroke: &Stroke) -> Self {
        Self {
            path_svg: path_codec::encode(stroke.points()),
            color: stroke.color().to_hex(),
            width: stroke.width(),
        }
    }

    fn decode(value: serde_json::Value) -> Option<Stroke> {
        let record: StrokeRecord = serde_json::from_value(value).ok()?;
        let points = path_codec::decode(&record.path_svg)?;
        let color = StrokeColor::parse_hex(&record.color)?;
        Stroke::new(points, color, record.width)
    }
}

/// Canvas renderer collaborator.
///
/// Rasterizes the base image plus committed strokes into encoded preview
/// bytes. Implementations report failures as [`EngineError::RenderFailure`].
pub trait CanvasRenderer: Send + Sync {
    fn render<'a>(&'a self, state: &'a EditorState) -> BoxFuture<'a, EngineResult<Vec<u8>>>;
}

/// Rasterize the current canvas into a flat preview image.
pub async fn capture_snapshot(
    state: &EditorState,
    renderer: &dyn CanvasRenderer,
) -> EngineResult<Vec<u8>> {
    let bytes = renderer.render(state).await?;
    if bytes.is_empty() {
        return Err(EngineError::RenderFailure(
            "Renderer produced an empty preview".to_string(),
        ));
    }
    Ok(bytes)
}
