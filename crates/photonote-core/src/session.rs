//! Edit session: one open document plus its tool mode, pending transform and
//! the record it is bound to.

use crate::annotation::{Brush, Stroke, StrokeColor};
use crate::document::{self, CanvasRenderer, CanvasSize, EditorState};
use crate::error::{EngineError, EngineResult};
use crate::input::{self, GestureEffect, GestureEvent};
use crate::storage::{
    BoxFuture, PreviewStore, PreviewUpdate, SessionCatalog, SessionId, SessionRecord,
    SessionStorage, validate_name,
};
use crate::tools::{ToolMode, ToolTransition};
use crate::transform::{self, BakedImage, ImageTransformer, PendingTransform};
use futures_util::future::{FutureExt, Shared};
use futures_util::lock::{Mutex, MutexGuard, OwnedMutexGuard};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

/// What happened to the pending transform when it was resolved.
#[derive(Debug, Clone)]
pub enum TransformOutcome {
    /// Nothing to apply, or the gesture was an identity.
    Skipped,
    Applied(BakedImage),
    /// The transformer failed; the document is unchanged.
    Failed(EngineError),
}

impl TransformOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransformOutcome::Applied(_))
    }
}

/// Result of selecting a tool.
#[derive(Debug, Clone)]
pub struct ToolChange {
    pub transition: ToolTransition,
    pub transform: TransformOutcome,
}

/// A single open editing session.
#[derive(Debug, Clone)]
pub struct EditSession {
    state: EditorState,
    mode: ToolMode,
    pending: Option<PendingTransform>,
    record_id: Option<SessionId>,
    name: Option<String>,
}

impl EditSession {
    /// Start an unsaved session over a freshly imported image.
    pub fn new(image_ref: impl Into<String>, canvas_size: CanvasSize) -> Self {
        Self::from_state(EditorState::new(image_ref, canvas_size))
    }

    /// Wrap an existing document in an unsaved session.
    pub fn from_state(state: EditorState) -> Self {
        Self {
            state,
            mode: ToolMode::default(),
            pending: None,
            record_id: None,
            name: None,
        }
    }

    /// Reopen a persisted session; later saves update the same record.
    pub fn from_record(record: &SessionRecord) -> EngineResult<Self> {
        let state = document::deserialize(&record.state_json)?;
        log::debug!(
            "Opened session {} with {} stroke(s)",
            record.id,
            state.strokes().len()
        );
        Ok(Self {
            record_id: Some(record.id),
            name: Some(record.name.clone()),
            ..Self::from_state(state)
        })
    }

    /// Load session `id` from `catalog`, or `None` if it does not exist.
    pub async fn load<S: SessionStorage, P: PreviewStore>(
        catalog: &SessionCatalog<S, P>,
        id: SessionId,
    ) -> EngineResult<Option<Self>> {
        match catalog.get(id).await? {
            Some(record) => Self::from_record(&record).map(Some),
            None => Ok(None),
        }
    }

    pub fn with_brush(mut self, brush: Brush) -> EngineResult<Self> {
        self.state.annotations.set_brush(brush)?;
        Ok(self)
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    pub fn pending(&self) -> Option<&PendingTransform> {
        self.pending.as_ref()
    }

    /// Id of the record this session saves into, once saved.
    pub fn record_id(&self) -> Option<SessionId> {
        self.record_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Record the crop tool's current gesture.
    ///
    /// Returns false and ignores the report outside the crop tool.
    pub fn report_crop(&mut self, pending: PendingTransform) -> bool {
        if self.mode != ToolMode::Crop {
            log::debug!("Ignoring crop report in {:?} mode", self.mode);
            return false;
        }
        self.pending = Some(pending);
        true
    }

    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    /// Route a pointer event to the annotation layer. Only the draw tool
    /// accepts strokes; other modes ignore pointer input.
    pub fn handle_gesture(&mut self, event: GestureEvent) -> EngineResult<GestureEffect> {
        if !self.mode.accepts_strokes() {
            return Ok(GestureEffect::Ignored);
        }
        Ok(input::apply_gesture(&mut self.state.annotations, event)?)
    }

    /// Set the brush color used for the next committed stroke.
    pub fn pick_color(&mut self, color: StrokeColor) {
        self.state.annotations.set_color(color);
    }

    pub fn set_stroke_width(&mut self, width: f64) -> EngineResult<()> {
        Ok(self.state.annotations.set_width(width)?)
    }

    pub fn set_note(&mut self, text: impl Into<String>) {
        self.state.note_text = text.into();
    }

    pub fn undo(&mut self) -> Option<Stroke> {
        self.state.annotations.undo()
    }

    pub fn clear_annotations(&mut self) {
        self.state.annotations.clear();
    }

    /// Bake the pending transform into a new base image.
    ///
    /// The document is only touched after the transformer resolves. On
    /// success the image reference and canvas size follow the baked image
    /// and all strokes are dropped, since their coordinates no longer match.
    pub async fn apply_pending_transform(
        &mut self,
        transformer: &dyn ImageTransformer,
    ) -> TransformOutcome {
        let Some(pending) = self.pending.clone() else {
            return TransformOutcome::Skipped;
        };
        if pending.is_identity() {
            log::debug!("Skipping identity transform");
            self.pending = None;
            return TransformOutcome::Skipped;
        }

        let result = transform::bake(transformer, &self.state.current_image_ref, &pending).await;
        self.pending = None;
        match result {
            Ok(baked) => {
                log::info!(
                    "Baked transform into {} ({}x{})",
                    baked.image_ref,
                    baked.size.width,
                    baked.size.height
                );
                self.state.current_image_ref = baked.image_ref.clone();
                self.state.canvas_size =
                    CanvasSize::new(baked.size.width as f64, baked.size.height as f64);
                self.state.annotations.clear();
                TransformOutcome::Applied(baked)
            }
            Err(e) => {
                log::warn!("Transform failed, keeping current image: {}", e);
                TransformOutcome::Failed(e)
            }
        }
    }

    /// Select a tool. Leaving the crop tool commits the pending transform
    /// first; the new mode is set once that resolves, whatever the outcome.
    pub async fn select_tool(
        &mut self,
        requested: ToolMode,
        transformer: &dyn ImageTransformer,
    ) -> ToolChange {
        let transition = ToolTransition::resolve(self.mode, requested);
        let transform = if transition.commit_crop {
            self.apply_pending_transform(transformer).await
        } else {
            TransformOutcome::Skipped
        };

        if self.state.annotations.is_drawing() && !transition.to.accepts_strokes() {
            self.state.annotations.cancel_stroke();
        }
        log::debug!("Tool {:?} -> {:?}", transition.from, transition.to);
        self.mode = transition.to;

        ToolChange {
            transition,
            transform,
        }
    }

    /// Persist the session.
    ///
    /// Resolves any pending transform, renders a preview, stores it, then
    /// creates the record (unsaved sessions need `name`) or updates the bound
    /// one. A given `name` renames an already-saved session in the same
    /// write. If the record write fails the freshly stored preview is
    /// discarded.
    pub async fn save<S: SessionStorage, P: PreviewStore>(
        &mut self,
        name: Option<&str>,
        transformer: &dyn ImageTransformer,
        renderer: &dyn CanvasRenderer,
        catalog: &SessionCatalog<S, P>,
    ) -> EngineResult<SessionId> {
        let name = match (name, self.record_id) {
            (Some(name), _) => Some(validate_name(name)?),
            (None, Some(_)) => None,
            (None, None) => {
                return Err(EngineError::Validation(
                    "A new session needs a name".to_string(),
                ));
            }
        };

        if let TransformOutcome::Failed(e) = self.apply_pending_transform(transformer).await {
            log::warn!("Saving without the pending transform: {}", e);
        }

        let bytes = document::capture_snapshot(&self.state, renderer).await?;
        let preview = catalog.store_preview(&bytes).await?;
        let replace = PreviewUpdate::Replace(preview.clone());

        let renamed = name
            .as_deref()
            .filter(|name| self.name.as_deref() != Some(*name));
        let written = match (self.record_id, renamed) {
            (Some(id), Some(name)) => catalog
                .update_and_rename(id, name, &self.state, replace)
                .await
                .map(|_| id),
            (Some(id), None) => catalog.update(id, &self.state, replace).await.map(|_| id),
            (None, _) => {
                let name = name.as_deref().unwrap_or_default();
                catalog
                    .create(name, &self.state, Some(preview.clone()))
                    .await
            }
        };
        let id = match written {
            Ok(id) => id,
            Err(e) => {
                catalog.discard_preview(&preview).await;
                return Err(e);
            }
        };

        if name.is_some() {
            self.name = name;
        }
        self.record_id = Some(id);
        Ok(id)
    }
}

/// An issued operation with its output erased, so any caller can drive it.
type Operation = Shared<BoxFuture<'static, ()>>;

/// Cloneable handle to one session shared between input and I/O tasks.
///
/// Stroke input and transform-starting commands fail with
/// [`EngineError::Busy`] while another operation holds the session;
/// [`SharedSession::save`] waits for it instead.
///
/// A transform or save runs to completion once issued. Dropping its future
/// only means the result goes unobserved: the next [`save`](Self::save),
/// [`snapshot`](Self::snapshot) or [`settle`](Self::settle) finishes the
/// operation before doing anything else.
#[derive(Clone)]
pub struct SharedSession {
    session: Arc<Mutex<EditSession>>,
    in_flight: Arc<StdMutex<Option<Operation>>>,
}

impl SharedSession {
    pub fn new(session: EditSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            in_flight: Arc::new(StdMutex::new(None)),
        }
    }

    fn try_session(&self) -> EngineResult<MutexGuard<'_, EditSession>> {
        self.session.try_lock().ok_or(EngineError::Busy)
    }

    fn try_claim(&self) -> EngineResult<OwnedMutexGuard<EditSession>> {
        self.session.try_lock_owned().ok_or(EngineError::Busy)
    }

    /// The issued operation, unless it has already finished.
    fn in_flight(&self) -> Option<Operation> {
        let mut slot = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|op| op.peek().is_some()) {
            *slot = None;
        }
        slot.clone()
    }

    /// Record `op` as in flight and hand back a handle to its result.
    fn issue<T, F>(&self, op: F) -> Shared<BoxFuture<'static, T>>
    where
        T: Clone + 'static,
        F: Future<Output = T> + 'static,
    {
        let op: BoxFuture<'static, T> = Box::pin(op);
        let op = op.shared();
        let erased: BoxFuture<'static, ()> = Box::pin(op.clone().map(|_| ()));
        *self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(erased.shared());
        op
    }

    /// Drive any issued transform or save to completion.
    pub async fn settle(&self) {
        while let Some(op) = self.in_flight() {
            op.await;
        }
    }

    /// Take the session once in-flight work has finished.
    async fn claim(&self) -> OwnedMutexGuard<EditSession> {
        loop {
            self.settle().await;
            if let Ok(session) = self.try_claim() {
                return session;
            }
            if self.in_flight().is_none() {
                // only a synchronous command holds it
                return self.session.clone().lock_owned().await;
            }
        }
    }

    pub fn handle_gesture(&self, event: GestureEvent) -> EngineResult<GestureEffect> {
        self.try_session()?.handle_gesture(event)
    }

    pub fn report_crop(&self, pending: PendingTransform) -> EngineResult<bool> {
        Ok(self.try_session()?.report_crop(pending))
    }

    pub fn pick_color(&self, color: StrokeColor) -> EngineResult<()> {
        self.try_session()?.pick_color(color);
        Ok(())
    }

    pub fn set_note(&self, text: impl Into<String>) -> EngineResult<()> {
        self.try_session()?.set_note(text);
        Ok(())
    }

    pub fn undo(&self) -> EngineResult<Option<Stroke>> {
        Ok(self.try_session()?.undo())
    }

    pub async fn select_tool(
        &self,
        requested: ToolMode,
        transformer: Arc<dyn ImageTransformer>,
    ) -> EngineResult<ToolChange> {
        let mut session = self.try_claim()?;
        let op = self.issue(async move {
            session.select_tool(requested, transformer.as_ref()).await
        });
        Ok(op.await)
    }

    pub async fn apply_pending_transform(
        &self,
        transformer: Arc<dyn ImageTransformer>,
    ) -> EngineResult<TransformOutcome> {
        let mut session = self.try_claim()?;
        let op = self.issue(async move {
            session
                .apply_pending_transform(transformer.as_ref())
                .await
        });
        Ok(op.await)
    }

    /// Save once any in-flight operation has finished.
    pub async fn save<S, P>(
        &self,
        name: Option<&str>,
        transformer: Arc<dyn ImageTransformer>,
        renderer: Arc<dyn CanvasRenderer>,
        catalog: Arc<SessionCatalog<S, P>>,
    ) -> EngineResult<SessionId>
    where
        S: SessionStorage + 'static,
        P: PreviewStore + 'static,
    {
        let name = name.map(str::to_owned);
        let mut session = self.claim().await;
        let op = self.issue(async move {
            session
                .save(
                    name.as_deref(),
                    transformer.as_ref(),
                    renderer.as_ref(),
                    catalog.as_ref(),
                )
                .await
        });
        op.await
    }

    /// Copy of the session once in-flight work has finished.
    pub async fn snapshot(&self) -> EditSession {
        let session = self.claim().await;
        EditSession::clone(&session)
    }
}
