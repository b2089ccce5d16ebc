//! Pointer gesture events delivered by the input source.
//!
//! The source guarantees ordered delivery of `{begin, move*, end}` for one
//! active pointer at a time; events are applied in arrival order.

use crate::annotation::{AnnotationError, AnnotationLayer};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// A single pointer event of a drawing gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GestureEvent {
    Begin(Point),
    Move(Point),
    /// Pointer released; the release position is not always reported.
    End(Option<Point>),
}

/// What applying one event did to the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEffect {
    Started,
    Extended,
    Committed,
    /// Late or duplicate input with no active stroke.
    Ignored,
}

/// Apply one gesture event to `layer`.
pub fn apply_gesture(
    layer: &mut AnnotationLayer,
    event: GestureEvent,
) -> Result<GestureEffect, AnnotationError> {
    match event {
        GestureEvent::Begin(point) => {
            layer.begin_stroke(point)?;
            Ok(GestureEffect::Started)
        }
        GestureEvent::Move(point) => Ok(if layer.extend_stroke(point) {
            GestureEffect::Extended
        } else {
            GestureEffect::Ignored
        }),
        GestureEvent::End(point) => {
            if !layer.is_drawing() {
                return Ok(GestureEffect::Ignored);
            }
            if let Some(point) = point {
                layer.extend_stroke(point);
            }
            Ok(match layer.commit_stroke() {
                Some(_) => GestureEffect::Committed,
                None => GestureEffect::Ignored,
            })
        }
    }
}

/// Apply a whole ordered event sequence, stopping at the first error.
pub fn apply_gestures<I>(layer: &mut AnnotationLayer, events: I) -> Result<(), AnnotationError>
where
    I: IntoIterator<Item = GestureEvent>,
{
    for event in events {
        apply_gesture(layer, event)?;
    }
    Ok(())
}
