//! Tool mode state machine.

use serde::{Deserialize, Serialize};

/// Mutually exclusive interaction modes of an edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolMode {
    None,
    /// New and loaded sessions open into the crop tool.
    #[default]
    Crop,
    Draw,
    ColorPick,
    Note,
}

impl ToolMode {
    /// Whether pointer input in this mode goes to the annotation layer.
    pub fn accepts_strokes(self) -> bool {
        self == ToolMode::Draw
    }
}

/// The resolved effect of selecting a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolTransition {
    pub from: ToolMode,
    pub to: ToolMode,
    /// The pending crop must be committed before `to` becomes visible.
    pub commit_crop: bool,
    /// Note text input must give up focus.
    pub release_note_focus: bool,
}

impl ToolTransition {
    /// Resolve what happens when `requested` is selected while in `current`.
    ///
    /// Re-selecting the active tool toggles back to [`ToolMode::None`].
    pub fn resolve(current: ToolMode, requested: ToolMode) -> Self {
        let to = if requested == current {
            ToolMode::None
        } else {
            requested
        };
        Self {
            from: current,
            to,
            commit_crop: current == ToolMode::Crop && to != ToolMode::Crop,
            release_note_focus: current == ToolMode::Note && to != ToolMode::Note,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}
