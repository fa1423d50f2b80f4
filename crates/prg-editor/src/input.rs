//! Input abstraction layer.
//!
//! Pointer events from the host, in screen coordinates, normalized into a
//! single `InputEvent` enum consumed by the interaction state machine.

use prg_core::{Point, StageId};

/// Which pointer button triggered a press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Pointer pressed over the canvas.
    PointerDown { x: f64, y: f64, button: PointerButton },

    PointerMove { x: f64, y: f64 },

    /// Pointer released over the canvas.
    PointerUp { x: f64, y: f64 },

    /// Pointer released outside the canvas (window edge, other widget).
    PointerUpOutside,

    /// The pointer crossed into a stage object.
    PointerEnter { target: StageId },
}

impl InputEvent {
    pub fn pointer_down(x: f64, y: f64, button: PointerButton) -> Self {
        Self::PointerDown { x, y, button }
    }

    pub fn pointer_move(x: f64, y: f64) -> Self {
        Self::PointerMove { x, y }
    }

    pub fn pointer_up(x: f64, y: f64) -> Self {
        Self::PointerUp { x, y }
    }

    /// Screen position, if this event carries one.
    pub fn position(&self) -> Option<Point> {
        match self {
            Self::PointerDown { x, y, .. } | Self::PointerMove { x, y } | Self::PointerUp { x, y } => {
                Some(Point::new(*x, *y))
            }
            Self::PointerUpOutside | Self::PointerEnter { .. } => None,
        }
    }
}
