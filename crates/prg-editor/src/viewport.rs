//! World ↔ screen conversion.
//!
//! The interaction state machine only needs `to_world` to be consistent for
//! the duration of one gesture; hosts with their own camera implement
//! `Viewport` directly.

use prg_core::{Point, Vec2};

pub trait Viewport {
    fn to_world(&self, screen: Point) -> Point;

    fn to_screen(&self, world: Point) -> Point;
}

pub const MIN_SCALE: f64 = 0.05;
pub const MAX_SCALE: f64 = 50.0;

/// Pan/zoom camera. `location` is the world point shown at the screen
/// origin; `scale` is screen pixels per world unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub location: Point,
    pub scale: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            location: Point::ZERO,
            scale: 1.0,
        }
    }
}

impl Camera {
    /// Pan by a screen-space delta.
    pub fn pan(&mut self, screen_delta: Vec2) {
        self.location -= screen_delta / self.scale;
    }

    /// Zoom by `factor`, keeping the world point under `anchor` fixed.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        let world = self.to_world(anchor);
        self.scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        self.location = world - anchor.to_vec2() / self.scale;
    }
}

impl Viewport for Camera {
    fn to_world(&self, screen: Point) -> Point {
        self.location + screen.to_vec2() / self.scale
    }

    fn to_screen(&self, world: Point) -> Point {
        ((world - self.location) * self.scale).to_point()
    }
}
