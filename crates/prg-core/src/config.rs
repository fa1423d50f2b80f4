//! Stage tunables, injected into a `Project` at construction.
//!
//! The host owns persistence of these values (its own key-value store);
//! `StageConfig::from_json` accepts whatever fragment it exports, filling
//! missing keys with defaults.

use crate::geometry::Size;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settings that may change while a document is open. Changing them queues
/// a `StageEvent::RenderTogglesChanged` for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderToggles {
    pub show_grid: bool,
    pub show_edge_labels: bool,
    /// Draw collision boxes on top of the stage.
    pub show_debug: bool,
}

impl Default for RenderToggles {
    fn default() -> Self {
        Self {
            show_grid: true,
            show_edge_labels: true,
            show_debug: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StageConfig {
    /// Inner padding between a node's text and its border.
    pub node_padding: f64,
    /// Font size used for node and section titles.
    pub font_size: f64,
    /// Gap between a section border and the bounding box of its children.
    pub section_margin: f64,
    /// Height of the title band above a section's content.
    pub section_title_height: f64,
    /// Size of a section with no children.
    #[serde(with = "crate::geometry::size_tuple")]
    pub section_min_size: Size,
    /// Gap between an object's bounds and its selection outline.
    pub selection_outline_padding: f64,
    /// Push overlapping entities apart after a move.
    pub enable_entity_collision: bool,
    /// World-space distance under which a right-button release counts as a
    /// click rather than a drag.
    pub context_menu_tolerance: f64,
    /// Default padding around members of a multi-target edge hull.
    pub multi_edge_padding: f64,
    /// Maximum number of undo steps kept in memory.
    pub undo_depth: usize,
    pub render_toggles: RenderToggles,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            node_padding: 14.0,
            font_size: 32.0,
            section_margin: 30.0,
            section_title_height: 50.0,
            section_min_size: Size::new(100.0, 100.0),
            selection_outline_padding: 8.0,
            enable_entity_collision: false,
            context_menu_tolerance: 5.0,
            multi_edge_padding: 10.0,
            undo_depth: 100,
            render_toggles: RenderToggles::default(),
        }
    }
}

impl StageConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ─── Text measurement ────────────────────────────────────────────────────

/// Text layout is owned by the renderer; the core only needs sizes.
pub trait TextMeasure: fmt::Debug {
    fn measure(&self, text: &str, font_size: f64) -> Size;
}

/// Fixed-advance approximation: ASCII glyphs are half an em wide, everything
/// else a full em. Lines are 1.5 em tall.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonospaceMeasure;

pub const LINE_HEIGHT: f64 = 1.5;

impl TextMeasure for MonospaceMeasure {
    fn measure(&self, text: &str, font_size: f64) -> Size {
        let mut lines = 0usize;
        let mut widest = 0.0f64;
        for line in text.split('\n') {
            lines += 1;
            let ems: f64 = line
                .chars()
                .map(|c| if c.is_ascii() { 0.5 } else { 1.0 })
                .sum();
            widest = widest.max(ems * font_size);
        }
        Size::new(widest, lines as f64 * font_size * LINE_HEIGHT)
    }
}
