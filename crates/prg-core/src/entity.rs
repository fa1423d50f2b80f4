//! Entities: independently placeable stage objects.
//!
//! Every entity owns its rectangle (`location` + `size`) and a free-form
//! `details` rich-text fragment. Sections live in `section.rs`; the rest of
//! the concrete entity kinds are defined here.

use crate::collision::CollisionBox;
use crate::config::{StageConfig, TextMeasure};
use crate::geometry::{Color, Point, Rect, Size, Vec2, point_tuple, size_tuple};
use crate::id::{AttachmentId, StageId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rich-text document fragment. Opaque to the core.
pub type Details = Vec<Value>;

/// Shared behaviour of everything an association can point at.
pub trait Entity {
    fn uuid(&self) -> StageId;

    /// Current bounding rectangle in world coordinates.
    fn rect(&self) -> Rect;

    fn collision_box(&self) -> CollisionBox {
        CollisionBox::from_rect(self.rect())
    }

    /// Translate without any propagation. Callers go through
    /// `Project::move_entity` to keep sections and associations in sync.
    fn translate(&mut self, delta: Vec2);

    fn details(&self) -> &Details;

    fn details_mut(&mut self) -> &mut Details;

    fn allow_association(&self) -> bool {
        true
    }

    /// Whether a non-canonical edge rate on this entity is used verbatim as
    /// the endpoint instead of being projected onto the border.
    fn honors_precise_rate(&self) -> bool {
        false
    }
}

// ─── Text ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SizeAdjust {
    /// Size follows the text.
    #[default]
    Auto,
    /// Width fixed by the user; height still grows with the text.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub uuid: StageId,
    pub text: String,
    #[serde(default)]
    pub details: Details,
    #[serde(with = "point_tuple")]
    pub location: Point,
    #[serde(with = "size_tuple")]
    pub size: Size,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub size_adjust: SizeAdjust,
    #[serde(skip)]
    pub selected: bool,
}

impl TextNode {
    pub fn new(text: impl Into<String>, location: Point) -> Self {
        Self {
            uuid: StageId::new(),
            text: text.into(),
            details: Vec::new(),
            location,
            size: Size::ZERO,
            color: Color::TRANSPARENT,
            size_adjust: SizeAdjust::Auto,
            selected: false,
        }
    }

    /// Manually sized node; the size is kept as given.
    pub fn with_rect(text: impl Into<String>, rect: Rect) -> Self {
        Self {
            size: rect.size(),
            size_adjust: SizeAdjust::Manual,
            ..Self::new(text, rect.origin())
        }
    }

    /// Recompute `size` from the text.
    pub fn adjust_size(&mut self, measure: &dyn TextMeasure, config: &StageConfig) {
        let text = measure.measure(&self.text, config.font_size);
        let pad = 2.0 * config.node_padding;
        match self.size_adjust {
            SizeAdjust::Auto => self.size = Size::new(text.width + pad, text.height + pad),
            SizeAdjust::Manual => self.size.height = self.size.height.max(text.height + pad),
        }
    }
}

impl Entity for TextNode {
    fn uuid(&self) -> StageId {
        self.uuid
    }

    fn rect(&self) -> Rect {
        Rect::from_origin_size(self.location, self.size)
    }

    fn translate(&mut self, delta: Vec2) {
        self.location += delta;
    }

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }
}

// ─── Connect point ───────────────────────────────────────────────────────

/// A bare junction used to route edges through empty space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPoint {
    pub uuid: StageId,
    /// Center of the point.
    #[serde(with = "point_tuple")]
    pub location: Point,
    #[serde(default)]
    pub details: Details,
    #[serde(skip)]
    pub selected: bool,
}

impl ConnectPoint {
    pub const RADIUS: f64 = 10.0;

    pub fn new(location: Point) -> Self {
        Self {
            uuid: StageId::new(),
            location,
            details: Vec::new(),
            selected: false,
        }
    }
}

impl Entity for ConnectPoint {
    fn uuid(&self) -> StageId {
        self.uuid
    }

    fn rect(&self) -> Rect {
        Rect::from_center_size(self.location, Size::new(2.0 * Self::RADIUS, 2.0 * Self::RADIUS))
    }

    fn translate(&mut self, delta: Vec2) {
        self.location += delta;
    }

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }
}

// ─── Textures ────────────────────────────────────────────────────────────
//
// Image, SVG and reference-block nodes draw a stored attachment at
// `size * scale`. `size` is the natural size of the payload.

pub const MIN_TEXTURE_SCALE: f64 = 0.1;
pub const MAX_TEXTURE_SCALE: f64 = 10.0;

fn default_scale() -> f64 {
    1.0
}

fn scaled_rect(location: Point, size: Size, scale: f64) -> Rect {
    Rect::from_origin_size(location, size * scale)
}

/// Nodes that render an attachment.
pub trait Texture: Entity {
    fn attachment_id(&self) -> AttachmentId;

    fn set_attachment_id(&mut self, id: AttachmentId);

    fn scale(&self) -> f64;

    fn set_scale_raw(&mut self, scale: f64);

    /// Adjust the scale by `diff`, clamped to the supported range.
    fn scale_by(&mut self, diff: f64) {
        let next = (self.scale() + diff).clamp(MIN_TEXTURE_SCALE, MAX_TEXTURE_SCALE);
        self.set_scale_raw(next);
    }
}

macro_rules! texture_entity {
    ($ty:ty, precise = $precise:expr) => {
        impl Entity for $ty {
            fn uuid(&self) -> StageId {
                self.uuid
            }

            fn rect(&self) -> Rect {
                scaled_rect(self.location, self.size, self.scale)
            }

            fn translate(&mut self, delta: Vec2) {
                self.location += delta;
            }

            fn details(&self) -> &Details {
                &self.details
            }

            fn details_mut(&mut self) -> &mut Details {
                &mut self.details
            }

            fn honors_precise_rate(&self) -> bool {
                $precise
            }
        }

        impl Texture for $ty {
            fn attachment_id(&self) -> AttachmentId {
                self.attachment_id
            }

            fn set_attachment_id(&mut self, id: AttachmentId) {
                self.attachment_id = id;
            }

            fn scale(&self) -> f64 {
                self.scale
            }

            fn set_scale_raw(&mut self, scale: f64) {
                self.scale = scale;
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageNode {
    pub uuid: StageId,
    pub attachment_id: AttachmentId,
    #[serde(default)]
    pub details: Details,
    #[serde(with = "point_tuple")]
    pub location: Point,
    #[serde(with = "size_tuple")]
    pub size: Size,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(skip)]
    pub selected: bool,
}

impl ImageNode {
    pub fn new(attachment_id: AttachmentId, location: Point, size: Size) -> Self {
        Self {
            uuid: StageId::new(),
            attachment_id,
            details: Vec::new(),
            location,
            size,
            scale: 1.0,
            selected: false,
        }
    }
}

texture_entity!(ImageNode, precise = true);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvgNode {
    pub uuid: StageId,
    pub attachment_id: AttachmentId,
    #[serde(default)]
    pub details: Details,
    #[serde(with = "point_tuple")]
    pub location: Point,
    #[serde(with = "size_tuple")]
    pub size: Size,
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Replaces `currentColor` in the SVG source when not transparent.
    #[serde(default)]
    pub color: Color,
    #[serde(skip)]
    pub selected: bool,
}

impl SvgNode {
    pub fn new(attachment_id: AttachmentId, location: Point, size: Size) -> Self {
        Self {
            uuid: StageId::new(),
            attachment_id,
            details: Vec::new(),
            location,
            size,
            scale: 1.0,
            color: Color::TRANSPARENT,
            selected: false,
        }
    }
}

texture_entity!(SvgNode, precise = false);

/// Snapshot of a section (or a whole document) in another file.
/// `section_name` is empty when the whole file is referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceBlockNode {
    pub uuid: StageId,
    pub file_name: String,
    #[serde(default)]
    pub section_name: String,
    /// Rendered screenshot of the referenced content.
    pub attachment_id: AttachmentId,
    #[serde(default)]
    pub details: Details,
    #[serde(with = "point_tuple")]
    pub location: Point,
    #[serde(with = "size_tuple")]
    pub size: Size,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(skip)]
    pub selected: bool,
}

impl ReferenceBlockNode {
    pub fn new(
        file_name: impl Into<String>,
        section_name: impl Into<String>,
        attachment_id: AttachmentId,
        location: Point,
        size: Size,
    ) -> Self {
        Self {
            uuid: StageId::new(),
            file_name: file_name.into(),
            section_name: section_name.into(),
            attachment_id,
            details: Vec::new(),
            location,
            size,
            scale: 1.0,
            selected: false,
        }
    }

    /// Whether this block embeds a single section rather than a whole file.
    pub fn is_section_reference(&self) -> bool {
        !self.section_name.is_empty()
    }
}

texture_entity!(ReferenceBlockNode, precise = true);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonospaceMeasure;

    #[test]
    fn auto_text_node_fits_text() {
        let cfg = StageConfig::default();
        let mut node = TextNode::new("abcd", Point::new(10.0, 20.0));
        node.adjust_size(&MonospaceMeasure, &cfg);
        // 4 ascii glyphs at half an em, one line at 1.5 em, plus padding.
        assert_eq!(node.size, Size::new(64.0 + 28.0, 48.0 + 28.0));
        assert_eq!(node.rect().origin(), Point::new(10.0, 20.0));
    }

    #[test]
    fn manual_text_node_keeps_width() {
        let cfg = StageConfig::default();
        let mut node = TextNode::with_rect("a", Rect::new(0.0, 0.0, 300.0, 10.0));
        node.adjust_size(&MonospaceMeasure, &cfg);
        assert_eq!(node.size.width, 300.0);
        assert_eq!(node.size.height, 48.0 + 28.0);
    }

    #[test]
    fn texture_scale_is_clamped() {
        let mut img = ImageNode::new(AttachmentId::new(), Point::ZERO, Size::new(100.0, 50.0));
        img.scale_by(-5.0);
        assert_eq!(img.scale, MIN_TEXTURE_SCALE);
        img.scale_by(100.0);
        assert_eq!(img.scale, MAX_TEXTURE_SCALE);
        img.set_scale_raw(2.0);
        assert_eq!(img.rect(), Rect::new(0.0, 0.0, 200.0, 100.0));
    }

    #[test]
    fn connect_point_rect_is_centered() {
        let p = ConnectPoint::new(Point::new(50.0, 50.0));
        assert_eq!(p.rect(), Rect::new(40.0, 40.0, 60.0, 60.0));
        assert!(!p.honors_precise_rate());
    }
}
