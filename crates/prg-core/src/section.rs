//! Sections: titled containers grouping other entities.
//!
//! A section's rectangle is derived. Expanded, it wraps the children's
//! bounding box plus a margin, with a title band on top. Collapsed, it
//! shrinks to the title and stays centered on the expanded rectangle.
//! `children` (ids) is the canonical membership; the project resolves it.

use crate::collision::{CollisionBox, Shape};
use crate::config::{StageConfig, TextMeasure};
use crate::entity::{Details, Entity};
use crate::geometry::{
    Color, Point, Rect, Size, Vec2, bounding_rect, point_tuple, rect_edges, size_tuple,
};
use crate::id::StageId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub uuid: StageId,
    pub text: String,
    #[serde(default)]
    pub details: Details,
    #[serde(default)]
    pub color: Color,
    /// Top-left of the expanded rectangle.
    #[serde(with = "point_tuple")]
    pub location: Point,
    /// Size of the expanded rectangle.
    #[serde(with = "size_tuple")]
    pub size: Size,
    #[serde(default)]
    pub children: Vec<StageId>,
    #[serde(default)]
    pub is_collapsed: bool,
    /// Content is hidden from rendering while the frame stays visible.
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(skip)]
    pub collapsed_size: Size,
    #[serde(skip)]
    pub title_band: f64,
    #[serde(skip)]
    pub selected: bool,
}

impl Section {
    pub fn new(title: impl Into<String>, location: Point) -> Self {
        Self {
            uuid: StageId::new(),
            text: title.into(),
            details: Vec::new(),
            color: Color::TRANSPARENT,
            location,
            size: Size::ZERO,
            children: Vec::new(),
            is_collapsed: false,
            is_hidden: false,
            collapsed_size: Size::ZERO,
            title_band: 0.0,
            selected: false,
        }
    }

    /// Group `children` under a new section. The rectangle is filled in by
    /// `adjust_location_and_size`.
    pub fn from_entities(title: impl Into<String>, children: Vec<StageId>) -> Self {
        Self {
            children,
            ..Self::new(title, Point::ZERO)
        }
    }

    pub fn normal_rect(&self) -> Rect {
        Rect::from_origin_size(self.location, self.size)
    }

    /// Title-sized rect centered on the expanded rectangle.
    pub fn collapsed_rect(&self) -> Rect {
        Rect::from_center_size(self.normal_rect().center(), self.collapsed_size)
    }

    /// Four border lines plus the title bar. The content area is not hittable
    /// so clicks fall through to the children.
    pub fn collision_box_normal(&self) -> CollisionBox {
        let rect = self.normal_rect();
        let mut shapes: Vec<Shape> = rect_edges(rect).into_iter().map(Shape::Line).collect();
        shapes.push(Shape::Rect(Rect::from_origin_size(
            self.location,
            Size::new(self.size.width, self.title_band),
        )));
        CollisionBox::new(shapes)
    }

    pub fn collision_box_when_collapsed(&self) -> CollisionBox {
        CollisionBox::from_rect(self.collapsed_rect())
    }

    pub fn has_child(&self, id: StageId) -> bool {
        self.children.contains(&id)
    }

    /// Recompute the expanded rectangle from the children's current rects.
    pub fn adjust_location_and_size(
        &mut self,
        child_rects: &[Rect],
        measure: &dyn TextMeasure,
        config: &StageConfig,
    ) {
        let title = measure.measure(&self.text, config.font_size);
        let pad = 2.0 * config.node_padding;
        let min_width = title.width + pad;
        self.collapsed_size = Size::new(title.width + pad, title.height + pad);
        self.title_band = config.section_title_height;

        match bounding_rect(child_rects.iter().copied()) {
            None => {
                self.size = Size::new(
                    min_width.max(config.section_min_size.width),
                    config.section_min_size.height,
                );
            }
            Some(content) => {
                let m = config.section_margin;
                let framed = content.inflate(m, m);
                self.location = Point::new(framed.x0, framed.y0 - config.section_title_height);
                self.size = Size::new(
                    framed.width().max(min_width),
                    framed.height() + config.section_title_height,
                );
            }
        }
        log::trace!("section {} resized to {:?}", self.uuid, self.normal_rect());
    }
}

impl Entity for Section {
    fn uuid(&self) -> StageId {
        self.uuid
    }

    fn rect(&self) -> Rect {
        if self.is_collapsed {
            self.collapsed_rect()
        } else {
            self.normal_rect()
        }
    }

    fn collision_box(&self) -> CollisionBox {
        if self.is_collapsed {
            self.collision_box_when_collapsed()
        } else {
            self.collision_box_normal()
        }
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
