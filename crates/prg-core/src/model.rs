//! The closed set of stage-object kinds.
//!
//! `StageObject` is what the stage stores and what `stage.msgpack` encodes.
//! The `_` key carries the kind discriminator, followed by the kind's own
//! persisted fields. Derived geometry is `#[serde(skip)]` and rebuilt by the
//! owning project after decoding.

use crate::association::{Association, Endpoint, Member};
use crate::collision::CollisionBox;
use crate::edge::LineEdge;
use crate::entity::{ConnectPoint, Entity, ImageNode, ReferenceBlockNode, SvgNode, TextNode, Texture};
use crate::geometry::Rect;
use crate::id::{AttachmentId, StageId};
use crate::multi_edge::MultiTargetUndirectedEdge;
use crate::section::Section;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum StageObject {
    TextNode(TextNode),
    Section(Section),
    ImageNode(ImageNode),
    SvgNode(SvgNode),
    ReferenceBlockNode(ReferenceBlockNode),
    ConnectPoint(ConnectPoint),
    LineEdge(LineEdge),
    MultiTargetUndirectedEdge(MultiTargetUndirectedEdge),
}

impl StageObject {
    pub fn kind(&self) -> &'static str {
        match self {
            StageObject::TextNode(_) => "TextNode",
            StageObject::Section(_) => "Section",
            StageObject::ImageNode(_) => "ImageNode",
            StageObject::SvgNode(_) => "SvgNode",
            StageObject::ReferenceBlockNode(_) => "ReferenceBlockNode",
            StageObject::ConnectPoint(_) => "ConnectPoint",
            StageObject::LineEdge(_) => LineEdge::KIND,
            StageObject::MultiTargetUndirectedEdge(_) => MultiTargetUndirectedEdge::KIND,
        }
    }

    pub fn uuid(&self) -> StageId {
        match self {
            StageObject::TextNode(o) => o.uuid,
            StageObject::Section(o) => o.uuid,
            StageObject::ImageNode(o) => o.uuid,
            StageObject::SvgNode(o) => o.uuid,
            StageObject::ReferenceBlockNode(o) => o.uuid,
            StageObject::ConnectPoint(o) => o.uuid,
            StageObject::LineEdge(o) => o.uuid,
            StageObject::MultiTargetUndirectedEdge(o) => o.uuid,
        }
    }

    pub fn set_uuid(&mut self, id: StageId) {
        match self {
            StageObject::TextNode(o) => o.uuid = id,
            StageObject::Section(o) => o.uuid = id,
            StageObject::ImageNode(o) => o.uuid = id,
            StageObject::SvgNode(o) => o.uuid = id,
            StageObject::ReferenceBlockNode(o) => o.uuid = id,
            StageObject::ConnectPoint(o) => o.uuid = id,
            StageObject::LineEdge(o) => o.uuid = id,
            StageObject::MultiTargetUndirectedEdge(o) => o.uuid = id,
        }
    }

    pub fn is_selected(&self) -> bool {
        match self {
            StageObject::TextNode(o) => o.selected,
            StageObject::Section(o) => o.selected,
            StageObject::ImageNode(o) => o.selected,
            StageObject::SvgNode(o) => o.selected,
            StageObject::ReferenceBlockNode(o) => o.selected,
            StageObject::ConnectPoint(o) => o.selected,
            StageObject::LineEdge(o) => o.selected,
            StageObject::MultiTargetUndirectedEdge(o) => o.selected,
        }
    }

    /// Raw flag write. `Project::set_selected` also maintains the outline.
    pub(crate) fn set_selected_flag(&mut self, selected: bool) {
        match self {
            StageObject::TextNode(o) => o.selected = selected,
            StageObject::Section(o) => o.selected = selected,
            StageObject::ImageNode(o) => o.selected = selected,
            StageObject::SvgNode(o) => o.selected = selected,
            StageObject::ReferenceBlockNode(o) => o.selected = selected,
            StageObject::ConnectPoint(o) => o.selected = selected,
            StageObject::LineEdge(o) => o.selected = selected,
            StageObject::MultiTargetUndirectedEdge(o) => o.selected = selected,
        }
    }

    pub fn as_entity(&self) -> Option<&dyn Entity> {
        match self {
            StageObject::TextNode(o) => Some(o),
            StageObject::Section(o) => Some(o),
            StageObject::ImageNode(o) => Some(o),
            StageObject::SvgNode(o) => Some(o),
            StageObject::ReferenceBlockNode(o) => Some(o),
            StageObject::ConnectPoint(o) => Some(o),
            StageObject::LineEdge(_) | StageObject::MultiTargetUndirectedEdge(_) => None,
        }
    }

    pub fn as_entity_mut(&mut self) -> Option<&mut dyn Entity> {
        match self {
            StageObject::TextNode(o) => Some(o),
            StageObject::Section(o) => Some(o),
            StageObject::ImageNode(o) => Some(o),
            StageObject::SvgNode(o) => Some(o),
            StageObject::ReferenceBlockNode(o) => Some(o),
            StageObject::ConnectPoint(o) => Some(o),
            StageObject::LineEdge(_) | StageObject::MultiTargetUndirectedEdge(_) => None,
        }
    }

    pub fn as_association(&self) -> Option<&dyn Association> {
        match self {
            StageObject::LineEdge(o) => Some(o),
            StageObject::MultiTargetUndirectedEdge(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_association_mut(&mut self) -> Option<&mut dyn Association> {
        match self {
            StageObject::LineEdge(o) => Some(o),
            StageObject::MultiTargetUndirectedEdge(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&dyn Texture> {
        match self {
            StageObject::ImageNode(o) => Some(o),
            StageObject::SvgNode(o) => Some(o),
            StageObject::ReferenceBlockNode(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_texture_mut(&mut self) -> Option<&mut dyn Texture> {
        match self {
            StageObject::ImageNode(o) => Some(o),
            StageObject::SvgNode(o) => Some(o),
            StageObject::ReferenceBlockNode(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_section(&self) -> Option<&Section> {
        match self {
            StageObject::Section(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_section_mut(&mut self) -> Option<&mut Section> {
        match self {
            StageObject::Section(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&LineEdge> {
        match self {
            StageObject::LineEdge(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_multi_edge(&self) -> Option<&MultiTargetUndirectedEdge> {
        match self {
            StageObject::MultiTargetUndirectedEdge(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        self.as_entity().is_some()
    }

    pub fn is_association(&self) -> bool {
        self.as_association().is_some()
    }

    pub fn collision_box(&self) -> CollisionBox {
        match (self.as_entity(), self.as_association()) {
            (Some(e), _) => e.collision_box(),
            (_, Some(a)) => a.collision_box(),
            (None, None) => CollisionBox::default(),
        }
    }

    /// Bounding rect used for outlines and paste offsets.
    pub fn bounding_rect(&self) -> Rect {
        match self.as_entity() {
            Some(e) => e.rect(),
            None => self.collision_box().bounding_rect(),
        }
    }

    /// Geometry seen by associations pointing at this object.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.as_entity().map(|e| Endpoint {
            rect: e.rect(),
            precise: e.honors_precise_rate(),
        })
    }

    pub fn members(&self) -> &[Member] {
        self.as_association().map(|a| a.members()).unwrap_or(&[])
    }

    pub fn attachment_id(&self) -> Option<AttachmentId> {
        self.as_texture().map(|t| t.attachment_id())
    }

    /// Rewrite every id this object refers to (its own uuid excluded).
    ///
    /// Association members that `map` cannot resolve make the association
    /// invalid: `false` is returned and the caller drops it. Unresolvable
    /// section children are released instead.
    pub fn remap_references(&mut self, map: impl Fn(StageId) -> Option<StageId>) -> bool {
        match self {
            StageObject::LineEdge(e) => remap_members(&mut e.members, map),
            StageObject::MultiTargetUndirectedEdge(e) => remap_members(&mut e.members, map),
            StageObject::Section(s) => {
                s.children = s.children.iter().filter_map(|c| map(*c)).collect();
                true
            }
            _ => true,
        }
    }
}

fn remap_members(members: &mut [Member], map: impl Fn(StageId) -> Option<StageId>) -> bool {
    for m in members.iter_mut() {
        match map(m.id) {
            Some(id) => m.id = id,
            None => return false,
        }
    }
    true
}

macro_rules! impl_from_variant {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for StageObject {
                fn from(v: $variant) -> Self {
                    StageObject::$variant(v)
                }
            }
        )*
    };
}

impl_from_variant!(
    TextNode,
    Section,
    ImageNode,
    SvgNode,
    ReferenceBlockNode,
    ConnectPoint,
    LineEdge,
    MultiTargetUndirectedEdge,
);
