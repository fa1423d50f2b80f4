pub mod archive;
pub mod association;
pub mod attachment;
pub mod collision;
pub mod config;
pub mod edge;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod id;
pub mod model;
pub mod multi_edge;
pub mod project;
pub mod references;
pub mod section;
pub mod stage;

pub use association::{Anchor, Association, Member};
pub use attachment::Attachment;
pub use collision::{CollisionBox, Shape};
pub use config::{MonospaceMeasure, RenderToggles, StageConfig, TextMeasure};
pub use edge::{CurveKind, EdgePath, LineEdge};
pub use entity::{ConnectPoint, Entity, ImageNode, ReferenceBlockNode, SvgNode, TextNode, Texture};
pub use error::{ArchiveError, StageError};
pub use geometry::Color;
pub use id::{AttachmentId, StageId};
pub use model::StageObject;
pub use multi_edge::{MultiEdgeArrow, MultiEdgeRenderType, MultiTargetUndirectedEdge};
pub use project::{Project, ProjectState, SelectionOverlay, StageEvent};
pub use references::References;
pub use section::Section;
pub use stage::Stage;

// Re-export kurbo primitives so downstream crates don't need a direct dependency
pub use kurbo::{Line, Point, Rect, Size, Vec2};
