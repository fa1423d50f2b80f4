//! Integration tests: stage-object model invariants.
//!
//! Identity stability through encoding, association arity and derived
//! position, section framing and collapse, containment and edge direction.

use pretty_assertions::assert_eq;
use prg_core::archive::{decode_stage, encode_stage};
use prg_core::association::{Anchor, Member};
use prg_core::edge::{CurveKind, RATE_LEFT, RATE_RIGHT, RATE_TOP};
use prg_core::geometry::Color;
use prg_core::multi_edge::MultiEdgeRenderType;
use prg_core::{
    Association, AttachmentId, ConnectPoint, Entity, ImageNode, LineEdge, MultiTargetUndirectedEdge, Point,
    Project, Rect, ReferenceBlockNode, Section, Size, StageError, StageId, StageObject, SvgNode,
    TextNode, Vec2,
};

fn node_at(project: &mut Project, rect: Rect) -> StageId {
    project.add(TextNode::with_rect("node", rect)).unwrap()
}

// ─── Identity stability ──────────────────────────────────────────────────

#[test]
fn every_kind_survives_encoding() {
    let a = StageId::new();
    let b = StageId::new();
    let c = StageId::new();

    let mut text = TextNode::with_rect("hello\nworld", Rect::new(1.5, -2.0, 101.5, 98.0));
    text.color = Color::rgba(255.0, 128.0, 0.0, 0.5);
    text.details = vec![serde_json::json!({"type": "p", "children": [{"text": "body"}]})];

    let mut section = Section::from_entities("group", vec![a, b]);
    section.is_collapsed = true;
    section.location = Point::new(-30.0, -80.0);
    section.size = Size::new(200.0, 300.0);

    let mut svg = SvgNode::new(AttachmentId::new(), Point::new(3.0, 4.0), Size::new(64.0, 32.0));
    svg.scale = 2.5;

    let mut edge = LineEdge::connect(a, b)
        .with_rates(RATE_RIGHT, RATE_LEFT)
        .with_text("label");
    edge.curve = CurveKind::Bezier;

    let mut hub = MultiTargetUndirectedEdge::new(
        vec![Member::new(a), Member::with_anchor(b, Anchor::Top), Member::new(c)],
        20.0,
    )
    .unwrap();
    hub.render_type = MultiEdgeRenderType::Circle;
    hub.center_rate = Vec2::new(0.25, 0.75);

    let objects: Vec<StageObject> = vec![
        text.into(),
        section.into(),
        ImageNode::new(AttachmentId::new(), Point::new(10.0, 10.0), Size::new(640.0, 480.0)).into(),
        svg.into(),
        ReferenceBlockNode::new("other.prg", "Intro", AttachmentId::new(), Point::ZERO, Size::new(300.0, 200.0))
            .into(),
        ConnectPoint::new(Point::new(7.0, 8.0)).into(),
        edge.into(),
        hub.into(),
    ];

    let decoded = decode_stage(&encode_stage(&objects).unwrap()).unwrap();
    assert_eq!(decoded.len(), objects.len());
    for (before, after) in objects.iter().zip(&decoded) {
        assert_eq!(before.uuid(), after.uuid());
        assert_eq!(before, after);
    }
}

// ─── Association arity ───────────────────────────────────────────────────

#[test]
fn edge_requires_exactly_two_members() {
    let ids: Vec<StageId> = (0..3).map(|_| StageId::new()).collect();
    for n in [0, 1, 3] {
        let result = LineEdge::new(ids[..n].iter().copied().map(Member::new));
        assert!(matches!(result, Err(StageError::Arity { actual, .. }) if actual == n));
    }
    let edge = LineEdge::new(ids[..2].iter().copied().map(Member::new)).unwrap();
    assert_eq!(edge.source(), Some(ids[0]));
    assert_eq!(edge.target(), Some(ids[1]));
}

#[test]
fn hyper_edge_requires_two_or_more_members() {
    let ids: Vec<StageId> = (0..4).map(|_| StageId::new()).collect();
    for n in [0, 1] {
        let members = ids[..n].iter().copied().map(Member::new).collect();
        assert_eq!(
            MultiTargetUndirectedEdge::new(members, 10.0),
            Err(StageError::TooFewEntities { needed: 2, actual: n })
        );
    }
    for n in [2, 4] {
        let members = ids[..n].iter().copied().map(Member::new).collect();
        let hub = MultiTargetUndirectedEdge::new(members, 10.0).unwrap();
        assert_eq!(hub.members.len(), n);
    }
}

#[test]
fn project_rejects_edges_to_missing_entities() {
    let mut project = Project::default();
    let a = node_at(&mut project, Rect::new(0.0, 0.0, 100.0, 100.0));
    let ghost = StageId::new();
    assert_eq!(
        project.add(LineEdge::connect(a, ghost)),
        Err(StageError::MissingObject(ghost))
    );
    assert_eq!(project.stage().len(), 1);
}

#[test]
fn edges_cannot_target_edges() {
    let mut project = Project::default();
    let a = node_at(&mut project, Rect::new(0.0, 0.0, 100.0, 100.0));
    let b = node_at(&mut project, Rect::new(300.0, 0.0, 400.0, 100.0));
    let e = project.connect(a, b).unwrap().unwrap();
    assert_eq!(project.connect(a, e), Err(StageError::NotAnEntity(e)));
}

// ─── Derived position ────────────────────────────────────────────────────

#[test]
fn association_position_is_min_of_member_anchors() {
    let mut project = Project::default();
    let a = node_at(&mut project, Rect::new(0.0, 200.0, 100.0, 300.0));
    let b = node_at(&mut project, Rect::new(300.0, 0.0, 400.0, 100.0));
    let c = node_at(&mut project, Rect::new(600.0, 400.0, 700.0, 500.0));
    let hub = project.create_multi_target_edge(&[a, b, c]).unwrap();
    let position = |p: &Project| {
        p.get(hub)
            .and_then(StageObject::as_association)
            .unwrap()
            .position()
    };
    // Centers: (50, 250), (350, 50), (650, 450).
    assert_eq!(position(&project), Point::new(50.0, 50.0));

    project.move_entity(b, Vec2::new(0.0, -40.0)).unwrap();
    assert_eq!(position(&project), Point::new(50.0, 10.0));

    project.move_entity(a, Vec2::new(-20.0, 0.0)).unwrap();
    assert_eq!(position(&project), Point::new(30.0, 10.0));
}

#[test]
fn top_anchor_resolves_on_border() {
    let mut project = Project::default();
    let a = node_at(&mut project, Rect::new(0.0, 100.0, 100.0, 200.0));
    let b = node_at(&mut project, Rect::new(300.0, 0.0, 400.0, 300.0));
    let edge = LineEdge::new([Member::new(a), Member::with_anchor(b, Anchor::Top)]).unwrap();
    let id = project.add(edge).unwrap();
    let position = project.edge(id).unwrap().position;
    assert_eq!(position, Point::new(50.0, 0.0));
}

// ─── Section framing ─────────────────────────────────────────────────────

#[test]
fn section_frames_children_with_margin_and_title() {
    let mut project = Project::default();
    let children = [
        node_at(&mut project, Rect::new(0.0, 0.0, 100.0, 100.0)),
        node_at(&mut project, Rect::new(250.0, 40.0, 350.0, 140.0)),
    ];
    let s = project.pack_into_section(&children, "frame").unwrap();
    let rect = project.section(s).unwrap().normal_rect();
    let margin = project.config().section_margin;
    let title = project.config().section_title_height;

    for c in children {
        let child = project.entity(c).unwrap().rect();
        assert!(rect.x0 <= child.x0 - margin && rect.x1 >= child.x1 + margin);
        assert!(rect.y0 <= child.y0 - margin - title && rect.y1 >= child.y1 + margin);
    }
    assert_eq!(rect, Rect::new(-30.0, -80.0, 380.0, 170.0));
}

#[test]
fn section_layout_is_idempotent() {
    let mut project = Project::default();
    let children = [
        node_at(&mut project, Rect::new(0.0, 0.0, 100.0, 100.0)),
        node_at(&mut project, Rect::new(200.0, 200.0, 300.0, 300.0)),
    ];
    let s = project.pack_into_section(&children, "frame").unwrap();
    let first = project.section(s).unwrap().normal_rect();

    project.go_out_section(&children, s).unwrap();
    assert!(project.section(s).unwrap().children.is_empty());
    project.go_in_section(&children, s).unwrap();
    assert_eq!(project.section(s).unwrap().normal_rect(), first);
}

#[test]
fn nested_sections_grow_outward() {
    let mut project = Project::default();
    let a = node_at(&mut project, Rect::new(0.0, 0.0, 100.0, 100.0));
    let inner = project.pack_into_section(&[a], "inner").unwrap();
    let outer = project.pack_into_section(&[inner], "outer").unwrap();
    let before = project.section(outer).unwrap().normal_rect();

    project.move_entity(a, Vec2::new(500.0, 0.0)).unwrap();
    let inner_rect = project.section(inner).unwrap().normal_rect();
    let outer_rect = project.section(outer).unwrap().normal_rect();
    assert_eq!(inner_rect, Rect::new(470.0, -80.0, 630.0, 130.0));
    assert_eq!(outer_rect, before + Vec2::new(500.0, 0.0));
}

// ─── Collapse ────────────────────────────────────────────────────────────

#[test]
fn collapse_preserves_center() {
    let mut project = Project::default();
    let children = [
        node_at(&mut project, Rect::new(0.0, 0.0, 100.0, 100.0)),
        node_at(&mut project, Rect::new(400.0, 300.0, 500.0, 400.0)),
        node_at(&mut project, Rect::new(-200.0, 100.0, -100.0, 200.0)),
    ];
    let s = project.pack_into_section(&children, "a fairly long title").unwrap();
    let expanded = project.entity(s).unwrap().rect();

    project.set_collapsed(s, true).unwrap();
    let collapsed = project.entity(s).unwrap().rect();
    assert!((collapsed.center().x - expanded.center().x).abs() < 1e-9);
    assert!((collapsed.center().y - expanded.center().y).abs() < 1e-9);
    assert!(collapsed.width() < expanded.width());

    project.set_collapsed(s, false).unwrap();
    assert_eq!(project.entity(s).unwrap().rect(), expanded);
}

#[test]
fn edges_to_collapsed_children_stay_valid() {
    let mut project = Project::default();
    let a = node_at(&mut project, Rect::new(0.0, 0.0, 100.0, 100.0));
    let b = node_at(&mut project, Rect::new(600.0, 0.0, 700.0, 100.0));
    let e = project.connect(a, b).unwrap().unwrap();
    let s = project.pack_into_section(&[a], "s").unwrap();
    project.set_collapsed(s, true).unwrap();
    assert!(project.is_hidden_by_collapse(a));
    assert!(project.edge(e).unwrap().path.is_some());
}

// ─── Containment ─────────────────────────────────────────────────────────

#[test]
fn containment_is_transitive() {
    let mut project = Project::default();
    let e = node_at(&mut project, Rect::new(0.0, 0.0, 100.0, 100.0));
    let s2 = project.pack_into_section(&[e], "inner").unwrap();
    let s1 = project.pack_into_section(&[s2], "outer").unwrap();

    assert!(project.is_entity_in_section(e, s1));
    assert!(project.is_entity_in_section(e, s2));
    assert!(!project.is_entity_in_section(s1, s2));
    assert_eq!(project.parent_sections(e), vec![s2]);
    assert_eq!(project.ancestors(e).len(), 2);
    assert_eq!(project.descendants(s1).len(), 2);
}

#[test]
fn packing_inside_a_section_keeps_the_parent() {
    let mut project = Project::default();
    let a = node_at(&mut project, Rect::new(0.0, 0.0, 100.0, 100.0));
    let b = node_at(&mut project, Rect::new(200.0, 0.0, 300.0, 100.0));
    let outer = project.pack_into_section(&[a, b], "outer").unwrap();
    let inner = project.pack_into_section(&[a], "inner").unwrap();

    assert_eq!(project.parent_sections(inner), vec![outer]);
    assert_eq!(project.parent_sections(a), vec![inner]);
    assert!(project.is_entity_in_section(a, outer));
}

// ─── Direction ───────────────────────────────────────────────────────────

#[test]
fn left_to_right_classification() {
    let edge = LineEdge::connect(StageId::new(), StageId::new()).with_rates(RATE_RIGHT, RATE_LEFT);
    assert!(edge.is_left_to_right());
    assert!(!edge.is_right_to_left());
    assert!(!edge.is_top_to_bottom());
    assert!(!edge.is_bottom_to_top());

    let near = LineEdge::connect(StageId::new(), StageId::new())
        .with_rates(Vec2::new(0.98, 0.5), RATE_LEFT);
    assert!(!near.is_left_to_right());

    let vertical = LineEdge::connect(StageId::new(), StageId::new()).with_rates(RATE_RIGHT, RATE_TOP);
    assert!(!vertical.is_left_to_right());
}
