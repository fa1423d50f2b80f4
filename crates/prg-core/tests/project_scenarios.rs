//! Integration tests: end-to-end document scenarios.
//!
//! Build a document through `Project`, mutate it, and check the derived
//! state and the archive produced from it.

use pretty_assertions::assert_eq;
use prg_core::archive::{self, DOCUMENT_VERSION, read_archive};
use prg_core::{
    Entity, ImageNode, Point, Project, ProjectState, Rect, Size, StageConfig, StageError,
    StageEvent, StageObject, TextNode, Vec2,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ─── Edge follows a moved node ───────────────────────────────────────────

#[test]
fn moving_a_node_updates_its_edge() {
    init_logger();
    let mut project = Project::default();
    let a = project
        .add(TextNode::with_rect("A", Rect::new(0.0, 0.0, 100.0, 100.0)))
        .unwrap();
    let b = project
        .add(TextNode::with_rect("B", Rect::new(300.0, 0.0, 400.0, 100.0)))
        .unwrap();
    let e = project.connect(a, b).unwrap().unwrap();
    let before = project.edge(e).unwrap().path.clone().unwrap();
    assert_eq!(before.start(), Point::new(100.0, 50.0));
    assert_eq!(before.end(), Point::new(300.0, 50.0));
    project.drain_events();

    project.move_entity(b, Vec2::new(0.0, 50.0)).unwrap();

    let edge = project.edge(e).unwrap();
    let after = edge.path.clone().unwrap();
    assert_ne!(after.start(), before.start());
    assert_ne!(after.end(), before.end());
    assert_eq!(edge.position, Point::new(50.0, 50.0));
    assert!(project.drain_events().contains(&StageEvent::GeometryChanged(e)));
}

// ─── Group, collapse, expand ─────────────────────────────────────────────

#[test]
fn grouping_collapsing_and_expanding() {
    init_logger();
    let mut project = Project::default();
    let ids: Vec<_> = [(0.0, 0.0), (200.0, 0.0), (100.0, 200.0)]
        .into_iter()
        .map(|(x, y)| {
            project
                .add(TextNode::with_rect("n", Rect::new(x, y, x + 100.0, y + 100.0)))
                .unwrap()
        })
        .collect();
    for id in &ids {
        project.set_selected(*id, true);
    }
    let selected = project.selected_entities();
    assert_eq!(selected.len(), 3);

    let s = project.pack_into_section(&selected, "Group").unwrap();
    let expanded = project.entity(s).unwrap().rect();
    assert_eq!(expanded, Rect::new(-30.0, -80.0, 330.0, 330.0));

    project.set_collapsed(s, true).unwrap();
    let collapsed = project.entity(s).unwrap().rect();
    // "Group": five glyphs of 16px, one line of 48px, plus padding.
    assert_eq!(collapsed.size(), Size::new(108.0, 76.0));
    assert_eq!(collapsed.center(), expanded.center());

    project.set_collapsed(s, false).unwrap();
    assert_eq!(project.entity(s).unwrap().rect(), expanded);
}

// ─── Save and reload ─────────────────────────────────────────────────────

#[test]
fn save_and_reload_with_image() {
    init_logger();
    let png = vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3, 4, 5];
    let mut project = Project::default();
    let text = project
        .add(TextNode::new("persisted text", Point::new(10.0, 20.0)))
        .unwrap();
    let blob = project.add_attachment("image/png", png.clone());
    let image = project
        .add(ImageNode::new(blob, Point::new(300.0, 0.0), Size::new(64.0, 64.0)))
        .unwrap();
    project.add_tag(text);

    let bytes = project.to_archive_bytes().unwrap();
    let loaded = Project::try_from_archive_bytes(&bytes, StageConfig::default()).unwrap();

    assert_eq!(loaded.state(), ProjectState::Saved);
    assert_eq!(loaded.stage().len(), 2);
    let StageObject::TextNode(node) = loaded.get(text).unwrap() else {
        panic!("expected a text node");
    };
    assert_eq!(node.text, "persisted text");
    assert_eq!(node.uuid, text);
    assert_eq!(
        loaded.get(text).unwrap().bounding_rect(),
        project.get(text).unwrap().bounding_rect()
    );

    let attachment = loaded.get(image).and_then(StageObject::attachment_id).unwrap();
    assert_eq!(attachment, blob);
    assert_eq!(loaded.attachment(attachment).unwrap().len(), png.len());
    assert_eq!(loaded.attachment(attachment).unwrap().mime, "image/png");
    assert_eq!(loaded.tags(), &[text]);
}

#[test]
fn archive_carries_current_version_and_references() {
    let mut project = Project::default();
    project.references_mut().register_section("Intro", "other.prg");
    project.references_mut().register_file("third.prg");
    let bytes = project.to_archive_bytes().unwrap();
    let decoded = read_archive(&bytes).unwrap();
    assert_eq!(decoded.version, DOCUMENT_VERSION);
    assert_eq!(decoded.references.files_for_section("Intro"), ["other.prg"]);
    assert_eq!(decoded.references.files, vec!["third.prg".to_string()]);
}

#[test]
fn unreadable_archive_yields_empty_project() {
    init_logger();
    let project = Project::from_archive_bytes(b"definitely not a zip", StageConfig::default());
    assert!(project.stage().is_empty());
    assert_eq!(project.state(), ProjectState::Unsaved);
}

#[test]
fn save_writes_file_and_marks_saved() {
    let dir = std::env::temp_dir().join(format!("prg-core-save-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("doc.prg");

    let mut project = Project::default();
    let id = project.add_text_node("on disk", Point::ZERO).unwrap();
    project.save(&path).unwrap();
    assert_eq!(project.state(), ProjectState::Saved);

    let reopened = Project::open(&path, StageConfig::default());
    assert!(reopened.get(id).is_some());
    let archive = archive::read_file(&path).unwrap();
    assert_eq!(archive.stage.len(), 1);

    std::fs::remove_dir_all(&dir).unwrap();
}

// ─── Rejected hyper-edge ─────────────────────────────────────────────────

#[test]
fn hyper_edge_from_single_entity_is_rejected() {
    let mut project = Project::default();
    let a = project.add_text_node("alone", Point::ZERO).unwrap();
    project.drain_events();

    let result = project.create_multi_target_edge(&[a]);
    assert_eq!(result, Err(StageError::TooFewEntities { needed: 2, actual: 1 }));
    assert_eq!(project.stage().len(), 1);
    assert!(project.hyper_edges_of(a).is_empty());
    assert!(project.drain_events().is_empty());
}

#[test]
fn hyper_edge_ignores_non_connectable_ids() {
    let mut project = Project::default();
    let a = project.add_text_node("a", Point::ZERO).unwrap();
    let b = project.add_text_node("b", Point::new(300.0, 0.0)).unwrap();
    let e = project.connect(a, b).unwrap().unwrap();
    assert_eq!(
        project.create_multi_target_edge(&[a, e]),
        Err(StageError::TooFewEntities { needed: 2, actual: 1 })
    );
}
