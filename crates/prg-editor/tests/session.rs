//! Integration tests: pointer gestures through a `Session`.
//!
//! Drive a session with screen-space events and check the project, the
//! history and the requests handed back to the host.

use pretty_assertions::assert_eq;
use prg_core::{Entity, Point, Project, Rect, StageId, TextNode};
use prg_editor::{Camera, InputEvent, InteractionState, MemoryClipboard, PointerButton, Session};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn session_with(rects: &[Rect]) -> (Session, Vec<StageId>) {
    let mut project = Project::default();
    let ids = rects
        .iter()
        .enumerate()
        .map(|(i, r)| project.add(TextNode::with_rect(format!("n{i}"), *r)).unwrap())
        .collect();
    (Session::new(project, Box::new(MemoryClipboard::default())), ids)
}

fn origin(session: &Session, id: StageId) -> Point {
    session.project().entity(id).unwrap().rect().origin()
}

// ─── Dragging ────────────────────────────────────────────────────────────

#[test]
fn drag_is_one_undo_step() {
    init_logger();
    let (mut s, ids) = session_with(&[Rect::new(0.0, 0.0, 100.0, 100.0)]);
    let a = ids[0];

    s.handle_input(&InputEvent::pointer_down(50.0, 50.0, PointerButton::Primary));
    assert!(matches!(s.interaction_state(), InteractionState::Moving { .. }));
    for x in [60.0, 90.0, 120.0, 150.0] {
        s.handle_input(&InputEvent::pointer_move(x, 80.0));
    }
    s.handle_input(&InputEvent::pointer_up(150.0, 80.0));

    assert_eq!(origin(&s, a), Point::new(100.0, 30.0));
    assert_eq!(s.undo().as_deref(), Some("move entities"));
    assert!(!s.can_undo());
    assert_eq!(origin(&s, a), Point::ZERO);
    s.redo();
    assert_eq!(origin(&s, a), Point::new(100.0, 30.0));
}

#[test]
fn drag_respects_camera_scale() {
    let (mut s, ids) = session_with(&[Rect::new(0.0, 0.0, 100.0, 100.0)]);
    s.camera = Camera {
        location: Point::ZERO,
        scale: 2.0,
    };
    // Screen (100, 100) is world (50, 50).
    s.handle_input(&InputEvent::pointer_down(100.0, 100.0, PointerButton::Primary));
    s.handle_input(&InputEvent::pointer_move(140.0, 100.0));
    s.handle_input(&InputEvent::pointer_up(140.0, 100.0));
    assert_eq!(origin(&s, ids[0]), Point::new(20.0, 0.0));
}

#[test]
fn dragging_a_selected_node_moves_the_selection() {
    let (mut s, ids) = session_with(&[
        Rect::new(0.0, 0.0, 100.0, 100.0),
        Rect::new(300.0, 0.0, 400.0, 100.0),
    ]);
    s.select_all();
    s.handle_input(&InputEvent::pointer_down(50.0, 50.0, PointerButton::Primary));
    s.handle_input(&InputEvent::pointer_move(50.0, 250.0));
    s.handle_input(&InputEvent::PointerUpOutside);

    assert_eq!(origin(&s, ids[0]), Point::new(0.0, 200.0));
    assert_eq!(origin(&s, ids[1]), Point::new(300.0, 200.0));
    assert!(matches!(s.interaction_state(), InteractionState::Idle));
}

#[test]
fn press_next_to_an_edge_end_still_drags_the_node() {
    let (mut s, ids) = session_with(&[
        Rect::new(0.0, 0.0, 100.0, 100.0),
        Rect::new(300.0, 0.0, 400.0, 100.0),
    ]);
    s.project_mut().connect(ids[0], ids[1]).unwrap();
    // (97, 50) is inside `a` and within touch distance of the edge start.
    s.handle_input(&InputEvent::pointer_down(97.0, 50.0, PointerButton::Primary));
    assert_eq!(s.project().selected_ids(), vec![ids[0]]);
    s.handle_input(&InputEvent::pointer_move(97.0, 150.0));
    s.handle_input(&InputEvent::pointer_up(97.0, 150.0));
    assert_eq!(origin(&s, ids[0]), Point::new(0.0, 100.0));
}

#[test]
fn click_without_move_records_nothing() {
    let (mut s, _) = session_with(&[Rect::new(0.0, 0.0, 100.0, 100.0)]);
    s.handle_input(&InputEvent::pointer_down(50.0, 50.0, PointerButton::Primary));
    s.handle_input(&InputEvent::pointer_up(50.0, 50.0));
    assert!(!s.can_undo());
}

// ─── Linking ─────────────────────────────────────────────────────────────

#[test]
fn link_gesture_connects_once() {
    let (mut s, ids) = session_with(&[
        Rect::new(0.0, 0.0, 100.0, 100.0),
        Rect::new(300.0, 0.0, 400.0, 100.0),
    ]);
    for _ in 0..2 {
        s.handle_input(&InputEvent::pointer_down(50.0, 50.0, PointerButton::Secondary));
        s.handle_input(&InputEvent::pointer_move(350.0, 50.0));
        s.handle_input(&InputEvent::pointer_up(350.0, 50.0));
    }
    assert_eq!(s.project().edges_from(ids[0]).len(), 1);
}

#[test]
fn link_from_inside_a_section_skips_the_section() {
    let (mut s, ids) = session_with(&[
        Rect::new(0.0, 0.0, 100.0, 100.0),
        Rect::new(400.0, 0.0, 500.0, 100.0),
    ]);
    let (a, b) = (ids[0], ids[1]);
    let section = s.project_mut().pack_into_section(&[a], "group").unwrap();

    s.handle_input(&InputEvent::pointer_down(50.0, 50.0, PointerButton::Secondary));
    // Crosses the section border at x = 130 on the way out.
    for x in [100.0, 128.0, 130.0, 132.0, 200.0, 450.0] {
        s.handle_input(&InputEvent::pointer_move(x, 50.0));
    }
    s.handle_input(&InputEvent::pointer_up(450.0, 50.0));

    assert!(!s.project().is_connected(a, section));
    assert!(s.project().is_connected(a, b));
}

#[test]
fn link_released_on_empty_canvas_does_nothing() {
    let (mut s, ids) = session_with(&[Rect::new(0.0, 0.0, 100.0, 100.0)]);
    s.handle_input(&InputEvent::pointer_down(50.0, 50.0, PointerButton::Secondary));
    s.handle_input(&InputEvent::pointer_move(600.0, 50.0));
    let requests = s.handle_input(&InputEvent::pointer_up(600.0, 50.0));
    assert!(requests.is_empty());
    assert!(s.project().edges_from(ids[0]).is_empty());
    assert!(!s.can_undo());
}

// ─── Edit commands ───────────────────────────────────────────────────────

#[test]
fn copy_paste_and_delete_are_undoable() {
    let (mut s, ids) = session_with(&[Rect::new(0.0, 0.0, 100.0, 100.0)]);
    s.project_mut().set_selected(ids[0], true);
    assert_eq!(s.copy(), 1);
    assert!(!s.can_undo());

    let pasted = s.paste_at(Point::ZERO);
    assert_eq!(pasted.len(), 1);
    assert_eq!(s.project().stage().len(), 2);

    assert_eq!(s.delete_selected(), 1);
    assert_eq!(s.project().stage().len(), 1);

    assert_eq!(s.undo().as_deref(), Some("delete"));
    assert_eq!(s.undo().as_deref(), Some("paste"));
    assert_eq!(s.project().stage().len(), 1);
}

#[test]
fn save_and_reopen() {
    let (mut s, ids) = session_with(&[Rect::new(0.0, 0.0, 100.0, 100.0)]);
    let path = std::env::temp_dir().join(format!("prg-session-{}.prg", ids[0]));
    s.save(&path).unwrap();

    let reopened = Session::open(&path, Default::default(), Box::new(MemoryClipboard::default()));
    assert!(reopened.project().get(ids[0]).is_some());
    let _ = std::fs::remove_file(&path);
}
