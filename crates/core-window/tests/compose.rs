//! End-to-end composition scenarios: clipping by the parent chain, depth
//! tie-breaks, hide/show, and double-width cells crossing clip edges.

use core_attr::Attr;
use core_caps::Capabilities;
use core_window::{Screen, WindowId};

fn caps() -> Capabilities {
    Capabilities::plain()
}

/// Render one terminal row to a plain string, implicit blanks as spaces.
fn row_text(screen: &mut Screen, line: i32) -> String {
    screen.compose_line(line);
    let (_, fresh) = screen.diff_lines(line).expect("row in range");
    let (_, w) = screen.term_size();
    let mut out = String::new();
    for _ in 0..fresh.start {
        out.push(' ');
    }
    for b in fresh.blocks() {
        out.push_str(std::str::from_utf8(b.text).expect("valid utf8"));
    }
    let cells: i32 = fresh.start + fresh.width;
    for _ in cells..w {
        out.push(' ');
    }
    out
}

fn shown_window(screen: &mut Screen, parent: Option<WindowId>, h: i32, w: i32, y: i32, x: i32, depth: i32) -> WindowId {
    let id = screen.new_window(parent, h, w, y, x, depth).expect("window");
    screen.show(id);
    id
}

#[test]
fn child_clipped_by_parent_rectangle() {
    let caps = caps();
    let mut s = Screen::new(24, 80);
    let parent = shown_window(&mut s, None, 4, 4, 5, 5, 0);
    let child = shown_window(&mut s, Some(parent), 1, 10, 0, 0, 0);
    s.addstr(&caps, child, "abcdefghij", Attr::empty()).unwrap();

    let row = row_text(&mut s, 5);
    assert_eq!(&row[0..5], "     ");
    assert_eq!(&row[5..9], "abcd");
    assert!(row[9..].chars().all(|c| c == ' '));
}

#[test]
fn equal_depth_latest_window_wins() {
    let caps = caps();
    let mut s = Screen::new(5, 10);
    let w1 = shown_window(&mut s, None, 1, 3, 0, 0, 0);
    let w2 = shown_window(&mut s, None, 1, 3, 0, 0, 0);
    s.addstr(&caps, w1, "A", Attr::empty()).unwrap();
    s.addstr(&caps, w2, "B", Attr::empty()).unwrap();
    let row = row_text(&mut s, 0);
    assert_eq!(&row[0..1], "B");
}

#[test]
fn lower_depth_draws_on_top() {
    let caps = caps();
    let mut s = Screen::new(5, 10);
    let deep = shown_window(&mut s, None, 1, 3, 0, 0, 5);
    let shallow = shown_window(&mut s, None, 1, 3, 0, 0, 1);
    s.addstr(&caps, deep, "xxx", Attr::empty()).unwrap();
    s.addstr(&caps, shallow, "o", Attr::empty()).unwrap();
    let row = row_text(&mut s, 0);
    assert_eq!(&row[0..3], "oxx");
}

#[test]
fn hide_then_show_is_a_composed_noop() {
    let caps = caps();
    let mut s = Screen::new(5, 10);
    let under = shown_window(&mut s, None, 1, 5, 0, 0, 2);
    let over = shown_window(&mut s, None, 1, 5, 0, 0, 1);
    s.addstr(&caps, under, "below", Attr::empty()).unwrap();
    s.addstr(&caps, over, "top", Attr::empty()).unwrap();
    let before = row_text(&mut s, 0);

    s.hide(over);
    let hidden = row_text(&mut s, 0);
    assert_eq!(&hidden[0..5], "below");

    s.show(over);
    assert_eq!(row_text(&mut s, 0), before);
}

#[test]
fn composition_is_idempotent() {
    let caps = caps();
    let mut s = Screen::new(5, 12);
    let w = shown_window(&mut s, None, 2, 6, 1, 3, 0);
    s.addstr(&caps, w, "hi", Attr::BOLD).unwrap();
    let first = row_text(&mut s, 1);
    let second = row_text(&mut s, 1);
    assert_eq!(first, second);
}

#[test]
fn hidden_parent_hides_children() {
    let caps = caps();
    let mut s = Screen::new(5, 10);
    let parent = shown_window(&mut s, None, 2, 6, 0, 0, 0);
    let child = shown_window(&mut s, Some(parent), 1, 3, 0, 0, 0);
    s.addstr(&caps, child, "abc", Attr::empty()).unwrap();
    s.hide(parent);
    let row = row_text(&mut s, 0);
    assert!(row.chars().all(|c| c == ' '));
}

#[test]
fn default_attrs_paint_implicit_blanks() {
    let caps = caps();
    let mut s = Screen::new(3, 8);
    let w = shown_window(&mut s, None, 1, 6, 0, 1, 0);
    s.set_default_attrs(w, Attr::bg(4));
    s.set_paint(w, 0, 2);
    s.addstr(&caps, w, "x", Attr::empty()).unwrap();

    s.compose_line(0);
    let (_, fresh) = s.diff_lines(0).unwrap();
    // Window columns 1..7 all painted: two leading blanks, x, three trailing.
    assert_eq!(fresh.start, 1);
    assert_eq!(fresh.width, 6);
    let texts: Vec<String> = fresh
        .blocks()
        .map(|b| String::from_utf8(b.text.to_vec()).unwrap())
        .collect();
    assert_eq!(texts, vec![" ", " ", "x", " ", " ", " "]);
    let attrs: Vec<Attr> = fresh.blocks().map(|b| s.attrs.get(b.attr_idx)).collect();
    assert_eq!(attrs[0], Attr::bg(4));
    assert_eq!(attrs[2], Attr::bg(4));
}

#[test]
fn wide_cell_clipped_by_parent_edge_becomes_space() {
    let caps = caps();
    let mut s = Screen::new(3, 20);
    let parent = shown_window(&mut s, None, 1, 2, 0, 0, 0);
    let child = shown_window(&mut s, Some(parent), 1, 6, 0, 0, 0);
    // "aＱ": the wide cell would occupy columns 1..3 but the parent clips
    // at 2, so only its attributed left-half space survives.
    s.addstr(&caps, child, "aＱ", Attr::REVERSE).unwrap();
    s.compose_line(0);
    let (_, fresh) = s.diff_lines(0).unwrap();
    let texts: Vec<String> = fresh
        .blocks()
        .map(|b| String::from_utf8(b.text.to_vec()).unwrap())
        .collect();
    assert_eq!(texts, vec!["a", " "]);
    assert_eq!(fresh.width, 2);
    let last = fresh.blocks().nth(1).unwrap();
    assert_eq!(s.attrs.get(last.attr_idx), Attr::REVERSE);
}

#[test]
fn wide_cell_straddling_left_clip_becomes_space() {
    let caps = caps();
    let mut s = Screen::new(3, 20);
    let parent = shown_window(&mut s, None, 1, 4, 0, 2, 0);
    // Child hangs one column left of the parent: its wide first cell is cut.
    let child = shown_window(&mut s, Some(parent), 1, 6, 0, -1, 0);
    s.addstr(&caps, child, "Ｑz", Attr::BOLD).unwrap();
    s.compose_line(0);
    let (_, fresh) = s.diff_lines(0).unwrap();
    assert_eq!(fresh.start, 2);
    let texts: Vec<String> = fresh
        .blocks()
        .map(|b| String::from_utf8(b.text.to_vec()).unwrap())
        .collect();
    // Right half of the wide cell renders as a space with its attribute.
    assert_eq!(texts, vec![" ", "z"]);
    assert_eq!(s.attrs.get(fresh.blocks().next().unwrap().attr_idx), Attr::BOLD);
}

#[test]
fn window_at_finds_topmost() {
    let caps = caps();
    let mut s = Screen::new(10, 10);
    let below = shown_window(&mut s, None, 4, 4, 0, 0, 2);
    let above = shown_window(&mut s, None, 2, 2, 1, 1, 1);
    s.addstr(&caps, below, "x", Attr::empty()).unwrap();
    assert_eq!(core_window::window_at(&s, 0, 0), Some(below));
    assert_eq!(core_window::window_at(&s, 1, 1), Some(above));
    assert_eq!(core_window::window_at(&s, 9, 9), None);
    s.hide(above);
    assert_eq!(core_window::window_at(&s, 1, 1), Some(below));
}

#[test]
fn unbacked_window_positions_children_without_painting() {
    let caps = caps();
    let mut s = Screen::new(5, 12);
    let frame = s.new_unbacked(None, 3, 6, 1, 2, 0).unwrap();
    s.show(frame);
    let child = shown_window(&mut s, Some(frame), 1, 4, 0, 0, 0);
    s.addstr(&caps, child, "hey", Attr::empty()).unwrap();
    assert!(s.addstr(&caps, frame, "no", Attr::empty()).is_err());
    let row = row_text(&mut s, 1);
    assert_eq!(&row[2..5], "hey");
}
