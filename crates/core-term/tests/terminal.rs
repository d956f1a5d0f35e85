//! End-to-end terminal behavior against the in-memory device: init bytes,
//! minimal diffs, probe interception, cursor discipline, and input.

use core_attr::Attr;
use core_caps::{Options, StaticTerminfo};
use core_term::{KeyInput, SimIo, TermError, Terminal};
use core_window::WindowId;

fn new_term(lines: i32, columns: i32) -> Terminal<SimIo> {
    let ti = StaticTerminfo::for_term("xterm-256color").expect("builtin terminfo");
    let io = SimIo::new(lines, columns);
    Terminal::new(io, &ti, "xterm-256color", &Options::default()).expect("terminal init")
}

fn full_width_window(term: &mut Terminal<SimIo>) -> WindowId {
    let (lines, columns) = term.size();
    let win = term
        .screen
        .new_window(None, lines, columns, 0, 0, 0)
        .expect("window");
    term.screen.show(win);
    win
}

#[test]
fn init_emits_alt_screen_probes_and_clear() {
    let term = new_term(5, 20);
    let out = term.io().output_text();
    assert!(out.starts_with("\x1b[?1049h"), "alternate screen first");
    // Every probe carries a cursor position request.
    assert_eq!(out.matches("\x1b[6n").count(), 14);
    assert!(out.contains("\x1b[H\x1b[2J"), "screen cleared after probes");
}

#[test]
fn screen_multiplexer_wraps_position_requests() {
    let ti = StaticTerminfo::for_term("screen").expect("builtin terminfo");
    let io = SimIo::new(5, 20);
    let term = Terminal::new(io, &ti, "screen", &Options::default()).expect("init");
    let out = term.io().output_text();
    assert_eq!(out.matches("\x1bP\x1b[6n\x1b\\").count(), 14);
}

#[test]
fn minimal_diff_rewrites_only_the_changed_span() {
    let mut term = new_term(5, 20);
    let win = full_width_window(&mut term);
    term.addstr(win, "hello world", Attr::empty()).unwrap();
    term.update().unwrap();
    term.io_mut().clear_output();

    term.screen.set_paint(win, 0, 6);
    term.addstr(win, "WORLD", Attr::empty()).unwrap();
    term.update().unwrap();

    let out = term.io().output_text();
    assert_eq!(out, "\x1b7\x1b[?25l\x1b[1;7HWORLD\x1b(B\x1b[0m\x1b8\x1b[?25h");
    assert!(!out.contains("\x1b[K"), "no erase for an equal-width row");
}

#[test]
fn update_without_changes_is_attribute_reset_only() {
    let mut term = new_term(4, 12);
    let win = full_width_window(&mut term);
    term.addstr(win, "static", Attr::empty()).unwrap();
    term.update().unwrap();
    term.io_mut().clear_output();

    term.update().unwrap();
    let out = term.io().output_text();
    assert_eq!(out, "\x1b7\x1b[?25l\x1b(B\x1b[0m\x1b8\x1b[?25h");
}

#[test]
fn shrinking_row_erases_to_eol() {
    let mut term = new_term(4, 12);
    let win = full_width_window(&mut term);
    term.addstr(win, "longtext", Attr::empty()).unwrap();
    term.update().unwrap();
    term.io_mut().clear_output();

    term.screen.set_paint(win, 0, 4);
    term.screen.clrtoeol(win);
    term.update().unwrap();
    let out = term.io().output_text();
    assert!(out.contains("\x1b[K"), "erase-to-eol expected: {:?}", out);
}

#[test]
fn hide_and_show_window_round_trips_output() {
    let mut term = new_term(4, 12);
    let under = full_width_window(&mut term);
    term.addstr(under, "base", Attr::empty()).unwrap();
    let over = term.screen.new_window(None, 1, 4, 0, 0, -1).expect("over");
    term.screen.show(over);
    term.addstr(over, "TOP!", Attr::empty()).unwrap();
    term.update().unwrap();

    term.screen.hide(over);
    term.update().unwrap();
    term.io_mut().clear_output();

    // Hiding then showing produces the same bytes as the first paint of
    // the overlay region.
    term.screen.show(over);
    term.update().unwrap();
    let reshown = term.io().output_text();
    assert!(reshown.contains("TOP!"));
}

#[test]
fn probe_replies_set_levels_and_yield_update_signal() {
    let mut term = new_term(5, 20);
    // Reported columns: charset 4 (width 3: UTF-8), then 2, a combining
    // mark rendered zero-width (column 1), the rest unsupported, and all
    // double-width probes rendered wide.
    let mut replies = String::new();
    replies.push_str("\x1b[2;4R");
    replies.push_str("\x1b[2;2R");
    replies.push_str("\x1b[2;1R"); // combining 4.0 supported
    for _ in 0..6 {
        replies.push_str("\x1b[2;2R");
    }
    replies.push_str("\x1b[2;5R"); // wide pair: four cells
    for _ in 0..4 {
        replies.push_str("\x1b[2;3R");
    }
    term.io_mut().feed(replies.as_bytes());

    match term.get_keychar(0) {
        Ok(KeyInput::UpdateNeeded) => {}
        other => panic!("expected update signal, got {:?}", other),
    }

    // Keyboard bytes after detection flow through untouched.
    term.io_mut().feed(b"q");
    assert_eq!(term.get_keychar(0).unwrap(), KeyInput::Byte(b'q'));
}

#[test]
fn keyboard_bytes_during_detection_are_not_eaten() {
    let mut term = new_term(5, 20);
    term.io_mut().feed(b"x");
    assert_eq!(term.get_keychar(0).unwrap(), KeyInput::Byte(b'x'));
    // An escape sequence that is not a position report comes back whole.
    term.io_mut().feed(b"\x1b[A");
    assert_eq!(term.get_keychar(0).unwrap(), KeyInput::Byte(0x1b));
    assert_eq!(term.get_keychar(0).unwrap(), KeyInput::Byte(b'['));
    assert_eq!(term.get_keychar(0).unwrap(), KeyInput::Byte(b'A'));
}

#[test]
fn empty_input_times_out() {
    let mut term = new_term(5, 20);
    match term.get_keychar(0) {
        Err(TermError::Timeout) => {}
        other => panic!("expected timeout, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn unget_returns_last_key_once() {
    let mut term = new_term(5, 20);
    term.io_mut().feed(b"k");
    assert_eq!(term.get_keychar(0).unwrap(), KeyInput::Byte(b'k'));
    assert!(term.unget_keychar(b'k').is_ok());
    assert_eq!(term.get_keychar(0).unwrap(), KeyInput::Byte(b'k'));
    // Only the byte actually read last can be pushed back.
    assert!(matches!(
        term.unget_keychar(b'z'),
        Err(TermError::BadArg)
    ));
}

#[test]
fn user_callback_draws_flagged_cells() {
    let mut term = new_term(4, 12);
    let win = full_width_window(&mut term);
    term.set_user_callback(Some(Box::new(|emit, _text, _width, _attr| {
        emit.puts("@");
    })));
    term.addstr(win, "z", Attr::USER).unwrap();
    term.update().unwrap();
    let out = term.io().output_text();
    assert!(out.contains('@'));
    assert!(!out.contains('z'));
}

#[test]
fn cursor_hide_show_and_positioning() {
    let mut term = new_term(5, 20);
    term.io_mut().clear_output();
    term.hide_cursor();
    assert!(term.io().output_text().contains("\x1b[?25l"));
    term.io_mut().clear_output();
    term.set_cursor(2, 3);
    // Invisible cursor: position is recorded but not moved yet.
    assert_eq!(term.io().output_text(), "");
    term.show_cursor();
    let out = term.io().output_text();
    assert!(out.contains("\x1b[3;4H"));
    assert!(out.contains("\x1b[?25h"));
}

#[test]
fn resize_clears_when_growing_wider() {
    let mut term = new_term(5, 20);
    term.io_mut().clear_output();
    term.io_mut().size = (5, 30);
    term.resize().unwrap();
    assert_eq!(term.screen.term_size(), (5, 30));
    assert!(term.io().output_text().contains("\x1b[H\x1b[2J"));
    let out_len = term.io().output.len();
    // Shrinking height also repaints; equal size is a no-op.
    term.resize().unwrap();
    assert_eq!(term.io().output.len(), out_len);
}

#[test]
fn restore_and_resume_round_trip() {
    let mut term = new_term(5, 20);
    let win = full_width_window(&mut term);
    term.addstr(win, "persist", Attr::empty()).unwrap();
    term.update().unwrap();

    term.restore();
    let out = term.io().output_text();
    assert!(out.contains("\x1b[?1049l"), "left the alternate screen");
    assert!(!term.io().raw_mode);

    term.io_mut().clear_output();
    term.resume().unwrap();
    assert!(term.io().raw_mode);
    assert!(term.io().output_text().contains("\x1b[?1049h"));
    // The cleared shadow forces a full repaint on the next update.
    term.update().unwrap();
    assert!(term.io().output_text().contains("persist"));
}

#[test]
fn features_reflect_capabilities() {
    let term = new_term(5, 20);
    let features = term.features();
    assert_eq!(features.colors, 256);
    assert!(features.can_set_fg && features.can_set_bg);
    assert!(features.highlights.contains(Attr::UNDERLINE | Attr::BOLD | Attr::ACS));
    assert!(!features.color_pairs);
}
