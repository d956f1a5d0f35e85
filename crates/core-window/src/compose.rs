//! Per-line composition of the visible window stack into the scratch shadow.
//!
//! Windows are visited back to front: deepest top-level window first, each
//! window's children right after it (so they paint above it), hidden
//! subtrees skipped. Every painted span is clipped by the intersection of
//! the whole ancestor chain, the optional restrict rectangle, and the
//! terminal; partially clipped double-width cells degrade to a one-cell
//! space carrying the block's attribute.

use core_attr::{Attr, AttrMap, FG_MASK};
use core_cells::{block, Grid};
use tracing::trace;

use crate::{Screen, Window, WindowId};
use crate::anchor::AnchorPoint;

pub(crate) fn node(wins: &[Option<Window>], id: WindowId) -> Option<&Window> {
    wins.get(id.index())?.as_ref()
}

pub(crate) fn win_width(wins: &[Option<Window>], id: WindowId) -> i32 {
    node(wins, id).map(|w| w.grid.width).unwrap_or(0)
}

pub(crate) fn win_height(wins: &[Option<Window>], id: WindowId) -> i32 {
    node(wins, id).map(|w| w.grid.height).unwrap_or(0)
}

pub(crate) fn abs_x(wins: &[Option<Window>], id: WindowId) -> i32 {
    let Some(w) = node(wins, id) else { return 0 };
    let base = match w.relation.parent_point() {
        AnchorPoint::TopLeft | AnchorPoint::BottomLeft => {
            w.x + w.anchor.map(|a| abs_x(wins, a)).unwrap_or(0)
        }
        AnchorPoint::TopRight | AnchorPoint::BottomRight => match w.anchor {
            Some(a) => abs_x(wins, a) + win_width(wins, a) + w.x,
            None => w.x,
        },
        AnchorPoint::Absolute => w.x,
    };
    match w.relation.own_point() {
        AnchorPoint::TopRight | AnchorPoint::BottomRight => base - w.grid.width,
        _ => base,
    }
}

pub(crate) fn abs_y(wins: &[Option<Window>], id: WindowId) -> i32 {
    let Some(w) = node(wins, id) else { return 0 };
    let base = match w.relation.parent_point() {
        AnchorPoint::TopLeft | AnchorPoint::TopRight => {
            w.y + w.anchor.map(|a| abs_y(wins, a)).unwrap_or(0)
        }
        AnchorPoint::BottomLeft | AnchorPoint::BottomRight => match w.anchor {
            Some(a) => abs_y(wins, a) + win_height(wins, a) + w.y,
            None => w.y,
        },
        AnchorPoint::Absolute => w.y,
    };
    match w.relation.own_point() {
        AnchorPoint::BottomLeft | AnchorPoint::BottomRight => base - w.grid.height,
        _ => base,
    }
}

/// Next window in back-to-front painting order after `id`: descend into the
/// child list first, then earlier siblings, then climb back to the parent's
/// earlier siblings. Hidden windows (and thereby their subtrees) are
/// skipped.
pub(crate) fn previous_window(wins: &[Option<Window>], id: WindowId) -> Option<WindowId> {
    let mut at = id;
    if let Some(w) = node(wins, at) {
        if w.shown {
            if let Some(tail) = w.tail {
                at = tail;
                if node(wins, at).map(|w| w.shown).unwrap_or(false) {
                    return Some(at);
                }
            }
        }
    }
    loop {
        while let Some(prev) = node(wins, at).and_then(|w| w.prev) {
            at = prev;
            if node(wins, at).map(|w| w.shown).unwrap_or(false) {
                return Some(at);
            }
        }
        match node(wins, at).and_then(|w| w.parent) {
            Some(parent) => at = parent,
            None => return None,
        }
    }
}

fn first_in_order(wins: &[Option<Window>], tail: Option<WindowId>) -> Option<WindowId> {
    let t = tail?;
    if node(wins, t).map(|w| w.shown).unwrap_or(false) {
        Some(t)
    } else {
        previous_window(wins, t)
    }
}

/// Effective clip rectangle `(x, max_x, y, max_y)`: ancestor chain plus the
/// restrict window, not yet clamped to the terminal.
fn clip_rect(wins: &[Option<Window>], id: WindowId, term_w: i32, term_h: i32) -> (i32, i32, i32, i32) {
    let Some(win) = node(wins, id) else {
        return (0, term_w, 0, term_h);
    };
    let (mut x, mut max_x, mut y, mut max_y) = if win.parent.is_none() {
        (0, term_w, 0, term_h)
    } else {
        let mut rect = (i32::MIN, i32::MAX, i32::MIN, i32::MAX);
        let mut up = win.parent;
        while let Some(p) = up {
            let px = abs_x(wins, p);
            let py = abs_y(wins, p);
            rect.0 = rect.0.max(px);
            rect.1 = rect.1.min(px + win_width(wins, p));
            rect.2 = rect.2.max(py);
            rect.3 = rect.3.min(py + win_height(wins, p));
            up = node(wins, p).and_then(|w| w.parent);
        }
        rect
    };
    if let Some(c) = win.clamp {
        let cx = abs_x(wins, c);
        let cy = abs_y(wins, c);
        x = x.max(cx);
        max_x = max_x.min(cx + win_width(wins, c));
        y = y.max(cy);
        max_y = max_y.min(cy + win_height(wins, c));
    }
    (x, max_x, y, max_y)
}

fn write_spaces(scratch: &mut Grid, attrs: &mut AttrMap, attr_idx: u32, count: i32) -> bool {
    if count <= 0 {
        return true;
    }
    let space = block::space_block(attr_idx);
    let mut run = Vec::with_capacity(space.len() * count.min(64) as usize);
    for _ in 0..count.min(64) {
        run.extend_from_slice(&space);
    }
    let mut remaining = count;
    let mut ok = true;
    while remaining > 0 {
        let chunk = remaining.min(64);
        ok &= scratch.write_blocks(attrs, &run[..chunk as usize * space.len()]);
        remaining -= chunk;
    }
    ok
}

impl Screen {
    /// Recompose one terminal row into the scratch shadow.
    pub fn compose_line(&mut self, line: i32) -> bool {
        let Screen {
            wins,
            scratch,
            attrs,
            tail,
            ..
        } = self;
        let wins: &[Option<Window>] = wins;
        let term_w = scratch.width;
        let term_h = scratch.height;
        let mut ok = true;

        if let Some(l) = scratch.line_mut(line) {
            l.clear();
        } else {
            return false;
        }
        scratch.paint_y = line;

        let mut at = first_in_order(wins, *tail);
        while let Some(id) = at {
            at = previous_window(wins, id);
            let Some(win) = node(wins, id) else { continue };
            if !win.grid.is_backed() {
                continue;
            }
            let y = abs_y(wins, id);
            if y > line || y + win.grid.height <= line {
                continue;
            }
            let (clip_x, clip_max_x, clip_y, clip_max_y) = clip_rect(wins, id, term_w, term_h);
            if line < clip_y || line >= clip_max_y {
                continue;
            }
            let clip_x = clip_x.max(0);
            let clip_max_x = clip_max_x.min(term_w);
            let Some(draw) = win.grid.line(line - y) else {
                continue;
            };
            let x = abs_x(wins, id);
            if x >= clip_max_x || x + draw.start + draw.width < clip_x {
                continue;
            }
            let default_attrs = win.grid.default_attrs;
            let win_w = win.grid.width;
            let bytes = draw.bytes();
            let (draw_start, draw_width) = (draw.start, draw.width);

            let mut data_start = 0usize;
            if x + draw_start >= clip_x {
                // Leading implicit blank is visible from its left edge.
                let lead = if x + draw_start > clip_max_x {
                    clip_max_x - x
                } else {
                    draw_start
                };
                if default_attrs == Attr::empty() {
                    scratch.paint_x = x + lead;
                } else if x >= clip_x {
                    scratch.paint_x = x;
                    let idx = attrs.index_of(default_attrs);
                    ok &= write_spaces(scratch, attrs, idx, lead);
                } else {
                    scratch.paint_x = clip_x;
                    let idx = attrs.index_of(default_attrs);
                    ok &= write_spaces(scratch, attrs, idx, lead - clip_x + x);
                }
            } else {
                // Skip blocks entirely left of the clip; a double-width
                // block straddling it leaves its right half as a space.
                scratch.paint_x = clip_x;
                let mut col = x + draw_start;
                let mut crossing = None;
                while let Some(b) = block::parse(bytes, data_start) {
                    if col + b.width > scratch.paint_x {
                        crossing = Some(b);
                        break;
                    }
                    col += b.width;
                    data_start = b.end;
                }
                if let Some(b) = crossing {
                    if col < scratch.paint_x {
                        col += b.width;
                        ok &= write_spaces(scratch, attrs, b.attr_idx, col - scratch.paint_x);
                        data_start = b.end;
                    }
                }
            }

            // The run of blocks that fit inside the right clip edge.
            let mut col = scratch.paint_x;
            let mut run_end = data_start;
            while let Some(b) = block::parse(bytes, run_end) {
                if col + b.width > clip_max_x {
                    break;
                }
                col += b.width;
                run_end = b.end;
            }
            if run_end != data_start {
                ok &= scratch.write_blocks(attrs, &bytes[data_start..run_end]);
            }
            // A double-width cell crossing the right clip edge becomes a space.
            if run_end < bytes.len() && col == clip_max_x - 1 {
                if let Some(b) = block::parse(bytes, run_end) {
                    ok &= write_spaces(scratch, attrs, b.attr_idx, 1);
                }
            }

            if default_attrs != Attr::empty()
                && draw_start + draw_width < win_w
                && x + draw_start + draw_width < clip_max_x
            {
                let count = if x + win_w <= clip_max_x {
                    win_w - draw_start - draw_width
                } else {
                    clip_max_x - x - draw_start - draw_width
                };
                let idx = attrs.index_of(default_attrs);
                ok &= write_spaces(scratch, attrs, idx, count);
            }
        }

        // A terminal default that is more than a foreground color must reach
        // the edges even of otherwise empty lines.
        if scratch.default_attrs.bits() & !FG_MASK != 0 {
            let idx = attrs.index_of(scratch.default_attrs);
            let (start, width) = scratch
                .line(line)
                .map(|l| (l.start, l.width))
                .unwrap_or((0, 0));
            if start != 0 {
                scratch.paint_x = 0;
                ok &= write_spaces(scratch, attrs, idx, 1);
            }
            if width + start < term_w {
                if width == 0 {
                    scratch.paint_x = 0;
                    ok &= write_spaces(scratch, attrs, idx, 1);
                }
                scratch.paint_x = term_w - 1;
                ok &= write_spaces(scratch, attrs, idx, 1);
            }
        }

        trace!(line, ok, "composed terminal row");
        ok
    }
}

/// Topmost visible window covering terminal cell `(y, x)`, honoring the
/// ancestor clipping chain.
pub fn window_at(screen: &Screen, y: i32, x: i32) -> Option<WindowId> {
    let wins = screen.wins_slice();
    let (term_h, term_w) = {
        let (h, w) = screen.term_size();
        (h, w)
    };
    let mut result = None;
    let mut at = first_in_order(wins, screen.top_tail());
    while let Some(id) = at {
        at = previous_window(wins, id);
        let Some(win) = node(wins, id) else { continue };
        let wy = abs_y(wins, id);
        if wy > y || wy + win.grid.height <= y {
            continue;
        }
        let wx = abs_x(wins, id);
        if wx > x || wx + win.grid.width <= x {
            continue;
        }
        let (cx, cmax_x, cy, cmax_y) = clip_rect(wins, id, term_w, term_h);
        if y < cy || y >= cmax_y || x < cx || x >= cmax_x {
            continue;
        }
        result = Some(id);
    }
    result
}
