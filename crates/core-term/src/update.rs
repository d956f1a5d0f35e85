//! The diff/flush engine: compare the believed and freshly composed state
//! of a terminal row and emit the cheapest byte sequence that reconciles
//! them.
//!
//! Rows are compared cell by cell (implicit leading blanks materialized as
//! default-attribute spaces). The common prefix is skipped, a common suffix
//! is elided only when both rows span the same columns, and a row that got
//! narrower ends in erase-to-EOL, preceded by an attribute reset when the
//! terminal erases in the active background color.

use core_attr::{Attr, AttrMap};
use core_caps::Capabilities;
use core_cells::LineData;

use crate::attrs::{putp, putp_params, set_attrs};
use crate::encode::Wire;
use crate::io::TermIo;

/// The only sink a user attribute callback may write through.
pub struct Emitter<'a> {
    wire: &'a mut Wire,
}

impl Emitter<'_> {
    pub fn putc(&mut self, b: u8) {
        self.wire.putc(b);
    }

    pub fn puts(&mut self, s: &str) {
        self.wire.puts(s);
    }

    pub fn putn(&mut self, bytes: &[u8]) {
        self.wire.putn(bytes);
    }
}

/// Callback drawing cells that carry the USER attribute: receives the cell
/// text, its width, and the full attribute word.
pub type UserCallback = Box<dyn FnMut(&mut Emitter<'_>, &[u8], i32, Attr)>;

/// Move the terminal cursor, preferring `cup`, then `vpa`+`hpa`, then
/// `home` plus relative motion.
pub(crate) fn do_cup(wire: &mut Wire, io: &mut dyn TermIo, caps: &Capabilities, line: i32, col: i32) {
    if let Some(cup) = &caps.strs.cup {
        putp_params(wire, io, cup, &[line as i64, col as i64]);
        return;
    }
    if let (Some(vpa), Some(hpa)) = (&caps.strs.vpa, &caps.strs.hpa) {
        putp_params(wire, io, vpa, &[line as i64]);
        putp_params(wire, io, hpa, &[col as i64]);
        return;
    }
    if let Some(home) = &caps.strs.home {
        putp(wire, io, home);
        if line > 0 {
            if let Some(cud) = &caps.strs.cud {
                putp_params(wire, io, cud, &[line as i64]);
            } else if let Some(cud1) = &caps.strs.cud1 {
                for _ in 0..line {
                    putp(wire, io, cud1);
                }
            }
        }
        if col > 0 {
            if let Some(cuf) = &caps.strs.cuf {
                putp_params(wire, io, cuf, &[col as i64]);
            } else if let Some(cuf1) = &caps.strs.cuf1 {
                for _ in 0..col {
                    putp(wire, io, cuf1);
                }
            }
        }
    }
}

#[derive(PartialEq, Eq)]
struct Cell<'a> {
    width: i32,
    attr_idx: u32,
    text: &'a [u8],
}

/// One logical cell per cluster, with the implicit leading blank expanded.
fn cells_of(line: &LineData, blank_idx: u32) -> Vec<Cell<'_>> {
    let mut cells = Vec::with_capacity((line.start + line.width).max(0) as usize);
    for _ in 0..line.start {
        cells.push(Cell {
            width: 1,
            attr_idx: blank_idx,
            text: b" ",
        });
    }
    for b in line.blocks() {
        cells.push(Cell {
            width: b.width,
            attr_idx: b.attr_idx,
            text: b.text,
        });
    }
    cells
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn diff_line(
    wire: &mut Wire,
    io: &mut dyn TermIo,
    caps: &Capabilities,
    attr_map: &AttrMap,
    callback: &mut Option<UserCallback>,
    old: &LineData,
    new: &LineData,
    line: i32,
    term_w: i32,
    blank_idx: u32,
) {
    let old_cells = cells_of(old, blank_idx);
    let new_cells = cells_of(new, blank_idx);

    let mut prefix = 0usize;
    while prefix < old_cells.len()
        && prefix < new_cells.len()
        && old_cells[prefix] == new_cells[prefix]
    {
        prefix += 1;
    }
    if prefix == old_cells.len() && prefix == new_cells.len() {
        return;
    }

    let old_total = old.start + old.width;
    let new_total = new.start + new.width;
    // The suffix can only be kept when both rows span the same columns.
    let mut suffix = 0usize;
    if old_total == new_total {
        while suffix < old_cells.len() - prefix
            && suffix < new_cells.len() - prefix
            && old_cells[old_cells.len() - 1 - suffix] == new_cells[new_cells.len() - 1 - suffix]
        {
            suffix += 1;
        }
    }

    let col: i32 = new_cells[..prefix].iter().map(|c| c.width).sum();
    do_cup(wire, io, caps, line, col);

    let mut width = col;
    for cell in &new_cells[prefix..new_cells.len() - suffix] {
        let attr = attr_map.get(cell.attr_idx);
        if attr.contains(Attr::USER) {
            if let Some(cb) = callback {
                cb(&mut Emitter { wire }, cell.text, cell.width, attr);
                width += cell.width;
                continue;
            }
        }
        let wanted = attr.difference(Attr::USER | Attr::FALLBACK_ACS);
        if wanted != wire.attrs_now {
            set_attrs(wire, io, caps, wanted);
        }
        if wire.attrs_now.contains(Attr::ACS) {
            for &b in cell.text {
                wire.putc(caps.acs_byte(b));
            }
        } else {
            wire.putn(cell.text);
        }
        width += cell.width;
    }

    if new_total < old_total && width < term_w {
        // Erasing paints the active background on bce terminals.
        if caps.bce && wire.attrs_now.bits() & !core_attr::FG_MASK != 0 {
            set_attrs(wire, io, caps, Attr::empty());
        }
        match &caps.strs.el {
            Some(el) => putp(wire, io, el),
            None => {
                let max = old_total.min(term_w);
                for _ in width..max {
                    wire.putc(b' ');
                }
            }
        }
    }
    wire.flush_text(io);
}
