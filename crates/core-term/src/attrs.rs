//! The attribute engine: turn an attribute transition into the cheapest
//! sequence the capability store certified.
//!
//! Transitions split into a non-ANSI half (sgr / sgr0-and-reapply /
//! individual enter-exit strings, then op/setaf/setab/setf/setb/scp for
//! colors) and an ANSI half collapsed into a single `ESC[..m` string for
//! the attributes the certification proved literal-ANSI.

use core_attr::{Attr, BASIC_ATTRS, BG_MASK, COLOR_DEFAULT, FG_MASK};
use core_caps::{params, Capabilities};

use crate::encode::Wire;
use crate::io::TermIo;

/// Write a capability string (padding stripped) after flushing pending text.
pub(crate) fn putp(wire: &mut Wire, io: &mut dyn TermIo, cap: &str) {
    wire.flush_text(io);
    io.write(params::expand(cap, &[]).as_bytes());
}

pub(crate) fn putp_opt(wire: &mut Wire, io: &mut dyn TermIo, cap: &Option<String>) {
    if let Some(cap) = cap {
        putp(wire, io, cap);
    }
}

/// Write a parameterized capability.
pub(crate) fn putp_params(wire: &mut Wire, io: &mut dyn TermIo, cap: &str, args: &[i64]) {
    wire.flush_text(io);
    io.write(params::expand(cap, args).as_bytes());
}

fn sgr_args(attrs: Attr) -> [i64; 9] {
    [
        0,
        attrs.contains(Attr::UNDERLINE) as i64,
        attrs.contains(Attr::REVERSE) as i64,
        attrs.contains(Attr::BLINK) as i64,
        attrs.contains(Attr::DIM) as i64,
        attrs.contains(Attr::BOLD) as i64,
        0,
        0,
        attrs.contains(Attr::ACS) as i64,
    ]
}

/// Non-ANSI color table: ANSI color number to `setf`/`setb` argument.
const ALT_COLOR: [i64; 8] = [0, 4, 2, 6, 1, 5, 3, 7];

/// Switch the terminal to `new_attrs`, updating `wire.attrs_now`.
pub(crate) fn set_attrs(wire: &mut Wire, io: &mut dyn TermIo, caps: &Capabilities, new_attrs: Attr) {
    wire.flush_text(io);
    let new_attrs = new_attrs.difference(Attr::USER | Attr::FALLBACK_ACS);

    if new_attrs == Attr::empty() && (caps.strs.sgr0.is_some() || caps.strs.sgr.is_some()) {
        // Prefer sgr: more widely exercised than sgr0 in the wild.
        if let Some(sgr) = &caps.strs.sgr {
            putp_params(wire, io, sgr, &sgr_args(Attr::empty()));
        } else if let Some(sgr0) = &caps.strs.sgr0 {
            putp(wire, io, sgr0);
        }
        wire.attrs_now = Attr::empty();
        return;
    }

    let changed = new_attrs.symmetric_difference(wire.attrs_now) & !caps.ansi_attrs;
    if changed != Attr::empty() {
        set_attrs_non_ansi(wire, io, caps, new_attrs);
    }

    let changed = new_attrs.symmetric_difference(wire.attrs_now) & caps.ansi_attrs;
    if changed == Attr::empty() {
        wire.attrs_now = new_attrs;
        return;
    }

    let mut seq = String::from("\x1b");
    let mut sep = '[';
    let mut push = |seq: &mut String, part: &str| {
        seq.push(sep);
        sep = ';';
        seq.push_str(part);
    };

    if changed.contains(Attr::UNDERLINE) {
        push(&mut seq, if new_attrs.contains(Attr::UNDERLINE) { "4" } else { "24" });
    }
    if changed.intersects(Attr::BOLD | Attr::DIM) {
        push(
            &mut seq,
            if new_attrs.contains(Attr::BOLD) {
                "1"
            } else if new_attrs.contains(Attr::DIM) {
                "2"
            } else {
                "22"
            },
        );
    }
    if changed.contains(Attr::REVERSE) {
        push(&mut seq, if new_attrs.contains(Attr::REVERSE) { "7" } else { "27" });
    }
    if changed.contains(Attr::BLINK) {
        push(&mut seq, if new_attrs.contains(Attr::BLINK) { "5" } else { "25" });
    }
    if changed.contains(Attr::ACS) {
        push(&mut seq, if new_attrs.contains(Attr::ACS) { "11" } else { "10" });
    }
    if changed.bits() & FG_MASK != 0 {
        push(&mut seq, &ansi_color(new_attrs.fg_field(), false));
    }
    if changed.bits() & BG_MASK != 0 {
        push(&mut seq, &ansi_color(new_attrs.bg_field(), true));
    }
    seq.push('m');
    io.write(seq.as_bytes());
    wire.attrs_now = new_attrs;
}

/// The literal ANSI parameter for a color field.
fn ansi_color(field: u32, background: bool) -> String {
    let (normal, bright, extended, default) = if background {
        ("4", "10", "48;5;", "49")
    } else {
        ("3", "9", "38;5;", "39")
    };
    match field {
        0 | COLOR_DEFAULT => default.to_string(),
        1..=8 => format!("{}{}", normal, field - 1),
        9..=16 => format!("{}{}", bright, field - 9),
        _ => format!("{}{}", extended, field - 1),
    }
}

fn set_attrs_non_ansi(wire: &mut Wire, io: &mut dyn TermIo, caps: &Capabilities, new_attrs: Attr) {
    let non_ansi = |a: Attr| a & BASIC_ATTRS & !caps.ansi_attrs;
    let mut attrs_basic = non_ansi(wire.attrs_now);
    let new_basic = non_ansi(new_attrs);

    if attrs_basic != new_basic {
        // Turning off an attribute that only a full reset can clear.
        if attrs_basic & !new_attrs & caps.reset_required != Attr::empty() {
            if let Some(sgr) = &caps.strs.sgr {
                putp_params(wire, io, sgr, &sgr_args(new_attrs));
                wire.attrs_now = new_attrs.without_colors();
                attrs_basic = non_ansi(wire.attrs_now);
            } else if let Some(sgr0) = &caps.strs.sgr0 {
                putp(wire, io, sgr0);
                wire.attrs_now = Attr::empty();
                attrs_basic = Attr::empty();
            }
        }

        // Whatever still differs has an individual enter/exit sequence.
        let changed = attrs_basic.symmetric_difference(new_basic);
        if changed.contains(Attr::UNDERLINE) {
            putp_opt(
                wire,
                io,
                if new_attrs.contains(Attr::UNDERLINE) {
                    &caps.strs.smul
                } else {
                    &caps.strs.rmul
                },
            );
        }
        if changed.contains(Attr::REVERSE) {
            putp_opt(wire, io, &caps.strs.rev);
        }
        if changed.contains(Attr::BLINK) {
            putp_opt(wire, io, &caps.strs.blink);
        }
        if changed.contains(Attr::DIM) {
            putp_opt(wire, io, &caps.strs.dim);
        }
        if changed.contains(Attr::BOLD) {
            putp_opt(wire, io, &caps.strs.bold);
        }
        if changed.contains(Attr::ACS) {
            putp_opt(
                wire,
                io,
                if new_attrs.contains(Attr::ACS) {
                    &caps.strs.smacs
                } else {
                    &caps.strs.rmacs
                },
            );
        }
        wire.attrs_now = (wire.attrs_now & !(BASIC_ATTRS & !caps.ansi_attrs)) | new_basic;
    }

    // Colors handled by the ANSI half when fully certified.
    if caps.ansi_attrs.bits() & (FG_MASK | BG_MASK) == FG_MASK | BG_MASK {
        return;
    }

    // An explicit default is the same as unspecified from here on.
    let mut new_attrs = new_attrs;
    if new_attrs.fg_field() == COLOR_DEFAULT {
        new_attrs = new_attrs.difference(new_attrs.fg_part());
    }
    if new_attrs.bg_field() == COLOR_DEFAULT {
        new_attrs = new_attrs.difference(new_attrs.bg_part());
    }

    let cur = wire.attrs_now;
    let fg_to_default = cur.fg_field() != new_attrs.fg_field() && new_attrs.fg_field() == 0;
    let bg_to_default = cur.bg_field() != new_attrs.bg_field() && new_attrs.bg_field() == 0;
    if (fg_to_default || bg_to_default) && caps.strs.op.is_some() {
        putp_opt(wire, io, &caps.strs.op);
        wire.attrs_now = cur.without_colors();
    }

    if wire.attrs_now.fg_field() != new_attrs.fg_field() && new_attrs.fg_field() != 0 {
        let field = new_attrs.fg_field();
        if let Some(setaf) = &caps.strs.setaf {
            putp_params(wire, io, setaf, &[(field - 1) as i64]);
        } else if let Some(setf) = &caps.strs.setf {
            if (1..=8).contains(&field) {
                putp_params(wire, io, setf, &[ALT_COLOR[(field - 1) as usize]]);
            }
        } else if let Some(scp) = &caps.strs.scp {
            // Color-pair terminals: the foreground field carries the pair.
            putp_params(wire, io, scp, &[(field - 1) as i64]);
        }
    }
    if wire.attrs_now.bg_field() != new_attrs.bg_field() && new_attrs.bg_field() != 0 {
        let field = new_attrs.bg_field();
        if let Some(setab) = &caps.strs.setab {
            putp_params(wire, io, setab, &[(field - 1) as i64]);
        } else if let Some(setb) = &caps.strs.setb {
            if (1..=8).contains(&field) {
                putp_params(wire, io, setb, &[ALT_COLOR[(field - 1) as usize]]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SimIo;
    use core_caps::{Options, StaticTerminfo};

    fn xterm() -> Capabilities {
        let ti = StaticTerminfo::for_term("xterm-256color").expect("builtin");
        Capabilities::load(&ti, &Options::default()).expect("caps")
    }

    fn emit(caps: &Capabilities, transitions: &[Attr]) -> String {
        let mut wire = Wire::new();
        let mut sim = SimIo::new(24, 80);
        for attr in transitions {
            set_attrs(&mut wire, &mut sim, caps, *attr);
        }
        sim.flush().unwrap();
        sim.output_text()
    }

    #[test]
    fn ansi_fastpath_merges_changes() {
        let caps = xterm();
        // Underline, bold and red collapse into one mode string.
        let out = emit(&caps, &[Attr::UNDERLINE | Attr::BOLD | Attr::fg(1)]);
        assert_eq!(out, "\x1b[4;1;31m");
    }

    #[test]
    fn repeated_attrs_emit_nothing() {
        let caps = xterm();
        let once = emit(&caps, &[Attr::BOLD]);
        let twice = emit(&caps, &[Attr::BOLD, Attr::BOLD]);
        assert_eq!(once, twice);
    }

    #[test]
    fn reset_uses_sgr() {
        let caps = xterm();
        let out = emit(&caps, &[Attr::BOLD, Attr::empty()]);
        assert!(out.ends_with("\x1b(B\x1b[0m"));
    }

    #[test]
    fn default_color_parameter() {
        let caps = xterm();
        let out = emit(&caps, &[Attr::fg(1), Attr::FG_DEFAULT]);
        assert!(out.contains("\x1b[31m"));
        assert!(out.contains("39"));
    }

    #[test]
    fn extended_palette_uses_colon_form() {
        let caps = xterm();
        let out = emit(&caps, &[Attr::fg(123)]);
        assert!(out.contains("38;5;123"));
    }

    #[test]
    fn non_ansi_terminal_uses_mode_strings() {
        let ti = StaticTerminfo::for_term("vt100").expect("builtin");
        let caps = Capabilities::load(&ti, &Options::default()).expect("caps");
        let out = emit(&caps, &[Attr::BOLD]);
        assert_eq!(out, "\x1b[1m");
        // Dropping bold requires a reset on vt100 (no exit-bold string).
        let out = emit(&caps, &[Attr::BOLD | Attr::UNDERLINE, Attr::UNDERLINE]);
        assert!(out.contains("\x1b[0;4m") || out.contains("\x1b[m"));
    }
}
