//! Terminal capability store.
//!
//! Loads the terminfo-derived control strings and numbers the rest of the
//! library needs, derives the ANSI-certification mask (which attribute
//! transitions may be collapsed into a single `ESC[..m` string), the
//! reset-required mask (attributes whose exit sequence is a full reset), the
//! non-color-video set, and the alternate-character-set tables.

pub mod params;
mod source;

use core_attr::{Attr, BG_MASK, FG_MASK};
use thiserror::Error;
use tracing::debug;

pub use source::{StaticTerminfo, TerminfoSource};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CapsError {
    #[error("terminal is a hardcopy terminal")]
    HardcopyTerminal,
    #[error("no information found in terminfo database")]
    TerminfoDbNotFound,
    #[error("terminal provides too limited functionality")]
    TerminalTooLimited,
}

/// How the alternate character set should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcsOverride {
    #[default]
    Auto,
    Ascii,
    Utf8,
}

/// Options from the `CELLWIN_OPTS` environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub acs_override: AcsOverride,
    pub colors: Option<i32>,
    pub pairs: Option<i32>,
    pub ansi_off: bool,
}

impl Options {
    pub fn from_env() -> Options {
        match std::env::var("CELLWIN_OPTS") {
            Ok(value) => Options::parse(&value),
            Err(_) => Options::default(),
        }
    }

    /// Parse space-separated option tokens; unknown tokens are ignored.
    pub fn parse(spec: &str) -> Options {
        let mut opts = Options::default();
        for token in spec.split_whitespace() {
            match token {
                "acs=ascii" => opts.acs_override = AcsOverride::Ascii,
                "acs=utf8" => opts.acs_override = AcsOverride::Utf8,
                "acs=auto" => opts.acs_override = AcsOverride::Auto,
                "ansi=off" => opts.ansi_off = true,
                _ => {
                    if let Some(v) = token.strip_prefix("colors=") {
                        opts.colors = v.parse().ok();
                    } else if let Some(v) = token.strip_prefix("pairs=") {
                        opts.pairs = v.parse().ok();
                    }
                }
            }
        }
        opts
    }
}

/// The terminal control strings the library emits.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CapStrings {
    pub smcup: Option<String>,
    pub rmcup: Option<String>,
    pub cup: Option<String>,
    pub hpa: Option<String>,
    pub vpa: Option<String>,
    pub clear: Option<String>,
    pub home: Option<String>,
    pub cud: Option<String>,
    pub cud1: Option<String>,
    pub cuf: Option<String>,
    pub cuf1: Option<String>,
    pub sc: Option<String>,
    pub rc: Option<String>,
    pub civis: Option<String>,
    pub cnorm: Option<String>,
    pub el: Option<String>,
    pub sgr: Option<String>,
    pub sgr0: Option<String>,
    pub smul: Option<String>,
    pub rmul: Option<String>,
    pub smacs: Option<String>,
    pub rmacs: Option<String>,
    pub rev: Option<String>,
    pub bold: Option<String>,
    pub blink: Option<String>,
    pub dim: Option<String>,
    pub setaf: Option<String>,
    pub setab: Option<String>,
    pub setf: Option<String>,
    pub setb: Option<String>,
    pub op: Option<String>,
    pub scp: Option<String>,
    pub enacs: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub strs: CapStrings,
    /// Attributes certified safe to emit through a single ANSI mode string.
    pub ansi_attrs: Attr,
    /// Attributes that can only be turned off by a full attribute reset.
    pub reset_required: Attr,
    /// Attributes that cannot be combined with color.
    pub ncv: Attr,
    /// Erase operations paint the current background color.
    pub bce: bool,
    pub colors: i32,
    pub pairs: i32,
    /// Terminal ACS translation table from the `acsc` capability.
    acs_map: [u8; 256],
    pub acs_override: AcsOverride,
}

impl Capabilities {
    /// A capability set with nothing in it, for headless composition tests.
    pub fn plain() -> Capabilities {
        Capabilities {
            strs: CapStrings::default(),
            ansi_attrs: Attr::empty(),
            reset_required: Attr::empty(),
            ncv: Attr::empty(),
            bce: false,
            colors: 0,
            pairs: 0,
            acs_map: [0; 256],
            acs_override: AcsOverride::Ascii,
        }
    }

    /// Load and certify capabilities from a terminfo source.
    pub fn load(src: &dyn TerminfoSource, opts: &Options) -> Result<Capabilities, CapsError> {
        if src.is_hardcopy() {
            return Err(CapsError::HardcopyTerminal);
        }

        let get = |name: &str| src.str_cap(name).map(str::to_owned);
        let mut strs = CapStrings {
            smcup: get("smcup"),
            rmcup: get("rmcup"),
            cup: get("cup"),
            hpa: get("hpa"),
            vpa: get("vpa"),
            clear: get("clear"),
            home: get("home"),
            cud: get("cud"),
            cud1: get("cud1"),
            cuf: get("cuf"),
            cuf1: get("cuf1"),
            sc: get("sc"),
            rc: get("rc"),
            civis: get("civis"),
            cnorm: get("cnorm"),
            el: get("el"),
            sgr: get("sgr"),
            sgr0: get("sgr0"),
            smul: get("smul"),
            rmul: get("rmul"),
            smacs: get("smacs"),
            rmacs: get("rmacs"),
            rev: get("rev"),
            bold: get("bold"),
            blink: get("blink"),
            dim: get("dim"),
            setaf: get("setaf"),
            setab: get("setab"),
            setf: None,
            setb: None,
            op: get("op"),
            scp: None,
            enacs: get("enacs"),
        };

        // smcup/rmcup only make sense as a pair.
        if strs.rmcup.is_none() {
            strs.smcup = None;
        }
        if strs.clear.is_none() {
            return Err(CapsError::TerminalTooLimited);
        }
        if strs.cup.is_none() && (strs.hpa.is_none() || strs.vpa.is_none()) {
            return Err(CapsError::TerminalTooLimited);
        }

        let mut reset_required = Attr::BOLD | Attr::REVERSE | Attr::BLINK | Attr::DIM;
        let sgr0 = strs.sgr0.clone();
        if strs.smul.is_some() {
            match &strs.rmul {
                Some(rmul) if !is_reset(rmul, sgr0.as_deref()) => {}
                _ => reset_required |= Attr::UNDERLINE,
            }
        }
        if strs.smacs.is_some() {
            match &strs.rmacs {
                Some(rmacs) if !is_reset(rmacs, sgr0.as_deref()) => {}
                _ => reset_required |= Attr::ACS,
            }
        }
        // Identical exit strings suggest both simply reset everything.
        if let (Some(rmul), Some(rmacs)) = (&strs.rmul, &strs.rmacs) {
            if rmul == rmacs {
                reset_required |= Attr::UNDERLINE | Attr::ACS;
            }
        }

        if strs.setaf.is_none() {
            strs.setf = get("setf");
        }
        if strs.setab.is_none() {
            strs.setb = get("setb");
        }
        let mut colors;
        let mut pairs;
        if strs.setaf.is_none() && strs.setf.is_none() && strs.setab.is_none() && strs.setb.is_none()
        {
            strs.scp = get("scp");
            colors = if strs.scp.is_some() {
                src.num_cap("colors").unwrap_or(0)
            } else {
                0
            };
            pairs = if strs.scp.is_some() {
                src.num_cap("pairs").unwrap_or(0)
            } else {
                0
            };
        } else {
            colors = src.num_cap("colors").unwrap_or(0);
            pairs = src.num_cap("pairs").unwrap_or(0);
        }
        colors = colors.max(0);
        pairs = pairs.max(0);

        let mut ansi_attrs = detect_ansi(&strs, src);

        // Without any way to reset attributes, stay out of the modes that
        // would require one.
        if strs.sgr.is_none() && strs.sgr0.is_none() {
            reset_required = Attr::empty();
            strs.rev = None;
            strs.bold = None;
            strs.blink = None;
            strs.dim = None;
            if strs.rmul.is_none() {
                strs.smul = None;
            }
            if strs.rmacs.is_none() {
                strs.smacs = None;
            }
        }

        let mut bce = src.flag_cap("bce");
        if strs.el.is_none() {
            bce = true;
        }
        if strs.rc.is_none() {
            strs.sc = None;
        }

        let mut acs_map = [0u8; 256];
        if let Some(acsc) = src.str_cap("acsc") {
            if strs.sgr.is_some() || strs.smacs.is_some() {
                let bytes = acsc.as_bytes();
                for pair in bytes.chunks_exact(2) {
                    acs_map[pair[0] as usize] = pair[1];
                }
            }
        }

        let mut ncv = Attr::empty();
        if let Some(ncv_int) = src.num_cap("ncv") {
            if ncv_int >= 0 {
                if ncv_int & (1 << 1) != 0 {
                    ncv |= Attr::UNDERLINE;
                }
                if ncv_int & (1 << 2) != 0 {
                    ncv |= Attr::REVERSE;
                }
                if ncv_int & (1 << 3) != 0 {
                    ncv |= Attr::BLINK;
                }
                if ncv_int & (1 << 4) != 0 {
                    ncv |= Attr::DIM;
                }
                if ncv_int & (1 << 5) != 0 {
                    ncv |= Attr::BOLD;
                }
                if ncv_int & (1 << 8) != 0 {
                    ncv |= Attr::ACS;
                }
            }
        }

        if let Some(c) = opts.colors {
            if c > 0 && c <= 256 {
                colors = c;
            }
        }
        if let Some(p) = opts.pairs {
            if p > 0 {
                pairs = p;
            }
        }
        if opts.ansi_off {
            ansi_attrs = Attr::empty();
        }

        debug!(
            ansi = ?ansi_attrs,
            reset_required = ?reset_required,
            ncv = ?ncv,
            colors,
            pairs,
            bce,
            "capabilities loaded"
        );

        Ok(Capabilities {
            strs,
            ansi_attrs,
            reset_required,
            ncv,
            bce,
            colors,
            pairs,
            acs_map,
            acs_override: opts.acs_override,
        })
    }

    /// Whether the terminal's ACS provides a glyph for `c`.
    pub fn acs_available(&self, c: char) -> bool {
        (c as u32) < 256 && self.acs_map[c as usize] != 0
    }

    /// Terminal-native byte for an ACS character, space when absent.
    pub fn acs_byte(&self, c: u8) -> u8 {
        match self.acs_map[c as usize] {
            0 => b' ',
            b => b,
        }
    }

    /// Fallback rendition of an ACS character for terminals (or overrides)
    /// that cannot use the alternate character set. `utf8` selects the
    /// precomposed box-drawing glyphs over plain ASCII.
    pub fn default_acs(&self, c: char, utf8: bool) -> &'static str {
        let use_utf8 = match self.acs_override {
            AcsOverride::Ascii => false,
            AcsOverride::Utf8 => true,
            AcsOverride::Auto => utf8,
        };
        let (u, a) = default_acs_entry(c);
        if use_utf8 {
            u
        } else {
            a
        }
    }

    /// Can the terminal enter ACS mode at all?
    pub fn has_acs(&self) -> bool {
        self.strs.smacs.is_some() || self.ansi_attrs.contains(Attr::ACS)
    }
}

/// Fallback table for the alternate character set: terminfo ACS code to
/// (precomposed UTF-8 glyph, ASCII approximation).
fn default_acs_entry(c: char) -> (&'static str, &'static str) {
    match c {
        '}' => ("\u{a3}", "f"),
        '.' => ("\u{25bc}", "v"),
        ',' => ("\u{25c0}", "<"),
        '+' => ("\u{25b6}", ">"),
        '-' => ("\u{25b2}", "^"),
        'h' => ("\u{2592}", "#"),
        '~' => ("\u{b7}", "o"),
        'a' => ("\u{2592}", ":"),
        'f' => ("\u{b0}", "\\"),
        'z' => ("\u{2265}", ">"),
        '{' => ("\u{3c0}", "*"),
        'q' => ("\u{2500}", "-"),
        'i' => ("#", "#"),
        'n' => ("\u{253c}", "+"),
        'y' => ("\u{2264}", "<"),
        'm' => ("\u{2514}", "+"),
        'j' => ("\u{2518}", "+"),
        '|' => ("\u{2260}", "!"),
        'g' => ("\u{b1}", "#"),
        'o' => ("\u{23ba}", "~"),
        'p' => ("\u{23bb}", "-"),
        'r' => ("\u{23bc}", "-"),
        's' => ("\u{23bd}", "_"),
        '0' => ("\u{25ae}", "#"),
        'w' => ("\u{252c}", "+"),
        'u' => ("\u{2524}", "+"),
        't' => ("\u{251c}", "+"),
        'v' => ("\u{2534}", "+"),
        'l' => ("\u{250c}", "+"),
        'k' => ("\u{2510}", "+"),
        'x' => ("\u{2502}", "|"),
        '`' => ("\u{25c6}", "+"),
        _ => (" ", " "),
    }
}

/// Compare a terminfo string against a literal, ignoring `$<..>` padding.
fn ti_streq(value: &str, literal: &str) -> bool {
    let mut v = value.as_bytes();
    let lit = literal.as_bytes();
    let mut li = 0usize;
    loop {
        if v.len() >= 2 && v[0] == b'$' && v[1] == b'<' {
            let mut skip = 2;
            while skip < v.len() && v[skip] != b'>' {
                skip += 1;
            }
            v = &v[(skip + 1).min(v.len())..];
            continue;
        }
        match (v.first(), lit.get(li)) {
            (None, None) => return true,
            (Some(a), Some(b)) if a == b => {
                v = &v[1..];
                li += 1;
            }
            _ => return false,
        }
    }
}

/// Does this string reset all attributes?
fn is_reset(value: &str, sgr0: Option<&str>) -> bool {
    sgr0.map(|s| s == value).unwrap_or(false)
        || ti_streq(value, "\x1b[m")
        || ti_streq(value, "\x1b[0m")
}

/// Certify which attribute transitions may use literal ANSI sequences.
///
/// The exit sequences for underline and ACS are verifiable; bold, dim,
/// reverse and blink are only accepted when the terminal already proved
/// ANSI-compatible colors and every one of them that exists matches.
fn detect_ansi(strs: &CapStrings, src: &dyn TerminfoSource) -> Attr {
    let mut ansi = Attr::empty();
    let mut non_existent = Attr::empty();
    let eq = |v: &Option<String>, lit: &str| v.as_deref().map(|s| ti_streq(s, lit)).unwrap_or(false);

    const SETAF_256: &str = "\x1b[%?%p1%{8}%<%t3%p1%d%e%p1%{16}%<%t9%p1%{8}%-%d%e38;5;%p1%d%;m";
    const SETAB_256: &str = "\x1b[%?%p1%{8}%<%t4%p1%d%e%p1%{16}%<%t10%p1%{8}%-%d%e48;5;%p1%d%;m";

    if eq(&strs.op, "\x1b[39;49m") || eq(&strs.op, "\x1b[49;39m") {
        let setaf_ok = eq(&strs.setaf, "\x1b[3%p1%dm") || eq(&strs.setaf, SETAF_256);
        let setab_ok = eq(&strs.setab, "\x1b[4%p1%dm") || eq(&strs.setab, SETAB_256);
        if setaf_ok && setab_ok {
            ansi |= Attr::from_bits_retain(FG_MASK | BG_MASK);
        }
    }
    if eq(&strs.smul, "\x1b[4m") && eq(&strs.rmul, "\x1b[24m") {
        ansi |= Attr::UNDERLINE;
    }
    if eq(&strs.smacs, "\x1b[11m") && eq(&strs.rmacs, "\x1b[10m") {
        ansi |= Attr::ACS;
    }

    if ansi.bits() & (FG_MASK | BG_MASK) == 0
        || !ansi.intersects(Attr::UNDERLINE | Attr::ACS)
    {
        return ansi;
    }

    match &strs.rev {
        Some(rev) if ti_streq(rev, "\x1b[7m") => {
            // When standout is just reverse video, its exit sequence is
            // verifiable; otherwise assume the inverse sequence works.
            match (src.str_cap("smso"), src.str_cap("rmso")) {
                (Some(smso), Some(rmso)) if ti_streq(smso, rev.as_str()) => {
                    if ti_streq(rmso, "\x1b[27m") {
                        ansi |= Attr::REVERSE;
                    }
                }
                _ => ansi |= Attr::REVERSE,
            }
        }
        Some(_) => {}
        None => non_existent |= Attr::REVERSE,
    }
    match &strs.bold {
        Some(bold) if ti_streq(bold, "\x1b[1m") => ansi |= Attr::BOLD,
        Some(_) => {}
        None => non_existent |= Attr::BOLD,
    }
    match &strs.dim {
        Some(dim) if ti_streq(dim, "\x1b[2m") => ansi |= Attr::DIM,
        Some(_) => {}
        None => non_existent |= Attr::DIM,
    }
    match &strs.blink {
        Some(blink) if ti_streq(blink, "\x1b[5m") => ansi |= Attr::BLINK,
        Some(_) => {}
        None => non_existent |= Attr::BLINK,
    }

    // Only accept the intensity attributes when every one that exists is ANSI.
    let intensity = Attr::REVERSE | Attr::BOLD | Attr::DIM | Attr::BLINK;
    if (non_existent | ansi) & intensity != intensity {
        ansi &= !intensity;
    }
    ansi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_builtin(name: &str) -> Capabilities {
        let ti = StaticTerminfo::for_term(name).expect("builtin");
        Capabilities::load(&ti, &Options::default()).expect("load")
    }

    #[test]
    fn xterm256_certifies_colors_and_intensity() {
        let caps = load_builtin("xterm-256color");
        assert_eq!(caps.colors, 256);
        assert!(caps.ansi_attrs.bits() & FG_MASK != 0);
        assert!(caps.ansi_attrs.contains(Attr::UNDERLINE));
        assert!(caps.ansi_attrs.contains(Attr::REVERSE | Attr::BOLD | Attr::DIM | Attr::BLINK));
        // xterm switches charsets with \x1b(0, not ESC[11m.
        assert!(!caps.ansi_attrs.contains(Attr::ACS));
        assert!(caps.bce);
    }

    #[test]
    fn vt100_is_not_ansi_certified() {
        let caps = load_builtin("vt100");
        assert_eq!(caps.ansi_attrs.bits() & (FG_MASK | BG_MASK), 0);
        assert_eq!(caps.colors, 0);
        // rmul on vt100 is a full reset, so underline requires one.
        assert!(caps.reset_required.contains(Attr::UNDERLINE));
    }

    #[test]
    fn dumb_terminal_is_too_limited() {
        let ti = StaticTerminfo::for_term("dumb").unwrap();
        assert_eq!(
            Capabilities::load(&ti, &Options::default()),
            Err(CapsError::TerminalTooLimited)
        );
    }

    #[test]
    fn hardcopy_is_rejected() {
        let ti = StaticTerminfo::hardcopy();
        assert_eq!(
            Capabilities::load(&ti, &Options::default()),
            Err(CapsError::HardcopyTerminal)
        );
    }

    #[test]
    fn ncv_bits_decode() {
        let ti = StaticTerminfo::for_term("xterm").unwrap().with_num("ncv", (1 << 1) | (1 << 5));
        let caps = Capabilities::load(&ti, &Options::default()).unwrap();
        assert_eq!(caps.ncv, Attr::UNDERLINE | Attr::BOLD);
    }

    #[test]
    fn options_parsing() {
        let opts = Options::parse("acs=ascii colors=256 ansi=off pairs=32");
        assert_eq!(opts.acs_override, AcsOverride::Ascii);
        assert_eq!(opts.colors, Some(256));
        assert_eq!(opts.pairs, Some(32));
        assert!(opts.ansi_off);
        assert_eq!(Options::parse("bogus"), Options::default());
    }

    #[test]
    fn ansi_off_clears_certification() {
        let ti = StaticTerminfo::for_term("xterm-256color").unwrap();
        let caps = Capabilities::load(
            &ti,
            &Options {
                ansi_off: true,
                ..Options::default()
            },
        )
        .unwrap();
        assert_eq!(caps.ansi_attrs, Attr::empty());
    }

    #[test]
    fn ti_streq_ignores_padding() {
        assert!(ti_streq("\x1b[K$<3>", "\x1b[K"));
        assert!(ti_streq("\x1b[m", "\x1b[m"));
        assert!(!ti_streq("\x1b[L", "\x1b[K"));
    }

    #[test]
    fn acs_map_built_from_acsc() {
        let caps = load_builtin("xterm-256color");
        assert!(caps.acs_available('q'));
        assert_eq!(caps.acs_byte(b'q'), b'q');
        assert!(!caps.acs_available('Q'));
        assert_eq!(caps.default_acs('q', true), "\u{2500}");
        assert_eq!(caps.default_acs('q', false), "-");
    }
}
