//! Terminfo lookup as a trait, plus a map-backed implementation with builtin
//! entries for common terminals so tests and the demo run without a
//! terminfo database on disk.

use std::collections::HashMap;

/// Capability lookup by terminfo name (`cup`, `sgr`, `ncv`, ...).
pub trait TerminfoSource {
    fn str_cap(&self, name: &str) -> Option<&str>;
    fn num_cap(&self, name: &str) -> Option<i32>;
    fn flag_cap(&self, name: &str) -> bool;
    /// Printer-style terminal without cursor addressing.
    fn is_hardcopy(&self) -> bool {
        false
    }
}

/// An in-memory capability record.
#[derive(Debug, Default, Clone)]
pub struct StaticTerminfo {
    strings: HashMap<&'static str, String>,
    numbers: HashMap<&'static str, i32>,
    flags: Vec<&'static str>,
    hardcopy: bool,
}

impl StaticTerminfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_str(mut self, name: &'static str, value: &str) -> Self {
        self.strings.insert(name, value.to_string());
        self
    }

    pub fn with_num(mut self, name: &'static str, value: i32) -> Self {
        self.numbers.insert(name, value);
        self
    }

    pub fn with_flag(mut self, name: &'static str) -> Self {
        self.flags.push(name);
        self
    }

    pub fn hardcopy() -> Self {
        StaticTerminfo {
            hardcopy: true,
            ..Self::default()
        }
    }

    /// Builtin record for a terminal name, `None` when unknown.
    pub fn for_term(term: &str) -> Option<StaticTerminfo> {
        match term {
            "xterm-256color" | "screen-256color" => Some(xterm_like(256, 65536)),
            "xterm" | "xterm-color" | "screen" => Some(xterm_like(8, 64)),
            "vt100" => Some(vt100()),
            "dumb" => Some(StaticTerminfo::new().with_str("cr", "\r")),
            _ => None,
        }
    }
}

impl TerminfoSource for StaticTerminfo {
    fn str_cap(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }

    fn num_cap(&self, name: &str) -> Option<i32> {
        self.numbers.get(name).copied()
    }

    fn flag_cap(&self, name: &str) -> bool {
        self.flags.contains(&name)
    }

    fn is_hardcopy(&self) -> bool {
        self.hardcopy
    }
}

const ACSC: &str = "``aaffggiijjkkllmmnnooppqqrrssttuuvvwwxxyyzz{{||}}~~";

fn xterm_like(colors: i32, pairs: i32) -> StaticTerminfo {
    let base = StaticTerminfo::new()
        .with_str("cup", "\x1b[%i%p1%d;%p2%dH")
        .with_str("hpa", "\x1b[%i%p1%dG")
        .with_str("vpa", "\x1b[%i%p1%dd")
        .with_str("clear", "\x1b[H\x1b[2J")
        .with_str("home", "\x1b[H")
        .with_str("cud", "\x1b[%p1%dB")
        .with_str("cud1", "\n")
        .with_str("cuf", "\x1b[%p1%dC")
        .with_str("cuf1", "\x1b[C")
        .with_str("el", "\x1b[K")
        .with_str("sc", "\x1b7")
        .with_str("rc", "\x1b8")
        .with_str("civis", "\x1b[?25l")
        .with_str("cnorm", "\x1b[?25h")
        .with_str("smcup", "\x1b[?1049h")
        .with_str("rmcup", "\x1b[?1049l")
        .with_str("sgr0", "\x1b(B\x1b[m")
        .with_str(
            "sgr",
            "%?%p9%t\x1b(0%e\x1b(B%;\x1b[0%?%p6%t;1%;%?%p5%t;2%;%?%p2%t;4%;%?%p1%p3%|%t;7%;%?%p4%t;5%;m",
        )
        .with_str("smul", "\x1b[4m")
        .with_str("rmul", "\x1b[24m")
        .with_str("bold", "\x1b[1m")
        .with_str("dim", "\x1b[2m")
        .with_str("rev", "\x1b[7m")
        .with_str("blink", "\x1b[5m")
        .with_str("smso", "\x1b[7m")
        .with_str("rmso", "\x1b[27m")
        .with_str("smacs", "\x1b(0")
        .with_str("rmacs", "\x1b(B")
        .with_str("acsc", ACSC)
        .with_str("op", "\x1b[39;49m")
        .with_num("cols", 80)
        .with_num("lines", 24)
        .with_num("colors", colors)
        .with_num("pairs", pairs)
        .with_flag("bce");
    if colors > 8 {
        base.with_str(
            "setaf",
            "\x1b[%?%p1%{8}%<%t3%p1%d%e%p1%{16}%<%t9%p1%{8}%-%d%e38;5;%p1%d%;m",
        )
        .with_str(
            "setab",
            "\x1b[%?%p1%{8}%<%t4%p1%d%e%p1%{16}%<%t10%p1%{8}%-%d%e48;5;%p1%d%;m",
        )
    } else {
        base.with_str("setaf", "\x1b[3%p1%dm")
            .with_str("setab", "\x1b[4%p1%dm")
    }
}

fn vt100() -> StaticTerminfo {
    StaticTerminfo::new()
        .with_str("cup", "\x1b[%i%p1%d;%p2%dH$<5>")
        .with_str("clear", "\x1b[H\x1b[J$<50>")
        .with_str("home", "\x1b[H")
        .with_str("cud1", "\n")
        .with_str("cuf1", "\x1b[C$<2>")
        .with_str("el", "\x1b[K$<3>")
        .with_str("sc", "\x1b7")
        .with_str("rc", "\x1b8")
        .with_str("sgr0", "\x1b[m\x0f$<2>")
        .with_str(
            "sgr",
            "\x1b[0%?%p1%p6%|%t;1%;%?%p2%t;4%;%?%p1%p3%|%t;7%;%?%p4%t;5%;m%?%p9%t\x0e%e\x0f%;$<2>",
        )
        .with_str("smul", "\x1b[4m$<2>")
        .with_str("rmul", "\x1b[m$<2>")
        .with_str("bold", "\x1b[1m$<2>")
        .with_str("rev", "\x1b[7m$<2>")
        .with_str("blink", "\x1b[5m$<2>")
        .with_str("smacs", "\x0e")
        .with_str("rmacs", "\x0f")
        .with_str("acsc", ACSC)
        .with_str("enacs", "\x1b(B\x1b)0")
        .with_num("cols", 80)
        .with_num("lines", 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let ti = StaticTerminfo::for_term("xterm-256color").unwrap();
        assert_eq!(ti.num_cap("colors"), Some(256));
        assert!(ti.str_cap("cup").is_some());
        assert!(ti.flag_cap("bce"));
        assert!(StaticTerminfo::for_term("no-such-terminal").is_none());
    }

    #[test]
    fn dumb_has_no_addressing() {
        let ti = StaticTerminfo::for_term("dumb").unwrap();
        assert!(ti.str_cap("cup").is_none());
        assert!(ti.str_cap("clear").is_none());
    }
}
