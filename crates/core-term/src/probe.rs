//! Runtime capability probing via Cursor Position Reports.
//!
//! At init the terminal is sent a fixed sequence of test glyphs, each
//! followed by `ESC [ 6 n`. The widths the terminal reports back pin down
//! its encoding class and the newest Unicode version for which it renders
//! combining marks as zero width and double-width characters as two cells.
//! Reply bytes arrive interleaved with real keyboard input; the detector
//! consumes report bytes and hands everything else back as input.

use std::collections::VecDeque;

use core_cells::UnicodeVersion;
use tracing::debug;

/// Encoding class of the terminal, as far as the probe can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Unknown,
    Utf8,
    Gb18030,
    /// Generic single-byte encoding; trust the locale.
    SingleByte,
    /// One of the CJK multibyte families, not further distinguished.
    Cjk,
    Gbk,
    /// Forced fallback when detection and locale disagree.
    Ascii,
}

enum Rule {
    /// Width 3 means every byte advanced one column: UTF-8. Width 6 means
    /// the multibyte sequences counted per byte pair: a CJK family.
    Charset,
    /// GB18030 four-byte sequence: width 1 only GB18030 renders; 2 is GBK;
    /// 4 is a single-byte encoding echoing every byte.
    CharsetGb18030,
    /// A bare combining mark: zero width means the terminal combines marks
    /// of this Unicode version.
    Combining(UnicodeVersion),
    /// GB18030-encoded combining probe (dot plus mark): width 1.
    CombiningGb18030(UnicodeVersion),
    /// Double-width probe with its expected total width.
    DoubleWidth(UnicodeVersion, i32),
}

struct Probe {
    send: &'static [u8],
    rule: Rule,
}

/// Ordered probe list; rules fire in this order as reports come back.
const PROBES: &[Probe] = &[
    // U+00E5, U+0E3F, U+2592: three columns iff UTF-8, six on EUC-style
    // terminals, eight on single-byte ones.
    Probe {
        send: b"\xc3\xa5\xe0\xb8\xbf\xe2\x96\x92",
        rule: Rule::Charset,
    },
    // GB18030 four-byte U+00DE.
    Probe {
        send: b"\x81\x30\x89\x37",
        rule: Rule::CharsetGb18030,
    },
    Probe {
        send: "\u{350}".as_bytes(),
        rule: Rule::Combining(UnicodeVersion::V40),
    },
    Probe {
        send: b"\x2e\x81\x30\xc4\x36",
        rule: Rule::CombiningGb18030(UnicodeVersion::V40),
    },
    Probe {
        send: "\u{358}".as_bytes(),
        rule: Rule::Combining(UnicodeVersion::V41),
    },
    Probe {
        send: "\u{1dc4}".as_bytes(),
        rule: Rule::Combining(UnicodeVersion::V50),
    },
    Probe {
        send: "\u{487}".as_bytes(),
        rule: Rule::Combining(UnicodeVersion::V51),
    },
    Probe {
        send: "\u{81b}".as_bytes(),
        rule: Rule::Combining(UnicodeVersion::V52),
    },
    Probe {
        send: "\u{859}".as_bytes(),
        rule: Rule::Combining(UnicodeVersion::V60),
    },
    // U+5208 (1.1) plus U+FE47 (4.0): four columns when both draw wide.
    Probe {
        send: "\u{5208}\u{fe47}".as_bytes(),
        rule: Rule::DoubleWidth(UnicodeVersion::V40, 4),
    },
    Probe {
        send: "\u{fe10}".as_bytes(),
        rule: Rule::DoubleWidth(UnicodeVersion::V41, 2),
    },
    // No new wide characters appeared in 5.0.
    Probe {
        send: "\u{31dc}".as_bytes(),
        rule: Rule::DoubleWidth(UnicodeVersion::V51, 2),
    },
    Probe {
        send: "\u{3244}".as_bytes(),
        rule: Rule::DoubleWidth(UnicodeVersion::V52, 2),
    },
    Probe {
        send: "\u{31b8}".as_bytes(),
        rule: Rule::DoubleWidth(UnicodeVersion::V60, 2),
    },
];

/// The probe strings in send order, for the init path to write.
pub fn probe_strings() -> impl Iterator<Item = &'static [u8]> {
    PROBES.iter().map(|p| p.send)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CprState {
    Initial,
    EscSeen,
    Row,
    Column,
}

/// What a fed byte turned out to be.
#[derive(Debug, PartialEq, Eq)]
pub enum Feed {
    /// Part of a (possible) report; consumed.
    Consumed,
    /// Not report data; queued bytes are ready to hand to the caller.
    Input,
    /// The final report was processed; detection is complete.
    Finished,
}

/// CPR reply parser plus the probe decision state.
pub struct Detector {
    state: CprState,
    row: i32,
    column: i32,
    report_nr: usize,
    /// Bytes consumed into a report attempt, replayed on mismatch.
    partial: Vec<u8>,
    /// Non-report bytes owed to the caller, in arrival order.
    pub pending: VecDeque<u8>,
    pub encoding: Encoding,
    pub combining: Option<UnicodeVersion>,
    pub double_width: Option<UnicodeVersion>,
}

impl Detector {
    pub fn new() -> Detector {
        Detector {
            state: CprState::Initial,
            row: 0,
            column: 0,
            report_nr: 0,
            partial: Vec::new(),
            pending: VecDeque::new(),
            encoding: Encoding::Unknown,
            combining: None,
            double_width: None,
        }
    }

    /// Feed one byte read from the terminal.
    pub fn feed(&mut self, byte: u8) -> Feed {
        match self.state {
            CprState::Initial => {
                if byte == 0x1b {
                    self.state = CprState::EscSeen;
                    self.partial.push(byte);
                    Feed::Consumed
                } else {
                    self.pending.push_back(byte);
                    Feed::Input
                }
            }
            CprState::EscSeen => {
                if byte == b'[' {
                    self.state = CprState::Row;
                    self.row = 0;
                    self.column = 0;
                    self.partial.push(byte);
                    Feed::Consumed
                } else {
                    self.mismatch(byte)
                }
            }
            CprState::Row => {
                if byte.is_ascii_digit() {
                    self.row = self.row * 10 + (byte - b'0') as i32;
                    self.partial.push(byte);
                    Feed::Consumed
                } else if byte == b';' {
                    self.state = CprState::Column;
                    self.partial.push(byte);
                    Feed::Consumed
                } else {
                    self.mismatch(byte)
                }
            }
            CprState::Column => {
                if byte.is_ascii_digit() {
                    self.column = self.column * 10 + (byte - b'0') as i32;
                    self.partial.push(byte);
                    Feed::Consumed
                } else if byte == b'R' {
                    self.state = CprState::Initial;
                    self.partial.clear();
                    let (row, column) = (self.row, self.column);
                    if self.process_report(row, column) {
                        Feed::Finished
                    } else {
                        Feed::Consumed
                    }
                } else {
                    self.mismatch(byte)
                }
            }
        }
    }

    /// A byte broke the report shape: everything held back is real input.
    fn mismatch(&mut self, byte: u8) -> Feed {
        self.state = CprState::Initial;
        self.pending.extend(self.partial.drain(..));
        self.pending.push_back(byte);
        Feed::Input
    }

    fn process_report(&mut self, _row: i32, column: i32) -> bool {
        // The reported column is one past the rendered glyph.
        let width = column - 1;
        if let Some(probe) = PROBES.get(self.report_nr) {
            self.apply(&probe.rule, width);
        }
        self.report_nr += 1;
        self.report_nr >= PROBES.len()
    }

    fn apply(&mut self, rule: &Rule, width: i32) {
        match rule {
            Rule::Charset => {
                if width == 3 {
                    self.encoding = Encoding::Utf8;
                } else if width == 6 {
                    self.encoding = Encoding::Cjk;
                }
            }
            Rule::CharsetGb18030 => {
                if self.encoding == Encoding::Unknown {
                    match width {
                        1 => self.encoding = Encoding::Gb18030,
                        2 => self.encoding = Encoding::Gbk,
                        4 => self.encoding = Encoding::SingleByte,
                        _ => {}
                    }
                }
            }
            Rule::Combining(version) => {
                if self.encoding == Encoding::Utf8 && width == 0 {
                    self.combining = Some(*version);
                }
            }
            Rule::CombiningGb18030(version) => {
                if self.encoding == Encoding::Gb18030 && width == 1 {
                    self.combining = Some(*version);
                }
            }
            Rule::DoubleWidth(version, expected) => {
                if self.encoding == Encoding::Utf8 && width == *expected {
                    self.double_width = Some(*version);
                }
            }
        }
        debug!(
            report = self.report_nr,
            width,
            encoding = ?self.encoding,
            combining = ?self.combining,
            double_width = ?self.double_width,
            "probe report applied"
        );
    }
}

impl Default for Detector {
    fn default() -> Self {
        Detector::new()
    }
}

/// Outcome of reconciling the probe result with the locale's codeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finish {
    /// Switch the output converter to this charset (`None`: keep locale).
    pub force_charset: Option<&'static str>,
    /// The screen contents must be redrawn with the new knowledge.
    pub needs_update: bool,
}

/// Decide what to do with the detection result given the locale-reported
/// codeset. A codeset the probe should have recognized but did not means
/// the terminal lies about it: fall back to ASCII.
pub fn finish_detection(detector: &Detector, codeset: &str) -> Finish {
    let codeset = normalize_codeset(codeset);
    let known_multibyte = matches!(
        codeset.as_str(),
        "utf8" | "gb18030" | "eucjp" | "euctw" | "euckr" | "shiftjis"
    );
    let mut force: Option<&'static str> = None;
    let mut needs_update = false;
    match detector.encoding {
        Encoding::Unknown | Encoding::SingleByte | Encoding::Gbk => {
            if known_multibyte {
                force = Some("ASCII");
                needs_update = true;
            }
        }
        Encoding::Utf8 => {
            if codeset != "utf8" {
                force = Some("UTF-8");
                needs_update = true;
            } else if detector.combining.is_some() || detector.double_width.is_some() {
                needs_update = true;
            }
        }
        Encoding::Cjk => {
            // Which CJK encoding is right cannot be decided here; only rule
            // out the ones known to be wrong.
            if codeset == "utf8" || codeset == "shiftjis" {
                force = Some("ASCII");
                needs_update = true;
            }
        }
        Encoding::Gb18030 => {
            if codeset != "gb18030" {
                force = Some("GB18030");
                needs_update = true;
            } else if detector.combining.is_some() || detector.double_width.is_some() {
                needs_update = true;
            }
        }
        Encoding::Ascii => {}
    }
    Finish {
        force_charset: force,
        needs_update,
    }
}

/// Squash a codeset name for comparison: lowercase alphanumerics only.
pub fn normalize_codeset(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The process's codeset, from the usual locale variables.
pub fn locale_codeset() -> String {
    for var in ["LC_ALL", "LC_CTYPE", "LANG"] {
        if let Ok(value) = std::env::var(var) {
            if value.is_empty() {
                continue;
            }
            return match value.split_once('.') {
                Some((_, codeset)) => codeset.split('@').next().unwrap_or(codeset).to_string(),
                None => "ASCII".to_string(),
            };
        }
    }
    "ASCII".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_report(d: &mut Detector, row: i32, column: i32) -> Feed {
        let reply = format!("\x1b[{};{}R", row, column);
        let mut last = Feed::Consumed;
        for b in reply.bytes() {
            last = d.feed(b);
        }
        last
    }

    #[test]
    fn utf8_terminal_with_levels() {
        let mut d = Detector::new();
        // Charset probe: three cells, reported column 4.
        assert_eq!(feed_report(&mut d, 1, 4), Feed::Consumed);
        assert_eq!(d.encoding, Encoding::Utf8);
        // GB18030 probe eliminated: encoding already known.
        feed_report(&mut d, 1, 2);
        assert_eq!(d.encoding, Encoding::Utf8);
        // Combining probe renders zero width: column 1.
        feed_report(&mut d, 1, 1);
        assert_eq!(d.combining, Some(UnicodeVersion::V40));
        // Remaining combining probes measure one cell: unsupported.
        for _ in 0..6 {
            feed_report(&mut d, 1, 2);
        }
        assert_eq!(d.combining, Some(UnicodeVersion::V40));
        // Double-width probes all render wide.
        feed_report(&mut d, 1, 5);
        let mut last = Feed::Consumed;
        for _ in 0..4 {
            last = feed_report(&mut d, 1, 3);
        }
        assert_eq!(last, Feed::Finished);
        assert_eq!(d.double_width, Some(UnicodeVersion::V60));
    }

    #[test]
    fn single_byte_terminal() {
        let mut d = Detector::new();
        feed_report(&mut d, 1, 9); // eight cells: byte-per-cell
        feed_report(&mut d, 1, 5); // four cells for the GB18030 probe
        assert_eq!(d.encoding, Encoding::SingleByte);
    }

    #[test]
    fn non_report_bytes_are_handed_back() {
        let mut d = Detector::new();
        assert_eq!(d.feed(b'a'), Feed::Input);
        assert_eq!(d.pending.pop_front(), Some(b'a'));
        // An escape that turns out to be a function key, not a report.
        assert_eq!(d.feed(0x1b), Feed::Consumed);
        assert_eq!(d.feed(b'['), Feed::Consumed);
        assert_eq!(d.feed(b'A'), Feed::Input);
        let queued: Vec<u8> = d.pending.drain(..).collect();
        assert_eq!(queued, vec![0x1b, b'[', b'A']);
    }

    #[test]
    fn finish_forces_ascii_on_disagreement() {
        let mut d = Detector::new();
        d.encoding = Encoding::Unknown;
        let f = finish_detection(&d, "UTF-8");
        assert_eq!(f.force_charset, Some("ASCII"));
        assert!(f.needs_update);

        d.encoding = Encoding::Utf8;
        let f = finish_detection(&d, "ISO-8859-1");
        assert_eq!(f.force_charset, Some("UTF-8"));
    }

    #[test]
    fn finish_matching_utf8_updates_only_for_levels() {
        let mut d = Detector::new();
        d.encoding = Encoding::Utf8;
        let f = finish_detection(&d, "UTF-8");
        assert_eq!(f.force_charset, None);
        assert!(!f.needs_update);
        d.combining = Some(UnicodeVersion::V40);
        assert!(finish_detection(&d, "UTF-8").needs_update);
    }

    #[test]
    fn codeset_normalization() {
        assert_eq!(normalize_codeset("UTF-8"), "utf8");
        assert_eq!(normalize_codeset("gb18030"), "gb18030");
        assert_eq!(normalize_codeset("EUC-JP"), "eucjp");
    }
}
