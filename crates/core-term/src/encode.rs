//! Output text staging and encoding.
//!
//! Cell text accumulates in a buffer between escape emissions; each flush
//! runs an NFC pass and then either the native-UTF-8 filter (dropping
//! combining marks and double-width codepoints the probed terminal cannot
//! render, with replacement-character policy) or the transcoder hop to a
//! legacy encoding. Escape sequences never pass through this path; they go
//! to the device raw, after the pending text is flushed.

use core_cells::{char_info, Category, UnicodeVersion};
use unicode_normalization::UnicodeNormalization;

use crate::io::TermIo;

/// Result of one transcoder step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeStatus {
    Success,
    /// Output buffer full; flush and retry.
    NoSpace,
    /// Codepoint has no representation in the target encoding.
    Unassigned,
    /// Input is not valid for the conversion.
    Illegal,
    /// Truncated sequence at the end of the input.
    IllegalEnd,
}

/// Stateful converter from UTF-8 to the terminal's native encoding.
pub trait Transcoder {
    /// Convert a prefix of `input`, appending native bytes to `out`.
    /// Returns the number of input bytes consumed and the stop status.
    fn convert(&mut self, input: &[u8], out: &mut Vec<u8>) -> (usize, TranscodeStatus);
    /// Emit whatever brings the converter back to its initial state.
    fn finish(&mut self, out: &mut Vec<u8>);
    fn reset(&mut self);
    /// Encode one codepoint from scratch, if representable.
    fn encode_char(&mut self, c: char) -> Option<Vec<u8>>;
}

/// Pass-through for plain ASCII; everything else is unassigned. This is the
/// converter behind the forced-ASCII fallback after a failed probe.
#[derive(Debug, Default)]
pub struct AsciiTranscoder;

impl Transcoder for AsciiTranscoder {
    fn convert(&mut self, input: &[u8], out: &mut Vec<u8>) -> (usize, TranscodeStatus) {
        for (i, b) in input.iter().enumerate() {
            if *b < 0x80 {
                out.push(*b);
            } else {
                return (i, TranscodeStatus::Unassigned);
            }
        }
        (input.len(), TranscodeStatus::Success)
    }

    fn finish(&mut self, _out: &mut Vec<u8>) {}

    fn reset(&mut self) {}

    fn encode_char(&mut self, c: char) -> Option<Vec<u8>> {
        if (c as u32) < 0x80 {
            Some(vec![c as u8])
        } else {
            None
        }
    }
}

const REPLACEMENT_UTF8: &[u8] = "\u{fffd}".as_bytes();

/// Pending cell text, the attribute state the terminal is in, and the
/// rendering limits discovered by the probe.
pub struct Wire {
    text: Vec<u8>,
    /// Attributes the terminal currently has active.
    pub attrs_now: core_attr::Attr,
    pub combining: Option<UnicodeVersion>,
    pub double_width: Option<UnicodeVersion>,
    pub transcoder: Option<Box<dyn Transcoder>>,
    replacement: char,
    replacement_encoded: Vec<u8>,
}

impl Wire {
    pub fn new() -> Wire {
        Wire {
            text: Vec::with_capacity(160),
            attrs_now: core_attr::Attr::empty(),
            combining: None,
            double_width: None,
            transcoder: None,
            replacement: '?',
            replacement_encoded: vec![b'?'],
        }
    }

    pub fn putc(&mut self, b: u8) {
        self.text.push(b);
    }

    pub fn puts(&mut self, s: &str) {
        self.text.extend_from_slice(s.as_bytes());
    }

    pub fn putn(&mut self, bytes: &[u8]) {
        self.text.extend_from_slice(bytes);
    }

    /// Change the undrawable-character stand-in. Its native form is
    /// precomputed; a character the encoding cannot express falls back to
    /// the question mark.
    pub fn set_replacement(&mut self, c: char) {
        self.replacement = c;
        self.replacement_encoded = match &mut self.transcoder {
            None => c.to_string().into_bytes(),
            Some(t) => t
                .encode_char(c)
                .or_else(|| t.encode_char('?'))
                .unwrap_or_else(|| vec![b'?']),
        };
    }

    pub fn replacement(&self) -> char {
        self.replacement
    }

    /// Install (or clear, for native UTF-8) the output transcoder.
    pub fn set_transcoder(&mut self, transcoder: Option<Box<dyn Transcoder>>) {
        self.transcoder = transcoder;
        self.set_replacement(self.replacement);
    }

    /// NFC-normalize and emit the pending text.
    pub fn flush_text(&mut self, io: &mut dyn TermIo) {
        if self.text.is_empty() {
            return;
        }
        let raw = std::mem::take(&mut self.text);
        let nfc: String = String::from_utf8_lossy(&raw).nfc().collect();
        match self.transcoder.as_mut() {
            None => {
                // Native UTF-8: drop what the terminal cannot render.
                let bytes = nfc.as_bytes();
                let mut emitted = 0usize;
                for (at, c) in nfc.char_indices() {
                    let info = char_info(c);
                    let len = c.len_utf8();
                    if info.category == Category::Combining
                        && beyond(self.combining, info.since)
                    {
                        io.write(&bytes[emitted..at]);
                        // A combining mark that still takes a cell leaves a
                        // replacement in its place.
                        if info.width == 1 {
                            io.write(REPLACEMENT_UTF8);
                        }
                        emitted = at + len;
                    } else if info.width == 2 && beyond(self.double_width, info.since) {
                        if self.double_width.is_none() {
                            io.write(&bytes[emitted..at]);
                            io.write(REPLACEMENT_UTF8);
                            io.write(REPLACEMENT_UTF8);
                        } else {
                            // Renderable but measured narrow: pad to two cells.
                            io.write(&bytes[emitted..at + len]);
                            io.write(b" ");
                        }
                        emitted = at + len;
                    }
                }
                io.write(&bytes[emitted..]);
            }
            Some(transcoder) => {
                let mut input = nfc.as_bytes();
                let mut out = Vec::with_capacity(input.len());
                while !input.is_empty() {
                    out.clear();
                    let (consumed, status) = transcoder.convert(input, &mut out);
                    io.write(&out);
                    input = &input[consumed..];
                    match status {
                        TranscodeStatus::Success => break,
                        TranscodeStatus::NoSpace => continue,
                        TranscodeStatus::IllegalEnd => break,
                        TranscodeStatus::Unassigned | TranscodeStatus::Illegal => {
                            // Skip the offending codepoint, stand a
                            // replacement per cell it would have taken.
                            let (c, len) = first_char(input);
                            input = &input[len..];
                            out.clear();
                            transcoder.finish(&mut out);
                            io.write(&out);
                            let width = c.map(|c| char_info(c).width).unwrap_or(1).max(0);
                            for _ in 0..width {
                                io.write(&self.replacement_encoded);
                            }
                            transcoder.reset();
                        }
                    }
                }
                out.clear();
                transcoder.finish(&mut out);
                io.write(&out);
            }
        }
    }

    /// Whether the terminal, as probed, renders `s` faithfully.
    pub fn can_draw(&mut self, s: &str) -> bool {
        let nfc: String = s.nfc().collect();
        match &mut self.transcoder {
            None => {
                if nfc.chars().count() == 1 && nfc.chars().all(|c| (c as u32) < 0x80) {
                    return true;
                }
                for c in nfc.chars() {
                    let info = char_info(c);
                    if info.category == Category::Combining && beyond(self.combining, info.since) {
                        return false;
                    }
                    if info.width == 2 && beyond(self.double_width, info.since) {
                        return false;
                    }
                }
                true
            }
            Some(transcoder) => {
                let mut scratch = Vec::new();
                let mut input = nfc.as_bytes();
                let ok = loop {
                    scratch.clear();
                    let (consumed, status) = transcoder.convert(input, &mut scratch);
                    input = &input[consumed..];
                    match status {
                        TranscodeStatus::Success => break true,
                        TranscodeStatus::NoSpace => continue,
                        _ => break false,
                    }
                };
                transcoder.reset();
                ok
            }
        }
    }
}

impl Default for Wire {
    fn default() -> Self {
        Wire::new()
    }
}

/// Is `since` newer than what the terminal supports? `None` means the
/// terminal showed no support at all, which filters even baseline-era
/// codepoints of that class.
fn beyond(level: Option<UnicodeVersion>, since: UnicodeVersion) -> bool {
    match level {
        None => true,
        Some(level) => since > level,
    }
}

fn first_char(bytes: &[u8]) -> (Option<char>, usize) {
    match std::str::from_utf8(bytes) {
        Ok(s) => match s.chars().next() {
            Some(c) => (Some(c), c.len_utf8()),
            None => (None, 0),
        },
        Err(e) => {
            let valid = e.valid_up_to();
            if valid > 0 {
                let s = &bytes[..valid];
                let c = std::str::from_utf8(s).ok().and_then(|s| s.chars().next());
                (c, c.map(char::len_utf8).unwrap_or(1))
            } else {
                (None, 1)
            }
        }
    }
}
