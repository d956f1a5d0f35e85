//! The drawing façade: string/char writes, clears, and the box helper.
//!
//! Strings are decoded per codepoint, classified through the character
//! oracle, and turned into blocks. Non-printable codepoints are skipped
//! (the call still reports them afterwards), zero-width codepoints attach
//! to the preceding block, and a string ending in a joinable conjoining
//! Jamo gets a zero-width non-joiner so later overwrites cannot rejoin the
//! syllable.

use core_attr::{combine, Attr};
use core_caps::Capabilities;
use core_cells::{block, char_info, width_with_join, Category, JamoState};

use crate::{DrawError, Screen, Window, WindowId};

/// Alternate character set codes (terminfo `acsc` identities).
pub mod acs {
    pub const ULCORNER: char = 'l';
    pub const URCORNER: char = 'k';
    pub const LLCORNER: char = 'm';
    pub const LRCORNER: char = 'j';
    pub const HLINE: char = 'q';
    pub const VLINE: char = 'x';
    pub const TTEE: char = 'w';
    pub const RTEE: char = 'u';
    pub const LTEE: char = 't';
    pub const BTEE: char = 'v';
    pub const UARROW: char = '-';
    pub const DARROW: char = '.';
    pub const LARROW: char = ',';
    pub const RARROW: char = '+';
    pub const BOARD: char = 'h';
    pub const CKBOARD: char = 'a';
    pub const BULLET: char = '~';
    pub const DIAMOND: char = '`';
    pub const BLOCK: char = '0';
}

/// Clamp an attribute set to what the terminal can express: colors beyond
/// the palette drop to unspecified, and an ACS request on a terminal that
/// cannot switch character sets (or with the override forcing fallbacks)
/// becomes a fallback-ACS request.
pub fn sanitize_attrs(caps: &Capabilities, attr: Attr) -> Attr {
    let mut attr = attr;
    let fg = attr.fg_field();
    if fg >= 1 && fg <= 256 && (fg as i32) > caps.colors {
        attr = attr.difference(attr.fg_part());
    }
    let bg = attr.bg_field();
    if bg >= 1 && bg <= 256 && (bg as i32) > caps.colors {
        attr = attr.difference(attr.bg_part());
    }
    if attr.contains(Attr::ACS)
        && (!caps.has_acs() || caps.acs_override != core_caps::AcsOverride::Auto)
    {
        attr.remove(Attr::ACS);
        attr.insert(Attr::FALLBACK_ACS);
    }
    attr
}

impl Screen {
    /// Move a window's painting cursor; negative coordinates clamp to 0.
    pub fn set_paint(&mut self, id: WindowId, y: i32, x: i32) {
        if let Some(w) = self.node_mut(id) {
            w.grid.set_paint(y, x);
        }
    }

    pub fn paint_pos(&self, id: WindowId) -> (i32, i32) {
        self.node(id)
            .map(|w| (w.grid.paint_y, w.grid.paint_x))
            .unwrap_or((0, 0))
    }

    /// Add a string at the painting cursor with the given attributes
    /// (combined with the window defaults).
    pub fn addstr(
        &mut self,
        caps: &Capabilities,
        id: WindowId,
        s: &str,
        attr: Attr,
    ) -> Result<(), DrawError> {
        let acs_utf8 = self.acs_utf8;
        let Screen { wins, attrs, .. } = self;
        let Some(win) = get_mut(wins, id) else {
            return Err(DrawError::BadArg);
        };
        let attr = combine(sanitize_attrs(caps, attr), win.grid.default_attrs, caps.ncv);
        let base_idx = attrs.index_of(attr);

        let mut state = JamoState::default();
        let mut nonprint = false;
        let mut run = Vec::with_capacity(16);
        for c in s.chars() {
            let width = width_with_join(c, &mut state);
            let info = char_info(c);
            if info.width < 0 || info.category == Category::Control {
                nonprint = true;
                continue;
            }
            let mut buf = [0u8; 4];
            let encoded: &str = c.encode_utf8(&mut buf);
            if width == 0 {
                win.grid.add_zerowidth(encoded.as_bytes());
                continue;
            }

            let mut block_attr = attr;
            let mut text: &str = encoded;
            if block_attr.contains(Attr::ACS) {
                if (c as u32) >= 128 {
                    // ACS only covers single-byte codes.
                    block_attr.remove(Attr::ACS);
                } else if !caps.acs_available(c) {
                    text = caps.default_acs(c, acs_utf8);
                    block_attr.remove(Attr::ACS);
                }
            } else if block_attr.contains(Attr::FALLBACK_ACS) {
                block_attr.remove(Attr::FALLBACK_ACS);
                if (c as u32) < 128 {
                    text = caps.default_acs(c, acs_utf8);
                }
            }
            let idx = if block_attr == attr {
                base_idx
            } else {
                attrs.index_of(block_attr)
            };
            run.clear();
            block::push(&mut run, idx, text, width == 2);
            if !win.grid.write_blocks(attrs, &run) {
                return Err(DrawError::BadArg);
            }
        }
        if state == JamoState::Joinable {
            win.grid.add_zerowidth("\u{200c}".as_bytes());
        }
        if nonprint {
            Err(DrawError::Nonprint)
        } else {
            Ok(())
        }
    }

    /// Add at most the first `n` bytes of `s`, rounded down to a codepoint
    /// boundary.
    pub fn addnstr(
        &mut self,
        caps: &Capabilities,
        id: WindowId,
        s: &str,
        n: usize,
        attr: Attr,
    ) -> Result<(), DrawError> {
        let mut end = n.min(s.len());
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        self.addstr(caps, id, &s[..end], attr)
    }

    pub fn addch(
        &mut self,
        caps: &Capabilities,
        id: WindowId,
        c: char,
        attr: Attr,
    ) -> Result<(), DrawError> {
        let mut buf = [0u8; 4];
        self.addstr(caps, id, c.encode_utf8(&mut buf), attr)
    }

    pub fn addstrrep(
        &mut self,
        caps: &Capabilities,
        id: WindowId,
        s: &str,
        attr: Attr,
        rep: i32,
    ) -> Result<(), DrawError> {
        for _ in 0..rep {
            self.addstr(caps, id, s, attr)?;
        }
        Ok(())
    }

    pub fn addnstrrep(
        &mut self,
        caps: &Capabilities,
        id: WindowId,
        s: &str,
        n: usize,
        attr: Attr,
        rep: i32,
    ) -> Result<(), DrawError> {
        for _ in 0..rep {
            self.addnstr(caps, id, s, n, attr)?;
        }
        Ok(())
    }

    pub fn addchrep(
        &mut self,
        caps: &Capabilities,
        id: WindowId,
        c: char,
        attr: Attr,
        rep: i32,
    ) -> Result<(), DrawError> {
        let mut buf = [0u8; 4];
        self.addstrrep(caps, id, c.encode_utf8(&mut buf), attr, rep)
    }

    /// Clear from the painting cursor to the end of the line.
    pub fn clrtoeol(&mut self, id: WindowId) {
        let Screen { wins, attrs, .. } = self;
        if let Some(w) = get_mut(wins, id) {
            w.grid.clear_to_eol(attrs);
        }
    }

    /// Clear to the end of the line, then all lines below.
    pub fn clrtobot(&mut self, id: WindowId) {
        let Screen { wins, attrs, .. } = self;
        if let Some(w) = get_mut(wins, id) {
            w.grid.clear_to_bottom(attrs);
        }
    }

    /// Draw a box using the alternate character set.
    pub fn box_frame(
        &mut self,
        caps: &Capabilities,
        id: WindowId,
        y: i32,
        x: i32,
        height: i32,
        width: i32,
        attr: Attr,
    ) -> Result<(), DrawError> {
        let attr = attr | Attr::ACS;
        let (win_h, win_w) = (self.height(id), self.width(id));
        if y >= win_h || y + height > win_h || x >= win_w || x + width > win_w || height < 2
            || width < 2
        {
            return Err(DrawError::BadArg);
        }
        self.set_paint(id, y, x);
        self.addch(caps, id, acs::ULCORNER, attr)?;
        self.addchrep(caps, id, acs::HLINE, attr, width - 2)?;
        self.addch(caps, id, acs::URCORNER, attr)?;
        for i in 1..height - 1 {
            self.set_paint(id, y + i, x);
            self.addch(caps, id, acs::VLINE, attr)?;
            self.set_paint(id, y + i, x + width - 1);
            self.addch(caps, id, acs::VLINE, attr)?;
        }
        self.set_paint(id, y + height - 1, x);
        self.addch(caps, id, acs::LLCORNER, attr)?;
        self.addchrep(caps, id, acs::HLINE, attr, width - 2)?;
        self.addch(caps, id, acs::LRCORNER, attr)?;
        Ok(())
    }
}

fn get_mut(wins: &mut [Option<Window>], id: WindowId) -> Option<&mut Window> {
    wins.get_mut(id.index())?.as_mut()
}
