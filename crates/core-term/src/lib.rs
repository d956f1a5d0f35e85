//! The terminal context: lifecycle, probing, drawing dispatch, input, and
//! the update loop.
//!
//! A [`Terminal`] owns everything the process shares for one terminal: the
//! capability store, the window [`Screen`] with its shadow pair, the output
//! wire (text staging + attribute state + encoding levels), and the input
//! side with the capability detector. All public calls go through it; the
//! library keeps no global state.
//!
//! Single-threaded throughout. The only blocking points are
//! [`Terminal::get_keychar`] and the reads that drain capability-probe
//! replies; writes accumulate in the buffered sink and are flushed at the
//! end of [`Terminal::update`], at attribute transitions inside it, and on
//! [`Terminal::restore`].

mod attrs;
mod encode;
mod error;
mod io;
mod probe;
mod update;

use std::collections::VecDeque;

use core_attr::Attr;
use core_caps::{Capabilities, Options, TerminfoSource};
use core_cells::str_width;
use core_window::{Screen, WindowId};
use tracing::{debug, info};

pub use core_caps::{AcsOverride, StaticTerminfo};
pub use encode::{AsciiTranscoder, TranscodeStatus, Transcoder, Wire};
pub use error::{TermError, WARN_UPDATE_TERMINAL};
pub use io::{ReadByte, SimIo, TermIo, TtyIo};
pub use probe::{finish_detection, locale_codeset, Detector, Encoding, Feed};
pub use update::{Emitter, UserCallback};

use attrs::{putp, putp_opt, putp_params, set_attrs};
use probe::probe_strings;
use update::do_cup;

/// A successful key read: either a raw byte or the one-shot signal that
/// capability detection finished and the screen should be repainted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Byte(u8),
    UpdateNeeded,
}

/// Snapshot of what the terminal can do, for callers that adapt their UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermFeatures {
    /// Supported non-color attributes.
    pub highlights: Attr,
    pub colors: i32,
    pub pairs: i32,
    pub can_set_fg: bool,
    pub can_set_bg: bool,
    /// Colors are set through pair indices rather than independently.
    pub color_pairs: bool,
}

pub struct Terminal<IO: TermIo> {
    io: IO,
    caps: Capabilities,
    pub screen: Screen,
    wire: Wire,
    cursor: (i32, i32),
    cursor_shown: bool,
    lines: i32,
    columns: i32,
    detect: Option<Detector>,
    codeset: String,
    encoding: Encoding,
    user_callback: Option<UserCallback>,
    last_key: Option<u8>,
    stored_key: Option<u8>,
    pending_input: VecDeque<u8>,
    is_screen_term: bool,
    initialised: bool,
}

impl<IO: TermIo> Terminal<IO> {
    /// Initialize the terminal: load capabilities, size the shadow, switch
    /// to raw mode and the alternate screen, and send the capability
    /// probes. `term` is the terminal name (usually `$TERM`), used to wrap
    /// probe requests for the `screen` multiplexer.
    pub fn new(
        io: IO,
        source: &dyn TerminfoSource,
        term: &str,
        opts: &Options,
    ) -> Result<Terminal<IO>, TermError> {
        if !io.is_tty() {
            return Err(TermError::NotATty);
        }
        let caps = Capabilities::load(source, opts)?;
        let mut io = io;
        let (lines, columns) = resolve_size(&mut io, source)?;

        let codeset = locale_codeset();
        let native_utf8 = probe::normalize_codeset(&codeset) == "utf8";
        let mut wire = Wire::new();
        if native_utf8 {
            wire.set_replacement('\u{fffd}');
        } else {
            wire.set_transcoder(Some(Box::new(AsciiTranscoder)));
        }

        let mut screen = Screen::new(lines, columns);
        screen.acs_utf8 = native_utf8;

        let mut term_obj = Terminal {
            io,
            caps,
            screen,
            wire,
            cursor: (0, 0),
            cursor_shown: true,
            lines,
            columns,
            detect: Some(Detector::new()),
            codeset,
            encoding: Encoding::Unknown,
            user_callback: None,
            last_key: None,
            stored_key: None,
            pending_input: VecDeque::new(),
            is_screen_term: term == "screen" || term.starts_with("screen-"),
            initialised: false,
        };
        term_obj.io.enter_raw()?;
        term_obj.enter_ca_mode();
        term_obj.send_probes();
        {
            let Terminal { wire, io, caps, .. } = &mut term_obj;
            if let Some(clear) = &caps.strs.clear {
                putp(wire, io, clear);
            }
            if let Some(enacs) = &caps.strs.enacs {
                putp(wire, io, enacs);
            }
            putp_opt(wire, io, &caps.strs.cnorm);
            do_cup(wire, io, caps, 0, 0);
            set_attrs(wire, io, caps, Attr::empty());
        }
        term_obj.io.flush()?;
        term_obj.initialised = true;
        info!(lines, columns, term, "terminal initialised");
        Ok(term_obj)
    }

    fn enter_ca_mode(&mut self) {
        let Terminal { wire, io, caps, .. } = self;
        if let Some(smcup) = &caps.strs.smcup {
            putp(wire, io, smcup);
        } else if let Some(clear) = &caps.strs.clear {
            putp(wire, io, clear);
        }
    }

    fn leave_ca_mode(&mut self) {
        let Terminal {
            wire,
            io,
            caps,
            lines,
            ..
        } = self;
        if let Some(rmcup) = &caps.strs.rmcup {
            putp(wire, io, rmcup);
        } else if let Some(clear) = &caps.strs.clear {
            putp(wire, io, clear);
            do_cup(wire, io, caps, *lines - 1, 0);
        }
    }

    /// Write the probe glyphs, each followed by a cursor position request.
    /// Probes go to line 1: xterm reports some modified function keys as
    /// `ESC[1;<d>R`, which would be indistinguishable on line 0.
    fn send_probes(&mut self) {
        let is_screen = self.is_screen_term;
        let Terminal { wire, io, caps, .. } = self;
        if let Some(vpa) = &caps.strs.vpa {
            putp_params(wire, io, vpa, &[1]);
        } else {
            do_cup(wire, io, caps, 1, 0);
        }
        for bytes in probe_strings() {
            if let Some(hpa) = &caps.strs.hpa {
                putp_params(wire, io, hpa, &[0]);
            } else {
                do_cup(wire, io, caps, 1, 0);
            }
            wire.flush_text(io);
            io.write(bytes);
            if is_screen {
                io.write(b"\x1bP\x1b[6n\x1b\\");
            } else {
                io.write(b"\x1b[6n");
            }
        }
        debug!(is_screen, "capability probes sent");
    }

    // ---- drawing dispatch ----------------------------------------------

    pub fn addstr(&mut self, win: WindowId, s: &str, attr: Attr) -> Result<(), TermError> {
        self.screen.addstr(&self.caps, win, s, attr).map_err(Into::into)
    }

    pub fn addnstr(
        &mut self,
        win: WindowId,
        s: &str,
        n: usize,
        attr: Attr,
    ) -> Result<(), TermError> {
        self.screen
            .addnstr(&self.caps, win, s, n, attr)
            .map_err(Into::into)
    }

    pub fn addch(&mut self, win: WindowId, c: char, attr: Attr) -> Result<(), TermError> {
        self.screen.addch(&self.caps, win, c, attr).map_err(Into::into)
    }

    pub fn addstrrep(
        &mut self,
        win: WindowId,
        s: &str,
        attr: Attr,
        rep: i32,
    ) -> Result<(), TermError> {
        self.screen
            .addstrrep(&self.caps, win, s, attr, rep)
            .map_err(Into::into)
    }

    pub fn addchrep(
        &mut self,
        win: WindowId,
        c: char,
        attr: Attr,
        rep: i32,
    ) -> Result<(), TermError> {
        self.screen
            .addchrep(&self.caps, win, c, attr, rep)
            .map_err(Into::into)
    }

    pub fn box_frame(
        &mut self,
        win: WindowId,
        y: i32,
        x: i32,
        height: i32,
        width: i32,
        attr: Attr,
    ) -> Result<(), TermError> {
        self.screen
            .box_frame(&self.caps, win, y, x, height, width, attr)
            .map_err(Into::into)
    }

    /// Cell width of a string as the drawing calls would paint it.
    pub fn strwidth(&self, s: &str) -> i32 {
        str_width(s)
    }

    pub fn caps(&self) -> &Capabilities {
        &self.caps
    }

    pub fn features(&self) -> TermFeatures {
        let strs = &self.caps.strs;
        let ansi = self.caps.ansi_attrs;
        let mut highlights = Attr::empty();
        if strs.smul.is_some() || ansi.contains(Attr::UNDERLINE) {
            highlights |= Attr::UNDERLINE;
        }
        if strs.bold.is_some() || ansi.contains(Attr::BOLD) {
            highlights |= Attr::BOLD;
        }
        if strs.rev.is_some() || ansi.contains(Attr::REVERSE) {
            highlights |= Attr::REVERSE;
        }
        if strs.blink.is_some() || ansi.contains(Attr::BLINK) {
            highlights |= Attr::BLINK;
        }
        if strs.dim.is_some() || ansi.contains(Attr::DIM) {
            highlights |= Attr::DIM;
        }
        if strs.smacs.is_some() || ansi.contains(Attr::ACS) {
            highlights |= Attr::ACS;
        }
        TermFeatures {
            highlights,
            colors: self.caps.colors,
            pairs: self.caps.pairs,
            can_set_fg: strs.setaf.is_some() || strs.setf.is_some() || strs.scp.is_some(),
            can_set_bg: strs.setab.is_some() || strs.setb.is_some(),
            color_pairs: strs.scp.is_some(),
        }
    }

    // ---- update / output ------------------------------------------------

    /// Compose all windows and emit the difference against what the
    /// terminal currently shows. Everything drawn before this call appears
    /// atomically; drawing after it waits for the next update.
    pub fn update(&mut self) -> Result<(), TermError> {
        let blank_idx = self.screen.blank_index();
        let columns = self.columns;
        if self.cursor_shown {
            let Terminal { wire, io, caps, .. } = self;
            putp_opt(wire, io, &caps.strs.sc);
            putp_opt(wire, io, &caps.strs.civis);
        }
        for line in 0..self.lines {
            self.screen.compose_line(line);
            {
                let Terminal {
                    screen,
                    wire,
                    io,
                    caps,
                    user_callback,
                    ..
                } = self;
                if let Some((old, new)) = screen.diff_lines(line) {
                    update::diff_line(
                        wire,
                        io,
                        caps,
                        &screen.attrs,
                        user_callback,
                        old,
                        new,
                        line,
                        columns,
                        blank_idx,
                    );
                }
            }
            self.screen.promote_line(line);
        }
        {
            let Terminal { wire, io, caps, .. } = self;
            set_attrs(wire, io, caps, Attr::empty());
        }
        if self.cursor_shown {
            let cursor = self.cursor;
            let Terminal { wire, io, caps, .. } = self;
            if let Some(rc) = &caps.strs.rc {
                putp(wire, io, rc);
            } else {
                do_cup(wire, io, caps, cursor.0, cursor.1);
            }
            putp_opt(wire, io, &caps.strs.cnorm);
        }
        self.io.flush()?;
        Ok(())
    }

    /// Clear the terminal and the believed contents: the next update
    /// repaints everything.
    pub fn redraw(&mut self) {
        {
            let Terminal { wire, io, caps, .. } = self;
            set_attrs(wire, io, caps, Attr::empty());
            if let Some(clear) = &caps.strs.clear {
                putp(wire, io, clear);
            }
        }
        self.screen.clear_shadow();
    }

    /// Re-query the terminal size after a SIGWINCH and resize the shadow.
    /// The library installs no signal handlers; call this from yours.
    pub fn resize(&mut self) -> Result<(), TermError> {
        let Some((lines, columns)) = self.io.window_size() else {
            return Ok(());
        };
        if columns > self.columns || lines != self.lines {
            // A shrunk or reflowed terminal leaves unreliable contents
            // behind; drop the cache and start from a cleared screen.
            self.screen.clear_shadow();
            let Terminal { wire, io, caps, .. } = self;
            if let Some(clear) = &caps.strs.clear {
                putp(wire, io, clear);
            }
        }
        self.lines = lines;
        self.columns = columns;
        self.screen.resize_term(lines, columns);
        self.io.flush()?;
        debug!(lines, columns, "terminal resized");
        Ok(())
    }

    pub fn size(&self) -> (i32, i32) {
        (self.lines, self.columns)
    }

    // ---- cursor ---------------------------------------------------------

    /// Move the cursor to an absolute terminal position, effective
    /// immediately when visible.
    pub fn set_cursor(&mut self, y: i32, x: i32) {
        self.cursor = (y, x);
        if self.cursor_shown {
            {
                let Terminal { wire, io, caps, .. } = self;
                do_cup(wire, io, caps, y, x);
            }
            let _ = self.io.flush();
        }
    }

    /// Move the cursor relative to a window, if that window is shown.
    pub fn set_window_cursor(&mut self, win: WindowId, y: i32, x: i32) {
        if self.screen.is_shown(win) {
            let abs_y = self.screen.abs_y(win) + y;
            let abs_x = self.screen.abs_x(win) + x;
            self.set_cursor(abs_y, abs_x);
        }
    }

    pub fn hide_cursor(&mut self) {
        if !self.cursor_shown {
            return;
        }
        if self.caps.strs.civis.is_some() {
            self.cursor_shown = false;
            let Terminal { wire, io, caps, .. } = self;
            putp_opt(wire, io, &caps.strs.civis);
        } else {
            // No way to hide it: park it in the bottom right corner.
            let (lines, columns) = (self.lines, self.columns);
            let Terminal { wire, io, caps, .. } = self;
            do_cup(wire, io, caps, lines - 1, columns - 1);
        }
        let _ = self.io.flush();
    }

    pub fn show_cursor(&mut self) {
        if self.cursor_shown {
            return;
        }
        self.cursor_shown = true;
        let cursor = self.cursor;
        {
            let Terminal { wire, io, caps, .. } = self;
            do_cup(wire, io, caps, cursor.0, cursor.1);
            putp_opt(wire, io, &caps.strs.cnorm);
        }
        let _ = self.io.flush();
    }

    // ---- input ----------------------------------------------------------

    /// Read one byte with a millisecond timeout (`< 0` blocks, `0` polls).
    /// While capability detection is in flight, report bytes are consumed
    /// here; when the last report lands this returns
    /// [`KeyInput::UpdateNeeded`] once.
    pub fn get_keychar(&mut self, msec: i32) -> Result<KeyInput, TermError> {
        if let Some(k) = self.stored_key.take() {
            self.last_key = Some(k);
            return Ok(KeyInput::Byte(k));
        }
        if let Some(b) = self.pending_input.pop_front() {
            self.last_key = Some(b);
            return Ok(KeyInput::Byte(b));
        }
        loop {
            match self.io.read_byte(msec) {
                ReadByte::Timeout => return Err(TermError::Timeout),
                ReadByte::Eof => return Err(TermError::Eof),
                ReadByte::Failed => return Err(std::io::Error::last_os_error().into()),
                ReadByte::Byte(b) => {
                    let Some(det) = self.detect.as_mut() else {
                        self.last_key = Some(b);
                        return Ok(KeyInput::Byte(b));
                    };
                    match det.feed(b) {
                        Feed::Consumed => continue,
                        Feed::Input => {
                            while let Some(queued) = self.detect.as_mut().and_then(|d| d.pending.pop_front()) {
                                self.pending_input.push_back(queued);
                            }
                            if let Some(first) = self.pending_input.pop_front() {
                                self.last_key = Some(first);
                                return Ok(KeyInput::Byte(first));
                            }
                        }
                        Feed::Finished => {
                            self.finish_probe();
                            return Ok(KeyInput::UpdateNeeded);
                        }
                    }
                }
            }
        }
    }

    /// Push the last read byte back for the next [`Terminal::get_keychar`].
    pub fn unget_keychar(&mut self, c: u8) -> Result<u8, TermError> {
        if self.last_key == Some(c) {
            self.stored_key = Some(c);
            Ok(c)
        } else {
            Err(TermError::BadArg)
        }
    }

    fn finish_probe(&mut self) {
        let Some(det) = self.detect.take() else { return };
        let outcome = finish_detection(&det, &self.codeset);
        self.encoding = det.encoding;
        self.wire.combining = det.combining;
        self.wire.double_width = det.double_width;
        match outcome.force_charset {
            Some("UTF-8") => {
                self.wire.set_transcoder(None);
                self.wire.set_replacement('\u{fffd}');
            }
            Some(_) => {
                // Forcing a legacy charset needs an external converter; with
                // none installed the safe floor is ASCII.
                self.encoding = Encoding::Ascii;
                self.wire.set_transcoder(Some(Box::new(AsciiTranscoder)));
            }
            None => {}
        }
        self.screen.acs_utf8 = self.encoding == Encoding::Utf8;
        info!(
            encoding = ?self.encoding,
            combining = ?self.wire.combining,
            double_width = ?self.wire.double_width,
            needs_update = outcome.needs_update,
            "capability detection finished"
        );
    }

    /// Install the converter used when the terminal is not UTF-8 native.
    pub fn set_transcoder(&mut self, transcoder: Option<Box<dyn Transcoder>>) {
        self.wire.set_transcoder(transcoder);
    }

    /// Replace the stand-in character for undrawable output.
    pub fn set_replacement_char(&mut self, c: char) {
        self.wire.set_replacement(c);
    }

    /// Whether the terminal, as probed, renders `s` faithfully.
    pub fn can_draw(&mut self, s: &str) -> bool {
        self.wire.can_draw(s)
    }

    /// Install the callback for cells drawn with [`Attr::USER`].
    pub fn set_user_callback(&mut self, callback: Option<UserCallback>) {
        self.user_callback = callback;
    }

    // ---- direct emission -------------------------------------------------

    /// Append one byte of cell text; for use inside user callbacks.
    pub fn putc(&mut self, b: u8) {
        self.wire.putc(b);
    }

    pub fn puts(&mut self, s: &str) {
        self.wire.puts(s);
    }

    pub fn putn(&mut self, bytes: &[u8]) {
        self.wire.putn(bytes);
    }

    /// Send a control string to the terminal, flushing pending text first.
    pub fn putp(&mut self, s: &str) {
        let Terminal { wire, io, .. } = self;
        putp(wire, io, s);
    }

    // ---- lifecycle -------------------------------------------------------

    /// Restore the terminal for shell use; the context survives and
    /// [`Terminal::resume`] re-enters full-screen mode.
    pub fn restore(&mut self) {
        if !self.initialised {
            return;
        }
        self.screen.clear_shadow();
        {
            let Terminal { wire, io, caps, .. } = self;
            if let Some(cnorm) = &caps.strs.cnorm {
                putp(wire, io, cnorm);
            }
            set_attrs(wire, io, caps, Attr::empty());
            if let Some(clear) = &caps.strs.clear {
                putp(wire, io, clear);
            }
        }
        self.leave_ca_mode();
        let _ = self.io.flush();
        let _ = self.io.leave_raw();
        self.cursor_shown = true;
        self.initialised = false;
    }

    /// Re-enter full-screen mode after [`Terminal::restore`]. Capabilities,
    /// interned attributes and probe results persist.
    pub fn resume(&mut self) -> Result<(), TermError> {
        if self.initialised {
            return Ok(());
        }
        self.io.enter_raw()?;
        self.enter_ca_mode();
        let cursor = self.cursor;
        let shown = self.cursor_shown;
        {
            let Terminal { wire, io, caps, .. } = self;
            if shown {
                putp_opt(wire, io, &caps.strs.cnorm);
            } else {
                putp_opt(wire, io, &caps.strs.civis);
            }
            do_cup(wire, io, caps, cursor.0, cursor.1);
            set_attrs(wire, io, caps, Attr::empty());
        }
        self.io.flush()?;
        self.initialised = true;
        Ok(())
    }

    /// The underlying device, mainly for harnesses inspecting [`SimIo`].
    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }
}

impl<IO: TermIo> Drop for Terminal<IO> {
    fn drop(&mut self) {
        self.restore();
    }
}

fn resolve_size(io: &mut dyn TermIo, source: &dyn TerminfoSource) -> Result<(i32, i32), TermError> {
    if let Some(size) = io.window_size() {
        return Ok(size);
    }
    let env = |name: &str| {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .filter(|v| *v > 0)
    };
    if let (Some(lines), Some(columns)) = (env("LINES"), env("COLUMNS")) {
        return Ok((lines, columns));
    }
    match (source.num_cap("lines"), source.num_cap("cols")) {
        (Some(lines), Some(columns)) if lines > 0 && columns > 0 => Ok((lines, columns)),
        _ => Err(TermError::NoSizeInfo),
    }
}
