//! Byte-level terminal I/O behind a trait, so the probe, diff and input
//! paths run identically against a real tty and the in-memory simulator.

use std::collections::VecDeque;
use std::io;
use std::os::fd::OwnedFd;

use rustix::event::{poll, PollFd, PollFlags, Timespec};
use rustix::termios::{self, OptionalActions, SpecialCodeIndex, Termios};

/// Result of a single timed byte read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadByte {
    Byte(u8),
    Timeout,
    Eof,
    Failed,
}

/// The device the terminal talks to. Writes are buffered until `flush`.
pub trait TermIo {
    fn write(&mut self, bytes: &[u8]);
    fn flush(&mut self) -> io::Result<()>;
    /// Read one byte. `msec < 0` blocks, `0` polls, `> 0` waits that long.
    /// Interrupted calls are retried internally.
    fn read_byte(&mut self, msec: i32) -> ReadByte;
    /// `(lines, columns)` if the device can report its size.
    fn window_size(&mut self) -> Option<(i32, i32)>;
    fn is_tty(&self) -> bool;
    fn enter_raw(&mut self) -> io::Result<()>;
    fn leave_raw(&mut self) -> io::Result<()>;
}

/// Real terminal on the process's stdin/stdout.
pub struct TtyIo {
    in_fd: OwnedFd,
    out_fd: OwnedFd,
    buf: Vec<u8>,
    saved: Option<Termios>,
}

impl TtyIo {
    /// Duplicate stdin/stdout; the dups keep working regardless of what the
    /// application later does with the standard descriptors.
    pub fn stdio() -> io::Result<TtyIo> {
        let in_fd = rustix::io::dup(rustix::stdio::stdin())?;
        let out_fd = rustix::io::dup(rustix::stdio::stdout())?;
        Ok(TtyIo {
            in_fd,
            out_fd,
            buf: Vec::with_capacity(4096),
            saved: None,
        })
    }
}

impl TermIo for TtyIo {
    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut at = 0usize;
        while at < self.buf.len() {
            match rustix::io::write(&self.out_fd, &self.buf[at..]) {
                Ok(n) => at += n,
                Err(rustix::io::Errno::INTR) => continue,
                Err(e) => {
                    self.buf.drain(..at);
                    return Err(e.into());
                }
            }
        }
        self.buf.clear();
        Ok(())
    }

    fn read_byte(&mut self, msec: i32) -> ReadByte {
        loop {
            let timeout = if msec < 0 {
                None
            } else {
                Some(Timespec {
                    tv_sec: (msec / 1000) as _,
                    tv_nsec: ((msec % 1000) * 1_000_000) as _,
                })
            };
            let mut fds = [PollFd::new(&self.in_fd, PollFlags::IN)];
            match poll(&mut fds, timeout.as_ref()) {
                Ok(0) => return ReadByte::Timeout,
                Ok(_) => {
                    let mut byte = [0u8; 1];
                    match rustix::io::read(&self.in_fd, &mut byte[..]) {
                        Ok(0) => return ReadByte::Eof,
                        Ok(_) => return ReadByte::Byte(byte[0]),
                        Err(rustix::io::Errno::INTR) => continue,
                        Err(_) => return ReadByte::Failed,
                    }
                }
                Err(rustix::io::Errno::INTR) => continue,
                Err(_) => return ReadByte::Failed,
            }
        }
    }

    fn window_size(&mut self) -> Option<(i32, i32)> {
        let size = termios::tcgetwinsize(&self.out_fd).ok()?;
        if size.ws_row == 0 || size.ws_col == 0 {
            return None;
        }
        Some((size.ws_row as i32, size.ws_col as i32))
    }

    fn is_tty(&self) -> bool {
        termios::isatty(&self.in_fd) && termios::isatty(&self.out_fd)
    }

    /// Raw mode: no echo, no line buffering, no signal keys, 8-bit clean.
    fn enter_raw(&mut self) -> io::Result<()> {
        let mut tio = termios::tcgetattr(&self.in_fd)?;
        if self.saved.is_none() {
            self.saved = Some(tio.clone());
        }
        use termios::{ControlModes, InputModes, LocalModes, OutputModes};
        tio.input_modes &= !(InputModes::IXON
            | InputModes::IXOFF
            | InputModes::IGNBRK
            | InputModes::BRKINT
            | InputModes::PARMRK
            | InputModes::ISTRIP
            | InputModes::INLCR
            | InputModes::IGNCR
            | InputModes::ICRNL);
        tio.local_modes &= !(LocalModes::ISIG | LocalModes::ICANON | LocalModes::ECHO);
        tio.output_modes &= !OutputModes::OPOST;
        tio.control_modes &= !(ControlModes::CSIZE | ControlModes::PARENB);
        tio.control_modes |= ControlModes::CS8;
        tio.special_codes[SpecialCodeIndex::VMIN] = 1;
        termios::tcsetattr(&self.in_fd, OptionalActions::Drain, &tio)?;
        Ok(())
    }

    fn leave_raw(&mut self) -> io::Result<()> {
        if let Some(saved) = &self.saved {
            termios::tcsetattr(&self.in_fd, OptionalActions::Drain, saved)?;
        }
        Ok(())
    }
}

/// Deterministic in-memory terminal: scripted input, captured output, fixed
/// size. Used by the integration tests and headless harnesses.
pub struct SimIo {
    pub input: VecDeque<u8>,
    pub output: Vec<u8>,
    staged: Vec<u8>,
    pub size: (i32, i32),
    pub raw_mode: bool,
}

impl SimIo {
    pub fn new(lines: i32, columns: i32) -> SimIo {
        SimIo {
            input: VecDeque::new(),
            output: Vec::new(),
            staged: Vec::new(),
            size: (lines, columns),
            raw_mode: false,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Everything flushed so far, as a lossy string for assertions.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }
}

impl TermIo for SimIo {
    fn write(&mut self, bytes: &[u8]) {
        self.staged.extend_from_slice(bytes);
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.extend_from_slice(&self.staged);
        self.staged.clear();
        Ok(())
    }

    fn read_byte(&mut self, _msec: i32) -> ReadByte {
        match self.input.pop_front() {
            Some(b) => ReadByte::Byte(b),
            None => ReadByte::Timeout,
        }
    }

    fn window_size(&mut self) -> Option<(i32, i32)> {
        Some(self.size)
    }

    fn is_tty(&self) -> bool {
        true
    }

    fn enter_raw(&mut self) -> io::Result<()> {
        self.raw_mode = true;
        Ok(())
    }

    fn leave_raw(&mut self) -> io::Result<()> {
        self.raw_mode = false;
        Ok(())
    }
}
