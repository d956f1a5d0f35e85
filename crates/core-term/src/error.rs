//! Error type with the stable negative codes of the public API.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TermError {
    #[error("in/output device is not a terminal")]
    NotATty,
    #[error("timeout")]
    Timeout,
    #[error("size information for terminal could not be found")]
    NoSizeInfo,
    #[error("non-printable character passed for display")]
    Nonprint,
    #[error("character-set conversion not available")]
    CharsetError,
    #[error("terminal is a hardcopy terminal")]
    HardcopyTerminal,
    #[error("no information found in terminfo database")]
    TerminfoDbNotFound,
    #[error("terminal provides too limited functionality")]
    TerminalTooLimited,
    #[error("unknown error")]
    Unknown,
    #[error("bad argument passed to function")]
    BadArg,
    #[error("end of file reached")]
    Eof,
    #[error("out of memory")]
    OutOfMemory,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TermError {
    /// Stable numeric code; the bit layout of these values is public API.
    pub fn code(&self) -> i32 {
        match self {
            TermError::Io(_) => -1,
            TermError::Eof => -2,
            TermError::OutOfMemory => -3,
            TermError::NotATty => -64,
            TermError::Timeout => -63,
            TermError::NoSizeInfo => -62,
            TermError::Nonprint => -61,
            TermError::CharsetError => -60,
            TermError::HardcopyTerminal => -59,
            TermError::TerminfoDbNotFound => -58,
            TermError::TerminalTooLimited => -57,
            TermError::Unknown => -56,
            TermError::BadArg => -55,
        }
    }
}

impl From<core_caps::CapsError> for TermError {
    fn from(e: core_caps::CapsError) -> TermError {
        match e {
            core_caps::CapsError::HardcopyTerminal => TermError::HardcopyTerminal,
            core_caps::CapsError::TerminfoDbNotFound => TermError::TerminfoDbNotFound,
            core_caps::CapsError::TerminalTooLimited => TermError::TerminalTooLimited,
        }
    }
}

impl From<core_window::DrawError> for TermError {
    fn from(e: core_window::DrawError) -> TermError {
        match e {
            core_window::DrawError::Nonprint => TermError::Nonprint,
            core_window::DrawError::BadArg => TermError::BadArg,
        }
    }
}

/// Warning code in the positive-zone warning namespace: terminal feature
/// detection finished mid-read and the screen should be updated.
pub const WARN_UPDATE_TERMINAL: i32 = -1;
