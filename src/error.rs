//! Error types shared across the crate.

use thiserror::Error;

/// Failure modes for loading a ROM image.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RomError {
    #[error("ROM image ({size} bytes) is larger than this model's flash ({capacity} bytes)")]
    TooLarge { size: usize, capacity: usize },
    #[error("ROM image is empty")]
    Empty,
}

/// Failure modes for save-state load/save.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("not a recognized save state (bad magic)")]
    BadMagic,
    #[error("save state is for a different model (expected {expected:?}, got {found:?})")]
    ModelMismatch {
        expected: crate::model::ModelId,
        found: crate::model::ModelId,
    },
    #[error("save state format version {found} is newer than supported ({max_supported})")]
    UnsupportedVersion { found: u16, max_supported: u16 },
    #[error("section `{section}` truncated: need {need} bytes, have {have}")]
    Truncated {
        section: &'static str,
        need: usize,
        have: usize,
    },
    #[error("output buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },
}

/// Failure modes reported by the link port.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("link operation timed out")]
    Timeout,
    #[error("link cable not connected")]
    NotConnected,
}
