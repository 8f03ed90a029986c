//! Structured error records.
//!
//! Every fallible guest-visible operation returns a [`DcResult`].  The record
//! carries the error class plus whatever attributes the failing code attached
//! (faulting address, access length, missing feature, file path, ...), so the
//! top of the dispatch loop can print one self-contained report and stop the
//! frame.
//!
//! Genuine invariant violations (double-scheduling an event, a bad system
//! state transition) do not use this type; they panic with the formatted
//! record instead, because there is no recovery path.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Error classes.  The class selects the broad failure family; the record's
/// attributes narrow it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// The guest exercised behaviour the emulator does not implement.
    #[error("unimplemented behavior")]
    Unimplemented,
    /// Internal consistency check failed.
    #[error("integrity check failed")]
    Integrity,
    /// A parameter was outside its legal range.
    #[error("invalid parameter")]
    InvalidParam,
    /// An access fell outside the backing storage of a device.
    #[error("memory access out of bounds")]
    MemOutOfBounds,
    /// Host file I/O failed.
    #[error("file i/o error")]
    FileIo,
    /// A host file did not have the length the device requires.
    #[error("invalid file length")]
    InvalidFileLen,
}

/// One error report.  Only `kind` is mandatory; everything else is attached
/// by the failing code when it is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub address: Option<u32>,
    pub length: Option<u32>,
    pub expected_length: Option<u32>,
    pub value: Option<u32>,
    pub feature: Option<&'static str>,
    pub context: Option<&'static str>,
    pub path: Option<PathBuf>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            address: None,
            length: None,
            expected_length: None,
            value: None,
            feature: None,
            context: None,
            path: None,
        }
    }

    /// Shorthand for the most common report: a named missing feature.
    pub fn unimplemented(feature: &'static str) -> Self {
        Self::new(ErrorKind::Unimplemented).feature(feature)
    }

    /// Shorthand for a failed internal consistency check.
    pub fn integrity(context: &'static str) -> Self {
        Self::new(ErrorKind::Integrity).context(context)
    }

    /// Shorthand for a host-file failure.
    pub fn file_io(path: impl Into<PathBuf>) -> Self {
        Self::new(ErrorKind::FileIo).path(path)
    }

    pub fn address(mut self, address: u32) -> Self {
        self.address = Some(address);
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn expected_length(mut self, expected: u32) -> Self {
        self.expected_length = Some(expected);
        self
    }

    pub fn value(mut self, value: u32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn feature(mut self, feature: &'static str) -> Self {
        self.feature = Some(feature);
        self
    }

    pub fn context(mut self, context: &'static str) -> Self {
        self.context = Some(context);
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(feature) = self.feature {
            write!(f, "; feature: {feature}")?;
        }
        if let Some(context) = self.context {
            write!(f, "; context: {context}")?;
        }
        if let Some(address) = self.address {
            write!(f, "; address: {address:#010x}")?;
        }
        if let Some(length) = self.length {
            write!(f, "; length: {length}")?;
        }
        if let Some(expected) = self.expected_length {
            write!(f, "; expected length: {expected}")?;
        }
        if let Some(value) = self.value {
            write!(f, "; value: {value:#x}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; path: {}", path.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorRecord {}

pub type DcResult<T> = Result<T, ErrorRecord>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_attributes() {
        let record = ErrorRecord::unimplemented("8-bit RTC access")
            .address(0x00710000)
            .length(1);
        let text = record.to_string();
        assert!(text.contains("unimplemented"));
        assert!(text.contains("8-bit RTC access"));
        assert!(text.contains("0x00710000"));
        assert!(text.contains("length: 1"));
    }

    #[test]
    fn test_builder_sets_fields() {
        let record = ErrorRecord::new(ErrorKind::InvalidFileLen)
            .length(100)
            .expected_length(32768);
        assert_eq!(record.kind, ErrorKind::InvalidFileLen);
        assert_eq!(record.length, Some(100));
        assert_eq!(record.expected_length, Some(32768));
    }
}
