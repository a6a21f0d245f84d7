//! Structural errors and their raise sites.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A message together with the location it was raised from.
///
/// Propagation with `?` preserves the original raise, so the first message
/// survives any number of re-raises along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raise {
    message: String,
    file: &'static str,
    line: u32,
}

impl Raise {
    #[track_caller]
    pub(crate) fn new(message: String) -> Self {
        let loc = Location::caller();

        Self {
            message,
            file: loc.file(),
            line: loc.line(),
        }
    }

    /// The message this error was raised with.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Raise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.file, self.line)
    }
}

/// An error produced while reading or interpreting a document.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A structural parse error. The document-open path catches this once
    /// and enters repair mode; afterwards it is fatal.
    #[error("parse error: {0}")]
    Parse(Raise),
    /// Repair was already attempted and the data is still unreadable.
    #[error("unrecoverable document: {0}")]
    Unrecoverable(Raise),
    /// A named resource was absent from the page's resource dictionary.
    #[error("missing resource: {0}")]
    MissingResource(Raise),
    /// A stream filter failed to decode its input.
    #[error("filter failed: {0}")]
    Filter(Raise),
    /// Allocation failed even after scavenging the store.
    #[error("out of memory")]
    OutOfMemory,
    /// The operation was cancelled through a cookie. Not a failure; the
    /// scope stack unwinds cleanly.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Raise a structural parse error from the caller's location.
    #[track_caller]
    pub fn parse(message: String) -> Self {
        Self::Parse(Raise::new(message))
    }

    #[track_caller]
    pub(crate) fn unrecoverable(message: String) -> Self {
        Self::Unrecoverable(Raise::new(message))
    }

    #[track_caller]
    pub(crate) fn filter(message: String) -> Self {
        Self::Filter(Raise::new(message))
    }

    /// Create a missing-resource error.
    #[track_caller]
    pub fn missing_resource(message: String) -> Self {
        Self::MissingResource(Raise::new(message))
    }
}

/// Raise a structural parse error from the current location.
#[macro_export]
macro_rules! raise {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::parse(format!($($arg)*)))
    };
}
