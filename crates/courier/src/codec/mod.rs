// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire codecs for the publisher datagram and the subscriber stream frame.
//!
//! All multi-byte integers are big-endian on the wire. Every decoder takes a
//! byte slice and fails with a distinct error; the event loop recovers from
//! all of them without terminating.

pub mod cursor;
pub mod datagram;
pub mod frame;
pub mod payload;

pub use cursor::{Cursor, CursorMut};
pub use datagram::Publication;
pub use frame::{EnvelopeKind, Request, Response};
pub use payload::{Payload, PayloadKind};

use std::fmt;

/// Codec error used throughout the wire layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer ended before the field at `offset` could be read or written.
    Truncated { offset: usize },
    /// Unknown discriminant for a tagged field.
    UnknownKind { kind: u8 },
    /// A declared or computed size exceeds the protocol maximum.
    Oversize { size: usize, max: usize },
    /// Text field is not valid UTF-8.
    BadText,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Truncated { offset } => {
                write!(f, "buffer too small at offset {}", offset)
            }
            WireError::UnknownKind { kind } => write!(f, "unknown kind {}", kind),
            WireError::Oversize { size, max } => {
                write!(f, "size {} exceeds maximum {}", size, max)
            }
            WireError::BadText => write!(f, "text field is not valid UTF-8"),
        }
    }
}

impl std::error::Error for WireError {}

pub type WireResult<T> = Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_error_display() {
        let err = WireError::Truncated { offset: 12 };
        assert_eq!(err.to_string(), "buffer too small at offset 12");

        let err = WireError::UnknownKind { kind: 9 };
        assert_eq!(err.to_string(), "unknown kind 9");

        let err = WireError::Oversize { size: 2000, max: 1558 };
        assert_eq!(err.to_string(), "size 2000 exceeds maximum 1558");
    }
}
