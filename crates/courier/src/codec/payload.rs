// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagged payload union shared by the datagram and the stream frame.
//!
//! The payload travels as a 1-byte kind followed by a kind-specific layout:
//!
//! | Kind       | Layout                                   | Bytes    |
//! |------------|------------------------------------------|----------|
//! | INT        | sign(1) value(4, BE)                     | 5        |
//! | SHORT_REAL | value(2, BE), 100x the real value        | 2        |
//! | FLOAT      | sign(1) value(4, BE) exponent(1)         | 6        |
//! | STRING     | raw bytes, length implied by the carrier | 1..=1500 |
//!
//! Fixed-size kinds ignore any trailing bytes; STRING consumes the rest of
//! the carrier, stopping at the first NUL if the publisher pads.

use super::cursor::{Cursor, CursorMut};
use super::{WireError, WireResult};
use crate::config::STRING_MAX_LEN;

/// Payload kind discriminant as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadKind {
    Int = 0,
    ShortReal = 1,
    Float = 2,
    Str = 3,
}

impl PayloadKind {
    pub fn from_wire(kind: u8) -> WireResult<Self> {
        match kind {
            0 => Ok(PayloadKind::Int),
            1 => Ok(PayloadKind::ShortReal),
            2 => Ok(PayloadKind::Float),
            3 => Ok(PayloadKind::Str),
            _ => Err(WireError::UnknownKind { kind }),
        }
    }

    /// Minimum encoded size for this kind.
    pub const fn min_len(self) -> usize {
        match self {
            PayloadKind::Int => 5,
            PayloadKind::ShortReal => 2,
            PayloadKind::Float => 6,
            PayloadKind::Str => 1,
        }
    }

    /// Display name used by log lines and the subscriber client.
    pub const fn name(self) -> &'static str {
        match self {
            PayloadKind::Int => "INT",
            PayloadKind::ShortReal => "SHORT_REAL",
            PayloadKind::Float => "FLOAT",
            PayloadKind::Str => "STRING",
        }
    }
}

/// Decoded telemetry value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Signed integer: a sign octet (non-zero means negative) and a magnitude.
    Int { sign: u8, value: u32 },
    /// Non-negative real with two decimals, carried as 100x the value.
    ShortReal { value: u16 },
    /// Signed real: magnitude scaled down by `10^exponent`.
    Float { sign: u8, value: u32, exponent: u8 },
    /// Raw text bytes, at most [`STRING_MAX_LEN`].
    Str(Vec<u8>),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Int { .. } => PayloadKind::Int,
            Payload::ShortReal { .. } => PayloadKind::ShortReal,
            Payload::Float { .. } => PayloadKind::Float,
            Payload::Str(_) => PayloadKind::Str,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Payload::Str(bytes) => bytes.len(),
            other => other.kind().min_len(),
        }
    }

    /// Decode a payload of `kind` from the remaining bytes of its carrier.
    ///
    /// Fixed-size kinds tolerate trailing bytes. STRING takes everything up
    /// to the first NUL, silently dropping anything past [`STRING_MAX_LEN`].
    pub fn decode(kind: PayloadKind, buf: &[u8]) -> WireResult<Self> {
        if buf.len() < kind.min_len() {
            return Err(WireError::Truncated { offset: 0 });
        }

        let mut cur = Cursor::new(buf);
        match kind {
            PayloadKind::Int => Ok(Payload::Int {
                sign: cur.read_u8()?,
                value: cur.read_u32()?,
            }),
            PayloadKind::ShortReal => Ok(Payload::ShortReal {
                value: cur.read_u16()?,
            }),
            PayloadKind::Float => Ok(Payload::Float {
                sign: cur.read_u8()?,
                value: cur.read_u32()?,
                exponent: cur.read_u8()?,
            }),
            PayloadKind::Str => {
                let bounded = &buf[..buf.len().min(STRING_MAX_LEN)];
                let len = bounded.iter().position(|&b| b == 0).unwrap_or(bounded.len());
                Ok(Payload::Str(bounded[..len].to_vec()))
            }
        }
    }

    /// Encode the payload body (the kind byte is written by the carrier).
    pub fn encode(&self, cur: &mut CursorMut<'_>) -> WireResult<()> {
        match self {
            Payload::Int { sign, value } => {
                cur.write_u8(*sign)?;
                cur.write_u32(*value)
            }
            Payload::ShortReal { value } => cur.write_u16(*value),
            Payload::Float {
                sign,
                value,
                exponent,
            } => {
                cur.write_u8(*sign)?;
                cur.write_u32(*value)?;
                cur.write_u8(*exponent)
            }
            Payload::Str(bytes) => {
                if bytes.len() > STRING_MAX_LEN {
                    return Err(WireError::Oversize {
                        size: bytes.len(),
                        max: STRING_MAX_LEN,
                    });
                }
                cur.write_bytes(bytes)
            }
        }
    }
}
