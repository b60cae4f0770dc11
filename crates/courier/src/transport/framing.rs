// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Incremental envelope framing for non-blocking streams.
//!
//! TCP has no message boundaries, so the codec accumulates bytes across
//! reads and yields one complete envelope at a time. It is built for the
//! mio loop: call [`FrameCodec::decode`] whenever the socket turns readable,
//! until it reports that more data is needed.

use crate::codec::frame::EnvelopeKind;
use crate::config::ENVELOPE_HEADER_LEN;
use std::io::{self, Read};

/// Incremental decoder for `kind(1) || inner_len(2, BE) || inner` envelopes.
#[derive(Debug)]
pub struct FrameCodec {
    state: ReadState,
    buffer: Vec<u8>,
    max_inner: usize,
}

#[derive(Debug, Clone, Copy)]
enum ReadState {
    /// Reading the 3-byte envelope header.
    Header { bytes_read: usize },
    /// Reading the inner payload.
    Body {
        kind: EnvelopeKind,
        expected: usize,
        bytes_read: usize,
    },
}

impl FrameCodec {
    pub fn new(max_inner: usize) -> Self {
        Self {
            state: ReadState::Header { bytes_read: 0 },
            buffer: vec![0u8; ENVELOPE_HEADER_LEN],
            max_inner,
        }
    }

    /// Frame an inner payload into `out`.
    pub fn encode_into(kind: EnvelopeKind, inner: &[u8], out: &mut Vec<u8>) {
        out.push(kind as u8);
        out.extend_from_slice(&(inner.len() as u16).to_be_bytes());
        out.extend_from_slice(inner);
    }

    /// Try to decode one complete envelope from the reader.
    ///
    /// Returns:
    /// - `Ok(Some((kind, inner)))` - a complete envelope was decoded
    /// - `Ok(None)` - more data is needed (`WouldBlock`)
    /// - `Err(UnexpectedEof)` - the peer closed the stream
    /// - `Err(InvalidData)` - unknown envelope kind or oversize inner length
    pub fn decode<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> io::Result<Option<(EnvelopeKind, Vec<u8>)>> {
        loop {
            match self.state {
                ReadState::Header { bytes_read } => {
                    match reader.read(&mut self.buffer[bytes_read..ENVELOPE_HEADER_LEN]) {
                        Ok(0) => {
                            let reason = if bytes_read == 0 {
                                "connection closed"
                            } else {
                                "connection closed inside an envelope header"
                            };
                            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, reason));
                        }
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < ENVELOPE_HEADER_LEN {
                                self.state = ReadState::Header { bytes_read: total };
                                continue;
                            }

                            let kind = EnvelopeKind::from_wire(self.buffer[0]).map_err(|err| {
                                self.state = ReadState::Header { bytes_read: 0 };
                                io::Error::new(io::ErrorKind::InvalidData, err.to_string())
                            })?;
                            let expected =
                                u16::from_be_bytes([self.buffer[1], self.buffer[2]]) as usize;
                            if expected > self.max_inner {
                                self.state = ReadState::Header { bytes_read: 0 };
                                return Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    format!(
                                        "inner length {} exceeds cap {}",
                                        expected, self.max_inner
                                    ),
                                ));
                            }

                            if expected == 0 {
                                self.state = ReadState::Header { bytes_read: 0 };
                                return Ok(Some((kind, Vec::new())));
                            }

                            self.buffer.resize(expected, 0);
                            self.state = ReadState::Body {
                                kind,
                                expected,
                                bytes_read: 0,
                            };
                        }
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(None);
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => return Err(err),
                    }
                }
                ReadState::Body {
                    kind,
                    expected,
                    bytes_read,
                } => match reader.read(&mut self.buffer[bytes_read..expected]) {
                    Ok(0) => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed inside an envelope body",
                        ));
                    }
                    Ok(n) => {
                        let total = bytes_read + n;
                        if total < expected {
                            self.state = ReadState::Body {
                                kind,
                                expected,
                                bytes_read: total,
                            };
                            continue;
                        }

                        let inner = std::mem::replace(
                            &mut self.buffer,
                            vec![0u8; ENVELOPE_HEADER_LEN],
                        );
                        self.state = ReadState::Header { bytes_read: 0 };
                        return Ok(Some((kind, inner)));
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        self.state = ReadState::Body {
                            kind,
                            expected,
                            bytes_read,
                        };
                        return Ok(None);
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                },
            }
        }
    }
}
