// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber stream protocol: envelopes, requests and responses.
//!
//! Every stream message is a length-prefixed envelope:
//!
//! ```text
//! +---------+------------------+---------------------+
//! | kind(1) | inner_len(2, BE) | inner[inner_len]    |
//! +---------+------------------+---------------------+
//! ```
//!
//! Request inner (subscriber to broker):
//!
//! ```text
//! req_kind(1)   0=CONNECT 1=SUBSCRIBE 2=UNSUBSCRIBE
//! CONNECT:      id_len(1 <= 10)    || id[id_len]
//! otherwise:    topic_len(1 <= 50) || topic[topic_len]
//! ```
//!
//! Response inner (broker to subscriber):
//!
//! ```text
//! source_ipv4(4, network order as received)
//! source_port(2, BE)
//! topic_len(1) || topic[topic_len]
//! payload_kind(1) || payload
//! ```

use super::cursor::{Cursor, CursorMut};
use super::payload::{Payload, PayloadKind};
use super::{WireError, WireResult};
use crate::config::{CLIENT_ID_MAX_LEN, ENVELOPE_HEADER_LEN, INNER_MAX_LEN, TOPIC_MAX_LEN};
use std::net::Ipv4Addr;

/// Envelope discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvelopeKind {
    Request = 0,
    Response = 1,
}

impl EnvelopeKind {
    pub fn from_wire(kind: u8) -> WireResult<Self> {
        match kind {
            0 => Ok(EnvelopeKind::Request),
            1 => Ok(EnvelopeKind::Response),
            _ => Err(WireError::UnknownKind { kind }),
        }
    }
}

/// Wrap an inner payload into a full envelope.
fn envelope(kind: EnvelopeKind, inner: &[u8]) -> Vec<u8> {
    debug_assert!(inner.len() <= INNER_MAX_LEN);
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_LEN + inner.len());
    frame.push(kind as u8);
    frame.extend_from_slice(&(inner.len() as u16).to_be_bytes());
    frame.extend_from_slice(inner);
    frame
}

const REQ_CONNECT: u8 = 0;
const REQ_SUBSCRIBE: u8 = 1;
const REQ_UNSUBSCRIBE: u8 = 2;

/// Subscriber request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect { id: String },
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

impl Request {
    /// Decode a request from an envelope's inner payload.
    pub fn decode(inner: &[u8]) -> WireResult<Self> {
        let mut cur = Cursor::new(inner);
        let kind = cur.read_u8()?;
        match kind {
            REQ_CONNECT => {
                let id = read_short_text(&mut cur, CLIENT_ID_MAX_LEN)?;
                Ok(Request::Connect { id })
            }
            REQ_SUBSCRIBE => {
                let topic = read_short_text(&mut cur, TOPIC_MAX_LEN)?;
                Ok(Request::Subscribe { topic })
            }
            REQ_UNSUBSCRIBE => {
                let topic = read_short_text(&mut cur, TOPIC_MAX_LEN)?;
                Ok(Request::Unsubscribe { topic })
            }
            _ => Err(WireError::UnknownKind { kind }),
        }
    }

    /// Encode the request as a full envelope.
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let (kind, text, max) = match self {
            Request::Connect { id } => (REQ_CONNECT, id, CLIENT_ID_MAX_LEN),
            Request::Subscribe { topic } => (REQ_SUBSCRIBE, topic, TOPIC_MAX_LEN),
            Request::Unsubscribe { topic } => (REQ_UNSUBSCRIBE, topic, TOPIC_MAX_LEN),
        };
        if text.len() > max {
            return Err(WireError::Oversize {
                size: text.len(),
                max,
            });
        }

        let mut inner = vec![0u8; 1 + 1 + text.len()];
        let mut cur = CursorMut::new(&mut inner);
        cur.write_u8(kind)?;
        cur.write_u8(text.len() as u8)?;
        cur.write_bytes(text.as_bytes())?;
        Ok(envelope(EnvelopeKind::Request, &inner))
    }
}

/// Broker response: one matched publication with its publisher's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Publisher source address, network order as received on the datagram.
    pub source_ip: Ipv4Addr,
    pub source_port: u16,
    pub topic: String,
    pub payload: Payload,
}

impl Response {
    /// Encode the response as a full envelope.
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        if self.topic.len() > TOPIC_MAX_LEN {
            return Err(WireError::Oversize {
                size: self.topic.len(),
                max: TOPIC_MAX_LEN,
            });
        }

        let inner_len = 4 + 2 + 1 + self.topic.len() + 1 + self.payload.encoded_len();
        let mut inner = vec![0u8; inner_len];
        let mut cur = CursorMut::new(&mut inner);
        cur.write_bytes(&self.source_ip.octets())?;
        cur.write_u16(self.source_port)?;
        cur.write_u8(self.topic.len() as u8)?;
        cur.write_bytes(self.topic.as_bytes())?;
        cur.write_u8(self.payload.kind() as u8)?;
        self.payload.encode(&mut cur)?;
        Ok(envelope(EnvelopeKind::Response, &inner))
    }

    /// Decode a response from an envelope's inner payload.
    pub fn decode(inner: &[u8]) -> WireResult<Self> {
        let mut cur = Cursor::new(inner);
        let mut octets = [0u8; 4];
        octets.copy_from_slice(cur.read_bytes(4)?);
        let source_ip = Ipv4Addr::from(octets);
        let source_port = cur.read_u16()?;
        let topic = read_short_text(&mut cur, TOPIC_MAX_LEN)?;
        let kind = PayloadKind::from_wire(cur.read_u8()?)?;
        let payload = Payload::decode(kind, cur.rest())?;
        Ok(Response {
            source_ip,
            source_port,
            topic,
            payload,
        })
    }
}

/// Read a `len(1) || bytes[len]` text field, enforcing `max`.
fn read_short_text(cur: &mut Cursor<'_>, max: usize) -> WireResult<String> {
    let len = cur.read_u8()? as usize;
    if len > max {
        return Err(WireError::Oversize { size: len, max });
    }
    let bytes = cur.read_bytes(len)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| WireError::BadText)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_envelope(frame: &[u8], expected: EnvelopeKind) -> Vec<u8> {
        assert_eq!(frame[0], expected as u8);
        let len = u16::from_be_bytes([frame[1], frame[2]]) as usize;
        assert_eq!(frame.len(), ENVELOPE_HEADER_LEN + len);
        frame[ENVELOPE_HEADER_LEN..].to_vec()
    }

    #[test]
    fn test_request_connect_roundtrip() {
        let request = Request::Connect {
            id: "sensor01".to_string(),
        };
        let frame = request.encode().expect("encode should succeed");
        let inner = strip_envelope(&frame, EnvelopeKind::Request);
        assert_eq!(inner[0], REQ_CONNECT);
        assert_eq!(inner[1] as usize, 8);
        assert_eq!(
            Request::decode(&inner).expect("decode should succeed"),
            request
        );
    }

    #[test]
    fn test_request_subscribe_roundtrip() {
        let request = Request::Subscribe {
            topic: "temp/+/room".to_string(),
        };
        let frame = request.encode().expect("encode should succeed");
        let inner = strip_envelope(&frame, EnvelopeKind::Request);
        assert_eq!(
            Request::decode(&inner).expect("decode should succeed"),
            request
        );
    }

    #[test]
    fn test_request_rejects_oversize_id() {
        let request = Request::Connect {
            id: "a-very-long-client-id".to_string(),
        };
        let err = request.encode().unwrap_err();
        assert!(matches!(err, WireError::Oversize { .. }));

        // The decoder applies the same cap.
        let mut inner = vec![REQ_CONNECT, 11];
        inner.extend_from_slice(b"elevenchars");
        assert!(matches!(
            Request::decode(&inner),
            Err(WireError::Oversize { size: 11, max: 10 })
        ));
    }

    #[test]
    fn test_request_rejects_lying_length() {
        // Declared id length runs past the inner payload.
        let inner = [REQ_CONNECT, 5, b'a', b'b'];
        assert!(matches!(
            Request::decode(&inner),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_request_rejects_unknown_kind() {
        let inner = [9u8, 0];
        assert_eq!(
            Request::decode(&inner),
            Err(WireError::UnknownKind { kind: 9 })
        );
    }

    #[test]
    fn test_response_roundtrip_int() {
        let response = Response {
            source_ip: Ipv4Addr::new(10, 0, 0, 7),
            source_port: 4242,
            topic: "temp/floor1/room".to_string(),
            payload: Payload::Int { sign: 0, value: 42 },
        };
        let frame = response.encode().expect("encode should succeed");
        let inner = strip_envelope(&frame, EnvelopeKind::Response);
        assert_eq!(
            Response::decode(&inner).expect("decode should succeed"),
            response
        );
    }

    #[test]
    fn test_response_roundtrip_string() {
        let response = Response {
            source_ip: Ipv4Addr::new(192, 168, 1, 9),
            source_port: 9,
            topic: "logs".to_string(),
            payload: Payload::Str(b"pump pressure nominal".to_vec()),
        };
        let frame = response.encode().expect("encode should succeed");
        let inner = strip_envelope(&frame, EnvelopeKind::Response);
        assert_eq!(
            Response::decode(&inner).expect("decode should succeed"),
            response
        );
    }

    #[test]
    fn test_response_fits_inner_cap() {
        let response = Response {
            source_ip: Ipv4Addr::new(255, 255, 255, 255),
            source_port: u16::MAX,
            topic: "t".repeat(TOPIC_MAX_LEN),
            payload: Payload::Str(vec![b'x'; crate::config::STRING_MAX_LEN]),
        };
        let frame = response.encode().expect("encode should succeed");
        assert_eq!(frame.len(), ENVELOPE_HEADER_LEN + INNER_MAX_LEN);
    }

    #[test]
    fn test_envelope_kind_from_wire() {
        assert_eq!(EnvelopeKind::from_wire(0), Ok(EnvelopeKind::Request));
        assert_eq!(EnvelopeKind::from_wire(1), Ok(EnvelopeKind::Response));
        assert!(EnvelopeKind::from_wire(2).is_err());
    }
}
