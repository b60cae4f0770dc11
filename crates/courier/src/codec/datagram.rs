// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher datagram decoding.
//!
//! One datagram carries exactly one publication:
//!
//! ```text
//! 0  ..49   topic          50 bytes, NUL-padded literal
//! 50        payload kind   1 byte
//! 51 ..end  payload        kind-specific layout
//! ```

use super::payload::{Payload, PayloadKind};
use super::{WireError, WireResult};
use crate::config::{DATAGRAM_MIN_LEN, TOPIC_FIELD_LEN};

/// One decoded publication from the UDP ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Payload,
}

impl Publication {
    /// Decode a publication from one datagram.
    ///
    /// The topic is the NUL-terminated prefix of the fixed 50-byte field
    /// (or the whole field when the publisher fills it completely).
    pub fn decode(buf: &[u8]) -> WireResult<Self> {
        if buf.len() < DATAGRAM_MIN_LEN {
            return Err(WireError::Truncated { offset: 0 });
        }

        let topic_field = &buf[..TOPIC_FIELD_LEN];
        let topic_len = topic_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TOPIC_FIELD_LEN);
        let topic = std::str::from_utf8(&topic_field[..topic_len])
            .map_err(|_| WireError::BadText)?
            .to_owned();

        let kind = PayloadKind::from_wire(buf[TOPIC_FIELD_LEN])?;
        let payload = Payload::decode(kind, &buf[TOPIC_FIELD_LEN + 1..])?;

        Ok(Publication { topic, payload })
    }
}
