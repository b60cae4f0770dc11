// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Courier - Telemetry publish/subscribe broker
//!
//! A single-threaded broker that ingests datagram telemetry publications on a
//! UDP socket, matches them against wildcard topic subscriptions, and fans the
//! payloads out as length-prefixed frames over persistent TCP connections.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                         Broker loop                          |
//! |  +--------------------------------------------------------+  |
//! |  |                      mio::Poll                         |  |
//! |  |  - stdin        (operator commands)                    |  |
//! |  |  - UDP socket   (publisher datagrams)                  |  |
//! |  |  - TCP listener (subscriber connections)               |  |
//! |  |  - TCP streams  (subscriber requests / fan-out)        |  |
//! |  +--------------------------------------------------------+  |
//! |                              |                               |
//! |                              v                               |
//! |   decode datagram -> match topic -> registry -> fan-out      |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`codec`] - Bounds-checked wire codecs (datagram and stream frame)
//! - [`topic`] - Slash-separated topic patterns with `+`/`*` wildcards
//! - [`registry`] - Subscriber catalog with a pattern reverse index
//! - [`transport`] - Stream framing, blocking send/recv helpers, sockets
//! - [`server`] - The readiness-multiplexed broker event loop
//!
//! ## Wire Formats
//!
//! Publisher datagram: 50-byte NUL-padded topic, 1-byte payload kind, then a
//! kind-specific payload (all multi-byte integers big-endian).
//!
//! Subscriber stream: `kind(1) || inner_len(2, BE) || inner` envelopes; the
//! inner payload is either a subscriber request or a broker response.

/// Protocol constants shared by every module.
pub mod config;

/// Wire codecs: cursors, payload union, datagram and frame messages.
pub mod codec;

/// Topic patterns with single-token (`+`) and multi-token (`*`) wildcards.
pub mod topic;

/// Subscriber registry (id, connection and pattern indices).
pub mod registry;

/// Stream framing and socket plumbing.
pub mod transport;

/// Broker event loop.
pub mod server;

pub use codec::WireError;
pub use server::Broker;
pub use topic::TopicPattern;
