// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream framing and socket plumbing.

pub mod framing;
pub mod sock;
pub mod stream;

pub use framing::FrameCodec;
pub use stream::{recv_all, send_all, StreamError};
