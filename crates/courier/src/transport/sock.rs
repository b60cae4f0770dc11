// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Socket construction for the broker.
//!
//! The broker binds a TCP listener and a UDP socket to the same port. Both
//! are built through `socket2` so `SO_REUSEADDR` is set before bind, then
//! handed to mio in non-blocking mode.

use crate::config::LISTEN_BACKLOG;
use mio::net::{TcpListener, UdpSocket};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Bind the listener/datagram socket pair on `port` (0 picks an ephemeral
/// port for each socket independently - useful only in tests).
pub fn bind_pair(port: u16) -> io::Result<(TcpListener, UdpSocket)> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));

    let listener = {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        socket.set_nonblocking(true)?;
        TcpListener::from_std(socket.into())
    };

    let udp = {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    };

    log::debug!(
        "[sock] bound listener={} udp={}",
        listener.local_addr()?,
        udp.local_addr()?
    );

    Ok((listener, udp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_pair_ephemeral() {
        let (listener, udp) = bind_pair(0).expect("bind should succeed");
        assert_ne!(listener.local_addr().expect("addr").port(), 0);
        assert_ne!(udp.local_addr().expect("addr").port(), 0);
    }

    #[test]
    fn test_bind_pair_same_port_for_both_protocols() {
        // TCP and UDP port namespaces are disjoint; grab a free TCP port and
        // bind the pair there.
        let probe = std::net::TcpListener::bind("0.0.0.0:0").expect("probe bind should succeed");
        let port = probe.local_addr().expect("addr").port();
        drop(probe);

        let (listener, udp) = bind_pair(port).expect("bind should succeed");
        assert_eq!(listener.local_addr().expect("addr").port(), port);
        assert_eq!(udp.local_addr().expect("addr").port(), port);
    }
}
