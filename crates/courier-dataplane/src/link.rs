// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link driver seam.
//!
//! The engine talks to the wire through [`LinkDriver`], which keeps it
//! agnostic about where frames come from:
//!
//! - [`PacketSocket`] - one `AF_PACKET` raw socket per named interface
//! - [`MockLink`] - in-memory driver for tests and simulations

use crate::packet::MacAddr;
use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;

/// Largest link-layer frame the engine handles (Ethernet MTU + header).
pub const MAX_FRAME_LEN: usize = 1514;

/// Abstraction over the router's attachment to its links.
///
/// Interfaces are dense indices `0..iface_count()`, fixed at startup.
pub trait LinkDriver {
    /// Block until a frame arrives on any interface; returns its length and
    /// the arrival interface.
    fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<(usize, usize)>;

    /// Transmit one complete frame on `iface`.
    fn send_frame(&mut self, iface: usize, frame: &[u8]) -> io::Result<()>;

    /// Own IPv4 address of `iface`.
    fn iface_ip(&self, iface: usize) -> io::Result<Ipv4Addr>;

    /// Own hardware address of `iface`.
    fn iface_mac(&self, iface: usize) -> io::Result<MacAddr>;

    fn iface_count(&self) -> usize;
}

// ============================================================================
// AF_PACKET driver
// ============================================================================

struct Port {
    fd: libc::c_int,
    name: String,
}

/// Raw-socket driver: one `AF_PACKET` socket per interface, bound to that
/// interface, receiving every ethertype.
pub struct PacketSocket {
    ports: Vec<Port>,
}

impl PacketSocket {
    /// Open and bind one raw socket per interface name, in order; the
    /// position in `names` becomes the interface index.
    pub fn open(names: &[String]) -> io::Result<Self> {
        let mut ports = Vec::with_capacity(names.len());
        for name in names {
            let fd = open_bound_socket(name)?;
            ports.push(Port {
                fd,
                name: name.clone(),
            });
            log::debug!("[link] opened {} fd={}", name, fd);
        }
        Ok(PacketSocket { ports })
    }

    fn port(&self, iface: usize) -> io::Result<&Port> {
        self.ports.get(iface).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no interface with index {}", iface),
            )
        })
    }
}

impl Drop for PacketSocket {
    fn drop(&mut self) {
        for port in &self.ports {
            // SAFETY: fd was returned by socket() and is owned by this port.
            unsafe { libc::close(port.fd) };
        }
    }
}

fn open_bound_socket(name: &str) -> io::Result<libc::c_int> {
    let c_name = std::ffi::CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name has NUL"))?;

    // SAFETY: c_name is a valid NUL-terminated string.
    let ifindex = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if ifindex == 0 {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("unknown interface '{}'", name),
        ));
    }

    // SAFETY: plain socket(2) call; the result is checked below.
    let fd = unsafe {
        libc::socket(
            libc::AF_PACKET,
            libc::SOCK_RAW,
            (libc::ETH_P_ALL as u16).to_be() as libc::c_int,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as libc::c_ushort;
    addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
    addr.sll_ifindex = ifindex as libc::c_int;

    // SAFETY: addr is a fully initialized sockaddr_ll for this socket family.
    let rc = unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        // SAFETY: fd is owned here and not yet published.
        unsafe { libc::close(fd) };
        return Err(err);
    }

    Ok(fd)
}

/// Build an `ifreq` carrying the interface name.
fn ifreq_for(name: &str) -> io::Result<libc::ifreq> {
    // SAFETY: ifreq is plain old data; zeroed is a valid initial state.
    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    let bytes = name.as_bytes();
    if bytes.len() >= libc::IFNAMSIZ {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("interface name '{}' too long", name),
        ));
    }
    for (i, byte) in bytes.iter().enumerate() {
        req.ifr_name[i] = *byte as libc::c_char;
    }
    Ok(req)
}

impl LinkDriver for PacketSocket {
    fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<(usize, usize)> {
        let mut fds: Vec<libc::pollfd> = self
            .ports
            .iter()
            .map(|port| libc::pollfd {
                fd: port.fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        loop {
            // SAFETY: fds points at a live array of initialized pollfds.
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            for (iface, pollfd) in fds.iter().enumerate() {
                if pollfd.revents & libc::POLLIN == 0 {
                    continue;
                }
                // SAFETY: buf is a live writable buffer of the given length.
                let received = unsafe {
                    libc::recv(
                        pollfd.fd,
                        buf.as_mut_ptr() as *mut libc::c_void,
                        buf.len(),
                        0,
                    )
                };
                if received < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(err);
                }
                return Ok((received as usize, iface));
            }
        }
    }

    fn send_frame(&mut self, iface: usize, frame: &[u8]) -> io::Result<()> {
        let port = self.port(iface)?;
        // SAFETY: frame is a live readable buffer of the given length.
        let sent = unsafe {
            libc::send(
                port.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn iface_ip(&self, iface: usize) -> io::Result<Ipv4Addr> {
        let port = self.port(iface)?;
        let mut req = ifreq_for(&port.name)?;
        // SAFETY: req is a valid ifreq; SIOCGIFADDR fills ifr_addr.
        let rc = unsafe { libc::ioctl(port.fd, libc::SIOCGIFADDR, &mut req) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: for AF_INET interfaces ifr_addr holds a sockaddr_in; read
        // unaligned because sockaddr makes no alignment promise for it.
        let sin = unsafe {
            std::ptr::read_unaligned(
                &req.ifr_ifru.ifru_addr as *const libc::sockaddr as *const libc::sockaddr_in,
            )
        };
        Ok(Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()))
    }

    fn iface_mac(&self, iface: usize) -> io::Result<MacAddr> {
        let port = self.port(iface)?;
        let mut req = ifreq_for(&port.name)?;
        // SAFETY: req is a valid ifreq; SIOCGIFHWADDR fills ifr_hwaddr.
        let rc = unsafe { libc::ioctl(port.fd, libc::SIOCGIFHWADDR, &mut req) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut octets = [0u8; 6];
        // SAFETY: sa_data holds the hardware address for SIOCGIFHWADDR.
        let data = unsafe { req.ifr_ifru.ifru_hwaddr.sa_data };
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = data[i] as u8;
        }
        Ok(MacAddr::new(octets))
    }

    fn iface_count(&self) -> usize {
        self.ports.len()
    }
}

// ============================================================================
// Mock driver
// ============================================================================

/// In-memory link driver.
///
/// Feed frames with [`MockLink::push_rx`], inspect transmissions with
/// [`MockLink::take_sent`]. `recv_frame` reports `WouldBlock` when the
/// receive queue is empty instead of blocking.
pub struct MockLink {
    ifaces: Vec<(Ipv4Addr, MacAddr)>,
    rx: VecDeque<(usize, Vec<u8>)>,
    sent: Vec<(usize, Vec<u8>)>,
}

impl MockLink {
    pub fn new(ifaces: Vec<(Ipv4Addr, MacAddr)>) -> Self {
        Self {
            ifaces,
            rx: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    /// Queue a frame for delivery on `iface`.
    pub fn push_rx(&mut self, iface: usize, frame: Vec<u8>) {
        self.rx.push_back((iface, frame));
    }

    /// Frames transmitted so far, in order, with their interfaces.
    pub fn sent(&self) -> &[(usize, Vec<u8>)] {
        &self.sent
    }

    /// Take and clear the transmitted frames.
    pub fn take_sent(&mut self) -> Vec<(usize, Vec<u8>)> {
        std::mem::take(&mut self.sent)
    }
}

impl LinkDriver for MockLink {
    fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<(usize, usize)> {
        let Some((iface, frame)) = self.rx.pop_front() else {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "rx queue empty"));
        };
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok((len, iface))
    }

    fn send_frame(&mut self, iface: usize, frame: &[u8]) -> io::Result<()> {
        if iface >= self.ifaces.len() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such interface"));
        }
        self.sent.push((iface, frame.to_vec()));
        Ok(())
    }

    fn iface_ip(&self, iface: usize) -> io::Result<Ipv4Addr> {
        self.ifaces
            .get(iface)
            .map(|(ip, _)| *ip)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such interface"))
    }

    fn iface_mac(&self, iface: usize) -> io::Result<MacAddr> {
        self.ifaces
            .get(iface)
            .map(|(_, mac)| *mac)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such interface"))
    }

    fn iface_count(&self) -> usize {
        self.ifaces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock() -> MockLink {
        MockLink::new(vec![
            (
                "192.168.0.1".parse().expect("ip"),
                MacAddr::new([1, 1, 1, 1, 1, 1]),
            ),
            (
                "192.168.1.1".parse().expect("ip"),
                MacAddr::new([2, 2, 2, 2, 2, 2]),
            ),
        ])
    }

    #[test]
    fn test_mock_rx_order_and_exhaustion() {
        let mut link = mock();
        link.push_rx(0, vec![1, 2, 3]);
        link.push_rx(1, vec![4]);

        let mut buf = [0u8; MAX_FRAME_LEN];
        let (len, iface) = link.recv_frame(&mut buf).expect("recv should succeed");
        assert_eq!((len, iface), (3, 0));
        assert_eq!(&buf[..len], &[1, 2, 3]);

        let (len, iface) = link.recv_frame(&mut buf).expect("recv should succeed");
        assert_eq!((len, iface), (1, 1));

        let err = link.recv_frame(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_mock_send_capture() {
        let mut link = mock();
        link.send_frame(1, &[9, 9]).expect("send should succeed");
        assert_eq!(link.sent(), &[(1, vec![9, 9])]);
        assert_eq!(link.take_sent(), vec![(1, vec![9, 9])]);
        assert!(link.sent().is_empty());
    }

    #[test]
    fn test_mock_unknown_interface() {
        let mut link = mock();
        assert!(link.send_frame(7, &[0]).is_err());
        assert!(link.iface_ip(7).is_err());
        assert!(link.iface_mac(7).is_err());
    }
}
