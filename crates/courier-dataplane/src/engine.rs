// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame dispatch and forwarding.
//!
//! One frame at a time: dispatch by ethertype, validate, then either answer
//! locally (ARP, ICMP echo) or rewrite and forward. Per-packet failures are
//! logged and dropped; the receive loop never stops for one bad frame.
//!
//! ICMP errors and forwarded frames share a single send path that consults
//! the ARP cache last: on a miss the frame is copied into the pending queue
//! and an ARP request goes out instead.

use crate::arp::{ArpCache, PendingFrame};
use crate::link::{LinkDriver, MAX_FRAME_LEN};
use crate::packet::{
    ArpPacket, EthernetHeader, IcmpHeader, Ipv4Header, MacAddr, ARP_OP_REPLY, ARP_OP_REQUEST,
    ARP_PACKET_LEN, ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHER_HDR_LEN, ICMP_CODE_NET_UNREACH,
    ICMP_CODE_TTL_EXCEEDED, ICMP_DEST_UNREACH, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST, ICMP_HDR_LEN,
    ICMP_TIME_EXCEEDED, IPV4_HDR_LEN, IP_DEFAULT_TTL, IP_PROTO_ICMP,
};
use crate::rtable::RoutingTable;
use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;

/// ICMP error frame: Ethernet + outer IPv4 + ICMP + quoted IPv4 + 8 bytes.
const ICMP_ERROR_FRAME_LEN: usize =
    ETHER_HDR_LEN + IPV4_HDR_LEN + ICMP_HDR_LEN + IPV4_HDR_LEN + 8;

#[derive(Clone, Copy)]
struct IfaceInfo {
    ip: Ipv4Addr,
    mac: MacAddr,
}

/// The forwarding engine, generic over its attachment to the wire.
pub struct Router<L: LinkDriver> {
    link: L,
    rtable: RoutingTable,
    arp: ArpCache,
    // Own-address cache: the underlying queries are syscalls.
    iface_info: HashMap<usize, IfaceInfo>,
}

impl<L: LinkDriver> Router<L> {
    pub fn new(link: L, rtable: RoutingTable) -> Self {
        Self {
            link,
            rtable,
            arp: ArpCache::new(),
            iface_info: HashMap::new(),
        }
    }

    /// Seed the ARP cache, e.g. from a static table file.
    pub fn seed_arp(&mut self, entries: impl IntoIterator<Item = (Ipv4Addr, MacAddr)>) {
        for (ip, mac) in entries {
            self.arp.insert(ip, mac);
        }
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Receive and handle frames forever.
    pub fn run(&mut self) -> io::Result<()> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        loop {
            let (len, iface) = self.link.recv_frame(&mut buf)?;
            log::debug!("[engine] frame len={} iface={}", len, iface);
            self.handle_frame(&mut buf[..len], iface);
        }
    }

    /// Handle one frame received on `iface`.
    pub fn handle_frame(&mut self, frame: &mut [u8], iface: usize) {
        let eth = match EthernetHeader::parse(frame) {
            Ok(eth) => eth,
            Err(err) => {
                log::warn!("[engine] dropping runt frame on iface {}: {}", iface, err);
                return;
            }
        };

        match eth.ethertype {
            ETHERTYPE_ARP => self.handle_arp(frame, iface),
            ETHERTYPE_IPV4 => self.handle_ipv4(frame, iface),
            other => {
                log::warn!("[engine] dropping unknown ethertype {:#06x}", other);
            }
        }
    }

    fn iface_info(&mut self, iface: usize) -> io::Result<IfaceInfo> {
        if let Some(info) = self.iface_info.get(&iface) {
            return Ok(*info);
        }
        let info = IfaceInfo {
            ip: self.link.iface_ip(iface)?,
            mac: self.link.iface_mac(iface)?,
        };
        self.iface_info.insert(iface, info);
        log::debug!(
            "[engine] cached iface {} ip={} mac={}",
            iface,
            info.ip,
            info.mac
        );
        Ok(info)
    }

    // ------------------------------------------------------------------
    // IPv4
    // ------------------------------------------------------------------

    fn handle_ipv4(&mut self, frame: &mut [u8], iface: usize) {
        if frame.len() < ETHER_HDR_LEN + IPV4_HDR_LEN {
            log::warn!("[engine] dropping short IPv4 frame ({} bytes)", frame.len());
            return;
        }
        let ip = match Ipv4Header::parse(&frame[ETHER_HDR_LEN..]) {
            Ok(ip) => ip,
            Err(err) => {
                log::warn!("[engine] dropping unparsable IPv4 header: {}", err);
                return;
            }
        };

        let own = match self.iface_info(iface) {
            Ok(own) => own,
            Err(err) => {
                log::error!("[engine] interface {} info unavailable: {}", iface, err);
                return;
            }
        };
        let for_us = ip.dst == own.ip;

        if ip.ttl <= 1 && !for_us {
            log::debug!("[engine] TTL expired for {}", ip.dst);
            self.send_icmp_error(frame, iface, ICMP_TIME_EXCEEDED, ICMP_CODE_TTL_EXCEEDED);
            return;
        }

        if !Ipv4Header::checksum_valid(&frame[ETHER_HDR_LEN..]) {
            log::warn!("[engine] dropping frame with bad IPv4 checksum from {}", ip.src);
            return;
        }

        if for_us {
            self.handle_local_ipv4(frame, iface, ip);
            return;
        }

        // Decrement the TTL and rewrite the checksum in place.
        let mut forwarded = ip;
        forwarded.ttl -= 1;
        if let Err(err) = forwarded.write(&mut frame[ETHER_HDR_LEN..]) {
            log::error!("[engine] IPv4 rewrite failed: {}", err);
            return;
        }

        self.forward_ipv4(frame, iface, forwarded.dst);
    }

    fn forward_ipv4(&mut self, frame: &mut [u8], iface: usize, dest: Ipv4Addr) {
        let Some(route) = self.rtable.lookup(dest) else {
            log::debug!("[engine] no route to {}", dest);
            self.send_icmp_error(frame, iface, ICMP_DEST_UNREACH, ICMP_CODE_NET_UNREACH);
            return;
        };
        let (next_hop, out_iface) = (route.next_hop, route.iface);
        log::debug!(
            "[engine] forwarding {} via {} on iface {}",
            dest,
            next_hop,
            out_iface
        );
        self.send_via(frame, out_iface, next_hop, ETHERTYPE_IPV4);
    }

    fn handle_local_ipv4(&mut self, frame: &mut [u8], iface: usize, ip: Ipv4Header) {
        if ip.proto != IP_PROTO_ICMP {
            log::warn!("[engine] dropping local packet with protocol {}", ip.proto);
            return;
        }
        if frame.len() < ETHER_HDR_LEN + IPV4_HDR_LEN + ICMP_HDR_LEN {
            log::warn!("[engine] dropping short ICMP frame");
            return;
        }

        let icmp = match IcmpHeader::parse(&frame[ETHER_HDR_LEN + IPV4_HDR_LEN..]) {
            Ok(icmp) => icmp,
            Err(err) => {
                log::warn!("[engine] dropping unparsable ICMP header: {}", err);
                return;
            }
        };
        if icmp.icmp_type != ICMP_ECHO_REQUEST {
            log::warn!("[engine] dropping unsupported ICMP type {}", icmp.icmp_type);
            return;
        }

        // Echo reply: swap the addresses, refresh the TTL, flip the type.
        let reply_ip = Ipv4Header {
            src: ip.dst,
            dst: ip.src,
            ttl: IP_DEFAULT_TTL,
            ..ip
        };
        if let Err(err) = reply_ip.write(&mut frame[ETHER_HDR_LEN..]) {
            log::error!("[engine] echo reply rewrite failed: {}", err);
            return;
        }

        let reply_icmp = IcmpHeader {
            icmp_type: ICMP_ECHO_REPLY,
            code: 0,
            ..icmp
        };
        if let Err(err) = reply_icmp.write(&mut frame[ETHER_HDR_LEN + IPV4_HDR_LEN..]) {
            log::error!("[engine] echo reply rewrite failed: {}", err);
            return;
        }
        IcmpHeader::finalize_checksum(&mut frame[ETHER_HDR_LEN + IPV4_HDR_LEN..]);

        self.send_via(frame, iface, reply_ip.dst, ETHERTYPE_IPV4);
    }

    // ------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------

    /// Rewrite the link-layer header and transmit, or park the frame behind
    /// an ARP request when the next hop is unresolved.
    fn send_via(&mut self, frame: &mut [u8], iface: usize, dest_ip: Ipv4Addr, ethertype: u16) {
        let own = match self.iface_info(iface) {
            Ok(own) => own,
            Err(err) => {
                log::error!("[engine] interface {} info unavailable: {}", iface, err);
                return;
            }
        };

        let Some(dest_mac) = self.arp.lookup(dest_ip) else {
            log::debug!("[engine] ARP miss for {}, queueing frame", dest_ip);
            self.send_arp_request(dest_ip, iface);
            self.arp.enqueue_pending(
                dest_ip,
                PendingFrame {
                    iface,
                    frame: frame.to_vec(),
                },
            );
            return;
        };

        let eth = EthernetHeader {
            dst: dest_mac,
            src: own.mac,
            ethertype,
        };
        if let Err(err) = eth.write(frame) {
            log::error!("[engine] link header rewrite failed: {}", err);
            return;
        }
        if let Err(err) = self.link.send_frame(iface, frame) {
            log::error!("[engine] send on iface {} failed: {}", iface, err);
        }
    }

    // ------------------------------------------------------------------
    // ARP
    // ------------------------------------------------------------------

    fn handle_arp(&mut self, frame: &[u8], iface: usize) {
        if frame.len() < ETHER_HDR_LEN + ARP_PACKET_LEN {
            log::warn!("[engine] dropping short ARP frame ({} bytes)", frame.len());
            return;
        }
        let arp = match ArpPacket::parse(&frame[ETHER_HDR_LEN..]) {
            Ok(arp) => arp,
            Err(err) => {
                log::warn!("[engine] dropping unparsable ARP packet: {}", err);
                return;
            }
        };

        match arp.opcode {
            ARP_OP_REQUEST => {
                let own = match self.iface_info(iface) {
                    Ok(own) => own,
                    Err(err) => {
                        log::error!("[engine] interface {} info unavailable: {}", iface, err);
                        return;
                    }
                };
                if arp.target_ip != own.ip {
                    log::debug!("[engine] ARP request for {} is not ours", arp.target_ip);
                    return;
                }
                self.send_arp_reply(arp.sender_ip, iface, arp.sender_mac);
            }
            ARP_OP_REPLY => {
                self.arp.insert(arp.sender_ip, arp.sender_mac);
                log::debug!("[engine] learned {} -> {}", arp.sender_ip, arp.sender_mac);

                let Some(pending) = self.arp.drain_pending(arp.sender_ip) else {
                    return;
                };
                for mut parked in pending {
                    self.send_via(
                        &mut parked.frame,
                        parked.iface,
                        arp.sender_ip,
                        ETHERTYPE_IPV4,
                    );
                }
            }
            other => {
                log::warn!("[engine] dropping ARP packet with opcode {}", other);
            }
        }
    }

    fn send_arp_request(&mut self, dest_ip: Ipv4Addr, iface: usize) {
        let own = match self.iface_info(iface) {
            Ok(own) => own,
            Err(err) => {
                log::error!("[engine] interface {} info unavailable: {}", iface, err);
                return;
            }
        };

        let mut frame = [0u8; ETHER_HDR_LEN + ARP_PACKET_LEN];
        let eth = EthernetHeader {
            dst: MacAddr::BROADCAST,
            src: own.mac,
            ethertype: ETHERTYPE_ARP,
        };
        let arp = ArpPacket {
            opcode: ARP_OP_REQUEST,
            sender_mac: own.mac,
            sender_ip: own.ip,
            target_mac: MacAddr::ZERO,
            target_ip: dest_ip,
        };
        // The buffer is sized exactly for both writes.
        eth.write(&mut frame).expect("ethernet header fits");
        arp.write(&mut frame[ETHER_HDR_LEN..]).expect("arp packet fits");

        log::debug!("[engine] ARP request for {} on iface {}", dest_ip, iface);
        if let Err(err) = self.link.send_frame(iface, &frame) {
            log::error!("[engine] ARP request send failed: {}", err);
        }
    }

    fn send_arp_reply(&mut self, dest_ip: Ipv4Addr, iface: usize, dest_mac: MacAddr) {
        let own = match self.iface_info(iface) {
            Ok(own) => own,
            Err(err) => {
                log::error!("[engine] interface {} info unavailable: {}", iface, err);
                return;
            }
        };

        let mut frame = [0u8; ETHER_HDR_LEN + ARP_PACKET_LEN];
        let eth = EthernetHeader {
            dst: dest_mac,
            src: own.mac,
            ethertype: ETHERTYPE_ARP,
        };
        let arp = ArpPacket {
            opcode: ARP_OP_REPLY,
            sender_mac: own.mac,
            sender_ip: own.ip,
            target_mac: dest_mac,
            target_ip: dest_ip,
        };
        eth.write(&mut frame).expect("ethernet header fits");
        arp.write(&mut frame[ETHER_HDR_LEN..]).expect("arp packet fits");

        log::debug!("[engine] ARP reply to {} on iface {}", dest_ip, iface);
        if let Err(err) = self.link.send_frame(iface, &frame) {
            log::error!("[engine] ARP reply send failed: {}", err);
        }
    }

    // ------------------------------------------------------------------
    // ICMP errors
    // ------------------------------------------------------------------

    /// Build and send an ICMP error quoting the offending packet's IPv4
    /// header plus the first 8 payload bytes.
    fn send_icmp_error(&mut self, frame: &[u8], iface: usize, icmp_type: u8, code: u8) {
        let own = match self.iface_info(iface) {
            Ok(own) => own,
            Err(err) => {
                log::error!("[engine] interface {} info unavailable: {}", iface, err);
                return;
            }
        };
        let orig_ip = match Ipv4Header::parse(&frame[ETHER_HDR_LEN..]) {
            Ok(orig_ip) => orig_ip,
            Err(err) => {
                log::warn!("[engine] cannot quote unparsable packet: {}", err);
                return;
            }
        };

        let mut out = [0u8; ICMP_ERROR_FRAME_LEN];

        let outer_ip = Ipv4Header {
            tos: 0,
            total_len: (ICMP_ERROR_FRAME_LEN - ETHER_HDR_LEN) as u16,
            ident: 0,
            flags_frag: 0,
            ttl: IP_DEFAULT_TTL,
            proto: IP_PROTO_ICMP,
            checksum: 0,
            src: own.ip,
            dst: orig_ip.src,
        };
        outer_ip
            .write(&mut out[ETHER_HDR_LEN..])
            .expect("outer header fits");

        let icmp = IcmpHeader {
            icmp_type,
            code,
            checksum: 0,
            rest: [0; 4],
        };
        icmp.write(&mut out[ETHER_HDR_LEN + IPV4_HDR_LEN..])
            .expect("icmp header fits");

        // Quote as much of the original header + 8 bytes as was received.
        let quote_start = ETHER_HDR_LEN + IPV4_HDR_LEN + ICMP_HDR_LEN;
        let available = frame.len().saturating_sub(ETHER_HDR_LEN);
        let quoted = available.min(IPV4_HDR_LEN + 8);
        out[quote_start..quote_start + quoted]
            .copy_from_slice(&frame[ETHER_HDR_LEN..ETHER_HDR_LEN + quoted]);

        IcmpHeader::finalize_checksum(&mut out[ETHER_HDR_LEN + IPV4_HDR_LEN..]);

        log::debug!(
            "[engine] ICMP error type={} code={} to {}",
            icmp_type,
            code,
            orig_ip.src
        );
        self.send_via(&mut out, iface, orig_ip.src, ETHERTYPE_IPV4);
    }
}
