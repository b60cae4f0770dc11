// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Forwarding scenarios over the in-memory link driver.

use courier_dataplane::link::MockLink;
use courier_dataplane::packet::{
    ArpPacket, EthernetHeader, Ipv4Header, MacAddr, ARP_OP_REPLY, ARP_OP_REQUEST, ARP_PACKET_LEN,
    ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHER_HDR_LEN, IPV4_HDR_LEN,
};
use courier_dataplane::rtable::RouteEntry;
use courier_dataplane::{Router, RoutingTable};
use std::net::Ipv4Addr;

const HOST_MAC: MacAddr = MacAddr::new([0xAA, 0, 0, 0, 0, 1]);
const NEXT_HOP_MAC: MacAddr = MacAddr::new([0xBB, 0, 0, 0, 0, 2]);

fn ip(addr: &str) -> Ipv4Addr {
    addr.parse().expect("address should parse")
}

fn router_with_nested_routes() -> Router<MockLink> {
    let link = MockLink::new(vec![
        (ip("10.0.0.254"), MacAddr::new([2, 2, 2, 2, 2, 0])),
        (ip("10.1.0.254"), MacAddr::new([2, 2, 2, 2, 2, 1])),
        (ip("10.1.2.254"), MacAddr::new([2, 2, 2, 2, 2, 2])),
    ]);
    let mut rtable = RoutingTable::new();
    rtable
        .add_entries([
            RouteEntry {
                prefix: ip("10.0.0.0"),
                mask: ip("255.0.0.0"),
                next_hop: ip("10.0.0.1"),
                iface: 0,
            },
            RouteEntry {
                prefix: ip("10.1.0.0"),
                mask: ip("255.255.0.0"),
                next_hop: ip("10.1.0.1"),
                iface: 1,
            },
            RouteEntry {
                prefix: ip("10.1.2.0"),
                mask: ip("255.255.255.0"),
                next_hop: ip("10.1.2.1"),
                iface: 2,
            },
        ])
        .expect("routes should insert");
    Router::new(link, rtable)
}

fn ipv4_frame(dst: Ipv4Addr) -> Vec<u8> {
    let payload = b"sixteen payload!";
    let mut frame = vec![0u8; ETHER_HDR_LEN + IPV4_HDR_LEN + payload.len()];
    EthernetHeader {
        dst: MacAddr::new([2, 2, 2, 2, 2, 0]),
        src: HOST_MAC,
        ethertype: ETHERTYPE_IPV4,
    }
    .write(&mut frame)
    .expect("ethernet header fits");
    Ipv4Header {
        tos: 0,
        total_len: (IPV4_HDR_LEN + payload.len()) as u16,
        ident: 1,
        flags_frag: 0,
        ttl: 32,
        proto: 0x11,
        checksum: 0,
        src: ip("172.16.0.5"),
        dst,
    }
    .write(&mut frame[ETHER_HDR_LEN..])
    .expect("ip header fits");
    frame[ETHER_HDR_LEN + IPV4_HDR_LEN..].copy_from_slice(payload);
    frame
}

fn arp_reply(sender_ip: Ipv4Addr, sender_mac: MacAddr, target_ip: Ipv4Addr) -> Vec<u8> {
    let mut frame = vec![0u8; ETHER_HDR_LEN + ARP_PACKET_LEN];
    EthernetHeader {
        dst: MacAddr::new([2, 2, 2, 2, 2, 1]),
        src: sender_mac,
        ethertype: ETHERTYPE_ARP,
    }
    .write(&mut frame)
    .expect("ethernet header fits");
    ArpPacket {
        opcode: ARP_OP_REPLY,
        sender_mac,
        sender_ip,
        target_mac: MacAddr::new([2, 2, 2, 2, 2, 1]),
        target_ip,
    }
    .write(&mut frame[ETHER_HDR_LEN..])
    .expect("arp packet fits");
    frame
}

#[test]
fn test_longest_prefix_selects_most_specific_interface() {
    let mut router = router_with_nested_routes();
    // Every next hop resolves so frames go straight out.
    router.seed_arp([
        (ip("10.0.0.1"), NEXT_HOP_MAC),
        (ip("10.1.0.1"), NEXT_HOP_MAC),
        (ip("10.1.2.1"), NEXT_HOP_MAC),
    ]);

    let cases = [("10.1.2.7", 2usize), ("10.1.3.5", 1), ("10.2.0.1", 0)];
    for (dest, expected_iface) in cases {
        let mut frame = ipv4_frame(ip(dest));
        router.handle_frame(&mut frame, 0);
        let sent = router.link_mut().take_sent();
        assert_eq!(sent.len(), 1, "destination {}", dest);
        assert_eq!(sent[0].0, expected_iface, "destination {}", dest);
    }
}

#[test]
fn test_arp_miss_queues_frames_until_reply() {
    let mut router = router_with_nested_routes();

    // Two frames toward the same unresolved next hop 10.1.0.1.
    let mut first = ipv4_frame(ip("10.1.3.5"));
    let mut second = ipv4_frame(ip("10.1.4.6"));
    router.handle_frame(&mut first, 0);
    router.handle_frame(&mut second, 0);

    // Only ARP requests went out so far, one per enqueued frame.
    let sent = router.link_mut().take_sent();
    assert_eq!(sent.len(), 2);
    for (iface, frame) in &sent {
        assert_eq!(*iface, 1);
        let eth = EthernetHeader::parse(frame).expect("ethernet should parse");
        assert_eq!(eth.ethertype, ETHERTYPE_ARP);
        assert_eq!(eth.dst, MacAddr::BROADCAST);
        let arp = ArpPacket::parse(&frame[ETHER_HDR_LEN..]).expect("arp should parse");
        assert_eq!(arp.opcode, ARP_OP_REQUEST);
        assert_eq!(arp.target_ip, ip("10.1.0.1"));
    }

    // The reply releases both frames, in arrival order, headers rewritten.
    let mut reply = arp_reply(ip("10.1.0.1"), NEXT_HOP_MAC, ip("10.1.0.254"));
    router.handle_frame(&mut reply, 1);

    let sent = router.link_mut().take_sent();
    assert_eq!(sent.len(), 2);

    let dests: Vec<Ipv4Addr> = sent
        .iter()
        .map(|(_, frame)| {
            Ipv4Header::parse(&frame[ETHER_HDR_LEN..])
                .expect("ip should parse")
                .dst
        })
        .collect();
    assert_eq!(dests, vec![ip("10.1.3.5"), ip("10.1.4.6")]);

    for (iface, frame) in &sent {
        assert_eq!(*iface, 1);
        let eth = EthernetHeader::parse(frame).expect("ethernet should parse");
        assert_eq!(eth.dst, NEXT_HOP_MAC);
        assert_eq!(eth.ethertype, ETHERTYPE_IPV4);
        // TTL was decremented before the frame was parked.
        let header = Ipv4Header::parse(&frame[ETHER_HDR_LEN..]).expect("ip should parse");
        assert_eq!(header.ttl, 31);
        assert!(Ipv4Header::checksum_valid(&frame[ETHER_HDR_LEN..]));
    }
}

#[test]
fn test_unroutable_destination_never_transmits_payload() {
    let mut router = router_with_nested_routes();
    router.seed_arp([(ip("172.16.0.5"), HOST_MAC)]);

    let mut frame = ipv4_frame(ip("11.0.0.1"));
    router.handle_frame(&mut frame, 0);

    // One ICMP error toward the source, nothing on the payload path.
    let sent = router.link_mut().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 0);
    let header = Ipv4Header::parse(&sent[0].1[ETHER_HDR_LEN..]).expect("ip should parse");
    assert_eq!(header.dst, ip("172.16.0.5"));
}
