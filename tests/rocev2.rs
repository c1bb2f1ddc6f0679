// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests over captured RoCEv2 traffic: Ethernet / IPv4 / UDP
//! frames carrying an Infiniband BTH on UDP port 4791.

use std::sync::Once;

use pdus::layers::bth::{Bth, BthOpcode};
use pdus::layers::dispatch::{register_allocator, Selector};
use pdus::layers::ip::Ipv4;
use pdus::layers::l2::Ether;
use pdus::layers::udp::Udp;
use pdus::layers::{Pdu, Raw};
use pdus::{Layer, PduKind, U24};

static INIT: Once = Once::new();

fn register_rocev2() {
    INIT.call_once(|| {
        // A UDP datagram to port 4791 carries an Infiniband BTH.
        register_allocator(PduKind::Udp, Selector::dst_port(4791), |bytes| {
            Bth::from_bytes(bytes).map(Pdu::from)
        });
    });
}

/// 151 bytes: RC_SEND_ONLY with a 64-byte payload and 29 bytes of
/// link-layer padding after the IPv4 total length.
const SEND_ONLY_PACKET: [u8; 151] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0xdd, 0x12, 0x34, 0x56, 0x78, 0xab, 0xcd, 0x08, 0x00, 0x45,
    0xf9, 0x00, 0x6c, 0xf7, 0xe7, 0x00, 0x00, 0x71, 0x11, 0x6a, 0xd9, 0x82, 0x72, 0x63, 0x53,
    0x00, 0x00, 0x00, 0x02, 0xcb, 0xa9, 0x12, 0xb7, 0x00, 0x58, 0x22, 0x58, 0x04, 0x00, 0xff,
    0xff, 0x8d, 0x00, 0x00, 0x41, 0xe2, 0x00, 0x00, 0x02, 0xb0, 0xce, 0x95, 0xc0, 0x65, 0x87,
    0xef, 0xcd, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x32, 0x54, 0x76, 0x98,
    0xba, 0xdc, 0xfe, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x13, 0x57, 0x9b, 0xdf,
    0x02, 0x46, 0x8a, 0xce, 0xfe, 0xdc, 0xba, 0x98, 0x76, 0x54, 0x32, 0x10, 0xec, 0xa8, 0x64,
    0x20, 0xfd, 0xb9, 0x75, 0x31, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x00, 0x00,
    0x00, 0x00, 0x58, 0x6c, 0x1e, 0x3f, 0x57, 0x3d, 0x53, 0xb9, 0x63, 0x97, 0x8c, 0x53, 0xd3,
    0x99, 0x1e, 0xf1, 0xfd, 0xa7, 0x08, 0x8f, 0x09, 0x26, 0x8f, 0x60, 0x65, 0x64, 0xec, 0xf7,
    0xb7,
];

/// 62 bytes: RC_ACKNOWLEDGE with an AETH and no payload.
const ACKNOWLEDGE_PACKET: [u8; 62] = [
    0xf4, 0x9b, 0xc1, 0xdc, 0x4b, 0x74, 0x00, 0x00, 0x00, 0x00, 0x00, 0xdd, 0x08, 0x00, 0x45,
    0x1c, 0x00, 0x30, 0x00, 0x00, 0x40, 0x00, 0xff, 0x11, 0x95, 0xd9, 0x00, 0x00, 0x00, 0x02,
    0x82, 0x72, 0x63, 0x53, 0x70, 0x50, 0x12, 0xb7, 0x00, 0x1c, 0x00, 0x00, 0x11, 0x00, 0xff,
    0xff, 0x00, 0xca, 0x18, 0x39, 0x00, 0x00, 0x00, 0x02, 0x00, 0xa9, 0xd0, 0xbd, 0x00, 0x00,
    0x00, 0x00,
];

/// 126 bytes: RC_SEND_ONLY whose UDP length field disagrees with the
/// IPv4 total length (a generator quirk kept as-is).
const SEND_ONLY_SHORT_LENGTH_PACKET: [u8; 126] = [
    0xf4, 0x9b, 0xc1, 0xdc, 0x4b, 0x74, 0x00, 0x00, 0x00, 0x00, 0x00, 0xdd, 0x08, 0x00, 0x45,
    0x1c, 0x00, 0x6c, 0x00, 0x00, 0x40, 0x00, 0xff, 0x11, 0x95, 0x9d, 0x00, 0x00, 0x00, 0x02,
    0x82, 0x72, 0x63, 0x53, 0x70, 0x50, 0x12, 0xb7, 0x00, 0x1c, 0x00, 0x00, 0x04, 0x00, 0xff,
    0xff, 0x00, 0xca, 0x18, 0x39, 0x80, 0x00, 0x00, 0x3e, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05,
    0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10, 0x11, 0x12, 0x13, 0x14,
    0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f, 0x20, 0x21, 0x22, 0x23,
    0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2d, 0x2e, 0x2f, 0x30, 0x31, 0x32,
    0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x3b, 0x3c, 0x3d, 0x3e, 0x3f, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// 81 bytes: RC_ACKNOWLEDGE with syndrome 0x1b and 19 bytes of padding.
const ACKNOWLEDGE_SYNDROME_PACKET: [u8; 81] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0xdd, 0x12, 0x34, 0x56, 0x78, 0xab, 0xcd, 0x08, 0x00, 0x45,
    0x4b, 0x00, 0x30, 0xf7, 0xe7, 0x00, 0x00, 0x10, 0x11, 0xcc, 0xc3, 0x82, 0x72, 0x63, 0x53,
    0x00, 0x00, 0x00, 0x02, 0xcb, 0xa9, 0x12, 0xb7, 0x00, 0x1c, 0x3a, 0x0d, 0x11, 0x00, 0xff,
    0xff, 0x8d, 0x00, 0x00, 0x41, 0x48, 0x00, 0x00, 0x3e, 0x1b, 0x00, 0x00, 0x01, 0x00, 0x00,
    0x00, 0x00, 0xa4, 0xc3, 0x2b, 0x49, 0x14, 0x60, 0xc5, 0x16, 0x36, 0x17, 0xbe, 0xb8, 0x63,
    0xde, 0xe7, 0x0d, 0x9a, 0xe0, 0xd3,
];

#[test]
fn parse_send_only_packet() {
    register_rocev2();
    let ether = Ether::from_bytes(&SEND_ONLY_PACKET).unwrap();

    assert_eq!(ether.dst_mac(), [0x00, 0x00, 0x00, 0x00, 0x00, 0xdd]);
    assert_eq!(ether.src_mac(), [0x12, 0x34, 0x56, 0x78, 0xab, 0xcd]);
    assert_eq!(ether.eth_type(), 0x0800);
    assert_eq!(ether.trailer().len(), 29);

    let packet = Pdu::from(ether);
    let ip = packet.find(PduKind::Ipv4).unwrap().as_ipv4().unwrap();
    assert_eq!(ip.tos(), 0xf9);
    assert_eq!(ip.identifier(), 0xf7e7);
    assert!(!ip.flags().df());
    assert_eq!(ip.frag_offset(), 0);
    assert_eq!(ip.ttl(), 0x71);
    assert_eq!(ip.protocol(), 0x11);
    assert_eq!(ip.chksum(), 0x6ad9);
    assert_eq!(ip.saddr(), 0x82726353);
    assert_eq!(ip.daddr(), 0x00000002);

    let udp = packet.find(PduKind::Udp).unwrap().as_udp().unwrap();
    assert_eq!(udp.sport(), 0xcba9);
    assert_eq!(udp.dport(), 0x12b7);
    assert_eq!(udp.length(), 0x58);
    assert_eq!(udp.chksum(), Some(0x2258));

    let bth = packet.find(PduKind::Bth).unwrap().as_bth().unwrap();
    assert!(!bth.is_malformed());
    assert_eq!(bth.opcode(), BthOpcode::RcSendOnly as u8);
    assert!(!bth.se());
    assert!(!bth.m());
    assert_eq!(bth.padcnt(), 0);
    assert_eq!(bth.tver(), 0);
    assert_eq!(bth.p_key(), 0xffff);
    assert_eq!(bth.destqp(), 0x000041);
    assert!(bth.a());
    assert_eq!(bth.psn(), 0x000002);
    assert_eq!(bth.icrc(), 0);
    assert!(!bth.has_aeth());

    let payload = bth.inner_pdu().unwrap();
    assert_eq!(payload.kind(), PduKind::Raw);
    assert_eq!(payload.size(), 64);
    assert_eq!(payload.as_raw().unwrap().data(), &SEND_ONLY_PACKET[54..54 + 64]);

    // Checksums recompute to the captured values, the UDP checksum and
    // the link padding are preserved, so the frame round-trips exactly.
    assert_eq!(packet.serialize(), SEND_ONLY_PACKET.to_vec());
}

#[test]
fn parse_acknowledge_packet() {
    register_rocev2();
    let packet = Pdu::from(Ether::from_bytes(&ACKNOWLEDGE_PACKET).unwrap());

    let ip = packet.find(PduKind::Ipv4).unwrap().as_ipv4().unwrap();
    assert_eq!(ip.tos(), 0x1c);
    assert!(ip.flags().df());
    assert_eq!(ip.ttl(), 0xff);
    assert_eq!(ip.chksum(), 0x95d9);
    assert_eq!(ip.saddr(), 0x00000002);
    assert_eq!(ip.daddr(), 0x82726353);

    let udp = packet.find(PduKind::Udp).unwrap().as_udp().unwrap();
    assert_eq!(udp.sport(), 0x7050);
    assert_eq!(udp.dport(), 0x12b7);
    assert_eq!(udp.length(), 0x1c);
    assert_eq!(udp.chksum(), Some(0));

    let bth = packet.find(PduKind::Bth).unwrap().as_bth().unwrap();
    assert!(!bth.is_malformed());
    assert_eq!(bth.opcode(), BthOpcode::RcAcknowledge as u8);
    assert_eq!(bth.p_key(), 0xffff);
    assert_eq!(bth.destqp(), 0xca1839);
    assert!(!bth.a());
    assert_eq!(bth.psn(), 0x000002);
    assert_eq!(bth.syndrome().unwrap(), 0);
    assert_eq!(bth.msn().unwrap(), 0xa9d0bd);
    assert_eq!(bth.icrc(), 0);
    assert!(bth.inner_pdu().is_none());

    assert_eq!(packet.serialize(), ACKNOWLEDGE_PACKET.to_vec());
}

#[test]
fn parse_send_only_with_short_length_field() {
    register_rocev2();
    let packet = Pdu::from(Ether::from_bytes(&SEND_ONLY_SHORT_LENGTH_PACKET).unwrap());

    // The UDP length field claims 28 bytes, but the payload extent is
    // fixed by the enclosing IPv4 total length.
    let udp = packet.find(PduKind::Udp).unwrap().as_udp().unwrap();
    assert_eq!(udp.sport(), 0x7050);
    assert_eq!(udp.dport(), 0x12b7);
    assert_eq!(udp.chksum(), Some(0));

    let bth = packet.find(PduKind::Bth).unwrap().as_bth().unwrap();
    assert!(!bth.is_malformed());
    assert_eq!(bth.opcode(), BthOpcode::RcSendOnly as u8);
    assert_eq!(bth.destqp(), 0xca1839);
    assert!(bth.a());
    assert_eq!(bth.psn(), 0x00003e);

    let payload = bth.inner_pdu().unwrap();
    assert_eq!(payload.size(), 64);
    assert_eq!(
        payload.as_raw().unwrap().data(),
        &SEND_ONLY_SHORT_LENGTH_PACKET[54..54 + 64]
    );
}

#[test]
fn parse_acknowledge_with_syndrome() {
    register_rocev2();
    let packet = Pdu::from(Ether::from_bytes(&ACKNOWLEDGE_SYNDROME_PACKET).unwrap());

    let ip = packet.find(PduKind::Ipv4).unwrap().as_ipv4().unwrap();
    assert_eq!(ip.tos(), 0x4b);
    assert_eq!(ip.ttl(), 0x10);
    assert_eq!(ip.chksum(), 0xccc3);

    let udp = packet.find(PduKind::Udp).unwrap().as_udp().unwrap();
    assert_eq!(udp.chksum(), Some(0x3a0d));

    let bth = packet.find(PduKind::Bth).unwrap().as_bth().unwrap();
    assert_eq!(bth.opcode(), BthOpcode::RcAcknowledge as u8);
    assert_eq!(bth.destqp(), 0x000041);
    assert!(!bth.a());
    assert_eq!(bth.psn(), 0x00003e);
    assert_eq!(bth.syndrome().unwrap(), 0x1b);
    assert_eq!(bth.msn().unwrap(), 0x000001);
    assert!(bth.inner_pdu().is_none());

    // 19 bytes of link padding follow the 48-byte IPv4 total length.
    let ether = packet.as_ether().unwrap();
    assert_eq!(ether.trailer().len(), 19);

    assert_eq!(packet.serialize(), ACKNOWLEDGE_SYNDROME_PACKET.to_vec());
}

#[test]
fn crafted_packet_reparses_to_same_fields() {
    register_rocev2();

    let mut ether = Ether::new();
    ether.set_dst_mac([0x58, 0x4a, 0xdf, 0x60, 0x32, 0xc5]);
    ether.set_src_mac([0x8b, 0x44, 0xd7, 0x3f, 0x10, 0xc7]);

    let mut ip = Ipv4::new();
    ip.set_tos(0x5f);
    ip.set_identifier(0xb119);
    ip.set_ttl(0x27);
    ip.set_saddr(0x320bad1d);
    ip.set_daddr(0x9390e801);

    let mut udp = Udp::new();
    udp.set_sport(0xfbaf);
    udp.set_dport(4791);

    let mut bth = Bth::new();
    bth.set_p_key(0x7590);
    bth.set_destqp(U24::new(0xa4107c).unwrap());
    bth.set_a(true);
    bth.set_psn(U24::new(0x2a0872).unwrap());

    let payload: Vec<u8> = (0u8..64).collect();
    let packet = ether / ip / udp / bth / Raw::new(payload.clone());
    let bytes = packet.serialize();
    assert_eq!(bytes.len(), 14 + 20 + 8 + 12 + 64 + 4);

    let reparsed = Pdu::from(Ether::from_bytes(&bytes).unwrap());
    let bth = reparsed.find(PduKind::Bth).unwrap().as_bth().unwrap();
    assert_eq!(bth.opcode(), BthOpcode::RcSendOnly as u8);
    assert_eq!(bth.p_key(), 0x7590);
    assert_eq!(bth.destqp(), 0xa4107c);
    assert!(bth.a());
    assert_eq!(bth.psn(), 0x2a0872);
    assert_eq!(bth.inner_pdu().unwrap().as_raw().unwrap().data(), &payload[..]);

    // The crafted and reparsed chains serialize identically.
    assert_eq!(reparsed.serialize(), bytes);
}

#[test]
fn request_matches_reversed_response() {
    register_rocev2();

    let mut ip = Ipv4::new();
    ip.set_saddr(0x82726353);
    ip.set_daddr(0x00000002);
    let mut udp = Udp::new();
    udp.set_sport(0xcba9);
    udp.set_dport(0x1234);
    let request = ip / udp / Raw::new(vec![0xaa; 4]);

    let mut rip = Ipv4::new();
    rip.set_saddr(0x00000002);
    rip.set_daddr(0x82726353);
    let mut rudp = Udp::new();
    rudp.set_sport(0x1234);
    rudp.set_dport(0xcba9);
    let response = (rip / rudp / Raw::new(vec![0xbb; 4])).serialize();

    assert!(request.matches_response(&response));

    // A response that did not swap the ports does not match.
    let unswapped = request.serialize();
    assert!(!request.matches_response(&unswapped));
}
