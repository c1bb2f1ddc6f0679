// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Internet Protocol layers (IPv4 and IPv6).
//!
//! Besides carrying their own headers, these layers supply the
//! pseudo-header fields that the transport layers fold into their
//! checksums at serialization time.

use crate::error::{OutOfRangeError, ValidationError};
use crate::layers::dispatch::{self, Selector};
use crate::layers::tcp::Tcp;
use crate::layers::traits::*;
use crate::layers::udp::Udp;
use crate::layers::{Pdu, Raw};
use crate::stream::{InputStream, OutputStream};
use crate::utils;

pub const DATA_PROTO_TCP: u8 = 6;
pub const DATA_PROTO_UDP: u8 = 17;

const V4_NAME: &str = "IPv4";
const V6_NAME: &str = "IPv6";

/// The three flag bits of an IPv4 header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Ipv4Flags {
    data: u8,
}

const RESERVED_BIT: u8 = 0b100;
const DF_BIT: u8 = 0b010;
const MF_BIT: u8 = 0b001;

impl Ipv4Flags {
    #[inline]
    pub fn new() -> Self {
        Ipv4Flags::default()
    }

    #[inline]
    pub fn reserved(&self) -> bool {
        self.data & RESERVED_BIT > 0
    }

    #[inline]
    pub fn df(&self) -> bool {
        self.data & DF_BIT > 0
    }

    #[inline]
    pub fn set_df(&mut self, df: bool) {
        if df {
            self.data |= DF_BIT;
        } else {
            self.data &= !DF_BIT;
        }
    }

    #[inline]
    pub fn mf(&self) -> bool {
        self.data & MF_BIT > 0
    }

    #[inline]
    pub fn set_mf(&mut self, mf: bool) {
        if mf {
            self.data |= MF_BIT;
        } else {
            self.data &= !MF_BIT;
        }
    }
}

impl From<u8> for Ipv4Flags {
    #[inline]
    fn from(value: u8) -> Self {
        Ipv4Flags { data: value & 0b111 }
    }
}

/// An IPv4 packet.
///
/// The version, header length, total length and protocol fields are
/// derived from the packet's composition at serialization time, and the
/// header checksum is recomputed then as well.
#[derive(Clone, Debug)]
pub struct Ipv4 {
    tos: u8,
    id: u16,
    flags: Ipv4Flags,
    frag_offset: u16,
    ttl: u8,
    protocol: u8,
    chksum: u16,
    saddr: u32,
    daddr: u32,
    options: Vec<u8>,
    malformed: bool,
    inner: Option<Box<Pdu>>,
}

impl Default for Ipv4 {
    fn default() -> Self {
        Ipv4 {
            tos: 0,
            id: 0,
            flags: Ipv4Flags::default(),
            frag_offset: 0,
            ttl: 64,
            protocol: 0,
            chksum: 0,
            saddr: 0,
            daddr: 0,
            options: Vec::new(),
            malformed: false,
            inner: None,
        }
    }
}

impl Ipv4 {
    #[inline]
    pub fn new() -> Self {
        Ipv4::default()
    }

    /// Probes the first bytes of a packet without building it.
    pub fn extract_metadata(bytes: &[u8]) -> Result<Metadata, ValidationError> {
        let mut stream = InputStream::new(V4_NAME, bytes);
        let ver_ihl = stream.read_u8("packet too short for an IPv4 header")?;
        stream.skip(8, "packet too short for an IPv4 header")?;
        let protocol = stream.read_u8("packet too short for an IPv4 header")?;
        stream.skip(10, "packet too short for an IPv4 header")?;
        Ok(Metadata {
            header_size: usize::from(ver_ihl & 0x0F) * 4,
            kind: PduKind::Ipv4,
            next_kind: match protocol {
                DATA_PROTO_TCP => Some(PduKind::Tcp),
                DATA_PROTO_UDP => Some(PduKind::Udp),
                _ => None,
            },
        })
    }

    /// Builds a packet and its encapsulated layers from `bytes`.
    ///
    /// At most `total_length` bytes are consumed; anything past that is
    /// left for the enclosing layer (typically Ethernet padding). Defects
    /// past the fixed header set the malformed flag instead of failing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut stream = InputStream::new(V4_NAME, bytes);
        let short = "packet too short for an IPv4 header";
        let ver_ihl = stream.read_u8(short)?;
        let tos = stream.read_u8(short)?;
        let tot_len = stream.read_u16(short)?;
        let id = stream.read_u16(short)?;
        let flags_frag = stream.read_u16(short)?;
        let ttl = stream.read_u8(short)?;
        let protocol = stream.read_u8(short)?;
        let chksum = stream.read_u16(short)?;
        let saddr = stream.read_u32(short)?;
        let daddr = stream.read_u32(short)?;

        let mut ip = Ipv4 {
            tos,
            id,
            flags: Ipv4Flags::from((flags_frag >> 13) as u8),
            frag_offset: flags_frag & 0x1FFF,
            ttl,
            protocol,
            chksum,
            saddr,
            daddr,
            options: Vec::new(),
            malformed: false,
            inner: None,
        };

        let header_len = usize::from(ver_ihl & 0x0F) * 4;
        if ver_ihl >> 4 != 4 || header_len < 20 || header_len > bytes.len() {
            ip.malformed = true;
            return Ok(ip);
        }
        ip.options = bytes[20..header_len].to_vec();

        let tot_len = usize::from(tot_len);
        if tot_len < header_len {
            ip.malformed = true;
            return Ok(ip);
        }
        if tot_len > bytes.len() {
            ip.malformed = true;
        }
        let end = core::cmp::min(tot_len, bytes.len());

        let payload = &bytes[header_len..end];
        if !payload.is_empty() {
            let inner = match protocol {
                DATA_PROTO_TCP => Pdu::from(Tcp::from_bytes(payload)?),
                DATA_PROTO_UDP => Pdu::from(Udp::from_bytes(payload)?),
                _ => match dispatch::allocate(
                    PduKind::Ipv4,
                    Selector::ip_protocol(protocol),
                    payload,
                ) {
                    Some(inner) => inner?,
                    None => Pdu::from(Raw::from_bytes(payload)),
                },
            };
            ip.inner = Some(Box::new(inner));
        }

        Ok(ip)
    }

    #[inline]
    pub fn ihl(&self) -> u8 {
        ((20 + self.options.len()) / 4) as u8
    }

    #[inline]
    pub fn tos(&self) -> u8 {
        self.tos
    }

    #[inline]
    pub fn set_tos(&mut self, tos: u8) {
        self.tos = tos;
    }

    #[inline]
    pub fn identifier(&self) -> u16 {
        self.id
    }

    #[inline]
    pub fn set_identifier(&mut self, id: u16) {
        self.id = id;
    }

    #[inline]
    pub fn flags(&self) -> Ipv4Flags {
        self.flags
    }

    #[inline]
    pub fn set_flags(&mut self, flags: Ipv4Flags) {
        self.flags = flags;
    }

    #[inline]
    pub fn frag_offset(&self) -> u16 {
        self.frag_offset
    }

    pub fn set_frag_offset(&mut self, offset: u16) -> Result<(), OutOfRangeError> {
        if offset > 0x1FFF {
            return Err(OutOfRangeError {
                field: "fragment offset",
                max: 0x1FFF,
            });
        }
        self.frag_offset = offset;
        Ok(())
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    #[inline]
    pub fn set_ttl(&mut self, ttl: u8) {
        self.ttl = ttl;
    }

    /// The protocol number of the encapsulated data. When the inner PDU is
    /// of a known kind, serialization derives this field from it instead.
    #[inline]
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: u8) {
        self.protocol = protocol;
    }

    /// The checksum parsed from or assigned to the header. Serialization
    /// recomputes the on-wire checksum from the header contents.
    #[inline]
    pub fn chksum(&self) -> u16 {
        self.chksum
    }

    #[inline]
    pub fn set_chksum(&mut self, chksum: u16) {
        self.chksum = chksum;
    }

    #[inline]
    pub fn saddr(&self) -> u32 {
        self.saddr
    }

    #[inline]
    pub fn set_saddr(&mut self, saddr: u32) {
        self.saddr = saddr;
    }

    #[inline]
    pub fn daddr(&self) -> u32 {
        self.daddr
    }

    #[inline]
    pub fn set_daddr(&mut self, daddr: u32) {
        self.daddr = daddr;
    }

    #[inline]
    pub fn options(&self) -> &[u8] {
        &self.options
    }

    /// Replaces the option bytes, zero-padding them to a 32-bit boundary.
    pub fn set_options(&mut self, options: Vec<u8>) {
        self.options = options;
        let padded = (self.options.len() + 3) & !3;
        self.options.resize(padded, 0);
    }

    fn serialized_protocol(&self) -> u8 {
        match self.inner.as_deref().map(Pdu::kind) {
            Some(PduKind::Tcp) => DATA_PROTO_TCP,
            Some(PduKind::Udp) => DATA_PROTO_UDP,
            _ => self.protocol,
        }
    }
}

impl Layer for Ipv4 {
    #[inline]
    fn kind(&self) -> PduKind {
        PduKind::Ipv4
    }

    #[inline]
    fn header_size(&self) -> usize {
        20 + self.options.len()
    }

    #[inline]
    fn is_malformed(&self) -> bool {
        self.malformed
    }

    #[inline]
    fn inner_pdu(&self) -> Option<&Pdu> {
        self.inner.as_deref()
    }

    #[inline]
    fn inner_pdu_mut(&mut self) -> Option<&mut Pdu> {
        self.inner.as_deref_mut()
    }

    #[inline]
    fn set_inner_pdu(&mut self, inner: Pdu) {
        self.inner = Some(Box::new(inner));
    }

    #[inline]
    fn take_inner_pdu(&mut self) -> Option<Pdu> {
        self.inner.take().map(|boxed| *boxed)
    }

    fn matches_response(&self, response: &[u8]) -> bool {
        let Some(saddr) = utils::get_array::<4>(response, 12) else {
            return false;
        };
        let Some(daddr) = utils::get_array::<4>(response, 16) else {
            return false;
        };
        if u32::from_be_bytes(saddr) != self.daddr || u32::from_be_bytes(daddr) != self.saddr {
            return false;
        }
        let header_len = usize::from(response[0] & 0x0F) * 4;
        match (self.inner.as_deref(), response.get(header_len..)) {
            (Some(inner), Some(rest)) => inner.matches_response(rest),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    fn write_serialization(&self, buffer: &mut [u8], _parent: Option<&Pdu>) {
        let header_len = self.header_size();
        let mut stream = OutputStream::new(buffer);
        stream.write_u8(0x40 | self.ihl());
        stream.write_u8(self.tos);
        stream.write_u16(self.size() as u16);
        stream.write_u16(self.id);
        stream.write_u16(((self.flags.data as u16) << 13) | self.frag_offset);
        stream.write_u8(self.ttl);
        stream.write_u8(self.serialized_protocol());
        stream.write_u16(0); // checksum, patched below
        stream.write_u32(self.saddr);
        stream.write_u32(self.daddr);
        stream.write_slice(&self.options);

        let chksum = !utils::fold_checksum(utils::ones_complement_sum(&buffer[..header_len]));
        buffer[10..12].copy_from_slice(&chksum.to_be_bytes());
    }
}

/// An IPv6 packet with the fixed 40-byte header. Extension headers are not
/// interpreted; when present they surface inside the payload.
#[derive(Clone, Debug)]
pub struct Ipv6 {
    traffic_class: u8,
    flow_label: u32,
    next_header: u8,
    hop_limit: u8,
    saddr: [u8; 16],
    daddr: [u8; 16],
    malformed: bool,
    inner: Option<Box<Pdu>>,
}

impl Default for Ipv6 {
    fn default() -> Self {
        Ipv6 {
            traffic_class: 0,
            flow_label: 0,
            next_header: 0,
            hop_limit: 64,
            saddr: [0; 16],
            daddr: [0; 16],
            malformed: false,
            inner: None,
        }
    }
}

impl Ipv6 {
    #[inline]
    pub fn new() -> Self {
        Ipv6::default()
    }

    /// Probes the first bytes of a packet without building it.
    pub fn extract_metadata(bytes: &[u8]) -> Result<Metadata, ValidationError> {
        let mut stream = InputStream::new(V6_NAME, bytes);
        stream.skip(6, "packet too short for an IPv6 header")?;
        let next_header = stream.read_u8("packet too short for an IPv6 header")?;
        stream.skip(33, "packet too short for an IPv6 header")?;
        Ok(Metadata {
            header_size: 40,
            kind: PduKind::Ipv6,
            next_kind: match next_header {
                DATA_PROTO_TCP => Some(PduKind::Tcp),
                DATA_PROTO_UDP => Some(PduKind::Udp),
                _ => None,
            },
        })
    }

    /// Builds a packet and its encapsulated layers from `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut stream = InputStream::new(V6_NAME, bytes);
        let short = "packet too short for an IPv6 header";
        let ver_tc_flow = stream.read_u32(short)?;
        let payload_length = stream.read_u16(short)?;
        let next_header = stream.read_u8(short)?;
        let hop_limit = stream.read_u8(short)?;
        let saddr = stream.read_array(short)?;
        let daddr = stream.read_array(short)?;

        let mut ip = Ipv6 {
            traffic_class: ((ver_tc_flow >> 20) & 0xFF) as u8,
            flow_label: ver_tc_flow & 0x000F_FFFF,
            next_header,
            hop_limit,
            saddr,
            daddr,
            malformed: false,
            inner: None,
        };

        if ver_tc_flow >> 28 != 6 {
            ip.malformed = true;
            return Ok(ip);
        }

        let end = 40 + usize::from(payload_length);
        if end > bytes.len() {
            ip.malformed = true;
        }
        let payload = &bytes[40..core::cmp::min(end, bytes.len())];
        if !payload.is_empty() {
            let inner = match next_header {
                DATA_PROTO_TCP => Pdu::from(Tcp::from_bytes(payload)?),
                DATA_PROTO_UDP => Pdu::from(Udp::from_bytes(payload)?),
                _ => match dispatch::allocate(
                    PduKind::Ipv6,
                    Selector::ip_protocol(next_header),
                    payload,
                ) {
                    Some(inner) => inner?,
                    None => Pdu::from(Raw::from_bytes(payload)),
                },
            };
            ip.inner = Some(Box::new(inner));
        }

        Ok(ip)
    }

    #[inline]
    pub fn traffic_class(&self) -> u8 {
        self.traffic_class
    }

    #[inline]
    pub fn set_traffic_class(&mut self, traffic_class: u8) {
        self.traffic_class = traffic_class;
    }

    #[inline]
    pub fn flow_label(&self) -> u32 {
        self.flow_label
    }

    pub fn set_flow_label(&mut self, flow_label: u32) -> Result<(), OutOfRangeError> {
        if flow_label > 0x000F_FFFF {
            return Err(OutOfRangeError {
                field: "flow label",
                max: 0x000F_FFFF,
            });
        }
        self.flow_label = flow_label;
        Ok(())
    }

    /// The next-header number. When the inner PDU is of a known kind,
    /// serialization derives this field from it instead.
    #[inline]
    pub fn next_header(&self) -> u8 {
        self.next_header
    }

    #[inline]
    pub fn set_next_header(&mut self, next_header: u8) {
        self.next_header = next_header;
    }

    #[inline]
    pub fn hop_limit(&self) -> u8 {
        self.hop_limit
    }

    #[inline]
    pub fn set_hop_limit(&mut self, hop_limit: u8) {
        self.hop_limit = hop_limit;
    }

    #[inline]
    pub fn saddr(&self) -> [u8; 16] {
        self.saddr
    }

    #[inline]
    pub fn set_saddr(&mut self, saddr: [u8; 16]) {
        self.saddr = saddr;
    }

    #[inline]
    pub fn daddr(&self) -> [u8; 16] {
        self.daddr
    }

    #[inline]
    pub fn set_daddr(&mut self, daddr: [u8; 16]) {
        self.daddr = daddr;
    }

    fn serialized_next_header(&self) -> u8 {
        match self.inner.as_deref().map(Pdu::kind) {
            Some(PduKind::Tcp) => DATA_PROTO_TCP,
            Some(PduKind::Udp) => DATA_PROTO_UDP,
            _ => self.next_header,
        }
    }
}

impl Layer for Ipv6 {
    #[inline]
    fn kind(&self) -> PduKind {
        PduKind::Ipv6
    }

    #[inline]
    fn header_size(&self) -> usize {
        40
    }

    #[inline]
    fn is_malformed(&self) -> bool {
        self.malformed
    }

    #[inline]
    fn inner_pdu(&self) -> Option<&Pdu> {
        self.inner.as_deref()
    }

    #[inline]
    fn inner_pdu_mut(&mut self) -> Option<&mut Pdu> {
        self.inner.as_deref_mut()
    }

    #[inline]
    fn set_inner_pdu(&mut self, inner: Pdu) {
        self.inner = Some(Box::new(inner));
    }

    #[inline]
    fn take_inner_pdu(&mut self) -> Option<Pdu> {
        self.inner.take().map(|boxed| *boxed)
    }

    fn matches_response(&self, response: &[u8]) -> bool {
        let Some(saddr) = utils::get_array::<16>(response, 8) else {
            return false;
        };
        let Some(daddr) = utils::get_array::<16>(response, 24) else {
            return false;
        };
        if saddr != self.daddr || daddr != self.saddr {
            return false;
        }
        match (self.inner.as_deref(), response.get(40..)) {
            (Some(inner), Some(rest)) => inner.matches_response(rest),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    fn write_serialization(&self, buffer: &mut [u8], _parent: Option<&Pdu>) {
        let mut stream = OutputStream::new(buffer);
        stream.write_u32(
            (6u32 << 28) | (u32::from(self.traffic_class) << 20) | self.flow_label,
        );
        stream.write_u16((self.size() - 40) as u16);
        stream.write_u8(self.serialized_next_header());
        stream.write_u8(self.hop_limit);
        stream.write_slice(&self.saddr);
        stream.write_slice(&self.daddr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_short_header() {
        assert!(Ipv4::from_bytes(&[0x45; 12]).is_err());
        assert!(Ipv6::from_bytes(&[0x60; 20]).is_err());
    }

    #[test]
    fn v4_header_checksum_is_recomputed() {
        // RFC 1071 checksum of this header is 0x6b31.
        let bytes = [
            0x45, 0xf9, 0x00, 0x14, 0xf7, 0xe7, 0x00, 0x00, 0x71, 0x11, 0x6b, 0x31, 0x82, 0x72,
            0x63, 0x53, 0x00, 0x00, 0x00, 0x02,
        ];
        let ip = Ipv4::from_bytes(&bytes).unwrap();
        assert!(!ip.is_malformed());
        assert_eq!(ip.chksum(), 0x6b31);
        assert_eq!(Pdu::from(ip).serialize(), bytes);
    }

    #[test]
    fn v4_field_round_trip() {
        let mut ip = Ipv4::new();
        ip.set_tos(0x5f);
        ip.set_identifier(0xb119);
        let mut flags = Ipv4Flags::new();
        flags.set_df(true);
        ip.set_flags(flags);
        ip.set_ttl(0x27);
        ip.set_saddr(0x320b_ad1d);
        ip.set_daddr(0x9390_e801);
        ip.set_protocol(0xfe);

        let bytes = Pdu::from(ip).serialize();
        let parsed = Ipv4::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.tos(), 0x5f);
        assert_eq!(parsed.identifier(), 0xb119);
        assert!(parsed.flags().df());
        assert!(!parsed.flags().mf());
        assert_eq!(parsed.ttl(), 0x27);
        assert_eq!(parsed.saddr(), 0x320b_ad1d);
        assert_eq!(parsed.daddr(), 0x9390_e801);
        assert_eq!(parsed.protocol(), 0xfe);
    }

    #[test]
    fn v4_truncated_payload_sets_malformed() {
        let mut bytes = vec![
            0x45, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x40, 0xfe, 0x00, 0x00, 0x0a, 0x00,
            0x00, 0x01, 0x0a, 0x00, 0x00, 0x02,
        ];
        bytes.extend_from_slice(&[0u8; 8]); // 28 bytes present, 64 declared
        let ip = Ipv4::from_bytes(&bytes).unwrap();
        assert!(ip.is_malformed());
    }

    #[test]
    fn v4_frag_offset_is_bounded() {
        let mut ip = Ipv4::new();
        assert!(ip.set_frag_offset(0x1FFF).is_ok());
        assert!(ip.set_frag_offset(0x2000).is_err());
    }

    #[test]
    fn v6_round_trip() {
        let mut ip = Ipv6::new();
        ip.set_traffic_class(0x1c);
        ip.set_flow_label(0x812ab).unwrap();
        ip.set_hop_limit(0xff);
        ip.set_saddr([1; 16]);
        ip.set_daddr([2; 16]);
        let packet = ip / Raw::new(vec![0xab; 6]);

        let bytes = packet.serialize();
        assert_eq!(bytes.len(), 46);
        let parsed = Ipv6::from_bytes(&bytes).unwrap();
        assert!(!parsed.is_malformed());
        assert_eq!(parsed.traffic_class(), 0x1c);
        assert_eq!(parsed.flow_label(), 0x812ab);
        assert_eq!(parsed.hop_limit(), 0xff);
        assert_eq!(parsed.inner_pdu().unwrap().size(), 6);
    }
}
