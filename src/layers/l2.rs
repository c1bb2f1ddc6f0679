// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Ethernet II link layer.

use crate::error::ValidationError;
use crate::layers::dispatch::{self, Selector};
use crate::layers::ip::{Ipv4, Ipv6};
use crate::layers::traits::*;
use crate::layers::{Pdu, Raw};
use crate::stream::{InputStream, OutputStream};

const NAME: &str = "Ethernet";

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const ETHER_TYPE_IPV6: u16 = 0x86DD;

/// An Ethernet II frame.
///
/// Frames parsed from bytes keep any link-layer padding found past the end
/// of the encapsulated PDU as an owned trailer, so short padded frames
/// serialize back to their original bytes.
#[derive(Clone, Debug)]
pub struct Ether {
    dst_mac: [u8; 6],
    src_mac: [u8; 6],
    eth_type: u16,
    trailer: Vec<u8>,
    malformed: bool,
    inner: Option<Box<Pdu>>,
}

impl Default for Ether {
    fn default() -> Self {
        Ether {
            dst_mac: [0; 6],
            src_mac: [0; 6],
            eth_type: ETHER_TYPE_IPV4,
            trailer: Vec::new(),
            malformed: false,
            inner: None,
        }
    }
}

impl Ether {
    #[inline]
    pub fn new() -> Self {
        Ether::default()
    }

    /// Probes the first bytes of a frame without building it.
    pub fn extract_metadata(bytes: &[u8]) -> Result<Metadata, ValidationError> {
        let mut stream = InputStream::new(NAME, bytes);
        stream.skip(12, "frame too short for an Ethernet header")?;
        let eth_type = stream.read_u16("frame too short for an Ethernet header")?;
        Ok(Metadata {
            header_size: 14,
            kind: PduKind::Ethernet,
            next_kind: match eth_type {
                ETHER_TYPE_IPV4 => Some(PduKind::Ipv4),
                ETHER_TYPE_IPV6 => Some(PduKind::Ipv6),
                _ => None,
            },
        })
    }

    /// Builds a frame and its encapsulated layers from `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut stream = InputStream::new(NAME, bytes);
        let dst_mac = stream.read_array("frame too short for an Ethernet header")?;
        let src_mac = stream.read_array("frame too short for an Ethernet header")?;
        let eth_type = stream.read_u16("frame too short for an Ethernet header")?;

        let mut ether = Ether {
            dst_mac,
            src_mac,
            eth_type,
            trailer: Vec::new(),
            malformed: false,
            inner: None,
        };

        let payload = stream.tail();
        if !payload.is_empty() {
            let inner = match eth_type {
                ETHER_TYPE_IPV4 => Pdu::from(Ipv4::from_bytes(payload)?),
                ETHER_TYPE_IPV6 => Pdu::from(Ipv6::from_bytes(payload)?),
                _ => match dispatch::allocate(
                    PduKind::Ethernet,
                    Selector::ether_type(eth_type),
                    payload,
                ) {
                    Some(inner) => inner?,
                    None => Pdu::from(Raw::from_bytes(payload)),
                },
            };
            // Whatever the encapsulated PDU did not claim is link padding.
            // A malformed inner chain can claim more than is present, in
            // which case there is no padding to keep.
            ether.trailer = payload.get(inner.size()..).unwrap_or_default().to_vec();
            ether.inner = Some(Box::new(inner));
        }

        Ok(ether)
    }

    #[inline]
    pub fn dst_mac(&self) -> [u8; 6] {
        self.dst_mac
    }

    #[inline]
    pub fn set_dst_mac(&mut self, dst_mac: [u8; 6]) {
        self.dst_mac = dst_mac;
    }

    #[inline]
    pub fn src_mac(&self) -> [u8; 6] {
        self.src_mac
    }

    #[inline]
    pub fn set_src_mac(&mut self, src_mac: [u8; 6]) {
        self.src_mac = src_mac;
    }

    /// The ethertype of the frame. When the frame has an inner PDU of a
    /// known kind, serialization derives this field from it instead.
    #[inline]
    pub fn eth_type(&self) -> u16 {
        self.eth_type
    }

    #[inline]
    pub fn set_eth_type(&mut self, eth_type: u16) {
        self.eth_type = eth_type;
    }

    /// Link-layer padding carried after the encapsulated PDU.
    #[inline]
    pub fn trailer(&self) -> &[u8] {
        &self.trailer
    }

    #[inline]
    pub fn set_trailer(&mut self, trailer: Vec<u8>) {
        self.trailer = trailer;
    }

    fn serialized_eth_type(&self) -> u16 {
        match self.inner.as_deref().map(Pdu::kind) {
            Some(PduKind::Ipv4) => ETHER_TYPE_IPV4,
            Some(PduKind::Ipv6) => ETHER_TYPE_IPV6,
            _ => self.eth_type,
        }
    }
}

impl Layer for Ether {
    #[inline]
    fn kind(&self) -> PduKind {
        PduKind::Ethernet
    }

    #[inline]
    fn header_size(&self) -> usize {
        14
    }

    #[inline]
    fn trailer_size(&self) -> usize {
        self.trailer.len()
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
        if response.len() < 14 {
            return false;
        }
        match self.inner.as_deref() {
            Some(inner) => inner.matches_response(&response[14..]),
            None => true,
        }
    }

    fn write_serialization(&self, buffer: &mut [u8], _parent: Option<&Pdu>) {
        let mut stream = OutputStream::new(buffer);
        stream.write_slice(&self.dst_mac);
        stream.write_slice(&self.src_mac);
        stream.write_u16(self.serialized_eth_type());
        if !self.trailer.is_empty() {
            let trailer_start = stream.remaining() - self.trailer.len();
            stream.skip(trailer_start);
            stream.write_slice(&self.trailer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_frame() {
        let bytes = [
            0x58, 0x4a, 0xdf, 0x60, 0x32, 0xc5, // dst
            0x8b, 0x44, 0xd7, 0x3f, 0x10, 0xc7, // src
            0x12, 0x34, // unknown ethertype
            0xde, 0xad, 0xbe, 0xef,
        ];
        let ether = Ether::from_bytes(&bytes).unwrap();
        assert_eq!(ether.dst_mac(), [0x58, 0x4a, 0xdf, 0x60, 0x32, 0xc5]);
        assert_eq!(ether.src_mac(), [0x8b, 0x44, 0xd7, 0x3f, 0x10, 0xc7]);
        assert_eq!(ether.eth_type(), 0x1234);
        assert_eq!(ether.inner_pdu().unwrap().kind(), PduKind::Raw);
        assert_eq!(ether.size(), bytes.len());
        assert_eq!(Pdu::from(ether).serialize(), bytes);
    }

    #[test]
    fn metadata_reports_next_kind() {
        let mut bytes = [0u8; 14];
        bytes[12] = 0x08;
        let meta = Ether::extract_metadata(&bytes).unwrap();
        assert_eq!(meta.header_size, 14);
        assert_eq!(meta.kind, PduKind::Ethernet);
        assert_eq!(meta.next_kind, Some(PduKind::Ipv4));

        assert!(Ether::extract_metadata(&bytes[..10]).is_err());
    }

    #[test]
    fn eth_type_follows_inner_kind() {
        let packet = Ether::new() / Ipv4::new();
        let bytes = packet.serialize();
        assert_eq!(u16::from_be_bytes([bytes[12], bytes[13]]), ETHER_TYPE_IPV4);
    }
}
