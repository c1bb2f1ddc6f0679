// SPDX-License-Identifier: MIT OR Apache-2.0

//! The User Datagram Protocol layer.

use crate::error::ValidationError;
use crate::layers::dispatch::{self, Selector};
use crate::layers::dns::Dns;
use crate::layers::traits::*;
use crate::layers::{Pdu, Raw};
use crate::stream::{InputStream, OutputStream};
use crate::utils;

const NAME: &str = "UDP";

const DNS_PORT: u16 = 53;

/// A UDP datagram.
///
/// The length field is derived from the datagram's composition at
/// serialization time. The checksum is kept verbatim when the datagram was
/// parsed from bytes (including the all-zero "no checksum" form); fresh
/// datagrams, or datagrams whose checksum was cleared, compute it from the
/// parent layer's pseudo-header when serialized.
#[derive(Clone, Debug)]
pub struct Udp {
    sport: u16,
    dport: u16,
    chksum: Option<u16>,
    malformed: bool,
    inner: Option<Box<Pdu>>,
}

impl Default for Udp {
    fn default() -> Self {
        Udp {
            sport: 0,
            dport: 0,
            chksum: None,
            malformed: false,
            inner: None,
        }
    }
}

impl Udp {
    #[inline]
    pub fn new() -> Self {
        Udp::default()
    }

    /// Probes the first bytes of a datagram without building it.
    pub fn extract_metadata(bytes: &[u8]) -> Result<Metadata, ValidationError> {
        let mut stream = InputStream::new(NAME, bytes);
        let sport = stream.read_u16("datagram too short for a UDP header")?;
        let dport = stream.read_u16("datagram too short for a UDP header")?;
        stream.skip(4, "datagram too short for a UDP header")?;
        Ok(Metadata {
            header_size: 8,
            kind: PduKind::Udp,
            next_kind: if dport == DNS_PORT || sport == DNS_PORT {
                Some(PduKind::Dns)
            } else {
                None
            },
        })
    }

    /// Builds a datagram and its encapsulated layer from `bytes`.
    ///
    /// The payload protocol is resolved through the next-protocol registry
    /// (destination port first, then source port), then the well-known
    /// DNS port, and falls back to a raw layer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut stream = InputStream::new(NAME, bytes);
        let short = "datagram too short for a UDP header";
        let sport = stream.read_u16(short)?;
        let dport = stream.read_u16(short)?;
        let length = stream.read_u16(short)?;
        let chksum = stream.read_u16(short)?;

        let mut udp = Udp {
            sport,
            dport,
            chksum: Some(chksum),
            malformed: false,
            inner: None,
        };

        // The length field is validated but does not bound the payload;
        // the enclosing layer already fixed the datagram's extent, and
        // captured traffic is not above carrying a length field that
        // disagrees with it.
        let length = usize::from(length);
        if length < 8 || length > bytes.len() {
            udp.malformed = true;
            return Ok(udp);
        }

        let payload = &bytes[8..];
        if !payload.is_empty() {
            let inner = match dispatch::allocate(PduKind::Udp, Selector::dst_port(dport), payload)
                .or_else(|| dispatch::allocate(PduKind::Udp, Selector::src_port(sport), payload))
            {
                Some(inner) => inner?,
                None if dport == DNS_PORT || sport == DNS_PORT => {
                    match Dns::from_bytes(payload) {
                        Ok(dns) => Pdu::from(dns),
                        Err(_) => Pdu::from(Raw::from_bytes(payload)),
                    }
                }
                None => Pdu::from(Raw::from_bytes(payload)),
            };
            udp.inner = Some(Box::new(inner));
        }

        Ok(udp)
    }

    #[inline]
    pub fn sport(&self) -> u16 {
        self.sport
    }

    #[inline]
    pub fn set_sport(&mut self, sport: u16) {
        self.sport = sport;
    }

    #[inline]
    pub fn dport(&self) -> u16 {
        self.dport
    }

    #[inline]
    pub fn set_dport(&mut self, dport: u16) {
        self.dport = dport;
    }

    /// The length the datagram will declare on the wire.
    #[inline]
    pub fn length(&self) -> u16 {
        self.size() as u16
    }

    /// The checksum that serialization will write verbatim, or `None` if
    /// it will be computed from the parent pseudo-header.
    #[inline]
    pub fn chksum(&self) -> Option<u16> {
        self.chksum
    }

    #[inline]
    pub fn set_chksum(&mut self, chksum: u16) {
        self.chksum = Some(chksum);
    }

    /// Re-enables automatic checksum computation at serialization.
    #[inline]
    pub fn clear_chksum(&mut self) {
        self.chksum = None;
    }
}

impl Layer for Udp {
    #[inline]
    fn kind(&self) -> PduKind {
        PduKind::Udp
    }

    #[inline]
    fn header_size(&self) -> usize {
        8
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
        let Some(sport) = utils::get_array::<2>(response, 0) else {
            return false;
        };
        let Some(dport) = utils::get_array::<2>(response, 2) else {
            return false;
        };
        if u16::from_be_bytes(sport) != self.dport || u16::from_be_bytes(dport) != self.sport {
            return false;
        }
        match (self.inner.as_deref(), response.get(8..)) {
            (Some(inner), Some(rest)) => inner.matches_response(rest),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    fn write_serialization(&self, buffer: &mut [u8], parent: Option<&Pdu>) {
        let total = buffer.len();
        let mut stream = OutputStream::new(buffer);
        stream.write_u16(self.sport);
        stream.write_u16(self.dport);
        stream.write_u16(total as u16);
        stream.write_u16(0); // checksum, patched below

        let chksum = match self.chksum {
            Some(chksum) => chksum,
            None => {
                let pseudo = match parent {
                    Some(Pdu::Ipv4(ip)) => utils::pseudoheader_sum_v4(
                        ip.saddr().to_be_bytes(),
                        ip.daddr().to_be_bytes(),
                        total as u32,
                        super::ip::DATA_PROTO_UDP,
                    ),
                    Some(Pdu::Ipv6(ip)) => utils::pseudoheader_sum_v6(
                        ip.saddr(),
                        ip.daddr(),
                        total as u32,
                        super::ip::DATA_PROTO_UDP,
                    ),
                    _ => 0,
                };
                let folded =
                    !utils::fold_checksum(pseudo + utils::ones_complement_sum(buffer));
                // An all-zero checksum means "none" on the wire (RFC 768).
                if folded == 0 {
                    0xFFFF
                } else {
                    folded
                }
            }
        };
        buffer[6..8].copy_from_slice(&chksum.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::ip::Ipv4;

    #[test]
    fn parsed_chksum_is_kept_verbatim() {
        // A datagram carrying the "no checksum" form.
        let bytes = [
            0x70, 0x50, 0x0f, 0xa0, 0x00, 0x0c, 0x00, 0x00, 0xde, 0xad, 0xbe, 0xef,
        ];
        let udp = Udp::from_bytes(&bytes).unwrap();
        assert_eq!(udp.sport(), 0x7050);
        assert_eq!(udp.dport(), 0x0fa0);
        assert_eq!(udp.chksum(), Some(0));
        assert_eq!(Pdu::from(udp).serialize(), bytes);
    }

    #[test]
    fn fresh_chksum_uses_pseudoheader() {
        let mut ip = Ipv4::new();
        ip.set_saddr(0x0a00_0001);
        ip.set_daddr(0x0a00_0002);
        let mut udp = Udp::new();
        udp.set_sport(0x1234);
        udp.set_dport(0x5678);
        let packet = ip / udp / Raw::new(vec![0x41, 0x42]);

        let bytes = packet.serialize();
        let on_wire = u16::from_be_bytes([bytes[26], bytes[27]]);
        assert_ne!(on_wire, 0);

        // Verifying the transmitted datagram against the pseudo-header
        // must sum to all-ones.
        let pseudo = utils::pseudoheader_sum_v4(
            [0x0a, 0, 0, 1],
            [0x0a, 0, 0, 2],
            10,
            super::super::ip::DATA_PROTO_UDP,
        );
        let verify =
            utils::fold_checksum(pseudo + utils::ones_complement_sum(&bytes[20..]));
        assert_eq!(verify, 0xFFFF);
    }

    #[test]
    fn bad_length_sets_malformed() {
        let bytes = [0x00, 0x35, 0x00, 0x35, 0x00, 0x40, 0x00, 0x00];
        let udp = Udp::from_bytes(&bytes).unwrap();
        assert!(udp.is_malformed());
        assert!(udp.inner_pdu().is_none());
    }

    #[test]
    fn response_matching_swaps_ports() {
        let mut query = Udp::new();
        query.set_sport(1111);
        query.set_dport(2222);

        let mut response = [0u8; 8];
        response[0..2].copy_from_slice(&2222u16.to_be_bytes());
        response[2..4].copy_from_slice(&1111u16.to_be_bytes());
        assert!(query.matches_response(&response));

        response[0..2].copy_from_slice(&3333u16.to_be_bytes());
        assert!(!query.matches_response(&response));
    }
}
