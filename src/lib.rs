// SPDX-License-Identifier: MIT OR Apache-2.0

//! A library for crafting, decoding and modifying layered packet data
//! units.
//!
//! Given a raw byte buffer, the parsers in [`layers`] produce a typed
//! chain of protocol data units with field-level accessors; given such a
//! chain, [`Pdu::serialize`] produces a byte buffer that is bit-exact with
//! the original, computed checksums included. Multi-byte fields cross the
//! API boundary in host byte order; conversion happens at the byte-stream
//! boundary.
//!
//! The library performs no I/O and no internal threading: every PDU is
//! owned by a single caller, every call completes in time and memory
//! proportional to its input, and the only shared state is the
//! next-protocol registry in [`layers::dispatch`].
//!
//! [`Pdu::serialize`]: layers::Pdu::serialize

pub mod error;
pub mod layers;
pub mod stream;
pub mod utils;

pub use layers::traits::{Layer, Metadata, PduKind};
pub use layers::Pdu;
pub use utils::U24;

#[cfg(test)]
mod tests {
    use crate::layers::ip::Ipv4;
    use crate::layers::l2::Ether;
    use crate::layers::tcp::Tcp;
    use crate::layers::udp::Udp;
    use crate::layers::{Pdu, Raw};
    use crate::{Layer, PduKind};

    #[test]
    fn metadata_probe_walks_a_buffer() {
        let packet = Ether::new() / Ipv4::new() / Udp::new() / Raw::new(vec![0xab; 6]);
        let bytes = packet.serialize();

        let eth = Ether::extract_metadata(&bytes).unwrap();
        assert_eq!(eth.next_kind, Some(PduKind::Ipv4));
        let ip = Ipv4::extract_metadata(&bytes[eth.header_size..]).unwrap();
        assert_eq!(ip.next_kind, Some(PduKind::Udp));
        let udp = Udp::extract_metadata(&bytes[eth.header_size + ip.header_size..]).unwrap();
        assert_eq!(udp.header_size, 8);
    }

    #[test]
    fn parse_reaches_the_transport_layer() {
        let mut tcp = Tcp::new();
        tcp.set_sport(49152);
        tcp.set_dport(80);
        let packet = Ether::new() / Ipv4::new() / tcp / Raw::new(b"GET /".to_vec());
        let bytes = packet.serialize();

        let parsed = Pdu::from(Ether::from_bytes(&bytes).unwrap());
        assert!(!parsed.is_chain_malformed());
        let tcp = parsed.find(PduKind::Tcp).unwrap().as_tcp().unwrap();
        assert_eq!(tcp.sport(), 49152);
        assert_eq!(tcp.dport(), 80);
        assert_eq!(tcp.inner_pdu().unwrap().as_raw().unwrap().data(), b"GET /");
    }
}
