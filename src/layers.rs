// SPDX-License-Identifier: MIT OR Apache-2.0

//! The collection of protocol layers implemented by this library.
//!
//! Packets are modelled as a chain of [`Pdu`]s, each owning at most one
//! inner PDU. Parsing an outer layer consults the next-protocol registry
//! (see [`dispatch`]) to materialize the encapsulated layer from the
//! remaining bytes; serialization runs from the outermost layer downward,
//! with each layer's payload written before its own header so that
//! checksums can be computed over bytes that already exist.
//!
//! Layers compose with the `/` operator, transferring ownership of the
//! right-hand side into the innermost empty slot of the left-hand side:
//!
//! ```
//! use pdus::layers::{l2::Ether, ip::Ipv4, udp::Udp, bth::Bth, Raw};
//!
//! let packet = Ether::new() / Ipv4::new() / Udp::new() / Bth::new();
//! let packet = packet / Raw::new(b"payload!".to_vec());
//! let bytes = packet.serialize();
//! # assert_eq!(bytes.len(), packet.size());
//! ```

pub mod bth;
pub mod dispatch;
pub mod dns;
pub mod ip;
pub mod l2;
pub mod tcp;
pub mod traits;
pub mod udp;

use crate::layers::bth::Bth;
use crate::layers::dns::Dns;
use crate::layers::ip::{Ipv4, Ipv6};
use crate::layers::l2::Ether;
use crate::layers::tcp::Tcp;
use crate::layers::traits::*;
use crate::layers::udp::Udp;

/// A layer of unstructured bytes.
///
/// Used when an inner layer cannot be inferred from the enclosing
/// protocol's selector fields, or when the payload genuinely is an opaque
/// run of bytes. A `Raw` layer never has an inner PDU of its own.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Raw {
    data: Vec<u8>,
}

impl Raw {
    #[inline]
    pub fn new(data: Vec<u8>) -> Self {
        Raw { data }
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Raw {
            data: Vec::from(bytes),
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl Layer for Raw {
    #[inline]
    fn kind(&self) -> PduKind {
        PduKind::Raw
    }

    #[inline]
    fn header_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn inner_pdu(&self) -> Option<&Pdu> {
        None
    }

    #[inline]
    fn inner_pdu_mut(&mut self) -> Option<&mut Pdu> {
        None
    }

    fn set_inner_pdu(&mut self, _inner: Pdu) {
        panic!("a Raw layer cannot encapsulate another PDU");
    }

    #[inline]
    fn take_inner_pdu(&mut self) -> Option<Pdu> {
        None
    }

    /// Any response payload is acceptable to a raw query layer.
    #[inline]
    fn matches_response(&self, _response: &[u8]) -> bool {
        true
    }

    #[inline]
    fn write_serialization(&self, buffer: &mut [u8], _parent: Option<&Pdu>) {
        buffer[..self.data.len()].copy_from_slice(&self.data);
    }
}

/// One layer of a packet, as a closed sum over the supported layer types.
///
/// The inner-PDU link of every layer is an owned `Box<Pdu>`; downcasting
/// goes through the [`PduKind`] tag via the `as_*` accessors rather than
/// through runtime reflection.
#[derive(Clone, Debug)]
pub enum Pdu {
    Ethernet(Ether),
    Ipv4(Ipv4),
    Ipv6(Ipv6),
    Udp(Udp),
    Tcp(Tcp),
    Dns(Dns),
    Bth(Bth),
    Raw(Raw),
}

macro_rules! dispatch {
    ($value:expr, $layer:ident => $body:expr) => {
        match $value {
            Pdu::Ethernet($layer) => $body,
            Pdu::Ipv4($layer) => $body,
            Pdu::Ipv6($layer) => $body,
            Pdu::Udp($layer) => $body,
            Pdu::Tcp($layer) => $body,
            Pdu::Dns($layer) => $body,
            Pdu::Bth($layer) => $body,
            Pdu::Raw($layer) => $body,
        }
    };
}

impl Pdu {
    #[inline]
    pub fn kind(&self) -> PduKind {
        dispatch!(self, layer => layer.kind())
    }

    #[inline]
    pub fn header_size(&self) -> usize {
        dispatch!(self, layer => layer.header_size())
    }

    #[inline]
    pub fn trailer_size(&self) -> usize {
        dispatch!(self, layer => layer.trailer_size())
    }

    /// The total wire size of this PDU, its inner PDUs and its trailers.
    #[inline]
    pub fn size(&self) -> usize {
        dispatch!(self, layer => layer.size())
    }

    /// Whether this layer (not its inner PDUs) was flagged as structurally
    /// defective during construction from bytes.
    #[inline]
    pub fn is_malformed(&self) -> bool {
        dispatch!(self, layer => layer.is_malformed())
    }

    /// Whether this layer or any layer beneath it is malformed.
    pub fn is_chain_malformed(&self) -> bool {
        self.is_malformed() || self.inner_pdu().map(Pdu::is_chain_malformed).unwrap_or(false)
    }

    #[inline]
    pub fn inner_pdu(&self) -> Option<&Pdu> {
        dispatch!(self, layer => layer.inner_pdu())
    }

    #[inline]
    pub fn inner_pdu_mut(&mut self) -> Option<&mut Pdu> {
        dispatch!(self, layer => layer.inner_pdu_mut())
    }

    #[inline]
    pub fn set_inner_pdu(&mut self, inner: Pdu) {
        dispatch!(self, layer => layer.set_inner_pdu(inner))
    }

    #[inline]
    pub fn take_inner_pdu(&mut self) -> Option<Pdu> {
        dispatch!(self, layer => layer.take_inner_pdu())
    }

    #[inline]
    pub fn matches_response(&self, response: &[u8]) -> bool {
        dispatch!(self, layer => layer.matches_response(response))
    }

    /// Attaches `inner` at the innermost layer of the chain that has no
    /// inner PDU of its own.
    pub fn append_inner(&mut self, inner: Pdu) {
        match self.inner_pdu_mut() {
            Some(next) => next.append_inner(inner),
            None => self.set_inner_pdu(inner),
        }
    }

    /// Walks the chain (this layer included) for the first PDU of the
    /// given kind.
    pub fn find(&self, kind: PduKind) -> Option<&Pdu> {
        if self.kind() == kind {
            return Some(self);
        }
        self.inner_pdu()?.find(kind)
    }

    pub fn find_mut(&mut self, kind: PduKind) -> Option<&mut Pdu> {
        if self.kind() == kind {
            return Some(self);
        }
        self.inner_pdu_mut()?.find_mut(kind)
    }

    /// Serializes the whole chain into a fresh buffer of exactly
    /// [`size()`](Pdu::size) bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; self.size()];
        self.serialize_into(&mut buffer, None);
        buffer
    }

    /// Serializes into a window that must span exactly `size()` bytes.
    ///
    /// The inner PDU is written first (into the middle of the window,
    /// between this layer's header and trailer), then this layer's own
    /// `write_serialization` runs with the payload bytes already in
    /// place, letting it fill checksum fields that cover the payload.
    pub(crate) fn serialize_into(&self, buffer: &mut [u8], parent: Option<&Pdu>) {
        debug_assert_eq!(buffer.len(), self.size());
        if let Some(inner) = self.inner_pdu() {
            let start = self.header_size();
            let end = buffer.len() - self.trailer_size();
            inner.serialize_into(&mut buffer[start..end], Some(self));
        }
        dispatch!(self, layer => layer.write_serialization(buffer, parent));
    }
}

macro_rules! layer_conversions {
    ($($variant:ident => $ty:ty, $as_fn:ident, $as_mut_fn:ident);* $(;)?) => {
        impl Pdu {
            $(
                #[inline]
                pub fn $as_fn(&self) -> Option<&$ty> {
                    match self {
                        Pdu::$variant(layer) => Some(layer),
                        _ => None,
                    }
                }

                #[inline]
                pub fn $as_mut_fn(&mut self) -> Option<&mut $ty> {
                    match self {
                        Pdu::$variant(layer) => Some(layer),
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<$ty> for Pdu {
                #[inline]
                fn from(layer: $ty) -> Pdu {
                    Pdu::$variant(layer)
                }
            }

            impl<T: Into<Pdu>> core::ops::Div<T> for $ty {
                type Output = Pdu;

                #[inline]
                fn div(self, rhs: T) -> Pdu {
                    Pdu::from(self) / rhs
                }
            }
        )*
    };
}

layer_conversions! {
    Ethernet => Ether, as_ether, as_ether_mut;
    Ipv4 => Ipv4, as_ipv4, as_ipv4_mut;
    Ipv6 => Ipv6, as_ipv6, as_ipv6_mut;
    Udp => Udp, as_udp, as_udp_mut;
    Tcp => Tcp, as_tcp, as_tcp_mut;
    Dns => Dns, as_dns, as_dns_mut;
    Bth => Bth, as_bth, as_bth_mut;
    Raw => Raw, as_raw, as_raw_mut;
}

impl<T: Into<Pdu>> core::ops::Div<T> for Pdu {
    type Output = Pdu;

    /// Appends `rhs` at the innermost empty slot of the chain and returns
    /// the (re-)composed chain.
    #[inline]
    fn div(mut self, rhs: T) -> Pdu {
        self.append_inner(rhs.into());
        self
    }
}

impl<T: Into<Pdu>> core::ops::DivAssign<T> for Pdu {
    #[inline]
    fn div_assign(&mut self, rhs: T) {
        self.append_inner(rhs.into());
    }
}
