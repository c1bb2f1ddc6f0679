// SPDX-License-Identifier: MIT OR Apache-2.0

//! The core trait implemented by every protocol layer, along with the
//! closed set of layer kinds and the metadata probe type.

use crate::layers::Pdu;

/// The closed enumeration of layer types understood by this library.
///
/// Every [`Pdu`] variant corresponds to exactly one kind; the kind tag is
/// what downcasting and the next-protocol registry key on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PduKind {
    Ethernet,
    Ipv4,
    Ipv6,
    Udp,
    Tcp,
    Dns,
    Bth,
    Raw,
}

/// The result of a static [`extract_metadata`] probe: enough information
/// for a scanner to decide whether to build the full layer, without
/// actually building it.
///
/// [`extract_metadata`]: crate::layers::tcp::Tcp::extract_metadata
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    /// The header size the buffer declares for this layer.
    pub header_size: usize,
    /// The kind of the probed layer.
    pub kind: PduKind,
    /// The kind of the encapsulated layer, when the probed header names
    /// one (e.g. the IPv4 protocol field); `None` when it cannot be known
    /// without more context.
    pub next_kind: Option<PduKind>,
}

/// One protocol layer of a packet.
///
/// A layer owns its header fields, its variable-length collections and at
/// most one inner PDU (the next encapsulated layer). Ownership forms a
/// tree: no cycles, no sharing. The parent is not stored; operations that
/// need it (checksum pseudo-headers) receive it as an argument at
/// serialization time.
pub trait Layer {
    /// The tag identifying this layer's type.
    fn kind(&self) -> PduKind;

    /// The number of bytes this layer contributes before its inner PDU.
    fn header_size(&self) -> usize;

    /// The number of bytes this layer contributes after its inner PDU
    /// (e.g. the 4-byte ICRC of a BTH).
    #[inline]
    fn trailer_size(&self) -> usize {
        0
    }

    /// The total wire size of this layer and everything it encapsulates.
    #[inline]
    fn size(&self) -> usize {
        self.header_size()
            + self.inner_pdu().map(|inner| inner.size()).unwrap_or(0)
            + self.trailer_size()
    }

    /// Whether construction from bytes detected a structural defect after
    /// the base header. Serializing a malformed layer is unspecified.
    #[inline]
    fn is_malformed(&self) -> bool {
        false
    }

    /// The encapsulated layer, if any.
    fn inner_pdu(&self) -> Option<&Pdu>;

    fn inner_pdu_mut(&mut self) -> Option<&mut Pdu>;

    /// Replaces the inner PDU, dropping any previous one.
    fn set_inner_pdu(&mut self, inner: Pdu);

    /// Detaches and returns the inner PDU.
    fn take_inner_pdu(&mut self) -> Option<Pdu>;

    /// Whether `response` looks like a reply to this layer (e.g. TCP
    /// checks that the ports are swapped, then delegates inward).
    #[inline]
    fn matches_response(&self, _response: &[u8]) -> bool {
        false
    }

    /// Writes this layer's own bytes into `buffer`, which spans the whole
    /// of `size()`. The inner PDU's bytes have already been written into
    /// the middle of the window when this is called, so checksum fields
    /// that cover the payload can be computed and patched here.
    fn write_serialization(&self, buffer: &mut [u8], parent: Option<&Pdu>);
}
