// SPDX-License-Identifier: MIT OR Apache-2.0

//! The process-wide next-protocol registry.
//!
//! Transport layers cannot always tell what protocol their payload bytes
//! carry from the header alone; the selector fields (ports, ethertype, IP
//! protocol number) identify it by convention. The registry maps an
//! `(upper layer kind, selector)` pair to an allocator able to materialize
//! the encapsulated PDU from the remaining bytes, letting host
//! applications wire protocols onto non-standard selectors at startup:
//!
//! ```
//! use pdus::layers::bth::Bth;
//! use pdus::layers::dispatch::{register_allocator, Selector};
//! use pdus::layers::traits::PduKind;
//! use pdus::layers::Pdu;
//!
//! // RoCEv2: a UDP datagram to port 4791 carries an Infiniband BTH.
//! register_allocator(PduKind::Udp, Selector::dst_port(4791), |bytes| {
//!     Bth::from_bytes(bytes).map(Pdu::from)
//! });
//! ```
//!
//! The registry is read-mostly: lookups take a shared lock on the hot
//! parse path, and installs are expected to happen during process startup.
//! Callers that install or remove entries while other threads are parsing
//! must serialize those writes themselves.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::error::ValidationError;
use crate::layers::traits::PduKind;
use crate::layers::Pdu;

/// The header field of the upper layer that a registration keys on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SelectorClass {
    SrcPort,
    DstPort,
    EtherType,
    IpProtocol,
}

/// A `(selector class, selector value)` pair identifying the encapsulated
/// protocol from an upper layer's header.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Selector {
    pub class: SelectorClass,
    pub value: u32,
}

impl Selector {
    #[inline]
    pub fn src_port(port: u16) -> Self {
        Selector {
            class: SelectorClass::SrcPort,
            value: u32::from(port),
        }
    }

    #[inline]
    pub fn dst_port(port: u16) -> Self {
        Selector {
            class: SelectorClass::DstPort,
            value: u32::from(port),
        }
    }

    #[inline]
    pub fn ether_type(ether_type: u16) -> Self {
        Selector {
            class: SelectorClass::EtherType,
            value: u32::from(ether_type),
        }
    }

    #[inline]
    pub fn ip_protocol(protocol: u8) -> Self {
        Selector {
            class: SelectorClass::IpProtocol,
            value: u32::from(protocol),
        }
    }
}

/// Builds the encapsulated PDU from the bytes remaining after the upper
/// layer's header.
pub type Allocator = fn(&[u8]) -> Result<Pdu, ValidationError>;

static ALLOCATORS: Lazy<RwLock<HashMap<(PduKind, Selector), Allocator>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Installs an allocator for the given upper layer and selector, replacing
/// any previous registration for the same pair.
pub fn register_allocator(upper: PduKind, selector: Selector, allocator: Allocator) {
    ALLOCATORS
        .write()
        .expect("next-protocol registry lock poisoned")
        .insert((upper, selector), allocator);
}

/// Removes a registration, returning whether one existed.
pub fn deregister_allocator(upper: PduKind, selector: Selector) -> bool {
    ALLOCATORS
        .write()
        .expect("next-protocol registry lock poisoned")
        .remove(&(upper, selector))
        .is_some()
}

/// Looks up an allocator for `(upper, selector)` and runs it over `bytes`.
/// Returns `None` when no registration matches.
pub(crate) fn allocate(
    upper: PduKind,
    selector: Selector,
    bytes: &[u8],
) -> Option<Result<Pdu, ValidationError>> {
    let allocator = *ALLOCATORS
        .read()
        .expect("next-protocol registry lock poisoned")
        .get(&(upper, selector))?;
    Some(allocator(bytes))
}
