// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Infiniband Base Transport Header (BTH) layer, as carried over
//! RoCEv2 (a UDP datagram to port 4791).
//!
//! A BTH is a 12-byte base header, a set of optional extension headers
//! whose presence is a pure function of the opcode, an optional payload
//! and a 32-bit ICRC trailer. The extension headers always serialize in
//! one fixed order (RDETH, DETH, XRCETH, RETH, AETH, ATETH, ATAETH,
//! IMMDT, IETH) regardless of opcode; the protocol never combines two of
//! them in a way that would conflict with this linearization.

use bitflags::bitflags;

use crate::error::{FieldNotPresent, OutOfRangeError, ValidationError, ValidationErrorType};
use crate::layers::traits::*;
use crate::layers::{Pdu, Raw};
use crate::stream::{InputStream, OutputStream};
use crate::utils::U24;

const NAME: &str = "BTH";

/// The Infiniband transport opcodes.
///
/// Bits `[7:5]` select the transport type, bits `[4:0]` the message type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BthOpcode {
    // Reliable Connection (RC)
    RcSendFirst = 0x00,
    RcSendMiddle = 0x01,
    RcSendLast = 0x02,
    RcSendLastImm = 0x03,
    RcSendOnly = 0x04,
    RcSendOnlyImm = 0x05,
    RcRdmaWriteFirst = 0x06,
    RcRdmaWriteMiddle = 0x07,
    RcRdmaWriteLast = 0x08,
    RcRdmaWriteLastImm = 0x09,
    RcRdmaWriteOnly = 0x0A,
    RcRdmaWriteOnlyImm = 0x0B,
    RcRdmaReadRequest = 0x0C,
    RcRdmaReadResponseFirst = 0x0D,
    RcRdmaReadResponseMiddle = 0x0E,
    RcRdmaReadResponseLast = 0x0F,
    RcRdmaReadResponseOnly = 0x10,
    RcAcknowledge = 0x11,
    RcAtomicAcknowledge = 0x12,
    RcCmpSwap = 0x13,
    RcFetchAdd = 0x14,
    RcSendLastInval = 0x16,
    RcSendOnlyInval = 0x17,

    // Unreliable Connection (UC)
    UcSendFirst = 0x20,
    UcSendMiddle = 0x21,
    UcSendLast = 0x22,
    UcSendLastImm = 0x23,
    UcSendOnly = 0x24,
    UcSendOnlyImm = 0x25,
    UcRdmaWriteFirst = 0x26,
    UcRdmaWriteMiddle = 0x27,
    UcRdmaWriteLast = 0x28,
    UcRdmaWriteLastImm = 0x29,
    UcRdmaWriteOnly = 0x2A,
    UcRdmaWriteOnlyImm = 0x2B,

    // Reliable Datagram (RD)
    RdSendFirst = 0x40,
    RdSendMiddle = 0x41,
    RdSendLast = 0x42,
    RdSendLastImm = 0x43,
    RdSendOnly = 0x44,
    RdSendOnlyImm = 0x45,
    RdRdmaWriteFirst = 0x46,
    RdRdmaWriteMiddle = 0x47,
    RdRdmaWriteLast = 0x48,
    RdRdmaWriteLastImm = 0x49,
    RdRdmaWriteOnly = 0x4A,
    RdRdmaWriteOnlyImm = 0x4B,
    RdRdmaReadRequest = 0x4C,
    RdRdmaReadResponseFirst = 0x4D,
    RdRdmaReadResponseMiddle = 0x4E,
    RdRdmaReadResponseLast = 0x4F,
    RdRdmaReadResponseOnly = 0x50,
    RdAcknowledge = 0x51,
    RdAtomicAcknowledge = 0x52,
    RdCmpSwap = 0x53,
    RdFetchAdd = 0x54,
    RdResync = 0x55,

    // Unreliable Datagram (UD)
    UdSendOnly = 0x64,
    UdSendOnlyImm = 0x65,

    // Congestion notification
    Cnp = 0x80,

    // Extended Reliable Connection (XRC)
    XrcSendFirst = 0xA0,
    XrcSendMiddle = 0xA1,
    XrcSendLast = 0xA2,
    XrcSendLastImm = 0xA3,
    XrcSendOnly = 0xA4,
    XrcSendOnlyImm = 0xA5,
    XrcRdmaWriteFirst = 0xA6,
    XrcRdmaWriteMiddle = 0xA7,
    XrcRdmaWriteLast = 0xA8,
    XrcRdmaWriteLastImm = 0xA9,
    XrcRdmaWriteOnly = 0xAA,
    XrcRdmaWriteOnlyImm = 0xAB,
    XrcRdmaReadRequest = 0xAC,
    XrcRdmaReadResponseFirst = 0xAD,
    XrcRdmaReadResponseMiddle = 0xAE,
    XrcRdmaReadResponseLast = 0xAF,
    XrcRdmaReadResponseOnly = 0xB0,
    XrcAcknowledge = 0xB1,
    XrcAtomicAcknowledge = 0xB2,
    XrcCmpSwap = 0xB3,
    XrcFetchAdd = 0xB4,
    XrcSendLastInval = 0xB6,
    XrcSendOnlyInval = 0xB7,
}

impl From<BthOpcode> for u8 {
    #[inline]
    fn from(opcode: BthOpcode) -> u8 {
        opcode as u8
    }
}

bitflags! {
    /// The possible contents of a BTH packet past its base header: the
    /// nine extension headers plus a payload.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ExtensionSet: u16 {
        const RDETH = 1 << 0;
        const DETH = 1 << 1;
        const RETH = 1 << 2;
        const ATETH = 1 << 3;
        const AETH = 1 << 4;
        const ATAETH = 1 << 5;
        const IMMDT = 1 << 6;
        const IETH = 1 << 7;
        const XRCETH = 1 << 8;
        const PAYLOAD = 1 << 9;
    }
}

const RDETH_SIZE: usize = 4;
const DETH_SIZE: usize = 8;
const RETH_SIZE: usize = 16;
const ATETH_SIZE: usize = 28;
const AETH_SIZE: usize = 4;
const ATAETH_SIZE: usize = 8;
const IMMDT_SIZE: usize = 4;
const IETH_SIZE: usize = 4;
const XRCETH_SIZE: usize = 4;

/// The packet contents implied by an opcode byte. Opcodes outside the
/// defined set map to the empty set.
pub fn packet_contents(opcode: u8) -> ExtensionSet {
    use BthOpcode::*;
    use ExtensionSet as E;

    let Some(opcode) = opcode_from_u8(opcode) else {
        return E::empty();
    };
    match opcode {
        RcSendFirst | RcSendMiddle | RcSendLast | RcSendOnly | RcRdmaWriteMiddle
        | RcRdmaWriteLast => E::PAYLOAD,
        RcSendLastImm | RcSendOnlyImm | RcRdmaWriteLastImm => E::IMMDT.union(E::PAYLOAD),
        RcRdmaWriteFirst | RcRdmaWriteOnly => E::RETH.union(E::PAYLOAD),
        RcRdmaWriteOnlyImm => E::RETH.union(E::IMMDT).union(E::PAYLOAD),
        RcRdmaReadRequest => E::RETH,
        RcRdmaReadResponseFirst | RcRdmaReadResponseLast | RcRdmaReadResponseOnly => {
            E::AETH.union(E::PAYLOAD)
        }
        RcRdmaReadResponseMiddle => E::PAYLOAD,
        RcAcknowledge => E::AETH,
        RcAtomicAcknowledge => E::AETH.union(E::ATAETH),
        RcCmpSwap | RcFetchAdd => E::ATETH,
        RcSendLastInval | RcSendOnlyInval => E::IETH.union(E::PAYLOAD),

        UcSendFirst | UcSendMiddle | UcSendLast | UcSendOnly | UcRdmaWriteMiddle
        | UcRdmaWriteLast => E::PAYLOAD,
        UcSendLastImm | UcSendOnlyImm | UcRdmaWriteLastImm => E::IMMDT.union(E::PAYLOAD),
        UcRdmaWriteFirst | UcRdmaWriteOnly => E::RETH.union(E::PAYLOAD),
        UcRdmaWriteOnlyImm => E::RETH.union(E::IMMDT).union(E::PAYLOAD),

        RdSendFirst | RdSendMiddle | RdSendLast | RdSendOnly | RdRdmaWriteMiddle
        | RdRdmaWriteLast => E::RDETH.union(E::DETH).union(E::PAYLOAD),
        RdSendLastImm | RdSendOnlyImm | RdRdmaWriteLastImm => {
            E::RDETH.union(E::DETH).union(E::IMMDT).union(E::PAYLOAD)
        }
        RdRdmaWriteFirst | RdRdmaWriteOnly => {
            E::RDETH.union(E::DETH).union(E::RETH).union(E::PAYLOAD)
        }
        RdRdmaWriteOnlyImm => E::RDETH
            .union(E::DETH)
            .union(E::RETH)
            .union(E::IMMDT)
            .union(E::PAYLOAD),
        RdRdmaReadRequest => E::RDETH.union(E::DETH).union(E::RETH),
        RdRdmaReadResponseFirst | RdRdmaReadResponseLast | RdRdmaReadResponseOnly => {
            E::RDETH.union(E::AETH).union(E::PAYLOAD)
        }
        RdRdmaReadResponseMiddle => E::RDETH.union(E::PAYLOAD),
        RdAcknowledge => E::RDETH.union(E::AETH),
        RdAtomicAcknowledge => E::RDETH.union(E::AETH).union(E::ATAETH),
        RdCmpSwap | RdFetchAdd => E::RDETH.union(E::DETH).union(E::ATETH),
        RdResync => E::RDETH.union(E::DETH),

        UdSendOnly => E::DETH.union(E::PAYLOAD),
        UdSendOnlyImm => E::DETH.union(E::IMMDT).union(E::PAYLOAD),

        Cnp => E::empty(),

        XrcSendFirst | XrcSendMiddle | XrcSendLast | XrcSendOnly | XrcRdmaWriteMiddle
        | XrcRdmaWriteLast => E::XRCETH.union(E::PAYLOAD),
        XrcSendLastImm | XrcSendOnlyImm | XrcRdmaWriteLastImm => {
            E::XRCETH.union(E::IMMDT).union(E::PAYLOAD)
        }
        XrcRdmaWriteFirst | XrcRdmaWriteOnly => E::XRCETH.union(E::RETH).union(E::PAYLOAD),
        XrcRdmaWriteOnlyImm => E::XRCETH.union(E::RETH).union(E::IMMDT).union(E::PAYLOAD),
        XrcRdmaReadRequest => E::XRCETH.union(E::RETH),
        XrcRdmaReadResponseFirst | XrcRdmaReadResponseLast | XrcRdmaReadResponseOnly => {
            E::AETH.union(E::PAYLOAD)
        }
        XrcRdmaReadResponseMiddle => E::PAYLOAD,
        XrcAcknowledge => E::AETH,
        XrcAtomicAcknowledge => E::AETH.union(E::ATAETH),
        XrcCmpSwap | XrcFetchAdd => E::XRCETH.union(E::ATETH),
        XrcSendLastInval | XrcSendOnlyInval => E::XRCETH.union(E::IETH).union(E::PAYLOAD),
    }
}

fn opcode_from_u8(value: u8) -> Option<BthOpcode> {
    use BthOpcode::*;
    Some(match value {
        0x00 => RcSendFirst,
        0x01 => RcSendMiddle,
        0x02 => RcSendLast,
        0x03 => RcSendLastImm,
        0x04 => RcSendOnly,
        0x05 => RcSendOnlyImm,
        0x06 => RcRdmaWriteFirst,
        0x07 => RcRdmaWriteMiddle,
        0x08 => RcRdmaWriteLast,
        0x09 => RcRdmaWriteLastImm,
        0x0A => RcRdmaWriteOnly,
        0x0B => RcRdmaWriteOnlyImm,
        0x0C => RcRdmaReadRequest,
        0x0D => RcRdmaReadResponseFirst,
        0x0E => RcRdmaReadResponseMiddle,
        0x0F => RcRdmaReadResponseLast,
        0x10 => RcRdmaReadResponseOnly,
        0x11 => RcAcknowledge,
        0x12 => RcAtomicAcknowledge,
        0x13 => RcCmpSwap,
        0x14 => RcFetchAdd,
        0x16 => RcSendLastInval,
        0x17 => RcSendOnlyInval,
        0x20 => UcSendFirst,
        0x21 => UcSendMiddle,
        0x22 => UcSendLast,
        0x23 => UcSendLastImm,
        0x24 => UcSendOnly,
        0x25 => UcSendOnlyImm,
        0x26 => UcRdmaWriteFirst,
        0x27 => UcRdmaWriteMiddle,
        0x28 => UcRdmaWriteLast,
        0x29 => UcRdmaWriteLastImm,
        0x2A => UcRdmaWriteOnly,
        0x2B => UcRdmaWriteOnlyImm,
        0x40 => RdSendFirst,
        0x41 => RdSendMiddle,
        0x42 => RdSendLast,
        0x43 => RdSendLastImm,
        0x44 => RdSendOnly,
        0x45 => RdSendOnlyImm,
        0x46 => RdRdmaWriteFirst,
        0x47 => RdRdmaWriteMiddle,
        0x48 => RdRdmaWriteLast,
        0x49 => RdRdmaWriteLastImm,
        0x4A => RdRdmaWriteOnly,
        0x4B => RdRdmaWriteOnlyImm,
        0x4C => RdRdmaReadRequest,
        0x4D => RdRdmaReadResponseFirst,
        0x4E => RdRdmaReadResponseMiddle,
        0x4F => RdRdmaReadResponseLast,
        0x50 => RdRdmaReadResponseOnly,
        0x51 => RdAcknowledge,
        0x52 => RdAtomicAcknowledge,
        0x53 => RdCmpSwap,
        0x54 => RdFetchAdd,
        0x55 => RdResync,
        0x64 => UdSendOnly,
        0x65 => UdSendOnlyImm,
        0x80 => Cnp,
        0xA0 => XrcSendFirst,
        0xA1 => XrcSendMiddle,
        0xA2 => XrcSendLast,
        0xA3 => XrcSendLastImm,
        0xA4 => XrcSendOnly,
        0xA5 => XrcSendOnlyImm,
        0xA6 => XrcRdmaWriteFirst,
        0xA7 => XrcRdmaWriteMiddle,
        0xA8 => XrcRdmaWriteLast,
        0xA9 => XrcRdmaWriteLastImm,
        0xAA => XrcRdmaWriteOnly,
        0xAB => XrcRdmaWriteOnlyImm,
        0xAC => XrcRdmaReadRequest,
        0xAD => XrcRdmaReadResponseFirst,
        0xAE => XrcRdmaReadResponseMiddle,
        0xAF => XrcRdmaReadResponseLast,
        0xB0 => XrcRdmaReadResponseOnly,
        0xB1 => XrcAcknowledge,
        0xB2 => XrcAtomicAcknowledge,
        0xB3 => XrcCmpSwap,
        0xB4 => XrcFetchAdd,
        0xB6 => XrcSendLastInval,
        0xB7 => XrcSendOnlyInval,
        _ => return None,
    })
}

impl TryFrom<u8> for BthOpcode {
    type Error = ();

    #[inline]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        opcode_from_u8(value).ok_or(())
    }
}

fn header_size_from_contents(contents: ExtensionSet) -> usize {
    let mut sum = 12;
    if contents.contains(ExtensionSet::RDETH) {
        sum += RDETH_SIZE;
    }
    if contents.contains(ExtensionSet::DETH) {
        sum += DETH_SIZE;
    }
    if contents.contains(ExtensionSet::RETH) {
        sum += RETH_SIZE;
    }
    if contents.contains(ExtensionSet::ATETH) {
        sum += ATETH_SIZE;
    }
    if contents.contains(ExtensionSet::AETH) {
        sum += AETH_SIZE;
    }
    if contents.contains(ExtensionSet::ATAETH) {
        sum += ATAETH_SIZE;
    }
    if contents.contains(ExtensionSet::IMMDT) {
        sum += IMMDT_SIZE;
    }
    if contents.contains(ExtensionSet::IETH) {
        sum += IETH_SIZE;
    }
    if contents.contains(ExtensionSet::XRCETH) {
        sum += XRCETH_SIZE;
    }
    sum
}

// Reliable Datagram Extended Transport Header
#[derive(Copy, Clone, Debug, Default)]
struct RdEth {
    reserved: u8,
    ee: [u8; 3],
}

// Datagram Extended Transport Header
#[derive(Copy, Clone, Debug, Default)]
struct DEth {
    q_key: u32,
    reserved: u8,
    srcqp: [u8; 3],
}

// RDMA Extended Transport Header
#[derive(Copy, Clone, Debug, Default)]
struct REth {
    va: u64,
    r_key: u32,
    dmalen: u32,
}

// Atomic Extended Transport Header
#[derive(Copy, Clone, Debug, Default)]
struct AtEth {
    va: u64,
    r_key: u32,
    swapdt: u64,
    cmpdt: u64,
}

// Acknowledge Extended Transport Header
#[derive(Copy, Clone, Debug, Default)]
struct AEth {
    syndrome: u8,
    msn: [u8; 3],
}

// Atomic Acknowledge Extended Transport Header
#[derive(Copy, Clone, Debug, Default)]
struct AtAEth {
    origremdt: u64,
}

// Immediate Extended Transport Header
#[derive(Copy, Clone, Debug, Default)]
struct ImmDt {
    immdt: u32,
}

// Invalidate Extended Transport Header
#[derive(Copy, Clone, Debug, Default)]
struct IEth {
    r_key: u32,
}

// XRC Extended Transport Header
#[derive(Copy, Clone, Debug, Default)]
struct XrcEth {
    reserved: u8,
    xrcsrq: [u8; 3],
}

/// An Infiniband Base Transport Header PDU, extension headers included.
///
/// The set of extension headers present is always consistent with the
/// current opcode; changing the opcode re-derives it. Accessors for
/// fields of an absent extension return [`FieldNotPresent`].
#[derive(Clone, Debug)]
pub struct Bth {
    opcode: u8,
    // Byte 1 of the base header: SE, M, PadCnt and TVer, kept packed.
    se_m_pad_tver: u8,
    p_key: u16,
    // Byte 4: FECN and BECN in the top two bits, six reserved bits that
    // round-trip as captured.
    fecn_becn: u8,
    destqp: [u8; 3],
    // Byte 8: the ack-request bit and seven reserved bits.
    ack_req: u8,
    psn: [u8; 3],

    rdeth: RdEth,
    deth: DEth,
    reth: REth,
    ateth: AtEth,
    aeth: AEth,
    ataeth: AtAEth,
    immdt: ImmDt,
    ieth: IEth,
    xrceth: XrcEth,

    contents: ExtensionSet,
    icrc: u32,
    malformed: bool,
    inner: Option<Box<Pdu>>,
}

impl Default for Bth {
    fn default() -> Self {
        Bth::new()
    }
}

macro_rules! ext_field {
    ($self:ident, $flag:ident, $field:expr) => {
        if $self.contents.contains(ExtensionSet::$flag) {
            Ok($field)
        } else {
            Err(FieldNotPresent {
                layer: NAME,
                field: stringify!($flag),
            })
        }
    };
}

impl Bth {
    /// A BTH with the `RC_SEND_ONLY` opcode, which carries no extension
    /// headers.
    pub fn new() -> Self {
        Bth::with_opcode(BthOpcode::RcSendOnly)
    }

    pub fn with_opcode(opcode: BthOpcode) -> Self {
        let opcode = opcode as u8;
        Bth {
            opcode,
            se_m_pad_tver: 0,
            p_key: 0,
            fecn_becn: 0,
            destqp: [0; 3],
            ack_req: 0,
            psn: [0; 3],
            rdeth: RdEth::default(),
            deth: DEth::default(),
            reth: REth::default(),
            ateth: AtEth::default(),
            aeth: AEth::default(),
            ataeth: AtAEth::default(),
            immdt: ImmDt::default(),
            ieth: IEth::default(),
            xrceth: XrcEth::default(),
            contents: packet_contents(opcode),
            icrc: 0,
            malformed: false,
            inner: None,
        }
    }

    /// Probes the first bytes of a buffer without building the PDU.
    ///
    /// Fails when the base header, or the extension headers the opcode
    /// implies, do not fit.
    pub fn extract_metadata(bytes: &[u8]) -> Result<Metadata, ValidationError> {
        let opcode = *bytes.first().ok_or(ValidationError {
            layer: NAME,
            err_type: ValidationErrorType::InsufficientBytes,
            reason: "buffer too short for a BTH base header",
        })?;
        if bytes.len() < 12 {
            return Err(ValidationError {
                layer: NAME,
                err_type: ValidationErrorType::InsufficientBytes,
                reason: "buffer too short for a BTH base header",
            });
        }
        let header_size = header_size_from_contents(packet_contents(opcode));
        if bytes.len() < header_size {
            return Err(ValidationError {
                layer: NAME,
                err_type: ValidationErrorType::InsufficientBytes,
                reason: "buffer too short for the extension headers the opcode implies",
            });
        }
        Ok(Metadata {
            header_size,
            kind: PduKind::Bth,
            next_kind: None,
        })
    }

    /// Builds a BTH from `bytes`.
    ///
    /// The payload (when the opcode allows one) spans whatever remains
    /// between the extension headers and the ICRC; its size must be a
    /// multiple of four, and the PadCnt trailing bytes of it are skipped
    /// rather than stored. Size defects past the base header set the
    /// malformed flag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut stream = InputStream::new(NAME, bytes);
        let short = "buffer too short for a BTH base header";
        let opcode = stream.read_u8(short)?;
        let se_m_pad_tver = stream.read_u8(short)?;
        let p_key = stream.read_u16(short)?;
        let fecn_becn = stream.read_u8(short)?;
        let destqp = stream.read_array(short)?;
        let ack_req = stream.read_u8(short)?;
        let psn = stream.read_array(short)?;

        let mut bth = Bth {
            opcode,
            se_m_pad_tver,
            p_key,
            fecn_becn,
            destqp,
            ack_req,
            psn,
            contents: packet_contents(opcode),
            ..Bth::new()
        };

        // The buffer must hold every implied header plus the ICRC, and
        // must hold nothing more when the opcode forbids a payload.
        let expected = bth.header_size() + bth.trailer_size();
        if bytes.len() < expected || (!bth.has_payload() && bytes.len() > expected) {
            bth.malformed = true;
            return Ok(bth);
        }

        let ext = "buffer too short for an implied extension header";
        if bth.contents.contains(ExtensionSet::RDETH) {
            bth.rdeth.reserved = stream.read_u8(ext)?;
            bth.rdeth.ee = stream.read_array(ext)?;
        }
        if bth.contents.contains(ExtensionSet::DETH) {
            bth.deth.q_key = stream.read_u32(ext)?;
            bth.deth.reserved = stream.read_u8(ext)?;
            bth.deth.srcqp = stream.read_array(ext)?;
        }
        if bth.contents.contains(ExtensionSet::XRCETH) {
            bth.xrceth.reserved = stream.read_u8(ext)?;
            bth.xrceth.xrcsrq = stream.read_array(ext)?;
        }
        if bth.contents.contains(ExtensionSet::RETH) {
            bth.reth.va = stream.read_u64(ext)?;
            bth.reth.r_key = stream.read_u32(ext)?;
            bth.reth.dmalen = stream.read_u32(ext)?;
        }
        if bth.contents.contains(ExtensionSet::AETH) {
            bth.aeth.syndrome = stream.read_u8(ext)?;
            bth.aeth.msn = stream.read_array(ext)?;
        }
        if bth.contents.contains(ExtensionSet::ATETH) {
            bth.ateth.va = stream.read_u64(ext)?;
            bth.ateth.r_key = stream.read_u32(ext)?;
            bth.ateth.swapdt = stream.read_u64(ext)?;
            bth.ateth.cmpdt = stream.read_u64(ext)?;
        }
        if bth.contents.contains(ExtensionSet::ATAETH) {
            bth.ataeth.origremdt = stream.read_u64(ext)?;
        }
        if bth.contents.contains(ExtensionSet::IMMDT) {
            bth.immdt.immdt = stream.read_u32(ext)?;
        }
        if bth.contents.contains(ExtensionSet::IETH) {
            bth.ieth.r_key = stream.read_u32(ext)?;
        }

        let payload_size = stream.remaining() - bth.trailer_size();
        if payload_size % 4 != 0 {
            bth.malformed = true;
            return Ok(bth);
        }
        if payload_size > 0 {
            // The pad bytes are skipped over but not part of the payload.
            let payload = stream
                .read_slice(payload_size, "buffer too short for the BTH payload")?;
            let data_len = payload_size - usize::from(bth.padcnt());
            bth.inner = Some(Box::new(Pdu::from(Raw::from_bytes(&payload[..data_len]))));
        }

        bth.icrc = stream.read_u32("buffer too short for the BTH ICRC")?;
        Ok(bth)
    }

    /// The operation code byte.
    #[inline]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Sets the opcode and re-derives the extension-header presence set
    /// from it.
    pub fn set_opcode(&mut self, opcode: impl Into<u8>) {
        self.opcode = opcode.into();
        self.contents = packet_contents(self.opcode);
    }

    /// The packet contents implied by the current opcode.
    #[inline]
    pub fn contents(&self) -> ExtensionSet {
        self.contents
    }

    /// The solicited-event bit.
    #[inline]
    pub fn se(&self) -> bool {
        self.se_m_pad_tver & 0x80 > 0
    }

    #[inline]
    pub fn set_se(&mut self, se: bool) {
        if se {
            self.se_m_pad_tver |= 0x80;
        } else {
            self.se_m_pad_tver &= !0x80;
        }
    }

    /// The migration-request bit.
    #[inline]
    pub fn m(&self) -> bool {
        self.se_m_pad_tver & 0x40 > 0
    }

    #[inline]
    pub fn set_m(&mut self, m: bool) {
        if m {
            self.se_m_pad_tver |= 0x40;
        } else {
            self.se_m_pad_tver &= !0x40;
        }
    }

    /// The pad count: how many trailing payload bytes are padding.
    #[inline]
    pub fn padcnt(&self) -> u8 {
        (self.se_m_pad_tver >> 4) & 0x03
    }

    pub fn set_padcnt(&mut self, padcnt: u8) -> Result<(), OutOfRangeError> {
        if padcnt > 0x03 {
            return Err(OutOfRangeError { field: "PadCnt", max: 0x03 });
        }
        self.se_m_pad_tver = (self.se_m_pad_tver & !0x30) | (padcnt << 4);
        Ok(())
    }

    /// The transport header version.
    #[inline]
    pub fn tver(&self) -> u8 {
        self.se_m_pad_tver & 0x0F
    }

    pub fn set_tver(&mut self, tver: u8) -> Result<(), OutOfRangeError> {
        if tver > 0x0F {
            return Err(OutOfRangeError { field: "TVer", max: 0x0F });
        }
        self.se_m_pad_tver = (self.se_m_pad_tver & !0x0F) | tver;
        Ok(())
    }

    /// The partition key.
    #[inline]
    pub fn p_key(&self) -> u16 {
        self.p_key
    }

    #[inline]
    pub fn set_p_key(&mut self, p_key: u16) {
        self.p_key = p_key;
    }

    /// The forward explicit-congestion-notification bit.
    #[inline]
    pub fn f(&self) -> bool {
        self.fecn_becn & 0x80 > 0
    }

    #[inline]
    pub fn set_f(&mut self, f: bool) {
        if f {
            self.fecn_becn |= 0x80;
        } else {
            self.fecn_becn &= !0x80;
        }
    }

    /// The backward explicit-congestion-notification bit.
    #[inline]
    pub fn b(&self) -> bool {
        self.fecn_becn & 0x40 > 0
    }

    #[inline]
    pub fn set_b(&mut self, b: bool) {
        if b {
            self.fecn_becn |= 0x40;
        } else {
            self.fecn_becn &= !0x40;
        }
    }

    /// The destination queue pair.
    #[inline]
    pub fn destqp(&self) -> u32 {
        U24::from_be_bytes(self.destqp).value()
    }

    #[inline]
    pub fn set_destqp(&mut self, destqp: U24) {
        self.destqp = destqp.to_be_bytes();
    }

    /// The acknowledge-request bit.
    #[inline]
    pub fn a(&self) -> bool {
        self.ack_req & 0x80 > 0
    }

    #[inline]
    pub fn set_a(&mut self, a: bool) {
        if a {
            self.ack_req |= 0x80;
        } else {
            self.ack_req &= !0x80;
        }
    }

    /// The packet sequence number.
    #[inline]
    pub fn psn(&self) -> u32 {
        U24::from_be_bytes(self.psn).value()
    }

    #[inline]
    pub fn set_psn(&mut self, psn: U24) {
        self.psn = psn.to_be_bytes();
    }

    /// The invariant CRC trailer value.
    #[inline]
    pub fn icrc(&self) -> u32 {
        self.icrc
    }

    #[inline]
    pub fn set_icrc(&mut self, icrc: u32) {
        self.icrc = icrc;
    }

    #[inline]
    pub fn has_rdeth(&self) -> bool {
        self.contents.contains(ExtensionSet::RDETH)
    }

    #[inline]
    pub fn has_deth(&self) -> bool {
        self.contents.contains(ExtensionSet::DETH)
    }

    #[inline]
    pub fn has_reth(&self) -> bool {
        self.contents.contains(ExtensionSet::RETH)
    }

    #[inline]
    pub fn has_ateth(&self) -> bool {
        self.contents.contains(ExtensionSet::ATETH)
    }

    #[inline]
    pub fn has_aeth(&self) -> bool {
        self.contents.contains(ExtensionSet::AETH)
    }

    #[inline]
    pub fn has_ataeth(&self) -> bool {
        self.contents.contains(ExtensionSet::ATAETH)
    }

    #[inline]
    pub fn has_immdt(&self) -> bool {
        self.contents.contains(ExtensionSet::IMMDT)
    }

    #[inline]
    pub fn has_ieth(&self) -> bool {
        self.contents.contains(ExtensionSet::IETH)
    }

    #[inline]
    pub fn has_xrceth(&self) -> bool {
        self.contents.contains(ExtensionSet::XRCETH)
    }

    #[inline]
    pub fn has_payload(&self) -> bool {
        self.contents.contains(ExtensionSet::PAYLOAD)
    }

    /// The end-to-end context of the RDETH.
    pub fn ee(&self) -> Result<u32, FieldNotPresent> {
        ext_field!(self, RDETH, U24::from_be_bytes(self.rdeth.ee).value())
    }

    pub fn set_ee(&mut self, ee: U24) -> Result<(), FieldNotPresent> {
        ext_field!(self, RDETH, ())?;
        self.rdeth.ee = ee.to_be_bytes();
        Ok(())
    }

    /// The queue key of the DETH.
    pub fn q_key(&self) -> Result<u32, FieldNotPresent> {
        ext_field!(self, DETH, self.deth.q_key)
    }

    pub fn set_q_key(&mut self, q_key: u32) -> Result<(), FieldNotPresent> {
        ext_field!(self, DETH, ())?;
        self.deth.q_key = q_key;
        Ok(())
    }

    /// The source queue pair of the DETH.
    pub fn srcqp(&self) -> Result<u32, FieldNotPresent> {
        ext_field!(self, DETH, U24::from_be_bytes(self.deth.srcqp).value())
    }

    pub fn set_srcqp(&mut self, srcqp: U24) -> Result<(), FieldNotPresent> {
        ext_field!(self, DETH, ())?;
        self.deth.srcqp = srcqp.to_be_bytes();
        Ok(())
    }

    /// The virtual address. RETH and ATETH both carry a 64-bit VA and are
    /// mutually exclusive, so one accessor serves both.
    pub fn va(&self) -> Result<u64, FieldNotPresent> {
        if self.has_reth() {
            Ok(self.reth.va)
        } else if self.has_ateth() {
            Ok(self.ateth.va)
        } else {
            Err(FieldNotPresent { layer: NAME, field: "VA" })
        }
    }

    pub fn set_va(&mut self, va: u64) -> Result<(), FieldNotPresent> {
        if self.has_reth() {
            self.reth.va = va;
            Ok(())
        } else if self.has_ateth() {
            self.ateth.va = va;
            Ok(())
        } else {
            Err(FieldNotPresent { layer: NAME, field: "VA" })
        }
    }

    /// The remote key. RETH, ATETH and IETH all carry a 32-bit R_Key and
    /// are mutually exclusive, so one accessor serves all three.
    pub fn r_key(&self) -> Result<u32, FieldNotPresent> {
        if self.has_reth() {
            Ok(self.reth.r_key)
        } else if self.has_ateth() {
            Ok(self.ateth.r_key)
        } else if self.has_ieth() {
            Ok(self.ieth.r_key)
        } else {
            Err(FieldNotPresent { layer: NAME, field: "R_Key" })
        }
    }

    pub fn set_r_key(&mut self, r_key: u32) -> Result<(), FieldNotPresent> {
        if self.has_reth() {
            self.reth.r_key = r_key;
            Ok(())
        } else if self.has_ateth() {
            self.ateth.r_key = r_key;
            Ok(())
        } else if self.has_ieth() {
            self.ieth.r_key = r_key;
            Ok(())
        } else {
            Err(FieldNotPresent { layer: NAME, field: "R_Key" })
        }
    }

    /// The DMA length of the RETH.
    pub fn dmalen(&self) -> Result<u32, FieldNotPresent> {
        ext_field!(self, RETH, self.reth.dmalen)
    }

    pub fn set_dmalen(&mut self, dmalen: u32) -> Result<(), FieldNotPresent> {
        ext_field!(self, RETH, ())?;
        self.reth.dmalen = dmalen;
        Ok(())
    }

    /// The swap-or-add data of the ATETH.
    pub fn swapdt(&self) -> Result<u64, FieldNotPresent> {
        ext_field!(self, ATETH, self.ateth.swapdt)
    }

    pub fn set_swapdt(&mut self, swapdt: u64) -> Result<(), FieldNotPresent> {
        ext_field!(self, ATETH, ())?;
        self.ateth.swapdt = swapdt;
        Ok(())
    }

    /// The compare data of the ATETH.
    pub fn cmpdt(&self) -> Result<u64, FieldNotPresent> {
        ext_field!(self, ATETH, self.ateth.cmpdt)
    }

    pub fn set_cmpdt(&mut self, cmpdt: u64) -> Result<(), FieldNotPresent> {
        ext_field!(self, ATETH, ())?;
        self.ateth.cmpdt = cmpdt;
        Ok(())
    }

    /// The syndrome of the AETH.
    pub fn syndrome(&self) -> Result<u8, FieldNotPresent> {
        ext_field!(self, AETH, self.aeth.syndrome)
    }

    pub fn set_syndrome(&mut self, syndrome: u8) -> Result<(), FieldNotPresent> {
        ext_field!(self, AETH, ())?;
        self.aeth.syndrome = syndrome;
        Ok(())
    }

    /// The message sequence number of the AETH.
    pub fn msn(&self) -> Result<u32, FieldNotPresent> {
        ext_field!(self, AETH, U24::from_be_bytes(self.aeth.msn).value())
    }

    pub fn set_msn(&mut self, msn: U24) -> Result<(), FieldNotPresent> {
        ext_field!(self, AETH, ())?;
        self.aeth.msn = msn.to_be_bytes();
        Ok(())
    }

    /// The original remote data of the ATAETH.
    pub fn origremdt(&self) -> Result<u64, FieldNotPresent> {
        ext_field!(self, ATAETH, self.ataeth.origremdt)
    }

    pub fn set_origremdt(&mut self, origremdt: u64) -> Result<(), FieldNotPresent> {
        ext_field!(self, ATAETH, ())?;
        self.ataeth.origremdt = origremdt;
        Ok(())
    }

    /// The immediate data of the IMMDT.
    pub fn immdt(&self) -> Result<u32, FieldNotPresent> {
        ext_field!(self, IMMDT, self.immdt.immdt)
    }

    pub fn set_immdt(&mut self, immdt: u32) -> Result<(), FieldNotPresent> {
        ext_field!(self, IMMDT, ())?;
        self.immdt.immdt = immdt;
        Ok(())
    }

    /// The shared receive queue of the XRCETH.
    pub fn xrcsrq(&self) -> Result<u32, FieldNotPresent> {
        ext_field!(self, XRCETH, U24::from_be_bytes(self.xrceth.xrcsrq).value())
    }

    pub fn set_xrcsrq(&mut self, xrcsrq: U24) -> Result<(), FieldNotPresent> {
        ext_field!(self, XRCETH, ())?;
        self.xrceth.xrcsrq = xrcsrq.to_be_bytes();
        Ok(())
    }
}

impl Layer for Bth {
    #[inline]
    fn kind(&self) -> PduKind {
        PduKind::Bth
    }

    fn header_size(&self) -> usize {
        header_size_from_contents(self.contents)
    }

    /// The 32-bit ICRC always follows the payload or last extension
    /// header.
    #[inline]
    fn trailer_size(&self) -> usize {
        4
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

    fn write_serialization(&self, buffer: &mut [u8], _parent: Option<&Pdu>) {
        let mut stream = OutputStream::new(buffer);
        stream.write_u8(self.opcode);
        stream.write_u8(self.se_m_pad_tver);
        stream.write_u16(self.p_key);
        stream.write_u8(self.fecn_becn);
        stream.write_slice(&self.destqp);
        stream.write_u8(self.ack_req);
        stream.write_slice(&self.psn);

        if self.has_rdeth() {
            stream.write_u8(self.rdeth.reserved);
            stream.write_slice(&self.rdeth.ee);
        }
        if self.has_deth() {
            stream.write_u32(self.deth.q_key);
            stream.write_u8(self.deth.reserved);
            stream.write_slice(&self.deth.srcqp);
        }
        if self.has_xrceth() {
            stream.write_u8(self.xrceth.reserved);
            stream.write_slice(&self.xrceth.xrcsrq);
        }
        if self.has_reth() {
            stream.write_u64(self.reth.va);
            stream.write_u32(self.reth.r_key);
            stream.write_u32(self.reth.dmalen);
        }
        if self.has_aeth() {
            stream.write_u8(self.aeth.syndrome);
            stream.write_slice(&self.aeth.msn);
        }
        if self.has_ateth() {
            stream.write_u64(self.ateth.va);
            stream.write_u32(self.ateth.r_key);
            stream.write_u64(self.ateth.swapdt);
            stream.write_u64(self.ateth.cmpdt);
        }
        if self.has_ataeth() {
            stream.write_u64(self.ataeth.origremdt);
        }
        if self.has_immdt() {
            stream.write_u32(self.immdt.immdt);
        }
        if self.has_ieth() {
            stream.write_u32(self.ieth.r_key);
        }

        if let Some(inner) = self.inner.as_deref() {
            stream.skip(inner.size());
        }
        stream.write_u32(self.icrc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_extensions() {
        let bth = Bth::new();
        assert_eq!(bth.opcode(), BthOpcode::RcSendOnly as u8);
        assert!(!bth.se());
        assert!(!bth.m());
        assert_eq!(bth.padcnt(), 0);
        assert_eq!(bth.tver(), 0);
        assert_eq!(bth.p_key(), 0);
        assert!(!bth.f());
        assert!(!bth.b());
        assert_eq!(bth.destqp(), 0);
        assert!(!bth.a());
        assert_eq!(bth.psn(), 0);
        assert_eq!(bth.icrc(), 0);
        assert!(!bth.has_aeth());
        assert!(bth.has_payload());
        assert_eq!(bth.header_size(), 12);
        assert_eq!(bth.trailer_size(), 4);
    }

    #[test]
    fn acknowledge_carries_aeth() {
        let bth = Bth::with_opcode(BthOpcode::RcAcknowledge);
        assert_eq!(bth.opcode(), BthOpcode::RcAcknowledge as u8);
        assert!(bth.has_aeth());
        assert!(!bth.has_rdeth());
        assert!(!bth.has_deth());
        assert!(!bth.has_reth());
        assert!(!bth.has_ateth());
        assert!(!bth.has_ataeth());
        assert!(!bth.has_immdt());
        assert!(!bth.has_ieth());
        assert!(!bth.has_xrceth());
        assert!(!bth.has_payload());
        assert_eq!(bth.header_size(), 16);
        assert_eq!(bth.syndrome().unwrap(), 0);
        assert_eq!(bth.msn().unwrap(), 0);
    }

    #[test]
    fn opcode_mutation_rederives_contents() {
        let mut bth = Bth::new();
        bth.set_opcode(BthOpcode::RcAtomicAcknowledge);
        assert!(bth.has_aeth());
        assert!(bth.has_ataeth());
        assert!(!bth.has_payload());
        assert_eq!(bth.header_size(), 12 + 4 + 8);

        bth.set_opcode(BthOpcode::RdRdmaWriteOnlyImm);
        assert_eq!(bth.contents(),
            ExtensionSet::RDETH
                | ExtensionSet::DETH
                | ExtensionSet::RETH
                | ExtensionSet::IMMDT
                | ExtensionSet::PAYLOAD);
        assert_eq!(bth.header_size(), 12 + 4 + 8 + 16 + 4);

        bth.set_opcode(BthOpcode::XrcCmpSwap);
        assert_eq!(bth.header_size(), 12 + 4 + 28);

        // Unknown opcodes imply no extensions and no payload.
        bth.set_opcode(0x15u8);
        assert_eq!(bth.contents(), ExtensionSet::empty());
        assert_eq!(bth.header_size(), 12);
    }

    #[test]
    fn field_setters_place_network_order_bytes() {
        let mut bth = Bth::new();
        bth.set_destqp(U24::new(0x123456).unwrap());
        bth.set_psn(U24::new(0x9abcde).unwrap());
        bth.set_p_key(0x5678);
        bth.set_a(true);
        bth.set_se(true);

        let bytes = Pdu::from(bth).serialize();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], BthOpcode::RcSendOnly as u8);
        assert_eq!(bytes[1], 0x80); // SE
        assert_eq!(&bytes[2..4], &[0x56, 0x78]);
        assert_eq!(&bytes[5..8], &[0x12, 0x34, 0x56]);
        assert_eq!(bytes[8], 0x80); // A
        assert_eq!(&bytes[9..12], &[0x9a, 0xbc, 0xde]);
    }

    #[test]
    fn base_header_bit_fields_round_trip() {
        let mut pkt = vec![0u8; 16];
        pkt[0] = BthOpcode::RcSendOnly as u8;
        pkt[1] = 3 << 4; // PadCnt
        let bth = Bth::from_bytes(&pkt).unwrap();
        assert!(!bth.is_malformed());
        assert_eq!(bth.padcnt(), 3);

        pkt[1] = 0x0F; // TVer
        let bth = Bth::from_bytes(&pkt).unwrap();
        assert_eq!(bth.tver(), 0x0F);

        pkt[1] = 0;
        pkt[4] = 1 << 6; // BECN
        let bth = Bth::from_bytes(&pkt).unwrap();
        assert!(bth.b());
        assert!(!bth.f());
    }

    #[test]
    fn reserved_bits_survive_round_trip() {
        let mut pkt = vec![0u8; 16];
        pkt[0] = BthOpcode::RcSendOnly as u8;
        pkt[4] = 0x8d; // FECN + reserved bits as captured off the wire
        pkt[8] = 0xe2; // A + reserved bits
        let bth = Bth::from_bytes(&pkt).unwrap();
        assert!(bth.f());
        assert!(bth.a());
        assert_eq!(Pdu::from(bth).serialize(), pkt);
    }

    #[test]
    fn aeth_fields() {
        let mut pkt = vec![0u8; 20];
        pkt[0] = BthOpcode::RcAcknowledge as u8;
        pkt[12] = 0x39;
        pkt[13] = 0x27;
        pkt[14] = 0xf5;
        pkt[15] = 0x9d;
        let bth = Bth::from_bytes(&pkt).unwrap();
        assert!(!bth.is_malformed());
        assert_eq!(bth.syndrome().unwrap(), 0x39);
        assert_eq!(bth.msn().unwrap(), 0x27f59d);
        assert_eq!(Pdu::from(bth).serialize(), pkt);

        let mut bth = Bth::with_opcode(BthOpcode::RcAcknowledge);
        bth.set_syndrome(0x39).unwrap();
        bth.set_msn(U24::new(0x27f59d).unwrap()).unwrap();
        assert_eq!(Pdu::from(bth).serialize(), pkt);
    }

    #[test]
    fn absent_extension_fields_error() {
        let mut bth = Bth::new();
        assert!(bth.syndrome().is_err());
        assert!(bth.msn().is_err());
        assert!(bth.ee().is_err());
        assert!(bth.q_key().is_err());
        assert!(bth.va().is_err());
        assert!(bth.r_key().is_err());
        assert!(bth.xrcsrq().is_err());
        assert!(bth.set_syndrome(1).is_err());

        // The shared VA accessor picks whichever extension is present.
        bth.set_opcode(BthOpcode::RcCmpSwap);
        bth.set_va(0xdead_beef_0123_4567).unwrap();
        assert_eq!(bth.va().unwrap(), 0xdead_beef_0123_4567);
        assert!(bth.dmalen().is_err());

        bth.set_opcode(BthOpcode::RcRdmaReadRequest);
        bth.set_va(0x1122_3344_5566_7788).unwrap();
        bth.set_dmalen(0x1000).unwrap();
        assert_eq!(bth.va().unwrap(), 0x1122_3344_5566_7788);

        bth.set_opcode(BthOpcode::RcSendOnlyInval);
        bth.set_r_key(0xcafe_f00d).unwrap();
        assert_eq!(bth.r_key().unwrap(), 0xcafe_f00d);
    }

    #[test]
    fn payload_excludes_pad_bytes() {
        let mut pkt = vec![0u8; 12];
        pkt[0] = BthOpcode::RcSendOnly as u8;
        pkt[1] = 2 << 4; // PadCnt 2
        pkt.extend_from_slice(&[1, 2, 3, 4, 5, 6, 0, 0]); // 8-byte payload area
        pkt.extend_from_slice(&[0, 0, 0, 0]); // ICRC
        let bth = Bth::from_bytes(&pkt).unwrap();
        assert!(!bth.is_malformed());
        assert_eq!(bth.inner_pdu().unwrap().size(), 6);
    }

    #[test]
    fn unexpected_payload_sets_malformed() {
        let mut pkt = vec![0u8; 20];
        pkt[0] = BthOpcode::RcAcknowledge as u8;
        pkt.extend_from_slice(&[0xaa; 4]); // payload where none is allowed
        let bth = Bth::from_bytes(&pkt).unwrap();
        assert!(bth.is_malformed());
    }

    #[test]
    fn ragged_payload_sets_malformed() {
        let mut pkt = vec![0u8; 12];
        pkt[0] = BthOpcode::RcSendOnly as u8;
        pkt.extend_from_slice(&[1, 2, 3, 4, 5]); // 5 bytes: not a multiple of 4
        pkt.extend_from_slice(&[0; 4]);
        let bth = Bth::from_bytes(&pkt).unwrap();
        assert!(bth.is_malformed());
    }

    #[test]
    fn metadata_accounts_for_extensions() {
        let mut bytes = [0u8; 16];
        bytes[0] = BthOpcode::RcAcknowledge as u8;
        let meta = Bth::extract_metadata(&bytes).unwrap();
        assert_eq!(meta.header_size, 16);
        assert_eq!(meta.kind, PduKind::Bth);

        // 12 bytes cannot hold the 16-byte header the opcode implies.
        assert!(Bth::extract_metadata(&bytes[..12]).is_err());
        assert!(Bth::extract_metadata(&bytes[..4]).is_err());
    }

    #[test]
    fn header_size_matches_contents_table() {
        for opcode in 0u8..=255 {
            let contents = packet_contents(opcode);
            let mut expected = 12;
            for (flag, size) in [
                (ExtensionSet::RDETH, RDETH_SIZE),
                (ExtensionSet::DETH, DETH_SIZE),
                (ExtensionSet::RETH, RETH_SIZE),
                (ExtensionSet::ATETH, ATETH_SIZE),
                (ExtensionSet::AETH, AETH_SIZE),
                (ExtensionSet::ATAETH, ATAETH_SIZE),
                (ExtensionSet::IMMDT, IMMDT_SIZE),
                (ExtensionSet::IETH, IETH_SIZE),
                (ExtensionSet::XRCETH, XRCETH_SIZE),
            ] {
                if contents.contains(flag) {
                    expected += size;
                }
            }
            let mut bth = Bth::new();
            bth.set_opcode(opcode);
            assert_eq!(bth.header_size(), expected);
        }
    }
}
