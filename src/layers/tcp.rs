// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Transmission Control Protocol layer and its option list.

use crate::error::{OptionNotFound, ValidationError};
use crate::layers::dispatch::{self, Selector};
use crate::layers::traits::*;
use crate::layers::{Pdu, Raw};
use crate::stream::{InputStream, OutputStream};
use crate::utils;

const NAME: &str = "TCP";

const DEFAULT_WINDOW: u16 = 32678;

/// The option kinds with typed accessors on [`Tcp`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TcpOptionKind {
    Eol = 0,
    Nop = 1,
    Mss = 2,
    Wscale = 3,
    SackOk = 4,
    Sack = 5,
    Timestamp = 8,
    AltChecksum = 14,
}

/// The algorithm identifiers carried by the alternate-checksum option.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AltChecksum {
    Standard = 0,
    Fletcher8 = 1,
    Fletcher16 = 2,
}

/// The eight flag bits of a TCP header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TcpFlags {
    data: u8,
}

const CWR_BIT: u8 = 0b_1000_0000;
const ECE_BIT: u8 = 0b_0100_0000;
const URG_BIT: u8 = 0b_0010_0000;
const ACK_BIT: u8 = 0b_0001_0000;
const PSH_BIT: u8 = 0b_0000_1000;
const RST_BIT: u8 = 0b_0000_0100;
const SYN_BIT: u8 = 0b_0000_0010;
const FIN_BIT: u8 = 0b_0000_0001;

macro_rules! flag_accessors {
    ($($get:ident, $set:ident, $bit:ident);* $(;)?) => {
        $(
            #[inline]
            pub fn $get(&self) -> bool {
                self.data & $bit > 0
            }

            #[inline]
            pub fn $set(&mut self, value: bool) {
                if value {
                    self.data |= $bit;
                } else {
                    self.data &= !$bit;
                }
            }
        )*
    };
}

impl TcpFlags {
    #[inline]
    pub fn new() -> Self {
        TcpFlags::default()
    }

    flag_accessors! {
        cwr, set_cwr, CWR_BIT;
        ece, set_ece, ECE_BIT;
        urg, set_urg, URG_BIT;
        ack, set_ack, ACK_BIT;
        psh, set_psh, PSH_BIT;
        rst, set_rst, RST_BIT;
        syn, set_syn, SYN_BIT;
        fin, set_fin, FIN_BIT;
    }

    #[inline]
    pub fn bits(&self) -> u8 {
        self.data
    }
}

impl From<u8> for TcpFlags {
    #[inline]
    fn from(value: u8) -> Self {
        TcpFlags { data: value }
    }
}

/// One TCP option: a kind byte, the length field it will declare, and its
/// payload bytes.
///
/// The length field normally mirrors the payload size (the on-wire length
/// byte is written as `length_field + 2` to cover the kind and length
/// bytes themselves); constructing an option with a mismatched length
/// field writes that field verbatim, which is occasionally useful for
/// crafting deliberately inconsistent segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpOption {
    kind: u8,
    length_field: u8,
    data: Vec<u8>,
}

impl TcpOption {
    /// Builds an option whose length field matches its payload.
    #[inline]
    pub fn new(kind: u8, data: Vec<u8>) -> Self {
        TcpOption {
            kind,
            length_field: data.len() as u8,
            data,
        }
    }

    /// Builds an option with an explicitly spoofed length field.
    #[inline]
    pub fn with_length_field(kind: u8, length_field: u8, data: Vec<u8>) -> Self {
        TcpOption {
            kind,
            length_field,
            data,
        }
    }

    #[inline]
    pub fn kind(&self) -> u8 {
        self.kind
    }

    #[inline]
    pub fn length_field(&self) -> u8 {
        self.length_field
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The bytes this option occupies on the wire: one for EOL/NOP,
    /// kind + length + payload for everything else.
    #[inline]
    pub fn byte_len(&self) -> usize {
        match self.kind {
            0 | 1 => 1,
            _ => 2 + self.data.len(),
        }
    }

    fn write(&self, stream: &mut OutputStream<'_>) {
        stream.write_u8(self.kind);
        if self.kind > 1 {
            let wire_length = if usize::from(self.length_field) == self.data.len() {
                self.length_field + 2
            } else {
                self.length_field
            };
            stream.write_u8(wire_length);
            stream.write_slice(&self.data);
        }
    }
}

/// A TCP segment.
///
/// The data-offset field is derived from the option list at serialization
/// time, and the checksum is recomputed then over the pseudo-header
/// supplied by the parent layer, the header, the padded options and the
/// payload.
#[derive(Clone, Debug)]
pub struct Tcp {
    sport: u16,
    dport: u16,
    seq: u32,
    ack: u32,
    reserved: u8,
    flags: TcpFlags,
    window: u16,
    chksum: u16,
    urgent_ptr: u16,
    options: Vec<TcpOption>,
    malformed: bool,
    inner: Option<Box<Pdu>>,
}

impl Default for Tcp {
    fn default() -> Self {
        Tcp {
            sport: 0,
            dport: 0,
            seq: 0,
            ack: 0,
            reserved: 0,
            flags: TcpFlags::default(),
            window: DEFAULT_WINDOW,
            chksum: 0,
            urgent_ptr: 0,
            options: Vec::new(),
            malformed: false,
            inner: None,
        }
    }
}

impl Tcp {
    #[inline]
    pub fn new() -> Self {
        Tcp::default()
    }

    /// Probes the first bytes of a segment without building it.
    pub fn extract_metadata(bytes: &[u8]) -> Result<Metadata, ValidationError> {
        let mut stream = InputStream::new(NAME, bytes);
        stream.skip(12, "segment too short for a TCP header")?;
        let doff = stream.read_u8("segment too short for a TCP header")?;
        stream.skip(7, "segment too short for a TCP header")?;
        Ok(Metadata {
            header_size: usize::from(doff >> 4) * 4,
            kind: PduKind::Tcp,
            next_kind: None,
        })
    }

    /// Builds a segment and its encapsulated layer from `bytes`.
    ///
    /// Defects in the option area (a length byte below 2, an option
    /// running past the header) set the malformed flag and stop option
    /// parsing, keeping the options read so far. The payload protocol is
    /// resolved through the next-protocol registry (destination port
    /// first, then source port) and falls back to a raw layer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut stream = InputStream::new(NAME, bytes);
        let short = "segment too short for a TCP header";
        let sport = stream.read_u16(short)?;
        let dport = stream.read_u16(short)?;
        let seq = stream.read_u32(short)?;
        let ack = stream.read_u32(short)?;
        let doff_reserved = stream.read_u8(short)?;
        let flags = stream.read_u8(short)?;
        let window = stream.read_u16(short)?;
        let chksum = stream.read_u16(short)?;
        let urgent_ptr = stream.read_u16(short)?;

        let mut tcp = Tcp {
            sport,
            dport,
            seq,
            ack,
            reserved: doff_reserved & 0x0F,
            flags: TcpFlags::from(flags),
            window,
            chksum,
            urgent_ptr,
            options: Vec::new(),
            malformed: false,
            inner: None,
        };

        let header_len = usize::from(doff_reserved >> 4) * 4;
        if header_len < 20 || header_len > bytes.len() {
            tcp.malformed = true;
            return Ok(tcp);
        }

        while stream.position() < header_len {
            let kind = match stream.read_u8("") {
                Ok(kind) => kind,
                Err(_) => break,
            };
            if kind == TcpOptionKind::Eol as u8 {
                let rest = header_len - stream.position();
                let _ = stream.skip(rest, "");
                break;
            }
            if kind == TcpOptionKind::Nop as u8 {
                tcp.options.push(TcpOption::new(kind, Vec::new()));
                continue;
            }
            let Ok(wire_length) = stream.read_u8("") else {
                tcp.malformed = true;
                return Ok(tcp);
            };
            if wire_length < 2 {
                tcp.malformed = true;
                return Ok(tcp);
            }
            let data_len = usize::from(wire_length) - 2;
            if stream.position() + data_len > header_len {
                tcp.malformed = true;
                return Ok(tcp);
            }
            let data = stream
                .read_slice(data_len, "")
                .expect("option bounds already checked against header");
            tcp.options.push(TcpOption::new(kind, data.to_vec()));
        }

        let payload = &bytes[header_len..];
        if !payload.is_empty() {
            let inner = match dispatch::allocate(PduKind::Tcp, Selector::dst_port(dport), payload)
                .or_else(|| dispatch::allocate(PduKind::Tcp, Selector::src_port(sport), payload))
            {
                Some(inner) => inner?,
                None => Pdu::from(Raw::from_bytes(payload)),
            };
            tcp.inner = Some(Box::new(inner));
        }

        Ok(tcp)
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

    #[inline]
    pub fn seq(&self) -> u32 {
        self.seq
    }

    #[inline]
    pub fn set_seq(&mut self, seq: u32) {
        self.seq = seq;
    }

    #[inline]
    pub fn ack(&self) -> u32 {
        self.ack
    }

    #[inline]
    pub fn set_ack(&mut self, ack: u32) {
        self.ack = ack;
    }

    /// The data offset the segment will declare on the wire, in 32-bit
    /// words, derived from the current option list.
    #[inline]
    pub fn data_offset(&self) -> u8 {
        ((20 + self.padded_options_size()) / 4) as u8
    }

    #[inline]
    pub fn reserved(&self) -> u8 {
        self.reserved
    }

    #[inline]
    pub fn set_reserved(&mut self, reserved: u8) {
        self.reserved = reserved & 0x0F;
    }

    #[inline]
    pub fn flags(&self) -> TcpFlags {
        self.flags
    }

    #[inline]
    pub fn flags_mut(&mut self) -> &mut TcpFlags {
        &mut self.flags
    }

    #[inline]
    pub fn set_flags(&mut self, flags: TcpFlags) {
        self.flags = flags;
    }

    #[inline]
    pub fn window(&self) -> u16 {
        self.window
    }

    #[inline]
    pub fn set_window(&mut self, window: u16) {
        self.window = window;
    }

    /// The checksum parsed from or assigned to the segment. Serialization
    /// recomputes the on-wire checksum from the segment contents and the
    /// parent pseudo-header regardless of this value.
    #[inline]
    pub fn chksum(&self) -> u16 {
        self.chksum
    }

    #[inline]
    pub fn set_chksum(&mut self, chksum: u16) {
        self.chksum = chksum;
    }

    #[inline]
    pub fn urgent_ptr(&self) -> u16 {
        self.urgent_ptr
    }

    #[inline]
    pub fn set_urgent_ptr(&mut self, urgent_ptr: u16) {
        self.urgent_ptr = urgent_ptr;
    }

    #[inline]
    pub fn options(&self) -> &[TcpOption] {
        &self.options
    }

    #[inline]
    pub fn options_mut(&mut self) -> &mut Vec<TcpOption> {
        &mut self.options
    }

    /// Appends an option to the list. Duplicate kinds are allowed and
    /// preserved in insertion order.
    #[inline]
    pub fn add_option(&mut self, option: TcpOption) {
        self.options.push(option);
    }

    /// The first option of the given kind, if any.
    pub fn search_option(&self, kind: TcpOptionKind) -> Option<&TcpOption> {
        self.options.iter().find(|opt| opt.kind == kind as u8)
    }

    /// Removes the first option of the given kind, returning whether one
    /// existed.
    pub fn remove_option(&mut self, kind: TcpOptionKind) -> bool {
        match self.options.iter().position(|opt| opt.kind == kind as u8) {
            Some(index) => {
                self.options.remove(index);
                true
            }
            None => false,
        }
    }

    /// The maximum segment size option, when present with a well-formed
    /// payload.
    pub fn mss(&self) -> Result<u16, OptionNotFound> {
        let opt = self.search_option(TcpOptionKind::Mss).ok_or(OptionNotFound { option: "MSS" })?;
        utils::get_array(opt.data(), 0)
            .map(u16::from_be_bytes)
            .ok_or(OptionNotFound { option: "MSS" })
    }

    pub fn set_mss(&mut self, mss: u16) {
        self.add_option(TcpOption::new(TcpOptionKind::Mss as u8, mss.to_be_bytes().to_vec()));
    }

    /// The window-scale option, when present with a well-formed payload.
    pub fn winscale(&self) -> Result<u8, OptionNotFound> {
        let opt = self
            .search_option(TcpOptionKind::Wscale)
            .ok_or(OptionNotFound { option: "WSCALE" })?;
        opt.data().first().copied().ok_or(OptionNotFound { option: "WSCALE" })
    }

    pub fn set_winscale(&mut self, shift: u8) {
        self.add_option(TcpOption::new(TcpOptionKind::Wscale as u8, vec![shift]));
    }

    /// Whether the selective-acknowledgment-permitted option is present.
    pub fn sack_permitted(&self) -> bool {
        self.search_option(TcpOptionKind::SackOk).is_some()
    }

    pub fn set_sack_permitted(&mut self) {
        self.add_option(TcpOption::new(TcpOptionKind::SackOk as u8, Vec::new()));
    }

    /// The selective-acknowledgment edges, when the option is present.
    pub fn sack(&self) -> Result<Vec<u32>, OptionNotFound> {
        let opt =
            self.search_option(TcpOptionKind::Sack).ok_or(OptionNotFound { option: "SACK" })?;
        Ok(opt
            .data()
            .chunks_exact(4)
            .map(|edge| u32::from_be_bytes(edge.try_into().expect("4-byte chunk")))
            .collect())
    }

    pub fn set_sack(&mut self, edges: &[u32]) {
        let mut data = Vec::with_capacity(edges.len() * 4);
        for edge in edges {
            data.extend_from_slice(&edge.to_be_bytes());
        }
        self.add_option(TcpOption::new(TcpOptionKind::Sack as u8, data));
    }

    /// The timestamp option as a `(value, echo reply)` pair, when present
    /// with a well-formed payload.
    pub fn timestamp(&self) -> Result<(u32, u32), OptionNotFound> {
        let opt = self
            .search_option(TcpOptionKind::Timestamp)
            .ok_or(OptionNotFound { option: "TSOPT" })?;
        let value = utils::get_array(opt.data(), 0).map(u32::from_be_bytes);
        let reply = utils::get_array(opt.data(), 4).map(u32::from_be_bytes);
        match (value, reply) {
            (Some(value), Some(reply)) => Ok((value, reply)),
            _ => Err(OptionNotFound { option: "TSOPT" }),
        }
    }

    pub fn set_timestamp(&mut self, value: u32, reply: u32) {
        let mut data = value.to_be_bytes().to_vec();
        data.extend_from_slice(&reply.to_be_bytes());
        self.add_option(TcpOption::new(TcpOptionKind::Timestamp as u8, data));
    }

    /// The alternate-checksum algorithm, when the option is present with a
    /// well-formed payload.
    pub fn altchecksum(&self) -> Result<AltChecksum, OptionNotFound> {
        let opt = self
            .search_option(TcpOptionKind::AltChecksum)
            .ok_or(OptionNotFound { option: "ALTCHK" })?;
        match opt.data().first() {
            Some(0) => Ok(AltChecksum::Standard),
            Some(1) => Ok(AltChecksum::Fletcher8),
            Some(2) => Ok(AltChecksum::Fletcher16),
            _ => Err(OptionNotFound { option: "ALTCHK" }),
        }
    }

    pub fn set_altchecksum(&mut self, algorithm: AltChecksum) {
        self.add_option(TcpOption::new(TcpOptionKind::AltChecksum as u8, vec![algorithm as u8]));
    }

    fn options_size(&self) -> usize {
        self.options.iter().map(TcpOption::byte_len).sum()
    }

    fn padded_options_size(&self) -> usize {
        (self.options_size() + 3) & !3
    }

    /// The 16-bit ones' complement checksum of the segment as currently
    /// composed, folded over the pseudo-header the given parent supplies.
    pub fn calculate_checksum(&self, parent: Option<&Pdu>) -> u16 {
        let mut buffer = vec![0u8; self.size()];
        if let Some(inner) = self.inner_pdu() {
            inner.serialize_into(&mut buffer[self.header_size()..], None);
        }
        self.write_header(&mut buffer);
        self.checksum_of(&buffer, parent)
    }

    fn checksum_of(&self, buffer: &[u8], parent: Option<&Pdu>) -> u16 {
        let pseudo = match parent {
            Some(Pdu::Ipv4(ip)) => utils::pseudoheader_sum_v4(
                ip.saddr().to_be_bytes(),
                ip.daddr().to_be_bytes(),
                buffer.len() as u32,
                super::ip::DATA_PROTO_TCP,
            ),
            Some(Pdu::Ipv6(ip)) => utils::pseudoheader_sum_v6(
                ip.saddr(),
                ip.daddr(),
                buffer.len() as u32,
                super::ip::DATA_PROTO_TCP,
            ),
            // No pseudo-header available; its contribution is zero.
            _ => 0,
        };
        let mut sum = pseudo + utils::ones_complement_sum(buffer);
        // The header was written with the stored checksum still in place;
        // take it back out so stale values cannot skew the result.
        sum -= u32::from(self.chksum);
        !utils::fold_checksum(sum)
    }

    fn write_header(&self, buffer: &mut [u8]) {
        let options_size = self.options_size();
        let pad = self.padded_options_size() - options_size;
        let mut stream = OutputStream::new(buffer);
        stream.write_u16(self.sport);
        stream.write_u16(self.dport);
        stream.write_u32(self.seq);
        stream.write_u32(self.ack);
        stream.write_u8((self.data_offset() << 4) | self.reserved);
        stream.write_u8(self.flags.bits());
        stream.write_u16(self.window);
        stream.write_u16(self.chksum);
        stream.write_u16(self.urgent_ptr);
        for option in &self.options {
            option.write(&mut stream);
        }
        stream.fill(pad, 0);
    }
}

impl Layer for Tcp {
    #[inline]
    fn kind(&self) -> PduKind {
        PduKind::Tcp
    }

    #[inline]
    fn header_size(&self) -> usize {
        20 + self.padded_options_size()
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
        let Some(&doff_byte) = response.get(12) else {
            return false;
        };
        let doff = usize::from(doff_byte >> 4) * 4;
        let header_len = core::cmp::min(doff, response.len());
        match self.inner.as_deref() {
            Some(inner) => inner.matches_response(&response[header_len..]),
            None => true,
        }
    }

    fn write_serialization(&self, buffer: &mut [u8], parent: Option<&Pdu>) {
        self.write_header(buffer);
        let chksum = self.checksum_of(buffer, parent);
        buffer[16..18].copy_from_slice(&chksum.to_be_bytes());
    }
}
