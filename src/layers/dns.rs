// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Domain Name System message layer.
//!
//! A DNS message owns an ordered list of queries and three ordered lists
//! of resource records (answers, authorities, additionals); the four
//! counts in the fixed header mirror the list lengths. Names are kept in
//! their on-wire length-label form. A record added with a name that
//! already appears in the message is stored in *offsetted* form: a 14-bit
//! back-pointer to the first occurrence, which is how DNS name
//! compression appears on the wire. The parser tolerates pointer chains
//! of any depth; the serializer only ever produces this one level of
//! compression.

use std::collections::HashMap;

use crate::error::{OutOfRangeError, ValidationError};
use crate::layers::traits::*;
use crate::layers::Pdu;
use crate::stream::{InputStream, OutputStream};
use crate::utils;

const NAME: &str = "DNS";

pub const QUERY_TYPE_A: u16 = 1;
pub const QUERY_TYPE_NS: u16 = 2;
pub const QUERY_TYPE_CNAME: u16 = 5;
pub const QUERY_TYPE_PTR: u16 = 12;
pub const QUERY_TYPE_MX: u16 = 15;
pub const QUERY_TYPE_TXT: u16 = 16;
pub const QUERY_TYPE_AAAA: u16 = 28;
pub const QUERY_CLASS_IN: u16 = 1;

/// Whether a record type's data bytes carry a (possibly compressed)
/// domain name.
#[inline]
fn contains_dname(rtype: u16) -> bool {
    matches!(
        rtype,
        QUERY_TYPE_MX | QUERY_TYPE_CNAME | QUERY_TYPE_PTR | QUERY_TYPE_NS
    )
}

/// One entry of the question section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsQuery {
    name: Vec<u8>,
    qtype: u16,
    qclass: u16,
}

impl DnsQuery {
    /// The name in length-label wire form, without the terminating zero.
    #[inline]
    pub fn name_labels(&self) -> &[u8] {
        &self.name
    }

    /// The name in dotted form.
    #[inline]
    pub fn name(&self) -> String {
        unparse_domain_name(&self.name)
    }

    #[inline]
    pub fn qtype(&self) -> u16 {
        self.qtype
    }

    #[inline]
    pub fn qclass(&self) -> u16 {
        self.qclass
    }

    /// The bytes this query occupies on the wire.
    #[inline]
    fn wire_size(&self) -> usize {
        self.name.len() + 1 + 4
    }
}

/// How a resource record's owner name is stored: in full length-label
/// form, or as a 14-bit back-pointer into the message. The variant is
/// fixed at construction and persists through serialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DnsRecordName {
    Named(Vec<u8>),
    Offsetted(u16),
}

/// One resource record of the answer, authority or additional section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsRecord {
    name: DnsRecordName,
    rtype: u16,
    rclass: u16,
    ttl: u32,
    data: Vec<u8>,
}

impl DnsRecord {
    #[inline]
    pub fn name(&self) -> &DnsRecordName {
        &self.name
    }

    #[inline]
    pub fn rtype(&self) -> u16 {
        self.rtype
    }

    #[inline]
    pub fn rclass(&self) -> u16 {
        self.rclass
    }

    #[inline]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// The record's data bytes, stored raw (the library does not decode
    /// A/AAAA payloads beyond byte-copying).
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The bytes this record occupies on the wire.
    fn wire_size(&self) -> usize {
        let name_size = match &self.name {
            DnsRecordName::Named(labels) => labels.len() + 1,
            DnsRecordName::Offsetted(_) => 2,
        };
        name_size + 8 + 2 + self.data.len()
    }

    fn matches(&self, labels: &[u8]) -> bool {
        match &self.name {
            DnsRecordName::Named(name) => name == labels,
            DnsRecordName::Offsetted(_) => false,
        }
    }
}

/// A resource record with its names decompressed into dotted form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsResource {
    pub name: String,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    pub data: DnsResourceData,
}

/// The decoded payload of a resource record: a decompressed domain name
/// for the types that carry one, raw bytes for everything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DnsResourceData {
    DomainName(String),
    Bytes(Vec<u8>),
}

/// Converts a dotted name into DNS length-label form (no terminator).
pub fn parse_domain_name(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1);
    if name.is_empty() {
        return out;
    }
    for label in name.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out
}

/// Converts a length-label name (with or without its terminator) back
/// into dotted form.
pub fn unparse_domain_name(labels: &[u8]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < labels.len() {
        let len = usize::from(labels[i]);
        if len == 0 {
            break;
        }
        i += 1;
        let end = core::cmp::min(i + len, labels.len());
        if !out.is_empty() {
            out.push('.');
        }
        out.push_str(&String::from_utf8_lossy(&labels[i..end]));
        i = end;
    }
    out
}

/// The decompression index of a message: one entry per label keyed by its
/// byte offset, plus a second map following pointers that point at other
/// pointers.
#[derive(Default)]
struct SuffixMap {
    suffixes: HashMap<u32, Vec<u8>>,
    indices: HashMap<u32, u32>,
}

impl SuffixMap {
    fn add_name(&mut self, index: u32, data: &[u8]) {
        let mut i = 0usize;
        while i < data.len() {
            let len = usize::from(data[i]);
            if len == 0 {
                break;
            }
            if data[i] & 0xC0 == 0xC0 {
                if let Some(ptr) = utils::get_array::<2>(data, i) {
                    let target = u32::from(u16::from_be_bytes(ptr) & 0x3FFF);
                    self.indices.insert(index + i as u32, target);
                }
                i += 2;
            } else {
                let start = i + 1;
                let end = core::cmp::min(start + len, data.len());
                self.suffixes.insert(index + i as u32, data[start..end].to_vec());
                i = end;
            }
        }
    }

    /// Reconstructs a dotted name from length-label data that may contain
    /// compression pointers. Following a pointer walks this map until no
    /// further entry exists; a direct label entry wins over an
    /// indirection entry at the same offset.
    fn compose_name(&self, data: &[u8]) -> String {
        let mut out = String::new();
        let mut i = 0usize;
        while i < data.len() {
            let len = usize::from(data[i]);
            if len == 0 {
                break;
            }
            if data[i] & 0xC0 == 0xC0 {
                let Some(ptr) = utils::get_array::<2>(data, i) else {
                    break;
                };
                let mut index = u32::from(u16::from_be_bytes(ptr) & 0x3FFF);
                // Guard against pointer loops in hostile messages.
                let mut hops = 0;
                loop {
                    if let Some(label) = self.suffixes.get(&index) {
                        if !out.is_empty() {
                            out.push('.');
                        }
                        out.push_str(&String::from_utf8_lossy(label));
                        index += label.len() as u32 + 1;
                    } else if let Some(&next) = self.indices.get(&index) {
                        index = next;
                    } else {
                        break;
                    }
                    hops += 1;
                    if hops > 128 {
                        break;
                    }
                }
                break;
            } else {
                let start = i + 1;
                let end = core::cmp::min(start + len, data.len());
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(&String::from_utf8_lossy(&data[start..end]));
                i = end;
            }
        }
        out
    }
}

/// A DNS message.
#[derive(Clone, Debug, Default)]
pub struct Dns {
    id: u16,
    flags: u16,
    queries: Vec<DnsQuery>,
    answers: Vec<DnsRecord>,
    authorities: Vec<DnsRecord>,
    additionals: Vec<DnsRecord>,
    malformed: bool,
}

const QR_BIT: u16 = 1 << 15;
const AA_BIT: u16 = 1 << 10;
const TC_BIT: u16 = 1 << 9;
const RD_BIT: u16 = 1 << 8;
const RA_BIT: u16 = 1 << 7;
const Z_BIT: u16 = 1 << 6;
const AD_BIT: u16 = 1 << 5;
const CD_BIT: u16 = 1 << 4;

impl Dns {
    #[inline]
    pub fn new() -> Self {
        Dns::default()
    }

    /// Probes the first bytes of a message without building it.
    pub fn extract_metadata(bytes: &[u8]) -> Result<Metadata, ValidationError> {
        let mut stream = InputStream::new(NAME, bytes);
        stream.skip(12, "message too short for a DNS header")?;
        Ok(Metadata {
            header_size: 12,
            kind: PduKind::Dns,
            next_kind: None,
        })
    }

    /// Builds a message from `bytes`. A truncated question or record
    /// section sets the malformed flag and keeps the entries parsed up to
    /// that point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        let mut stream = InputStream::new(NAME, bytes);
        let short = "message too short for a DNS header";
        let id = stream.read_u16(short)?;
        let flags = stream.read_u16(short)?;
        let qdcount = stream.read_u16(short)?;
        let ancount = stream.read_u16(short)?;
        let nscount = stream.read_u16(short)?;
        let arcount = stream.read_u16(short)?;

        let mut dns = Dns {
            id,
            flags,
            queries: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
            malformed: false,
        };

        let mut pos = 12usize;
        for _ in 0..qdcount {
            let Some(query) = parse_query(bytes, &mut pos) else {
                dns.malformed = true;
                return Ok(dns);
            };
            dns.queries.push(query);
        }

        let mut sections = [Vec::new(), Vec::new(), Vec::new()];
        'sections: for (section, count) in [ancount, nscount, arcount].into_iter().enumerate() {
            for _ in 0..count {
                let Some(record) = parse_record(bytes, &mut pos) else {
                    dns.malformed = true;
                    break 'sections;
                };
                sections[section].push(record);
            }
        }
        let [answers, authorities, additionals] = sections;
        dns.answers = answers;
        dns.authorities = authorities;
        dns.additionals = additionals;

        Ok(dns)
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    /// The query/response bit.
    #[inline]
    pub fn qr(&self) -> bool {
        self.flags & QR_BIT > 0
    }

    #[inline]
    pub fn set_qr(&mut self, response: bool) {
        self.set_flag(QR_BIT, response);
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        ((self.flags >> 11) & 0x0F) as u8
    }

    pub fn set_opcode(&mut self, opcode: u8) -> Result<(), OutOfRangeError> {
        if opcode > 0x0F {
            return Err(OutOfRangeError { field: "DNS opcode", max: 0x0F });
        }
        self.flags = (self.flags & !(0x0F << 11)) | (u16::from(opcode) << 11);
        Ok(())
    }

    #[inline]
    pub fn authoritative_answer(&self) -> bool {
        self.flags & AA_BIT > 0
    }

    #[inline]
    pub fn set_authoritative_answer(&mut self, aa: bool) {
        self.set_flag(AA_BIT, aa);
    }

    #[inline]
    pub fn truncated(&self) -> bool {
        self.flags & TC_BIT > 0
    }

    #[inline]
    pub fn set_truncated(&mut self, tc: bool) {
        self.set_flag(TC_BIT, tc);
    }

    #[inline]
    pub fn recursion_desired(&self) -> bool {
        self.flags & RD_BIT > 0
    }

    #[inline]
    pub fn set_recursion_desired(&mut self, rd: bool) {
        self.set_flag(RD_BIT, rd);
    }

    #[inline]
    pub fn recursion_available(&self) -> bool {
        self.flags & RA_BIT > 0
    }

    #[inline]
    pub fn set_recursion_available(&mut self, ra: bool) {
        self.set_flag(RA_BIT, ra);
    }

    #[inline]
    pub fn z(&self) -> bool {
        self.flags & Z_BIT > 0
    }

    #[inline]
    pub fn set_z(&mut self, z: bool) {
        self.set_flag(Z_BIT, z);
    }

    #[inline]
    pub fn authenticated_data(&self) -> bool {
        self.flags & AD_BIT > 0
    }

    #[inline]
    pub fn set_authenticated_data(&mut self, ad: bool) {
        self.set_flag(AD_BIT, ad);
    }

    #[inline]
    pub fn checking_disabled(&self) -> bool {
        self.flags & CD_BIT > 0
    }

    #[inline]
    pub fn set_checking_disabled(&mut self, cd: bool) {
        self.set_flag(CD_BIT, cd);
    }

    #[inline]
    pub fn rcode(&self) -> u8 {
        (self.flags & 0x0F) as u8
    }

    pub fn set_rcode(&mut self, rcode: u8) -> Result<(), OutOfRangeError> {
        if rcode > 0x0F {
            return Err(OutOfRangeError { field: "DNS rcode", max: 0x0F });
        }
        self.flags = (self.flags & !0x0F) | u16::from(rcode);
        Ok(())
    }

    #[inline]
    fn set_flag(&mut self, bit: u16, value: bool) {
        if value {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
    }

    #[inline]
    pub fn queries(&self) -> &[DnsQuery] {
        &self.queries
    }

    #[inline]
    pub fn answers(&self) -> &[DnsRecord] {
        &self.answers
    }

    #[inline]
    pub fn authorities(&self) -> &[DnsRecord] {
        &self.authorities
    }

    #[inline]
    pub fn additionals(&self) -> &[DnsRecord] {
        &self.additionals
    }

    /// Appends a query for the dotted `name`.
    pub fn add_query(&mut self, name: &str, qtype: u16, qclass: u16) {
        self.queries.push(DnsQuery {
            name: parse_domain_name(name),
            qtype,
            qclass,
        });
    }

    /// Appends an answer record with raw data bytes. When `name` already
    /// appears in the message, the record is stored as a back-pointer to
    /// the first occurrence.
    pub fn add_answer(&mut self, name: &str, rtype: u16, rclass: u16, ttl: u32, data: Vec<u8>) {
        let record = self.make_record(name, rtype, rclass, ttl, data);
        self.answers.push(record);
    }

    /// Appends an answer record whose data is a domain name in wire form
    /// (e.g. CNAME, NS, PTR).
    pub fn add_answer_domain(
        &mut self,
        name: &str,
        rtype: u16,
        rclass: u16,
        ttl: u32,
        dname: &str,
    ) {
        let mut data = parse_domain_name(dname);
        data.push(0);
        self.add_answer(name, rtype, rclass, ttl, data);
    }

    /// Appends an authority record with raw data bytes.
    pub fn add_authority(&mut self, name: &str, rtype: u16, rclass: u16, ttl: u32, data: Vec<u8>) {
        let record = self.make_record(name, rtype, rclass, ttl, data);
        self.authorities.push(record);
    }

    /// Appends an additional record with raw data bytes.
    pub fn add_additional(&mut self, name: &str, rtype: u16, rclass: u16, ttl: u32, data: Vec<u8>) {
        let record = self.make_record(name, rtype, rclass, ttl, data);
        self.additionals.push(record);
    }

    fn make_record(
        &self,
        name: &str,
        rtype: u16,
        rclass: u16,
        ttl: u32,
        data: Vec<u8>,
    ) -> DnsRecord {
        let labels = parse_domain_name(name);
        let name = match self.find_domain_name(&labels) {
            Some(offset) => DnsRecordName::Offsetted(offset),
            None => DnsRecordName::Named(labels),
        };
        DnsRecord {
            name,
            rtype,
            rclass,
            ttl,
            data,
        }
    }

    /// The wire offset of the first occurrence of `labels` as a query or
    /// record name, walking the sections in serialization order.
    fn find_domain_name(&self, labels: &[u8]) -> Option<u16> {
        let mut offset = 12usize;
        for query in &self.queries {
            if query.name == labels {
                return Some(offset as u16);
            }
            offset += query.wire_size();
        }
        for list in [&self.answers, &self.authorities, &self.additionals] {
            for record in list {
                if record.matches(labels) {
                    return Some(offset as u16);
                }
                offset += record.wire_size();
            }
        }
        None
    }

    fn build_suffix_map(&self) -> SuffixMap {
        let mut map = SuffixMap::default();
        let mut index = 12u32;
        for query in &self.queries {
            map.add_name(index, &query.name);
            index += query.wire_size() as u32;
        }
        for list in [&self.answers, &self.authorities, &self.additionals] {
            for record in list {
                match &record.name {
                    DnsRecordName::Named(labels) => {
                        map.add_name(index, labels);
                        index += labels.len() as u32 + 1;
                    }
                    DnsRecordName::Offsetted(_) => index += 2,
                }
                index += 8 + 2;
                let (skip, data) = dname_data(record);
                index += skip as u32;
                if contains_dname(record.rtype) {
                    map.add_name(index, data);
                }
                index += data.len() as u32;
            }
        }
        map
    }

    /// The answer section with names decompressed into dotted form.
    pub fn resolved_answers(&self) -> Vec<DnsResource> {
        self.resolve_records(&self.answers)
    }

    /// The authority section with names decompressed into dotted form.
    pub fn resolved_authorities(&self) -> Vec<DnsResource> {
        self.resolve_records(&self.authorities)
    }

    /// The additional section with names decompressed into dotted form.
    pub fn resolved_additionals(&self) -> Vec<DnsResource> {
        self.resolve_records(&self.additionals)
    }

    fn resolve_records(&self, records: &[DnsRecord]) -> Vec<DnsResource> {
        let map = self.build_suffix_map();
        records
            .iter()
            .map(|record| {
                let name = match record.name {
                    DnsRecordName::Named(ref labels) => map.compose_name(labels),
                    DnsRecordName::Offsetted(offset) => {
                        let pointer = (offset | 0xC000).to_be_bytes();
                        map.compose_name(&pointer)
                    }
                };
                let data = if contains_dname(record.rtype) {
                    let (_, data) = dname_data(record);
                    DnsResourceData::DomainName(map.compose_name(data))
                } else {
                    DnsResourceData::Bytes(record.data.clone())
                };
                DnsResource {
                    name,
                    rtype: record.rtype,
                    rclass: record.rclass,
                    ttl: record.ttl,
                    data,
                }
            })
            .collect()
    }
}

/// A record's name-bearing data window: MX data starts with a two-byte
/// preference before the exchanger name.
fn dname_data(record: &DnsRecord) -> (usize, &[u8]) {
    if record.rtype == QUERY_TYPE_MX && record.data.len() >= 2 {
        (2, &record.data[2..])
    } else {
        (0, &record.data[..])
    }
}

fn parse_query(bytes: &[u8], pos: &mut usize) -> Option<DnsQuery> {
    let name_start = *pos;
    let terminator = bytes[name_start..].iter().position(|&b| b == 0)?;
    let name = bytes[name_start..name_start + terminator].to_vec();
    let mut index = name_start + terminator + 1;
    let qtype = utils::get_array::<2>(bytes, index).map(u16::from_be_bytes)?;
    index += 2;
    let qclass = utils::get_array::<2>(bytes, index).map(u16::from_be_bytes)?;
    index += 2;
    *pos = index;
    Some(DnsQuery { name, qtype, qclass })
}

fn parse_record(bytes: &[u8], pos: &mut usize) -> Option<DnsRecord> {
    let mut index = *pos;
    let first = *bytes.get(index)?;
    let name = if first & 0xC0 == 0xC0 {
        let pointer = utils::get_array::<2>(bytes, index).map(u16::from_be_bytes)?;
        index += 2;
        DnsRecordName::Offsetted(pointer & 0x3FFF)
    } else {
        let terminator = bytes[index..].iter().position(|&b| b == 0)?;
        let labels = bytes[index..index + terminator].to_vec();
        index += terminator + 1;
        DnsRecordName::Named(labels)
    };
    let rtype = utils::get_array::<2>(bytes, index).map(u16::from_be_bytes)?;
    index += 2;
    let rclass = utils::get_array::<2>(bytes, index).map(u16::from_be_bytes)?;
    index += 2;
    let ttl = utils::get_array::<4>(bytes, index).map(u32::from_be_bytes)?;
    index += 4;
    let data_len = utils::get_array::<2>(bytes, index).map(u16::from_be_bytes)?;
    index += 2;
    let data = bytes.get(index..index + usize::from(data_len))?.to_vec();
    index += usize::from(data_len);
    *pos = index;
    Some(DnsRecord {
        name,
        rtype,
        rclass,
        ttl,
        data,
    })
}

impl Layer for Dns {
    #[inline]
    fn kind(&self) -> PduKind {
        PduKind::Dns
    }

    fn header_size(&self) -> usize {
        let queries: usize = self.queries.iter().map(DnsQuery::wire_size).sum();
        let records: usize = [&self.answers, &self.authorities, &self.additionals]
            .into_iter()
            .flatten()
            .map(DnsRecord::wire_size)
            .sum();
        12 + queries + records
    }

    #[inline]
    fn is_malformed(&self) -> bool {
        self.malformed
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
        panic!("a DNS layer cannot encapsulate another PDU");
    }

    #[inline]
    fn take_inner_pdu(&mut self) -> Option<Pdu> {
        None
    }

    /// A response matches a query iff the transaction ids agree.
    fn matches_response(&self, response: &[u8]) -> bool {
        match utils::get_array::<2>(response, 0) {
            Some(id) => u16::from_be_bytes(id) == self.id,
            None => false,
        }
    }

    fn write_serialization(&self, buffer: &mut [u8], _parent: Option<&Pdu>) {
        let mut stream = OutputStream::new(buffer);
        stream.write_u16(self.id);
        stream.write_u16(self.flags);
        stream.write_u16(self.queries.len() as u16);
        stream.write_u16(self.answers.len() as u16);
        stream.write_u16(self.authorities.len() as u16);
        stream.write_u16(self.additionals.len() as u16);

        for query in &self.queries {
            stream.write_slice(&query.name);
            stream.write_u8(0);
            stream.write_u16(query.qtype);
            stream.write_u16(query.qclass);
        }
        for list in [&self.answers, &self.authorities, &self.additionals] {
            for record in list {
                match &record.name {
                    DnsRecordName::Named(labels) => {
                        stream.write_slice(labels);
                        stream.write_u8(0);
                    }
                    DnsRecordName::Offsetted(offset) => {
                        stream.write_u16(offset | 0xC000);
                    }
                }
                stream.write_u16(record.rtype);
                stream.write_u16(record.rclass);
                stream.write_u32(record.ttl);
                stream.write_u16(record.data.len() as u16);
                stream.write_slice(&record.data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_name_laws() {
        for name in ["www.example.com", "example", "a.b.c.d.e"] {
            let labels = parse_domain_name(name);
            assert_eq!(unparse_domain_name(&labels), name);
        }
        assert_eq!(
            parse_domain_name("www.example.com"),
            b"\x03www\x07example\x03com".to_vec()
        );
    }

    #[test]
    fn query_round_trip() {
        let mut dns = Dns::new();
        dns.set_id(0x1234);
        dns.set_recursion_desired(true);
        dns.add_query("www.example.com", QUERY_TYPE_A, QUERY_CLASS_IN);

        let bytes = Pdu::from(dns).serialize();
        assert_eq!(bytes.len(), 12 + 17 + 4);
        assert_eq!(&bytes[0..2], &[0x12, 0x34]);
        assert_eq!(&bytes[2..4], &[0x01, 0x00]); // RD
        assert_eq!(&bytes[4..6], &[0x00, 0x01]); // one question

        let parsed = Dns::from_bytes(&bytes).unwrap();
        assert!(!parsed.is_malformed());
        assert_eq!(parsed.id(), 0x1234);
        assert!(parsed.recursion_desired());
        assert!(!parsed.qr());
        assert_eq!(parsed.queries().len(), 1);
        assert_eq!(parsed.queries()[0].name(), "www.example.com");
        assert_eq!(parsed.queries()[0].qtype(), QUERY_TYPE_A);

        assert_eq!(Pdu::from(parsed).serialize(), bytes);
    }

    #[test]
    fn flag_bits_round_trip() {
        let mut dns = Dns::new();
        dns.set_qr(true);
        dns.set_opcode(0xb).unwrap();
        dns.set_authoritative_answer(true);
        dns.set_z(true);
        dns.set_authenticated_data(true);
        dns.set_checking_disabled(true);
        dns.set_rcode(0x3).unwrap();

        let bytes = Pdu::from(dns).serialize();
        let parsed = Dns::from_bytes(&bytes).unwrap();
        assert!(parsed.qr());
        assert_eq!(parsed.opcode(), 0xb);
        assert!(parsed.authoritative_answer());
        assert!(!parsed.truncated());
        assert!(parsed.z());
        assert!(parsed.authenticated_data());
        assert!(parsed.checking_disabled());
        assert_eq!(parsed.rcode(), 0x3);

        assert!(Dns::new().set_opcode(0x10).is_err());
        assert!(Dns::new().set_rcode(0x10).is_err());
    }

    #[test]
    fn answer_for_queried_name_is_compressed() {
        let mut dns = Dns::new();
        dns.set_id(7);
        dns.add_query("www.example.com", QUERY_TYPE_A, QUERY_CLASS_IN);
        dns.add_answer(
            "www.example.com",
            QUERY_TYPE_A,
            QUERY_CLASS_IN,
            3600,
            vec![93, 184, 216, 34],
        );

        match dns.answers()[0].name() {
            DnsRecordName::Offsetted(offset) => assert_eq!(*offset, 12),
            DnsRecordName::Named(_) => panic!("expected a compressed record name"),
        }

        let bytes = Pdu::from(dns.clone()).serialize();
        // The record starts right after the question section and opens
        // with a pointer to offset 12.
        let record_start = 12 + 17 + 4;
        assert_eq!(&bytes[record_start..record_start + 2], &[0xC0, 0x0C]);

        // The pointer decompresses back to the queried name.
        let resolved = dns.resolved_answers();
        assert_eq!(resolved[0].name, "www.example.com");
        assert_eq!(resolved[0].data, DnsResourceData::Bytes(vec![93, 184, 216, 34]));

        // And the serialized message reparses into the same shape.
        let parsed = Dns::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.resolved_answers()[0].name, "www.example.com");
        assert_eq!(Pdu::from(parsed).serialize(), bytes);
    }

    #[test]
    fn unrelated_answer_stays_named() {
        let mut dns = Dns::new();
        dns.add_query("www.example.com", QUERY_TYPE_A, QUERY_CLASS_IN);
        dns.add_answer("other.test", QUERY_TYPE_A, QUERY_CLASS_IN, 60, vec![1, 2, 3, 4]);
        match dns.answers()[0].name() {
            DnsRecordName::Named(labels) => {
                assert_eq!(unparse_domain_name(labels), "other.test")
            }
            DnsRecordName::Offsetted(_) => panic!("unexpected compression"),
        }
    }

    #[test]
    fn compression_points_at_earlier_record() {
        let mut dns = Dns::new();
        dns.add_query("a.test", QUERY_TYPE_A, QUERY_CLASS_IN);
        dns.add_answer("b.test", QUERY_TYPE_A, QUERY_CLASS_IN, 60, vec![1, 1, 1, 1]);
        dns.add_answer("b.test", QUERY_TYPE_A, QUERY_CLASS_IN, 60, vec![2, 2, 2, 2]);

        // The first record's name lands at offset 12 + 12 = 24; the
        // second points back at it.
        match dns.answers()[1].name() {
            DnsRecordName::Offsetted(offset) => assert_eq!(*offset, 24),
            DnsRecordName::Named(_) => panic!("expected a compressed record name"),
        }
        let resolved = dns.resolved_answers();
        assert_eq!(resolved[0].name, "b.test");
        assert_eq!(resolved[1].name, "b.test");
    }

    #[test]
    fn mx_data_skips_preference() {
        let mut dns = Dns::new();
        dns.add_query("example.com", QUERY_TYPE_MX, QUERY_CLASS_IN);
        let mut data = vec![0x00, 0x0A]; // preference 10
        data.extend_from_slice(b"\x04mail\x07example\x03com\x00");
        dns.add_answer("example.com", QUERY_TYPE_MX, QUERY_CLASS_IN, 300, data);

        let resolved = dns.resolved_answers();
        assert_eq!(resolved[0].data, DnsResourceData::DomainName("mail.example.com".into()));
    }

    #[test]
    fn parser_tolerates_pointer_chains() {
        // Hand-built response: query "a.bc", answer name is a pointer to
        // offset 12, and the CNAME data is a pointer to offset 14 (the
        // "bc" suffix of the query name).
        let mut bytes = vec![
            0x00, 0x07, 0x80, 0x00, // id, QR
            0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        bytes.extend_from_slice(b"\x01a\x02bc\x00"); // query name at 12
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // A, IN
        bytes.extend_from_slice(&[0xC0, 0x0C]); // answer name -> 12
        bytes.extend_from_slice(&[0x00, 0x05, 0x00, 0x01]); // CNAME, IN
        bytes.extend_from_slice(&[0x00, 0x00, 0x0E, 0x10]); // ttl
        bytes.extend_from_slice(&[0x00, 0x02, 0xC0, 0x0E]); // dlen 2, ptr -> 14

        let dns = Dns::from_bytes(&bytes).unwrap();
        assert!(!dns.is_malformed());
        let resolved = dns.resolved_answers();
        assert_eq!(resolved[0].name, "a.bc");
        assert_eq!(resolved[0].data, DnsResourceData::DomainName("bc".into()));

        assert_eq!(Pdu::from(dns).serialize(), bytes);
    }

    #[test]
    fn truncated_record_sets_malformed() {
        let mut dns = Dns::new();
        dns.add_query("x.y", QUERY_TYPE_A, QUERY_CLASS_IN);
        dns.add_answer("x.y", QUERY_TYPE_A, QUERY_CLASS_IN, 60, vec![1, 2, 3, 4]);
        let mut bytes = Pdu::from(dns).serialize();
        bytes.truncate(bytes.len() - 3);

        let parsed = Dns::from_bytes(&bytes).unwrap();
        assert!(parsed.is_malformed());
        assert_eq!(parsed.queries().len(), 1);
        assert!(parsed.answers().is_empty());
    }

    #[test]
    fn response_matching_compares_ids() {
        let mut dns = Dns::new();
        dns.set_id(0xBEEF);
        let mut response = [0u8; 12];
        response[0] = 0xBE;
        response[1] = 0xEF;
        assert!(dns.matches_response(&response));
        response[1] = 0x00;
        assert!(!dns.matches_response(&response));
    }
}
