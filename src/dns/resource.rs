use std::net::{Ipv4Addr, Ipv6Addr};

use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;
use super::common::{PacketComponent, labels_to_name, read_labels, write_labels};
use super::edns::{EdnsOpt, EdnsOption};
use super::enums::{DnsResourceClass, DnsResourceType};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(Vec<String>),
    Ns(Vec<String>),
    Ptr(Vec<String>),
    Mx { preference: u16, exchange: Vec<String> },
    Txt(Vec<Vec<u8>>),
    Soa {
        mname: Vec<String>,
        rname: Vec<String>,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: Vec<String>,
    },
    Opt(EdnsOpt),
    /// Anything the forwarder doesn't interpret — carried opaquely so it
    /// round-trips even for record types this crate has no model for.
    Raw(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DnsResourceRecord {
    pub labels: Vec<String>,
    pub rtype: DnsResourceType,
    pub rclass: DnsResourceClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl DnsResourceRecord {
    pub fn name(&self) -> String {
        labels_to_name(&self.labels)
    }

    pub fn new_opt(udp_payload_size: u16, extended_rcode: u8, version: u8, dnssec_ok: bool) -> Self {
        let mut opt = EdnsOpt::new(udp_payload_size);
        opt.extended_rcode = extended_rcode;
        opt.version = version;
        opt.set_dnssec_ok(dnssec_ok);
        Self {
            labels: vec![],
            rtype: DnsResourceType::OPT,
            rclass: DnsResourceClass::Other(udp_payload_size),
            ttl: ((extended_rcode as u32) << 24) | ((version as u32) << 16) | opt.flags as u32,
            rdata: RData::Opt(opt),
        }
    }

    pub fn as_opt(&self) -> Option<&EdnsOpt> {
        match &self.rdata {
            RData::Opt(opt) => Some(opt),
            _ => None,
        }
    }

    pub fn min_ttl(records: &[DnsResourceRecord]) -> Option<u32> {
        records
            .iter()
            .filter(|r| r.rtype != DnsResourceType::OPT)
            .map(|r| r.ttl)
            .min()
    }
}

impl PacketComponent for DnsResourceRecord {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        match &self.rdata {
            RData::Opt(opt) => {
                writer.write_var::<u16>(16, opt.udp_payload_size)?;
                writer.write_var::<u8>(8, opt.extended_rcode)?;
                writer.write_var::<u8>(8, opt.version)?;
                writer.write_var::<u16>(16, opt.flags)?;
                let mut rdata_bytes = Vec::new();
                for option in &opt.options {
                    rdata_bytes.extend_from_slice(&option.code.to_be_bytes());
                    rdata_bytes.extend_from_slice(&(option.data.len() as u16).to_be_bytes());
                    rdata_bytes.extend_from_slice(&option.data);
                }
                writer.write_var::<u16>(16, rdata_bytes.len() as u16)?;
                for b in &rdata_bytes {
                    writer.write_var::<u8>(8, *b)?;
                }
            }
            other => {
                writer.write_var::<u16>(16, self.rclass.into())?;
                writer.write_var::<u32>(32, self.ttl)?;
                let rdata_bytes = encode_rdata(other)?;
                writer.write_var::<u16>(16, rdata_bytes.len() as u16)?;
                for b in &rdata_bytes {
                    writer.write_var::<u8>(8, *b)?;
                }
            }
        }
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError> {
        self.read_with_buffer_impl(reader, None)
    }

    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        self.read_with_buffer_impl(reader, Some(packet_buf))
    }
}

impl DnsResourceRecord {
    fn read_with_buffer_impl<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: Option<&[u8]>,
    ) -> Result<(), ParseError> {
        let labels = read_labels(reader, packet_buf)?;
        let rtype: DnsResourceType = reader.read_var::<u16>(16)?.into();

        if rtype == DnsResourceType::OPT {
            let udp_payload_size = reader.read_var::<u16>(16)?;
            let extended_rcode = reader.read_var::<u8>(8)?;
            let version = reader.read_var::<u8>(8)?;
            let flags = reader.read_var::<u16>(16)?;
            let rdlen = reader.read_var::<u16>(16)? as usize;
            let mut raw = vec![0u8; rdlen];
            for b in raw.iter_mut() {
                *b = reader.read_var::<u8>(8)?;
            }
            let options = parse_edns_options(&raw)?;
            *self = DnsResourceRecord {
                labels,
                rtype,
                rclass: DnsResourceClass::Other(udp_payload_size),
                ttl: ((extended_rcode as u32) << 24) | ((version as u32) << 16) | flags as u32,
                rdata: RData::Opt(EdnsOpt {
                    udp_payload_size,
                    extended_rcode,
                    version,
                    flags,
                    options,
                }),
            };
            return Ok(());
        }

        let rclass: DnsResourceClass = reader.read_var::<u16>(16)?.into();
        let ttl = reader.read_var::<u32>(32)?;
        let rdlen = reader.read_var::<u16>(16)? as usize;
        let mut raw = vec![0u8; rdlen];
        for b in raw.iter_mut() {
            *b = reader.read_var::<u8>(8)?;
        }
        let rdata = decode_rdata(rtype, &raw, packet_buf)?;

        *self = DnsResourceRecord {
            labels,
            rtype,
            rclass,
            ttl,
            rdata,
        };
        Ok(())
    }
}

fn parse_edns_options(raw: &[u8]) -> Result<Vec<EdnsOption>, ParseError> {
    let mut options = Vec::new();
    let mut i = 0;
    while i + 4 <= raw.len() {
        let code = u16::from_be_bytes([raw[i], raw[i + 1]]);
        let len = u16::from_be_bytes([raw[i + 2], raw[i + 3]]) as usize;
        i += 4;
        let data = raw.get(i..i + len).ok_or(ParseError::InvalidAdditionalSection)?.to_vec();
        i += len;
        options.push(EdnsOption { code, data });
    }
    Ok(options)
}

fn encode_rdata(rdata: &RData) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::new();
    match rdata {
        RData::A(addr) => out.extend_from_slice(&addr.octets()),
        RData::Aaaa(addr) => out.extend_from_slice(&addr.octets()),
        RData::Cname(labels) | RData::Ns(labels) | RData::Ptr(labels) => {
            append_name(&mut out, labels);
        }
        RData::Mx { preference, exchange } => {
            out.extend_from_slice(&preference.to_be_bytes());
            append_name(&mut out, exchange);
        }
        RData::Txt(chunks) => {
            for chunk in chunks {
                out.push(chunk.len().min(255) as u8);
                out.extend_from_slice(&chunk[..chunk.len().min(255)]);
            }
        }
        RData::Soa { mname, rname, serial, refresh, retry, expire, minimum } => {
            append_name(&mut out, mname);
            append_name(&mut out, rname);
            out.extend_from_slice(&serial.to_be_bytes());
            out.extend_from_slice(&refresh.to_be_bytes());
            out.extend_from_slice(&retry.to_be_bytes());
            out.extend_from_slice(&expire.to_be_bytes());
            out.extend_from_slice(&minimum.to_be_bytes());
        }
        RData::Srv { priority, weight, port, target } => {
            out.extend_from_slice(&priority.to_be_bytes());
            out.extend_from_slice(&weight.to_be_bytes());
            out.extend_from_slice(&port.to_be_bytes());
            append_name(&mut out, target);
        }
        RData::Opt(_) => unreachable!("OPT is encoded by the caller"),
        RData::Raw(bytes) => out.extend_from_slice(bytes),
    }
    Ok(out)
}

fn append_name(out: &mut Vec<u8>, labels: &[String]) {
    for label in labels {
        if label.is_empty() {
            continue;
        }
        let bytes = label.as_bytes();
        out.push(bytes.len().min(63) as u8);
        out.extend_from_slice(&bytes[..bytes.len().min(63)]);
    }
    out.push(0);
}

/// Parse an uncompressed name out of a raw RDATA slice, since names inside
/// RDATA may still use compression pointers referencing the outer packet.
fn take_name(raw: &[u8], packet_buf: Option<&[u8]>) -> Result<Vec<String>, ParseError> {
    use bitstream_io::{BigEndian, BitReader};
    let mut cursor = BitReader::endian(raw, BigEndian);
    read_labels(&mut cursor, packet_buf)
}

fn decode_rdata(
    rtype: DnsResourceType,
    raw: &[u8],
    packet_buf: Option<&[u8]>,
) -> Result<RData, ParseError> {
    Ok(match rtype {
        DnsResourceType::A => {
            if raw.len() < 4 {
                return Err(ParseError::InvalidAnswerSection);
            }
            RData::A(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))
        }
        DnsResourceType::AAAA => {
            if raw.len() < 16 {
                return Err(ParseError::InvalidAnswerSection);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&raw[..16]);
            RData::Aaaa(Ipv6Addr::from(octets))
        }
        DnsResourceType::CNAME => RData::Cname(take_name(raw, packet_buf)?),
        DnsResourceType::NS => RData::Ns(take_name(raw, packet_buf)?),
        DnsResourceType::PTR => RData::Ptr(take_name(raw, packet_buf)?),
        DnsResourceType::MX => {
            if raw.len() < 2 {
                return Err(ParseError::InvalidAnswerSection);
            }
            let preference = u16::from_be_bytes([raw[0], raw[1]]);
            let exchange = take_name(&raw[2..], packet_buf)?;
            RData::Mx { preference, exchange }
        }
        DnsResourceType::TXT => {
            let mut chunks = Vec::new();
            let mut i = 0;
            while i < raw.len() {
                let len = raw[i] as usize;
                i += 1;
                let chunk = raw.get(i..i + len).ok_or(ParseError::InvalidAnswerSection)?.to_vec();
                chunks.push(chunk);
                i += len;
            }
            RData::Txt(chunks)
        }
        DnsResourceType::SOA => {
            let mname = take_name(raw, packet_buf)?;
            let mut offset = name_wire_len(&mname);
            let rname = take_name(&raw[offset..], packet_buf)?;
            offset += name_wire_len(&rname);
            let tail = raw.get(offset..offset + 20).ok_or(ParseError::InvalidAnswerSection)?;
            RData::Soa {
                mname,
                rname,
                serial: u32::from_be_bytes(tail[0..4].try_into().unwrap()),
                refresh: u32::from_be_bytes(tail[4..8].try_into().unwrap()),
                retry: u32::from_be_bytes(tail[8..12].try_into().unwrap()),
                expire: u32::from_be_bytes(tail[12..16].try_into().unwrap()),
                minimum: u32::from_be_bytes(tail[16..20].try_into().unwrap()),
            }
        }
        DnsResourceType::SRV => {
            if raw.len() < 6 {
                return Err(ParseError::InvalidAnswerSection);
            }
            let priority = u16::from_be_bytes([raw[0], raw[1]]);
            let weight = u16::from_be_bytes([raw[2], raw[3]]);
            let port = u16::from_be_bytes([raw[4], raw[5]]);
            let target = take_name(&raw[6..], packet_buf)?;
            RData::Srv { priority, weight, port, target }
        }
        _ => RData::Raw(raw.to_vec()),
    })
}

/// Length, in wire bytes, of an uncompressed name encoding of `labels`.
/// Used only to walk past a name we've already decoded inside raw RDATA.
fn name_wire_len(labels: &[String]) -> usize {
    labels.iter().filter(|l| !l.is_empty()).map(|l| l.len() + 1).sum::<usize>() + 1
}
