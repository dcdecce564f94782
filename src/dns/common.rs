use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Shared read/write contract for wire-format pieces of a DNS message.
///
/// `read_with_buffer` gets access to the whole packet buffer so it can
/// follow compression pointers (RFC 1035 §4.1.4); `read` alone cannot.
pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError>;

    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        _packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        self.read(reader)
    }
}

const MAX_COMPRESSION_JUMPS: usize = 64;

/// Write a sequence of labels terminated by a root (zero-length) label.
/// The forwarder never emits compression pointers on write; upstream and
/// client parsers are required to accept uncompressed names.
pub fn write_labels<E: Endianness>(
    writer: &mut BitWriter<&mut Vec<u8>, E>,
    labels: &[String],
) -> Result<(), ParseError> {
    for label in labels {
        if label.is_empty() {
            continue;
        }
        let bytes = label.as_bytes();
        if bytes.len() > 63 {
            return Err(ParseError::InvalidLabel);
        }
        writer.write_var::<u8>(8, bytes.len() as u8)?;
        for b in bytes {
            writer.write_var::<u8>(8, *b)?;
        }
    }
    writer.write_var::<u8>(8, 0)?;
    Ok(())
}

/// Read a label sequence, following compression pointers against
/// `packet_buf` when present (decode path). On the encode/no-buffer path
/// (writing our own queries) pointers never appear.
pub fn read_labels<E: Endianness>(
    reader: &mut BitReader<&[u8], E>,
    packet_buf: Option<&[u8]>,
) -> Result<Vec<String>, ParseError> {
    let mut labels = Vec::new();
    let mut jumps = 0;

    loop {
        let len = reader.read_var::<u8>(8)?;
        if len == 0 {
            break;
        }
        if len & 0xC0 == 0xC0 {
            let lo = reader.read_var::<u8>(8)?;
            let pointer = (((len & 0x3F) as u16) << 8) | lo as u16;
            let buf = packet_buf.ok_or(ParseError::InvalidLabel)?;
            jumps += 1;
            if jumps > MAX_COMPRESSION_JUMPS {
                return Err(ParseError::InvalidLabel);
            }
            let (pointed, _) = read_name_at(buf, pointer as usize, jumps)?;
            labels.extend(pointed);
            break;
        }
        let mut label = vec![0u8; len as usize];
        for b in label.iter_mut() {
            *b = reader.read_var::<u8>(8)?;
        }
        labels.push(String::from_utf8_lossy(&label).into_owned());
    }

    Ok(labels)
}

/// Follow a compression pointer into the raw packet buffer, returning the
/// labels found there plus the offset just past the terminator/pointer.
fn read_name_at(
    buf: &[u8],
    mut offset: usize,
    mut jumps: usize,
) -> Result<(Vec<String>, usize), ParseError> {
    let mut labels = Vec::new();
    loop {
        let len = *buf.get(offset).ok_or(ParseError::InvalidLabel)? as usize;
        if len == 0 {
            offset += 1;
            break;
        }
        if len & 0xC0 == 0xC0 {
            let lo = *buf.get(offset + 1).ok_or(ParseError::InvalidLabel)?;
            let pointer = (((len as u16) & 0x3F) << 8) | lo as u16;
            jumps += 1;
            if jumps > MAX_COMPRESSION_JUMPS {
                return Err(ParseError::InvalidLabel);
            }
            let (pointed, _) = read_name_at(buf, pointer as usize, jumps)?;
            labels.extend(pointed);
            offset += 2;
            break;
        }
        let start = offset + 1;
        let end = start + len;
        let slice = buf.get(start..end).ok_or(ParseError::InvalidLabel)?;
        labels.push(String::from_utf8_lossy(slice).into_owned());
        offset = end;
    }
    Ok((labels, offset))
}

/// Join labels into a dotted, lowercased, trailing-dot-free qname.
pub fn labels_to_name(labels: &[String]) -> String {
    labels
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| l.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}
