use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::common::{PacketComponent, labels_to_name, read_labels, write_labels};
use super::enums::{DnsResourceClass, DnsResourceType};
use super::ParseError;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DnsQuestion {
    pub labels: Vec<String>,
    pub qtype: DnsResourceType,
    pub qclass: DnsResourceClass,
}

impl DnsQuestion {
    pub fn qname(&self) -> String {
        labels_to_name(&self.labels)
    }
}

impl PacketComponent for DnsQuestion {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.qtype.into())?;
        writer.write_var::<u16>(16, self.qclass.into())?;
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError> {
        self.labels = read_labels(reader, None)?;
        self.qtype = reader.read_var::<u16>(16)?.into();
        self.qclass = reader.read_var::<u16>(16)?.into();
        Ok(())
    }

    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        self.labels = read_labels(reader, Some(packet_buf))?;
        self.qtype = reader.read_var::<u16>(16)?.into();
        self.qclass = reader.read_var::<u16>(16)?.into();
        Ok(())
    }
}
