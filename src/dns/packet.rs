use bitstream_io::{BigEndian, BitReader, BitWriter};

use super::ParseError;
use super::common::PacketComponent;
use super::constants::{EDNS_UDP_SIZE, EDNS_VERSION, Opcode, Rcode};
use super::enums::{DnsResourceClass, DnsResourceType};
use super::header::DnsHeader;
use super::question::DnsQuestion;
use super::resource::DnsResourceRecord;

/// A full DNS message: header, question, and the three resource sections.
/// `resources` is the additional-records section minus the OPT pseudo
/// record, which is broken out into `edns` for direct access by the
/// context model.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DnsPacket {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsResourceRecord>,
    pub authorities: Vec<DnsResourceRecord>,
    pub resources: Vec<DnsResourceRecord>,
}

impl DnsPacket {
    pub fn new_query(id: u16, qname: &str, qtype: DnsResourceType) -> Self {
        let labels = qname
            .trim_end_matches('.')
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        DnsPacket {
            header: DnsHeader {
                id,
                rd: true,
                qdcount: 1,
                opcode: Opcode::Query as u8,
                ..Default::default()
            },
            questions: vec![DnsQuestion {
                labels,
                qtype,
                qclass: DnsResourceClass::IN,
            }],
            answers: vec![],
            authorities: vec![],
            resources: vec![],
        }
    }

    pub fn update_counts(&mut self) {
        self.header.qdcount = self.questions.len() as u16;
        self.header.ancount = self.answers.len() as u16;
        self.header.nscount = self.authorities.len() as u16;
        self.header.arcount = self.resources.len() as u16;
    }

    /// The EDNS0 OPT record carried in `resources`, if any.
    pub fn edns(&self) -> Option<&DnsResourceRecord> {
        self.resources.iter().find(|r| r.rtype == DnsResourceType::OPT)
    }

    pub fn edns_mut(&mut self) -> Option<&mut DnsResourceRecord> {
        self.resources.iter_mut().find(|r| r.rtype == DnsResourceType::OPT)
    }

    pub fn set_edns(&mut self, opt: DnsResourceRecord) {
        self.resources.retain(|r| r.rtype != DnsResourceType::OPT);
        self.resources.push(opt);
    }

    pub fn max_udp_payload_size(&self) -> u16 {
        self.edns()
            .and_then(|r| r.as_opt())
            .map(|opt| opt.udp_payload_size)
            .unwrap_or(super::constants::UDP_MIN_PAYLOAD as u16)
    }

    /// Build a response skeleton: same id/question/rd, `qr` set, `ra` set,
    /// empty answer sections, with an OPT record mirrored if the request
    /// carried one (matching RFC 6891's requirement that a responder that
    /// understood EDNS0 in the request echoes an OPT record back).
    pub fn create_response(&self, rcode: u8) -> Self {
        let mut response = DnsPacket {
            header: DnsHeader {
                id: self.header.id,
                qr: true,
                opcode: self.header.opcode,
                rd: self.header.rd,
                ra: true,
                rcode,
                qdcount: self.header.qdcount,
                ..Default::default()
            },
            questions: self.questions.clone(),
            answers: vec![],
            authorities: vec![],
            resources: vec![],
        };
        if self.edns().is_some() {
            response.resources.push(DnsResourceRecord::new_opt(
                EDNS_UDP_SIZE,
                0,
                EDNS_VERSION,
                false,
            ));
        }
        response.update_counts();
        response
    }

    pub fn rejection(&self, rcode: u8) -> Self {
        self.create_response(rcode)
    }

    pub fn servfail(&self) -> Self {
        self.create_response(Rcode::SERVFAIL)
    }

    pub fn refused(&self) -> Self {
        self.create_response(Rcode::REFUSED)
    }

    /// Shift every TTL in the answer/authority/additional sections down by
    /// `elapsed` seconds, clamping at zero. Used when serving from cache.
    pub fn age_ttls(&mut self, elapsed: u32) {
        for record in self
            .answers
            .iter_mut()
            .chain(self.authorities.iter_mut())
            .chain(self.resources.iter_mut())
        {
            record.ttl = record.ttl.saturating_sub(elapsed);
        }
    }

    pub fn min_answer_ttl(&self) -> Option<u32> {
        DnsResourceRecord::min_ttl(&self.answers)
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, ParseError> {
        let mut packet = self.clone();
        packet.update_counts();
        let mut bytes = Vec::new();
        {
            let mut writer = BitWriter::endian(&mut bytes, BigEndian);
            packet.header.write(&mut writer)?;
            for q in &packet.questions {
                q.write(&mut writer)?;
            }
            for r in packet
                .answers
                .iter()
                .chain(packet.authorities.iter())
                .chain(packet.resources.iter())
            {
                r.write(&mut writer)?;
            }
        }
        Ok(bytes)
    }

    pub fn from_wire(buf: &[u8]) -> Result<Self, ParseError> {
        let mut reader: BitReader<&[u8], BigEndian> = BitReader::endian(buf, BigEndian);
        let mut header = DnsHeader::default();
        header.read(&mut reader)?;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let mut q = DnsQuestion::default();
            q.read_with_buffer(&mut reader, buf)?;
            questions.push(q);
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            let mut r = empty_record();
            r.read_with_buffer(&mut reader, buf)?;
            answers.push(r);
        }

        let mut authorities = Vec::with_capacity(header.nscount as usize);
        for _ in 0..header.nscount {
            let mut r = empty_record();
            r.read_with_buffer(&mut reader, buf)?;
            authorities.push(r);
        }

        let mut resources = Vec::with_capacity(header.arcount as usize);
        for _ in 0..header.arcount {
            let mut r = empty_record();
            r.read_with_buffer(&mut reader, buf)?;
            resources.push(r);
        }

        Ok(DnsPacket {
            header,
            questions,
            answers,
            authorities,
            resources,
        })
    }
}

fn empty_record() -> DnsResourceRecord {
    DnsResourceRecord {
        labels: vec![],
        rtype: DnsResourceType::Unknown,
        rclass: DnsResourceClass::IN,
        ttl: 0,
        rdata: super::resource::RData::Raw(vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_query() {
        let query = DnsPacket::new_query(0x1234, "example.com.", DnsResourceType::A);
        let wire = query.to_wire().unwrap();
        let decoded = DnsPacket::from_wire(&wire).unwrap();
        assert_eq!(decoded.header.id, 0x1234);
        assert_eq!(decoded.questions.len(), 1);
        assert_eq!(decoded.questions[0].qname(), "example.com");
    }

    #[test]
    fn create_response_preserves_id_and_question() {
        let query = DnsPacket::new_query(7, "a.test.", DnsResourceType::AAAA);
        let response = query.create_response(Rcode::NOERROR);
        assert_eq!(response.header.id, 7);
        assert!(response.header.qr);
        assert_eq!(response.questions, query.questions);
    }
}
