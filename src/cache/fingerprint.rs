use crate::context::QueryContext;
use crate::dns::DnsQuestion;

/// The deterministic cache key derived from a query's question plus the
/// AD/CD/DO header bits — byte layout is part of the on-disk/Redis
/// contract, not just an in-process hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// `byte 0`: flags (bit0 AD, bit1 CD, bit2 DO); `bytes 1..3`: qtype
    /// big-endian; `byte 3`: qname length; remainder: lowercased qname
    /// without a trailing dot.
    pub fn new(question: &DnsQuestion, ad: bool, cd: bool, dnssec_ok: bool) -> Self {
        let qname = question.qname();
        let qname_bytes = qname.trim_end_matches('.').to_lowercase();
        let qname_bytes = qname_bytes.as_bytes();

        let mut flags = 0u8;
        if ad {
            flags |= 0b001;
        }
        if cd {
            flags |= 0b010;
        }
        if dnssec_ok {
            flags |= 0b100;
        }

        let qtype: u16 = question.qtype.into();
        let mut buf = Vec::with_capacity(4 + qname_bytes.len());
        buf.push(flags);
        buf.extend_from_slice(&qtype.to_be_bytes());
        buf.push(qname_bytes.len() as u8);
        buf.extend_from_slice(qname_bytes);
        Self(buf)
    }

    pub fn from_context(ctx: &QueryContext) -> Option<Self> {
        let question = ctx.request.questions.first()?;
        let header = &ctx.request.header;
        Some(Self::new(
            question,
            header.ad(),
            header.cd(),
            ctx.opt
                .from_client
                .as_ref()
                .is_some_and(|o| o.dnssec_ok()),
        ))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// A cheap shard selector; independent of the process-restart-stable
    /// byte layout above, this is allowed to change across versions.
    pub fn shard_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsResourceClass, DnsResourceType};

    #[test]
    fn layout_matches_spec_byte_order() {
        let question = DnsQuestion {
            labels: vec!["example".into(), "com".into()],
            qtype: DnsResourceType::A,
            qclass: DnsResourceClass::IN,
        };
        let fp = Fingerprint::new(&question, true, false, false);
        let bytes = fp.as_bytes();
        assert_eq!(bytes[0], 0b001);
        assert_eq!(u16::from_be_bytes([bytes[1], bytes[2]]), 1u16);
        assert_eq!(bytes[3] as usize, "example.com".len());
        assert_eq!(&bytes[4..], b"example.com");
    }
}
