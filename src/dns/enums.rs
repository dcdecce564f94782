//! Record type/class enums. Trimmed to the types the forwarder core
//! actually needs to reason about; unknown wire values round-trip through
//! `Other(u16)` rather than being rejected, since a forwarder must be able
//! to carry record types it doesn't understand.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsResourceType {
    #[default]
    Unknown,
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    OPT,
    HTTPS,
    SVCB,
    CAA,
    ANY,
    Other(u16),
}

impl From<u16> for DnsResourceType {
    fn from(value: u16) -> Self {
        match value {
            1 => DnsResourceType::A,
            2 => DnsResourceType::NS,
            5 => DnsResourceType::CNAME,
            6 => DnsResourceType::SOA,
            12 => DnsResourceType::PTR,
            15 => DnsResourceType::MX,
            16 => DnsResourceType::TXT,
            28 => DnsResourceType::AAAA,
            33 => DnsResourceType::SRV,
            41 => DnsResourceType::OPT,
            64 => DnsResourceType::SVCB,
            65 => DnsResourceType::HTTPS,
            257 => DnsResourceType::CAA,
            255 => DnsResourceType::ANY,
            other => DnsResourceType::Other(other),
        }
    }
}

impl From<DnsResourceType> for u16 {
    fn from(value: DnsResourceType) -> Self {
        match value {
            DnsResourceType::Unknown => 0,
            DnsResourceType::A => 1,
            DnsResourceType::NS => 2,
            DnsResourceType::CNAME => 5,
            DnsResourceType::SOA => 6,
            DnsResourceType::PTR => 12,
            DnsResourceType::MX => 15,
            DnsResourceType::TXT => 16,
            DnsResourceType::AAAA => 28,
            DnsResourceType::SRV => 33,
            DnsResourceType::OPT => 41,
            DnsResourceType::SVCB => 64,
            DnsResourceType::HTTPS => 65,
            DnsResourceType::CAA => 257,
            DnsResourceType::ANY => 255,
            DnsResourceType::Other(v) => v,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsResourceClass {
    #[default]
    IN,
    CH,
    HS,
    ANY,
    Other(u16),
}

impl From<u16> for DnsResourceClass {
    fn from(value: u16) -> Self {
        match value {
            1 => DnsResourceClass::IN,
            3 => DnsResourceClass::CH,
            4 => DnsResourceClass::HS,
            255 => DnsResourceClass::ANY,
            other => DnsResourceClass::Other(other),
        }
    }
}

impl From<DnsResourceClass> for u16 {
    fn from(value: DnsResourceClass) -> Self {
        match value {
            DnsResourceClass::IN => 1,
            DnsResourceClass::CH => 3,
            DnsResourceClass::HS => 4,
            DnsResourceClass::ANY => 255,
            DnsResourceClass::Other(v) => v,
        }
    }
}
