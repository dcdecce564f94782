pub mod common;
pub mod constants;
pub mod edns;
pub mod enums;
pub mod header;
pub mod packet;
pub mod question;
pub mod resource;
pub mod util;

pub use constants::{EDNS_UDP_SIZE, EDNS_VERSION, MAX_MESSAGE_SIZE, Opcode, Rcode, UDP_MIN_PAYLOAD};
pub use edns::EdnsOpt;
pub use enums::{DnsResourceClass, DnsResourceType};
pub use header::DnsHeader;
pub use packet::DnsPacket;
pub use question::DnsQuestion;
pub use resource::{DnsResourceRecord, RData};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("invalid DNS header")]
    InvalidHeader,
    #[error("invalid DNS label")]
    InvalidLabel,
    #[error("invalid question section")]
    InvalidQuestionSection,
    #[error("invalid answer section")]
    InvalidAnswerSection,
    #[error("invalid authority section")]
    InvalidAuthoritySection,
    #[error("invalid additional section")]
    InvalidAdditionalSection,
    #[error("invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::InvalidBitStream(err.to_string())
    }
}

impl From<ParseError> for crate::error::ForwarderError {
    fn from(err: ParseError) -> Self {
        crate::error::ForwarderError::MalformedMessage(err.to_string())
    }
}
