//! DNS-over-HTTPS (RFC 8484) client.
//!
//! Encodes the query as a GET with a base64url `dns=` parameter (the
//! cacheable form RFC 8484 §4.1 recommends over POST), zeroes the
//! message ID on the wire per the RFC's guidance that the ID carries no
//! meaning over HTTPS, and caps the response body at 4KiB — DoH
//! responses are ordinary DNS messages and have no business exceeding
//! the wire size limit by much.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::Uri;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::cancel::Cancel;
use crate::dns::DnsPacket;
use crate::error::{ForwarderError, Result};

const MAX_RESPONSE_BYTES: usize = 4096;
const INTERNAL_TIMEOUT: Duration = Duration::from_secs(6);

pub struct DohUpstream {
    addr: SocketAddr,
    host: String,
    path: String,
    connector: TlsConnector,
}

impl DohUpstream {
    pub fn new(addr: SocketAddr, host: String, path: String, connector: TlsConnector) -> Self {
        let path = if path.is_empty() {
            "/dns-query".to_string()
        } else {
            path
        };
        Self {
            addr,
            host,
            path,
            connector,
        }
    }

    /// `cancel` is accepted for trait uniformity with the other
    /// transports but deliberately not raced against the request: per
    /// §4.2.5 an independent internal timeout governs this exchange so a
    /// caller cancellation can't tear down the underlying HTTP/1.1
    /// connection mid-response.
    pub async fn exchange(&self, query: &DnsPacket, _cancel: &Cancel) -> Result<DnsPacket> {
        timeout(INTERNAL_TIMEOUT, self.exchange_inner(query))
            .await
            .map_err(|_| ForwarderError::Timeout)?
    }

    async fn exchange_inner(&self, query: &DnsPacket) -> Result<DnsPacket> {
        let mut wire_query = query.clone();
        wire_query.header.id = 0;
        let payload = wire_query
            .to_wire()
            .map_err(|e| ForwarderError::MalformedMessage(e.to_string()))?;
        let encoded = URL_SAFE_NO_PAD.encode(payload);

        let tcp = TcpStream::connect(self.addr)
            .await
            .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
        let server_name = rustls::pki_types::ServerName::try_from(self.host.clone())
            .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
        let tls_stream = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;

        let io = TokioIo::new(tls_stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ForwarderError::TransportIo(e.to_string()))?;
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let uri: Uri = format!("https://{}{}?dns={}", self.host, self.path, encoded)
            .parse()
            .map_err(|e: http::uri::InvalidUri| ForwarderError::TransportDial(e.to_string()))?;

        let request = http::Request::builder()
            .method("GET")
            .uri(uri)
            .header("host", &self.host)
            .header("accept", "application/dns-message")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| ForwarderError::TransportIo(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ForwarderError::TransportIo(format!(
                "doh upstream returned status {}",
                response.status()
            )));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ForwarderError::TransportIo(e.to_string()))?
            .to_bytes();

        if body.len() > MAX_RESPONSE_BYTES {
            return Err(ForwarderError::PayloadOverflow(body.len()));
        }

        let mut parsed = DnsPacket::from_wire(&body)
            .map_err(|e| ForwarderError::MalformedMessage(e.to_string()))?;
        parsed.header.id = query.header.id;
        Ok(parsed)
    }
}
