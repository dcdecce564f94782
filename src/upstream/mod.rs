//! Upstream connection core: per-upstream transports (UDP/TCP/DoT/DoH/
//! DoQ), the pipelined and serial-reuse connection pools they're built
//! from, and the `UpstreamUrl` config surface that selects between them.

pub mod cert_gen;
pub mod conn;
pub mod doh;
pub mod doq;
pub mod pipelined;
pub mod reuse;
pub mod tls;
pub mod udp;
pub mod url;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;

use crate::dns::DnsPacket;
use crate::error::{ForwarderError, Result};

pub use conn::{ConnState, DnsConn, ReservedExchanger};
pub use url::{Scheme, UpstreamUrl};

/// One configured upstream resolver, dispatching each exchange to the
/// transport its URL scheme selected.
pub enum Upstream {
    Udp(udp::UdpUpstream),
    Tcp(Arc<pipelined::PipelinedPool>),
    Tls(Arc<pipelined::PipelinedPool>),
    Https(doh::DohUpstream),
    Quic(doq::DoqUpstream),
}

impl Upstream {
    pub async fn exchange(&self, query: &DnsPacket, cancel: &crate::cancel::Cancel) -> Result<DnsPacket> {
        match self {
            Upstream::Udp(u) => u.exchange(query, cancel).await,
            Upstream::Tcp(pool) => pool.exchange(query, cancel).await,
            Upstream::Tls(pool) => pool.exchange(query, cancel).await,
            Upstream::Https(u) => u.exchange(query, cancel).await,
            Upstream::Quic(u) => u.exchange(query, cancel).await,
        }
    }
}

/// Resolves an `UpstreamUrl` to a concrete `Upstream`, dialing the
/// transport-specific pools lazily (no connection is opened until the
/// first `exchange` call reserves one).
pub async fn build(
    parsed: &UpstreamUrl,
    tls_ca_pem: Option<Vec<u8>>,
    tls_insecure_skip_verify: bool,
) -> Result<Upstream> {
    let addr = resolve_addr(parsed).await?;

    match parsed.scheme {
        Scheme::Udp => {
            let tcp_dialer: pipelined::Dialer = Arc::new(move || {
                Box::pin(async move {
                    let stream = TcpStream::connect(addr)
                        .await
                        .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
                    Ok(pipelined::PipelinedConn::spawn(stream))
                })
            });
            let tcp_fallback = Arc::new(pipelined::PipelinedPool::with_default_max_conn(tcp_dialer));
            Ok(Upstream::Udp(udp::UdpUpstream::new(addr, tcp_fallback)))
        }
        Scheme::Tcp => {
            let dialer: pipelined::Dialer = Arc::new(move || {
                Box::pin(async move {
                    let stream = TcpStream::connect(addr)
                        .await
                        .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
                    Ok(pipelined::PipelinedConn::spawn(stream))
                })
            });
            Ok(Upstream::Tcp(Arc::new(
                pipelined::PipelinedPool::with_default_max_conn(dialer),
            )))
        }
        Scheme::Tls => {
            let host = parsed.host.clone();
            let connector = tls::build_connector(tls_ca_pem.as_deref(), tls_insecure_skip_verify)?;
            let dialer: pipelined::Dialer = Arc::new(move || {
                let connector = connector.clone();
                let host = host.clone();
                Box::pin(async move {
                    let tcp = TcpStream::connect(addr)
                        .await
                        .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
                    let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                        .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
                    let tls_stream = connector
                        .connect(server_name, tcp)
                        .await
                        .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
                    Ok(pipelined::PipelinedConn::spawn(tls_stream))
                })
            });
            Ok(Upstream::Tls(Arc::new(
                pipelined::PipelinedPool::with_default_max_conn(dialer),
            )))
        }
        Scheme::Https => {
            let connector = tls::build_connector(tls_ca_pem.as_deref(), tls_insecure_skip_verify)?;
            Ok(Upstream::Https(doh::DohUpstream::new(
                addr,
                parsed.host.clone(),
                parsed.path.clone(),
                connector,
            )))
        }
        Scheme::Quic => {
            let client_config =
                tls::build_quic_client_config(tls_ca_pem.as_deref(), tls_insecure_skip_verify)?;
            let quic_client_config = quinn::ClientConfig::new(Arc::new(
                quinn::crypto::rustls::QuicClientConfig::try_from(client_config)
                    .map_err(|e| ForwarderError::ConfigInvalid(e.to_string()))?,
            ));
            Ok(Upstream::Quic(doq::DoqUpstream::new(
                addr,
                parsed.host.clone(),
                quic_client_config,
            )?))
        }
    }
}

/// Adapts an `Upstream` into a pipeline leaf action: exchanges the
/// context's request and installs the result as the response, or
/// rejects SERVFAIL on failure per the engine's unhandled-error policy.
pub struct UpstreamExecutable {
    upstream: Upstream,
}

impl UpstreamExecutable {
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

#[async_trait::async_trait]
impl crate::pipeline::Executable for UpstreamExecutable {
    async fn execute(
        &self,
        ctx: &mut crate::context::QueryContext,
        cancel: &crate::cancel::Cancel,
    ) -> Result<()> {
        match self.upstream.exchange(&ctx.request, cancel).await {
            Ok(response) => {
                ctx.set_response(response);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(%err, "upstream exchange failed");
                ctx.reject(crate::dns::Rcode::SERVFAIL);
                Ok(())
            }
        }
    }
}

async fn resolve_addr(parsed: &UpstreamUrl) -> Result<SocketAddr> {
    if let Ok(ip) = parsed.host.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, parsed.port));
    }
    let mut addrs = tokio::net::lookup_host((parsed.host.as_str(), parsed.port))
        .await
        .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
    addrs
        .next()
        .ok_or_else(|| ForwarderError::TransportDial(format!("no addresses for {}", parsed.host)))
}
