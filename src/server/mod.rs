//! Server front-ends: UDP, TCP, DoT, DoH, and DoQ listeners that all
//! funnel accepted queries through the same pipeline execution.
//!
//! Shared accept-loop contract across every front-end:
//! - a listener/accept error is fatal to that front-end (it returns,
//!   logging at error level; the caller decides whether to restart it)
//! - each accepted connection/query is handled in its own spawned task
//!   so one slow client can't stall others
//! - a query that somehow leaves the pipeline with no response is
//!   answered REFUSED rather than dropped
//! - stream-oriented protocols apply a first-read timeout while waiting
//!   for the first query, then a longer idle timeout between queries,
//!   and serialize writes behind a short write deadline — a write error
//!   closes the connection

pub mod doh;
pub mod doq;
pub mod dot;
pub mod tcp;
pub mod udp;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{self, Cache};
use crate::cancel::Cancel;
use crate::context::QueryContext;
use crate::dns::{DnsPacket, Rcode};
use crate::graceful_shutdown::GracefulShutdown;
use crate::pipeline::ChainNode;

/// How long a stream-oriented listener waits for the first query on a
/// freshly accepted connection before giving up on it.
pub const FIRST_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a stream-oriented connection may sit idle between queries
/// before the server closes it.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for writing one framed response back to the client; writes
/// are serialized per connection, and a write that blows this deadline
/// closes the connection rather than wedging the queue behind it.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(1);

/// Shared state every front-end runs queries against.
pub struct ServerContext {
    pub chain: Arc<Vec<ChainNode>>,
    pub cache: Option<Arc<Cache>>,
    pub shutdown: Arc<GracefulShutdown>,
    pub lazy_cache_ttl: Option<u64>,
    pub cache_everything: bool,
}

impl ServerContext {
    pub fn new(chain: Arc<Vec<ChainNode>>, shutdown: Arc<GracefulShutdown>) -> Self {
        Self {
            chain,
            cache: None,
            shutdown,
            lazy_cache_ttl: None,
            cache_everything: false,
        }
    }

    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Reads one length-prefixed DNS message off any framed duplex stream
/// half, or `None` on clean EOF. Shared by the plain-TCP and DoT
/// front-ends, which differ only in what's underneath the framing.
pub async fn read_framed<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<Vec<u8>>> {
    use tokio::io::AsyncReadExt;
    let mut len_buf = [0u8; 2];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

pub async fn write_framed<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    let len = payload.len() as u16;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Runs one query through the cache (if configured) and the pipeline,
/// returning a response with the original request ID. Never returns
/// `None` — an unhandled error or empty pipeline result becomes REFUSED,
/// per the "nil response" contract every front-end relies on.
pub async fn process_query(
    ctx: &ServerContext,
    request: DnsPacket,
    client_addr: Option<SocketAddr>,
    server_name: Option<String>,
) -> DnsPacket {
    let mut qctx = QueryContext::new(request, client_addr);
    qctx.server_name = server_name;
    let cancel = ctx.shutdown.root_cancel().child();

    if let Some(cache) = &ctx.cache {
        if cache::is_cacheable_request(&qctx.request, ctx.cache_everything) {
            if let Some(fp) = cache::Fingerprint::from_context(&qctx) {
                let now = now_secs();
                match cache.lookup(&fp, now).await {
                    Some(cache::Lookup::Fresh(response)) => {
                        qctx.set_response(response);
                        return qctx.response.unwrap_or_else(|| qctx.request.refused());
                    }
                    Some(cache::Lookup::Lazy(response)) => {
                        let chain = ctx.chain.clone();
                        let lazy_cache_ttl = ctx.lazy_cache_ttl;
                        let refresh_request = qctx.request.clone();
                        let refresh_addr = client_addr;
                        let refresh_cancel = cancel.clone();
                        cache
                            .refresh(fp, now, move || async move {
                                let mut refresh_ctx =
                                    QueryContext::new(refresh_request, refresh_addr);
                                crate::pipeline::engine::execute(
                                    chain,
                                    &mut refresh_ctx,
                                    &refresh_cancel,
                                )
                                .await;
                                refresh_ctx
                                    .response
                                    .ok_or(crate::error::ForwarderError::NoUpstreamAvailable)
                            })
                            .await;
                        let _ = lazy_cache_ttl;
                        qctx.set_response(response);
                        return qctx.response.unwrap_or_else(|| qctx.request.refused());
                    }
                    None => {}
                }
            }
        }
    }

    let original_request = qctx.request.clone();
    crate::pipeline::engine::execute(ctx.chain.clone(), &mut qctx, &cancel).await;

    if let (Some(cache), Some(response)) = (&ctx.cache, &qctx.response) {
        if cache::is_cacheable_request(&original_request, ctx.cache_everything) {
            if let Some(fp) = cache::Fingerprint::from_context(&QueryContext::new(
                original_request,
                client_addr,
            )) {
                let _ = cache.store(&fp, response, now_secs(), ctx.lazy_cache_ttl).await;
            }
        }
    }

    match qctx.response {
        Some(response) => response,
        None => qctx.request.rejection(Rcode::REFUSED),
    }
}

/// Convenience used by listeners that must answer a request they
/// couldn't even parse (garbage bytes): a bare `REFUSED` with a
/// synthetic ID of 0, since there's no original ID to echo.
pub fn refused_for_unparsable() -> DnsPacket {
    let mut packet = DnsPacket::new_query(0, ".", crate::dns::DnsResourceType::A);
    packet.header.qr = true;
    packet.header.rcode = Rcode::REFUSED;
    packet
}
