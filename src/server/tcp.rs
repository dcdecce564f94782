//! Plain TCP server front-end: length-prefixed framing, the first query
//! bounded by [`FIRST_READ_TIMEOUT`], subsequent queries bounded by
//! [`IDLE_TIMEOUT`], with writes serialized behind a short per-write
//! deadline so one slow client can't starve its own queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, warn};

use crate::dns::DnsPacket;

use super::{FIRST_READ_TIMEOUT, IDLE_TIMEOUT, ServerContext, WRITE_DEADLINE, read_framed, write_framed};

pub async fn run(listener: TcpListener, ctx: Arc<ServerContext>) {
    let mut shutdown = ctx.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, addr, ctx).await;
                        });
                    }
                    Err(err) => {
                        error!(%err, "tcp accept error, stopping listener");
                        return;
                    }
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, ctx: Arc<ServerContext>) {
    let (read_half, write_half) = tokio::io::split(stream);
    serve_framed(read_half, write_half, addr, ctx).await;
}

/// Drives one connection's query loop over any already-established
/// framed duplex stream (plain TCP here, TLS in `dot.rs`).
pub async fn serve_framed<R, W>(mut read_half: R, write_half: W, addr: SocketAddr, ctx: Arc<ServerContext>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let write_half = Arc::new(Mutex::new(write_half));
    let closed = Arc::new(AtomicBool::new(false));
    let mut first = true;

    loop {
        if closed.load(Ordering::Acquire) {
            return;
        }
        let deadline = if first { FIRST_READ_TIMEOUT } else { IDLE_TIMEOUT };
        first = false;

        let body = match timeout(deadline, read_framed(&mut read_half)).await {
            Ok(Ok(Some(body))) => body,
            Ok(Ok(None)) => return,
            Ok(Err(err)) => {
                warn!(%err, %addr, "tcp read error, closing connection");
                return;
            }
            Err(_) => return,
        };

        let ctx = ctx.clone();
        let write_half = write_half.clone();
        let closed = closed.clone();
        tokio::spawn(async move {
            let request = match DnsPacket::from_wire(&body) {
                Ok(request) => request,
                Err(err) => {
                    warn!(%err, %addr, "dropping unparsable tcp query");
                    return;
                }
            };
            let response = super::process_query(&ctx, request, Some(addr), None).await;
            let wire = match response.to_wire() {
                Ok(wire) => wire,
                Err(err) => {
                    warn!(%err, %addr, "failed to encode tcp response");
                    return;
                }
            };
            let mut writer = write_half.lock().await;
            match timeout(WRITE_DEADLINE, write_framed(&mut *writer, &wire)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(%err, %addr, "tcp write error, closing connection");
                    closed.store(true, Ordering::Release);
                }
                Err(_) => {
                    warn!(%addr, "tcp write deadline exceeded, closing connection");
                    closed.store(true, Ordering::Release);
                }
            }
        });
    }
}

