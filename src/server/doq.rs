//! DNS-over-QUIC server front-end (RFC 9250): one stream per query,
//! length-prefixed the same way the client side frames it.

use std::sync::Arc;

use quinn::Endpoint;
use tracing::{error, warn};

use crate::dns::DnsPacket;

use super::{ServerContext, read_framed, write_framed};

pub async fn run(endpoint: Endpoint, ctx: Arc<ServerContext>) {
    let mut shutdown = ctx.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                endpoint.close(0u32.into(), b"shutting down");
                return;
            }
            incoming = endpoint.accept() => {
                match incoming {
                    Some(incoming) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            match incoming.await {
                                Ok(connection) => handle_connection(connection, ctx).await,
                                Err(err) => warn!(%err, "doq handshake failed"),
                            }
                        });
                    }
                    None => {
                        error!("doq endpoint closed, stopping listener");
                        return;
                    }
                }
            }
        }
    }
}

async fn handle_connection(connection: quinn::Connection, ctx: Arc<ServerContext>) {
    let addr = connection.remote_address();
    loop {
        match connection.accept_bi().await {
            Ok((send, recv)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    handle_stream(send, recv, addr, ctx).await;
                });
            }
            Err(_) => return,
        }
    }
}

async fn handle_stream(
    mut send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    addr: std::net::SocketAddr,
    ctx: Arc<ServerContext>,
) {
    let body = match read_framed(&mut recv).await {
        Ok(Some(body)) => body,
        Ok(None) => return,
        Err(err) => {
            warn!(%err, %addr, "doq stream read error");
            return;
        }
    };

    let request = match DnsPacket::from_wire(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(%err, %addr, "dropping unparsable doq query");
            return;
        }
    };

    let response = super::process_query(&ctx, request, Some(addr), None).await;
    let wire = match response.to_wire() {
        Ok(wire) => wire,
        Err(err) => {
            warn!(%err, %addr, "failed to encode doq response");
            return;
        }
    };

    if let Err(err) = write_framed(&mut send, &wire).await {
        warn!(%err, %addr, "doq stream write error");
        return;
    }
    let _ = send.finish();
}
