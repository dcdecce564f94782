//! DNS-over-TLS server front-end (RFC 7858): a `TlsAcceptor` in front of
//! the same length-prefixed framing and query loop the plain-TCP
//! front-end uses.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, warn};

use super::ServerContext;

pub async fn run(listener: TcpListener, acceptor: TlsAcceptor, ctx: Arc<ServerContext>) {
    let mut shutdown = ctx.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let acceptor = acceptor.clone();
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(tls_stream) => {
                                    let (read_half, write_half) = tokio::io::split(tls_stream);
                                    super::tcp::serve_framed(read_half, write_half, addr, ctx).await;
                                }
                                Err(err) => {
                                    warn!(%err, %addr, "dot tls handshake failed");
                                }
                            }
                        });
                    }
                    Err(err) => {
                        error!(%err, "dot accept error, stopping listener");
                        return;
                    }
                }
            }
        }
    }
}
