//! UDP server front-end: one socket, one query per datagram, handled in
//! its own spawned task (mirrors the teacher's `recv_from` accept loop
//! in `protocol/udp.rs`, generalized from a fixed resolver call to the
//! configured pipeline).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{error, warn};

use crate::dns::DnsPacket;

use super::ServerContext;

pub async fn run(socket: UdpSocket, ctx: Arc<ServerContext>) {
    let socket = Arc::new(socket);
    let mut shutdown = ctx.shutdown.subscribe();
    let mut buf = vec![0u8; crate::dns::EDNS_UDP_SIZE as usize];

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                return;
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, addr)) => {
                        let data = buf[..len].to_vec();
                        let socket = socket.clone();
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            handle_datagram(socket, data, addr, ctx).await;
                        });
                    }
                    Err(err) => {
                        error!(%err, "udp socket error, stopping listener");
                        return;
                    }
                }
            }
        }
    }
}

async fn handle_datagram(socket: Arc<UdpSocket>, data: Vec<u8>, addr: SocketAddr, ctx: Arc<ServerContext>) {
    let request = match DnsPacket::from_wire(&data) {
        Ok(request) => request,
        Err(err) => {
            warn!(%err, %addr, "dropping unparsable udp datagram");
            return;
        }
    };

    let response = super::process_query(&ctx, request, Some(addr), None).await;
    let wire = match response.to_wire() {
        Ok(wire) => wire,
        Err(err) => {
            warn!(%err, %addr, "failed to encode udp response");
            return;
        }
    };

    if let Err(err) = socket.send_to(&wire, addr).await {
        warn!(%err, %addr, "failed to send udp response");
    }
}
