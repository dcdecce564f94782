//! Plain UDP upstream transport with automatic TCP fallback on a
//! truncated (`TC=1`) response, per RFC 1035 §4.2.1.
//!
//! UDP has no connection to pool: each exchange binds an ephemeral
//! socket, sends, and waits for a matching reply (by ID) or a fixed
//! timeout. The TCP fallback path reuses a [`ReusePool`] of pipelined
//! connections rather than opening a fresh TCP socket per reissue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::cancel::Cancel;
use crate::dns::DnsPacket;
use crate::error::{ForwarderError, Result};

use super::pipelined::PipelinedPool;

const UDP_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct UdpUpstream {
    addr: SocketAddr,
    tcp_fallback: Arc<PipelinedPool>,
}

impl UdpUpstream {
    pub fn new(addr: SocketAddr, tcp_fallback: Arc<PipelinedPool>) -> Self {
        Self { addr, tcp_fallback }
    }

    /// Always tries UDP first. If the response comes back truncated,
    /// reissues the same query over the TCP fallback pool and returns
    /// that result instead.
    pub async fn exchange(&self, query: &DnsPacket, cancel: &Cancel) -> Result<DnsPacket> {
        let response = self.exchange_udp(query, cancel).await?;
        if response.header.tc {
            return self.tcp_fallback.exchange(query, cancel).await;
        }
        Ok(response)
    }

    async fn exchange_udp(&self, query: &DnsPacket, cancel: &Cancel) -> Result<DnsPacket> {
        let local_addr: SocketAddr = if self.addr.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
        socket
            .connect(self.addr)
            .await
            .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;

        let payload = query
            .to_wire()
            .map_err(|e| ForwarderError::MalformedMessage(e.to_string()))?;

        tokio::select! {
            _ = cancel.cancelled() => return Err(ForwarderError::Cancelled),
            sent = timeout(UDP_EXCHANGE_TIMEOUT, socket.send(&payload)) => {
                sent.map_err(|_| ForwarderError::Timeout)?
                    .map_err(|e| ForwarderError::TransportIo(e.to_string()))?;
            }
        }

        let mut buf = vec![0u8; crate::dns::MAX_MESSAGE_SIZE];
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return Err(ForwarderError::Cancelled),
                read = timeout(UDP_EXCHANGE_TIMEOUT, socket.recv(&mut buf)) => {
                    read.map_err(|_| ForwarderError::Timeout)?
                        .map_err(|e| ForwarderError::TransportIo(e.to_string()))?
                }
            };

            let response = DnsPacket::from_wire(&buf[..read])
                .map_err(|e| ForwarderError::MalformedMessage(e.to_string()))?;
            if response.header.id == query.header.id {
                return Ok(response);
            }
            // ID mismatch: a stray reply to a previous exchange on this
            // ephemeral port that hasn't drained yet. Keep waiting for
            // the right one, bounded by the same overall deadline.
        }
    }
}
