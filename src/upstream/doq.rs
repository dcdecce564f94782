//! DNS-over-QUIC (RFC 9250) client.
//!
//! The QUIC connection is dialed once and reused across queries (it is
//! cheap to clone — `quinn::Connection` is a handle onto shared state);
//! each query still gets its own bidirectional stream: open, write the
//! length-prefixed query, half-close the send side, read the
//! length-prefixed response, close the stream. The message ID is always
//! zero on the wire (RFC 9250 §4.2.1) and restored from the original
//! query before returning. A cancelled exchange resets its own stream
//! with `DOQ_REQUEST_CANCELLED` and leaves the connection open for other
//! streams.

use std::net::SocketAddr;
use std::time::Duration;

use quinn::{ClientConfig, Connection, Endpoint};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::cancel::Cancel;
use crate::dns::DnsPacket;
use crate::error::{ForwarderError, Result};

const STREAM_DEADLINE: Duration = Duration::from_secs(6);

/// Application-layer QUIC error code this client emits when resetting a
/// stream, per RFC 9250 §4.3. Successful exchanges finish the stream
/// normally instead (`send.finish()`) and leave the connection open for
/// other streams.
const DOQ_REQUEST_CANCELLED: u32 = 0x3;

pub struct DoqUpstream {
    addr: SocketAddr,
    server_name: String,
    endpoint: Endpoint,
    connection: Mutex<Option<Connection>>,
}

impl DoqUpstream {
    pub fn new(addr: SocketAddr, server_name: String, client_config: ClientConfig) -> Result<Self> {
        let bind_addr: SocketAddr = if addr.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let mut endpoint = Endpoint::client(bind_addr)
            .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
        endpoint.set_default_client_config(client_config);
        Ok(Self {
            addr,
            server_name,
            endpoint,
            connection: Mutex::new(None),
        })
    }

    /// Returns the live connection, reusing it if still open, dialing a
    /// fresh one otherwise. Held across queries so DoQ behaves like the
    /// other pipelined transports rather than reconnecting per exchange.
    async fn connection(&self) -> Result<Connection> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            if conn.close_reason().is_none() {
                return Ok(conn.clone());
            }
        }
        let connecting = self
            .endpoint
            .connect(self.addr, &self.server_name)
            .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
        let new_conn = connecting
            .await
            .map_err(|e| ForwarderError::TransportDial(e.to_string()))?;
        *guard = Some(new_conn.clone());
        Ok(new_conn)
    }

    /// Drops the cached connection so the next exchange redials. Called
    /// after an I/O error on the shared connection itself, not after a
    /// per-stream error or cancellation.
    async fn invalidate(&self) {
        *self.connection.lock().await = None;
    }

    pub async fn exchange(&self, query: &DnsPacket, cancel: &Cancel) -> Result<DnsPacket> {
        timeout(STREAM_DEADLINE, self.exchange_inner(query, cancel))
            .await
            .map_err(|_| ForwarderError::Timeout)?
    }

    async fn exchange_inner(&self, query: &DnsPacket, cancel: &Cancel) -> Result<DnsPacket> {
        let connection = self.connection().await?;

        let (mut send, mut recv) = match connection.open_bi().await {
            Ok(streams) => streams,
            Err(e) => {
                self.invalidate().await;
                return Err(ForwarderError::TransportIo(e.to_string()));
            }
        };

        let mut wire_query = query.clone();
        wire_query.header.id = 0;
        let payload = wire_query
            .to_wire()
            .map_err(|e| ForwarderError::MalformedMessage(e.to_string()))?;

        let len = payload.len() as u16;
        let mut framed = Vec::with_capacity(2 + payload.len());
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(&payload);

        if send.write_all(&framed).await.is_err() {
            let _ = send.reset(quinn::VarInt::from_u32(DOQ_REQUEST_CANCELLED));
            return Err(ForwarderError::TransportIo("doq write failed".to_string()));
        }
        if send.finish().is_err() {
            return Err(ForwarderError::TransportIo(
                "doq stream finish failed".to_string(),
            ));
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = send.reset(quinn::VarInt::from_u32(DOQ_REQUEST_CANCELLED));
                Err(ForwarderError::Cancelled)
            }
            raw = recv.read_to_end(crate::dns::MAX_MESSAGE_SIZE + 2) => {
                let raw = match raw {
                    Ok(raw) => raw,
                    Err(e) => {
                        let _ = send.reset(quinn::VarInt::from_u32(DOQ_REQUEST_CANCELLED));
                        return Err(ForwarderError::TransportIo(e.to_string()));
                    }
                };

                if raw.len() < 2 {
                    return Err(ForwarderError::MalformedMessage(
                        "doq response shorter than length prefix".to_string(),
                    ));
                }
                let body_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
                let body = raw.get(2..2 + body_len).ok_or_else(|| {
                    ForwarderError::MalformedMessage("doq length prefix mismatch".into())
                })?;

                let mut response = DnsPacket::from_wire(body)
                    .map_err(|e| ForwarderError::MalformedMessage(e.to_string()))?;
                response.header.id = query.header.id;
                Ok(response)
            }
        }
    }
}
