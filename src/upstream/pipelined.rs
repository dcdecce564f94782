//! Pipelined upstream connection: many outstanding queries multiplexed
//! over a single stream via the DNS message ID, plus the pool that keeps
//! a handful of these open per upstream.
//!
//! Framing follows the 2-byte length prefix the teacher's DoT server
//! reads on the accept side (`transport/dot.rs`); here the same framing
//! is used to both write and read on the dialing side.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex as SyncMutex;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::cancel::Cancel;
use crate::dns::DnsPacket;
use crate::error::{ForwarderError, Result};

use super::conn::{ConnState, DnsConn, ReservedExchanger};

/// A pipelined connection serves at most this many queries before the
/// pool dials a replacement, bounding how long a 16-bit ID space needs
/// to stay collision-free on one stream.
const MAX_QUERIES_PER_CONN: u64 = 65_535;

/// Hard cap on reservations outstanding at once on a single connection
/// (connection invariant (b)). Kept well under the 16-bit ID space so
/// `claim_id` always finds a free id without spinning for long.
const DEFAULT_MAX_IN_FLIGHT: usize = 4_096;

struct Outbound {
    id: u16,
    payload: Vec<u8>,
}

struct Shared {
    state: SyncMutex<ConnState>,
    last_activity: SyncMutex<Instant>,
    queries_served: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: usize,
    pending: Arc<dashmap::DashMap<u16, oneshot::Sender<Result<DnsPacket>>>>,
    writer: mpsc::Sender<Outbound>,
    next_id: AtomicU64,
}

impl Shared {
    /// Finds an id with no outstanding reservation and atomically claims
    /// it by registering `reply` under it, so a concurrent `claim_id`
    /// can never observe the same id as free (§4.2.1: "skips ids
    /// currently in use").
    fn claim_id(&self, reply: oneshot::Sender<Result<DnsPacket>>) -> u16 {
        let mut reply = Some(reply);
        for _ in 0..=u16::MAX as u32 {
            let id = (self.next_id.fetch_add(1, Ordering::Relaxed) % u16::MAX as u64) as u16;
            match self.pending.entry(id) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(reply.take().expect("claimed exactly once"));
                    return id;
                }
            }
        }
        unreachable!("max_in_flight keeps the pending set far smaller than the id space")
    }
}

/// One multiplexed connection over any framed duplex stream.
pub struct PipelinedConn {
    shared: Arc<Shared>,
}

impl PipelinedConn {
    /// Spawns reader/writer tasks over `stream` and returns a handle.
    /// `stream` must already be connected (TCP handshake, or TLS/QUIC
    /// handshake, completed by the caller).
    pub fn spawn<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::spawn_with_capacity(stream, DEFAULT_MAX_IN_FLIGHT)
    }

    /// Same as [`spawn`](Self::spawn) with an explicit in-flight cap
    /// (connection invariant (b)) instead of the default.
    pub fn spawn_with_capacity<S>(stream: S, max_in_flight: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel::<Outbound>(64);
        let pending = Arc::new(dashmap::DashMap::new());

        let shared = Arc::new(Shared {
            state: SyncMutex::new(ConnState::Open),
            last_activity: SyncMutex::new(Instant::now()),
            queries_served: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: max_in_flight.max(1),
            pending: pending.clone(),
            writer: tx,
            next_id: AtomicU64::new(1),
        });

        tokio::spawn(Self::write_loop(write_half, rx, shared.clone()));
        tokio::spawn(Self::read_loop(read_half, pending, shared.clone()));

        Self { shared }
    }

    async fn write_loop<W: AsyncWrite + Unpin>(
        mut writer: W,
        mut rx: mpsc::Receiver<Outbound>,
        shared: Arc<Shared>,
    ) {
        while let Some(out) = rx.recv().await {
            let len = out.payload.len() as u16;
            let mut framed = Vec::with_capacity(2 + out.payload.len());
            framed.extend_from_slice(&len.to_be_bytes());
            framed.extend_from_slice(&out.payload);
            if writer.write_all(&framed).await.is_err() || writer.flush().await.is_err() {
                shared.mark_closed();
                break;
            }
        }
    }

    async fn read_loop<R: AsyncRead + Unpin>(
        mut reader: R,
        pending: Arc<dashmap::DashMap<u16, oneshot::Sender<Result<DnsPacket>>>>,
        shared: Arc<Shared>,
    ) {
        loop {
            let mut len_buf = [0u8; 2];
            if reader.read_exact(&mut len_buf).await.is_err() {
                break;
            }
            let len = u16::from_be_bytes(len_buf) as usize;
            let mut body = vec![0u8; len];
            if reader.read_exact(&mut body).await.is_err() {
                break;
            }
            match DnsPacket::from_wire(&body) {
                Ok(packet) => {
                    let id = packet.header.id;
                    if let Some((_, sender)) = pending.remove(&id) {
                        *shared.last_activity.lock() = Instant::now();
                        shared.in_flight.fetch_sub(1, Ordering::Relaxed);
                        let _ = sender.send(Ok(packet));
                    }
                }
                Err(_) => continue,
            }
        }
        shared.mark_closed();
        for _ in pending.iter() {
            shared.in_flight.fetch_sub(1, Ordering::Relaxed);
        }
        pending.clear();
    }
}

impl Shared {
    fn mark_closed(&self) {
        *self.state.lock() = ConnState::Closed;
    }

    /// Releases a reservation's in-flight slot without a reply having
    /// arrived (write failure, or cancellation). No-op if the reply
    /// already arrived and `read_loop` claimed the slot first.
    fn withdraw(&self, id: u16) {
        if self.pending.remove(&id).is_some() {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl DnsConn for PipelinedConn {
    fn state(&self) -> ConnState {
        *self.shared.state.lock()
    }

    fn last_activity(&self) -> Instant {
        *self.shared.last_activity.lock()
    }

    fn queries_served(&self) -> u64 {
        self.shared.queries_served.load(Ordering::Relaxed)
    }

    fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Relaxed)
    }

    async fn reserve(&self) -> Result<Box<dyn ReservedExchanger>> {
        if self.is_closed() {
            return Err(ForwarderError::TransportClosed);
        }
        if self.shared.queries_served.load(Ordering::Relaxed) >= MAX_QUERIES_PER_CONN {
            return Err(ForwarderError::TransportCapacity);
        }
        // Claim the in-flight slot here, atomically, so a burst of
        // concurrent reservations can't all observe the cap as not-yet-hit
        // before any of them increments it (connection invariant (b)).
        loop {
            let current = self.shared.in_flight.load(Ordering::Relaxed);
            if current >= self.shared.max_in_flight {
                return Err(ForwarderError::TransportCapacity);
            }
            if self
                .shared
                .in_flight
                .compare_exchange_weak(current, current + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        Ok(Box::new(PipelinedReservation {
            shared: self.shared.clone(),
        }))
    }

    fn close(&self) {
        self.shared.mark_closed();
    }
}

struct PipelinedReservation {
    shared: Arc<Shared>,
}

#[async_trait]
impl ReservedExchanger for PipelinedReservation {
    async fn exchange(self: Box<Self>, query: &DnsPacket, cancel: &Cancel) -> Result<DnsPacket> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let id = self.shared.claim_id(reply_tx);

        let mut wire_query = query.clone();
        wire_query.header.id = id;
        let payload = match wire_query.to_wire() {
            Ok(payload) => payload,
            Err(e) => {
                self.shared.withdraw(id);
                return Err(ForwarderError::MalformedMessage(e.to_string()));
            }
        };

        self.shared.queries_served.fetch_add(1, Ordering::Relaxed);

        if self
            .shared
            .writer
            .send(Outbound { id, payload })
            .await
            .is_err()
        {
            self.shared.withdraw(id);
            return Err(ForwarderError::TransportClosed);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                self.shared.withdraw(id);
                Err(ForwarderError::Cancelled)
            }
            reply = reply_rx => {
                let mut response = reply.map_err(|_| ForwarderError::TransportClosed)??;
                response.header.id = query.header.id;
                Ok(response)
            }
        }
    }
}

/// Default number of concurrently open pipelined connections per
/// upstream. Queries are spread across them rather than serialized onto
/// one socket.
pub const DEFAULT_MAX_CONN: usize = 2;

/// A connection is considered "busy" once it has this many outstanding
/// reservations; the pool prefers picking among connections under the
/// threshold rather than always piling onto the first one.
const BUSY_THRESHOLD: usize = 16;

/// Dial function supplied by a transport (plain TCP, DoT, DoQ) so the
/// pool stays transport-agnostic.
pub type Dialer = Arc<dyn Fn() -> futures::future::BoxFuture<'static, Result<PipelinedConn>> + Send + Sync>;

/// Pool of pipelined connections to one upstream. Dials lazily: the pool
/// starts empty and opens connections on demand as reservations are
/// requested, up to `max_conn`.
pub struct PipelinedPool {
    dialer: Dialer,
    max_conn: usize,
    conns: tokio::sync::Mutex<Vec<Arc<PipelinedConn>>>,
}

impl PipelinedPool {
    pub fn new(dialer: Dialer, max_conn: usize) -> Self {
        Self {
            dialer,
            max_conn: max_conn.max(1),
            conns: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_max_conn(dialer: Dialer) -> Self {
        Self::new(dialer, DEFAULT_MAX_CONN)
    }

    /// Sends `query` over an existing under-threshold connection chosen
    /// at random, dialing a new one lazily if the pool has capacity and
    /// every existing connection is busy or closed. Retries up to 3
    /// times if the chosen connection turns out to be closed underneath
    /// us (a benign race with idle-close).
    pub async fn exchange(&self, query: &DnsPacket, cancel: &Cancel) -> Result<DnsPacket> {
        let mut last_err = ForwarderError::NoUpstreamAvailable;
        for _ in 0..3 {
            let conn = self.pick_or_dial().await?;
            match conn.reserve().await {
                Ok(reservation) => match reservation.exchange(query, cancel).await {
                    Ok(resp) => return Ok(resp),
                    Err(err) if !err.closes_transport() => return Err(err),
                    Err(err) => {
                        last_err = err;
                        continue;
                    }
                },
                Err(err) => {
                    last_err = err;
                    continue;
                }
            }
        }
        Err(last_err)
    }

    async fn pick_or_dial(&self) -> Result<Arc<PipelinedConn>> {
        let mut conns = self.conns.lock().await;
        conns.retain(|c| !c.is_closed());

        let candidates: Vec<usize> = conns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.in_flight() < BUSY_THRESHOLD)
            .map(|(i, _)| i)
            .collect();

        if !candidates.is_empty() {
            let idx = candidates[rand::rng().random_range(0..candidates.len())];
            return Ok(conns[idx].clone());
        }

        if conns.len() < self.max_conn {
            let new_conn = Arc::new((self.dialer)().await?);
            conns.push(new_conn.clone());
            return Ok(new_conn);
        }

        let idx = rand::rng().random_range(0..conns.len());
        conns
            .get(idx)
            .cloned()
            .ok_or(ForwarderError::NoUpstreamAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_threshold_and_max_conn_are_sane_defaults() {
        assert_eq!(DEFAULT_MAX_CONN, 2);
        assert!(BUSY_THRESHOLD > 0);
    }

    #[tokio::test]
    async fn reserve_enforces_the_in_flight_cap() {
        let (client, _server) = tokio::io::duplex(4096);
        let conn = PipelinedConn::spawn_with_capacity(client, 2);

        let _r1 = conn.reserve().await.unwrap();
        let _r2 = conn.reserve().await.unwrap();
        assert!(matches!(
            conn.reserve().await.unwrap_err(),
            ForwarderError::TransportCapacity
        ));
    }

    #[tokio::test]
    async fn claim_id_never_reuses_an_id_already_pending() {
        let (client, _server) = tokio::io::duplex(4096);
        let conn = PipelinedConn::spawn_with_capacity(client, 8);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..8 {
            let (tx, _rx) = oneshot::channel();
            let id = conn.shared.claim_id(tx);
            assert!(seen.insert(id), "claim_id handed out a duplicate id");
        }
    }
}
