//! Query context: the mutable per-query workspace threaded through the
//! pipeline, cache, and upstream layers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::dns::DnsPacket;
use crate::dns::EdnsOpt;

static QUERY_ID: AtomicU64 = AtomicU64::new(1);

fn next_query_id() -> u64 {
    QUERY_ID.fetch_add(1, Ordering::Relaxed)
}

/// The four independent EDNS0 OPT views a query context carries, per the
/// data model: what the client sent, what we sent upstream, what upstream
/// sent back, and what we return to the client. Kept separate because a
/// pipeline node (e.g. a cache) may rewrite the upstream-facing OPT record
/// without touching what the client eventually sees.
#[derive(Clone, Debug, Default)]
pub struct OptViews {
    pub from_client: Option<EdnsOpt>,
    pub to_upstream: Option<EdnsOpt>,
    pub from_upstream: Option<EdnsOpt>,
    pub to_client: Option<EdnsOpt>,
}

#[derive(Clone, Debug)]
pub struct QueryContext {
    pub query_id: u64,
    pub request: DnsPacket,
    pub response: Option<DnsPacket>,
    pub received_at: Instant,
    pub client_addr: Option<SocketAddr>,
    /// TLS SNI / HTTP Host the client connected with, if applicable.
    pub server_name: Option<String>,
    pub opt: OptViews,
    /// Scratch values an executable can stash for a later node in the same
    /// chain (e.g. which matcher rule fired). Not shared across parallel
    /// branches — each fork gets its own independent copy.
    pub metadata: HashMap<String, String>,
}

impl QueryContext {
    pub fn new(request: DnsPacket, client_addr: Option<SocketAddr>) -> Self {
        let from_client = request.edns().and_then(|r| r.as_opt()).cloned();
        Self {
            query_id: next_query_id(),
            request,
            response: None,
            received_at: Instant::now(),
            client_addr,
            server_name: None,
            opt: OptViews {
                from_client,
                ..Default::default()
            },
            metadata: HashMap::new(),
        }
    }

    /// Independent shallow copy for a parallel/fallback fork: same request,
    /// fresh response slot, fresh metadata bag (per the data model's
    /// "independent shallow copies" invariant).
    pub fn fork(&self) -> Self {
        Self {
            query_id: self.query_id,
            request: self.request.clone(),
            response: None,
            received_at: self.received_at,
            client_addr: self.client_addr,
            server_name: self.server_name.clone(),
            opt: self.opt.clone(),
            metadata: HashMap::new(),
        }
    }

    pub fn original_id(&self) -> u16 {
        self.request.header.id
    }

    pub fn qname(&self) -> Option<String> {
        self.request.questions.first().map(|q| q.qname())
    }

    pub fn set_response(&mut self, mut response: DnsPacket) {
        response.header.id = self.original_id();
        self.response = Some(response);
    }

    pub fn reject(&mut self, rcode: u8) {
        self.set_response(self.request.rejection(rcode));
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.received_at.elapsed().as_secs()
    }
}
