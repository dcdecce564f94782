use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use waypoint::cache::{Cache, Fingerprint, Lookup, SingleFlight};
use waypoint::context::QueryContext;
use waypoint::dns::{DnsPacket, DnsResourceClass, DnsResourceRecord, DnsResourceType, RData};

fn sample_response(id: u16, qname: &str, ttl: u32) -> DnsPacket {
    let mut packet = DnsPacket::new_query(id, qname, DnsResourceType::A);
    packet.header.qr = true;
    packet.answers.push(DnsResourceRecord {
        labels: qname.split('.').map(|s| s.to_string()).collect(),
        rtype: DnsResourceType::A,
        rclass: DnsResourceClass::IN,
        ttl,
        rdata: RData::A(Ipv4Addr::new(93, 184, 216, 34)),
    });
    packet.update_counts();
    packet
}

fn fingerprint_for(qname: &str) -> Fingerprint {
    let ctx = QueryContext::new(DnsPacket::new_query(1, qname, DnsResourceType::A), None);
    Fingerprint::from_context(&ctx).expect("cacheable query yields a fingerprint")
}

#[tokio::test]
async fn stores_and_serves_a_fresh_hit() {
    let cache = Cache::new(1024, 4, None);
    let fp = fingerprint_for("example.com");
    let response = sample_response(1, "example.com", 300);

    cache.store(&fp, &response, 1_000, None).await.unwrap();

    match cache.lookup(&fp, 1_050).await {
        Some(Lookup::Fresh(got)) => assert_eq!(got.answers[0].ttl, 250),
        other => panic!("expected a fresh hit, got {:?}", other.is_some()),
    }
}

#[tokio::test]
async fn expired_message_ttl_still_within_hard_expiration_is_a_lazy_hit() {
    let cache = Arc::new(Cache::new(1024, 4, None).with_lazy_refresh(true));
    let fp = fingerprint_for("stale.example.com");
    let response = sample_response(2, "stale.example.com", 10);

    // `lazy_cache_ttl` extends the hard expiration window well past the
    // message's own 10s answer TTL, so the entry ages into a lazy hit
    // instead of falling out of the cache outright.
    cache.store(&fp, &response, 1_000, Some(3_600)).await.unwrap();

    // Message TTL (10s) has elapsed but the hard expiration has not.
    match cache.lookup(&fp, 1_015).await {
        Some(Lookup::Lazy(got)) => assert!(got.answers[0].ttl <= 10),
        other => panic!("expected a lazy hit, got {:?}", other.is_some()),
    }
}

#[tokio::test]
async fn concurrent_lookups_for_the_same_key_single_flight_onto_one_fetch() {
    let single_flight = Arc::new(SingleFlight::new());
    let fp = fingerprint_for("dedup.example.com");
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let single_flight = single_flight.clone();
        let calls = calls.clone();
        let key = fp.clone();
        handles.push(tokio::spawn(async move {
            single_flight
                .run(key, move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(sample_response(3, "dedup.example.com", 60))
                    }
                })
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
