use std::sync::Arc;

use parking_lot::Mutex;

use waypoint::cancel::Cancel;
use waypoint::context::QueryContext;
use waypoint::dns::{DnsPacket, DnsResourceType, Rcode};
use waypoint::matcher::loader;
use waypoint::matcher::mix::MixMatcher;
use waypoint::pipeline::{Action, ChainNode, FnMatcher, execute};

/// A domain rule file loaded into a `MixMatcher` drives a pipeline
/// reject node, the way a blocklist-backed forwarder would wire it up.
#[tokio::test]
async fn blocklisted_domain_is_rejected_before_reaching_the_fallback_node() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blocklist.txt");
    std::fs::write(
        &path,
        "# known ad/tracking domains\ndomain:ads.example.com\nfull:telemetry.example.net\n",
    )
    .unwrap();

    let mut matcher = MixMatcher::new();
    let loaded = loader::load_into(&mut matcher, &path).unwrap();
    assert_eq!(loaded, 2);

    let matcher = Arc::new(Mutex::new(matcher));
    let blocked = {
        let matcher = matcher.clone();
        FnMatcher::new("blocklist", move |ctx: &QueryContext| {
            let qname = ctx.qname().unwrap_or_default();
            matcher.lock().matches(qname.trim_end_matches('.')).is_some()
        })
    };

    let chain = Arc::new(vec![
        ChainNode::guarded(vec![Arc::new(blocked)], Action::Reject(Rcode::NXDOMAIN)),
        ChainNode::unconditional(Action::Reject(Rcode::NOERROR)),
    ]);

    let mut blocked_ctx = QueryContext::new(
        DnsPacket::new_query(1, "tracker.ads.example.com", DnsResourceType::A),
        None,
    );
    execute(chain.clone(), &mut blocked_ctx, &Cancel::new()).await;
    assert_eq!(blocked_ctx.response.unwrap().header.rcode, Rcode::NXDOMAIN);

    let mut allowed_ctx = QueryContext::new(
        DnsPacket::new_query(2, "example.com", DnsResourceType::A),
        None,
    );
    execute(chain, &mut allowed_ctx, &Cancel::new()).await;
    assert_eq!(allowed_ctx.response.unwrap().header.rcode, Rcode::NOERROR);
}
