use std::sync::Arc;

use crate::cancel::Cancel;
use crate::context::QueryContext;
use crate::dns::Rcode;
use crate::pipeline::node::ChainNode;
use crate::pipeline::walker::ChainWalker;

/// Runs `chain` against `ctx` to completion. Any unhandled error, or a
/// chain that completes without producing a response, becomes SERVFAIL —
/// nodes should reject explicitly if they want a different rcode.
pub async fn execute(chain: Arc<Vec<ChainNode>>, ctx: &mut QueryContext, cancel: &Cancel) {
    let mut walker = ChainWalker::new(chain);
    if let Err(err) = walker.run(ctx, cancel).await {
        tracing::warn!(%err, "pipeline execution failed, returning SERVFAIL");
        ctx.reject(Rcode::SERVFAIL);
        return;
    }
    if ctx.response.is_none() {
        ctx.reject(Rcode::SERVFAIL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsPacket, DnsResourceType};
    use crate::pipeline::node::Action;

    #[tokio::test]
    async fn empty_chain_yields_servfail() {
        let mut ctx = QueryContext::new(
            DnsPacket::new_query(7, "example.com", DnsResourceType::A),
            None,
        );
        execute(Arc::new(vec![]), &mut ctx, &Cancel::new()).await;
        let response = ctx.response.expect("response set");
        assert_eq!(response.header.rcode, Rcode::SERVFAIL);
    }

    #[tokio::test]
    async fn accept_with_no_response_is_servfail() {
        let mut ctx = QueryContext::new(
            DnsPacket::new_query(7, "example.com", DnsResourceType::A),
            None,
        );
        let chain = Arc::new(vec![ChainNode::unconditional(Action::Accept)]);
        execute(chain, &mut ctx, &Cancel::new()).await;
        assert_eq!(ctx.response.unwrap().header.rcode, Rcode::SERVFAIL);
    }

    #[tokio::test]
    async fn reject_sets_requested_rcode() {
        let mut ctx = QueryContext::new(
            DnsPacket::new_query(7, "example.com", DnsResourceType::A),
            None,
        );
        let chain = Arc::new(vec![ChainNode::unconditional(Action::Reject(
            Rcode::REFUSED,
        ))]);
        execute(chain, &mut ctx, &Cancel::new()).await;
        assert_eq!(ctx.response.unwrap().header.rcode, Rcode::REFUSED);
    }
}
