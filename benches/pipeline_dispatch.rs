use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use tokio::runtime::Runtime;
use waypoint::cancel::Cancel;
use waypoint::context::QueryContext;
use waypoint::dns::{DnsPacket, DnsResourceType, Rcode};
use waypoint::pipeline::{
    Action, ChainNode, Executable, FallbackConfig, FallbackNode, FnMatcher, LoadBalanceNode,
    execute,
};

fn query_packet(domain: &str) -> DnsPacket {
    DnsPacket::new_query(1234, domain, DnsResourceType::A)
}

struct RejectExecutable(u8);

#[async_trait::async_trait]
impl Executable for RejectExecutable {
    async fn execute(&self, ctx: &mut QueryContext, _cancel: &Cancel) -> waypoint::Result<()> {
        ctx.reject(self.0);
        Ok(())
    }
}

fn bench_flat_chain(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let chain = Arc::new(vec![ChainNode::unconditional(Action::Executable(Arc::new(
        RejectExecutable(Rcode::NOERROR),
    )))]);
    let query = query_packet("example.com");

    c.bench_function("flat_chain_single_node", |b| {
        b.to_async(&rt).iter(|| async {
            let mut ctx = QueryContext::new(black_box(query.clone()), None);
            execute(chain.clone(), &mut ctx, &Cancel::new()).await;
            black_box(ctx.response);
        });
    });
}

fn bench_matcher_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("matcher_dispatch");

    for guard_count in [1usize, 4, 16] {
        let mut chain_nodes = Vec::new();
        for i in 0..guard_count {
            let matcher = FnMatcher::new(format!("never-{i}"), |ctx: &QueryContext| {
                ctx.qname().as_deref() == Some("nonexistent.example.com.")
            });
            chain_nodes.push(ChainNode::guarded(
                vec![Arc::new(matcher)],
                Action::Reject(Rcode::REFUSED),
            ));
        }
        chain_nodes.push(ChainNode::unconditional(Action::Reject(Rcode::NOERROR)));
        let chain = Arc::new(chain_nodes);
        let query = query_packet("example.com");

        group.bench_with_input(
            BenchmarkId::from_parameter(guard_count),
            &guard_count,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    let mut ctx = QueryContext::new(black_box(query.clone()), None);
                    execute(chain.clone(), &mut ctx, &Cancel::new()).await;
                    black_box(ctx.response);
                });
            },
        );
    }
    group.finish();
}

fn bench_fallback_vs_loadbalance(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("branching_nodes");

    let primary: Arc<Vec<ChainNode>> =
        Arc::new(vec![ChainNode::unconditional(Action::Reject(Rcode::NOERROR))]);
    let secondary: Arc<Vec<ChainNode>> =
        Arc::new(vec![ChainNode::unconditional(Action::Reject(Rcode::NOERROR))]);

    let fallback = Arc::new(vec![ChainNode::unconditional(Action::Recursive(Arc::new(
        FallbackNode::new(primary.clone(), secondary.clone(), FallbackConfig::default()),
    )))]);
    let load_balance = Arc::new(vec![ChainNode::unconditional(Action::Recursive(Arc::new(
        LoadBalanceNode::new(vec![primary, secondary]),
    )))]);
    let query = query_packet("example.com");

    group.bench_function("fallback", |b| {
        b.to_async(&rt).iter(|| async {
            let mut ctx = QueryContext::new(black_box(query.clone()), None);
            execute(fallback.clone(), &mut ctx, &Cancel::new()).await;
            black_box(ctx.response);
        });
    });

    group.bench_function("load_balance", |b| {
        b.to_async(&rt).iter(|| async {
            let mut ctx = QueryContext::new(black_box(query.clone()), None);
            execute(load_balance.clone(), &mut ctx, &Cancel::new()).await;
            black_box(ctx.response);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_flat_chain,
    bench_matcher_dispatch,
    bench_fallback_vs_loadbalance
);
criterion_main!(benches);
