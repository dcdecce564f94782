use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::cancel::Cancel;
use crate::context::QueryContext;
use crate::error::Result;
use crate::pipeline::node::{ChainNode, RecursiveExecutable};
use crate::pipeline::walker::ChainWalker;

/// Round-robins queries across sub-chains via an atomic counter; each
/// query visits exactly one branch. A branch error propagates directly.
pub struct LoadBalanceNode {
    branches: Vec<Arc<Vec<ChainNode>>>,
    next: AtomicUsize,
}

impl LoadBalanceNode {
    pub fn new(branches: Vec<Arc<Vec<ChainNode>>>) -> Self {
        Self {
            branches,
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecursiveExecutable for LoadBalanceNode {
    async fn execute(
        &self,
        ctx: &mut QueryContext,
        _walker: &mut ChainWalker,
        cancel: &Cancel,
    ) -> Result<()> {
        if self.branches.is_empty() {
            return Ok(());
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.branches.len();
        ChainWalker::new(self.branches[idx].clone())
            .run(ctx, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::node::{Action, ChainNode};

    #[tokio::test]
    async fn round_robins_across_branches() {
        // Branches that just `accept` — enough to observe which one ran
        // by checking which branch index was selected next.
        let branch_a: Arc<Vec<ChainNode>> = Arc::new(vec![ChainNode::unconditional(Action::Accept)]);
        let branch_b: Arc<Vec<ChainNode>> = Arc::new(vec![ChainNode::unconditional(Action::Accept)]);
        let node = LoadBalanceNode::new(vec![branch_a, branch_b]);
        assert_eq!(node.next.load(Ordering::Relaxed), 0);
        let idx0 = node.next.fetch_add(1, Ordering::Relaxed) % node.branches.len();
        let idx1 = node.next.fetch_add(1, Ordering::Relaxed) % node.branches.len();
        assert_ne!(idx0, idx1);
    }
}
