use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::cancel::Cancel;
use crate::context::QueryContext;
use crate::dns::Rcode;
use crate::error::Result;
use crate::pipeline::node::{ChainNode, RecursiveExecutable};
use crate::pipeline::walker::ChainWalker;

pub const DEFAULT_BRANCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs every sub-chain concurrently against its own forked context,
/// taking the first branch that produces a non-null response. Each
/// branch gets its own deadline, capped by the ambient one if sooner;
/// ambient cancellation is propagated to every still-running branch.
pub struct ParallelNode {
    branches: Vec<Arc<Vec<ChainNode>>>,
    branch_timeout: Duration,
}

impl ParallelNode {
    pub fn new(branches: Vec<Arc<Vec<ChainNode>>>) -> Self {
        Self {
            branches,
            branch_timeout: DEFAULT_BRANCH_TIMEOUT,
        }
    }

    pub fn with_branch_timeout(mut self, timeout: Duration) -> Self {
        self.branch_timeout = timeout;
        self
    }
}

#[async_trait]
impl RecursiveExecutable for ParallelNode {
    async fn execute(
        &self,
        ctx: &mut QueryContext,
        _walker: &mut ChainWalker,
        cancel: &Cancel,
    ) -> Result<()> {
        let mut branch_cancels = Vec::with_capacity(self.branches.len());
        let mut tasks = JoinSet::new();

        for branch in &self.branches {
            let branch_chain = branch.clone();
            let mut branch_ctx = ctx.fork();
            let branch_cancel = cancel.child_with_deadline(self.branch_timeout);
            branch_cancels.push(branch_cancel.clone());
            tasks.spawn(async move {
                let result = ChainWalker::new(branch_chain)
                    .run(&mut branch_ctx, &branch_cancel)
                    .await;
                (result, branch_ctx)
            });
        }

        let ambient = cancel.clone();
        let watched = branch_cancels.clone();
        let watcher = tokio::spawn(async move {
            ambient.cancelled().await;
            for c in watched {
                c.cancel();
            }
        });

        let mut winner = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((Ok(()), branch_ctx)) if branch_ctx.response.is_some() => {
                    winner = Some(branch_ctx);
                    break;
                }
                Ok((Ok(()), _)) => {}
                Ok((Err(err), _)) => {
                    tracing::debug!(%err, "parallel branch failed");
                }
                Err(join_err) => {
                    tracing::debug!(%join_err, "parallel branch task panicked");
                }
            }
        }

        tasks.abort_all();
        watcher.abort();
        for c in &branch_cancels {
            c.cancel();
        }

        match winner {
            Some(branch_ctx) => {
                ctx.response = branch_ctx.response;
                Ok(())
            }
            None => {
                ctx.reject(Rcode::SERVFAIL);
                Ok(())
            }
        }
    }
}
