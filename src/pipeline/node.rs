use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::Cancel;
use crate::context::QueryContext;
use crate::error::Result;
use crate::pipeline::walker::ChainWalker;

/// A named boolean predicate over a query context, attached to a
/// `ChainNode` or referenced by name from a condition node. Cheap and
/// synchronous by design — expensive lookups (domain matcher, cache
/// probes) belong in an executable, not a predicate.
pub trait NodeMatcher: Send + Sync {
    fn eval(&self, ctx: &QueryContext) -> Result<bool>;
    fn name(&self) -> &str;
}

/// A leaf action that runs to completion without controlling the walker.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn execute(&self, ctx: &mut QueryContext, cancel: &Cancel) -> Result<()>;
}

/// An action that drives the remainder of the chain itself — parallel,
/// fallback, load-balance and condition nodes all implement this so they
/// can call `walker.exec_next` zero or more times with altered contexts.
#[async_trait]
pub trait RecursiveExecutable: Send + Sync {
    async fn execute(
        &self,
        ctx: &mut QueryContext,
        walker: &mut ChainWalker,
        cancel: &Cancel,
    ) -> Result<()>;
}

/// A named sub-chain a `goto`/`jump` control primitive can target.
#[derive(Clone)]
pub struct Sequence {
    pub name: String,
    pub chain: Arc<Vec<ChainNode>>,
}

/// One entry in a chain: a list of matchers (all must pass) guarding an
/// action, or a bare control primitive.
#[derive(Clone)]
pub struct ChainNode {
    pub matchers: Vec<Arc<dyn NodeMatcher>>,
    pub action: Action,
}

#[derive(Clone)]
pub enum Action {
    Executable(Arc<dyn Executable>),
    Recursive(Arc<dyn RecursiveExecutable>),
    Accept,
    Reject(u8),
    Return,
    Goto(Sequence),
    Jump(Sequence),
}

impl ChainNode {
    pub fn unconditional(action: Action) -> Self {
        Self {
            matchers: Vec::new(),
            action,
        }
    }

    pub fn guarded(matchers: Vec<Arc<dyn NodeMatcher>>, action: Action) -> Self {
        Self { matchers, action }
    }

    /// Evaluates this node's matchers left to right, short-circuiting on
    /// the first `false` or propagating the first error.
    pub fn matches(&self, ctx: &QueryContext) -> Result<bool> {
        for matcher in &self.matchers {
            if !matcher.eval(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
