use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::cancel::Cancel;
use crate::context::QueryContext;
use crate::error::{ForwarderError, Result};
use crate::pipeline::node::{Action, ChainNode};

struct Frame {
    chain: Arc<Vec<ChainNode>>,
    cursor: usize,
}

/// Whether the walker has more work in the current frame or has nothing
/// left to do (chain exhausted and no saved frame to return to).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Done,
}

/// An indexed cursor over a chain, plus a stack of saved `(chain, cursor)`
/// frames for `jump`/`return` — not a linked list, so `goto` can simply
/// swap the active chain without leaving a dangling tail behind.
pub struct ChainWalker {
    chain: Arc<Vec<ChainNode>>,
    cursor: usize,
    return_stack: Vec<Frame>,
}

impl ChainWalker {
    pub fn new(chain: Arc<Vec<ChainNode>>) -> Self {
        Self {
            chain,
            cursor: 0,
            return_stack: Vec::new(),
        }
    }

    /// Drives `exec_next` to completion of the current walker.
    pub fn run<'a>(
        &'a mut self,
        ctx: &'a mut QueryContext,
        cancel: &'a Cancel,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            loop {
                match self.exec_next(ctx, cancel).await? {
                    StepOutcome::Continue => continue,
                    StepOutcome::Done => return Ok(()),
                }
            }
        }
        .boxed()
    }

    /// Evaluates the node at the cursor (skipping over it if its matchers
    /// reject), runs its action, and advances. `RecursiveExecutable`
    /// actions receive `self` and may call this again zero or more times
    /// before returning.
    pub fn exec_next<'a>(
        &'a mut self,
        ctx: &'a mut QueryContext,
        cancel: &'a Cancel,
    ) -> BoxFuture<'a, Result<StepOutcome>> {
        async move {
            if cancel.is_cancelled() {
                return Err(ForwarderError::Cancelled);
            }
            if self.cursor >= self.chain.len() {
                return Ok(self.pop_frame());
            }
            let node = self.chain[self.cursor].clone();
            self.cursor += 1;

            if !node.matches(ctx)? {
                return Ok(StepOutcome::Continue);
            }

            match &node.action {
                Action::Executable(exec) => {
                    exec.execute(ctx, cancel).await?;
                    Ok(StepOutcome::Continue)
                }
                Action::Recursive(exec) => {
                    exec.execute(ctx, self, cancel).await?;
                    Ok(StepOutcome::Continue)
                }
                Action::Accept => Ok(self.pop_frame()),
                Action::Reject(rcode) => {
                    ctx.reject(*rcode);
                    Ok(StepOutcome::Done)
                }
                Action::Return => Ok(self.pop_frame()),
                Action::Goto(seq) => {
                    self.chain = seq.chain.clone();
                    self.cursor = 0;
                    Ok(StepOutcome::Continue)
                }
                Action::Jump(seq) => {
                    self.return_stack.push(Frame {
                        chain: self.chain.clone(),
                        cursor: self.cursor,
                    });
                    self.chain = seq.chain.clone();
                    self.cursor = 0;
                    Ok(StepOutcome::Continue)
                }
            }
        }
        .boxed()
    }

    fn pop_frame(&mut self) -> StepOutcome {
        match self.return_stack.pop() {
            Some(frame) => {
                self.chain = frame.chain;
                self.cursor = frame.cursor;
                StepOutcome::Continue
            }
            None => StepOutcome::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsPacket, DnsResourceType, Rcode};
    use crate::pipeline::node::Sequence;

    /// `A = [jump B, reject NOTIMP]`, `B = [reject REFUSED, return]`.
    /// `B` runs to completion via its own `return`, then `A` resumes at
    /// the node after `jump` and sets the final rcode — scenario 6.
    #[tokio::test]
    async fn jump_resumes_caller_after_callee_returns_naturally() {
        let b = Arc::new(vec![
            ChainNode::unconditional(Action::Reject(Rcode::REFUSED)),
            ChainNode::unconditional(Action::Return),
        ]);
        let a = Arc::new(vec![
            ChainNode::unconditional(Action::Jump(Sequence {
                name: "b".to_string(),
                chain: b,
            })),
            ChainNode::unconditional(Action::Reject(Rcode::NOTIMP)),
        ]);

        let mut ctx = QueryContext::new(
            DnsPacket::new_query(1, "example.com", DnsResourceType::A),
            None,
        );
        let mut walker = ChainWalker::new(a);
        walker.run(&mut ctx, &Cancel::new()).await.unwrap();

        assert_eq!(ctx.response.unwrap().header.rcode, Rcode::NOTIMP);
    }

    /// Property 5: `jump A` where `A` ends with `accept` also resumes the
    /// caller at the node after the jump, the same as a natural `return`.
    #[tokio::test]
    async fn jump_resumes_caller_after_callee_accepts() {
        let b = Arc::new(vec![ChainNode::unconditional(Action::Accept)]);
        let a = Arc::new(vec![
            ChainNode::unconditional(Action::Jump(Sequence {
                name: "b".to_string(),
                chain: b,
            })),
            ChainNode::unconditional(Action::Reject(Rcode::NXDOMAIN)),
        ]);

        let mut ctx = QueryContext::new(
            DnsPacket::new_query(1, "example.com", DnsResourceType::A),
            None,
        );
        let mut walker = ChainWalker::new(a);
        walker.run(&mut ctx, &Cancel::new()).await.unwrap();

        assert_eq!(ctx.response.unwrap().header.rcode, Rcode::NXDOMAIN);
    }

    #[tokio::test]
    async fn goto_does_not_return_to_the_original_chain() {
        let b = Arc::new(vec![ChainNode::unconditional(Action::Reject(
            Rcode::REFUSED,
        ))]);
        let a = Arc::new(vec![
            ChainNode::unconditional(Action::Goto(Sequence {
                name: "b".to_string(),
                chain: b,
            })),
            ChainNode::unconditional(Action::Reject(Rcode::NOTIMP)),
        ]);

        let mut ctx = QueryContext::new(
            DnsPacket::new_query(1, "example.com", DnsResourceType::A),
            None,
        );
        let mut walker = ChainWalker::new(a);
        walker.run(&mut ctx, &Cancel::new()).await.unwrap();

        assert_eq!(ctx.response.unwrap().header.rcode, Rcode::REFUSED);
    }
}
