//! Composable query-processing pipeline: sequence, conditional, parallel,
//! fallback and load-balance nodes dispatched by a `ChainWalker`.

pub mod condition;
pub mod control;
pub mod engine;
pub mod fallback;
pub mod loadbalance;
pub mod node;
pub mod parallel;
pub mod walker;

pub use condition::{ConditionNode, Expr};
pub use control::{AlwaysMatcher, FnMatcher};
pub use engine::execute;
pub use fallback::{FallbackConfig, FallbackNode};
pub use loadbalance::LoadBalanceNode;
pub use node::{Action, ChainNode, Executable, NodeMatcher, RecursiveExecutable, Sequence};
pub use parallel::ParallelNode;
pub use walker::{ChainWalker, StepOutcome};
