//! Domain/pattern matcher: four matching modes (exact, subdomain trie,
//! keyword substring, regex) aggregated behind `MixMatcher`.

pub mod full;
pub mod keyword;
pub mod loader;
pub mod mix;
pub mod regex;
pub mod subdomain;

pub use full::FullMatcher;
pub use keyword::KeywordMatcher;
pub use mix::{MixMatcher, RuleKind};
pub use regex::RegexMatcher;
pub use subdomain::SubDomainMatcher;
