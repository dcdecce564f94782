use crate::context::QueryContext;
use crate::error::Result;
use crate::pipeline::node::NodeMatcher;

/// A matcher that always succeeds — used for unconditional nodes built
/// programmatically rather than parsed from a rule file.
pub struct AlwaysMatcher;

impl NodeMatcher for AlwaysMatcher {
    fn eval(&self, _ctx: &QueryContext) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "always"
    }
}

/// Wraps a plain closure as a `NodeMatcher`, for matchers cheap enough not
/// to warrant their own type (e.g. "client used TCP").
pub struct FnMatcher<F> {
    name: String,
    f: F,
}

impl<F> FnMatcher<F>
where
    F: Fn(&QueryContext) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> NodeMatcher for FnMatcher<F>
where
    F: Fn(&QueryContext) -> bool + Send + Sync,
{
    fn eval(&self, ctx: &QueryContext) -> Result<bool> {
        Ok((self.f)(ctx))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsPacket;

    #[test]
    fn always_matcher_is_always_true() {
        let ctx = QueryContext::new(DnsPacket::new_query(1, "example.com", crate::dns::DnsResourceType::A), None);
        assert!(AlwaysMatcher.eval(&ctx).unwrap());
    }
}
