//! Explicit run context handed to every component

use std::sync::Arc;
use tracing::Span;

/// Owned by the caller for the lifetime of one run (an indexing pass, a
/// server session, a test). Components derive their own spans from it
/// instead of reaching for process-wide state.
#[derive(Debug, Clone)]
pub struct Context {
    run: Arc<str>,
    span: Span,
}

impl Context {
    pub fn new(run: impl Into<String>) -> Self {
        let run: Arc<str> = Arc::from(run.into());
        let span = tracing::info_span!("locus", run = %run);
        Context { run, span }
    }

    /// A context that records nothing. Handy in tests.
    pub fn detached() -> Self {
        Context {
            run: Arc::from("detached"),
            span: Span::none(),
        }
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// A child span for one component, e.g. `ctx.component("builder")`.
    pub fn component(&self, name: &'static str) -> Span {
        tracing::info_span!(parent: &self.span, "component", component = name)
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new("default")
    }
}
