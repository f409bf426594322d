//! Explicit execution context threaded through every operation.
//!
//! A [`Ctx`] replaces ambient logging state: it carries an identifier for the
//! request or pass and the tracing span that log lines should be attached to.
//! Operations take it as their first parameter and enter the span while they
//! run.

use tracing::Span;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Ctx {
    id: Uuid,
    op: &'static str,
    span: Span,
}

impl Ctx {
    /// Create a root context for a new request or pass.
    pub fn new(op: &'static str) -> Self {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("ctx", %id, op);
        Self { id, op, span }
    }

    /// Derive a context for a nested operation. The identifier is kept so
    /// log lines of the whole request can be correlated.
    pub fn child(&self, op: &'static str) -> Self {
        let span = tracing::info_span!(parent: &self.span, "ctx", id = %self.id, op);
        Self {
            id: self.id,
            op,
            span,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
