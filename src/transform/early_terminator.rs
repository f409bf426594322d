use crate::atom::{Atom, AtomId};
use crate::context::Ctx;

use super::{Transform, TransformError, Writer};

/// Drops everything after the atom with id `last`, injected atoms included.
/// If `last` never shows up, the stream is cut at the first id past it.
pub struct EarlyTerminator {
    last: AtomId,
    done: bool,
}

impl EarlyTerminator {
    pub fn new(last: AtomId) -> Self {
        Self { last, done: false }
    }
}

impl Transform for EarlyTerminator {
    fn name(&self) -> &str {
        "early-terminator"
    }

    fn apply(
        &mut self,
        ctx: &Ctx,
        id: AtomId,
        atom: Atom,
        out: &mut dyn Writer,
    ) -> Result<(), TransformError> {
        if self.done {
            return Ok(());
        }
        match (id.ordinal(), self.last.ordinal()) {
            (Some(cur), Some(last)) if cur > last => {
                self.done = true;
                tracing::debug!(atom = %id, "stream terminated early");
                Ok(())
            }
            (Some(cur), Some(last)) if cur == last => {
                self.done = true;
                out.mutate_and_write(ctx, id, atom)
            }
            _ => out.mutate_and_write(ctx, id, atom),
        }
    }
}
