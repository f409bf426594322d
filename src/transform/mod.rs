//! Stream rewriting through an ordered chain of transforms.
//!
//! Every atom enters the first transform of a [`Pass`]. A transform hands
//! whatever it wants to keep, replace or inject to the [`Writer`] it was
//! given, which feeds the next transform. Behind the last transform sits
//! the terminal writer: it applies the atom to the pass [`State`] and only
//! then emits it to the [`AtomSink`]. The chain is driven recursively, so
//! atom *i + 1* never enters the chain before atom *i* has reached the sink.

mod early_terminator;
mod tweaker;
mod undefined_framebuffer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atom::{AllocationExhausted, Atom, AtomId, IdSpace, DEFAULT_MAX_PROBES};
use crate::capture::FrameError;
use crate::context::Ctx;
use crate::device::DeviceInstance;
use crate::error::ErrorKind;
use crate::state::{self, State, StateError};

pub use early_terminator::EarlyTerminator;
pub use tweaker::Tweaker;
pub use undefined_framebuffer::UndefinedFramebuffer;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Allocation(#[from] AllocationExhausted),

    #[error("capture i/o: {0}")]
    Io(#[from] FrameError),

    #[error("atom {id} arrived after atom {previous}")]
    OutOfOrder { id: AtomId, previous: AtomId },

    #[error("{0}")]
    Rejected(String),

    /// Failure raised inside the named transform.
    #[error("{transform}: {source}")]
    Stage {
        transform: String,
        #[source]
        source: Box<TransformError>,
    },
}

impl TransformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::State(e) => e.kind(),
            TransformError::Allocation(e) => e.kind(),
            TransformError::Io(_) => ErrorKind::Io,
            TransformError::OutOfOrder { .. } | TransformError::Rejected(_) => {
                ErrorKind::Validation
            }
            TransformError::Stage { source, .. } => source.kind(),
        }
    }

    /// Attach `transform` unless an inner stage already claimed the error.
    fn at_stage(self, transform: &str) -> Self {
        match self {
            TransformError::Stage { .. } => self,
            other => TransformError::Stage {
                transform: transform.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Split off the stage annotation, if any.
    fn into_parts(self) -> (Option<String>, TransformError) {
        match self {
            TransformError::Stage { transform, source } => (Some(transform), *source),
            other => (None, other),
        }
    }
}

/// Failure of a whole pass: which transform failed, on which atom, and why.
#[derive(Debug, Error)]
#[error("pass aborted in {} at atom {atom}: {source}", .transform.as_deref().unwrap_or("state"))]
pub struct PassError {
    /// `None` when the atom failed outside any transform (ordering checks,
    /// capture decoding, or an atom rejected with no transforms installed).
    pub transform: Option<String>,
    /// Original-stream id of the atom being processed.
    pub atom: AtomId,
    #[source]
    pub source: TransformError,
}

impl PassError {
    fn new(atom: AtomId, err: TransformError) -> Self {
        let (transform, source) = err.into_parts();
        Self {
            transform,
            atom,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// The interface a transform uses to pass atoms downstream.
pub trait Writer {
    /// Live state as of the last atom that reached the end of the chain.
    fn state(&self) -> &State;

    /// Apply `atom` to the state and forward it. Synthetic atoms use
    /// [`AtomId::NONE`].
    fn mutate_and_write(&mut self, ctx: &Ctx, id: AtomId, atom: Atom)
        -> Result<(), TransformError>;

    /// Allocate a synthetic object name for `tag` that `is_used` rejects
    /// against the live state and that no earlier allocation of this pass
    /// returned.
    fn allocate(
        &mut self,
        tag: u8,
        is_used: &dyn Fn(&State, u32) -> bool,
    ) -> Result<u32, TransformError>;
}

/// One stage of a pass.
pub trait Transform: Send {
    fn name(&self) -> &str;

    /// Handle one incoming atom. Forward, replace, drop or surround it by
    /// writing to `out`.
    fn apply(
        &mut self,
        ctx: &Ctx,
        id: AtomId,
        atom: Atom,
        out: &mut dyn Writer,
    ) -> Result<(), TransformError>;

    /// Called once after the last atom of the stream.
    fn flush(&mut self, _ctx: &Ctx, _out: &mut dyn Writer) -> Result<(), TransformError> {
        Ok(())
    }
}

/// Destination of the atoms leaving a pass.
pub trait AtomSink {
    fn write(&mut self, id: AtomId, atom: Atom) -> Result<(), TransformError>;
}

impl AtomSink for Vec<(AtomId, Atom)> {
    fn write(&mut self, id: AtomId, atom: Atom) -> Result<(), TransformError> {
        self.push((id, atom));
        Ok(())
    }
}

/// End of the chain: applies to state, then emits.
pub(crate) struct Terminal<'s> {
    state: State,
    ids: IdSpace,
    sink: &'s mut dyn AtomSink,
    emitted: u64,
}

impl<'s> Terminal<'s> {
    pub(crate) fn new(state: State, ids: IdSpace, sink: &'s mut dyn AtomSink) -> Self {
        Self {
            state,
            ids,
            sink,
            emitted: 0,
        }
    }
}

impl Writer for Terminal<'_> {
    fn state(&self) -> &State {
        &self.state
    }

    fn mutate_and_write(
        &mut self,
        _ctx: &Ctx,
        id: AtomId,
        atom: Atom,
    ) -> Result<(), TransformError> {
        state::apply(&mut self.state, &atom)?;
        self.sink.write(id, atom)?;
        self.emitted += 1;
        Ok(())
    }

    fn allocate(
        &mut self,
        tag: u8,
        is_used: &dyn Fn(&State, u32) -> bool,
    ) -> Result<u32, TransformError> {
        let state = &self.state;
        Ok(self.ids.allocate(tag, |candidate| is_used(state, candidate))?)
    }
}

/// Writer handed to a transform: the remaining stages plus the terminal.
struct Chain<'c, 's> {
    stages: &'c mut [Box<dyn Transform>],
    terminal: &'c mut Terminal<'s>,
}

impl Writer for Chain<'_, '_> {
    fn state(&self) -> &State {
        &self.terminal.state
    }

    fn mutate_and_write(
        &mut self,
        ctx: &Ctx,
        id: AtomId,
        atom: Atom,
    ) -> Result<(), TransformError> {
        match self.stages.split_first_mut() {
            None => self.terminal.mutate_and_write(ctx, id, atom),
            Some((stage, rest)) => {
                let mut next = Chain {
                    stages: rest,
                    terminal: &mut *self.terminal,
                };
                stage
                    .apply(ctx, id, atom, &mut next)
                    .map_err(|e| e.at_stage(stage.name()))
            }
        }
    }

    fn allocate(
        &mut self,
        tag: u8,
        is_used: &dyn Fn(&State, u32) -> bool,
    ) -> Result<u32, TransformError> {
        self.terminal.allocate(tag, is_used)
    }
}

/// Result of a pass that ran to completion.
#[derive(Debug)]
pub struct PassOutcome {
    pub state: State,
    /// Atoms read from the input.
    pub consumed: u64,
    /// Atoms that reached the sink, injected ones included.
    pub emitted: u64,
}

/// One run of a transform chain over one atom stream.
///
/// A pass owns its state and id space. It is consumed by [`Pass::run`]; a
/// failed pass cannot be resumed and its partial state is dropped.
pub struct Pass {
    transforms: Vec<Box<dyn Transform>>,
    state: State,
    max_probes: u32,
}

impl Pass {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self {
            transforms,
            state: State::new(),
            max_probes: DEFAULT_MAX_PROBES,
        }
    }

    /// Start from `state` instead of an empty state.
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn with_max_probes(mut self, max_probes: u32) -> Self {
        self.max_probes = max_probes;
        self
    }

    pub fn run(
        self,
        ctx: &Ctx,
        atoms: impl IntoIterator<Item = (AtomId, Atom)>,
        sink: &mut dyn AtomSink,
    ) -> Result<PassOutcome, PassError> {
        self.try_run(ctx, atoms.into_iter().map(Ok::<_, TransformError>), sink)
    }

    /// Like [`Pass::run`] for inputs that can fail, such as a capture file.
    pub fn try_run<E>(
        self,
        ctx: &Ctx,
        atoms: impl IntoIterator<Item = Result<(AtomId, Atom), E>>,
        sink: &mut dyn AtomSink,
    ) -> Result<PassOutcome, PassError>
    where
        E: Into<TransformError>,
    {
        let _enter = ctx.span().enter();
        let Pass {
            mut transforms,
            state,
            max_probes,
        } = self;
        let names: Vec<&str> = transforms.iter().map(|t| t.name()).collect();
        tracing::debug!(transforms = ?names, "pass started");

        let mut terminal = Terminal::new(state, IdSpace::with_max_probes(max_probes), sink);
        let mut previous = AtomId::NONE;
        let mut consumed = 0u64;

        for item in atoms {
            let (id, atom) = item.map_err(|e| fail(previous, e.into()))?;
            if let (Some(cur), Some(prev)) = (id.ordinal(), previous.ordinal()) {
                if cur <= prev {
                    return Err(fail(id, TransformError::OutOfOrder { id, previous }));
                }
            }
            if !id.is_none() {
                previous = id;
            }
            consumed += 1;

            let mut chain = Chain {
                stages: &mut transforms,
                terminal: &mut terminal,
            };
            chain
                .mutate_and_write(ctx, id, atom)
                .map_err(|e| fail(id, e))?;
        }

        for i in 0..transforms.len() {
            if let Some((stage, rest)) = transforms[i..].split_first_mut() {
                let mut next = Chain {
                    stages: rest,
                    terminal: &mut terminal,
                };
                stage
                    .flush(ctx, &mut next)
                    .map_err(|e| fail(AtomId::NONE, e.at_stage(stage.name())))?;
            }
        }

        tracing::debug!(consumed, emitted = terminal.emitted, "pass finished");
        Ok(PassOutcome {
            state: terminal.state,
            consumed,
            emitted: terminal.emitted,
        })
    }
}

fn fail(atom: AtomId, err: TransformError) -> PassError {
    let err = PassError::new(atom, err);
    tracing::warn!(
        transform = err.transform.as_deref().unwrap_or("state"),
        atom = %err.atom,
        error = %err.source,
        "pass aborted"
    );
    err
}

/// Transform built from a closure.
pub struct FnTransform<F> {
    name: String,
    f: F,
}

/// Wrap `f` as a transform called `name`.
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnTransform<F>
where
    F: FnMut(&Ctx, AtomId, Atom, &mut dyn Writer) -> Result<(), TransformError> + Send,
{
    FnTransform {
        name: name.into(),
        f,
    }
}

impl<F> Transform for FnTransform<F>
where
    F: FnMut(&Ctx, AtomId, Atom, &mut dyn Writer) -> Result<(), TransformError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &mut self,
        ctx: &Ctx,
        id: AtomId,
        atom: Atom,
        out: &mut dyn Writer,
    ) -> Result<(), TransformError> {
        (self.f)(ctx, id, atom, out)
    }
}

/// Forwards every atom and runs `inject` right after each end-of-frame atom.
pub struct FrameEnd<F> {
    name: String,
    inject: F,
}

pub fn on_frame_end<F>(name: impl Into<String>, inject: F) -> FrameEnd<F>
where
    F: FnMut(&Ctx, &mut dyn Writer) -> Result<(), TransformError> + Send,
{
    FrameEnd {
        name: name.into(),
        inject,
    }
}

impl<F> Transform for FrameEnd<F>
where
    F: FnMut(&Ctx, &mut dyn Writer) -> Result<(), TransformError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &mut self,
        ctx: &Ctx,
        id: AtomId,
        atom: Atom,
        out: &mut dyn Writer,
    ) -> Result<(), TransformError> {
        let end_of_frame = atom.flags().is_end_of_frame();
        out.mutate_and_write(ctx, id, atom)?;
        if end_of_frame {
            (self.inject)(ctx, out)?;
        }
        Ok(())
    }
}

/// Serializable name of a supplied transform, as requested by a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformSpec {
    UndefinedFramebuffer,
    EarlyTerminator { last: AtomId },
}

impl TransformSpec {
    /// Build a fresh instance for one pass against `device`.
    pub fn build(&self, device: &DeviceInstance) -> Box<dyn Transform> {
        match self {
            TransformSpec::UndefinedFramebuffer => {
                Box::new(UndefinedFramebuffer::new(device.gl_version))
            }
            TransformSpec::EarlyTerminator { last } => Box::new(EarlyTerminator::new(*last)),
        }
    }
}
