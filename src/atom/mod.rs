//! Atoms: single recorded or injected graphics commands.
//!
//! An [`Atom`] is immutable once built. A transform that wants a different
//! effect builds a new atom instead of editing the one it received.

pub mod id;
pub mod id_set;
pub mod id_space;
pub mod op;

use serde::{Deserialize, Serialize};

pub use id::{AtomId, BufferId, ContextId, ProgramId, ShaderId, SurfaceId, VertexArrayId};
pub use id_set::IdSet;
pub use id_space::{AllocationExhausted, IdSpace, DEFAULT_MAX_PROBES};
pub use op::{
    AtomOp, AttribType, BufferTarget, BufferUsage, Capability, DrawMode, ShaderKind,
};

/// Per-atom flag set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomFlags(u32);

impl AtomFlags {
    pub const NONE: AtomFlags = AtomFlags(0);
    /// The atom ends a frame (e.g. a swap).
    pub const END_OF_FRAME: AtomFlags = AtomFlags(1 << 0);
    /// The atom issues a draw.
    pub const DRAW_CALL: AtomFlags = AtomFlags(1 << 1);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: AtomFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_end_of_frame(&self) -> bool {
        self.contains(Self::END_OF_FRAME)
    }

    pub fn is_draw_call(&self) -> bool {
        self.contains(Self::DRAW_CALL)
    }
}

impl std::ops::BitOr for AtomFlags {
    type Output = AtomFlags;

    fn bitor(self, rhs: AtomFlags) -> AtomFlags {
        AtomFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    op: AtomOp,
    #[serde(default)]
    flags: AtomFlags,
}

impl Atom {
    /// Build an atom with the flags implied by its command: swaps end a
    /// frame and draws are marked as draw calls.
    pub fn new(op: AtomOp) -> Self {
        let flags = match op {
            AtomOp::SwapBuffers { .. } => AtomFlags::END_OF_FRAME,
            AtomOp::DrawArrays { .. } => AtomFlags::DRAW_CALL,
            _ => AtomFlags::NONE,
        };
        Self { op, flags }
    }

    /// Build an atom with an explicit flag set.
    pub fn with_flags(op: AtomOp, flags: AtomFlags) -> Self {
        Self { op, flags }
    }

    pub fn op(&self) -> &AtomOp {
        &self.op
    }

    pub fn flags(&self) -> AtomFlags {
        self.flags
    }

    pub fn name(&self) -> &str {
        self.op.name()
    }
}

impl From<AtomOp> for Atom {
    fn from(op: AtomOp) -> Self {
        Atom::new(op)
    }
}
