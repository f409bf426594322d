use serde::{Deserialize, Serialize};

/// Position of an atom in the original capture stream.
///
/// Ids of captured atoms strictly increase. Atoms injected by a transform
/// carry [`AtomId::NONE`] and are never compared for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomId(pub u64);

impl AtomId {
    /// Sentinel for synthetic atoms.
    pub const NONE: AtomId = AtomId(u64::MAX);

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Returns the id as a value that takes part in ordering checks, or
    /// `None` for synthetic atoms.
    pub fn ordinal(&self) -> Option<u64> {
        if self.is_none() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl std::fmt::Display for AtomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            f.write_str("no-id")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// The reserved "no object" name.
            pub const ZERO: $name = $name(0);

            pub fn is_zero(&self) -> bool {
                self.0 == 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

object_id!(
    /// An EGL context handle.
    ContextId
);
object_id!(
    /// An EGL draw surface handle.
    SurfaceId
);
object_id!(BufferId);
object_id!(ProgramId);
object_id!(ShaderId);
object_id!(
    /// Vertex array object name. Zero is the default vertex array.
    VertexArrayId
);
