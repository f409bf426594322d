//! Derived model of graphics-API object state.
//!
//! A [`State`] is owned by exactly one pipeline pass and changes only
//! through [`apply`], one atom at a time. Tables are ordered maps so two
//! states built from the same atom sequence compare equal and iterate alike.

mod apply;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::atom::{
    AttribType, BufferId, BufferTarget, BufferUsage, Capability, ContextId, ProgramId, ShaderId,
    ShaderKind, SurfaceId, VertexArrayId,
};
use crate::error::ErrorKind;

pub use apply::apply;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("no context is current")]
    NoCurrentContext,
    #[error("{op}: {what} must not be zero")]
    ZeroName { op: String, what: &'static str },
    #[error("{op}: unknown context {context}")]
    UnknownContext { op: String, context: ContextId },
    #[error("{op}: unknown program {program}")]
    UnknownProgram { op: String, program: ProgramId },
    #[error("{op}: unknown shader {shader}")]
    UnknownShader { op: String, shader: ShaderId },
    #[error("{op}: unknown vertex array {array}")]
    UnknownVertexArray { op: String, array: VertexArrayId },
    #[error("{op}: {what} {id} already exists")]
    DuplicateObject {
        op: String,
        what: &'static str,
        id: u32,
    },
    #[error("{op}: no buffer bound to {target:?}")]
    NothingBound { op: String, target: BufferTarget },
}

impl StateError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct State {
    contexts: BTreeMap<ContextId, Context>,
    current: Option<ContextId>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// The context bound to the stream, if any.
    pub fn context(&self) -> Option<&Context> {
        self.current.and_then(|id| self.contexts.get(&id))
    }

    /// The bound context, or [`StateError::NoCurrentContext`].
    pub fn current_context(&self) -> Result<&Context, StateError> {
        self.context().ok_or(StateError::NoCurrentContext)
    }

    pub(crate) fn current_context_mut(&mut self) -> Result<&mut Context, StateError> {
        let id = self.current.ok_or(StateError::NoCurrentContext)?;
        self.contexts
            .get_mut(&id)
            .ok_or(StateError::NoCurrentContext)
    }

    pub fn current_id(&self) -> Option<ContextId> {
        self.current
    }

    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    pub fn get_context(&self, id: ContextId) -> Option<&Context> {
        self.contexts.get(&id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextInfo {
    /// When false, the back buffer content is undefined after a swap.
    pub preserve_buffers_on_swap: bool,
}

/// One bound execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Context {
    pub id: ContextId,
    pub info: ContextInfo,
    /// Draw surface of the last `MakeCurrent` naming this context.
    pub surface: Option<SurfaceId>,
    pub objects: Objects,
    pub bound: Bindings,
    pub capabilities: BTreeSet<Capability>,
}

impl Context {
    pub(crate) fn new(id: ContextId, info: ContextInfo) -> Self {
        let mut objects = Objects::default();
        objects
            .vertex_arrays
            .insert(VertexArrayId::ZERO, VertexArray::default());
        let mut capabilities = BTreeSet::new();
        // GL enables dithering by default; everything else starts disabled.
        capabilities.insert(Capability::Dither);
        Self {
            id,
            info,
            surface: None,
            objects,
            bound: Bindings::default(),
            capabilities,
        }
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn bound_buffer(&self, target: BufferTarget) -> BufferId {
        match target {
            BufferTarget::ArrayBuffer => self.bound.array_buffer,
            BufferTarget::ElementArrayBuffer => self.bound.element_array_buffer,
        }
    }

    /// Attribute state of `location` in the bound vertex array.
    pub fn vertex_attrib(&self, location: u32) -> VertexAttrib {
        self.objects
            .vertex_arrays
            .get(&self.bound.vertex_array)
            .and_then(|array| array.attribs.get(&location))
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Objects {
    pub buffers: BTreeMap<BufferId, Buffer>,
    pub shaders: BTreeMap<ShaderId, Shader>,
    pub programs: BTreeMap<ProgramId, Program>,
    pub vertex_arrays: BTreeMap<VertexArrayId, VertexArray>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bindings {
    pub program: ProgramId,
    pub array_buffer: BufferId,
    pub element_array_buffer: BufferId,
    pub vertex_array: VertexArrayId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Buffer {
    pub size: usize,
    pub usage: Option<BufferUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shader {
    pub kind: ShaderKind,
    pub source: Option<String>,
    pub compiled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    pub shaders: Vec<ShaderId>,
    pub attrib_locations: BTreeMap<String, u32>,
    pub linked: bool,
    /// Deleted while bound. The program can still be rebound; its name is
    /// free for reuse once nothing binds it.
    pub delete_pending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VertexArray {
    pub attribs: BTreeMap<u32, VertexAttrib>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VertexAttrib {
    pub enabled: bool,
    pub pointer: Option<AttribPointer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttribPointer {
    pub size: u8,
    pub kind: AttribType,
    pub normalized: bool,
    pub stride: u32,
    pub offset: u64,
    /// Array buffer bound when the pointer was specified.
    pub buffer: BufferId,
}
