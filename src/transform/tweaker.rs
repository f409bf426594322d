use crate::atom::{
    Atom, AtomId, AtomOp, AttribType, BufferId, BufferTarget, Capability, ProgramId,
    VertexArrayId,
};
use crate::context::Ctx;
use crate::state::{AttribPointer, Context, VertexAttrib};

use super::{TransformError, Writer};

/// A state field a tweak can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Capability(Capability),
    Program,
    ArrayBuffer,
    VertexArray,
    VertexAttrib(VertexArrayId, u32),
}

/// Pre-tweak value of a [`Field`].
#[derive(Debug, Clone, Copy)]
enum Saved {
    Capability(Capability, bool),
    Program(ProgramId),
    ArrayBuffer(BufferId),
    VertexArray(VertexArrayId),
    VertexAttrib(VertexArrayId, u32, VertexAttrib),
}

impl Saved {
    fn field(&self) -> Field {
        match *self {
            Saved::Capability(cap, _) => Field::Capability(cap),
            Saved::Program(_) => Field::Program,
            Saved::ArrayBuffer(_) => Field::ArrayBuffer,
            Saved::VertexArray(_) => Field::VertexArray,
            Saved::VertexAttrib(array, location, _) => Field::VertexAttrib(array, location),
        }
    }
}

/// Temporary state overrides with guaranteed restoration.
///
/// Each setter records the pre-tweak value of its field the first time it
/// changes it, then emits the atom that changes it. [`Tweaker::revert`]
/// emits the atoms that restore every recorded field, most recently first
/// touched field first, and forgets the record. Dropping a tweaker reverts
/// whatever is still recorded, so a `?` inside the scope cannot leak a
/// change.
pub struct Tweaker<'a> {
    ctx: &'a Ctx,
    out: &'a mut dyn Writer,
    saved: Vec<Saved>,
}

impl<'a> Tweaker<'a> {
    pub fn new(ctx: &'a Ctx, out: &'a mut dyn Writer) -> Self {
        Self {
            ctx,
            out,
            saved: Vec::new(),
        }
    }

    /// Run `f` with a fresh tweaker and revert afterwards on every path.
    /// An error from `f` wins over an error from reverting.
    pub fn scope<T>(
        ctx: &'a Ctx,
        out: &'a mut dyn Writer,
        f: impl FnOnce(&mut Tweaker<'a>) -> Result<T, TransformError>,
    ) -> Result<T, TransformError> {
        let mut tweaker = Tweaker::new(ctx, out);
        let result = f(&mut tweaker);
        let reverted = tweaker.revert();
        let value = result?;
        reverted?;
        Ok(value)
    }

    /// Writer for atoms that are not tweaks, such as draws.
    pub fn writer(&mut self) -> &mut dyn Writer {
        &mut *self.out
    }

    /// Emit a synthetic atom.
    pub fn write(&mut self, op: AtomOp) -> Result<(), TransformError> {
        self.out
            .mutate_and_write(self.ctx, AtomId::NONE, Atom::new(op))
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    pub fn enable(&mut self, capability: Capability) -> Result<(), TransformError> {
        self.set_capability(capability, true)
    }

    pub fn disable(&mut self, capability: Capability) -> Result<(), TransformError> {
        self.set_capability(capability, false)
    }

    fn set_capability(&mut self, capability: Capability, on: bool) -> Result<(), TransformError> {
        let was = self.context()?.is_enabled(capability);
        if was == on {
            return Ok(());
        }
        self.save(Saved::Capability(capability, was));
        self.write(capability_op(capability, on))
    }

    pub fn use_program(&mut self, program: ProgramId) -> Result<(), TransformError> {
        let was = self.context()?.bound.program;
        if was == program {
            return Ok(());
        }
        self.save(Saved::Program(was));
        self.write(AtomOp::UseProgram { program })
    }

    pub fn bind_array_buffer(&mut self, buffer: BufferId) -> Result<(), TransformError> {
        let was = self.context()?.bound.array_buffer;
        if was == buffer {
            return Ok(());
        }
        self.save(Saved::ArrayBuffer(was));
        self.write(bind_array_buffer(buffer))
    }

    pub fn bind_vertex_array(&mut self, array: VertexArrayId) -> Result<(), TransformError> {
        let was = self.context()?.bound.vertex_array;
        if was == array {
            return Ok(());
        }
        self.save(Saved::VertexArray(was));
        self.write(AtomOp::BindVertexArray { array })
    }

    pub fn enable_vertex_attrib_array(&mut self, location: u32) -> Result<(), TransformError> {
        let ctx = self.context()?;
        let (array, was) = (ctx.bound.vertex_array, ctx.vertex_attrib(location));
        if was.enabled {
            return Ok(());
        }
        self.save(Saved::VertexAttrib(array, location, was));
        self.write(AtomOp::EnableVertexAttribArray { location })
    }

    /// Point `location` at the bound array buffer.
    pub fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        size: u8,
        kind: AttribType,
        normalized: bool,
        stride: u32,
        offset: u64,
    ) -> Result<(), TransformError> {
        let ctx = self.context()?;
        let (array, was) = (ctx.bound.vertex_array, ctx.vertex_attrib(location));
        let wanted = AttribPointer {
            size,
            kind,
            normalized,
            stride,
            offset,
            buffer: ctx.bound.array_buffer,
        };
        if was.pointer == Some(wanted) {
            return Ok(());
        }
        self.save(Saved::VertexAttrib(array, location, was));
        self.write(AtomOp::VertexAttribPointer {
            location,
            size,
            kind,
            normalized,
            stride,
            offset,
        })
    }

    /// Restore every recorded field and clear the record. Reverting with
    /// nothing recorded emits nothing. All fields are attempted; the first
    /// error is returned.
    pub fn revert(&mut self) -> Result<(), TransformError> {
        let saved = std::mem::take(&mut self.saved);
        let mut first_err = None;
        for entry in saved.into_iter().rev() {
            if let Err(e) = self.restore(entry) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn save(&mut self, value: Saved) {
        let field = value.field();
        if !self.saved.iter().any(|s| s.field() == field) {
            self.saved.push(value);
        }
    }

    fn context(&self) -> Result<&Context, TransformError> {
        Ok(self.out.state().current_context()?)
    }

    fn restore(&mut self, saved: Saved) -> Result<(), TransformError> {
        let ctx = self.context()?;
        match saved {
            Saved::Capability(capability, was) => {
                if ctx.is_enabled(capability) != was {
                    self.write(capability_op(capability, was))?;
                }
            }
            Saved::Program(program) => {
                if ctx.bound.program != program {
                    self.write(AtomOp::UseProgram { program })?;
                }
            }
            Saved::ArrayBuffer(buffer) => {
                if ctx.bound.array_buffer != buffer {
                    self.write(bind_array_buffer(buffer))?;
                }
            }
            Saved::VertexArray(array) => {
                if ctx.bound.vertex_array != array {
                    self.write(AtomOp::BindVertexArray { array })?;
                }
            }
            Saved::VertexAttrib(array, location, was) => {
                self.restore_attrib(array, location, was)?;
            }
        }
        Ok(())
    }

    /// Attribute state lives in a vertex array and a pointer captures the
    /// array buffer bound when it was set, so both are rebound around the
    /// restoring calls when they differ.
    fn restore_attrib(
        &mut self,
        array: VertexArrayId,
        location: u32,
        was: VertexAttrib,
    ) -> Result<(), TransformError> {
        let bound_array = self.context()?.bound.vertex_array;
        if bound_array != array {
            self.write(AtomOp::BindVertexArray { array })?;
        }

        let ctx = self.context()?;
        let now = ctx.vertex_attrib(location);
        let bound_buffer = ctx.bound.array_buffer;
        // GL has no call that clears a pointer, so an unset one stays as is.
        if let Some(pointer) = was.pointer.filter(|p| now.pointer != Some(*p)) {
            if bound_buffer != pointer.buffer {
                self.write(bind_array_buffer(pointer.buffer))?;
            }
            self.write(AtomOp::VertexAttribPointer {
                location,
                size: pointer.size,
                kind: pointer.kind,
                normalized: pointer.normalized,
                stride: pointer.stride,
                offset: pointer.offset,
            })?;
            if bound_buffer != pointer.buffer {
                self.write(bind_array_buffer(bound_buffer))?;
            }
        }
        if now.enabled != was.enabled {
            self.write(if was.enabled {
                AtomOp::EnableVertexAttribArray { location }
            } else {
                AtomOp::DisableVertexAttribArray { location }
            })?;
        }

        if bound_array != array {
            self.write(AtomOp::BindVertexArray { array: bound_array })?;
        }
        Ok(())
    }
}

impl Drop for Tweaker<'_> {
    fn drop(&mut self) {
        if self.saved.is_empty() {
            return;
        }
        if let Err(e) = self.revert() {
            tracing::warn!(error = %e, "failed to revert tweaked state");
        }
    }
}

fn capability_op(capability: Capability, on: bool) -> AtomOp {
    if on {
        AtomOp::Enable { capability }
    } else {
        AtomOp::Disable { capability }
    }
}

fn bind_array_buffer(buffer: BufferId) -> AtomOp {
    AtomOp::BindBuffer {
        target: BufferTarget::ArrayBuffer,
        buffer,
    }
}
