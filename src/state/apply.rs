use std::collections::HashSet;

use super::{
    AttribPointer, Buffer, Context, ContextInfo, Program, Shader, State, StateError, VertexArray,
};
use crate::atom::{Atom, AtomOp, BufferId, BufferTarget, ProgramId, ShaderId, VertexArrayId};

/// Applies one atom to `state`.
///
/// This is the only place that decides how an atom affects state. Every
/// check runs before the first mutation, so a rejected atom leaves `state`
/// exactly as it was. The end-of-frame flag has no effect here.
pub fn apply(state: &mut State, atom: &Atom) -> Result<(), StateError> {
    let op = atom.op();
    let name = || op.name().to_string();

    match op {
        AtomOp::CreateContext {
            context,
            preserve_buffers_on_swap,
        } => {
            if context.is_zero() {
                return Err(StateError::ZeroName {
                    op: name(),
                    what: "context",
                });
            }
            if state.contexts.contains_key(context) {
                return Err(StateError::DuplicateObject {
                    op: name(),
                    what: "context",
                    id: context.0,
                });
            }
            let info = ContextInfo {
                preserve_buffers_on_swap: *preserve_buffers_on_swap,
            };
            state.contexts.insert(*context, Context::new(*context, info));
            Ok(())
        }
        AtomOp::MakeCurrent { context, draw } => {
            if context.is_zero() {
                state.current = None;
                return Ok(());
            }
            let ctx = state
                .contexts
                .get_mut(context)
                .ok_or_else(|| StateError::UnknownContext {
                    op: name(),
                    context: *context,
                })?;
            ctx.surface = Some(*draw);
            state.current = Some(*context);
            Ok(())
        }
        AtomOp::SwapBuffers { .. } | AtomOp::Opaque { .. } => Ok(()),
        _ => apply_in_context(state.current_context_mut()?, op),
    }
}

fn apply_in_context(ctx: &mut Context, op: &AtomOp) -> Result<(), StateError> {
    let name = || op.name().to_string();

    match op {
        AtomOp::Enable { capability } => {
            ctx.capabilities.insert(*capability);
        }
        AtomOp::Disable { capability } => {
            ctx.capabilities.remove(capability);
        }
        AtomOp::GenBuffers { buffers } => {
            check_new_names(
                buffers.iter().map(|b| b.0),
                |id| ctx.objects.buffers.contains_key(&BufferId(id)),
                op,
                "buffer",
            )?;
            for buffer in buffers {
                ctx.objects.buffers.insert(*buffer, Buffer::default());
            }
        }
        AtomOp::BindBuffer { target, buffer } => {
            // GLES 2 creates the object on first bind of an unused name.
            if !buffer.is_zero() {
                ctx.objects.buffers.entry(*buffer).or_default();
            }
            match target {
                BufferTarget::ArrayBuffer => ctx.bound.array_buffer = *buffer,
                BufferTarget::ElementArrayBuffer => ctx.bound.element_array_buffer = *buffer,
            }
        }
        AtomOp::BufferData {
            target,
            data,
            usage,
        } => {
            let bound = ctx.bound_buffer(*target);
            let buffer = ctx
                .objects
                .buffers
                .get_mut(&bound)
                .filter(|_| !bound.is_zero())
                .ok_or_else(|| StateError::NothingBound {
                    op: name(),
                    target: *target,
                })?;
            buffer.size = data.len();
            buffer.usage = Some(*usage);
        }
        AtomOp::DeleteBuffers { buffers } => {
            for buffer in buffers.iter().filter(|b| !b.is_zero()) {
                ctx.objects.buffers.remove(buffer);
                if ctx.bound.array_buffer == *buffer {
                    ctx.bound.array_buffer = BufferId::ZERO;
                }
                if ctx.bound.element_array_buffer == *buffer {
                    ctx.bound.element_array_buffer = BufferId::ZERO;
                }
            }
        }
        AtomOp::CreateShader { shader, kind } => {
            check_new_names(
                std::iter::once(shader.0),
                |id| ctx.objects.shaders.contains_key(&ShaderId(id)),
                op,
                "shader",
            )?;
            ctx.objects.shaders.insert(
                *shader,
                Shader {
                    kind: *kind,
                    source: None,
                    compiled: false,
                },
            );
        }
        AtomOp::ShaderSource { shader, source } => {
            shader_mut(ctx, *shader, op)?.source = Some(source.clone());
        }
        AtomOp::CompileShader { shader } => {
            shader_mut(ctx, *shader, op)?.compiled = true;
        }
        AtomOp::DeleteShader { shader } => {
            ctx.objects.shaders.remove(shader);
        }
        AtomOp::CreateProgram { program } => {
            // An unbound deleted program no longer holds its name.
            check_new_names(
                std::iter::once(program.0),
                |id| {
                    let id = ProgramId(id);
                    ctx.objects
                        .programs
                        .get(&id)
                        .is_some_and(|p| !p.delete_pending || ctx.bound.program == id)
                },
                op,
                "program",
            )?;
            ctx.objects.programs.insert(*program, Program::default());
        }
        AtomOp::AttachShader { program, shader } => {
            if !ctx.objects.shaders.contains_key(shader) {
                return Err(StateError::UnknownShader {
                    op: name(),
                    shader: *shader,
                });
            }
            program_mut(ctx, *program, op)?.shaders.push(*shader);
        }
        AtomOp::BindAttribLocation {
            program,
            location,
            name: attrib,
        } => {
            program_mut(ctx, *program, op)?
                .attrib_locations
                .insert(attrib.clone(), *location);
        }
        AtomOp::LinkProgram { program } => {
            program_mut(ctx, *program, op)?.linked = true;
        }
        AtomOp::UseProgram { program } => {
            if !program.is_zero() && !ctx.objects.programs.contains_key(program) {
                return Err(StateError::UnknownProgram {
                    op: name(),
                    program: *program,
                });
            }
            ctx.bound.program = *program;
        }
        AtomOp::DeleteProgram { program } => {
            // A program in use stays alive, flagged, while it is bound.
            if !program.is_zero() && ctx.bound.program == *program {
                if let Some(p) = ctx.objects.programs.get_mut(program) {
                    p.delete_pending = true;
                }
            } else {
                ctx.objects.programs.remove(program);
            }
        }
        AtomOp::GenVertexArrays { arrays } => {
            check_new_names(
                arrays.iter().map(|a| a.0),
                |id| ctx.objects.vertex_arrays.contains_key(&VertexArrayId(id)),
                op,
                "vertex array",
            )?;
            for array in arrays {
                ctx.objects.vertex_arrays.insert(*array, VertexArray::default());
            }
        }
        AtomOp::BindVertexArray { array } => {
            if !ctx.objects.vertex_arrays.contains_key(array) {
                return Err(StateError::UnknownVertexArray {
                    op: name(),
                    array: *array,
                });
            }
            ctx.bound.vertex_array = *array;
        }
        AtomOp::DeleteVertexArrays { arrays } => {
            for array in arrays.iter().filter(|a| !a.is_zero()) {
                ctx.objects.vertex_arrays.remove(array);
                if ctx.bound.vertex_array == *array {
                    ctx.bound.vertex_array = VertexArrayId::ZERO;
                }
            }
        }
        AtomOp::EnableVertexAttribArray { location } => {
            bound_array_mut(ctx)
                .attribs
                .entry(*location)
                .or_default()
                .enabled = true;
        }
        AtomOp::DisableVertexAttribArray { location } => {
            bound_array_mut(ctx)
                .attribs
                .entry(*location)
                .or_default()
                .enabled = false;
        }
        AtomOp::VertexAttribPointer {
            location,
            size,
            kind,
            normalized,
            stride,
            offset,
        } => {
            let buffer = ctx.bound.array_buffer;
            bound_array_mut(ctx)
                .attribs
                .entry(*location)
                .or_default()
                .pointer = Some(AttribPointer {
                size: *size,
                kind: *kind,
                normalized: *normalized,
                stride: *stride,
                offset: *offset,
                buffer,
            });
        }
        // Context-free commands are handled by `apply` before lookup.
        AtomOp::DrawArrays { .. }
        | AtomOp::Clear { .. }
        | AtomOp::CreateContext { .. }
        | AtomOp::MakeCurrent { .. }
        | AtomOp::SwapBuffers { .. }
        | AtomOp::Opaque { .. } => {}
    }
    Ok(())
}

/// Rejects zero names, names already present and names repeated in `ids`.
fn check_new_names(
    ids: impl Iterator<Item = u32>,
    exists: impl Fn(u32) -> bool,
    op: &AtomOp,
    what: &'static str,
) -> Result<(), StateError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id == 0 {
            return Err(StateError::ZeroName {
                op: op.name().to_string(),
                what,
            });
        }
        if exists(id) || !seen.insert(id) {
            return Err(StateError::DuplicateObject {
                op: op.name().to_string(),
                what,
                id,
            });
        }
    }
    Ok(())
}

fn shader_mut<'a>(
    ctx: &'a mut Context,
    shader: ShaderId,
    op: &AtomOp,
) -> Result<&'a mut Shader, StateError> {
    ctx.objects
        .shaders
        .get_mut(&shader)
        .ok_or_else(|| StateError::UnknownShader {
            op: op.name().to_string(),
            shader,
        })
}

fn program_mut<'a>(
    ctx: &'a mut Context,
    program: ProgramId,
    op: &AtomOp,
) -> Result<&'a mut Program, StateError> {
    ctx.objects
        .programs
        .get_mut(&program)
        .ok_or_else(|| StateError::UnknownProgram {
            op: op.name().to_string(),
            program,
        })
}

fn bound_array_mut(ctx: &mut Context) -> &mut VertexArray {
    ctx.objects
        .vertex_arrays
        .entry(ctx.bound.vertex_array)
        .or_default()
}
