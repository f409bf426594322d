use crate::atom::{
    Atom, AtomId, AtomOp, AttribType, BufferId, BufferTarget, BufferUsage, Capability, DrawMode,
    IdSet, ProgramId, ShaderId, ShaderKind, SurfaceId, VertexArrayId,
};
use crate::context::Ctx;
use crate::device::GlVersion;
use crate::state::State;

use super::{Transform, TransformError, Tweaker, Writer};

const SCREEN_COORDS: u32 = 0;

const VERTEX_SHADER: &str = "
precision highp float;
attribute vec2 aScreenCoords;
varying vec2 uv;

void main() {
    uv = aScreenCoords;
    gl_Position = vec4(aScreenCoords.xy, 0., 1.);
}";

const FRAGMENT_SHADER: &str = "
precision highp float;
varying vec2 uv;

float F(float a) { return smoothstep(0.0, 0.1, a) * smoothstep(0.4, 0.3, a); }

void main() {
    vec2 v = uv * 5.0;
    gl_FragColor = vec4(0.8, 0.9, 0.6, 1.0) * F(fract(v.x + v.y));
}";

/// Full screen triangle strip.
const POSITIONS: [f32; 8] = [-1., -1., 1., -1., -1., 1., 1., 1.];

/// Paints a striped pattern wherever the frame buffer content is undefined:
/// on the first use of every draw surface, and after every end of frame
/// when the current context does not preserve buffers on swap. Replays that
/// depend on stale frame buffer content then show it plainly.
pub struct UndefinedFramebuffer {
    version: GlVersion,
    seen_surfaces: IdSet<SurfaceId>,
}

impl UndefinedFramebuffer {
    pub fn new(version: GlVersion) -> Self {
        Self {
            version,
            seen_surfaces: IdSet::new(),
        }
    }

    fn draw_pattern(&self, ctx: &Ctx, out: &mut dyn Writer) -> Result<(), TransformError> {
        let program = ProgramId(out.allocate(b'P', &program_or_shader_used)?);
        let vertex = ShaderId(out.allocate(b'S', &program_or_shader_used)?);
        let fragment = ShaderId(out.allocate(b'S', &program_or_shader_used)?);
        let buffer = BufferId(out.allocate(b'B', &buffer_used)?);
        let array = if self.version.has_vertex_arrays() {
            Some(VertexArrayId(out.allocate(b'V', &vertex_array_used)?))
        } else {
            None
        };
        tracing::debug!(%program, %buffer, "drawing undefined framebuffer pattern");

        Tweaker::scope(ctx, out, |t| {
            for capability in [
                Capability::Blend,
                Capability::CullFace,
                Capability::DepthTest,
                Capability::ScissorTest,
                Capability::StencilTest,
            ] {
                t.disable(capability)?;
            }
            if let Some(array) = array {
                t.write(AtomOp::GenVertexArrays {
                    arrays: vec![array],
                })?;
                t.bind_vertex_array(array)?;
            }

            for (shader, kind, source) in [
                (vertex, ShaderKind::Vertex, VERTEX_SHADER),
                (fragment, ShaderKind::Fragment, FRAGMENT_SHADER),
            ] {
                t.write(AtomOp::CreateShader { shader, kind })?;
                t.write(AtomOp::ShaderSource {
                    shader,
                    source: source.to_string(),
                })?;
                t.write(AtomOp::CompileShader { shader })?;
            }
            t.write(AtomOp::CreateProgram { program })?;
            t.write(AtomOp::AttachShader {
                program,
                shader: vertex,
            })?;
            t.write(AtomOp::AttachShader {
                program,
                shader: fragment,
            })?;
            t.write(AtomOp::BindAttribLocation {
                program,
                location: SCREEN_COORDS,
                name: "aScreenCoords".to_string(),
            })?;
            t.write(AtomOp::LinkProgram { program })?;
            t.use_program(program)?;

            t.write(AtomOp::GenBuffers {
                buffers: vec![buffer],
            })?;
            t.bind_array_buffer(buffer)?;
            t.write(AtomOp::BufferData {
                target: BufferTarget::ArrayBuffer,
                data: POSITIONS.iter().flat_map(|p| p.to_le_bytes()).collect(),
                usage: BufferUsage::StaticDraw,
            })?;

            if array.is_some() {
                // The temporary array is thrown away, so its attributes
                // need no restoring.
                t.write(AtomOp::EnableVertexAttribArray {
                    location: SCREEN_COORDS,
                })?;
                t.write(screen_coords_pointer())?;
            } else {
                t.enable_vertex_attrib_array(SCREEN_COORDS)?;
                t.vertex_attrib_pointer(SCREEN_COORDS, 2, AttribType::Float, false, 0, 0)?;
            }
            t.write(AtomOp::DrawArrays {
                mode: DrawMode::TriangleStrip,
                first: 0,
                count: 4,
            })?;

            t.revert()?;

            t.write(AtomOp::DeleteBuffers {
                buffers: vec![buffer],
            })?;
            t.write(AtomOp::DeleteProgram { program })?;
            t.write(AtomOp::DeleteShader { shader: vertex })?;
            t.write(AtomOp::DeleteShader { shader: fragment })?;
            if let Some(array) = array {
                t.write(AtomOp::DeleteVertexArrays {
                    arrays: vec![array],
                })?;
            }
            Ok(())
        })
    }
}

impl Transform for UndefinedFramebuffer {
    fn name(&self) -> &str {
        "undefined-framebuffer"
    }

    fn apply(
        &mut self,
        ctx: &Ctx,
        id: AtomId,
        atom: Atom,
        out: &mut dyn Writer,
    ) -> Result<(), TransformError> {
        let new_surface = match atom.op() {
            AtomOp::MakeCurrent { context, draw } if !context.is_zero() => {
                self.seen_surfaces.add(*draw)
            }
            _ => false,
        };
        let end_of_frame = atom.flags().is_end_of_frame();
        out.mutate_and_write(ctx, id, atom)?;

        // Nothing can be drawn without a context.
        let Some(context) = out.state().context() else {
            return Ok(());
        };
        let discards_on_swap = !context.info.preserve_buffers_on_swap;

        if new_surface {
            self.draw_pattern(ctx, out)?;
        }
        if end_of_frame && discards_on_swap {
            self.draw_pattern(ctx, out)?;
        }
        Ok(())
    }
}

fn screen_coords_pointer() -> AtomOp {
    AtomOp::VertexAttribPointer {
        location: SCREEN_COORDS,
        size: 2,
        kind: AttribType::Float,
        normalized: false,
        stride: 0,
        offset: 0,
    }
}

// Programs and shaders share one name space in GL.
fn program_or_shader_used(state: &State, id: u32) -> bool {
    state.context().is_some_and(|c| {
        c.objects.programs.contains_key(&ProgramId(id))
            || c.objects.shaders.contains_key(&ShaderId(id))
    })
}

fn buffer_used(state: &State, id: u32) -> bool {
    state
        .context()
        .is_some_and(|c| c.objects.buffers.contains_key(&BufferId(id)))
}

fn vertex_array_used(state: &State, id: u32) -> bool {
    state
        .context()
        .is_some_and(|c| c.objects.vertex_arrays.contains_key(&VertexArrayId(id)))
}
