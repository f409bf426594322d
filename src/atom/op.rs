use serde::{Deserialize, Serialize};

use super::id::{BufferId, ContextId, ProgramId, ShaderId, SurfaceId, VertexArrayId};

/// Server-side capabilities toggled with `glEnable`/`glDisable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Blend,
    CullFace,
    DepthTest,
    Dither,
    PolygonOffsetFill,
    ScissorTest,
    StencilTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferTarget {
    ArrayBuffer,
    ElementArrayBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferUsage {
    StaticDraw,
    DynamicDraw,
    StreamDraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttribType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// The command carried by an atom.
///
/// The vocabulary is a fixed subset of EGL/GLES. Commands outside it travel
/// as [`AtomOp::Opaque`] and have no effect on the tracked state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AtomOp {
    CreateContext {
        context: ContextId,
        #[serde(default)]
        preserve_buffers_on_swap: bool,
    },
    /// Binds `context` to the calling thread, or releases the current one
    /// when `context` is zero.
    MakeCurrent {
        context: ContextId,
        draw: SurfaceId,
    },
    SwapBuffers {
        surface: SurfaceId,
    },
    Enable {
        capability: Capability,
    },
    Disable {
        capability: Capability,
    },
    GenBuffers {
        buffers: Vec<BufferId>,
    },
    BindBuffer {
        target: BufferTarget,
        buffer: BufferId,
    },
    BufferData {
        target: BufferTarget,
        #[serde(with = "bytes_b64")]
        data: Vec<u8>,
        usage: BufferUsage,
    },
    DeleteBuffers {
        buffers: Vec<BufferId>,
    },
    CreateShader {
        shader: ShaderId,
        kind: ShaderKind,
    },
    ShaderSource {
        shader: ShaderId,
        source: String,
    },
    CompileShader {
        shader: ShaderId,
    },
    DeleteShader {
        shader: ShaderId,
    },
    CreateProgram {
        program: ProgramId,
    },
    AttachShader {
        program: ProgramId,
        shader: ShaderId,
    },
    BindAttribLocation {
        program: ProgramId,
        location: u32,
        name: String,
    },
    LinkProgram {
        program: ProgramId,
    },
    UseProgram {
        program: ProgramId,
    },
    DeleteProgram {
        program: ProgramId,
    },
    GenVertexArrays {
        arrays: Vec<VertexArrayId>,
    },
    BindVertexArray {
        array: VertexArrayId,
    },
    DeleteVertexArrays {
        arrays: Vec<VertexArrayId>,
    },
    EnableVertexAttribArray {
        location: u32,
    },
    DisableVertexAttribArray {
        location: u32,
    },
    VertexAttribPointer {
        location: u32,
        size: u8,
        kind: AttribType,
        normalized: bool,
        stride: u32,
        offset: u64,
    },
    DrawArrays {
        mode: DrawMode,
        first: u32,
        count: u32,
    },
    Clear {
        mask: u32,
    },
    Opaque {
        name: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

impl AtomOp {
    /// Short command name used in log lines.
    pub fn name(&self) -> &str {
        match self {
            AtomOp::CreateContext { .. } => "eglCreateContext",
            AtomOp::MakeCurrent { .. } => "eglMakeCurrent",
            AtomOp::SwapBuffers { .. } => "eglSwapBuffers",
            AtomOp::Enable { .. } => "glEnable",
            AtomOp::Disable { .. } => "glDisable",
            AtomOp::GenBuffers { .. } => "glGenBuffers",
            AtomOp::BindBuffer { .. } => "glBindBuffer",
            AtomOp::BufferData { .. } => "glBufferData",
            AtomOp::DeleteBuffers { .. } => "glDeleteBuffers",
            AtomOp::CreateShader { .. } => "glCreateShader",
            AtomOp::ShaderSource { .. } => "glShaderSource",
            AtomOp::CompileShader { .. } => "glCompileShader",
            AtomOp::DeleteShader { .. } => "glDeleteShader",
            AtomOp::CreateProgram { .. } => "glCreateProgram",
            AtomOp::AttachShader { .. } => "glAttachShader",
            AtomOp::BindAttribLocation { .. } => "glBindAttribLocation",
            AtomOp::LinkProgram { .. } => "glLinkProgram",
            AtomOp::UseProgram { .. } => "glUseProgram",
            AtomOp::DeleteProgram { .. } => "glDeleteProgram",
            AtomOp::GenVertexArrays { .. } => "glGenVertexArrays",
            AtomOp::BindVertexArray { .. } => "glBindVertexArray",
            AtomOp::DeleteVertexArrays { .. } => "glDeleteVertexArrays",
            AtomOp::EnableVertexAttribArray { .. } => "glEnableVertexAttribArray",
            AtomOp::DisableVertexAttribArray { .. } => "glDisableVertexAttribArray",
            AtomOp::VertexAttribPointer { .. } => "glVertexAttribPointer",
            AtomOp::DrawArrays { .. } => "glDrawArrays",
            AtomOp::Clear { .. } => "glClear",
            AtomOp::Opaque { name, .. } => name,
        }
    }

    /// Whether applying this command needs a bound context.
    pub fn requires_context(&self) -> bool {
        !matches!(
            self,
            AtomOp::CreateContext { .. }
                | AtomOp::MakeCurrent { .. }
                | AtomOp::SwapBuffers { .. }
                | AtomOp::Opaque { .. }
        )
    }
}

/// Base64 encoding for binary payloads inside JSON records.
mod bytes_b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
