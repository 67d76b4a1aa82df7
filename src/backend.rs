//! The graphics backend seam.
//!
//! The renderer drives the GPU exclusively through [`GraphicsBackend`], a
//! GL-flavored service contract: compile per-stage shaders, link them into a
//! program, resolve named uniform/attribute slots, upload buffers, draw.
//! [`WgpuBackend`](crate::WgpuBackend) is the shipped implementation; tests
//! substitute a recording fake.

use thiserror::Error;

/// Shader pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

/// Primitive assembly mode for [`GraphicsBackend::issue_draw`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawMode {
    Points,
    Lines,
    Triangles,
}

/// Opaque reference to a compiled shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderHandle(pub u32);

/// Opaque reference to a linked shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramHandle(pub u32);

/// Opaque reference to a program's per-draw constant slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformHandle(pub u32);

/// Opaque reference to a program's per-vertex input slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeHandle(pub u32);

/// Opaque reference to a vertex buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferHandle(pub u32);

/// A failed backend operation.
///
/// Construction-time failures (compile, link, symbol resolution) surface
/// through scene setup; the per-frame variants are fatal to the frame that
/// triggered them. None of these are retried internally.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("shader compilation failed: {log}")]
    ShaderCompile { log: String },

    #[error("program link failed: {log}")]
    ProgramLink { log: String },

    #[error("the linked program has no uniform named `{0}`")]
    MissingUniform(String),

    #[error("the linked program has no attribute named `{0}`")]
    MissingAttribute(String),

    #[error("stale or unknown {kind} handle")]
    StaleHandle { kind: &'static str },

    #[error("`{op}` requires an active program")]
    ProgramNotActive { op: &'static str },

    #[error("no vertex data is bound to the position attribute")]
    NoVertexData,

    #[error("draw mode {0:?} is not supported by this backend")]
    UnsupportedDrawMode(DrawMode),

    #[error("could not acquire the next frame: {0}")]
    SurfaceAcquire(String),

    #[error("frame submission failed: {log}")]
    Draw { log: String },
}

/// Backend service contract consumed by the renderer.
///
/// Handles returned by one backend instance are meaningless to any other.
/// All handles become invalid once the resource that produced them is
/// deleted; using a stale handle is an error, never undefined behavior.
pub trait GraphicsBackend {
    /// Compiles `source` as a shader of the given stage.
    fn compile_shader(&mut self, kind: ShaderKind, source: &str)
    -> Result<ShaderHandle, BackendError>;

    /// Marks a shader to be released automatically once it is detached from
    /// the last program that owns it. Unknown handles are ignored.
    fn set_shader_auto_delete(&mut self, shader: ShaderHandle, auto_delete: bool);

    /// Links a vertex and a fragment shader into a program.
    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, BackendError>;

    /// Resolves a named per-draw constant slot of a linked program.
    fn resolve_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
    ) -> Result<UniformHandle, BackendError>;

    /// Resolves a named per-vertex input slot of a linked program.
    fn resolve_attribute(
        &mut self,
        program: ProgramHandle,
        name: &str,
    ) -> Result<AttributeHandle, BackendError>;

    /// Uploads static vertex data and returns a handle to the buffer.
    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<BufferHandle, BackendError>;

    /// Sets the viewport rectangle used by subsequent draws.
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Sets the color used by [`clear_color_buffer`](Self::clear_color_buffer).
    fn set_clear_color(&mut self, color: [f32; 4]);

    /// Clears the color buffer for the frame being built.
    fn clear_color_buffer(&mut self);

    /// Makes `program` the active program for uniform uploads and draws.
    fn use_program(&mut self, program: ProgramHandle) -> Result<(), BackendError>;

    /// Uploads 16 column-major floats to a uniform slot. Fails unless the
    /// uniform's owning program is active.
    fn set_uniform_matrix4(
        &mut self,
        uniform: UniformHandle,
        matrix: &[f32; 16],
    ) -> Result<(), BackendError>;

    /// Binds `buffer` to `attribute` as tightly packed 3-float vectors.
    fn bind_attribute_vec3(
        &mut self,
        attribute: AttributeHandle,
        buffer: BufferHandle,
    ) -> Result<(), BackendError>;

    /// Draws `count` vertices starting at `first` from the bound attribute
    /// data, presenting the finished frame.
    fn issue_draw(&mut self, mode: DrawMode, first: u32, count: u32) -> Result<(), BackendError>;

    /// Deletes a linked program and everything it owns. Deleting an
    /// already-deleted program is a no-op.
    fn delete_program(&mut self, program: ProgramHandle);
}
