//! # Trigon
//!
//! A drag-to-rotate triangle renderer built on wgpu.
//!
//! One triangle, one shader program, one uniform: the crate's interest is
//! the seam between pointer input and the per-frame model-view-projection
//! transform. Dragging across the window accumulates a rotation angle —
//! reversing direction below and left of the viewport midlines, so circular
//! drags feel natural — and every frame recomposes
//! `projection * camera * rotation` and uploads it to the GPU.
//!
//! ## Quick start
//!
//! ```no_run
//! use trigon::AppConfig;
//!
//! fn main() -> Result<(), winit::error::EventLoopError> {
//!     trigon::run(AppConfig::default())
//! }
//! ```
//!
//! ## Architecture
//!
//! The renderer core is backend-agnostic: [`TriangleRenderer`] implements
//! the [`SurfaceRenderer`] lifecycle callbacks against the
//! [`GraphicsBackend`] and [`AssetSource`] service traits. [`WgpuBackend`]
//! is the shipped backend; the [`run`] shell wires both to a winit window
//! and renders on demand.

mod app;
mod assets;
mod backend;
mod gpu;
mod renderer;
mod touch;
mod transform;

pub use app::{AppConfig, run};
pub use assets::{AssetError, AssetSource, DirAssetStore};
pub use backend::{
    AttributeHandle, BackendError, BufferHandle, DrawMode, GraphicsBackend, ProgramHandle,
    ShaderHandle, ShaderKind, UniformHandle,
};
pub use gpu::WgpuBackend;
pub use renderer::{
    RenderError, SceneError, SurfaceControl, SurfaceRenderer, TriangleRenderer,
};
pub use touch::{PointerAction, PointerEvent, RotationInput, TOUCH_SCALE_FACTOR};
pub use transform::Transform;

// Re-export the math types that appear in the public API.
pub use glam::{Mat4, Vec3};
