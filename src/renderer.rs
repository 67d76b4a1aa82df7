//! The triangle renderer.
//!
//! [`TriangleRenderer`] owns the scene's GPU resources and the three logical
//! transforms, and reacts to the surface lifecycle through the
//! [`SurfaceRenderer`] callbacks: created (build resources), changed
//! (reproject), draw (compose and upload the MVP, issue the draw call),
//! touch (feed the rotation state machine), pause (release resources).

use std::sync::Arc;

use thiserror::Error;

use crate::assets::{AssetError, AssetSource};
use crate::backend::{
    AttributeHandle, BackendError, BufferHandle, DrawMode, GraphicsBackend, ProgramHandle,
    ShaderKind, UniformHandle,
};
use crate::touch::{PointerEvent, RotationInput};
use crate::transform::Transform;

const VERTEX_SHADER_ASSET: &str = "triangle/triangle.vert";
const FRAGMENT_SHADER_ASSET: &str = "triangle/triangle.frag";

/// Clear color, a fixed opaque gray.
const CLEAR_COLOR: [f32; 4] = [0.533, 0.533, 0.533, 1.0];

/// Triangle vertex positions, x/y/z per vertex.
const TRIANGLE_POSITIONS: [f32; 9] = [
    -0.5, -0.25, 0.0, //
    0.5, -0.25, 0.0, //
    0.0, 0.559_017, 0.0,
];

/// Failed to build the scene's GPU resources.
///
/// Raised only by [`SurfaceRenderer::on_surface_created`]; the renderer
/// stays uninitialized and the host must not request frames.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to load shader source `{name}`")]
    Asset {
        name: String,
        #[source]
        source: AssetError,
    },

    #[error("failed to build the shader program")]
    Backend(#[from] BackendError),
}

/// A frame could not be produced.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("draw requested before the surface was created")]
    NotReady,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Host-side view of the rendering surface.
///
/// Queried by the touch handler for the viewport size and to schedule the
/// next frame after the rotation angle changes.
pub trait SurfaceControl {
    /// Asks the host loop to produce a new frame.
    fn request_render(&self);
    /// Current surface width in pixels.
    fn width(&self) -> u32;
    /// Current surface height in pixels.
    fn height(&self) -> u32;
}

/// Lifecycle callbacks delivered by the host surface.
///
/// The host must serialize all calls on the render thread and only request
/// frames after `on_surface_created` succeeded.
pub trait SurfaceRenderer {
    /// The surface exists; build GPU resources.
    fn on_surface_created(&mut self, gl: &mut dyn GraphicsBackend) -> Result<(), SceneError>;

    /// The surface changed size; reconfigure projection and camera.
    fn on_surface_changed(&mut self, gl: &mut dyn GraphicsBackend, width: u32, height: u32);

    /// Produce one frame.
    fn on_draw_frame(&mut self, gl: &mut dyn GraphicsBackend) -> Result<(), RenderError>;

    /// A pointer event arrived. Returns `true` when the event was consumed.
    fn on_touch_event(&mut self, view: &dyn SurfaceControl, event: PointerEvent) -> bool;

    /// The surface is going away; release GPU resources. Idempotent.
    fn on_pause(&mut self, gl: &mut dyn GraphicsBackend);
}

/// GPU resources owned by the scene, created together on surface-created
/// and released together on pause.
struct SceneResources {
    program: ProgramHandle,
    u_mvp_matrix: UniformHandle,
    a_position: AttributeHandle,
    positions: BufferHandle,
}

impl SceneResources {
    fn create(
        gl: &mut dyn GraphicsBackend,
        assets: &dyn AssetSource,
    ) -> Result<Self, SceneError> {
        let open = |name: &str| {
            assets.open(name).map_err(|source| SceneError::Asset {
                name: name.to_owned(),
                source,
            })
        };
        let vertex_source = open(VERTEX_SHADER_ASSET)?;
        let fragment_source = open(FRAGMENT_SHADER_ASSET)?;

        let vs = gl.compile_shader(ShaderKind::Vertex, &vertex_source)?;
        let fs = gl.compile_shader(ShaderKind::Fragment, &fragment_source)?;

        // The program becomes the sole owner; the shaders go away with it.
        gl.set_shader_auto_delete(vs, true);
        gl.set_shader_auto_delete(fs, true);

        let program = gl.link_program(vs, fs)?;
        let u_mvp_matrix = gl.resolve_uniform(program, "u_mvp_matrix")?;
        let a_position = gl.resolve_attribute(program, "a_position")?;
        let positions = gl.create_vertex_buffer(&TRIANGLE_POSITIONS)?;

        Ok(Self {
            program,
            u_mvp_matrix,
            a_position,
            positions,
        })
    }
}

/// Renders one triangle, rotated by pointer drags.
pub struct TriangleRenderer {
    assets: Arc<dyn AssetSource>,
    scene: Option<SceneResources>,
    projection: Transform,
    camera: Transform,
    mvp: Transform,
    rotation: Arc<RotationInput>,
}

impl TriangleRenderer {
    pub fn new(assets: Arc<dyn AssetSource>) -> Self {
        Self {
            assets,
            scene: None,
            projection: Transform::new(),
            camera: Transform::new(),
            mvp: Transform::new(),
            rotation: Arc::new(RotationInput::new()),
        }
    }

    /// Whether scene resources exist and frames may be requested.
    pub fn is_ready(&self) -> bool {
        self.scene.is_some()
    }

    /// The shared rotation state. Clone it to feed pointer events from a
    /// dedicated input thread instead of going through
    /// [`SurfaceRenderer::on_touch_event`].
    pub fn rotation_input(&self) -> Arc<RotationInput> {
        Arc::clone(&self.rotation)
    }
}

impl SurfaceRenderer for TriangleRenderer {
    fn on_surface_created(&mut self, gl: &mut dyn GraphicsBackend) -> Result<(), SceneError> {
        gl.set_clear_color(CLEAR_COLOR);

        let scene = SceneResources::create(gl, self.assets.as_ref())?;
        self.scene = Some(scene);
        log::debug!("scene resources created");
        Ok(())
    }

    fn on_surface_changed(&mut self, gl: &mut dyn GraphicsBackend, width: u32, height: u32) {
        gl.set_viewport(width, height);

        let ratio = width as f32 / height as f32;
        self.projection.set_frustum(-ratio, ratio, -1.0, 1.0, 3.0, 7.0);
        self.camera
            .set_look_at(0.0, 0.0, -3.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0);
        log::debug!("surface changed to {width}x{height} (ratio {ratio})");
    }

    fn on_draw_frame(&mut self, gl: &mut dyn GraphicsBackend) -> Result<(), RenderError> {
        let scene = self.scene.as_ref().ok_or(RenderError::NotReady)?;

        gl.clear_color_buffer();
        gl.use_program(scene.program)?;

        let angle = self.rotation.angle();
        self.mvp
            .set_identity()
            .multiply(&self.projection)
            .multiply(&self.camera)
            .rotate(angle, 0.0, 0.0, 1.0)
            .set_to(gl, scene.u_mvp_matrix)?;

        gl.bind_attribute_vec3(scene.a_position, scene.positions)?;
        gl.issue_draw(DrawMode::Triangles, 0, 3)?;
        Ok(())
    }

    fn on_touch_event(&mut self, view: &dyn SurfaceControl, event: PointerEvent) -> bool {
        let viewport = (view.width() as f32, view.height() as f32);
        if self.rotation.apply(event, viewport) {
            view.request_render();
        }
        true
    }

    fn on_pause(&mut self, gl: &mut dyn GraphicsBackend) {
        if let Some(scene) = self.scene.take() {
            gl.delete_program(scene.program);
            log::debug!("scene resources released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ShaderHandle;
    use crate::touch::PointerAction;
    use glam::{Mat4, Vec3};
    use std::collections::HashMap;

    /// In-memory asset table.
    struct MapAssets(HashMap<&'static str, &'static str>);

    impl MapAssets {
        fn complete() -> Self {
            let mut map = HashMap::new();
            map.insert(VERTEX_SHADER_ASSET, "vertex source");
            map.insert(FRAGMENT_SHADER_ASSET, "fragment source");
            Self(map)
        }

        fn missing_fragment() -> Self {
            let mut assets = Self::complete();
            assets.0.remove(FRAGMENT_SHADER_ASSET);
            assets
        }
    }

    impl AssetSource for MapAssets {
        fn open(&self, name: &str) -> Result<String, AssetError> {
            self.0
                .get(name)
                .map(|s| s.to_string())
                .ok_or_else(|| AssetError::NotFound(name.to_owned()))
        }
    }

    /// Recording fake of the graphics backend.
    #[derive(Default)]
    struct FakeBackend {
        ops: Vec<String>,
        next_handle: u32,
        active_program: Option<ProgramHandle>,
        uploaded_matrix: Option<[f32; 16]>,
        uploaded_vertices: Option<Vec<f32>>,
        fail_fragment_compile: bool,
        deleted_programs: Vec<ProgramHandle>,
    }

    impl FakeBackend {
        fn handle(&mut self) -> u32 {
            self.next_handle += 1;
            self.next_handle
        }
    }

    impl GraphicsBackend for FakeBackend {
        fn compile_shader(
            &mut self,
            kind: ShaderKind,
            _source: &str,
        ) -> Result<ShaderHandle, BackendError> {
            if kind == ShaderKind::Fragment && self.fail_fragment_compile {
                return Err(BackendError::ShaderCompile {
                    log: "bad fragment".into(),
                });
            }
            self.ops.push(format!("compile:{kind:?}"));
            Ok(ShaderHandle(self.handle()))
        }

        fn set_shader_auto_delete(&mut self, _shader: ShaderHandle, auto_delete: bool) {
            self.ops.push(format!("auto_delete:{auto_delete}"));
        }

        fn link_program(
            &mut self,
            _vertex: ShaderHandle,
            _fragment: ShaderHandle,
        ) -> Result<ProgramHandle, BackendError> {
            self.ops.push("link".into());
            Ok(ProgramHandle(self.handle()))
        }

        fn resolve_uniform(
            &mut self,
            _program: ProgramHandle,
            name: &str,
        ) -> Result<UniformHandle, BackendError> {
            self.ops.push(format!("uniform:{name}"));
            Ok(UniformHandle(self.handle()))
        }

        fn resolve_attribute(
            &mut self,
            _program: ProgramHandle,
            name: &str,
        ) -> Result<AttributeHandle, BackendError> {
            self.ops.push(format!("attribute:{name}"));
            Ok(AttributeHandle(self.handle()))
        }

        fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<BufferHandle, BackendError> {
            self.uploaded_vertices = Some(data.to_vec());
            self.ops.push(format!("buffer:{}", data.len()));
            Ok(BufferHandle(self.handle()))
        }

        fn set_viewport(&mut self, width: u32, height: u32) {
            self.ops.push(format!("viewport:{width}x{height}"));
        }

        fn set_clear_color(&mut self, _color: [f32; 4]) {
            self.ops.push("clear_color".into());
        }

        fn clear_color_buffer(&mut self) {
            self.ops.push("clear".into());
        }

        fn use_program(&mut self, program: ProgramHandle) -> Result<(), BackendError> {
            self.active_program = Some(program);
            self.ops.push("use_program".into());
            Ok(())
        }

        fn set_uniform_matrix4(
            &mut self,
            _uniform: UniformHandle,
            matrix: &[f32; 16],
        ) -> Result<(), BackendError> {
            if self.active_program.is_none() {
                return Err(BackendError::ProgramNotActive {
                    op: "set_uniform_matrix4",
                });
            }
            self.uploaded_matrix = Some(*matrix);
            self.ops.push("upload_mvp".into());
            Ok(())
        }

        fn bind_attribute_vec3(
            &mut self,
            _attribute: AttributeHandle,
            _buffer: BufferHandle,
        ) -> Result<(), BackendError> {
            self.ops.push("bind_vec3".into());
            Ok(())
        }

        fn issue_draw(
            &mut self,
            mode: DrawMode,
            first: u32,
            count: u32,
        ) -> Result<(), BackendError> {
            self.ops.push(format!("draw:{mode:?}:{first}:{count}"));
            Ok(())
        }

        fn delete_program(&mut self, program: ProgramHandle) {
            self.deleted_programs.push(program);
        }
    }

    struct FakeView {
        width: u32,
        height: u32,
        render_requests: std::cell::Cell<usize>,
    }

    impl FakeView {
        fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                render_requests: std::cell::Cell::new(0),
            }
        }
    }

    impl SurfaceControl for FakeView {
        fn request_render(&self) {
            self.render_requests.set(self.render_requests.get() + 1);
        }
        fn width(&self) -> u32 {
            self.width
        }
        fn height(&self) -> u32 {
            self.height
        }
    }

    fn ready_renderer(gl: &mut FakeBackend) -> TriangleRenderer {
        let mut renderer = TriangleRenderer::new(Arc::new(MapAssets::complete()));
        renderer.on_surface_created(gl).unwrap();
        renderer
    }

    #[test]
    fn surface_created_builds_the_scene() {
        let mut gl = FakeBackend::default();
        let renderer = ready_renderer(&mut gl);

        assert!(renderer.is_ready());
        assert_eq!(gl.uploaded_vertices.as_deref(), Some(&TRIANGLE_POSITIONS[..]));
        assert!(gl.ops.contains(&"uniform:u_mvp_matrix".to_string()));
        assert!(gl.ops.contains(&"attribute:a_position".to_string()));
        assert_eq!(
            gl.ops.iter().filter(|op| op.starts_with("auto_delete")).count(),
            2
        );
    }

    #[test]
    fn missing_fragment_asset_fails_construction() {
        let mut gl = FakeBackend::default();
        let mut renderer = TriangleRenderer::new(Arc::new(MapAssets::missing_fragment()));

        let err = renderer.on_surface_created(&mut gl).unwrap_err();
        match err {
            SceneError::Asset { name, .. } => assert_eq!(name, FRAGMENT_SHADER_ASSET),
            other => panic!("expected an asset error, got {other:?}"),
        }
        assert!(!renderer.is_ready());

        // Frames must not be produced in this state.
        assert!(matches!(
            renderer.on_draw_frame(&mut gl),
            Err(RenderError::NotReady)
        ));
        assert!(!gl.ops.iter().any(|op| op.starts_with("draw")));
    }

    #[test]
    fn fragment_compile_failure_propagates() {
        let mut gl = FakeBackend {
            fail_fragment_compile: true,
            ..FakeBackend::default()
        };
        let mut renderer = TriangleRenderer::new(Arc::new(MapAssets::complete()));

        let err = renderer.on_surface_created(&mut gl).unwrap_err();
        assert!(matches!(
            err,
            SceneError::Backend(BackendError::ShaderCompile { .. })
        ));
        assert!(!renderer.is_ready());
    }

    #[test]
    fn draw_uploads_the_composed_mvp() {
        let mut gl = FakeBackend::default();
        let mut renderer = ready_renderer(&mut gl);
        renderer.on_surface_changed(&mut gl, 320, 480);

        // Rotate by a known angle through the touch path.
        let view = FakeView::new(320, 480);
        renderer.on_touch_event(&view, PointerEvent::new(PointerAction::Down, 200.0, 100.0));
        renderer.on_touch_event(&view, PointerEvent::new(PointerAction::Move, 216.0, 100.0));
        let angle = renderer.rotation_input().angle();
        assert!((angle - 9.0).abs() < 1e-4); // 16 px * 180/320

        renderer.on_draw_frame(&mut gl).unwrap();

        let ratio = 320.0 / 480.0;
        let mut projection = Transform::new();
        projection.set_frustum(-ratio, ratio, -1.0, 1.0, 3.0, 7.0);
        let expected = projection.matrix()
            * Mat4::look_at_rh(Vec3::new(0.0, 0.0, -3.0), Vec3::ZERO, Vec3::Y)
            * Mat4::from_axis_angle(Vec3::Z, angle.to_radians());

        let uploaded = gl.uploaded_matrix.expect("mvp was uploaded");
        for (actual, expected) in uploaded.iter().zip(expected.to_cols_array()) {
            assert!((actual - expected).abs() < 1e-5);
        }
        assert_eq!(gl.ops.last().unwrap(), "draw:Triangles:0:3");
        assert_eq!(view.render_requests.get(), 1);
    }

    #[test]
    fn frame_order_is_clear_use_upload_bind_draw() {
        let mut gl = FakeBackend::default();
        let mut renderer = ready_renderer(&mut gl);
        renderer.on_surface_changed(&mut gl, 100, 100);

        let start = gl.ops.len();
        renderer.on_draw_frame(&mut gl).unwrap();
        assert_eq!(
            &gl.ops[start..],
            &[
                "clear".to_string(),
                "use_program".to_string(),
                "upload_mvp".to_string(),
                "bind_vec3".to_string(),
                "draw:Triangles:0:3".to_string(),
            ]
        );
    }

    #[test]
    fn pause_releases_once_and_is_idempotent() {
        let mut gl = FakeBackend::default();
        let mut renderer = ready_renderer(&mut gl);

        renderer.on_pause(&mut gl);
        renderer.on_pause(&mut gl);

        assert_eq!(gl.deleted_programs.len(), 1);
        assert!(!renderer.is_ready());
        assert!(matches!(
            renderer.on_draw_frame(&mut gl),
            Err(RenderError::NotReady)
        ));
    }

    #[test]
    fn touch_events_are_always_consumed() {
        let mut gl = FakeBackend::default();
        let mut renderer = ready_renderer(&mut gl);
        let view = FakeView::new(100, 100);

        assert!(renderer.on_touch_event(&view, PointerEvent::new(PointerAction::Down, 1.0, 1.0)));
        assert!(renderer.on_touch_event(&view, PointerEvent::new(PointerAction::Up, 1.0, 1.0)));
        assert_eq!(view.render_requests.get(), 0);
    }
}
