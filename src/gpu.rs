//! wgpu implementation of the graphics backend.
//!
//! [`WgpuBackend`] owns the wgpu surface, device, and queue, plus the tables
//! that turn the backend contract's integer handles into live wgpu objects.
//! Each linked program becomes one render pipeline with a single `mat4`
//! uniform at `@group(0) @binding(0)` and a single tightly packed vec3
//! vertex attribute; each draw encodes one render pass, submits it, and
//! presents the frame.
//!
//! Shader sources are WGSL, one module per pipeline stage with a `vs` or
//! `fs` entry point. Uniform and attribute names are resolved against the
//! module source, so asking for a symbol the shaders never declared fails
//! at resolution time rather than silently binding garbage.

use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::backend::{
    AttributeHandle, BackendError, BufferHandle, DrawMode, GraphicsBackend, ProgramHandle,
    ShaderHandle, ShaderKind, UniformHandle,
};

struct ShaderEntry {
    kind: ShaderKind,
    module: wgpu::ShaderModule,
    source: String,
    auto_delete: bool,
}

struct ProgramEntry {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    vertex_source: String,
    fragment_source: String,
    attribute_location: u32,
}

/// Graphics backend driving a window surface through wgpu.
pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    shaders: Vec<Option<ShaderEntry>>,
    programs: Vec<Option<ProgramEntry>>,
    buffers: Vec<Option<wgpu::Buffer>>,

    clear_color: wgpu::Color,
    clear_requested: bool,
    viewport: Option<(u32, u32)>,
    active_program: Option<ProgramHandle>,
    bound_vertices: Option<(AttributeHandle, BufferHandle)>,
}

impl WgpuBackend {
    /// Creates a backend rendering to the given window.
    ///
    /// Performs instance, adapter, device, and surface setup, configured
    /// with an sRGB format and Fifo present mode.
    ///
    /// # Panics
    ///
    /// Panics if no suitable GPU adapter is found or device creation fails.
    pub fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .expect("Failed to create a rendering surface");

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .expect("Failed to find a suitable GPU adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Trigon Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .expect("Failed to create device");

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Self {
            surface,
            device,
            queue,
            config,
            shaders: Vec::new(),
            programs: Vec::new(),
            buffers: Vec::new(),
            clear_color: wgpu::Color::BLACK,
            clear_requested: false,
            viewport: None,
            active_program: None,
            bound_vertices: None,
        }
    }

    /// Reconfigures the surface for new dimensions. Zero-sized updates are
    /// ignored (they occur while the window is minimized).
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Current surface width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Current surface height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    fn shader(&self, handle: ShaderHandle) -> Result<&ShaderEntry, BackendError> {
        self.shaders
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::StaleHandle { kind: "shader" })
    }

    fn program(&self, handle: ProgramHandle) -> Result<&ProgramEntry, BackendError> {
        self.programs
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::StaleHandle { kind: "program" })
    }

    /// Runs `f` under a validation error scope, mapping any captured
    /// validation failure through `err`.
    fn validated<T>(
        &self,
        f: impl FnOnce(&wgpu::Device) -> T,
        err: impl FnOnce(String) -> BackendError,
    ) -> Result<T, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(value),
            Some(e) => Err(err(e.to_string())),
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn compile_shader(
        &mut self,
        kind: ShaderKind,
        source: &str,
    ) -> Result<ShaderHandle, BackendError> {
        let label = match kind {
            ShaderKind::Vertex => "Vertex Shader",
            ShaderKind::Fragment => "Fragment Shader",
        };

        let module = self.validated(
            |device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
            },
            |log| BackendError::ShaderCompile { log },
        )?;

        self.shaders.push(Some(ShaderEntry {
            kind,
            module,
            source: source.to_owned(),
            auto_delete: false,
        }));
        Ok(ShaderHandle(self.shaders.len() as u32 - 1))
    }

    fn set_shader_auto_delete(&mut self, shader: ShaderHandle, auto_delete: bool) {
        if let Some(Some(entry)) = self.shaders.get_mut(shader.0 as usize) {
            entry.auto_delete = auto_delete;
        }
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, BackendError> {
        let vs = self.shader(vertex)?;
        let fs = self.shader(fragment)?;
        if vs.kind != ShaderKind::Vertex || fs.kind != ShaderKind::Fragment {
            return Err(BackendError::ProgramLink {
                log: "shader stages passed in the wrong order".into(),
            });
        }

        let attribute_location = first_attribute_location(&vs.source);

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("MVP Uniform"),
            size: std::mem::size_of::<[f32; 16]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Program Bind Group Layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Program Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Program Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self.validated(
            |device| {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Program Pipeline"),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &vs.module,
                        entry_point: Some("vs"),
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: (3 * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &[wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 0,
                                shader_location: attribute_location,
                            }],
                        }],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &fs.module,
                        entry_point: Some("fs"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: self.config.format,
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        ..Default::default()
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
            },
            |log| BackendError::ProgramLink { log },
        )?;

        let entry = ProgramEntry {
            pipeline,
            uniform_buffer,
            bind_group,
            vertex_source: vs.source.clone(),
            fragment_source: fs.source.clone(),
            attribute_location,
        };

        // Linking detaches the shaders from their only owner-to-be; drop the
        // ones flagged for auto deletion. The pipeline keeps what it needs.
        for handle in [vertex, fragment] {
            let slot = &mut self.shaders[handle.0 as usize];
            if slot.as_ref().is_some_and(|s| s.auto_delete) {
                *slot = None;
            }
        }

        self.programs.push(Some(entry));
        Ok(ProgramHandle(self.programs.len() as u32 - 1))
    }

    fn resolve_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
    ) -> Result<UniformHandle, BackendError> {
        let entry = self.program(program)?;
        if declares_uniform(&entry.vertex_source, name)
            || declares_uniform(&entry.fragment_source, name)
        {
            // The single uniform always sits at @group(0) @binding(0); the
            // handle only needs to remember its owning program.
            Ok(UniformHandle(program.0))
        } else {
            Err(BackendError::MissingUniform(name.to_owned()))
        }
    }

    fn resolve_attribute(
        &mut self,
        program: ProgramHandle,
        name: &str,
    ) -> Result<AttributeHandle, BackendError> {
        let entry = self.program(program)?;
        vertex_input_location(&entry.vertex_source, name)
            .map(AttributeHandle)
            .ok_or_else(|| BackendError::MissingAttribute(name.to_owned()))
    }

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<BufferHandle, BackendError> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            });
        self.buffers.push(Some(buffer));
        Ok(BufferHandle(self.buffers.len() as u32 - 1))
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Some((width, height));
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = wgpu::Color {
            r: color[0] as f64,
            g: color[1] as f64,
            b: color[2] as f64,
            a: color[3] as f64,
        };
    }

    fn clear_color_buffer(&mut self) {
        self.clear_requested = true;
    }

    fn use_program(&mut self, program: ProgramHandle) -> Result<(), BackendError> {
        self.program(program)?;
        self.active_program = Some(program);
        Ok(())
    }

    fn set_uniform_matrix4(
        &mut self,
        uniform: UniformHandle,
        matrix: &[f32; 16],
    ) -> Result<(), BackendError> {
        let active = self.active_program.ok_or(BackendError::ProgramNotActive {
            op: "set_uniform_matrix4",
        })?;
        if active.0 != uniform.0 {
            return Err(BackendError::ProgramNotActive {
                op: "set_uniform_matrix4",
            });
        }

        let entry = self.program(active)?;
        self.queue
            .write_buffer(&entry.uniform_buffer, 0, bytemuck::cast_slice(matrix));
        Ok(())
    }

    fn bind_attribute_vec3(
        &mut self,
        attribute: AttributeHandle,
        buffer: BufferHandle,
    ) -> Result<(), BackendError> {
        self.buffers
            .get(buffer.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::StaleHandle { kind: "buffer" })?;
        self.bound_vertices = Some((attribute, buffer));
        Ok(())
    }

    fn issue_draw(&mut self, mode: DrawMode, first: u32, count: u32) -> Result<(), BackendError> {
        if mode != DrawMode::Triangles {
            // Pipelines are linked for triangle-list assembly.
            return Err(BackendError::UnsupportedDrawMode(mode));
        }

        let active = self
            .active_program
            .ok_or(BackendError::ProgramNotActive { op: "issue_draw" })?;
        let entry = self.program(active)?;
        let (attribute, buffer) = self.bound_vertices.ok_or(BackendError::NoVertexData)?;
        if attribute.0 != entry.attribute_location {
            return Err(BackendError::StaleHandle { kind: "attribute" });
        }
        let buffer = self.buffers[buffer.0 as usize]
            .as_ref()
            .ok_or(BackendError::StaleHandle { kind: "buffer" })?;

        let frame = self
            .surface
            .get_current_texture()
            .map_err(|e| BackendError::SurfaceAcquire(e.to_string()))?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let load = if self.clear_requested {
                wgpu::LoadOp::Clear(self.clear_color)
            } else {
                wgpu::LoadOp::Load
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some((w, h)) = self.viewport {
                let w = w.min(self.config.width) as f32;
                let h = h.min(self.config.height) as f32;
                render_pass.set_viewport(0.0, 0.0, w, h, 0.0, 1.0);
            }

            render_pass.set_pipeline(&entry.pipeline);
            render_pass.set_bind_group(0, &entry.bind_group, &[]);
            render_pass.set_vertex_buffer(0, buffer.slice(..));
            render_pass.draw(first..first + count, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            frame.present();
            self.clear_requested = false;
            return Err(BackendError::Draw { log: e.to_string() });
        }

        frame.present();
        self.clear_requested = false;
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if let Some(slot) = self.programs.get_mut(program.0 as usize) {
            *slot = None;
        }
        if self.active_program == Some(program) {
            self.active_program = None;
        }
    }
}

/// Whether the WGSL module declares `var<uniform>` storage named `name`.
fn declares_uniform(source: &str, name: &str) -> bool {
    source.split("var<uniform>").skip(1).any(|rest| {
        rest.trim_start()
            .strip_prefix(name)
            .is_some_and(|after| after.trim_start().starts_with(':'))
    })
}

/// The `@location(N)` of an entry-point parameter named `name`, if declared.
fn vertex_input_location(source: &str, name: &str) -> Option<u32> {
    let mut rest = source;
    while let Some(idx) = rest.find("@location(") {
        rest = &rest[idx + "@location(".len()..];
        let close = rest.find(')')?;
        let location = rest[..close].trim().parse().ok()?;
        let after = rest[close + 1..].trim_start();
        if let Some(after_name) = after.strip_prefix(name) {
            if after_name.trim_start().starts_with(':') {
                return Some(location);
            }
        }
    }
    None
}

/// The first `@location` annotation in the vertex module; the pipeline's
/// single vec3 attribute is laid out there. Defaults to 0.
fn first_attribute_location(source: &str) -> u32 {
    vertex_input_location_any(source).unwrap_or(0)
}

fn vertex_input_location_any(source: &str) -> Option<u32> {
    let idx = source.find("@location(")?;
    let rest = &source[idx + "@location(".len()..];
    let close = rest.find(')')?;
    rest[..close].trim().parse().ok()
}
