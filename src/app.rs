use std::{mem, process, sync::Arc, time::Instant};

use anyhow::bail;
use bytemuck::NoUninit;
use wgpu::{
    Adapter, Backends, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, BlendState,
    Buffer, BufferBindingType, BufferDescriptor, BufferUsages, ColorTargetState, ColorWrites,
    CommandEncoder, Device, DeviceDescriptor, FragmentState, InstanceDescriptor, LoadOp,
    MemoryHints, MultisampleState, Operations, PipelineCompilationOptions,
    PipelineLayoutDescriptor, PrimitiveState, PrimitiveTopology, Queue, RenderPass,
    RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor,
    RequestAdapterOptions, ShaderModuleDescriptor, ShaderSource, ShaderStages, StoreOp, Surface,
    SurfaceError, SurfaceTarget, Texture, TextureFormat, VertexState,
};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, Touch, TouchPhase, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::PhysicalKey,
    window::{Fullscreen, Window, WindowId},
};

use crate::{
    cmd::{Cmd, TouchEvent},
    color::Color,
    config::{CommandVerb, Config, Key},
    input::{TouchTracker, MOUSE_ID},
    math::{vec2, Vec2f},
    session::{DrawingSession, Snapshot},
    stroke::{Stroke, StrokeHistory},
    viewport::Viewport,
};

pub struct App {
    config: Config,
    instance: wgpu::Instance,
    win: Option<Win>,
    touches: TouchTracker,
    /// Zero point of touch timestamps.
    started: Instant,
    /// Index into `config.palette` of the selected color.
    color_index: usize,
    cursor_pos: Vec2f,
}

struct Gpu {
    adapter: Adapter,
    device: Device,
    queue: Queue,

    render_pipeline: RenderPipeline,

    uniforms_bgl: BindGroupLayout,
    segments_bgl: BindGroupLayout,
}

impl Gpu {
    fn new(
        instance: &wgpu::Instance,
        surface: &Surface<'_>,
    ) -> anyhow::Result<(Self, TextureFormat)> {
        let adapter = match pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            compatible_surface: Some(surface),
            ..Default::default()
        })) {
            Ok(adapter) => adapter,
            Err(e) => bail!("failed to find a supported graphics adapter: {e}"),
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            memory_hints: MemoryHints::MemoryUsage,
            ..Default::default()
        }))?;

        let caps = surface.get_capabilities(&adapter);
        let Some(&format) = caps.formats.first() else {
            bail!("adapter does not support the window surface");
        };

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("shader"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        // BGLs
        let uniforms_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("uniforms"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        });
        let segments_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("segments"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        });

        let render_pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("stroke_pipeline"),
            layout: Some(&device.create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some("stroke_pipeline"),
                bind_group_layouts: &[&uniforms_bgl, &segments_bgl],
                ..Default::default()
            })),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vertex"),
                compilation_options: PipelineCompilationOptions::default(),
                buffers: &[],
            },
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fragment"),
                compilation_options: PipelineCompilationOptions::default(),
                targets: &[Some(ColorTargetState {
                    format,
                    blend: Some(BlendState::ALPHA_BLENDING),
                    write_mask: ColorWrites::all(),
                })],
            }),
            multiview: None,
            cache: None,
        });

        let gpu = Gpu {
            adapter,
            device,
            queue,
            render_pipeline,
            uniforms_bgl,
            segments_bgl,
        };
        Ok((gpu, format))
    }
}

struct Win {
    window: Arc<Window>,
    surface: Surface<'static>,
    gpu: Gpu,
    format: TextureFormat,

    session: DrawingSession,
    background: wgpu::Color,
    stroke_width: f32,

    committed: Drawable,
    /// History whose strokes are currently uploaded to `committed`.
    uploaded: StrokeHistory,
    active: Drawable,
}

impl Win {
    fn recreate_swapchain(&self) {
        let res = self.window.inner_size();
        if res.width == 0 || res.height == 0 {
            // minimized
            return;
        }

        let Some(mut config) = self
            .surface
            .get_default_config(&self.gpu.adapter, res.width, res.height)
        else {
            log::error!("adapter does not support the window surface");
            return;
        };
        config.format = self.format;

        log::debug!(
            "configuring window surface for {}x{} (format: {:?}, present mode: {:?}, alpha mode: {:?})",
            res.width,
            res.height,
            config.format,
            config.present_mode,
            config.alpha_mode,
        );

        self.surface.configure(&self.gpu.device, &config);
    }

    fn update_title(&self) {
        let title = if self.session.snapshot().hand_mode {
            "Fingerpaint (hand mode)"
        } else {
            "Fingerpaint"
        };
        self.window.set_title(title);
    }

    fn resized(&mut self) {
        let size = self.window.inner_size();
        self.session
            .set_view_size(vec2(size.width as f32, size.height as f32));
        let view_box = self.session.snapshot().view_box;
        log::debug!("view box is now {view_box:?}");
        self.recreate_swapchain();
        self.window.request_redraw();
    }

    fn redraw(&mut self) {
        let st = match self.surface.get_current_texture() {
            Ok(st) => st,
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("surface error: {}", err);
                self.recreate_swapchain();
                match self.surface.get_current_texture() {
                    Ok(st) => st,
                    Err(e) => {
                        log::error!(
                            "failed to acquire next frame after recreating swapchain: {e}"
                        );
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("failed to acquire frame: {e}");
                return;
            }
        };

        let snapshot = self.session.snapshot();
        self.upload(&snapshot);
        let target_size = vec2(st.texture.width() as f32, st.texture.height() as f32);
        let uniforms = Uniforms::new(&snapshot.viewport, target_size, self.stroke_width);

        let mut enc = self.gpu.device.create_command_encoder(&Default::default());

        let mut pass = Pass::new(&mut enc, &st.texture, self.background);
        self.committed.draw(&self.gpu, &mut pass, &uniforms);
        self.active.draw(&self.gpu, &mut pass, &uniforms);
        drop(pass);

        self.gpu.queue.submit([enc.finish()]);
        self.window.pre_present_notify();
        st.present();
    }

    /// Uploads the strokes in `snapshot`, skipping committed strokes that are already on the GPU.
    fn upload(&mut self, snapshot: &Snapshot) {
        if !self.uploaded.ptr_eq(&snapshot.strokes) {
            let segs = segments(snapshot.strokes.iter());
            log::trace!(
                "uploading {} strokes ({} segments)",
                snapshot.strokes.len(),
                segs.len()
            );
            self.committed.set_segments(&self.gpu, &segs);
            self.uploaded = snapshot.strokes.clone();
        }
        self.active
            .set_segments(&self.gpu, &segments([&snapshot.active]));
    }
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            instance: wgpu::Instance::new(&InstanceDescriptor {
                backends: Backends::PRIMARY,
                ..Default::default()
            }),
            win: None,
            touches: TouchTracker::default(),
            started: Instant::now(),
            color_index: 0,
            cursor_pos: Vec2f::ZERO,
        })
    }

    fn create_win(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<Win> {
        let fullscreen = match &self.config.monitor {
            Some(name) => {
                let monitor = event_loop
                    .available_monitors()
                    .find(|m| m.name().as_deref() == Some(name.as_str()));
                if monitor.is_none() {
                    log::warn!("monitor '{name}' not found, opening a window instead");
                }
                monitor.map(|m| Fullscreen::Borderless(Some(m)))
            }
            None => None,
        };
        let window = Arc::new(
            event_loop.create_window(
                Window::default_attributes()
                    .with_fullscreen(fullscreen)
                    .with_title("Fingerpaint"),
            )?,
        );

        let surface = self
            .instance
            .create_surface(SurfaceTarget::from(window.clone()))?;
        let (gpu, format) = Gpu::new(&self.instance, &surface)?;

        let size = window.inner_size();
        log::debug!(
            "creating canvas at {}x{}, format={:?}",
            size.width,
            size.height,
            format
        );
        let session = DrawingSession::new(
            vec2(size.width as f32, size.height as f32),
            self.config.palette[self.color_index],
        );
        let committed = Drawable::new(&gpu);
        let active = Drawable::new(&gpu);

        let win = Win {
            window,
            surface,
            gpu,
            format,
            session,
            background: self.config.background.into(),
            stroke_width: self.config.stroke_width,
            committed,
            uploaded: StrokeHistory::default(),
            active,
        };
        win.recreate_swapchain();
        Ok(win)
    }

    fn timestamp(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn command(&mut self, verb: CommandVerb) -> Cmd {
        match verb {
            CommandVerb::Undo => Cmd::Undo,
            CommandVerb::Clear => Cmd::Clear,
            CommandVerb::ZoomIn => Cmd::ZoomIn,
            CommandVerb::ZoomOut => Cmd::ZoomOut,
            CommandVerb::ResetView => Cmd::ResetView,
            CommandVerb::ToggleHand => Cmd::ToggleHandMode,
            CommandVerb::NextColor => {
                self.color_index = (self.color_index + 1) % self.config.palette.len();
                Cmd::SetColor {
                    color: self.config.palette[self.color_index],
                }
            }
        }
    }

    fn touch_input(&mut self, id: u64, phase: TouchPhase, position: Vec2f) {
        let timestamp = self.timestamp();
        for event in self.touches.handle(id, phase, position, timestamp) {
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: TouchEvent) {
        let Some(win) = &mut self.win else { return };
        win.session.handle_touch(event);
        win.window.request_redraw();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.win.is_none() {
            let win = match self.create_win(event_loop) {
                Ok(win) => win,
                Err(e) => {
                    log::error!("could not create window: {e}");
                    process::exit(1);
                }
            };
            self.win = Some(win);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => {
                if let Some(win) = &mut self.win {
                    win.redraw();
                }
            }
            WindowEvent::Resized(_) => {
                if let Some(win) = &mut self.win {
                    win.resized();
                }
            }
            WindowEvent::Touch(Touch {
                id,
                phase,
                location,
                ..
            }) => {
                self.touch_input(id, phase, vec2(location.x as f32, location.y as f32));
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_pos = vec2(position.x as f32, position.y as f32);
                if self.touches.is_active(MOUSE_ID) {
                    self.touch_input(MOUSE_ID, TouchPhase::Moved, self.cursor_pos);
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let phase = match state {
                    ElementState::Pressed => TouchPhase::Started,
                    ElementState::Released => TouchPhase::Ended,
                };
                self.touch_input(MOUSE_ID, phase, self.cursor_pos);
            }
            WindowEvent::Focused(false) => {
                let timestamp = self.timestamp();
                if let Some(event) = self.touches.release_all(timestamp) {
                    self.dispatch(event);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                let Some(&verb) = self.config.bind.get(&Key(code)) else {
                    return;
                };
                let cmd = self.command(verb);
                log::debug!("{verb:?} -> {cmd:?}");
                if let Some(win) = &mut self.win {
                    win.session.apply(cmd);
                    if cmd == Cmd::ToggleHandMode {
                        win.update_title();
                    }
                    win.window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Flattens strokes into one GPU instance per polyline segment.
fn segments<'a>(strokes: impl IntoIterator<Item = &'a Stroke>) -> Vec<Segment> {
    strokes
        .into_iter()
        .flat_map(|stroke| {
            stroke.segments().map(move |(start, end)| Segment {
                start,
                end,
                color: stroke.color,
            })
        })
        .collect()
}

#[derive(Clone, Copy, NoUninit)]
#[repr(C)]
struct Uniforms {
    render_target_size: Vec2f,
    translate: Vec2f,
    scale: f32,
    stroke_width: f32,
}

impl Uniforms {
    fn new(viewport: &Viewport, render_target_size: Vec2f, stroke_width: f32) -> Self {
        Self {
            render_target_size,
            translate: viewport.translate,
            scale: viewport.scale,
            stroke_width,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
#[repr(C)]
struct Segment {
    /// Start point in canvas coordinates.
    start: Vec2f,
    end: Vec2f,
    color: Color,
}

struct Pass<'a> {
    pass: RenderPass<'a>,
}

impl<'a> Pass<'a> {
    fn new(enc: &'a mut CommandEncoder, target: &Texture, clear: wgpu::Color) -> Self {
        let pass = enc.begin_render_pass(&RenderPassDescriptor {
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &target.create_view(&Default::default()),
                depth_slice: None,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(clear),
                    store: StoreOp::Store,
                },
            })],
            ..Default::default()
        });

        Self { pass }
    }
}

/// A batch of stroke segments drawn with one instanced draw call.
struct Drawable {
    uniform_buf: Buffer,
    instance_buf: Buffer,
    uniforms_bg: BindGroup,
    instances_bg: BindGroup,
    instance_count: u32,
}

impl Drawable {
    fn new(gpu: &Gpu) -> Self {
        let uniform_buf = gpu.device.create_buffer(&BufferDescriptor {
            label: None,
            size: mem::size_of::<Uniforms>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let instance_buf = Self::create_instance_buf(gpu, 1);
        let uniforms_bg = gpu.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &gpu.uniforms_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(uniform_buf.as_entire_buffer_binding()),
            }],
        });
        let instances_bg = Self::create_instances_bg(gpu, &instance_buf);

        Self {
            uniform_buf,
            instance_buf,
            uniforms_bg,
            instances_bg,
            instance_count: 0,
        }
    }

    fn create_instance_buf(gpu: &Gpu, capacity: usize) -> Buffer {
        gpu.device.create_buffer(&BufferDescriptor {
            label: Some("segments"),
            size: (mem::size_of::<Segment>() * capacity) as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_instances_bg(gpu: &Gpu, instance_buf: &Buffer) -> BindGroup {
        gpu.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &gpu.segments_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(instance_buf.as_entire_buffer_binding()),
            }],
        })
    }

    fn set_segments(&mut self, gpu: &Gpu, segments: &[Segment]) {
        self.instance_count = segments.len() as u32;
        if segments.is_empty() {
            return;
        }

        let size = mem::size_of_val(segments) as u64;
        if self.instance_buf.size() < size {
            // grow geometrically; strokes are appended one at a time
            self.instance_buf = Self::create_instance_buf(gpu, segments.len().next_power_of_two());
            self.instances_bg = Self::create_instances_bg(gpu, &self.instance_buf);
        }
        gpu.queue
            .write_buffer(&self.instance_buf, 0, bytemuck::cast_slice(segments));
    }

    fn draw(&self, gpu: &Gpu, p: &mut Pass<'_>, uniforms: &Uniforms) {
        if self.instance_count == 0 {
            return;
        }

        gpu.queue
            .write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(uniforms));

        p.pass.set_pipeline(&gpu.render_pipeline);
        p.pass.set_bind_group(0, &self.uniforms_bg, &[]);
        p.pass.set_bind_group(1, &self.instances_bg, &[]);
        p.pass.draw(0..4, 0..self.instance_count);
    }
}
