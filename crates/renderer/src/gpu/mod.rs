//! wgpu implementation of [`RenderBackend`].
//!
//! - `context` owns the wgpu instance, the shared device handle and the
//!   window surface configuration.
//! - `channels` uploads decoded channel images as sampled textures.
//! - `uniforms` allocates the per-session uniform buffers and builds the
//!   sparse binding layout/set pair.
//! - `pipeline` assembles the render pipeline from compiled modules.
//!
//! Binding, uploads and pipeline creation each run inside a validation error
//! scope; the first captured error is handed to the orchestrator through
//! [`RenderBackend::take_validation_error`].

mod channels;
mod context;
mod pipeline;
mod uniforms;

use std::sync::Arc;

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;
use winit::window::Window;

pub use channels::{load_channel_image, TextureBinding};
pub use context::{DeviceGateway, GpuHandle};
pub use pipeline::{mesh_vertex_layout, VERTEX_STRIDE};
pub use uniforms::{binding_slots, BindingSlot, BoundResources, SlotKind, UniformBlockSet};

use crate::backend::{FrameInput, PipelineDesc, RenderBackend};
use crate::compile::{compile_module, Compilation, ComposedSource};
use crate::diagnostics::StructuredError;
use crate::types::{CanvasSize, ChannelImage, VertexData, CHANNEL_COUNT};

use context::WindowSurface;
use pipeline::PipelineInputs;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.1,
    g: 0.1,
    b: 0.1,
    a: 1.0,
};

/// Uploaded mesh vertices.
pub struct VertexBuffer {
    buffer: wgpu::Buffer,
}

/// Renders sessions into a winit window.
pub struct WgpuBackend {
    gateway: DeviceGateway,
    window: Arc<Window>,
    surface: Option<WindowSurface>,
    gpu: Option<Arc<GpuHandle>>,
    validation_error: Option<String>,
}

impl WgpuBackend {
    pub fn new(gateway: DeviceGateway, window: Arc<Window>) -> Self {
        Self {
            gateway,
            window,
            surface: None,
            gpu: None,
            validation_error: None,
        }
    }

    fn gpu(&self) -> Result<Arc<GpuHandle>> {
        self.gpu
            .as_ref()
            .map(Arc::clone)
            .context("graphics device has not been acquired")
    }

    /// Runs `op` inside a validation error scope, remembering the first error.
    fn scoped<T>(&mut self, label: &str, op: impl FnOnce(&GpuHandle) -> T) -> Result<T> {
        let gpu = self.gpu()?;
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = op(&gpu);
        if let Some(error) = pollster::block_on(gpu.device.pop_error_scope()) {
            tracing::warn!(label, %error, "GPU validation error");
            self.validation_error.get_or_insert_with(|| error.to_string());
        }
        Ok(value)
    }
}

impl RenderBackend for WgpuBackend {
    type Module = wgpu::ShaderModule;
    type Texture = TextureBinding;
    type Resources = BoundResources;
    type Pipeline = wgpu::RenderPipeline;
    type Vertices = VertexBuffer;

    fn acquire(&mut self, size: CanvasSize) -> bool {
        self.validation_error = None;
        if self.surface.is_none() {
            match self.gateway.create_surface(Arc::clone(&self.window)) {
                Ok(surface) => self.surface = Some(WindowSurface::new(surface)),
                Err(error) => {
                    tracing::error!(error = %format!("{error:#}"), "graphics device unavailable");
                    return false;
                }
            }
        }
        let Some(surface) = self.surface.as_mut() else {
            return false;
        };
        let Some(gpu) = self.gateway.acquire(Some(surface.raw())) else {
            return false;
        };
        surface.configure(&gpu, size);
        self.gpu = Some(gpu);
        true
    }

    fn compile(&mut self, source: &ComposedSource, label: &str) -> Compilation<Self::Module> {
        match self.gpu() {
            Ok(gpu) => compile_module(&gpu.device, source, label),
            Err(error) => Compilation::new(None, vec![StructuredError::new(error.to_string(), 1)]),
        }
    }

    fn load_texture(&mut self, channel: usize, image: &ChannelImage) -> Result<Self::Texture> {
        self.scoped("channel texture", |gpu| {
            channels::create_texture_binding(&gpu.device, &gpu.queue, channel, image)
        })
    }

    fn bind(
        &mut self,
        size: CanvasSize,
        textures: [Option<Self::Texture>; CHANNEL_COUNT],
    ) -> Result<Self::Resources> {
        self.scoped("bind group", |gpu| uniforms::bind(&gpu.device, size, textures))
    }

    fn upload_vertices(&mut self, vertices: &VertexData) -> Result<Self::Vertices> {
        self.scoped("vertex buffer", |gpu| VertexBuffer {
            buffer: gpu
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("mesh vertices"),
                    contents: bytemuck::cast_slice(vertices.as_slice()),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
        })
    }

    fn build_pipeline(
        &mut self,
        desc: PipelineDesc<'_, Self::Module>,
        resources: &Self::Resources,
    ) -> Result<Self::Pipeline> {
        let target_format = self
            .surface
            .as_ref()
            .and_then(|surface| surface.format())
            .context("surface is not configured")?;
        self.scoped("render pipeline", |gpu| {
            pipeline::build_pipeline(
                &gpu.device,
                PipelineInputs {
                    vertex_module: desc.vertex_module,
                    vertex_entry: desc.vertex_entry,
                    fragment_module: desc.fragment_module,
                    fragment_entry: desc.fragment_entry,
                    target_format,
                    bind_group_layout: &resources.layout,
                    use_vertex_input: desc.use_vertex_input,
                },
            )
        })
    }

    fn take_validation_error(&mut self) -> Option<String> {
        self.validation_error.take()
    }

    fn draw(
        &mut self,
        pipeline: &Self::Pipeline,
        resources: &Self::Resources,
        vertices: Option<&Self::Vertices>,
        frame: FrameInput,
    ) -> Result<()> {
        let gpu = self.gpu()?;
        let surface = self.surface.as_ref().context("surface is not configured")?;

        resources
            .uniforms
            .write_frame(&gpu.queue, frame.elapsed, frame.pointer);

        let Some(output) = surface.next_texture(&gpu.device)? else {
            return Ok(());
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &resources.bind_group, &[]);
            if let Some(vertices) = vertices {
                pass.set_vertex_buffer(0, vertices.buffer.slice(..));
            }
            pass.draw(0..frame.vertex_count, 0..1);
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
