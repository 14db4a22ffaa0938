use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use winit::window::Window;

use crate::types::CanvasSize;

/// Adapter, device and queue shared by every render session.
pub struct GpuHandle {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// Owns the wgpu instance and hands out the process-wide device.
///
/// The device is requested on the first successful [`DeviceGateway::acquire`]
/// and reused afterwards. A failed request leaves the gateway empty so the
/// next render attempt tries again.
pub struct DeviceGateway {
    instance: wgpu::Instance,
    handle: Option<Arc<GpuHandle>>,
}

impl DeviceGateway {
    pub fn new() -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });
        Self {
            instance,
            handle: None,
        }
    }

    pub fn create_surface(&self, window: Arc<Window>) -> Result<wgpu::Surface<'static>> {
        self.instance
            .create_surface(window)
            .context("failed to create rendering surface")
    }

    /// Returns the shared handle, requesting it on first use.
    pub fn acquire(&mut self, compatible_surface: Option<&wgpu::Surface<'_>>) -> Option<Arc<GpuHandle>> {
        if let Some(handle) = &self.handle {
            return Some(Arc::clone(handle));
        }

        match request_handle(&self.instance, compatible_surface) {
            Ok(handle) => {
                let handle = Arc::new(handle);
                self.handle = Some(Arc::clone(&handle));
                Some(handle)
            }
            Err(error) => {
                tracing::error!(error = %format!("{error:#}"), "graphics device unavailable");
                None
            }
        }
    }
}

impl Default for DeviceGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn request_handle(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> Result<GpuHandle> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")?;

    let info = adapter.get_info();
    tracing::debug!(
        name = %info.name,
        backend = ?info.backend,
        device_type = ?info.device_type,
        "selected GPU adapter"
    );

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("shadebox device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::default(),
    }))
    .context("failed to create GPU device")?;

    device.on_uncaptured_error(Box::new(|error| {
        tracing::error!(%error, "uncaptured GPU error");
    }));

    Ok(GpuHandle {
        adapter,
        device,
        queue,
    })
}

/// A window surface plus its current configuration.
pub(crate) struct WindowSurface {
    surface: wgpu::Surface<'static>,
    config: Option<wgpu::SurfaceConfiguration>,
}

impl WindowSurface {
    pub(crate) fn new(surface: wgpu::Surface<'static>) -> Self {
        Self {
            surface,
            config: None,
        }
    }

    pub(crate) fn raw(&self) -> &wgpu::Surface<'static> {
        &self.surface
    }

    /// Configures the surface for `size` and returns the chosen format.
    pub(crate) fn configure(&mut self, gpu: &GpuHandle, size: CanvasSize) -> wgpu::TextureFormat {
        let caps = self.surface.get_capabilities(&gpu.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);
        let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            caps.present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        };
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        self.surface.configure(&gpu.device, &config);
        tracing::debug!(?format, ?present_mode, width = config.width, height = config.height, "configured surface");
        self.config = Some(config);
        format
    }

    pub(crate) fn format(&self) -> Option<wgpu::TextureFormat> {
        self.config.as_ref().map(|config| config.format)
    }

    /// Next swapchain image; `None` when the frame should be skipped.
    pub(crate) fn next_texture(&self, device: &wgpu::Device) -> Result<Option<wgpu::SurfaceTexture>> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                if let Some(config) = &self.config {
                    self.surface.configure(device, config);
                }
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::debug!("surface texture acquisition timed out; skipping frame");
                Ok(None)
            }
            Err(error) => Err(anyhow::anyhow!("failed to acquire surface texture: {error}")),
        }
    }
}
