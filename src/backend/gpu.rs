//! Headless wgpu device management.
//!
//! [`GpuContext`] owns the device and queue the [`WgpuBackend`](super::WgpuBackend)
//! allocates targets on. The frame core never presents, so no surface is
//! created; the host application composites the final color target itself.

use crate::error::{RenderError, Result};

/// Core GPU context holding wgpu resources.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
pub struct GpuContext {
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Limits the device was created with.
    pub limits: wgpu::Limits,
}

impl GpuContext {
    /// Create a headless GPU context.
    ///
    /// This performs all wgpu initialization:
    /// 1. Creates a wgpu instance with primary backends (Vulkan, Metal, DX12)
    /// 2. Requests a suitable GPU adapter
    /// 3. Creates the logical device and command queue
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ResourceCreation`] if no adapter is found or
    /// device creation fails.
    pub fn new_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::ResourceCreation(format!("no suitable GPU adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("using adapter '{}' ({:?})", info.name, info.backend);

        let limits = wgpu::Limits::default();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Umbra Device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .map_err(|e| RenderError::ResourceCreation(format!("failed to create device: {e}")))?;

        Ok(Self::from_parts(device, queue, limits))
    }

    /// Wraps a device the host application already created.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, limits: wgpu::Limits) -> Self {
        Self {
            device,
            queue,
            limits,
        }
    }

    /// Largest width or height a 2D target may have on this device.
    pub fn max_texture_size(&self) -> u32 {
        self.limits.max_texture_dimension_2d
    }

    pub fn max_array_layers(&self) -> u32 {
        self.limits.max_texture_array_layers
    }
}
