// SPDX-License-Identifier: AGPL-3.0-only

//! GPU device context for beam-dynamics kernels.
//!
//! Creates a wgpu device requesting `SHADER_F64` and provides the buffer,
//! pipeline, and readback plumbing the device backend dispatches through.
//!
//! ## Adapter selection
//!
//! [`GpuDevice::acquire`] binds an adapter by enumeration index. Use
//! [`GpuDevice::enumerate_adapters`] (or `SYNCHROSPRING_GPU_ADAPTER`) to
//! discover indices first:
//!
//! | Value | Behavior |
//! |-------|----------|
//! | `0`, `1`, … | Select adapter by enumeration index |
//! | substring | Case-insensitive name match (e.g. `"titan"`, `"4070"`) |
//! | *(unset)* | First adapter with `SHADER_F64`, discrete preferred |
//!
//! ## Launch geometry
//!
//! Workgroup size defaults to the device's reported maximum (capped at 256);
//! workgroup count to `ceil(n / size)`. `SYNCHROSPRING_GPU_THREADS` and
//! `SYNCHROSPRING_GPU_BLOCKS` override either. All kernels use grid-stride
//! loops, so an undersized grid stays correct.
//!
//! ## Binding model
//!
//! One device per process, for the process lifetime. Re-acquiring the bound
//! index returns the existing handle; asking for a different index fails
//! with [`BeamlineError::DeviceAlreadyBound`]. Dropping backends never tears
//! the device down — resources stay reserved until process exit.

use std::sync::{Arc, Mutex, OnceLock};

use crate::error::BeamlineError;

/// Summary of a discovered GPU adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// Enumeration index (stable within a single run).
    pub index: usize,
    /// Adapter name as reported by the driver.
    pub name: String,
    /// Driver name (e.g. `"NVIDIA"`, `"NVK"`, `"radv"`).
    pub driver: String,
    /// Whether `SHADER_F64` is supported.
    pub has_f64: bool,
    /// Adapter device type (discrete, integrated, software, etc.).
    pub device_type: wgpu::DeviceType,
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let f64_tag = if self.has_f64 { "f64" } else { "f32" };
        write!(
            f,
            "[{}] {} ({}, {f64_tag})",
            self.index, self.name, self.driver
        )
    }
}

fn bound_slot() -> &'static Mutex<Option<(usize, Arc<GpuDevice>)>> {
    static BOUND: OnceLock<Mutex<Option<(usize, Arc<GpuDevice>)>>> = OnceLock::new();
    BOUND.get_or_init(|| Mutex::new(None))
}

/// Pick the workgroup size from an optional override and the device maximum.
fn pick_threads(override_threads: Option<u32>, device_max: u32) -> u32 {
    let default = device_max.clamp(1, 256);
    match override_threads {
        Some(t) if t >= 1 => t.min(device_max),
        _ => default,
    }
}

/// Pick the workgroup count from an optional override and the natural count.
fn pick_blocks(override_blocks: Option<u32>, natural: u32) -> u32 {
    match override_blocks {
        Some(b) if b >= 1 => b,
        _ => natural.max(1),
    }
    .min(65_535)
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// GPU context bound for the process lifetime.
pub struct GpuDevice {
    /// Adapter name as reported by the driver.
    pub adapter_name: String,
    /// Enumeration index this device was bound at.
    pub index: usize,
    /// Whether f64 shaders are available.
    pub has_f64: bool,
    device: wgpu::Device,
    queue: wgpu::Queue,
    max_workgroup_size: u32,
}

impl std::fmt::Debug for GpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuDevice")
            .field("adapter_name", &self.adapter_name)
            .field("index", &self.index)
            .field("has_f64", &self.has_f64)
            .finish_non_exhaustive()
    }
}

impl GpuDevice {
    /// Create a wgpu instance with the configured backend.
    fn create_instance() -> wgpu::Instance {
        let backends = match std::env::var("SYNCHROSPRING_WGPU_BACKEND").as_deref() {
            Ok("vulkan") => wgpu::Backends::VULKAN,
            Ok("metal") => wgpu::Backends::METAL,
            Ok("dx12") => wgpu::Backends::DX12,
            _ => wgpu::Backends::all(),
        };
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        })
    }

    /// Enumerate all available GPU adapters.
    pub fn enumerate_adapters() -> Vec<AdapterInfo> {
        let instance = Self::create_instance();
        instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .enumerate()
            .map(|(i, adapter)| {
                let info = adapter.get_info();
                AdapterInfo {
                    index: i,
                    name: info.name.clone(),
                    driver: info.driver.clone(),
                    has_f64: adapter.features().contains(wgpu::Features::SHADER_F64),
                    device_type: info.device_type,
                }
            })
            .collect()
    }

    /// Resolve `SYNCHROSPRING_GPU_ADAPTER` to an enumeration index.
    ///
    /// Unset/`auto`: first adapter with `SHADER_F64`, discrete preferred;
    /// falls back to index 0 when none advertises f64.
    #[must_use]
    pub fn default_adapter_index() -> usize {
        let selector = std::env::var("SYNCHROSPRING_GPU_ADAPTER")
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let adapters = Self::enumerate_adapters();
        if selector.is_empty() || selector == "auto" {
            let discrete = adapters
                .iter()
                .find(|a| a.has_f64 && a.device_type == wgpu::DeviceType::DiscreteGpu);
            return discrete
                .or_else(|| adapters.iter().find(|a| a.has_f64))
                .map_or(0, |a| a.index);
        }
        if let Ok(idx) = selector.parse::<usize>() {
            if idx < adapters.len() {
                return idx;
            }
        }
        adapters
            .iter()
            .find(|a| a.name.to_ascii_lowercase().contains(&selector))
            .map_or(0, |a| a.index)
    }

    /// Bind the adapter at `index` for the process lifetime.
    ///
    /// Idempotent for the bound index. Binding is first-come: the device
    /// stays reserved until process exit even after every backend using it
    /// is dropped.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::DeviceAlreadyBound`] if a different index is already
    /// bound; [`BeamlineError::NoAdapter`] / [`BeamlineError::DeviceCreation`]
    /// if the adapter cannot be opened.
    pub async fn acquire(index: usize) -> Result<Arc<Self>, BeamlineError> {
        if let Ok(slot) = bound_slot().lock() {
            if let Some((bound, arc)) = slot.as_ref() {
                return if *bound == index {
                    Ok(Arc::clone(arc))
                } else {
                    Err(BeamlineError::DeviceAlreadyBound {
                        bound: *bound,
                        requested: index,
                    })
                };
            }
        }

        let opened = Arc::new(Self::open(index).await?);

        let mut slot = bound_slot()
            .lock()
            .map_err(|_| BeamlineError::DeviceCreation("device slot poisoned".into()))?;
        match slot.as_ref() {
            None => {
                *slot = Some((index, Arc::clone(&opened)));
                Ok(opened)
            }
            Some((bound, arc)) if *bound == index => Ok(Arc::clone(arc)),
            Some((bound, _)) => Err(BeamlineError::DeviceAlreadyBound {
                bound: *bound,
                requested: index,
            }),
        }
    }

    /// The device bound earlier in this process, if any.
    #[must_use]
    pub fn bound() -> Option<Arc<Self>> {
        bound_slot()
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|(_, arc)| Arc::clone(arc)))
    }

    async fn open(index: usize) -> Result<Self, BeamlineError> {
        let instance = Self::create_instance();
        let adapters: Vec<wgpu::Adapter> = instance.enumerate_adapters(wgpu::Backends::all());
        if adapters.is_empty() {
            return Err(BeamlineError::NoAdapter);
        }
        let adapter = adapters
            .into_iter()
            .nth(index)
            .ok_or(BeamlineError::NoAdapter)?;
        let info = adapter.get_info();

        let adapter_features = adapter.features();
        let mut required_features = wgpu::Features::empty();
        if adapter_features.contains(wgpu::Features::SHADER_F64) {
            required_features |= wgpu::Features::SHADER_F64;
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("synchrospring beam device"),
                    required_features,
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| BeamlineError::DeviceCreation(e.to_string()))?;

        let max_workgroup_size = device.limits().max_compute_workgroup_size_x;

        Ok(Self {
            adapter_name: info.name,
            index,
            has_f64: required_features.contains(wgpu::Features::SHADER_F64),
            device,
            queue,
            max_workgroup_size,
        })
    }

    /// Underlying wgpu device.
    #[must_use]
    pub const fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Underlying wgpu queue.
    #[must_use]
    pub const fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Active workgroup size (threads per group), honoring the env override.
    #[must_use]
    pub fn workgroup_size(&self) -> u32 {
        pick_threads(env_u32("SYNCHROSPRING_GPU_THREADS"), self.max_workgroup_size)
    }

    /// Workgroup count for `n` elements, honoring the env override.
    #[must_use]
    pub fn workgroups_for(&self, n: usize) -> u32 {
        let threads = self.workgroup_size();
        let natural = u32::try_from(n.div_ceil(threads as usize)).unwrap_or(u32::MAX);
        pick_blocks(env_u32("SYNCHROSPRING_GPU_BLOCKS"), natural)
    }

    /// Compile a compute pipeline from WGSL source.
    #[must_use]
    pub fn create_pipeline(&self, source: &str, label: &str) -> wgpu::ComputePipeline {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &module,
                entry_point: "main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
    }

    /// Bind group from a pipeline and ordered buffer slice (binding 0, 1, …).
    #[must_use]
    pub fn create_bind_group(
        &self,
        pipeline: &wgpu::ComputePipeline,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let layout = pipeline.get_bind_group_layout(0);
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buf)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buf.as_entire_binding(),
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bind_group"),
            layout: &layout,
            entries: &entries,
        })
    }

    /// Read-write storage buffer from raw little-endian bytes.
    #[must_use]
    pub fn create_storage_buffer(&self, bytes: &[u8], label: &str) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Storage buffer from f64 data.
    #[must_use]
    pub fn create_f64_buffer(&self, data: &[f64], label: &str) -> wgpu::Buffer {
        self.create_storage_buffer(bytemuck::cast_slice(data), label)
    }

    /// Storage buffer from f64 data narrowed to f32.
    #[must_use]
    pub fn create_f32_buffer(&self, data: &[f64], label: &str) -> wgpu::Buffer {
        let narrowed: Vec<f32> = data.iter().map(|&v| v as f32).collect();
        self.create_storage_buffer(bytemuck::cast_slice(&narrowed), label)
    }

    /// Staging buffer for reading results back to the host.
    #[must_use]
    pub fn create_staging_buffer(&self, size: usize, label: &str) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Dispatch a compute pipeline (single submission).
    pub fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        workgroups: u32,
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("compute_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn read_back_bytes(
        &self,
        buffer: &wgpu::Buffer,
        size: usize,
    ) -> Result<Vec<u8>, BeamlineError> {
        let staging = self.create_staging_buffer(size, "readback");
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size as u64);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| {
                BeamlineError::DeviceCreation("GPU map callback: channel recv failed".into())
            })?
            .map_err(|e| BeamlineError::DeviceCreation(format!("GPU buffer mapping: {e}")))?;

        let data = slice.get_mapped_range();
        let out = data.to_vec();
        drop(data);
        staging.unmap();
        Ok(out)
    }

    /// Read back f64 data from a storage buffer via staging copy.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::DeviceCreation`] if the map callback fails.
    pub fn read_back_f64(
        &self,
        buffer: &wgpu::Buffer,
        count: usize,
    ) -> Result<Vec<f64>, BeamlineError> {
        let bytes = self.read_back_bytes(buffer, count * 8)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect())
    }

    /// Read back f32 data, widened to f64 on the host.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::DeviceCreation`] if the map callback fails.
    pub fn read_back_f32(
        &self,
        buffer: &wgpu::Buffer,
        count: usize,
    ) -> Result<Vec<f64>, BeamlineError> {
        let bytes = self.read_back_bytes(buffer, count * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect())
    }
}
