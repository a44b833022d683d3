/// Buffer - Vulkan implementation of the render_test Buffer trait

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use render_test::{Buffer, BufferDesc, BufferFlavor, MapFlavor, MapTracker, RendererId, Result};
use render_test::render_err;
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_format::buffer_usage_to_vk;

/// Vulkan buffer in host-visible memory
///
/// The allocation stays persistently mapped, so mapping and readback are plain copies.
pub struct VulkanBuffer {
    /// Shared GPU context (device, allocator, queue, command pool)
    ctx: Arc<GpuContext>,
    owner: RendererId,
    flavor: BufferFlavor,
    /// Requested size (the allocation may be larger)
    size: u64,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    map_state: MapTracker,
}

impl VulkanBuffer {
    /// Create a buffer from a validated descriptor, uploading its initial data
    pub fn new(ctx: Arc<GpuContext>, owner: RendererId, desc: &BufferDesc<'_>) -> Result<Self> {
        let (buffer, allocation) = ctx.create_buffer(
            "buffer",
            desc.size,
            buffer_usage_to_vk(desc.flavor),
            MemoryLocation::CpuToGpu,
        )?;
        let vulkan_buffer = Self {
            ctx,
            owner,
            flavor: desc.flavor,
            size: desc.size,
            buffer,
            allocation: Some(allocation),
            map_state: MapTracker::new(),
        };
        match desc.init_data {
            Some(data) => vulkan_buffer.write(data)?,
            None => vulkan_buffer.write(&vec![0; desc.size as usize])?,
        }
        Ok(vulkan_buffer)
    }

    fn mapped_ptr(&self) -> Result<*mut u8> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| render_err!(LOG_SOURCE, "Buffer has no allocation"))?;
        let ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| render_err!(LOG_SOURCE, "Buffer is not CPU-accessible"))?;
        Ok(ptr.as_ptr() as *mut u8)
    }

    /// Copy `data` to the start of the buffer
    fn write(&self, data: &[u8]) -> Result<()> {
        let len = data.len().min(self.size as usize);
        let ptr = self.mapped_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, len);
        }
        Ok(())
    }

    fn read(&self) -> Result<Vec<u8>> {
        let ptr = self.mapped_ptr()?;
        let mut contents = vec![0; self.size as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr as *const u8, contents.as_mut_ptr(), contents.len());
        }
        Ok(contents)
    }
}

impl Buffer for VulkanBuffer {
    fn owner(&self) -> RendererId {
        self.owner
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn flavor(&self) -> BufferFlavor {
        self.flavor
    }

    fn is_mapped(&self) -> bool {
        self.map_state.is_mapped()
    }

    fn begin_map(&self, flavor: MapFlavor) -> Result<Vec<u8>> {
        self.map_state.acquire()?;
        let contents = match flavor {
            MapFlavor::HostRead | MapFlavor::HostWrite => self.read(),
            MapFlavor::WriteDiscard => Ok(vec![0; self.size as usize]),
        };
        if contents.is_err() {
            self.map_state.release();
        }
        contents
    }

    fn end_map(&self, written: Option<&[u8]>) -> Result<()> {
        let result = match written {
            Some(bytes) => self.write(bytes),
            None => Ok(()),
        };
        self.map_state.release();
        result
    }

    fn read_contents(&self) -> Result<Vec<u8>> {
        self.read()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.ctx.free_allocation(allocation);
        }
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
