/// Buffer trait, buffer descriptor and CPU mapping guard

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::error::Result;
use crate::renderer::handle::RendererId;

/// What the buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFlavor {
    /// Constant (uniform) buffer
    Constant,
    /// Vertex buffer
    Vertex,
    /// Storage buffer (read/write from shaders, used by binding states)
    Storage,
}

/// CPU access requested by `Renderer::map`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFlavor {
    /// Read current contents; writes through the mapping are discarded on unmap
    HostRead,
    /// Read-modify-write; the mapping starts with the current contents
    HostWrite,
    /// Overwrite everything; the mapping starts zeroed and previous contents are lost
    WriteDiscard,
}

/// Descriptor for creating a buffer
///
/// `init_data` is borrowed and copied synchronously during `create_buffer`.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    /// Size in bytes (must be non-zero)
    pub size: u64,
    /// Buffer flavor
    pub flavor: BufferFlavor,
    /// Initial contents; when present its length must equal `size`
    pub init_data: Option<&'a [u8]>,
}

impl<'a> BufferDesc<'a> {
    /// Uninitialized buffer of `size` bytes
    pub fn new(size: u64, flavor: BufferFlavor) -> Self {
        Self { size, flavor, init_data: None }
    }

    /// Buffer sized and filled from `data`
    pub fn with_data(flavor: BufferFlavor, data: &'a [u8]) -> Self {
        Self {
            size: data.len() as u64,
            flavor,
            init_data: Some(data),
        }
    }

    /// Shared creation check used by every backend
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            crate::render_bail!(
                "render_test::buffer",
                ResourceCreation,
                "{:?} buffer size is zero",
                self.flavor
            );
        }
        if let Some(data) = self.init_data {
            if data.len() as u64 != self.size {
                crate::render_bail!(
                    "render_test::buffer",
                    ResourceCreation,
                    "initial data is {} bytes but buffer size is {}",
                    data.len(),
                    self.size
                );
            }
        }
        Ok(())
    }
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types (e.g., SoftwareBuffer, VulkanBuffer).
/// The buffer is automatically destroyed when the last `Arc` is dropped.
pub trait Buffer: Send + Sync {
    /// Renderer that created this buffer
    fn owner(&self) -> RendererId;

    /// Size in bytes
    fn size(&self) -> u64;

    /// Flavor the buffer was created with
    fn flavor(&self) -> BufferFlavor;

    /// Whether a `BufferMapping` is currently outstanding
    fn is_mapped(&self) -> bool;

    /// Start a CPU mapping and return the bytes the host sees
    ///
    /// Fails with `InvalidState` if the buffer is already mapped.
    fn begin_map(&self, flavor: MapFlavor) -> Result<Vec<u8>>;

    /// Finish the mapping, writing `written` back to the buffer when present
    fn end_map(&self, written: Option<&[u8]>) -> Result<()>;

    /// Copy the full contents back to the host without touching the mapping state
    fn read_contents(&self) -> Result<Vec<u8>>;

    /// Concrete type access for the owning backend
    fn as_any(&self) -> &dyn Any;
}

/// Mapped/unmapped flag shared by backend buffer implementations
#[derive(Debug, Default)]
pub struct MapTracker {
    mapped: AtomicBool,
}

impl MapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark as mapped; fails if a mapping is already outstanding
    pub fn acquire(&self) -> Result<()> {
        if self
            .mapped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            crate::render_bail!(
                "render_test::buffer",
                InvalidState,
                "buffer is already mapped; unmap it before mapping again"
            );
        }
        Ok(())
    }

    pub fn release(&self) {
        self.mapped.store(false, Ordering::Release);
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }
}

/// Scoped CPU view of a mapped buffer
///
/// Dereferences to the mapped bytes. Released by `unmap` or when dropped; for
/// `HostWrite` and `WriteDiscard` the bytes are written back to the buffer on release.
pub struct BufferMapping {
    buffer: Arc<dyn Buffer>,
    flavor: MapFlavor,
    data: Vec<u8>,
    released: bool,
}

impl BufferMapping {
    /// Map `buffer` with the given flavor
    pub fn begin(buffer: Arc<dyn Buffer>, flavor: MapFlavor) -> Result<Self> {
        let data = buffer.begin_map(flavor)?;
        Ok(Self {
            buffer,
            flavor,
            data,
            released: false,
        })
    }

    pub fn flavor(&self) -> MapFlavor {
        self.flavor
    }

    /// Buffer this mapping refers to
    pub fn buffer(&self) -> &Arc<dyn Buffer> {
        &self.buffer
    }

    /// Release the mapping, reporting write-back failures
    pub fn unmap(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match self.flavor {
            MapFlavor::HostRead => self.buffer.end_map(None),
            MapFlavor::HostWrite | MapFlavor::WriteDiscard => self.buffer.end_map(Some(&self.data)),
        }
    }
}

impl Deref for BufferMapping {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for BufferMapping {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for BufferMapping {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            crate::render_error!("render_test::buffer", "implicit unmap failed: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
