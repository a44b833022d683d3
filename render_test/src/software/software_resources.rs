/// Software backend resources: host-memory buffers, layouts, binding states and programs

use std::any::Any;
use std::sync::{Mutex, MutexGuard};
use crate::error::Result;
use crate::renderer::{
    BindingState, BoundResource, Buffer, BufferDesc, BufferFlavor, InputElementDesc, InputLayout,
    MapFlavor, MapTracker, RendererId, ShaderProgram, ShaderStageFlags,
};
use crate::software::kernel::{ComputeKernel, FragmentKernel, VertexKernel};

// ============================================================================
// Software Buffer
// ============================================================================

/// Buffer stored in host memory
pub struct SoftwareBuffer {
    owner: RendererId,
    flavor: BufferFlavor,
    size: u64,
    data: Mutex<Vec<u8>>,
    map_state: MapTracker,
}

impl SoftwareBuffer {
    /// Allocate from a validated descriptor (zero-filled without init data)
    pub fn new(owner: RendererId, desc: &BufferDesc<'_>) -> Self {
        let data = match desc.init_data {
            Some(bytes) => bytes.to_vec(),
            None => vec![0; desc.size as usize],
        };
        Self {
            owner,
            flavor: desc.flavor,
            size: desc.size,
            data: Mutex::new(data),
            map_state: MapTracker::new(),
        }
    }

    /// Lock the contents for reading or writing by the rasterizer
    pub fn lock(&self) -> Result<MutexGuard<'_, Vec<u8>>> {
        self.data
            .lock()
            .map_err(|_| crate::render_err!("render_test::software", "buffer lock poisoned"))
    }
}

impl Buffer for SoftwareBuffer {
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
        let contents = match self.lock() {
            Ok(data) => match flavor {
                MapFlavor::HostRead | MapFlavor::HostWrite => data.clone(),
                MapFlavor::WriteDiscard => vec![0; data.len()],
            },
            Err(e) => {
                self.map_state.release();
                return Err(e);
            }
        };
        Ok(contents)
    }

    fn end_map(&self, written: Option<&[u8]>) -> Result<()> {
        let result = match written {
            Some(bytes) => self.lock().map(|mut data| {
                let len = data.len().min(bytes.len());
                data[..len].copy_from_slice(&bytes[..len]);
            }),
            None => Ok(()),
        };
        self.map_state.release();
        result
    }

    fn read_contents(&self) -> Result<Vec<u8>> {
        Ok(self.lock()?.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Software Input Layout
// ============================================================================

pub struct SoftwareInputLayout {
    owner: RendererId,
    elements: Vec<InputElementDesc>,
}

impl SoftwareInputLayout {
    pub fn new(owner: RendererId, elements: &[InputElementDesc]) -> Self {
        Self {
            owner,
            elements: elements.to_vec(),
        }
    }
}

impl InputLayout for SoftwareInputLayout {
    fn owner(&self) -> RendererId {
        self.owner
    }

    fn elements(&self) -> &[InputElementDesc] {
        &self.elements
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Software Binding State
// ============================================================================

pub struct SoftwareBindingState {
    owner: RendererId,
    resources: Vec<BoundResource>,
}

impl SoftwareBindingState {
    pub fn new(owner: RendererId, resources: Vec<BoundResource>) -> Self {
        Self { owner, resources }
    }
}

impl BindingState for SoftwareBindingState {
    fn owner(&self) -> RendererId {
        self.owner
    }

    fn resources(&self) -> &[BoundResource] {
        &self.resources
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Software Program
// ============================================================================

/// Program made of resolved native kernels
pub struct SoftwareProgram {
    pub(crate) owner: RendererId,
    pub(crate) vertex: Option<VertexKernel>,
    pub(crate) fragment: Option<FragmentKernel>,
    pub(crate) compute: Option<ComputeKernel>,
}

impl ShaderProgram for SoftwareProgram {
    fn owner(&self) -> RendererId {
        self.owner
    }

    fn stages(&self) -> ShaderStageFlags {
        let mut stages = ShaderStageFlags::empty();
        stages.set(ShaderStageFlags::VERTEX, self.vertex.is_some());
        stages.set(ShaderStageFlags::FRAGMENT, self.fragment.is_some());
        stages.set(ShaderStageFlags::COMPUTE, self.compute.is_some());
        stages
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
