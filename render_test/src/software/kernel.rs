/// Native shader kernels for the software backend
///
/// The software renderer has no shading-language front-end. Entry points in a compile
/// request are resolved by name against a `KernelRegistry` of Rust closures, one table per
/// stage. Generic entry points are registered under their specialized name
/// (`name<A,B>`) and looked up with the request's type arguments.

use std::sync::Arc;
use glam::{UVec3, Vec2, Vec4};
use rustc_hash::FxHashMap;
use crate::renderer::{InputElementDesc, ShaderStage};

// ============================================================================
// Kernel inputs and outputs
// ============================================================================

/// Constant buffer bytes visible to kernels, keyed by slot
#[derive(Debug, Clone, Default)]
pub struct ConstantData {
    slots: FxHashMap<u32, Vec<u8>>,
}

impl ConstantData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `bytes` at `slot`, replacing anything already there
    pub fn insert(&mut self, slot: u32, bytes: Vec<u8>) {
        self.slots.insert(slot, bytes);
    }

    pub fn bytes(&self, slot: u32) -> Option<&[u8]> {
        self.slots.get(&slot).map(Vec::as_slice)
    }

    /// 32-bit word `index` of the buffer at `slot`
    pub fn u32(&self, slot: u32, index: usize) -> Option<u32> {
        self.bytes(slot).and_then(|bytes| read_word(bytes, index))
    }

    pub fn f32(&self, slot: u32, index: usize) -> Option<f32> {
        self.u32(slot, index).map(f32::from_bits)
    }

    /// `float4` number `index` of the buffer at `slot`
    pub fn vec4(&self, slot: u32, index: usize) -> Option<Vec4> {
        let base = index.checked_mul(4)?;
        let mut lanes = [0.0; 4];
        for (lane, value) in lanes.iter_mut().enumerate() {
            *value = self.f32(slot, base.checked_add(lane)?)?;
        }
        Some(Vec4::from_array(lanes))
    }
}

/// Byte range of word `index`, `None` when it does not fit in `usize`
fn word_range(index: usize) -> Option<std::ops::Range<usize>> {
    let start = index.checked_mul(4)?;
    Some(start..start.checked_add(4)?)
}

fn read_word(bytes: &[u8], index: usize) -> Option<u32> {
    let word = bytes.get(word_range(index)?)?;
    Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

/// One vertex as seen by a vertex kernel
pub struct VertexInput<'a> {
    pub vertex_id: u32,
    /// One value per layout element, missing components filled from (0, 0, 0, 1)
    pub attributes: &'a [Vec4],
    /// Layout elements, parallel to `attributes`
    pub elements: &'a [InputElementDesc],
    pub constants: &'a ConstantData,
}

impl<'a> VertexInput<'a> {
    /// Attribute by layout position (zero when absent)
    pub fn attribute(&self, index: usize) -> Vec4 {
        self.attributes.get(index).copied().unwrap_or(Vec4::ZERO)
    }

    /// Attribute by semantic, e.g. `("TEXCOORD", 1)`
    pub fn semantic(&self, name: &str, index: u32) -> Option<Vec4> {
        self.elements
            .iter()
            .position(|e| e.semantic_index == index && e.semantic_name.eq_ignore_ascii_case(name))
            .and_then(|i| self.attributes.get(i).copied())
    }
}

/// Vertex kernel result
#[derive(Debug, Clone, PartialEq)]
pub struct VertexOutput {
    /// Clip-space position
    pub position: Vec4,
    /// Values interpolated across the triangle
    pub varyings: Vec<Vec4>,
}

/// One fragment as seen by a fragment kernel
pub struct FragmentInput<'a> {
    /// Pixel center in render target coordinates (origin top-left)
    pub frag_coord: Vec2,
    pub varyings: &'a [Vec4],
    pub constants: &'a ConstantData,
}

/// Identifiers of one compute invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeInvocation {
    pub dispatch_thread_id: UVec3,
    pub group_id: UVec3,
    pub group_thread_id: UVec3,
}

/// Buffers a compute kernel can access
///
/// Storage buffers are read/write by binding slot, constant data is read-only.
pub struct ComputeResources {
    storage: FxHashMap<u32, Vec<u8>>,
    constants: ConstantData,
}

impl ComputeResources {
    pub fn new(storage: FxHashMap<u32, Vec<u8>>, constants: ConstantData) -> Self {
        Self { storage, constants }
    }

    pub fn constants(&self) -> &ConstantData {
        &self.constants
    }

    /// Number of 32-bit words in the storage buffer at `slot`
    pub fn word_count(&self, slot: u32) -> usize {
        self.storage.get(&slot).map_or(0, |bytes| bytes.len() / 4)
    }

    pub fn load_u32(&self, slot: u32, index: usize) -> Option<u32> {
        self.storage.get(&slot).and_then(|bytes| read_word(bytes, index))
    }

    /// Store a word; returns false when the slot or index is out of range
    pub fn store_u32(&mut self, slot: u32, index: usize, value: u32) -> bool {
        let Some(bytes) = self.storage.get_mut(&slot) else {
            return false;
        };
        let Some(range) = word_range(index) else {
            return false;
        };
        match bytes.get_mut(range) {
            Some(word) => {
                word.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    pub fn load_f32(&self, slot: u32, index: usize) -> Option<f32> {
        self.load_u32(slot, index).map(f32::from_bits)
    }

    pub fn store_f32(&mut self, slot: u32, index: usize, value: f32) -> bool {
        self.store_u32(slot, index, value.to_bits())
    }

    /// Final storage contents by slot
    pub fn into_storage(self) -> FxHashMap<u32, Vec<u8>> {
        self.storage
    }
}

// ============================================================================
// Kernels
// ============================================================================

pub type VertexKernel = Arc<dyn Fn(&VertexInput<'_>) -> VertexOutput + Send + Sync>;

pub type FragmentKernel = Arc<dyn Fn(&FragmentInput<'_>) -> Vec4 + Send + Sync>;

pub type ComputeFn = Arc<dyn Fn(&ComputeInvocation, &mut ComputeResources) + Send + Sync>;

/// Compute kernel with its work-group size
#[derive(Clone)]
pub struct ComputeKernel {
    pub workgroup_size: UVec3,
    pub func: ComputeFn,
}

#[derive(Clone)]
pub enum Kernel {
    Vertex(VertexKernel),
    Fragment(FragmentKernel),
    Compute(ComputeKernel),
}

impl Kernel {
    pub fn stage(&self) -> ShaderStage {
        match self {
            Kernel::Vertex(_) => ShaderStage::Vertex,
            Kernel::Fragment(_) => ShaderStage::Fragment,
            Kernel::Compute(_) => ShaderStage::Compute,
        }
    }
}

/// Lookup key for a generic entry point specialized with `type_arguments`
///
/// `specialized_name("computeMain", &["float", "int"])` → `computeMain<float,int>`
pub fn specialized_name(name: &str, type_arguments: &[String]) -> String {
    if type_arguments.is_empty() {
        name.to_string()
    } else {
        format!("{}<{}>", name, type_arguments.join(","))
    }
}

/// Named kernels available to the software compiler
#[derive(Clone, Default)]
pub struct KernelRegistry {
    kernels: FxHashMap<(ShaderStage, String), Kernel>,
}

impl KernelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in pass-through kernels
    ///
    /// - vertex `main`: attribute 0 is the clip position, attribute 1 (if any) varying 0
    /// - fragment `main`: varying 0, or opaque white without varyings
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register_vertex("main", |input| VertexOutput {
                position: input.attribute(0),
                varyings: input.attributes.get(1).copied().into_iter().collect(),
            })
            .register_fragment("main", |input| input.varyings.first().copied().unwrap_or(Vec4::ONE));
        registry
    }

    pub fn register_vertex<F>(&mut self, name: impl Into<String>, kernel: F) -> &mut Self
    where
        F: Fn(&VertexInput<'_>) -> VertexOutput + Send + Sync + 'static,
    {
        self.insert(name.into(), Kernel::Vertex(Arc::new(kernel)))
    }

    pub fn register_fragment<F>(&mut self, name: impl Into<String>, kernel: F) -> &mut Self
    where
        F: Fn(&FragmentInput<'_>) -> Vec4 + Send + Sync + 'static,
    {
        self.insert(name.into(), Kernel::Fragment(Arc::new(kernel)))
    }

    /// Register a compute kernel running `workgroup_size` invocations per group
    pub fn register_compute<F>(&mut self, name: impl Into<String>, workgroup_size: [u32; 3], kernel: F) -> &mut Self
    where
        F: Fn(&ComputeInvocation, &mut ComputeResources) + Send + Sync + 'static,
    {
        self.insert(
            name.into(),
            Kernel::Compute(ComputeKernel {
                workgroup_size: UVec3::from_array(workgroup_size),
                func: Arc::new(kernel),
            }),
        )
    }

    fn insert(&mut self, name: String, kernel: Kernel) -> &mut Self {
        self.kernels.insert((kernel.stage(), name), kernel);
        self
    }

    pub fn lookup(&self, stage: ShaderStage, name: &str) -> Option<&Kernel> {
        self.kernels.get(&(stage, name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod tests;
