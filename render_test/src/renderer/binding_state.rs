/// Binding state: the resolved set of buffers a shader reads and writes

use std::any::Any;
use std::sync::Arc;
use crate::error::Result;
use crate::renderer::buffer::{Buffer, BufferDesc, BufferFlavor};
use crate::renderer::handle::RendererId;
use crate::renderer::shader_input_layout::{ShaderInputLayout, ShaderInputType};

/// Kind of binding a resolved resource occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    ConstantBuffer,
    StorageBuffer,
}

impl From<ShaderInputType> for BindingKind {
    fn from(input_type: ShaderInputType) -> Self {
        match input_type {
            ShaderInputType::ConstantBuffer => BindingKind::ConstantBuffer,
            ShaderInputType::StorageBuffer => BindingKind::StorageBuffer,
        }
    }
}

/// One buffer bound at a slot
#[derive(Clone)]
pub struct BoundResource {
    pub binding: u32,
    pub kind: BindingKind,
    pub buffer: Arc<dyn Buffer>,
    /// Element stride in bytes (0 = raw words)
    pub stride: u32,
    pub is_output: bool,
    pub name: Option<String>,
}

impl std::fmt::Debug for BoundResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundResource")
            .field("binding", &self.binding)
            .field("kind", &self.kind)
            .field("size", &self.buffer.size())
            .field("stride", &self.stride)
            .field("is_output", &self.is_output)
            .field("name", &self.name)
            .finish()
    }
}

/// Binding state resource trait
///
/// Immutable once created; resources are sorted by slot.
pub trait BindingState: Send + Sync {
    /// Renderer that created this binding state
    fn owner(&self) -> RendererId;

    /// Resolved resources in slot order
    fn resources(&self) -> &[BoundResource];

    /// Concrete type access for the owning backend
    fn as_any(&self) -> &dyn Any;

    /// Resource bound at `binding`
    fn resource(&self, binding: u32) -> Option<&BoundResource> {
        self.resources().iter().find(|r| r.binding == binding)
    }
}

/// Resolve a shader input layout into buffers, creating each through `create_buffer`
///
/// Shared by every backend so slot resolution behaves identically everywhere.
pub fn resolve_bindings<F>(layout: &ShaderInputLayout, mut create_buffer: F) -> Result<Vec<BoundResource>>
where
    F: FnMut(&BufferDesc<'_>) -> Result<Arc<dyn Buffer>>,
{
    let entries = layout.resolved_entries()?;
    let mut resources = Vec::with_capacity(entries.len());
    for entry in entries {
        // resolved_entries guarantees a slot
        let binding = entry.binding.unwrap_or_default();
        let kind = BindingKind::from(entry.input_type);
        let flavor = match kind {
            BindingKind::ConstantBuffer => BufferFlavor::Constant,
            BindingKind::StorageBuffer => BufferFlavor::Storage,
        };
        let bytes = entry.byte_data();
        let buffer = create_buffer(&BufferDesc::with_data(flavor, &bytes))?;
        resources.push(BoundResource {
            binding,
            kind,
            buffer,
            stride: entry.stride,
            is_output: entry.is_output,
            name: entry.name.clone(),
        });
    }
    Ok(resources)
}
