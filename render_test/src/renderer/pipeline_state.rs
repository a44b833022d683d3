/// Pending pipeline state shared by all backends
///
/// A single mutable struct owned by each renderer. Setters only record handles (after
/// checking they belong to the renderer); `draw` and `dispatch_compute` read it.

use std::sync::Arc;
use crate::error::Result;
use crate::renderer::binding_state::BindingState;
use crate::renderer::buffer::{Buffer, BufferFlavor};
use crate::renderer::handle::{check_owner, RendererId};
use crate::renderer::input_layout::InputLayout;
use crate::renderer::shader::{ShaderProgram, ShaderStageFlags};

/// Number of vertex buffer slots
///
/// Input elements carry no slot index, so every attribute is fetched from slot 0.
pub const MAX_VERTEX_BUFFER_SLOTS: u32 = 1;

/// Number of constant buffer slots
pub const MAX_CONSTANT_BUFFER_SLOTS: u32 = 14;

/// Required alignment of constant buffer offsets
///
/// The largest `minUniformBufferOffsetAlignment` a Vulkan device may report, so an
/// offset accepted here is valid on every backend.
pub const CONSTANT_BUFFER_OFFSET_ALIGNMENT: u32 = 256;

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    /// Every three vertices form an independent triangle
    #[default]
    TriangleList,
}

/// Vertex buffer bound to a slot
#[derive(Clone)]
pub struct VertexBufferBinding {
    pub buffer: Arc<dyn Buffer>,
    /// Bytes between consecutive vertices (0 = tight, from the input layout)
    pub stride: u32,
    /// Byte offset of the first vertex
    pub offset: u32,
}

impl VertexBufferBinding {
    pub fn new(buffer: Arc<dyn Buffer>, stride: u32, offset: u32) -> Self {
        Self { buffer, stride, offset }
    }
}

/// Constant buffer bound to a slot
#[derive(Clone)]
pub struct ConstantBufferBinding {
    pub buffer: Arc<dyn Buffer>,
    /// Byte offset of the visible range
    pub offset: u32,
}

impl ConstantBufferBinding {
    pub fn new(buffer: Arc<dyn Buffer>, offset: u32) -> Self {
        Self { buffer, offset }
    }
}

/// Pipeline state recorded by the setters
pub struct PipelineState {
    owner: RendererId,
    input_layout: Option<Arc<dyn InputLayout>>,
    topology: PrimitiveTopology,
    binding_state: Option<Arc<dyn BindingState>>,
    vertex_buffers: Vec<Option<VertexBufferBinding>>,
    constant_buffers: Vec<Option<ConstantBufferBinding>>,
    program: Option<Arc<dyn ShaderProgram>>,
}

impl PipelineState {
    pub fn new(owner: RendererId) -> Self {
        Self {
            owner,
            input_layout: None,
            topology: PrimitiveTopology::default(),
            binding_state: None,
            vertex_buffers: Vec::new(),
            constant_buffers: Vec::new(),
            program: None,
        }
    }

    pub fn set_input_layout(&mut self, layout: Arc<dyn InputLayout>) -> Result<()> {
        check_owner(self.owner, layout.owner(), "input layout")?;
        self.input_layout = Some(layout);
        Ok(())
    }

    pub fn set_topology(&mut self, topology: PrimitiveTopology) {
        self.topology = topology;
    }

    pub fn set_binding_state(&mut self, state: Arc<dyn BindingState>) -> Result<()> {
        check_owner(self.owner, state.owner(), "binding state")?;
        self.binding_state = Some(state);
        Ok(())
    }

    pub fn set_shader_program(&mut self, program: Arc<dyn ShaderProgram>) -> Result<()> {
        check_owner(self.owner, program.owner(), "shader program")?;
        self.program = Some(program);
        Ok(())
    }

    /// Bind consecutive vertex buffer slots starting at `start_slot`
    ///
    /// All handles are checked before any slot is modified.
    pub fn set_vertex_buffers(&mut self, start_slot: u32, bindings: &[VertexBufferBinding]) -> Result<()> {
        check_slot_range(start_slot, bindings.len(), MAX_VERTEX_BUFFER_SLOTS, "vertex buffer")?;
        for binding in bindings {
            check_owner(self.owner, binding.buffer.owner(), "vertex buffer")?;
            check_flavor(binding.buffer.as_ref(), BufferFlavor::Vertex, "vertex buffer")?;
        }
        store_slots(&mut self.vertex_buffers, start_slot, bindings);
        Ok(())
    }

    /// Bind consecutive constant buffer slots starting at `start_slot`
    ///
    /// Offsets must be multiples of [`CONSTANT_BUFFER_OFFSET_ALIGNMENT`] and inside the buffer.
    pub fn set_constant_buffers(&mut self, start_slot: u32, bindings: &[ConstantBufferBinding]) -> Result<()> {
        check_slot_range(start_slot, bindings.len(), MAX_CONSTANT_BUFFER_SLOTS, "constant buffer")?;
        for binding in bindings {
            check_owner(self.owner, binding.buffer.owner(), "constant buffer")?;
            check_flavor(binding.buffer.as_ref(), BufferFlavor::Constant, "constant buffer")?;
            if binding.offset % CONSTANT_BUFFER_OFFSET_ALIGNMENT != 0 {
                crate::render_bail!(
                    "render_test::pipeline_state",
                    InvalidResource,
                    "constant buffer offset {} is not a multiple of {}",
                    binding.offset,
                    CONSTANT_BUFFER_OFFSET_ALIGNMENT
                );
            }
            if u64::from(binding.offset) >= binding.buffer.size() {
                crate::render_bail!(
                    "render_test::pipeline_state",
                    InvalidResource,
                    "constant buffer offset {} is outside its {} bytes",
                    binding.offset,
                    binding.buffer.size()
                );
            }
        }
        store_slots(&mut self.constant_buffers, start_slot, bindings);
        Ok(())
    }

    pub fn input_layout(&self) -> Option<&Arc<dyn InputLayout>> {
        self.input_layout.as_ref()
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn binding_state(&self) -> Option<&Arc<dyn BindingState>> {
        self.binding_state.as_ref()
    }

    pub fn program(&self) -> Option<&Arc<dyn ShaderProgram>> {
        self.program.as_ref()
    }

    pub fn vertex_buffer(&self, slot: u32) -> Option<&VertexBufferBinding> {
        self.vertex_buffers.get(slot as usize).and_then(Option::as_ref)
    }

    pub fn constant_buffer(&self, slot: u32) -> Option<&ConstantBufferBinding> {
        self.constant_buffers.get(slot as usize).and_then(Option::as_ref)
    }

    /// Bound constant buffers with their slot
    pub fn constant_buffers(&self) -> impl Iterator<Item = (u32, &ConstantBufferBinding)> {
        self.constant_buffers
            .iter()
            .enumerate()
            .filter_map(|(slot, binding)| binding.as_ref().map(|b| (slot as u32, b)))
    }

    /// Check the state is complete enough for a draw
    ///
    /// Requires a vertex+fragment program, an input layout, a vertex buffer in slot 0,
    /// and no bound buffer currently mapped.
    pub fn validate_draw(&self) -> Result<()> {
        let program = match &self.program {
            Some(program) => program,
            None => crate::render_bail!("render_test::pipeline_state", InvalidState, "draw without a shader program"),
        };
        if !program.stages().contains(ShaderStageFlags::GRAPHICS) {
            crate::render_bail!(
                "render_test::pipeline_state",
                InvalidState,
                "draw needs a vertex+fragment program, bound program has {:?}",
                program.stages()
            );
        }
        if self.input_layout.is_none() {
            crate::render_bail!("render_test::pipeline_state", InvalidState, "draw without an input layout");
        }
        if self.vertex_buffer(0).is_none() {
            crate::render_bail!("render_test::pipeline_state", InvalidState, "draw without a vertex buffer in slot 0");
        }
        self.ensure_unmapped()
    }

    /// Check the state is complete enough for a compute dispatch
    pub fn validate_dispatch(&self) -> Result<()> {
        let program = match &self.program {
            Some(program) => program,
            None => crate::render_bail!("render_test::pipeline_state", InvalidState, "dispatch without a shader program"),
        };
        if !program.stages().contains(ShaderStageFlags::COMPUTE) {
            crate::render_bail!(
                "render_test::pipeline_state",
                InvalidState,
                "dispatch needs a compute program, bound program has {:?}",
                program.stages()
            );
        }
        self.ensure_unmapped()
    }

    fn ensure_unmapped(&self) -> Result<()> {
        let vertex = self.vertex_buffers.iter().flatten().map(|b| &b.buffer);
        let constant = self.constant_buffers.iter().flatten().map(|b| &b.buffer);
        let bound = self
            .binding_state
            .iter()
            .flat_map(|state| state.resources().iter().map(|r| &r.buffer));
        if vertex.chain(constant).chain(bound).any(|buffer| buffer.is_mapped()) {
            crate::render_bail!(
                "render_test::pipeline_state",
                InvalidState,
                "a bound buffer is still mapped"
            );
        }
        Ok(())
    }
}

fn check_slot_range(start_slot: u32, count: usize, max: u32, what: &str) -> Result<()> {
    if u64::from(start_slot) + count as u64 > u64::from(max) {
        crate::render_bail!(
            "render_test::pipeline_state",
            InvalidState,
            "{} slots {}..{} exceed the {} available",
            what,
            start_slot,
            u64::from(start_slot) + count as u64,
            max
        );
    }
    Ok(())
}

fn check_flavor(buffer: &dyn Buffer, expected: BufferFlavor, what: &str) -> Result<()> {
    if buffer.flavor() != expected {
        crate::render_bail!(
            "render_test::pipeline_state",
            InvalidResource,
            "{} must be a {:?} buffer, got {:?}",
            what,
            expected,
            buffer.flavor()
        );
    }
    Ok(())
}

fn store_slots<T: Clone>(slots: &mut Vec<Option<T>>, start_slot: u32, bindings: &[T]) {
    let end = start_slot as usize + bindings.len();
    if slots.len() < end {
        slots.resize(end, None);
    }
    for (index, binding) in bindings.iter().enumerate() {
        slots[start_slot as usize + index] = Some(binding.clone());
    }
}

#[cfg(test)]
#[path = "pipeline_state_tests.rs"]
mod tests;
