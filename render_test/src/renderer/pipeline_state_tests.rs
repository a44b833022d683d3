//! Unit tests for pipeline_state.rs
//!
//! Uses minimal fake resources so ownership and completeness checks can be tested
//! without a backend.

use crate::error::{Error, Result};
use crate::renderer::binding_state::{BindingKind, BindingState, BoundResource};
use crate::renderer::buffer::{Buffer, BufferFlavor, MapFlavor, MapTracker};
use crate::renderer::handle::RendererId;
use crate::renderer::input_layout::{Format, InputElementDesc, InputLayout};
use crate::renderer::pipeline_state::*;
use crate::renderer::shader::{ShaderProgram, ShaderStageFlags};
use std::any::Any;
use std::sync::Arc;

struct FakeBuffer {
    owner: RendererId,
    flavor: BufferFlavor,
    size: u64,
    map_state: MapTracker,
}

impl Buffer for FakeBuffer {
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
    fn begin_map(&self, _flavor: MapFlavor) -> Result<Vec<u8>> {
        self.map_state.acquire()?;
        Ok(vec![0; self.size as usize])
    }
    fn end_map(&self, _written: Option<&[u8]>) -> Result<()> {
        self.map_state.release();
        Ok(())
    }
    fn read_contents(&self) -> Result<Vec<u8>> {
        Ok(vec![0; self.size as usize])
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct FakeLayout {
    owner: RendererId,
    elements: Vec<InputElementDesc>,
}

impl InputLayout for FakeLayout {
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

struct FakeProgram {
    owner: RendererId,
    stages: ShaderStageFlags,
}

impl ShaderProgram for FakeProgram {
    fn owner(&self) -> RendererId {
        self.owner
    }
    fn stages(&self) -> ShaderStageFlags {
        self.stages
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct FakeBindingState {
    owner: RendererId,
    resources: Vec<BoundResource>,
}

impl BindingState for FakeBindingState {
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

fn sized_buffer(owner: RendererId, flavor: BufferFlavor, size: u64) -> Arc<FakeBuffer> {
    Arc::new(FakeBuffer { owner, flavor, size, map_state: MapTracker::new() })
}

fn buffer(owner: RendererId) -> Arc<FakeBuffer> {
    sized_buffer(owner, BufferFlavor::Vertex, 64)
}

fn constants(owner: RendererId) -> Arc<FakeBuffer> {
    sized_buffer(owner, BufferFlavor::Constant, 64)
}

fn layout(owner: RendererId) -> Arc<dyn InputLayout> {
    Arc::new(FakeLayout {
        owner,
        elements: vec![InputElementDesc::new("POSITION", 0, Format::RGB_Float32, 0)],
    })
}

fn program(owner: RendererId, stages: ShaderStageFlags) -> Arc<dyn ShaderProgram> {
    Arc::new(FakeProgram { owner, stages })
}

fn ready_for_draw(owner: RendererId) -> (PipelineState, Arc<FakeBuffer>) {
    let mut state = PipelineState::new(owner);
    let vertices = buffer(owner);
    state.set_input_layout(layout(owner)).unwrap();
    state.set_shader_program(program(owner, ShaderStageFlags::GRAPHICS)).unwrap();
    state
        .set_vertex_buffers(0, &[VertexBufferBinding::new(vertices.clone(), 12, 0)])
        .unwrap();
    (state, vertices)
}

// ============================================================================
// OWNERSHIP
// ============================================================================

#[test]
fn test_foreign_handles_are_rejected() {
    let mine = RendererId::next();
    let theirs = RendererId::next();
    let mut state = PipelineState::new(mine);

    assert!(matches!(state.set_input_layout(layout(theirs)), Err(Error::InvalidResource(_))));
    assert!(matches!(
        state.set_shader_program(program(theirs, ShaderStageFlags::COMPUTE)),
        Err(Error::InvalidResource(_))
    ));
    assert!(matches!(
        state.set_vertex_buffers(0, &[VertexBufferBinding::new(buffer(theirs), 12, 0)]),
        Err(Error::InvalidResource(_))
    ));
    assert!(state.input_layout().is_none());
    assert!(state.program().is_none());
    assert!(state.vertex_buffer(0).is_none());
}

#[test]
fn test_rejected_batch_leaves_slots_untouched() {
    let mine = RendererId::next();
    let theirs = RendererId::next();
    let mut state = PipelineState::new(mine);
    let result = state.set_constant_buffers(
        0,
        &[
            ConstantBufferBinding::new(constants(mine), 0),
            ConstantBufferBinding::new(constants(theirs), 0),
        ],
    );
    assert!(result.is_err());
    assert!(state.constant_buffer(0).is_none());
}

// ============================================================================
// SLOTS
// ============================================================================

#[test]
fn test_slots_are_stored_at_offset() {
    let owner = RendererId::next();
    let mut state = PipelineState::new(owner);
    let large = sized_buffer(owner, BufferFlavor::Constant, 1024);
    state
        .set_constant_buffers(2, &[ConstantBufferBinding::new(large, CONSTANT_BUFFER_OFFSET_ALIGNMENT)])
        .unwrap();
    assert!(state.constant_buffer(0).is_none());
    assert_eq!(state.constant_buffer(2).map(|b| b.offset), Some(256));
    assert_eq!(state.constant_buffers().map(|(slot, _)| slot).collect::<Vec<_>>(), vec![2]);
}

#[test]
fn test_slot_range_is_checked() {
    let owner = RendererId::next();
    let mut state = PipelineState::new(owner);
    let result = state.set_vertex_buffers(
        MAX_VERTEX_BUFFER_SLOTS,
        &[VertexBufferBinding::new(buffer(owner), 12, 0)],
    );
    assert!(matches!(result, Err(Error::InvalidState(_))));
    let result = state.set_constant_buffers(
        MAX_CONSTANT_BUFFER_SLOTS,
        &[ConstantBufferBinding::new(constants(owner), 0)],
    );
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[test]
fn test_only_vertex_slot_zero_is_bindable() {
    let owner = RendererId::next();
    let mut state = PipelineState::new(owner);
    assert!(matches!(
        state.set_vertex_buffers(1, &[VertexBufferBinding::new(buffer(owner), 12, 0)]),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        state.set_vertex_buffers(
            0,
            &[
                VertexBufferBinding::new(buffer(owner), 12, 0),
                VertexBufferBinding::new(buffer(owner), 12, 0),
            ],
        ),
        Err(Error::InvalidState(_))
    ));
    assert!(state.vertex_buffer(0).is_none());
}

#[test]
fn test_constant_offset_outside_buffer_is_rejected() {
    let owner = RendererId::next();
    let mut state = PipelineState::new(owner);
    let result = state.set_constant_buffers(
        0,
        &[ConstantBufferBinding::new(constants(owner), CONSTANT_BUFFER_OFFSET_ALIGNMENT)],
    );
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_unaligned_constant_offset_is_rejected() {
    let owner = RendererId::next();
    let mut state = PipelineState::new(owner);
    let large = sized_buffer(owner, BufferFlavor::Constant, 1024);
    for offset in [4, 16, 64, 255, 260] {
        let result = state.set_constant_buffers(0, &[ConstantBufferBinding::new(large.clone(), offset)]);
        assert!(matches!(result, Err(Error::InvalidResource(_))), "offset {offset}");
    }
    assert!(state.constant_buffer(0).is_none());
}

// ============================================================================
// FLAVOR
// ============================================================================

#[test]
fn test_vertex_slot_rejects_other_flavors() {
    let owner = RendererId::next();
    let mut state = PipelineState::new(owner);
    for flavor in [BufferFlavor::Constant, BufferFlavor::Storage] {
        let result = state.set_vertex_buffers(
            0,
            &[VertexBufferBinding::new(sized_buffer(owner, flavor, 64), 12, 0)],
        );
        assert!(matches!(result, Err(Error::InvalidResource(_))), "{flavor:?}");
    }
    assert!(state.vertex_buffer(0).is_none());
}

#[test]
fn test_constant_slot_rejects_other_flavors() {
    let owner = RendererId::next();
    let mut state = PipelineState::new(owner);
    for flavor in [BufferFlavor::Vertex, BufferFlavor::Storage] {
        let result = state.set_constant_buffers(
            0,
            &[ConstantBufferBinding::new(sized_buffer(owner, flavor, 64), 0)],
        );
        assert!(matches!(result, Err(Error::InvalidResource(_))), "{flavor:?}");
    }
    assert!(state.constant_buffer(0).is_none());
}

// ============================================================================
// DRAW / DISPATCH VALIDATION
// ============================================================================

#[test]
fn test_complete_state_validates_for_draw() {
    let (state, _) = ready_for_draw(RendererId::next());
    assert!(state.validate_draw().is_ok());
    assert_eq!(state.topology(), PrimitiveTopology::TriangleList);
}

#[test]
fn test_draw_without_program_is_rejected() {
    let owner = RendererId::next();
    let mut state = PipelineState::new(owner);
    state.set_input_layout(layout(owner)).unwrap();
    assert!(matches!(state.validate_draw(), Err(Error::InvalidState(_))));
}

#[test]
fn test_draw_with_compute_program_is_rejected() {
    let owner = RendererId::next();
    let (mut state, _) = ready_for_draw(owner);
    state.set_shader_program(program(owner, ShaderStageFlags::COMPUTE)).unwrap();
    assert!(matches!(state.validate_draw(), Err(Error::InvalidState(_))));
    assert!(state.validate_dispatch().is_ok());
}

#[test]
fn test_dispatch_with_graphics_program_is_rejected() {
    let (state, _) = ready_for_draw(RendererId::next());
    assert!(matches!(state.validate_dispatch(), Err(Error::InvalidState(_))));
}

#[test]
fn test_draw_with_mapped_vertex_buffer_is_rejected() {
    let (state, vertices) = ready_for_draw(RendererId::next());
    vertices.begin_map(MapFlavor::HostWrite).unwrap();
    assert!(matches!(state.validate_draw(), Err(Error::InvalidState(_))));
    vertices.end_map(None).unwrap();
    assert!(state.validate_draw().is_ok());
}

#[test]
fn test_dispatch_with_mapped_binding_buffer_is_rejected() {
    let owner = RendererId::next();
    let storage = buffer(owner);
    let mut state = PipelineState::new(owner);
    state.set_shader_program(program(owner, ShaderStageFlags::COMPUTE)).unwrap();
    state
        .set_binding_state(Arc::new(FakeBindingState {
            owner,
            resources: vec![BoundResource {
                binding: 0,
                kind: BindingKind::StorageBuffer,
                buffer: storage.clone(),
                stride: 4,
                is_output: true,
                name: None,
            }],
        }))
        .unwrap();
    storage.begin_map(MapFlavor::HostRead).unwrap();
    assert!(matches!(state.validate_dispatch(), Err(Error::InvalidState(_))));
}
