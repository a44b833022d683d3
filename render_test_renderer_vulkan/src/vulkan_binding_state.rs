/// BindingState - Vulkan implementation of the render_test BindingState trait

use render_test::{BindingState, BoundResource, RendererId};
use std::any::Any;

/// Resolved shader inputs, bound as descriptor set 0 at draw/dispatch time
///
/// Each resource's slot is its binding number within the set.
pub struct VulkanBindingState {
    owner: RendererId,
    resources: Vec<BoundResource>,
}

impl VulkanBindingState {
    pub fn new(owner: RendererId, resources: Vec<BoundResource>) -> Self {
        Self { owner, resources }
    }
}

impl BindingState for VulkanBindingState {
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
