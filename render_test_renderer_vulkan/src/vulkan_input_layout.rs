/// InputLayout - Vulkan vertex input description

use ash::vk;
use render_test::{InputElementDesc, InputLayout, RendererId, Result};
use std::any::Any;

use crate::vulkan_format::format_to_vk;

/// Input layout with its Vulkan attribute descriptions precomputed
///
/// All elements read from vertex binding 0; element `i` is shader location `i`.
pub struct VulkanInputLayout {
    owner: RendererId,
    elements: Vec<InputElementDesc>,
    pub(crate) attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VulkanInputLayout {
    /// Build from already validated elements
    pub fn new(owner: RendererId, elements: &[InputElementDesc]) -> Result<Self> {
        let attributes = elements
            .iter()
            .enumerate()
            .map(|(location, element)| {
                Ok(vk::VertexInputAttributeDescription {
                    location: location as u32,
                    binding: 0,
                    format: format_to_vk(element.format)?,
                    offset: element.offset,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            owner,
            elements: elements.to_vec(),
            attributes,
        })
    }
}

impl InputLayout for VulkanInputLayout {
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
