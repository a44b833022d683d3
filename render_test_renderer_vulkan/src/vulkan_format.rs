/// Conversions from render_test types to Vulkan enums and flags

use ash::vk;
use render_test::{BindingKind, BufferFlavor, Format, PrimitiveTopology, Result, ShaderStage};
use spirq::spirv::ExecutionModel;

use crate::vulkan_context::LOG_SOURCE;

/// Convert a vertex attribute format to a Vulkan format
pub(crate) fn format_to_vk(format: Format) -> Result<vk::Format> {
    match format {
        Format::R_Float32 => Ok(vk::Format::R32_SFLOAT),
        Format::RG_Float32 => Ok(vk::Format::R32G32_SFLOAT),
        Format::RGB_Float32 => Ok(vk::Format::R32G32B32_SFLOAT),
        Format::RGBA_Float32 => Ok(vk::Format::R32G32B32A32_SFLOAT),
        Format::Unknown => render_test::render_bail!(LOG_SOURCE, InvalidLayout, "format Unknown has no Vulkan equivalent"),
    }
}

/// Buffer usage flags for a buffer flavor
///
/// Every buffer can also be a transfer source/destination.
pub(crate) fn buffer_usage_to_vk(flavor: BufferFlavor) -> vk::BufferUsageFlags {
    let usage = match flavor {
        BufferFlavor::Constant => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferFlavor::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferFlavor::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
    };
    usage | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST
}

/// Convert ShaderStage to Vulkan shader stage flags
pub(crate) fn shader_stage_to_vk(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

/// SPIR-V execution model an entry point must declare for a stage
pub(crate) fn execution_model(stage: ShaderStage) -> ExecutionModel {
    match stage {
        ShaderStage::Vertex => ExecutionModel::Vertex,
        ShaderStage::Fragment => ExecutionModel::Fragment,
        ShaderStage::Compute => ExecutionModel::GLCompute,
    }
}

pub(crate) fn descriptor_type(kind: BindingKind) -> vk::DescriptorType {
    match kind {
        BindingKind::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        BindingKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
    }
}

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
