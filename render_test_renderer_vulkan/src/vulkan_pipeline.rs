/// TransientPipeline - pipeline and descriptor sets built for a single draw or dispatch
///
/// Descriptor layout seen by shaders:
/// - set 0: binding state resources, `binding = N` for resource N
/// - set 1: constant buffer slots, `binding = slot`

use ash::vk;
use render_test::{downcast_resource, PipelineState, Result, ShaderStage};
use render_test::{render_err, render_fail};
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_format::{descriptor_type, shader_stage_to_vk, topology_to_vk};
use crate::vulkan_input_layout::VulkanInputLayout;
use crate::vulkan_shader::{StageModule, VulkanProgram};

/// One buffer descriptor to write
struct DescriptorEntry {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    buffer: vk::Buffer,
    offset: u64,
}

/// Descriptor entries for set 0 and set 1
fn gather_descriptors(state: &PipelineState) -> Result<[Vec<DescriptorEntry>; 2]> {
    let mut resources = Vec::new();
    if let Some(binding_state) = state.binding_state() {
        for resource in binding_state.resources() {
            let buffer = downcast_resource::<VulkanBuffer>(resource.buffer.as_any(), "bound resource")?;
            resources.push(DescriptorEntry {
                binding: resource.binding,
                descriptor_type: descriptor_type(resource.kind),
                buffer: buffer.buffer,
                offset: 0,
            });
        }
    }

    let mut constants = Vec::new();
    for (slot, binding) in state.constant_buffers() {
        let buffer = downcast_resource::<VulkanBuffer>(binding.buffer.as_any(), "constant buffer")?;
        constants.push(DescriptorEntry {
            binding: slot,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            buffer: buffer.buffer,
            offset: u64::from(binding.offset),
        });
    }
    Ok([resources, constants])
}

pub(crate) struct TransientPipeline {
    ctx: Arc<GpuContext>,
    bind_point: vk::PipelineBindPoint,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
}

impl TransientPipeline {
    /// Vertex+fragment pipeline drawing into `render_pass`
    pub(crate) fn graphics(
        ctx: Arc<GpuContext>,
        state: &PipelineState,
        program: &VulkanProgram,
        input_layout: &VulkanInputLayout,
        stride: u32,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        let mut pipeline = Self::with_descriptors(ctx, state, vk::PipelineBindPoint::GRAPHICS, vk::ShaderStageFlags::ALL_GRAPHICS)?;

        let (vertex, fragment) = match (program.module(ShaderStage::Vertex), program.module(ShaderStage::Fragment)) {
            (Some(vertex), Some(fragment)) => (vertex, fragment),
            _ => return Err(render_fail!(LOG_SOURCE, InvalidState, "bound program has no vertex/fragment modules")),
        };
        let shader_stages = [
            stage_create_info(vertex),
            stage_create_info(fragment),
        ];

        let vertex_bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&input_layout.attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(state.topology()))
            .primitive_restart_enable(false);

        // Viewport state (dynamic)
        let viewports = [vk::Viewport::default()];
        let scissors = [vk::Rect2D::default()];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(pipeline.layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            pipeline
                .ctx
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to create graphics pipeline: {:?}", e.1))?
        };
        pipeline.pipeline = first_pipeline(pipelines)?;
        Ok(pipeline)
    }

    pub(crate) fn compute(ctx: Arc<GpuContext>, state: &PipelineState, program: &VulkanProgram) -> Result<Self> {
        let mut pipeline = Self::with_descriptors(ctx, state, vk::PipelineBindPoint::COMPUTE, vk::ShaderStageFlags::COMPUTE)?;

        let module = match program.module(ShaderStage::Compute) {
            Some(module) => module,
            None => return Err(render_fail!(LOG_SOURCE, InvalidState, "bound program has no compute module")),
        };
        let pipeline_create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_create_info(module))
            .layout(pipeline.layout);

        let pipelines = unsafe {
            pipeline
                .ctx
                .device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to create compute pipeline: {:?}", e.1))?
        };
        pipeline.pipeline = first_pipeline(pipelines)?;
        Ok(pipeline)
    }

    /// Set layouts, pool, written descriptor sets and the pipeline layout
    fn with_descriptors(
        ctx: Arc<GpuContext>,
        state: &PipelineState,
        bind_point: vk::PipelineBindPoint,
        stage_flags: vk::ShaderStageFlags,
    ) -> Result<Self> {
        let sets = gather_descriptors(state)?;
        // Null handles are skipped by Drop
        let mut pipeline = Self {
            ctx,
            bind_point,
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            set_layouts: Vec::with_capacity(sets.len()),
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_sets: Vec::new(),
        };
        let device = &pipeline.ctx.device;

        for entries in &sets {
            let bindings: Vec<vk::DescriptorSetLayoutBinding> = entries
                .iter()
                .map(|entry| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(entry.binding)
                        .descriptor_type(entry.descriptor_type)
                        .descriptor_count(1)
                        .stage_flags(stage_flags)
                })
                .collect();
            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            let set_layout = unsafe {
                device
                    .create_descriptor_set_layout(&create_info, None)
                    .map_err(|e| render_err!(LOG_SOURCE, "Failed to create descriptor set layout: {:?}", e))?
            };
            pipeline.set_layouts.push(set_layout);
        }

        // Pool sizes must be non-zero even when a set is empty
        let count = |ty: vk::DescriptorType| {
            sets.iter().flatten().filter(|entry| entry.descriptor_type == ty).count().max(1) as u32
        };
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: count(vk::DescriptorType::UNIFORM_BUFFER),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: count(vk::DescriptorType::STORAGE_BUFFER),
            },
        ];
        let pool_create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(sets.len() as u32)
            .pool_sizes(&pool_sizes);
        pipeline.descriptor_pool = unsafe {
            device
                .create_descriptor_pool(&pool_create_info, None)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to create descriptor pool: {:?}", e))?
        };

        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pipeline.descriptor_pool)
            .set_layouts(&pipeline.set_layouts);
        pipeline.descriptor_sets = unsafe {
            device
                .allocate_descriptor_sets(&allocate_info)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to allocate descriptor sets: {:?}", e))?
        };

        // Buffer infos are collected first so the writes can borrow them
        let buffer_infos: Vec<(vk::DescriptorSet, &DescriptorEntry, vk::DescriptorBufferInfo)> = sets
            .iter()
            .zip(&pipeline.descriptor_sets)
            .flat_map(|(entries, &set)| {
                entries.iter().map(move |entry| {
                    let info = vk::DescriptorBufferInfo {
                        buffer: entry.buffer,
                        offset: entry.offset,
                        range: vk::WHOLE_SIZE,
                    };
                    (set, entry, info)
                })
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = buffer_infos
            .iter()
            .map(|(set, entry, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(entry.binding)
                    .descriptor_type(entry.descriptor_type)
                    .buffer_info(std::slice::from_ref(info))
            })
            .collect();
        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }

        let layout_create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&pipeline.set_layouts);
        pipeline.layout = unsafe {
            device
                .create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to create pipeline layout: {:?}", e))?
        };
        Ok(pipeline)
    }

    /// Record pipeline and descriptor set binds
    pub(crate) fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            let device = &self.ctx.device;
            device.cmd_bind_pipeline(command_buffer, self.bind_point, self.pipeline);
            device.cmd_bind_descriptor_sets(
                command_buffer,
                self.bind_point,
                self.layout,
                0,
                &self.descriptor_sets,
                &[],
            );
        }
    }
}

impl Drop for TransientPipeline {
    fn drop(&mut self) {
        unsafe {
            let device = &self.ctx.device;
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
            // Frees the descriptor sets too
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            for &set_layout in &self.set_layouts {
                device.destroy_descriptor_set_layout(set_layout, None);
            }
        }
    }
}

fn stage_create_info(module: &StageModule) -> vk::PipelineShaderStageCreateInfo<'_> {
    vk::PipelineShaderStageCreateInfo::default()
        .stage(shader_stage_to_vk(module.stage))
        .module(module.module)
        .name(&module.entry_name)
}

fn first_pipeline(pipelines: Vec<vk::Pipeline>) -> Result<vk::Pipeline> {
    match pipelines.into_iter().next() {
        Some(pipeline) => Ok(pipeline),
        None => Err(render_err!(LOG_SOURCE, "pipeline creation returned no pipeline")),
    }
}
