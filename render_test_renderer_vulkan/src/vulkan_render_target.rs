/// RenderTarget - offscreen color image the Vulkan renderer draws into
///
/// Owns the image, its view, a single-subpass render pass, the framebuffer and a
/// host-visible readback buffer. Between operations the image stays in
/// `COLOR_ATTACHMENT_OPTIMAL`.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use render_test::{render_err, Result};
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, LOG_SOURCE};

/// Color format of the offscreen image (matches PNG byte order)
pub(crate) const TARGET_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

pub struct RenderTarget {
    ctx: Arc<GpuContext>,
    width: u32,
    height: u32,
    image: vk::Image,
    image_allocation: Option<Allocation>,
    view: vk::ImageView,
    pub(crate) render_pass: vk::RenderPass,
    pub(crate) framebuffer: vk::Framebuffer,
    readback: vk::Buffer,
    readback_allocation: Option<Allocation>,
}

impl RenderTarget {
    /// Create the target and clear it to transparent black
    pub fn new(ctx: Arc<GpuContext>, width: u32, height: u32) -> Result<Self> {
        // Null handles are skipped by Drop (destroying VK_NULL_HANDLE is a no-op)
        let mut target = Self {
            ctx,
            width,
            height,
            image: vk::Image::null(),
            image_allocation: None,
            view: vk::ImageView::null(),
            render_pass: vk::RenderPass::null(),
            framebuffer: vk::Framebuffer::null(),
            readback: vk::Buffer::null(),
            readback_allocation: None,
        };
        target.create_image()?;
        target.create_render_pass()?;
        target.create_framebuffer()?;

        let (readback, allocation) = target.ctx.create_buffer(
            "readback_buffer",
            target.byte_size(),
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
        )?;
        target.readback = readback;
        target.readback_allocation = Some(allocation);

        target.clear([0.0, 0.0, 0.0, 0.0])?;
        Ok(target)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn byte_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }

    pub(crate) fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    fn create_image(&mut self) -> Result<()> {
        let device = &self.ctx.device;
        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(TARGET_FORMAT)
                .extent(vk::Extent3D {
                    width: self.width,
                    height: self.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT
                        | vk::ImageUsageFlags::TRANSFER_SRC
                        | vk::ImageUsageFlags::TRANSFER_DST,
                )
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            self.image = device
                .create_image(&image_create_info, None)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to create render target image: {:?}", e))?;

            let requirements = device.get_image_memory_requirements(self.image);
            let allocation = self
                .ctx
                .allocate("render_target", requirements, MemoryLocation::GpuOnly, false)?;
            let bound = device.bind_image_memory(self.image, allocation.memory(), allocation.offset());
            self.image_allocation = Some(allocation);
            bound.map_err(|e| render_err!(LOG_SOURCE, "Failed to bind render target memory: {:?}", e))?;

            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(self.image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(TARGET_FORMAT)
                .subresource_range(COLOR_RANGE);
            self.view = device
                .create_image_view(&view_create_info, None)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to create render target view: {:?}", e))?;
        }
        Ok(())
    }

    /// Render pass that keeps previous contents (clears are explicit)
    fn create_render_pass(&mut self) -> Result<()> {
        let color_attachment = vk::AttachmentDescription::default()
            .format(TARGET_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let color_attachment_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_attachment_ref));

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE | vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(std::slice::from_ref(&color_attachment))
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));

        self.render_pass = unsafe {
            self.ctx
                .device
                .create_render_pass(&render_pass_info, None)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to create render pass: {:?}", e))?
        };
        Ok(())
    }

    fn create_framebuffer(&mut self) -> Result<()> {
        let attachments = [self.view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(self.render_pass)
            .attachments(&attachments)
            .width(self.width)
            .height(self.height)
            .layers(1);

        self.framebuffer = unsafe {
            self.ctx
                .device
                .create_framebuffer(&framebuffer_info, None)
                .map_err(|e| render_err!(LOG_SOURCE, "Failed to create framebuffer: {:?}", e))?
        };
        Ok(())
    }

    fn barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        (old_layout, src_access, src_stage): (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags),
        (new_layout, dst_access, dst_stage): (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags),
    ) {
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(COLOR_RANGE)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);
        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Fill the whole image with `color`
    pub fn clear(&self, color: [f32; 4]) -> Result<()> {
        let attachment = (
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        );
        self.ctx.submit_one_shot("clear", |command_buffer| {
            // Previous contents are discarded, so the old layout may be UNDEFINED
            self.barrier(
                command_buffer,
                (vk::ImageLayout::UNDEFINED, vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
                (
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::PipelineStageFlags::TRANSFER,
                ),
            );
            let clear_value = vk::ClearColorValue { float32: color };
            unsafe {
                self.ctx.device.cmd_clear_color_image(
                    command_buffer,
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &clear_value,
                    &[COLOR_RANGE],
                );
            }
            self.barrier(
                command_buffer,
                (
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::PipelineStageFlags::TRANSFER,
                ),
                attachment,
            );
        })
    }

    /// Copy the image to host memory as tightly packed RGBA8 rows
    pub fn read_pixels(&self) -> Result<Vec<u8>> {
        let attachment = (
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        );
        let transfer_src = (
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        );
        self.ctx.submit_one_shot("readback", |command_buffer| {
            self.barrier(command_buffer, attachment, transfer_src);
            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width: self.width,
                    height: self.height,
                    depth: 1,
                });
            unsafe {
                self.ctx.device.cmd_copy_image_to_buffer(
                    command_buffer,
                    self.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.readback,
                    &[region],
                );
            }
            self.barrier(command_buffer, transfer_src, attachment);
        })?;

        let allocation = self
            .readback_allocation
            .as_ref()
            .ok_or_else(|| render_err!(LOG_SOURCE, "readback buffer has no allocation"))?;
        let mapped = allocation
            .mapped_slice()
            .ok_or_else(|| render_err!(LOG_SOURCE, "readback buffer is not CPU-accessible"))?;
        let len = self.byte_size() as usize;
        match mapped.get(..len) {
            Some(pixels) => Ok(pixels.to_vec()),
            None => Err(render_err!(LOG_SOURCE, "readback buffer holds {} of {} bytes", mapped.len(), len)),
        }
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            let device = &self.ctx.device;
            device.destroy_framebuffer(self.framebuffer, None);
            device.destroy_render_pass(self.render_pass, None);
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.destroy_buffer(self.readback, None);
        }
        if let Some(allocation) = self.image_allocation.take() {
            self.ctx.free_allocation(allocation);
        }
        if let Some(allocation) = self.readback_allocation.take() {
            self.ctx.free_allocation(allocation);
        }
    }
}
