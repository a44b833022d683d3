/// VulkanRenderer - Vulkan implementation of the render_test Renderer trait
///
/// Renders offscreen into an RGBA8 image. Every draw, dispatch, clear and readback is
/// recorded into a one-shot command buffer and waited on before returning, so the
/// renderer never has work in flight between calls.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use render_test::{
    capture, check_owner, downcast_resource, layout_vertex_size, resolve_bindings,
    validate_input_layout, BindingState, Buffer, BufferDesc, BufferMapping,
    ConstantBufferBinding, InputElementDesc, InputLayout, MapFlavor, NativeWindow,
    PipelineState, PrimitiveTopology, Renderer, RendererConfig, RendererId, RendererLifecycle,
    RendererType, Result, ShaderCompiler, ShaderInputLayout, ShaderProgram, VertexBufferBinding,
};
use render_test::{render_bail, render_debug, render_fail, render_info, render_trace, render_warn};
use std::path::Path;
use std::sync::Arc;

use crate::vulkan_binding_state::VulkanBindingState;
use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_input_layout::VulkanInputLayout;
use crate::vulkan_pipeline::TransientPipeline;
use crate::vulkan_render_target::RenderTarget;
use crate::vulkan_shader::{VulkanProgram, VulkanShaderCompiler};

/// Device objects that exist once `initialize` succeeds
struct GpuState {
    target: RenderTarget,
    compiler: VulkanShaderCompiler,
    ctx: Arc<GpuContext>,
}

/// Vulkan renderer implementation
pub struct VulkanRenderer {
    id: RendererId,
    config: RendererConfig,
    lifecycle: RendererLifecycle,
    state: PipelineState,
    clear_color: [f32; 4],
    gpu: Option<GpuState>,
}

impl VulkanRenderer {
    /// Create an uninitialized renderer
    ///
    /// No Vulkan object exists until `initialize`, so this never fails.
    pub fn new(config: RendererConfig) -> Self {
        let id = RendererId::next();
        Self {
            id,
            config,
            lifecycle: RendererLifecycle::new(),
            state: PipelineState::new(id),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            gpu: None,
        }
    }

    /// Name of the selected physical device (None before initialize)
    pub fn device_name(&self) -> Option<&str> {
        self.gpu.as_ref().map(|gpu| gpu.ctx.device_name.as_str())
    }

    pub fn lifecycle(&self) -> &RendererLifecycle {
        &self.lifecycle
    }

    fn gpu(&self, operation: &str) -> Result<&GpuState> {
        match &self.gpu {
            Some(gpu) => Ok(gpu),
            None => render_bail!(LOG_SOURCE, InvalidState, "{} called before initialize", operation),
        }
    }

    fn bound_program(&self) -> Result<&VulkanProgram> {
        match self.state.program() {
            Some(program) => downcast_resource::<VulkanProgram>(program.as_any(), "shader program"),
            None => render_bail!(LOG_SOURCE, InvalidState, "no shader program bound"),
        }
    }

    fn new_buffer(&self, operation: &str, desc: &BufferDesc<'_>) -> Result<Arc<dyn Buffer>> {
        desc.validate()?;
        let gpu = self.gpu(operation)?;
        Ok(Arc::new(VulkanBuffer::new(gpu.ctx.clone(), self.id, desc)?))
    }
}

/// Make shader writes to host-visible buffers visible to the CPU after the fence wait
fn shader_to_host_barrier(device: &ash::Device, command_buffer: vk::CommandBuffer, src_stage: vk::PipelineStageFlags) {
    let barrier = vk::MemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::SHADER_WRITE)
        .dst_access_mask(vk::AccessFlags::HOST_READ);
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            vk::PipelineStageFlags::HOST,
            vk::DependencyFlags::empty(),
            &[barrier],
            &[],
            &[],
        );
    }
}

impl Renderer for VulkanRenderer {
    fn id(&self) -> RendererId {
        self.id
    }

    fn renderer_type(&self) -> RendererType {
        RendererType::Vulkan
    }

    fn initialize(&mut self, window: Option<&dyn NativeWindow>) -> Result<()> {
        self.lifecycle.ensure_uninitialized()?;

        if let Some(window) = window {
            window
                .window_handle()
                .map_err(|e| render_fail!(LOG_SOURCE, InitializationFailed, "window handle unavailable: {}", e))?;
            window
                .display_handle()
                .map_err(|e| render_fail!(LOG_SOURCE, InitializationFailed, "display handle unavailable: {}", e))?;
            render_debug!(LOG_SOURCE, "window provided; rendering stays offscreen");
        }
        if self.config.width == 0 || self.config.height == 0 {
            render_bail!(
                LOG_SOURCE,
                InitializationFailed,
                "render target size {}x{} is empty",
                self.config.width,
                self.config.height
            );
        }

        let ctx = Arc::new(GpuContext::new(&self.config)?);
        let target = RenderTarget::new(ctx.clone(), self.config.width, self.config.height)?;
        let compiler = VulkanShaderCompiler::new(ctx.clone(), self.id);
        render_info!(
            LOG_SOURCE,
            "{} initialized on {} ({}x{})",
            self.config.app_name,
            ctx.device_name,
            target.width(),
            target.height()
        );

        self.gpu = Some(GpuState { target, compiler, ctx });
        self.lifecycle.mark_initialized()
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear_frame(&mut self) -> Result<()> {
        self.lifecycle.require_initialized("clear_frame")?;
        self.gpu("clear_frame")?.target.clear(self.clear_color)
    }

    fn present_frame(&mut self) -> Result<()> {
        self.lifecycle.require_initialized("present_frame")?;
        self.gpu("present_frame")?.ctx.wait_idle()?;
        self.lifecycle.mark_presented("present_frame")
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<Arc<dyn Buffer>> {
        self.lifecycle.require_initialized("create_buffer")?;
        self.new_buffer("create_buffer", desc)
    }

    fn create_input_layout(&mut self, elements: &[InputElementDesc]) -> Result<Arc<dyn InputLayout>> {
        self.lifecycle.require_initialized("create_input_layout")?;
        validate_input_layout(elements)?;
        Ok(Arc::new(VulkanInputLayout::new(self.id, elements)?))
    }

    fn create_binding_state(&mut self, layout: &ShaderInputLayout) -> Result<Arc<dyn BindingState>> {
        self.lifecycle.require_initialized("create_binding_state")?;
        let resources = resolve_bindings(layout, |desc| self.new_buffer("create_binding_state", desc))?;
        render_debug!(LOG_SOURCE, "binding state with {} resources", resources.len());
        Ok(Arc::new(VulkanBindingState::new(self.id, resources)))
    }

    fn shader_compiler(&self) -> Result<&dyn ShaderCompiler> {
        Ok(&self.gpu("shader_compiler")?.compiler)
    }

    fn map(&mut self, buffer: &Arc<dyn Buffer>, flavor: MapFlavor) -> Result<BufferMapping> {
        self.lifecycle.require_initialized("map")?;
        check_owner(self.id, buffer.owner(), "mapped buffer")?;
        BufferMapping::begin(buffer.clone(), flavor)
    }

    fn unmap(&mut self, mapping: BufferMapping) -> Result<()> {
        self.lifecycle.require_initialized("unmap")?;
        check_owner(self.id, mapping.buffer().owner(), "mapped buffer")?;
        mapping.unmap()
    }

    fn set_input_layout(&mut self, layout: &Arc<dyn InputLayout>) -> Result<()> {
        self.lifecycle.require_initialized("set_input_layout")?;
        self.state.set_input_layout(layout.clone())?;
        self.lifecycle.mark_bound("set_input_layout")
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> Result<()> {
        self.lifecycle.require_initialized("set_primitive_topology")?;
        self.state.set_topology(topology);
        self.lifecycle.mark_bound("set_primitive_topology")
    }

    fn set_binding_state(&mut self, state: &Arc<dyn BindingState>) -> Result<()> {
        self.lifecycle.require_initialized("set_binding_state")?;
        self.state.set_binding_state(state.clone())?;
        self.lifecycle.mark_bound("set_binding_state")
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, bindings: &[VertexBufferBinding]) -> Result<()> {
        self.lifecycle.require_initialized("set_vertex_buffers")?;
        self.state.set_vertex_buffers(start_slot, bindings)?;
        self.lifecycle.mark_bound("set_vertex_buffers")
    }

    fn set_shader_program(&mut self, program: &Arc<dyn ShaderProgram>) -> Result<()> {
        self.lifecycle.require_initialized("set_shader_program")?;
        self.state.set_shader_program(program.clone())?;
        self.lifecycle.mark_bound("set_shader_program")
    }

    fn set_constant_buffers(&mut self, start_slot: u32, bindings: &[ConstantBufferBinding]) -> Result<()> {
        self.lifecycle.require_initialized("set_constant_buffers")?;
        self.state.set_constant_buffers(start_slot, bindings)?;
        self.lifecycle.mark_bound("set_constant_buffers")
    }

    fn draw(&mut self, vertex_count: u32, start_vertex: u32) -> Result<()> {
        self.lifecycle.require_initialized("draw")?;
        self.state.validate_draw()?;
        let gpu = self.gpu("draw")?;

        let program = self.bound_program()?;
        let input_layout = match self.state.input_layout() {
            Some(layout) => layout,
            None => render_bail!(LOG_SOURCE, InvalidState, "draw without an input layout"),
        };
        let vulkan_layout = downcast_resource::<VulkanInputLayout>(input_layout.as_any(), "input layout")?;
        let binding = match self.state.vertex_buffer(0) {
            Some(binding) => binding,
            None => render_bail!(LOG_SOURCE, InvalidState, "draw without a vertex buffer in slot 0"),
        };
        let vertex_buffer = downcast_resource::<VulkanBuffer>(binding.buffer.as_any(), "vertex buffer")?;

        let vertex_size = layout_vertex_size(input_layout.elements());
        let stride = match binding.stride {
            0 => vertex_size,
            stride => stride,
        };
        let end_vertex = match start_vertex.checked_add(vertex_count) {
            Some(end) => end,
            None => render_bail!(LOG_SOURCE, InvalidState, "vertex range overflows"),
        };
        // The GPU does not bounds-check vertex fetches, so the range is checked here
        if vertex_count > 0 {
            let last_byte = u64::from(binding.offset)
                + u64::from(end_vertex - 1) * u64::from(stride)
                + u64::from(vertex_size);
            if last_byte > binding.buffer.size() {
                render_bail!(
                    LOG_SOURCE,
                    InvalidState,
                    "vertices {}..{} read {} bytes of a {} byte vertex buffer",
                    start_vertex,
                    end_vertex,
                    last_byte,
                    binding.buffer.size()
                );
            }
        }
        if vertex_count % 3 != 0 {
            render_warn!(LOG_SOURCE, "{} trailing vertices do not form a triangle", vertex_count % 3);
        }

        let pipeline = TransientPipeline::graphics(
            gpu.ctx.clone(),
            &self.state,
            program,
            vulkan_layout,
            stride,
            gpu.target.render_pass,
        )?;

        let device = &gpu.ctx.device;
        let extent = gpu.target.extent();
        gpu.ctx.submit_one_shot("draw", |command_buffer| unsafe {
            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(gpu.target.render_pass)
                .framebuffer(gpu.target.framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                });
            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
            pipeline.bind(command_buffer);

            // Negative height keeps NDC +Y pointing up, matching the other backends
            let viewport = vk::Viewport {
                x: 0.0,
                y: extent.height as f32,
                width: extent.width as f32,
                height: -(extent.height as f32),
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(
                command_buffer,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );
            device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[vertex_buffer.buffer],
                &[u64::from(binding.offset)],
            );
            device.cmd_draw(command_buffer, vertex_count, 1, start_vertex, 0);
            device.cmd_end_render_pass(command_buffer);
            shader_to_host_barrier(device, command_buffer, vk::PipelineStageFlags::FRAGMENT_SHADER);
        })?;
        render_trace!(LOG_SOURCE, "draw: {} vertices from {}", vertex_count, start_vertex);

        self.lifecycle.mark_executed("draw")
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.lifecycle.require_initialized("dispatch_compute")?;
        self.state.validate_dispatch()?;
        let gpu = self.gpu("dispatch_compute")?;

        let program = self.bound_program()?;
        let pipeline = TransientPipeline::compute(gpu.ctx.clone(), &self.state, program)?;

        let device = &gpu.ctx.device;
        gpu.ctx.submit_one_shot("dispatch", |command_buffer| unsafe {
            pipeline.bind(command_buffer);
            device.cmd_dispatch(command_buffer, x, y, z);
            shader_to_host_barrier(device, command_buffer, vk::PipelineStageFlags::COMPUTE_SHADER);
        })?;
        render_trace!(LOG_SOURCE, "dispatch: {}x{}x{} groups", x, y, z);

        self.lifecycle.mark_executed("dispatch_compute")
    }

    fn capture_screen_shot(&mut self, path: &Path) -> Result<()> {
        self.lifecycle.require_initialized("capture_screen_shot")?;
        let target = &self.gpu("capture_screen_shot")?.target;
        let pixels = target
            .read_pixels()
            .map_err(|e| render_fail!(LOG_SOURCE, Capture, "render target readback failed: {}", e))?;
        capture::write_png(path, target.width(), target.height(), &pixels)?;
        self.lifecycle.mark_presented("capture_screen_shot")
    }

    fn serialize_output(&mut self, state: &Arc<dyn BindingState>, path: &Path) -> Result<()> {
        self.lifecycle.require_initialized("serialize_output")?;
        check_owner(self.id, state.owner(), "binding state")?;
        capture::serialize_binding_state(state.as_ref(), path)
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Some(gpu) = &self.gpu {
            // Resources still held by the caller keep the context alive
            if gpu.ctx.wait_idle().is_err() {
                render_warn!(LOG_SOURCE, "device lost while dropping renderer");
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_renderer_tests.rs"]
mod tests;
