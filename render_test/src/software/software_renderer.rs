/// SoftwareRenderer - deterministic CPU reference backend

use std::path::Path;
use std::sync::Arc;
use glam::{UVec3, Vec4};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::renderer::{
    capture, check_owner, downcast_resource, layout_vertex_size, resolve_bindings, BindingKind,
    BindingState, Buffer, BufferDesc, BufferMapping, ConstantBufferBinding, InputElementDesc,
    InputLayout, MapFlavor, NativeWindow, PipelineState, PrimitiveTopology, Renderer,
    RendererConfig, RendererId, RendererLifecycle, RendererType, ShaderCompiler,
    ShaderInputLayout, ShaderProgram, VertexBufferBinding, validate_input_layout,
};
use crate::software::kernel::{
    ComputeInvocation, ComputeResources, ConstantData, FragmentInput, KernelRegistry, VertexInput,
};
use crate::software::rasterizer::{rasterize_triangle, ClipVertex, ColorTarget};
use crate::software::software_compiler::SoftwareCompiler;
use crate::software::software_resources::{
    SoftwareBindingState, SoftwareBuffer, SoftwareInputLayout, SoftwareProgram,
};

const LOG_SOURCE: &str = "render_test::software";

/// CPU reference renderer
///
/// Renders into an RGBA8 target of the configured size and runs compute kernels serially.
/// Output is bit-for-bit reproducible for identical inputs.
pub struct SoftwareRenderer {
    id: RendererId,
    config: RendererConfig,
    kernels: Arc<KernelRegistry>,
    lifecycle: RendererLifecycle,
    state: PipelineState,
    clear_color: [f32; 4],
    target: Option<ColorTarget>,
    compiler: Option<SoftwareCompiler>,
}

impl SoftwareRenderer {
    /// Renderer with the built-in kernels
    pub fn new(config: RendererConfig) -> Self {
        Self::with_kernels(config, KernelRegistry::with_builtins())
    }

    /// Renderer resolving entry points against a custom kernel registry
    pub fn with_kernels(config: RendererConfig, kernels: KernelRegistry) -> Self {
        let id = RendererId::next();
        Self {
            id,
            config,
            kernels: Arc::new(kernels),
            lifecycle: RendererLifecycle::new(),
            state: PipelineState::new(id),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            target: None,
            compiler: None,
        }
    }

    /// Current render target contents (None before initialize)
    pub fn color_target(&self) -> Option<&ColorTarget> {
        self.target.as_ref()
    }

    pub fn lifecycle(&self) -> &RendererLifecycle {
        &self.lifecycle
    }

    fn bound_program(&self) -> Result<&SoftwareProgram> {
        match self.state.program() {
            Some(program) => downcast_resource::<SoftwareProgram>(program.as_any(), "shader program"),
            None => crate::render_bail!(LOG_SOURCE, InvalidState, "no shader program bound"),
        }
    }
}

/// Constant data visible to kernels
///
/// Constant buffers from the binding state come first; explicitly bound constant
/// buffer slots override them.
fn gather_constants(state: &PipelineState) -> Result<ConstantData> {
    let mut constants = ConstantData::new();
    if let Some(binding_state) = state.binding_state() {
        for resource in binding_state.resources() {
            if resource.kind == BindingKind::ConstantBuffer {
                constants.insert(resource.binding, resource.buffer.read_contents()?);
            }
        }
    }
    for (slot, binding) in state.constant_buffers() {
        let bytes = binding.buffer.read_contents()?;
        let start = (binding.offset as usize).min(bytes.len());
        constants.insert(slot, bytes[start..].to_vec());
    }
    Ok(constants)
}

/// Read one vertex's attributes, filling missing components from (0, 0, 0, 1)
fn fetch_vertex(bytes: &[u8], base: usize, elements: &[InputElementDesc], out: &mut Vec<Vec4>) -> Result<()> {
    out.clear();
    for element in elements {
        let start = base + element.offset as usize;
        let end = start + element.format.size_bytes() as usize;
        let Some(raw) = bytes.get(start..end) else {
            crate::render_bail!(
                LOG_SOURCE,
                InvalidState,
                "{}{} reads bytes {}..{} past the end of a {} byte vertex buffer",
                element.semantic_name,
                element.semantic_index,
                start,
                end,
                bytes.len()
            );
        };
        let mut value = [0.0, 0.0, 0.0, 1.0];
        for (component, word) in raw.chunks_exact(4).enumerate() {
            value[component] = bytemuck::pod_read_unaligned::<f32>(word);
        }
        out.push(Vec4::from_array(value));
    }
    Ok(())
}

impl Renderer for SoftwareRenderer {
    fn id(&self) -> RendererId {
        self.id
    }

    fn renderer_type(&self) -> RendererType {
        RendererType::Software
    }

    fn initialize(&mut self, window: Option<&dyn NativeWindow>) -> Result<()> {
        self.lifecycle.ensure_uninitialized()?;

        if let Some(window) = window {
            window
                .window_handle()
                .map_err(|e| crate::render_fail!(LOG_SOURCE, InitializationFailed, "window handle unavailable: {}", e))?;
            window
                .display_handle()
                .map_err(|e| crate::render_fail!(LOG_SOURCE, InitializationFailed, "display handle unavailable: {}", e))?;
            crate::render_debug!(LOG_SOURCE, "window provided; rendering stays offscreen");
        }
        if self.config.width == 0 || self.config.height == 0 {
            crate::render_bail!(
                LOG_SOURCE,
                InitializationFailed,
                "render target size {}x{} is empty",
                self.config.width,
                self.config.height
            );
        }

        self.target = Some(ColorTarget::new(self.config.width, self.config.height));
        self.compiler = Some(SoftwareCompiler::new(self.id, self.kernels.clone()));
        self.lifecycle.mark_initialized()?;

        crate::render_info!(
            LOG_SOURCE,
            "{} initialized ({}x{}, {} kernels)",
            self.config.app_name,
            self.config.width,
            self.config.height,
            self.kernels.len()
        );
        Ok(())
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear_frame(&mut self) -> Result<()> {
        self.lifecycle.require_initialized("clear_frame")?;
        if let Some(target) = self.target.as_mut() {
            target.clear(self.clear_color);
        }
        Ok(())
    }

    fn present_frame(&mut self) -> Result<()> {
        self.lifecycle.mark_presented("present_frame")
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<Arc<dyn Buffer>> {
        self.lifecycle.require_initialized("create_buffer")?;
        desc.validate()?;
        Ok(Arc::new(SoftwareBuffer::new(self.id, desc)))
    }

    fn create_input_layout(&mut self, elements: &[InputElementDesc]) -> Result<Arc<dyn InputLayout>> {
        self.lifecycle.require_initialized("create_input_layout")?;
        validate_input_layout(elements)?;
        Ok(Arc::new(SoftwareInputLayout::new(self.id, elements)))
    }

    fn create_binding_state(&mut self, layout: &ShaderInputLayout) -> Result<Arc<dyn BindingState>> {
        self.lifecycle.require_initialized("create_binding_state")?;
        let id = self.id;
        let resources = resolve_bindings(layout, |desc| {
            desc.validate()?;
            Ok(Arc::new(SoftwareBuffer::new(id, desc)) as Arc<dyn Buffer>)
        })?;
        crate::render_debug!(LOG_SOURCE, "binding state with {} resources", resources.len());
        Ok(Arc::new(SoftwareBindingState::new(id, resources)))
    }

    fn shader_compiler(&self) -> Result<&dyn ShaderCompiler> {
        match &self.compiler {
            Some(compiler) => Ok(compiler),
            None => crate::render_bail!(LOG_SOURCE, InvalidState, "shader_compiler called before initialize"),
        }
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

        let program = self.bound_program()?;
        let (vertex_kernel, fragment_kernel) = match (&program.vertex, &program.fragment) {
            (Some(vertex), Some(fragment)) => (vertex.clone(), fragment.clone()),
            _ => crate::render_bail!(LOG_SOURCE, InvalidState, "bound program has no vertex/fragment kernels"),
        };
        let elements = match self.state.input_layout() {
            Some(layout) => layout.elements().to_vec(),
            None => crate::render_bail!(LOG_SOURCE, InvalidState, "draw without an input layout"),
        };
        let binding = match self.state.vertex_buffer(0) {
            Some(binding) => binding.clone(),
            None => crate::render_bail!(LOG_SOURCE, InvalidState, "draw without a vertex buffer in slot 0"),
        };
        let end_vertex = match start_vertex.checked_add(vertex_count) {
            Some(end) => end,
            None => crate::render_bail!(LOG_SOURCE, InvalidState, "vertex range overflows"),
        };

        let vertex_bytes = binding.buffer.read_contents()?;
        let stride = match binding.stride {
            0 => layout_vertex_size(&elements),
            stride => stride,
        } as usize;
        let constants = gather_constants(&self.state)?;

        let mut clip = Vec::with_capacity(vertex_count as usize);
        let mut attributes = Vec::with_capacity(elements.len());
        for vertex_id in start_vertex..end_vertex {
            let base = binding.offset as usize + vertex_id as usize * stride;
            fetch_vertex(&vertex_bytes, base, &elements, &mut attributes)?;
            let output = vertex_kernel(&VertexInput {
                vertex_id,
                attributes: &attributes,
                elements: &elements,
                constants: &constants,
            });
            clip.push(ClipVertex {
                position: output.position,
                varyings: output.varyings,
            });
        }
        if clip.len() % 3 != 0 {
            crate::render_warn!(
                LOG_SOURCE,
                "{} trailing vertices do not form a triangle",
                clip.len() % 3
            );
        }

        let target = match self.target.as_mut() {
            Some(target) => target,
            None => crate::render_bail!(LOG_SOURCE, InvalidState, "no render target"),
        };
        let mut pixels = 0;
        for triangle in clip.chunks_exact(3) {
            pixels += rasterize_triangle(target, [&triangle[0], &triangle[1], &triangle[2]], |frag_coord, varyings| {
                fragment_kernel(&FragmentInput {
                    frag_coord,
                    varyings,
                    constants: &constants,
                })
            });
        }
        crate::render_trace!(
            LOG_SOURCE,
            "draw: {} vertices, {} triangles, {} pixels",
            vertex_count,
            clip.len() / 3,
            pixels
        );

        self.lifecycle.mark_executed("draw")
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.lifecycle.require_initialized("dispatch_compute")?;
        self.state.validate_dispatch()?;

        let kernel = match &self.bound_program()?.compute {
            Some(kernel) => kernel.clone(),
            None => crate::render_bail!(LOG_SOURCE, InvalidState, "bound program has no compute kernel"),
        };
        let constants = gather_constants(&self.state)?;

        let mut storage_buffers = Vec::new();
        let mut storage = FxHashMap::default();
        if let Some(binding_state) = self.state.binding_state() {
            for resource in binding_state.resources() {
                if resource.kind == BindingKind::StorageBuffer {
                    storage.insert(resource.binding, resource.buffer.read_contents()?);
                    storage_buffers.push((resource.binding, resource.buffer.clone()));
                }
            }
        }

        let mut resources = ComputeResources::new(storage, constants);
        let size = kernel.workgroup_size;
        for gz in 0..z {
            for gy in 0..y {
                for gx in 0..x {
                    for lz in 0..size.z {
                        for ly in 0..size.y {
                            for lx in 0..size.x {
                                let group_id = UVec3::new(gx, gy, gz);
                                let group_thread_id = UVec3::new(lx, ly, lz);
                                let invocation = ComputeInvocation {
                                    dispatch_thread_id: group_id * size + group_thread_id,
                                    group_id,
                                    group_thread_id,
                                };
                                (kernel.func)(&invocation, &mut resources);
                            }
                        }
                    }
                }
            }
        }

        let storage = resources.into_storage();
        for (binding, buffer) in storage_buffers {
            let target = downcast_resource::<SoftwareBuffer>(buffer.as_any(), "storage buffer")?;
            if let Some(bytes) = storage.get(&binding) {
                target.lock()?.copy_from_slice(bytes);
            }
        }
        crate::render_trace!(LOG_SOURCE, "dispatch: {}x{}x{} groups of {}", x, y, z, size);

        self.lifecycle.mark_executed("dispatch_compute")
    }

    fn capture_screen_shot(&mut self, path: &Path) -> Result<()> {
        self.lifecycle.require_initialized("capture_screen_shot")?;
        match &self.target {
            Some(target) => capture::write_png(path, target.width(), target.height(), target.pixels())?,
            None => crate::render_bail!(LOG_SOURCE, Capture, "no render target to capture"),
        }
        self.lifecycle.mark_presented("capture_screen_shot")
    }

    fn serialize_output(&mut self, state: &Arc<dyn BindingState>, path: &Path) -> Result<()> {
        self.lifecycle.require_initialized("serialize_output")?;
        check_owner(self.id, state.owner(), "binding state")?;
        capture::serialize_binding_state(state.as_ref(), path)
    }
}

#[cfg(test)]
#[path = "software_renderer_tests.rs"]
mod tests;
