/// Renderer trait - the backend-independent test driving interface

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::renderer::{
    BindingState, Buffer, BufferDesc, BufferMapping, ConstantBufferBinding, InputElementDesc,
    InputLayout, MapFlavor, PrimitiveTopology, RendererId, ShaderCompiler, ShaderInputLayout,
    ShaderProgram, VertexBufferBinding,
};

// ============================================================================
// Common types
// ============================================================================

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Render target width in pixels
    pub width: u32,
    /// Render target height in pixels
    pub height: u32,
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
    /// Log backend diagnostics (device selection, pipeline creation, etc.)
    pub debug_output: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            enable_validation: cfg!(debug_assertions),
            app_name: "render-test".to_string(),
            debug_output: false,
        }
    }
}

/// Backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererType {
    DirectX11,
    DirectX12,
    OpenGl,
    Vulkan,
    Cuda,
    /// CPU reference rasterizer
    Software,
}

impl RendererType {
    pub const ALL: [RendererType; 6] = [
        RendererType::DirectX11,
        RendererType::DirectX12,
        RendererType::OpenGl,
        RendererType::Vulkan,
        RendererType::Cuda,
        RendererType::Software,
    ];

    /// Short name used on command lines (`dx11`, `vk`, `cpu`, ...)
    pub fn short_name(&self) -> &'static str {
        match self {
            RendererType::DirectX11 => "dx11",
            RendererType::DirectX12 => "dx12",
            RendererType::OpenGl => "gl",
            RendererType::Vulkan => "vk",
            RendererType::Cuda => "cuda",
            RendererType::Software => "cpu",
        }
    }
}

impl fmt::Display for RendererType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RendererType::DirectX11 => "Direct3D 11",
            RendererType::DirectX12 => "Direct3D 12",
            RendererType::OpenGl => "OpenGL",
            RendererType::Vulkan => "Vulkan",
            RendererType::Cuda => "CUDA",
            RendererType::Software => "Software",
        };
        f.write_str(name)
    }
}

impl FromStr for RendererType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dx11" | "d3d11" | "directx11" => Ok(RendererType::DirectX11),
            "dx12" | "d3d12" | "directx12" => Ok(RendererType::DirectX12),
            "gl" | "opengl" => Ok(RendererType::OpenGl),
            "vk" | "vulkan" => Ok(RendererType::Vulkan),
            "cuda" => Ok(RendererType::Cuda),
            "cpu" | "software" => Ok(RendererType::Software),
            other => Err(Error::InitializationFailed(format!("unknown renderer type '{}'", other))),
        }
    }
}

/// Native window a renderer can present to
///
/// Any type exposing raw window and display handles qualifies (e.g. a winit window).
pub trait NativeWindow: HasWindowHandle + HasDisplayHandle {}

impl<T: HasWindowHandle + HasDisplayHandle + ?Sized> NativeWindow for T {}

// ============================================================================
// Renderer trait
// ============================================================================

/// Main renderer trait
///
/// One renderer drives one test case: create resources, bind them, issue a single draw
/// or compute dispatch, then capture the result. Every call is synchronous.
/// Implemented by backend-specific renderers (e.g., SoftwareRenderer, VulkanRenderer).
pub trait Renderer: Send {
    /// Identity stamped on every resource this renderer creates
    fn id(&self) -> RendererId;

    /// Backend kind
    fn renderer_type(&self) -> RendererType;

    /// Bring up the device
    ///
    /// # Arguments
    ///
    /// * `window` - Window to present to, or `None` for offscreen rendering
    ///
    /// Fails with `InvalidState` on a second call and `InitializationFailed` when the
    /// backend cannot start.
    fn initialize(&mut self, window: Option<&dyn NativeWindow>) -> Result<()>;

    /// Color used by `clear_frame`
    fn set_clear_color(&mut self, color: [f32; 4]);

    /// Clear the render target to the clear color
    fn clear_frame(&mut self) -> Result<()>;

    /// Finish the frame (offscreen renderers wait for completion)
    fn present_frame(&mut self) -> Result<()>;

    /// Create a buffer, copying `desc.init_data` before returning
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<Arc<dyn Buffer>>;

    /// Create an input layout after validating its elements
    fn create_input_layout(&mut self, elements: &[InputElementDesc]) -> Result<Arc<dyn InputLayout>>;

    /// Resolve a shader input layout into a binding state
    fn create_binding_state(&mut self, layout: &ShaderInputLayout) -> Result<Arc<dyn BindingState>>;

    /// Compiler producing programs for this renderer
    ///
    /// The same compiler is returned for the renderer's whole lifetime.
    fn shader_compiler(&self) -> Result<&dyn ShaderCompiler>;

    /// Map a buffer for CPU access
    ///
    /// A buffer may only have one outstanding mapping; mapping it again before the
    /// first is released fails with `InvalidState`.
    fn map(&mut self, buffer: &Arc<dyn Buffer>, flavor: MapFlavor) -> Result<BufferMapping>;

    /// Release a mapping (dropping it has the same effect)
    fn unmap(&mut self, mapping: BufferMapping) -> Result<()>;

    fn set_input_layout(&mut self, layout: &Arc<dyn InputLayout>) -> Result<()>;

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> Result<()>;

    fn set_binding_state(&mut self, state: &Arc<dyn BindingState>) -> Result<()>;

    /// Bind consecutive vertex buffer slots starting at `start_slot`
    fn set_vertex_buffers(&mut self, start_slot: u32, bindings: &[VertexBufferBinding]) -> Result<()>;

    /// Bind a single vertex buffer
    fn set_vertex_buffer(&mut self, slot: u32, buffer: &Arc<dyn Buffer>, stride: u32, offset: u32) -> Result<()> {
        self.set_vertex_buffers(slot, &[VertexBufferBinding::new(buffer.clone(), stride, offset)])
    }

    fn set_shader_program(&mut self, program: &Arc<dyn ShaderProgram>) -> Result<()>;

    /// Bind consecutive constant buffer slots starting at `start_slot`
    fn set_constant_buffers(&mut self, start_slot: u32, bindings: &[ConstantBufferBinding]) -> Result<()>;

    /// Bind a single constant buffer
    fn set_constant_buffer(&mut self, slot: u32, buffer: &Arc<dyn Buffer>, offset: u32) -> Result<()> {
        self.set_constant_buffers(slot, &[ConstantBufferBinding::new(buffer.clone(), offset)])
    }

    /// Draw `vertex_count` vertices as a triangle list starting at `start_vertex`
    fn draw(&mut self, vertex_count: u32, start_vertex: u32) -> Result<()>;

    /// Run the bound compute program over an `x × y × z` grid of work groups
    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) -> Result<()>;

    /// Write the render target to `path` as a PNG
    fn capture_screen_shot(&mut self, path: &Path) -> Result<()>;

    /// Dump every buffer of `state` to `path` (one hex word per line, slot order)
    fn serialize_output(&mut self, state: &Arc<dyn BindingState>, path: &Path) -> Result<()>;
}

// ============================================================================
// Plugin system for registering renderer backends
// ============================================================================

/// Renderer plugin factory function type
type RendererPluginFactory = Box<dyn Fn(RendererConfig) -> Result<Box<dyn Renderer>> + Send + Sync>;

/// Plugin registry for renderer backends
pub struct RendererPluginRegistry {
    plugins: FxHashMap<RendererType, RendererPluginFactory>,
}

impl RendererPluginRegistry {
    /// Create a registry with the software backend pre-registered
    fn new() -> Self {
        let mut registry = Self {
            plugins: FxHashMap::default(),
        };
        registry.register_plugin(RendererType::Software, |config| {
            Ok(Box::new(crate::software::SoftwareRenderer::new(config)) as Box<dyn Renderer>)
        });
        registry
    }

    /// Register (or replace) the factory for a backend
    pub fn register_plugin<F>(&mut self, renderer_type: RendererType, factory: F)
    where
        F: Fn(RendererConfig) -> Result<Box<dyn Renderer>> + Send + Sync + 'static,
    {
        self.plugins.insert(renderer_type, Box::new(factory));
    }

    pub fn is_registered(&self, renderer_type: RendererType) -> bool {
        self.plugins.contains_key(&renderer_type)
    }

    /// Create an uninitialized renderer using a registered plugin
    pub fn create_renderer(&self, renderer_type: RendererType, config: RendererConfig) -> Result<Box<dyn Renderer>> {
        match self.plugins.get(&renderer_type) {
            Some(factory) => factory(config),
            None => Err(crate::render_fail!(
                "render_test::renderer",
                InitializationFailed,
                "no {} backend is registered",
                renderer_type
            )),
        }
    }
}

static RENDERER_REGISTRY: Mutex<Option<RendererPluginRegistry>> = Mutex::new(None);

/// Lock the global registry, creating it on first access
fn lock_registry() -> Result<MutexGuard<'static, Option<RendererPluginRegistry>>> {
    let mut registry = RENDERER_REGISTRY
        .lock()
        .map_err(|_| crate::render_err!("render_test::renderer", "renderer registry lock poisoned"))?;
    if registry.is_none() {
        *registry = Some(RendererPluginRegistry::new());
    }
    Ok(registry)
}

/// Register a renderer plugin in the global registry
pub fn register_renderer_plugin<F>(renderer_type: RendererType, factory: F) -> Result<()>
where
    F: Fn(RendererConfig) -> Result<Box<dyn Renderer>> + Send + Sync + 'static,
{
    let mut registry = lock_registry()?;
    if let Some(registry) = registry.as_mut() {
        registry.register_plugin(renderer_type, factory);
    }
    crate::render_debug!("render_test::renderer", "{} backend registered", renderer_type);
    Ok(())
}

/// Create a renderer through the global registry
///
/// Fails with `InitializationFailed` when no plugin is registered for `renderer_type`.
pub fn create_renderer(renderer_type: RendererType, config: RendererConfig) -> Result<Box<dyn Renderer>> {
    let registry = lock_registry()?;
    match registry.as_ref() {
        Some(registry) => registry.create_renderer(renderer_type, config),
        None => Err(crate::render_err!("render_test::renderer", "renderer registry missing")),
    }
}

/// Backends with a registered plugin
pub fn available_renderers() -> Result<Vec<RendererType>> {
    let registry = lock_registry()?;
    Ok(RendererType::ALL
        .iter()
        .copied()
        .filter(|t| registry.as_ref().map_or(false, |r| r.is_registered(*t)))
        .collect())
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
