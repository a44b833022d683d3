/*!
# Render Test - Vulkan Backend

Vulkan implementation of the render_test `Renderer` trait, built on Ash for the Vulkan
bindings and gpu-allocator for memory management.

Rendering is headless: draws go to an offscreen RGBA8 image that `capture_screen_shot`
reads back. Shader programs are precompiled SPIR-V; entry points are checked by
reflection before module creation.

Descriptor layout expected from shaders:
- set 0, binding N: resource N of the bound binding state
- set 1, binding S: constant buffer slot S

Call [`register`] once to make `RendererType::Vulkan` available through
`render_test::create_renderer`.
*/

mod debug;
mod vulkan_binding_state;
mod vulkan_buffer;
mod vulkan_context;
mod vulkan_format;
mod vulkan_input_layout;
mod vulkan_pipeline;
mod vulkan_render_target;
mod vulkan_renderer;
mod vulkan_shader;

pub use vulkan_renderer::VulkanRenderer;

// Re-export debug utilities
pub use debug::{get_validation_stats, print_validation_stats_report, ValidationStats};

use render_test::{Renderer, RendererType};

/// Register the Vulkan backend with the plugin system
///
/// # Example
///
/// ```no_run
/// use render_test::{create_renderer, RendererConfig, RendererType};
///
/// render_test_renderer_vulkan::register()?;
/// let mut renderer = create_renderer(RendererType::Vulkan, RendererConfig::default())?;
/// renderer.initialize(None)?;
/// # Ok::<(), render_test::Error>(())
/// ```
pub fn register() -> render_test::Result<()> {
    render_test::register_renderer_plugin(RendererType::Vulkan, |config| {
        Ok(Box::new(VulkanRenderer::new(config)) as Box<dyn Renderer>)
    })
}
