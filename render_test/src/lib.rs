/*!
# Render Test

Backend-independent rendering harness for validating shader compiler output.

A test creates a renderer for one backend, compiles a program through the renderer's
`ShaderCompiler`, binds buffers described by a `ShaderInputLayout`, issues one draw or
compute dispatch, and captures the result as a PNG or a hex buffer dump. The same test
runs unmodified against every backend.

## Architecture

- **Renderer**: backend trait driving one test case
- **Buffer / InputLayout / BindingState / ShaderProgram**: resource traits, shared via `Arc`
- **ShaderCompiler / ShaderCompileRequest**: compile protocol between tests and backends
- **PipelineState / RendererLifecycle**: state shared by every backend implementation
- **SoftwareRenderer**: deterministic CPU reference backend (always available)

Other backends (e.g. Vulkan) live in plugin crates and register themselves with
`register_renderer_plugin`.
*/

// Internal modules
mod error;
pub mod log;
pub mod renderer;
pub mod software;

// Error types
pub use error::{Error, Result};

// Rendering types at crate root
pub use renderer::*;

// Reference backend
pub use software::{KernelRegistry, SoftwareRenderer};

// Re-export math library at crate root
pub use glam;
