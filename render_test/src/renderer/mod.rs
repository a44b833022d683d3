/// Renderer module - resource model, pipeline state and the Renderer trait

// Module declarations
pub mod renderer;
pub mod handle;
pub mod buffer;
pub mod input_layout;
pub mod shader;
pub mod shader_input_layout;
pub mod binding_state;
pub mod pipeline_state;
pub mod lifecycle;
pub mod capture;

// Re-export everything from renderer.rs
pub use renderer::*;

// Re-export from other modules
pub use handle::*;
pub use buffer::*;
pub use input_layout::*;
pub use shader::*;
pub use shader_input_layout::*;
pub use binding_state::*;
pub use pipeline_state::*;
pub use lifecycle::*;
pub use capture::*;
