/// Software (CPU reference) backend
///
/// Always registered. Entry points resolve to native kernels, so the same test drives
/// this backend and the GPU backends without a shading-language front-end.

pub mod kernel;
pub mod rasterizer;
mod software_compiler;
mod software_renderer;
mod software_resources;

pub use kernel::{
    ComputeInvocation, ComputeKernel, ComputeResources, ConstantData, FragmentInput, Kernel,
    KernelRegistry, VertexInput, VertexOutput,
};
pub use rasterizer::ColorTarget;
pub use software_compiler::SoftwareCompiler;
pub use software_renderer::SoftwareRenderer;
pub use software_resources::{SoftwareBindingState, SoftwareBuffer, SoftwareInputLayout, SoftwareProgram};
