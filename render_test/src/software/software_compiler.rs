/// Software shader compiler: resolves entry points against a kernel registry

use std::sync::Arc;
use crate::error::Result;
use crate::renderer::{
    RendererId, ShaderCompileRequest, ShaderCompiler, ShaderProgram, ShaderStage, SourceData,
};
use crate::software::kernel::{specialized_name, Kernel, KernelRegistry};
use crate::software::software_resources::SoftwareProgram;

pub struct SoftwareCompiler {
    owner: RendererId,
    kernels: Arc<KernelRegistry>,
}

impl SoftwareCompiler {
    pub fn new(owner: RendererId, kernels: Arc<KernelRegistry>) -> Self {
        Self { owner, kernels }
    }
}

impl ShaderCompiler for SoftwareCompiler {
    fn compile_program(&self, request: &ShaderCompileRequest) -> Result<Arc<dyn ShaderProgram>> {
        request.validate()?;

        let mut program = SoftwareProgram {
            owner: self.owner,
            vertex: None,
            fragment: None,
            compute: None,
        };

        for (stage, entry) in request.entry_points() {
            let source = request.source_for(entry);
            if let SourceData::Binary(bytes) = &source.data {
                crate::render_bail!(
                    "render_test::software",
                    Compile,
                    "{}: software backend takes text source, got a {} byte binary",
                    source.path,
                    bytes.len()
                );
            }

            let key = specialized_name(&entry.name, &request.entry_point_type_arguments);
            let kernel = match self.kernels.lookup(stage, &key) {
                Some(kernel) => kernel.clone(),
                None if !request.entry_point_type_arguments.is_empty() => crate::render_bail!(
                    "render_test::software",
                    Compile,
                    "type arguments <{}> do not satisfy entry point '{}'",
                    request.entry_point_type_arguments.join(","),
                    entry.name
                ),
                None => crate::render_bail!(
                    "render_test::software",
                    Compile,
                    "{}: no {:?} kernel named '{}'",
                    source.path,
                    stage,
                    key
                ),
            };

            match (stage, kernel) {
                (ShaderStage::Vertex, Kernel::Vertex(kernel)) => program.vertex = Some(kernel),
                (ShaderStage::Fragment, Kernel::Fragment(kernel)) => program.fragment = Some(kernel),
                (ShaderStage::Compute, Kernel::Compute(kernel)) => program.compute = Some(kernel),
                (stage, kernel) => crate::render_bail!(
                    "render_test::software",
                    Compile,
                    "kernel '{}' is a {:?} kernel, requested as {:?}",
                    key,
                    kernel.stage(),
                    stage
                ),
            }
            crate::render_trace!("render_test::software", "resolved {:?} kernel '{}'", stage, key);
        }

        Ok(Arc::new(program))
    }
}

#[cfg(test)]
#[path = "software_compiler_tests.rs"]
mod tests;
