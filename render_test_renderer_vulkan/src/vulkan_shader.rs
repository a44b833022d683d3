/// ShaderCompiler / ShaderProgram - Vulkan implementation over precompiled SPIR-V

use ash::vk;
use render_test::{
    RendererId, Result, ShaderCompileRequest, ShaderCompiler, ShaderProgram, ShaderStage,
    ShaderStageFlags, SourceData,
};
use render_test::{render_bail, render_fail, render_trace};
use std::any::Any;
use std::ffi::CString;
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_format::execution_model;

/// First word of every SPIR-V module
pub(crate) const SPIRV_MAGIC: u32 = 0x0723_0203;

/// One stage of a compiled program
pub(crate) struct StageModule {
    pub(crate) stage: ShaderStage,
    pub(crate) module: vk::ShaderModule,
    pub(crate) entry_name: CString,
}

/// Vulkan program: one shader module per stage
pub struct VulkanProgram {
    ctx: Arc<GpuContext>,
    owner: RendererId,
    stages: ShaderStageFlags,
    pub(crate) modules: Vec<StageModule>,
}

impl VulkanProgram {
    pub(crate) fn module(&self, stage: ShaderStage) -> Option<&StageModule> {
        self.modules.iter().find(|m| m.stage == stage)
    }
}

impl ShaderProgram for VulkanProgram {
    fn owner(&self) -> RendererId {
        self.owner
    }

    fn stages(&self) -> ShaderStageFlags {
        self.stages
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanProgram {
    fn drop(&mut self) {
        unsafe {
            for module in &self.modules {
                self.ctx.device.destroy_shader_module(module.module, None);
            }
        }
    }
}

/// Compiler accepting SPIR-V binaries only
///
/// There is no embedded front-end: text source fails with `Compile`.
pub struct VulkanShaderCompiler {
    ctx: Arc<GpuContext>,
    owner: RendererId,
}

impl VulkanShaderCompiler {
    pub fn new(ctx: Arc<GpuContext>, owner: RendererId) -> Self {
        Self { ctx, owner }
    }

    fn create_module(&self, words: &[u32]) -> Result<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(words);
        unsafe {
            self.ctx
                .device
                .create_shader_module(&create_info, None)
                .map_err(|e| render_fail!(LOG_SOURCE, Compile, "Failed to create shader module: {:?}", e))
        }
    }
}

impl ShaderCompiler for VulkanShaderCompiler {
    fn compile_program(&self, request: &ShaderCompileRequest) -> Result<Arc<dyn ShaderProgram>> {
        let stages = request.validate()?;
        if !request.entry_point_type_arguments.is_empty() {
            render_bail!(
                LOG_SOURCE,
                Compile,
                "type arguments <{}> cannot specialize precompiled SPIR-V",
                request.entry_point_type_arguments.join(",")
            );
        }

        let mut program = VulkanProgram {
            ctx: self.ctx.clone(),
            owner: self.owner,
            stages,
            modules: Vec::new(),
        };
        for (stage, entry) in request.entry_points() {
            let source = request.source_for(entry);
            let bytes = match &source.data {
                SourceData::Binary(bytes) => bytes,
                SourceData::Text(_) => render_bail!(
                    LOG_SOURCE,
                    Compile,
                    "{}: Vulkan backend takes SPIR-V binaries, got text source",
                    source.path
                ),
            };
            let words = spirv_words(&source.path, bytes)?;
            find_entry_point(&source.path, &words, &entry.name, stage)?;

            let entry_name = CString::new(entry.name.as_str())
                .map_err(|e| render_fail!(LOG_SOURCE, Compile, "invalid entry point name '{}': {}", entry.name, e))?;
            // Pushed immediately so a later failure still destroys it
            let module = self.create_module(&words)?;
            program.modules.push(StageModule {
                stage,
                module,
                entry_name,
            });
            render_trace!(LOG_SOURCE, "{:?} module for '{}' from {}", stage, entry.name, source.path);
        }

        Ok(Arc::new(program))
    }
}

/// Reinterpret a SPIR-V blob as little-endian words, checking size and magic
pub(crate) fn spirv_words(path: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        render_bail!(
            LOG_SOURCE,
            Compile,
            "{}: SPIR-V size {} is not a multiple of 4 bytes",
            path,
            bytes.len()
        );
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect();
    if words.first() != Some(&SPIRV_MAGIC) {
        render_bail!(LOG_SOURCE, Compile, "{}: not a SPIR-V module (bad magic number)", path);
    }
    Ok(words)
}

/// Check the module declares `name` with the execution model of `stage`
pub(crate) fn find_entry_point(path: &str, words: &[u32], name: &str, stage: ShaderStage) -> Result<()> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| render_fail!(LOG_SOURCE, Compile, "{}: SPIR-V reflection failed: {:?}", path, e))?;

    let wanted = execution_model(stage);
    if entry_points.iter().any(|ep| ep.name == name && ep.exec_model == wanted) {
        return Ok(());
    }
    match entry_points.iter().find(|ep| ep.name == name) {
        Some(ep) => render_bail!(
            LOG_SOURCE,
            Compile,
            "{}: entry point '{}' is {:?}, expected {:?}",
            path,
            name,
            ep.exec_model,
            wanted
        ),
        None => render_bail!(LOG_SOURCE, Compile, "{}: no entry point named '{}'", path, name),
    }
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
