/// Shader compile request protocol, shader program and compiler traits

use std::any::Any;
use std::sync::Arc;
use bitflags::bitflags;
use crate::error::Result;
use crate::renderer::handle::RendererId;

/// Pipeline stage an entry point runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Stage implied by a profile string
    ///
    /// `vs_5_0`/`vertex` → Vertex, `ps_5_0`/`fs`/`fragment`/`pixel` → Fragment,
    /// `cs_5_0`/`compute` → Compute.
    pub fn from_profile(profile: &str) -> Option<ShaderStage> {
        let lower = profile.to_ascii_lowercase();
        let family = lower.split('_').next().unwrap_or("");
        match family {
            "vs" | "vertex" => Some(ShaderStage::Vertex),
            "ps" | "fs" | "fragment" | "pixel" => Some(ShaderStage::Fragment),
            "cs" | "compute" => Some(ShaderStage::Compute),
            _ => None,
        }
    }

    /// Matching bit in `ShaderStageFlags`
    pub fn flag(&self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
        }
    }
}

bitflags! {
    /// Set of stages contained in a shader program
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

/// Shader source payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceData {
    /// Textual source (terminator already stripped)
    Text(String),
    /// Exact-length binary blob (e.g. SPIR-V)
    Binary(Vec<u8>),
}

/// Shader source with the path it was read from (diagnostics only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub path: String,
    pub data: SourceData,
}

impl Default for SourceInfo {
    fn default() -> Self {
        Self {
            path: String::new(),
            data: SourceData::Text(String::new()),
        }
    }
}

impl SourceInfo {
    pub fn text(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data: SourceData::Text(text.into()),
        }
    }

    pub fn binary(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: SourceData::Binary(bytes.into()),
        }
    }

    /// Classify a buffer read from disk by where its payload ends
    ///
    /// `data_end == buffer.len()` marks a binary blob kept at its exact length. A
    /// `data_end` pointing at a nul byte inside the buffer marks text: the payload is
    /// `buffer[..data_end]` and must be UTF-8. The terminator sits outside the payload,
    /// so binary formats that happen to end in a zero byte (SPIR-V does) stay binary.
    pub fn from_buffer(path: impl Into<String>, mut buffer: Vec<u8>, data_end: usize) -> Result<Self> {
        let path = path.into();
        if data_end == buffer.len() {
            return Ok(Self { path, data: SourceData::Binary(buffer) });
        }
        if buffer.get(data_end) != Some(&0) {
            crate::render_bail!(
                "render_test::shader",
                Compile,
                "{}: data end {} is neither the buffer end ({}) nor a nul terminator",
                path,
                data_end,
                buffer.len()
            );
        }
        buffer.truncate(data_end);
        match String::from_utf8(buffer) {
            Ok(text) => Ok(Self { path, data: SourceData::Text(text) }),
            Err(e) => Err(crate::render_fail!(
                "render_test::shader",
                Compile,
                "{}: text source is not valid UTF-8 ({})",
                path,
                e
            )),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.data {
            SourceData::Text(text) => text.is_empty(),
            SourceData::Binary(bytes) => bytes.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            SourceData::Text(text) => Some(text),
            SourceData::Binary(_) => None,
        }
    }
}

/// Entry point of one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Function name in the source
    pub name: String,
    /// Target profile (e.g. "vs_5_0", "ps_5_0", "cs_5_0")
    pub profile: String,
    /// Stage-specific source; `None` uses the request's whole-program source
    pub source: Option<SourceInfo>,
}

impl EntryPoint {
    pub fn new(name: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile: profile.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }
}

/// Everything a backend compiler needs to build one shader program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderCompileRequest {
    /// Whole-program source
    pub source: SourceInfo,
    pub vertex_shader: Option<EntryPoint>,
    pub fragment_shader: Option<EntryPoint>,
    pub compute_shader: Option<EntryPoint>,
    /// Generic type arguments specializing the entry points
    pub entry_point_type_arguments: Vec<String>,
}

impl ShaderCompileRequest {
    /// Vertex + fragment request
    pub fn graphics(source: SourceInfo, vertex: EntryPoint, fragment: EntryPoint) -> Self {
        Self {
            source,
            vertex_shader: Some(vertex),
            fragment_shader: Some(fragment),
            ..Default::default()
        }
    }

    /// Compute-only request
    pub fn compute(source: SourceInfo, compute: EntryPoint) -> Self {
        Self {
            source,
            compute_shader: Some(compute),
            ..Default::default()
        }
    }

    pub fn with_type_arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry_point_type_arguments = args.into_iter().map(Into::into).collect();
        self
    }

    /// Populated entry points with the stage of their slot
    pub fn entry_points(&self) -> impl Iterator<Item = (ShaderStage, &EntryPoint)> {
        [
            (ShaderStage::Vertex, self.vertex_shader.as_ref()),
            (ShaderStage::Fragment, self.fragment_shader.as_ref()),
            (ShaderStage::Compute, self.compute_shader.as_ref()),
        ]
        .into_iter()
        .filter_map(|(stage, entry)| entry.map(|e| (stage, e)))
    }

    /// Source an entry point compiles from
    pub fn source_for<'a>(&'a self, entry: &'a EntryPoint) -> &'a SourceInfo {
        entry.source.as_ref().unwrap_or(&self.source)
    }

    /// Check request shape and return the stages it contains
    pub fn validate(&self) -> Result<ShaderStageFlags> {
        let mut stages = ShaderStageFlags::empty();
        for (stage, entry) in self.entry_points() {
            if entry.name.is_empty() {
                crate::render_bail!(
                    "render_test::shader",
                    Compile,
                    "{:?} entry point has an empty name",
                    stage
                );
            }
            match ShaderStage::from_profile(&entry.profile) {
                Some(profile_stage) if profile_stage == stage => {}
                Some(profile_stage) => crate::render_bail!(
                    "render_test::shader",
                    Compile,
                    "entry point '{}' has {:?} profile '{}' in the {:?} slot",
                    entry.name,
                    profile_stage,
                    entry.profile,
                    stage
                ),
                None => crate::render_bail!(
                    "render_test::shader",
                    Compile,
                    "entry point '{}' has unknown profile '{}'",
                    entry.name,
                    entry.profile
                ),
            }
            if self.source_for(entry).is_empty() {
                crate::render_bail!(
                    "render_test::shader",
                    Compile,
                    "entry point '{}' has no source",
                    entry.name
                );
            }
            stages |= stage.flag();
        }

        if stages.is_empty() {
            crate::render_bail!("render_test::shader", Compile, "request has no entry points");
        }
        if stages.contains(ShaderStageFlags::COMPUTE) && stages.intersects(ShaderStageFlags::GRAPHICS) {
            crate::render_bail!(
                "render_test::shader",
                Compile,
                "compute entry point cannot be combined with vertex/fragment entry points"
            );
        }
        if stages.intersects(ShaderStageFlags::GRAPHICS) && !stages.contains(ShaderStageFlags::GRAPHICS) {
            crate::render_bail!(
                "render_test::shader",
                Compile,
                "vertex and fragment entry points must be provided together"
            );
        }
        Ok(stages)
    }
}

/// Compiled shader program resource trait
pub trait ShaderProgram: Send + Sync {
    /// Renderer that created this program
    fn owner(&self) -> RendererId;

    /// Stages the program contains
    fn stages(&self) -> ShaderStageFlags;

    /// Concrete type access for the owning backend
    fn as_any(&self) -> &dyn Any;
}

/// Backend shader compiler
///
/// Obtained from `Renderer::shader_compiler`. Compiling never touches pipeline state;
/// diagnostics are returned verbatim in `Error::Compile`.
pub trait ShaderCompiler: Send + Sync {
    fn compile_program(&self, request: &ShaderCompileRequest) -> Result<Arc<dyn ShaderProgram>>;
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
