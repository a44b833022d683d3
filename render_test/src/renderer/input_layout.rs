/// Vertex input layout: element formats, descriptors and shared validation

use std::any::Any;
use crate::error::Result;
use crate::renderer::handle::RendererId;

/// Maximum number of elements in one input layout
pub const MAX_INPUT_ELEMENTS: usize = 16;

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Format {
    /// Placeholder; rejected by layout validation
    Unknown,
    R_Float32,
    RG_Float32,
    RGB_Float32,
    RGBA_Float32,
}

impl Format {
    /// Size in bytes of one element of this format
    pub fn size_bytes(&self) -> u32 {
        match self {
            Format::Unknown => 0,
            Format::R_Float32 => 4,
            Format::RG_Float32 => 8,
            Format::RGB_Float32 => 12,
            Format::RGBA_Float32 => 16,
        }
    }

    /// Number of 32-bit float components
    pub fn component_count(&self) -> u32 {
        self.size_bytes() / 4
    }
}

/// One element of a vertex input layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputElementDesc {
    /// Semantic name (e.g. "POSITION", "COLOR")
    pub semantic_name: String,
    /// Semantic index (e.g. TEXCOORD1 → 1)
    pub semantic_index: u32,
    /// Attribute format
    pub format: Format,
    /// Byte offset within one vertex
    pub offset: u32,
}

impl InputElementDesc {
    pub fn new(semantic_name: impl Into<String>, semantic_index: u32, format: Format, offset: u32) -> Self {
        Self {
            semantic_name: semantic_name.into(),
            semantic_index,
            format,
            offset,
        }
    }

    /// One past the last byte this element reads
    pub fn end(&self) -> u32 {
        self.offset + self.format.size_bytes()
    }
}

/// Input layout resource trait
///
/// Implemented by backend-specific layout types. Immutable once created.
pub trait InputLayout: Send + Sync {
    /// Renderer that created this layout
    fn owner(&self) -> RendererId;

    /// Elements in declaration order
    fn elements(&self) -> &[InputElementDesc];

    /// Concrete type access for the owning backend
    fn as_any(&self) -> &dyn Any;

    /// Tight vertex size implied by the elements (used when a vertex buffer has stride 0)
    fn vertex_size(&self) -> u32 {
        layout_vertex_size(self.elements())
    }
}

/// Highest element end offset
pub fn layout_vertex_size(elements: &[InputElementDesc]) -> u32 {
    elements.iter().map(|e| e.end()).max().unwrap_or(0)
}

/// Validate a layout before any backend object is created
///
/// Rules: non-empty, at most `MAX_INPUT_ELEMENTS`, no `Format::Unknown`, non-empty
/// semantic names, 4-byte aligned offsets, and element byte ranges must not overlap.
pub fn validate_input_layout(elements: &[InputElementDesc]) -> Result<()> {
    if elements.is_empty() {
        crate::render_bail!("render_test::input_layout", InvalidLayout, "layout has no elements");
    }
    if elements.len() > MAX_INPUT_ELEMENTS {
        crate::render_bail!(
            "render_test::input_layout",
            InvalidLayout,
            "layout has {} elements (max {})",
            elements.len(),
            MAX_INPUT_ELEMENTS
        );
    }

    for (index, element) in elements.iter().enumerate() {
        if element.semantic_name.is_empty() {
            crate::render_bail!(
                "render_test::input_layout",
                InvalidLayout,
                "element {} has an empty semantic name",
                index
            );
        }
        if element.format == Format::Unknown {
            crate::render_bail!(
                "render_test::input_layout",
                InvalidLayout,
                "element {} ({}{}) has format Unknown",
                index,
                element.semantic_name,
                element.semantic_index
            );
        }
        if element.offset % 4 != 0 {
            crate::render_bail!(
                "render_test::input_layout",
                InvalidLayout,
                "element {} ({}{}) offset {} is not 4-byte aligned",
                index,
                element.semantic_name,
                element.semantic_index,
                element.offset
            );
        }
    }

    for (i, a) in elements.iter().enumerate() {
        for (j, b) in elements.iter().enumerate().skip(i + 1) {
            if a.offset < b.end() && b.offset < a.end() {
                crate::render_bail!(
                    "render_test::input_layout",
                    InvalidLayout,
                    "element {} [{}..{}) overlaps element {} [{}..{})",
                    j,
                    b.offset,
                    b.end(),
                    i,
                    a.offset,
                    a.end()
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "input_layout_tests.rs"]
mod tests;
