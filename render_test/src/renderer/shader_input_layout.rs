/// Shader input layout: the resources a test binds, and the `//TEST_INPUT:` parser
///
/// Test shaders declare their inputs in comment lines:
///
/// ```text
/// //TEST_INPUT: cbuffer(data=[1.0 0.5 0.25 1.0]):binding(0)
/// //TEST_INPUT: ubuffer(data=[0 0 0 0], stride=4):binding(1),out,name=result
/// ```

use crate::error::Result;

const TEST_INPUT_PREFIX: &str = "//TEST_INPUT:";

/// Kind of resource an entry binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderInputType {
    /// `cbuffer(...)`
    ConstantBuffer,
    /// `ubuffer(...)`: read/write structured buffer
    StorageBuffer,
}

/// One declared shader input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderInputLayoutEntry {
    pub input_type: ShaderInputType,
    /// Binding slot; `None` means the declaration never named one
    pub binding: Option<u32>,
    /// Initial contents as 32-bit words
    pub data: Vec<u32>,
    /// Element stride in bytes (0 = raw words)
    pub stride: u32,
    /// Buffer is dumped by `Renderer::serialize_output`
    pub is_output: bool,
    pub name: Option<String>,
}

impl ShaderInputLayoutEntry {
    pub fn constant_buffer(binding: u32, data: Vec<u32>) -> Self {
        Self {
            input_type: ShaderInputType::ConstantBuffer,
            binding: Some(binding),
            data,
            stride: 0,
            is_output: false,
            name: None,
        }
    }

    pub fn storage_buffer(binding: u32, data: Vec<u32>) -> Self {
        Self {
            input_type: ShaderInputType::StorageBuffer,
            binding: Some(binding),
            data,
            stride: 4,
            is_output: false,
            name: None,
        }
    }

    /// Mark as an output buffer
    pub fn output(mut self) -> Self {
        self.is_output = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Initial contents as little-endian bytes
    pub fn byte_data(&self) -> Vec<u8> {
        self.data.iter().flat_map(|word| word.to_le_bytes()).collect()
    }
}

/// Ordered list of shader inputs for one test
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderInputLayout {
    pub entries: Vec<ShaderInputLayoutEntry>,
}

impl ShaderInputLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ShaderInputLayoutEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Collect every `//TEST_INPUT:` line in `source`
    pub fn parse(source: &str) -> Result<Self> {
        let mut layout = Self::new();
        for (line_number, line) in source.lines().enumerate() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix(TEST_INPUT_PREFIX) {
                let entry = parse_entry(rest.trim()).map_err(|message| {
                    crate::render_fail!(
                        "render_test::shader_input_layout",
                        BindingResolution,
                        "line {}: {}",
                        line_number + 1,
                        message
                    )
                })?;
                layout.entries.push(entry);
            }
        }
        Ok(layout)
    }

    /// Entries sorted by binding slot, after checking every slot is resolvable
    ///
    /// Fails with `BindingResolution` for a missing slot, a slot declared twice, or an
    /// entry with no data.
    pub fn resolved_entries(&self) -> Result<Vec<&ShaderInputLayoutEntry>> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut entries = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            let binding = match entry.binding {
                Some(binding) => binding,
                None => crate::render_bail!(
                    "render_test::shader_input_layout",
                    BindingResolution,
                    "entry {} has no binding slot",
                    index
                ),
            };
            if !seen.insert(binding) {
                crate::render_bail!(
                    "render_test::shader_input_layout",
                    BindingResolution,
                    "binding {} declared twice",
                    binding
                );
            }
            if entry.data.is_empty() {
                crate::render_bail!(
                    "render_test::shader_input_layout",
                    BindingResolution,
                    "binding {} has no data",
                    binding
                );
            }
            entries.push(entry);
        }
        entries.sort_by_key(|entry| entry.binding);
        Ok(entries)
    }
}

// ===== PARSER =====

type ParseResult<T> = std::result::Result<T, String>;

fn parse_entry(text: &str) -> ParseResult<ShaderInputLayoutEntry> {
    let open = text.find('(').ok_or_else(|| format!("expected '(' in '{}'", text))?;
    let kind = text[..open].trim();
    let input_type = match kind {
        "cbuffer" => ShaderInputType::ConstantBuffer,
        "ubuffer" => ShaderInputType::StorageBuffer,
        other => return Err(format!("unsupported input kind '{}'", other)),
    };
    let close = matching_paren(text, open)?;

    let mut entry = ShaderInputLayoutEntry {
        input_type,
        binding: None,
        data: Vec::new(),
        stride: if input_type == ShaderInputType::StorageBuffer { 4 } else { 0 },
        is_output: false,
        name: None,
    };
    let mut size_words: Option<usize> = None;

    for option in split_top_level(&text[open + 1..close]) {
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, found '{}'", option))?;
        match key.trim() {
            "data" => entry.data = parse_data(value.trim())?,
            "stride" => entry.stride = parse_u32(value.trim())?,
            "size" => size_words = Some(parse_u32(value.trim())? as usize),
            other => return Err(format!("unknown option '{}'", other)),
        }
    }
    if let Some(words) = size_words {
        if entry.data.len() > words {
            return Err(format!("data has {} words but size is {}", entry.data.len(), words));
        }
        entry.data.resize(words, 0);
    }

    let attributes = text[close + 1..].trim();
    let attributes = match attributes.strip_prefix(':') {
        Some(rest) => rest,
        None if attributes.is_empty() => "",
        None => return Err(format!("expected ':' before '{}'", attributes)),
    };
    for attribute in split_top_level(attributes) {
        if attribute == "out" {
            entry.is_output = true;
        } else if let Some(name) = attribute.strip_prefix("name=") {
            entry.name = Some(name.trim().to_string());
        } else if let Some(slot) = parse_binding_attribute(attribute)? {
            if let Some(existing) = entry.binding {
                if existing != slot {
                    return Err(format!("conflicting bindings {} and {}", existing, slot));
                }
            }
            entry.binding = Some(slot);
        } else {
            return Err(format!("unknown attribute '{}'", attribute));
        }
    }

    Ok(entry)
}

/// `binding(N)`, `dxbinding(N)` or `glbinding(N)`
fn parse_binding_attribute(attribute: &str) -> ParseResult<Option<u32>> {
    for prefix in ["binding(", "dxbinding(", "glbinding("] {
        if let Some(rest) = attribute.strip_prefix(prefix) {
            let inner = rest
                .strip_suffix(')')
                .ok_or_else(|| format!("unterminated '{}'", attribute))?;
            return parse_u32(inner.trim()).map(Some);
        }
    }
    Ok(None)
}

fn matching_paren(text: &str, open: usize) -> ParseResult<usize> {
    let mut depth = 0usize;
    for (offset, c) in text[open..].char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && c == ')' {
                    return Ok(open + offset);
                }
            }
            _ => {}
        }
    }
    Err(format!("unbalanced parentheses in '{}'", text))
}

/// Split on commas that are not nested inside brackets or parentheses
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.into_iter().filter(|part| !part.is_empty()).collect()
}

fn parse_data(value: &str) -> ParseResult<Vec<u32>> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| format!("data must be a [..] list, found '{}'", value))?;
    inner
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|item| !item.is_empty())
        .map(parse_word)
        .collect()
}

/// Decimal, `0x` hex, negative integer, or float literal stored as IEEE bits
fn parse_word(item: &str) -> ParseResult<u32> {
    if let Some(hex) = item.strip_prefix("0x").or_else(|| item.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).map_err(|e| format!("bad hex '{}': {}", item, e));
    }
    let is_float = item.contains('.') || item.contains('e') || item.contains('E') || item.ends_with('f');
    if is_float {
        let literal = item.strip_suffix('f').unwrap_or(item);
        return literal
            .parse::<f32>()
            .map(f32::to_bits)
            .map_err(|e| format!("bad float '{}': {}", item, e));
    }
    if item.starts_with('-') {
        return item
            .parse::<i32>()
            .map(|v| v as u32)
            .map_err(|e| format!("bad integer '{}': {}", item, e));
    }
    item.parse::<u32>().map_err(|e| format!("bad integer '{}': {}", item, e))
}

fn parse_u32(value: &str) -> ParseResult<u32> {
    value.parse::<u32>().map_err(|e| format!("bad number '{}': {}", value, e))
}

#[cfg(test)]
#[path = "shader_input_layout_tests.rs"]
mod tests;
