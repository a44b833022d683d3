//! Unit tests for shader.rs
//!
//! Tests profile classification, source classification and request validation.

use crate::error::Error;
use crate::renderer::shader::*;

fn src() -> SourceInfo {
    SourceInfo::text("triangle.slang", "// shader")
}

// ============================================================================
// SHADER STAGE
// ============================================================================

#[test]
fn test_stage_from_profile() {
    assert_eq!(ShaderStage::from_profile("vs_5_0"), Some(ShaderStage::Vertex));
    assert_eq!(ShaderStage::from_profile("vertex"), Some(ShaderStage::Vertex));
    assert_eq!(ShaderStage::from_profile("ps_5_0"), Some(ShaderStage::Fragment));
    assert_eq!(ShaderStage::from_profile("fs"), Some(ShaderStage::Fragment));
    assert_eq!(ShaderStage::from_profile("PIXEL"), Some(ShaderStage::Fragment));
    assert_eq!(ShaderStage::from_profile("cs_6_0"), Some(ShaderStage::Compute));
    assert_eq!(ShaderStage::from_profile("gs_5_0"), None);
    assert_eq!(ShaderStage::from_profile(""), None);
}

#[test]
fn test_stage_flags() {
    assert_eq!(ShaderStage::Vertex.flag() | ShaderStage::Fragment.flag(), ShaderStageFlags::GRAPHICS);
    assert!(!ShaderStageFlags::GRAPHICS.contains(ShaderStageFlags::COMPUTE));
}

// ============================================================================
// SOURCE INFO
// ============================================================================

#[test]
fn test_from_buffer_with_terminator_is_text() {
    let buffer = b"float4 main();\0".to_vec();
    let info = SourceInfo::from_buffer("a.slang", buffer, 14).unwrap();
    assert_eq!(info.data, SourceData::Text("float4 main();".to_string()));
    assert_eq!(info.as_text(), Some("float4 main();"));
}

#[test]
fn test_from_buffer_at_end_is_binary() {
    let bytes = vec![0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
    let info = SourceInfo::from_buffer("a.spv", bytes.clone(), bytes.len()).unwrap();
    assert_eq!(info.data, SourceData::Binary(bytes));
    assert!(info.as_text().is_none());
}

#[test]
fn test_spirv_ending_in_zero_byte_stays_binary() {
    // header plus a trailing OpFunctionEnd, whose last LE byte is 0x00
    let words: [u32; 6] = [0x0723_0203, 0x0001_0000, 0, 8, 0, 0x0001_0038];
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    assert_eq!(bytes.last(), Some(&0));

    let info = SourceInfo::from_buffer("shader.spv", bytes.clone(), bytes.len()).unwrap();
    assert_eq!(info.data, SourceData::Binary(bytes));
    assert!(matches!(&info.data, SourceData::Binary(b) if b.len() == 24));
}

#[test]
fn test_from_buffer_data_end_without_terminator_is_rejected() {
    let result = SourceInfo::from_buffer("a.slang", b"abc".to_vec(), 1);
    assert!(matches!(result, Err(Error::Compile(_))));
    let result = SourceInfo::from_buffer("a.slang", b"abc".to_vec(), 9);
    assert!(matches!(result, Err(Error::Compile(_))));
}

#[test]
fn test_from_buffer_invalid_utf8_text_is_rejected() {
    let result = SourceInfo::from_buffer("bad.slang", vec![0xff, 0xfe, 0x00], 2);
    assert!(matches!(result, Err(Error::Compile(_))));
}

// ============================================================================
// REQUEST VALIDATION
// ============================================================================

#[test]
fn test_graphics_request_is_valid() {
    let request = ShaderCompileRequest::graphics(
        src(),
        EntryPoint::new("vertexMain", "vs_5_0"),
        EntryPoint::new("fragmentMain", "ps_5_0"),
    );
    assert_eq!(request.validate().unwrap(), ShaderStageFlags::GRAPHICS);
    assert_eq!(request.entry_points().count(), 2);
}

#[test]
fn test_compute_request_is_valid() {
    let request = ShaderCompileRequest::compute(src(), EntryPoint::new("computeMain", "cs_5_0"))
        .with_type_arguments(["float", "int"]);
    assert_eq!(request.validate().unwrap(), ShaderStageFlags::COMPUTE);
    assert_eq!(request.entry_point_type_arguments, vec!["float", "int"]);
}

#[test]
fn test_request_without_entry_points_is_rejected() {
    let request = ShaderCompileRequest {
        source: src(),
        ..Default::default()
    };
    assert!(matches!(request.validate(), Err(Error::Compile(_))));
}

#[test]
fn test_compute_with_graphics_is_rejected() {
    let mut request = ShaderCompileRequest::graphics(
        src(),
        EntryPoint::new("vertexMain", "vs_5_0"),
        EntryPoint::new("fragmentMain", "ps_5_0"),
    );
    request.compute_shader = Some(EntryPoint::new("computeMain", "cs_5_0"));
    assert!(matches!(request.validate(), Err(Error::Compile(_))));
}

#[test]
fn test_vertex_without_fragment_is_rejected() {
    let request = ShaderCompileRequest {
        source: src(),
        vertex_shader: Some(EntryPoint::new("vertexMain", "vs_5_0")),
        ..Default::default()
    };
    assert!(matches!(request.validate(), Err(Error::Compile(_))));
}

#[test]
fn test_profile_in_wrong_slot_is_rejected() {
    let request = ShaderCompileRequest::graphics(
        src(),
        EntryPoint::new("vertexMain", "ps_5_0"),
        EntryPoint::new("fragmentMain", "ps_5_0"),
    );
    match request.validate() {
        Err(Error::Compile(msg)) => assert!(msg.contains("vertexMain")),
        other => panic!("expected Compile error, got {:?}", other),
    }
}

#[test]
fn test_entry_point_source_overrides_program_source() {
    let own = SourceInfo::binary("compute.spv", vec![1, 2, 3, 4]);
    let entry = EntryPoint::new("main", "cs").with_source(own.clone());
    let request = ShaderCompileRequest::compute(SourceInfo::default(), entry);
    let compute = request.compute_shader.as_ref().unwrap();
    assert_eq!(request.source_for(compute), &own);
    assert!(request.validate().is_ok());
}

#[test]
fn test_entry_point_without_any_source_is_rejected() {
    let request = ShaderCompileRequest::compute(SourceInfo::default(), EntryPoint::new("main", "cs"));
    assert!(matches!(request.validate(), Err(Error::Compile(_))));
}
