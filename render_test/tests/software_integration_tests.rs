//! End-to-end tests driving the software backend through the plugin registry
//!
//! Each test runs one complete render-test case: create a renderer, build resources,
//! bind, draw or dispatch, and capture the result. No GPU required.
//!
//! Run with: cargo test --test software_integration_tests

use render_test::{
    create_renderer, BufferDesc, BufferFlavor, EntryPoint, Error, Format, InputElementDesc,
    MapFlavor, PrimitiveTopology, Renderer, RendererConfig, RendererType, ShaderCompileRequest,
    ShaderInputLayout, SourceInfo,
};
use serial_test::serial;
use std::path::Path;

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];

fn software_renderer(width: u32, height: u32) -> Box<dyn Renderer> {
    let config = RendererConfig {
        width,
        height,
        ..Default::default()
    };
    let mut renderer = create_renderer(RendererType::Software, config).unwrap();
    renderer.initialize(None).unwrap();
    renderer
}

fn source() -> SourceInfo {
    SourceInfo::text("triangle.slang", "// native kernels")
}

fn floats(values: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// Render the reference triangle and write it to `path`
///
/// Three `RG_Float32` positions in a single element at offset 0; with no color
/// attribute the default fragment kernel writes opaque white.
fn render_triangle(path: &Path) {
    let mut renderer = software_renderer(64, 64);
    renderer.set_clear_color([0.0, 0.0, 0.0, 1.0]);
    renderer.clear_frame().unwrap();

    let vertices = floats(&[-0.5, -0.5, 0.5, -0.5, 0.0, 0.5]);
    let vertex_buffer = renderer
        .create_buffer(&BufferDesc::with_data(BufferFlavor::Vertex, &vertices))
        .unwrap();
    let layout = renderer
        .create_input_layout(&[InputElementDesc::new("A", 0, Format::RG_Float32, 0)])
        .unwrap();
    let program = renderer
        .shader_compiler()
        .unwrap()
        .compile_program(&ShaderCompileRequest::graphics(
            source(),
            EntryPoint::new("main", "vs_5_0"),
            EntryPoint::new("main", "ps_5_0"),
        ))
        .unwrap();
    let bindings = renderer.create_binding_state(&ShaderInputLayout::new()).unwrap();

    renderer.set_input_layout(&layout).unwrap();
    renderer.set_primitive_topology(PrimitiveTopology::TriangleList).unwrap();
    renderer.set_vertex_buffer(0, &vertex_buffer, 8, 0).unwrap();
    renderer.set_shader_program(&program).unwrap();
    renderer.set_binding_state(&bindings).unwrap();
    renderer.draw(3, 0).unwrap();
    renderer.present_frame().unwrap();
    renderer.capture_screen_shot(path).unwrap();
}

// ============================================================================
// DRAW
// ============================================================================

#[test]
#[serial]
fn test_integration_triangle_capture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triangle.png");
    render_triangle(&path);

    let image = image::open(&path).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (64, 64));
    assert_eq!(image.get_pixel(32, 36).0, WHITE);
    assert_eq!(image.get_pixel(32, 10).0, BACKGROUND);
    for (x, y) in [(0, 0), (63, 0), (0, 63), (63, 63)] {
        assert_eq!(image.get_pixel(x, y).0, BACKGROUND, "corner ({}, {})", x, y);
    }
}

#[test]
#[serial]
fn test_integration_triangle_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.png");
    let second = dir.path().join("second.png");
    render_triangle(&first);
    render_triangle(&second);

    let a = image::open(&first).unwrap().to_rgba8();
    let b = image::open(&second).unwrap().to_rgba8();
    assert_eq!(a.as_raw(), b.as_raw());
}

// ============================================================================
// COMPUTE
// ============================================================================

#[test]
#[serial]
fn test_integration_compute_only_dispatch() {
    let mut kernels = render_test::KernelRegistry::new();
    kernels.register_compute("computeMain", [4, 1, 1], |invocation, resources| {
        let i = invocation.dispatch_thread_id.x as usize;
        if let Some(value) = resources.load_f32(0, i) {
            resources.store_f32(0, i, value * 2.0);
        }
    });
    let mut renderer = render_test::SoftwareRenderer::with_kernels(RendererConfig::default(), kernels);
    renderer.initialize(None).unwrap();

    let layout = ShaderInputLayout::parse(
        "//TEST_INPUT: ubuffer(data=[1.0 2.0 3.0 4.0], stride=4):binding(0),out,name=outputBuffer\n",
    )
    .unwrap();
    let state = renderer.create_binding_state(&layout).unwrap();
    let program = renderer
        .shader_compiler()
        .unwrap()
        .compile_program(&ShaderCompileRequest::compute(source(), EntryPoint::new("computeMain", "cs_5_0")))
        .unwrap();
    renderer.set_binding_state(&state).unwrap();
    renderer.set_shader_program(&program).unwrap();
    renderer.dispatch_compute(1, 1, 1).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compute.txt");
    renderer.serialize_output(&state, &path).unwrap();

    let expected: String = [2.0f32, 4.0, 6.0, 8.0]
        .iter()
        .map(|v| format!("{:X}\n", v.to_bits()))
        .collect();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
}

// ============================================================================
// RESOURCES
// ============================================================================

#[test]
#[serial]
fn test_integration_buffer_readback() {
    let mut renderer = software_renderer(8, 8);
    let data: Vec<u8> = (0..=255).collect();
    let buffer = renderer
        .create_buffer(&BufferDesc::with_data(BufferFlavor::Storage, &data))
        .unwrap();

    let mapping = renderer.map(&buffer, MapFlavor::HostRead).unwrap();
    assert_eq!(&mapping[..], &data[..]);
    renderer.unmap(mapping).unwrap();
    assert!(!buffer.is_mapped());
}

#[test]
#[serial]
fn test_integration_double_map_is_rejected() {
    let mut renderer = software_renderer(8, 8);
    let buffer = renderer.create_buffer(&BufferDesc::new(32, BufferFlavor::Constant)).unwrap();

    let first = renderer.map(&buffer, MapFlavor::WriteDiscard).unwrap();
    assert!(matches!(renderer.map(&buffer, MapFlavor::HostRead), Err(Error::InvalidState(_))));
    renderer.unmap(first).unwrap();
}

#[test]
#[serial]
fn test_integration_invalid_layout_is_rejected() {
    let mut renderer = software_renderer(8, 8);
    let unknown = renderer.create_input_layout(&[InputElementDesc::new("A", 0, Format::Unknown, 0)]);
    assert!(matches!(unknown, Err(Error::InvalidLayout(_))));

    let misaligned = renderer.create_input_layout(&[InputElementDesc::new("A", 0, Format::RG_Float32, 2)]);
    assert!(matches!(misaligned, Err(Error::InvalidLayout(_))));
}

#[test]
#[serial]
fn test_integration_foreign_handles_are_rejected() {
    let mut first = software_renderer(8, 8);
    let mut second = software_renderer(8, 8);
    let foreign = second
        .create_buffer(&BufferDesc::new(16, BufferFlavor::Constant))
        .unwrap();
    let foreign_state = second.create_binding_state(&ShaderInputLayout::new()).unwrap();

    assert!(matches!(first.set_constant_buffer(0, &foreign, 0), Err(Error::InvalidResource(_))));
    assert!(matches!(first.set_binding_state(&foreign_state), Err(Error::InvalidResource(_))));
}
