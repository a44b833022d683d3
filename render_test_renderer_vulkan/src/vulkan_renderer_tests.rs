//! Unit tests for vulkan_renderer.rs
//!
//! Only behavior that does not touch a device; GPU paths live in tests/.

use super::*;
use render_test::{BufferFlavor, Error, LifecycleState};

fn uninitialized() -> VulkanRenderer {
    VulkanRenderer::new(RendererConfig {
        width: 16,
        height: 16,
        ..Default::default()
    })
}

#[test]
fn test_new_creates_no_device() {
    let renderer = uninitialized();
    assert_eq!(renderer.renderer_type(), RendererType::Vulkan);
    assert_eq!(renderer.lifecycle().state(), LifecycleState::Uninitialized);
    assert!(renderer.device_name().is_none());
}

#[test]
fn test_ids_are_distinct() {
    assert_ne!(uninitialized().id(), uninitialized().id());
}

#[test]
fn test_operations_before_initialize_fail() {
    let mut renderer = uninitialized();
    assert!(matches!(
        renderer.create_buffer(&BufferDesc::new(16, BufferFlavor::Storage)),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(renderer.clear_frame(), Err(Error::InvalidState(_))));
    assert!(matches!(renderer.draw(3, 0), Err(Error::InvalidState(_))));
    assert!(matches!(renderer.dispatch_compute(1, 1, 1), Err(Error::InvalidState(_))));
    assert!(matches!(renderer.shader_compiler(), Err(Error::InvalidState(_))));
}

#[test]
fn test_empty_target_fails_before_touching_vulkan() {
    let mut renderer = VulkanRenderer::new(RendererConfig {
        width: 0,
        height: 8,
        ..Default::default()
    });
    assert!(matches!(renderer.initialize(None), Err(Error::InitializationFailed(_))));
    assert_eq!(renderer.lifecycle().state(), LifecycleState::Uninitialized);
}
