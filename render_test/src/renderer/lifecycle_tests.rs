//! Unit tests for lifecycle.rs

use crate::error::Error;
use crate::renderer::lifecycle::{LifecycleState, RendererLifecycle};

#[test]
fn test_starts_uninitialized() {
    let lifecycle = RendererLifecycle::new();
    assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
    assert!(!lifecycle.is_initialized());
}

#[test]
fn test_operations_before_initialize_are_rejected() {
    let mut lifecycle = RendererLifecycle::new();
    assert!(matches!(lifecycle.require_initialized("clear_frame"), Err(Error::InvalidState(_))));
    assert!(matches!(lifecycle.mark_bound("set_input_layout"), Err(Error::InvalidState(_))));
    assert!(matches!(lifecycle.mark_executed("draw"), Err(Error::InvalidState(_))));
    assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
}

#[test]
fn test_double_initialize_is_rejected() {
    let mut lifecycle = RendererLifecycle::new();
    lifecycle.mark_initialized().unwrap();
    assert!(matches!(lifecycle.mark_initialized(), Err(Error::InvalidState(_))));
}

#[test]
fn test_full_round_and_rebind() {
    let mut lifecycle = RendererLifecycle::default();
    lifecycle.mark_initialized().unwrap();
    lifecycle.mark_bound("set_shader_program").unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Bound);
    lifecycle.mark_executed("draw").unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Executed);
    lifecycle.mark_presented("present_frame").unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Presented);
    lifecycle.mark_bound("set_binding_state").unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Bound);
}
