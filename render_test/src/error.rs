//! Error types for the render test harness
//!
//! This module defines the error taxonomy shared by every backend: initialization,
//! resource creation, layout validation, binding resolution, shader compilation and
//! capture failures, plus pipeline-state violations.

use std::fmt;

/// Result type for render test operations
pub type Result<T> = std::result::Result<T, Error>;

/// Render test errors
///
/// Every failure is deterministic for identical inputs, so none of these are retried.
#[derive(Debug, Clone)]
pub enum Error {
    /// Device, instance or surface could not be created (fatal to the test)
    InitializationFailed(String),

    /// Backend rejected a buffer size/flavor combination or its initial data
    ResourceCreation(String),

    /// Input layout element has an unsupported format or offset
    InvalidLayout(String),

    /// A shader input slot could not be resolved to a concrete binding
    BindingResolution(String),

    /// Shader compilation failed (propagated verbatim so tests can assert on it)
    Compile(String),

    /// Screenshot or buffer dump could not be read back or written
    Capture(String),

    /// Operation issued in the wrong lifecycle or pipeline state
    InvalidState(String),

    /// Handle created by another renderer, or of an unexpected concrete type
    InvalidResource(String),

    /// Backend-specific error (Vulkan, software, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            Error::InvalidLayout(msg) => write!(f, "Invalid input layout: {}", msg),
            Error::BindingResolution(msg) => write!(f, "Binding resolution failed: {}", msg),
            Error::Compile(msg) => write!(f, "Shader compilation failed: {}", msg),
            Error::Capture(msg) => write!(f, "Capture failed: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid renderer state: {}", msg),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
