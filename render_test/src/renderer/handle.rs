/// Renderer identity and handle ownership checks
///
/// Every resource records the `RendererId` of the renderer that created it. Renderers
/// reject handles minted by another instance before touching backend objects.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::error::Result;

/// Process-unique identifier of a renderer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererId(u64);

impl RendererId {
    /// Mint a fresh id (never returns the same value twice in a process)
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RendererId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "renderer#{}", self.0)
    }
}

/// Fail with `InvalidResource` unless `actual` matches the renderer that is asking
pub fn check_owner(expected: RendererId, actual: RendererId, what: &str) -> Result<()> {
    if expected != actual {
        crate::render_bail!(
            "render_test::handle",
            InvalidResource,
            "{} belongs to {}, not {}",
            what,
            actual,
            expected
        );
    }
    Ok(())
}

/// Downcast a resource to the backend's concrete type
pub fn downcast_resource<'a, T: Any>(resource: &'a dyn Any, what: &str) -> Result<&'a T> {
    match resource.downcast_ref::<T>() {
        Some(concrete) => Ok(concrete),
        None => Err(crate::render_fail!(
            "render_test::handle",
            InvalidResource,
            "{} is not a {}",
            what,
            std::any::type_name::<T>()
        )),
    }
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
