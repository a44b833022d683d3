/// Renderer lifecycle tracking
///
/// `Uninitialized → Initialized → Bound → Executed → Presented`. State setters move to
/// `Bound`, draw/dispatch to `Executed`, present/capture to `Presented`; a new setter
/// after execution starts the next round at `Bound`.

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Bound,
    Executed,
    Presented,
}

#[derive(Debug)]
pub struct RendererLifecycle {
    state: LifecycleState,
}

impl Default for RendererLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererLifecycle {
    pub fn new() -> Self {
        Self { state: LifecycleState::Uninitialized }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state >= LifecycleState::Initialized
    }

    /// Fails with `InvalidState` unless `initialize` has never succeeded
    pub fn ensure_uninitialized(&self) -> Result<()> {
        if self.is_initialized() {
            crate::render_bail!("render_test::lifecycle", InvalidState, "renderer is already initialized");
        }
        Ok(())
    }

    /// Fails with `InvalidState` before `initialize` has succeeded
    pub fn require_initialized(&self, operation: &str) -> Result<()> {
        if !self.is_initialized() {
            crate::render_bail!(
                "render_test::lifecycle",
                InvalidState,
                "{} called before initialize",
                operation
            );
        }
        Ok(())
    }

    pub fn mark_initialized(&mut self) -> Result<()> {
        self.ensure_uninitialized()?;
        self.state = LifecycleState::Initialized;
        Ok(())
    }

    pub fn mark_bound(&mut self, operation: &str) -> Result<()> {
        self.require_initialized(operation)?;
        self.state = LifecycleState::Bound;
        Ok(())
    }

    pub fn mark_executed(&mut self, operation: &str) -> Result<()> {
        self.require_initialized(operation)?;
        self.state = LifecycleState::Executed;
        Ok(())
    }

    pub fn mark_presented(&mut self, operation: &str) -> Result<()> {
        self.require_initialized(operation)?;
        self.state = LifecycleState::Presented;
        Ok(())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
