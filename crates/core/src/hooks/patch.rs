//! Patch service seam
//!
//! Backends never write code bytes themselves. They hand a target address
//! and a replacement function to a [`PatchService`] under a unique name and
//! get back a pointer that calls the original behaviour.

/// Error type for hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Hook '{0}' is already installed")]
    DuplicateName(String),

    #[error("Hook '{0}' not found")]
    NotFound(String),

    #[error("Invalid address: {0:x}")]
    InvalidAddress(usize),

    #[error("Memory protection failed: {0}")]
    MemoryProtection(String),

    #[error("Instruction relocation failed: {0}")]
    RelocationFailed(String),

    #[error("Failed to allocate trampoline near {0:x}")]
    TrampolineAllocation(usize),
}

/// Installs and removes call redirections
///
/// Implementations must make each individual operation atomic with respect
/// to other calls on the same service.
pub trait PatchService: Send + Sync {
    /// Prepare a redirection from `target` to `replacement` under `name`
    ///
    /// Returns the pointer to call for pass-through. The redirection is not
    /// live until [`activate`](Self::activate) is called.
    ///
    /// # Safety
    /// `target` must be executable code and `replacement` must have the same
    /// signature and calling convention.
    unsafe fn install_hook(
        &self,
        name: &str,
        target: *const (),
        replacement: *const (),
    ) -> Result<*const (), HookError>;

    /// Make an installed redirection live
    fn activate(&self, name: &str) -> Result<(), HookError>;

    /// Undo a redirection and forget its name
    fn remove_hook(&self, name: &str) -> Result<(), HookError>;

    /// Whether `name` is currently installed
    fn is_installed(&self, name: &str) -> bool;
}
