//! Host platform abstraction
//!
//! Bootstrap code never links against graphics libraries directly. Every
//! entry point is resolved at runtime through a [`HostPlatform`], which also
//! provides the hidden window some swap chains need. Tests substitute a fake.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::error::HostError;

/// Hidden native window used only as bootstrap scaffolding
///
/// The window is destroyed when the value is dropped.
pub trait HostWindow: Send {
    /// Native handle (`HWND` on Windows)
    fn raw(&self) -> *mut c_void;
}

/// Module lookup, symbol resolution and window creation
pub trait HostPlatform: Send + Sync {
    /// Whether `module` is already resident in this process
    ///
    /// Must never load the library as a side effect.
    fn is_module_loaded(&self, module: &str) -> bool;

    /// Resolve an exported symbol from an already loaded module
    fn resolve(&self, module: &str, symbol: &str) -> Result<NonNull<c_void>, HostError>;

    /// Create a tiny hidden top-level window registered under `class_name`
    fn create_window(&self, class_name: &str) -> Result<Box<dyn HostWindow>, HostError>;
}

/// Resolve a symbol and reinterpret it as the function pointer type `F`
///
/// # Safety
/// `F` must be a function pointer type whose signature and calling
/// convention match the exported symbol.
pub unsafe fn resolve_fn<F: Copy, H: HostPlatform + ?Sized>(
    host: &H,
    module: &str,
    symbol: &str,
) -> Result<F, HostError> {
    debug_assert_eq!(
        std::mem::size_of::<F>(),
        std::mem::size_of::<*mut c_void>()
    );
    let addr = host.resolve(module, symbol)?.as_ptr();
    Ok(std::mem::transmute_copy::<*mut c_void, F>(&addr))
}
