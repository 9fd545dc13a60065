//! `dlopen`-based module lookup

use std::ffi::{c_void, CString};
use std::ptr::NonNull;

use crate::error::HostError;
use crate::platform::{HostPlatform, HostWindow};

/// Host backed by the dynamic loader
///
/// Modules are opened with `RTLD_NOLOAD`, so only libraries the process
/// already mapped are ever visible.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeHost;

impl NativeHost {
    pub const fn new() -> Self {
        Self
    }
}

/// Reference-counted handle to a resident module, closed on drop
struct Resident(NonNull<c_void>);

impl Resident {
    fn open(module: &str) -> Result<Self, HostError> {
        let name = CString::new(module).map_err(|_| HostError::InvalidName(module.into()))?;
        // SAFETY: `name` is a valid C string; RTLD_NOLOAD never maps a new image
        let handle = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_NOW | libc::RTLD_NOLOAD) };
        NonNull::new(handle)
            .map(Self)
            .ok_or_else(|| HostError::ModuleNotLoaded(module.into()))
    }
}

impl Drop for Resident {
    fn drop(&mut self) {
        // SAFETY: handle came from a successful dlopen
        unsafe {
            libc::dlclose(self.0.as_ptr());
        }
    }
}

impl HostPlatform for NativeHost {
    fn is_module_loaded(&self, module: &str) -> bool {
        Resident::open(module).is_ok()
    }

    fn resolve(&self, module: &str, symbol: &str) -> Result<NonNull<c_void>, HostError> {
        let resident = Resident::open(module)?;
        let name = CString::new(symbol).map_err(|_| HostError::InvalidName(symbol.into()))?;

        // The host keeps its own reference, so the address outlives `resident`
        // SAFETY: valid handle and C string
        let addr = unsafe { libc::dlsym(resident.0.as_ptr(), name.as_ptr()) };
        NonNull::new(addr).ok_or_else(|| HostError::SymbolNotFound {
            module: module.into(),
            symbol: symbol.into(),
        })
    }

    fn create_window(&self, _class_name: &str) -> Result<Box<dyn HostWindow>, HostError> {
        Err(HostError::Unsupported("hidden bootstrap windows"))
    }
}
