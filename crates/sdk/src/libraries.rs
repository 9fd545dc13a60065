//! System graphics library names
//!
//! These must match the module names the host process actually loads. A
//! backend is only considered when its library is already resident.

use crate::api::Api;

#[cfg(windows)]
mod names {
    pub const D3D9: &str = "d3d9.dll";
    pub const D3D10: &str = "d3d10.dll";
    pub const D3D11: &str = "d3d11.dll";
    pub const D3D12: &str = "d3d12.dll";
    pub const DXGI: &str = "dxgi.dll";
    pub const OPENGL: &str = "opengl32.dll";
    pub const VULKAN: &str = "vulkan-1.dll";
}

// Direct3D never loads natively outside Windows; the names are kept so the
// presence probe simply reports the backend as absent.
#[cfg(not(windows))]
mod names {
    pub const D3D9: &str = "d3d9.dll";
    pub const D3D10: &str = "d3d10.dll";
    pub const D3D11: &str = "d3d11.dll";
    pub const D3D12: &str = "d3d12.dll";
    pub const DXGI: &str = "dxgi.dll";
    pub const OPENGL: &str = "libGL.so.1";
    pub const VULKAN: &str = "libvulkan.so.1";
}

pub use names::*;

/// Library whose presence selects `api`
pub const fn primary(api: Api) -> Option<&'static str> {
    match api {
        Api::Auto => None,
        Api::D3D9 => Some(D3D9),
        Api::D3D10 => Some(D3D10),
        Api::D3D11 => Some(D3D11),
        Api::D3D12 => Some(D3D12),
        Api::OpenGL => Some(OPENGL),
        Api::Vulkan => Some(VULKAN),
    }
}
