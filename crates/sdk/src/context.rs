//! Normalized per-frame render context

use std::ffi::c_void;

use crate::api::Api;

/// Backend-tagged snapshot handed to the render callback
///
/// Only valid for the duration of the callback. Fields that do not apply to
/// the active backend are null/zero, so always branch on `api` before
/// interpreting any handle.
///
/// | api    | device              | swap_chain        | extra              |
/// |--------|---------------------|-------------------|--------------------|
/// | D3D9   | `IDirect3DDevice9*` | null              | null               |
/// | D3D10  | `ID3D10Device*`     | `IDXGISwapChain*` | null               |
/// | D3D11  | `ID3D11Device*`     | `IDXGISwapChain*` | null               |
/// | D3D12  | null                | `IDXGISwapChain3*`| `ID3D12CommandQueue*` |
/// | OpenGL | `HDC` / `Display*`  | GLX drawable      | null               |
/// | Vulkan | `VkDevice`          | `VkSwapchainKHR`  | `VkQueue`          |
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    pub api: Api,
    pub device: *mut c_void,
    pub command_buffer: *mut c_void,
    pub swap_chain: *mut c_void,
    pub render_target: *mut c_void,
    pub image_index: u32,
    pub extra: *mut c_void,
}

impl RenderContext {
    /// Empty context tagged with `api`
    pub const fn new(api: Api) -> Self {
        Self {
            api,
            device: std::ptr::null_mut(),
            command_buffer: std::ptr::null_mut(),
            swap_chain: std::ptr::null_mut(),
            render_target: std::ptr::null_mut(),
            image_index: 0,
            extra: std::ptr::null_mut(),
        }
    }

    pub const fn with_device(mut self, device: *mut c_void) -> Self {
        self.device = device;
        self
    }

    pub const fn with_swap_chain(mut self, swap_chain: *mut c_void) -> Self {
        self.swap_chain = swap_chain;
        self
    }

    pub const fn with_image_index(mut self, image_index: u32) -> Self {
        self.image_index = image_index;
        self
    }

    pub const fn with_extra(mut self, extra: *mut c_void) -> Self {
        self.extra = extra;
        self
    }
}
