//! Backend strategies
//!
//! One [`Backend`] per graphics API supplies the three things that differ
//! between APIs: which library must already be loaded, how to build a
//! throwaway object graph to copy dispatch tables from, and the detour for
//! each hooked operation. Everything else (scheduling, retry, hook
//! installation, rollback) lives in the shared [`Adapter`].

mod adapter;
mod com;
mod d3d10;
mod d3d11;
mod d3d12;
mod d3d9;
mod dxgi;
mod opengl;
mod vulkan;

use framejack_host::HostPlatform;
use framejack_sdk::{Api, Operation, SlotLayout};

use crate::context::CapturedState;
use crate::error::BootstrapError;
use crate::hooks::HookPoint;
use crate::table::MethodTable;

pub use adapter::{Adapter, BootstrapState};

/// Replacement function for one hooked operation
#[derive(Debug, Clone, Copy)]
pub struct Detour {
    /// Address of the `extern` replacement function
    pub replacement: *const (),
    /// Where the replacement finds its pass-through pointer
    pub point: &'static HookPoint,
}

// SAFETY: `replacement` is the address of a function item, never data
unsafe impl Send for Detour {}
unsafe impl Sync for Detour {}

impl Detour {
    pub const fn new(replacement: *const (), point: &'static HookPoint) -> Self {
        Self { replacement, point }
    }
}

/// API-specific part of a backend adapter
pub trait Backend: Send + Sync {
    fn api(&self) -> Api;

    /// Layout the extracted table follows
    fn layout(&self) -> &'static SlotLayout;

    /// Library that must already be resident for this backend to apply
    fn required_module(&self) -> &'static str;

    /// Build a throwaway object graph and copy its dispatch tables
    ///
    /// Every object and window created here is released before returning,
    /// on success and on failure.
    fn extract(&self, host: &dyn HostPlatform) -> Result<MethodTable, BootstrapError>;

    /// Detour for a hooked operation
    fn detour(&self, op: Operation) -> Option<Detour>;

    /// Drop references the detours retained in `state`
    fn release_captured(&self, _state: &CapturedState) {}
}

/// Strategy for a concrete API
pub fn for_api(api: Api) -> Option<Box<dyn Backend>> {
    Some(match api {
        Api::Auto => return None,
        Api::D3D9 => Box::new(d3d9::D3D9),
        Api::D3D10 => Box::new(d3d10::D3D10),
        Api::D3D11 => Box::new(d3d11::D3D11),
        Api::D3D12 => Box::new(d3d12::D3D12),
        Api::OpenGL => Box::new(opengl::OpenGL),
        Api::Vulkan => Box::new(vulkan::Vulkan),
    })
}
