//! OpenGL backend
//!
//! There is no dispatch table to copy: the platform swap-buffers export is
//! resolved by name and hooked directly. The device context (an `HDC` on
//! Windows, the X `Display*` elsewhere) stands in for the device.

use std::ffi::c_void;

use framejack_host::HostPlatform;
use framejack_sdk::layout::opengl;
use framejack_sdk::{libraries, Api, Operation, RenderContext, SlotLayout};

use super::{Backend, Detour};
use crate::context::{self, SessionContext};
use crate::error::BootstrapError;
use crate::hooks::HookPoint;
use crate::table::MethodTable;

static SWAP_BUFFERS: HookPoint = HookPoint::new(opengl::SWAP_BUFFERS_SYMBOL);

pub struct OpenGL;

impl Backend for OpenGL {
    fn api(&self) -> Api {
        Api::OpenGL
    }

    fn layout(&self) -> &'static SlotLayout {
        &opengl::LAYOUT
    }

    fn required_module(&self) -> &'static str {
        libraries::OPENGL
    }

    fn extract(&self, host: &dyn HostPlatform) -> Result<MethodTable, BootstrapError> {
        let address = host.resolve(libraries::OPENGL, opengl::SWAP_BUFFERS_SYMBOL)?;
        let mut builder = MethodTable::builder(&opengl::LAYOUT);
        builder.push_address(address.as_ptr(), opengl::SWAP_BUFFERS_SYMBOL)?;
        builder.finish()
    }

    fn detour(&self, op: Operation) -> Option<Detour> {
        match op {
            Operation::Present => Some(Detour::new(swap_buffers as *const (), &SWAP_BUFFERS)),
            _ => None,
        }
    }
}

fn swap_event(session: &SessionContext, device: *mut c_void, drawable: *mut c_void) {
    let callbacks = session.callbacks();
    if session.state().claim_device(device) {
        tracing::info!("OpenGL device context observed at {:p}", device);
        callbacks.device_created(device);
    }
    session.state().set_swap_chain(drawable);
    callbacks.present();
    callbacks.render(|| {
        Some(
            RenderContext::new(Api::OpenGL)
                .with_device(device)
                .with_swap_chain(drawable),
        )
    });
}

#[cfg(windows)]
type SwapBuffersFn = unsafe extern "system" fn(hdc: *mut c_void) -> i32;

#[cfg(windows)]
unsafe extern "system" fn swap_buffers(hdc: *mut c_void) -> i32 {
    if let Some(session) = context::active_for(Api::OpenGL) {
        swap_event(&session, hdc, std::ptr::null_mut());
    }

    match SWAP_BUFFERS.original::<SwapBuffersFn>() {
        Some(original) => original(hdc),
        None => 0,
    }
}

#[cfg(not(windows))]
type SwapBuffersFn = unsafe extern "C" fn(display: *mut c_void, drawable: std::ffi::c_ulong);

#[cfg(not(windows))]
unsafe extern "C" fn swap_buffers(display: *mut c_void, drawable: std::ffi::c_ulong) {
    if let Some(session) = context::active_for(Api::OpenGL) {
        swap_event(&session, display, drawable as usize as *mut c_void);
    }

    if let Some(original) = SWAP_BUFFERS.original::<SwapBuffersFn>() {
        original(display, drawable);
    }
}
