//! Direct3D 9 backend
//!
//! D3D9 has no swap-chain present to hook reliably across runtimes, so
//! `EndScene` stands in as the frame boundary.

use std::ffi::c_void;

use framejack_host::{resolve_fn, HostPlatform};
use framejack_sdk::d3d::{
    self, Direct3D9CreateDeviceFn, Direct3DCreate9Fn, EndSceneFn, ResetFn, D3DPRESENT_PARAMETERS,
    HRESULT,
};
use framejack_sdk::layout::d3d9;
use framejack_sdk::{libraries, Api, Operation, RenderContext, SlotLayout};

use super::com::{self, ComPtr};
use super::{Backend, Detour};
use crate::context;
use crate::error::BootstrapError;
use crate::hooks::HookPoint;
use crate::table::MethodTable;

static END_SCENE: HookPoint = HookPoint::new("D3D9EndScene");
static RESET: HookPoint = HookPoint::new("D3D9Reset");

pub struct D3D9;

impl Backend for D3D9 {
    fn api(&self) -> Api {
        Api::D3D9
    }

    fn layout(&self) -> &'static SlotLayout {
        &d3d9::LAYOUT
    }

    fn required_module(&self) -> &'static str {
        libraries::D3D9
    }

    fn extract(&self, host: &dyn HostPlatform) -> Result<MethodTable, BootstrapError> {
        let window = host.create_window("FrameJackD3D9")?;

        // SAFETY: the export matches Direct3DCreate9Fn and CreateDevice sits
        // at its documented IDirect3D9 slot
        unsafe {
            let create: Direct3DCreate9Fn = resolve_fn(host, libraries::D3D9, "Direct3DCreate9")?;
            let d3d = ComPtr::from_raw(create(d3d::D3D_SDK_VERSION))
                .ok_or(BootstrapError::NullObject("Direct3DCreate9"))?;

            let mut params = D3DPRESENT_PARAMETERS {
                back_buffer_width: 0,
                back_buffer_height: 0,
                back_buffer_format: d3d::D3DFMT_UNKNOWN,
                back_buffer_count: 0,
                multi_sample_type: d3d::D3DMULTISAMPLE_NONE,
                multi_sample_quality: 0,
                swap_effect: d3d::D3DSWAPEFFECT_DISCARD,
                device_window: window.raw(),
                windowed: 1,
                enable_auto_depth_stencil: 0,
                auto_depth_stencil_format: 0,
                flags: 0,
                full_screen_refresh_rate_in_hz: 0,
                presentation_interval: 0,
            };
            let create_device: Direct3D9CreateDeviceFn = d3d.method(d3d::d3d9::CREATE_DEVICE);
            let device = com::create("IDirect3D9::CreateDevice", |out| {
                create_device(
                    d3d.as_ptr(),
                    d3d::D3DADAPTER_DEFAULT,
                    d3d::D3DDEVTYPE_NULLREF,
                    window.raw(),
                    d3d::D3DCREATE_SOFTWARE_VERTEXPROCESSING | d3d::D3DCREATE_DISABLE_DRIVER_MANAGEMENT,
                    &mut params,
                    out,
                )
            })?;

            let mut builder = MethodTable::builder(&d3d9::LAYOUT);
            builder.copy_vtable(device.as_ptr(), "IDirect3DDevice9")?;
            builder.finish()
        }
    }

    fn detour(&self, op: Operation) -> Option<Detour> {
        match op {
            Operation::Present => Some(Detour::new(end_scene as *const (), &END_SCENE)),
            Operation::Resize => Some(Detour::new(reset as *const (), &RESET)),
            _ => None,
        }
    }
}

unsafe extern "system" fn end_scene(device: *mut c_void) -> HRESULT {
    if let Some(session) = context::active_for(Api::D3D9) {
        let callbacks = session.callbacks();
        if session.state().claim_device(device) {
            tracing::info!("D3D9 device observed at {:p}", device);
            callbacks.device_created(device);
        }
        callbacks.present();
        callbacks.render(|| Some(RenderContext::new(Api::D3D9).with_device(device)));
    }

    match END_SCENE.original::<EndSceneFn>() {
        Some(original) => original(device),
        None => d3d::E_FAIL,
    }
}

unsafe extern "system" fn reset(device: *mut c_void, params: *mut D3DPRESENT_PARAMETERS) -> HRESULT {
    if let Some(session) = context::active_for(Api::D3D9) {
        session.callbacks().resize();
    }

    match RESET.original::<ResetFn>() {
        Some(original) => original(device, params),
        None => d3d::E_FAIL,
    }
}
