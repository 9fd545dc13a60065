//! Direct3D 10 backend

use std::ffi::c_void;
use std::ptr;

use framejack_host::{resolve_fn, HostPlatform};
use framejack_sdk::d3d::{self, D3D10CreateDeviceAndSwapChainFn, PresentFn, ResizeBuffersFn, HRESULT};
use framejack_sdk::layout::d3d10;
use framejack_sdk::{libraries, Api, Operation, SlotLayout};

use super::com::ComPtr;
use super::{dxgi, Backend, Detour};
use crate::context::{self, CapturedState};
use crate::error::{check_hr, BootstrapError};
use crate::hooks::HookPoint;
use crate::table::MethodTable;

static PRESENT: HookPoint = HookPoint::new("D3D10Present");
static RESIZE_BUFFERS: HookPoint = HookPoint::new("D3D10ResizeBuffers");

pub struct D3D10;

impl Backend for D3D10 {
    fn api(&self) -> Api {
        Api::D3D10
    }

    fn layout(&self) -> &'static SlotLayout {
        &d3d10::LAYOUT
    }

    fn required_module(&self) -> &'static str {
        libraries::D3D10
    }

    fn extract(&self, host: &dyn HostPlatform) -> Result<MethodTable, BootstrapError> {
        let window = host.create_window("FrameJackD3D10")?;
        let factory = dxgi::create_factory(host)?;
        let adapter = dxgi::first_adapter(&factory)?;
        let desc = dxgi::swap_chain_desc(
            window.raw(),
            1,
            d3d::DXGI_SWAP_EFFECT_DISCARD,
            d3d::DXGI_SWAP_CHAIN_FLAG_ALLOW_MODE_SWITCH,
        );

        // SAFETY: the export matches D3D10CreateDeviceAndSwapChainFn and
        // both out-pointers are owned before the result is checked
        unsafe {
            let create: D3D10CreateDeviceAndSwapChainFn =
                resolve_fn(host, libraries::D3D10, "D3D10CreateDeviceAndSwapChain")?;

            let mut swap_chain = ptr::null_mut();
            let mut device = ptr::null_mut();
            let hr = create(
                adapter.as_ptr(),
                d3d::D3D10_DRIVER_TYPE_HARDWARE,
                ptr::null_mut(),
                0,
                d3d::D3D10_SDK_VERSION,
                &desc,
                &mut swap_chain,
                &mut device,
            );
            let swap_chain = ComPtr::from_raw(swap_chain);
            let device = ComPtr::from_raw(device);
            check_hr("D3D10CreateDeviceAndSwapChain", hr)?;

            let swap_chain = swap_chain.ok_or(BootstrapError::NullObject("IDXGISwapChain"))?;
            let device = device.ok_or(BootstrapError::NullObject("ID3D10Device"))?;

            let mut builder = MethodTable::builder(&d3d10::LAYOUT);
            builder
                .copy_vtable(swap_chain.as_ptr(), "IDXGISwapChain")?
                .copy_vtable(device.as_ptr(), "ID3D10Device")?;
            builder.finish()
        }
    }

    fn detour(&self, op: Operation) -> Option<Detour> {
        match op {
            Operation::Present => Some(Detour::new(present as *const (), &PRESENT)),
            Operation::Resize => Some(Detour::new(resize_buffers as *const (), &RESIZE_BUFFERS)),
            _ => None,
        }
    }

    fn release_captured(&self, state: &CapturedState) {
        dxgi::release_retained(state);
    }
}

unsafe extern "system" fn present(swap_chain: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT {
    if let Some(session) = context::active_for(Api::D3D10) {
        dxgi::present_event(&session, Api::D3D10, swap_chain, &d3d::IID_ID3D10_DEVICE);
    }

    match PRESENT.original::<PresentFn>() {
        Some(original) => original(swap_chain, sync_interval, flags),
        None => d3d::E_FAIL,
    }
}

unsafe extern "system" fn resize_buffers(
    swap_chain: *mut c_void,
    buffer_count: u32,
    width: u32,
    height: u32,
    new_format: u32,
    flags: u32,
) -> HRESULT {
    if let Some(session) = context::active_for(Api::D3D10) {
        session.state().set_swap_chain(swap_chain);
        session.callbacks().resize();
    }

    match RESIZE_BUFFERS.original::<ResizeBuffersFn>() {
        Some(original) => original(swap_chain, buffer_count, width, height, new_format, flags),
        None => d3d::E_FAIL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::LazyLock;

    use parking_lot::Mutex;

    use framejack_sdk::d3d::{dxgi_swap_chain, DXGI_SWAP_CHAIN_DESC};
    use framejack_sdk::RenderContext;

    use super::super::dxgi::scripted;
    use crate::orchestrator::BootstrapState;
    use crate::testing::{self, Event, FakeCom, FakeHost, PatchCall, Recorder};

    const PRESENT_RESULT: HRESULT = 0x0087_A101;
    const RESIZE_RESULT: HRESULT = 0x0087_A102;

    static SWAP_CHAIN: LazyLock<FakeCom> = LazyLock::new(|| {
        FakeCom::new(dxgi_swap_chain::COUNT, 0x1_1000)
            .set(dxgi_swap_chain::GET_DEVICE, scripted::get_device as usize)
            .set(dxgi_swap_chain::PRESENT, scripted_present as usize)
            .set(dxgi_swap_chain::RESIZE_BUFFERS, scripted_resize as usize)
    });
    static DEVICE: LazyLock<FakeCom> = LazyLock::new(|| FakeCom::new(98, 0x1_2000));
    static REAL_DEVICE: LazyLock<FakeCom> = LazyLock::new(|| FakeCom::new(98, 0x1_9000));
    static ADAPTER_SEEN: AtomicUsize = AtomicUsize::new(0);
    static CALLS: Mutex<Vec<(&'static str, usize, u32, u32)>> = Mutex::new(Vec::new());

    unsafe extern "system" fn scripted_present(swap_chain: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT {
        CALLS.lock().push(("present", swap_chain as usize, sync_interval, flags));
        PRESENT_RESULT
    }

    unsafe extern "system" fn scripted_resize(
        swap_chain: *mut c_void,
        buffer_count: u32,
        width: u32,
        _height: u32,
        _new_format: u32,
        _flags: u32,
    ) -> HRESULT {
        CALLS.lock().push(("resize", swap_chain as usize, buffer_count, width));
        RESIZE_RESULT
    }

    unsafe extern "system" fn scripted_create(
        adapter: *mut c_void,
        _driver_type: u32,
        _software: *mut c_void,
        _flags: u32,
        sdk_version: u32,
        desc: *const DXGI_SWAP_CHAIN_DESC,
        swap_chain: *mut *mut c_void,
        device: *mut *mut c_void,
    ) -> HRESULT {
        ADAPTER_SEEN.store(adapter as usize, Ordering::SeqCst);
        if sdk_version != d3d::D3D10_SDK_VERSION || (*desc).buffer_count != 1 {
            return d3d::E_FAIL;
        }
        *swap_chain = SWAP_CHAIN.as_ptr();
        *device = DEVICE.as_ptr();
        d3d::S_OK
    }

    fn host() -> FakeHost {
        FakeHost::new()
            .with_symbol(libraries::DXGI, "CreateDXGIFactory", scripted::create_factory as usize)
            .with_symbol(libraries::D3D10, "D3D10CreateDeviceAndSwapChain", scripted_create as usize)
    }

    type PresentDetour = unsafe extern "system" fn(*mut c_void, u32, u32) -> HRESULT;
    type ResizeDetour = unsafe extern "system" fn(*mut c_void, u32, u32, u32, u32, u32) -> HRESULT;

    #[test]
    fn test_extract_uses_first_adapter() {
        let _serial = testing::serial();
        let host = host();

        let table = D3D10.extract(&host).unwrap();
        assert_eq!(table.len(), 116);
        assert_eq!(table.entries()[d3d10::PRESENT], SWAP_CHAIN.entry(dxgi_swap_chain::PRESENT));
        assert_eq!(table.entries()[18 + 97], DEVICE.entry(97));
        assert_eq!(
            ADAPTER_SEEN.load(Ordering::SeqCst),
            scripted::objects().adapter.as_ptr() as usize
        );
        assert_eq!(host.windows_alive(), 0);
    }

    #[test]
    fn test_extract_requires_dxgi() {
        let host = FakeHost::new().with_symbol(
            libraries::D3D10,
            "D3D10CreateDeviceAndSwapChain",
            scripted_create as usize,
        );
        assert!(matches!(D3D10.extract(&host), Err(BootstrapError::Host(_))));
        assert_eq!(host.windows_alive(), 0);
    }

    #[test]
    fn test_hooked_present_and_resize_pass_through() {
        let _serial = testing::serial();
        CALLS.lock().clear();
        *scripted::REQUESTED_IID.lock() = None;
        scripted::SWAP_CHAIN_DEVICE.store(REAL_DEVICE.as_ptr() as usize, Ordering::SeqCst);
        let refs_before = REAL_DEVICE.refs();

        let recorder = Recorder::new();
        let (orchestrator, _, patcher) = testing::bootstrapped(host(), Api::D3D10);
        orchestrator.set_callbacks(recorder.callbacks());
        assert_eq!(orchestrator.bootstrap_state(), Some(BootstrapState::Ready));

        let present: PresentDetour = unsafe { patcher.detour("D3D10Present") };
        let resize: ResizeDetour = unsafe { patcher.detour("D3D10ResizeBuffers") };
        let swap_chain = SWAP_CHAIN.as_ptr();

        assert_eq!(unsafe { present(swap_chain, 1, 0x8) }, PRESENT_RESULT);
        assert_eq!(*scripted::REQUESTED_IID.lock(), Some(d3d::IID_ID3D10_DEVICE));
        assert_eq!(unsafe { resize(swap_chain, 3, 800, 600, 0, 0) }, RESIZE_RESULT);
        assert_eq!(unsafe { present(swap_chain, 0, 0) }, PRESENT_RESULT);
        assert_eq!(
            *CALLS.lock(),
            [
                ("present", swap_chain as usize, 1, 0x8),
                ("resize", swap_chain as usize, 3, 800),
                ("present", swap_chain as usize, 0, 0),
            ]
        );

        let device = REAL_DEVICE.as_ptr();
        let ctx = RenderContext::new(Api::D3D10)
            .with_device(device)
            .with_swap_chain(swap_chain);
        assert_eq!(
            recorder.events(),
            [
                Event::DeviceCreated(device as usize),
                Event::Present,
                Event::Render(ctx),
                Event::Resize,
                Event::Present,
                Event::Render(ctx),
            ]
        );

        assert_eq!(REAL_DEVICE.refs(), refs_before + 1);
        orchestrator.shutdown();
        assert_eq!(REAL_DEVICE.refs(), refs_before);
        assert_eq!(patcher.count(|call| matches!(call, PatchCall::Remove(_))), 2);
    }
}
