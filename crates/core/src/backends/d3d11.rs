//! Direct3D 11 backend

use std::ffi::c_void;
use std::ptr;

use framejack_host::{resolve_fn, HostPlatform};
use framejack_sdk::d3d::{self, D3D11CreateDeviceAndSwapChainFn, PresentFn, ResizeBuffersFn, HRESULT};
use framejack_sdk::layout::d3d11;
use framejack_sdk::{libraries, Api, Operation, SlotLayout};

use super::com::ComPtr;
use super::{dxgi, Backend, Detour};
use crate::context::{self, CapturedState};
use crate::error::{check_hr, BootstrapError};
use crate::hooks::HookPoint;
use crate::table::MethodTable;

static PRESENT: HookPoint = HookPoint::new("D3D11Present");
static RESIZE_BUFFERS: HookPoint = HookPoint::new("D3D11ResizeBuffers");

pub struct D3D11;

impl Backend for D3D11 {
    fn api(&self) -> Api {
        Api::D3D11
    }

    fn layout(&self) -> &'static SlotLayout {
        &d3d11::LAYOUT
    }

    fn required_module(&self) -> &'static str {
        libraries::D3D11
    }

    fn extract(&self, host: &dyn HostPlatform) -> Result<MethodTable, BootstrapError> {
        let window = host.create_window("FrameJackD3D11")?;
        let levels = [d3d::D3D_FEATURE_LEVEL_10_1, d3d::D3D_FEATURE_LEVEL_11_0];
        let desc = dxgi::swap_chain_desc(
            window.raw(),
            1,
            d3d::DXGI_SWAP_EFFECT_DISCARD,
            d3d::DXGI_SWAP_CHAIN_FLAG_ALLOW_MODE_SWITCH,
        );

        // SAFETY: the export matches D3D11CreateDeviceAndSwapChainFn and
        // every out-pointer is owned by a ComPtr before it is checked
        unsafe {
            let create: D3D11CreateDeviceAndSwapChainFn =
                resolve_fn(host, libraries::D3D11, "D3D11CreateDeviceAndSwapChain")?;

            let mut swap_chain = ptr::null_mut();
            let mut device = ptr::null_mut();
            let mut level = 0;
            let mut immediate = ptr::null_mut();
            let hr = create(
                ptr::null_mut(),
                d3d::D3D_DRIVER_TYPE_HARDWARE,
                ptr::null_mut(),
                0,
                levels.as_ptr(),
                levels.len() as u32,
                d3d::D3D11_SDK_VERSION,
                &desc,
                &mut swap_chain,
                &mut device,
                &mut level,
                &mut immediate,
            );
            let swap_chain = ComPtr::from_raw(swap_chain);
            let device = ComPtr::from_raw(device);
            let immediate = ComPtr::from_raw(immediate);
            check_hr("D3D11CreateDeviceAndSwapChain", hr)?;

            let swap_chain = swap_chain.ok_or(BootstrapError::NullObject("IDXGISwapChain"))?;
            let device = device.ok_or(BootstrapError::NullObject("ID3D11Device"))?;
            let immediate = immediate.ok_or(BootstrapError::NullObject("ID3D11DeviceContext"))?;
            tracing::debug!("D3D11 bootstrap device created at feature level {:#x}", level);

            let mut builder = MethodTable::builder(&d3d11::LAYOUT);
            builder
                .copy_vtable(swap_chain.as_ptr(), "IDXGISwapChain")?
                .copy_vtable(device.as_ptr(), "ID3D11Device")?
                .copy_vtable(immediate.as_ptr(), "ID3D11DeviceContext")?;
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
    if let Some(session) = context::active_for(Api::D3D11) {
        dxgi::present_event(&session, Api::D3D11, swap_chain, &d3d::IID_ID3D11_DEVICE);
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
    if let Some(session) = context::active_for(Api::D3D11) {
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
    use std::sync::{Arc, LazyLock};

    use parking_lot::Mutex;

    use framejack_sdk::d3d::{dxgi_swap_chain, DXGI_SWAP_CHAIN_DESC};
    use framejack_sdk::RenderContext;

    use super::super::dxgi::scripted;
    use crate::callbacks::Callbacks;
    use crate::orchestrator::BootstrapState;
    use crate::testing::{self, Event, FakeCom, FakeHost, PatchCall, Recorder};

    const PRESENT_RESULT: HRESULT = 0x0087_A001;
    const RESIZE_RESULT: HRESULT = 0x0087_A002;

    struct Graph {
        swap_chain: FakeCom,
        device: FakeCom,
        immediate: FakeCom,
        real_device: FakeCom,
    }

    static GRAPH: LazyLock<Graph> = LazyLock::new(|| Graph {
        swap_chain: FakeCom::new(dxgi_swap_chain::COUNT, 0x1000)
            .set(dxgi_swap_chain::GET_DEVICE, scripted::get_device as usize)
            .set(dxgi_swap_chain::PRESENT, scripted_present as usize)
            .set(dxgi_swap_chain::RESIZE_BUFFERS, scripted_resize as usize),
        device: FakeCom::new(43, 0x2000),
        immediate: FakeCom::new(144, 0x3000),
        real_device: FakeCom::new(43, 0x9000),
    });

    static PRESENTS: Mutex<Vec<(usize, u32, u32)>> = Mutex::new(Vec::new());
    static CREATES: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "system" fn scripted_present(swap_chain: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT {
        PRESENTS.lock().push((swap_chain as usize, sync_interval, flags));
        PRESENT_RESULT
    }

    unsafe extern "system" fn scripted_resize(
        _swap_chain: *mut c_void,
        _buffer_count: u32,
        _width: u32,
        _height: u32,
        _new_format: u32,
        _flags: u32,
    ) -> HRESULT {
        RESIZE_RESULT
    }

    unsafe extern "system" fn scripted_create(
        _adapter: *mut c_void,
        _driver_type: u32,
        _software: *mut c_void,
        _flags: u32,
        levels: *const u32,
        level_count: u32,
        _sdk_version: u32,
        desc: *const DXGI_SWAP_CHAIN_DESC,
        swap_chain: *mut *mut c_void,
        device: *mut *mut c_void,
        level: *mut u32,
        immediate: *mut *mut c_void,
    ) -> HRESULT {
        CREATES.fetch_add(1, Ordering::SeqCst);
        assert_eq!(level_count, 2);
        assert_eq!(*levels.add(1), d3d::D3D_FEATURE_LEVEL_11_0);
        assert_eq!((*desc).buffer_count, 1);
        *swap_chain = GRAPH.swap_chain.as_ptr();
        *device = GRAPH.device.as_ptr();
        *level = d3d::D3D_FEATURE_LEVEL_11_0;
        *immediate = GRAPH.immediate.as_ptr();
        d3d::S_OK
    }

    fn host() -> FakeHost {
        FakeHost::new().with_symbol(
            libraries::D3D11,
            "D3D11CreateDeviceAndSwapChain",
            scripted_create as usize,
        )
    }

    type PresentDetour = unsafe extern "system" fn(*mut c_void, u32, u32) -> HRESULT;
    type ResizeDetour = unsafe extern "system" fn(*mut c_void, u32, u32, u32, u32, u32) -> HRESULT;

    #[test]
    fn test_extract_follows_layout_and_releases_objects() {
        let _serial = testing::serial();
        let host = host();
        let table = D3D11.extract(&host).unwrap();

        assert_eq!(table.len(), d3d11::LAYOUT.len());
        let (_, present_addr) = table.address(Operation::Present).unwrap();
        assert_eq!(present_addr as usize, scripted_present as usize);
        assert_eq!(table.entries()[d3d11::LAYOUT.segment_base(d3d11::DEVICE)], GRAPH.device.entry(0));
        assert_eq!(
            table.entries()[d3d11::LAYOUT.segment_base(d3d11::CONTEXT) + 5],
            GRAPH.immediate.entry(5)
        );

        assert_eq!(host.windows_created(), 1);
        assert_eq!(host.windows_alive(), 0);
    }

    #[test]
    fn test_failing_creation_leaves_no_window() {
        unsafe extern "system" fn refuse(
            _: *mut c_void, _: u32, _: *mut c_void, _: u32, _: *const u32, _: u32, _: u32,
            _: *const DXGI_SWAP_CHAIN_DESC, _: *mut *mut c_void, _: *mut *mut c_void, _: *mut u32,
            _: *mut *mut c_void,
        ) -> HRESULT {
            d3d::E_FAIL
        }
        let host = FakeHost::new().with_symbol(libraries::D3D11, "D3D11CreateDeviceAndSwapChain", refuse as usize);
        assert!(matches!(D3D11.extract(&host), Err(BootstrapError::Call { .. })));
        assert_eq!(host.windows_alive(), 0);
    }

    #[test]
    fn test_hooked_present_observes_and_passes_through() {
        let _serial = testing::serial();
        PRESENTS.lock().clear();
        scripted::SWAP_CHAIN_DEVICE.store(GRAPH.real_device.as_ptr() as usize, Ordering::SeqCst);
        let refs_before = GRAPH.real_device.refs();

        let recorder = Recorder::new();
        let (orchestrator, _, patcher) = testing::bootstrapped(host(), Api::D3D11);
        orchestrator.set_callbacks(recorder.callbacks());
        assert_eq!(orchestrator.bootstrap_state(), Some(BootstrapState::Ready));
        assert_eq!(patcher.target("D3D11Present"), Some(scripted_present as usize));

        let present: PresentDetour = unsafe { patcher.detour("D3D11Present") };
        let resize: ResizeDetour = unsafe { patcher.detour("D3D11ResizeBuffers") };
        let swap_chain = GRAPH.swap_chain.as_ptr();

        let hr = unsafe { present(swap_chain, 1, 0x200) };
        assert_eq!(hr, PRESENT_RESULT);
        assert_eq!(*PRESENTS.lock(), [(swap_chain as usize, 1, 0x200)]);
        assert_eq!(unsafe { resize(swap_chain, 2, 640, 480, 0, 0) }, RESIZE_RESULT);
        assert_eq!(unsafe { present(swap_chain, 0, 0) }, PRESENT_RESULT);

        let device = GRAPH.real_device.as_ptr();
        let ctx = RenderContext::new(Api::D3D11)
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

        // GetDevice added one reference, released on shutdown
        assert_eq!(GRAPH.real_device.refs(), refs_before + 1);
        orchestrator.shutdown();
        assert_eq!(GRAPH.real_device.refs(), refs_before);
        assert_eq!(patcher.count(|call| matches!(call, PatchCall::Remove(_))), 2);
    }

    #[test]
    fn test_present_reaches_original_when_shut_down_mid_call() {
        let _serial = testing::serial();
        PRESENTS.lock().clear();
        scripted::SWAP_CHAIN_DEVICE.store(GRAPH.real_device.as_ptr() as usize, Ordering::SeqCst);

        let (orchestrator, _, patcher) = testing::bootstrapped(host(), Api::D3D11);
        let orchestrator = Arc::new(orchestrator);
        let weak = Arc::downgrade(&orchestrator);
        orchestrator.set_callbacks(Callbacks::new().on_present(move || {
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.shutdown();
            }
        }));

        let present: PresentDetour = unsafe { patcher.detour("D3D11Present") };
        let swap_chain = GRAPH.swap_chain.as_ptr();
        assert_eq!(unsafe { present(swap_chain, 1, 0) }, PRESENT_RESULT);
        assert_eq!(*PRESENTS.lock(), [(swap_chain as usize, 1, 0)]);
        assert_eq!(orchestrator.active_api(), Api::Auto);
        assert_eq!(patcher.installed(), 0);

        // With no session left the detour only forwards
        assert_eq!(unsafe { present(swap_chain, 0, 0) }, PRESENT_RESULT);
        assert_eq!(PRESENTS.lock().len(), 2);
    }
}
