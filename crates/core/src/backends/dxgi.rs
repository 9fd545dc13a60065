//! Shared DXGI bootstrap and swap-chain event handling

use std::ffi::c_void;
use std::ptr;

use framejack_host::{resolve_fn, HostPlatform};
use framejack_sdk::d3d::{
    self, dxgi_factory, dxgi_swap_chain, CreateDXGIFactoryFn, EnumAdaptersFn, GetDeviceFn,
    DXGI_MODE_DESC, DXGI_RATIONAL, DXGI_SAMPLE_DESC, DXGI_SWAP_CHAIN_DESC, GUID, HWND,
};
use framejack_sdk::{libraries, Api, RenderContext};

use super::com::{self, ComPtr};
use crate::context::{CapturedState, SessionContext};
use crate::error::BootstrapError;

/// Windowed 100x100 swap chain on `window`
pub fn swap_chain_desc(
    window: HWND,
    buffer_count: u32,
    swap_effect: u32,
    flags: u32,
) -> DXGI_SWAP_CHAIN_DESC {
    DXGI_SWAP_CHAIN_DESC {
        buffer_desc: DXGI_MODE_DESC {
            width: 100,
            height: 100,
            refresh_rate: DXGI_RATIONAL {
                numerator: 60,
                denominator: 1,
            },
            format: d3d::DXGI_FORMAT_R8G8B8A8_UNORM,
            scanline_ordering: d3d::DXGI_MODE_SCANLINE_ORDER_UNSPECIFIED,
            scaling: d3d::DXGI_MODE_SCALING_UNSPECIFIED,
        },
        sample_desc: DXGI_SAMPLE_DESC {
            count: 1,
            quality: 0,
        },
        buffer_usage: d3d::DXGI_USAGE_RENDER_TARGET_OUTPUT,
        buffer_count,
        output_window: window,
        windowed: 1,
        swap_effect,
        flags,
    }
}

/// `CreateDXGIFactory` from the already loaded dxgi module
pub fn create_factory(host: &dyn HostPlatform) -> Result<ComPtr, BootstrapError> {
    // SAFETY: CreateDXGIFactoryFn matches the export
    unsafe {
        let create: CreateDXGIFactoryFn = resolve_fn(host, libraries::DXGI, "CreateDXGIFactory")?;
        com::create("CreateDXGIFactory", |out| create(&d3d::IID_IDXGI_FACTORY, out))
    }
}

/// The first adapter the factory enumerates
pub fn first_adapter(factory: &ComPtr) -> Result<ComPtr, BootstrapError> {
    // SAFETY: the factory is live and EnumAdapters sits at its documented slot
    unsafe {
        let enum_adapters: EnumAdaptersFn = factory.method(dxgi_factory::ENUM_ADAPTERS);
        let mut raw = ptr::null_mut();
        let hr = enum_adapters(factory.as_ptr(), 0, &mut raw);
        if hr == d3d::DXGI_ERROR_NOT_FOUND {
            return Err(BootstrapError::NoAdapter);
        }
        let adapter = ComPtr::from_raw(raw);
        crate::error::check_hr("IDXGIFactory::EnumAdapters", hr)?;
        adapter.ok_or(BootstrapError::NoAdapter)
    }
}

/// Present-side normalizer shared by D3D10 and D3D11
///
/// Records the swap chain, obtains the device once through
/// `IDXGISwapChain::GetDevice`, then fires OnPresent and OnRender.
///
/// # Safety
/// `swap_chain` must be the live swap chain the hooked Present was called on.
pub unsafe fn present_event(
    session: &SessionContext,
    api: Api,
    swap_chain: *mut c_void,
    device_iid: &GUID,
) {
    let state = session.state();
    let callbacks = session.callbacks();
    state.set_swap_chain(swap_chain);

    if state.device().is_null() && !swap_chain.is_null() {
        let get_device: GetDeviceFn = com::method(swap_chain, dxgi_swap_chain::GET_DEVICE);
        let mut device = ptr::null_mut();
        let hr = get_device(swap_chain, device_iid, &mut device);
        if d3d::failed(hr) || device.is_null() {
            tracing::debug!("{} GetDevice failed: {:#010x}", api, hr);
        } else if state.claim_retained_device(device) {
            tracing::info!("{} device observed at {:p}", api, device);
            callbacks.device_created(device);
        } else {
            // Another thread won the claim; drop the extra reference
            com::release(device);
        }
    }

    callbacks.present();
    callbacks.render(|| {
        let device = state.device();
        (!device.is_null()).then(|| {
            RenderContext::new(api)
                .with_device(device)
                .with_swap_chain(swap_chain)
        })
    });
}

/// Release the device reference [`present_event`] retained
pub fn release_retained(state: &CapturedState) {
    if let Some(device) = state.take_retained() {
        // SAFETY: the reference was obtained from GetDevice and never released
        unsafe {
            com::release(device);
        }
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! Scripted DXGI entry points shared by backend tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::OnceLock;

    use parking_lot::Mutex;

    use crate::testing::FakeCom;

    /// Objects handed out by the scripted factory
    pub struct Objects {
        pub factory: FakeCom,
        pub adapter: FakeCom,
    }

    static OBJECTS: OnceLock<Objects> = OnceLock::new();
    pub static SWAP_CHAIN_DEVICE: AtomicUsize = AtomicUsize::new(0);
    /// Interface ID of the last GetDevice call
    pub static REQUESTED_IID: Mutex<Option<GUID>> = Mutex::new(None);

    unsafe extern "system" fn enum_adapters(_this: *mut c_void, index: u32, out: *mut *mut c_void) -> d3d::HRESULT {
        if index > 0 {
            return d3d::DXGI_ERROR_NOT_FOUND;
        }
        *out = objects().adapter.as_ptr();
        d3d::S_OK
    }

    pub unsafe extern "system" fn create_factory(_riid: *const GUID, out: *mut *mut c_void) -> d3d::HRESULT {
        *out = objects().factory.as_ptr();
        d3d::S_OK
    }

    /// `IDXGISwapChain::GetDevice` handing out [`SWAP_CHAIN_DEVICE`]
    pub unsafe extern "system" fn get_device(_this: *mut c_void, riid: *const GUID, out: *mut *mut c_void) -> d3d::HRESULT {
        *REQUESTED_IID.lock() = Some(*riid);
        let device = SWAP_CHAIN_DEVICE.load(Ordering::SeqCst) as *mut c_void;
        if device.is_null() {
            return d3d::E_FAIL;
        }
        com::method::<d3d::ReleaseFn>(device, d3d::unknown::ADD_REF)(device);
        *out = device;
        d3d::S_OK
    }

    pub fn objects() -> &'static Objects {
        OBJECTS.get_or_init(|| Objects {
            factory: FakeCom::new(16, 0x7000).set(dxgi_factory::ENUM_ADAPTERS, enum_adapters as usize),
            adapter: FakeCom::new(12, 0x7800),
        })
    }
}
