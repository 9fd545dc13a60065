//! Direct3D / DXGI raw type definitions
//!
//! Only what the bootstrap needs to create throwaway objects: descriptor
//! structs, interface IDs, constants and the vtable indices of the methods
//! we call or hook. Interfaces are opaque; methods are called through raw
//! vtable pointer arithmetic.

#![allow(non_camel_case_types, clippy::upper_case_acronyms)]

use std::ffi::c_void;

/// COM result code
pub type HRESULT = i32;

pub const S_OK: HRESULT = 0;
pub const E_FAIL: HRESULT = 0x8000_4005_u32 as i32;
pub const DXGI_ERROR_NOT_FOUND: HRESULT = 0x887A_0002_u32 as i32;

/// Win32 BOOL
pub type BOOL = i32;

/// Window handle as passed to swap chain descriptors
pub type HWND = *mut c_void;

/// Same semantics as the `FAILED()` macro
#[inline]
pub const fn failed(hr: HRESULT) -> bool {
    hr < 0
}

/// COM interface identifier
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl GUID {
    pub const fn from_u128(uuid: u128) -> Self {
        Self {
            data1: (uuid >> 96) as u32,
            data2: (uuid >> 80 & 0xffff) as u16,
            data3: (uuid >> 64 & 0xffff) as u16,
            data4: (uuid as u64).to_be_bytes(),
        }
    }
}

pub const IID_IDXGI_FACTORY: GUID = GUID::from_u128(0x7b7166ec_21c7_44ae_b21a_c9ae321ae369);
pub const IID_ID3D10_DEVICE: GUID = GUID::from_u128(0x9b7e4c0f_342c_4106_a19f_4f2704f689f0);
pub const IID_ID3D11_DEVICE: GUID = GUID::from_u128(0xdb6f6ddb_ac77_4e88_8253_819df9bbf140);
pub const IID_ID3D12_DEVICE: GUID = GUID::from_u128(0x189819f1_1db6_4b57_be54_1821339b85f7);
pub const IID_ID3D12_COMMAND_QUEUE: GUID = GUID::from_u128(0x0ec870a6_5d7e_4c22_8cfc_5baae07616ed);
pub const IID_ID3D12_COMMAND_ALLOCATOR: GUID =
    GUID::from_u128(0x6102dee4_af59_4b09_b999_b44d73f09b24);
pub const IID_ID3D12_GRAPHICS_COMMAND_LIST: GUID =
    GUID::from_u128(0x5b160d59_f45f_4ac9_8862_4c3ea446cc34);

// Feature levels, driver types and SDK versions
pub const D3D_FEATURE_LEVEL_10_1: u32 = 0xa100;
pub const D3D_FEATURE_LEVEL_11_0: u32 = 0xb000;
pub const D3D_DRIVER_TYPE_HARDWARE: u32 = 1;
pub const D3D10_DRIVER_TYPE_HARDWARE: u32 = 0;
pub const D3D11_SDK_VERSION: u32 = 7;
pub const D3D10_SDK_VERSION: u32 = 29;

// Direct3D 9
pub const D3D_SDK_VERSION: u32 = 32;
pub const D3DADAPTER_DEFAULT: u32 = 0;
pub const D3DDEVTYPE_NULLREF: u32 = 4;
pub const D3DCREATE_SOFTWARE_VERTEXPROCESSING: u32 = 0x20;
pub const D3DCREATE_DISABLE_DRIVER_MANAGEMENT: u32 = 0x100;
pub const D3DFMT_UNKNOWN: u32 = 0;
pub const D3DMULTISAMPLE_NONE: u32 = 0;
pub const D3DSWAPEFFECT_DISCARD: u32 = 1;

// DXGI
pub const DXGI_FORMAT_R8G8B8A8_UNORM: u32 = 28;
pub const DXGI_MODE_SCANLINE_ORDER_UNSPECIFIED: u32 = 0;
pub const DXGI_MODE_SCALING_UNSPECIFIED: u32 = 0;
pub const DXGI_USAGE_RENDER_TARGET_OUTPUT: u32 = 0x20;
pub const DXGI_SWAP_EFFECT_DISCARD: u32 = 0;
pub const DXGI_SWAP_EFFECT_FLIP_DISCARD: u32 = 4;
pub const DXGI_SWAP_CHAIN_FLAG_ALLOW_MODE_SWITCH: u32 = 2;

// Direct3D 12
pub const D3D12_COMMAND_LIST_TYPE_DIRECT: u32 = 0;
pub const D3D12_COMMAND_QUEUE_FLAG_NONE: u32 = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DXGI_RATIONAL {
    pub numerator: u32,
    pub denominator: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DXGI_MODE_DESC {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: DXGI_RATIONAL,
    pub format: u32,
    pub scanline_ordering: u32,
    pub scaling: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DXGI_SAMPLE_DESC {
    pub count: u32,
    pub quality: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DXGI_SWAP_CHAIN_DESC {
    pub buffer_desc: DXGI_MODE_DESC,
    pub sample_desc: DXGI_SAMPLE_DESC,
    pub buffer_usage: u32,
    pub buffer_count: u32,
    pub output_window: HWND,
    pub windowed: BOOL,
    pub swap_effect: u32,
    pub flags: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct D3DPRESENT_PARAMETERS {
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
    pub back_buffer_format: u32,
    pub back_buffer_count: u32,
    pub multi_sample_type: u32,
    pub multi_sample_quality: u32,
    pub swap_effect: u32,
    pub device_window: HWND,
    pub windowed: BOOL,
    pub enable_auto_depth_stencil: BOOL,
    pub auto_depth_stencil_format: u32,
    pub flags: u32,
    pub full_screen_refresh_rate_in_hz: u32,
    pub presentation_interval: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct D3D12_COMMAND_QUEUE_DESC {
    pub kind: u32,
    pub priority: i32,
    pub flags: u32,
    pub node_mask: u32,
}

/// IUnknown vtable indices
pub mod unknown {
    pub const QUERY_INTERFACE: usize = 0;
    pub const ADD_REF: usize = 1;
    pub const RELEASE: usize = 2;
}

/// IDirect3D9 vtable indices
pub mod d3d9 {
    pub const CREATE_DEVICE: usize = 16;
}

/// IDirect3DDevice9 vtable indices
pub mod d3d9_device {
    pub const RESET: usize = 16;
    pub const PRESENT: usize = 17;
    pub const END_SCENE: usize = 42;
}

/// IDXGIFactory vtable indices
pub mod dxgi_factory {
    pub const ENUM_ADAPTERS: usize = 7;
    pub const CREATE_SWAP_CHAIN: usize = 10;
}

/// IDXGISwapChain vtable indices
pub mod dxgi_swap_chain {
    /// IDXGIDeviceSubObject::GetDevice
    pub const GET_DEVICE: usize = 7;
    pub const PRESENT: usize = 8;
    pub const RESIZE_BUFFERS: usize = 13;
    /// Entries up to and including GetLastPresentCount
    pub const COUNT: usize = 18;
}

/// ID3D12Device vtable indices
pub mod d3d12_device {
    pub const CREATE_COMMAND_QUEUE: usize = 8;
    pub const CREATE_COMMAND_ALLOCATOR: usize = 9;
    pub const CREATE_COMMAND_LIST: usize = 12;
}

/// ID3D12CommandQueue vtable indices
pub mod d3d12_queue {
    pub const EXECUTE_COMMAND_LISTS: usize = 10;
}

// Exported creation entry points, resolved by name at runtime

pub type Direct3DCreate9Fn = unsafe extern "system" fn(sdk_version: u32) -> *mut c_void;

pub type CreateDXGIFactoryFn =
    unsafe extern "system" fn(riid: *const GUID, factory: *mut *mut c_void) -> HRESULT;

pub type D3D10CreateDeviceAndSwapChainFn = unsafe extern "system" fn(
    adapter: *mut c_void,
    driver_type: u32,
    software: *mut c_void,
    flags: u32,
    sdk_version: u32,
    desc: *const DXGI_SWAP_CHAIN_DESC,
    swap_chain: *mut *mut c_void,
    device: *mut *mut c_void,
) -> HRESULT;

pub type D3D11CreateDeviceAndSwapChainFn = unsafe extern "system" fn(
    adapter: *mut c_void,
    driver_type: u32,
    software: *mut c_void,
    flags: u32,
    feature_levels: *const u32,
    feature_level_count: u32,
    sdk_version: u32,
    desc: *const DXGI_SWAP_CHAIN_DESC,
    swap_chain: *mut *mut c_void,
    device: *mut *mut c_void,
    feature_level: *mut u32,
    context: *mut *mut c_void,
) -> HRESULT;

pub type D3D12CreateDeviceFn = unsafe extern "system" fn(
    adapter: *mut c_void,
    minimum_feature_level: u32,
    riid: *const GUID,
    device: *mut *mut c_void,
) -> HRESULT;

// Interface methods, called through the vtable

pub type ReleaseFn = unsafe extern "system" fn(this: *mut c_void) -> u32;

pub type Direct3D9CreateDeviceFn = unsafe extern "system" fn(
    this: *mut c_void,
    adapter: u32,
    device_type: u32,
    focus_window: HWND,
    behavior_flags: u32,
    params: *mut D3DPRESENT_PARAMETERS,
    device: *mut *mut c_void,
) -> HRESULT;

pub type EnumAdaptersFn =
    unsafe extern "system" fn(this: *mut c_void, index: u32, adapter: *mut *mut c_void) -> HRESULT;

pub type CreateSwapChainFn = unsafe extern "system" fn(
    this: *mut c_void,
    device: *mut c_void,
    desc: *mut DXGI_SWAP_CHAIN_DESC,
    swap_chain: *mut *mut c_void,
) -> HRESULT;

pub type GetDeviceFn =
    unsafe extern "system" fn(this: *mut c_void, riid: *const GUID, device: *mut *mut c_void) -> HRESULT;

pub type CreateCommandQueueFn = unsafe extern "system" fn(
    this: *mut c_void,
    desc: *const D3D12_COMMAND_QUEUE_DESC,
    riid: *const GUID,
    queue: *mut *mut c_void,
) -> HRESULT;

pub type CreateCommandAllocatorFn = unsafe extern "system" fn(
    this: *mut c_void,
    kind: u32,
    riid: *const GUID,
    allocator: *mut *mut c_void,
) -> HRESULT;

pub type CreateCommandListFn = unsafe extern "system" fn(
    this: *mut c_void,
    node_mask: u32,
    kind: u32,
    allocator: *mut c_void,
    initial_state: *mut c_void,
    riid: *const GUID,
    list: *mut *mut c_void,
) -> HRESULT;

// Hooked methods

pub type EndSceneFn = unsafe extern "system" fn(device: *mut c_void) -> HRESULT;

pub type ResetFn =
    unsafe extern "system" fn(device: *mut c_void, params: *mut D3DPRESENT_PARAMETERS) -> HRESULT;

pub type PresentFn =
    unsafe extern "system" fn(swap_chain: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT;

pub type ResizeBuffersFn = unsafe extern "system" fn(
    swap_chain: *mut c_void,
    buffer_count: u32,
    width: u32,
    height: u32,
    new_format: u32,
    flags: u32,
) -> HRESULT;

pub type ExecuteCommandListsFn =
    unsafe extern "system" fn(queue: *mut c_void, count: u32, lists: *const *mut c_void);
