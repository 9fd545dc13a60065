//! Direct3D 12 backend
//!
//! D3D12 presents through a swap chain bound to a command queue, and the
//! queue is what overlays need. It is discovered by hooking
//! `ExecuteCommandLists`: the first queue to submit work is the one the
//! render context carries from then on.

use std::ffi::c_void;

use framejack_host::{resolve_fn, HostPlatform};
use framejack_sdk::d3d::{
    self, d3d12_device, dxgi_factory, CreateCommandAllocatorFn, CreateCommandListFn,
    CreateCommandQueueFn, CreateSwapChainFn, D3D12CreateDeviceFn, ExecuteCommandListsFn,
    PresentFn, ResizeBuffersFn, D3D12_COMMAND_QUEUE_DESC, HRESULT,
};
use framejack_sdk::layout::d3d12;
use framejack_sdk::{libraries, Api, Operation, RenderContext, SlotLayout};

use super::{com, dxgi, Backend, Detour};
use crate::context;
use crate::error::BootstrapError;
use crate::hooks::HookPoint;
use crate::table::MethodTable;

static EXECUTE_COMMAND_LISTS: HookPoint = HookPoint::new("D3D12ExecuteCommandLists");
static PRESENT: HookPoint = HookPoint::new("D3D12Present");
static RESIZE_BUFFERS: HookPoint = HookPoint::new("D3D12ResizeBuffers");

pub struct D3D12;

impl Backend for D3D12 {
    fn api(&self) -> Api {
        Api::D3D12
    }

    fn layout(&self) -> &'static SlotLayout {
        &d3d12::LAYOUT
    }

    fn required_module(&self) -> &'static str {
        libraries::D3D12
    }

    fn extract(&self, host: &dyn HostPlatform) -> Result<MethodTable, BootstrapError> {
        let window = host.create_window("FrameJackD3D12")?;
        let factory = dxgi::create_factory(host)?;
        let adapter = dxgi::first_adapter(&factory)?;

        // SAFETY: exports and vtable slots match their declared types; every
        // created object is owned by a ComPtr declared after the window
        unsafe {
            let create_device: D3D12CreateDeviceFn =
                resolve_fn(host, libraries::D3D12, "D3D12CreateDevice")?;
            let device = com::create("D3D12CreateDevice", |out| {
                create_device(
                    adapter.as_ptr(),
                    d3d::D3D_FEATURE_LEVEL_11_0,
                    &d3d::IID_ID3D12_DEVICE,
                    out,
                )
            })?;

            let queue_desc = D3D12_COMMAND_QUEUE_DESC {
                kind: d3d::D3D12_COMMAND_LIST_TYPE_DIRECT,
                priority: 0,
                flags: d3d::D3D12_COMMAND_QUEUE_FLAG_NONE,
                node_mask: 0,
            };
            let create_queue: CreateCommandQueueFn = device.method(d3d12_device::CREATE_COMMAND_QUEUE);
            let queue = com::create("ID3D12Device::CreateCommandQueue", |out| {
                create_queue(device.as_ptr(), &queue_desc, &d3d::IID_ID3D12_COMMAND_QUEUE, out)
            })?;

            let create_allocator: CreateCommandAllocatorFn =
                device.method(d3d12_device::CREATE_COMMAND_ALLOCATOR);
            let allocator = com::create("ID3D12Device::CreateCommandAllocator", |out| {
                create_allocator(
                    device.as_ptr(),
                    d3d::D3D12_COMMAND_LIST_TYPE_DIRECT,
                    &d3d::IID_ID3D12_COMMAND_ALLOCATOR,
                    out,
                )
            })?;

            let create_list: CreateCommandListFn = device.method(d3d12_device::CREATE_COMMAND_LIST);
            let list = com::create("ID3D12Device::CreateCommandList", |out| {
                create_list(
                    device.as_ptr(),
                    0,
                    d3d::D3D12_COMMAND_LIST_TYPE_DIRECT,
                    allocator.as_ptr(),
                    std::ptr::null_mut(),
                    &d3d::IID_ID3D12_GRAPHICS_COMMAND_LIST,
                    out,
                )
            })?;

            let mut desc = dxgi::swap_chain_desc(
                window.raw(),
                2,
                d3d::DXGI_SWAP_EFFECT_FLIP_DISCARD,
                d3d::DXGI_SWAP_CHAIN_FLAG_ALLOW_MODE_SWITCH,
            );
            let create_swap_chain: CreateSwapChainFn = factory.method(dxgi_factory::CREATE_SWAP_CHAIN);
            let swap_chain = com::create("IDXGIFactory::CreateSwapChain", |out| {
                create_swap_chain(factory.as_ptr(), queue.as_ptr(), &mut desc, out)
            })?;

            let mut builder = MethodTable::builder(&d3d12::LAYOUT);
            builder
                .copy_vtable(device.as_ptr(), "ID3D12Device")?
                .copy_vtable(queue.as_ptr(), "ID3D12CommandQueue")?
                .copy_vtable(allocator.as_ptr(), "ID3D12CommandAllocator")?
                .copy_vtable(list.as_ptr(), "ID3D12GraphicsCommandList")?
                .copy_vtable(swap_chain.as_ptr(), "IDXGISwapChain")?;
            builder.finish()
        }
    }

    fn detour(&self, op: Operation) -> Option<Detour> {
        match op {
            Operation::ExecuteCommandLists => Some(Detour::new(
                execute_command_lists as *const (),
                &EXECUTE_COMMAND_LISTS,
            )),
            Operation::Present => Some(Detour::new(present as *const (), &PRESENT)),
            Operation::Resize => Some(Detour::new(resize_buffers as *const (), &RESIZE_BUFFERS)),
            Operation::AcquireNextImage => None,
        }
    }
}

unsafe extern "system" fn execute_command_lists(queue: *mut c_void, count: u32, lists: *const *mut c_void) {
    if let Some(session) = context::active_for(Api::D3D12) {
        if session.state().claim_queue(queue) {
            tracing::info!("D3D12 command queue observed at {:p}", queue);
            session.callbacks().device_created(queue);
        }
    }

    if let Some(original) = EXECUTE_COMMAND_LISTS.original::<ExecuteCommandListsFn>() {
        original(queue, count, lists);
    }
}

unsafe extern "system" fn present(swap_chain: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT {
    if let Some(session) = context::active_for(Api::D3D12) {
        let state = session.state();
        let callbacks = session.callbacks();
        state.set_swap_chain(swap_chain);
        callbacks.present();
        callbacks.render(|| {
            let queue = state.queue();
            (!queue.is_null()).then(|| {
                RenderContext::new(Api::D3D12)
                    .with_swap_chain(swap_chain)
                    .with_extra(queue)
            })
        });
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
    if let Some(session) = context::active_for(Api::D3D12) {
        session.state().set_swap_chain(swap_chain);
        session.callbacks().resize();
    }

    match RESIZE_BUFFERS.original::<ResizeBuffersFn>() {
        Some(original) => original(swap_chain, buffer_count, width, height, new_format, flags),
        None => d3d::E_FAIL,
    }
}
