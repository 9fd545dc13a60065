//! Vulkan backend
//!
//! Vulkan entry points come from the loader rather than a fixed-offset
//! vtable. Bootstrap creates a throwaway instance and device with the
//! swapchain extension enabled, asks `vkGetDeviceProcAddr` for the three
//! device-level functions we hook, and destroys both objects again.

use std::ffi::{c_void, CStr};
use std::ptr;

use ash::vk::{self, Handle};
use framejack_host::{resolve_fn, HostPlatform};
use framejack_sdk::layout::vulkan;
use framejack_sdk::{libraries, Api, Operation, RenderContext, SlotLayout};

use super::{Backend, Detour};
use crate::context;
use crate::error::BootstrapError;
use crate::hooks::HookPoint;
use crate::table::MethodTable;

static ACQUIRE_NEXT_IMAGE: HookPoint = HookPoint::new("vkAcquireNextImageKHR");
static QUEUE_PRESENT: HookPoint = HookPoint::new("vkQueuePresentKHR");
static CREATE_SWAPCHAIN: HookPoint = HookPoint::new("vkCreateSwapchainKHR");

/// Device-level entry points, in layout segment order
const ENTRY_POINTS: [&CStr; 3] = [
    c"vkAcquireNextImageKHR",
    c"vkQueuePresentKHR",
    c"vkCreateSwapchainKHR",
];

const SWAPCHAIN_EXTENSION: &CStr = c"VK_KHR_swapchain";

fn check_vk(call: &'static str, result: vk::Result) -> Result<(), BootstrapError> {
    match result {
        vk::Result::SUCCESS => Ok(()),
        result => Err(BootstrapError::Vulkan { call, result }),
    }
}

/// Opaque pointer-sized view of a Vulkan handle
///
/// Non-dispatchable handles are 64-bit and are truncated on 32-bit targets.
fn opaque<H: Handle>(handle: H) -> *mut c_void {
    handle.as_raw() as usize as *mut c_void
}

struct InstanceGuard {
    handle: vk::Instance,
    destroy: vk::PFN_vkDestroyInstance,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        // SAFETY: the instance was created by us and every child is gone
        unsafe { (self.destroy)(self.handle, ptr::null()) }
    }
}

struct DeviceGuard {
    handle: vk::Device,
    destroy: vk::PFN_vkDestroyDevice,
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        // SAFETY: the device was created by us and never handed out
        unsafe { (self.destroy)(self.handle, ptr::null()) }
    }
}

pub struct Vulkan;

impl Backend for Vulkan {
    fn api(&self) -> Api {
        Api::Vulkan
    }

    fn layout(&self) -> &'static SlotLayout {
        &vulkan::LAYOUT
    }

    fn required_module(&self) -> &'static str {
        libraries::VULKAN
    }

    fn extract(&self, host: &dyn HostPlatform) -> Result<MethodTable, BootstrapError> {
        let module = libraries::VULKAN;

        // SAFETY: every export is resolved with its registry signature and
        // all create-info structures outlive the calls that read them
        unsafe {
            let create_instance: vk::PFN_vkCreateInstance = resolve_fn(host, module, "vkCreateInstance")?;
            let enumerate_devices: vk::PFN_vkEnumeratePhysicalDevices =
                resolve_fn(host, module, "vkEnumeratePhysicalDevices")?;
            let create_device: vk::PFN_vkCreateDevice = resolve_fn(host, module, "vkCreateDevice")?;
            let get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr =
                resolve_fn(host, module, "vkGetDeviceProcAddr")?;
            let destroy_device: vk::PFN_vkDestroyDevice = resolve_fn(host, module, "vkDestroyDevice")?;
            let destroy_instance: vk::PFN_vkDestroyInstance = resolve_fn(host, module, "vkDestroyInstance")?;

            let app_info = vk::ApplicationInfo::builder().api_version(vk::API_VERSION_1_0);
            let instance_info = vk::InstanceCreateInfo::builder().application_info(&app_info);
            let mut instance = vk::Instance::null();
            check_vk(
                "vkCreateInstance",
                create_instance(&*instance_info, ptr::null(), &mut instance),
            )?;
            let instance = InstanceGuard {
                handle: instance,
                destroy: destroy_instance,
            };

            let mut count = 0;
            check_vk(
                "vkEnumeratePhysicalDevices",
                enumerate_devices(instance.handle, &mut count, ptr::null_mut()),
            )?;
            if count == 0 {
                return Err(BootstrapError::NoAdapter);
            }
            let mut physical = vec![vk::PhysicalDevice::null(); count as usize];
            match enumerate_devices(instance.handle, &mut count, physical.as_mut_ptr()) {
                vk::Result::SUCCESS | vk::Result::INCOMPLETE => {}
                result => {
                    return Err(BootstrapError::Vulkan {
                        call: "vkEnumeratePhysicalDevices",
                        result,
                    })
                }
            }
            let physical_device = physical
                .first()
                .copied()
                .filter(|device| device.as_raw() != 0)
                .ok_or(BootstrapError::NoAdapter)?;

            let priorities = [1.0f32];
            let queue_infos = [vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(0)
                .queue_priorities(&priorities)
                .build()];
            let extensions = [SWAPCHAIN_EXTENSION.as_ptr()];
            let device_info = vk::DeviceCreateInfo::builder()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&extensions);
            let mut device = vk::Device::null();
            check_vk(
                "vkCreateDevice",
                create_device(physical_device, &*device_info, ptr::null(), &mut device),
            )?;
            let device = DeviceGuard {
                handle: device,
                destroy: destroy_device,
            };

            let mut builder = MethodTable::builder(&vulkan::LAYOUT);
            for (name, segment) in ENTRY_POINTS.iter().zip(vulkan::SEGMENTS) {
                let address = get_device_proc_addr(device.handle, name.as_ptr())
                    .map_or(ptr::null(), |function| function as *const c_void);
                builder.push_address(address, segment.name)?;
            }
            builder.finish()
        }
    }

    fn detour(&self, op: Operation) -> Option<Detour> {
        match op {
            Operation::AcquireNextImage => Some(Detour::new(
                acquire_next_image as *const (),
                &ACQUIRE_NEXT_IMAGE,
            )),
            Operation::Present => Some(Detour::new(queue_present as *const (), &QUEUE_PRESENT)),
            Operation::Resize => Some(Detour::new(create_swapchain as *const (), &CREATE_SWAPCHAIN)),
            Operation::ExecuteCommandLists => None,
        }
    }
}

unsafe extern "system" fn acquire_next_image(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    timeout: u64,
    semaphore: vk::Semaphore,
    fence: vk::Fence,
    image_index: *mut u32,
) -> vk::Result {
    let session = context::active_for(Api::Vulkan);
    if let Some(session) = &session {
        let state = session.state();
        if state.claim_device(opaque(device)) {
            tracing::info!("Vulkan device observed: {:#x}", device.as_raw());
            session.callbacks().device_created(opaque(device));
        }
        state.set_swap_chain(opaque(swapchain));
    }

    let result = match ACQUIRE_NEXT_IMAGE.original::<vk::PFN_vkAcquireNextImageKHR>() {
        Some(original) => original(device, swapchain, timeout, semaphore, fence, image_index),
        None => vk::Result::ERROR_INITIALIZATION_FAILED,
    };

    if let Some(session) = &session {
        let acquired = matches!(result, vk::Result::SUCCESS | vk::Result::SUBOPTIMAL_KHR);
        if acquired && !image_index.is_null() {
            session.state().set_image_index(*image_index);
        }
    }
    result
}

unsafe extern "system" fn queue_present(queue: vk::Queue, present_info: *const vk::PresentInfoKHR) -> vk::Result {
    if let Some(session) = context::active_for(Api::Vulkan) {
        let state = session.state();
        let callbacks = session.callbacks();
        callbacks.present();
        callbacks.render(|| {
            let device = state.device();
            (!device.is_null()).then(|| {
                RenderContext::new(Api::Vulkan)
                    .with_device(device)
                    .with_swap_chain(state.swap_chain())
                    .with_image_index(state.image_index())
                    .with_extra(opaque(queue))
            })
        });
    }

    match QUEUE_PRESENT.original::<vk::PFN_vkQueuePresentKHR>() {
        Some(original) => original(queue, present_info),
        None => vk::Result::ERROR_INITIALIZATION_FAILED,
    }
}

unsafe extern "system" fn create_swapchain(
    device: vk::Device,
    create_info: *const vk::SwapchainCreateInfoKHR,
    allocator: *const vk::AllocationCallbacks,
    swapchain: *mut vk::SwapchainKHR,
) -> vk::Result {
    if let Some(session) = context::active_for(Api::Vulkan) {
        session.callbacks().resize();
    }

    match CREATE_SWAPCHAIN.original::<vk::PFN_vkCreateSwapchainKHR>() {
        Some(original) => original(device, create_info, allocator, swapchain),
        None => vk::Result::ERROR_INITIALIZATION_FAILED,
    }
}
