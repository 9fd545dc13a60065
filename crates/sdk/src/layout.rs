//! Per-backend slot layouts
//!
//! A backend's method table is the concatenation of one or more dispatch
//! tables (or resolved symbols), copied in a fixed order. Each layout names
//! its segments and the flat offset of every operation we hook.
//!
//! These tables are hand-verified against the runtimes and are the most
//! fragile part of the system. Totals and offsets are checked by `const`
//! assertions at the bottom of this file, so an edit that breaks them fails
//! the build.

use crate::api::Api;
use crate::d3d::{d3d12_queue, d3d9_device, dxgi_swap_chain};

/// Semantic operation intercepted by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Frame boundary (Present, EndScene, SwapBuffers, vkQueuePresentKHR)
    Present,
    /// Swap chain resize or recreation
    Resize,
    /// D3D12 command submission, used to discover the real command queue
    ExecuteCommandLists,
    /// Vulkan image acquisition, used to track device, swap chain and image index
    AcquireNextImage,
}

/// A contiguous run of entries in the method table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Interface or symbol the entries are copied from
    pub name: &'static str,
    /// Number of entries copied
    pub len: usize,
}

impl Segment {
    pub const fn new(name: &'static str, len: usize) -> Self {
        Self { name, len }
    }
}

/// A hooked operation and where it lives in the method table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookSlot {
    pub op: Operation,
    /// Unique symbolic name handed to the patch service
    pub name: &'static str,
    /// Flat index into the method table
    pub offset: usize,
}

/// Complete layout for one backend
#[derive(Debug, Clone, Copy)]
pub struct SlotLayout {
    pub api: Api,
    pub segments: &'static [Segment],
    pub hooks: &'static [HookSlot],
}

/// Flat offset of `index` within segment `segment`
///
/// Panics at compile time when used in a `const` with an out-of-range index.
pub const fn flat(segments: &[Segment], segment: usize, index: usize) -> usize {
    assert!(segment < segments.len(), "segment out of range");
    assert!(index < segments[segment].len, "slot out of range");

    let mut base = 0;
    let mut i = 0;
    while i < segment {
        base += segments[i].len;
        i += 1;
    }
    base + index
}

impl SlotLayout {
    /// Total number of entries in the method table
    pub const fn len(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.segments.len() {
            total += self.segments[i].len;
            i += 1;
        }
        total
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index where segment `index` starts
    pub const fn segment_base(&self, index: usize) -> usize {
        let mut base = 0;
        let mut i = 0;
        while i < index && i < self.segments.len() {
            base += self.segments[i].len;
            i += 1;
        }
        base
    }

    /// Every hook offset lies inside the table and no offset is hooked twice
    pub const fn is_consistent(&self) -> bool {
        let len = self.len();
        let mut i = 0;
        while i < self.hooks.len() {
            if self.hooks[i].offset >= len {
                return false;
            }
            let mut j = i + 1;
            while j < self.hooks.len() {
                if self.hooks[j].offset == self.hooks[i].offset {
                    return false;
                }
                j += 1;
            }
            i += 1;
        }
        !self.hooks.is_empty()
    }

    /// Look up the slot for an operation
    pub fn hook(&self, op: Operation) -> Option<&'static HookSlot> {
        self.hooks.iter().find(|slot| slot.op == op)
    }

    /// Static layout for a concrete API
    pub const fn for_api(api: Api) -> Option<&'static SlotLayout> {
        match api {
            Api::Auto => None,
            Api::D3D9 => Some(&d3d9::LAYOUT),
            Api::D3D10 => Some(&d3d10::LAYOUT),
            Api::D3D11 => Some(&d3d11::LAYOUT),
            Api::D3D12 => Some(&d3d12::LAYOUT),
            Api::OpenGL => Some(&opengl::LAYOUT),
            Api::Vulkan => Some(&vulkan::LAYOUT),
        }
    }
}

/// Direct3D 9: the device table alone
pub mod d3d9 {
    use super::*;

    pub const DEVICE: usize = 0;

    pub const SEGMENTS: &[Segment] = &[Segment::new("IDirect3DDevice9", 119)];

    pub const RESET: usize = flat(SEGMENTS, DEVICE, d3d9_device::RESET);
    pub const END_SCENE: usize = flat(SEGMENTS, DEVICE, d3d9_device::END_SCENE);

    pub const LAYOUT: SlotLayout = SlotLayout {
        api: Api::D3D9,
        segments: SEGMENTS,
        hooks: &[
            HookSlot { op: Operation::Present, name: "D3D9EndScene", offset: END_SCENE },
            HookSlot { op: Operation::Resize, name: "D3D9Reset", offset: RESET },
        ],
    };
}

/// Direct3D 10: swap chain, then device
pub mod d3d10 {
    use super::*;

    pub const SWAP_CHAIN: usize = 0;
    pub const DEVICE: usize = 1;

    pub const SEGMENTS: &[Segment] = &[
        Segment::new("IDXGISwapChain", dxgi_swap_chain::COUNT),
        Segment::new("ID3D10Device", 98),
    ];

    pub const PRESENT: usize = flat(SEGMENTS, SWAP_CHAIN, dxgi_swap_chain::PRESENT);
    pub const RESIZE_BUFFERS: usize = flat(SEGMENTS, SWAP_CHAIN, dxgi_swap_chain::RESIZE_BUFFERS);

    pub const LAYOUT: SlotLayout = SlotLayout {
        api: Api::D3D10,
        segments: SEGMENTS,
        hooks: &[
            HookSlot { op: Operation::Present, name: "D3D10Present", offset: PRESENT },
            HookSlot { op: Operation::Resize, name: "D3D10ResizeBuffers", offset: RESIZE_BUFFERS },
        ],
    };
}

/// Direct3D 11: swap chain, device, immediate context
pub mod d3d11 {
    use super::*;

    pub const SWAP_CHAIN: usize = 0;
    pub const DEVICE: usize = 1;
    pub const CONTEXT: usize = 2;

    pub const SEGMENTS: &[Segment] = &[
        Segment::new("IDXGISwapChain", dxgi_swap_chain::COUNT),
        Segment::new("ID3D11Device", 43),
        Segment::new("ID3D11DeviceContext", 144),
    ];

    pub const PRESENT: usize = flat(SEGMENTS, SWAP_CHAIN, dxgi_swap_chain::PRESENT);
    pub const RESIZE_BUFFERS: usize = flat(SEGMENTS, SWAP_CHAIN, dxgi_swap_chain::RESIZE_BUFFERS);

    pub const LAYOUT: SlotLayout = SlotLayout {
        api: Api::D3D11,
        segments: SEGMENTS,
        hooks: &[
            HookSlot { op: Operation::Present, name: "D3D11Present", offset: PRESENT },
            HookSlot { op: Operation::Resize, name: "D3D11ResizeBuffers", offset: RESIZE_BUFFERS },
        ],
    };
}

/// Direct3D 12: device, queue, allocator, command list, swap chain
pub mod d3d12 {
    use super::*;

    pub const DEVICE: usize = 0;
    pub const COMMAND_QUEUE: usize = 1;
    pub const COMMAND_ALLOCATOR: usize = 2;
    pub const COMMAND_LIST: usize = 3;
    pub const SWAP_CHAIN: usize = 4;

    pub const SEGMENTS: &[Segment] = &[
        Segment::new("ID3D12Device", 44),
        Segment::new("ID3D12CommandQueue", 19),
        Segment::new("ID3D12CommandAllocator", 9),
        Segment::new("ID3D12GraphicsCommandList", 60),
        Segment::new("IDXGISwapChain", dxgi_swap_chain::COUNT),
    ];

    pub const EXECUTE_COMMAND_LISTS: usize =
        flat(SEGMENTS, COMMAND_QUEUE, d3d12_queue::EXECUTE_COMMAND_LISTS);
    pub const PRESENT: usize = flat(SEGMENTS, SWAP_CHAIN, dxgi_swap_chain::PRESENT);
    pub const RESIZE_BUFFERS: usize = flat(SEGMENTS, SWAP_CHAIN, dxgi_swap_chain::RESIZE_BUFFERS);

    pub const LAYOUT: SlotLayout = SlotLayout {
        api: Api::D3D12,
        segments: SEGMENTS,
        hooks: &[
            HookSlot {
                op: Operation::ExecuteCommandLists,
                name: "D3D12ExecuteCommandLists",
                offset: EXECUTE_COMMAND_LISTS,
            },
            HookSlot { op: Operation::Resize, name: "D3D12ResizeBuffers", offset: RESIZE_BUFFERS },
            HookSlot { op: Operation::Present, name: "D3D12Present", offset: PRESENT },
        ],
    };
}

/// OpenGL: the platform swap-buffers export
pub mod opengl {
    use super::*;

    #[cfg(windows)]
    pub const SWAP_BUFFERS_SYMBOL: &str = "wglSwapBuffers";
    #[cfg(not(windows))]
    pub const SWAP_BUFFERS_SYMBOL: &str = "glXSwapBuffers";

    pub const SEGMENTS: &[Segment] = &[Segment::new(SWAP_BUFFERS_SYMBOL, 1)];

    pub const SWAP_BUFFERS: usize = flat(SEGMENTS, 0, 0);

    pub const LAYOUT: SlotLayout = SlotLayout {
        api: Api::OpenGL,
        segments: SEGMENTS,
        hooks: &[HookSlot { op: Operation::Present, name: SWAP_BUFFERS_SYMBOL, offset: SWAP_BUFFERS }],
    };
}

/// Vulkan: device-level entry points resolved through `vkGetDeviceProcAddr`
pub mod vulkan {
    use super::*;

    pub const SEGMENTS: &[Segment] = &[
        Segment::new("vkAcquireNextImageKHR", 1),
        Segment::new("vkQueuePresentKHR", 1),
        Segment::new("vkCreateSwapchainKHR", 1),
    ];

    pub const ACQUIRE_NEXT_IMAGE: usize = flat(SEGMENTS, 0, 0);
    pub const QUEUE_PRESENT: usize = flat(SEGMENTS, 1, 0);
    pub const CREATE_SWAPCHAIN: usize = flat(SEGMENTS, 2, 0);

    pub const LAYOUT: SlotLayout = SlotLayout {
        api: Api::Vulkan,
        segments: SEGMENTS,
        hooks: &[
            HookSlot {
                op: Operation::AcquireNextImage,
                name: "vkAcquireNextImageKHR",
                offset: ACQUIRE_NEXT_IMAGE,
            },
            HookSlot { op: Operation::Present, name: "vkQueuePresentKHR", offset: QUEUE_PRESENT },
            HookSlot { op: Operation::Resize, name: "vkCreateSwapchainKHR", offset: CREATE_SWAPCHAIN },
        ],
    };
}

const _: () = assert!(d3d9::LAYOUT.len() == 119 && d3d9::LAYOUT.is_consistent());
const _: () = assert!(d3d10::LAYOUT.len() == 116 && d3d10::LAYOUT.is_consistent());
const _: () = assert!(d3d11::LAYOUT.len() == 205 && d3d11::LAYOUT.is_consistent());
const _: () = assert!(d3d12::LAYOUT.len() == 150 && d3d12::LAYOUT.is_consistent());
const _: () = assert!(opengl::LAYOUT.len() == 1 && opengl::LAYOUT.is_consistent());
const _: () = assert!(vulkan::LAYOUT.len() == 3 && vulkan::LAYOUT.is_consistent());
