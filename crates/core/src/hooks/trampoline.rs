//! Executable memory for detour trampolines
//!
//! Relocated prologues keep their RIP-relative operands, so a trampoline
//! must sit within ±2GB of the function it was copied from. Pages are
//! carved into fixed-size slots and never returned to the OS: a thread may
//! still be executing a trampoline after its hook is removed. Only a slot
//! that never held a live trampoline goes back to the pool for reuse.

use std::collections::BTreeMap;
use std::ptr::NonNull;

use parking_lot::Mutex;

const PAGE_SIZE: usize = 4096;

/// Bytes reserved per trampoline (relocated prologue plus jump back)
pub const SLOT_SIZE: usize = 64;

/// Maximum distance usable by a rel32 displacement
const MAX_RANGE: usize = 0x7FFF_0000;

/// Step between hint addresses while searching for a free page
const SEARCH_STEP: usize = PAGE_SIZE * 64;

static POOL: Mutex<SlotPool> = Mutex::new(SlotPool::new());

struct Page {
    base: NonNull<u8>,
    used: usize,
}

// SAFETY: pages are only touched while POOL is locked
unsafe impl Send for Page {}

struct SlotPool {
    pages: BTreeMap<usize, Page>,
    /// Slots handed back before any hook used them
    free: Vec<usize>,
}

fn distance(a: usize, b: usize) -> usize {
    a.abs_diff(b)
}

/// Whether `a` and `b` are close enough for a rel32 displacement
pub fn within_rel32(a: usize, b: usize) -> bool {
    distance(a, b) < MAX_RANGE
}

impl SlotPool {
    const fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
            free: Vec::new(),
        }
    }

    fn take_near(&mut self, target: usize) -> Option<NonNull<u8>> {
        if let Some(index) = self.free.iter().position(|slot| within_rel32(*slot, target)) {
            return NonNull::new(self.free.swap_remove(index) as *mut u8);
        }

        let reusable = self
            .pages
            .iter_mut()
            .find(|(base, page)| within_rel32(**base, target) && page.used + SLOT_SIZE <= PAGE_SIZE);

        let page = match reusable {
            Some((_, page)) => page,
            None => {
                let base = map_page_near(target)?;
                self.pages
                    .entry(base.as_ptr() as usize)
                    .or_insert(Page { base, used: 0 })
            }
        };

        // SAFETY: used + SLOT_SIZE <= PAGE_SIZE for reused pages, 0 for fresh ones
        let slot = unsafe { page.base.as_ptr().add(page.used) };
        page.used += SLOT_SIZE;
        NonNull::new(slot)
    }

    fn give_back(&mut self, slot: NonNull<u8>) {
        self.free.push(slot.as_ptr() as usize);
    }
}

fn hints(target: usize) -> impl Iterator<Item = usize> {
    let start = target.saturating_sub(MAX_RANGE) & !(PAGE_SIZE - 1);
    let end = target.saturating_add(MAX_RANGE);
    (start..end).step_by(SEARCH_STEP).filter(|hint| *hint != 0)
}

#[cfg(unix)]
fn map_page_near(target: usize) -> Option<NonNull<u8>> {
    use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
    use std::num::NonZeroUsize;

    let len = NonZeroUsize::new(PAGE_SIZE)?;
    let prot = ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC;
    let flags = MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS;

    for hint in hints(target) {
        // SAFETY: anonymous private mapping, the hint is advisory
        let Ok(ptr) = (unsafe { mmap_anonymous(NonZeroUsize::new(hint), len, prot, flags) }) else {
            continue;
        };

        if within_rel32(ptr.as_ptr() as usize, target) {
            return Some(ptr.cast());
        }
        // SAFETY: mapping we just created
        unsafe {
            let _ = munmap(ptr, PAGE_SIZE);
        }
    }

    // Out-of-range pages still work for prologues without relative operands
    // SAFETY: anonymous private mapping
    match unsafe { mmap_anonymous(None, len, prot, flags) } {
        Ok(ptr) => {
            tracing::warn!(
                "Trampoline page at {:x} is out of rel32 range of {:x}",
                ptr.as_ptr() as usize,
                target
            );
            Some(ptr.cast())
        }
        Err(e) => {
            tracing::error!("Failed to map trampoline page near {:x}: {}", target, e);
            None
        }
    }
}

#[cfg(windows)]
fn map_page_near(target: usize) -> Option<NonNull<u8>> {
    use windows::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE,
    };

    for hint in hints(target) {
        // SAFETY: reserving and committing fresh memory at an advisory address
        let ptr = unsafe {
            VirtualAlloc(
                Some(hint as *const std::ffi::c_void),
                PAGE_SIZE,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_EXECUTE_READWRITE,
            )
        };
        let Some(base) = NonNull::new(ptr.cast::<u8>()) else {
            continue;
        };

        if within_rel32(base.as_ptr() as usize, target) {
            return Some(base);
        }
        // SAFETY: allocation we just made
        unsafe {
            let _ = VirtualFree(ptr, 0, MEM_RELEASE);
        }
    }

    tracing::error!("Failed to allocate trampoline page near {:x}", target);
    None
}

/// Reserve one trampoline slot near `target`
pub fn alloc_near(target: *const u8) -> Option<NonNull<u8>> {
    POOL.lock().take_near(target as usize)
}

/// Return a slot from [`alloc_near`] that no hook ever pointed at
pub fn release_unused(slot: NonNull<u8>) {
    POOL.lock().give_back(slot);
}
