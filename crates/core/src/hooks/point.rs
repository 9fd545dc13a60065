//! Pass-through pointers for detour functions
//!
//! A detour is a plain `extern` function, so it cannot capture the original
//! pointer the patch service hands back. Each detour reads it from a static
//! [`HookPoint`] instead.
//!
//! A point is only ever overwritten by the next install. Removing a hook
//! leaves it in place: trampolines stay mapped and the target's bytes are
//! restored, so a call still inside the detour reaches the real function.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Original-function slot for one hooked operation
pub struct HookPoint {
    name: &'static str,
    original: AtomicUsize,
}

impl HookPoint {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            original: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn set(&self, original: *const ()) {
        self.original.store(original as usize, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.original.load(Ordering::Acquire) != 0
    }

    /// The original function as `F`, if set
    ///
    /// # Safety
    /// `F` must be the function pointer type the hooked slot was declared with.
    pub unsafe fn original<F: Copy>(&self) -> Option<F> {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
        match self.original.load(Ordering::Acquire) {
            0 => None,
            addr => Some(std::mem::transmute_copy::<usize, F>(&addr)),
        }
    }
}

impl std::fmt::Debug for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookPoint")
            .field("name", &self.name)
            .field("original", &format_args!("{:#x}", self.original.load(Ordering::Relaxed)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn double(x: u32) -> u32 {
        x * 2
    }

    #[test]
    fn test_point_roundtrip() {
        static POINT: HookPoint = HookPoint::new("Double");
        assert!(!POINT.is_set());
        assert!(unsafe { POINT.original::<extern "C" fn(u32) -> u32>() }.is_none());

        POINT.set(double as *const ());
        let original = unsafe { POINT.original::<extern "C" fn(u32) -> u32>() }.unwrap();
        assert_eq!(original(21), 42);
        assert!(POINT.is_set());
    }
}
