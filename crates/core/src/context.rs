//! Per-session state shared with hook entry points
//!
//! Detours are plain `extern` functions, so the active session is handed to
//! them through a single process-wide slot. Only one session may hold it at
//! a time. Handles captured by the detours are atomics: concurrent presents
//! race, the last writer wins and no value is ever torn.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use framejack_sdk::Api;
use parking_lot::RwLock;

use crate::callbacks::{CallbackSlot, Callbacks};

static ACTIVE: RwLock<Option<Arc<SessionContext>>> = RwLock::new(None);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Backend objects observed by the detours
#[derive(Debug, Default)]
pub struct CapturedState {
    device: AtomicPtr<c_void>,
    swap_chain: AtomicPtr<c_void>,
    queue: AtomicPtr<c_void>,
    image_index: AtomicU32,
    /// Device reference we own and must release at teardown
    retained: AtomicPtr<c_void>,
}

impl CapturedState {
    pub fn device(&self) -> *mut c_void {
        self.device.load(Ordering::Acquire)
    }

    pub fn swap_chain(&self) -> *mut c_void {
        self.swap_chain.load(Ordering::Acquire)
    }

    pub fn queue(&self) -> *mut c_void {
        self.queue.load(Ordering::Acquire)
    }

    pub fn image_index(&self) -> u32 {
        self.image_index.load(Ordering::Acquire)
    }

    pub fn set_swap_chain(&self, swap_chain: *mut c_void) {
        self.swap_chain.store(swap_chain, Ordering::Release);
    }

    pub fn set_image_index(&self, index: u32) {
        self.image_index.store(index, Ordering::Release);
    }

    /// Record the device; true only for the first non-null device seen
    pub fn claim_device(&self, device: *mut c_void) -> bool {
        !device.is_null()
            && self
                .device
                .compare_exchange(ptr::null_mut(), device, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Like [`claim_device`](Self::claim_device), keeping a reference we release later
    pub fn claim_retained_device(&self, device: *mut c_void) -> bool {
        if self.claim_device(device) {
            self.retained.store(device, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Overwrite the device without claiming it
    pub fn set_device(&self, device: *mut c_void) {
        self.device.store(device, Ordering::Release);
    }

    /// Record the queue; true only for the first non-null queue seen
    pub fn claim_queue(&self, queue: *mut c_void) -> bool {
        !queue.is_null()
            && self
                .queue
                .compare_exchange(ptr::null_mut(), queue, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Hand over the retained device reference, at most once
    pub fn take_retained(&self) -> Option<*mut c_void> {
        let device = self.retained.swap(ptr::null_mut(), Ordering::AcqRel);
        (!device.is_null()).then_some(device)
    }
}

/// Everything a detour needs for one session
#[derive(Debug)]
pub struct SessionContext {
    id: u64,
    api: Api,
    callbacks: Arc<CallbackSlot>,
    state: CapturedState,
}

impl SessionContext {
    pub fn new(api: Api, callbacks: Arc<CallbackSlot>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            api,
            callbacks,
            state: CapturedState::default(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn api(&self) -> Api {
        self.api
    }

    pub fn state(&self) -> &CapturedState {
        &self.state
    }

    pub fn callbacks(&self) -> Arc<Callbacks> {
        self.callbacks.snapshot()
    }
}

/// Another session already holds the process-wide slot
#[derive(Debug, thiserror::Error)]
#[error("A {0} session is already active in this process")]
pub struct SessionBusy(pub Api);

/// Publish `session` to the hook entry points
pub fn activate(session: Arc<SessionContext>) -> Result<(), SessionBusy> {
    let mut active = ACTIVE.write();
    if let Some(current) = active.as_ref() {
        return Err(SessionBusy(current.api));
    }
    *active = Some(session);
    Ok(())
}

/// Clear the slot if `session` still holds it
pub fn deactivate(session: &SessionContext) {
    let mut active = ACTIVE.write();
    if active.as_ref().is_some_and(|current| current.id == session.id) {
        *active = None;
    }
}

/// The active session, if any
pub fn active() -> Option<Arc<SessionContext>> {
    ACTIVE.read().clone()
}

/// The active session, if it belongs to `api`
pub fn active_for(api: Api) -> Option<Arc<SessionContext>> {
    active().filter(|session| session.api == api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_first_claim_wins() {
        let state = CapturedState::default();
        let a = 0x10 as *mut c_void;
        let b = 0x20 as *mut c_void;

        assert!(!state.claim_device(ptr::null_mut()));
        assert!(state.claim_device(a));
        assert!(!state.claim_device(b));
        assert_eq!(state.device(), a);

        state.set_device(b);
        assert_eq!(state.device(), b);
    }

    #[test]
    fn test_retained_device_is_taken_once() {
        let state = CapturedState::default();
        assert!(state.claim_retained_device(0x10 as *mut c_void));
        assert_eq!(state.take_retained(), Some(0x10 as *mut c_void));
        assert_eq!(state.take_retained(), None);
    }

    #[test]
    fn test_single_active_session() {
        let _serial = testing::serial();
        let slot = Arc::new(CallbackSlot::new());
        let first = SessionContext::new(Api::D3D11, slot.clone());
        let second = SessionContext::new(Api::Vulkan, slot);

        activate(first.clone()).unwrap();
        assert!(matches!(activate(second.clone()), Err(SessionBusy(Api::D3D11))));
        assert!(active_for(Api::Vulkan).is_none());

        // A stale session cannot evict the current one
        deactivate(&second);
        assert_eq!(active().map(|s| s.id()), Some(first.id()));

        deactivate(&first);
        assert!(active().is_none());
    }
}
