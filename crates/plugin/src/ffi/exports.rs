//! C-compatible exports called by the host

use std::ffi::c_void;

use tracing::instrument;

use framejack_core::{BootstrapState, Callbacks};
use framejack_sdk::{Api, RenderContext};

use crate::logging::{self, LogHandler};

/// Callback table passed to [`framejack_set_callbacks`]
///
/// Every pointer is optional. `user_data` is handed back unchanged as the
/// last argument of each call.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FrameJackCallbacks {
    pub on_present: Option<unsafe extern "C" fn(user_data: *mut c_void)>,
    pub on_resize: Option<unsafe extern "C" fn(user_data: *mut c_void)>,
    pub on_device_created: Option<unsafe extern "C" fn(device: *mut c_void, user_data: *mut c_void)>,
    pub on_render: Option<unsafe extern "C" fn(ctx: *const RenderContext, user_data: *mut c_void)>,
    pub user_data: *mut c_void,
}

impl FrameJackCallbacks {
    /// Wrap the C pointers in a [`Callbacks`] set
    ///
    /// Validity of the pointers is the registration contract of
    /// [`framejack_set_callbacks`].
    fn to_callbacks(self) -> Callbacks {
        // Carried as an address so the closures stay Send + Sync
        let user_data = self.user_data as usize;
        let mut callbacks = Callbacks::new();

        if let Some(f) = self.on_present {
            // SAFETY: validity is the caller's contract on registration
            callbacks = callbacks.on_present(move || unsafe { f(user_data as *mut c_void) });
        }
        if let Some(f) = self.on_resize {
            // SAFETY: as above
            callbacks = callbacks.on_resize(move || unsafe { f(user_data as *mut c_void) });
        }
        if let Some(f) = self.on_device_created {
            // SAFETY: as above
            callbacks =
                callbacks.on_device_created(move |device| unsafe { f(device, user_data as *mut c_void) });
        }
        if let Some(f) = self.on_render {
            // SAFETY: ctx outlives the call; validity of f is the caller's contract
            callbacks = callbacks.on_render(move |ctx| unsafe { f(ctx, user_data as *mut c_void) });
        }
        callbacks
    }
}

/// Start intercepting the given API (`0` = auto-detect)
///
/// Returns false for an unknown value, a second initialize, or a backend
/// whose library is not loaded.
#[no_mangle]
#[instrument]
pub extern "C" fn framejack_initialize(api: u32) -> bool {
    logging::init();

    let Some(api) = Api::from_raw(api) else {
        tracing::warn!("Unknown graphics API value {}", api);
        return false;
    };
    framejack_core::initialize(api)
}

/// Remove every hook and end the session; safe to call at any time
#[no_mangle]
#[instrument]
pub extern "C" fn framejack_shutdown() {
    logging::init();
    framejack_core::shutdown();
}

/// Replace the registered callbacks; null clears them
///
/// # Safety
/// - `callbacks` must be null or point to a valid [`FrameJackCallbacks`]
/// - Every function pointer and `user_data` must remain valid until the
///   callbacks are replaced again and the session is shut down
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn framejack_set_callbacks(callbacks: *const FrameJackCallbacks) {
    logging::init();

    let callbacks = match callbacks.as_ref() {
        Some(table) => table.to_callbacks(),
        None => Callbacks::new(),
    };
    framejack_core::set_callbacks(callbacks);
}

/// The active backend as its raw value, `0` when there is no session
#[no_mangle]
pub extern "C" fn framejack_get_active_api() -> u32 {
    framejack_core::active_api() as u32
}

/// Bootstrap progress: 0 none, 1 pending, 2 ready, 3 abandoned, 4 stopped
#[no_mangle]
pub extern "C" fn framejack_get_bootstrap_state() -> u32 {
    bootstrap_state_code(framejack_core::bootstrap_state())
}

/// Switch between WARN-and-above and DEBUG-and-above output
#[no_mangle]
pub extern "C" fn framejack_set_debug_logging(enabled: bool) {
    logging::init();
    logging::set_debug(enabled);
}

/// Route log lines to `handler`, or back to stdout when null
///
/// # Safety
/// `handler` must stay callable from any thread until it is replaced.
#[no_mangle]
pub unsafe extern "C" fn framejack_set_log_handler(handler: Option<LogHandler>) {
    logging::set_handler(handler);
    logging::init();
}

fn bootstrap_state_code(state: Option<BootstrapState>) -> u32 {
    match state {
        None => 0,
        Some(BootstrapState::Pending) => 1,
        Some(BootstrapState::Ready) => 2,
        Some(BootstrapState::Abandoned) => 3,
        Some(BootstrapState::Stopped) => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static PRESENTS: AtomicUsize = AtomicUsize::new(0);
    static DEVICE: AtomicUsize = AtomicUsize::new(0);
    static RENDER_IMAGE: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn present(user_data: *mut c_void) {
        assert_eq!(user_data as usize, 0xABCD);
        PRESENTS.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn device_created(device: *mut c_void, user_data: *mut c_void) {
        assert_eq!(user_data as usize, 0xABCD);
        DEVICE.store(device as usize, Ordering::SeqCst);
    }

    unsafe extern "C" fn render(ctx: *const RenderContext, user_data: *mut c_void) {
        assert_eq!(user_data as usize, 0xABCD);
        RENDER_IMAGE.store((*ctx).image_index as usize, Ordering::SeqCst);
    }

    #[test]
    fn test_callbacks_forward_user_data() {
        let table = FrameJackCallbacks {
            on_present: Some(present),
            on_resize: None,
            on_device_created: Some(device_created),
            on_render: Some(render),
            user_data: 0xABCD as *mut c_void,
        };
        let callbacks = table.to_callbacks();
        assert!(callbacks.on_resize.is_none());

        (callbacks.on_present.as_ref().unwrap())();
        (callbacks.on_device_created.as_ref().unwrap())(0x1234 as *mut c_void);
        let ctx = RenderContext::new(Api::Vulkan).with_image_index(2);
        (callbacks.on_render.as_ref().unwrap())(&ctx);

        assert_eq!(PRESENTS.load(Ordering::SeqCst), 1);
        assert_eq!(DEVICE.load(Ordering::SeqCst), 0x1234);
        assert_eq!(RENDER_IMAGE.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_api_is_rejected() {
        assert!(!framejack_initialize(7));
        assert!(!framejack_initialize(u32::MAX));
        assert_eq!(framejack_get_active_api(), 0);
        assert_eq!(framejack_get_bootstrap_state(), 0);
    }

    #[test]
    fn test_bootstrap_state_codes() {
        assert_eq!(bootstrap_state_code(None), 0);
        assert_eq!(bootstrap_state_code(Some(BootstrapState::Pending)), 1);
        assert_eq!(bootstrap_state_code(Some(BootstrapState::Ready)), 2);
        assert_eq!(bootstrap_state_code(Some(BootstrapState::Abandoned)), 3);
        assert_eq!(bootstrap_state_code(Some(BootstrapState::Stopped)), 4);
    }
}
