//! Host callback registration
//!
//! Four independently optional handlers. The set is shared by every
//! session and swapped atomically, so a hook firing mid-replacement sees
//! either the old set or the new one, never a mix.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use framejack_sdk::RenderContext;
use parking_lot::RwLock;

/// Frame boundary handler
pub type PresentCallback = Arc<dyn Fn() + Send + Sync>;
/// Swap chain resize/recreate handler
pub type ResizeCallback = Arc<dyn Fn() + Send + Sync>;
/// First real device or queue handler
pub type DeviceCreatedCallback = Arc<dyn Fn(*mut c_void) + Send + Sync>;
/// Per-frame render handler
pub type RenderCallback = Arc<dyn Fn(&RenderContext) + Send + Sync>;

bitflags! {
    /// Which callbacks are registered
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CallbackSet: u8 {
        const PRESENT = 0x01;
        const RESIZE = 0x02;
        const DEVICE_CREATED = 0x04;
        const RENDER = 0x08;
    }
}

/// The callback record handed to [`set_callbacks`](crate::set_callbacks)
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_present: Option<PresentCallback>,
    pub on_resize: Option<ResizeCallback>,
    pub on_device_created: Option<DeviceCreatedCallback>,
    pub on_render: Option<RenderCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_present<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_present = Some(Arc::new(f));
        self
    }

    pub fn on_resize<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_resize = Some(Arc::new(f));
        self
    }

    pub fn on_device_created<F>(mut self, f: F) -> Self
    where
        F: Fn(*mut c_void) + Send + Sync + 'static,
    {
        self.on_device_created = Some(Arc::new(f));
        self
    }

    pub fn on_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&RenderContext) + Send + Sync + 'static,
    {
        self.on_render = Some(Arc::new(f));
        self
    }

    pub fn registered(&self) -> CallbackSet {
        let mut set = CallbackSet::empty();
        set.set(CallbackSet::PRESENT, self.on_present.is_some());
        set.set(CallbackSet::RESIZE, self.on_resize.is_some());
        set.set(CallbackSet::DEVICE_CREATED, self.on_device_created.is_some());
        set.set(CallbackSet::RENDER, self.on_render.is_some());
        set
    }

    pub(crate) fn present(&self) {
        if let Some(cb) = &self.on_present {
            cb();
        }
    }

    pub(crate) fn resize(&self) {
        if let Some(cb) = &self.on_resize {
            cb();
        }
    }

    pub(crate) fn device_created(&self, device: *mut c_void) {
        if let Some(cb) = &self.on_device_created {
            cb(device);
        }
    }

    /// Build a context and invoke OnRender, only if it is registered
    pub(crate) fn render(&self, build: impl FnOnce() -> Option<RenderContext>) {
        if let Some(cb) = &self.on_render {
            if let Some(ctx) = build() {
                cb(&ctx);
            }
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callbacks").field(&self.registered()).finish()
    }
}

/// Shared, replaceable callback set
#[derive(Debug, Default)]
pub struct CallbackSlot {
    current: RwLock<Arc<Callbacks>>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set
    pub fn replace(&self, callbacks: Callbacks) {
        tracing::debug!("Callbacks set: {:?}", callbacks.registered());
        *self.current.write() = Arc::new(callbacks);
    }

    /// The set as of now; stays valid if replaced meanwhile
    pub fn snapshot(&self) -> Arc<Callbacks> {
        self.current.read().clone()
    }
}
