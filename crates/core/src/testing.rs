//! Test doubles for the host, the patch service and COM objects

use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use framejack_host::{HostError, HostPlatform, HostWindow};
use framejack_sdk::{Api, RenderContext};
use parking_lot::{Mutex, MutexGuard};

use crate::callbacks::Callbacks;
use crate::config::{BootstrapConfig, CoreConfig};
use crate::hooks::{HookError, PatchService};
use crate::orchestrator::{BootstrapState, Orchestrator};

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialize tests that touch the active session or detour statics
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock()
}

/// How long tests wait for a bootstrap that should finish promptly
pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// COM objects
// ---------------------------------------------------------------------------

#[repr(C)]
struct FakeComObject {
    vtable: *const usize,
    refs: AtomicU32,
}

unsafe extern "system" fn fake_add_ref(this: *mut c_void) -> u32 {
    (*(this as *const FakeComObject)).refs.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
}

unsafe extern "system" fn fake_release(this: *mut c_void) -> u32 {
    (*(this as *const FakeComObject)).refs.fetch_sub(1, Ordering::SeqCst).wrapping_sub(1)
}

/// Object whose first word points at a scripted vtable
///
/// Slots 1 and 2 are working AddRef/Release; every other slot holds a
/// distinct sentinel (`base + index * 0x10`) unless overridden with
/// [`set`](Self::set). The object is never freed by Release.
pub struct FakeCom {
    vtable: Box<[usize]>,
    object: Box<FakeComObject>,
}

// SAFETY: test-only; the vtable is immutable after setup and refs is atomic
unsafe impl Send for FakeCom {}
unsafe impl Sync for FakeCom {}

impl FakeCom {
    pub fn new(len: usize, base: usize) -> Self {
        let mut vtable: Box<[usize]> = (0..len.max(3)).map(|i| base + i * 0x10).collect();
        vtable[1] = fake_add_ref as usize;
        vtable[2] = fake_release as usize;
        let object = Box::new(FakeComObject {
            vtable: vtable.as_ptr(),
            refs: AtomicU32::new(1),
        });
        Self { vtable, object }
    }

    /// Replace a vtable slot; must be called before the object is shared
    pub fn set(mut self, index: usize, function: usize) -> Self {
        self.vtable[index] = function;
        self.object.vtable = self.vtable.as_ptr();
        self
    }

    pub fn entry(&self, index: usize) -> usize {
        self.vtable[index]
    }

    pub fn as_ptr(&self) -> *mut c_void {
        &*self.object as *const FakeComObject as *mut c_void
    }

    pub fn refs(&self) -> u32 {
        self.object.refs.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// Host with a scripted module set and symbol table
#[derive(Default)]
pub struct FakeHost {
    modules: HashSet<String>,
    symbols: HashMap<(String, String), usize>,
    window_failures: bool,
    lookups: AtomicUsize,
    resolves: AtomicUsize,
    windows_created: AtomicUsize,
    windows_alive: Arc<AtomicUsize>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: &str) -> Self {
        self.modules.insert(module.to_string());
        self
    }

    pub fn with_symbol(mut self, module: &str, symbol: &str, address: usize) -> Self {
        self.modules.insert(module.to_string());
        self.symbols
            .insert((module.to_string(), symbol.to_string()), address);
        self
    }

    pub fn failing_windows(mut self) -> Self {
        self.window_failures = true;
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn windows_created(&self) -> usize {
        self.windows_created.load(Ordering::SeqCst)
    }

    pub fn windows_alive(&self) -> usize {
        self.windows_alive.load(Ordering::SeqCst)
    }
}

struct FakeWindow {
    alive: Arc<AtomicUsize>,
}

impl HostWindow for FakeWindow {
    fn raw(&self) -> *mut c_void {
        0xD00D as *mut c_void
    }
}

impl Drop for FakeWindow {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

impl HostPlatform for FakeHost {
    fn is_module_loaded(&self, module: &str) -> bool {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.modules.contains(module)
    }

    fn resolve(&self, module: &str, symbol: &str) -> Result<NonNull<c_void>, HostError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if !self.modules.contains(module) {
            return Err(HostError::ModuleNotLoaded(module.to_string()));
        }
        self.symbols
            .get(&(module.to_string(), symbol.to_string()))
            .and_then(|addr| NonNull::new(*addr as *mut c_void))
            .ok_or_else(|| HostError::SymbolNotFound {
                module: module.to_string(),
                symbol: symbol.to_string(),
            })
    }

    fn create_window(&self, _class_name: &str) -> Result<Box<dyn HostWindow>, HostError> {
        if self.window_failures {
            return Err(HostError::WindowCreation("scripted failure".into()));
        }
        self.windows_created.fetch_add(1, Ordering::SeqCst);
        self.windows_alive.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWindow {
            alive: self.windows_alive.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Patch service
// ---------------------------------------------------------------------------

/// A call made on [`FakePatcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchCall {
    Install(String),
    Activate(String),
    Remove(String),
}

#[derive(Debug, Clone)]
struct FakeHook {
    target: usize,
    replacement: usize,
    active: bool,
}

/// Records calls and returns the target itself as the pass-through pointer
#[derive(Default)]
pub struct FakePatcher {
    hooks: Mutex<HashMap<String, FakeHook>>,
    calls: Mutex<Vec<PatchCall>>,
    fail_install: Mutex<Option<String>>,
}

impl FakePatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make installing `name` fail
    pub fn fail_install_of(&self, name: &str) {
        *self.fail_install.lock() = Some(name.to_string());
    }

    pub fn calls(&self) -> Vec<PatchCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&PatchCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    pub fn target(&self, name: &str) -> Option<usize> {
        self.hooks.lock().get(name).map(|hook| hook.target)
    }

    pub fn replacement(&self, name: &str) -> Option<usize> {
        self.hooks.lock().get(name).map(|hook| hook.replacement)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.hooks.lock().get(name).is_some_and(|hook| hook.active)
    }

    pub fn installed(&self) -> usize {
        self.hooks.lock().len()
    }

    /// The installed replacement reinterpreted as `F`
    ///
    /// # Safety
    /// `F` must match the detour's signature.
    pub unsafe fn detour<F: Copy>(&self, name: &str) -> F {
        let addr = self.replacement(name).expect("hook not installed");
        std::mem::transmute_copy::<usize, F>(&addr)
    }
}

impl PatchService for FakePatcher {
    unsafe fn install_hook(
        &self,
        name: &str,
        target: *const (),
        replacement: *const (),
    ) -> Result<*const (), HookError> {
        self.calls.lock().push(PatchCall::Install(name.to_string()));
        if self.fail_install.lock().as_deref() == Some(name) {
            return Err(HookError::RelocationFailed("scripted failure".into()));
        }

        let mut hooks = self.hooks.lock();
        if hooks.contains_key(name) {
            return Err(HookError::DuplicateName(name.to_string()));
        }
        hooks.insert(
            name.to_string(),
            FakeHook {
                target: target as usize,
                replacement: replacement as usize,
                active: false,
            },
        );
        Ok(target)
    }

    fn activate(&self, name: &str) -> Result<(), HookError> {
        self.calls.lock().push(PatchCall::Activate(name.to_string()));
        let mut hooks = self.hooks.lock();
        let hook = hooks
            .get_mut(name)
            .ok_or_else(|| HookError::NotFound(name.to_string()))?;
        hook.active = true;
        Ok(())
    }

    fn remove_hook(&self, name: &str) -> Result<(), HookError> {
        self.calls.lock().push(PatchCall::Remove(name.to_string()));
        self.hooks
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| HookError::NotFound(name.to_string()))
    }

    fn is_installed(&self, name: &str) -> bool {
        self.hooks.lock().contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Config with no waiting and a single attempt
pub fn immediate_config(max_attempts: u32) -> CoreConfig {
    CoreConfig {
        bootstrap: BootstrapConfig::immediate(max_attempts),
        ..CoreConfig::default()
    }
}

/// Orchestrator over `host` and a fresh [`FakePatcher`]
pub fn orchestrator(host: FakeHost, config: CoreConfig) -> (Orchestrator, Arc<FakeHost>, Arc<FakePatcher>) {
    let host = Arc::new(host);
    let patcher = Arc::new(FakePatcher::new());
    let orchestrator = Orchestrator::new(host.clone(), patcher.clone(), config);
    (orchestrator, host, patcher)
}

/// Initialize `api` and wait for the bootstrap to reach `Ready`
pub fn bootstrapped(host: FakeHost, api: Api) -> (Orchestrator, Arc<FakeHost>, Arc<FakePatcher>) {
    let (orchestrator, host, patcher) = orchestrator(host, immediate_config(1));
    assert!(orchestrator.initialize(api), "initialize({api}) failed");
    assert_eq!(
        orchestrator.wait_for_bootstrap(BOOTSTRAP_TIMEOUT),
        Some(BootstrapState::Ready)
    );
    (orchestrator, host, patcher)
}

/// Callback invocations observed by [`Recorder::callbacks`]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Present,
    Resize,
    DeviceCreated(usize),
    Render(RenderContext),
}

// SAFETY: RenderContext only carries opaque handles compared by value in tests
unsafe impl Send for Event {}

/// Records every callback invocation in order
#[derive(Default, Clone)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callbacks(&self) -> Callbacks {
        let present = self.events.clone();
        let resize = self.events.clone();
        let device = self.events.clone();
        let render = self.events.clone();
        Callbacks::new()
            .on_present(move || present.lock().push(Event::Present))
            .on_resize(move || resize.lock().push(Event::Resize))
            .on_device_created(move |dev| device.lock().push(Event::DeviceCreated(dev as usize)))
            .on_render(move |ctx| render.lock().push(Event::Render(*ctx)))
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}
