//! Win32 module lookup and hidden window creation

use std::ffi::{c_void, CString};
use std::iter::once;
use std::ptr::NonNull;

use parking_lot::Mutex;
use windows::core::{w, PCSTR, PCWSTR};
use windows::Win32::Foundation::{
    GetLastError, ERROR_CLASS_ALREADY_EXISTS, HINSTANCE, HMODULE, HWND, LPARAM, LRESULT, WPARAM,
};
use windows::Win32::Graphics::Gdi::HBRUSH;
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, RegisterClassExW, UnregisterClassW, HMENU,
    CS_HREDRAW, CS_VREDRAW, WINDOW_EX_STYLE, WNDCLASSEXW, WS_OVERLAPPEDWINDOW,
};

use crate::error::HostError;
use crate::platform::{HostPlatform, HostWindow};

/// Serializes class registration against unregistration
static CLASS_LOCK: Mutex<()> = Mutex::new(());

/// Host backed by `GetModuleHandleW`/`GetProcAddress`
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeHost;

impl NativeHost {
    pub const fn new() -> Self {
        Self
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(once(0)).collect()
}

fn module_handle(module: &str) -> Result<HMODULE, HostError> {
    let name = wide(module);
    // SAFETY: `name` is NUL terminated; GetModuleHandleW never loads a module
    unsafe { GetModuleHandleW(PCWSTR(name.as_ptr())) }
        .map_err(|_| HostError::ModuleNotLoaded(module.into()))
}

unsafe extern "system" fn bootstrap_wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

/// Window plus the class registered for it
struct BootstrapWindow {
    hwnd: HWND,
    class: Vec<u16>,
    instance: HINSTANCE,
}

// SAFETY: the window is created and destroyed on the bootstrap thread; the
// handle is only ever read elsewhere
unsafe impl Send for BootstrapWindow {}

impl HostWindow for BootstrapWindow {
    fn raw(&self) -> *mut c_void {
        self.hwnd.0
    }
}

impl Drop for BootstrapWindow {
    fn drop(&mut self) {
        let _guard = CLASS_LOCK.lock();
        // SAFETY: handle and class were produced by create_window
        unsafe {
            if let Err(e) = DestroyWindow(self.hwnd) {
                tracing::debug!("DestroyWindow failed: {}", e);
            }
            let _ = UnregisterClassW(PCWSTR(self.class.as_ptr()), self.instance);
        }
    }
}

impl HostPlatform for NativeHost {
    fn is_module_loaded(&self, module: &str) -> bool {
        module_handle(module).is_ok()
    }

    fn resolve(&self, module: &str, symbol: &str) -> Result<NonNull<c_void>, HostError> {
        let handle = module_handle(module)?;
        let name = CString::new(symbol).map_err(|_| HostError::InvalidName(symbol.into()))?;

        // SAFETY: valid module handle and C string
        let proc = unsafe { GetProcAddress(handle, PCSTR(name.as_ptr().cast())) };
        proc.and_then(|f| NonNull::new(f as *mut c_void))
            .ok_or_else(|| HostError::SymbolNotFound {
                module: module.into(),
                symbol: symbol.into(),
            })
    }

    fn create_window(&self, class_name: &str) -> Result<Box<dyn HostWindow>, HostError> {
        let _guard = CLASS_LOCK.lock();
        let class = wide(class_name);

        // SAFETY: null name returns the host executable's handle
        let module = unsafe { GetModuleHandleW(PCWSTR::null()) }
            .map_err(|e| HostError::WindowCreation(e.to_string()))?;
        let instance = HINSTANCE(module.0);

        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(bootstrap_wnd_proc),
            hInstance: instance,
            hbrBackground: HBRUSH::default(),
            lpszClassName: PCWSTR(class.as_ptr()),
            ..Default::default()
        };

        // SAFETY: `wc` and `class` outlive the call
        unsafe {
            if RegisterClassExW(&wc) == 0 && GetLastError() != ERROR_CLASS_ALREADY_EXISTS {
                return Err(HostError::WindowCreation(format!(
                    "RegisterClassExW failed for {}",
                    class_name
                )));
            }

            let hwnd = CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                PCWSTR(class.as_ptr()),
                w!("framejack"),
                WS_OVERLAPPEDWINDOW,
                0,
                0,
                100,
                100,
                HWND::default(),
                HMENU::default(),
                instance,
                None,
            );

            match hwnd {
                Ok(hwnd) => {
                    tracing::debug!("Created bootstrap window {:p}", hwnd.0);
                    Ok(Box::new(BootstrapWindow {
                        hwnd,
                        class,
                        instance,
                    }))
                }
                Err(e) => {
                    let _ = UnregisterClassW(PCWSTR(class.as_ptr()), instance);
                    Err(HostError::WindowCreation(e.to_string()))
                }
            }
        }
    }
}
