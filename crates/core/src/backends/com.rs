//! Minimal COM plumbing for bootstrap objects

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use framejack_sdk::d3d::{unknown, ReleaseFn, HRESULT};

use crate::error::{check_hr, BootstrapError};

/// Read entry `index` of the dispatch table at the front of `object`
///
/// # Safety
/// `object` must be a live COM object whose vtable has more than `index`
/// entries, and `F` must be that entry's function pointer type.
pub unsafe fn method<F: Copy>(object: *mut c_void, index: usize) -> F {
    let vtable = *(object as *const *const usize);
    let addr = *vtable.add(index);
    std::mem::transmute_copy::<usize, F>(&addr)
}

/// Drop one reference on `object`
///
/// # Safety
/// `object` must be a live COM object we hold a reference on.
pub unsafe fn release(object: *mut c_void) -> u32 {
    method::<ReleaseFn>(object, unknown::RELEASE)(object)
}

/// Owned COM reference, released on drop
pub struct ComPtr(NonNull<c_void>);

impl ComPtr {
    /// Take ownership of one reference
    ///
    /// # Safety
    /// `raw` must be null or a live COM object whose reference we own.
    pub unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// # Safety
    /// See [`method`].
    pub unsafe fn method<F: Copy>(&self, index: usize) -> F {
        method(self.as_ptr(), index)
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        // SAFETY: we own exactly one reference
        unsafe {
            release(self.as_ptr());
        }
    }
}

/// Run a creation call with a single out-pointer and own the result
///
/// An object written before a failing HRESULT is still released.
///
/// # Safety
/// `create` must write either null or an owned COM reference.
pub unsafe fn create(
    call: &'static str,
    create: impl FnOnce(*mut *mut c_void) -> HRESULT,
) -> Result<ComPtr, BootstrapError> {
    let mut raw = ptr::null_mut();
    let hr = create(&mut raw);
    let object = ComPtr::from_raw(raw);
    check_hr(call, hr)?;
    object.ok_or(BootstrapError::NullObject(call))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCom;
    use framejack_sdk::d3d::{E_FAIL, S_OK};

    #[test]
    fn test_com_ptr_releases_on_drop() {
        let object = FakeCom::new(3, 0);
        {
            let _owned = unsafe { ComPtr::from_raw(object.as_ptr()) }.unwrap();
        }
        assert_eq!(object.refs(), 0);
    }

    #[test]
    fn test_create_releases_object_on_failure() {
        let object = FakeCom::new(3, 0);
        let result = unsafe {
            create("CreateThing", |out| {
                *out = object.as_ptr();
                E_FAIL
            })
        };
        assert!(matches!(result, Err(BootstrapError::Call { call: "CreateThing", .. })));
        assert_eq!(object.refs(), 0);
    }

    #[test]
    fn test_create_rejects_null_success() {
        let result = unsafe { create("CreateNothing", |_| S_OK) };
        assert!(matches!(result, Err(BootstrapError::NullObject("CreateNothing"))));
    }
}
