//! Captured method tables
//!
//! A [`MethodTable`] only exists fully populated: the builder refuses to
//! finish until every segment of the layout has been filled with non-null
//! entries, so a partially copied table can never be hooked from.

use std::ffi::c_void;

use framejack_sdk::{HookSlot, Operation, SlotLayout};

use crate::error::BootstrapError;

/// Raw function addresses copied from real dispatch tables
#[derive(Debug)]
pub struct MethodTable {
    layout: &'static SlotLayout,
    entries: Box<[usize]>,
}

impl MethodTable {
    pub fn builder(layout: &'static SlotLayout) -> MethodTableBuilder {
        MethodTableBuilder {
            layout,
            entries: Vec::with_capacity(layout.len()),
            segment: 0,
        }
    }

    pub fn layout(&self) -> &'static SlotLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[usize] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<*const ()> {
        self.entries.get(index).map(|addr| *addr as *const ())
    }

    /// Hook slot and captured address for `op`
    pub fn address(&self, op: Operation) -> Option<(&'static HookSlot, *const ())> {
        let slot = self.layout.hook(op)?;
        Some((slot, self.get(slot.offset)?))
    }
}

/// Fills a [`MethodTable`] one segment at a time, in layout order
#[derive(Debug)]
pub struct MethodTableBuilder {
    layout: &'static SlotLayout,
    entries: Vec<usize>,
    segment: usize,
}

impl MethodTableBuilder {
    fn next_len(&self) -> Result<usize, BootstrapError> {
        self.layout
            .segments
            .get(self.segment)
            .map(|segment| segment.len)
            .ok_or_else(|| self.incomplete())
    }

    fn incomplete(&self) -> BootstrapError {
        BootstrapError::IncompleteTable {
            api: self.layout.api,
            captured: self.entries.len(),
            expected: self.layout.len(),
        }
    }

    /// Copy the next segment from the dispatch table at the front of `object`
    ///
    /// # Safety
    /// `object` must be a live COM-style object whose vtable has at least as
    /// many entries as the segment.
    pub unsafe fn copy_vtable(
        &mut self,
        object: *mut c_void,
        what: &'static str,
    ) -> Result<&mut Self, BootstrapError> {
        let len = self.next_len()?;
        if object.is_null() {
            return Err(BootstrapError::NullObject(what));
        }

        let vtable = *(object as *const *const usize);
        if vtable.is_null() {
            return Err(BootstrapError::NullObject(what));
        }

        let entries = std::slice::from_raw_parts(vtable, len);
        tracing::debug!("Copying {} entries of {} from {:p}", len, what, vtable);
        self.entries.extend_from_slice(entries);
        self.segment += 1;
        Ok(self)
    }

    /// Append a resolved address as the next single-entry segment
    pub fn push_address(
        &mut self,
        address: *const c_void,
        what: &'static str,
    ) -> Result<&mut Self, BootstrapError> {
        if self.next_len()? != 1 {
            return Err(self.incomplete());
        }
        if address.is_null() {
            return Err(BootstrapError::NullObject(what));
        }

        self.entries.push(address as usize);
        self.segment += 1;
        Ok(self)
    }

    pub fn finish(self) -> Result<MethodTable, BootstrapError> {
        let complete = self.segment == self.layout.segments.len()
            && self.entries.len() == self.layout.len()
            && self.entries.iter().all(|addr| *addr != 0);
        if !complete {
            return Err(self.incomplete());
        }

        Ok(MethodTable {
            layout: self.layout,
            entries: self.entries.into_boxed_slice(),
        })
    }
}
