//! Probes shared by the unit tests: a pass-through allocator that counts
//! traffic and a value that counts its own drops.

use std::{cell::Cell, ptr::NonNull, rc::Rc};

use tally_core::{AllocError, Allocator, Deallocator, NonZeroLayout};

use crate::Global;

#[derive(Debug, Default)]
pub(crate) struct Counts {
    allocated: Cell<usize>,
    freed: Cell<usize>,
}

impl Counts {
    pub(crate) fn allocated(&self) -> usize {
        self.allocated.get()
    }

    pub(crate) fn freed(&self) -> usize {
        self.freed.get()
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct CountingAlloc {
    counts: Rc<Counts>,
}

impl CountingAlloc {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn counts(&self) -> Rc<Counts> {
        Rc::clone(&self.counts)
    }
}

unsafe impl Deallocator for CountingAlloc {
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: NonZeroLayout) {
        self.counts.freed.set(self.counts.freed.get() + 1);
        unsafe { Global.deallocate(ptr, layout) };
    }
}

unsafe impl Allocator for CountingAlloc {
    fn allocate(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        let ptr = Global.allocate(layout)?;
        self.counts.allocated.set(self.counts.allocated.get() + 1);
        Ok(ptr)
    }
}

#[derive(Debug)]
pub(crate) struct DropProbe {
    drops: Rc<Cell<usize>>,
}

impl DropProbe {
    pub(crate) fn new(drops: &Rc<Cell<usize>>) -> Self {
        Self {
            drops: Rc::clone(drops),
        }
    }
}

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}
