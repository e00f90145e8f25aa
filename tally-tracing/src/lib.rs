use std::{fmt::Debug, ptr::NonNull};

use tally_core::{AllocError, Allocator, Deallocator, NonZeroLayout};
use tracing::instrument;

/// Wraps an allocator and emits a `tracing` span for every call that goes
/// through it.
#[derive(Debug)]
pub struct Traced<A> {
    inner: A,
}

impl<A> Traced<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &A {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

unsafe impl<A> Deallocator for Traced<A>
where
    A: Deallocator + Debug,
{
    #[inline]
    #[instrument]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: NonZeroLayout) {
        unsafe { self.inner.deallocate(ptr, layout) }
    }
}

unsafe impl<A> Allocator for Traced<A>
where
    A: Allocator + Debug,
{
    #[inline]
    #[instrument]
    fn allocate(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        self.inner.allocate(layout)
    }

    #[inline]
    #[instrument]
    fn allocate_zeroed(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        self.inner.allocate_zeroed(layout)
    }
}
