use core::ptr::NonNull;

use tally_core::{AllocError, Allocator, Deallocator, NonZeroLayout};

/// Refuses every allocation. Useful for exercising the fallible factories.
#[derive(Debug, Default, Clone)]
pub struct Never;

unsafe impl Deallocator for Never {
    #[inline]
    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: NonZeroLayout) {
        // Nothing it allocated can exist.
        unreachable!();
    }
}

unsafe impl Allocator for Never {
    #[inline]
    fn allocate(&self, _layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        Err(AllocError)
    }
}
