use alloc::alloc::{alloc, alloc_zeroed, dealloc};
use core::ptr::NonNull;

use tally_core::{AllocError, Allocator, Deallocator, NonZeroLayout};

/// Forwards to the program's global allocator. This is what the plain
/// factories allocate through.
#[derive(Debug, Default, Clone)]
pub struct Global;

unsafe impl Deallocator for Global {
    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: NonZeroLayout) {
        unsafe { dealloc(ptr.as_ptr(), layout.get()) };
    }
}

unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        let result = unsafe { alloc(layout.get()) };
        NonNull::new(result).ok_or(AllocError)
    }

    #[inline]
    fn allocate_zeroed(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        let result = unsafe { alloc_zeroed(layout.get()) };
        NonNull::new(result).ok_or(AllocError)
    }
}

#[cfg(test)]
mod tests {
    use core::alloc::Layout;

    use super::*;

    #[test]
    fn test_allocate_round_trip() {
        let layout = NonZeroLayout::new(Layout::new::<u64>()).unwrap();

        let ptr = Global.allocate(layout).unwrap();
        unsafe {
            ptr.as_ptr().cast::<u64>().write(0xABCD);
            assert_eq!(ptr.as_ptr().cast::<u64>().read(), 0xABCD);
            Global.deallocate(ptr, layout);
        }
    }
}
