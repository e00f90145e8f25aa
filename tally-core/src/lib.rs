//! Allocator capabilities shared by every `tally` block variant.

#![no_std]

use core::{
    alloc::Layout,
    num::NonZeroUsize,
    ptr::NonNull,
};

/// Returned when an allocator cannot produce the requested storage.
#[derive(Debug)]
pub struct AllocError;

/// A [`Layout`] with a proven non-zero size.
///
/// Control blocks always begin with a header, so every layout handed to an
/// allocator here is non-zero; carrying the proof in the type spares each
/// implementation its own size check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonZeroLayout {
    layout: Layout,
}

impl NonZeroLayout {
    pub fn new(layout: Layout) -> Option<Self> {
        if layout.size() == 0 {
            None
        } else {
            Some(Self { layout })
        }
    }

    pub fn nonzero_size(&self) -> NonZeroUsize {
        let size = self.layout.size();
        unsafe { NonZeroUsize::new_unchecked(size) }
    }

    pub fn size(&self) -> usize {
        self.nonzero_size().get()
    }

    pub fn align(&self) -> usize {
        self.get().align()
    }

    pub fn get(&self) -> Layout {
        self.layout
    }
}

/// The release half of an allocator capability.
///
/// # Safety
/// `deallocate` must accept any pointer previously returned by the paired
/// [`Allocator`] together with the layout it was allocated with, and must not
/// be observable through that pointer afterwards.
pub unsafe trait Deallocator {
    /// Deallocates the memory referenced by `ptr`.
    ///
    /// # Safety
    /// - The pointer must be valid and the same as given by a previous call to
    ///   `allocate`.
    /// - The layout must be identical to that used when allocating the pointer.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: NonZeroLayout);

    fn by_ref(&self) -> &Self
    where
        Self: Sized,
    {
        self
    }
}

/// The acquisition half of an allocator capability.
///
/// # Safety
/// A successful `allocate` must return a pointer to `layout.size()` bytes,
/// aligned to `layout.align()`, valid until passed back to
/// [`Deallocator::deallocate`].
pub unsafe trait Allocator: Deallocator {
    fn allocate(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError>;

    fn allocate_zeroed(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.allocate(layout)?;
        unsafe { ptr.as_ptr().write_bytes(0, layout.size()) };
        Ok(ptr)
    }
}

unsafe impl<'a, A> Deallocator for &'a A
where
    A: Deallocator + ?Sized,
{
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: NonZeroLayout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

unsafe impl<'a, A> Allocator for &'a A
where
    A: Allocator + ?Sized,
{
    fn allocate(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    fn allocate_zeroed(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate_zeroed(layout)
    }
}
