//! Control blocks: the metadata records behind every non-empty handle.
//!
//! A block is one of two layouts sharing a common [`Header`] prefix. The
//! header carries the two counts and a pair of function pointers installed by
//! the concrete block at construction, so handles operate on any block
//! through `NonNull<Header>` without knowing its value type, destroyer, or
//! allocator.
//!
//! Lifecycle invariants:
//! - the value is live iff `shared > 0`;
//! - the block storage is live iff `shared > 0` or `weak > 0`;
//! - `destroy` runs exactly once, when `shared` first reaches zero;
//! - `deallocate` runs exactly once, when both counts first reach zero, and
//!   nothing touches the block afterwards.

use core::{
    alloc::Layout,
    cell::Cell,
    mem::ManuallyDrop,
    ptr::{self, NonNull},
};

use tally_core::{AllocError, Allocator, NonZeroLayout};

pub(crate) struct Header {
    shared: Cell<usize>,
    weak: Cell<usize>,
    destroy: unsafe fn(NonNull<Header>),
    deallocate: unsafe fn(NonNull<Header>),
}

impl Header {
    fn new(
        destroy: unsafe fn(NonNull<Header>),
        deallocate: unsafe fn(NonNull<Header>),
    ) -> Self {
        Self {
            shared: Cell::new(1),
            weak: Cell::new(0),
            destroy,
            deallocate,
        }
    }

    #[inline]
    pub(crate) fn shared_count(&self) -> usize {
        self.shared.get()
    }

    #[inline]
    pub(crate) fn retain(&self) {
        self.shared.set(self.shared.get() + 1);
    }

    #[inline]
    pub(crate) fn retain_weak(&self) {
        self.weak.set(self.weak.get() + 1);
    }

    /// Drops one shared owner.
    ///
    /// # Safety
    /// `this` must point at a live block with `shared >= 1`. The caller's
    /// claim on the block ends with this call.
    pub(crate) unsafe fn release(this: NonNull<Header>) {
        let header = unsafe { this.as_ref() };
        let shared = header.shared.get() - 1;
        header.shared.set(shared);
        if shared != 0 {
            return;
        }

        // Hold a weak claim across teardown: the dying value may itself drop
        // weak handles to this block, and the storage must stay live until
        // `destroy` returns.
        header.retain_weak();
        unsafe { (header.destroy)(this) };
        let weak = header.weak.get() - 1;
        header.weak.set(weak);
        if weak == 0 {
            unsafe { (header.deallocate)(this) };
        }
    }

    /// Drops one weak observer.
    ///
    /// # Safety
    /// `this` must point at a live block with `weak >= 1`. The caller's
    /// claim on the block ends with this call.
    pub(crate) unsafe fn release_weak(this: NonNull<Header>) {
        let header = unsafe { this.as_ref() };
        let weak = header.weak.get() - 1;
        header.weak.set(weak);
        if weak == 0 && header.shared.get() == 0 {
            unsafe { (header.deallocate)(this) };
        }
    }
}

/// A non-empty handle's view of a block: the resolved value pointer plus the
/// header it shares counts through. Whoever holds a counted claim may copy
/// links freely; the claim, not the link, keeps the block alive.
pub(crate) struct Link<T: ?Sized> {
    pub(crate) value: NonNull<T>,
    pub(crate) block: NonNull<Header>,
}

impl<T: ?Sized> Link<T> {
    #[inline]
    pub(crate) fn header(&self) -> &Header {
        unsafe { self.block.as_ref() }
    }
}

impl<T: ?Sized> Clone for Link<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Link<T> {}

/// Metadata and value in one allocation: header, then the allocator that
/// produced the block, then the value itself.
#[repr(C)]
pub(crate) struct CombinedBlock<T, A> {
    header: Header,
    alloc: ManuallyDrop<A>,
    value: ManuallyDrop<T>,
}

impl<T, A> CombinedBlock<T, A>
where
    A: Allocator,
{
    /// Allocates a block through `alloc` and moves `value` into it, with
    /// counts `(shared = 1, weak = 0)`. On failure nothing is left behind;
    /// `value` and `alloc` drop normally.
    pub(crate) fn try_new(value: T, alloc: A) -> Result<Link<T>, AllocError> {
        let ptr = alloc.allocate(block_layout::<Self>())?.cast::<Self>();

        let block = Self {
            header: Header::new(Self::destroy, Self::deallocate),
            alloc: ManuallyDrop::new(alloc),
            value: ManuallyDrop::new(value),
        };

        unsafe {
            ptr::write(ptr.as_ptr(), block);
            let value = ptr::addr_of_mut!((*ptr.as_ptr()).value);
            Ok(Link {
                value: NonNull::new_unchecked(value.cast::<T>()),
                block: ptr.cast(),
            })
        }
    }

    unsafe fn destroy(this: NonNull<Header>) {
        let value = unsafe { ptr::addr_of_mut!((*this.cast::<Self>().as_ptr()).value) };
        unsafe { ManuallyDrop::drop(&mut *value) };
    }

    unsafe fn deallocate(this: NonNull<Header>) {
        let block = this.cast::<Self>();
        // The allocator lives inside the storage it is about to free; move it
        // out first.
        let alloc = unsafe { ManuallyDrop::take(&mut (*block.as_ptr()).alloc) };
        unsafe { alloc.deallocate(block.cast(), block_layout::<Self>()) };
    }
}

/// Metadata for an adopted pointer: the value was allocated elsewhere, so the
/// block records where it is, how to tear it down, and how to free the
/// metadata itself. `deallocate` releases only the metadata; the value's own
/// storage is the destroyer's business.
#[repr(C)]
pub(crate) struct SplitBlock<T: ?Sized, D, A> {
    header: Header,
    destroyer: ManuallyDrop<D>,
    alloc: ManuallyDrop<A>,
    value: NonNull<T>,
}

impl<T, D, A> SplitBlock<T, D, A>
where
    T: ?Sized,
    D: FnOnce(*mut T),
    A: Allocator,
{
    /// Allocates a metadata record through `alloc` adopting `value`, with
    /// counts `(shared = 1, weak = 0)`. On failure the adopted pointer is
    /// untouched and still the caller's to clean up.
    pub(crate) fn try_new(
        value: NonNull<T>,
        destroyer: D,
        alloc: A,
    ) -> Result<Link<T>, AllocError> {
        let ptr = alloc.allocate(block_layout::<Self>())?.cast::<Self>();

        let block = Self {
            header: Header::new(Self::destroy, Self::deallocate),
            destroyer: ManuallyDrop::new(destroyer),
            alloc: ManuallyDrop::new(alloc),
            value,
        };

        unsafe { ptr::write(ptr.as_ptr(), block) };
        Ok(Link {
            value,
            block: ptr.cast(),
        })
    }

    unsafe fn destroy(this: NonNull<Header>) {
        let block = this.cast::<Self>().as_ptr();
        let destroyer = unsafe { ManuallyDrop::take(&mut (*block).destroyer) };
        let value = unsafe { (*block).value };
        destroyer(value.as_ptr());
    }

    unsafe fn deallocate(this: NonNull<Header>) {
        let block = this.cast::<Self>();
        let alloc = unsafe { ManuallyDrop::take(&mut (*block.as_ptr()).alloc) };
        unsafe { alloc.deallocate(block.cast(), block_layout::<Self>()) };
    }
}

fn block_layout<B>() -> NonZeroLayout {
    match NonZeroLayout::new(Layout::new::<B>()) {
        Some(layout) => layout,
        // Every block starts with a header.
        None => unreachable!(),
    }
}
