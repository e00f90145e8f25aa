use alloc::{alloc::handle_alloc_error, boxed::Box};
use core::{
    alloc::Layout,
    fmt,
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::{self, NonNull},
};

use tally_core::{AllocError, Allocator};

use crate::{
    anchor::Anchored,
    block::{CombinedBlock, Header, Link, SplitBlock},
    global::Global,
    weak::Weak,
};

/// The owning handle: one of `use_count` shared owners of a heap value.
///
/// Copies made with [`Clone`] share the same control block. The value is torn
/// down when the last owner goes away; a [`Weak`] observer never delays that,
/// only the release of the block's own storage.
///
/// A `Shared` may also be *empty* — owning nothing — via [`Shared::empty`],
/// [`Shared::default`] or [`Shared::reset`].
pub struct Shared<T: ?Sized> {
    link: Option<Link<T>>,
    _p: PhantomData<T>,
}

impl<T> Shared<T> {
    /// Moves `value` into a fresh combined block: one allocation holding both
    /// the metadata and the value.
    ///
    /// # Panics
    /// Calls [`handle_alloc_error`] if the allocation fails.
    pub fn new(value: T) -> Self {
        match Self::try_new(value) {
            Ok(this) => this,
            Err(_) => handle_alloc_error(Layout::new::<CombinedBlock<T, Global>>()),
        }
    }

    pub fn try_new(value: T) -> Result<Self, AllocError> {
        Self::try_new_in(value, Global)
    }

    /// Like [`Shared::new`], with the block allocated through `alloc`. The
    /// allocator moves into the block and frees it at the end of its life.
    ///
    /// # Panics
    /// Calls [`handle_alloc_error`] if the allocation fails.
    pub fn new_in<A>(value: T, alloc: A) -> Self
    where
        A: Allocator + 'static,
    {
        match Self::try_new_in(value, alloc) {
            Ok(this) => this,
            Err(_) => handle_alloc_error(Layout::new::<CombinedBlock<T, A>>()),
        }
    }

    pub fn try_new_in<A>(value: T, alloc: A) -> Result<Self, AllocError>
    where
        A: Allocator + 'static,
    {
        let link = CombinedBlock::try_new(value, alloc)?;
        Ok(unsafe { Self::from_link(link) })
    }

    /// [`Shared::new`] for a value carrying an [`Anchor`](crate::Anchor):
    /// after construction the anchor is bound to the new block, so the value
    /// can mint further handles to itself while owned.
    pub fn new_anchored(value: T) -> Self
    where
        T: Anchored,
    {
        Self::new_anchored_in(value, Global)
    }

    pub fn new_anchored_in<A>(value: T, alloc: A) -> Self
    where
        T: Anchored,
        A: Allocator + 'static,
    {
        let this = Self::new_in(value, alloc);
        this.anchor().bind(Shared::downgrade(&this));
        this
    }
}

impl<T: ?Sized> Shared<T> {
    /// The handle that owns nothing.
    pub const fn empty() -> Self {
        Self {
            link: None,
            _p: PhantomData,
        }
    }

    /// Takes ownership of an already-boxed value. The box's allocation is
    /// reused as-is; only a separate metadata record is allocated.
    ///
    /// The pointee may be unsized, so adoption is also the covariant entry
    /// point: `Shared::<dyn Trait>::adopt(Box::new(Concrete))`.
    ///
    /// # Panics
    /// Calls [`handle_alloc_error`] if the metadata allocation fails.
    pub fn adopt(value: Box<T>) -> Self {
        Self::adopt_in(value, Global)
    }

    /// [`Shared::adopt`] with the metadata record allocated through `alloc`.
    /// The value's own storage still came from the box and goes back the
    /// box's way.
    pub fn adopt_in<A>(value: Box<T>, alloc: A) -> Self
    where
        A: Allocator + 'static,
    {
        let value = unsafe { NonNull::new_unchecked(Box::into_raw(value)) };
        Self::split(value, drop_box::<T>, alloc)
    }

    /// Adopts a boxed value with a custom destroyer. When the last owner
    /// goes away, `destroyer` is called exactly once with the pointer
    /// produced by unwrapping the box, and from then on the value's storage
    /// is the destroyer's responsibility.
    pub fn adopt_with<D>(value: Box<T>, destroyer: D) -> Self
    where
        D: FnOnce(*mut T) + 'static,
    {
        Self::adopt_with_in(value, destroyer, Global)
    }

    pub fn adopt_with_in<D, A>(value: Box<T>, destroyer: D, alloc: A) -> Self
    where
        D: FnOnce(*mut T) + 'static,
        A: Allocator + 'static,
    {
        let value = unsafe { NonNull::new_unchecked(Box::into_raw(value)) };
        Self::split(value, destroyer, alloc)
    }

    fn split<D, A>(value: NonNull<T>, destroyer: D, alloc: A) -> Self
    where
        D: FnOnce(*mut T),
        A: Allocator,
    {
        match SplitBlock::try_new(value, destroyer, alloc) {
            Ok(link) => unsafe { Self::from_link(link) },
            Err(_) => handle_alloc_error(Layout::new::<SplitBlock<T, D, A>>()),
        }
    }

    /// Borrow of the owned value, or `None` if the handle is empty.
    pub fn get(this: &Self) -> Option<&T> {
        this.link.as_ref().map(|link| unsafe { link.value.as_ref() })
    }

    /// Number of live owners of the value, 0 if the handle is empty.
    pub fn use_count(this: &Self) -> usize {
        match &this.link {
            Some(link) => link.header().shared_count(),
            None => 0,
        }
    }

    pub fn is_empty(this: &Self) -> bool {
        this.link.is_none()
    }

    /// Whether two handles point at the same value. Two empty handles agree.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        match (&this.link, &other.link) {
            (Some(a), Some(b)) => ptr::eq(a.value.as_ptr(), b.value.as_ptr()),
            (None, None) => true,
            _ => false,
        }
    }

    /// Raw pointer to the value, null if the handle is empty.
    pub fn as_ptr(this: &Self) -> *const T
    where
        T: Sized,
    {
        match &this.link {
            Some(link) => link.value.as_ptr(),
            None => ptr::null(),
        }
    }

    /// Releases this handle's ownership, leaving it empty.
    pub fn reset(this: &mut Self) {
        *this = Shared::empty();
    }

    /// Releases this handle's ownership and adopts `value` in its place.
    pub fn reset_to(this: &mut Self, value: Box<T>) {
        *this = Shared::adopt(value);
    }

    /// Exchanges the contents of two handles. No counts change.
    pub fn swap(this: &mut Self, other: &mut Self) {
        mem::swap(this, other);
    }

    /// A non-owning observer of the same block. Downgrading an empty handle
    /// yields an empty observer.
    pub fn downgrade(this: &Self) -> Weak<T> {
        match &this.link {
            Some(link) => {
                link.header().retain_weak();
                unsafe { Weak::from_link(*link) }
            }
            None => Weak::new(),
        }
    }

    /// Converts this handle into one for something reachable from the value:
    /// a field, a slice element, or a trait-object view of it. The result
    /// shares the original block, and the whole value stays alive until the
    /// last handle of either type is gone.
    ///
    /// ```
    /// use tally::Shared;
    ///
    /// let pair = Shared::new((1_u32, "one"));
    /// let name = Shared::project(pair, |p| &p.1);
    /// assert_eq!(*name, "one");
    /// ```
    pub fn project<U, F>(this: Self, f: F) -> Shared<U>
    where
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        // Links are plain copies; the claim itself moves to the projected
        // handle below.
        match this.link {
            Some(link) => {
                let value = NonNull::from(f(unsafe { link.value.as_ref() }));
                mem::forget(this);
                unsafe {
                    Shared::from_link(Link {
                        value,
                        block: link.block,
                    })
                }
            }
            None => Shared::empty(),
        }
    }

    /// Wraps a link whose counted claim the caller hands over.
    ///
    /// # Safety
    /// The link's block must be live and one unreleased shared claim on it
    /// must belong to the caller.
    pub(crate) unsafe fn from_link(link: Link<T>) -> Self {
        Self {
            link: Some(link),
            _p: PhantomData,
        }
    }
}

// Stored as the destroyer for plain adoption; the split block calls it
// exactly once with the pointer produced by `Box::into_raw`.
fn drop_box<T: ?Sized>(ptr: *mut T) {
    unsafe { drop(Box::from_raw(ptr)) };
}

impl<T: ?Sized> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        match &self.link {
            Some(link) => {
                link.header().retain();
                unsafe { Self::from_link(*link) }
            }
            None => Self::empty(),
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    /// The empty handle.
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    /// Panics if the handle is empty; [`Shared::get`] is the total accessor.
    #[inline]
    fn deref(&self) -> &T {
        match Shared::get(self) {
            Some(value) => value,
            None => panic!("dereferenced an empty Shared"),
        }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            unsafe { Header::release(link.block) };
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Shared::get(self) {
            Some(value) => f.debug_tuple("Shared").field(&value).finish(),
            None => f.write_str("Shared(empty)"),
        }
    }
}
