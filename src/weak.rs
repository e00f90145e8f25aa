use core::{fmt, mem};

use crate::block::{Header, Link};
use crate::shared::Shared;

/// A non-owning observer of a [`Shared`] value.
///
/// A `Weak` never keeps the value alive and never tears it down; it only
/// keeps the control block's storage around so that [`Weak::lock`] can ask,
/// at any point, whether the value still has owners.
pub struct Weak<T: ?Sized> {
    link: Option<Link<T>>,
}

impl<T: ?Sized> Weak<T> {
    /// An observer attached to nothing; [`Weak::lock`] on it always comes
    /// back empty.
    pub const fn new() -> Self {
        Self { link: None }
    }

    /// Number of live owners of the observed value.
    pub fn use_count(&self) -> usize {
        match &self.link {
            Some(link) => link.header().shared_count(),
            None => 0,
        }
    }

    /// Whether the observed value is gone (or was never there).
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Attempts to become an owner. Returns an owning handle to the value if
    /// it is still alive, and the empty handle otherwise.
    pub fn lock(&self) -> Shared<T> {
        match &self.link {
            Some(link) if link.header().shared_count() > 0 => {
                link.header().retain();
                unsafe { Shared::from_link(*link) }
            }
            _ => Shared::empty(),
        }
    }

    /// Exchanges the contents of two observers. No counts change.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Wraps a link whose counted weak claim the caller hands over.
    ///
    /// # Safety
    /// The link's block must be live and one unreleased weak claim on it
    /// must belong to the caller.
    pub(crate) unsafe fn from_link(link: Link<T>) -> Self {
        Self { link: Some(link) }
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    #[inline]
    fn clone(&self) -> Self {
        match &self.link {
            Some(link) => {
                link.header().retain_weak();
                Self { link: Some(*link) }
            }
            None => Self::new(),
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            unsafe { Header::release_weak(link.block) };
        }
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}
