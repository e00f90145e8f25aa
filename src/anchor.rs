use core::cell::OnceCell;
use core::fmt;

use crate::shared::Shared;
use crate::weak::Weak;

/// A value's capability to hand out [`Shared`] handles to itself.
///
/// Embed an `Anchor<Self>` in the value, expose it through [`Anchored`], and
/// construct the value with [`Shared::new_anchored`]; the factory binds the
/// anchor to the new block. Until then (and in values built any other way)
/// the anchor is unbound and yields empty handles.
pub struct Anchor<T: ?Sized> {
    cell: OnceCell<Weak<T>>,
}

impl<T: ?Sized> Anchor<T> {
    /// An unbound anchor.
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// An owning handle to the value this anchor sits in, or the empty
    /// handle if the anchor is unbound or the value has no owners left
    /// (as during its own teardown).
    pub fn shared(&self) -> Shared<T> {
        match self.cell.get() {
            Some(weak) => weak.lock(),
            None => Shared::empty(),
        }
    }

    /// An observer of the value this anchor sits in; detached if the anchor
    /// is unbound.
    pub fn weak(&self) -> Weak<T> {
        match self.cell.get() {
            Some(weak) => weak.clone(),
            None => Weak::new(),
        }
    }

    // A second bind keeps the first; the incoming observer just drops.
    pub(crate) fn bind(&self, weak: Weak<T>) {
        let _ = self.cell.set(weak);
    }
}

impl<T: ?Sized> Clone for Anchor<T> {
    /// Clones as unbound: a copied value is a new value, and inherits no
    /// handles to the original.
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Default for Anchor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Anchor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cell.get().is_some() {
            f.write_str("Anchor(bound)")
        } else {
            f.write_str("Anchor(unbound)")
        }
    }
}

/// Locates the [`Anchor`] inside a value, so [`Shared::new_anchored`] can
/// bind it.
pub trait Anchored {
    fn anchor(&self) -> &Anchor<Self>;
}
