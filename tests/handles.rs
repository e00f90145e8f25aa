//! Property-based tests for the handle lifecycle.
//!
//! Random operation sequences over a small arena of handle slots, checked
//! after every step against a plain owner-count model.

use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use proptest::prelude::*;
use tally::{
    AllocError, Allocator, Anchor, Anchored, Deallocator, Global, NonZeroLayout, Shared, Weak,
};

struct Probe {
    drops: Rc<Cell<usize>>,
}

impl Probe {
    fn new(drops: &Rc<Cell<usize>>) -> Self {
        Self {
            drops: Rc::clone(drops),
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

/// Counts block allocations and frees, delegating the real work to
/// [`Global`].
#[derive(Debug, Default, Clone)]
struct Counting {
    allocated: Rc<Cell<usize>>,
    freed: Rc<Cell<usize>>,
}

unsafe impl Deallocator for Counting {
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: NonZeroLayout) {
        self.freed.set(self.freed.get() + 1);
        unsafe { Global.deallocate(ptr, layout) };
    }
}

unsafe impl Allocator for Counting {
    fn allocate(&self, layout: NonZeroLayout) -> Result<NonNull<u8>, AllocError> {
        let ptr = Global.allocate(layout)?;
        self.allocated.set(self.allocated.get() + 1);
        Ok(ptr)
    }
}

const SLOTS: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    CloneShared(usize, usize),
    DropShared(usize),
    Reset(usize),
    SwapShared(usize, usize),
    Downgrade(usize, usize),
    DropWeak(usize),
    Lock(usize, usize),
}

/// Strategy for one operation over the slot arena.
fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..SLOTS, 0..SLOTS).prop_map(|(src, dst)| Op::CloneShared(src, dst)),
        (0..SLOTS).prop_map(Op::DropShared),
        (0..SLOTS).prop_map(Op::Reset),
        (0..SLOTS, 0..SLOTS).prop_map(|(a, b)| Op::SwapShared(a, b)),
        (0..SLOTS, 0..SLOTS).prop_map(|(src, dst)| Op::Downgrade(src, dst)),
        (0..SLOTS).prop_map(Op::DropWeak),
        (0..SLOTS, 0..SLOTS).prop_map(|(src, dst)| Op::Lock(src, dst)),
    ]
}

proptest! {
    /// Whatever the operation order, the value drops exactly when its last
    /// owner goes, every live handle agrees on the owner count, and the
    /// value drops exactly once overall.
    #[test]
    fn counts_stay_consistent(ops in prop::collection::vec(op(), 1..64)) {
        let drops = Rc::new(Cell::new(0));

        let mut shareds: Vec<Option<Shared<Probe>>> = (0..SLOTS).map(|_| None).collect();
        let mut weaks: Vec<Option<Weak<Probe>>> = (0..SLOTS).map(|_| None).collect();
        shareds[0] = Some(Shared::new(Probe::new(&drops)));

        for op in &ops {
            match *op {
                Op::CloneShared(src, dst) => {
                    shareds[dst] = shareds[src].clone();
                }
                Op::DropShared(i) => {
                    shareds[i] = None;
                }
                Op::Reset(i) => {
                    if let Some(p) = shareds[i].as_mut() {
                        Shared::reset(p);
                    }
                    shareds[i] = None;
                }
                Op::SwapShared(a, b) => {
                    if a != b {
                        let mut pa = shareds[a].take();
                        let mut pb = shareds[b].take();
                        if let (Some(pa), Some(pb)) = (pa.as_mut(), pb.as_mut()) {
                            Shared::swap(pa, pb);
                        }
                        shareds[a] = pa;
                        shareds[b] = pb;
                    }
                }
                Op::Downgrade(src, dst) => {
                    weaks[dst] = shareds[src].as_ref().map(Shared::downgrade);
                }
                Op::DropWeak(i) => {
                    weaks[i] = None;
                }
                Op::Lock(src, dst) => {
                    let locked = match &weaks[src] {
                        Some(w) => w.lock(),
                        None => Shared::empty(),
                    };
                    shareds[dst] = if Shared::is_empty(&locked) {
                        None
                    } else {
                        Some(locked)
                    };
                }
            }

            // Every filled slot holds one ownership claim on the single
            // block; the value must be gone exactly when no claims remain.
            let live = shareds.iter().filter(|slot| slot.is_some()).count();
            prop_assert_eq!(drops.get(), usize::from(live == 0));

            for p in shareds.iter().flatten() {
                prop_assert_eq!(Shared::use_count(p), live);
            }
            for w in weaks.iter().flatten() {
                prop_assert_eq!(w.use_count(), live);
                prop_assert_eq!(w.expired(), live == 0);
            }
        }

        shareds.clear();
        weaks.clear();
        prop_assert_eq!(drops.get(), 1);
    }

    /// `use_count` tracks the number of clones exactly.
    #[test]
    fn fanout_counts_match_clone_count(n in 1..50usize) {
        let drops = Rc::new(Cell::new(0));
        let first = Shared::new(Probe::new(&drops));

        let clones: Vec<_> = (0..n).map(|_| first.clone()).collect();
        prop_assert_eq!(Shared::use_count(&first), n + 1);

        drop(clones);
        prop_assert_eq!(Shared::use_count(&first), 1);
        prop_assert_eq!(drops.get(), 0);

        drop(first);
        prop_assert_eq!(drops.get(), 1);
    }

    /// However many observers there are, the block's storage is freed once,
    /// when the last of them goes.
    #[test]
    fn storage_outlives_value_until_last_observer(n in 1..30usize) {
        let alloc = Counting::default();
        let freed = Rc::clone(&alloc.freed);

        let p = Shared::new_in(7_u32, alloc.clone());
        prop_assert_eq!(alloc.allocated.get(), 1);

        let mut weaks: Vec<_> = (0..n).map(|_| Shared::downgrade(&p)).collect();
        drop(p);

        for w in &weaks {
            prop_assert!(w.expired());
        }

        let last = weaks.pop().unwrap();
        drop(weaks);
        prop_assert_eq!(freed.get(), 0);

        drop(last);
        prop_assert_eq!(freed.get(), 1);
    }
}

#[cfg(test)]
mod scenarios {
    use std::cell::RefCell;

    use tally_tracing::Traced;

    use super::*;

    struct Parent {
        anchor: Anchor<Parent>,
        children: RefCell<Vec<Shared<Child>>>,
    }

    struct Child {
        parent: Weak<Parent>,
        id: u32,
    }

    impl Anchored for Parent {
        fn anchor(&self) -> &Anchor<Self> {
            &self.anchor
        }
    }

    impl Parent {
        fn new() -> Shared<Parent> {
            Shared::new_anchored(Parent {
                anchor: Anchor::new(),
                children: RefCell::new(Vec::new()),
            })
        }

        fn adopt_child(&self, id: u32) -> Shared<Child> {
            let child = Shared::new(Child {
                parent: self.anchor.weak(),
                id,
            });
            self.children.borrow_mut().push(child.clone());
            child
        }
    }

    #[test]
    fn parent_child_back_references() {
        let parent = Parent::new();
        let a = parent.adopt_child(1);
        let b = parent.adopt_child(2);

        // Children reach their parent while it has owners.
        let through = a.parent.lock();
        assert!(Shared::ptr_eq(&parent, &through));
        assert_eq!(Shared::use_count(&parent), 2);
        drop(through);

        assert_eq!(a.id, 1);
        assert_eq!(Shared::use_count(&a), 2);
        assert_eq!(Shared::use_count(&b), 2);

        drop(parent);

        // The parent took its child list with it; the handles we still hold
        // keep the children alive, but their back-references are dead.
        assert_eq!(Shared::use_count(&a), 1);
        assert!(a.parent.expired());
        assert!(Shared::is_empty(&b.parent.lock()));
    }

    #[test]
    fn traced_allocator_round_trip() {
        let p = Shared::new_in(String::from("traced"), Traced::new(Global));
        let w = Shared::downgrade(&p);

        assert_eq!(&*p, "traced");

        drop(p);
        assert!(w.expired());
        assert!(Shared::is_empty(&w.lock()));
    }
}
