#![allow(clippy::missing_safety_doc)]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub use tally_core::*;

pub use crate::{
    anchor::{Anchor, Anchored},
    global::Global,
    never::Never,
    shared::Shared,
    weak::Weak,
};

mod anchor;
mod block;
mod global;
mod never;
mod shared;
mod weak;

#[cfg(test)]
mod test_util;
