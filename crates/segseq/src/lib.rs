#![doc = include_str!("../README.md")]

mod allocator;
mod config;
mod error;
mod format;
mod rand;
mod range;
mod registry;
mod selector;
mod sequence;
mod store;

pub use crate::allocator::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::format::*;
pub use crate::rand::*;
pub use crate::range::*;
pub use crate::registry::*;
pub use crate::selector::*;
pub use crate::sequence::*;
pub use crate::store::*;
