#[allow(clippy::module_inception)]
mod sequence;

pub use sequence::*;
