mod interface;
mod multi;
mod protocol;
mod single;

pub use interface::*;
pub use multi::*;
pub use single::*;
