pub mod book;
pub mod raw;

pub use book::*;
pub use raw::*;
