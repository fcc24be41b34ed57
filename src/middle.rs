//! The middle-end of the allocator: analyses over the instruction stream.

pub mod live;

pub use live::*;
