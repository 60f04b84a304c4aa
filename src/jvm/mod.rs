//! Decoded class model
//!
//! The engine does not parse class files itself: an external decoder produces [`ClassData`]
//! values (names, hierarchy, members, and per-method instruction streams) which the class loader
//! consumes.

mod access_flags;
mod bytecode;
mod descriptors;
mod model;
mod names;

pub use access_flags::*;
pub use bytecode::*;
pub use descriptors::*;
pub use model::*;
pub use names::*;
