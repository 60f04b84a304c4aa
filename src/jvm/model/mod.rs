//! Decoded representations of classes
//!
//! This is the shape in which an external decoder hands classes to the engine. Nothing here is
//! resolved: classes, fields, and methods refer to each other only through names, and the loader
//! turns them into runtime records on first use.
//!
//!   - __Class__ is represented using [`ClassData`]
//!   - __Method__ is represented using [`MethodData`] (with an optional [`Code`] body)
//!   - __Field__ is represented using [`FieldData`]

mod class;
mod field;
mod method;

pub use class::*;
pub use field::*;
pub use method::*;
