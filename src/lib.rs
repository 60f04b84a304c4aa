//! Bytecode interpreter for the embedded (CLDC-style) profile of the Java platform
//!
//! Classes arrive already decoded (see [`jvm`]) from whatever decoder the host uses. The engine in
//! [`vm`] loads and initializes them, interprets their instructions one step at a time on one host
//! thread per guest thread, and bridges `native` methods to host code.

pub mod jvm;
pub mod util;
pub mod vm;
