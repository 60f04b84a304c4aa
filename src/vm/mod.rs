//! Execution engine
//!
//! A [`Machine`] owns everything global to one guest VM instance: the class loader, static field
//! storage, the intern table, class objects, and the thread registry. Each guest [`Thread`] owns
//! its frame stack and is driven by [`Thread::run`], which executes one instruction per step.

mod class;
mod core_library;
mod errors;
mod exceptions;
mod frame;
mod heap;
mod initialize;
mod interpreter;
mod library;
mod loader;
mod machine;
mod monitor;
mod native;
mod object;
mod settings;
pub mod syscall;
mod task;
mod thread;
mod value;

pub use class::*;
pub use core_library::*;
pub use errors::*;
pub use frame::*;
pub use library::*;
pub use loader::*;
pub use machine::*;
pub use monitor::*;
pub use native::*;
pub use object::*;
pub use settings::*;
pub use task::*;
pub use thread::*;
pub use value::*;
