//! Stack-based virtual machine and task subsystem for the Yasny language: runs the
//! [`yasny_core::bytecode::ProgramBc`] produced by `yasny-compiler`.
//!
//! ```rust,ignore
//! use yasny_compiler::pipeline::compile_source;
//! use yasny_runtime::backend::run_source;
//!
//! run_source("функция main() -> Пусто:\n    печать(\"привет\")\n", None)?;
//! ```

pub mod backend;
pub mod builtins;
pub mod ops;
pub mod task;
pub mod vm;

pub use backend::run_source;
pub use task::TaskManager;
pub use vm::{RuntimeContext, VirtualMachine};
