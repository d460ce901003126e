//! Yasny Core: shared diagnostics, runtime value representation, and bytecode container types.
//!
//! Everything in this crate is shared between `yasny-compiler` (which produces bytecode) and
//! `yasny-runtime` (which executes it), so the two never have to agree on a wire format by
//! convention alone.
//!
//! # Modules
//!
//! - `diagnostic`: the single `{message, line, col, path}` error kind every stage reports through
//! - `value`: the closed runtime value set (`Value`, `MapKey`, `OrderedDict`)
//! - `bytecode`: `Instruction`/`FunctionBc`/`ProgramBc` and the two container formats

pub mod bytecode;
pub mod diagnostic;
pub mod value;

pub use bytecode::{decode_bundle, decode_program, encode_bundle, encode_program, AppMetadata, FunctionBc, Instruction, ProgramBc};
pub use diagnostic::{Diagnostic, Result};
pub use value::{MapKey, OrderedDict, TaskId, Value};
