//! Orchestrates the compile-only half of the pipeline (§2 data flow): source text → tokens →
//! linked tree → typed tree → program record. Grounded on the reference `pipeline.py`; its
//! `run_program` step is not here — running bytecode needs the VM, which lives in
//! `yasny-runtime` and depends on this crate, not the other way around (`runtime::backend`
//! is the equivalent entry point for embedders that want source-to-execution in one call).

use crate::ast::Program;
use crate::codegen;
use crate::lexer::tokenize;
use crate::parser;
use crate::resolver::resolve_modules;
use crate::typechecker::{self, CheckResult};
use std::path::Path;
use yasny_core::bytecode::ProgramBc;
use yasny_core::Diagnostic;

/// Tokenizes and parses `source` in isolation, without resolving imports. Used by tooling that
/// wants a single file's tree (e.g. a module being loaded by the resolver itself).
pub fn parse_source(source: &str, path: Option<&str>) -> Result<Program, Diagnostic> {
    let tokens = tokenize(source, path)?;
    parser::parse(tokens, path)
}

/// Runs the type checker over an already-resolved program, writing `inferred_type` in place.
pub fn check_program(program: &mut Program, path: Option<&str>) -> Result<CheckResult, Diagnostic> {
    typechecker::check_program(program, path)
}

/// Optimizes and compiles an already-checked program into its bytecode record.
pub fn compile_program(
    program: Program,
    check_result: &CheckResult,
    path: Option<&str>,
) -> Result<ProgramBc, Diagnostic> {
    let is_async_fn = check_result
        .function_signatures
        .iter()
        .map(|(name, sig)| (name.clone(), sig.is_async))
        .collect();
    codegen::compile_program(program, &is_async_fn, path)
}

/// The full compile-only path: resolve imports, check types, compile to bytecode.
pub fn compile_source(source: &str, path: Option<&Path>) -> Result<ProgramBc, Diagnostic> {
    let mut program = resolve_modules(source, path)?;
    let path_str = path.and_then(Path::to_str);
    let check_result = check_program(&mut program, path_str)?;
    compile_program(program, &check_result, path_str)
}

/// Resolves and links `source` without checking or compiling it. Exposed for tooling that only
/// needs the linked tree (e.g. a linter or formatter).
pub fn load_program(source: &str, path: Option<&Path>) -> Result<Program, Diagnostic> {
    resolve_modules(source, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_source_produces_a_runnable_entry() {
        let program = compile_source("функция main() -> Пусто:\n    вернуть пусто\n", None).unwrap();
        assert!(program.functions.contains_key("main"));
    }

    #[test]
    fn parse_source_roundtrips_a_single_statement() {
        let program = parse_source("пусть х: Цел = 1\n", None).unwrap();
        assert_eq!(program.statements.len(), 1);
    }
}
