//! Minimal host-embedding API, grounded on the reference `host_api.py`'s `YasnyBackend` /
//! `backend_core.py`'s `BackendKernel` (the two were near-duplicates in the reference; this merges
//! them into one type). This is the surface an embedder reaches for instead of driving
//! `yasny-compiler` and [`VirtualMachine`] by hand.

use std::path::Path;
use std::sync::Arc;

use yasny_core::value::Value;
use yasny_core::Diagnostic;

use crate::vm::VirtualMachine;

pub struct YasnyBackend {
    pub source_path: Option<String>,
    vm: Arc<VirtualMachine>,
}

impl YasnyBackend {
    pub fn from_source(source: &str, path: Option<&str>) -> Result<YasnyBackend, Diagnostic> {
        let program = yasny_compiler::pipeline::compile_source(source, path.map(Path::new))?;
        Ok(YasnyBackend { source_path: path.map(str::to_owned), vm: Arc::new(VirtualMachine::new(program, path.map(str::to_owned))) })
    }

    pub fn from_file(source_path: impl AsRef<Path>) -> Result<YasnyBackend, Diagnostic> {
        let path = source_path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| Diagnostic::new(format!("не удалось прочитать {}: {e}", path.display())))?;
        YasnyBackend::from_source(&source, path.to_str())
    }

    /// Runs the program's entry function once, for its side effects (§8 "end-to-end scenarios").
    pub fn run(&self) -> Result<Value, Diagnostic> {
        self.vm.run()
    }

    pub fn list_functions(&self) -> Vec<String> {
        self.vm.list_functions()
    }

    pub fn has_function(&self, function_name: &str) -> bool {
        self.vm.has_function(function_name)
    }

    /// Calls a named function. `reset_state` mirrors the reference: when `true`, the entry
    /// function re-runs first to (re-)populate globals before the call. The entry also auto-runs
    /// once on the very first call regardless of `reset_state`, so a fresh backend's globals are
    /// never read as all-`Null`.
    pub fn call(&self, function_name: &str, args: Vec<Value>, reset_state: bool) -> Result<Value, Diagnostic> {
        self.vm.call_function(function_name, args, reset_state)
    }
}

/// Compiles and runs a source string in one call; convenience wrapper for the common case.
pub fn run_source(source: &str, path: Option<&str>) -> Result<Value, Diagnostic> {
    YasnyBackend::from_source(source, path)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_functions_reflects_compiled_program() {
        let source = "функция помощник() -> Цел:\n    вернуть 1\n\nфункция main() -> Пусто:\n    печать(помощник())\n";
        let backend = YasnyBackend::from_source(source, None).unwrap();
        assert!(backend.has_function("помощник"));
        assert!(!backend.has_function("нет_такой"));
    }

    #[test]
    fn call_with_reset_state_reruns_entry_side_effects() {
        let source = "пусть счётчик: Цел = 0\n\nфункция main() -> Пусто:\n    счётчик = счётчик + 1\n\nфункция получить() -> Цел:\n    вернуть счётчик\n";
        let backend = YasnyBackend::from_source(source, None).unwrap();
        let first = backend.call("получить", vec![], true).unwrap();
        assert_eq!(first, Value::Int(1));
    }

    #[test]
    fn first_call_without_reset_state_still_sees_entry_initialized_globals() {
        let source = "пусть x: Цел = 5\n\nфункция получить() -> Цел:\n    вернуть x\n\nфункция main() -> Пусто:\n    печать(x)\n";
        let backend = YasnyBackend::from_source(source, None).unwrap();
        // No `run()` call first, and reset_state is false: a fresh VM must still auto-run the
        // entry once so globals aren't read as Null.
        let result = backend.call("получить", vec![], false).unwrap();
        assert_eq!(result, Value::Int(5));
    }
}
