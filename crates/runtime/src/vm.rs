//! Stack interpreter, grounded opcode-for-opcode on the reference `vm.py`'s `_execute_function`
//! dispatch loop. `CALL` additionally branches on the callee's `is_async` flag (absent from the
//! reference, §9 "Async call dispatch"): async callees are submitted to the task worker pool and
//! push a `Task` immediately, synchronous callees run inline via recursion, exactly like the
//! reference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use yasny_core::bytecode::{FunctionBc, Instruction, ProgramBc};
use yasny_core::value::Value;
use yasny_core::Diagnostic;

use crate::builtins;
use crate::ops;
use crate::task::TaskManager;

/// Shared, immutable-for-the-call-chain state every frame needs: the compiled program and the
/// task manager. Wrapped in `Arc` so a spawned task's closure can hold its own handle.
pub struct RuntimeContext {
    pub program: Arc<ProgramBc>,
    pub tasks: Arc<TaskManager>,
    pub path: Option<String>,
}

fn runtime_error(ctx: &RuntimeContext, message: impl Into<String>) -> Diagnostic {
    let diag = Diagnostic::new(message);
    match &ctx.path {
        Some(path) => diag.with_path(path.clone()),
        None => diag,
    }
}

fn pop(stack: &mut Vec<Value>, ctx: &RuntimeContext) -> Result<Value, Diagnostic> {
    stack.pop().ok_or_else(|| runtime_error(ctx, "опустошение стека во время выполнения"))
}

fn pop2(stack: &mut Vec<Value>, ctx: &RuntimeContext) -> Result<(Value, Value), Diagnostic> {
    let b = pop(stack, ctx)?;
    let a = pop(stack, ctx)?;
    Ok((a, b))
}

/// Runs one function invocation to completion against its own locals and the given globals
/// vector. Globals are a plain `&mut Vec<Value>`, not a `Mutex`: within a single call chain
/// execution is single-threaded, and tasks never share this vector — they get their own
/// deep-cloned copy (§9 "globals snapshot for tasks").
pub fn execute_function(ctx: &Arc<RuntimeContext>, globals: &mut Vec<Value>, function: &FunctionBc, args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.len() != function.params.len() {
        return Err(runtime_error(ctx, format!(
            "функция '{}' ожидает {} аргументов, получено {}",
            function.name,
            function.params.len(),
            args.len()
        )));
    }

    let mut locals: Vec<Value> = vec![Value::Null; function.local_count as usize];
    for (slot, value) in args.into_iter().enumerate() {
        locals[slot] = value;
    }

    let mut stack: Vec<Value> = Vec::new();
    let mut ip = 0usize;

    loop {
        let instruction = function.instructions.get(ip).ok_or_else(|| {
            runtime_error(ctx, format!("указатель инструкции вышел за пределы функции '{}'", function.name))
        })?;
        ip += 1;

        match instruction {
            Instruction::Const(value) => stack.push(value.clone()),
            Instruction::ConstNull => stack.push(Value::Null),
            Instruction::Load(slot) => {
                let value = locals
                    .get(*slot as usize)
                    .cloned()
                    .ok_or_else(|| runtime_error(ctx, format!("недопустимый локальный слот {slot}")))?;
                stack.push(value);
            }
            Instruction::Store(slot) => {
                let value = pop(&mut stack, ctx)?;
                let target = locals
                    .get_mut(*slot as usize)
                    .ok_or_else(|| runtime_error(ctx, format!("недопустимый локальный слот {slot}")))?;
                *target = value;
            }
            Instruction::GLoad(slot) => {
                let value = globals
                    .get(*slot as usize)
                    .cloned()
                    .ok_or_else(|| runtime_error(ctx, format!("недопустимый глобальный слот {slot}")))?;
                stack.push(value);
            }
            Instruction::GStore(slot) => {
                let value = pop(&mut stack, ctx)?;
                let target = globals
                    .get_mut(*slot as usize)
                    .ok_or_else(|| runtime_error(ctx, format!("недопустимый глобальный слот {slot}")))?;
                *target = value;
            }
            Instruction::Pop => {
                pop(&mut stack, ctx)?;
            }
            Instruction::Add => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::add(a, b)?);
            }
            Instruction::Sub => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::sub(a, b)?);
            }
            Instruction::Mul => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::mul(a, b)?);
            }
            Instruction::Div => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::div(a, b)?);
            }
            Instruction::Mod => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::rem(a, b)?);
            }
            Instruction::Neg => {
                let a = pop(&mut stack, ctx)?;
                stack.push(ops::neg(a)?);
            }
            Instruction::Not => {
                let a = pop(&mut stack, ctx)?;
                stack.push(ops::not(a)?);
            }
            Instruction::And => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::and(a, b)?);
            }
            Instruction::Or => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::or(a, b)?);
            }
            Instruction::Eq => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::eq(&a, &b));
            }
            Instruction::Ne => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::ne(&a, &b));
            }
            Instruction::Lt => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::lt(a, b)?);
            }
            Instruction::Le => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::le(a, b)?);
            }
            Instruction::Gt => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::gt(a, b)?);
            }
            Instruction::Ge => {
                let (a, b) = pop2(&mut stack, ctx)?;
                stack.push(ops::ge(a, b)?);
            }
            Instruction::Jmp(target) => {
                ip = *target;
            }
            Instruction::JmpFalse(target) => {
                let cond = pop(&mut stack, ctx)?;
                if !cond.is_truthy() {
                    ip = *target;
                }
            }
            Instruction::Call { name, argc } => {
                let argc = *argc as usize;
                if stack.len() < argc {
                    return Err(runtime_error(ctx, format!("недостаточно аргументов на стеке для вызова '{name}'")));
                }
                let call_args = stack.split_off(stack.len() - argc);
                let result = dispatch_call(ctx, globals, name, call_args)?;
                stack.push(result);
            }
            Instruction::Ret => {
                return Ok(stack.pop().unwrap_or(Value::Null));
            }
            Instruction::MakeList(count) => {
                let count = *count as usize;
                if stack.len() < count {
                    return Err(runtime_error(ctx, "недостаточно значений на стеке для построения списка"));
                }
                let items = stack.split_off(stack.len() - count);
                stack.push(Value::List(items));
            }
            Instruction::MakeDict(count) => {
                let count = *count as usize;
                if stack.len() < count * 2 {
                    return Err(runtime_error(ctx, "недостаточно значений на стеке для построения словаря"));
                }
                let flat = stack.split_off(stack.len() - count * 2);
                let mut pairs = Vec::with_capacity(count);
                let mut iter = flat.into_iter();
                while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                    pairs.push((key, value));
                }
                stack.push(ops::make_dict(pairs)?);
            }
            Instruction::IndexGet => {
                let (target, index) = pop2(&mut stack, ctx)?;
                stack.push(ops::index_get(target, index)?);
            }
            Instruction::IndexSet => {
                let value = pop(&mut stack, ctx)?;
                let (mut target, index) = pop2(&mut stack, ctx)?;
                ops::index_set(&mut target, index, value.clone())?;
                stack.push(value);
            }
            Instruction::Len => {
                let a = pop(&mut stack, ctx)?;
                stack.push(ops::len(&a)?);
            }
            Instruction::Halt => {
                return Ok(stack.pop().unwrap_or(Value::Null));
            }
        }
    }
}

fn dispatch_call(ctx: &Arc<RuntimeContext>, globals: &mut Vec<Value>, name: &str, call_args: Vec<Value>) -> Result<Value, Diagnostic> {
    if yasny_compiler::resolver::BUILTIN_NAMES.contains(&name) {
        return builtins::call(ctx, globals, name, call_args).expect("builtin name checked against BUILTIN_NAMES");
    }

    let function = ctx
        .program
        .functions
        .get(name)
        .cloned()
        .ok_or_else(|| runtime_error(ctx, format!("неизвестная функция во время выполнения: {name}")))?;

    if function.is_async {
        let globals_snapshot = globals.clone();
        let ctx_for_task = Arc::clone(ctx);
        let id = ctx.tasks.spawn(move || {
            let mut snapshot = globals_snapshot;
            execute_function(&ctx_for_task, &mut snapshot, &function, call_args)
        });
        Ok(Value::Task(id))
    } else {
        execute_function(ctx, globals, &function, call_args)
    }
}

/// Owns the global store and runs the entry function / named functions against it, serializing
/// concurrent host calls through a single lock held for the whole invocation (§5 "VM.run() and
/// VM.call_function() serialize via a lock on VM state" — re-entrant in spirit since nothing in a
/// single call chain locks it a second time).
pub struct VirtualMachine {
    ctx: Arc<RuntimeContext>,
    globals: Mutex<Vec<Value>>,
    initialized: AtomicBool,
}

impl VirtualMachine {
    pub fn new(program: ProgramBc, path: Option<String>) -> Self {
        let global_count = program.global_count as usize;
        VirtualMachine {
            ctx: Arc::new(RuntimeContext { program: Arc::new(program), tasks: TaskManager::new(), path }),
            globals: Mutex::new(vec![Value::Null; global_count]),
            initialized: AtomicBool::new(false),
        }
    }

    /// Runs the program's entry function, mutating the global store in place.
    pub fn run(&self) -> Result<Value, Diagnostic> {
        let mut globals = self.globals.lock().expect("vm globals poisoned");
        let entry = Arc::clone(&self.ctx.program);
        let result = execute_function(&self.ctx, &mut globals, &entry.entry, vec![]);
        self.initialized.store(true, Ordering::SeqCst);
        result
    }

    pub fn list_functions(&self) -> Vec<String> {
        self.ctx.program.functions.keys().cloned().collect()
    }

    pub fn has_function(&self, function_name: &str) -> bool {
        self.ctx.program.functions.contains_key(function_name)
    }

    /// Calls a named function directly, (re-)running the entry function first if asked to reset
    /// state or if the entry has never run yet (mirrors the reference `VM.call_function`'s
    /// `if reset_state or not self._initialized: self.run()`): a fresh VM's globals are all-`Null`
    /// until the entry has populated them at least once.
    pub fn call_function(&self, name: &str, args: Vec<Value>, reset_state: bool) -> Result<Value, Diagnostic> {
        let mut globals = self.globals.lock().expect("vm globals poisoned");
        if reset_state || !self.initialized.load(Ordering::SeqCst) {
            *globals = vec![Value::Null; self.ctx.program.global_count as usize];
            execute_function(&self.ctx, &mut globals, &self.ctx.program.entry, vec![])?;
            self.initialized.store(true, Ordering::SeqCst);
        }
        if yasny_compiler::resolver::BUILTIN_NAMES.contains(&name) {
            return builtins::call(&self.ctx, &globals, name, args)
                .ok_or_else(|| runtime_error(&self.ctx, format!("неизвестная функция во время выполнения: {name}")))?;
        }
        let function = self
            .ctx
            .program
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| runtime_error(&self.ctx, format!("неизвестная функция во время выполнения: {name}")))?;
        execute_function(&self.ctx, &mut globals, &function, args)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serial_test::serial;

    use super::*;

    fn function(name: &str, instructions: Vec<Instruction>, local_count: u16) -> FunctionBc {
        FunctionBc { name: name.into(), params: vec![], local_count, instructions, is_async: false }
    }

    #[test]
    fn arithmetic_folds_to_expected_value() {
        let entry = function(
            "__entry__",
            vec![Instruction::Const(Value::Int(3)), Instruction::Const(Value::Int(4)), Instruction::Add, Instruction::Ret],
            0,
        );
        let program = ProgramBc { functions: BTreeMap::new(), entry, global_count: 0 };
        let vm = VirtualMachine::new(program, None);
        assert_eq!(vm.run().unwrap(), Value::Int(7));
    }

    #[test]
    fn recursive_call_computes_factorial() {
        let mut functions = BTreeMap::new();
        // факториал(n) = если n <= 1 то 1 иначе n * факториал(n - 1)
        functions.insert(
            "факториал".to_string(),
            FunctionBc {
                name: "факториал".into(),
                params: vec!["n".into()],
                local_count: 1,
                instructions: vec![
                    Instruction::Load(0),
                    Instruction::Const(Value::Int(1)),
                    Instruction::Le,
                    Instruction::JmpFalse(5),
                    Instruction::Const(Value::Int(1)),
                    Instruction::Jmp(11),
                    Instruction::Load(0),
                    Instruction::Load(0),
                    Instruction::Const(Value::Int(1)),
                    Instruction::Sub,
                    Instruction::Call { name: "факториал".into(), argc: 1 },
                    Instruction::Mul,
                    Instruction::Ret,
                ],
                is_async: false,
            },
        );
        let entry = function(
            "__entry__",
            vec![Instruction::Const(Value::Int(5)), Instruction::Call { name: "факториал".into(), argc: 1 }, Instruction::Ret],
            0,
        );
        let program = ProgramBc { functions, entry, global_count: 0 };
        let vm = VirtualMachine::new(program, None);
        assert_eq!(vm.run().unwrap(), Value::Int(120));
    }

    #[test]
    fn global_store_access_round_trips() {
        let entry = function(
            "__entry__",
            vec![
                Instruction::Const(Value::Int(8)),
                Instruction::GStore(0),
                Instruction::GLoad(0),
                Instruction::Ret,
            ],
            0,
        );
        let program = ProgramBc { functions: BTreeMap::new(), entry, global_count: 1 };
        let vm = VirtualMachine::new(program, None);
        assert_eq!(vm.run().unwrap(), Value::Int(8));
    }

    #[test]
    #[serial]
    fn async_call_returns_a_task_immediately() {
        let mut functions = BTreeMap::new();
        functions.insert(
            "медленно".to_string(),
            FunctionBc {
                name: "медленно".into(),
                params: vec![],
                local_count: 0,
                instructions: vec![Instruction::Const(Value::Int(42)), Instruction::Ret],
                is_async: true,
            },
        );
        let entry = function(
            "__entry__",
            vec![Instruction::Call { name: "медленно".into(), argc: 0 }, Instruction::Ret],
            0,
        );
        let program = ProgramBc { functions, entry, global_count: 0 };
        let vm = VirtualMachine::new(program, None);
        may::config().set_workers(2);
        let result = vm.run().unwrap();
        match result {
            Value::Task(id) => {
                let value = vm.ctx.tasks.wait(id, Some(1000)).unwrap();
                assert_eq!(value, Value::Int(42));
            }
            other => panic!("expected a task, got {other:?}"),
        }
    }

    #[test]
    fn call_function_auto_runs_entry_once_on_first_use_without_reset() {
        let entry = function(
            "__entry__",
            vec![Instruction::Const(Value::Int(5)), Instruction::GStore(0), Instruction::Ret],
            0,
        );
        let mut functions = BTreeMap::new();
        functions.insert(
            "получить".to_string(),
            FunctionBc {
                name: "получить".into(),
                params: vec![],
                local_count: 0,
                instructions: vec![Instruction::GLoad(0), Instruction::Ret],
                is_async: false,
            },
        );
        let program = ProgramBc { functions, entry, global_count: 1 };
        let vm = VirtualMachine::new(program, None);
        // No `run()` call first: globals start all-Null, so this must still see 5, not Null.
        assert_eq!(vm.call_function("получить", vec![], false).unwrap(), Value::Int(5));
    }

    #[test]
    fn unknown_function_at_runtime_is_a_diagnostic_not_a_panic() {
        let entry = function(
            "__entry__",
            vec![Instruction::Call { name: "нет_такой_функции".into(), argc: 0 }, Instruction::Ret],
            0,
        );
        let program = ProgramBc { functions: BTreeMap::new(), entry, global_count: 0 };
        let vm = VirtualMachine::new(program, None);
        assert!(vm.run().is_err());
    }
}
