//! Built-in function implementations (§6), grounded on the reference `vm.py`'s `_builtin_*`
//! methods for `печать`/`длина`/`диапазон`/`ввод` — the reference never implemented the rest of
//! this table (`пауза`/`строка`/`число`/`запустить`/`готово`/`ожидать`/`ожидать_все`/`отменить`),
//! so those are written fresh against the signatures in §6, using [`ops::len`] and the task
//! subsystem for the ones that need it.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use yasny_core::value::{TaskId, Value};
use yasny_core::Diagnostic;

use crate::ops;
use crate::vm::RuntimeContext;

fn arity_error(name: &str, expected: &str, got: usize) -> Diagnostic {
    Diagnostic::new(format!("{name} ожидает {expected}, получено {got} аргумент(ов)"))
}

fn expect_task(name: &str, value: &Value) -> Result<TaskId, Diagnostic> {
    match value {
        Value::Task(id) => Ok(*id),
        other => Err(Diagnostic::new(format!("{name} ожидает Задачу, получено {}", other.type_name()))),
    }
}

fn expect_optional_timeout(name: &str, args: &[Value], at: usize) -> Result<Option<u64>, Diagnostic> {
    match args.get(at) {
        None => Ok(None),
        Some(Value::Int(ms)) if *ms >= 0 => Ok(Some(*ms as u64)),
        Some(other) => Err(Diagnostic::new(format!("{name}: таймаут должен быть неотрицательным Цел, получено {}", other.type_name()))),
    }
}

/// Dispatches a built-in call. Returns `None` if `name` is not a built-in (the caller then tries
/// the program's own functions).
pub fn call(ctx: &Arc<RuntimeContext>, globals: &[Value], name: &str, args: Vec<Value>) -> Option<Result<Value, Diagnostic>> {
    Some(match name {
        "печать" => print_builtin(args),
        "длина" => len_builtin(args),
        "диапазон" => range_builtin(args),
        "ввод" => input_builtin(args),
        "пауза" => sleep_builtin(args),
        "строка" => to_string_builtin(args),
        "число" => to_int_builtin(args),
        "запустить" => spawn_builtin(ctx, globals, args),
        "готово" => done_builtin(ctx, args),
        "ожидать" => wait_builtin(ctx, args),
        "ожидать_все" => wait_all_builtin(ctx, args),
        "отменить" => cancel_builtin(ctx, args),
        _ => return None,
    })
}

fn print_builtin(args: Vec<Value>) -> Result<Value, Diagnostic> {
    let rendered: Vec<String> = args.iter().map(Value::format).collect();
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{}", rendered.join(" "));
    Ok(Value::Null)
}

fn len_builtin(mut args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.len() != 1 {
        return Err(arity_error("длина", "1 аргумент", args.len()));
    }
    ops::len(&args.remove(0))
}

fn range_builtin(args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.len() != 2 {
        return Err(arity_error("диапазон", "2 аргумента", args.len()));
    }
    match (&args[0], &args[1]) {
        (Value::Int(start), Value::Int(end)) => Ok(Value::List((*start..*end).map(Value::Int).collect())),
        _ => Err(Diagnostic::new("диапазон ожидает (Цел, Цел)")),
    }
}

fn input_builtin(args: Vec<Value>) -> Result<Value, Diagnostic> {
    if !args.is_empty() {
        return Err(arity_error("ввод", "0 аргументов", args.len()));
    }
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| Diagnostic::new(format!("не удалось прочитать ввод: {e}")))?;
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Value::String(line))
}

fn sleep_builtin(args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.len() != 1 {
        return Err(arity_error("пауза", "1 аргумент", args.len()));
    }
    match &args[0] {
        Value::Int(ms) if *ms >= 0 => {
            may::coroutine::sleep(Duration::from_millis(*ms as u64));
            Ok(Value::Null)
        }
        other => Err(Diagnostic::new(format!("пауза ожидает неотрицательный Цел, получено {}", other.type_name()))),
    }
}

fn to_string_builtin(args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.len() != 1 {
        return Err(arity_error("строка", "1 аргумент", args.len()));
    }
    Ok(Value::String(args[0].format()))
}

fn to_int_builtin(args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.len() != 1 {
        return Err(arity_error("число", "1 аргумент", args.len()));
    }
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Bool(b) => Ok(Value::Int(if *b { 1 } else { 0 })),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(Value::Int(0))
            } else {
                trimmed
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| Diagnostic::new(format!("число: '{s}' не является числом")))
            }
        }
        other => Err(Diagnostic::new(format!("число не поддерживается для {}", other.type_name()))),
    }
}

fn spawn_builtin(ctx: &Arc<RuntimeContext>, globals: &[Value], args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.is_empty() {
        return Err(arity_error("запустить", "имя функции и аргументы", args.len()));
    }
    let name = match &args[0] {
        Value::String(s) => s.clone(),
        other => return Err(Diagnostic::new(format!("запустить ожидает имя функции строкой, получено {}", other.type_name()))),
    };
    let call_args = args[1..].to_vec();
    let function = ctx
        .program
        .functions
        .get(&name)
        .cloned()
        .ok_or_else(|| Diagnostic::new(format!("запустить: неизвестная функция {name}")))?;
    if function.params.len() != call_args.len() {
        return Err(Diagnostic::new(format!(
            "запустить: функция '{name}' ожидает {} аргументов, получено {}",
            function.params.len(),
            call_args.len()
        )));
    }
    let globals_snapshot = globals.to_vec();
    let ctx_for_task = Arc::clone(ctx);
    let id = ctx.tasks.spawn(move || {
        let mut snapshot = globals_snapshot;
        crate::vm::execute_function(&ctx_for_task, &mut snapshot, &function, call_args)
    });
    Ok(Value::Task(id))
}

fn done_builtin(ctx: &Arc<RuntimeContext>, args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.len() != 1 {
        return Err(arity_error("готово", "1 аргумент", args.len()));
    }
    let id = expect_task("готово", &args[0])?;
    Ok(Value::Bool(ctx.tasks.done(id)?))
}

fn wait_builtin(ctx: &Arc<RuntimeContext>, args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.is_empty() || args.len() > 2 {
        return Err(arity_error("ожидать", "1 или 2 аргумента", args.len()));
    }
    let id = expect_task("ожидать", &args[0])?;
    let timeout = expect_optional_timeout("ожидать", &args, 1)?;
    ctx.tasks.wait(id, timeout)
}

fn wait_all_builtin(ctx: &Arc<RuntimeContext>, args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.is_empty() || args.len() > 2 {
        return Err(arity_error("ожидать_все", "1 или 2 аргумента", args.len()));
    }
    let ids = match &args[0] {
        Value::List(items) => items.iter().map(|v| expect_task("ожидать_все", v)).collect::<Result<Vec<_>, _>>()?,
        other => return Err(Diagnostic::new(format!("ожидать_все ожидает Список[Задача], получено {}", other.type_name()))),
    };
    let timeout = expect_optional_timeout("ожидать_все", &args, 1)?;
    Ok(Value::List(ctx.tasks.wait_all(&ids, timeout)?))
}

fn cancel_builtin(ctx: &Arc<RuntimeContext>, args: Vec<Value>) -> Result<Value, Diagnostic> {
    if args.len() != 1 {
        return Err(arity_error("отменить", "1 аргумент", args.len()));
    }
    let id = expect_task("отменить", &args[0])?;
    Ok(Value::Bool(ctx.tasks.cancel(id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskManager;
    use std::collections::BTreeMap;
    use yasny_core::bytecode::{FunctionBc, ProgramBc};

    fn empty_ctx() -> Arc<RuntimeContext> {
        Arc::new(RuntimeContext {
            program: Arc::new(ProgramBc {
                functions: BTreeMap::new(),
                entry: FunctionBc { name: "__entry__".into(), params: vec![], local_count: 0, instructions: vec![], is_async: false },
                global_count: 0,
            }),
            tasks: TaskManager::new(),
            path: None,
        })
    }

    #[test]
    fn range_is_half_open() {
        let result = call(&empty_ctx(), &[], "диапазон", vec![Value::Int(1), Value::Int(4)]).unwrap().unwrap();
        assert_eq!(result, Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn to_int_trims_and_parses_strings() {
        let result = call(&empty_ctx(), &[], "число", vec![Value::String("  42 ".into())]).unwrap().unwrap();
        assert_eq!(result, Value::Int(42));
    }

    #[test]
    fn to_int_empty_string_is_zero() {
        let result = call(&empty_ctx(), &[], "число", vec![Value::String("  ".into())]).unwrap().unwrap();
        assert_eq!(result, Value::Int(0));
    }

    #[test]
    fn to_int_non_numeric_string_is_fatal() {
        let result = call(&empty_ctx(), &[], "число", vec![Value::String("abc".into())]).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn unknown_name_is_not_a_builtin() {
        assert!(call(&empty_ctx(), &[], "неизвестно", vec![]).is_none());
    }

    #[test]
    fn done_on_unknown_task_is_an_error() {
        let result = call(&empty_ctx(), &[], "готово", vec![Value::Task(TaskId(1))]).unwrap();
        assert!(result.is_err());
    }
}
