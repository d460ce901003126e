//! Two-pass type checker, grounded on the reference `checker.py`: pass one registers every
//! top-level function's signature, pass two checks module-init statements (building
//! `global_symbols`), then each function body against its own signature, then validates `main`.

use crate::ast::{BinaryOp, Expr, ExprKind, FuncDecl, Literal, Program, Stmt, UnaryOp};
use crate::types::{is_assignable, Type};
use std::collections::HashMap;
use yasny_core::Diagnostic;

/// A callable's arity/type contract. Builtins carry `varargs`/arg-count quirks handled specially
/// in [`TypeChecker::check_builtin_call`]; user functions are checked by plain positional
/// assignability.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Type,
    pub builtin: bool,
    pub varargs: bool,
    pub is_async: bool,
}

impl FunctionSignature {
    fn user(name: &str, params: Vec<Type>, return_type: Type, is_async: bool) -> Self {
        FunctionSignature {
            name: name.to_string(),
            params,
            return_type,
            builtin: false,
            varargs: false,
            is_async,
        }
    }

    fn builtin(name: &str, params: Vec<Type>, return_type: Type, varargs: bool) -> Self {
        FunctionSignature {
            name: name.to_string(),
            params,
            return_type,
            builtin: true,
            varargs,
            is_async: false,
        }
    }
}

/// Everything the rest of the pipeline (optimizer, compiler) needs from a completed check.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    pub function_signatures: HashMap<String, FunctionSignature>,
}

type Scope = HashMap<String, Type>;

struct TypeChecker<'a> {
    path: Option<&'a str>,
    function_signatures: HashMap<String, FunctionSignature>,
    scopes: Vec<Scope>,
    global_symbols: Scope,
    loop_depth: u32,
}

/// Runs the checker over a fully resolved program, writing `inferred_type` onto every `Expr`
/// node in place. Member-access nodes and unresolved imports must already be gone (§9).
pub fn check_program(program: &mut Program, path: Option<&str>) -> Result<CheckResult, Diagnostic> {
    tracing::debug!(path = ?path, statement_count = program.statements.len(), "type-checking program");
    let mut checker = TypeChecker {
        path,
        function_signatures: install_builtins(),
        scopes: Vec::new(),
        global_symbols: HashMap::new(),
        loop_depth: 0,
    };
    checker.check(program)?;
    tracing::debug!(function_count = checker.function_signatures.len(), "type-check pass complete");
    Ok(CheckResult { function_signatures: checker.function_signatures })
}

fn install_builtins() -> HashMap<String, FunctionSignature> {
    let mut m = HashMap::new();
    let mut add = |sig: FunctionSignature| {
        m.insert(sig.name.clone(), sig);
    };
    add(FunctionSignature::builtin("печать", vec![], Type::Void, true));
    add(FunctionSignature::builtin("длина", vec![], Type::Int, false));
    add(FunctionSignature::builtin(
        "диапазон",
        vec![Type::Int, Type::Int],
        Type::List(Box::new(Type::Int)),
        false,
    ));
    add(FunctionSignature::builtin("ввод", vec![], Type::String, false));
    add(FunctionSignature::builtin("пауза", vec![Type::Int], Type::Void, false));
    add(FunctionSignature::builtin("строка", vec![Type::Any], Type::String, false));
    add(FunctionSignature::builtin("число", vec![Type::Any], Type::Int, false));
    add(FunctionSignature::builtin("запустить", vec![Type::String], Type::Task, true));
    add(FunctionSignature::builtin("готово", vec![Type::Task], Type::Bool, false));
    add(FunctionSignature::builtin("ожидать", vec![Type::Task], Type::Any, false));
    add(FunctionSignature::builtin(
        "ожидать_все",
        vec![Type::List(Box::new(Type::Task))],
        Type::List(Box::new(Type::Any)),
        false,
    ));
    add(FunctionSignature::builtin("отменить", vec![Type::Task], Type::Bool, false));
    m
}

impl<'a> TypeChecker<'a> {
    fn err(&self, message: impl Into<String>, line: usize, col: usize) -> Diagnostic {
        let d = Diagnostic::at(message, line, col);
        match self.path {
            Some(p) => d.with_path(p),
            None => d,
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) -> Scope {
        self.scopes.pop().expect("scope stack underflow")
    }

    fn define_var(&mut self, name: &str, ty: Type, line: usize, col: usize) -> Result<(), Diagnostic> {
        let scope = self.scopes.last_mut().expect("no active scope");
        if scope.contains_key(name) {
            return Err(self.err(format!("переменная '{name}' уже объявлена в этой области"), line, col));
        }
        scope.insert(name.to_string(), ty);
        Ok(())
    }

    fn resolve_var(&self, name: &str, line: usize, col: usize) -> Result<Type, Diagnostic> {
        for scope in self.scopes.iter().rev() {
            if let Some(t) = scope.get(name) {
                return Ok(t.clone());
            }
        }
        Err(self.err(format!("неизвестная переменная '{name}'"), line, col))
    }

    fn check(&mut self, program: &mut Program) -> Result<(), Diagnostic> {
        for stmt in program.statements.iter() {
            if let Stmt::FuncDecl(f) = stmt {
                if self.function_signatures.contains_key(&f.name) {
                    return Err(self.err(format!("функция '{}' уже объявлена", f.name), f.line, f.col));
                }
                let params = f.params.iter().map(|p| p.type_ann.clone()).collect();
                self.function_signatures.insert(
                    f.name.clone(),
                    FunctionSignature::user(&f.name, params, f.return_type.clone(), f.is_async),
                );
            }
        }

        self.push_scope();
        for stmt in program.statements.iter_mut() {
            if matches!(stmt, Stmt::FuncDecl(_)) {
                continue;
            }
            if self.check_stmt(stmt, None)? {
                let (line, col) = stmt.loc();
                return Err(self.err("'вернуть' вне функции", line, col));
            }
        }
        self.global_symbols = self.scopes.last().unwrap().clone();
        self.pop_scope();

        for stmt in program.statements.iter_mut() {
            if let Stmt::FuncDecl(f) = stmt {
                let sig = self.function_signatures.get(&f.name).cloned().unwrap();
                self.check_function(f, &sig)?;
            }
        }

        if let Some(sig) = self.function_signatures.get("main").cloned() {
            if !sig.params.is_empty() {
                return Err(self.err("функция 'main' не должна принимать параметры", 0, 0));
            }
            if sig.return_type != Type::Void {
                return Err(self.err("функция 'main' должна возвращать Пусто", 0, 0));
            }
            if sig.is_async {
                return Err(self.err("функция 'main' не может быть асинхронной", 0, 0));
            }
        }
        Ok(())
    }

    fn check_function(&mut self, f: &mut FuncDecl, sig: &FunctionSignature) -> Result<(), Diagnostic> {
        self.push_scope();
        for (name, ty) in &self.global_symbols {
            self.scopes.last_mut().unwrap().insert(name.clone(), ty.clone());
        }
        self.push_scope();
        for (param, ty) in f.params.iter().zip(sig.params.iter()) {
            self.define_var(&param.name, ty.clone(), f.line, f.col)?;
        }

        let guaranteed = self.check_block(&mut f.body, Some(&sig.return_type))?;

        self.pop_scope();
        self.pop_scope();

        if sig.return_type != Type::Void && !guaranteed {
            return Err(self.err(
                format!("функция '{}' не все пути возвращают значение", f.name),
                f.line,
                f.col,
            ));
        }
        Ok(())
    }

    fn check_block(
        &mut self,
        body: &mut [Stmt],
        current_return_type: Option<&Type>,
    ) -> Result<bool, Diagnostic> {
        for stmt in body.iter_mut() {
            if self.check_stmt(stmt, current_return_type)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns whether this statement guarantees a `вернуть` on every path through it.
    fn check_stmt(
        &mut self,
        stmt: &mut Stmt,
        current_return_type: Option<&Type>,
    ) -> Result<bool, Diagnostic> {
        match stmt {
            Stmt::ImportAll { line, col, .. } | Stmt::ImportFrom { line, col, .. } => Err(self.err(
                "импорт должен быть разрешён модульным резолвером до проверки типов",
                *line,
                *col,
            )),
            Stmt::VarDecl { name, type_ann, value, line, col, .. } => {
                let value_t = self.check_expr(value)?;
                let declared = match type_ann {
                    Some(ann) => {
                        if !is_assignable(ann, &value_t) {
                            return Err(self.err(
                                format!("нельзя присвоить значение типа {value_t} переменной типа {ann}"),
                                *line,
                                *col,
                            ));
                        }
                        ann.clone()
                    }
                    None => value_t,
                };
                self.define_var(name, declared, *line, *col)?;
                Ok(false)
            }
            Stmt::Assign { name, value, line, col } => {
                let existing = self.resolve_var(name, *line, *col)?;
                let value_t = self.check_expr(value)?;
                if !is_assignable(&existing, &value_t) {
                    return Err(self.err(
                        format!("нельзя присвоить значение типа {value_t} переменной типа {existing}"),
                        *line,
                        *col,
                    ));
                }
                Ok(false)
            }
            Stmt::IndexAssign { target, index, value, line, col } => {
                let target_t = self.check_expr(target)?;
                let index_t = self.check_expr(index)?;
                let slot_t = self.index_access_type(&target_t, &index_t, *line, *col)?;
                let value_t = self.check_expr(value)?;
                if !is_assignable(&slot_t, &value_t) {
                    return Err(self.err(
                        format!("нельзя присвоить значение типа {value_t} элементу типа {slot_t}"),
                        *line,
                        *col,
                    ));
                }
                Ok(false)
            }
            Stmt::FuncDecl(f) => Err(self.err("вложенные объявления функций не поддерживаются", f.line, f.col)),
            Stmt::If { condition, then_body, else_body, line, col } => {
                let cond_t = self.check_expr(condition)?;
                if cond_t != Type::Bool {
                    return Err(self.err(format!("условие должно иметь тип Лог, получено {cond_t}"), *line, *col));
                }
                self.push_scope();
                let then_returns = self.check_block(then_body, current_return_type)?;
                self.pop_scope();
                let has_else = else_body.is_some();
                let else_returns = match else_body {
                    Some(body) => {
                        self.push_scope();
                        let r = self.check_block(body, current_return_type)?;
                        self.pop_scope();
                        r
                    }
                    None => false,
                };
                Ok(then_returns && has_else && else_returns)
            }
            Stmt::While { condition, body, line, col } => {
                let cond_t = self.check_expr(condition)?;
                if cond_t != Type::Bool {
                    return Err(self.err(format!("условие должно иметь тип Лог, получено {cond_t}"), *line, *col));
                }
                self.loop_depth += 1;
                self.push_scope();
                self.check_block(body, current_return_type)?;
                self.pop_scope();
                self.loop_depth -= 1;
                Ok(false)
            }
            Stmt::For { var_name, iterable, body, line, col } => {
                let iter_t = self.check_expr(iterable)?;
                let mut elem_variants = Vec::new();
                for variant in iter_t.variants() {
                    match variant {
                        Type::List(elem) => elem_variants.push((**elem).clone()),
                        other => {
                            return Err(self.err(
                                format!("цикл 'для' требует Список[T], получено {other}"),
                                *line,
                                *col,
                            ));
                        }
                    }
                }
                let elem_t = Type::union(elem_variants);
                self.loop_depth += 1;
                self.push_scope();
                self.define_var(var_name, elem_t, *line, *col)?;
                self.check_block(body, current_return_type)?;
                self.pop_scope();
                self.loop_depth -= 1;
                Ok(false)
            }
            Stmt::Break { line, col } | Stmt::Continue { line, col } => {
                if self.loop_depth == 0 {
                    return Err(self.err("'прервать'/'продолжить' вне цикла", *line, *col));
                }
                Ok(false)
            }
            Stmt::Return { value, line, col } => {
                let ret_t = match current_return_type {
                    Some(t) => t.clone(),
                    None => return Err(self.err("'вернуть' вне функции", *line, *col)),
                };
                let value_t = self.check_expr(value)?;
                if !is_assignable(&ret_t, &value_t) {
                    return Err(self.err(
                        format!("функция должна возвращать {ret_t}, получено {value_t}"),
                        *line,
                        *col,
                    ));
                }
                Ok(true)
            }
            Stmt::ExprStmt { expr, .. } => {
                self.check_expr(expr)?;
                Ok(false)
            }
        }
    }

    fn check_expr(&mut self, expr: &mut Expr) -> Result<Type, Diagnostic> {
        let line = expr.line;
        let col = expr.col;
        let t = match &mut expr.kind {
            ExprKind::Literal(lit) => match lit {
                Literal::Int(_) => Type::Int,
                Literal::Float(_) => Type::Float,
                Literal::String(_) => Type::String,
                Literal::Bool(_) => Type::Bool,
                Literal::Null => Type::Void,
            },
            ExprKind::Identifier(name) => self.resolve_var(name, line, col)?,
            ExprKind::Member { .. } => {
                return Err(self.err(
                    "доступ через точку должен быть разрешён модульным резолвером до проверки типов",
                    line,
                    col,
                ));
            }
            ExprKind::List(items) => {
                if items.is_empty() {
                    return Err(self.err("пустой список требует явной аннотации типа", line, col));
                }
                let mut elem_t: Option<Type> = None;
                for item in items.iter_mut() {
                    let item_t = self.check_expr(item)?;
                    match &elem_t {
                        None => elem_t = Some(item_t),
                        Some(expected) if *expected == item_t => {}
                        Some(expected) => {
                            return Err(self.err(
                                format!("элементы списка должны иметь одинаковый тип: {expected} и {item_t}"),
                                line,
                                col,
                            ));
                        }
                    }
                }
                Type::List(Box::new(elem_t.unwrap()))
            }
            ExprKind::Dict(entries) => {
                if entries.is_empty() {
                    return Err(self.err("пустой словарь требует явной аннотации типа", line, col));
                }
                let mut key_t: Option<Type> = None;
                let mut val_t: Option<Type> = None;
                for (k, v) in entries.iter_mut() {
                    let kt = self.check_expr(k)?;
                    let vt = self.check_expr(v)?;
                    match &key_t {
                        None => key_t = Some(kt),
                        Some(expected) if *expected == kt => {}
                        Some(expected) => {
                            return Err(self.err(
                                format!("ключи словаря должны иметь одинаковый тип: {expected} и {kt}"),
                                line,
                                col,
                            ));
                        }
                    }
                    match &val_t {
                        None => val_t = Some(vt),
                        Some(expected) if *expected == vt => {}
                        Some(expected) => {
                            return Err(self.err(
                                format!("значения словаря должны иметь одинаковый тип: {expected} и {vt}"),
                                line,
                                col,
                            ));
                        }
                    }
                }
                Type::Dict(Box::new(key_t.unwrap()), Box::new(val_t.unwrap()))
            }
            ExprKind::Index { target, index } => {
                let target_t = self.check_expr(target)?;
                let index_t = self.check_expr(index)?;
                self.index_access_type(&target_t, &index_t, line, col)?
            }
            ExprKind::Unary { op, operand } => {
                let operand_t = self.check_expr(operand)?;
                match op {
                    UnaryOp::Not => {
                        if operand_t != Type::Bool {
                            return Err(self.err(format!("'не' требует Лог, получено {operand_t}"), line, col));
                        }
                        Type::Bool
                    }
                    UnaryOp::Neg => {
                        if !operand_t.is_numeric() {
                            return Err(self.err(format!("унарный минус требует число, получено {operand_t}"), line, col));
                        }
                        operand_t
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left_t = self.check_expr(left)?;
                let right_t = self.check_expr(right)?;
                self.check_binary(*op, &left_t, &right_t, line, col)?
            }
            ExprKind::Await(inner) => {
                let inner_t = self.check_expr(inner)?;
                if !is_assignable(&Type::Task, &inner_t) {
                    return Err(self.err(format!("'ждать' требует Задача, получено {inner_t}"), line, col));
                }
                Type::Any
            }
            ExprKind::Call { callee, args } => {
                let name = callee.as_identifier().map(str::to_string).ok_or_else(|| {
                    self.err("вызывать можно только функцию по имени", line, col)
                })?;
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args.iter_mut() {
                    arg_types.push(self.check_expr(arg)?);
                }
                self.check_call(&name, &arg_types, line, col)?
            }
        };
        expr.inferred_type = Some(t.clone());
        Ok(t)
    }

    fn check_binary(
        &self,
        op: BinaryOp,
        left: &Type,
        right: &Type,
        line: usize,
        col: usize,
    ) -> Result<Type, Diagnostic> {
        match op {
            BinaryOp::Add if *left == Type::String && *right == Type::String => Ok(Type::String),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                if left != right || !left.is_numeric() {
                    return Err(self.err(
                        format!("арифметическая операция требует два одинаковых числовых типа, получено {left} и {right}"),
                        line,
                        col,
                    ));
                }
                Ok(left.clone())
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if left != right {
                    return Err(self.err(
                        format!("сравнение на равенство требует одинаковые типы, получено {left} и {right}"),
                        line,
                        col,
                    ));
                }
                Ok(Type::Bool)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let orderable = |t: &Type| matches!(t, Type::Int | Type::Float | Type::String);
                if left != right || !orderable(left) {
                    return Err(self.err(
                        format!("сравнение порядка требует два одинаковых Цел/Дроб/Строка, получено {left} и {right}"),
                        line,
                        col,
                    ));
                }
                Ok(Type::Bool)
            }
            BinaryOp::And | BinaryOp::Or => {
                if *left != Type::Bool || *right != Type::Bool {
                    return Err(self.err(
                        format!("логическая операция требует Лог с обеих сторон, получено {left} и {right}"),
                        line,
                        col,
                    ));
                }
                Ok(Type::Bool)
            }
        }
    }

    /// `_index_access_type`: union target types are decomposed per-variant and the results
    /// combined back into a union.
    fn index_access_type(
        &self,
        target: &Type,
        index: &Type,
        line: usize,
        col: usize,
    ) -> Result<Type, Diagnostic> {
        let mut results = Vec::new();
        for variant in target.variants() {
            let result = match variant {
                Type::List(elem) => {
                    if *index != Type::Int {
                        return Err(self.err(format!("индекс списка должен быть Цел, получено {index}"), line, col));
                    }
                    (**elem).clone()
                }
                Type::Dict(key, val) => {
                    if !is_assignable(key, index) {
                        return Err(self.err(format!("ключ словаря должен быть {key}, получено {index}"), line, col));
                    }
                    (**val).clone()
                }
                Type::String => {
                    if *index != Type::Int {
                        return Err(self.err(format!("индекс строки должен быть Цел, получено {index}"), line, col));
                    }
                    Type::String
                }
                other => {
                    return Err(self.err(format!("тип {other} не поддерживает индексирование"), line, col));
                }
            };
            results.push(result);
        }
        Ok(Type::union(results))
    }

    fn check_call(
        &self,
        name: &str,
        arg_types: &[Type],
        line: usize,
        col: usize,
    ) -> Result<Type, Diagnostic> {
        let sig = self
            .function_signatures
            .get(name)
            .ok_or_else(|| self.err(format!("неизвестная функция '{name}'"), line, col))?
            .clone();
        if sig.builtin {
            return self.check_builtin_call(&sig, arg_types, line, col);
        }
        if !sig.varargs && arg_types.len() != sig.params.len() {
            return Err(self.err(
                format!("функция '{name}' ожидает {} аргумент(ов), получено {}", sig.params.len(), arg_types.len()),
                line,
                col,
            ));
        }
        for (expected, actual) in sig.params.iter().zip(arg_types.iter()) {
            if !is_assignable(expected, actual) {
                return Err(self.err(
                    format!("аргумент функции '{name}' должен быть {expected}, получено {actual}"),
                    line,
                    col,
                ));
            }
        }
        if sig.is_async {
            return Ok(Type::Task);
        }
        Ok(sig.return_type)
    }

    fn check_builtin_call(
        &self,
        sig: &FunctionSignature,
        arg_types: &[Type],
        line: usize,
        col: usize,
    ) -> Result<Type, Diagnostic> {
        let name = sig.name.as_str();
        match name {
            "печать" => Ok(Type::Void),
            "длина" => {
                if arg_types.len() != 1 {
                    return Err(self.err("'длина' принимает ровно один аргумент", line, col));
                }
                match &arg_types[0] {
                    Type::String | Type::List(_) => Ok(Type::Int),
                    other => Err(self.err(format!("'длина' требует Строка или Список, получено {other}"), line, col)),
                }
            }
            "диапазон" => {
                if arg_types.len() != 2 || arg_types.iter().any(|t| *t != Type::Int) {
                    return Err(self.err("'диапазон' принимает два аргумента типа Цел", line, col));
                }
                Ok(Type::List(Box::new(Type::Int)))
            }
            "ввод" => {
                if !arg_types.is_empty() {
                    return Err(self.err("'ввод' не принимает аргументов", line, col));
                }
                Ok(Type::String)
            }
            "пауза" => {
                if arg_types.len() != 1 || arg_types[0] != Type::Int {
                    return Err(self.err("'пауза' принимает один аргумент типа Цел", line, col));
                }
                Ok(Type::Void)
            }
            "строка" | "число" => {
                if arg_types.len() != 1 {
                    return Err(self.err(format!("'{name}' принимает ровно один аргумент"), line, col));
                }
                Ok(if name == "строка" { Type::String } else { Type::Int })
            }
            "запустить" => {
                if arg_types.is_empty() || !is_assignable(&Type::String, &arg_types[0]) {
                    return Err(self.err("'запустить' требует имя функции строкой первым аргументом", line, col));
                }
                Ok(Type::Task)
            }
            "готово" | "отменить" => {
                if arg_types.len() != 1 || !is_assignable(&Type::Task, &arg_types[0]) {
                    return Err(self.err(format!("'{name}' принимает один аргумент типа Задача"), line, col));
                }
                Ok(Type::Bool)
            }
            "ожидать" => {
                if arg_types.is_empty() || arg_types.len() > 2 || !is_assignable(&Type::Task, &arg_types[0]) {
                    return Err(self.err("'ожидать' принимает Задача и необязательный тайм-аут Цел", line, col));
                }
                if arg_types.len() == 2 && arg_types[1] != Type::Int {
                    return Err(self.err("тайм-аут 'ожидать' должен быть Цел", line, col));
                }
                Ok(Type::Any)
            }
            "ожидать_все" => {
                let list_of_task = Type::List(Box::new(Type::Task));
                if arg_types.is_empty() || arg_types.len() > 2 || !is_assignable(&list_of_task, &arg_types[0]) {
                    return Err(self.err("'ожидать_все' принимает Список[Задача] и необязательный тайм-аут Цел", line, col));
                }
                if arg_types.len() == 2 && arg_types[1] != Type::Int {
                    return Err(self.err("тайм-аут 'ожидать_все' должен быть Цел", line, col));
                }
                Ok(Type::List(Box::new(Type::Any)))
            }
            _ => unreachable!("builtin signature without a check_builtin_call arm: {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr, ExprKind, FuncDecl, Literal, Param, Program, Stmt};

    fn lit_int(n: i64) -> Expr {
        Expr::new(ExprKind::Literal(Literal::Int(n)), 1, 1)
    }

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Identifier(name.to_string()), 1, 1)
    }

    #[test]
    fn var_decl_infers_from_value() {
        let mut program = Program {
            statements: vec![Stmt::VarDecl {
                name: "х".to_string(),
                type_ann: None,
                value: lit_int(5),
                exported: false,
                line: 1,
                col: 1,
            }],
        };
        assert!(check_program(&mut program, None).is_ok());
    }

    #[test]
    fn var_decl_rejects_mismatched_annotation() {
        let mut program = Program {
            statements: vec![Stmt::VarDecl {
                name: "х".to_string(),
                type_ann: Some(Type::String),
                value: lit_int(5),
                exported: false,
                line: 1,
                col: 1,
            }],
        };
        assert!(check_program(&mut program, None).is_err());
    }

    #[test]
    fn return_outside_function_is_an_error() {
        let mut program = Program {
            statements: vec![Stmt::Return { value: lit_int(1), line: 1, col: 1 }],
        };
        assert!(check_program(&mut program, None).is_err());
    }

    #[test]
    fn function_missing_return_on_some_path_is_an_error() {
        let f = FuncDecl {
            name: "ф".to_string(),
            params: vec![],
            return_type: Type::Int,
            body: vec![Stmt::If {
                condition: Expr::new(ExprKind::Literal(Literal::Bool(true)), 1, 1),
                then_body: vec![Stmt::Return { value: lit_int(1), line: 2, col: 1 }],
                else_body: None,
                line: 1,
                col: 1,
            }],
            exported: false,
            is_async: false,
            line: 1,
            col: 1,
        };
        let mut program = Program { statements: vec![Stmt::FuncDecl(f)] };
        assert!(check_program(&mut program, None).is_err());
    }

    #[test]
    fn if_with_returning_both_branches_satisfies_definite_return() {
        let f = FuncDecl {
            name: "ф".to_string(),
            params: vec![],
            return_type: Type::Int,
            body: vec![Stmt::If {
                condition: Expr::new(ExprKind::Literal(Literal::Bool(true)), 1, 1),
                then_body: vec![Stmt::Return { value: lit_int(1), line: 2, col: 1 }],
                else_body: Some(vec![Stmt::Return { value: lit_int(2), line: 3, col: 1 }]),
                line: 1,
                col: 1,
            }],
            exported: false,
            is_async: false,
            line: 1,
            col: 1,
        };
        let mut program = Program { statements: vec![Stmt::FuncDecl(f)] };
        assert!(check_program(&mut program, None).is_ok());
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let mut program = Program { statements: vec![Stmt::Break { line: 1, col: 1 }] };
        assert!(check_program(&mut program, None).is_err());
    }

    #[test]
    fn string_concatenation_is_allowed() {
        let expr = Stmt::ExprStmt {
            expr: Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Add,
                    left: Box::new(Expr::new(ExprKind::Literal(Literal::String("а".into())), 1, 1)),
                    right: Box::new(Expr::new(ExprKind::Literal(Literal::String("б".into())), 1, 1)),
                },
                1,
                1,
            ),
            line: 1,
            col: 1,
        };
        let mut program = Program { statements: vec![expr] };
        assert!(check_program(&mut program, None).is_ok());
    }

    #[test]
    fn mismatched_arithmetic_operands_are_rejected() {
        let expr = Stmt::ExprStmt {
            expr: Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Add,
                    left: Box::new(lit_int(1)),
                    right: Box::new(Expr::new(ExprKind::Literal(Literal::String("б".into())), 1, 1)),
                },
                1,
                1,
            ),
            line: 1,
            col: 1,
        };
        let mut program = Program { statements: vec![expr] };
        assert!(check_program(&mut program, None).is_err());
    }

    #[test]
    fn builtin_call_checks_arity_and_types() {
        let expr = Stmt::ExprStmt {
            expr: Expr::new(
                ExprKind::Call {
                    callee: Box::new(ident("диапазон")),
                    args: vec![lit_int(0), lit_int(10)],
                },
                1,
                1,
            ),
            line: 1,
            col: 1,
        };
        let mut program = Program { statements: vec![expr] };
        assert!(check_program(&mut program, None).is_ok());
    }

    #[test]
    fn async_function_call_site_returns_task() {
        let f = FuncDecl {
            name: "раб".to_string(),
            params: vec![],
            return_type: Type::Int,
            body: vec![Stmt::Return { value: lit_int(1), line: 2, col: 1 }],
            exported: false,
            is_async: true,
            line: 1,
            col: 1,
        };
        let call_stmt = Stmt::VarDecl {
            name: "т".to_string(),
            type_ann: Some(Type::Task),
            value: Expr::new(ExprKind::Call { callee: Box::new(ident("раб")), args: vec![] }, 3, 1),
            exported: false,
            line: 3,
            col: 1,
        };
        let mut program = Program { statements: vec![Stmt::FuncDecl(f), call_stmt] };
        assert!(check_program(&mut program, None).is_ok());
    }

    #[test]
    fn for_loop_binds_element_type_from_list() {
        let body = vec![
            Stmt::VarDecl {
                name: "лист".to_string(),
                type_ann: None,
                value: Expr::new(ExprKind::List(vec![lit_int(1), lit_int(2)]), 1, 1),
                exported: false,
                line: 1,
                col: 1,
            },
            Stmt::For {
                var_name: "э".to_string(),
                iterable: ident("лист"),
                body: vec![Stmt::ExprStmt { expr: ident("э"), line: 2, col: 1 }],
                line: 2,
                col: 1,
            },
        ];
        let mut program = Program { statements: body };
        assert!(check_program(&mut program, None).is_ok());
    }

    #[test]
    fn main_must_take_no_params_and_return_void() {
        let f = FuncDecl {
            name: "main".to_string(),
            params: vec![Param { name: "х".to_string(), type_ann: Type::Int }],
            return_type: Type::Void,
            body: vec![],
            exported: false,
            is_async: false,
            line: 1,
            col: 1,
        };
        let mut program = Program { statements: vec![Stmt::FuncDecl(f)] };
        assert!(check_program(&mut program, None).is_err());
    }
}
