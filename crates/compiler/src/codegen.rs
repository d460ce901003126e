//! AST → bytecode compiler (§4.6), grounded on the reference `compiler.py`: slot allocation,
//! short-circuit boolean codegen, and jump back-patching via "emit placeholder, patch later".
//! Runs after the optimizer so constant folding and tree-shaking have already simplified the
//! tree this stage walks.

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, Program, Stmt, UnaryOp};
use crate::optimizer::optimize_program;
use crate::types::Type;
use std::collections::HashMap;
use yasny_core::bytecode::{FunctionBc, Instruction, ProgramBc};
use yasny_core::value::Value;
use yasny_core::Diagnostic;

/// Where a compile-time name resolved to: a frame-local slot or a position in the shared
/// globals vector.
enum Place {
    Local(u16),
    Global(u16),
}

struct LoopContext {
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
}

/// Compiles an optimized, checked program into its bytecode record. `is_async_fn` is consulted
/// only to stamp [`FunctionBc::is_async`]; it does not change codegen for the function body
/// itself — the VM decides spawn-vs-inline purely from that flag at `CALL` time.
pub fn compile_program(
    program: Program,
    is_async_fn: &HashMap<String, bool>,
    path: Option<&str>,
) -> Result<ProgramBc, Diagnostic> {
    let program = optimize_program(program);
    let global_slots = collect_global_slots(&program);
    let mut functions = std::collections::BTreeMap::new();

    for stmt in &program.statements {
        if let Stmt::FuncDecl(f) = stmt {
            let mut fc = FunctionCompiler::new(
                path,
                f.name.clone(),
                f.params.iter().map(|p| p.name.clone()).collect(),
                &global_slots,
                false,
            );
            for body_stmt in &f.body {
                fc.compile_stmt(body_stmt)?;
            }
            if !fc.ends_with_terminal() {
                fc.emit(Instruction::ConstNull);
                fc.emit(Instruction::Ret);
            }
            let is_async = *is_async_fn.get(&f.name).unwrap_or(&false);
            functions.insert(f.name.clone(), fc.finish(is_async));
        }
    }

    let mut entry_fc = FunctionCompiler::new(path, "__entry__".to_string(), vec![], &global_slots, true);
    for stmt in &program.statements {
        if matches!(stmt, Stmt::FuncDecl(_)) {
            continue;
        }
        entry_fc.compile_stmt(stmt)?;
    }
    if functions.contains_key("main") {
        entry_fc.emit(Instruction::Call { name: "main".to_string(), argc: 0 });
        entry_fc.emit(Instruction::Pop);
    }
    entry_fc.emit(Instruction::Halt);
    let entry = entry_fc.finish(false);

    Ok(ProgramBc { functions, entry, global_count: global_slots.len() as u16 })
}

fn collect_global_slots(program: &Program) -> HashMap<String, u16> {
    let mut slots = HashMap::new();
    for stmt in &program.statements {
        if let Stmt::VarDecl { name, .. } = stmt {
            if !slots.contains_key(name) {
                let next = slots.len() as u16;
                slots.insert(name.clone(), next);
            }
        }
    }
    slots
}

struct FunctionCompiler<'a> {
    path: Option<&'a str>,
    name: String,
    params: Vec<String>,
    global_slots: &'a HashMap<String, u16>,
    is_entry: bool,
    instructions: Vec<Instruction>,
    next_slot: u16,
    scopes: Vec<HashMap<String, u16>>,
    loop_stack: Vec<LoopContext>,
}

impl<'a> FunctionCompiler<'a> {
    fn new(
        path: Option<&'a str>,
        name: String,
        params: Vec<String>,
        global_slots: &'a HashMap<String, u16>,
        is_entry: bool,
    ) -> Self {
        let mut fc = FunctionCompiler {
            path,
            name,
            params: params.clone(),
            global_slots,
            is_entry,
            instructions: Vec::new(),
            next_slot: 0,
            scopes: Vec::new(),
            loop_stack: Vec::new(),
        };
        fc.push_scope();
        for param in &params {
            fc.define_var(param, 1, 1).expect("duplicate parameter name slipped past the checker");
        }
        fc
    }

    fn finish(self, is_async: bool) -> FunctionBc {
        FunctionBc {
            name: self.name,
            params: self.params,
            local_count: self.next_slot,
            instructions: self.instructions,
            is_async,
        }
    }

    fn ends_with_terminal(&self) -> bool {
        matches!(self.instructions.last(), Some(Instruction::Ret | Instruction::Halt))
    }

    fn emit(&mut self, instr: Instruction) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    fn patch_jmp(&mut self, idx: usize, target: usize) {
        match &mut self.instructions[idx] {
            Instruction::Jmp(t) | Instruction::JmpFalse(t) => *t = target,
            other => panic!("patch_jmp on non-jump instruction: {other:?}"),
        }
    }

    fn current_ip(&self) -> usize {
        self.instructions.len()
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn err(&self, message: impl Into<String>, line: usize, col: usize) -> Diagnostic {
        let d = Diagnostic::at(message, line, col);
        match self.path {
            Some(p) => d.with_path(p),
            None => d,
        }
    }

    fn define_var(&mut self, name: &str, line: usize, col: usize) -> Result<u16, Diagnostic> {
        if self.scopes.last().unwrap().contains_key(name) {
            return Err(self.err(format!("переменная '{name}' уже объявлена в блоке"), line, col));
        }
        let slot = self.allocate_temp();
        self.scopes.last_mut().unwrap().insert(name.to_string(), slot);
        Ok(slot)
    }

    fn allocate_temp(&mut self) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn resolve_local(&self, name: &str) -> Option<u16> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn resolve_var(&self, name: &str, line: usize, col: usize) -> Result<Place, Diagnostic> {
        if let Some(slot) = self.resolve_local(name) {
            return Ok(Place::Local(slot));
        }
        if let Some(&slot) = self.global_slots.get(name) {
            return Ok(Place::Global(slot));
        }
        Err(self.err(format!("неизвестная переменная: {name}"), line, col))
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match stmt {
            Stmt::ImportAll { line, col, .. } | Stmt::ImportFrom { line, col, .. } => Err(self.err(
                "операторы подключения должны быть разрешены до этапа генерации байткода",
                *line,
                *col,
            )),
            Stmt::VarDecl { name, value, line, col, .. } => {
                self.compile_expr(value)?;
                if self.is_entry && self.scopes.len() == 1 && self.global_slots.contains_key(name) {
                    self.emit(Instruction::GStore(self.global_slots[name]));
                } else {
                    let slot = self.define_var(name, *line, *col)?;
                    self.emit(Instruction::Store(slot));
                }
                Ok(())
            }
            Stmt::Assign { name, value, line, col } => {
                self.compile_expr(value)?;
                match self.resolve_var(name, *line, *col)? {
                    Place::Local(slot) => self.emit(Instruction::Store(slot)),
                    Place::Global(slot) => self.emit(Instruction::GStore(slot)),
                };
                Ok(())
            }
            Stmt::IndexAssign { target, index, value, .. } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.compile_expr(value)?;
                self.emit(Instruction::IndexSet);
                self.emit(Instruction::Pop);
                Ok(())
            }
            Stmt::ExprStmt { expr, .. } => {
                self.compile_expr(expr)?;
                self.emit(Instruction::Pop);
                Ok(())
            }
            Stmt::Return { value, .. } => {
                self.compile_expr(value)?;
                self.emit(Instruction::Ret);
                Ok(())
            }
            Stmt::Break { line, col } => {
                if self.loop_stack.is_empty() {
                    return Err(self.err("'прервать' допустим только внутри цикла", *line, *col));
                }
                let jmp = self.emit(Instruction::Jmp(usize::MAX));
                self.loop_stack.last_mut().unwrap().break_jumps.push(jmp);
                Ok(())
            }
            Stmt::Continue { line, col } => {
                if self.loop_stack.is_empty() {
                    return Err(self.err("'продолжить' допустим только внутри цикла", *line, *col));
                }
                let jmp = self.emit(Instruction::Jmp(usize::MAX));
                self.loop_stack.last_mut().unwrap().continue_jumps.push(jmp);
                Ok(())
            }
            Stmt::If { condition, then_body, else_body, .. } => {
                self.compile_expr(condition)?;
                let jmp_false = self.emit(Instruction::JmpFalse(usize::MAX));

                self.push_scope();
                for inner in then_body {
                    self.compile_stmt(inner)?;
                }
                self.pop_scope();

                if let Some(else_body) = else_body {
                    let jmp_end = self.emit(Instruction::Jmp(usize::MAX));
                    let else_start = self.current_ip();
                    self.patch_jmp(jmp_false, else_start);
                    self.push_scope();
                    for inner in else_body {
                        self.compile_stmt(inner)?;
                    }
                    self.pop_scope();
                    let end = self.current_ip();
                    self.patch_jmp(jmp_end, end);
                } else {
                    let end = self.current_ip();
                    self.patch_jmp(jmp_false, end);
                }
                Ok(())
            }
            Stmt::While { condition, body, .. } => {
                let loop_start = self.current_ip();
                self.compile_expr(condition)?;
                let jmp_end = self.emit(Instruction::JmpFalse(usize::MAX));

                self.loop_stack.push(LoopContext { break_jumps: vec![], continue_jumps: vec![] });
                self.push_scope();
                for inner in body {
                    self.compile_stmt(inner)?;
                }
                self.pop_scope();
                let ctx = self.loop_stack.pop().unwrap();

                for jmp in &ctx.continue_jumps {
                    self.patch_jmp(*jmp, loop_start);
                }
                self.emit(Instruction::Jmp(loop_start));
                let end_ip = self.current_ip();
                self.patch_jmp(jmp_end, end_ip);
                for jmp in &ctx.break_jumps {
                    self.patch_jmp(*jmp, end_ip);
                }
                Ok(())
            }
            Stmt::For { var_name, iterable, body, line, col } => {
                self.push_scope();
                let iter_slot = self.allocate_temp();
                let idx_slot = self.allocate_temp();
                let len_slot = self.allocate_temp();
                let loop_var_slot = self.define_var(var_name, *line, *col)?;

                self.compile_expr(iterable)?;
                self.emit(Instruction::Store(iter_slot));
                self.emit(Instruction::Const(Value::Int(0)));
                self.emit(Instruction::Store(idx_slot));
                self.emit(Instruction::Load(iter_slot));
                self.emit(Instruction::Len);
                self.emit(Instruction::Store(len_slot));

                let loop_start = self.current_ip();
                self.emit(Instruction::Load(idx_slot));
                self.emit(Instruction::Load(len_slot));
                self.emit(Instruction::Lt);
                let jmp_end = self.emit(Instruction::JmpFalse(usize::MAX));

                self.emit(Instruction::Load(iter_slot));
                self.emit(Instruction::Load(idx_slot));
                self.emit(Instruction::IndexGet);
                self.emit(Instruction::Store(loop_var_slot));

                self.loop_stack.push(LoopContext { break_jumps: vec![], continue_jumps: vec![] });
                for inner in body {
                    self.compile_stmt(inner)?;
                }
                let ctx = self.loop_stack.pop().unwrap();

                let increment_start = self.current_ip();
                for jmp in &ctx.continue_jumps {
                    self.patch_jmp(*jmp, increment_start);
                }
                self.emit(Instruction::Load(idx_slot));
                self.emit(Instruction::Const(Value::Int(1)));
                self.emit(Instruction::Add);
                self.emit(Instruction::Store(idx_slot));
                self.emit(Instruction::Jmp(loop_start));
                let end_ip = self.current_ip();
                self.patch_jmp(jmp_end, end_ip);
                for jmp in &ctx.break_jumps {
                    self.patch_jmp(*jmp, end_ip);
                }
                self.pop_scope();
                Ok(())
            }
            Stmt::FuncDecl(f) => Err(self.err("вложенные функции не поддерживаются", f.line, f.col)),
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(lit) => {
                self.emit(literal_instruction(lit));
                Ok(())
            }
            ExprKind::Identifier(name) => {
                match self.resolve_var(name, expr.line, expr.col)? {
                    Place::Local(slot) => self.emit(Instruction::Load(slot)),
                    Place::Global(slot) => self.emit(Instruction::GLoad(slot)),
                };
                Ok(())
            }
            ExprKind::Member { .. } => Err(self.err(
                "оператор '.' должен быть разрешён на этапе модульного резолвера",
                expr.line,
                expr.col,
            )),
            ExprKind::List(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Instruction::MakeList(items.len() as u16));
                Ok(())
            }
            ExprKind::Dict(entries) => {
                for (k, v) in entries {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.emit(Instruction::MakeDict(entries.len() as u16));
                Ok(())
            }
            ExprKind::Index { target, index } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.emit(Instruction::IndexGet);
                Ok(())
            }
            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand)?;
                self.emit(match op {
                    UnaryOp::Not => Instruction::Not,
                    UnaryOp::Neg => Instruction::Neg,
                });
                Ok(())
            }
            ExprKind::Binary { op: BinaryOp::And, left, right } => {
                self.compile_short_circuit_and(left, right)
            }
            ExprKind::Binary { op: BinaryOp::Or, left, right } => {
                self.compile_short_circuit_or(left, right)
            }
            ExprKind::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(binary_instruction(*op));
                Ok(())
            }
            ExprKind::Await(inner) => {
                self.compile_expr(inner)?;
                self.emit(Instruction::Call { name: "ожидать".to_string(), argc: 1 });
                Ok(())
            }
            ExprKind::Call { callee, args } => {
                let name = callee.as_identifier().ok_or_else(|| {
                    self.err("вызов возможен только по имени функции", expr.line, expr.col)
                })?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Instruction::Call { name: name.to_string(), argc: args.len() as u8 });
                Ok(())
            }
        }
    }

    fn compile_short_circuit_and(&mut self, left: &Expr, right: &Expr) -> Result<(), Diagnostic> {
        self.compile_expr(left)?;
        let left_false = self.emit(Instruction::JmpFalse(usize::MAX));
        self.compile_expr(right)?;
        let right_false = self.emit(Instruction::JmpFalse(usize::MAX));
        self.emit(Instruction::Const(Value::Bool(true)));
        let jmp_end = self.emit(Instruction::Jmp(usize::MAX));
        let false_label = self.current_ip();
        self.emit(Instruction::Const(Value::Bool(false)));
        let end_label = self.current_ip();
        self.patch_jmp(left_false, false_label);
        self.patch_jmp(right_false, false_label);
        self.patch_jmp(jmp_end, end_label);
        Ok(())
    }

    fn compile_short_circuit_or(&mut self, left: &Expr, right: &Expr) -> Result<(), Diagnostic> {
        self.compile_expr(left)?;
        let check_right = self.emit(Instruction::JmpFalse(usize::MAX));
        self.emit(Instruction::Const(Value::Bool(true)));
        let jmp_end_left_true = self.emit(Instruction::Jmp(usize::MAX));

        let right_label = self.current_ip();
        self.patch_jmp(check_right, right_label);
        self.compile_expr(right)?;
        let right_false = self.emit(Instruction::JmpFalse(usize::MAX));
        self.emit(Instruction::Const(Value::Bool(true)));
        let jmp_end_right_true = self.emit(Instruction::Jmp(usize::MAX));
        let false_label = self.current_ip();
        self.emit(Instruction::Const(Value::Bool(false)));
        let end_label = self.current_ip();

        self.patch_jmp(right_false, false_label);
        self.patch_jmp(jmp_end_left_true, end_label);
        self.patch_jmp(jmp_end_right_true, end_label);
        Ok(())
    }
}

fn literal_instruction(lit: &Literal) -> Instruction {
    match lit {
        Literal::Int(n) => Instruction::Const(Value::Int(*n)),
        Literal::Float(n) => Instruction::Const(Value::Float(*n)),
        Literal::String(s) => Instruction::Const(Value::String(s.clone())),
        Literal::Bool(b) => Instruction::Const(Value::Bool(*b)),
        Literal::Null => Instruction::ConstNull,
    }
}

fn binary_instruction(op: BinaryOp) -> Instruction {
    match op {
        BinaryOp::Add => Instruction::Add,
        BinaryOp::Sub => Instruction::Sub,
        BinaryOp::Mul => Instruction::Mul,
        BinaryOp::Div => Instruction::Div,
        BinaryOp::Mod => Instruction::Mod,
        BinaryOp::Eq => Instruction::Eq,
        BinaryOp::Ne => Instruction::Ne,
        BinaryOp::Lt => Instruction::Lt,
        BinaryOp::Le => Instruction::Le,
        BinaryOp::Gt => Instruction::Gt,
        BinaryOp::Ge => Instruction::Ge,
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops compiled separately"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FuncDecl, Param};

    fn lit_int(n: i64) -> Expr {
        Expr::new(ExprKind::Literal(Literal::Int(n)), 1, 1)
    }

    #[test]
    fn entry_calls_main_and_halts() {
        let main = FuncDecl {
            name: "main".to_string(),
            params: vec![],
            return_type: Type::Void,
            body: vec![],
            exported: false,
            is_async: false,
            line: 1,
            col: 1,
        };
        let program = Program { statements: vec![Stmt::FuncDecl(main)] };
        let compiled = compile_program(program, &HashMap::new(), None).unwrap();
        assert_eq!(
            compiled.entry.instructions,
            vec![
                Instruction::Call { name: "main".to_string(), argc: 0 },
                Instruction::Pop,
                Instruction::Halt,
            ]
        );
    }

    #[test]
    fn entry_halts_without_main() {
        let program = Program { statements: vec![] };
        let compiled = compile_program(program, &HashMap::new(), None).unwrap();
        assert_eq!(compiled.entry.instructions, vec![Instruction::Halt]);
    }

    #[test]
    fn function_without_terminal_gets_implicit_return() {
        let f = FuncDecl {
            name: "ф".to_string(),
            params: vec![],
            return_type: Type::Void,
            body: vec![Stmt::ExprStmt { expr: lit_int(1), line: 1, col: 1 }],
            exported: false,
            is_async: false,
            line: 1,
            col: 1,
        };
        let program = Program { statements: vec![Stmt::FuncDecl(f)] };
        let compiled = compile_program(program, &HashMap::new(), None).unwrap();
        let fb = &compiled.functions["ф"];
        assert_eq!(fb.instructions.last(), Some(&Instruction::Ret));
        assert_eq!(fb.instructions[fb.instructions.len() - 2], Instruction::ConstNull);
    }

    #[test]
    fn async_function_is_flagged_in_its_record() {
        let f = FuncDecl {
            name: "раб".to_string(),
            params: vec![Param { name: "n".to_string(), type_ann: Type::Int }],
            return_type: Type::Int,
            body: vec![Stmt::Return { value: lit_int(1), line: 1, col: 1 }],
            exported: false,
            is_async: true,
            line: 1,
            col: 1,
        };
        let mut is_async = HashMap::new();
        is_async.insert("раб".to_string(), true);
        let program = Program { statements: vec![Stmt::FuncDecl(f)] };
        let compiled = compile_program(program, &is_async, None).unwrap();
        assert!(compiled.functions["раб"].is_async);
    }

    #[test]
    fn global_var_decl_in_entry_uses_gstore() {
        let program = Program {
            statements: vec![Stmt::VarDecl {
                name: "х".to_string(),
                type_ann: None,
                value: lit_int(5),
                exported: false,
                line: 1,
                col: 1,
            }],
        };
        let compiled = compile_program(program, &HashMap::new(), None).unwrap();
        assert!(compiled.entry.instructions.contains(&Instruction::GStore(0)));
        assert_eq!(compiled.global_count, 1);
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let f = FuncDecl {
            name: "ф".to_string(),
            params: vec![],
            return_type: Type::Void,
            body: vec![Stmt::Break { line: 1, col: 1 }],
            exported: false,
            is_async: false,
            line: 1,
            col: 1,
        };
        let program = Program { statements: vec![Stmt::FuncDecl(f)] };
        assert!(compile_program(program, &HashMap::new(), None).is_err());
    }

    #[test]
    fn while_loop_patches_break_and_continue_to_distinct_targets() {
        let f = FuncDecl {
            name: "ф".to_string(),
            params: vec![],
            return_type: Type::Void,
            body: vec![Stmt::While {
                condition: Expr::new(ExprKind::Literal(Literal::Bool(true)), 1, 1),
                body: vec![Stmt::Break { line: 2, col: 1 }, Stmt::Continue { line: 3, col: 1 }],
                line: 1,
                col: 1,
            }],
            exported: false,
            is_async: false,
            line: 1,
            col: 1,
        };
        let program = Program { statements: vec![Stmt::FuncDecl(f)] };
        let compiled = compile_program(program, &HashMap::new(), None).unwrap();
        let instrs = &compiled.functions["ф"].instructions;
        let jumps: Vec<usize> = instrs
            .iter()
            .filter_map(|i| match i {
                Instruction::Jmp(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert!(jumps.iter().collect::<std::collections::HashSet<_>>().len() >= 2);
    }
}
