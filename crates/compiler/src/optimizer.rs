//! Constant folding, dead-statement elision and reachability-based tree-shaking (§10),
//! grounded on the reference `optimizer.py`. Runs after the checker so folded literals keep
//! their `inferred_type`; purity/terminality analysis walks the raw AST shape only.

use crate::ast::{BinaryOp, Expr, ExprKind, FuncDecl, Literal, Program, Stmt, UnaryOp};
use std::collections::{HashSet, VecDeque};

/// The result of optimizing a block: the rewritten statements, and whether the block's
/// control flow can never fall through past the last kept statement (`вернуть`/`прервать`/
/// `продолжить`) — used to truncate the unreachable tail of a block.
struct OptimizedStmt {
    statements: Vec<Stmt>,
    terminal: bool,
}

/// Folds constant expressions, drops pure no-op expression statements, and removes any
/// function unreachable from `main`, an exported function, or module-init code.
pub fn optimize_program(program: Program) -> Program {
    let statements = optimize_block(program.statements);
    let statements = tree_shake(statements);
    Program { statements }
}

fn optimize_block(statements: Vec<Stmt>) -> Vec<Stmt> {
    let mut out = Vec::new();
    for stmt in statements {
        let optimized = optimize_stmt(stmt);
        let terminal = optimized.terminal;
        out.extend(optimized.statements);
        if terminal {
            break;
        }
    }
    out
}

fn optimize_stmt(stmt: Stmt) -> OptimizedStmt {
    match stmt {
        Stmt::VarDecl { name, type_ann, value, exported, line, col } => OptimizedStmt {
            statements: vec![Stmt::VarDecl { name, type_ann, value: optimize_expr(value), exported, line, col }],
            terminal: false,
        },
        Stmt::Assign { name, value, line, col } => OptimizedStmt {
            statements: vec![Stmt::Assign { name, value: optimize_expr(value), line, col }],
            terminal: false,
        },
        Stmt::IndexAssign { target, index, value, line, col } => OptimizedStmt {
            statements: vec![Stmt::IndexAssign {
                target: optimize_expr(target),
                index: optimize_expr(index),
                value: optimize_expr(value),
                line,
                col,
            }],
            terminal: false,
        },
        Stmt::ExprStmt { expr, line, col } => {
            let expr = optimize_expr(expr);
            if is_pure_expression(&expr) {
                OptimizedStmt { statements: vec![], terminal: false }
            } else {
                OptimizedStmt { statements: vec![Stmt::ExprStmt { expr, line, col }], terminal: false }
            }
        }
        Stmt::Return { value, line, col } => {
            OptimizedStmt { statements: vec![Stmt::Return { value: optimize_expr(value), line, col }], terminal: true }
        }
        Stmt::Break { line, col } => OptimizedStmt { statements: vec![Stmt::Break { line, col }], terminal: true },
        Stmt::Continue { line, col } => OptimizedStmt { statements: vec![Stmt::Continue { line, col }], terminal: true },
        Stmt::If { condition, then_body, else_body, line, col } => {
            let condition = optimize_expr(condition);
            if let ExprKind::Literal(Literal::Bool(b)) = &condition.kind {
                let chosen = if *b { then_body } else { else_body.unwrap_or_default() };
                let block = optimize_block(chosen);
                let terminal = block_terminal(&block);
                return OptimizedStmt { statements: block, terminal };
            }
            let then_body = optimize_block(then_body);
            let else_body = else_body.map(optimize_block);
            let terminal = block_terminal(&then_body)
                && else_body.as_ref().is_some_and(|b| block_terminal(b));
            OptimizedStmt {
                statements: vec![Stmt::If { condition, then_body, else_body, line, col }],
                terminal,
            }
        }
        Stmt::While { condition, body, line, col } => {
            let condition = optimize_expr(condition);
            if let ExprKind::Literal(Literal::Bool(false)) = &condition.kind {
                return OptimizedStmt { statements: vec![], terminal: false };
            }
            let body = optimize_block(body);
            OptimizedStmt { statements: vec![Stmt::While { condition, body, line, col }], terminal: false }
        }
        Stmt::For { var_name, iterable, body, line, col } => {
            let iterable = optimize_expr(iterable);
            let body = optimize_block(body);
            OptimizedStmt { statements: vec![Stmt::For { var_name, iterable, body, line, col }], terminal: false }
        }
        Stmt::FuncDecl(mut f) => {
            f.body = optimize_block(f.body);
            OptimizedStmt { statements: vec![Stmt::FuncDecl(f)], terminal: false }
        }
        other @ (Stmt::ImportAll { .. } | Stmt::ImportFrom { .. }) => {
            OptimizedStmt { statements: vec![other], terminal: false }
        }
    }
}

fn optimize_expr(expr: Expr) -> Expr {
    let Expr { kind, line, col, inferred_type } = expr;
    let kind = match kind {
        ExprKind::Literal(lit) => ExprKind::Literal(lit),
        ExprKind::Identifier(name) => ExprKind::Identifier(name),
        ExprKind::Member { target, member } => {
            ExprKind::Member { target: Box::new(optimize_expr(*target)), member }
        }
        ExprKind::Index { target, index } => ExprKind::Index {
            target: Box::new(optimize_expr(*target)),
            index: Box::new(optimize_expr(*index)),
        },
        ExprKind::List(items) => ExprKind::List(items.into_iter().map(optimize_expr).collect()),
        ExprKind::Dict(entries) => ExprKind::Dict(
            entries.into_iter().map(|(k, v)| (optimize_expr(k), optimize_expr(v))).collect(),
        ),
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: Box::new(optimize_expr(*callee)),
            args: args.into_iter().map(optimize_expr).collect(),
        },
        ExprKind::Unary { op, operand } => {
            let operand = optimize_expr(*operand);
            if let ExprKind::Literal(lit) = &operand.kind {
                if let Some(folded) = fold_unary(op, lit) {
                    return Expr { kind: ExprKind::Literal(folded), line, col, inferred_type };
                }
            }
            ExprKind::Unary { op, operand: Box::new(operand) }
        }
        ExprKind::Binary { op, left, right } => {
            let left = optimize_expr(*left);
            let right = optimize_expr(*right);
            if let (ExprKind::Literal(l), ExprKind::Literal(r)) = (&left.kind, &right.kind) {
                if let Some(folded) = fold_binary(op, l, r) {
                    return Expr { kind: ExprKind::Literal(folded), line, col, inferred_type };
                }
            }
            ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }
        }
        ExprKind::Await(inner) => ExprKind::Await(Box::new(optimize_expr(*inner))),
    };
    Expr { kind, line, col, inferred_type }
}

fn block_terminal(stmts: &[Stmt]) -> bool {
    matches!(stmts.last(), Some(Stmt::Return { .. } | Stmt::Break { .. } | Stmt::Continue { .. }))
}

fn is_pure_expression(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Identifier(_) => true,
        ExprKind::Member { target, .. } => is_pure_expression(target),
        ExprKind::Index { target, index } => is_pure_expression(target) && is_pure_expression(index),
        ExprKind::Unary { operand, .. } => is_pure_expression(operand),
        ExprKind::Binary { left, right, .. } => is_pure_expression(left) && is_pure_expression(right),
        ExprKind::List(items) => items.iter().all(is_pure_expression),
        ExprKind::Dict(entries) => entries.iter().all(|(k, v)| is_pure_expression(k) && is_pure_expression(v)),
        ExprKind::Call { .. } | ExprKind::Await(_) => false,
    }
}

fn fold_unary(op: UnaryOp, operand: &Literal) -> Option<Literal> {
    match (op, operand) {
        (UnaryOp::Not, Literal::Bool(b)) => Some(Literal::Bool(!b)),
        (UnaryOp::Neg, Literal::Int(n)) => Some(Literal::Int(-n)),
        (UnaryOp::Neg, Literal::Float(n)) => Some(Literal::Float(-n)),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, left: &Literal, right: &Literal) -> Option<Literal> {
    use BinaryOp::*;
    use Literal::*;
    match (op, left, right) {
        (Add, Int(l), Int(r)) => Some(Int(l.wrapping_add(*r))),
        (Sub, Int(l), Int(r)) => Some(Int(l.wrapping_sub(*r))),
        (Mul, Int(l), Int(r)) => Some(Int(l.wrapping_mul(*r))),
        (Div, Int(l), Int(r)) if *r != 0 => Some(Int(l / r)),
        (Mod, Int(l), Int(r)) if *r != 0 => Some(Int(l % r)),

        (Add, Float(l), Float(r)) => Some(Float(l + r)),
        (Sub, Float(l), Float(r)) => Some(Float(l - r)),
        (Mul, Float(l), Float(r)) => Some(Float(l * r)),
        (Div, Float(l), Float(r)) if *r != 0.0 => Some(Float(l / r)),
        (Mod, Float(l), Float(r)) if *r != 0.0 => Some(Float(l % r)),

        (Add, String(l), String(r)) => Some(String(format!("{l}{r}"))),

        (Eq, _, _) => Some(Bool(literal_eq(left, right))),
        (Ne, _, _) => Some(Bool(!literal_eq(left, right))),
        (Lt, _, _) => literal_cmp(left, right).map(|o| Bool(o == std::cmp::Ordering::Less)),
        (Le, _, _) => literal_cmp(left, right).map(|o| Bool(o != std::cmp::Ordering::Greater)),
        (Gt, _, _) => literal_cmp(left, right).map(|o| Bool(o == std::cmp::Ordering::Greater)),
        (Ge, _, _) => literal_cmp(left, right).map(|o| Bool(o != std::cmp::Ordering::Less)),

        (And, Bool(l), Bool(r)) => Some(Bool(*l && *r)),
        (Or, Bool(l), Bool(r)) => Some(Bool(*l || *r)),
        _ => None,
    }
}

fn literal_eq(left: &Literal, right: &Literal) -> bool {
    match (left, right) {
        (Literal::Int(l), Literal::Int(r)) => l == r,
        (Literal::Float(l), Literal::Float(r)) => l == r,
        (Literal::String(l), Literal::String(r)) => l == r,
        (Literal::Bool(l), Literal::Bool(r)) => l == r,
        (Literal::Null, Literal::Null) => true,
        _ => false,
    }
}

fn literal_cmp(left: &Literal, right: &Literal) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Literal::Int(l), Literal::Int(r)) => l.partial_cmp(r),
        (Literal::Float(l), Literal::Float(r)) => l.partial_cmp(r),
        (Literal::String(l), Literal::String(r)) => l.partial_cmp(r),
        _ => None,
    }
}

/// Keeps `main`, every exported function, and everything transitively reachable from them or
/// from module-init statements. Unreachable functions are dropped; non-function statements are
/// always kept verbatim (module-init side effects cannot be proven dead here).
fn tree_shake(statements: Vec<Stmt>) -> Vec<Stmt> {
    let mut functions = Vec::new();
    let mut others = Vec::new();
    for stmt in statements {
        match stmt {
            Stmt::FuncDecl(f) => functions.push(f),
            other => others.push(other),
        }
    }

    if functions.is_empty() {
        return others;
    }

    let names: HashSet<String> = functions.iter().map(|f| f.name.clone()).collect();
    let mut reachable: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    if names.contains("main") {
        queue.push_back("main".to_string());
    }
    for f in &functions {
        if f.exported {
            queue.push_back(f.name.clone());
        }
    }
    for stmt in &others {
        for callee in collect_calls_in_stmt(stmt) {
            if names.contains(&callee) {
                queue.push_back(callee);
            }
        }
    }

    while let Some(name) = queue.pop_front() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(f) = functions.iter().find(|f| f.name == name) {
            for callee in collect_calls_in_function(f) {
                if names.contains(&callee) && !reachable.contains(&callee) {
                    queue.push_back(callee);
                }
            }
        }
    }

    let kept: Vec<Stmt> = functions
        .into_iter()
        .filter(|f| reachable.contains(&f.name))
        .map(Stmt::FuncDecl)
        .collect();
    others.into_iter().chain(kept).collect()
}

fn collect_calls_in_function(f: &FuncDecl) -> HashSet<String> {
    let mut names = HashSet::new();
    for stmt in &f.body {
        names.extend(collect_calls_in_stmt(stmt));
    }
    names
}

fn collect_calls_in_stmt(stmt: &Stmt) -> HashSet<String> {
    let mut names = HashSet::new();
    match stmt {
        Stmt::VarDecl { value, .. } | Stmt::Assign { value, .. } => names.extend(collect_calls_in_expr(value)),
        Stmt::IndexAssign { target, index, value, .. } => {
            names.extend(collect_calls_in_expr(target));
            names.extend(collect_calls_in_expr(index));
            names.extend(collect_calls_in_expr(value));
        }
        Stmt::If { condition, then_body, else_body, .. } => {
            names.extend(collect_calls_in_expr(condition));
            for s in then_body {
                names.extend(collect_calls_in_stmt(s));
            }
            for s in else_body.iter().flatten() {
                names.extend(collect_calls_in_stmt(s));
            }
        }
        Stmt::While { condition, body, .. } => {
            names.extend(collect_calls_in_expr(condition));
            for s in body {
                names.extend(collect_calls_in_stmt(s));
            }
        }
        Stmt::For { iterable, body, .. } => {
            names.extend(collect_calls_in_expr(iterable));
            for s in body {
                names.extend(collect_calls_in_stmt(s));
            }
        }
        Stmt::Return { value, .. } => names.extend(collect_calls_in_expr(value)),
        Stmt::ExprStmt { expr, .. } => names.extend(collect_calls_in_expr(expr)),
        Stmt::Break { .. }
        | Stmt::Continue { .. }
        | Stmt::FuncDecl(_)
        | Stmt::ImportAll { .. }
        | Stmt::ImportFrom { .. } => {}
    }
    names
}

fn collect_calls_in_expr(expr: &Expr) -> HashSet<String> {
    let mut names = HashSet::new();
    match &expr.kind {
        ExprKind::Call { callee, args } => {
            match callee.as_identifier() {
                Some(name) => {
                    names.insert(name.to_string());
                }
                None => names.extend(collect_calls_in_expr(callee)),
            }
            for a in args {
                names.extend(collect_calls_in_expr(a));
            }
        }
        ExprKind::Unary { operand, .. } => names.extend(collect_calls_in_expr(operand)),
        ExprKind::Binary { left, right, .. } => {
            names.extend(collect_calls_in_expr(left));
            names.extend(collect_calls_in_expr(right));
        }
        ExprKind::List(items) => {
            for x in items {
                names.extend(collect_calls_in_expr(x));
            }
        }
        ExprKind::Dict(entries) => {
            for (k, v) in entries {
                names.extend(collect_calls_in_expr(k));
                names.extend(collect_calls_in_expr(v));
            }
        }
        ExprKind::Index { target, index } => {
            names.extend(collect_calls_in_expr(target));
            names.extend(collect_calls_in_expr(index));
        }
        ExprKind::Member { target, .. } => names.extend(collect_calls_in_expr(target)),
        ExprKind::Await(inner) => names.extend(collect_calls_in_expr(inner)),
        ExprKind::Literal(_) | ExprKind::Identifier(_) => {}
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Param;
    use crate::types::Type;

    fn lit_int(n: i64) -> Expr {
        Expr::new(ExprKind::Literal(Literal::Int(n)), 1, 1)
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, 1, 1)
    }

    #[test]
    fn folds_constant_arithmetic() {
        let expr = optimize_expr(binary(BinaryOp::Add, lit_int(2), lit_int(3)));
        assert_eq!(expr.kind, ExprKind::Literal(Literal::Int(5)));
    }

    #[test]
    fn folds_string_concatenation() {
        let left = Expr::new(ExprKind::Literal(Literal::String("а".into())), 1, 1);
        let right = Expr::new(ExprKind::Literal(Literal::String("б".into())), 1, 1);
        let expr = optimize_expr(binary(BinaryOp::Add, left, right));
        assert_eq!(expr.kind, ExprKind::Literal(Literal::String("аб".into())));
    }

    #[test]
    fn drops_pure_expression_statement() {
        let program = Program {
            statements: vec![Stmt::ExprStmt { expr: lit_int(1), line: 1, col: 1 }],
        };
        let optimized = optimize_program(program);
        assert!(optimized.statements.is_empty());
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let expr = optimize_expr(binary(BinaryOp::Div, lit_int(1), lit_int(0)));
        assert!(matches!(expr.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn tree_shake_drops_unreachable_function() {
        let used = FuncDecl {
            name: "помощник".to_string(),
            params: vec![],
            return_type: Type::Void,
            body: vec![],
            exported: false,
            is_async: false,
            line: 1,
            col: 1,
        };
        let unused = FuncDecl {
            name: "мёртвый".to_string(),
            params: vec![],
            return_type: Type::Void,
            body: vec![],
            exported: false,
            is_async: false,
            line: 2,
            col: 1,
        };
        let main = FuncDecl {
            name: "main".to_string(),
            params: vec![],
            return_type: Type::Void,
            body: vec![Stmt::ExprStmt {
                expr: Expr::new(
                    ExprKind::Call {
                        callee: Box::new(Expr::new(ExprKind::Identifier("помощник".to_string()), 3, 1)),
                        args: vec![],
                    },
                    3,
                    1,
                ),
                line: 3,
                col: 1,
            }],
            exported: false,
            is_async: false,
            line: 3,
            col: 1,
        };
        let program = Program {
            statements: vec![Stmt::FuncDecl(used), Stmt::FuncDecl(unused), Stmt::FuncDecl(main)],
        };
        let optimized = optimize_program(program);
        let names: Vec<&str> = optimized
            .statements
            .iter()
            .map(|s| match s {
                Stmt::FuncDecl(f) => f.name.as_str(),
                _ => "",
            })
            .collect();
        assert!(names.contains(&"помощник"));
        assert!(names.contains(&"main"));
        assert!(!names.contains(&"мёртвый"));
    }

    #[test]
    fn exported_function_survives_even_if_unreferenced() {
        let public = FuncDecl {
            name: "публичная".to_string(),
            params: vec![Param { name: "х".to_string(), type_ann: Type::Int }],
            return_type: Type::Void,
            body: vec![],
            exported: true,
            is_async: false,
            line: 1,
            col: 1,
        };
        let program = Program { statements: vec![Stmt::FuncDecl(public)] };
        let optimized = optimize_program(program);
        assert_eq!(optimized.statements.len(), 1);
    }

    #[test]
    fn statements_after_unconditional_return_are_truncated() {
        let body = vec![
            Stmt::Return { value: lit_int(1), line: 1, col: 1 },
            Stmt::ExprStmt { expr: lit_int(2), line: 2, col: 1 },
        ];
        let optimized = optimize_block(body);
        assert_eq!(optimized.len(), 1);
    }

    #[test]
    fn constant_false_while_is_removed() {
        let stmt = Stmt::While {
            condition: Expr::new(ExprKind::Literal(Literal::Bool(false)), 1, 1),
            body: vec![Stmt::ExprStmt { expr: lit_int(1), line: 1, col: 1 }],
            line: 1,
            col: 1,
        };
        let optimized = optimize_block(vec![stmt]);
        assert!(optimized.is_empty());
    }
}
