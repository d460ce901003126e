//! Recursive-descent parser over the token stream, grounded on the reference `parser.py`:
//! precedence chain `or → and → comparison → add → mul → unary → postfix → primary`, with the
//! same statement grammar and the same `?` sugar for nullable types.

use crate::ast::{BinaryOp, Expr, ExprKind, FuncDecl, ImportItem, Literal, Param, Program, Stmt, UnaryOp};
use crate::lexer::{Token, TokenKind};
use crate::types::Type;
use std::mem::discriminant;
use yasny_core::Diagnostic;

const PRIMITIVE_TYPE_NAMES: &[&str] = &["Цел", "Дроб", "Лог", "Строка", "Пусто", "Любой", "Задача"];

pub fn parse(tokens: Vec<Token>, path: Option<&str>) -> Result<Program, Diagnostic> {
    Parser { tokens, pos: 0, path }.parse_program()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    path: Option<&'a str>,
}

impl<'a> Parser<'a> {
    fn parse_program(&mut self) -> Result<Program, Diagnostic> {
        let mut statements = Vec::new();
        self.consume_newlines();
        while !self.check(&TokenKind::Eof) {
            statements.push(self.parse_stmt()?);
            self.consume_newlines();
        }
        Ok(Program { statements })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let kind = self.current().kind.clone();
        match kind {
            TokenKind::Export => self.parse_export_stmt(),
            TokenKind::Let => self.parse_var_decl(false),
            TokenKind::Async => self.parse_async_func_decl(false),
            TokenKind::Function => self.parse_func_decl(false, false),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::ImportAll => self.parse_import_all_stmt(),
            TokenKind::From => self.parse_import_from_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Break => self.parse_break_stmt(),
            TokenKind::Continue => self.parse_continue_stmt(),
            _ => self.parse_assign_or_expr_stmt(),
        }
    }

    fn parse_assign_or_expr_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expr()?;
        if self.match_tok(&TokenKind::Assign) {
            let value = self.parse_expr()?;
            self.expect(&TokenKind::Newline, "Ожидался перевод строки после присваивания")?;
            return match expr.kind {
                ExprKind::Identifier(name) => {
                    Ok(Stmt::Assign { name, value, line: expr.line, col: expr.col })
                }
                ExprKind::Index { target, index } => Ok(Stmt::IndexAssign {
                    target: *target,
                    index: *index,
                    value,
                    line: expr.line,
                    col: expr.col,
                }),
                _ => Err(self.err_at(
                    "Левая часть присваивания должна быть переменной или индексатором",
                    expr.line,
                    expr.col,
                )),
            };
        }
        self.expect(&TokenKind::Newline, "Ожидался перевод строки после выражения")?;
        Ok(Stmt::ExprStmt { line: expr.line, col: expr.col, expr })
    }

    fn parse_export_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::Export, "Ожидалось 'экспорт'")?;
        if self.check(&TokenKind::Let) {
            return self.parse_var_decl(true);
        }
        if self.check(&TokenKind::Async) {
            return self.parse_async_func_decl(true);
        }
        if self.check(&TokenKind::Function) {
            return self.parse_func_decl(true, false);
        }
        Err(self.err_at(
            "После 'экспорт' допускается только 'пусть', 'функция' или 'асинхронная функция'",
            start.line,
            start.col,
        ))
    }

    fn parse_import_all_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::ImportAll, "Ожидалось 'подключить'")?;
        let module_path = self.expect_string("После 'подключить' ожидается строка с путём модуля")?;
        let mut alias = None;
        if self.match_tok(&TokenKind::As) {
            alias = Some(self.expect_ident("После 'как' ожидается имя пространства имён")?.0);
        }
        self.expect(&TokenKind::Newline, "Ожидался перевод строки после оператора подключения")?;
        Ok(Stmt::ImportAll { path: module_path, alias, line: start.line, col: start.col })
    }

    fn parse_import_from_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::From, "Ожидалось 'из'")?;
        let module_path = self.expect_string("После 'из' ожидается строка с путём модуля")?;
        self.expect(&TokenKind::ImportAll, "Ожидалось 'подключить' после пути модуля")?;
        let mut items = vec![self.parse_import_item()?];
        while self.match_tok(&TokenKind::Comma) {
            items.push(self.parse_import_item()?);
        }
        self.expect(&TokenKind::Newline, "Ожидался перевод строки после оператора подключения")?;
        Ok(Stmt::ImportFrom { path: module_path, items, line: start.line, col: start.col })
    }

    fn parse_import_item(&mut self) -> Result<ImportItem, Diagnostic> {
        let (name, _, _) = self.expect_ident("Ожидалось имя символа для подключения")?;
        let mut alias = None;
        if self.match_tok(&TokenKind::As) {
            alias = Some(self.expect_ident("После 'как' ожидается имя алиаса")?.0);
        }
        Ok(ImportItem { name, alias })
    }

    fn parse_var_decl(&mut self, exported: bool) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::Let, "Ожидалось 'пусть'")?;
        let (name, _, _) = self.expect_ident("Ожидалось имя переменной")?;
        let mut type_ann = None;
        if self.match_tok(&TokenKind::Colon) {
            type_ann = Some(self.parse_type()?);
        }
        self.expect(&TokenKind::Assign, "Ожидался '=' в объявлении переменной")?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::Newline, "Ожидался перевод строки после объявления переменной")?;
        Ok(Stmt::VarDecl { name, type_ann, value, exported, line: start.line, col: start.col })
    }

    fn parse_async_func_decl(&mut self, exported: bool) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::Async, "Ожидалось 'асинхронная'")?;
        self.expect(&TokenKind::Function, "После 'асинхронная' ожидалось 'функция'")?;
        self.parse_func_decl_tail(start, exported, true)
    }

    fn parse_func_decl(&mut self, exported: bool, is_async: bool) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::Function, "Ожидалось 'функция'")?;
        self.parse_func_decl_tail(start, exported, is_async)
    }

    fn parse_func_decl_tail(&mut self, start: Token, exported: bool, is_async: bool) -> Result<Stmt, Diagnostic> {
        let (name, _, _) = self.expect_ident("Ожидалось имя функции")?;
        self.expect(&TokenKind::LParen, "Ожидался '(' в объявлении функции")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (p_name, _, _) = self.expect_ident("Ожидалось имя параметра")?;
                self.expect(&TokenKind::Colon, "Ожидался ':' после имени параметра")?;
                let type_ann = self.parse_type()?;
                params.push(Param { name: p_name, type_ann });
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "Ожидался ')' после параметров")?;
        self.consume_newlines();
        self.expect(&TokenKind::Arrow, "Ожидался '->' после параметров")?;
        self.consume_newlines();
        let return_type = self.parse_type()?;
        self.consume_newlines();
        self.expect(&TokenKind::Colon, "Ожидался ':' после типа возвращаемого значения")?;
        let body = self.parse_block()?;
        Ok(Stmt::FuncDecl(FuncDecl {
            name,
            params,
            return_type,
            body,
            exported,
            is_async,
            line: start.line,
            col: start.col,
        }))
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::If, "Ожидалось 'если'")?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::Colon, "Ожидался ':' после условия")?;
        let then_body = self.parse_block()?;
        let mut else_body = None;
        if self.match_tok(&TokenKind::Else) {
            self.expect(&TokenKind::Colon, "Ожидался ':' после 'иначе'")?;
            else_body = Some(self.parse_block()?);
        }
        Ok(Stmt::If { condition, then_body, else_body, line: start.line, col: start.col })
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::While, "Ожидалось 'пока'")?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::Colon, "Ожидался ':' после условия цикла")?;
        let body = self.parse_block()?;
        Ok(Stmt::While { condition, body, line: start.line, col: start.col })
    }

    fn parse_for_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::For, "Ожидалось 'для'")?;
        let (var_name, _, _) = self.expect_ident("Ожидалось имя переменной цикла")?;
        self.expect(&TokenKind::In, "Ожидалось 'в' в цикле for")?;
        let iterable = self.parse_expr()?;
        self.expect(&TokenKind::Colon, "Ожидался ':' после выражения цикла for")?;
        let body = self.parse_block()?;
        Ok(Stmt::For { var_name, iterable, body, line: start.line, col: start.col })
    }

    fn parse_return_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.expect(&TokenKind::Return, "Ожидалось 'вернуть'")?;
        if self.check(&TokenKind::Newline) {
            return Err(self.err_at("После 'вернуть' ожидается выражение или 'пусто'", start.line, start.col));
        }
        let value = self.parse_expr()?;
        self.expect(&TokenKind::Newline, "Ожидался перевод строки после 'вернуть'")?;
        Ok(Stmt::Return { value, line: start.line, col: start.col })
    }

    fn parse_break_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let tok = self.expect(&TokenKind::Break, "Ожидалось 'прервать'")?;
        self.expect(&TokenKind::Newline, "Ожидался перевод строки после 'прервать'")?;
        Ok(Stmt::Break { line: tok.line, col: tok.col })
    }

    fn parse_continue_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let tok = self.expect(&TokenKind::Continue, "Ожидалось 'продолжить'")?;
        self.expect(&TokenKind::Newline, "Ожидался перевод строки после 'продолжить'")?;
        Ok(Stmt::Continue { line: tok.line, col: tok.col })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.expect(&TokenKind::Newline, "Ожидался перевод строки после ':'")?;
        self.expect(&TokenKind::Indent, "Ожидался отступ блока")?;
        let mut body = Vec::new();
        self.consume_newlines();
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            body.push(self.parse_stmt()?);
            self.consume_newlines();
        }
        self.expect(&TokenKind::Dedent, "Ожидалось завершение блока")?;
        Ok(body)
    }

    fn parse_type(&mut self) -> Result<Type, Diagnostic> {
        let mut variants = vec![self.parse_type_atom()?];
        while self.match_tok(&TokenKind::Pipe) {
            variants.push(self.parse_type_atom()?);
        }
        Ok(Type::union(variants))
    }

    fn parse_type_atom(&mut self) -> Result<Type, Diagnostic> {
        let tok = self.current().clone();
        let node = if let TokenKind::Ident(name) = &tok.kind {
            if PRIMITIVE_TYPE_NAMES.contains(&name.as_str()) {
                self.advance();
                primitive_type(name)
            } else if name == "Список" {
                self.advance();
                self.expect(&TokenKind::LBracket, "Ожидался '[' после 'Список'")?;
                let element = self.parse_type()?;
                self.expect(&TokenKind::RBracket, "Ожидалась ']' после типа элемента списка")?;
                Type::List(Box::new(element))
            } else if name == "Словарь" {
                self.advance();
                self.expect(&TokenKind::LBracket, "Ожидался '[' после 'Словарь'")?;
                let key = self.parse_type()?;
                self.expect(&TokenKind::Comma, "Ожидалась ',' между типами ключа и значения словаря")?;
                let value = self.parse_type()?;
                self.expect(&TokenKind::RBracket, "Ожидалась ']' после типов словаря")?;
                Type::Dict(Box::new(key), Box::new(value))
            } else {
                return Err(self.err_at("Ожидался тип", tok.line, tok.col));
            }
        } else if self.match_tok(&TokenKind::LParen) {
            let inner = self.parse_type()?;
            self.expect(&TokenKind::RParen, "Ожидалась ')' после типа")?;
            inner
        } else {
            return Err(self.err_at("Ожидался тип", tok.line, tok.col));
        };

        if self.match_tok(&TokenKind::Question) {
            return Ok(Type::union([node, Type::Void]));
        }
        Ok(node)
    }

    fn parse_expr(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let op_tok = self.advance();
            let right = self.parse_and()?;
            expr = binary(BinaryOp::Or, expr, right, op_tok.line, op_tok.col);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_comparison()?;
        while self.check(&TokenKind::And) {
            let op_tok = self.advance();
            let right = self.parse_comparison()?;
            expr = binary(BinaryOp::And, expr, right, op_tok.line, op_tok.col);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_add()?;
        loop {
            let op = match self.current().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            let op_tok = self.advance();
            let right = self.parse_add()?;
            expr = binary(op, expr, right, op_tok.line, op_tok.col);
        }
        Ok(expr)
    }

    fn parse_add(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_mul()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let op_tok = self.advance();
            let right = self.parse_mul()?;
            expr = binary(op, expr, right, op_tok.line, op_tok.col);
        }
        Ok(expr)
    }

    fn parse_mul(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let op_tok = self.advance();
            let right = self.parse_unary()?;
            expr = binary(op, expr, right, op_tok.line, op_tok.col);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        if self.check(&TokenKind::AwaitKw) {
            let op_tok = self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Await(Box::new(operand)), op_tok.line, op_tok.col));
        }
        if matches!(self.current().kind, TokenKind::Not | TokenKind::Minus) {
            let op = if self.current().kind == TokenKind::Not { UnaryOp::Not } else { UnaryOp::Neg };
            let op_tok = self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, op_tok.line, op_tok.col));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.match_tok(&TokenKind::LParen) {
                let lpar = self.previous().clone();
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.match_tok(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen, "Ожидалась ')' после аргументов")?;
                expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args }, lpar.line, lpar.col);
                continue;
            }
            if self.match_tok(&TokenKind::LBracket) {
                let lbr = self.previous().clone();
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "Ожидалась ']' после индексатора")?;
                expr = Expr::new(
                    ExprKind::Index { target: Box::new(expr), index: Box::new(index) },
                    lbr.line,
                    lbr.col,
                );
                continue;
            }
            if self.match_tok(&TokenKind::Dot) {
                let dot = self.previous().clone();
                let (member, _, _) = self.expect_ident("Ожидалось имя члена после '.'")?;
                expr = Expr::new(ExprKind::Member { target: Box::new(expr), member }, dot.line, dot.col);
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let tok = self.current().clone();
        let expr = match tok.kind {
            TokenKind::Int(v) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Int(v)), tok.line, tok.col)
            }
            TokenKind::Float(v) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Float(v)), tok.line, tok.col)
            }
            TokenKind::Str(s) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::String(s)), tok.line, tok.col)
            }
            TokenKind::True => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Bool(true)), tok.line, tok.col)
            }
            TokenKind::False => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Bool(false)), tok.line, tok.col)
            }
            TokenKind::Null => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Null), tok.line, tok.col)
            }
            TokenKind::Ident(name) => {
                self.advance();
                Expr::new(ExprKind::Identifier(name), tok.line, tok.col)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "Ожидалась ')' после выражения")?;
                inner
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expr()?);
                        if !self.match_tok(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket, "Ожидалась ']' после литерала списка")?;
                Expr::new(ExprKind::List(elements), tok.line, tok.col)
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        let key = self.parse_expr()?;
                        self.expect(&TokenKind::Colon, "Ожидался ':' между ключом и значением словаря")?;
                        let value = self.parse_expr()?;
                        entries.push((key, value));
                        if !self.match_tok(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBrace, "Ожидалась '}' после литерала словаря")?;
                Expr::new(ExprKind::Dict(entries), tok.line, tok.col)
            }
            _ => return Err(self.err_at("Ожидалось выражение", tok.line, tok.col)),
        };
        Ok(expr)
    }

    fn consume_newlines(&mut self) {
        while self.match_tok(&TokenKind::Newline) {}
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos - 1]
    }

    fn advance(&mut self) -> Token {
        if !self.check(&TokenKind::Eof) {
            self.pos += 1;
        }
        self.previous().clone()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        discriminant(&self.current().kind) == discriminant(kind)
    }

    fn match_tok(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let tok = self.current().clone();
        Err(self.err_at(message, tok.line, tok.col))
    }

    fn expect_ident(&mut self, message: &str) -> Result<(String, usize, usize), Diagnostic> {
        let tok = self.current().clone();
        if let TokenKind::Ident(name) = tok.kind {
            self.advance();
            return Ok((name, tok.line, tok.col));
        }
        Err(self.err_at(message, tok.line, tok.col))
    }

    fn expect_string(&mut self, message: &str) -> Result<String, Diagnostic> {
        let tok = self.current().clone();
        if let TokenKind::Str(s) = tok.kind {
            self.advance();
            return Ok(s);
        }
        Err(self.err_at(message, tok.line, tok.col))
    }

    fn err_at(&self, message: impl Into<String>, line: usize, col: usize) -> Diagnostic {
        let d = Diagnostic::at(message, line, col);
        match self.path {
            Some(p) => d.with_path(p),
            None => d,
        }
    }
}

fn primitive_type(name: &str) -> Type {
    match name {
        "Цел" => Type::Int,
        "Дроб" => Type::Float,
        "Лог" => Type::Bool,
        "Строка" => Type::String,
        "Пусто" => Type::Void,
        "Любой" => Type::Any,
        "Задача" => Type::Task,
        _ => unreachable!("checked by caller against PRIMITIVE_TYPE_NAMES"),
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, line: usize, col: usize) -> Expr {
    Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, line, col)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> Program {
        let tokens = tokenize(src, None).unwrap();
        parse(tokens, None).unwrap()
    }

    #[test]
    fn parses_var_decl_with_annotation() {
        let program = parse_src("пусть x: Цел = 1\n");
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0] {
            Stmt::VarDecl { name, type_ann, .. } => {
                assert_eq!(name, "x");
                assert_eq!(type_ann.as_ref().unwrap(), &Type::Int);
            }
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn parses_nullable_type_sugar() {
        let program = parse_src("пусть x: Цел? = пусто\n");
        match &program.statements[0] {
            Stmt::VarDecl { type_ann, .. } => {
                assert_eq!(type_ann.as_ref().unwrap(), &Type::union([Type::Int, Type::Void]));
            }
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_with_params_and_body() {
        let program = parse_src("функция f(x: Цел) -> Цел:\n    вернуть x\n");
        match &program.statements[0] {
            Stmt::FuncDecl(f) => {
                assert_eq!(f.name, "f");
                assert_eq!(f.params.len(), 1);
                assert_eq!(f.return_type, Type::Int);
                assert_eq!(f.body.len(), 1);
            }
            other => panic!("expected FuncDecl, got {other:?}"),
        }
    }

    #[test]
    fn parses_precedence_chain() {
        let program = parse_src("1 + 2 * 3 == 7 и не ложь\n");
        match &program.statements[0] {
            Stmt::ExprStmt { expr, .. } => match &expr.kind {
                ExprKind::Binary { op: BinaryOp::And, .. } => {}
                other => panic!("expected top-level And, got {other:?}"),
            },
            other => panic!("expected ExprStmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_call_index_member_chain() {
        let program = parse_src("a.b[0](1, 2)\n");
        match &program.statements[0] {
            Stmt::ExprStmt { expr, .. } => {
                assert!(matches!(expr.kind, ExprKind::Call { .. }));
            }
            other => panic!("expected ExprStmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_assignment_vs_expr_stmt() {
        let program = parse_src("x = 1\nx\n");
        assert!(matches!(program.statements[0], Stmt::Assign { .. }));
        assert!(matches!(program.statements[1], Stmt::ExprStmt { .. }));
    }

    #[test]
    fn parses_import_all_with_alias() {
        let program = parse_src("подключить \"lib.яс\" как lib\n");
        match &program.statements[0] {
            Stmt::ImportAll { path, alias, .. } => {
                assert_eq!(path, "lib.яс");
                assert_eq!(alias.as_deref(), Some("lib"));
            }
            other => panic!("expected ImportAll, got {other:?}"),
        }
    }

    #[test]
    fn parses_import_from_multiple_items() {
        let program = parse_src("из \"lib.яс\" подключить a, b как c\n");
        match &program.statements[0] {
            Stmt::ImportFrom { items, .. } => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].alias.as_deref(), Some("c"));
            }
            other => panic!("expected ImportFrom, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_assignment_target() {
        let tokens = tokenize("1 + 1 = 2\n", None).unwrap();
        assert!(parse(tokens, None).is_err());
    }

    #[test]
    fn parses_list_and_dict_types() {
        let program = parse_src("пусть x: Список[Цел] = []\nпусть y: Словарь[Строка, Цел] = {}\n");
        match &program.statements[0] {
            Stmt::VarDecl { type_ann, .. } => {
                assert_eq!(type_ann.as_ref().unwrap(), &Type::List(Box::new(Type::Int)));
            }
            _ => unreachable!(),
        }
        match &program.statements[1] {
            Stmt::VarDecl { type_ann, .. } => {
                assert_eq!(type_ann.as_ref().unwrap(), &Type::Dict(Box::new(Type::String), Box::new(Type::Int)));
            }
            _ => unreachable!(),
        }
    }
}
