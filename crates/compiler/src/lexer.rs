//! Indentation-sensitive tokenizer (§4.1).
//!
//! Normalizes line endings, strips a leading BOM, rejects tabs in indentation, and tracks a
//! monotonic stack of indentation columns to emit `INDENT`/`DEDENT`/`NEWLINE` markers around a
//! flat token stream.

use yasny_core::Diagnostic;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Keywords
    Function,
    Return,
    If,
    Else,
    While,
    For,
    In,
    And,
    Or,
    Not,
    True,
    False,
    Null,
    Let,
    ImportAll,
    From,
    As,
    Export,
    Break,
    Continue,
    Async,
    AwaitKw,

    // Punctuators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Arrow,
    Dot,
    Question,
    Pipe,

    Indent,
    Dedent,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub col: usize,
}

/// Reserved words. `асинхронная`/`ждать` are included even though the reference lexer omits
/// them — its own parser treats both as distinct token kinds, so leaving them lexable as plain
/// identifiers would be a latent bug (see DESIGN.md).
fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "функция" => TokenKind::Function,
        "вернуть" => TokenKind::Return,
        "если" => TokenKind::If,
        "иначе" => TokenKind::Else,
        "пока" => TokenKind::While,
        "для" => TokenKind::For,
        "в" => TokenKind::In,
        "и" => TokenKind::And,
        "или" => TokenKind::Or,
        "не" => TokenKind::Not,
        "истина" => TokenKind::True,
        "ложь" => TokenKind::False,
        "пусто" => TokenKind::Null,
        "пусть" => TokenKind::Let,
        "подключить" => TokenKind::ImportAll,
        "из" => TokenKind::From,
        "как" => TokenKind::As,
        "экспорт" => TokenKind::Export,
        "прервать" => TokenKind::Break,
        "продолжить" => TokenKind::Continue,
        "асинхронная" => TokenKind::Async,
        "ждать" => TokenKind::AwaitKw,
        _ => return None,
    })
}

pub fn tokenize(source: &str, path: Option<&str>) -> Result<Vec<Token>, Diagnostic> {
    Lexer::new(source, path).run()
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    path: Option<&'a str>,
    indent_stack: Vec<usize>,
    tokens: Vec<Token>,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, path: Option<&'a str>) -> Self {
        let normalized = source.replace("\r\n", "\n").replace('\r', "\n");
        let normalized = normalized.strip_prefix('\u{feff}').unwrap_or(&normalized);
        Lexer {
            chars: normalized.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            path,
            indent_stack: vec![0],
            tokens: Vec::new(),
            at_line_start: true,
        }
    }

    fn err(&self, message: impl Into<String>) -> Diagnostic {
        let d = Diagnostic::at(message, self.line, self.col);
        match self.path {
            Some(p) => d.with_path(p),
            None => d,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, line: usize, col: usize) {
        self.tokens.push(Token { kind, line, col });
    }

    fn run(mut self) -> Result<Vec<Token>, Diagnostic> {
        loop {
            if self.at_line_start {
                if !self.handle_line_start()? {
                    continue;
                }
            }
            match self.peek() {
                None => break,
                Some(' ') => {
                    self.advance();
                }
                Some('#') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.advance();
                    }
                }
                Some('\n') => {
                    let (line, col) = (self.line, self.col);
                    self.advance();
                    self.push(TokenKind::Newline, line, col);
                    self.at_line_start = true;
                }
                Some(c) if c.is_ascii_digit() => self.lex_number()?,
                Some('"') => self.lex_string()?,
                Some(c) if is_ident_start(c) => self.lex_ident_or_keyword(),
                Some(_) => self.lex_punct()?,
            }
        }

        let (line, col) = (self.line, self.col);
        self.push(TokenKind::Newline, line, col);
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, line, col);
        }
        self.push(TokenKind::Eof, line, col);
        Ok(self.tokens)
    }

    /// Consumes indentation at the start of a logical line. Returns `Ok(true)` once the line's
    /// first real token is ready to be lexed by the caller, `Ok(false)` if the line was blank
    /// (comment-only or empty) and the caller should loop back to `handle_line_start` again.
    fn handle_line_start(&mut self) -> Result<bool, Diagnostic> {
        let mut spaces = 0usize;
        loop {
            match self.peek() {
                Some(' ') => {
                    spaces += 1;
                    self.advance();
                }
                Some('\t') => return Err(self.err("символы табуляции в отступе запрещены")),
                _ => break,
            }
        }
        match self.peek() {
            None => {
                self.at_line_start = false;
                return Ok(true);
            }
            Some('\n') | Some('#') => {
                // Blank or comment-only line: consume it without touching the indent stack.
                while !matches!(self.peek(), None | Some('\n')) {
                    self.advance();
                }
                if self.peek().is_some() {
                    self.advance();
                }
                return Ok(false);
            }
            _ => {}
        }

        let (line, col) = (self.line, 1);
        let current = *self.indent_stack.last().unwrap();
        if spaces > current {
            self.indent_stack.push(spaces);
            self.push(TokenKind::Indent, line, col);
        } else if spaces < current {
            while *self.indent_stack.last().unwrap() > spaces {
                self.indent_stack.pop();
                self.push(TokenKind::Dedent, line, col);
            }
            if *self.indent_stack.last().unwrap() != spaces {
                return Err(self.err("несогласованный отступ"));
            }
        }
        self.at_line_start = false;
        Ok(true)
    }

    fn lex_number(&mut self) -> Result<(), Diagnostic> {
        let (line, col) = (self.line, self.col);
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
            let value: f64 = text.parse().map_err(|_| self.err("неверный вещественный литерал"))?;
            self.push(TokenKind::Float(value), line, col);
        } else if self.peek() == Some('.') {
            return Err(self.err("незавершённый вещественный литерал: ожидалась цифра после '.'"));
        } else {
            let value: i64 = text.parse().map_err(|_| self.err("неверный целочисленный литерал"))?;
            self.push(TokenKind::Int(value), line, col);
        }
        Ok(())
    }

    fn lex_string(&mut self) -> Result<(), Diagnostic> {
        let (line, col) = (self.line, self.col);
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(self.err("незакрытый строковый литерал")),
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some(other) => {
                        return Err(self.err(format!("неизвестная escape-последовательность: \\{other}")))
                    }
                    None => return Err(self.err("незакрытый строковый литерал")),
                },
                Some(c) => text.push(c),
            }
        }
        self.push(TokenKind::Str(text), line, col);
        Ok(())
    }

    fn lex_ident_or_keyword(&mut self) {
        let (line, col) = (self.line, self.col);
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            text.push(self.advance().unwrap());
        }
        let kind = keyword(&text).unwrap_or(TokenKind::Ident(text));
        self.push(kind, line, col);
    }

    fn lex_punct(&mut self) -> Result<(), Diagnostic> {
        let (line, col) = (self.line, self.col);
        let two = (self.peek(), self.peek_at(1));
        let kind = match two {
            (Some('='), Some('=')) => {
                self.advance();
                self.advance();
                TokenKind::EqEq
            }
            (Some('!'), Some('=')) => {
                self.advance();
                self.advance();
                TokenKind::NotEq
            }
            (Some('<'), Some('=')) => {
                self.advance();
                self.advance();
                TokenKind::Le
            }
            (Some('>'), Some('=')) => {
                self.advance();
                self.advance();
                TokenKind::Ge
            }
            (Some('-'), Some('>')) => {
                self.advance();
                self.advance();
                TokenKind::Arrow
            }
            _ => {
                let c = self.advance().ok_or_else(|| self.err("неожиданный конец файла"))?;
                match c {
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    '%' => TokenKind::Percent,
                    '=' => TokenKind::Assign,
                    '<' => TokenKind::Lt,
                    '>' => TokenKind::Gt,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    ',' => TokenKind::Comma,
                    ':' => TokenKind::Colon,
                    '.' => TokenKind::Dot,
                    '?' => TokenKind::Question,
                    '|' => TokenKind::Pipe,
                    other => return Err(self.err(format!("неожиданный символ: '{other}'"))),
                }
            }
        };
        self.push(kind, line, col);
        Ok(())
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, None).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        let ks = kinds("пусть x = 1\n");
        assert_eq!(
            ks,
            vec![
                TokenKind::Let,
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn async_and_await_are_keywords_not_identifiers() {
        let ks = kinds("асинхронная функция f() -> Цел:\n    вернуть ждать t\n");
        assert!(ks.contains(&TokenKind::Async));
        assert!(ks.contains(&TokenKind::AwaitKw));
    }

    #[test]
    fn indentation_emits_balanced_indent_dedent() {
        let ks = kinds("если истина:\n    пусть x = 1\nпусть y = 2\n");
        let indents = ks.iter().filter(|k| matches!(k, TokenKind::Indent)).count();
        let dedents = ks.iter().filter(|k| matches!(k, TokenKind::Dedent)).count();
        assert_eq!(indents, dedents);
        assert_eq!(indents, 1);
    }

    #[test]
    fn rejects_tab_indentation() {
        let err = tokenize("если истина:\n\tпусть x = 1\n", None).unwrap_err();
        assert!(err.message.contains("табуляц"));
    }

    #[test]
    fn rejects_inconsistent_dedent() {
        let err = tokenize("если истина:\n        пусть x = 1\n    пусть y = 2\n", None).unwrap_err();
        assert!(err.message.contains("отступ"));
    }

    #[test]
    fn float_requires_trailing_digit() {
        let err = tokenize("пусть x = 1.\n", None).unwrap_err();
        assert!(err.message.contains("вещественн"));
    }

    #[test]
    fn string_escapes_are_decoded() {
        let ks = kinds("\"a\\nb\"\n");
        assert_eq!(ks[0], TokenKind::Str("a\nb".to_string()));
    }

    #[test]
    fn string_rejects_unknown_escape() {
        let err = tokenize("\"a\\qb\"\n", None).unwrap_err();
        assert!(err.message.contains("escape"));
    }

    #[test]
    fn two_char_punctuators_matched_before_single() {
        let ks = kinds("1 <= 2\n");
        assert_eq!(ks[1], TokenKind::Le);
    }

    #[test]
    fn blank_and_comment_lines_do_not_affect_indentation() {
        let ks = kinds("если истина:\n    пусть x = 1\n\n    # comment\n    пусть y = 2\nпусть z = 3\n");
        let indents = ks.iter().filter(|k| matches!(k, TokenKind::Indent)).count();
        let dedents = ks.iter().filter(|k| matches!(k, TokenKind::Dedent)).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
    }
}
