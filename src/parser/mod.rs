use crate::ast::*;
use crate::lexer::tokens::{Token, TokenType};
use crate::runtime::ops::str_to_number;
use crate::runtime::value::Number;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

impl ParseError {
    /// True when the parser ran out of input. The REPL uses this to ask for
    /// a continuation line instead of reporting the error.
    pub fn is_incomplete(&self) -> bool {
        self.message.ends_with("near <eof>")
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.file, self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

const MAX_PARSER_DEPTH: usize = 200;

/// Binding power of a binary operator as (left, right). Right-associative
/// operators bind weaker on the right.
fn binary_precedence(tt: TokenType) -> Option<(BinOp, u8, u8)> {
    let entry = match tt {
        TokenType::Or => (BinOp::Or, 1, 1),
        TokenType::And => (BinOp::And, 2, 2),
        TokenType::LessThan => (BinOp::Lt, 3, 3),
        TokenType::LessEqual => (BinOp::Le, 3, 3),
        TokenType::GreaterThan => (BinOp::Gt, 3, 3),
        TokenType::GreaterEqual => (BinOp::Ge, 3, 3),
        TokenType::Equals => (BinOp::Eq, 3, 3),
        TokenType::NotEquals => (BinOp::Ne, 3, 3),
        TokenType::Pipe => (BinOp::BitOr, 4, 4),
        TokenType::Tilde => (BinOp::BitXor, 5, 5),
        TokenType::Ampersand => (BinOp::BitAnd, 6, 6),
        TokenType::ShiftLeft => (BinOp::Shl, 7, 7),
        TokenType::ShiftRight => (BinOp::Shr, 7, 7),
        TokenType::Concat => (BinOp::Concat, 9, 8),
        TokenType::Plus => (BinOp::Add, 10, 10),
        TokenType::Minus => (BinOp::Sub, 10, 10),
        TokenType::Star => (BinOp::Mul, 11, 11),
        TokenType::Slash => (BinOp::Div, 11, 11),
        TokenType::DoubleSlash => (BinOp::IDiv, 11, 11),
        TokenType::Percent => (BinOp::Mod, 11, 11),
        TokenType::Caret => (BinOp::Pow, 14, 13),
        _ => return None,
    };
    Some(entry)
}

const UNARY_PRIORITY: u8 = 12;

/// Per-function parse state.
struct FuncState {
    variadic: bool,
    loop_depth: usize,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    filename: Rc<str>,
    depth: usize,
    functions: Vec<FuncState>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, filename: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            filename: Rc::from(filename),
            depth: 0,
            functions: Vec::new(),
        }
    }

    fn enter_depth(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            Err(self.error(&format!(
                "chunk has too many syntax levels (limit is {})",
                MAX_PARSER_DEPTH
            )))
        } else {
            Ok(())
        }
    }

    fn exit_depth(&mut self) {
        self.depth -= 1;
    }

    // ── Public API ──────────────────────────────────────────────────────

    /// Parse a whole chunk. The chunk behaves as the body of a vararg function.
    pub fn parse(&mut self) -> Result<Chunk, ParseError> {
        self.functions.push(FuncState {
            variadic: true,
            loop_depth: 0,
        });
        let block = self.parse_block()?;
        if !self.at_end() {
            return Err(self.unexpected("'<eof>' expected"));
        }
        self.functions.pop();
        Ok(Chunk {
            block,
            name: self.filename.to_string(),
        })
    }

    /// Parse a bare expression list such as `1, f(x), ...` (the REPL and
    /// `Interpreter::eval` entry point).
    pub fn parse_expression_list_chunk(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.functions.push(FuncState {
            variadic: true,
            loop_depth: 0,
        });
        let exprs = self.parse_expr_list()?;
        if !self.at_end() {
            return Err(self.unexpected("'<eof>' expected"));
        }
        self.functions.pop();
        Ok(exprs)
    }

    // ── Blocks and statements ───────────────────────────────────────────

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.enter_depth()?;
        let result = self.parse_block_inner();
        self.exit_depth();
        result
    }

    fn parse_block_inner(&mut self) -> Result<Block, ParseError> {
        let mut statements = Vec::new();
        while !self.current().token_type.ends_block() {
            if self.check(TokenType::Return) {
                statements.push(self.parse_return_stmt()?);
                break;
            }
            let stmt = self.parse_statement()?;
            if let Statement::Label { name, loc } = &stmt {
                let duplicate = statements
                    .iter()
                    .any(|s| matches!(s, Statement::Label { name: other, .. } if other == name));
                if duplicate {
                    return Err(ParseError {
                        message: format!("label '{}' already defined", name),
                        line: loc.line,
                        column: loc.column,
                        file: loc.file.to_string(),
                    });
                }
            }
            statements.push(stmt);
        }
        Ok(Block { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        match self.current().token_type {
            TokenType::Semicolon => {
                self.advance();
                Ok(Statement::Empty { loc })
            }
            TokenType::If => self.parse_if_stmt(),
            TokenType::While => self.parse_while_stmt(),
            TokenType::Do => {
                self.advance();
                let body = self.parse_block()?;
                self.expect_closing(TokenType::End, "do", loc.line)?;
                Ok(Statement::Do { body, loc })
            }
            TokenType::For => self.parse_for_stmt(),
            TokenType::Repeat => self.parse_repeat_stmt(),
            TokenType::Function => self.parse_function_stmt(),
            TokenType::Local => {
                self.advance();
                if self.check(TokenType::Function) {
                    self.advance();
                    let name = self.expect_name()?;
                    let body = self.parse_func_body(false, &loc)?;
                    Ok(Statement::LocalFunction { name, body, loc })
                } else {
                    self.parse_local_stmt(loc)
                }
            }
            TokenType::DoubleColon => {
                self.advance();
                let name = self.expect_name()?;
                self.expect(TokenType::DoubleColon)?;
                Ok(Statement::Label { name, loc })
            }
            TokenType::Break => {
                self.advance();
                if self.func_state().loop_depth == 0 {
                    return Err(ParseError {
                        message: format!("break outside a loop at line {}", loc.line),
                        line: loc.line,
                        column: loc.column,
                        file: loc.file.to_string(),
                    });
                }
                Ok(Statement::Break { loc })
            }
            TokenType::Goto => {
                self.advance();
                let label = self.expect_name()?;
                Ok(Statement::Goto { label, loc })
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_return_stmt(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.expect(TokenType::Return)?;
        let values = if self.current().token_type.ends_block() || self.check(TokenType::Semicolon)
        {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        if self.check(TokenType::Semicolon) {
            self.advance();
        }
        if !self.current().token_type.ends_block() {
            return Err(self.unexpected("'<eof>' expected"));
        }
        Ok(Statement::Return { values, loc })
    }

    fn parse_if_stmt(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.expect(TokenType::If)?;
        let mut clauses = Vec::new();
        let condition = self.parse_expression()?;
        self.expect(TokenType::Then)?;
        let body = self.parse_block()?;
        clauses.push(IfClause { condition, body });

        let mut else_body = None;
        loop {
            if self.check(TokenType::ElseIf) {
                self.advance();
                let condition = self.parse_expression()?;
                self.expect(TokenType::Then)?;
                let body = self.parse_block()?;
                clauses.push(IfClause { condition, body });
            } else if self.check(TokenType::Else) {
                self.advance();
                else_body = Some(self.parse_block()?);
                self.expect_closing(TokenType::End, "if", loc.line)?;
                break;
            } else {
                self.expect_closing(TokenType::End, "if", loc.line)?;
                break;
            }
        }
        Ok(Statement::If {
            clauses,
            else_body,
            loc,
        })
    }

    fn parse_while_stmt(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.expect(TokenType::While)?;
        let condition = self.parse_expression()?;
        self.expect(TokenType::Do)?;
        let body = self.parse_loop_body()?;
        self.expect_closing(TokenType::End, "while", loc.line)?;
        Ok(Statement::While {
            condition,
            body,
            loc,
        })
    }

    fn parse_repeat_stmt(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.expect(TokenType::Repeat)?;
        let body = self.parse_loop_body()?;
        self.expect_closing(TokenType::Until, "repeat", loc.line)?;
        let condition = self.parse_expression()?;
        Ok(Statement::Repeat {
            body,
            condition,
            loc,
        })
    }

    fn parse_for_stmt(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.expect(TokenType::For)?;
        let first = self.expect_name()?;

        if self.check(TokenType::Assign) {
            self.advance();
            let start = self.parse_expression()?;
            self.expect(TokenType::Comma)?;
            let stop = self.parse_expression()?;
            let step = if self.check(TokenType::Comma) {
                self.advance();
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect(TokenType::Do)?;
            let body = self.parse_loop_body()?;
            self.expect_closing(TokenType::End, "for", loc.line)?;
            return Ok(Statement::For {
                var: first,
                start,
                stop,
                step,
                body,
                loc,
            });
        }

        let mut names = vec![first];
        while self.check(TokenType::Comma) {
            self.advance();
            names.push(self.expect_name()?);
        }
        if !self.check(TokenType::In) {
            return Err(self.unexpected("'=' or 'in' expected"));
        }
        self.advance();
        let exprs = self.parse_expr_list()?;
        self.expect(TokenType::Do)?;
        let body = self.parse_loop_body()?;
        self.expect_closing(TokenType::End, "for", loc.line)?;
        Ok(Statement::ForIn {
            names,
            exprs,
            body,
            loc,
        })
    }

    fn parse_loop_body(&mut self) -> Result<Block, ParseError> {
        self.func_state_mut().loop_depth += 1;
        let body = self.parse_block();
        self.func_state_mut().loop_depth -= 1;
        body
    }

    fn parse_function_stmt(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        self.expect(TokenType::Function)?;
        let mut path = vec![self.expect_name()?];
        while self.check(TokenType::Dot) {
            self.advance();
            path.push(self.expect_name()?);
        }
        let method = if self.check(TokenType::Colon) {
            self.advance();
            Some(self.expect_name()?)
        } else {
            None
        };
        let body = self.parse_func_body(method.is_some(), &loc)?;
        Ok(Statement::Function {
            name: FuncName { path, method },
            body,
            loc,
        })
    }

    fn parse_local_stmt(&mut self, loc: SourceLocation) -> Result<Statement, ParseError> {
        let mut names = Vec::new();
        let mut seen_close = false;
        loop {
            let name = self.expect_name()?;
            let attrib = if self.check(TokenType::LessThan) {
                self.advance();
                let attr_name = self.expect_name()?;
                self.expect(TokenType::GreaterThan)?;
                match attr_name.as_str() {
                    "const" => Some(Attrib::Const),
                    "close" => {
                        if seen_close {
                            return Err(self.error(
                                "multiple to-be-closed variables in local list",
                            ));
                        }
                        seen_close = true;
                        Some(Attrib::Close)
                    }
                    other => {
                        return Err(self.error(&format!("unknown attribute '{}'", other)));
                    }
                }
            } else {
                None
            };
            names.push(AttribName { name, attrib });
            if !self.check(TokenType::Comma) {
                break;
            }
            self.advance();
        }

        let values = if self.check(TokenType::Assign) {
            self.advance();
            self.parse_expr_list()?
        } else {
            Vec::new()
        };
        Ok(Statement::LocalAssignment { names, values, loc })
    }

    fn parse_expr_stmt(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();
        let first = self.parse_suffixed_expr()?;

        if self.check(TokenType::Assign) || self.check(TokenType::Comma) {
            let mut targets = vec![first];
            while self.check(TokenType::Comma) {
                self.advance();
                targets.push(self.parse_suffixed_expr()?);
            }
            for target in &targets {
                if !matches!(target, Expr::Name { .. } | Expr::Index { .. }) {
                    return Err(self.error_at_loc("syntax error near '='", target.loc()));
                }
            }
            self.expect(TokenType::Assign)?;
            let values = self.parse_expr_list()?;
            return Ok(Statement::Assignment {
                targets,
                values,
                loc,
            });
        }

        match first {
            Expr::Call { .. } | Expr::MethodCall { .. } => Ok(Statement::Call { call: first, loc }),
            _ => Err(self.unexpected("syntax error")),
        }
    }

    // ── Functions ───────────────────────────────────────────────────────

    fn parse_func_body(
        &mut self,
        is_method: bool,
        loc: &SourceLocation,
    ) -> Result<Rc<FuncBody>, ParseError> {
        self.expect(TokenType::LParen)?;
        let mut params = Vec::new();
        if is_method {
            params.push("self".to_string());
        }
        let mut variadic = false;
        if !self.check(TokenType::RParen) {
            loop {
                if self.check(TokenType::Ellipsis) {
                    self.advance();
                    variadic = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.check(TokenType::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenType::RParen)?;

        self.functions.push(FuncState {
            variadic,
            loop_depth: 0,
        });
        let body = self.parse_block();
        self.functions.pop();
        let body = body?;
        self.expect_closing(TokenType::End, "function", loc.line)?;

        Ok(Rc::new(FuncBody {
            params,
            variadic,
            body,
            loc: loc.clone(),
        }))
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_subexpr(0)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.parse_expression()?];
        while self.check(TokenType::Comma) {
            self.advance();
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    /// Precedence climbing: parse operators whose left binding power is
    /// greater than `limit`.
    fn parse_subexpr(&mut self, limit: u8) -> Result<Expr, ParseError> {
        self.enter_depth()?;
        let result = self.parse_subexpr_inner(limit);
        self.exit_depth();
        result
    }

    fn parse_subexpr_inner(&mut self, limit: u8) -> Result<Expr, ParseError> {
        let unary = match self.current().token_type {
            TokenType::Not => Some(UnOp::Not),
            TokenType::Minus => Some(UnOp::Neg),
            TokenType::Hash => Some(UnOp::Len),
            TokenType::Tilde => Some(UnOp::BitNot),
            _ => None,
        };

        let mut left = if let Some(op) = unary {
            let loc = self.loc();
            self.advance();
            let operand = self.parse_subexpr(UNARY_PRIORITY)?;
            Expr::UnaryOp {
                op,
                operand: Box::new(operand),
                loc,
            }
        } else {
            self.parse_simple_expr()?
        };

        while let Some((op, left_prio, right_prio)) =
            binary_precedence(self.current().token_type)
        {
            if left_prio <= limit {
                break;
            }
            let loc = self.loc();
            self.advance();
            let right = self.parse_subexpr(right_prio)?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                loc,
            };
        }
        Ok(left)
    }

    fn parse_simple_expr(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        match self.current().token_type {
            TokenType::Integer | TokenType::Float => {
                let text = self.advance().value.clone();
                match str_to_number(&text) {
                    Some(Number::Int(value)) => Ok(Expr::IntegerLiteral { value, loc }),
                    Some(Number::Float(value)) => Ok(Expr::FloatLiteral { value, loc }),
                    None => Err(self.error_at_loc(
                        &format!("malformed number near '{}'", text),
                        &loc,
                    )),
                }
            }
            TokenType::StringLit => {
                let tok = self.advance();
                let bytes = tok
                    .bytes
                    .clone()
                    .unwrap_or_else(|| tok.value.clone().into_bytes());
                Ok(Expr::StringLiteral {
                    value: Rc::from(bytes),
                    loc,
                })
            }
            TokenType::Nil => {
                self.advance();
                Ok(Expr::Nil { loc })
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::BoolLiteral { value: true, loc })
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::BoolLiteral { value: false, loc })
            }
            TokenType::Ellipsis => {
                if !self.func_state().variadic {
                    return Err(self.error("cannot use '...' outside a vararg function near '...'"));
                }
                self.advance();
                Ok(Expr::Vararg { loc })
            }
            TokenType::LBrace => self.parse_table_constructor(),
            TokenType::Function => {
                self.advance();
                let body = self.parse_func_body(false, &loc)?;
                Ok(Expr::Function { body, loc })
            }
            _ => self.parse_suffixed_expr(),
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        match self.current().token_type {
            TokenType::Identifier => {
                let name = self.advance().value.clone();
                Ok(Expr::Name { name, loc })
            }
            TokenType::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenType::RParen)?;
                Ok(Expr::Paren {
                    inner: Box::new(inner),
                    loc,
                })
            }
            _ => Err(self.unexpected("unexpected symbol")),
        }
    }

    fn parse_suffixed_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            let loc = self.loc();
            match self.current().token_type {
                TokenType::Dot => {
                    self.advance();
                    let name_loc = self.loc();
                    let name = self.expect_name()?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        key: Box::new(Expr::StringLiteral {
                            value: Rc::from(name.into_bytes()),
                            loc: name_loc,
                        }),
                        loc,
                    };
                }
                TokenType::LBracket => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect(TokenType::RBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        key: Box::new(key),
                        loc,
                    };
                }
                TokenType::Colon => {
                    self.advance();
                    let method = self.expect_name()?;
                    let arguments = self.parse_call_args()?;
                    expr = Expr::MethodCall {
                        object: Box::new(expr),
                        method,
                        arguments,
                        loc,
                    };
                }
                TokenType::LParen | TokenType::StringLit | TokenType::LBrace => {
                    let arguments = self.parse_call_args()?;
                    expr = Expr::Call {
                        function: Box::new(expr),
                        arguments,
                        loc,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// `(explist)`, a single string literal, or a single table constructor.
    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        match self.current().token_type {
            TokenType::StringLit => Ok(vec![self.parse_simple_expr()?]),
            TokenType::LBrace => Ok(vec![self.parse_table_constructor()?]),
            TokenType::LParen => {
                self.advance();
                let args = if self.check(TokenType::RParen) {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.expect(TokenType::RParen)?;
                Ok(args)
            }
            _ => Err(self.unexpected("function arguments expected")),
        }
    }

    fn parse_table_constructor(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        self.expect(TokenType::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(TokenType::RBrace) {
            let field = match self.current().token_type {
                TokenType::LBracket => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect(TokenType::RBracket)?;
                    self.expect(TokenType::Assign)?;
                    let value = self.parse_expression()?;
                    Field::Keyed { key, value }
                }
                TokenType::Identifier if self.peek_type(1) == Some(TokenType::Assign) => {
                    let name = self.advance().value.clone();
                    self.advance();
                    let value = self.parse_expression()?;
                    Field::Named { name, value }
                }
                _ => Field::Positional(self.parse_expression()?),
            };
            fields.push(field);

            if self.check(TokenType::Comma) || self.check(TokenType::Semicolon) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_closing(TokenType::RBrace, "{", loc.line)?;
        Ok(Expr::Table { fields, loc })
    }

    // ── Token stream helpers ────────────────────────────────────────────

    fn func_state(&self) -> &FuncState {
        // parse() always pushes the chunk's state first
        &self.functions[self.functions.len() - 1]
    }

    fn func_state_mut(&mut self) -> &mut FuncState {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    fn current(&self) -> &Token {
        if self.pos >= self.tokens.len() {
            &self.tokens[self.tokens.len() - 1] // EOF
        } else {
            &self.tokens[self.pos]
        }
    }

    fn advance(&mut self) -> &Token {
        let pos = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[pos]
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current().token_type == token_type
    }

    fn expect(&mut self, token_type: TokenType) -> Result<&Token, ParseError> {
        if !self.check(token_type) {
            return Err(self.unexpected(&format!("'{}' expected", token_text(token_type))));
        }
        Ok(self.advance())
    }

    /// Like `expect`, but names the opening token when it is on another line.
    fn expect_closing(
        &mut self,
        token_type: TokenType,
        opener: &str,
        open_line: usize,
    ) -> Result<(), ParseError> {
        if self.check(token_type) {
            self.advance();
            return Ok(());
        }
        let what = token_text(token_type);
        if self.current().line == open_line {
            Err(self.unexpected(&format!("'{}' expected", what)))
        } else {
            Err(self.unexpected(&format!(
                "'{}' expected (to close '{}' at line {})",
                what, opener, open_line
            )))
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        if !self.check(TokenType::Identifier) {
            return Err(self.unexpected("<name> expected"));
        }
        Ok(self.advance().value.clone())
    }

    fn peek_type(&self, offset: usize) -> Option<TokenType> {
        self.tokens.get(self.pos + offset).map(|t| t.token_type)
    }

    fn at_end(&self) -> bool {
        self.current().token_type == TokenType::Eof
    }

    fn loc(&self) -> SourceLocation {
        let tok = self.current();
        SourceLocation::in_file(&self.filename, tok.line, tok.column)
    }

    /// Error naming the offending token, Lua style: `msg near 'tok'`.
    fn unexpected(&self, message: &str) -> ParseError {
        let tok = self.current();
        let near = match tok.token_type {
            TokenType::Eof => "<eof>".to_string(),
            TokenType::StringLit => format!("'\"{}\"'", tok.value),
            _ => format!("'{}'", tok.value),
        };
        ParseError {
            message: format!("{} near {}", message, near),
            line: tok.line,
            column: tok.column,
            file: tok.file.clone(),
        }
    }

    fn error(&self, message: &str) -> ParseError {
        let tok = self.current();
        ParseError {
            message: message.to_string(),
            line: tok.line,
            column: tok.column,
            file: tok.file.clone(),
        }
    }

    fn error_at_loc(&self, message: &str, loc: &SourceLocation) -> ParseError {
        ParseError {
            message: message.to_string(),
            line: loc.line,
            column: loc.column,
            file: loc.file.to_string(),
        }
    }
}

fn token_text(tt: TokenType) -> &'static str {
    match tt {
        TokenType::End => "end",
        TokenType::Then => "then",
        TokenType::Do => "do",
        TokenType::Until => "until",
        TokenType::In => "in",
        TokenType::Assign => "=",
        TokenType::LParen => "(",
        TokenType::RParen => ")",
        TokenType::LBrace => "{",
        TokenType::RBrace => "}",
        TokenType::LBracket => "[",
        TokenType::RBracket => "]",
        TokenType::DoubleColon => "::",
        TokenType::Comma => ",",
        TokenType::GreaterThan => ">",
        TokenType::Identifier => "<name>",
        TokenType::Eof => "<eof>",
        _ => "?",
    }
}

/// Tokenize and parse `source` in one step.
pub fn parse_source(source: &str, filename: &str) -> Result<Chunk, crate::Error> {
    let tokens = crate::lexer::Lexer::new(source, filename).tokenize()?;
    let chunk = Parser::new(tokens, filename).parse()?;
    Ok(chunk)
}
