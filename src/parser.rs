use std::rc::Rc;

use crate::{
    ast::{
        ArrayElement, AssignOp, BinaryOp, ClassDef, Expr, ExprKind, FunctionDef, Literal,
        LogicalOp, ObjectEntry, Param, Stmt, StmtKind, UnaryOp, UpdateOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind},
    lexer::{Lexer, Token, TokenKind, TokenValue},
    registry::HandlerRegistry,
};

/// Lexes and parses a whole script.
pub fn parse_source(source: &str, registry: &HandlerRegistry) -> Result<Vec<Stmt>, Diagnostic> {
    let tokens = Lexer::new(source, registry.keywords()).tokenize()?;
    parse(tokens, registry)
}

pub fn parse(tokens: Vec<Token>, registry: &HandlerRegistry) -> Result<Vec<Stmt>, Diagnostic> {
    Parser::new(tokens, registry).parse_program()
}

/// Recursive-descent parser. The primitives marked `pub` are the surface
/// handed to registered statement parsers.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    registry: &'a HandlerRegistry,
    origin: Option<Rc<str>>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, registry: &'a HandlerRegistry) -> Self {
        Self {
            tokens,
            current: 0,
            registry,
            origin: None,
        }
    }

    /// Tags every parsed statement with the name of the source it came from.
    pub fn with_origin(mut self, origin: Option<Rc<str>>) -> Self {
        self.origin = origin;
        self
    }

    pub fn parse_program(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut items = Vec::new();
        loop {
            self.skip_semicolons();
            if self.check(TokenKind::Eof) {
                break;
            }
            items.push(self.parse_statement()?);
        }
        Ok(items)
    }

    /// Parses a single expression and requires the input to end there.
    pub fn parse_standalone_expression(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_expression()?;
        if !self.check(TokenKind::Eof) {
            return Err(self.error(self.peek(), "unexpected token after expression"));
        }
        Ok(expr)
    }

    // ----- statements -------------------------------------------------------

    pub fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let mut annotations = Vec::new();
        while self.check(TokenKind::Annotation) {
            if let TokenValue::Str(name) = self.next().value {
                annotations.push(name);
            }
        }
        let mut stmt = self.parse_statement_kind()?;
        stmt.annotations.extend(annotations);
        if stmt.origin.is_none() {
            stmt.origin = self.origin.clone();
        }
        Ok(stmt)
    }

    fn parse_statement_kind(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Keyword => match token.lexeme.as_str() {
                "function" if self.peek_next().kind == TokenKind::Identifier => {
                    self.parse_function_declaration()
                }
                "return" => self.parse_return(),
                "class" => self.parse_class(),
                name => match self.registry.statement_parser(name) {
                    Some(parse) => {
                        let keyword = self.next();
                        let stmt = parse(self, keyword)?;
                        self.consume_optional_semicolon();
                        Ok(stmt)
                    }
                    None => self.parse_expression_statement(),
                },
            },
            TokenKind::LBrace => {
                let items = self.parse_block()?;
                Ok(self.stmt(StmtKind::Block(items), token.line))
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// Parses `{ statements }`.
    pub fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.expect(TokenKind::LBrace, "expected `{` to start block")?;
        let mut items = Vec::new();
        loop {
            self.skip_semicolons();
            if self.check(TokenKind::RBrace) || self.check(TokenKind::Eof) {
                break;
            }
            items.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "expected `}` to close block")?;
        Ok(items)
    }

    /// Parses a braced block, or a single statement treated as one.
    pub fn parse_body(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        if self.check(TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let stmt = self.parse_simple_statement()?;
        self.consume_optional_semicolon();
        Ok(stmt)
    }

    /// Parses an assignment or expression statement without consuming a
    /// trailing `;`, as needed inside `for (...)` headers.
    pub fn parse_simple_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let line = self.peek().line;
        let expr = self.parse_expression()?;
        let op = match self.peek().kind {
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusAssign => Some(AssignOp::Add),
            TokenKind::MinusAssign => Some(AssignOp::Sub),
            TokenKind::StarAssign => Some(AssignOp::Mul),
            TokenKind::SlashAssign => Some(AssignOp::Div),
            _ => None,
        };
        let kind = match op {
            Some(op) => {
                let operator = self.next();
                if !is_assignable(&expr) {
                    return Err(self.error(&operator, "invalid assignment target"));
                }
                let value = self.parse_expression()?;
                StmtKind::Assign {
                    target: expr,
                    op,
                    value,
                }
            }
            None => StmtKind::Expr(expr),
        };
        Ok(self.stmt(kind, line))
    }

    fn parse_function_declaration(&mut self) -> Result<Stmt, Diagnostic> {
        let keyword = self.expect_keyword("function")?;
        let name = self.expect_identifier("expected function name")?;
        let function = self.parse_function_rest(Some(name.lexeme), keyword.line)?;
        Ok(self.stmt(StmtKind::Function(Rc::new(function)), keyword.line))
    }

    /// Parses `(params) { body }` after a function's name.
    fn parse_function_rest(
        &mut self,
        name: Option<String>,
        line: usize,
    ) -> Result<FunctionDef, Diagnostic> {
        let (params, rest) = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(FunctionDef {
            name,
            params,
            rest,
            body,
            line,
        })
    }

    fn parse_params(&mut self) -> Result<(Vec<Param>, Option<String>), Diagnostic> {
        self.expect(TokenKind::LParen, "expected `(` to start parameter list")?;
        let mut params = Vec::new();
        let mut rest = None;
        while !self.check(TokenKind::RParen) {
            if self.matches(TokenKind::Ellipsis) {
                let name = self.expect_identifier("expected rest parameter name after `...`")?;
                rest = Some(name.lexeme);
                if !self.check(TokenKind::RParen) {
                    return Err(self.error(self.peek(), "rest parameter must be last"));
                }
                break;
            }
            let name = self.expect_identifier("expected parameter name")?;
            let default = if self.matches(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(Param {
                name: name.lexeme,
                default,
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "expected `)` after parameters")?;
        Ok((params, rest))
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let keyword = self.expect_keyword("return")?;
        let value = if self.at_statement_end(keyword.line) {
            None
        } else {
            let expr = self.parse_expression()?;
            let end = self.previous().line;
            if !self.at_statement_end(end) {
                return Err(self.error(
                    self.peek(),
                    "unexpected token after return value; the value must end its line",
                ));
            }
            Some(expr)
        };
        self.consume_optional_semicolon();
        Ok(self.stmt(StmtKind::Return(value), keyword.line))
    }

    /// True at a terminator or at a token starting a later line than `line`.
    fn at_statement_end(&self, line: usize) -> bool {
        let token = self.peek();
        matches!(
            token.kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) || token.line > line
    }

    fn parse_class(&mut self) -> Result<Stmt, Diagnostic> {
        let keyword = self.expect_keyword("class")?;
        let name = self.expect_identifier("expected class name")?.lexeme;
        let superclass = if self.matches_keyword("extends") {
            Some(
                self.expect_identifier("expected superclass name after `extends`")?
                    .lexeme,
            )
        } else {
            None
        };
        self.expect(TokenKind::LBrace, "expected `{` to start class body")?;

        let mut class = ClassDef {
            name,
            superclass,
            constructor: None,
            fields: Vec::new(),
            methods: Vec::new(),
        };
        loop {
            self.skip_semicolons();
            if self.check(TokenKind::RBrace) || self.check(TokenKind::Eof) {
                break;
            }
            let member = self.next();
            if !matches!(member.kind, TokenKind::Identifier | TokenKind::Keyword) {
                return Err(self.error(&member, "expected class member name"));
            }
            if self.check(TokenKind::LParen) {
                let function = Rc::new(self.parse_function_rest(Some(member.lexeme.clone()), member.line)?);
                if member.lexeme == "constructor" {
                    if class.constructor.is_some() {
                        return Err(self.error(&member, "class has more than one constructor"));
                    }
                    class.constructor = Some(function);
                } else {
                    class.methods.push(function);
                }
            } else if self.matches(TokenKind::Assign) {
                let init = self.parse_expression()?;
                class.fields.push((member.lexeme, init));
            } else if self.at_statement_end(member.line) {
                let init = Expr {
                    kind: ExprKind::Literal(Literal::Null),
                    line: member.line,
                };
                class.fields.push((member.lexeme, init));
            } else {
                return Err(self.error(
                    self.peek(),
                    "expected `(`, `=` or end of line after class member name",
                ));
            }
        }
        self.expect(TokenKind::RBrace, "expected `}` to close class body")?;
        Ok(self.stmt(StmtKind::Class(Rc::new(class)), keyword.line))
    }

    // ----- expressions ------------------------------------------------------

    pub fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, Diagnostic> {
        let condition = self.parse_or()?;
        if self.operator_on_same_line(&[TokenKind::Question]).is_none() {
            return Ok(condition);
        }
        let then_branch = self.parse_expression()?;
        self.expect(TokenKind::Colon, "expected `:` in conditional expression")?;
        let else_branch = self.parse_expression()?;
        Ok(Expr {
            line: condition.line,
            kind: ExprKind::Ternary {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
        })
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_and()?;
        while self.operator_on_same_line(&[TokenKind::OrOr]).is_some() {
            let right = self.parse_and()?;
            expr = logical(LogicalOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_equality()?;
        while self.operator_on_same_line(&[TokenKind::AndAnd]).is_some() {
            let right = self.parse_equality()?;
            expr = logical(LogicalOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        self.binary_level(
            Self::parse_relational,
            &[
                (TokenKind::EqualEqualEqual, BinaryOp::StrictEqual),
                (TokenKind::BangEqualEqual, BinaryOp::StrictNotEqual),
                (TokenKind::EqualEqual, BinaryOp::Equal),
                (TokenKind::BangEqual, BinaryOp::NotEqual),
            ],
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, Diagnostic> {
        self.binary_level(
            Self::parse_additive,
            &[
                (TokenKind::Less, BinaryOp::Less),
                (TokenKind::LessEqual, BinaryOp::LessEqual),
                (TokenKind::Greater, BinaryOp::Greater),
                (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
            ],
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, Diagnostic> {
        self.binary_level(
            Self::parse_multiplicative,
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Diagnostic> {
        self.binary_level(
            Self::parse_unary,
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
        )
    }

    /// One left-associative precedence tier.
    fn binary_level(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, Diagnostic>,
        operators: &[(TokenKind, BinaryOp)],
    ) -> Result<Expr, Diagnostic> {
        let kinds: Vec<TokenKind> = operators.iter().map(|(kind, _)| *kind).collect();
        let mut expr = operand(self)?;
        while let Some(kind) = self.operator_on_same_line(&kinds) {
            let op = operators
                .iter()
                .find(|(candidate, _)| *candidate == kind)
                .map(|(_, op)| *op)
                .ok_or_else(|| self.error(self.previous(), "unknown binary operator"))?;
            let right = operand(self)?;
            expr = Expr {
                line: expr.line,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
            };
        }
        Ok(expr)
    }

    /// Consumes the next token if it is one of `kinds` and sits on the same
    /// line as the end of the left operand. An operator starting a later
    /// line belongs to the next statement.
    fn operator_on_same_line(&mut self, kinds: &[TokenKind]) -> Option<TokenKind> {
        let token = self.peek();
        if !kinds.contains(&token.kind) || token.line > self.previous().line {
            return None;
        }
        Some(self.next().kind)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = match self.peek().kind {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Plus => Some(UnaryOp::Plus),
            _ => None,
        };
        if let Some(op) = op {
            let operator = self.next();
            let operand = self.parse_unary()?;
            return Ok(Expr {
                line: operator.line,
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(operand),
                },
            });
        }
        if self.check_keyword("new") {
            return self.parse_new();
        }
        self.parse_postfix()
    }

    fn parse_new(&mut self) -> Result<Expr, Diagnostic> {
        let keyword = self.expect_keyword("new")?;
        let mut class = self.parse_primary()?;
        while self.operator_on_same_line(&[TokenKind::Dot]).is_some() {
            let property = self.expect_member_name()?;
            class = Expr {
                line: class.line,
                kind: ExprKind::Member {
                    target: Box::new(class),
                    property: property.lexeme,
                },
            };
        }
        let args = if self.operator_on_same_line(&[TokenKind::LParen]).is_some() {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        let expr = Expr {
            line: keyword.line,
            kind: ExprKind::New {
                class: Box::new(class),
                args,
            },
        };
        self.parse_postfix_chain(expr)
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_primary()?;
        self.parse_postfix_chain(expr)
    }

    fn parse_postfix_chain(&mut self, mut expr: Expr) -> Result<Expr, Diagnostic> {
        const POSTFIX: &[TokenKind] = &[
            TokenKind::Dot,
            TokenKind::LBracket,
            TokenKind::LParen,
            TokenKind::PlusPlus,
            TokenKind::MinusMinus,
        ];
        while let Some(kind) = self.operator_on_same_line(POSTFIX) {
            let line = expr.line;
            expr = match kind {
                TokenKind::Dot => {
                    let name = self.expect_member_name()?;
                    if self.check(TokenKind::LParen) && self.peek().line == name.line {
                        self.next();
                        let args = self.parse_arguments()?;
                        Expr {
                            line,
                            kind: ExprKind::MethodCall {
                                receiver: Box::new(expr),
                                method: name.lexeme,
                                args,
                            },
                        }
                    } else {
                        Expr {
                            line,
                            kind: ExprKind::Member {
                                target: Box::new(expr),
                                property: name.lexeme,
                            },
                        }
                    }
                }
                TokenKind::LBracket => {
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "expected `]` after index")?;
                    Expr {
                        line,
                        kind: ExprKind::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                    }
                }
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    Expr {
                        line,
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                    }
                }
                _ => {
                    let op = if kind == TokenKind::PlusPlus {
                        UpdateOp::Increment
                    } else {
                        UpdateOp::Decrement
                    };
                    if !is_assignable(&expr) {
                        return Err(self.error(self.previous(), "invalid update target"));
                    }
                    Expr {
                        line,
                        kind: ExprKind::Update {
                            op,
                            target: Box::new(expr),
                        },
                    }
                }
            };
        }
        Ok(expr)
    }

    /// Parses call arguments after the opening `(`.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) {
            args.push(self.parse_expression()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "expected `)` after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek().clone();
        let line = token.line;
        let literal = |kind| Ok(Expr { kind, line });
        match token.kind {
            TokenKind::Number => {
                self.next();
                match token.value {
                    TokenValue::Number { value, .. } => {
                        literal(ExprKind::Literal(Literal::Number(value)))
                    }
                    _ => Err(self.error(&token, "malformed number token")),
                }
            }
            TokenKind::BigInt => {
                self.next();
                match token.value {
                    TokenValue::BigInt(value) => literal(ExprKind::Literal(Literal::BigInt(value))),
                    _ => Err(self.error(&token, "malformed big integer token")),
                }
            }
            TokenKind::String => {
                self.next();
                match token.value {
                    TokenValue::Str(value) => literal(ExprKind::Literal(Literal::String(value))),
                    _ => Err(self.error(&token, "malformed string token")),
                }
            }
            TokenKind::Template => {
                self.next();
                match token.value {
                    TokenValue::Template(parts) => literal(ExprKind::Template(parts)),
                    _ => Err(self.error(&token, "malformed template token")),
                }
            }
            TokenKind::Keyword => {
                self.next();
                match token.lexeme.as_str() {
                    "true" => literal(ExprKind::Literal(Literal::Bool(true))),
                    "false" => literal(ExprKind::Literal(Literal::Bool(false))),
                    "null" => literal(ExprKind::Literal(Literal::Null)),
                    "function" => {
                        let name = if self.check(TokenKind::Identifier) {
                            Some(self.next().lexeme)
                        } else {
                            None
                        };
                        let function = self.parse_function_rest(name, line)?;
                        literal(ExprKind::Function(Rc::new(function)))
                    }
                    _ => literal(ExprKind::Keyword(token.lexeme)),
                }
            }
            TokenKind::Identifier => {
                self.next();
                if self.check(TokenKind::FatArrow) {
                    let params = vec![Param {
                        name: token.lexeme,
                        default: None,
                    }];
                    return self.parse_arrow_body(params, line);
                }
                literal(ExprKind::Identifier(token.lexeme))
            }
            TokenKind::LParen => {
                if let Some(params) = self.try_arrow_params() {
                    return self.parse_arrow_body(params, line);
                }
                self.next();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "expected `)` after expression")?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_array(),
            TokenKind::LBrace => self.parse_object(),
            TokenKind::Eof => Err(self.error(&token, "unexpected end of input")),
            _ => Err(self.error(&token, &format!("unexpected token `{}`", token.lexeme))),
        }
    }

    /// Tentatively reads `(a, b, ...)` as arrow parameters. Rewinds and
    /// returns `None` unless the list is followed by `=>`.
    fn try_arrow_params(&mut self) -> Option<Vec<Param>> {
        let checkpoint = self.current;
        self.next();
        let mut params = Vec::new();
        while self.check(TokenKind::Identifier) {
            params.push(Param {
                name: self.next().lexeme,
                default: None,
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        if self.matches(TokenKind::RParen) && self.check(TokenKind::FatArrow) {
            return Some(params);
        }
        self.current = checkpoint;
        None
    }

    fn parse_arrow_body(&mut self, params: Vec<Param>, line: usize) -> Result<Expr, Diagnostic> {
        self.expect(TokenKind::FatArrow, "expected `=>`")?;
        let body = if self.check(TokenKind::LBrace) {
            self.parse_block()?
        } else {
            let value = self.parse_expression()?;
            let value_line = value.line;
            vec![self.stmt(StmtKind::Return(Some(value)), value_line)]
        };
        Ok(Expr {
            line,
            kind: ExprKind::Function(Rc::new(FunctionDef {
                name: None,
                params,
                rest: None,
                body,
                line,
            })),
        })
    }

    fn parse_array(&mut self) -> Result<Expr, Diagnostic> {
        let open = self.expect(TokenKind::LBracket, "expected `[`")?;
        let mut elements = Vec::new();
        while !self.check(TokenKind::RBracket) {
            if self.matches(TokenKind::Ellipsis) {
                elements.push(ArrayElement::Spread(self.parse_expression()?));
            } else {
                elements.push(ArrayElement::Item(self.parse_expression()?));
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "expected `]` after array literal")?;
        Ok(Expr {
            line: open.line,
            kind: ExprKind::Array(elements),
        })
    }

    fn parse_object(&mut self) -> Result<Expr, Diagnostic> {
        let open = self.expect(TokenKind::LBrace, "expected `{`")?;
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.matches(TokenKind::Ellipsis) {
                entries.push(ObjectEntry::Spread(self.parse_expression()?));
            } else {
                let key = self.next();
                let name = match (&key.kind, &key.value) {
                    (TokenKind::Identifier | TokenKind::Keyword, _) => key.lexeme.clone(),
                    (TokenKind::String, TokenValue::Str(text)) => text.clone(),
                    (TokenKind::Number, TokenValue::Number { value, .. }) => {
                        crate::value::format_number(*value)
                    }
                    _ => return Err(self.error(&key, "expected property name in object literal")),
                };
                let value = if self.matches(TokenKind::Colon) {
                    self.parse_expression()?
                } else if self.check(TokenKind::LParen) {
                    let function = self.parse_function_rest(Some(name.clone()), key.line)?;
                    Expr {
                        line: key.line,
                        kind: ExprKind::Function(Rc::new(function)),
                    }
                } else if key.kind == TokenKind::Identifier {
                    Expr {
                        line: key.line,
                        kind: ExprKind::Identifier(name.clone()),
                    }
                } else {
                    return Err(self.error(self.peek(), "expected `:` after property name"));
                };
                entries.push(ObjectEntry::Pair(name, value));
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "expected `}` after object literal")?;
        Ok(Expr {
            line: open.line,
            kind: ExprKind::Object(entries),
        })
    }

    // ----- token primitives -------------------------------------------------

    pub fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.current.min(last)]
    }

    /// Token after [`Parser::peek`].
    pub fn peek_next(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.current + 1).min(last)]
    }

    pub fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.current += 1;
        }
        token
    }

    pub fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub fn check_keyword(&self, name: &str) -> bool {
        self.peek().is_keyword(name)
    }

    pub fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    pub fn matches_keyword(&mut self, name: &str) -> bool {
        if self.check_keyword(name) {
            self.next();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.next())
        } else {
            Err(self.error(self.peek(), message))
        }
    }

    pub fn expect_keyword(&mut self, name: &str) -> Result<Token, Diagnostic> {
        if self.check_keyword(name) {
            Ok(self.next())
        } else {
            Err(self.error(self.peek(), &format!("expected keyword `{name}`")))
        }
    }

    pub fn expect_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        self.expect(TokenKind::Identifier, message)
    }

    fn expect_member_name(&mut self) -> Result<Token, Diagnostic> {
        if matches!(self.peek().kind, TokenKind::Identifier | TokenKind::Keyword) {
            Ok(self.next())
        } else {
            Err(self.error(self.peek(), "expected property name after `.`"))
        }
    }

    pub fn consume_optional_semicolon(&mut self) {
        let _ = self.matches(TokenKind::Semicolon);
    }

    fn skip_semicolons(&mut self) {
        while self.matches(TokenKind::Semicolon) {}
    }

    /// Builds a statement tagged with this parser's origin.
    pub fn stmt(&self, kind: StmtKind, line: usize) -> Stmt {
        let mut stmt = Stmt::new(kind, line);
        stmt.origin = self.origin.clone();
        stmt
    }

    pub fn error(&self, token: &Token, message: &str) -> Diagnostic {
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("`{}`", token.lexeme)
        };
        Diagnostic::new(DiagnosticKind::Parse, format!("{message} (found {found})"))
            .with_line(token.line)
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr {
        line: left.line,
        kind: ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Identifier(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
    )
}
