use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    diagnostics::{Diagnostic, DiagnosticKind},
    registry::KeywordSet,
};

/// Extended-Latin punctuation that looks like an identifier character but
/// is rejected outright.
const BLACKLISTED_CODE_POINTS: &[char] = &['\u{00D7}', '\u{00F7}'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    BigInt,
    String,
    Template,
    Annotation,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Ellipsis,
    Colon,
    Semicolon,
    Question,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Bang,
    BangEqual,
    BangEqualEqual,
    EqualEqual,
    EqualEqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AndAnd,
    OrOr,
    FatArrow,
    Eof,
}

/// Piece of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    /// Raw, unparsed source of a `${...}` span and the line it starts on.
    Code { source: String, line: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Number { value: f64, decimal: bool },
    BigInt(BigInt),
    Str(String),
    Template(Vec<TemplatePart>),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub value: TokenValue,
}

impl Token {
    pub fn is_keyword(&self, name: &str) -> bool {
        self.kind == TokenKind::Keyword && self.lexeme == name
    }
}

/// Convenience wrapper lexing `source` from line 1.
pub fn tokenize(source: &str, keywords: &KeywordSet) -> Result<Vec<Token>, Diagnostic> {
    Lexer::new(source, keywords).tokenize()
}

pub struct Lexer<'a> {
    source: &'a str,
    keywords: &'a KeywordSet,
    chars: std::str::CharIndices<'a>,
    current: usize,
    peeked: Option<(usize, char)>,
    line: usize,
    brackets: Vec<(char, usize)>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, keywords: &'a KeywordSet) -> Self {
        Self {
            source,
            keywords,
            chars: source.char_indices(),
            current: 0,
            peeked: None,
            line: 1,
            brackets: Vec::new(),
        }
    }

    /// Starts line numbering at `line`, used for template spans lexed apart
    /// from their enclosing script.
    pub fn starting_at(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = match self.peeked.take() {
            Some(pair) => Some(pair),
            None => self.chars.next(),
        };
        if let Some((idx, ch)) = next {
            self.current = idx + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
            }
        }
        next
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn peek_char(&mut self) -> Option<char> {
        self.peek().map(|(_, ch)| ch)
    }

    fn peek_second(&mut self) -> Option<char> {
        self.peek();
        self.chars.clone().next().map(|(_, ch)| ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>, line: usize) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Lex, message).with_line(line)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Diagnostic> {
        loop {
            match (self.peek_char(), self.peek_second()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.peek_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let opened = self.line;
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some((_, ch)) = self.bump() {
                        if ch == '*' && self.match_next('/') {
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(self.error(
                            format!("unterminated block comment opened on line {opened}"),
                            opened,
                        ));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize, line: usize, value: TokenValue) -> Token {
        Token {
            kind,
            lexeme: self.source[start..self.current].to_string(),
            line,
            value,
        }
    }

    fn simple_token(&self, start: usize, kind: TokenKind) -> Token {
        self.token(kind, start, self.line, TokenValue::None)
    }

    fn identifier_or_keyword(&mut self, start: usize) -> Result<Token, Diagnostic> {
        while let Some(ch) = self.peek_char() {
            if BLACKLISTED_CODE_POINTS.contains(&ch) {
                return Err(self.illegal_character(ch));
            }
            if !is_identifier_continue(ch) {
                break;
            }
            self.bump();
        }
        let lexeme = &self.source[start..self.current];
        let kind = if self.keywords.contains(lexeme) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        Ok(self.simple_token(start, kind))
    }

    fn annotation(&mut self, start: usize) -> Result<Token, Diagnostic> {
        match self.peek_char() {
            Some(ch) if is_identifier_start(ch) => {}
            _ => return Err(self.error("expected annotation name after `@`", self.line)),
        }
        while let Some(ch) = self.peek_char() {
            if !is_identifier_continue(ch) {
                break;
            }
            self.bump();
        }
        let name = self.source[start + 1..self.current].to_string();
        Ok(self.token(
            TokenKind::Annotation,
            start,
            self.line,
            TokenValue::Str(name),
        ))
    }

    fn collect_digits(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut digits = String::new();
        while let Some(ch) = self.peek_char() {
            if ch == '_' {
                self.bump();
            } else if accept(ch) {
                digits.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        digits
    }

    fn number_literal(&mut self, start: usize, first: char) -> Result<Token, Diagnostic> {
        let line = self.line;
        let radix = match (first, self.peek_char()) {
            ('0', Some('x' | 'X')) => Some(16),
            ('0', Some('o' | 'O')) => Some(8),
            ('0', Some('b' | 'B')) => Some(2),
            _ => None,
        };

        let token = if let Some(radix) = radix {
            self.bump();
            let digits = self.collect_digits(|ch| ch.is_digit(radix));
            if digits.is_empty() {
                return Err(self.error("malformed number literal: missing digits", line));
            }
            let big = BigInt::parse_bytes(digits.as_bytes(), radix)
                .ok_or_else(|| self.error("malformed number literal", line))?;
            if self.match_next('n') {
                self.token(TokenKind::BigInt, start, line, TokenValue::BigInt(big))
            } else {
                let value = big.to_f64().unwrap_or(f64::INFINITY);
                self.token(
                    TokenKind::Number,
                    start,
                    line,
                    TokenValue::Number {
                        value,
                        decimal: false,
                    },
                )
            }
        } else {
            let mut text = String::from(first);
            text.push_str(&self.collect_digits(|ch| ch.is_ascii_digit()));
            let mut decimal = false;
            if self.peek_char() == Some('.') && matches!(self.peek_second(), Some(d) if d.is_ascii_digit())
            {
                self.bump();
                decimal = true;
                text.push('.');
                text.push_str(&self.collect_digits(|ch| ch.is_ascii_digit()));
            }
            if matches!(self.peek_char(), Some('e' | 'E'))
                && matches!(self.peek_second(), Some(c) if c.is_ascii_digit() || c == '+' || c == '-')
            {
                self.bump();
                decimal = true;
                text.push('e');
                if let Some(sign @ ('+' | '-')) = self.peek_char() {
                    self.bump();
                    text.push(sign);
                }
                let exponent = self.collect_digits(|ch| ch.is_ascii_digit());
                if exponent.is_empty() {
                    return Err(self.error("malformed number literal: empty exponent", line));
                }
                text.push_str(&exponent);
            }
            if self.peek_char() == Some('n') {
                if decimal {
                    return Err(self.error(
                        "big integer literal cannot have a fraction or exponent",
                        line,
                    ));
                }
                self.bump();
                let big = BigInt::parse_bytes(text.as_bytes(), 10)
                    .ok_or_else(|| self.error("malformed big integer literal", line))?;
                self.token(TokenKind::BigInt, start, line, TokenValue::BigInt(big))
            } else {
                let value: f64 = text
                    .parse()
                    .map_err(|_| self.error(format!("malformed number literal `{text}`"), line))?;
                self.token(
                    TokenKind::Number,
                    start,
                    line,
                    TokenValue::Number { value, decimal },
                )
            }
        };

        if let Some(ch) = self.peek_char() {
            if is_identifier_continue(ch) {
                return Err(self.error(
                    format!("invalid character `{ch}` after number literal"),
                    self.line,
                ));
            }
        }
        Ok(token)
    }

    fn escape(&mut self, opened: usize) -> Result<char, Diagnostic> {
        match self.bump() {
            Some((_, 'n')) => Ok('\n'),
            Some((_, 't')) => Ok('\t'),
            Some((_, 'r')) => Ok('\r'),
            Some((_, '0')) => Ok('\0'),
            Some((_, other)) => Ok(other),
            None => Err(self.error("unterminated escape sequence", opened)),
        }
    }

    fn string_literal(&mut self, start: usize, quote: char) -> Result<Token, Diagnostic> {
        let opened = self.line;
        let mut value = String::new();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return Err(self
                        .error("unterminated string literal", opened)
                        .with_note("use a template string for multi-line text"));
                }
                Some(ch) if ch == quote => {
                    self.bump();
                    return Ok(self.token(
                        TokenKind::String,
                        start,
                        opened,
                        TokenValue::Str(value),
                    ));
                }
                Some('\\') => {
                    self.bump();
                    value.push(self.escape(opened)?);
                }
                Some(ch) => {
                    self.bump();
                    value.push(ch);
                }
            }
        }
    }

    fn template_literal(&mut self, start: usize) -> Result<Token, Diagnostic> {
        let opened = self.line;
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            let Some((_, ch)) = self.bump() else {
                return Err(self.error(
                    format!("unterminated template string opened on line {opened}"),
                    opened,
                ));
            };
            match ch {
                '`' => break,
                '\\' => text.push(self.escape(opened)?),
                '$' if self.peek_char() == Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let line = self.line;
                    let source = self.template_span(opened)?;
                    parts.push(TemplatePart::Code { source, line });
                }
                other => text.push(other),
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(self.token(
            TokenKind::Template,
            start,
            opened,
            TokenValue::Template(parts),
        ))
    }

    /// Captures the raw source of a `${...}` span up to its matching brace.
    fn template_span(&mut self, opened: usize) -> Result<String, Diagnostic> {
        let mut depth = 1usize;
        let mut source = String::new();
        let mut quote: Option<char> = None;
        loop {
            let Some((_, ch)) = self.bump() else {
                return Err(self.error(
                    format!("unterminated template string opened on line {opened}"),
                    opened,
                ));
            };
            if let Some(q) = quote {
                source.push(ch);
                if ch == '\\' {
                    if let Some((_, escaped)) = self.bump() {
                        source.push(escaped);
                    }
                } else if ch == q {
                    quote = None;
                }
                continue;
            }
            match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    source.push(ch);
                }
                '{' => {
                    depth += 1;
                    source.push(ch);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(source);
                    }
                    source.push(ch);
                }
                _ => source.push(ch),
            }
        }
    }

    fn open_bracket(&mut self, start: usize, ch: char, kind: TokenKind) -> Token {
        self.brackets.push((ch, self.line));
        self.simple_token(start, kind)
    }

    fn close_bracket(&mut self, start: usize, ch: char, kind: TokenKind) -> Result<Token, Diagnostic> {
        match self.brackets.pop() {
            Some((open, _)) if closer_for(open) == ch => Ok(self.simple_token(start, kind)),
            Some((open, line)) => Err(self.error(
                format!(
                    "expected `{}` to close `{open}` opened on line {line}, found `{ch}`",
                    closer_for(open)
                ),
                self.line,
            )),
            None => Err(self.error(format!("unexpected closing `{ch}`"), self.line)),
        }
    }

    fn illegal_character(&self, ch: char) -> Diagnostic {
        self.error(
            format!("illegal character `{ch}` (U+{:04X})", ch as u32),
            self.line,
        )
    }

    /// Picks the longest operator starting with `first`.
    fn operator(&mut self, start: usize, first: char) -> Result<Token, Diagnostic> {
        use TokenKind as K;
        let kind = match first {
            '.' => {
                if self.peek_char() == Some('.') && self.peek_second() == Some('.') {
                    self.bump();
                    self.bump();
                    K::Ellipsis
                } else {
                    K::Dot
                }
            }
            '=' => {
                if self.match_next('=') {
                    if self.match_next('=') {
                        K::EqualEqualEqual
                    } else {
                        K::EqualEqual
                    }
                } else if self.match_next('>') {
                    K::FatArrow
                } else {
                    K::Assign
                }
            }
            '!' => {
                if self.match_next('=') {
                    if self.match_next('=') {
                        K::BangEqualEqual
                    } else {
                        K::BangEqual
                    }
                } else {
                    K::Bang
                }
            }
            '<' => {
                if self.match_next('=') {
                    K::LessEqual
                } else {
                    K::Less
                }
            }
            '>' => {
                if self.match_next('=') {
                    K::GreaterEqual
                } else {
                    K::Greater
                }
            }
            '&' if self.match_next('&') => K::AndAnd,
            '|' if self.match_next('|') => K::OrOr,
            '+' => {
                if self.match_next('+') {
                    K::PlusPlus
                } else if self.match_next('=') {
                    K::PlusAssign
                } else {
                    K::Plus
                }
            }
            '-' => {
                if self.match_next('-') {
                    K::MinusMinus
                } else if self.match_next('=') {
                    K::MinusAssign
                } else {
                    K::Minus
                }
            }
            '*' => {
                if self.match_next('=') {
                    K::StarAssign
                } else {
                    K::Star
                }
            }
            '/' => {
                if self.match_next('=') {
                    K::SlashAssign
                } else {
                    K::Slash
                }
            }
            '%' => K::Percent,
            ',' => K::Comma,
            ':' => K::Colon,
            ';' => K::Semicolon,
            '?' => K::Question,
            other => return Err(self.illegal_character(other)),
        };
        Ok(self.simple_token(start, kind))
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let Some((start, ch)) = self.bump() else {
                if let Some((open, line)) = self.brackets.pop() {
                    return Err(self.error(
                        format!("expected `{}` to close `{open}`", closer_for(open)),
                        line,
                    ));
                }
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    line: self.line,
                    value: TokenValue::None,
                });
                break;
            };

            let token = match ch {
                '(' => self.open_bracket(start, ch, TokenKind::LParen),
                '{' => self.open_bracket(start, ch, TokenKind::LBrace),
                '[' => self.open_bracket(start, ch, TokenKind::LBracket),
                ')' => self.close_bracket(start, ch, TokenKind::RParen)?,
                '}' => self.close_bracket(start, ch, TokenKind::RBrace)?,
                ']' => self.close_bracket(start, ch, TokenKind::RBracket)?,
                '"' | '\'' => self.string_literal(start, ch)?,
                '`' => self.template_literal(start)?,
                '@' => self.annotation(start)?,
                '0'..='9' => self.number_literal(start, ch)?,
                c if BLACKLISTED_CODE_POINTS.contains(&c) => {
                    return Err(self.illegal_character(c));
                }
                c if is_identifier_start(c) => self.identifier_or_keyword(start)?,
                _ => self.operator(start, ch)?,
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic()
        || ch == '_'
        || (ch as u32 >= 0xC0 && !BLACKLISTED_CODE_POINTS.contains(&ch))
}

fn is_identifier_continue(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_ascii_digit()
}
