use std::rc::Rc;

use num_bigint::BigInt;

use crate::lexer::TemplatePart;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    BigInt(BigInt),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    StrictEqual,
    StrictNotEqual,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::StrictEqual => "===",
            BinaryOp::StrictNotEqual => "!==",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    /// Binary operator a compound assignment applies before storing.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    /// Evaluated at call time, only when the argument is missing.
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub rest: Option<String>,
    pub body: Vec<Stmt>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub superclass: Option<String>,
    pub constructor: Option<Rc<FunctionDef>>,
    pub fields: Vec<(String, Expr)>,
    pub methods: Vec<Rc<FunctionDef>>,
}

#[derive(Debug, Clone)]
pub enum ArrayElement {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum ObjectEntry {
    Pair(String, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    /// Keyword used in value position, resolved through the registry or
    /// an explicit binding (`this`).
    Keyword(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        property: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    New {
        class: Box<Expr>,
        args: Vec<Expr>,
    },
    Update {
        op: UpdateOp,
        target: Box<Expr>,
    },
    Array(Vec<ArrayElement>),
    Object(Vec<ObjectEntry>),
    Template(Vec<TemplatePart>),
    Function(Rc<FunctionDef>),
}

/// Operand slot of a registered statement form.
#[derive(Debug, Clone)]
pub enum NodePart {
    Expr(Expr),
    Stmt(Box<Stmt>),
    Block(Vec<Stmt>),
    Name(String),
    /// An optional slot the source left out.
    Empty,
}

/// Statement produced by a registered statement parser and run by the
/// executor registered under the same keyword.
#[derive(Debug, Clone)]
pub struct ExtensionNode {
    pub keyword: String,
    pub parts: Vec<NodePart>,
}

impl ExtensionNode {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            parts: Vec::new(),
        }
    }

    pub fn part(mut self, part: NodePart) -> Self {
        self.parts.push(part);
        self
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
    },
    Block(Vec<Stmt>),
    Function(Rc<FunctionDef>),
    Return(Option<Expr>),
    Class(Rc<ClassDef>),
    Extension(ExtensionNode),
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
    /// Name of the source the statement came from, when it is not the
    /// active script.
    pub origin: Option<Rc<str>>,
    pub annotations: Vec<String>,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: usize) -> Self {
        Self {
            kind,
            line,
            origin: None,
            annotations: Vec::new(),
        }
    }
}
