//! Abstract Syntax Tree types for the template language

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Valid identifier (alphanumeric + underscore, starts with letter/_)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root AST node - a complete template source file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub classes: Vec<Spanned<ClassDecl>>,
}

/// `class Name { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Spanned<Identifier>,
    pub members: Vec<Member>,
}

impl ClassDecl {
    pub fn methods(&self) -> impl Iterator<Item = &Spanned<MethodDecl>> {
        self.members.iter().filter_map(|m| match m {
            Member::Method(method) => Some(method),
            Member::Class(_) => None,
        })
    }

    pub fn nested(&self) -> impl Iterator<Item = &Spanned<ClassDecl>> {
        self.members.iter().filter_map(|m| match m {
            Member::Class(class) => Some(class),
            Member::Method(_) => None,
        })
    }
}

/// Member of a class body
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Method(Spanned<MethodDecl>),
    Class(Spanned<ClassDecl>),
}

/// `[static] fn name(params) [-> Type] { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub is_static: bool,
    pub name: Spanned<Identifier>,
    pub params: Vec<Param>,
    pub return_type: Option<Spanned<TypeExpr>>,
    pub body: Vec<Spanned<Stmt>>,
}

/// `name: Type`
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Spanned<Identifier>,
    pub ty: Spanned<TypeExpr>,
}

/// Type as written in source
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// `int`, `string`, `Document`, ...
    Named(Identifier),
    /// `fn(int, string, any)`
    Callback(Vec<Spanned<TypeExpr>>),
}

impl std::fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeExpr::Named(id) => write!(f, "{}", id),
            TypeExpr::Callback(params) => {
                let params: Vec<String> = params.iter().map(|p| p.node.to_string()).collect();
                write!(f, "fn({})", params.join(", "))
            }
        }
    }
}

/// Statement inside a method body
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let name = value;`
    Let {
        name: Spanned<Identifier>,
        value: Spanned<Expr>,
    },
    /// `name = value;`
    Assign {
        name: Spanned<Identifier>,
        value: Spanned<Expr>,
    },
    /// `expr;`
    Expr(Spanned<Expr>),
    /// `if c { } else if c { } else { }`
    If {
        branches: Vec<(Spanned<Expr>, Vec<Spanned<Stmt>>)>,
        otherwise: Option<Vec<Spanned<Stmt>>>,
    },
    /// `while c { }`
    While {
        condition: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },
    /// `for x in iterable { }`
    For {
        binding: Spanned<Identifier>,
        iterable: ForIterable,
        body: Vec<Spanned<Stmt>>,
    },
    /// `return [value];`
    Return(Option<Spanned<Expr>>),
}

/// What a `for` loop walks over
#[derive(Debug, Clone, PartialEq)]
pub enum ForIterable {
    /// `for x in list`
    Each(Spanned<Expr>),
    /// `for i in start..end` (end exclusive)
    Range(Spanned<Expr>, Spanned<Expr>),
}

/// Literal value in source
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(s)
    }
}

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(Identifier),
    List(Vec<Spanned<Expr>>),
    Unary(UnaryOp, Box<Spanned<Expr>>),
    Binary(BinaryOp, Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    /// `name(args)`
    Call {
        callee: Spanned<Identifier>,
        args: Vec<Spanned<Expr>>,
    },
    /// `receiver.method(args)`; `Type.method(args)` parses to this too
    MethodCall {
        receiver: Box<Spanned<Expr>>,
        method: Spanned<Identifier>,
        args: Vec<Spanned<Expr>>,
    },
    /// `target[index]`
    Index(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
}
