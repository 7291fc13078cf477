//! Compiled units and their executable representation

use std::fmt;
use std::sync::Arc;

use crate::entry::EntryPointError;
use crate::error::Diagnostic;
use crate::parser::ast::{BinaryOp, UnaryOp};
use crate::runtime::Value;

use super::library::{DocumentMethod, NativeFunction};

/// Static type of a parameter or expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    Int,
    Float,
    String,
    Bool,
    List,
    Any,
    Void,
    Document,
    Callback(Vec<Ty>),
}

impl Ty {
    /// `fn(int, string, any)`, the shape of the logging callback
    pub fn log_callback() -> Self {
        Ty::Callback(vec![Ty::Int, Ty::String, Ty::Any])
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Ty::Int),
            "float" => Some(Ty::Float),
            "string" => Some(Ty::String),
            "bool" => Some(Ty::Bool),
            "list" => Some(Ty::List),
            "any" => Some(Ty::Any),
            "Document" => Some(Ty::Document),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int => f.write_str("int"),
            Ty::Float => f.write_str("float"),
            Ty::String => f.write_str("string"),
            Ty::Bool => f.write_str("bool"),
            Ty::List => f.write_str("list"),
            Ty::Any => f.write_str("any"),
            Ty::Void => f.write_str("void"),
            Ty::Document => f.write_str("Document"),
            Ty::Callback(params) => {
                let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "fn({})", params.join(", "))
            }
        }
    }
}

/// Index of a method within its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub(crate) usize);

/// Index of a class within its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) usize);

/// Declared shape of a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub is_static: bool,
    pub params: Vec<(String, Ty)>,
    pub return_type: Ty,
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(name, ty)| format!("{}: {}", name, ty))
            .collect();
        if self.is_static {
            f.write_str("static ")?;
        }
        write!(f, "fn {}({})", self.name, params.join(", "))?;
        if self.return_type != Ty::Void {
            write!(f, " -> {}", self.return_type)?;
        }
        Ok(())
    }
}

/// A class declared in template source
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    /// Dotted path from the outermost class, e.g. `Outer.Inner`
    pub path: String,
    pub nested: bool,
    pub methods: Vec<MethodId>,
}

/// Local variable slot within a call frame
pub(crate) type Slot = usize;

pub(crate) type Block = Vec<Stmt>;

#[derive(Debug, Clone)]
pub(crate) struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum StmtKind {
    Let(Slot, Expr),
    Assign(Slot, Expr),
    Expr(Expr),
    If {
        branches: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
    },
    While(Expr, Block),
    ForEach {
        slot: Slot,
        iterable: Expr,
        body: Block,
    },
    ForRange {
        slot: Slot,
        start: Expr,
        end: Expr,
        body: Block,
    },
    Return(Option<Expr>),
}

#[derive(Debug, Clone)]
pub(crate) struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum ExprKind {
    Const(Value),
    Local(Slot),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    /// Static method of this unit
    CallMethod { method: MethodId, args: Vec<Expr> },
    /// Library function from the reference set
    CallNative {
        function: NativeFunction,
        args: Vec<Expr>,
    },
    /// Callback held in a local, e.g. the log parameter
    CallLocal {
        slot: Slot,
        name: String,
        args: Vec<Expr>,
    },
    /// Method on a receiver statically known to be the document
    CallDocument {
        method: DocumentMethod,
        receiver: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Method on a receiver of unknown type, dispatched at run time
    CallDynamic {
        name: String,
        receiver: Box<Expr>,
        args: Vec<Expr>,
        document: Option<DocumentMethod>,
        native: Option<NativeFunction>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct MethodBody {
    pub signature: MethodSignature,
    pub owner: TypeId,
    pub frame_size: usize,
    pub body: Block,
}

/// Output of a successful compilation, ready to run in this process
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub(crate) name: String,
    pub(crate) types: Vec<TypeInfo>,
    pub(crate) methods: Vec<MethodBody>,
    pub(crate) warnings: Vec<Diagnostic>,
}

impl CompiledUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every declared class, nested ones included
    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    /// Warnings that did not fail the compilation
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub(crate) fn method(&self, id: MethodId) -> &MethodBody {
        &self.methods[id.0]
    }

    pub fn signature(&self, id: MethodId) -> &MethodSignature {
        &self.methods[id.0].signature
    }

    /// Qualified `Type.method` name, used in runtime errors
    pub(crate) fn qualified_name(&self, id: MethodId) -> String {
        let body = self.method(id);
        format!("{}.{}", self.types[body.owner.0].path, body.signature.name)
    }

    /// Load the unit and return its single top-level class
    pub fn into_template_type(self) -> Result<TemplateType, EntryPointError> {
        let top_level: Vec<usize> = self
            .types
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.nested)
            .map(|(i, _)| i)
            .collect();

        match top_level.as_slice() {
            [] => Err(EntryPointError::NoTopLevelType),
            [index] => Ok(TemplateType {
                id: TypeId(*index),
                unit: Arc::new(self),
            }),
            _ => Err(EntryPointError::MultipleTopLevelTypes {
                names: top_level
                    .iter()
                    .map(|i| self.types[*i].name.clone())
                    .collect(),
            }),
        }
    }
}

/// The loaded top-level class of a compiled template
#[derive(Debug, Clone)]
pub struct TemplateType {
    pub(crate) unit: Arc<CompiledUnit>,
    pub(crate) id: TypeId,
}

impl TemplateType {
    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn unit(&self) -> &CompiledUnit {
        &self.unit
    }

    fn info(&self) -> &TypeInfo {
        &self.unit.types[self.id.0]
    }

    /// Methods declared directly on this class
    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &MethodSignature)> {
        self.info()
            .methods
            .iter()
            .map(move |id| (*id, self.unit.signature(*id)))
    }
}
