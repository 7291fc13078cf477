//! Name resolution and lowering from the AST to executable IR
//!
//! Runs in two passes: the first declares every class and method signature so
//! calls can refer to methods declared later in the file, the second lowers
//! method bodies while checking names, arities and callability.

use std::collections::{HashMap, HashSet};

use crate::error::{Diagnostic, DiagnosticCode, Span};
use crate::parser::ast::{self, ClassDecl, ForIterable, Literal, MethodDecl, SourceFile, Spanned, TypeExpr};
use crate::runtime::Value;

use super::library::ReferenceSet;
use super::unit::{
    Block, CompiledUnit, Expr, ExprKind, MethodBody, MethodId, MethodSignature, Slot, Stmt,
    StmtKind, Ty, TypeId, TypeInfo,
};

/// Maps byte offsets to 1-based line numbers
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub(crate) fn line(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }
}

struct Local {
    name: String,
    ty: Ty,
    span: Span,
    used: bool,
    warn_unused: bool,
}

/// Locals of the method being lowered; every declaration gets its own slot
struct MethodScope {
    owner: TypeId,
    locals: Vec<Local>,
    scopes: Vec<Vec<Slot>>,
}

impl MethodScope {
    fn new(owner: TypeId) -> Self {
        Self {
            owner,
            locals: Vec::new(),
            scopes: vec![Vec::new()],
        }
    }

    fn lookup(&self, name: &str) -> Option<Slot> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .copied()
            .find(|slot| self.locals[*slot].name == name)
    }

    fn declare(&mut self, name: &str, ty: Ty, span: Span, warn_unused: bool) -> Slot {
        let slot = self.locals.len();
        self.locals.push(Local {
            name: name.to_string(),
            ty,
            span,
            used: false,
            warn_unused,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(slot);
        }
        slot
    }
}

struct Lowerer<'r> {
    refs: &'r ReferenceSet,
    lines: LineIndex,
    diagnostics: Vec<Diagnostic>,
    types: Vec<TypeInfo>,
    signatures: Vec<(MethodSignature, TypeId)>,
    type_names: HashMap<String, Vec<TypeId>>,
}

/// Lower a parsed file; returns the unit together with every diagnostic found
pub(crate) fn lower(
    file: &SourceFile,
    source: &str,
    refs: &ReferenceSet,
    unit_name: &str,
) -> (CompiledUnit, Vec<Diagnostic>) {
    let mut lowerer = Lowerer {
        refs,
        lines: LineIndex::new(source),
        diagnostics: Vec::new(),
        types: Vec::new(),
        signatures: Vec::new(),
        type_names: HashMap::new(),
    };

    let mut pending: Vec<(MethodId, &MethodDecl)> = Vec::new();
    let mut top_level = HashSet::new();
    for class in &file.classes {
        if !top_level.insert(class.node.name.node.as_str()) {
            lowerer.duplicate_class(class);
        }
        lowerer.declare_class(class, None, &mut pending);
    }

    let methods: Vec<MethodBody> = pending
        .into_iter()
        .map(|(id, decl)| lowerer.lower_method(id, decl))
        .collect();

    let unit = CompiledUnit {
        name: unit_name.to_string(),
        types: lowerer.types,
        methods,
        warnings: Vec::new(),
    };
    (unit, lowerer.diagnostics)
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

impl<'r> Lowerer<'r> {
    fn report(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::new(code, message, span));
    }

    fn check_arity(&mut self, name: &str, expected: usize, found: usize, span: &Span) -> bool {
        if expected == found {
            return true;
        }
        self.report(
            DiagnosticCode::ArgumentCount,
            format!(
                "'{}' expects {} argument{}, found {}",
                name,
                expected,
                plural(expected),
                found
            ),
            span.clone(),
        );
        false
    }

    fn duplicate_class(&mut self, class: &Spanned<ClassDecl>) {
        self.report(
            DiagnosticCode::DuplicateDefinition,
            format!("class '{}' is defined more than once", class.node.name.node),
            class.node.name.span.clone(),
        );
    }

    // ── Pass 1: declarations ──────────────────────────────────────

    fn declare_class<'f>(
        &mut self,
        class: &'f Spanned<ClassDecl>,
        parent: Option<&str>,
        pending: &mut Vec<(MethodId, &'f MethodDecl)>,
    ) {
        let name = class.node.name.node.as_str();
        let path = match parent {
            Some(parent) => format!("{}.{}", parent, name),
            None => name.to_string(),
        };
        let id = TypeId(self.types.len());
        self.types.push(TypeInfo {
            name: name.to_string(),
            path: path.clone(),
            nested: parent.is_some(),
            methods: Vec::new(),
        });
        self.type_names.entry(name.to_string()).or_default().push(id);

        let mut seen = HashSet::new();
        for method in class.node.methods() {
            let method_name = method.node.name.node.as_str();
            if !seen.insert(method_name) {
                self.report(
                    DiagnosticCode::DuplicateDefinition,
                    format!("method '{}' is defined more than once in '{}'", method_name, path),
                    method.node.name.span.clone(),
                );
                continue;
            }
            let signature = self.signature(&method.node);
            let method_id = MethodId(self.signatures.len());
            self.signatures.push((signature, id));
            self.types[id.0].methods.push(method_id);
            pending.push((method_id, &method.node));
        }

        let mut nested_names = HashSet::new();
        for nested in class.node.nested() {
            if !nested_names.insert(nested.node.name.node.as_str()) {
                self.duplicate_class(nested);
            }
            self.declare_class(nested, Some(&path), pending);
        }
    }

    fn signature(&mut self, decl: &MethodDecl) -> MethodSignature {
        let mut seen = HashSet::new();
        let mut params = Vec::new();
        for param in &decl.params {
            let name = param.name.node.as_str();
            if !seen.insert(name) {
                self.report(
                    DiagnosticCode::DuplicateDefinition,
                    format!("parameter '{}' is declared more than once", name),
                    param.name.span.clone(),
                );
            }
            params.push((name.to_string(), self.resolve_type(&param.ty)));
        }
        let return_type = match &decl.return_type {
            Some(ty) => self.resolve_type(ty),
            None => Ty::Void,
        };
        MethodSignature {
            name: decl.name.node.as_str().to_string(),
            is_static: decl.is_static,
            params,
            return_type,
        }
    }

    fn resolve_type(&mut self, ty: &Spanned<TypeExpr>) -> Ty {
        match &ty.node {
            TypeExpr::Named(name) => match Ty::from_name(name.as_str()) {
                Some(resolved) if self.refs.provides_type(name.as_str()) => resolved,
                _ => {
                    self.report(
                        DiagnosticCode::UnknownType,
                        format!("unknown type '{}'", name),
                        ty.span.clone(),
                    );
                    Ty::Any
                }
            },
            TypeExpr::Callback(params) => {
                if !self.refs.provides_type("fn") {
                    self.report(
                        DiagnosticCode::UnknownType,
                        format!("unknown type '{}'", ty.node),
                        ty.span.clone(),
                    );
                }
                Ty::Callback(params.iter().map(|p| self.resolve_type(p)).collect())
            }
        }
    }

    fn find_method(&self, owner: TypeId, name: &str) -> Option<MethodId> {
        self.types[owner.0]
            .methods
            .iter()
            .copied()
            .find(|id| self.signatures[id.0].0.name == name)
    }

    // ── Pass 2: bodies ────────────────────────────────────────────

    fn lower_method(&mut self, id: MethodId, decl: &MethodDecl) -> MethodBody {
        let (signature, owner) = self.signatures[id.0].clone();
        let mut scope = MethodScope::new(owner);
        for ((name, ty), param) in signature.params.iter().zip(&decl.params) {
            scope.declare(name, ty.clone(), param.name.span.clone(), false);
        }
        let body = self.lower_block(&decl.body, &mut scope);
        MethodBody {
            signature,
            owner,
            frame_size: scope.locals.len(),
            body,
        }
    }

    fn lower_block(&mut self, stmts: &[Spanned<ast::Stmt>], scope: &mut MethodScope) -> Block {
        scope.scopes.push(Vec::new());
        let mut out = Vec::with_capacity(stmts.len());
        let mut returned = false;
        let mut warned = false;
        for stmt in stmts {
            if returned && !warned {
                self.report(
                    DiagnosticCode::UnreachableCode,
                    "unreachable statement",
                    stmt.span.clone(),
                );
                warned = true;
            }
            out.push(self.lower_stmt(stmt, scope));
            if matches!(stmt.node, ast::Stmt::Return(_)) {
                returned = true;
            }
        }
        self.close_scope(scope);
        out
    }

    fn close_scope(&mut self, scope: &mut MethodScope) {
        let Some(slots) = scope.scopes.pop() else {
            return;
        };
        for slot in slots {
            let local = &scope.locals[slot];
            if local.warn_unused && !local.used {
                let (name, span) = (local.name.clone(), local.span.clone());
                self.report(
                    DiagnosticCode::UnusedVariable,
                    format!("unused variable '{}'", name),
                    span,
                );
            }
        }
    }

    fn lower_stmt(&mut self, stmt: &Spanned<ast::Stmt>, scope: &mut MethodScope) -> Stmt {
        let line = self.lines.line(stmt.span.start);
        let kind = match &stmt.node {
            ast::Stmt::Let { name, value } => {
                let (value, ty) = self.lower_expr(value, scope);
                let warn_unused = !name.node.as_str().starts_with('_');
                let slot = scope.declare(name.node.as_str(), ty, name.span.clone(), warn_unused);
                StmtKind::Let(slot, value)
            }
            ast::Stmt::Assign { name, value } => {
                let (value, ty) = self.lower_expr(value, scope);
                match scope.lookup(name.node.as_str()) {
                    Some(slot) => {
                        if scope.locals[slot].ty != ty {
                            scope.locals[slot].ty = Ty::Any;
                        }
                        StmtKind::Assign(slot, value)
                    }
                    None => {
                        self.report(
                            DiagnosticCode::UndeclaredAssignment,
                            format!(
                                "cannot assign to undeclared variable '{}'; declare it with 'let'",
                                name.node
                            ),
                            name.span.clone(),
                        );
                        StmtKind::Expr(value)
                    }
                }
            }
            ast::Stmt::Expr(expr) => StmtKind::Expr(self.lower_expr(expr, scope).0),
            ast::Stmt::If {
                branches,
                otherwise,
            } => {
                let branches = branches
                    .iter()
                    .map(|(condition, body)| {
                        let condition = self.lower_expr(condition, scope).0;
                        (condition, self.lower_block(body, scope))
                    })
                    .collect();
                let otherwise = otherwise
                    .as_ref()
                    .map(|body| self.lower_block(body, scope));
                StmtKind::If {
                    branches,
                    otherwise,
                }
            }
            ast::Stmt::While { condition, body } => {
                let condition = self.lower_expr(condition, scope).0;
                StmtKind::While(condition, self.lower_block(body, scope))
            }
            ast::Stmt::For {
                binding,
                iterable,
                body,
            } => {
                let (iterable, binding_ty) = match iterable {
                    ForIterable::Each(items) => (Ok(self.lower_expr(items, scope).0), Ty::Any),
                    ForIterable::Range(start, end) => {
                        let start = self.lower_expr(start, scope).0;
                        let end = self.lower_expr(end, scope).0;
                        (Err((start, end)), Ty::Int)
                    }
                };
                scope.scopes.push(Vec::new());
                let slot = scope.declare(binding.node.as_str(), binding_ty, binding.span.clone(), false);
                let body = self.lower_block(body, scope);
                self.close_scope(scope);
                match iterable {
                    Ok(iterable) => StmtKind::ForEach {
                        slot,
                        iterable,
                        body,
                    },
                    Err((start, end)) => StmtKind::ForRange {
                        slot,
                        start,
                        end,
                        body,
                    },
                }
            }
            ast::Stmt::Return(value) => {
                StmtKind::Return(value.as_ref().map(|v| self.lower_expr(v, scope).0))
            }
        };
        Stmt { kind, line }
    }

    fn lower_args(&mut self, args: &[Spanned<ast::Expr>], scope: &mut MethodScope) -> Vec<Expr> {
        args.iter().map(|a| self.lower_expr(a, scope).0).collect()
    }

    fn lower_expr(&mut self, expr: &Spanned<ast::Expr>, scope: &mut MethodScope) -> (Expr, Ty) {
        let line = self.lines.line(expr.span.start);
        let (kind, ty) = match &expr.node {
            ast::Expr::Literal(literal) => match literal {
                Literal::Null => (ExprKind::Const(Value::Null), Ty::Any),
                Literal::Bool(b) => (ExprKind::Const(Value::Bool(*b)), Ty::Bool),
                Literal::Int(n) => (ExprKind::Const(Value::Int(*n)), Ty::Int),
                Literal::Float(n) => (ExprKind::Const(Value::Float(*n)), Ty::Float),
                Literal::String(s) => (ExprKind::Const(Value::Str(s.clone())), Ty::String),
            },
            ast::Expr::Ident(name) => match scope.lookup(name.as_str()) {
                Some(slot) => {
                    scope.locals[slot].used = true;
                    (ExprKind::Local(slot), scope.locals[slot].ty.clone())
                }
                None => {
                    self.report(
                        DiagnosticCode::UnknownVariable,
                        format!("unknown variable '{}'", name),
                        expr.span.clone(),
                    );
                    (ExprKind::Const(Value::Null), Ty::Any)
                }
            },
            ast::Expr::List(items) => (ExprKind::List(self.lower_args(items, scope)), Ty::List),
            ast::Expr::Unary(op, inner) => {
                let (inner, inner_ty) = self.lower_expr(inner, scope);
                let ty = match op {
                    ast::UnaryOp::Not => Ty::Bool,
                    ast::UnaryOp::Neg => match inner_ty {
                        Ty::Int | Ty::Float => inner_ty,
                        _ => Ty::Any,
                    },
                };
                (ExprKind::Unary(*op, Box::new(inner)), ty)
            }
            ast::Expr::Binary(op, lhs, rhs) => {
                let (lhs, lhs_ty) = self.lower_expr(lhs, scope);
                let (rhs, rhs_ty) = self.lower_expr(rhs, scope);
                let ty = binary_type(*op, &lhs_ty, &rhs_ty);
                (ExprKind::Binary(*op, Box::new(lhs), Box::new(rhs)), ty)
            }
            ast::Expr::Index(target, index) => {
                let target = self.lower_expr(target, scope).0;
                let index = self.lower_expr(index, scope).0;
                (ExprKind::Index(Box::new(target), Box::new(index)), Ty::Any)
            }
            ast::Expr::Call { callee, args } => self.lower_call(callee, args, scope),
            ast::Expr::MethodCall {
                receiver,
                method,
                args,
            } => self.lower_method_call(receiver, method, args, scope),
        };
        (Expr { kind, line }, ty)
    }

    fn lower_call(
        &mut self,
        callee: &Spanned<ast::Identifier>,
        args: &[Spanned<ast::Expr>],
        scope: &mut MethodScope,
    ) -> (ExprKind, Ty) {
        let name = callee.node.as_str();
        let lowered = self.lower_args(args, scope);
        let failed = (ExprKind::Const(Value::Null), Ty::Any);

        if let Some(slot) = scope.lookup(name) {
            scope.locals[slot].used = true;
            let ty = scope.locals[slot].ty.clone();
            return match ty {
                Ty::Callback(params) => {
                    if !self.check_arity(name, params.len(), lowered.len(), &callee.span) {
                        return failed;
                    }
                    let call = ExprKind::CallLocal {
                        slot,
                        name: name.to_string(),
                        args: lowered,
                    };
                    (call, Ty::Void)
                }
                Ty::Any => {
                    let call = ExprKind::CallLocal {
                        slot,
                        name: name.to_string(),
                        args: lowered,
                    };
                    (call, Ty::Any)
                }
                other => {
                    self.report(
                        DiagnosticCode::NotCallable,
                        format!("'{}' has type {} and cannot be called", name, other),
                        callee.span.clone(),
                    );
                    failed
                }
            };
        }

        if let Some(method) = self.find_method(scope.owner, name) {
            return self.static_call(method, name, lowered, &callee.span);
        }

        if let Some(function) = self.refs.function(name) {
            if !self.check_arity(name, function.params, lowered.len(), &callee.span) {
                return failed;
            }
            return (
                ExprKind::CallNative {
                    function,
                    args: lowered,
                },
                Ty::Any,
            );
        }

        let message = if self.refs.document_method(name).is_some() {
            format!(
                "unknown function '{}'; it is a document method, call it on the document",
                name
            )
        } else {
            format!("unknown function '{}'", name)
        };
        self.report(DiagnosticCode::UnknownFunction, message, callee.span.clone());
        failed
    }

    fn static_call(
        &mut self,
        method: MethodId,
        display_name: &str,
        args: Vec<Expr>,
        span: &Span,
    ) -> (ExprKind, Ty) {
        let signature = self.signatures[method.0].0.clone();
        let failed = (ExprKind::Const(Value::Null), Ty::Any);
        if !signature.is_static {
            self.report(
                DiagnosticCode::InstanceMethodCall,
                format!(
                    "'{}' is an instance method and cannot be called without an instance",
                    display_name
                ),
                span.clone(),
            );
            return failed;
        }
        if !self.check_arity(display_name, signature.params.len(), args.len(), span) {
            return failed;
        }
        (ExprKind::CallMethod { method, args }, signature.return_type)
    }

    fn lower_method_call(
        &mut self,
        receiver: &Spanned<ast::Expr>,
        method: &Spanned<ast::Identifier>,
        args: &[Spanned<ast::Expr>],
        scope: &mut MethodScope,
    ) -> (ExprKind, Ty) {
        let name = method.node.as_str();
        let failed = (ExprKind::Const(Value::Null), Ty::Any);

        // `Type.method(...)` when the receiver names a class rather than a local
        if let ast::Expr::Ident(type_name) = &receiver.node {
            let class = self.type_names.get(type_name.as_str()).and_then(|ids| ids.first().copied());
            if let (None, Some(class)) = (scope.lookup(type_name.as_str()), class) {
                let lowered = self.lower_args(args, scope);
                let display_name = format!("{}.{}", type_name, name);
                return match self.find_method(class, name) {
                    Some(id) => self.static_call(id, &display_name, lowered, &method.span),
                    None => {
                        self.report(
                            DiagnosticCode::UnknownFunction,
                            format!("unknown function '{}'", display_name),
                            method.span.clone(),
                        );
                        failed
                    }
                };
            }
        }

        let (receiver, receiver_ty) = self.lower_expr(receiver, scope);
        let lowered = self.lower_args(args, scope);

        match receiver_ty {
            Ty::Document => match self.refs.document_method(name) {
                Some(document_method) => {
                    if !self.check_arity(name, document_method.params, lowered.len(), &method.span) {
                        return failed;
                    }
                    (
                        ExprKind::CallDocument {
                            method: document_method,
                            receiver: Box::new(receiver),
                            args: lowered,
                        },
                        Ty::Void,
                    )
                }
                None => {
                    self.report(
                        DiagnosticCode::UnknownDocumentMethod,
                        format!("Document has no method '{}'", name),
                        method.span.clone(),
                    );
                    failed
                }
            },
            Ty::Any => {
                let document = self.refs.document_method(name);
                let native = self.refs.function(name);
                if document.is_none() && native.is_none() {
                    self.report(
                        DiagnosticCode::UnknownFunction,
                        format!("unknown method '{}'", name),
                        method.span.clone(),
                    );
                    return failed;
                }
                let document = document.filter(|m| m.params == lowered.len());
                let native = native.filter(|f| f.params == lowered.len() + 1);
                if document.is_none() && native.is_none() {
                    self.report(
                        DiagnosticCode::ArgumentCount,
                        format!(
                            "no method '{}' takes {} argument{}",
                            name,
                            lowered.len(),
                            plural(lowered.len())
                        ),
                        method.span.clone(),
                    );
                    return failed;
                }
                (
                    ExprKind::CallDynamic {
                        name: name.to_string(),
                        receiver: Box::new(receiver),
                        args: lowered,
                        document,
                        native,
                    },
                    Ty::Any,
                )
            }
            other => match self.refs.function(name) {
                Some(function) => {
                    // The receiver is passed as the first argument
                    if !self.check_arity(name, function.params.saturating_sub(1), lowered.len(), &method.span) {
                        return failed;
                    }
                    let mut all = Vec::with_capacity(lowered.len() + 1);
                    all.push(receiver);
                    all.extend(lowered);
                    (
                        ExprKind::CallNative {
                            function,
                            args: all,
                        },
                        Ty::Any,
                    )
                }
                None => {
                    self.report(
                        DiagnosticCode::UnknownFunction,
                        format!("unknown method '{}' on a value of type {}", name, other),
                        method.span.clone(),
                    );
                    failed
                }
            },
        }
    }
}

/// Static result type of a binary operation, `Any` when unknown
fn binary_type(op: ast::BinaryOp, lhs: &Ty, rhs: &Ty) -> Ty {
    use ast::BinaryOp::*;
    match op {
        Eq | NotEq | Less | LessEq | Greater | GreaterEq | And | Or => Ty::Bool,
        Add if *lhs == Ty::String || *rhs == Ty::String => Ty::String,
        Add if *lhs == Ty::List && *rhs == Ty::List => Ty::List,
        Add | Sub | Mul | Div | Rem => match (lhs, rhs) {
            (Ty::Int, Ty::Int) => Ty::Int,
            (Ty::Int | Ty::Float, Ty::Int | Ty::Float) => Ty::Float,
            _ => Ty::Any,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::library::LibraryCatalog;
    use crate::parser::parse;

    fn lower_source(source: &str) -> (CompiledUnit, Vec<Diagnostic>) {
        let file = parse(source).expect("Should parse");
        let refs = LibraryCatalog::standard().references().unwrap();
        lower(&file, source, &refs, "template-test")
    }

    fn codes(source: &str) -> Vec<DiagnosticCode> {
        lower_source(source).1.iter().map(|d| d.code).collect()
    }

    fn in_method(body: &str) -> String {
        format!(
            "class T {{\n static fn fill(document: Document, log: fn(int, string, any)) {{\n{}\n }}\n}}",
            body
        )
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("a\nbc\n\nd");
        assert_eq!(index.line(0), 1);
        assert_eq!(index.line(2), 2);
        assert_eq!(index.line(3), 2);
        assert_eq!(index.line(5), 3);
        assert_eq!(index.line(6), 4);
    }

    #[test]
    fn test_clean_template_has_no_diagnostics() {
        let source = in_method(
            r#"let name = "World";
            document.heading(1, "Hello " + name);
            log(1, "name", name);"#,
        );
        assert_eq!(codes(&source), vec![]);
    }

    #[test]
    fn test_unknown_variable() {
        assert_eq!(
            codes(&in_method("document.paragraph(missing);")),
            vec![DiagnosticCode::UnknownVariable]
        );
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            codes(&in_method("frobnicate(1);")),
            vec![DiagnosticCode::UnknownFunction]
        );
    }

    #[test]
    fn test_single_argument_log_against_three_argument_callback() {
        let (_, diagnostics) = lower_source(&in_method("log(1);"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::ArgumentCount);
        assert_eq!(diagnostics[0].message, "'log' expects 3 arguments, found 1");
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            codes("class T { static fn f(w: Widget) { } }"),
            vec![DiagnosticCode::UnknownType]
        );
    }

    #[test]
    fn test_duplicates() {
        assert_eq!(
            codes("class T { static fn f() { } static fn f() { } }"),
            vec![DiagnosticCode::DuplicateDefinition]
        );
        assert_eq!(
            codes("class T { static fn f(a: int, a: int) { } }"),
            vec![DiagnosticCode::DuplicateDefinition]
        );
    }

    #[test]
    fn test_unknown_document_method() {
        assert_eq!(
            codes(&in_method("document.explode();")),
            vec![DiagnosticCode::UnknownDocumentMethod]
        );
    }

    #[test]
    fn test_instance_method_call() {
        let source = r#"class T {
            fn helper() { }
            static fn f() { helper(); }
        }"#;
        assert_eq!(codes(source), vec![DiagnosticCode::InstanceMethodCall]);
    }

    #[test]
    fn test_not_callable() {
        assert_eq!(
            codes(&in_method("let n = 1;\nn();")),
            vec![DiagnosticCode::NotCallable]
        );
    }

    #[test]
    fn test_undeclared_assignment() {
        assert_eq!(
            codes(&in_method("total = 1;")),
            vec![DiagnosticCode::UndeclaredAssignment]
        );
    }

    #[test]
    fn test_warnings() {
        assert_eq!(
            codes(&in_method("let unused = 1;\nlet _ignored = 2;")),
            vec![DiagnosticCode::UnusedVariable]
        );
        assert_eq!(
            codes(&in_method("return;\ndocument.page_break();")),
            vec![DiagnosticCode::UnreachableCode]
        );
    }

    #[test]
    fn test_qualified_static_call_and_nested_types() {
        let source = r#"class T {
            static fn fill(document: Document, log: fn(int, string, any)) {
                document.paragraph(Helpers.twice(2));
            }
            class Helpers {
                static fn twice(x: int) -> int { return x * 2; }
            }
        }"#;
        let (unit, diagnostics) = lower_source(source);
        assert_eq!(diagnostics, vec![]);
        assert_eq!(unit.types().len(), 2);
        assert_eq!(unit.types()[1].path, "T.Helpers");
        assert!(unit.types()[1].nested);
    }

    #[test]
    fn test_method_call_on_value_uses_library_function() {
        let source = in_method(r#"let name = "x";
            document.paragraph(name.upper());
            document.paragraph(name.pad_left(3, 4));"#);
        assert_eq!(codes(&source), vec![DiagnosticCode::ArgumentCount]);
    }

    #[test]
    fn test_missing_log_type_library() {
        let file = parse("class T { static fn f(log: fn(any)) { } }").unwrap();
        let catalog = LibraryCatalog::standard();
        let refs = crate::compiler::library::ReferenceSet::resolve(&catalog, &["playground"]).unwrap();
        let (_, diagnostics) = lower(&file, "", &refs, "template-test");
        assert_eq!(
            diagnostics.iter().map(|d| d.code).collect::<Vec<_>>(),
            vec![DiagnosticCode::UnknownType]
        );
    }

    #[test]
    fn test_binary_types() {
        assert_eq!(binary_type(ast::BinaryOp::Add, &Ty::String, &Ty::Int), Ty::String);
        assert_eq!(binary_type(ast::BinaryOp::Add, &Ty::Int, &Ty::Int), Ty::Int);
        assert_eq!(binary_type(ast::BinaryOp::Mul, &Ty::Int, &Ty::Float), Ty::Float);
        assert_eq!(binary_type(ast::BinaryOp::Less, &Ty::Any, &Ty::Any), Ty::Bool);
        assert_eq!(binary_type(ast::BinaryOp::Sub, &Ty::Any, &Ty::Int), Ty::Any);
    }
}
