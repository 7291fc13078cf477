//! Execution of compiled units
//!
//! A [`Machine`] walks the lowered method bodies of one [`CompiledUnit`]. The
//! document and the logging callback are borrowed for the duration of a single
//! entry point invocation.

mod value;

pub use value::Value;

use thiserror::Error;

use crate::compiler::library::{MAX_LIST_LEN, MAX_TEXT_LEN};
use crate::compiler::unit::{Block, CompiledUnit, Expr, ExprKind, MethodId, StmtKind};
use crate::document::Document;
use crate::parser::ast::{BinaryOp, UnaryOp};

/// Nested template calls allowed before execution is aborted
pub const MAX_CALL_DEPTH: usize = 256;

/// A template failed while running
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{method} (line {line}): {message}")]
pub struct RuntimeError {
    /// Qualified `Type.method` the failure happened in
    pub method: String,
    pub line: usize,
    pub message: String,
}

/// Receives `(line, text, value)` for every log call
pub type LogSink<'a> = dyn FnMut(i64, &str, &Value) + 'a;

enum Flow {
    Next,
    Return(Value),
}

struct Frame {
    method: MethodId,
    locals: Vec<Value>,
}

pub(crate) struct Machine<'a, 'l> {
    unit: &'a CompiledUnit,
    document: &'a mut dyn Document,
    log: &'a mut LogSink<'l>,
    depth: usize,
}

impl<'a, 'l> Machine<'a, 'l> {
    pub(crate) fn new(
        unit: &'a CompiledUnit,
        document: &'a mut dyn Document,
        log: &'a mut LogSink<'l>,
    ) -> Self {
        Self {
            unit,
            document,
            log,
            depth: 0,
        }
    }

    /// Run a method with already evaluated arguments
    pub(crate) fn invoke(&mut self, method: MethodId, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let unit = self.unit;
        let body = unit.method(method);
        let mut locals = args;
        locals.resize(body.frame_size.max(locals.len()), Value::Null);
        let mut frame = Frame { method, locals };

        self.depth += 1;
        let result = self.exec_block(&mut frame, &body.body);
        self.depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Null),
        }
    }

    fn error(&self, frame: &Frame, line: usize, message: impl Into<String>) -> RuntimeError {
        RuntimeError {
            method: self.unit.qualified_name(frame.method),
            line,
            message: message.into(),
        }
    }

    fn exec_block(&mut self, frame: &mut Frame, block: &Block) -> Result<Flow, RuntimeError> {
        for stmt in block {
            let line = stmt.line;
            match &stmt.kind {
                StmtKind::Let(slot, value) | StmtKind::Assign(slot, value) => {
                    frame.locals[*slot] = self.eval(frame, value)?;
                }
                StmtKind::Expr(expr) => {
                    self.eval(frame, expr)?;
                }
                StmtKind::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = None;
                    for (condition, body) in branches {
                        if self.condition(frame, condition)? {
                            taken = Some(body);
                            break;
                        }
                    }
                    if let Some(body) = taken.or(otherwise.as_ref()) {
                        if let Flow::Return(value) = self.exec_block(frame, body)? {
                            return Ok(Flow::Return(value));
                        }
                    }
                }
                StmtKind::While(condition, body) => {
                    while self.condition(frame, condition)? {
                        if let Flow::Return(value) = self.exec_block(frame, body)? {
                            return Ok(Flow::Return(value));
                        }
                    }
                }
                StmtKind::ForEach {
                    slot,
                    iterable,
                    body,
                } => {
                    let items = match self.eval(frame, iterable)? {
                        Value::List(items) => items,
                        Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                        other => {
                            return Err(self.error(
                                frame,
                                line,
                                format!("cannot iterate over {}", other.type_name()),
                            ))
                        }
                    };
                    for item in items {
                        frame.locals[*slot] = item;
                        if let Flow::Return(value) = self.exec_block(frame, body)? {
                            return Ok(Flow::Return(value));
                        }
                    }
                }
                StmtKind::ForRange {
                    slot,
                    start,
                    end,
                    body,
                } => {
                    let start = self.eval_int(frame, start)?;
                    let end = self.eval_int(frame, end)?;
                    for i in start..end {
                        frame.locals[*slot] = Value::Int(i);
                        if let Flow::Return(value) = self.exec_block(frame, body)? {
                            return Ok(Flow::Return(value));
                        }
                    }
                }
                StmtKind::Return(value) => {
                    let value = match value {
                        Some(expr) => self.eval(frame, expr)?,
                        None => Value::Null,
                    };
                    return Ok(Flow::Return(value));
                }
            }
        }
        Ok(Flow::Next)
    }

    fn condition(&mut self, frame: &mut Frame, expr: &Expr) -> Result<bool, RuntimeError> {
        match self.eval(frame, expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(self.error(
                frame,
                expr.line,
                format!("condition must be bool, found {}", other.type_name()),
            )),
        }
    }

    fn eval_int(&mut self, frame: &mut Frame, expr: &Expr) -> Result<i64, RuntimeError> {
        let value = self.eval(frame, expr)?;
        value.as_int().ok_or_else(|| {
            self.error(
                frame,
                expr.line,
                format!("expected int, found {}", value.type_name()),
            )
        })
    }

    fn eval_all(&mut self, frame: &mut Frame, exprs: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|e| self.eval(frame, e)).collect()
    }

    fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> Result<Value, RuntimeError> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Const(value) => Ok(value.clone()),
            ExprKind::Local(slot) => Ok(frame.locals[*slot].clone()),
            ExprKind::List(items) => Ok(Value::List(self.eval_all(frame, items)?)),
            ExprKind::Unary(op, inner) => {
                let value = self.eval(frame, inner)?;
                unary(*op, value).map_err(|msg| self.error(frame, line, msg))
            }
            ExprKind::Binary(BinaryOp::And, lhs, rhs) => {
                Ok(Value::Bool(self.condition(frame, lhs)? && self.condition(frame, rhs)?))
            }
            ExprKind::Binary(BinaryOp::Or, lhs, rhs) => {
                Ok(Value::Bool(self.condition(frame, lhs)? || self.condition(frame, rhs)?))
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = self.eval(frame, lhs)?;
                let rhs = self.eval(frame, rhs)?;
                binary(*op, lhs, rhs).map_err(|msg| self.error(frame, line, msg))
            }
            ExprKind::Index(target, index) => {
                let target = self.eval(frame, target)?;
                let index = self.eval(frame, index)?;
                index_value(&target, &index).map_err(|msg| self.error(frame, line, msg))
            }
            ExprKind::CallMethod { method, args } => {
                let args = self.eval_all(frame, args)?;
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(self.error(
                        frame,
                        line,
                        format!("call depth exceeded {} nested calls", MAX_CALL_DEPTH),
                    ));
                }
                self.invoke(*method, args)
            }
            ExprKind::CallNative { function, args } => {
                let args = self.eval_all(frame, args)?;
                (function.call)(&args)
                    .map_err(|msg| self.error(frame, line, format!("{}: {}", function.name, msg)))
            }
            ExprKind::CallLocal { slot, name, args } => {
                let args = self.eval_all(frame, args)?;
                match &frame.locals[*slot] {
                    Value::Log => self.call_log(frame, line, name, &args),
                    other => Err(self.error(
                        frame,
                        line,
                        format!("'{}' of type {} is not callable", name, other.type_name()),
                    )),
                }
            }
            ExprKind::CallDocument {
                method,
                receiver,
                args,
            } => {
                let receiver = self.eval(frame, receiver)?;
                let args = self.eval_all(frame, args)?;
                if receiver != Value::Document {
                    return Err(self.error(
                        frame,
                        line,
                        format!("expected Document, found {}", receiver.type_name()),
                    ));
                }
                (method.call)(&mut *self.document, &args)
                    .map_err(|msg| self.error(frame, line, format!("{}: {}", method.name, msg)))
            }
            ExprKind::CallDynamic {
                name,
                receiver,
                args,
                document,
                native,
            } => {
                let receiver = self.eval(frame, receiver)?;
                let args = self.eval_all(frame, args)?;
                if receiver == Value::Document {
                    if let Some(method) = document {
                        return (method.call)(&mut *self.document, &args)
                            .map_err(|msg| self.error(frame, line, format!("{}: {}", name, msg)));
                    }
                }
                match native {
                    Some(function) => {
                        let mut all = Vec::with_capacity(args.len() + 1);
                        all.push(receiver);
                        all.extend(args);
                        (function.call)(&all)
                            .map_err(|msg| self.error(frame, line, format!("{}: {}", name, msg)))
                    }
                    None => Err(self.error(
                        frame,
                        line,
                        format!("{} has no method '{}'", receiver.type_name(), name),
                    )),
                }
            }
        }
    }

    fn call_log(
        &mut self,
        frame: &Frame,
        line: usize,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match args {
            [Value::Int(at), Value::Str(text), value] => {
                (self.log)(*at, text.as_str(), value);
                Ok(Value::Null)
            }
            _ => {
                let found: Vec<&str> = args.iter().map(Value::type_name).collect();
                Err(self.error(
                    frame,
                    line,
                    format!(
                        "'{}' expects (int, string, any), found ({})",
                        name,
                        found.join(", ")
                    ),
                ))
            }
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, String> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, other) => Err(format!("cannot negate {}", other.type_name())),
        (UnaryOp::Not, other) => Err(format!("'!' expects bool, found {}", other.type_name())),
    }
}

fn checked(result: Option<i64>) -> Result<Value, String> {
    result
        .map(Value::Int)
        .ok_or_else(|| "integer overflow".to_string())
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, String> {
    use BinaryOp::*;

    match op {
        Eq => return Ok(Value::Bool(lhs.loosely_equals(&rhs))),
        NotEq => return Ok(Value::Bool(!lhs.loosely_equals(&rhs))),
        _ => {}
    }

    match (op, &lhs, &rhs) {
        (Add, Value::Str(_), _) | (Add, _, Value::Str(_)) => {
            let joined = format!("{}{}", lhs, rhs);
            if joined.len() > MAX_TEXT_LEN {
                return Err(format!("string too large (limit {})", MAX_TEXT_LEN));
            }
            return Ok(Value::Str(joined));
        }
        (Add, Value::List(a), Value::List(b)) => {
            if a.len().saturating_add(b.len()) > MAX_LIST_LEN {
                return Err(format!("list too large (limit {})", MAX_LIST_LEN));
            }
            return Ok(Value::List(a.iter().chain(b).cloned().collect()));
        }
        (Less | LessEq | Greater | GreaterEq, Value::Str(a), Value::Str(b)) => {
            return Ok(Value::Bool(compare(op, a.cmp(b))))
        }
        _ => {}
    }

    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            match op {
                Add => checked(a.checked_add(b)),
                Sub => checked(a.checked_sub(b)),
                Mul => checked(a.checked_mul(b)),
                Div | Rem if b == 0 => Err("division by zero".to_string()),
                Div => checked(a.checked_div(b)),
                Rem => checked(a.checked_rem(b)),
                _ => Ok(Value::Bool(compare(op, a.cmp(&b)))),
            }
        }
        _ => match (lhs.as_float(), rhs.as_float()) {
            (Some(a), Some(b)) => match op {
                Add => Ok(Value::Float(a + b)),
                Sub => Ok(Value::Float(a - b)),
                Mul => Ok(Value::Float(a * b)),
                Div => Ok(Value::Float(a / b)),
                Rem => Ok(Value::Float(a % b)),
                _ => a
                    .partial_cmp(&b)
                    .map(|ordering| Value::Bool(compare(op, ordering)))
                    .ok_or_else(|| "cannot compare NaN".to_string()),
            },
            _ => Err(format!(
                "cannot apply '{}' to {} and {}",
                op,
                lhs.type_name(),
                rhs.type_name()
            )),
        },
    }
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> bool {
    match op {
        BinaryOp::Less => ordering.is_lt(),
        BinaryOp::LessEq => ordering.is_le(),
        BinaryOp::Greater => ordering.is_gt(),
        _ => ordering.is_ge(),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, String> {
    let i = index
        .as_int()
        .ok_or_else(|| format!("index must be int, found {}", index.type_name()))?;
    let position = usize::try_from(i).map_err(|_| format!("index {} is negative", i))?;
    match target {
        Value::List(items) => items
            .get(position)
            .cloned()
            .ok_or_else(|| format!("index {} out of range for list of length {}", i, items.len())),
        Value::Str(s) => s
            .chars()
            .nth(position)
            .map(|c| Value::Str(c.to_string()))
            .ok_or_else(|| format!("index {} out of range for string", i)),
        other => Err(format!("cannot index into {}", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, Compiler, InProcessCompiler, LibraryCatalog};
    use crate::document::TextDocument;

    /// Compile `body` into a `fill` entry point, run it and return (log, document text)
    fn run(body: &str) -> Result<(Vec<String>, String), RuntimeError> {
        let source = format!(
            "class T {{\n static fn fill(document: Document, log: fn(int, string, any)) {{\n{}\n }}\n{}\n}}",
            body, HELPERS
        );
        let refs = LibraryCatalog::standard().references().unwrap();
        let unit = InProcessCompiler
            .compile(&source, &refs, &CompileOptions::default())
            .unwrap_or_else(|e| panic!("compile failed: {}", e));
        let fill = unit
            .types()[0]
            .methods
            .iter()
            .copied()
            .find(|id| unit.signature(*id).name == "fill")
            .unwrap();

        let mut document = TextDocument::new();
        let mut entries = Vec::new();
        let mut sink = |line: i64, text: &str, value: &Value| {
            entries.push(format!("#{}: {}: {}", line, text, value));
        };
        Machine::new(&unit, &mut document, &mut sink)
            .invoke(fill, vec![Value::Document, Value::Log])?;
        Ok((entries, document.to_text()))
    }

    const HELPERS: &str = r#"
 static fn fact(n: int) -> int {
   if n <= 1 { return 1; }
   return n * fact(n - 1);
 }
 static fn forever(n: int) -> int { return forever(n + 1); }
"#;

    #[test]
    fn test_log_receives_line_text_and_value() {
        let (log, _) = run(r#"log(7, "1 + 2", 1 + 2);"#).unwrap();
        assert_eq!(log, vec!["#7: 1 + 2: 3"]);
    }

    #[test]
    fn test_document_calls() {
        let (_, text) = run(r#"document.heading(1, "Title");
            for i in 0..2 { document.row([i, i * 10]); }"#)
        .unwrap();
        assert_eq!(text, "# Title\n| 0 | 0 |\n| 1 | 10 |\n");
    }

    #[test]
    fn test_control_flow_and_recursion() {
        let (log, _) = run(r#"let total = 0;
            let items = [1, 2, 3, 4];
            for item in items { if item % 2 == 0 { total = total + item; } }
            let i = 0;
            while i < 3 { i = i + 1; }
            log(1, "x", [total, i, fact(5)]);"#)
        .unwrap();
        assert_eq!(log, vec!["#1: x: [6, 3, 120]"]);
    }

    #[test]
    fn test_string_concatenation_and_library_calls() {
        let (log, _) = run(r#"let name = "ada";
            log(1, "n", name.upper() + " " + len(name) + " " + 1.5);"#)
        .unwrap();
        assert_eq!(log, vec!["#1: n: ADA 3 1.5"]);
    }

    #[test]
    fn test_division_by_zero_names_method_and_line() {
        let err = run("let zero = 0;\nlog(1, \"x\", 1 / zero);").unwrap_err();
        assert_eq!(err.method, "T.fill");
        assert_eq!(err.line, 4);
        assert_eq!(err.message, "division by zero");
    }

    #[test]
    fn test_condition_must_be_bool() {
        let err = run("if 1 { }").unwrap_err();
        assert_eq!(err.message, "condition must be bool, found int");
    }

    #[test]
    fn test_index_out_of_range() {
        let err = run("let l = [1];\nlog(1, \"x\", l[3]);").unwrap_err();
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn test_call_depth_is_limited() {
        let err = run("log(1, \"x\", forever(0));").unwrap_err();
        assert!(err.message.contains("call depth"));
        assert_eq!(err.method, "T.forever");
    }

    #[test]
    fn test_library_failure_is_reported() {
        let err = run(r#"fail("no data");"#).unwrap_err();
        assert_eq!(err.message, "fail: no data");
    }

    #[test]
    fn test_oversized_library_results_are_errors() {
        let err = run("log(1, \"x\", repeat(\"ab\", 9223372036854775807));").unwrap_err();
        assert!(err.message.starts_with("repeat: "), "{}", err.message);
        assert!(err.message.contains("too large"));

        let err = run("for i in range(0, 9223372036854775807) { }").unwrap_err();
        assert!(err.message.contains("too large"), "{}", err.message);
    }

    #[test]
    fn test_growing_values_hit_a_limit() {
        let err = run("let s = \"a\";\nwhile true { s = s + s; }").unwrap_err();
        assert!(err.message.contains("string too large"), "{}", err.message);

        let err = run("let l = [1];\nwhile true { l = l + l; }").unwrap_err();
        assert!(err.message.contains("list too large"), "{}", err.message);
    }

    #[test]
    fn test_binary_operations() {
        assert_eq!(binary(BinaryOp::Add, Value::Int(1), Value::Float(0.5)), Ok(Value::Float(1.5)));
        assert_eq!(binary(BinaryOp::Less, "a".into(), "b".into()), Ok(Value::Bool(true)));
        assert_eq!(
            binary(BinaryOp::Add, Value::Int(i64::MAX), Value::Int(1)),
            Err("integer overflow".to_string())
        );
        assert!(binary(BinaryOp::Sub, Value::Bool(true), Value::Int(1)).is_err());
    }
}
