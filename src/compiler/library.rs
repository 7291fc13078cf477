//! Capability libraries visible to template source
//!
//! A template can only use the functions and types provided by the libraries
//! in its [`ReferenceSet`]. The set is computed from two anchor libraries:
//! the playground runtime itself and the template namespace marker. Every
//! library they reference, directly or transitively, is made visible once.

use std::collections::HashSet;

use thiserror::Error;

use crate::document::Document;
use crate::runtime::Value;

/// Host function callable from templates
pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

/// Document operation callable from templates; receives the entry point's document
pub type DocumentFn = fn(&mut dyn Document, &[Value]) -> Result<Value, String>;

/// Anchor for the playground runtime
pub const RUNTIME_ANCHOR: &str = "playground";

/// Anchor for the template namespace
pub const TEMPLATE_ANCHOR: &str = "template";

/// Errors raised while computing a reference set
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("library '{referrer}' references unknown library '{name}'")]
    UnknownLibrary { referrer: String, name: String },

    #[error("unknown anchor library '{name}'")]
    UnknownAnchor { name: String },
}

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub params: usize,
    pub call: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.params)
    }
}

#[derive(Clone, Copy)]
pub struct DocumentMethod {
    pub name: &'static str,
    pub params: usize,
    pub call: DocumentFn,
}

impl std::fmt::Debug for DocumentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Document.{}/{}", self.name, self.params)
    }
}

/// A named capability module
#[derive(Debug, Clone, Copy)]
pub struct Library {
    pub name: &'static str,
    /// Libraries this one depends on
    pub references: &'static [&'static str],
    /// Type names this library makes available
    pub types: &'static [&'static str],
    pub functions: &'static [NativeFunction],
    pub document_methods: &'static [DocumentMethod],
}

/// All libraries a host knows about
#[derive(Debug, Clone)]
pub struct LibraryCatalog {
    libraries: Vec<Library>,
}

impl Default for LibraryCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl LibraryCatalog {
    /// The libraries shipped with the playground
    pub fn standard() -> Self {
        Self {
            libraries: vec![
                PLAYGROUND, TEMPLATE, CORE, TEXT, COLLECTIONS, DOCUMENT, LOGGING,
            ],
        }
    }

    /// Add or replace a library
    pub fn with_library(mut self, library: Library) -> Self {
        self.libraries.retain(|l| l.name != library.name);
        self.libraries.push(library);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Library> {
        self.libraries.iter().find(|l| l.name == name)
    }

    /// Compute the reference set for the standard anchors
    pub fn references(&self) -> Result<ReferenceSet, ReferenceError> {
        ReferenceSet::resolve(self, &[RUNTIME_ANCHOR, TEMPLATE_ANCHOR])
    }
}

/// Libraries visible to one compilation, deduplicated by name
#[derive(Debug, Clone)]
pub struct ReferenceSet {
    libraries: Vec<Library>,
}

impl ReferenceSet {
    /// Collect everything the anchors reference, breadth first, each library once
    pub fn resolve(catalog: &LibraryCatalog, anchors: &[&str]) -> Result<Self, ReferenceError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: Vec<(&str, &str)> = Vec::new();

        for anchor in anchors {
            let library = catalog.get(anchor).ok_or_else(|| ReferenceError::UnknownAnchor {
                name: anchor.to_string(),
            })?;
            queue.extend(library.references.iter().map(|r| (library.name, *r)));
        }

        let mut libraries = Vec::new();
        let mut next = 0;
        while next < queue.len() {
            let (referrer, name) = queue[next];
            next += 1;
            if !seen.insert(name) {
                continue;
            }
            let library = catalog
                .get(name)
                .ok_or_else(|| ReferenceError::UnknownLibrary {
                    referrer: referrer.to_string(),
                    name: name.to_string(),
                })?;
            queue.extend(library.references.iter().map(|r| (library.name, *r)));
            libraries.push(*library);
        }

        Ok(Self { libraries })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.libraries.iter().map(|l| l.name).collect()
    }

    pub fn provides_type(&self, name: &str) -> bool {
        self.libraries.iter().any(|l| l.types.contains(&name))
    }

    /// First function with this name, in reference order
    pub fn function(&self, name: &str) -> Option<NativeFunction> {
        self.libraries
            .iter()
            .flat_map(|l| l.functions.iter())
            .find(|f| f.name == name)
            .copied()
    }

    pub fn document_method(&self, name: &str) -> Option<DocumentMethod> {
        self.libraries
            .iter()
            .flat_map(|l| l.document_methods.iter())
            .find(|m| m.name == name)
            .copied()
    }
}

// ── Library definitions ───────────────────────────────────────────

const PLAYGROUND: Library = Library {
    name: RUNTIME_ANCHOR,
    references: &["core", "text", "collections"],
    types: &[],
    functions: &[],
    document_methods: &[],
};

const TEMPLATE: Library = Library {
    name: TEMPLATE_ANCHOR,
    references: &["document", "logging", "core"],
    types: &[],
    functions: &[],
    document_methods: &[],
};

const CORE: Library = Library {
    name: "core",
    references: &[],
    types: &["int", "float", "string", "bool", "list", "any"],
    functions: &[
        NativeFunction { name: "len", params: 1, call: core_len },
        NativeFunction { name: "str", params: 1, call: core_str },
        NativeFunction { name: "int", params: 1, call: core_int },
        NativeFunction { name: "float", params: 1, call: core_float },
        NativeFunction { name: "contains", params: 2, call: core_contains },
        NativeFunction { name: "min", params: 2, call: core_min },
        NativeFunction { name: "max", params: 2, call: core_max },
        NativeFunction { name: "abs", params: 1, call: core_abs },
        NativeFunction { name: "fail", params: 1, call: core_fail },
    ],
    document_methods: &[],
};

const TEXT: Library = Library {
    name: "text",
    references: &["core"],
    types: &[],
    functions: &[
        NativeFunction { name: "upper", params: 1, call: text_upper },
        NativeFunction { name: "lower", params: 1, call: text_lower },
        NativeFunction { name: "trim", params: 1, call: text_trim },
        NativeFunction { name: "starts_with", params: 2, call: text_starts_with },
        NativeFunction { name: "replace", params: 3, call: text_replace },
        NativeFunction { name: "split", params: 2, call: text_split },
        NativeFunction { name: "join", params: 2, call: text_join },
        NativeFunction { name: "repeat", params: 2, call: text_repeat },
        NativeFunction { name: "pad_left", params: 2, call: text_pad_left },
        NativeFunction { name: "pad_right", params: 2, call: text_pad_right },
        NativeFunction { name: "format_number", params: 2, call: text_format_number },
    ],
    document_methods: &[],
};

const COLLECTIONS: Library = Library {
    name: "collections",
    references: &["core"],
    types: &[],
    functions: &[
        NativeFunction { name: "push", params: 2, call: list_push },
        NativeFunction { name: "first", params: 1, call: list_first },
        NativeFunction { name: "last", params: 1, call: list_last },
        NativeFunction { name: "sum", params: 1, call: list_sum },
        NativeFunction { name: "reverse", params: 1, call: list_reverse },
        NativeFunction { name: "sort", params: 1, call: list_sort },
        NativeFunction { name: "range", params: 2, call: list_range },
    ],
    document_methods: &[],
};

const DOCUMENT: Library = Library {
    name: "document",
    references: &["core"],
    types: &["Document"],
    functions: &[],
    document_methods: &[
        DocumentMethod { name: "heading", params: 2, call: doc_heading },
        DocumentMethod { name: "paragraph", params: 1, call: doc_paragraph },
        DocumentMethod { name: "row", params: 1, call: doc_row },
        DocumentMethod { name: "page_break", params: 0, call: doc_page_break },
    ],
};

const LOGGING: Library = Library {
    name: "logging",
    references: &["core"],
    types: &["fn"],
    functions: &[],
    document_methods: &[],
};

// ── Argument helpers ──────────────────────────────────────────────

fn expect_str(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected string, found {}", value.type_name()))
}

fn expect_int(value: &Value) -> Result<i64, String> {
    value
        .as_int()
        .ok_or_else(|| format!("expected int, found {}", value.type_name()))
}

fn expect_number(value: &Value) -> Result<f64, String> {
    value
        .as_float()
        .ok_or_else(|| format!("expected number, found {}", value.type_name()))
}

fn expect_list(value: &Value) -> Result<&[Value], String> {
    value
        .as_list()
        .ok_or_else(|| format!("expected list, found {}", value.type_name()))
}

fn expect_width(value: &Value) -> Result<usize, String> {
    let n = expect_int(value)?;
    usize::try_from(n).map_err(|_| format!("width must not be negative, got {}", n))
}

/// Largest string a builtin will produce, in bytes
pub(crate) const MAX_TEXT_LEN: usize = 16 * 1024 * 1024;

/// Largest list a builtin will produce
pub(crate) const MAX_LIST_LEN: usize = 1024 * 1024;

/// Largest precision accepted by `format_number`
const MAX_PRECISION: usize = 64;

fn check_size(size: Option<usize>, limit: usize, what: &str) -> Result<usize, String> {
    match size {
        Some(size) if size <= limit => Ok(size),
        _ => Err(format!("{} too large (limit {})", what, limit)),
    }
}

// ── core ──────────────────────────────────────────────────────────

fn core_len(args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        other => Err(format!("cannot take length of {}", other.type_name())),
    }
}

fn core_str(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Str(args[0].to_string()))
}

fn core_int(args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("'{}' is not an integer", s)),
        other => Err(format!("cannot convert {} to int", other.type_name())),
    }
}

fn core_float(args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("'{}' is not a number", s)),
        other => expect_number(other).map(Value::Float),
    }
}

fn core_contains(args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Str(s) => Ok(Value::Bool(s.contains(expect_str(&args[1])?))),
        Value::List(items) => Ok(Value::Bool(
            items.iter().any(|item| item.loosely_equals(&args[1])),
        )),
        other => Err(format!("cannot search in {}", other.type_name())),
    }
}

fn core_min(args: &[Value]) -> Result<Value, String> {
    let (a, b) = (expect_number(&args[0])?, expect_number(&args[1])?);
    Ok(if b < a { args[1].clone() } else { args[0].clone() })
}

fn core_max(args: &[Value]) -> Result<Value, String> {
    let (a, b) = (expect_number(&args[0])?, expect_number(&args[1])?);
    Ok(if b > a { args[1].clone() } else { args[0].clone() })
}

fn core_abs(args: &[Value]) -> Result<Value, String> {
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(format!("expected number, found {}", other.type_name())),
    }
}

fn core_fail(args: &[Value]) -> Result<Value, String> {
    Err(args[0].to_string())
}

// ── text ──────────────────────────────────────────────────────────

fn text_upper(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Str(expect_str(&args[0])?.to_uppercase()))
}

fn text_lower(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Str(expect_str(&args[0])?.to_lowercase()))
}

fn text_trim(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Str(expect_str(&args[0])?.trim().to_string()))
}

fn text_starts_with(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(
        expect_str(&args[0])?.starts_with(expect_str(&args[1])?),
    ))
}

fn text_replace(args: &[Value]) -> Result<Value, String> {
    let s = expect_str(&args[0])?;
    Ok(Value::Str(
        s.replace(expect_str(&args[1])?, expect_str(&args[2])?),
    ))
}

fn text_split(args: &[Value]) -> Result<Value, String> {
    let s = expect_str(&args[0])?;
    let sep = expect_str(&args[1])?;
    if sep.is_empty() {
        return Err("separator must not be empty".to_string());
    }
    Ok(Value::List(s.split(sep).map(Value::from).collect()))
}

fn text_join(args: &[Value]) -> Result<Value, String> {
    let items = expect_list(&args[0])?;
    let sep = expect_str(&args[1])?;
    let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
    Ok(Value::Str(parts.join(sep)))
}

fn text_repeat(args: &[Value]) -> Result<Value, String> {
    let s = expect_str(&args[0])?;
    let count = expect_width(&args[1])?;
    check_size(s.len().checked_mul(count), MAX_TEXT_LEN, "repeated text")?;
    Ok(Value::Str(s.repeat(count)))
}

fn pad_width(value: &Value) -> Result<usize, String> {
    check_size(Some(expect_width(value)?), MAX_TEXT_LEN, "padding width")
}

fn text_pad_left(args: &[Value]) -> Result<Value, String> {
    let s = args[0].to_string();
    Ok(Value::Str(format!("{:>width$}", s, width = pad_width(&args[1])?)))
}

fn text_pad_right(args: &[Value]) -> Result<Value, String> {
    let s = args[0].to_string();
    Ok(Value::Str(format!("{:<width$}", s, width = pad_width(&args[1])?)))
}

fn text_format_number(args: &[Value]) -> Result<Value, String> {
    let n = expect_number(&args[0])?;
    let prec = check_size(Some(expect_width(&args[1])?), MAX_PRECISION, "precision")?;
    Ok(Value::Str(format!("{:.prec$}", n, prec = prec)))
}

// ── collections ───────────────────────────────────────────────────

fn list_push(args: &[Value]) -> Result<Value, String> {
    let mut items = expect_list(&args[0])?.to_vec();
    items.push(args[1].clone());
    Ok(Value::List(items))
}

fn list_first(args: &[Value]) -> Result<Value, String> {
    Ok(expect_list(&args[0])?.first().cloned().unwrap_or(Value::Null))
}

fn list_last(args: &[Value]) -> Result<Value, String> {
    Ok(expect_list(&args[0])?.last().cloned().unwrap_or(Value::Null))
}

fn list_sum(args: &[Value]) -> Result<Value, String> {
    let items = expect_list(&args[0])?;
    if items.iter().all(|v| matches!(v, Value::Int(_))) {
        let mut total: i64 = 0;
        for item in items {
            total = total
                .checked_add(expect_int(item)?)
                .ok_or_else(|| "integer overflow".to_string())?;
        }
        return Ok(Value::Int(total));
    }
    let mut total = 0.0;
    for item in items {
        total += expect_number(item)?;
    }
    Ok(Value::Float(total))
}

fn list_reverse(args: &[Value]) -> Result<Value, String> {
    let mut items = expect_list(&args[0])?.to_vec();
    items.reverse();
    Ok(Value::List(items))
}

fn list_sort(args: &[Value]) -> Result<Value, String> {
    let items = expect_list(&args[0])?;
    if items.iter().all(|v| v.as_float().is_some()) {
        let mut sorted = items.to_vec();
        sorted.sort_by(|a, b| {
            let (a, b) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
            a.total_cmp(&b)
        });
        return Ok(Value::List(sorted));
    }
    if items.iter().all(|v| v.as_str().is_some()) {
        let mut sorted = items.to_vec();
        sorted.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        return Ok(Value::List(sorted));
    }
    Err("can only sort lists of numbers or lists of strings".to_string())
}

fn list_range(args: &[Value]) -> Result<Value, String> {
    let (start, end) = (expect_int(&args[0])?, expect_int(&args[1])?);
    let len = usize::try_from(i128::from(end) - i128::from(start)).unwrap_or(0);
    check_size(Some(len), MAX_LIST_LEN, "range")?;
    Ok(Value::List((start..end).map(Value::Int).collect()))
}

// ── document ──────────────────────────────────────────────────────

fn doc_heading(doc: &mut dyn Document, args: &[Value]) -> Result<Value, String> {
    doc.add_heading(expect_int(&args[0])?, &args[1].to_string());
    Ok(Value::Null)
}

fn doc_paragraph(doc: &mut dyn Document, args: &[Value]) -> Result<Value, String> {
    doc.add_paragraph(&args[0].to_string());
    Ok(Value::Null)
}

fn doc_row(doc: &mut dyn Document, args: &[Value]) -> Result<Value, String> {
    let cells: Vec<String> = expect_list(&args[0])?
        .iter()
        .map(|v| v.to_string())
        .collect();
    doc.add_row(&cells);
    Ok(Value::Null)
}

fn doc_page_break(doc: &mut dyn Document, _args: &[Value]) -> Result<Value, String> {
    doc.page_break();
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_set_is_transitive_and_deduplicated() {
        let refs = LibraryCatalog::standard().references().unwrap();
        assert_eq!(
            refs.names(),
            vec!["core", "text", "collections", "document", "logging"]
        );
    }

    #[test]
    fn test_anchors_are_not_part_of_the_set() {
        let refs = LibraryCatalog::standard().references().unwrap();
        assert!(!refs.names().contains(&RUNTIME_ANCHOR));
        assert!(!refs.names().contains(&TEMPLATE_ANCHOR));
    }

    #[test]
    fn test_transitive_reference_is_followed() {
        const EXTRA: Library = Library {
            name: "extra",
            references: &["text"],
            types: &[],
            functions: &[],
            document_methods: &[],
        };
        const ROOT: Library = Library {
            name: "root",
            references: &["extra"],
            types: &[],
            functions: &[],
            document_methods: &[],
        };
        let catalog = LibraryCatalog::standard()
            .with_library(EXTRA)
            .with_library(ROOT);
        let refs = ReferenceSet::resolve(&catalog, &["root"]).unwrap();
        assert_eq!(refs.names(), vec!["extra", "text", "core"]);
    }

    #[test]
    fn test_unknown_reference_is_error() {
        const BROKEN: Library = Library {
            name: "broken",
            references: &["missing"],
            types: &[],
            functions: &[],
            document_methods: &[],
        };
        let catalog = LibraryCatalog::standard().with_library(BROKEN);
        let err = ReferenceSet::resolve(&catalog, &["broken"]).unwrap_err();
        assert!(matches!(err, ReferenceError::UnknownLibrary { .. }));
    }

    #[test]
    fn test_lookup() {
        let refs = LibraryCatalog::standard().references().unwrap();
        assert!(refs.provides_type("Document"));
        assert!(refs.provides_type("fn"));
        assert!(!refs.provides_type("Widget"));
        assert_eq!(refs.function("upper").map(|f| f.params), Some(1));
        assert_eq!(refs.document_method("heading").map(|m| m.params), Some(2));
        assert!(refs.function("heading").is_none());
    }

    #[test]
    fn test_text_functions() {
        assert_eq!(text_upper(&["abc".into()]), Ok(Value::from("ABC")));
        assert_eq!(
            text_join(&[Value::List(vec![1i64.into(), 2i64.into()]), ", ".into()]),
            Ok(Value::from("1, 2"))
        );
        assert_eq!(
            text_format_number(&[2.0f64.into(), 2i64.into()]),
            Ok(Value::from("2.00"))
        );
        assert_eq!(
            text_pad_left(&[7i64.into(), 3i64.into()]),
            Ok(Value::from("  7"))
        );
        assert!(text_split(&["a".into(), "".into()]).is_err());
    }

    #[test]
    fn test_collection_functions() {
        let list = Value::List(vec![3i64.into(), 1i64.into(), 2i64.into()]);
        assert_eq!(list_sum(&[list.clone()]), Ok(Value::Int(6)));
        assert_eq!(
            list_sort(&[list.clone()]),
            Ok(Value::List(vec![1i64.into(), 2i64.into(), 3i64.into()]))
        );
        assert_eq!(list_first(&[Value::List(vec![])]), Ok(Value::Null));
        assert_eq!(
            list_range(&[0i64.into(), 3i64.into()]),
            Ok(Value::List(vec![0i64.into(), 1i64.into(), 2i64.into()]))
        );
    }

    #[test]
    fn test_oversized_results_are_errors() {
        assert_eq!(
            text_repeat(&["ab".into(), i64::MAX.into()]),
            Err(format!("repeated text too large (limit {})", MAX_TEXT_LEN))
        );
        assert!(list_range(&[0i64.into(), i64::MAX.into()]).is_err());
        assert!(list_range(&[i64::MIN.into(), i64::MAX.into()]).is_err());
        assert!(text_pad_left(&["x".into(), i64::MAX.into()]).is_err());
        assert!(text_pad_right(&["x".into(), i64::MAX.into()]).is_err());
        assert!(text_format_number(&[1.0f64.into(), 1000i64.into()]).is_err());
    }

    #[test]
    fn test_sizes_at_the_limit_are_allowed() {
        assert_eq!(text_repeat(&["".into(), i64::MAX.into()]), Ok(Value::from("")));
        assert_eq!(list_range(&[5i64.into(), 2i64.into()]), Ok(Value::List(vec![])));
        let max = i64::try_from(MAX_LIST_LEN).unwrap();
        match list_range(&[0i64.into(), max.into()]) {
            Ok(Value::List(items)) => assert_eq!(items.len(), MAX_LIST_LEN),
            other => panic!("Expected a list, got {:?}", other),
        }
    }

    #[test]
    fn test_core_conversions() {
        assert_eq!(core_int(&[" 42 ".into()]), Ok(Value::Int(42)));
        assert!(core_int(&["x".into()]).is_err());
        assert_eq!(core_len(&["héllo".into()]), Ok(Value::Int(5)));
        assert_eq!(core_fail(&["boom".into()]), Err("boom".to_string()));
    }
}
