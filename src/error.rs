//! Diagnostics produced while compiling a template

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::parser::lexer::Token;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// Stable identifier of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    Syntax,
    UnknownVariable,
    UnknownFunction,
    ArgumentCount,
    UnknownType,
    DuplicateDefinition,
    UnknownDocumentMethod,
    InstanceMethodCall,
    NotCallable,
    UndeclaredAssignment,
    UnusedVariable,
    UnreachableCode,
}

impl DiagnosticCode {
    pub const ALL: [DiagnosticCode; 12] = [
        DiagnosticCode::Syntax,
        DiagnosticCode::UnknownVariable,
        DiagnosticCode::UnknownFunction,
        DiagnosticCode::ArgumentCount,
        DiagnosticCode::UnknownType,
        DiagnosticCode::DuplicateDefinition,
        DiagnosticCode::UnknownDocumentMethod,
        DiagnosticCode::InstanceMethodCall,
        DiagnosticCode::NotCallable,
        DiagnosticCode::UndeclaredAssignment,
        DiagnosticCode::UnusedVariable,
        DiagnosticCode::UnreachableCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::Syntax => "E0001",
            DiagnosticCode::UnknownVariable => "E0002",
            DiagnosticCode::UnknownFunction => "E0003",
            DiagnosticCode::ArgumentCount => "E0004",
            DiagnosticCode::UnknownType => "E0005",
            DiagnosticCode::DuplicateDefinition => "E0006",
            DiagnosticCode::UnknownDocumentMethod => "E0007",
            DiagnosticCode::InstanceMethodCall => "E0008",
            DiagnosticCode::NotCallable => "E0009",
            DiagnosticCode::UndeclaredAssignment => "E0010",
            DiagnosticCode::UnusedVariable => "W0001",
            DiagnosticCode::UnreachableCode => "W0002",
        }
    }

    /// Severity a diagnostic with this code has before any escalation
    pub fn default_severity(&self) -> Severity {
        match self {
            DiagnosticCode::UnusedVariable | DiagnosticCode::UnreachableCode => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DiagnosticCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiagnosticCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown diagnostic code '{}'", s))
    }
}

/// A single compiler message with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    /// Set when a warning was promoted to an error by the warning policy
    pub escalated: bool,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            severity: code.default_severity(),
            escalated: false,
            message: message.into(),
            span,
        }
    }

    /// Whether this diagnostic fails the compilation
    pub fn is_failure(&self) -> bool {
        self.severity == Severity::Error || self.escalated
    }

    /// Format the diagnostic with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        let kind = if self.is_failure() {
            ReportKind::Error
        } else {
            ReportKind::Warning
        };
        let color = if self.is_failure() {
            Color::Red
        } else {
            Color::Yellow
        };

        let written = Report::build(kind, filename, self.span.start)
            .with_code(self.code)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, self.span.clone()))
                    .with_message(&self.message)
                    .with_color(color),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => format!("{}: {}", self.code, self.message),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl<'a> From<chumsky::error::Rich<'a, Token>> for Diagnostic {
    fn from(err: chumsky::error::Rich<'a, Token>) -> Self {
        use chumsky::error::RichReason;

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => match found {
                Some(tok) => {
                    let tok: &Token = tok;
                    format!("unexpected {}", tok)
                }
                None => "unexpected end of input".to_string(),
            },
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => {
                    let tok: &Token = tok;
                    Some(tok.to_string())
                }
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of input".to_string()),
                chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                chumsky::error::RichPattern::Any => Some("any token".to_string()),
                chumsky::error::RichPattern::SomethingElse => None,
            })
            .collect();

        let message = if expected.is_empty() {
            message
        } else {
            format!("{}, expected {}", message, expected.join(", "))
        };

        Diagnostic::new(DiagnosticCode::Syntax, message, err.span().into_range())
    }
}

/// Compilation failed: one or more error-level (or escalated) diagnostics
#[derive(Error, Debug)]
#[error("{}", format_diagnostics(.diagnostics))]
pub struct CompileError {
    /// Name of the compilation unit that failed
    pub unit: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    /// Format every diagnostic with source context
    pub fn format(&self, source: &str, filename: &str) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.format(source, filename))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn codes(&self) -> Vec<DiagnosticCode> {
        self.diagnostics.iter().map(|d| d.code).collect()
    }
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_code_and_message() {
        let d = Diagnostic::new(DiagnosticCode::UnknownFunction, "unknown function 'foo'", 3..6);
        assert_eq!(d.to_string(), "E0003: unknown function 'foo'");
    }

    #[test]
    fn test_warning_is_not_failure_until_escalated() {
        let mut d = Diagnostic::new(DiagnosticCode::UnusedVariable, "unused variable 'x'", 0..1);
        assert_eq!(d.severity, Severity::Warning);
        assert!(!d.is_failure());
        d.escalated = true;
        assert!(d.is_failure());
    }

    #[test]
    fn test_code_from_str() {
        assert_eq!("W0001".parse::<DiagnosticCode>(), Ok(DiagnosticCode::UnusedVariable));
        assert_eq!("e0004".parse::<DiagnosticCode>(), Ok(DiagnosticCode::ArgumentCount));
        assert!("X1".parse::<DiagnosticCode>().is_err());
    }

    #[test]
    fn test_compile_error_joins_lines() {
        let err = CompileError {
            unit: "template-1".to_string(),
            diagnostics: vec![
                Diagnostic::new(DiagnosticCode::Syntax, "unexpected ';'", 0..1),
                Diagnostic::new(DiagnosticCode::UnknownVariable, "unknown variable 'y'", 2..3),
            ],
        };
        assert_eq!(
            err.to_string(),
            "E0001: unexpected ';'\nE0002: unknown variable 'y'"
        );
    }

    #[test]
    fn test_format_includes_code_and_filename() {
        let d = Diagnostic::new(DiagnosticCode::UnknownVariable, "unknown variable 'y'", 4..5);
        let out = d.format("let y;", "Template.tpl");
        assert!(out.contains("E0002"));
        assert!(out.contains("Template.tpl"));
    }
}
