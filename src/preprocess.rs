//! Line-based rewriting of log calls
//!
//! Template authors write `log(expr);` on its own line. Before compilation each
//! such call is expanded to `log(<line>, "<expr>", expr);` so the log callback
//! receives the source line number and the expression text. The rewrite is
//! textual and works one physical line at a time:
//!
//! - only the single-argument form followed by `;` is recognised, and `log`
//!   must start the line or follow whitespace
//! - the argument runs to the last `);` on the line
//! - a line with more than one `log(` call site is left untouched, however the
//!   sites are separated
//!
//! The legacy declaration `log: fn(any)` is upgraded to `log: fn(int, string, any)`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static LOG_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[\s(,])log\s*:\s*fn\(\s*any\s*\)").expect("log declaration pattern is valid")
});

static LOG_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)log\((.*)\);").expect("log call pattern is valid"));

static LOG_CALL_SITE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blog\(").expect("log call site pattern is valid"));

/// Rewrite `source`; line count and numbering are preserved
pub fn preprocess(source: &str) -> String {
    let mut rewritten = 0;
    let lines: Vec<String> = source
        .split('\n')
        .enumerate()
        .map(|(index, line)| {
            let line = LOG_DECLARATION.replace_all(line, "${1}log: fn(int, string, any)");
            match rewrite_log_call(&line, index + 1) {
                Some(expanded) => {
                    rewritten += 1;
                    expanded
                }
                None => line.into_owned(),
            }
        })
        .collect();

    tracing::trace!(calls = rewritten, "preprocessed log calls");
    lines.join("\n")
}

fn rewrite_log_call(line: &str, number: usize) -> Option<String> {
    match LOG_CALL_SITE.find_iter(line).count() {
        0 => return None,
        1 => {}
        sites => {
            tracing::warn!(
                line = number,
                sites,
                "more than one log call on a line; leaving it unchanged"
            );
            return None;
        }
    }

    let expanded = LOG_CALL.replace(line, |caps: &Captures| {
        let expr = &caps[2];
        format!(
            "{}log({}, \"{}\", {});",
            &caps[1],
            number,
            escape(expr),
            expr
        )
    });
    match expanded {
        std::borrow::Cow::Owned(expanded) => Some(expanded),
        std::borrow::Cow::Borrowed(_) => None,
    }
}

/// Escape text so it can sit inside a string literal
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_call_is_expanded_with_line_and_text() {
        let source = "fn f() {\n    log(total * 2);\n}";
        assert_eq!(
            preprocess(source),
            "fn f() {\n    log(2, \"total * 2\", total * 2);\n}"
        );
    }

    #[test]
    fn test_call_at_line_start() {
        assert_eq!(preprocess("log(x);"), "log(1, \"x\", x);");
    }

    #[test]
    fn test_line_numbers_come_from_source_lines() {
        let source = "log(a);\n\n\nlog(b);\n";
        assert_eq!(
            preprocess(source),
            "log(1, \"a\", a);\n\n\nlog(4, \"b\", b);\n"
        );
    }

    #[test]
    fn test_expression_text_is_escaped() {
        assert_eq!(
            preprocess(r#"  log("a\"b" + name);"#),
            r#"  log(1, "\"a\\\"b\" + name", "a\"b" + name);"#
        );
    }

    #[test]
    fn test_greedy_argument_keeps_nested_calls() {
        assert_eq!(
            preprocess("  log(max(a, b));"),
            "  log(1, \"max(a, b)\", max(a, b));"
        );
    }

    #[test]
    fn test_legacy_declaration_is_upgraded() {
        assert_eq!(
            preprocess("static fn fill(document: Document, log: fn(any)) {"),
            "static fn fill(document: Document, log: fn(int, string, any)) {"
        );
        assert_eq!(
            preprocess("static fn fill(log : fn( any ))"),
            "static fn fill(log: fn(int, string, any))"
        );
    }

    #[test]
    fn test_unrelated_text_passes_through() {
        let source = "dialog(x);\ncatalog(y);\ndocument.paragraph(\"log(z);\");\nlog(a)";
        assert_eq!(preprocess(source), source);
    }

    #[test]
    fn test_several_calls_on_one_line_are_left_unchanged() {
        let source = "  log(a); log(b);";
        assert_eq!(preprocess(source), source);
    }

    #[test]
    fn test_adjacent_calls_on_one_line_are_left_unchanged() {
        for source in ["log(a);log(b);", "  log(a);log(7, \"b\", b);", "log(a);(log(b));"] {
            assert_eq!(preprocess(source), source);
        }
    }

    #[test]
    fn test_carriage_returns_are_kept() {
        assert_eq!(preprocess("log(a);\r\nx;\r\n"), "log(1, \"a\", a);\r\nx;\r\n");
    }
}
