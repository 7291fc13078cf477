//! Integration tests for compiler diagnostics and the warning policy

use std::path::Path;

use report_playground::{
    preprocess, CompileOptions, Compiler, DiagnosticCode, InProcessCompiler, LibraryCatalog,
    PlaygroundConfig, RenderError, ReportRenderer, TextDocument, WarningPolicy,
};

fn compile_codes(source: &str) -> Vec<DiagnosticCode> {
    let refs = LibraryCatalog::standard().references().unwrap();
    match InProcessCompiler.compile(&preprocess(source), &refs, &CompileOptions::default()) {
        Ok(unit) => unit.warnings().iter().map(|w| w.code).collect(),
        Err(err) => err.codes(),
    }
}

fn render_source(config: PlaygroundConfig, source: &str) -> Result<Vec<String>, RenderError> {
    let renderer = ReportRenderer::without_watcher(config);
    let report = renderer.render_source(source, &mut TextDocument::new(), Path::new("."))?;
    Ok(report.log().to_vec())
}

#[test]
fn test_diagnostics_are_listed_one_per_line_in_source_order() {
    let source = r#"class Broken {
    static fn fill(document: Document, log: fn(any)) {
        document.paragraph(missing);
        document.explode();
        log(1, 2);
    }
}"#;
    let err = render_source(PlaygroundConfig::default(), source).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r"
    E0002: unknown variable 'missing'
    E0007: Document has no method 'explode'
    E0004: 'log' expects 3 arguments, found 4
    ");
}

#[test]
fn test_calls_are_checked_against_the_reference_set() {
    let codes = compile_codes(
        r#"class T {
    static fn fill(document: Document, log: fn(any)) {
        document.paragraph(shout("x"));
        document.paragraph(upper("x", "y"));
        heading(1, "x");
    }
}"#,
    );
    assert_eq!(
        codes,
        vec![
            DiagnosticCode::UnknownFunction,
            DiagnosticCode::ArgumentCount,
            DiagnosticCode::UnknownFunction,
        ]
    );
}

#[test]
fn test_unknown_parameter_type() {
    assert_eq!(
        compile_codes("class T {\n static fn fill(document: Doc, log: fn(any)) { }\n}"),
        vec![DiagnosticCode::UnknownType]
    );
}

#[test]
fn test_warnings_do_not_fail_by_default() {
    let source = r#"class T {
    static fn fill(document: Document, log: fn(any)) {
        let spare = 1;
        log("ok");
        return;
        log("never");
    }
}"#;
    assert_eq!(
        compile_codes(source),
        vec![DiagnosticCode::UnusedVariable, DiagnosticCode::UnreachableCode]
    );
    let log = render_source(PlaygroundConfig::default(), source).unwrap();
    assert_eq!(log, vec!["#4: \"ok\": ok"]);
}

#[test]
fn test_escalated_warning_fails_the_render() {
    let source = r#"class T {
    static fn fill(document: Document, log: fn(any)) {
        let spare = 1;
    }
}"#;
    let config = PlaygroundConfig::default()
        .with_warnings(WarningPolicy::default().with_escalated(DiagnosticCode::UnusedVariable));
    let err = render_source(config, source).unwrap_err();
    assert_eq!(err.to_string(), "W0001: unused variable 'spare'");

    let config = PlaygroundConfig::default()
        .with_warnings(WarningPolicy::default().with_escalated(DiagnosticCode::UnreachableCode));
    assert!(render_source(config, source).is_ok());
}

#[test]
fn test_warnings_as_errors_from_toml() {
    let config = PlaygroundConfig::from_str("[compiler]\nwarnings_as_errors = true").unwrap();
    let source = "class T {\n static fn fill(document: Document, log: fn(any)) {\n let spare = 1;\n }\n}";
    let err = render_source(config, source).unwrap_err();
    assert!(matches!(err, RenderError::Compilation(_)));
}

#[test]
fn test_pretty_diagnostics_point_at_the_template() {
    let source = "class T {\n static fn fill(document: Document, log: fn(any)) {\n frobnicate();\n }\n}";
    let preprocessed = preprocess(source);
    let refs = LibraryCatalog::standard().references().unwrap();
    let err = InProcessCompiler
        .compile(&preprocessed, &refs, &CompileOptions::default())
        .unwrap_err();
    let pretty = err.format(&preprocessed, "Template.tpl");
    assert!(pretty.contains("E0003"));
    assert!(pretty.contains("Template.tpl"));
    assert!(pretty.contains("unknown function 'frobnicate'"));
}

#[test]
fn test_two_log_calls_on_one_line_are_left_for_the_compiler() {
    let source = r#"class T {
    static fn fill(document: Document, log: fn(any)) {
        log(1); log(2);
    }
}"#;
    assert_eq!(
        compile_codes(source),
        vec![DiagnosticCode::ArgumentCount, DiagnosticCode::ArgumentCount]
    );
}

#[test]
fn test_adjacent_log_calls_are_not_rewritten() {
    let source = r#"class T {
    static fn fill(document: Document, log: fn(any)) {
        log(1);log(2, "two", 2);
    }
}"#;
    assert_eq!(compile_codes(source), vec![DiagnosticCode::ArgumentCount]);
}

#[test]
fn test_oversized_integer_literal_is_named() {
    let source = "class T {\n static fn fill(document: Document, log: fn(any)) {\n log(99999999999999999999);\n }\n}";
    let err = render_source(PlaygroundConfig::default(), source).unwrap_err();
    assert_eq!(
        err.to_string(),
        "E0001: integer literal 99999999999999999999 is out of range"
    );
}
