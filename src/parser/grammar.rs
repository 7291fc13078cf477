//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::Diagnostic;
use crate::parser::ast::*;
use crate::parser::lexer::Token;

/// Suffix applied to an expression: `.method(args)` or `[index]`
#[derive(Debug, Clone)]
enum Postfix {
    Method(Spanned<Identifier>, Vec<Spanned<Expr>>),
    Index(Spanned<Expr>),
}

/// Parse template source into an AST
pub fn parse(input: &str) -> Result<SourceFile, Vec<Diagnostic>> {
    let len = input.len();

    // Create a logos lexer and convert to token stream
    let token_iter = crate::parser::lexer::lex(input).map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    source_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(Diagnostic::from).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn binary(op: BinaryOp, lhs: Spanned<Expr>, rhs: Spanned<Expr>) -> Spanned<Expr> {
    let span = lhs.span.start..rhs.span.end;
    Spanned::new(Expr::Binary(op, Box::new(lhs), Box::new(rhs)), span)
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Spanned<Expr>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! {
        Token::Ident(s) => Identifier::new(s),
    }
    .map_with(|id, e| Spanned::new(id, span_range(&e.span())));

    recursive(|expr| {
        // Digits that do not fit in an int reach the parser as unknown input
        let out_of_range = select! {
            Token::Unknown(s) if s.bytes().all(|b| b.is_ascii_digit()) => s,
        }
        .validate(|digits, e, emitter| {
            emitter.emit(Rich::custom(
                e.span(),
                format!("integer literal {} is out of range", digits),
            ));
            Literal::Int(0)
        });

        let literal = select! {
            Token::Int(n) => Literal::Int(n),
            Token::Float(n) => Literal::Float(n),
            Token::String(s) => Literal::String(s),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
        }
        .or(out_of_range)
        .map(Expr::Literal);

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        // Plain call: `name(args)`
        let call = identifier
            .clone()
            .then(args.clone())
            .map(|(callee, args)| Expr::Call { callee, args });

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::List);

        // Order matters: call before bare identifier
        let atom = choice((
            literal,
            call,
            identifier.clone().map(|id| Expr::Ident(id.node)),
            list,
        ))
        .map_with(|node, e| Spanned::new(node, span_range(&e.span())))
        .or(expr
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)))
        .labelled("expression");

        let postfix = choice((
            just(Token::Dot)
                .ignore_then(identifier.clone())
                .then(args)
                .map(|(method, args)| Postfix::Method(method, args)),
            expr.clone()
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map(Postfix::Index),
        ))
        .map_with(|p, e| (p, span_range(&e.span())));

        let postfixed = atom.foldl(postfix.repeated(), |lhs, (op, span)| {
            let full = lhs.span.start..span.end;
            let node = match op {
                Postfix::Method(method, args) => Expr::MethodCall {
                    receiver: Box::new(lhs),
                    method,
                    args,
                },
                Postfix::Index(index) => Expr::Index(Box::new(lhs), Box::new(index)),
            };
            Spanned::new(node, full)
        });

        let unary_op = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Bang).to(UnaryOp::Not),
        ))
        .map_with(|op, e| (op, span_range(&e.span())));

        let unary = unary_op
            .repeated()
            .foldr(postfixed, |(op, span), rhs: Spanned<Expr>| {
                let full = span.start..rhs.span.end;
                Spanned::new(Expr::Unary(op, Box::new(rhs)), full)
            })
            .boxed();

        let product = unary
            .clone()
            .foldl(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::Slash).to(BinaryOp::Div),
                    just(Token::Percent).to(BinaryOp::Rem),
                ))
                .then(unary)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let sum = product
            .clone()
            .foldl(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Sub),
                ))
                .then(product)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let comparison = sum
            .clone()
            .foldl(
                choice((
                    just(Token::LessOrEqual).to(BinaryOp::LessEq),
                    just(Token::GreaterOrEqual).to(BinaryOp::GreaterEq),
                    just(Token::Less).to(BinaryOp::Less),
                    just(Token::Greater).to(BinaryOp::Greater),
                ))
                .then(sum)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let equality = comparison
            .clone()
            .foldl(
                choice((
                    just(Token::EqualsEquals).to(BinaryOp::Eq),
                    just(Token::NotEquals).to(BinaryOp::NotEq),
                ))
                .then(comparison)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let conjunction = equality
            .clone()
            .foldl(
                just(Token::AndAnd)
                    .to(BinaryOp::And)
                    .then(equality)
                    .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        conjunction
            .clone()
            .foldl(
                just(Token::OrOr)
                    .to(BinaryOp::Or)
                    .then(conjunction)
                    .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed()
    })
}

fn source_parser<'a, I>() -> impl Parser<'a, I, SourceFile, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! {
        Token::Ident(s) => Identifier::new(s),
    }
    .map_with(|id, e| Spanned::new(id, span_range(&e.span())));

    let expr = expr_parser();

    // Types: `name` or `fn(T, ...)`
    let type_expr = recursive(|ty| {
        let callback = just(Token::Fn)
            .ignore_then(
                ty.separated_by(just(Token::Comma))
                    .allow_trailing()
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .map(TypeExpr::Callback);

        choice((
            callback,
            identifier.clone().map(|id| TypeExpr::Named(id.node)),
        ))
        .map_with(|t, e| Spanned::new(t, span_range(&e.span())))
        .labelled("type")
    });

    let block = recursive(|block| {
        let let_stmt = just(Token::Let)
            .ignore_then(identifier.clone())
            .then_ignore(just(Token::Equals))
            .then(expr.clone())
            .then_ignore(just(Token::Semicolon))
            .map(|(name, value)| Stmt::Let { name, value });

        let assign = identifier
            .clone()
            .then_ignore(just(Token::Equals))
            .then(expr.clone())
            .then_ignore(just(Token::Semicolon))
            .map(|(name, value)| Stmt::Assign { name, value });

        let expr_stmt = expr
            .clone()
            .then_ignore(just(Token::Semicolon))
            .map(Stmt::Expr);

        let else_if = just(Token::Else)
            .then(just(Token::If))
            .ignore_then(expr.clone())
            .then(block.clone());

        let if_stmt = just(Token::If)
            .ignore_then(expr.clone())
            .then(block.clone())
            .then(else_if.repeated().collect::<Vec<_>>())
            .then(just(Token::Else).ignore_then(block.clone()).or_not())
            .map(|((first, rest), otherwise)| {
                let mut branches = vec![first];
                branches.extend(rest);
                Stmt::If {
                    branches,
                    otherwise,
                }
            });

        let while_stmt = just(Token::While)
            .ignore_then(expr.clone())
            .then(block.clone())
            .map(|(condition, body)| Stmt::While { condition, body });

        let iterable = expr
            .clone()
            .then(just(Token::DotDot).ignore_then(expr.clone()).or_not())
            .map(|(start, end)| match end {
                Some(end) => ForIterable::Range(start, end),
                None => ForIterable::Each(start),
            });

        let for_stmt = just(Token::For)
            .ignore_then(identifier.clone())
            .then_ignore(just(Token::In))
            .then(iterable)
            .then(block.clone())
            .map(|((binding, iterable), body)| Stmt::For {
                binding,
                iterable,
                body,
            });

        let return_stmt = just(Token::Return)
            .ignore_then(expr.clone().or_not())
            .then_ignore(just(Token::Semicolon))
            .map(Stmt::Return);

        // Order matters: assignment before expression statement
        let stmt = choice((
            let_stmt,
            if_stmt,
            while_stmt,
            for_stmt,
            return_stmt,
            assign,
            expr_stmt,
        ))
        .map_with(|s, e| Spanned::new(s, span_range(&e.span())))
        .labelled("statement")
        .boxed();

        stmt.repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
    });

    let param = identifier
        .clone()
        .then_ignore(just(Token::Colon))
        .then(type_expr.clone())
        .map(|(name, ty)| Param { name, ty });

    let params = param
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

    let method = just(Token::Static)
        .or_not()
        .map(|s| s.is_some())
        .then_ignore(just(Token::Fn))
        .then(identifier.clone())
        .then(params)
        .then(just(Token::Arrow).ignore_then(type_expr).or_not())
        .then(block)
        .map(
            |((((is_static, name), params), return_type), body)| MethodDecl {
                is_static,
                name,
                params,
                return_type,
                body,
            },
        )
        .map_with(|m, e| Spanned::new(m, span_range(&e.span())))
        .boxed();

    let class = recursive(|class| {
        let member = choice((
            method.clone().map(Member::Method),
            class.map(Member::Class),
        ));

        just(Token::Class)
            .ignore_then(identifier.clone())
            .then(
                member
                    .repeated()
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::BraceOpen), just(Token::BraceClose)),
            )
            .map(|(name, members)| ClassDecl { name, members })
            .map_with(|c, e| Spanned::new(c, span_range(&e.span())))
    });

    class
        .repeated()
        .collect()
        .then_ignore(end())
        .map(|classes| SourceFile { classes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_body(body: &str) -> Vec<Spanned<Stmt>> {
        let source = format!("class T {{ static fn f() {{ {} }} }}", body);
        let file = parse(&source).expect("Should parse");
        let class = &file.classes[0].node;
        let method = class.methods().next().expect("method");
        method.node.body.clone()
    }

    fn parse_expr(expr: &str) -> Expr {
        let body = parse_body(&format!("{};", expr));
        match &body[0].node {
            Stmt::Expr(e) => e.node.clone(),
            other => panic!("Expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_class() {
        let file = parse("class Report { }").expect("Should parse");
        assert_eq!(file.classes.len(), 1);
        assert_eq!(file.classes[0].node.name.node.as_str(), "Report");
    }

    #[test]
    fn test_parse_multiple_classes() {
        let file = parse("class A { } class B { }").expect("Should parse");
        assert_eq!(file.classes.len(), 2);
    }

    #[test]
    fn test_parse_nested_class() {
        let file = parse("class Outer { class Inner { } }").expect("Should parse");
        let outer = &file.classes[0].node;
        assert_eq!(outer.nested().count(), 1);
        assert_eq!(outer.methods().count(), 0);
    }

    #[test]
    fn test_parse_static_method_signature() {
        let file = parse(
            "class T { static fn fill(document: Document, log: fn(int, string, any), dir: string) { } }",
        )
        .expect("Should parse");
        let method = file.classes[0].node.methods().next().unwrap();
        assert!(method.node.is_static);
        assert_eq!(method.node.name.node.as_str(), "fill");
        assert_eq!(method.node.params.len(), 3);
        assert_eq!(method.node.params[1].ty.node.to_string(), "fn(int, string, any)");
    }

    #[test]
    fn test_parse_instance_method_with_return_type() {
        let file = parse("class T { fn twice(x: int) -> int { return x * 2; } }")
            .expect("Should parse");
        let method = file.classes[0].node.methods().next().unwrap();
        assert!(!method.node.is_static);
        assert_eq!(
            method.node.return_type.as_ref().unwrap().node,
            TypeExpr::Named(Identifier::new("int"))
        );
    }

    #[test]
    fn test_parse_precedence() {
        match parse_expr("1 + 2 * 3") {
            Expr::Binary(BinaryOp::Add, lhs, rhs) => {
                assert_eq!(lhs.node, Expr::Literal(Literal::Int(1)));
                assert!(matches!(rhs.node, Expr::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("Expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_logical_precedence() {
        assert!(matches!(
            parse_expr("a || b && c"),
            Expr::Binary(BinaryOp::Or, _, _)
        ));
    }

    #[test]
    fn test_parse_method_call_chain() {
        match parse_expr("document.paragraph(name.upper())") {
            Expr::MethodCall {
                receiver,
                method,
                args,
            } => {
                assert_eq!(receiver.node, Expr::Ident(Identifier::new("document")));
                assert_eq!(method.node.as_str(), "paragraph");
                assert!(matches!(args[0].node, Expr::MethodCall { .. }));
            }
            other => panic!("Expected method call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_index_and_unary() {
        assert!(matches!(parse_expr("-items[0]"), Expr::Unary(UnaryOp::Neg, _)));
        assert!(matches!(parse_expr("!done"), Expr::Unary(UnaryOp::Not, _)));
    }

    #[test]
    fn test_parse_statements() {
        let body = parse_body(
            r#"
            let total = 0;
            total = total + 1;
            if total > 1 { log(total); } else if total == 0 { } else { return; }
            while total < 10 { total = total + 1; }
            for item in [1, 2, 3] { log(item); }
            for i in 0..3 { }
            "#,
        );
        assert_eq!(body.len(), 6);
        assert!(matches!(body[0].node, Stmt::Let { .. }));
        assert!(matches!(body[1].node, Stmt::Assign { .. }));
        match &body[2].node {
            Stmt::If {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert!(otherwise.is_some());
            }
            other => panic!("Expected if, got {:?}", other),
        }
        assert!(matches!(body[3].node, Stmt::While { .. }));
        assert!(matches!(
            body[4].node,
            Stmt::For {
                iterable: ForIterable::Each(_),
                ..
            }
        ));
        assert!(matches!(
            body[5].node,
            Stmt::For {
                iterable: ForIterable::Range(_, _),
                ..
            }
        ));
    }

    #[test]
    fn test_statement_spans_cover_source() {
        let source = "class T { static fn f() { let x = 1; } }";
        let file = parse(source).expect("Should parse");
        let method = file.classes[0].node.methods().next().unwrap();
        let span = method.node.body[0].span.clone();
        assert_eq!(&source[span], "let x = 1;");
    }

    #[test]
    fn test_missing_semicolon_is_error() {
        let errors = parse("class T { static fn f() { let x = 1 } }").unwrap_err();
        assert!(!errors.is_empty());
        assert_eq!(errors[0].code, crate::error::DiagnosticCode::Syntax);
    }

    #[test]
    fn test_out_of_range_integer_is_reported() {
        let errors = parse("class T { static fn f() { let x = 99999999999999999999; } }").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, crate::error::DiagnosticCode::Syntax);
        assert_eq!(
            errors[0].message,
            "integer literal 99999999999999999999 is out of range"
        );
    }

    #[test]
    fn test_unknown_character_is_error() {
        assert!(parse("class T { static fn f() { let x = 1 # 2; } }").is_err());
    }
}
