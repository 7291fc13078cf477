//! Lexer for the template language using logos

use logos::Logos;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Declaration keywords
    #[token("class")]
    Class,
    #[token("static")]
    Static,
    #[token("fn")]
    Fn,

    // Statement keywords
    #[token("let")]
    Let,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("return")]
    Return,

    // Literal keywords
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Operators (longer patterns first)
    #[token("->")]
    Arrow,
    #[token("..")]
    DotDot,
    #[token("==")]
    EqualsEquals,
    #[token("!=")]
    NotEquals,
    #[token("<=")]
    LessOrEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Equals,
    #[token("!")]
    Bang,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Delimiters
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len()-1])
    })]
    String(String),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*([^*]|\*[^/])*\*/", logos::skip)]
    BlockComment,

    /// Input no other token accepts; the parser reports it
    #[regex(r".", |lex| lex.slice().to_string(), priority = 0)]
    Unknown(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier '{}'", s),
            Token::String(s) => write!(f, "string \"{}\"", s),
            Token::Int(n) => write!(f, "number {}", n),
            Token::Float(n) => write!(f, "number {}", n),
            Token::Unknown(s) => write!(f, "'{}'", s),
            Token::Class => write!(f, "keyword 'class'"),
            Token::Static => write!(f, "keyword 'static'"),
            Token::Fn => write!(f, "keyword 'fn'"),
            Token::Let => write!(f, "keyword 'let'"),
            Token::If => write!(f, "keyword 'if'"),
            Token::Else => write!(f, "keyword 'else'"),
            Token::While => write!(f, "keyword 'while'"),
            Token::For => write!(f, "keyword 'for'"),
            Token::In => write!(f, "keyword 'in'"),
            Token::Return => write!(f, "keyword 'return'"),
            Token::True => write!(f, "'true'"),
            Token::False => write!(f, "'false'"),
            Token::Null => write!(f, "'null'"),
            Token::Arrow => write!(f, "'->'"),
            Token::DotDot => write!(f, "'..'"),
            Token::EqualsEquals => write!(f, "'=='"),
            Token::NotEquals => write!(f, "'!='"),
            Token::LessOrEqual => write!(f, "'<='"),
            Token::GreaterOrEqual => write!(f, "'>='"),
            Token::AndAnd => write!(f, "'&&'"),
            Token::OrOr => write!(f, "'||'"),
            Token::Less => write!(f, "'<'"),
            Token::Greater => write!(f, "'>'"),
            Token::Equals => write!(f, "'='"),
            Token::Bang => write!(f, "'!'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::BraceOpen => write!(f, "'{{'"),
            Token::BraceClose => write!(f, "'}}'"),
            Token::BracketOpen => write!(f, "'['"),
            Token::BracketClose => write!(f, "']'"),
            Token::ParenOpen => write!(f, "'('"),
            Token::ParenClose => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
            Token::Colon => write!(f, "':'"),
            Token::Semicolon => write!(f, "';'"),
            Token::Dot => write!(f, "'.'"),
            Token::LineComment | Token::BlockComment => write!(f, "comment"),
        }
    }
}

/// Resolve backslash escapes inside a string literal body
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Lex input string into tokens with spans
///
/// Unrecognised input becomes [`Token::Unknown`] so the parser can report it
/// at the right location instead of silently dropping it.
pub fn lex(input: &str) -> impl Iterator<Item = (Token, Span)> + '_ {
    Token::lexer(input).spanned().map(|(tok, span)| match tok {
        Ok(t) => (t, span),
        Err(()) => (Token::Unknown(input[span.clone()].to_string()), span),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).map(|(t, _)| t).collect()
    }

    #[test]
    fn test_declaration_keywords() {
        assert_eq!(
            tokens("class static fn"),
            vec![Token::Class, Token::Static, Token::Fn]
        );
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            tokens("-> .. == != <= >= && || < ="),
            vec![
                Token::Arrow,
                Token::DotDot,
                Token::EqualsEquals,
                Token::NotEquals,
                Token::LessOrEqual,
                Token::GreaterOrEqual,
                Token::AndAnd,
                Token::OrOr,
                Token::Less,
                Token::Equals,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 3.5 0..10"),
            vec![
                Token::Int(42),
                Token::Float(3.5),
                Token::Int(0),
                Token::DotDot,
                Token::Int(10),
            ]
        );
    }

    #[test]
    fn test_identifiers_and_strings() {
        assert_eq!(
            tokens(r#"document "my name""#),
            vec![
                Token::Ident("document".to_string()),
                Token::String("my name".to_string())
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""say \"hi\"\n\\""#),
            vec![Token::String("say \"hi\"\n\\".to_string())]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            tokens("let // comment\n/* block */ x"),
            vec![Token::Let, Token::Ident("x".to_string())]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(
            tokens("classes format"),
            vec![
                Token::Ident("classes".to_string()),
                Token::Ident("format".to_string())
            ]
        );
    }

    #[test]
    fn test_unknown_input_is_kept() {
        let toks: Vec<_> = lex("let # x").collect();
        assert_eq!(toks[1], (Token::Unknown("#".to_string()), 4..5));
    }

    #[test]
    fn test_int_overflow_is_one_unknown_token() {
        let toks: Vec<_> = lex("x = 99999999999999999999;").collect();
        assert_eq!(
            toks[2],
            (Token::Unknown("99999999999999999999".to_string()), 4..24)
        );
    }
}
