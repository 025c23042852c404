// lexer.rs — Tokens of a value literal (`x_e=100`, `float32[10, 14]`, `@7`)
//
// Literals are short, so the whole token list is built up front and handed to
// the parser in one piece.
//
// Preconditions: none.
// Postconditions: every byte of the input is covered by a token, by skipped
//                 whitespace, or by a `LexError`.
// Failure modes: none fatal; bad characters and oversized numbers are
//                collected as `LexError`s.
// Side effects: none.

use std::fmt;
use std::ops::Range;

use logos::Logos;

/// Byte range of a token within one literal.
pub type Span = Range<usize>;

/// Input the lexer skipped over, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Tokens of one literal. Bad input is recorded in `errors` and skipped.
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Value literal tokens.
///
/// Identifiers carry no value; use the span to retrieve the text.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // ── Keywords ──
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ── Symbols ──
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token("@")]
    At,

    // ── Literals ──
    /// Float literal: needs a fraction or an exponent.
    #[regex(
        r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?|-?[0-9]+[eE][+-]?[0-9]+",
        parse_float
    )]
    Float(f64),

    #[regex(r"-?[0-9]+", parse_int)]
    Int(i64),

    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::At => write!(f, "@"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

// ── Callbacks ──

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Tokenize a value literal. Never fails: a character that starts no token,
/// or a number too large for 64 bits, becomes a `LexError`.
pub fn lex(source: &str) -> Lexed {
    let mut out = Lexed::default();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => out.tokens.push((token, span)),
            Err(()) => {
                let text = &source[span.clone()];
                let message = if text.starts_with(|c: char| c == '-' || c.is_ascii_digit()) {
                    format!("number `{}` is out of range", text)
                } else {
                    format!("`{}` is not part of a value literal", text)
                };
                out.errors.push(LexError { span, message });
            }
        }
    }
    out
}
