// Parser for argument value literals.
//
// Grammar:
//   entry     := (IDENT '=')? value
//   value     := composite | leaf
//   composite := array '{' (leaf (',' leaf)*)? '}'
//   leaf      := array | '@' INT | 'true' | 'false' | INT | FLOAT
//   array     := DTYPE? '[' (INT (',' INT)*)? ']'      (dtype defaults to float32)
//
// Uses chumsky combinators over the `logos` token stream.
//
// Preconditions: none.
// Postconditions: returns the parsed value, or every lex/parse error.
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::lexer::Token;
use crate::value::{ArrayValue, CompositeValue, DType, Handle, Value};

pub type ParseError = Rich<'static, Token, SimpleSpan>;

/// Parse `name=value`.
pub fn parse_assignment(source: &str) -> Result<(String, Value), Vec<ParseError>> {
    match parse_entry(source)? {
        (Some(name), value) => Ok((name, value)),
        (None, _) => {
            let span: SimpleSpan = (0..source.len()).into();
            Err(vec![Rich::custom(span, "expected `name=value`")])
        }
    }
}

/// Parse a bare value.
pub fn parse_value(source: &str) -> Result<Value, Vec<ParseError>> {
    match parse_entry(source)? {
        (None, value) => Ok(value),
        (Some(name), _) => {
            let span: SimpleSpan = (0..source.len()).into();
            Err(vec![Rich::custom(
                span,
                format!("expected a value, found assignment to '{}'", name),
            )])
        }
    }
}

fn parse_entry(source: &str) -> Result<(Option<String>, Value), Vec<ParseError>> {
    let lexed = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lexed
        .tokens
        .into_iter()
        .map(|(tok, span)| (tok, SimpleSpan::from(span)));
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = entry_parser(source);
    let (entry, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut errors: Vec<ParseError> = lexed
        .errors
        .into_iter()
        .map(|e| Rich::custom(SimpleSpan::from(e.span), e.message))
        .collect();
    errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    match entry {
        Some(entry) if errors.is_empty() => Ok(entry),
        _ if errors.is_empty() => Err(vec![Rich::custom(eoi, "empty value")]),
        _ => Err(errors),
    }
}

fn entry_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, (Option<String>, Value), extra::Err<Rich<'tokens, Token, SimpleSpan>>>
       + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        source[span.start()..span.end()].to_string()
    });

    let dtype = ident.clone().try_map(|name, span| {
        DType::from_name(&name)
            .ok_or_else(|| Rich::custom(span, format!("unknown dtype '{}'", name)))
    });

    // ── Array ──

    let extent = select! {
        Token::Int(n) if n >= 0 => n as usize,
    };

    let shape = extent
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket));

    let array = dtype
        .or_not()
        .then(shape)
        .map(|(dtype, shape)| ArrayValue::new(dtype.unwrap_or(DType::Float32), shape));

    // ── Leaf ──

    let handle = just(Token::At)
        .ignore_then(select! {
            Token::Int(n) if n >= 0 => n as u64,
        })
        .map(|addr| Value::Handle(Handle { addr }));

    let scalar = select! {
        Token::True => Value::Bool(true),
        Token::False => Value::Bool(false),
        Token::Int(n) => Value::Int(n),
        Token::Float(f) => Value::Float(f),
    };

    let leaf = array
        .clone()
        .map(Value::Array)
        .or(handle)
        .or(scalar);

    // ── Composite ──

    let composite = array
        .then(
            leaf.clone()
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|(array, children)| Value::Composite(CompositeValue { array, children }));

    let value = composite.or(leaf);

    ident
        .then_ignore(just(Token::Equals))
        .or_not()
        .then(value)
        .then_ignore(end())
}
