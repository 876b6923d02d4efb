//! Lexer for the applied-pi source format.
//!
//! Hand-rolled single pass over the bytes: identifiers, punctuation, the
//! two-character operators `<>`, `&&`, `||`, and `(* … *)` comments,
//! which nest.

use crate::error::ParseError;
use crate::token::{Span, Token};

/// Tokenizes `source`, dropping comments.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, ParseError> {
    let bytes = source.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    i = skip_comment(source, i)?;
                } else {
                    out.push((Token::LParen, Span::new(start, i + 1)));
                    i += 1;
                }
            }
            ')' => {
                out.push((Token::RParen, Span::new(start, i + 1)));
                i += 1;
            }
            '[' => {
                out.push((Token::LBracket, Span::new(start, i + 1)));
                i += 1;
            }
            ']' => {
                out.push((Token::RBracket, Span::new(start, i + 1)));
                i += 1;
            }
            '.' => {
                out.push((Token::Dot, Span::new(start, i + 1)));
                i += 1;
            }
            ',' => {
                out.push((Token::Comma, Span::new(start, i + 1)));
                i += 1;
            }
            ':' => {
                out.push((Token::Colon, Span::new(start, i + 1)));
                i += 1;
            }
            ';' => {
                out.push((Token::Semicolon, Span::new(start, i + 1)));
                i += 1;
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    out.push((Token::OrOr, Span::new(start, i + 2)));
                    i += 2;
                } else {
                    out.push((Token::Pipe, Span::new(start, i + 1)));
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    out.push((Token::AndAnd, Span::new(start, i + 2)));
                    i += 2;
                } else {
                    return Err(ParseError::new("stray '&'", Span::new(start, i + 1)));
                }
            }
            '!' => {
                out.push((Token::Bang, Span::new(start, i + 1)));
                i += 1;
            }
            '=' => {
                out.push((Token::Equals, Span::new(start, i + 1)));
                i += 1;
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'>') {
                    out.push((Token::NotEquals, Span::new(start, i + 2)));
                    i += 2;
                } else {
                    return Err(ParseError::new("stray '<'", Span::new(start, i + 1)));
                }
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut j = i;
                while j < bytes.len() {
                    let d = bytes[j] as char;
                    if d.is_ascii_alphanumeric() || d == '_' || d == '\'' {
                        j += 1;
                    } else {
                        break;
                    }
                }
                out.push((Token::Ident(source[i..j].to_string()), Span::new(start, j)));
                i = j;
            }
            other => {
                return Err(ParseError::new(
                    format!("unexpected character '{}'", other),
                    Span::new(start, i + 1),
                ));
            }
        }
    }
    Ok(out)
}

/// Skips a `(* … *)` comment starting at `open`, honouring nesting.
fn skip_comment(source: &str, open: usize) -> Result<usize, ParseError> {
    let bytes = source.as_bytes();
    let mut depth = 1;
    let mut i = open + 2;
    while i < bytes.len() {
        if bytes[i] == b'(' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b')') {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Ok(i);
            }
        } else {
            i += 1;
        }
    }
    Err(ParseError::new(
        "unterminated comment",
        Span::new(open, source.len()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lexes_a_free_declaration() {
        assert_eq!(
            kinds("free c: channel."),
            vec![
                Token::Ident("free".into()),
                Token::Ident("c".into()),
                Token::Colon,
                Token::Ident("channel".into()),
                Token::Dot,
            ]
        );
    }

    #[test]
    fn lexes_operators() {
        assert_eq!(
            kinds("| || && ! = <>"),
            vec![
                Token::Pipe,
                Token::OrOr,
                Token::AndAnd,
                Token::Bang,
                Token::Equals,
                Token::NotEquals,
            ]
        );
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(kinds("a (* hidden *) b"), vec![
            Token::Ident("a".into()),
            Token::Ident("b".into()),
        ]);
    }

    #[test]
    fn comments_nest() {
        assert_eq!(kinds("a (* outer (* inner *) still *) b").len(), 2);
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        assert!(lex("a (* forever").is_err());
    }

    #[test]
    fn primed_identifiers_lex_as_one_token() {
        assert_eq!(kinds("x' y''"), vec![
            Token::Ident("x'".into()),
            Token::Ident("y''".into()),
        ]);
    }
}
