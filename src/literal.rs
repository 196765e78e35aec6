//! Decoder for the small literal language that model completions use for lists.
//!
//! Accepts quoted strings, signed integers and decimals, and bracketed lists of those
//! values. Identifiers, calls, operators and every other construct are rejected; the
//! input is parsed as data and never evaluated.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    List(Vec<Literal>),
}

impl Literal {
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::Str(_) => "string",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "number",
            Literal::List(_) => "list",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid literal at offset {offset}: {message}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// Nesting limit for lists; completions never need more than one level.
const MAX_DEPTH: usize = 8;

/// Parses `input` as exactly one literal surrounded by optional whitespace.
pub fn parse_literal(input: &str) -> Result<Literal, LiteralError> {
    let mut parser = Parser {
        src: input,
        pos: 0,
        depth: 0,
    };
    parser.skip_whitespace();
    let value = parser.value()?;
    parser.skip_whitespace();
    if let Some(c) = parser.peek() {
        return Err(parser.error(format!("unexpected trailing {:?}", c)));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        match self.peek() {
            Some('[') => self.list(),
            Some(q @ ('\'' | '"')) => self.string(q),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) => Err(self.error(format!("{:?} does not start a literal", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn list(&mut self) -> Result<Literal, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("lists nested too deeply"));
        }
        self.depth += 1;
        self.bump(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                self.bump();
                break;
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(']') => break,
                Some(c) => {
                    self.pos -= c.len_utf8();
                    return Err(self.error(format!("expected ',' or ']' but found {:?}", c)));
                }
                None => return Err(self.error("unterminated list")),
            }
        }
        self.depth -= 1;
        Ok(Literal::List(items))
    }

    fn string(&mut self, quote: char) -> Result<Literal, LiteralError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Literal::Str(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => {
                        return Err(self.error(format!("unsupported escape sequence \\{}", c)))
                    }
                    None => break,
                },
                Some('\n') => return Err(self.error("newline inside string")),
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(LiteralError {
            offset: start,
            message: "unterminated string".to_string(),
        })
    }

    fn number(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let mut digits = 0;
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits += 1;
            } else if c == '.' && !seen_dot {
                seen_dot = true;
            } else {
                break;
            }
            self.bump();
        }
        if digits == 0 {
            return Err(LiteralError {
                offset: start,
                message: "expected digits".to_string(),
            });
        }
        // A number glued to letters or operators ("2e5", "3+4", "1_000") is not a literal.
        if let Some(c) = self.peek() {
            if c.is_alphanumeric() || "_+-*/%()".contains(c) {
                return Err(self.error(format!("unexpected {:?} after number", c)));
            }
        }
        let text = &self.src[start..self.pos];
        if seen_dot {
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|e| LiteralError {
                    offset: start,
                    message: e.to_string(),
                })
        } else {
            text.parse::<i64>()
                .map(Literal::Int)
                .map_err(|e| LiteralError {
                    offset: start,
                    message: e.to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Literal {
        Literal::List(items.iter().map(|s| Literal::Str(s.to_string())).collect())
    }

    #[test]
    fn test_mixed_quote_styles() {
        let value = parse_literal(r#"['chicken', "rice", 'olive oil']"#).unwrap();
        assert_eq!(value, strs(&["chicken", "rice", "olive oil"]));
    }

    #[test]
    fn test_quotes_inside_strings() {
        let value = parse_literal(r#"["chef's knife", 'say \'hi\'']"#).unwrap();
        assert_eq!(value, strs(&["chef's knife", "say 'hi'"]));
    }

    #[test]
    fn test_numbers_with_and_without_decimals() {
        let value = parse_literal("[600, 60.0, -4, 20.5]").unwrap();
        assert_eq!(
            value,
            Literal::List(vec![
                Literal::Int(600),
                Literal::Float(60.0),
                Literal::Int(-4),
                Literal::Float(20.5),
            ])
        );
    }

    #[test]
    fn test_whitespace_and_trailing_comma() {
        let value = parse_literal("  [\n  '200g' ,\n  '3',\n]  ").unwrap();
        assert_eq!(value, strs(&["200g", "3"]));
        assert_eq!(parse_literal("[ ]").unwrap(), Literal::List(vec![]));
    }

    #[test]
    fn test_nested_lists() {
        let value = parse_literal("[[1, 2], ['a']]").unwrap();
        assert_eq!(
            value,
            Literal::List(vec![
                Literal::List(vec![Literal::Int(1), Literal::Int(2)]),
                strs(&["a"]),
            ])
        );
    }

    #[test]
    fn test_rejects_function_calls() {
        let err = parse_literal("[__import__('os').system('ls')]").unwrap_err();
        assert!(err.message.contains("does not start a literal"), "{}", err);
        assert!(parse_literal("[open('x')]").is_err());
    }

    #[test]
    fn test_rejects_arithmetic() {
        assert!(parse_literal("[1+2, 3]").is_err());
        assert!(parse_literal("[600 * 2]").is_err());
        assert!(parse_literal("[2**10]").is_err());
    }

    #[test]
    fn test_rejects_bare_names() {
        assert!(parse_literal("[chicken, rice]").is_err());
        assert!(parse_literal("[None]").is_err());
        assert!(parse_literal("[True]").is_err());
    }

    #[test]
    fn test_rejects_unterminated_input() {
        let err = parse_literal("['chicken', 'rice").unwrap_err();
        assert_eq!(err.message, "unterminated string");
        assert_eq!(err.offset, 12);
        assert!(parse_literal("['chicken'").is_err());
        assert!(parse_literal("").is_err());
    }

    #[test]
    fn test_rejects_trailing_content() {
        let err = parse_literal("['a'] ['b']").unwrap_err();
        assert!(err.message.contains("trailing"));
    }

    #[test]
    fn test_display_round_trips_shape() {
        let value = parse_literal("['egg', 3, 1.5]").unwrap();
        assert_eq!(value.to_string(), r#"["egg", 3, 1.5]"#);
    }
}
