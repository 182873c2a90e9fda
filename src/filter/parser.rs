//! Parser for the textual filter form
//!
//! Grammar:
//!
//! ```text
//! filter  := clause ( "and" clause )?
//! clause  := field op literal | field "ne" "null"
//! op      := "lt" | "le" | "gt" | "ge" | "eq"
//! literal := integer | float | rfc3339-timestamp | 'quoted ''string'''
//! ```

use chrono::{DateTime, Utc};

use crate::domain::Bound;
use crate::error::{FilterError, Result};

use super::{Endpoint, RangeFilter};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
}

pub(super) fn parse(expression: &str) -> Result<RangeFilter> {
    let syntax = |message: &str| FilterError::Syntax {
        expression: expression.to_string(),
        message: message.to_string(),
    };

    let tokens = tokenize(expression).map_err(|m| syntax(&m))?;
    let clauses: Vec<&[Token]> = tokens
        .split(|t| matches!(t, Token::Word(w) if w.eq_ignore_ascii_case("and")))
        .collect();
    if clauses.len() > 2 {
        return Err(syntax("at most two clauses are supported").into());
    }

    let mut field: Option<String> = None;
    let mut lower: Option<Endpoint> = None;
    let mut upper: Option<Endpoint> = None;

    for clause in clauses {
        let [Token::Word(name), Token::Word(op), literal] = clause else {
            return Err(syntax("expected '<field> <op> <value>'").into());
        };

        match &field {
            Some(existing) if existing != name => {
                return Err(syntax("all clauses must use the same field").into());
            }
            Some(_) => {}
            None => field = Some(name.clone()),
        }

        let op = op.to_ascii_lowercase();
        if op == "ne" {
            if !matches!(literal, Token::Word(w) if w == "null") {
                return Err(syntax("'ne' is only supported with null").into());
            }
            continue;
        }

        let value = parse_literal(literal).map_err(|m| syntax(&m))?;
        let (slot, end) = match op.as_str() {
            "ge" => (&mut lower, Endpoint::inclusive(value)),
            "gt" => (&mut lower, Endpoint::exclusive(value)),
            "le" => (&mut upper, Endpoint::inclusive(value)),
            "lt" => (&mut upper, Endpoint::exclusive(value)),
            "eq" => {
                if lower.is_some() || upper.is_some() {
                    return Err(syntax("'eq' cannot be combined with other clauses").into());
                }
                lower = Some(Endpoint::inclusive(value.clone()));
                (&mut upper, Endpoint::inclusive(value))
            }
            other => return Err(syntax(&format!("unknown operator '{other}'")).into()),
        };
        if slot.is_some() {
            return Err(syntax("duplicate bound").into());
        }
        *slot = Some(end);
    }

    let field = field.ok_or_else(|| syntax("empty expression"))?;
    Ok(RangeFilter::new(field, lower, upper))
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        text.push('\'');
                    }
                    Some('\'') => break,
                    Some(c) => text.push(c),
                    None => return Err("unterminated string literal".to_string()),
                }
            }
            tokens.push(Token::Quoted(text));
            continue;
        }

        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '\'' {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(Token::Word(word));
    }

    Ok(tokens)
}

fn parse_literal(token: &Token) -> std::result::Result<Bound, String> {
    let word = match token {
        Token::Quoted(text) => return Ok(Bound::String(text.clone())),
        Token::Word(word) => word,
    };

    if let Ok(v) = word.parse::<i64>() {
        return Ok(Bound::Integer(v));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(word) {
        return Ok(Bound::Timestamp(ts.with_timezone(&Utc)));
    }
    match word.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Bound::Float(v)),
        _ => Err(format!("invalid literal '{word}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_kinds() {
        let f = parse("x ge -12 and x lt 3.5").unwrap();
        assert_eq!(f.lower().unwrap().value, Bound::Integer(-12));
        assert_eq!(f.upper().unwrap().value, Bound::Float(3.5));

        let f = parse("t gt 2023-06-01T12:00:00.000Z").unwrap();
        assert!(matches!(f.lower().unwrap().value, Bound::Timestamp(_)));
        assert!(!f.lower().unwrap().inclusive);

        let f = parse("name le 'it''s here'").unwrap();
        assert_eq!(f.upper().unwrap().value, Bound::String("it's here".into()));
    }

    #[test]
    fn test_offset_timestamps_normalize_to_utc() {
        let a = parse("t ge 2023-06-01T14:00:00+02:00").unwrap();
        let b = parse("t ge 2023-06-01T12:00:00Z").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unbounded() {
        let f = parse("x ne null").unwrap();
        assert!(f.lower().is_none() && f.upper().is_none());
        assert_eq!(f.to_string(), "x ne null");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "x",
            "x ge",
            "x ge 1 and y lt 2",
            "x ge 1 and x gt 2",
            "x between 1",
            "x ge 'open",
            "x ge nan",
            "x ge 1 and x le 2 and x lt 3",
            "x ge 1 and x eq 2",
        ] {
            assert!(parse(bad).is_err(), "accepted {bad:?}");
        }
    }
}
