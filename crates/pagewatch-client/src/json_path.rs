//! Minimal path expressions over JSON documents.
//!
//! Supported forms: `data.items[0].name`, `items[*].price`, `items.*.price`,
//! `["key with.dot"]` and an optional leading `$`. A wildcard maps the rest
//! of the path over every element of an array (or value of an object).
//! Missing keys and out-of-range indices select `null`.

use pagewatch_core::error::AppError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    Wildcard,
}

pub fn parse_path(expr: &str) -> Result<Vec<PathSegment>, AppError> {
    let invalid = |reason: &str| AppError::ParseError(format!("Invalid JSON path '{expr}': {reason}"));

    let mut segments = Vec::new();
    let mut chars = expr.trim().trim_start_matches('$').chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '.' => {
                chars.next();
            }
            '[' => {
                chars.next();
                match chars.peek().copied() {
                    Some(quote @ ('"' | '\'')) => {
                        chars.next();
                        let mut key = String::new();
                        loop {
                            match chars.next() {
                                Some(ch) if ch == quote => break,
                                Some(ch) => key.push(ch),
                                None => return Err(invalid("unterminated quoted key")),
                            }
                        }
                        segments.push(PathSegment::Key(key));
                    }
                    Some('*') => {
                        chars.next();
                        segments.push(PathSegment::Wildcard);
                    }
                    _ => {
                        let mut digits = String::new();
                        while let Some(&d) = chars.peek() {
                            if d == ']' {
                                break;
                            }
                            digits.push(d);
                            chars.next();
                        }
                        let index = digits
                            .trim()
                            .parse::<usize>()
                            .map_err(|_| invalid("expected an index, '*' or a quoted key"))?;
                        segments.push(PathSegment::Index(index));
                    }
                }
                if chars.next() != Some(']') {
                    return Err(invalid("missing ']'"));
                }
            }
            _ => {
                let mut key = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '.' || ch == '[' {
                        break;
                    }
                    key.push(ch);
                    chars.next();
                }
                if key == "*" {
                    segments.push(PathSegment::Wildcard);
                } else {
                    segments.push(PathSegment::Key(key));
                }
            }
        }
    }

    Ok(segments)
}

/// Evaluate a parsed path against a document.
pub fn select(value: &Value, path: &[PathSegment]) -> Value {
    let Some((head, rest)) = path.split_first() else {
        return value.clone();
    };

    match (head, value) {
        (PathSegment::Key(key), Value::Object(map)) => {
            map.get(key).map_or(Value::Null, |v| select(v, rest))
        }
        (PathSegment::Index(i), Value::Array(items)) => {
            items.get(*i).map_or(Value::Null, |v| select(v, rest))
        }
        (PathSegment::Wildcard, Value::Array(items)) => {
            Value::Array(items.iter().map(|v| select(v, rest)).collect())
        }
        (PathSegment::Wildcard, Value::Object(map)) => {
            Value::Array(map.values().map(|v| select(v, rest)).collect())
        }
        _ => Value::Null,
    }
}

/// Parse a body as JSON and render the selection as pretty-printed text.
pub fn extract_json(body: &str, path: Option<&str>) -> Result<String, AppError> {
    let document: Value = serde_json::from_str(body)
        .map_err(|e| AppError::ParseError(format!("Response is not valid JSON: {e}")))?;

    let selection = match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(expr) => select(&document, &parse_path(expr)?),
        None => document,
    };

    Ok(serde_json::to_string_pretty(&selection)?)
}
