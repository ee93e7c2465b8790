//! Query normalization
//!
//! Turns the shorthand users type into the query parser's grammar:
//!
//! - clauses separated by `&` are combined with an explicit `AND`
//! - `field=value` becomes `field:value` with the field name in its canonical
//!   case (`pld=10` becomes `PLD:10`)
//!
//! Rewriting only happens where a token starts. A `field=` sequence inside a
//! quoted phrase or in the middle of a value is left alone. Nothing else is
//! escaped: a malformed clause reaches the parser unchanged and fails there.
//!
//! Normalizing an already normalized query (no `=`, no `&`) returns it
//! unchanged. The few rewrites the parser itself needs, such as spreading a
//! bare number over the numeric fields, happen in
//! [`NormalizedQuery::parser_text`] when the query runs.

use std::collections::BTreeSet;
use std::fmt;

use crate::search::schema::MofField;

/// A query in parser grammar plus the fields it names explicitly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    text: String,
    referenced: BTreeSet<MofField>,
}

impl NormalizedQuery {
    /// Wrap text that is already in parser grammar, skipping normalization
    pub(crate) fn from_parser_text(text: String) -> Self {
        Self {
            text,
            referenced: BTreeSet::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Fields named by a `field:` or `field=` qualifier
    pub fn referenced_fields(&self) -> &BTreeSet<MofField> {
        &self.referenced
    }

    pub fn references(&self, field: MofField) -> bool {
        self.referenced.contains(&field)
    }

    /// Text handed to the query parser
    ///
    /// Field qualifiers get their canonical case (`pld:10` runs as `PLD:10`)
    /// and a bare number runs against every numeric field, so `10.5` becomes
    /// `(PLD:10.5 OR LCD:10.5 OR ... OR id:10.5)`. Range bounds and quoted
    /// phrases are left alone.
    pub fn parser_text(&self) -> String {
        let mut range_depth = 0usize;

        split_tokens(&self.text)
            .into_iter()
            .map(|(segment, is_token)| {
                if !is_token {
                    return segment.to_string();
                }
                let rewritten = if range_depth == 0 {
                    execution_token(segment)
                } else {
                    segment.to_string()
                };
                range_depth = update_range_depth(segment, range_depth);
                rewritten
            })
            .collect()
    }
}

impl fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Normalize a user query string
pub fn normalize_query(raw: &str) -> NormalizedQuery {
    let mut referenced = BTreeSet::new();

    let clauses: Vec<String> = split_clauses(raw)
        .into_iter()
        .map(|clause| normalize_clause(clause, &mut referenced))
        .collect();

    let text = if clauses.len() > 1 {
        clauses
            .iter()
            .map(|clause| {
                if has_top_level_whitespace(clause) {
                    format!("({clause})")
                } else {
                    clause.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    } else {
        clauses.into_iter().next().unwrap_or_default()
    };

    NormalizedQuery { text, referenced }
}

/// Split on `&` outside quoted phrases, trimming and dropping empty clauses
fn split_clauses(raw: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (pos, c) in raw.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '&' if !in_quotes => {
                clauses.push(&raw[start..pos]);
                start = pos + c.len_utf8();
            }
            _ => {}
        }
    }
    clauses.push(&raw[start..]);

    clauses
        .into_iter()
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .collect()
}

fn normalize_clause(clause: &str, referenced: &mut BTreeSet<MofField>) -> String {
    split_tokens(clause)
        .into_iter()
        .map(|(segment, is_token)| {
            if is_token {
                rewrite_token(segment, referenced)
            } else {
                segment.to_string()
            }
        })
        .collect()
}

/// Split a clause into whitespace and token segments, keeping quoted phrases whole
fn split_tokens(clause: &str) -> Vec<(&str, bool)> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let mut in_token: Option<bool> = None;

    for (pos, c) in clause.char_indices() {
        let is_token_char = in_quotes || !c.is_whitespace();
        if c == '"' {
            in_quotes = !in_quotes;
        }
        match in_token {
            Some(current) if current != is_token_char => {
                segments.push((&clause[start..pos], current));
                start = pos;
                in_token = Some(is_token_char);
            }
            None => in_token = Some(is_token_char),
            _ => {}
        }
    }
    if let Some(current) = in_token {
        segments.push((&clause[start..], current));
    }

    segments
}

/// Split a token like `-field=value` into prefix operators, field, separator and value
fn split_qualifier(token: &str) -> Option<(&str, MofField, char, &str)> {
    let body_start = token
        .find(|c: char| !matches!(c, '(' | '+' | '-'))
        .unwrap_or(token.len());
    let (prefix, body) = token.split_at(body_start);

    let sep = body.find(['=', ':'])?;
    let field = MofField::from_name(&body[..sep])?;
    Some((prefix, field, char::from(body.as_bytes()[sep]), &body[sep + 1..]))
}

/// Rewrite a leading `field=` qualifier of one token and record the field
///
/// A `field:` qualifier is recorded but kept exactly as typed.
fn rewrite_token(token: &str, referenced: &mut BTreeSet<MofField>) -> String {
    match split_qualifier(token) {
        Some((prefix, field, '=', value)) => {
            referenced.insert(field);
            format!("{prefix}{}:{value}", field.name())
        }
        Some((_, field, _, _)) => {
            referenced.insert(field);
            token.to_string()
        }
        None => token.to_string(),
    }
}

/// Parser form of one top-level token
fn execution_token(token: &str) -> String {
    let body_start = token
        .find(|c: char| !matches!(c, '(' | '+'))
        .unwrap_or(token.len());
    let (prefix, rest) = token.split_at(body_start);
    let (body, suffix) = rest.split_at(rest.trim_end_matches(')').len());

    if body.parse::<f64>().is_ok_and(f64::is_finite) {
        let alternatives: Vec<String> = MofField::DEFAULT_NUMERIC
            .iter()
            .map(|field| format!("{}:{}", field.name(), body))
            .collect();
        return format!("{prefix}({}){suffix}", alternatives.join(" OR "));
    }

    match split_qualifier(token) {
        Some((prefix, field, ':', value)) => format!("{prefix}{}:{value}", field.name()),
        _ => token.to_string(),
    }
}

/// Nesting of `[`/`{` range brackets after a token, ignoring quoted text
fn update_range_depth(token: &str, mut depth: usize) -> usize {
    let mut in_quotes = false;
    for c in token.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '[' | '{' if !in_quotes => depth += 1,
            ']' | '}' if !in_quotes => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

/// Whether a clause has whitespace outside quotes and brackets
fn has_top_level_whitespace(clause: &str) -> bool {
    let mut depth = 0usize;
    let mut in_quotes = false;

    for c in clause.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' | '[' | '{' if !in_quotes => depth += 1,
            ')' | ']' | '}' if !in_quotes => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && !in_quotes && depth == 0 => return true,
            _ => {}
        }
    }

    false
}
