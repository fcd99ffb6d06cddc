//! Variable references in formula text.
//!
//! A formula is free text with two kinds of variable reference:
//! - `[field]`: a field on the entity being evaluated
//! - `{entity}[field]`: a field on a named entity (case-insensitive name)
//!
//! [`scan`] finds the references positionally, left to right and without
//! overlap. [`resolve`] binds every distinct reference to a number and
//! rewrites the text so each reference becomes a generated symbol that the
//! expression parser can read. Field names may contain any character except
//! the closing delimiter, so `[收盘价]` and `[价]` are distinct tokens.

use crate::domain::entity::NameIndex;
use crate::domain::value::{FieldMap, Snapshot};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableRef {
    Local { field: String },
    Named { entity: String, field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub span: Range<usize>,
    pub var: VariableRef,
}

/// Symbol name → bound value, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<(String, f64)>,
}

impl Bindings {
    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == symbol)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, symbol: String, value: f64) {
        self.entries.push((symbol, value));
    }
}

/// A formula with every variable replaced by a bound symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub formula: String,
    pub bindings: Bindings,
}

/// Find every variable reference in `formula`.
pub fn scan(formula: &str) -> Vec<Token> {
    let bytes = formula.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let token = match bytes[pos] {
            b'[' => bracketed(formula, pos, b']').map(|(end, field)| Token {
                span: pos..end,
                var: VariableRef::Local {
                    field: field.to_string(),
                },
            }),
            b'{' => named(formula, pos),
            _ => None,
        };
        match token {
            Some(token) => {
                pos = token.span.end;
                tokens.push(token);
            }
            None => pos += 1,
        }
    }

    tokens
}

/// Inner text and end offset of a non-empty delimited run starting at `open`.
fn bracketed(formula: &str, open: usize, close: u8) -> Option<(usize, &str)> {
    let inner_start = open + 1;
    let len = formula.as_bytes()[inner_start..]
        .iter()
        .position(|&b| b == close)?;
    if len == 0 {
        return None;
    }
    let inner = &formula[inner_start..inner_start + len];
    Some((inner_start + len + 1, inner))
}

fn named(formula: &str, open: usize) -> Option<Token> {
    let (after_entity, entity) = bracketed(formula, open, b'}')?;
    if formula.as_bytes().get(after_entity) != Some(&b'[') {
        return None;
    }
    let (end, field) = bracketed(formula, after_entity, b']')?;
    Some(Token {
        span: open..end,
        var: VariableRef::Named {
            entity: entity.to_string(),
            field: field.to_string(),
        },
    })
}

/// Distinct references in order of first appearance.
pub fn references(formula: &str) -> Vec<VariableRef> {
    let mut refs: Vec<VariableRef> = Vec::new();
    for token in scan(formula) {
        if !refs.contains(&token.var) {
            refs.push(token.var);
        }
    }
    refs
}

/// Bind every reference in `formula` to a number.
///
/// Local references read `current`; named references go through `index` into
/// `all`. Returns `None` if any reference is missing or not numeric.
pub fn resolve(
    formula: &str,
    current: &FieldMap,
    all: &Snapshot,
    index: &NameIndex,
) -> Option<Resolved> {
    rewrite(formula, |var| match var {
        VariableRef::Local { field } => current.get(field)?.as_number(),
        VariableRef::Named { entity, field } => {
            let name = index.canonical(entity)?;
            all.get(name)?.get(field)?.as_number()
        }
    })
}

/// Rewrite with every reference bound to zero, for syntax checks.
pub fn placeholders(formula: &str) -> Resolved {
    rewrite(formula, |_| Some(0.0)).unwrap_or_else(|| Resolved {
        formula: formula.to_string(),
        bindings: Bindings::default(),
    })
}

fn rewrite(formula: &str, mut lookup: impl FnMut(&VariableRef) -> Option<f64>) -> Option<Resolved> {
    let tokens = scan(formula);
    let prefix = symbol_prefix(formula);
    let mut bindings = Bindings::default();
    let mut seen: Vec<&str> = Vec::new();
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;

    for token in &tokens {
        let text = &formula[token.span.clone()];
        let slot = match seen.iter().position(|t| *t == text) {
            Some(slot) => slot,
            None => {
                let value = lookup(&token.var)?;
                seen.push(text);
                bindings.push(symbol(&prefix, seen.len() - 1), value);
                seen.len() - 1
            }
        };
        out.push_str(&formula[last..token.span.start]);
        out.push_str(&symbol(&prefix, slot));
        last = token.span.end;
    }
    out.push_str(&formula[last..]);

    Some(Resolved {
        formula: out,
        bindings,
    })
}

/// A symbol prefix that does not occur anywhere in the formula text.
fn symbol_prefix(formula: &str) -> String {
    let mut prefix = String::from("__v");
    while formula.contains(&prefix) {
        prefix.insert(0, '_');
    }
    prefix
}

// Trailing '_' keeps `[a]2` from reading as a different symbol.
fn symbol(prefix: &str, slot: usize) -> String {
    format!("{prefix}{slot}_")
}
