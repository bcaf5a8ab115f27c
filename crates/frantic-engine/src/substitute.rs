//! `${name}` substitution
//!
//! Expansion repeatedly replaces the first well-formed marker and rescans the
//! result from the start. A marker is an opening `${` whose closing `}` comes
//! before any further `${`; when another `${` intervenes the scan resumes from
//! it, so `${build${token}}` resolves the inner marker first. Unterminated
//! markers are left verbatim.

use crate::error::{EngineError, EngineResult};
use std::convert::Infallible;
use tracing::trace;

pub const KEY_PREFIX: &str = "${";
pub const KEY_SUFFIX: &str = "}";

/// How undefined names are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingProperty {
    /// Expand to the empty string
    Empty,
    /// Fail with [`EngineError::UndefinedProperty`]
    Fail,
}

/// Expand every marker in `phrase` using `lookup`
///
/// At most `limit` replacements are made. Exceeding it fails with
/// [`EngineError::SubstitutionLimit`] carrying the text expanded so far.
pub fn expand<F>(
    phrase: &str,
    lookup: F,
    missing: MissingProperty,
    limit: usize,
) -> EngineResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let resolve = |key: &str| match lookup(key) {
        Some(value) => Ok(value),
        None if missing == MissingProperty::Fail => Err(EngineError::UndefinedProperty {
            name: key.to_string(),
        }),
        None => Ok(String::new()),
    };
    scan(phrase, resolve, limit).map_err(|stop| match stop {
        Stop::Lookup(err) => err,
        Stop::Limit(partial) => EngineError::SubstitutionLimit { limit, partial },
    })
}

/// Expand every marker, undefined names becoming empty strings
///
/// Returns the partially expanded text as the error once `limit`
/// replacements have been made.
pub fn expand_lenient<F>(phrase: &str, lookup: F, limit: usize) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let resolve = |key: &str| Ok::<_, Infallible>(lookup(key).unwrap_or_default());
    scan(phrase, resolve, limit).map_err(|stop| match stop {
        Stop::Lookup(never) => match never {},
        Stop::Limit(partial) => partial,
    })
}

enum Stop<E> {
    Lookup(E),
    Limit(String),
}

fn scan<F, E>(phrase: &str, resolve: F, limit: usize) -> Result<String, Stop<E>>
where
    F: Fn(&str) -> Result<String, E>,
{
    let mut current = phrase.to_string();
    let mut replacements = 0;

    while let Some((open, close)) = find_marker(&current) {
        if replacements >= limit {
            return Err(Stop::Limit(current));
        }

        let key = &current[open + KEY_PREFIX.len()..close];
        let value = resolve(key).map_err(Stop::Lookup)?;
        trace!(key, value = value.as_str(), "substituting property");

        current.replace_range(open..close + KEY_SUFFIX.len(), &value);
        replacements += 1;
    }

    Ok(current)
}

/// Whether `phrase` contains at least one well-formed marker
pub fn has_marker(phrase: &str) -> bool {
    find_marker(phrase).is_some()
}

/// Locate the first well-formed marker as (prefix offset, suffix offset)
fn find_marker(phrase: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while from < phrase.len() {
        let open = from + phrase[from..].find(KEY_PREFIX)?;
        let body = open + KEY_PREFIX.len();
        let close = body + phrase[body..].find(KEY_SUFFIX)?;
        match phrase[body..].find(KEY_PREFIX).map(|offset| body + offset) {
            Some(next_open) if next_open < close => from = next_open,
            _ => return Some((open, close)),
        }
    }
    None
}
