//! Predicates over captured [`Query`] values and recorded [`Answer`] values.
//!
//! A matcher is any value implementing the single-method [`Match`] capability;
//! every `Fn(&T) -> bool` closure qualifies through a blanket implementation, so
//! custom conditions need no boilerplate:
//!
//! ```rust
//! use httpstub::{matchers::{and, body, method}, Answer, Query, StubServer};
//!
//! let server = StubServer::new();
//! server.next_if(Answer::ok("created"), and(method("POST"), body("payload")));
//! server.next_if(Answer::ok("huge"), |query: &Query| query.body().len() > 1024);
//! ```

use regex::Regex;

use crate::common::data::{Answer, Query};

/// A single-method capability deciding whether a value satisfies a condition.
///
/// Implemented for all `Fn(&T) -> bool + Send + Sync` closures.
pub trait Match<T>: Send + Sync {
    fn matches(&self, value: &T) -> bool;
}

impl<T, F> Match<T> for F
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn matches(&self, value: &T) -> bool {
        self(value)
    }
}

// ===============================================================================================
// Combinators
// ===============================================================================================

/// Matches everything.
pub fn any<T>() -> impl Match<T> {
    |_: &T| true
}

pub fn and<T>(a: impl Match<T>, b: impl Match<T>) -> impl Match<T> {
    move |value: &T| a.matches(value) && b.matches(value)
}

pub fn or<T>(a: impl Match<T>, b: impl Match<T>) -> impl Match<T> {
    move |value: &T| a.matches(value) || b.matches(value)
}

pub fn not<T>(inner: impl Match<T>) -> impl Match<T> {
    move |value: &T| !inner.matches(value)
}

// ===============================================================================================
// Query matchers
// ===============================================================================================

/// The request method equals `expected` (case-insensitive).
pub fn method(expected: impl Into<String>) -> impl Match<Query> {
    let expected = expected.into();
    move |query: &Query| query.method().eq_ignore_ascii_case(&expected)
}

/// The path component of the target equals `expected`.
pub fn path(expected: impl Into<String>) -> impl Match<Query> {
    let expected = expected.into();
    move |query: &Query| query.path() == expected
}

/// Some occurrence of the header `name` carries exactly `value`.
pub fn header(name: impl Into<String>, value: impl Into<String>) -> impl Match<Query> {
    let name = name.into();
    let value = value.into();
    move |query: &Query| query.header(&name).contains(&value.as_str())
}

/// The request body equals `expected`, byte for byte.
pub fn body(expected: impl AsRef<[u8]>) -> impl Match<Query> {
    let expected = expected.as_ref().to_vec();
    move |query: &Query| query.body() == expected.as_slice()
}

/// The request body, viewed as (lossy) text, matches the regex.
pub fn body_matches(pattern: Regex) -> impl Match<Query> {
    move |query: &Query| pattern.is_match(&query.body_str())
}

// ===============================================================================================
// Answer matchers
// ===============================================================================================

/// The recorded answer carries the given status code.
pub fn has_status(expected: u16) -> impl Match<Answer> {
    move |answer: &Answer| answer.status() == expected
}

/// The recorded answer body equals `expected`, byte for byte.
pub fn has_body(expected: impl AsRef<[u8]>) -> impl Match<Answer> {
    let expected = expected.as_ref().to_vec();
    move |answer: &Answer| answer.body() == expected.as_slice()
}

/// Some occurrence of the header `name` on the recorded answer carries `value`.
pub fn has_header(name: impl Into<String>, value: impl Into<String>) -> impl Match<Answer> {
    let name = name.into();
    let value = value.into();
    move |answer: &Answer| answer.header(&name).contains(&value.as_str())
}
