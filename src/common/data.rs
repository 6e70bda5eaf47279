use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{common::util::StubBytes, matchers::Match};

/// An immutable record of one inbound HTTP request, exactly as it arrived on the
/// wire: method, origin-form target (path plus query string), the full ordered
/// header list, and the raw body bytes.
///
/// Header names may repeat; the list is deliberately not a name-unique map.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Query {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: StubBytes,
}

impl Query {
    pub(crate) fn new(
        method: String,
        target: String,
        headers: Vec<(String, String)>,
        body: StubBytes,
    ) -> Self {
        Self {
            method,
            target,
            headers,
            body,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request target as received: path plus query string, e.g. `/search?q=x`.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The path component of the target, without the query string.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// Decoded query parameters in the order they appear in the target.
    pub fn query_params_vec(&self) -> Vec<(String, String)> {
        let raw = self.target.split_once('?').map(|(_, q)| q).unwrap_or("");
        form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// All headers in arrival order, duplicates included.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// All values carried under `name`, compared case-insensitively. Two inbound
    /// headers with the same name yield a two-element list.
    pub fn header(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_ref()
    }

    pub fn body_bytes(&self) -> Bytes {
        self.body.to_bytes()
    }

    /// Lossy text view of the body. Binary-safe callers should use [`Query::body`].
    pub fn body_str(&self) -> Cow<str> {
        self.body.to_maybe_lossy_str()
    }
}

/// A scripted response: status code, optional reason phrase, ordered header list
/// (duplicates allowed), and a raw byte body. Immutable once registered.
///
/// ```rust
/// use httpstub::Answer;
///
/// let answer = Answer::new(404)
///     .with_reason("gone fishing")
///     .with_header("Content-Type", "text/plain")
///     .with_body("not here");
/// assert_eq!(answer.status(), 404);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Answer {
    status: u16,
    reason: Option<String>,
    headers: Vec<(String, String)>,
    body: StubBytes,
}

impl Answer {
    /// An answer with the given status code, no headers and an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: None,
            headers: Vec::new(),
            body: StubBytes::default(),
        }
    }

    /// A `200 OK` answer carrying the given body.
    pub fn ok(body: impl AsRef<[u8]>) -> Self {
        Self::new(200).with_body(body)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Overrides the reason phrase sent on the status line.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Appends a header. Calling this twice with the same name produces two
    /// distinct header occurrences on the wire.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl AsRef<[u8]>) -> Self {
        self.body = StubBytes(Bytes::copy_from_slice(body.as_ref()));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// All values carried under `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_ref()
    }

    pub fn body_bytes(&self) -> Bytes {
        self.body.to_bytes()
    }

    pub fn body_str(&self) -> Cow<str> {
        self.body.to_maybe_lossy_str()
    }
}

/// How often a registration may still answer. `Remaining` only ever decreases;
/// an entry at `Remaining(0)` is permanently excluded from matching but stays in
/// the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Uses {
    Remaining(usize),
    Unbounded,
}

impl Uses {
    pub(crate) fn available(&self) -> bool {
        match self {
            Uses::Remaining(n) => *n > 0,
            Uses::Unbounded => true,
        }
    }

    pub(crate) fn consume(&mut self) {
        if let Uses::Remaining(n) = self {
            *n -= 1;
        }
    }
}

/// One entry of the registration table: a predicate over incoming queries, the
/// answer served on a match, and the remaining use budget.
pub(crate) struct Registration {
    predicate: Box<dyn Match<Query>>,
    answer: Answer,
    remaining: Uses,
}

impl Registration {
    pub(crate) fn new(predicate: Box<dyn Match<Query>>, answer: Answer, uses: Uses) -> Self {
        Self {
            predicate,
            answer,
            remaining: uses,
        }
    }

    /// Whether this entry may serve the query: uses left and predicate holds.
    pub(crate) fn matches(&self, query: &Query) -> bool {
        self.remaining.available() && self.predicate.matches(query)
    }

    /// Decrements the use budget and hands out the scripted answer.
    pub(crate) fn consume(&mut self) -> Answer {
        self.remaining.consume();
        self.answer.clone()
    }

    pub(crate) fn answer(&self) -> &Answer {
        &self.answer
    }

    pub(crate) fn remaining(&self) -> Uses {
        self.remaining
    }
}

/// A capture-log entry: the query that arrived, the answer it received, and its
/// position in the dispatch order. Produced only for matched requests.
#[derive(Debug, Clone)]
pub(crate) struct Capture {
    query: Query,
    answer: Answer,
    sequence: usize,
}

impl Capture {
    pub(crate) fn new(query: Query, answer: Answer, sequence: usize) -> Self {
        Self {
            query,
            answer,
            sequence,
        }
    }

    pub(crate) fn query(&self) -> &Query {
        &self.query
    }

    pub(crate) fn answer(&self) -> &Answer {
        &self.answer
    }

    pub(crate) fn sequence(&self) -> usize {
        self.sequence
    }

    pub(crate) fn into_query(self) -> Query {
        self.query
    }
}
