//! `httpstub` is a programmable HTTP test double: an embedded server that answers
//! each inbound HTTP request from a set of pre-registered, scripted [`Answer`]s and
//! records which requests actually arrived, so that client-side HTTP code can be
//! exercised against deterministic server behavior without a real backend.
//!
//! The library consists of three pieces:
//!
//! * a **registration API** that scripts answers, optionally guarded by predicates
//!   over the incoming request and limited to a number of uses,
//! * an embedded **HTTP server** that matches every inbound request against the
//!   registered answers in registration order and falls back to a fixed `500`
//!   response when nothing matches, and
//! * a **retrieval API** that destructively reads the captured requests back so a
//!   test can assert on what the code under test actually sent.
//!
//! # Getting Started
//!
//! Add `httpstub` to your `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! httpstub = "0.1"
//! ```
//!
//! A typical test scripts one answer per expected request, points the code under
//! test at [`StubServer::home`], and inspects the captured traffic afterwards:
//!
//! ```rust
//! use httpstub::{Answer, StubServer};
//!
//! let server = StubServer::new();
//! server.next(Answer::ok("works fine!")).start().unwrap();
//!
//! // This simulates your code under test.
//! let response = reqwest::blocking::get(server.home().unwrap()).unwrap();
//!
//! assert_eq!(response.status().as_u16(), 200);
//! assert!(response.text().unwrap().starts_with("works"));
//!
//! // Inspect what actually arrived at the server.
//! let query = server.take().unwrap();
//! assert_eq!(query.method(), "GET");
//!
//! server.stop();
//! ```
//!
//! # Matching
//!
//! Answers are consumed in registration order: among all registrations whose
//! predicate accepts the request and whose uses are not exhausted, the oldest one
//! wins. This lets a test script an expected request/response conversation
//! pair-wise. Predicates are plain values implementing [`matchers::Match`] —
//! any `Fn(&Query) -> bool` closure qualifies, and the [`matchers`] module
//! provides common ones ([`matchers::method`], [`matchers::body`], …) along with
//! `and`/`or`/`not` combinators.
//!
//! If no registration matches, the server responds with status `500` and a fixed
//! descriptive reason phrase. Unmatched requests are counted by
//! [`StubServer::queries`] but never appear in any `take*` result.
//!
//! # Debugging
//!
//! `httpstub` logs against the `tracing` crate (with `log` compatibility). With
//! the `env_logger` backend, set `RUST_LOG=httpstub=debug` and call
//! `env_logger::try_init()` in your test to see registration and dispatch
//! decisions.

mod api;
mod common;
pub mod matchers;
mod server;

pub use api::{Error, StubServer};
pub use common::data::{Answer, Query};
pub use regex::Regex;
pub use server::server::Error as ServerError;

/// The most frequently used types and matcher constructors.
pub mod prelude {
    pub use crate::{
        matchers::{any, body, body_matches, has_body, has_header, has_status, header, method, path},
        Answer, Query, StubServer,
    };
}
