use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use hyper::{body::Bytes, ext::ReasonPhrase};
use thiserror::Error;

use crate::{
    common::{
        data::{Answer, Query},
        util::StubBytes,
    },
    server::{handler::Error::InvalidHeader, state::StateManager},
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid status code: {0}")]
    InvalidStatusCode(#[from] http::status::InvalidStatusCode),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("cannot construct response: {0}")]
    ResponseConstructionError(#[from] http::Error),
}

/// Reason phrase of the fixed fallback response sent when no registration
/// matches an inbound request.
const FALLBACK_REASON: &[u8] = b"no scripted answer matched the request";

#[async_trait]
pub(crate) trait Handler {
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

/// The per-request dispatch engine. For each buffered inbound request it builds
/// a [`Query`], consults the shared state (which counts the request, picks the
/// first eligible registration and records the capture), and serializes the
/// chosen answer verbatim — or the fixed `500` fallback when nothing matched.
pub(crate) struct StubHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    state: Arc<S>,
}

impl<S> StubHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    pub(crate) fn new(state: Arc<S>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl<S> Handler for StubHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let query = into_query(req);
        tracing::trace!("dispatching {} {}", query.method(), query.target());

        match self.state.serve(query) {
            Some(answer) => to_response(&answer),
            None => Ok(fallback_response()),
        }
    }
}

/// Converts a buffered request into the immutable capture model: method, the
/// origin-form target, every header occurrence in arrival order, and the raw
/// body bytes.
fn into_query(req: Request<Bytes>) -> Query {
    let (parts, body) = req.into_parts();

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let mut headers = Vec::with_capacity(parts.headers.len());
    for (name, value) in parts.headers.iter() {
        headers.push((
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).to_string(),
        ));
    }

    Query::new(
        parts.method.as_str().to_string(),
        target,
        headers,
        StubBytes(body),
    )
}

/// Serializes an answer onto the wire format: status, optional custom reason
/// phrase, every header occurrence (duplicates included), and the body bytes.
fn to_response(answer: &Answer) -> Result<Response<Bytes>, Error> {
    let status = StatusCode::from_u16(answer.status())?;

    let mut response = Response::builder().status(status).body(answer.body_bytes())?;

    for (name, value) in answer.headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| InvalidHeader(err.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|err| InvalidHeader(err.to_string()))?;
        response.headers_mut().append(name, value);
    }

    if let Some(reason) = answer.reason() {
        match ReasonPhrase::try_from(reason.as_bytes().to_vec()) {
            Ok(reason) => {
                response.extensions_mut().insert(reason);
            }
            Err(err) => {
                tracing::warn!("ignoring unusable reason phrase {:?}: {:?}", reason, err)
            }
        }
    }

    Ok(response)
}

fn fallback_response() -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(FALLBACK_REASON));
    response
}

#[cfg(test)]
mod test {
    use super::*;

    fn request(method: &str, uri: &str, body: &[u8]) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::copy_from_slice(body))
            .unwrap()
    }

    #[test]
    fn query_preserves_target_and_body() {
        let query = into_query(request("POST", "/orders?priority=high", b"\x00payload\xFF"));

        assert_eq!(query.method(), "POST");
        assert_eq!(query.target(), "/orders?priority=high");
        assert_eq!(query.body(), b"\x00payload\xFF");
    }

    #[test]
    fn query_preserves_duplicate_headers() {
        let req = Request::builder()
            .method("GET")
            .uri("/")
            .header("X-Something", "text/html")
            .header("X-Something", "text/xml")
            .body(Bytes::new())
            .unwrap();

        let query = into_query(req);
        assert_eq!(query.header("x-something"), vec!["text/html", "text/xml"]);
    }

    #[test]
    fn response_carries_duplicate_headers_and_exact_body() {
        let answer = Answer::new(201)
            .with_header("X-Token", "one")
            .with_header("X-Token", "two")
            .with_body([0x00u8, 0x45, 0xFF]);

        let response = to_response(&answer).unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let tokens: Vec<_> = response
            .headers()
            .get_all("x-token")
            .iter()
            .map(|value| value.to_str().unwrap())
            .collect();
        assert_eq!(tokens, vec!["one", "two"]);
        assert_eq!(response.body().as_ref(), &[0x00u8, 0x45, 0xFF][..]);
    }

    #[test]
    fn invalid_status_code_is_rejected() {
        let answer = Answer::new(99);
        assert!(matches!(
            to_response(&answer),
            Err(Error::InvalidStatusCode(_))
        ));
    }

    #[test]
    fn fallback_is_a_plain_500() {
        let response = fallback_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body().is_empty());
        assert_eq!(
            response.extensions().get::<ReasonPhrase>().unwrap().as_bytes(),
            FALLBACK_REASON
        );
    }
}
