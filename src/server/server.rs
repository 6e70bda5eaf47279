use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use futures_util::FutureExt;
use http::{Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    service::service_fn,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto::Builder as ServerBuilder, graceful::GracefulShutdown},
};
use thiserror::Error;
use tokio::{net::TcpListener, sync::oneshot::Sender, task::spawn, time::sleep};

use crate::server::{
    handler::{self, Handler},
    server::Error::{
        BufferError, HandlerError, LocalSocketAddrError, PublishSocketAddrError, SocketBindError,
    },
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot bind to socket addr {0}: {1}")]
    SocketBindError(SocketAddr, std::io::Error),
    #[error("cannot parse socket address: {0}")]
    SocketAddrParseError(#[from] std::net::AddrParseError),
    #[error("cannot obtain local socket address: {0}")]
    LocalSocketAddrError(std::io::Error),
    #[error("cannot send reserved TCP address to controlling thread: {0}")]
    PublishSocketAddrError(SocketAddr),
    #[error("buffering error: {0}")]
    BufferError(hyper::Error),
    #[error("HTTP error: {0}")]
    HTTPError(#[from] http::Error),
    #[error("cannot process request: {0}")]
    HandlerError(#[from] handler::Error),
    #[error("unknown server error")]
    Unknown,
}

/// Upper bound of the connection drain performed on shutdown. In-flight
/// responses get this long to complete before remaining connections are closed
/// forcibly; the listener itself is released before the drain begins.
const SHUTDOWN_DRAIN_PERIOD: Duration = Duration::from_secs(5);

pub(crate) struct ServerConfig {
    /// Bind to this port instead of an ephemeral one. Tests normally leave this
    /// empty so parallel servers never collide.
    pub static_port: Option<u16>,
}

/// The transport shell: owns the listener and hands every buffered request to
/// the [`Handler`].
pub(crate) struct HttpServer<H>
where
    H: Handler + Send + Sync + 'static,
{
    handler: Box<H>,
    config: ServerConfig,
}

impl<H> HttpServer<H>
where
    H: Handler + Send + Sync + 'static,
{
    pub(crate) fn new(handler: Box<H>, config: ServerConfig) -> Self {
        HttpServer { handler, config }
    }

    /// Binds the listener, publishes the reserved address through
    /// `socket_addr_sender`, and serves connections until `shutdown` resolves.
    pub(crate) async fn start_with_signals<F>(
        self,
        socket_addr_sender: Option<Sender<SocketAddr>>,
        shutdown: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        let addr: SocketAddr =
            format!("127.0.0.1:{}", self.config.static_port.unwrap_or(0)).parse()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| SocketBindError(addr, err))?;

        let addr = listener.local_addr().map_err(LocalSocketAddrError)?;
        if let Some(sender) = socket_addr_sender {
            sender.send(addr).map_err(PublishSocketAddrError)?;
        }

        tracing::info!("listening on {}", addr);
        self.run_accept_loop(listener, shutdown).await
    }

    async fn run_accept_loop<F>(self, listener: TcpListener, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        let shutdown = shutdown.shared();
        let server = Arc::new(self);
        let graceful = GracefulShutdown::new();

        let mut builder = ServerBuilder::new(TokioExecutor::new());
        builder.http1().preserve_header_case(true);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((tcp_stream, remote_address)) => {
                            tracing::trace!("new TCP connection from {}", remote_address);

                            let server = server.clone();
                            let connection = builder
                                .serve_connection_with_upgrades(
                                    TokioIo::new(tcp_stream),
                                    service_fn(move |req| server.clone().service(req)),
                                )
                                .into_owned();
                            let connection = graceful.watch(connection);

                            spawn(async move {
                                if let Err(err) = connection.await {
                                    tracing::trace!("connection terminated: {:?}", err);
                                }
                            });
                        }
                        Err(err) => {
                            tracing::error!("TCP accept error: {:?}", err);
                        }
                    }
                }
                _ = shutdown.clone() => {
                    break;
                }
            }
        }

        // Release the port before draining so it is never held for the full
        // drain period.
        drop(listener);

        tokio::select! {
            _ = graceful.shutdown() => {
                tracing::debug!("all connections drained");
            }
            _ = sleep(SHUTDOWN_DRAIN_PERIOD) => {
                tracing::warn!(
                    "connections still open after {:?}, closing them forcibly",
                    SHUTDOWN_DRAIN_PERIOD
                );
            }
        }

        Ok(())
    }

    async fn service(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
        tracing::trace!("inbound request: {} {}", req.method(), req.uri());

        let req = match buffer_request(req).await {
            Ok(req) => req,
            Err(err) => {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, BufferError(err));
            }
        };

        match self.handler.handle(req).await {
            Ok(response) => to_service_response(response),
            Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, HandlerError(err)),
        }
    }
}

/// Collects the request body into memory so the handler only ever sees fully
/// buffered, binary-safe requests.
async fn buffer_request(req: Request<Incoming>) -> Result<Request<Bytes>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Request::from_parts(parts, body))
}

fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

fn error_response(
    code: StatusCode,
    err: Error,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
    tracing::error!("failed to process request: {}", err);
    Ok(Response::builder().status(code).body(full(err.to_string()))?)
}

fn to_service_response(
    response: Response<Bytes>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, full(body)))
}
