use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;
use tokio::{runtime::Runtime, sync::oneshot, task::JoinHandle};

use crate::{
    common::{
        data::{Answer, Query, Registration, Uses},
        runtime,
        util::Join,
    },
    matchers::{any, Match},
    server::{
        handler::StubHandler,
        server::{self, HttpServer, ServerConfig},
        state::{StateManager, StubStateManager},
    },
};

#[derive(Error, Debug)]
pub enum Error {
    /// The address accessors require a running listener.
    #[error("server has not been started")]
    NotStarted,
    #[error("server is already running")]
    AlreadyStarted,
    /// No captured request satisfies the retrieval condition. Only matched
    /// requests are captured; requests answered by the `500` fallback never
    /// appear in the log.
    #[error("no captured request satisfies the condition")]
    NoSuchCapture,
    #[error("cannot create server runtime: {0}")]
    RuntimeError(#[from] std::io::Error),
    #[error("server error: {0}")]
    ServerError(#[from] crate::ServerError),
}

struct ServerHandle {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    runtime: Runtime,
    task: JoinHandle<Result<(), server::Error>>,
}

/// A programmable HTTP test double.
///
/// A `StubServer` owns three things: an ordered registration table of scripted
/// [`Answer`]s, a capture log of the requests that were answered from that
/// table, and the embedded HTTP listener that connects the two. One instance is
/// meant to be created per test; there is no shared global server.
///
/// Registrations are consulted oldest-first, each limited to its registered
/// number of uses, so a test can script an expected conversation pair-wise:
///
/// ```rust
/// use httpstub::{Answer, StubServer};
///
/// let server = StubServer::new();
/// server
///     .next(Answer::ok("first"))
///     .next(Answer::ok("second"))
///     .start()
///     .unwrap();
///
/// let first = reqwest::blocking::get(server.home().unwrap()).unwrap();
/// assert_eq!(first.text().unwrap(), "first");
/// let second = reqwest::blocking::get(server.home().unwrap()).unwrap();
/// assert_eq!(second.text().unwrap(), "second");
/// ```
///
/// Dropping the server stops it, so the bound port is released on every exit
/// path of the test. [`StubServer::stop`] may also be called explicitly and is
/// idempotent.
pub struct StubServer {
    state: Arc<StubStateManager>,
    handle: Mutex<Option<ServerHandle>>,
}

impl StubServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(StubStateManager::new()),
            handle: Mutex::new(None),
        }
    }

    // ===========================================================================================
    // Registration
    // ===========================================================================================

    /// Registers `answer` for the next otherwise-unclaimed request (any method,
    /// any target), usable once. Returns `&self` so registrations chain.
    pub fn next(&self, answer: Answer) -> &Self {
        self.next_if(answer, any())
    }

    /// Registers `answer` for the next request accepted by `predicate`, usable
    /// once.
    pub fn next_if<M>(&self, answer: Answer, predicate: M) -> &Self
    where
        M: Match<Query> + 'static,
    {
        self.register(answer, predicate, Uses::Remaining(1))
    }

    /// Registers `answer` for up to `times` requests accepted by `predicate`.
    /// Once exhausted the registration stays in the table but never matches
    /// again.
    pub fn repeat<M>(&self, answer: Answer, predicate: M, times: usize) -> &Self
    where
        M: Match<Query> + 'static,
    {
        self.register(answer, predicate, Uses::Remaining(times))
    }

    /// Registers `answer` for every request accepted by `predicate`, without a
    /// use limit.
    pub fn always<M>(&self, answer: Answer, predicate: M) -> &Self
    where
        M: Match<Query> + 'static,
    {
        self.register(answer, predicate, Uses::Unbounded)
    }

    fn register<M>(&self, answer: Answer, predicate: M, uses: Uses) -> &Self
    where
        M: Match<Query> + 'static,
    {
        self.state
            .add_registration(Registration::new(Box::new(predicate), answer, uses));
        self
    }

    // ===========================================================================================
    // Retrieval
    // ===========================================================================================

    /// Removes and returns the oldest captured request. Fails immediately with
    /// [`Error::NoSuchCapture`] when the log is empty — it never waits for
    /// network activity; issue and await the triggering request first.
    pub fn take(&self) -> Result<Query, Error> {
        self.state
            .take_oldest()
            .map(|capture| capture.into_query())
            .ok_or(Error::NoSuchCapture)
    }

    /// Removes and returns the oldest captured request whose *recorded answer*
    /// satisfies `predicate`, leaving all other captures and their relative
    /// order untouched. Fails with [`Error::NoSuchCapture`] when none qualifies.
    pub fn take_matching<M>(&self, predicate: M) -> Result<Query, Error>
    where
        M: Match<Answer>,
    {
        self.state
            .take_matching(&predicate)
            .map(|capture| capture.into_query())
            .ok_or(Error::NoSuchCapture)
    }

    /// Removes and returns every captured request whose recorded answer
    /// satisfies `predicate`, in original arrival order. Unlike
    /// [`StubServer::take_matching`], zero matches yield an empty vector, not
    /// an error.
    pub fn take_all<M>(&self, predicate: M) -> Vec<Query>
    where
        M: Match<Answer>,
    {
        self.state
            .take_all_matching(&predicate)
            .into_iter()
            .map(|capture| capture.into_query())
            .collect()
    }

    /// Total number of inbound requests seen so far, matched or not. Unmatched
    /// requests increment this counter but never show up in the capture log.
    pub fn queries(&self) -> usize {
        self.state.request_count()
    }

    // ===========================================================================================
    // Lifecycle
    // ===========================================================================================

    /// Binds the listener to an ephemeral loopback port and starts serving on
    /// background workers. Returns once the port is reserved, so
    /// [`StubServer::home`] is valid immediately afterwards.
    pub fn start(&self) -> Result<(), Error> {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let runtime = runtime::new(2, 1)?;

        let (addr_sender, addr_receiver) = oneshot::channel::<SocketAddr>();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();

        let server = HttpServer::new(
            Box::new(StubHandler::new(self.state.clone())),
            ServerConfig { static_port: None },
        );

        let task = runtime.spawn(server.start_with_signals(Some(addr_sender), async move {
            let _ = shutdown_receiver.await;
        }));

        let addr = match addr_receiver.join() {
            Ok(addr) => addr,
            Err(_) => {
                // The listener never bound; surface the bind error instead of
                // the closed channel.
                let err = match runtime.block_on(task) {
                    Ok(Err(err)) => err,
                    _ => server::Error::Unknown,
                };
                return Err(Error::ServerError(err));
            }
        };

        *handle = Some(ServerHandle {
            addr,
            shutdown: shutdown_sender,
            runtime,
            task,
        });

        Ok(())
    }

    /// The base address of the running server, e.g. `http://127.0.0.1:39657/`.
    /// Valid only between [`StubServer::start`] and [`StubServer::stop`].
    pub fn home(&self) -> Result<String, Error> {
        Ok(format!("http://{}/", self.address()?))
    }

    /// The socket address the listener is bound to.
    pub fn address(&self) -> Result<SocketAddr, Error> {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .map(|handle| handle.addr)
            .ok_or(Error::NotStarted)
    }

    /// Builds the URL for `path` on the running server.
    pub fn url<S: Into<String>>(&self, path: S) -> Result<String, Error> {
        Ok(format!("http://{}{}", self.address()?, path.into()))
    }

    /// Stops accepting connections, drains in-flight responses (bounded), and
    /// releases the port. Registrations, captures and counters are discarded;
    /// the instance may be started again and behaves like a fresh one.
    ///
    /// Idempotent: calling it repeatedly, or on a never-started instance, does
    /// nothing.
    pub fn stop(&self) {
        let handle = self.handle.lock().unwrap().take();

        if let Some(handle) = handle {
            let _ = handle.shutdown.send(());

            match handle.runtime.block_on(handle.task) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!("server terminated with error: {}", err),
                Err(err) => tracing::error!("server task failed: {}", err),
            }
            handle.runtime.shutdown_timeout(Duration::from_secs(1));

            self.state.reset();
            tracing::debug!("server on {} stopped, state discarded", handle.addr);
        }
    }
}

impl Default for StubServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.stop();
    }
}
