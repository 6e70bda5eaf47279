use tokio::runtime::Runtime;

/// Builds the multi-threaded runtime that drives the accept loop and the
/// per-connection worker tasks.
pub(crate) fn new(worker_threads: usize, blocking_threads: usize) -> std::io::Result<Runtime> {
    assert!(
        worker_threads > 0,
        "Parameter worker_threads must be larger than 0"
    );
    assert!(
        blocking_threads > 0,
        "Parameter blocking_threads must be larger than 0"
    );

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(blocking_threads)
        .enable_all()
        .build()
}
