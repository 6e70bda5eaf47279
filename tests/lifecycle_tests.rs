use httpstub::{Answer, Error, StubServer};

#[test]
fn home_fails_before_start() {
    let server = StubServer::new();

    assert!(matches!(server.home(), Err(Error::NotStarted)));
    assert!(matches!(server.address(), Err(Error::NotStarted)));
    assert!(matches!(server.url("/x"), Err(Error::NotStarted)));
}

#[test]
fn start_twice_fails_fast() {
    let server = StubServer::new();
    server.start().unwrap();

    assert!(matches!(server.start(), Err(Error::AlreadyStarted)));

    server.stop();
}

#[test]
fn stop_is_idempotent() {
    // Stopping a server that was never started is a no-op.
    let never_started = StubServer::new();
    never_started.stop();
    never_started.stop();

    // And so is stopping twice after a start.
    let server = StubServer::new();
    server.start().unwrap();
    server.stop();
    server.stop();

    assert!(matches!(server.home(), Err(Error::NotStarted)));
}

#[test]
fn stop_discards_state_and_allows_restart() {
    // Arrange
    let server = StubServer::new();
    server.next(Answer::ok("before")).start().unwrap();
    reqwest::blocking::get(server.home().unwrap()).unwrap();
    assert_eq!(server.queries(), 1);

    // Act
    server.stop();
    server.start().unwrap();

    // Assert: the restarted server has neither registrations nor history.
    assert_eq!(server.queries(), 0);
    let response = reqwest::blocking::get(server.home().unwrap()).unwrap();
    assert_eq!(response.status().as_u16(), 500);
    assert!(server.take().is_err());

    server.stop();
}

#[test]
fn serves_requests_issued_from_multiple_threads() {
    // Arrange
    let server = StubServer::new();
    server
        .repeat(Answer::ok("shared"), httpstub::matchers::any(), 8)
        .start()
        .unwrap();
    let url = server.home().unwrap();

    // Act: eight clients race for the eight uses of the registration.
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let url = url.clone();
            std::thread::spawn(move || reqwest::blocking::get(url).unwrap().status().as_u16())
        })
        .collect();
    let statuses: Vec<u16> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Assert: every request got the scripted answer, none fell through, and
    // the bookkeeping agrees.
    assert!(statuses.iter().all(|status| *status == 200));
    assert_eq!(server.queries(), 8);
    assert_eq!(server.take_all(httpstub::matchers::any()).len(), 8);
}

#[test]
fn dropping_the_server_releases_it() {
    let url;
    {
        let server = StubServer::new();
        server.next(Answer::ok("here")).start().unwrap();
        url = server.home().unwrap();
        reqwest::blocking::get(&url).unwrap();
        // No explicit stop: dropping the server must shut it down.
    }

    // The listener is gone, so a fresh request cannot connect anymore.
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(2))
        .build()
        .unwrap();
    assert!(client.get(&url).send().is_err());
}
