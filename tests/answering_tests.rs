use httpstub::{
    matchers::{any, not},
    Answer, StubServer,
};

#[test]
fn works_as_a_test_server() {
    let _ = env_logger::try_init();

    // Arrange
    let server = StubServer::new();
    server.next(Answer::ok("works fine!")).start().unwrap();

    // Act
    let response = reqwest::blocking::get(server.home().unwrap()).unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().unwrap().starts_with("works"));

    let query = server.take().unwrap();
    assert_eq!(query.method(), "GET");
}

#[test]
fn answers_conditionally() {
    // Arrange
    let server = StubServer::new();
    server
        .next_if(Answer::ok("not matching"), not(any()))
        .next_if(Answer::ok("matching"), any())
        .start()
        .unwrap();

    // Act
    let response = reqwest::blocking::get(server.home().unwrap()).unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().unwrap(), "matching");
}

#[test]
fn answers_binary_content() {
    // Arrange
    let body = [0x00u8, 0x01, 0x45, 0x21, 0xFF];

    let server = StubServer::new();
    server.next(Answer::new(200).with_body(body)).start().unwrap();

    // Act
    let response = reqwest::blocking::get(server.home().unwrap()).unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.bytes().unwrap().as_ref(), &body[..]);
}

#[test]
fn prioritizes_answers_by_registration_order() {
    // Arrange
    let server = StubServer::new();
    server
        .next_if(Answer::ok("first"), any())
        .next_if(Answer::ok("second"), any())
        .start()
        .unwrap();

    // Act
    let response = reqwest::blocking::get(server.home().unwrap()).unwrap();

    // Assert
    assert_eq!(response.text().unwrap(), "first");
}

#[test]
fn answers_multiple_times_then_falls_back() {
    // Arrange
    let times = 5;
    let server = StubServer::new();
    server
        .repeat(Answer::ok("multiple"), any(), times)
        .start()
        .unwrap();
    let url = server.home().unwrap();

    // Act + Assert: the registration serves exactly `times` requests.
    for _ in 0..times {
        let response = reqwest::blocking::get(&url).unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().unwrap(), "multiple");
    }

    // The next request has no eligible registration left.
    let response = reqwest::blocking::get(&url).unwrap();
    assert_eq!(response.status().as_u16(), 500);

    // All requests counted, but the fallback request was never captured.
    assert_eq!(server.queries(), times + 1);
    assert_eq!(server.take_all(any()).len(), times);
    assert!(server.take().is_err());
}

#[test]
fn returns_error_if_no_answer_matches() {
    let _ = env_logger::try_init();

    // Arrange
    let server = StubServer::new();
    server
        .next_if(Answer::ok("not supposed to match"), not(any()))
        .start()
        .unwrap();

    // Act
    let response = reqwest::blocking::get(server.home().unwrap()).unwrap();

    // Assert: the request got the fallback, was counted, and left no capture.
    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(server.queries(), 1);
    assert!(server.take().is_err());
}
