//! End-to-end exercise of the wire codec against a real `TcpStream`,
//! the way a genuine client would talk to the server (§10.6: "where a
//! genuine end-to-end socket round-trip is valuable").

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use xkoj_web::{Method, Server, ServerConfig};

/// Finds an unused TCP port by binding an ephemeral listener and
/// immediately releasing it, so the server under test can be configured
/// with a concrete port ahead of `Server::start`.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("binds an ephemeral port");
    listener.local_addr().expect("has a local address").port()
}

async fn read_response(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.expect("read response");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(buf).expect("response is valid utf-8")
}

#[tokio::test]
async fn round_trips_a_get_request_over_a_real_socket() {
    let port = free_port().await;
    let mut server = Server::builder(ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..ServerConfig::default()
    })
    .route(Method::Get, "/greet/:name", |req, res| {
        let name = req.path_param("name").unwrap_or("stranger").to_string();
        res.text(format!("hello, {name}"));
    })
    .build();

    server.start().await.expect("server starts");

    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connects to the reactor's listener");
    stream
        .write_all(b"GET /greet/ada HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .expect("writes the request");

    let response = read_response(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("hello, ada"));

    server.stop().await;
}

#[tokio::test]
async fn round_trips_a_404_for_an_unmatched_path() {
    let port = free_port().await;
    let mut server = Server::builder(ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..ServerConfig::default()
    })
    .route(Method::Get, "/known", |_req, res| {
        res.text("ok");
    })
    .build();

    server.start().await.expect("server starts");

    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connects to the reactor's listener");
    stream
        .write_all(b"GET /unknown HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .expect("writes the request");

    let response = read_response(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 404"));

    server.stop().await;
}

#[tokio::test]
async fn round_trips_a_post_with_url_encoded_form_body() {
    let port = free_port().await;
    let mut server = Server::builder(ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..ServerConfig::default()
    })
    .route(Method::Post, "/echo", |req, res| {
        let title = req.form_data("title").unwrap_or_default();
        res.text(title);
    })
    .build();

    server.start().await.expect("server starts");

    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connects to the reactor's listener");
    let body = "title=Hello+World";
    let request = format!(
        "POST /echo HTTP/1.1\r\nHost: x\r\nConnection: close\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{body}",
        body.len(),
    );
    stream
        .write_all(request.as_bytes())
        .await
        .expect("writes the request");

    let response = read_response(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("Hello World"));

    server.stop().await;
}
