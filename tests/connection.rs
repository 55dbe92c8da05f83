//! End-to-end exchanges over an in-memory transport.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use ember_http::connection::HttpConnection;
use ember_http::handler::{Handler, make_handler};
use ember_http::protocol::body::ReqBody;
use ember_http::protocol::{ConnectionLimits, HttpError, Request, Response};

type BoxError = Box<dyn Error + Send + Sync>;

struct Client {
    reader: ReadHalf<tokio::io::DuplexStream>,
    writer: WriteHalf<tokio::io::DuplexStream>,
    server: JoinHandle<Result<(), HttpError>>,
}

fn serve<H>(handler: Arc<H>, limits: ConnectionLimits) -> Client
where
    H: Handler + Send + Sync + 'static,
    H::RespBody: http_body::Body<Data = Bytes> + Unpin + Send,
    <H::RespBody as http_body::Body>::Error: std::fmt::Display + Send,
    H::Error: Send,
{
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (client, server) = tokio::io::duplex(16 * 1024);
    let (server_reader, server_writer) = tokio::io::split(server);
    let connection = HttpConnection::with_limits(server_reader, server_writer, limits);
    let server = tokio::spawn(connection.process(handler));
    let (reader, writer) = tokio::io::split(client);
    Client { reader, writer, server }
}

impl Client {
    async fn send(&mut self, bytes: &str) {
        self.writer.write_all(bytes.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Reads until the accumulated response contains `needle`.
    async fn read_until(&mut self, needle: &str) -> String {
        let mut collected = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let text = String::from_utf8_lossy(&collected).into_owned();
            if text.contains(needle) {
                return text;
            }
            let n = timeout(Duration::from_secs(5), self.reader.read(&mut buf))
                .await
                .expect("timed out waiting for response")
                .unwrap();
            assert!(n > 0, "connection closed before {needle:?} arrived, got: {collected:?}");
            collected.extend_from_slice(&buf[..n]);
        }
    }

    async fn read_to_end(mut self) -> (String, Result<(), HttpError>) {
        drop(self.writer);
        let mut collected = Vec::new();
        timeout(Duration::from_secs(5), self.reader.read_to_end(&mut collected))
            .await
            .expect("timed out waiting for close")
            .unwrap();
        let result = self.server.await.unwrap();
        (String::from_utf8_lossy(&collected).into_owned(), result)
    }
}

async fn echo(request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
    let body = request.into_body().collect().await?.to_bytes();
    Ok(Response::new(StatusCode::OK, Full::new(body)))
}

async fn plain_ok(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
    Ok(Response::new(StatusCode::OK, Full::new(Bytes::from_static(b"ok"))))
}

#[tokio::test]
async fn chunked_request_is_echoed() {
    let mut client = serve(Arc::new(make_handler(echo)), ConnectionLimits::default());

    client
        .send(
            "POST /echo HTTP/1.1\r\n\
             Host: example.com\r\n\
             Transfer-Encoding: chunked\r\n\
             Connection: close\r\n\
             \r\n\
             5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n",
        )
        .await;

    let (response, result) = client.read_to_end().await;
    result.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.contains("Content-Length: 11\r\n"), "{response}");
    assert!(response.contains("Connection: close\r\n"), "{response}");
    assert!(response.ends_with("\r\n\r\nHello World"), "{response}");
}

#[tokio::test]
async fn keep_alive_serves_sequential_requests() {
    let mut client = serve(Arc::new(make_handler(plain_ok)), ConnectionLimits::default());

    client.send("GET /first HTTP/1.1\r\nHost: example.com\r\n\r\n").await;
    let first = client.read_until("\r\n\r\nok").await;
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"), "{first}");
    assert!(!first.contains("Connection: close"), "{first}");

    client.send("GET /second HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").await;
    let (second, result) = client.read_to_end().await;
    result.unwrap();
    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"), "{second}");
    assert!(second.ends_with("ok"), "{second}");
}

#[tokio::test]
async fn unread_body_is_drained_for_the_next_request() {
    // The handler never touches the body; the engine must still consume it
    // so the pipelined request parses cleanly.
    let mut client = serve(Arc::new(make_handler(plain_ok)), ConnectionLimits::default());

    client
        .send(
            "POST /ignore HTTP/1.1\r\n\
             Host: example.com\r\n\
             Content-Length: 5\r\n\
             \r\n\
             HelloGET /next HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
        )
        .await;

    let (responses, result) = client.read_to_end().await;
    result.unwrap();
    let count = responses.matches("HTTP/1.1 200 OK\r\n").count();
    assert_eq!(count, 2, "{responses}");
}

#[tokio::test]
async fn unread_chunked_body_is_drained_for_the_next_request() {
    // Same drain requirement, but the unread body is chunked, so the engine
    // has to walk the chunk framing to find the end.
    let mut client = serve(Arc::new(make_handler(plain_ok)), ConnectionLimits::default());

    client
        .send(
            "POST /ignore HTTP/1.1\r\n\
             Host: example.com\r\n\
             Transfer-Encoding: chunked\r\n\
             \r\n\
             5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n\
             GET /next HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
        )
        .await;

    let (responses, result) = client.read_to_end().await;
    result.unwrap();
    let count = responses.matches("HTTP/1.1 200 OK\r\n").count();
    assert_eq!(count, 2, "{responses}");
}

#[tokio::test]
async fn expect_continue_is_acknowledged_before_the_body() {
    let mut client = serve(Arc::new(make_handler(echo)), ConnectionLimits::default());

    client
        .send(
            "POST /upload HTTP/1.1\r\n\
             Host: example.com\r\n\
             Content-Length: 5\r\n\
             Expect: 100-continue\r\n\
             Connection: close\r\n\
             \r\n",
        )
        .await;
    let interim = client.read_until("100 Continue\r\n\r\n").await;
    assert!(interim.starts_with("HTTP/1.1 100 Continue"), "{interim}");

    client.send("Hello").await;
    let (response, result) = client.read_to_end().await;
    result.unwrap();
    assert!(response.contains("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("Hello"), "{response}");
}

#[tokio::test]
async fn head_response_carries_headers_but_no_body() {
    let mut client = serve(Arc::new(make_handler(plain_ok)), ConnectionLimits::default());

    client.send("HEAD / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").await;
    let (response, result) = client.read_to_end().await;
    result.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.contains("Content-Length: 2\r\n"), "{response}");
    assert!(response.ends_with("\r\n\r\n"), "{response}");
    assert!(!response.ends_with("ok"), "{response}");
}

#[tokio::test]
async fn http10_without_keep_alive_closes_after_one_response() {
    let mut client = serve(Arc::new(make_handler(plain_ok)), ConnectionLimits::default());

    client.send("GET / HTTP/1.0\r\n\r\n").await;
    let (response, result) = client.read_to_end().await;
    result.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.contains("Connection: close\r\n"), "{response}");
    assert!(response.ends_with("ok"), "{response}");
}

#[tokio::test]
async fn malformed_request_gets_400_and_close() {
    let mut client = serve(Arc::new(make_handler(plain_ok)), ConnectionLimits::default());

    client.send("GET / HTTP/1.1\r\nthis line has no colon\r\n\r\n").await;
    let (response, result) = client.read_to_end().await;
    assert!(result.is_err());
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
    assert!(response.contains("Connection: close\r\n"), "{response}");
}

#[tokio::test]
async fn oversized_declared_body_gets_413() {
    let limits = ConnectionLimits { max_request_body_size: Some(8), ..Default::default() };
    let mut client = serve(Arc::new(make_handler(echo)), limits);

    client
        .send("POST /upload HTTP/1.1\r\nHost: example.com\r\nContent-Length: 20\r\n\r\n")
        .await;
    let (response, result) = client.read_to_end().await;
    assert!(result.is_err());
    assert!(response.starts_with("HTTP/1.1 413 "), "{response}");
}

#[tokio::test]
async fn handler_error_becomes_500() {
    async fn failing(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        Err("boom".into())
    }

    let mut client = serve(Arc::new(make_handler(failing)), ConnectionLimits::default());
    client.send("GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").await;
    let (response, result) = client.read_to_end().await;
    result.unwrap();
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{response}");
}

#[tokio::test]
async fn content_length_overrun_poisons_the_connection() {
    async fn lying(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        let mut response =
            Response::new(StatusCode::OK, Full::new(Bytes::from_static(b"way too long")));
        response.headers_mut().set_content_length(5)?;
        Ok(response)
    }

    let mut client = serve(Arc::new(make_handler(lying)), ConnectionLimits::default());
    client.send("GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").await;
    let (response, result) = client.read_to_end().await;
    assert!(result.is_err());
    // The over-long body never reaches the wire.
    assert!(!response.contains("way too long"), "{response}");
}

#[tokio::test]
async fn app_set_chunked_framing_is_honored() {
    async fn chunked_ok(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        let mut response = Response::new(StatusCode::OK, Full::new(Bytes::from_static(b"Hello")));
        response.headers_mut().insert("Transfer-Encoding", "chunked")?;
        Ok(response)
    }

    let mut client = serve(Arc::new(make_handler(chunked_ok)), ConnectionLimits::default());
    client.send("GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").await;
    let (response, result) = client.read_to_end().await;
    result.unwrap();
    // The body has an exact size, but the application opted into chunked
    // framing; the size hint must not win and put both delimiters on the wire.
    assert!(response.contains("Transfer-Encoding: chunked\r\n"), "{response}");
    assert!(!response.contains("Content-Length"), "{response}");
    assert!(response.ends_with("5\r\nHello\r\n0\r\n\r\n"), "{response}");
}

#[tokio::test]
async fn bodyless_status_suppresses_declared_body() {
    async fn no_content(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        Ok(Response::new(StatusCode::NO_CONTENT, Full::new(Bytes::from_static(b"ignored"))))
    }

    let mut client = serve(Arc::new(make_handler(no_content)), ConnectionLimits::default());
    client.send("GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").await;
    let (response, result) = client.read_to_end().await;
    result.unwrap();
    assert!(response.starts_with("HTTP/1.1 204 No Content\r\n"), "{response}");
    assert!(!response.contains("Content-Length"), "{response}");
    assert!(!response.contains("ignored"), "{response}");
}

#[tokio::test]
async fn dot_segment_target_is_normalized_before_the_handler() {
    async fn show_path(request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        let path = request.path().to_string();
        Ok(Response::new(StatusCode::OK, Full::new(Bytes::from(path))))
    }

    let mut client = serve(Arc::new(make_handler(show_path)), ConnectionLimits::default());
    client
        .send("GET /static/../admin/./page HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n")
        .await;
    let (response, result) = client.read_to_end().await;
    result.unwrap();
    assert!(response.ends_with("/admin/page"), "{response}");
}
