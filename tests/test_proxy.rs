//! Tests for upstream request serialization

use limelight_proxy::http::request::{Method, RequestBuilder};
use limelight_proxy::proxy::{ProxyError, TcpConnector, UpstreamForwarder, UpstreamTarget};
use limelight_proxy::proxy::upstream::parse_response_headers;

fn forwarder(port: u16) -> UpstreamForwarder<TcpConnector> {
    UpstreamForwarder::new(TcpConnector, UpstreamTarget::new("172.29.0.1", port))
}

#[test]
fn test_build_http_request() {
    let handler = forwarder(5807);

    let request = RequestBuilder::new()
        .method(Method::GET)
        .path("/dash/limelight/api/results")
        .header("User-Agent", "Test")
        .header("Host", "robot.local")
        .build()
        .unwrap();

    let url = handler.target().url_for("/results", None).unwrap();
    let request_bytes = handler.build_http_request(&request, &url).unwrap();
    let request_str = String::from_utf8_lossy(&request_bytes);

    assert!(request_str.starts_with("GET /results HTTP/1.1\r\n"));
    assert!(request_str.contains("Host: 172.29.0.1:5807"));
    assert!(request_str.contains("User-Agent: Test"));
    assert!(request_str.contains("Connection: close"));
    assert!(!request_str.contains("robot.local"));
    assert!(!request_str.contains("Content-Length"));
}

#[test]
fn test_build_http_request_with_body() {
    let handler = forwarder(5807);

    let request = RequestBuilder::new()
        .method(Method::POST)
        .path("/dash/limelight/api/update-robotorientation")
        .header("Content-Type", "application/json")
        .header("Content-Length", "2")
        .body(&b"[]trailing"[..])
        .build()
        .unwrap();

    let url = handler.target().url_for("/update-robotorientation", None).unwrap();
    let request_bytes = handler.build_http_request(&request, &url).unwrap();
    let request_str = String::from_utf8_lossy(&request_bytes);

    assert!(request_str.starts_with("POST /update-robotorientation HTTP/1.1\r\n"));
    assert!(request_str.contains("Content-Type: application/json"));
    assert!(request_str.contains("Content-Length: 2\r\n"));
    assert!(request_str.ends_with("\r\n\r\n[]"));
}

#[test]
fn test_build_http_request_removes_hop_by_hop_headers() {
    let handler = forwarder(5801);

    let request = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("Connection", "keep-alive")
        .header("Upgrade", "websocket")
        .header("User-Agent", "Test")
        .build()
        .unwrap();

    let url = handler.target().url_for("/", None).unwrap();
    let request_bytes = handler.build_http_request(&request, &url).unwrap();
    let request_str = String::from_utf8_lossy(&request_bytes);

    assert!(request_str.contains("Connection: close"));
    assert!(!request_str.contains("keep-alive"));
    assert!(!request_str.contains("Upgrade: websocket"));
    assert!(request_str.contains("User-Agent: Test"));
}

#[test]
fn test_build_http_request_rejects_short_body() {
    let handler = forwarder(5807);

    let request = RequestBuilder::new()
        .method(Method::PATCH)
        .path("/x")
        .header("Content-Length", "10")
        .body(&b"abc"[..])
        .build()
        .unwrap();

    let url = handler.target().url_for("/x", None).unwrap();
    let result = handler.build_http_request(&request, &url);

    assert!(matches!(result, Err(ProxyError::MalformedRequestFraming(_))));
}

#[test]
fn test_url_for_keeps_query() {
    let target = UpstreamTarget::new("172.29.0.1", 5807);

    let url = target.url_for("/results", Some("a=1&b=2")).unwrap();
    assert_eq!(url.as_str(), "http://172.29.0.1:5807/results?a=1&b=2");
}

#[test]
fn test_url_for_rejects_relative_path() {
    let target = UpstreamTarget::new("172.29.0.1", 5807);

    assert!(matches!(
        target.url_for("status", None),
        Err(ProxyError::InvalidUrl(_))
    ));
}

#[test]
fn test_parse_response_headers() {
    let head = b"HTTP/1.1 304 Not Modified\r\nETag: \"v2\"\r\ncache-control: max-age=0\r\n\r\n";

    let (status, headers) = parse_response_headers(head).unwrap();

    assert_eq!(status.as_u16(), 304);
    assert_eq!(headers.get("etag"), Some("\"v2\""));
    assert_eq!(headers.get("Cache-Control"), Some("max-age=0"));
}

#[test]
fn test_parse_response_headers_rejects_non_http() {
    assert!(parse_response_headers(b"HELLO\r\n\r\n").is_err());
    assert!(parse_response_headers(b"HTTP/1.1 abc OK\r\n\r\n").is_err());
}
