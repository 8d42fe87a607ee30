//! Inbound request parsing for the host server.
//!
//! Bodies are framed by Content-Length only. A chunked request body is
//! refused rather than guessed at, since its bytes would otherwise be
//! mistaken for the next pipelined request. A Content-Length that is not a
//! number frames no body; the request still reaches its handler, which
//! rejects it, and the connection is closed afterwards.

use bytes::Bytes;
use thiserror::Error;

use crate::http::headers::HeaderMap;
use crate::http::request::{Method, Request, split_target};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequest,
    #[error("unknown method")]
    InvalidMethod,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("Content-Length too large")]
    InvalidContentLength,
    #[error("Transfer-Encoding on requests is not supported")]
    UnsupportedTransferEncoding,
    #[error("request incomplete")]
    Incomplete,
}

/// Parses one request from the front of `buf`.
///
/// Returns the request and how many bytes it occupied, or
/// [`ParseError::Incomplete`] until the head and the declared body have
/// both arrived.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let head_len = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let head = std::str::from_utf8(&buf[..head_len]).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = head.split("\r\n");
    let (method, target, version) = parse_request_line(lines.next().unwrap_or_default())?;
    let headers = parse_headers(lines)?;
    let body_len = body_length(&headers)?;

    let body_start = head_len + 4;
    let body_end = body_start
        .checked_add(body_len)
        .ok_or(ParseError::InvalidContentLength)?;
    let body = buf.get(body_start..body_end).ok_or(ParseError::Incomplete)?;
    let (path, query) = split_target(target);

    let request = Request {
        method,
        path,
        query,
        version: version.to_string(),
        headers,
        body: Bytes::copy_from_slice(body),
    };

    Ok((request, body_end))
}

fn parse_request_line(line: &str) -> Result<(Method, &str, &str), ParseError> {
    let mut parts = line.split_whitespace();

    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidRequest);
    };

    if !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_token(method).ok_or(ParseError::InvalidMethod)?;
    Ok((method, target, version))
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::new();

    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseError::InvalidHeader);
        }
        headers.insert(name, value.trim());
    }

    Ok(headers)
}

fn body_length(headers: &HeaderMap) -> Result<usize, ParseError> {
    if headers.contains_key("Transfer-Encoding") {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    Ok(headers
        .get("Content-Length")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0))
}

pub(crate) fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
