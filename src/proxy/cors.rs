//! Permissive CORS headers for the dashboard's browser client.

use crate::http::headers::HeaderMap;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

pub const ALLOW_ORIGIN: (&str, &str) = ("Access-Control-Allow-Origin", "*");
pub const ALLOW_METHODS: (&str, &str) = (
    "Access-Control-Allow-Methods",
    "GET, POST, PUT, DELETE, OPTIONS",
);
pub const ALLOW_HEADERS: (&str, &str) = ("Access-Control-Allow-Headers", "*");

pub fn apply(headers: &mut HeaderMap) {
    for (name, value) in [ALLOW_ORIGIN, ALLOW_METHODS, ALLOW_HEADERS] {
        headers.insert(name, value);
    }
}

/// Attach the CORS headers to a finished response.
pub fn with_cors(mut response: Response) -> Response {
    apply(&mut response.headers);
    response
}

/// Answer to an OPTIONS preflight: 200, empty body.
pub fn preflight() -> Response {
    with_cors(
        ResponseBuilder::new(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_is_empty_ok_with_cors() {
        let response = preflight();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.known_len(), Some(0));
        assert_eq!(response.headers.get("access-control-allow-origin"), Some("*"));
        assert_eq!(
            response.headers.get("Access-Control-Allow-Methods"),
            Some("GET, POST, PUT, DELETE, OPTIONS")
        );
        assert_eq!(response.headers.get("Access-Control-Allow-Headers"), Some("*"));
    }
}
