use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: Cow<'static, str>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(
        status: StatusCode,
        content_type: impl Into<Cow<'static, str>>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(status, "text/plain; charset=utf-8", body)
    }

    pub fn json<T: Serialize + ?Sized>(value: &T) -> crate::Result<Self> {
        Ok(Self::new(StatusCode::OK, "application/json", serde_json::to_vec(value)?))
    }

    pub fn ok() -> Self {
        Self::text(StatusCode::OK, "OK")
    }

    pub fn bad_request() -> Self {
        Self::text(StatusCode::BAD_REQUEST, "Bad Request")
    }

    pub fn internal_error() -> Self {
        Self::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }

    /// Serializes status line, headers and body into wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\nCache-Control: no-store\r\n\r\n",
            self.status,
            self.content_type,
            self.body.len()
        );
        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_has_status_headers_and_body() {
        let bytes = Response::ok().to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Length: 2\r\n\
             Connection: close\r\n\
             Cache-Control: no-store\r\n\
             \r\n\
             OK"
        );
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let resp = Response::text(StatusCode::OK, "°C");
        let text = String::from_utf8(resp.to_bytes()).unwrap();
        assert!(text.contains("Content-Length: 3\r\n"));
    }

    #[test]
    fn json_sets_content_type() {
        let resp = Response::json(&serde_json::json!({ "a": 1 })).unwrap();
        assert_eq!(resp.content_type, "application/json");
        assert_eq!(resp.body, br#"{"a":1}"#);
    }

    #[test]
    fn error_statuses_render_reason_phrases() {
        assert_eq!(Response::bad_request().status.to_string(), "400 Bad Request");
        assert_eq!(Response::internal_error().status.to_string(), "500 Internal Server Error");
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED.to_string(), "405 Method Not Allowed");
    }
}
