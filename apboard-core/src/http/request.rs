use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Why a request was rejected before reaching a handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedRequest {
    #[error("request ended before it was complete")]
    Truncated,

    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("request head is not valid UTF-8")]
    InvalidEncoding,

    #[error("bad request line: {0:?}")]
    BadRequestLine(String),

    #[error("bad header: {0:?}")]
    BadHeader(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
    Other(String),
}

impl Method {
    fn parse(token: &str) -> Option<Self> {
        // RFC 9110: method = token，只允许可见的 tchar 字符
        let is_tchar = |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c);
        if token.is_empty() || !token.chars().all(is_tchar) {
            return None;
        }
        Some(match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed request. Lives for a single request/response cycle.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path without the query string, exactly as sent.
    pub path: String,
    /// Percent-decoded query parameters; the first occurrence of a key wins.
    pub query: HashMap<String, String>,
    /// Header names are lower-cased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Parses one complete request held in `raw`.
    ///
    /// Without `Content-Length` the body is whatever follows the blank line.
    /// With it, the body is exactly that many bytes and anything missing makes
    /// the request `Truncated`.
    pub fn parse(raw: &[u8]) -> Result<Self, MalformedRequest> {
        let head_end = find_head_end(raw).ok_or(MalformedRequest::Truncated)?;
        let head = std::str::from_utf8(&raw[..head_end]).map_err(|_| MalformedRequest::InvalidEncoding)?;
        let rest = &raw[head_end + HEAD_TERMINATOR.len()..];

        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let (method, target) = parse_request_line(request_line)?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| MalformedRequest::BadHeader(line.to_string()))?;
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(MalformedRequest::BadHeader(line.to_string()));
            }
            headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
        }

        let body = match content_length(&headers)? {
            Some(len) if rest.len() < len => return Err(MalformedRequest::Truncated),
            Some(len) => rest[..len].to_vec(),
            None => rest.to_vec(),
        };

        let (path, query_string) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        let mut query = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(query_string.as_bytes()) {
            query.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }

        Ok(Request {
            method,
            path: path.to_string(),
            query,
            headers,
            body,
        })
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Reports the total length of the request at the start of `buf`.
///
/// Returns `Ok(None)` while the head is still incomplete. Once the blank line
/// has arrived the length is the head plus `Content-Length` (or plus whatever
/// has already been received when the header is absent).
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, MalformedRequest> {
    let Some(head_end) = find_head_end(buf) else {
        return Ok(None);
    };
    let body_start = head_end + HEAD_TERMINATOR.len();
    let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| MalformedRequest::InvalidEncoding)?;

    for line in head.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let len = parse_content_length(value)?;
                let total = body_start
                    .checked_add(len)
                    .ok_or_else(|| MalformedRequest::BadHeader(format!("content-length: {}", value.trim())))?;
                return Ok(Some(total));
            }
        }
    }
    Ok(Some(buf.len().max(body_start)))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len()).position(|w| w == HEAD_TERMINATOR)
}

fn parse_request_line(line: &str) -> Result<(Method, &str), MalformedRequest> {
    let bad = || MalformedRequest::BadRequestLine(line.to_string());

    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(bad());
    };

    let method = Method::parse(method).ok_or_else(bad)?;
    if !target.starts_with('/') || !version.starts_with("HTTP/1.") {
        return Err(bad());
    }
    Ok((method, target))
}

fn content_length(headers: &[(String, String)]) -> Result<Option<usize>, MalformedRequest> {
    headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .map(|(_, value)| parse_content_length(value))
        .transpose()
}

fn parse_content_length(value: &str) -> Result<usize, MalformedRequest> {
    let value = value.trim();
    value
        .parse::<usize>()
        .map_err(|_| MalformedRequest::BadHeader(format!("content-length: {value}")))
}
