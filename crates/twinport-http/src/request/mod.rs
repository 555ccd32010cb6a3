//! Request types handed to applications

pub mod headers;
pub mod parser;
pub mod query;

pub use headers::Headers;
pub use parser::{read_body, read_request_head, RequestError, RequestHead};
pub use query::QueryParams;

use std::fmt;
use std::str::FromStr;

/// Request method as far as dispatching cares
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Other(String),
}

impl Method {
    /// Methods are case-sensitive; anything unrecognized is kept verbatim
    pub fn from_name(name: &str) -> Self {
        match name {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Other(name) => name,
        }
    }

    /// GET and HEAD are answered through `Application::get`
    pub fn is_get_like(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Method::from_name(s))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Request target exactly as sent
    pub target: String,
    /// Path used for routing
    pub path: String,
    pub query: QueryParams,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Build a request from its head.
    ///
    /// GET-like targets are split on the first `?`; any later `?` characters
    /// are dropped from the query text. Other methods route on the whole
    /// target and carry an empty query.
    pub fn from_head(head: RequestHead) -> Self {
        let method = Method::from_name(&head.method);

        let (path, query) = if method.is_get_like() {
            split_target(&head.target)
        } else {
            (head.target.clone(), QueryParams::default())
        };

        Self {
            method,
            target: head.target,
            path,
            query,
            headers: head.headers,
            body: Vec::new(),
        }
    }

    /// Shorthand used by tests and applications that synthesize requests
    pub fn get<T: Into<String>>(target: T) -> Self {
        Self::from_head(RequestHead {
            method: "GET".to_string(),
            target: target.into(),
            version: 1,
            headers: Headers::new(),
        })
    }

    pub fn post<T: Into<String>>(target: T, body: Vec<u8>) -> Self {
        let mut request = Self::from_head(RequestHead {
            method: "POST".to_string(),
            target: target.into(),
            version: 1,
            headers: Headers::new(),
        });
        request.body = body;
        request
    }

    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Declared `Content-Length`, if present and numeric
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get("content-length")
            .and_then(|value| value.trim().parse().ok())
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn split_target(target: &str) -> (String, QueryParams) {
    let mut parts = target.split('?');
    let path = parts.next().unwrap_or_default().to_string();
    let query: String = parts.collect();
    (path, QueryParams::parse(&query))
}
