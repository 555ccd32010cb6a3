//! Responses and the upgrade decision

pub mod status;

pub use status::reason_phrase;

use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const CONTENT_TYPE_HTML: &str = "text/html";
pub const CONTENT_TYPE_JAVASCRIPT: &str = "text/javascript";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// A complete HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content: Vec<u8>,
}

impl HttpResponse {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::with_status(200)
    }

    pub fn bad_request() -> Self {
        Self::with_status(400)
    }

    pub fn not_found() -> Self {
        Self::with_status(404)
    }

    pub fn method_not_allowed() -> Self {
        Self::with_status(405).header("Allow", "GET, POST")
    }

    pub fn payload_too_large() -> Self {
        Self::with_status(413)
    }

    /// Set a header, replacing any earlier value with the same name
    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn content_type(self, content_type: &str) -> Self {
        self.header("Content-Type", content_type)
    }

    /// HTML body, encoded as UTF-8
    pub fn html<T: Into<String>>(self, body: T) -> Self {
        self.content_type(CONTENT_TYPE_HTML).text_body(body)
    }

    /// Plain text body, encoded as UTF-8
    pub fn text<T: Into<String>>(self, body: T) -> Self {
        self.content_type(CONTENT_TYPE_TEXT).text_body(body)
    }

    /// Raw bytes, content type left to the caller
    pub fn bytes<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.content = body.into();
        self
    }

    fn text_body<T: Into<String>>(mut self, body: T) -> Self {
        self.content = body.into().into_bytes();
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize the status line and headers.
    ///
    /// `Content-Length` is always present and the connection is always closed
    /// after the response.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status,
            reason_phrase(self.status)
        );

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection")
            {
                continue;
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }

        head.push_str(&format!("Content-Length: {}\r\n", self.content.len()));
        head.push_str("Connection: close\r\n\r\n");
        head.into_bytes()
    }

    /// Write the response; the body is omitted when answering HEAD
    pub async fn write_to<W>(&self, writer: &mut W, include_body: bool) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.head_bytes()).await?;
        if include_body && !self.content.is_empty() {
            writer.write_all(&self.content).await?;
        }
        writer.flush().await
    }
}

/// What an application wants done with a GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Answer with this response and close the connection
    Respond(HttpResponse),
    /// Negotiate a WebSocket session on this connection
    UpgradeToWebSocket,
}

impl From<HttpResponse> for Reply {
    fn from(response: HttpResponse) -> Self {
        Reply::Respond(response)
    }
}
