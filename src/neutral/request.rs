use std::collections::BTreeMap;
use std::net::SocketAddr;

/// One endpoint of a connection — origin (client-facing) or local
/// (server-facing) — carrying scheme, protocol version, addresses, host
/// and port.
#[derive(Debug, Clone)]
pub struct ConnectionDetails {
    /// `"http"` or `"https"`.
    pub scheme: String,
    /// HTTP protocol version, e.g. `"HTTP/1.1"`.
    pub version: String,
    /// The address this side of the connection is bound to.
    pub local_addr: SocketAddr,
    /// The address of the peer.
    pub remote_addr: SocketAddr,
    /// The address the listening server advertises (may equal
    /// `local_addr`).
    pub server_addr: SocketAddr,
    /// `Host` header value, or the socket address's IP if absent.
    pub host: String,
    /// Port the connection arrived on.
    pub port: u16,
}

/// The seven HTTP methods the core dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Whether this method's dispatcher reads a request body.
    pub fn reads_body(self) -> bool {
        matches!(self, HttpMethod::Patch | HttpMethod::Post | HttpMethod::Put)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        };
        write!(f, "{}", s)
    }
}

impl TryFrom<&hyper::Method> for HttpMethod {
    type Error = ();

    fn try_from(method: &hyper::Method) -> Result<Self, Self::Error> {
        Ok(match *method {
            hyper::Method::GET => HttpMethod::Get,
            hyper::Method::POST => HttpMethod::Post,
            hyper::Method::PUT => HttpMethod::Put,
            hyper::Method::PATCH => HttpMethod::Patch,
            hyper::Method::DELETE => HttpMethod::Delete,
            hyper::Method::HEAD => HttpMethod::Head,
            hyper::Method::OPTIONS => HttpMethod::Options,
            _ => return Err(()),
        })
    }
}

/// The request record handed to the API bundle.
#[derive(Debug, Clone)]
pub struct NeutralRequest {
    /// Origin (client-facing) and local (server-facing) connection
    /// details.
    pub connection: (ConnectionDetails, ConnectionDetails),
    /// Dispatched HTTP method.
    pub method: HttpMethod,
    /// Query string, first value per name.
    pub query: BTreeMap<String, String>,
    /// Request headers, joined per name (multi-valued headers are
    /// comma-joined).
    pub headers: BTreeMap<String, String>,
    /// Cookies, raw value per name.
    pub cookies: BTreeMap<String, String>,
    /// Request body; present only for PATCH/POST/PUT when the body is
    /// non-empty.
    pub body: Option<Vec<u8>>,
    /// Present iff `body` is present.
    pub body_content_type: Option<String>,
}

impl NeutralRequest {
    /// The connection as seen by the client (origin side).
    pub fn origin(&self) -> &ConnectionDetails {
        &self.connection.0
    }

    /// The connection as seen by the server (local side).
    pub fn local(&self) -> &ConnectionDetails {
        &self.connection.1
    }
}
