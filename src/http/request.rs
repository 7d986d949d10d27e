use crate::http::{
    types::{Headers, Method, Version},
    url::Url,
};
use std::net::SocketAddr;

/// Details of the TLS session a request arrived on.
///
/// The server never terminates TLS itself; whoever hands it a decrypted
/// transport may attach these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    /// SNI host name sent by the client.
    pub server_name: Option<String>,
    /// Protocol chosen through ALPN (`b"h2"`, `b"http/1.1"`).
    pub alpn_protocol: Option<Vec<u8>>,
}

/// A fully parsed HTTP request.
///
/// Produced by the HTTP/1.1 parser or assembled from an HTTP/2 stream, then
/// handed to routing and handlers read-only.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) version: Version,
    pub(crate) headers: Headers,
    pub(crate) trailers: Headers,
    pub(crate) body: Vec<u8>,

    pub(crate) content_length: Option<u64>,
    pub(crate) chunked: bool,
    pub(crate) upgrade: bool,
    pub(crate) keep_alive: bool,

    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) local_addr: Option<SocketAddr>,
    pub(crate) tls: Option<TlsInfo>,
}

impl Request {
    /// Assembles a request from a decoded HTTP/2 header block.
    ///
    /// Pseudo-headers fill method and URL; every other field becomes an
    /// ordinary header. Missing pseudo-headers fall back to the same defaults
    /// the HTTP/1.1 parser applies.
    pub(crate) fn from_header_fields<'a, I>(fields: I, body: Vec<u8>, conn: &ConnInfo) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut request = Request {
            version: Version::HTTP_2,
            keep_alive: true,
            ..Request::default()
        };
        let mut path = None;
        let mut scheme = None;
        let mut authority = None;

        for (name, value) in fields {
            match name {
                ":method" => request.method = Method::from_bytes(value.as_bytes()),
                ":path" => path = Some(value),
                ":scheme" => scheme = Some(value),
                ":authority" => authority = Some(value),
                _ if name.starts_with(':') => {}
                _ => request.headers.append(name, value),
            }
        }

        request.url = path.and_then(Url::from_target).unwrap_or_else(|| Url {
            raw_path: "/".to_owned(),
            ..Url::default()
        });
        if let Some(scheme) = scheme {
            request.url.scheme = scheme.to_ascii_lowercase();
        }
        match authority.filter(|a| !a.is_empty()) {
            Some(authority) => request.url.set_authority(authority),
            None => {
                if let Some(host) = request.headers.get("host").map(str::to_owned) {
                    request.url.set_authority(&host);
                }
            }
        }

        request.content_length = Some(body.len() as u64);
        request.body = body;
        conn.apply(&mut request);
        request
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    #[inline(always)]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Shortcut for [`Url::path`].
    #[inline]
    pub fn path(&self) -> String {
        self.url.path()
    }

    #[inline(always)]
    pub const fn version(&self) -> Version {
        self.version
    }

    #[inline(always)]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of the header `name`, case-insensitive.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Every value of `name` joined with `", "`.
    #[inline]
    pub fn header_value(&self, name: &str) -> Option<String> {
        self.headers.combined(name)
    }

    /// Trailer fields that followed a chunked body.
    #[inline(always)]
    pub const fn trailers(&self) -> &Headers {
        &self.trailers
    }

    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Declared `Content-Length`; `None` when absent.
    #[inline(always)]
    pub const fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    #[inline(always)]
    pub const fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// `Connection` listed `upgrade`.
    #[inline(always)]
    pub const fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    /// Whether the connection stays open after this exchange.
    #[inline(always)]
    pub const fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[inline(always)]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    #[inline(always)]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    #[inline(always)]
    pub const fn tls(&self) -> Option<&TlsInfo> {
        self.tls.as_ref()
    }
}

/// Transport facts every request on one connection shares.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnInfo {
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) local_addr: Option<SocketAddr>,
    pub(crate) tls: Option<TlsInfo>,
    pub(crate) secure: bool,
}

impl ConnInfo {
    pub(crate) fn apply(&self, request: &mut Request) {
        request.remote_addr = self.remote_addr;
        request.local_addr = self.local_addr;
        request.tls = self.tls.clone();
        request
            .url
            .apply_defaults(self.secure, self.local_addr.map(|a| a.port()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnInfo {
        ConnInfo {
            remote_addr: Some("10.0.0.2:50000".parse().unwrap()),
            local_addr: Some("10.0.0.1:8443".parse().unwrap()),
            tls: Some(TlsInfo {
                server_name: Some("api.test".to_owned()),
                alpn_protocol: Some(b"h2".to_vec()),
            }),
            secure: true,
        }
    }

    #[test]
    fn pseudo_headers() {
        let fields = [
            (":method", "POST"),
            (":scheme", "https"),
            (":authority", "api.test:9000"),
            (":path", "/v1/items?limit=5"),
            ("content-type", "application/json"),
            ("x-trace", "a"),
            ("x-trace", "b"),
        ];
        let request = Request::from_header_fields(fields, b"{}".to_vec(), &conn());

        assert_eq!(request.method(), Method::Post);
        assert_eq!(request.version(), Version::HTTP_2);
        assert_eq!(request.url().scheme(), "https");
        assert_eq!(request.url().host(), "api.test");
        assert_eq!(request.url().port(), Some(9000));
        assert_eq!(request.path(), "/v1/items");
        assert_eq!(request.url().query(), Some("limit=5"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header_value("x-trace").as_deref(), Some("a, b"));
        assert_eq!(request.headers().len(), 3);
        assert_eq!(request.body(), b"{}");
        assert_eq!(request.tls().unwrap().alpn_protocol.as_deref(), Some(&b"h2"[..]));
    }

    #[test]
    fn missing_pseudo_headers() {
        let request = Request::from_header_fields([("host", "fallback")], Vec::new(), &conn());

        assert_eq!(request.method(), Method::Unknown);
        assert_eq!(request.path(), "/");
        assert_eq!(request.url().scheme(), "https");
        assert_eq!(request.url().host(), "fallback");
        assert_eq!(request.url().port(), Some(8443));
        assert_eq!(request.remote_addr(), Some("10.0.0.2:50000".parse().unwrap()));
    }
}
