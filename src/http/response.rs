//! Response values returned by handlers.

use crate::http::types::{Headers, StatusCode};

/// MIME type marking a response that carries only a status.
pub(crate) const EMPTY_MIME: &str = "application/x-empty";

/// A complete response: status, ordered headers and body.
///
/// Value-returning handlers build one of these; the server writes it through
/// the request's [`Responder`](crate::Responder) after the
/// [after-request hooks](crate::Service::after_request) had their turn.
/// `Content-Length` is always computed when the response is written.
///
/// # Examples
/// ```
/// use duet_http::{Response, StatusCode};
///
/// let mut resp = Response::with_mime("text/html", "<h1>Hello</h1>", StatusCode::OK);
/// resp.add_header("Cache-Control", "no-store");
///
/// assert_eq!(resp.mime_type(), Some("text/html"));
/// assert_eq!(resp.body(), b"<h1>Hello</h1>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Headers,
    pub(crate) body: Vec<u8>,
}

impl Response {
    /// A response with only a status.
    ///
    /// Written as `Content-Type: application/x-empty` with `Content-Length: 0`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::from([("Content-Type", EMPTY_MIME)]),
            body: Vec::new(),
        }
    }

    /// A response with a body and no `Content-Type`.
    pub fn with_body(body: impl Into<Vec<u8>>, status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// A response with a body and its `Content-Type`.
    pub fn with_mime(mime: &str, body: impl Into<Vec<u8>>, status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::from([("Content-Type", mime)]),
            body: body.into(),
        }
    }

    #[inline(always)]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[inline(always)]
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    #[inline(always)]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    #[inline(always)]
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Appends a header, keeping earlier values of the same name.
    #[inline]
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces every value of `name` with `value`.
    #[inline]
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.replace_or_append(name, value);
        self
    }

    #[inline]
    pub fn clear_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(name);
        self
    }

    #[inline]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// Every value of `name`, in order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        self.headers.get_all(name).collect()
    }

    /// Value of `Content-Type`.
    #[inline]
    pub fn mime_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[inline]
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Moves the body out, leaving it empty.
    #[inline]
    pub fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Response::new(StatusCode::OK)
    }
}

impl From<StatusCode> for Response {
    fn from(status: StatusCode) -> Self {
        Response::new(status)
    }
}

impl From<&str> for Response {
    fn from(body: &str) -> Self {
        Response::with_mime("text/plain; charset=utf-8", body, StatusCode::OK)
    }
}

impl From<String> for Response {
    fn from(body: String) -> Self {
        Response::with_mime("text/plain; charset=utf-8", body, StatusCode::OK)
    }
}

impl From<Vec<u8>> for Response {
    fn from(body: Vec<u8>) -> Self {
        Response::with_mime("application/octet-stream", body, StatusCode::OK)
    }
}

impl<B: Into<Vec<u8>>> From<(StatusCode, B)> for Response {
    fn from((status, body): (StatusCode, B)) -> Self {
        Response::with_body(body, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        #[rustfmt::skip]
        let cases = [
            (Response::new(StatusCode::NO_CONTENT), StatusCode::NO_CONTENT, Some(EMPTY_MIME), &b""[..]),
            (Response::with_body("x", StatusCode::OK), StatusCode::OK, None, b"x"),
            (Response::with_mime("a/b", "y", StatusCode::CREATED), StatusCode::CREATED, Some("a/b"), b"y"),
            (Response::from("hi"), StatusCode::OK, Some("text/plain; charset=utf-8"), b"hi"),
            (Response::from(vec![1u8, 2]), StatusCode::OK, Some("application/octet-stream"), &[1, 2]),
            (Response::from((StatusCode::ACCEPTED, "z")), StatusCode::ACCEPTED, None, b"z"),
        ];

        for (resp, status, mime, body) in cases {
            assert_eq!(resp.status(), status);
            assert_eq!(resp.mime_type(), mime);
            assert_eq!(resp.body(), body);
        }
    }

    #[test]
    fn header_editing() {
        let mut resp = Response::with_body("", StatusCode::OK);
        resp.add_header("X-A", "1").add_header("x-a", "2").add_header("X-B", "3");
        assert_eq!(resp.header_values("X-A"), ["1", "2"]);
        assert!(resp.has_header("x-b"));

        resp.set_header("x-a", "9");
        assert_eq!(resp.header_values("X-A"), ["9"]);

        resp.clear_header("X-B");
        assert!(!resp.has_header("X-B"));
        assert_eq!(resp.headers().len(), 1);
    }
}
