use crate::router::converter::ParamKind;
use std::io;
use thiserror::Error;

/// Everything that can end an HTTP/1.1 connection before a handler sees the request.
#[derive(Debug, Error, PartialEq)]
pub(crate) enum ErrorKind {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("malformed protocol token")]
    InvalidVersion,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("header block is not valid UTF-8")]
    InvalidEncoding,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("chunk framing violation")]
    InvalidChunk,
    #[error("bare line feed in strict mode")]
    BareLineFeed,

    #[error("request line too long")]
    RequestLineTooLong,
    #[error("header line too long")]
    HeaderTooLarge,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("request body too large")]
    BodyTooLarge,

    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("i/o error: {0:?}")]
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status_code:literal, $len:literal => $json:literal; )*) => {
        /// Canned response for errors the peer can still be told about.
        ///
        /// Framing and transport errors return `None`: the connection is
        /// closed without writing anything.
        pub(crate) const fn as_http(&self, json: bool) -> Option<&'static [u8]> {
            let bytes = match (json, self) {
                $(
                    (true, Self::$name) => concat!(
                        "HTTP/1.1 ", $status_code, "\r\n",
                        "connection: close\r\n",
                        "content-length: ", $len, "\r\n",
                        "content-type: application/json\r\n",
                        "\r\n",
                        $json
                    ),
                    (false, Self::$name) => concat!(
                        "HTTP/1.1 ", $status_code, "\r\n",
                        "connection: close\r\n",
                        "content-length: 0\r\n\r\n",
                    ),
                )*
                _ => return None,
            };
            Some(bytes.as_bytes())
        }
    };
}

impl ErrorKind {
    http_errors! {
        RequestLineTooLong: "414 URI Too Long", "60"
            => r#"{"error":"Request line too long","code":"REQUEST_LINE_LONG"}"#;
        HeaderTooLarge: "431 Request Header Fields Too Large", "58"
            => r#"{"error":"Header line too long","code":"HEADER_TOO_LARGE"}"#;
        TooManyHeaders: "431 Request Header Fields Too Large", "54"
            => r#"{"error":"Too many headers","code":"TOO_MANY_HEADERS"}"#;
        BodyTooLarge: "413 Payload Too Large", "58"
            => r#"{"error":"Request body too large","code":"BODY_TOO_LARGE"}"#;
        ServiceUnavailable: "503 Service Unavailable", "72"
            => r#"{"error":"Service temporarily unavailable","code":"SERVICE_UNAVAILABLE"}"#;
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

/// Why a rule could not be registered.
///
/// Reported by [`Router`](crate::Router) at registration time; the rule is
/// not added.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A declared parameter type has no converter in the registry.
    #[error("no converter registered for {0:?}")]
    MissingConverter(ParamKind),
    /// The number of `<arg>` placeholders differs from the declared parameters.
    #[error("pattern has {placeholders} placeholders but {params} parameters were declared")]
    PlaceholderMismatch { placeholders: usize, params: usize },
    /// A converter fragment contains its own capture group.
    #[error("converter fragment for {0:?} must not contain capture groups")]
    CaptureGroupInFragment(ParamKind),
    /// The method set is empty after filtering unknown methods.
    #[error("rule accepts no methods")]
    NoMethods,
    /// The expanded pattern failed to compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Misuse of a [`Responder`](crate::Responder).
///
/// The responder logs these as well; callers may ignore them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponderError {
    #[error("a response was already written")]
    AlreadyResponded,
    #[error("status and headers were already written")]
    HeadersAlreadySent,
    #[error("status and headers were not written yet")]
    HeadersNotSent,
    #[error("chunked transfer was not started")]
    NotChunked,
    #[error("zero-length chunk ignored")]
    EmptyChunk,
    #[error("connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_responses() {
        #[rustfmt::skip]
        let cases = [
            (ErrorKind::BodyTooLarge, "HTTP/1.1 413 Payload Too Large\r\n"),
            (ErrorKind::TooManyHeaders, "HTTP/1.1 431 Request Header Fields Too Large\r\n"),
            (ErrorKind::RequestLineTooLong, "HTTP/1.1 414 URI Too Long\r\n"),
            (ErrorKind::ServiceUnavailable, "HTTP/1.1 503 Service Unavailable\r\n"),
        ];

        for (kind, first_line) in cases {
            for json in [true, false] {
                let bytes = kind.as_http(json).unwrap();
                let text = std::str::from_utf8(bytes).unwrap();
                assert!(text.starts_with(first_line), "{kind:?}");

                let (head, body) = text.split_once("\r\n\r\n").unwrap();
                let declared: usize = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length: "))
                    .unwrap()
                    .parse()
                    .unwrap();
                assert_eq!(declared, body.len(), "{kind:?} json={json}");
            }
        }
    }

    #[test]
    fn framing_errors_are_silent() {
        for kind in [
            ErrorKind::InvalidRequestLine,
            ErrorKind::InvalidVersion,
            ErrorKind::InvalidChunk,
            ErrorKind::Io(IoError(io::ErrorKind::BrokenPipe.into())),
        ] {
            assert_eq!(kind.as_http(true), None);
        }
    }
}
