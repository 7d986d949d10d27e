#![allow(rustdoc::bare_urls)]

//! Core HTTP protocol types and utilities

use std::{fmt, ops::BitOr};

#[inline(always)]
pub(crate) fn slice_to_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: u64 = 0;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }

        result = result.checked_mul(10)?.checked_add((byte - b'0') as u64)?;
    }

    Some(result)
}

#[inline(always)]
pub(crate) fn hex_to_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: u64 = 0;
    for &byte in bytes {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => return None,
        };

        result = result.checked_mul(16)?.checked_add(digit as u64)?;
    }

    Some(result)
}

/// Case-insensitive search for `token` in a comma separated header value.
#[inline]
pub(crate) fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

// METHOD

/// HTTP request methods
///
/// Tokens the server does not know map to [`Method::Unknown`] instead of
/// failing the request; routing decides what to do with them.
///
/// # References
///
/// - [RFC 9110, Section 9](https://datatracker.ietf.org/doc/html/rfc9110#section-9)
/// - [RFC 5789](https://datatracker.ietf.org/doc/html/rfc5789) (PATCH method)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method - transfer a current representation of the target resource
    /// [[RFC9110, Section 9.3.1](https://datatracker.ietf.org/doc/html/rfc9110#section-9.3.1)]
    Get,
    /// PUT method - replace all current representations of the target resource with the request payload
    /// [[RFC9110, Section 9.3.4](https://datatracker.ietf.org/doc/html/rfc9110#section-9.3.4)]
    Put,
    /// DELETE method - remove all current representations of the target resource
    /// [[RFC9110, Section 9.3.5](https://datatracker.ietf.org/doc/html/rfc9110#section-9.3.5)]
    Delete,
    /// POST method - perform resource-specific processing on the request payload
    /// [[RFC9110, Section 9.3.3](https://datatracker.ietf.org/doc/html/rfc9110#section-9.3.3)]
    Post,
    /// HEAD method - same as GET but without response body
    /// [[RFC9110, Section 9.3.2](https://datatracker.ietf.org/doc/html/rfc9110#section-9.3.2)]
    Head,
    /// OPTIONS method - describe the communication options for the target resource
    /// [[RFC9110, Section 9.3.7](https://datatracker.ietf.org/doc/html/rfc9110#section-9.3.7)]
    Options,
    /// PATCH method - apply partial modifications to a resource
    /// [[RFC5789, Section 2](https://datatracker.ietf.org/doc/html/rfc5789#section-2)]
    Patch,
    /// CONNECT method - establish a tunnel to the server identified by the target
    /// [[RFC9110, Section 9.3.6](https://datatracker.ietf.org/doc/html/rfc9110#section-9.3.6)]
    Connect,
    /// Any other token.
    Unknown,
}

impl Method {
    #[inline]
    pub(crate) fn from_bytes(src: &[u8]) -> Self {
        match src {
            b"GET" => Method::Get,
            b"PUT" => Method::Put,
            b"DELETE" => Method::Delete,
            b"POST" => Method::Post,
            b"HEAD" => Method::Head,
            b"OPTIONS" => Method::Options,
            b"PATCH" => Method::Patch,
            b"CONNECT" => Method::Connect,
            _ => Method::Unknown,
        }
    }

    /// Returns the method token, `"UNKNOWN"` for [`Method::Unknown`].
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Connect => "CONNECT",
            Method::Unknown => "UNKNOWN",
        }
    }

    #[inline(always)]
    const fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::Unknown
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of methods a rule accepts.
///
/// The empty set accepts every known method; [`Method::Unknown`] is only
/// matched when [`Methods::UNKNOWN`] is part of a non-empty set.
///
/// ```
/// use duet_http::{Method, Methods};
///
/// let set = Methods::GET | Methods::HEAD;
/// assert!(set.contains(Method::Head));
/// assert!(!set.contains(Method::Post));
/// assert!(Methods::ANY.contains(Method::Patch));
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Methods(u16);

impl Methods {
    pub const ANY: Methods = Methods(0);
    pub const GET: Methods = Methods(Method::Get.bit());
    pub const PUT: Methods = Methods(Method::Put.bit());
    pub const DELETE: Methods = Methods(Method::Delete.bit());
    pub const POST: Methods = Methods(Method::Post.bit());
    pub const HEAD: Methods = Methods(Method::Head.bit());
    pub const OPTIONS: Methods = Methods(Method::Options.bit());
    pub const PATCH: Methods = Methods(Method::Patch.bit());
    pub const CONNECT: Methods = Methods(Method::Connect.bit());
    pub const UNKNOWN: Methods = Methods(Method::Unknown.bit());

    const KNOWN: u16 = Method::Unknown.bit() - 1;

    #[inline]
    pub const fn contains(&self, method: Method) -> bool {
        match self.0 {
            0 => !matches!(method, Method::Unknown),
            bits => bits & method.bit() != 0,
        }
    }

    /// `false` when the set names nothing but [`Method::Unknown`].
    #[inline]
    pub const fn has_known(&self) -> bool {
        self.0 == 0 || self.0 & Self::KNOWN != 0
    }
}

impl BitOr for Methods {
    type Output = Methods;

    fn bitor(self, rhs: Methods) -> Methods {
        Methods(self.0 | rhs.0)
    }
}

impl From<Method> for Methods {
    fn from(method: Method) -> Self {
        Methods(method.bit())
    }
}

// VERSION

/// HTTP protocol version as `major.minor`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    /// [RFC 1945](https://tools.ietf.org/html/rfc1945)
    pub const HTTP_10: Version = Version { major: 1, minor: 0 };
    /// [RFC 9112](https://datatracker.ietf.org/doc/html/rfc9112)
    pub const HTTP_11: Version = Version { major: 1, minor: 1 };
    /// [RFC 9113](https://datatracker.ietf.org/doc/html/rfc9113)
    pub const HTTP_2: Version = Version { major: 2, minor: 0 };

    /// Parses the 8-byte `HTTP/<d>.<d>` protocol token.
    #[inline(always)]
    pub(crate) const fn from_bytes(src: &[u8]) -> Option<Self> {
        match src {
            [b'H', b'T', b'T', b'P', b'/', major, b'.', minor]
                if major.is_ascii_digit() && minor.is_ascii_digit() =>
            {
                Some(Version {
                    major: *major - b'0',
                    minor: *minor - b'0',
                })
            }
            _ => None,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::HTTP_11
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($(
        $(#[$docs:meta])+
        $name:ident = ($num:literal, $str:literal);
    )+) => {
        impl StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $(#[$docs])+
            pub const $name: StatusCode = StatusCode($num);
        )+ }

        impl StatusCode {
            /// Canonical reason phrase, `None` for codes without one.
            #[inline]
            pub const fn reason(&self) -> Option<&'static str> {
                match self.0 {
                    $( $num => Some($str), )+
                    _ => None,
                }
            }
        }
    }
}

/// HTTP status code in the `100..=599` range.
///
/// Codes without a canonical reason phrase are still valid; they are written
/// numerically with an empty reason.
///
/// ```
/// use duet_http::StatusCode;
///
/// assert_eq!(StatusCode::NOT_FOUND.reason(), Some("Not Found"));
/// assert_eq!(StatusCode::new(299).unwrap().reason(), None);
/// assert!(StatusCode::new(600).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u16);

impl StatusCode {
    /// Returns `None` outside `100..=599`.
    #[inline]
    pub const fn new(code: u16) -> Option<Self> {
        match code {
            100..=599 => Some(StatusCode(code)),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// 1xx codes do not end an exchange.
    #[inline(always)]
    pub const fn is_informational(&self) -> bool {
        self.0 < 200
    }

    /// Writes `HTTP/1.1 <code> <reason>\r\n`, omitting the reason when unknown.
    pub(crate) fn write_status_line(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(b"HTTP/1.1 ");
        buffer.extend_from_slice(self.0.to_string().as_bytes());
        buffer.push(b' ');
        if let Some(reason) = self.reason() {
            buffer.extend_from_slice(reason.as_bytes());
        }
        buffer.extend_from_slice(b"\r\n");
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::OK
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} {}", self.0, reason),
            None => write!(f, "{}", self.0),
        }
    }
}

set_status_codes! {
    /// [[RFC9110, Section 15.2.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.2.1)]
    CONTINUE = (100, "Continue");
    /// [[RFC9110, Section 15.2.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.2.2)]
    SWITCHING_PROTOCOLS = (101, "Switching Protocols");
    /// [[RFC2518, Section 10.1](https://datatracker.ietf.org/doc/html/rfc2518#section-10.1)]
    PROCESSING = (102, "Processing");
    /// [[RFC8297, Section 2](https://datatracker.ietf.org/doc/html/rfc8297#section-2)]
    EARLY_HINTS = (103, "Early Hints");

    /// [[RFC9110, Section 15.3.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.1)]
    OK = (200, "OK");
    /// [[RFC9110, Section 15.3.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.2)]
    CREATED = (201, "Created");
    /// [[RFC9110, Section 15.3.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.3)]
    ACCEPTED = (202, "Accepted");
    /// [[RFC9110, Section 15.3.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.4)]
    NON_AUTHORITATIVE_INFORMATION = (203, "Non-Authoritative Information");
    /// [[RFC9110, Section 15.3.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.5)]
    NO_CONTENT = (204, "No Content");
    /// [[RFC9110, Section 15.3.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.6)]
    RESET_CONTENT = (205, "Reset Content");
    /// [[RFC9110, Section 15.3.7](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.7)]
    PARTIAL_CONTENT = (206, "Partial Content");
    /// [[RFC4918, Section 11.1](https://datatracker.ietf.org/doc/html/rfc4918#section-11.1)]
    MULTI_STATUS = (207, "Multi-Status");
    /// [[RFC5842, Section 7.1](https://datatracker.ietf.org/doc/html/rfc5842#section-7.1)]
    ALREADY_REPORTED = (208, "Already Reported");
    /// [[RFC3229, Section 10.4.1](https://datatracker.ietf.org/doc/html/rfc3229#section-10.4.1)]
    IM_USED = (226, "IM Used");

    /// [[RFC9110, Section 15.4.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.1)]
    MULTIPLE_CHOICES = (300, "Multiple Choices");
    /// [[RFC9110, Section 15.4.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.2)]
    MOVED_PERMANENTLY = (301, "Moved Permanently");
    /// [[RFC9110, Section 15.4.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.3)]
    FOUND = (302, "Found");
    /// [[RFC9110, Section 15.4.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.4)]
    SEE_OTHER = (303, "See Other");
    /// [[RFC9110, Section 15.4.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.5)]
    NOT_MODIFIED = (304, "Not Modified");
    /// [[RFC9110, Section 15.4.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.6)]
    USE_PROXY = (305, "Use Proxy");
    /// [[RFC9110, Section 15.4.8](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.8)]
    TEMPORARY_REDIRECT = (307, "Temporary Redirect");
    /// [[RFC9110, Section 15.4.9](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.9)]
    PERMANENT_REDIRECT = (308, "Permanent Redirect");

    /// [[RFC9110, Section 15.5.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.1)]
    BAD_REQUEST = (400, "Bad Request");
    /// [[RFC9110, Section 15.5.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.2)]
    UNAUTHORIZED = (401, "Unauthorized");
    /// [[RFC9110, Section 15.5.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.3)]
    PAYMENT_REQUIRED = (402, "Payment Required");
    /// [[RFC9110, Section 15.5.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.4)]
    FORBIDDEN = (403, "Forbidden");
    /// [[RFC9110, Section 15.5.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.5)]
    NOT_FOUND = (404, "Not Found");
    /// [[RFC9110, Section 15.5.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.6)]
    METHOD_NOT_ALLOWED = (405, "Method Not Allowed");
    /// [[RFC9110, Section 15.5.7](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.7)]
    NOT_ACCEPTABLE = (406, "Not Acceptable");
    /// [[RFC9110, Section 15.5.8](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.8)]
    PROXY_AUTHENTICATION_REQUIRED = (407, "Proxy Authentication Required");
    /// [[RFC9110, Section 15.5.9](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.9)]
    REQUEST_TIMEOUT = (408, "Request Timeout");
    /// [[RFC9110, Section 15.5.10](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.10)]
    CONFLICT = (409, "Conflict");
    /// [[RFC9110, Section 15.5.11](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.11)]
    GONE = (410, "Gone");
    /// [[RFC9110, Section 15.5.12](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.12)]
    LENGTH_REQUIRED = (411, "Length Required");
    /// [[RFC9110, Section 15.5.13](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.13)]
    PRECONDITION_FAILED = (412, "Precondition Failed");
    /// [[RFC9110, Section 15.5.14](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.14)]
    PAYLOAD_TOO_LARGE = (413, "Payload Too Large");
    /// [[RFC9110, Section 15.5.15](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.15)]
    URI_TOO_LONG = (414, "URI Too Long");
    /// [[RFC9110, Section 15.5.16](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.16)]
    UNSUPPORTED_MEDIA_TYPE = (415, "Unsupported Media Type");
    /// [[RFC9110, Section 15.5.17](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.17)]
    RANGE_NOT_SATISFIABLE = (416, "Requested Range Not Satisfiable");
    /// [[RFC9110, Section 15.5.18](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.18)]
    EXPECTATION_FAILED = (417, "Expectation Failed");
    /// [[RFC2324, Section 2.3.2](https://datatracker.ietf.org/doc/html/rfc2324#section-2.3.2)]
    IM_A_TEAPOT = (418, "I'm a teapot");
    /// [[RFC9110, Section 15.5.20](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.20)]
    MISDIRECTED_REQUEST = (421, "Misdirected Request");
    /// [[RFC9110, Section 15.5.21](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.21)]
    UNPROCESSABLE_ENTITY = (422, "Unprocessable Entity");
    /// [[RFC4918, Section 11.3](https://datatracker.ietf.org/doc/html/rfc4918#section-11.3)]
    LOCKED = (423, "Locked");
    /// [[RFC4918, Section 11.4](https://datatracker.ietf.org/doc/html/rfc4918#section-11.4)]
    FAILED_DEPENDENCY = (424, "Failed Dependency");
    /// [[RFC8470, Section 5.2](https://httpwg.org/specs/rfc8470.html#status)]
    TOO_EARLY = (425, "Too Early");
    /// [[RFC9110, Section 15.5.22](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.22)]
    UPGRADE_REQUIRED = (426, "Upgrade Required");
    /// [[RFC6585, Section 3](https://datatracker.ietf.org/doc/html/rfc6585#section-3)]
    PRECONDITION_REQUIRED = (428, "Precondition Required");
    /// [[RFC6585, Section 4](https://datatracker.ietf.org/doc/html/rfc6585#section-4)]
    TOO_MANY_REQUESTS = (429, "Too Many Requests");
    /// [[RFC6585, Section 5](https://datatracker.ietf.org/doc/html/rfc6585#section-5)]
    REQUEST_HEADER_FIELDS_TOO_LARGE = (431, "Request Header Fields Too Large");
    /// [[RFC7725, Section 3](https://tools.ietf.org/html/rfc7725#section-3)]
    UNAVAILABLE_FOR_LEGAL_REASONS = (451, "Unavailable For Legal Reasons");

    /// [[RFC9110, Section 15.6.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.1)]
    INTERNAL_SERVER_ERROR = (500, "Internal Server Error");
    /// [[RFC9110, Section 15.6.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.2)]
    NOT_IMPLEMENTED = (501, "Not Implemented");
    /// [[RFC9110, Section 15.6.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.3)]
    BAD_GATEWAY = (502, "Bad Gateway");
    /// [[RFC9110, Section 15.6.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.4)]
    SERVICE_UNAVAILABLE = (503, "Service Unavailable");
    /// [[RFC9110, Section 15.6.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.5)]
    GATEWAY_TIMEOUT = (504, "Gateway Timeout");
    /// [[RFC9110, Section 15.6.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.6)]
    HTTP_VERSION_NOT_SUPPORTED = (505, "HTTP Version Not Supported");
    /// [[RFC2295, Section 8.1](https://datatracker.ietf.org/doc/html/rfc2295#section-8.1)]
    VARIANT_ALSO_NEGOTIATES = (506, "Variant Also Negotiates");
    /// [[RFC4918, Section 11.5](https://datatracker.ietf.org/doc/html/rfc4918#section-11.5)]
    INSUFFICIENT_STORAGE = (507, "Insufficient Storage");
    /// [[RFC5842, Section 7.2](https://datatracker.ietf.org/doc/html/rfc5842#section-7.2)]
    LOOP_DETECTED = (508, "Loop Detected");
    /// [[RFC2774, Section 7](https://datatracker.ietf.org/doc/html/rfc2774#section-7)]
    NOT_EXTENDED = (510, "Not Extended");
    /// [[RFC6585, Section 6](https://datatracker.ietf.org/doc/html/rfc6585#section-6)]
    NETWORK_AUTHENTICATION_REQUIRED = (511, "Network Authentication Required");
    /// Non-standard, used by some proxies when the upstream connect times out.
    NETWORK_CONNECT_TIMEOUT_ERROR = (599, "Network Connect Timeout Error");
}

// HEADERS

/// Ordered header list.
///
/// Names keep the case they were written with and compare case-insensitively.
/// A name may appear several times; [`Headers::combined`] joins the values
/// with `", "`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[inline]
    pub const fn new() -> Self {
        Headers {
            entries: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Appends a field, keeping any existing fields of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces the first field named `name` and drops the others, or appends.
    pub fn replace_or_append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(first) => {
                self.entries[first].1 = value;
                let mut index = 0;
                self.entries.retain(|(n, _)| {
                    let keep = index <= first || !n.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Removes every field named `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// First value for `name`.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name` joined with `", "`.
    pub fn combined(&self, name: &str) -> Option<String> {
        let mut values = self.get_all(name);
        let mut result = values.next()?.to_owned();
        for value in values {
            result.push_str(", ");
            result.push_str(value);
        }
        Some(result)
    }

    /// `true` when any `name` field lists `token` (comma separated, case-insensitive).
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).any(|value| has_token(value, token))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut (String, String)> {
        self.entries.last_mut()
    }

    pub(crate) fn write_to(&self, buffer: &mut Vec<u8>) {
        for (name, value) in &self.entries {
            buffer.extend_from_slice(name.as_bytes());
            buffer.extend_from_slice(b": ");
            buffer.extend_from_slice(value.as_bytes());
            buffer.extend_from_slice(b"\r\n");
        }
    }

    #[inline]
    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Headers {
            entries: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Headers {
    fn from(value: [(K, V); N]) -> Self {
        value.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_tokens() {
        #[rustfmt::skip]
        let cases: [(&[u8], Method); 11] = [
            (b"GET", Method::Get),
            (b"PUT", Method::Put),
            (b"DELETE", Method::Delete),
            (b"POST", Method::Post),
            (b"HEAD", Method::Head),
            (b"OPTIONS", Method::Options),
            (b"PATCH", Method::Patch),
            (b"CONNECT", Method::Connect),
            (b"TRACE", Method::Unknown),
            (b"get", Method::Unknown),
            (b"", Method::Unknown),
        ];

        for (token, expected) in cases {
            assert_eq!(Method::from_bytes(token), expected, "{:?}", token);
        }
    }

    #[test]
    fn method_sets() {
        assert!(Methods::ANY.contains(Method::Get));
        assert!(Methods::ANY.contains(Method::Connect));
        assert!(!Methods::ANY.contains(Method::Unknown));

        let set = Methods::POST | Methods::PUT;
        assert!(set.contains(Method::Post));
        assert!(set.contains(Method::Put));
        assert!(!set.contains(Method::Get));

        assert!((Methods::UNKNOWN | Methods::GET).contains(Method::Unknown));
        assert!(!Methods::UNKNOWN.has_known());
        assert!(Methods::ANY.has_known());
        assert!((Methods::UNKNOWN | Methods::GET).has_known());
    }

    #[test]
    fn versions() {
        #[rustfmt::skip]
        let cases: [(&[u8], Option<Version>); 6] = [
            (b"HTTP/1.1", Some(Version::HTTP_11)),
            (b"HTTP/1.0", Some(Version::HTTP_10)),
            (b"HTTP/2.0", Some(Version::HTTP_2)),
            (b"HTTP/1.x", None),
            (b"HTTPS1.1", None),
            (b"HTTP/1.10", None),
        ];

        for (token, expected) in cases {
            assert_eq!(Version::from_bytes(token), expected, "{:?}", token);
        }
    }

    #[test]
    fn status_lines() {
        #[rustfmt::skip]
        let cases = [
            (200, "HTTP/1.1 200 OK\r\n"),
            (404, "HTTP/1.1 404 Not Found\r\n"),
            (599, "HTTP/1.1 599 Network Connect Timeout Error\r\n"),
            (299, "HTTP/1.1 299 \r\n"),
        ];

        for (code, expected) in cases {
            let mut buffer = Vec::new();
            StatusCode::new(code).unwrap().write_status_line(&mut buffer);
            assert_eq!(buffer, expected.as_bytes());
        }

        assert_eq!(StatusCode::new(99), None);
        assert_eq!(StatusCode::new(600), None);
    }

    #[test]
    fn header_lookup() {
        let mut headers = Headers::from([
            ("Host", "example.com"),
            ("Accept", "text/html"),
            ("accept", "application/json"),
        ]);

        assert_eq!(headers.get("HOST"), Some("example.com"));
        assert_eq!(
            headers.combined("Accept").as_deref(),
            Some("text/html, application/json")
        );
        assert_eq!(headers.get_all("ACCEPT").count(), 2);

        headers.replace_or_append("ACCEPT", "*/*");
        assert_eq!(headers.get_all("accept").collect::<Vec<_>>(), ["*/*"]);
        assert_eq!(headers.len(), 2);

        headers.replace_or_append("X-New", "1");
        assert_eq!(headers.iter().last(), Some(("X-New", "1")));

        headers.remove("host");
        assert!(!headers.contains("Host"));
    }

    #[test]
    fn header_tokens() {
        let headers = Headers::from([("Connection", "keep-alive, Upgrade")]);
        assert!(headers.contains_token("connection", "upgrade"));
        assert!(!headers.contains_token("connection", "close"));
    }

    #[test]
    fn numbers() {
        assert_eq!(slice_to_u64(b"1234"), Some(1234));
        assert_eq!(slice_to_u64(b""), None);
        assert_eq!(slice_to_u64(b"12a"), None);
        assert_eq!(slice_to_u64(b"99999999999999999999999"), None);
        assert_eq!(hex_to_u64(b"1aF"), Some(0x1af));
        assert_eq!(hex_to_u64(b"g"), None);
    }
}
