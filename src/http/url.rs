//! Request URL: target parsing, authority defaults and query pairs.

use memchr::{memchr, memchr2, memchr3};

/// URL of a request.
///
/// Built from the request target, then completed from the `Host` header (or
/// `:authority`), the transport's encryption and the listening port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    pub(crate) scheme: String,
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
    pub(crate) raw_path: String,
    pub(crate) query: Option<String>,
    pub(crate) fragment: Option<String>,
}

impl Url {
    /// Splits a request target into its components.
    ///
    /// Accepts origin-form (`/p?q#f`), absolute-form (`http://h:1/p`),
    /// authority-form (`h:1`, used by CONNECT) and asterisk-form (`*`).
    /// Returns `None` for an empty target.
    pub(crate) fn from_target(target: &str) -> Option<Self> {
        if target.is_empty() {
            return None;
        }

        let mut url = Url::default();
        let rest = match target.find("://") {
            Some(pos) if !target.starts_with('/') => {
                url.scheme = target[..pos].to_ascii_lowercase();

                let after = &target[pos + 3..];
                let end = memchr3(b'/', b'?', b'#', after.as_bytes()).unwrap_or(after.len());
                url.set_authority(&after[..end]);
                &after[end..]
            }
            _ if target.starts_with('/') || target == "*" => target,
            _ => {
                url.set_authority(target);
                return Some(url);
            }
        };

        let (rest, fragment) = match memchr(b'#', rest.as_bytes()) {
            Some(pos) => (&rest[..pos], Some(rest[pos + 1..].to_owned())),
            None => (rest, None),
        };
        let (path, query) = match memchr(b'?', rest.as_bytes()) {
            Some(pos) => (&rest[..pos], Some(rest[pos + 1..].to_owned())),
            None => (rest, None),
        };

        url.raw_path = match path.is_empty() {
            true => "/".to_owned(),
            false => path.to_owned(),
        };
        url.query = query;
        url.fragment = fragment;

        Some(url)
    }

    /// Sets host and port from `host`, `host:port` or `[v6]:port`.
    pub(crate) fn set_authority(&mut self, authority: &str) {
        let authority = match authority.rfind('@') {
            Some(pos) => &authority[pos + 1..],
            None => authority,
        };

        let (host, port) = match authority.strip_prefix('[') {
            Some(v6) => match v6.split_once(']') {
                Some((host, tail)) => (host, tail.strip_prefix(':')),
                None => (authority, None),
            },
            None => match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            },
        };

        self.host = host.to_owned();
        self.port = port.and_then(|p| p.parse().ok());
    }

    /// Fills in what neither the target nor the authority provided.
    pub(crate) fn apply_defaults(&mut self, secure: bool, local_port: Option<u16>) {
        if self.scheme.is_empty() {
            self.scheme = match secure {
                true => "https",
                false => "http",
            }
            .to_owned();
        }
        if self.host.is_empty() {
            self.host = "127.0.0.1".to_owned();
        }
        if self.port.is_none() {
            self.port = local_port;
        }
    }
}

// Public API
impl Url {
    /// `http` or `https` unless the request carried an absolute URL.
    #[inline(always)]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[inline(always)]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline(always)]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Percent-decoded path, the value the router matches against.
    ///
    /// # Examples
    ///
    /// For target `/files/a%20b.txt?x=1`:
    /// ```text
    /// /files/a b.txt
    /// ```
    pub fn path(&self) -> String {
        percent_decode(&self.raw_path, false)
    }

    /// Path exactly as it appeared in the request target.
    #[inline(always)]
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Raw query string without the leading `?`.
    #[inline(always)]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    #[inline(always)]
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Decoded `name=value` pairs of the query string, in order.
    ///
    /// `+` decodes to a space, a missing `=` yields an empty value and empty
    /// segments are skipped.
    ///
    /// ```text
    /// debug&name=j%C3%B6rg&&q=a+b  =>  [("debug", ""), ("name", "jörg"), ("q", "a b")]
    /// ```
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(query) = self.query.as_deref() else {
            return Vec::new();
        };

        query
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| match memchr(b'=', part.as_bytes()) {
                Some(pos) => (
                    percent_decode(&part[..pos], true),
                    percent_decode(&part[pos + 1..], true),
                ),
                None => (percent_decode(part, true), String::new()),
            })
            .collect()
    }

    /// First decoded value for `name` in the query string.
    pub fn query_value(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }
}

/// Decodes `%XX` escapes, leaving malformed escapes as they are.
pub(crate) fn percent_decode(src: &str, plus_as_space: bool) -> String {
    let bytes = src.as_bytes();
    if memchr2(b'%', b'+', bytes).is_none() {
        return src.to_owned();
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' if plus_as_space => out.push(b' '),
            byte => out.push(byte),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[inline(always)]
fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_forms() {
        #[rustfmt::skip]
        let cases = [
            // target, scheme, host, port, raw_path, query, fragment
            ("/x", "", "", None, "/x", None, None),
            ("/a/b?c=1#top", "", "", None, "/a/b", Some("c=1"), Some("top")),
            ("/?", "", "", None, "/", Some(""), None),
            ("http://h.io:81/p?q", "http", "h.io", Some(81), "/p", Some("q"), None),
            ("HTTPS://h.io", "https", "h.io", None, "/", None, None),
            ("*", "", "", None, "*", None, None),
        ];

        for (target, scheme, host, port, path, query, fragment) in cases {
            let url = Url::from_target(target).unwrap();
            assert_eq!(url.scheme(), scheme, "{target}");
            assert_eq!(url.host(), host, "{target}");
            assert_eq!(url.port(), port, "{target}");
            assert_eq!(url.raw_path(), path, "{target}");
            assert_eq!(url.query(), query, "{target}");
            assert_eq!(url.fragment(), fragment, "{target}");
        }

        assert_eq!(Url::from_target(""), None);
    }

    #[test]
    fn authority_form() {
        let url = Url::from_target("example.com:443").unwrap();
        assert_eq!((url.host(), url.port()), ("example.com", Some(443)));
    }

    #[test]
    fn authorities() {
        #[rustfmt::skip]
        let cases = [
            ("h", "h", None),
            ("h:8080", "h", Some(8080)),
            ("[::1]:9000", "::1", Some(9000)),
            ("[::1]", "::1", None),
            ("user@h:1", "h", Some(1)),
            ("h:notaport", "h", None),
        ];

        for (authority, host, port) in cases {
            let mut url = Url::default();
            url.set_authority(authority);
            assert_eq!((url.host(), url.port()), (host, port), "{authority}");
        }
    }

    #[test]
    fn defaults() {
        let mut url = Url::from_target("/").unwrap();
        url.apply_defaults(false, Some(8080));
        assert_eq!((url.scheme(), url.host(), url.port()), ("http", "127.0.0.1", Some(8080)));

        let mut url = Url::from_target("/").unwrap();
        url.set_authority("h:1");
        url.apply_defaults(true, Some(8080));
        assert_eq!((url.scheme(), url.host(), url.port()), ("https", "h", Some(1)));
    }

    #[test]
    fn decoding() {
        let url = Url::from_target("/files/a%20b%2Fc?debug&name=j%C3%B6rg&&q=a+b&bad=%zz").unwrap();
        assert_eq!(url.path(), "/files/a b/c");
        assert_eq!(
            url.query_pairs(),
            [
                ("debug".to_owned(), "".to_owned()),
                ("name".to_owned(), "jörg".to_owned()),
                ("q".to_owned(), "a b".to_owned()),
                ("bad".to_owned(), "%zz".to_owned()),
            ]
        );
        assert_eq!(url.query_value("q").as_deref(), Some("a b"));
        assert_eq!(url.query_value("missing"), None);
        assert_eq!(percent_decode("100%", false), "100%");
        assert_eq!(percent_decode("a+b", false), "a+b");
    }
}
