//! Incremental HTTP/1.1 request parser.
//!
//! [`RequestParser::feed`] takes whatever bytes the transport has, consumes
//! as many as belong to the current request and reports how many it used.
//! It never blocks and keeps partial lines between calls, so one byte per
//! call and a whole pipeline per call produce the same requests.

use crate::{
    errors::ErrorKind,
    http::{
        request::{ConnInfo, Request},
        types::{hex_to_u64, slice_to_u64, Headers, Method, Version},
        url::Url,
    },
    limits::ReqLimits,
};
use memchr::memchr;
use std::mem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParserState {
    NothingDone,
    ReadingRequestLine,
    ReadingHeader,
    ReadingData,
    AllDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    Fixed { remaining: u64 },
    ChunkSize,
    ChunkData { remaining: u64 },
    ChunkEnd,
    Trailer,
}

pub(crate) struct RequestParser {
    state: ParserState,
    body: Body,
    fragment: Vec<u8>,
    head: Vec<u8>,
    request: Request,
    fields: usize,

    limits: ReqLimits,
    conn: ConnInfo,
}

impl RequestParser {
    pub(crate) fn new(limits: ReqLimits, conn: ConnInfo) -> Self {
        Self {
            state: ParserState::NothingDone,
            body: Body::Fixed { remaining: 0 },
            fragment: Vec::new(),
            head: Vec::new(),
            request: Request::default(),
            fields: 0,

            limits,
            conn,
        }
    }

    #[inline(always)]
    pub(crate) fn state(&self) -> ParserState {
        self.state
    }

    /// `true` while part of a request has been consumed.
    #[inline(always)]
    pub(crate) fn is_mid_request(&self) -> bool {
        !matches!(self.state, ParserState::NothingDone | ParserState::AllDone)
    }

    /// Moves the finished request out and rearms the parser.
    pub(crate) fn take_request(&mut self) -> Option<Request> {
        if self.state != ParserState::AllDone {
            return None;
        }

        let request = mem::take(&mut self.request);
        self.reset();
        Some(request)
    }

    /// Bytes of the request line and header block of the last request.
    ///
    /// Valid until the next [`feed`](Self::feed); upgrade consumers replay them.
    #[inline(always)]
    pub(crate) fn head_bytes(&self) -> &[u8] {
        &self.head
    }

    fn reset(&mut self) {
        self.state = ParserState::NothingDone;
        self.body = Body::Fixed { remaining: 0 };
        self.fragment.clear();
        self.request = Request::default();
        self.fields = 0;
    }

    /// Consumes bytes of the current request from `data`.
    ///
    /// Stops at the end of a request, leaving any pipelined bytes that
    /// follow it unconsumed. Returns how many bytes were used.
    pub(crate) fn feed(&mut self, data: &[u8]) -> Result<usize, ErrorKind> {
        if self.state == ParserState::AllDone {
            self.reset();
        }

        let mut consumed = 0;
        while consumed < data.len() && self.state != ParserState::AllDone {
            let before = self.state;
            let rest = &data[consumed..];
            let used = match self.state {
                ParserState::NothingDone => self.skip_blank(rest)?,
                ParserState::ReadingRequestLine => {
                    let (used, line) = self.read_line(rest, self.limits.request_line_size, ErrorKind::RequestLineTooLong)?;
                    self.head.extend_from_slice(&rest[..used]);
                    if let Some(line) = line {
                        self.parse_request_line(&line)?;
                        self.recycle(line);
                        self.state = ParserState::ReadingHeader;
                    }
                    used
                }
                ParserState::ReadingHeader => {
                    let (used, line) = self.read_line(rest, self.limits.header_line_size, ErrorKind::HeaderTooLarge)?;
                    self.head.extend_from_slice(&rest[..used]);
                    if let Some(line) = line {
                        match line.is_empty() {
                            true => self.finish_headers()?,
                            false => self.parse_field(&line, false)?,
                        }
                        self.recycle(line);
                    }
                    used
                }
                ParserState::ReadingData => self.read_body(rest)?,
                ParserState::AllDone => 0,
            };
            if used == 0 && self.state == before {
                break;
            }
            consumed += used;
        }

        Ok(consumed)
    }

    fn skip_blank(&mut self, rest: &[u8]) -> Result<usize, ErrorKind> {
        let skipped = match self.limits.strict_line_endings {
            false => rest
                .iter()
                .take_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0x0b))
                .count(),
            true => {
                let pairs = rest.chunks_exact(2).take_while(|p| p == b"\r\n").count() * 2;
                match rest.get(pairs) {
                    // Half of a CRLF pair: wait for the rest.
                    Some(b'\r') if pairs + 1 == rest.len() => return Ok(pairs),
                    _ => pairs,
                }
            }
        };

        if skipped < rest.len() {
            self.state = ParserState::ReadingRequestLine;
            self.head.clear();
        }
        Ok(skipped)
    }

    /// Accumulates into `fragment` up to the next line feed.
    ///
    /// Returns the bytes used and, once the terminator arrived, the line
    /// without its `\r\n` or `\n`.
    fn read_line(&mut self, rest: &[u8], max: usize, too_long: ErrorKind) -> Result<(usize, Option<Vec<u8>>), ErrorKind> {
        let Some(pos) = memchr(b'\n', rest) else {
            self.fragment.extend_from_slice(rest);
            if self.fragment.len() > max + 1 {
                return Err(too_long);
            }
            return Ok((rest.len(), None));
        };

        self.fragment.extend_from_slice(&rest[..pos]);
        let mut line = mem::take(&mut self.fragment);
        match line.last() {
            Some(b'\r') => {
                line.pop();
            }
            _ if self.limits.strict_line_endings => return Err(ErrorKind::BareLineFeed),
            _ => {}
        }

        if line.len() > max {
            return Err(too_long);
        }
        Ok((pos + 1, Some(line)))
    }

    #[inline(always)]
    fn recycle(&mut self, mut line: Vec<u8>) {
        line.clear();
        self.fragment = line;
    }

    fn parse_request_line(&mut self, line: &[u8]) -> Result<(), ErrorKind> {
        let line = simdutf8::basic::from_utf8(line).map_err(|_| ErrorKind::InvalidEncoding)?;
        let mut tokens = line.split(' ').filter(|t| !t.is_empty());

        let method = line.split(' ').next().filter(|m| !m.is_empty()).ok_or(ErrorKind::InvalidRequestLine)?;
        tokens.next();
        let target = tokens.next().ok_or(ErrorKind::InvalidRequestLine)?;
        let protocol = tokens.next().ok_or(ErrorKind::InvalidVersion)?;
        if tokens.next().is_some() {
            return Err(ErrorKind::InvalidVersion);
        }

        let version = Version::from_bytes(protocol.as_bytes()).ok_or(ErrorKind::InvalidVersion)?;

        self.request.method = Method::from_bytes(method.as_bytes());
        self.request.url = Url::from_target(target).ok_or(ErrorKind::InvalidRequestLine)?;
        self.request.version = version;
        self.request.keep_alive = version.major > 1 || (version.major == 1 && version.minor >= 1);
        Ok(())
    }

    /// Parses one `name: value` line into the headers or, after a chunked
    /// body, the trailers.
    fn parse_field(&mut self, line: &[u8], trailer: bool) -> Result<(), ErrorKind> {
        let line = simdutf8::basic::from_utf8(line).map_err(|_| ErrorKind::InvalidEncoding)?;
        let invalid = || match trailer {
            true => ErrorKind::InvalidChunk,
            false => ErrorKind::InvalidHeader,
        };
        let fields = match trailer {
            true => &mut self.request.trailers,
            false => &mut self.request.headers,
        };

        // obs-fold: continuation of the previous value
        if line.starts_with([' ', '\t']) {
            let (_, value) = fields.last_mut().ok_or_else(invalid)?;
            value.push(' ');
            value.push_str(line.trim_matches([' ', '\t']));
            return Ok(());
        }

        let (name, value) = line.split_once(':').ok_or_else(invalid)?;
        if name.is_empty() || name.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
            return Err(invalid());
        }

        self.fields += 1;
        if self.fields > self.limits.header_count {
            return Err(ErrorKind::TooManyHeaders);
        }

        fields.append(name, value.trim_matches([' ', '\t']));
        Ok(())
    }

    fn finish_headers(&mut self) -> Result<(), ErrorKind> {
        let request = &mut self.request;
        let headers = &request.headers;

        if request.url.host.is_empty() {
            if let Some(host) = headers.get("host").filter(|h| !h.is_empty()) {
                request.url.set_authority(host);
            }
        }

        request.content_length = content_length(headers)?;
        request.chunked = headers.contains_token("transfer-encoding", "chunked");
        request.upgrade = headers.contains_token("connection", "upgrade");
        if headers.contains_token("connection", "close") {
            request.keep_alive = false;
        } else if headers.contains_token("connection", "keep-alive") {
            request.keep_alive = true;
        }

        self.conn.apply(request);

        let declared = request.content_length.unwrap_or(0);
        self.state = match (request.chunked, declared) {
            (true, _) => {
                self.body = Body::ChunkSize;
                ParserState::ReadingData
            }
            (false, 0) => ParserState::AllDone,
            (false, len) if len > self.limits.body_size as u64 => return Err(ErrorKind::BodyTooLarge),
            (false, len) => {
                request.body.reserve(len as usize);
                self.body = Body::Fixed { remaining: len };
                ParserState::ReadingData
            }
        };
        Ok(())
    }

    fn read_body(&mut self, rest: &[u8]) -> Result<usize, ErrorKind> {
        match self.body {
            Body::Fixed { remaining } | Body::ChunkData { remaining } => {
                let take = rest.len().min(remaining as usize);
                self.request.body.extend_from_slice(&rest[..take]);

                let remaining = remaining - take as u64;
                self.body = match (self.body, remaining) {
                    (Body::Fixed { .. }, 0) => {
                        self.state = ParserState::AllDone;
                        Body::Fixed { remaining: 0 }
                    }
                    (Body::Fixed { .. }, _) => Body::Fixed { remaining },
                    (_, 0) => Body::ChunkEnd,
                    (_, _) => Body::ChunkData { remaining },
                };
                Ok(take)
            }
            Body::ChunkSize => {
                let (used, line) = self.read_line(rest, self.limits.header_line_size, ErrorKind::InvalidChunk)?;
                if let Some(line) = line {
                    let size = chunk_size(&line)?;
                    self.recycle(line);

                    self.body = match size {
                        0 => Body::Trailer,
                        size if self.request.body.len() as u64 + size > self.limits.body_size as u64 => {
                            return Err(ErrorKind::BodyTooLarge)
                        }
                        size => Body::ChunkData { remaining: size },
                    };
                }
                Ok(used)
            }
            Body::ChunkEnd => {
                let (used, line) = self.read_line(rest, 0, ErrorKind::InvalidChunk)?;
                if let Some(line) = line {
                    self.recycle(line);
                    self.body = Body::ChunkSize;
                }
                Ok(used)
            }
            Body::Trailer => {
                let (used, line) = self.read_line(rest, self.limits.header_line_size, ErrorKind::InvalidChunk)?;
                if let Some(line) = line {
                    match line.is_empty() {
                        true => self.state = ParserState::AllDone,
                        false => self.parse_field(&line, true)?,
                    }
                    self.recycle(line);
                }
                Ok(used)
            }
        }
    }
}

/// `None` when absent; differing duplicate values are an error.
fn content_length(headers: &Headers) -> Result<Option<u64>, ErrorKind> {
    let mut result = None;
    for value in headers.get_all("content-length") {
        let len = slice_to_u64(value.trim().as_bytes()).ok_or(ErrorKind::InvalidContentLength)?;
        match result {
            Some(previous) if previous != len => return Err(ErrorKind::InvalidContentLength),
            _ => result = Some(len),
        }
    }
    Ok(result)
}

/// Hex size of a chunk-size line, ignoring `;` extensions.
fn chunk_size(line: &[u8]) -> Result<u64, ErrorKind> {
    let size = match memchr(b';', line) {
        Some(pos) => &line[..pos],
        None => line,
    };
    let start = size.iter().position(|b| !matches!(b, b' ' | b'\t')).unwrap_or(size.len());
    let end = size.iter().rposition(|b| !matches!(b, b' ' | b'\t')).map_or(start, |p| p + 1);
    hex_to_u64(&size[start..end]).ok_or(ErrorKind::InvalidChunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> RequestParser {
        RequestParser::new(ReqLimits::default(), conn())
    }

    fn strict() -> RequestParser {
        RequestParser::new(
            ReqLimits {
                strict_line_endings: true,
                ..ReqLimits::default()
            },
            conn(),
        )
    }

    fn conn() -> ConnInfo {
        ConnInfo {
            local_addr: Some("127.0.0.1:8080".parse().unwrap()),
            remote_addr: Some("127.0.0.1:40000".parse().unwrap()),
            ..ConnInfo::default()
        }
    }

    fn parse_all(parser: &mut RequestParser, data: &[u8]) -> Result<Vec<Request>, ErrorKind> {
        let mut requests = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            offset += parser.feed(&data[offset..])?;
            if let Some(request) = parser.take_request() {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    fn parse_one(data: &[u8]) -> Request {
        let mut parser = parser();
        let mut requests = parse_all(&mut parser, data).unwrap();
        assert_eq!(requests.len(), 1, "{:?}", String::from_utf8_lossy(data));
        requests.remove(0)
    }

    fn summary(request: &Request) -> (Method, String, Vec<(String, String)>, Vec<u8>, Vec<(String, String)>) {
        let fields = |h: &Headers| h.iter().map(|(n, v)| (n.to_owned(), v.to_owned())).collect();
        (
            request.method(),
            request.url().raw_path().to_owned(),
            fields(request.headers()),
            request.body().to_vec(),
            fields(request.trailers()),
        )
    }

    #[test]
    fn simple_get() {
        let mut parser = parser();
        let data = b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n";

        let mut states = Vec::new();
        for byte in data.chunks(1) {
            assert_eq!(parser.feed(byte).unwrap(), 1);
            states.push(parser.state());
        }

        assert!(!states.contains(&ParserState::ReadingData));
        assert_eq!(states.last(), Some(&ParserState::AllDone));

        let request = parser.take_request().unwrap();
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.path(), "/x");
        assert_eq!(request.headers().iter().collect::<Vec<_>>(), [("Host", "h")]);
        assert_eq!(request.body(), b"");
        assert_eq!(request.url().host(), "h");
        assert_eq!(request.url().port(), Some(8080));
        assert_eq!(request.url().scheme(), "http");
        assert_eq!(request.content_length(), None);
        assert!(request.is_keep_alive());
        assert_eq!(parser.state(), ParserState::NothingDone);
    }

    #[test]
    fn fixed_body_split() {
        let mut parser = parser();
        let head = b"POST /p HTTP/1.1\r\nContent-Length: 5\r\n\r\n";

        assert_eq!(parser.feed(head).unwrap(), head.len());
        assert_eq!(parser.state(), ParserState::ReadingData);

        assert_eq!(parser.feed(b"he").unwrap(), 2);
        assert_eq!(parser.state(), ParserState::ReadingData);
        assert_eq!(parser.feed(b"ll").unwrap(), 2);
        assert_eq!(parser.state(), ParserState::ReadingData);
        assert_eq!(parser.feed(b"oGET").unwrap(), 1);
        assert_eq!(parser.state(), ParserState::AllDone);

        let request = parser.take_request().unwrap();
        assert_eq!(request.body(), b"hello");
        assert_eq!(request.content_length(), Some(5));
    }

    #[test]
    fn chunked_body() {
        let request = parse_one(b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n");
        assert_eq!(request.body(), b"abc");
        assert!(request.is_chunked());
        assert!(request.trailers().is_empty());
    }

    #[test]
    fn chunked_extensions_and_trailers() {
        let data = b"POST /c HTTP/1.1\r\n\
            Transfer-Encoding: gzip, chunked\r\n\r\n\
            4;name=value\r\nWiki\r\n\
            5 \r\npedia\r\n\
            E\r\n in\r\n\r\nchunks.\r\n\
            0;last\r\n\
            Checksum: abc\r\n\
            X-Done: yes\r\n\r\n";
        let request = parse_one(data);

        assert_eq!(request.body(), b"Wikipedia in\r\n\r\nchunks.");
        assert_eq!(
            request.trailers().iter().collect::<Vec<_>>(),
            [("Checksum", "abc"), ("X-Done", "yes")]
        );
    }

    #[test]
    fn chunked_wins_over_length() {
        let request = parse_one(b"POST / HTTP/1.1\r\nContent-Length: 100\r\nTransfer-Encoding: chunked\r\n\r\n1\r\nx\r\n0\r\n\r\n");
        assert_eq!(request.body(), b"x");
    }

    #[test]
    fn chunking_does_not_matter() {
        let inputs: [&[u8]; 4] = [
            b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n",
            b"PUT /a/b?c=d HTTP/1.1\r\nHost: h:1\r\nContent-Length: 11\r\nX-A: 1\r\nX-A: 2\r\n\r\nhello world",
            b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3;x=y\r\nabc\r\n10\r\n0123456789abcdef\r\n0\r\nT: v\r\n\r\n",
            b"\r\n\nDELETE /lf HTTP/1.0\nConnection: keep-alive\n\n",
        ];

        for input in inputs {
            let whole = summary(&parse_one(input));

            for size in 1..input.len() {
                let mut parser = parser();
                let mut requests = Vec::new();
                for piece in input.chunks(size) {
                    let mut offset = 0;
                    while offset < piece.len() {
                        offset += parser.feed(&piece[offset..]).unwrap();
                        requests.extend(parser.take_request());
                    }
                }
                assert_eq!(requests.len(), 1, "size {size}");
                assert_eq!(summary(&requests[0]), whole, "size {size}");
            }
        }
    }

    #[test]
    fn pipelined_requests() {
        let mut parser = parser();
        let data = b"GET /1 HTTP/1.1\r\n\r\nPOST /2 HTTP/1.1\r\nContent-Length: 2\r\n\r\nok\r\nGET /3 HTTP/1.1\r\nConnection: close\r\n\r\n";
        let requests = parse_all(&mut parser, data).unwrap();

        let paths: Vec<_> = requests.iter().map(|r| r.path()).collect();
        assert_eq!(paths, ["/1", "/2", "/3"]);
        assert_eq!(requests[1].body(), b"ok");
        assert!(requests[1].is_keep_alive());
        assert!(!requests[2].is_keep_alive());
    }

    #[test]
    fn stops_at_request_end() {
        let mut parser = parser();
        let data = b"GET /1 HTTP/1.1\r\n\r\nGET /2 HTTP/1.1\r\n\r\n";
        assert_eq!(parser.feed(data).unwrap(), 19);
        assert_eq!(parser.state(), ParserState::AllDone);
        assert_eq!(parser.head_bytes(), b"GET /1 HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn request_line_forms() {
        #[rustfmt::skip]
        let cases: [(&[u8], Method, &str, Version); 6] = [
            (b"GET / HTTP/1.1\r\n\r\n", Method::Get, "/", Version::HTTP_11),
            (b"OPTIONS * HTTP/1.1\r\n\r\n", Method::Options, "*", Version::HTTP_11),
            (b"BREW /pot HTTP/1.1\r\n\r\n", Method::Unknown, "/pot", Version::HTTP_11),
            (b"GET   /spaces   HTTP/1.0\r\n\r\n", Method::Get, "/spaces", Version::HTTP_10),
            (b"HEAD http://h.io/abs HTTP/1.1\r\n\r\n", Method::Head, "/abs", Version::HTTP_11),
            (b"CONNECT h.io:443 HTTP/1.1\r\n\r\n", Method::Connect, "", Version::HTTP_11),
        ];

        for (data, method, path, version) in cases {
            let request = parse_one(data);
            assert_eq!(request.method(), method, "{:?}", String::from_utf8_lossy(data));
            assert_eq!(request.url().raw_path(), path);
            assert_eq!(request.version(), version);
        }
    }

    #[test]
    fn absolute_form_keeps_its_host() {
        let request = parse_one(b"GET http://origin.io:81/p HTTP/1.1\r\nHost: other\r\n\r\n");
        assert_eq!(request.url().host(), "origin.io");
        assert_eq!(request.url().port(), Some(81));
    }

    #[test]
    fn http_10_closes_by_default() {
        assert!(!parse_one(b"GET / HTTP/1.0\r\n\r\n").is_keep_alive());
        assert!(parse_one(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n").is_keep_alive());
    }

    #[test]
    fn upgrade_detection() {
        let request = parse_one(b"GET /ws HTTP/1.1\r\nConnection: keep-alive, Upgrade\r\nUpgrade: websocket\r\n\r\n");
        assert!(request.is_upgrade());
        assert!(!parse_one(b"GET / HTTP/1.1\r\n\r\n").is_upgrade());
    }

    #[test]
    fn folded_header() {
        let request = parse_one(b"GET / HTTP/1.1\r\nX-Long: first\r\n  second\r\n\r\n");
        assert_eq!(request.header("x-long"), Some("first second"));
    }

    #[test]
    fn errors() {
        #[rustfmt::skip]
        let cases: [(&[u8], ErrorKind); 14] = [
            (b"GET\r\n", ErrorKind::InvalidRequestLine),
            (b"GET /\r\n", ErrorKind::InvalidVersion),
            (b"GET / HTTP/1.1 extra\r\n", ErrorKind::InvalidVersion),
            (b"GET / HTTX/1.1\r\n", ErrorKind::InvalidVersion),
            (b"GET / HTTP/1\r\n", ErrorKind::InvalidVersion),
            (b"GET / HTTP/1.1\r\nNoColon\r\n", ErrorKind::InvalidHeader),
            (b"GET / HTTP/1.1\r\nBad Name: x\r\n", ErrorKind::InvalidHeader),
            (b"GET / HTTP/1.1\r\n folded-first\r\n", ErrorKind::InvalidHeader),
            (b"GET / HTTP/1.1\r\nX: \xff\r\n", ErrorKind::InvalidEncoding),
            (b"GET / HTTP/1.1\r\nContent-Length: 1x\r\n\r\n", ErrorKind::InvalidContentLength),
            (b"GET / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\n", ErrorKind::InvalidContentLength),
            (b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n", ErrorKind::InvalidChunk),
            (b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n1\r\nab\r\n", ErrorKind::InvalidChunk),
            (b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\nbroken\r\n", ErrorKind::InvalidChunk),
        ];

        for (data, expected) in cases {
            let mut parser = parser();
            assert_eq!(parser.feed(data), Err(expected), "{:?}", String::from_utf8_lossy(data));
            assert!(parser.take_request().is_none());
        }
    }

    #[test]
    fn limits() {
        let limits = ReqLimits {
            request_line_size: 16,
            header_line_size: 32,
            header_count: 2,
            body_size: 4,
            ..ReqLimits::default()
        };

        #[rustfmt::skip]
        let cases: [(&[u8], ErrorKind); 5] = [
            (b"GET /aaaaaaaaaaaaaaaaaaaa", ErrorKind::RequestLineTooLong),
            (b"GET / HTTP/1.1\r\nX-Long: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n", ErrorKind::HeaderTooLarge),
            (b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n", ErrorKind::TooManyHeaders),
            (b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\n", ErrorKind::BodyTooLarge),
            (b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\n", ErrorKind::BodyTooLarge),
        ];

        for (data, expected) in cases {
            let mut parser = RequestParser::new(limits.clone(), conn());
            assert_eq!(parser.feed(data), Err(expected), "{:?}", String::from_utf8_lossy(data));
        }
    }

    #[test]
    fn lenient_line_endings() {
        let request = parse_one(b"\r\n \t\nGET /lf HTTP/1.1\nHost: h\r\n\n");
        assert_eq!(request.path(), "/lf");
        assert_eq!(request.header("host"), Some("h"));

        let request = parse_one(b"POST / HTTP/1.1\nTransfer-Encoding: chunked\n\n2\nhi\n0\n\n");
        assert_eq!(request.body(), b"hi");
    }

    #[test]
    fn strict_line_endings() {
        let mut parser = strict();
        let requests = parse_all(&mut parser, b"\r\n\r\nGET / HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        assert_eq!(requests.len(), 1);

        #[rustfmt::skip]
        let cases: [(&[u8], ErrorKind); 4] = [
            (b"GET / HTTP/1.1\n", ErrorKind::BareLineFeed),
            (b"GET / HTTP/1.1\r\nHost: h\n", ErrorKind::BareLineFeed),
            (b"\nGET / HTTP/1.1\r\n", ErrorKind::BareLineFeed),
            (b" GET / HTTP/1.1\r\n", ErrorKind::InvalidRequestLine),
        ];

        for (data, expected) in cases {
            let mut parser = strict();
            assert_eq!(parser.feed(data), Err(expected), "{:?}", String::from_utf8_lossy(data));
        }
    }

    #[test]
    fn strict_split_crlf() {
        let mut parser = strict();
        assert_eq!(parser.feed(b"\r").unwrap(), 0);
        assert_eq!(parser.feed(b"\r\nGET / HTTP/1.1\r\n\r\n").unwrap(), 20);
        assert!(parser.take_request().is_some());
    }
}
