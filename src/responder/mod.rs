//! Per-request output state machine.
//!
//! A [`Responder`] writes exactly one response, either in one terminal call
//! ([`write`](Responder::write), [`write_stream`](Responder::write_stream),
//! [`write_status_only`](Responder::write_status_only)) or in steps:
//!
//! ```text
//!              write_status               write_data*          finish
//!   Ready ───────────────────▶ HeadersSent ───────────▶ ─────────────▶ Finished
//!     │
//!     │ write_chunked_begin                write_chunk*  write_chunked_end
//!     └──────────────────────▶ ChunkedTransferBegun ────▶ ─────────────▶ Finished
//! ```
//!
//! The same API targets an HTTP/1.1 connection slot or an HTTP/2 stream.

pub(crate) mod device;

use crate::{
    errors::ResponderError,
    http::{
        response::{Response, EMPTY_MIME},
        types::{Headers, StatusCode, Version},
    },
    limits::RespLimits,
    server::{http2::StreamQueue, pipeline::Pipeline},
};
use device::Device;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Where a responder's bytes go.
pub(crate) enum Target {
    Http1(Http1Slot),
    Http2(Arc<StreamQueue>),
}

/// A reserved response slot on an HTTP/1.1 connection.
pub(crate) struct Http1Slot {
    pub(crate) pipeline: Arc<Pipeline>,
    pub(crate) id: u64,
    /// Request version; HTTP/1.0 peers get no chunked framing.
    pub(crate) version: Version,
    /// Response to `HEAD`: headers only.
    pub(crate) head_only: bool,
    /// The connection ends after this response.
    pub(crate) close: bool,
}

/// How the body following the header block is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(u64),
    Chunked,
    /// HTTP/1.x without a length: the body ends with the connection.
    UntilClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    Ready,
    HeadersSent,
    ChunkedTransferBegun,
    Finished,
}

/// Writes the response to one request.
///
/// Handlers given a `Responder` drive it directly; value-returning handlers
/// have theirs driven by the [`Service`](crate::Service). Misuse returns a
/// [`ResponderError`] and is logged; nothing panics.
///
/// Dropping a responder that never wrote anything sends `500 Internal Server
/// Error`. Dropping one in the middle of a body closes the connection (or
/// resets the HTTP/2 stream) since the framing cannot be completed.
///
/// Once the peer disconnects, every write returns
/// [`ResponderError::Closed`] and is discarded.
///
/// # Examples
/// ```no_run
/// use duet_http::{Headers, Responder, StatusCode};
///
/// async fn numbers(mut responder: Responder) {
///     let headers = Headers::from([("Content-Type", "text/plain")]);
///     responder.write_chunked_begin(&headers, StatusCode::OK).await.ok();
///     for n in 1..=3 {
///         responder.write_chunk(format!("{n}\n").as_bytes()).await.ok();
///     }
///     let trailers = Headers::from([("X-Count", "3")]);
///     responder.write_chunked_end(b"done\n", &trailers).await.ok();
/// }
/// ```
pub struct Responder {
    target: Target,
    state: ResponderState,
    framing: Framing,
    /// Body bytes still owed under `Framing::Length`.
    remaining: u64,
    /// Set once the connection cannot be reused after this response.
    close: bool,
    high_water: usize,
}

impl Responder {
    pub(crate) fn new(target: Target, limits: &RespLimits) -> Self {
        Self {
            target,
            state: ResponderState::Ready,
            framing: Framing::UntilClose,
            remaining: 0,
            close: false,
            high_water: limits.high_water(),
        }
    }

    #[inline(always)]
    pub fn state(&self) -> ResponderState {
        self.state
    }

    /// `true` once the peer is gone; writes are discarded.
    pub fn is_closed(&self) -> bool {
        match &self.target {
            Target::Http1(slot) => slot.pipeline.is_closed(),
            Target::Http2(queue) => queue.is_closed(),
        }
    }

    /// Writes the status line and header block.
    ///
    /// A `Content-Length` among `headers` fixes the body size; write exactly
    /// that many bytes with [`write_data`](Self::write_data). Without one the
    /// HTTP/1.1 body runs until the connection closes. Either way, call
    /// [`finish`](Self::finish) or drop the responder when done.
    pub async fn write_status(&mut self, status: StatusCode, headers: &Headers) -> Result<(), ResponderError> {
        self.expect_state(ResponderState::Ready)?;

        let framing = match headers.get("content-length").and_then(|v| v.trim().parse().ok()) {
            Some(len) => Framing::Length(len),
            None => Framing::UntilClose,
        };
        self.send_head(status, headers.clone(), framing)?;
        self.state = ResponderState::HeadersSent;
        Ok(())
    }

    /// Writes body bytes after [`write_status`](Self::write_status).
    ///
    /// Bytes beyond the declared `Content-Length` are dropped with a warning.
    pub async fn write_data(&mut self, data: &[u8]) -> Result<(), ResponderError> {
        self.expect_state(ResponderState::HeadersSent)?;

        let data = match self.framing {
            Framing::Length(_) if data.len() as u64 > self.remaining => {
                warn!(extra = data.len() as u64 - self.remaining, "body longer than Content-Length, truncated");
                &data[..self.remaining as usize]
            }
            _ => data,
        };
        self.remaining = self.remaining.saturating_sub(data.len() as u64);
        self.send_body(data)?;
        self.drain().await
    }

    /// Completes a response started with [`write_status`](Self::write_status)
    /// or [`write_chunked_begin`](Self::write_chunked_begin).
    pub async fn finish(&mut self) -> Result<(), ResponderError> {
        if self.is_closed() {
            return Err(self.zombie());
        }

        match self.state {
            ResponderState::Ready => Err(self.misuse(ResponderError::HeadersNotSent)),
            ResponderState::HeadersSent => {
                if self.remaining > 0 {
                    warn!(missing = self.remaining, "body shorter than Content-Length");
                    self.close = true;
                }
                self.end(None);
                Ok(())
            }
            ResponderState::ChunkedTransferBegun => self.write_chunked_end(&[], &Headers::new()).await,
            ResponderState::Finished => Err(self.misuse(ResponderError::AlreadyResponded)),
        }
    }

    /// Writes a complete response with `Content-Length` set to `body.len()`.
    ///
    /// Any `Content-Length` in `headers` is replaced.
    pub async fn write(&mut self, body: &[u8], headers: &Headers, status: StatusCode) -> Result<(), ResponderError> {
        self.expect_state(ResponderState::Ready)?;

        let mut headers = headers.clone();
        headers.replace_or_append("Content-Length", body.len().to_string());
        self.send_head(status, headers, Framing::Length(body.len() as u64))?;

        let mut sent = 0;
        while sent < body.len() {
            let end = body.len().min(sent + self.high_water);
            self.send_body(&body[sent..end])?;
            self.drain().await?;
            sent = end;
        }
        self.remaining = 0;
        self.end(None);
        Ok(())
    }

    /// Writes a [`Response`] value.
    pub async fn write_response(&mut self, response: Response) -> Result<(), ResponderError> {
        self.write(&response.body, &response.headers, response.status).await
    }

    /// Writes a status with an empty `application/x-empty` body.
    pub async fn write_status_only(&mut self, status: StatusCode) -> Result<(), ResponderError> {
        let headers = Headers::from([("Content-Type", EMPTY_MIME)]);
        self.write(&[], &headers, status).await
    }

    /// Streams `device` as the body.
    ///
    /// A device of known [`size`](Device::size) is sent with
    /// `Content-Length`; otherwise chunked on HTTP/1.1, close-delimited on
    /// HTTP/1.0. Reading pauses while more than half of
    /// [`RespLimits::stream_buffer_size`] waits to be written.
    ///
    /// A device that cannot be opened or read yields `500` with no body.
    pub async fn write_stream<D: Device>(&mut self, mut device: D, headers: &Headers, status: StatusCode) -> Result<(), ResponderError> {
        self.expect_state(ResponderState::Ready)?;

        if !device.is_open() {
            if let Err(err) = device.open().await {
                warn!(%err, "stream device could not be opened");
                return self.write_status_only(StatusCode::INTERNAL_SERVER_ERROR).await;
            }
        }
        if !device.is_readable() {
            warn!("stream device is not readable");
            return self.write_status_only(StatusCode::INTERNAL_SERVER_ERROR).await;
        }

        let mut headers = headers.clone();
        let framing = match device.size() {
            Some(size) => {
                headers.replace_or_append("Content-Length", size.to_string());
                Framing::Length(size)
            }
            None => {
                headers.remove("content-length");
                self.unsized_framing(&mut headers)
            }
        };
        self.send_head(status, headers, framing)?;
        self.state = match framing {
            Framing::Chunked => ResponderState::ChunkedTransferBegun,
            _ => ResponderState::HeadersSent,
        };

        let mut buffer = vec![0; self.high_water];
        loop {
            let mut read = match device.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) => {
                    warn!(%err, "stream device failed mid-body");
                    self.abort();
                    return Ok(());
                }
            };

            match framing {
                Framing::Chunked => self.send_chunk(&buffer[..read])?,
                _ => {
                    if let Framing::Length(_) = framing {
                        read = read.min(self.remaining as usize);
                    }
                    self.remaining = self.remaining.saturating_sub(read as u64);
                    self.send_body(&buffer[..read])?;
                }
            }
            self.drain().await?;

            if matches!(framing, Framing::Length(_)) && self.remaining == 0 {
                break;
            }
        }

        match framing {
            Framing::Chunked => self.write_chunked_end(&[], &Headers::new()).await,
            _ => {
                if self.remaining > 0 {
                    warn!(missing = self.remaining, "stream device shorter than its size");
                    self.abort();
                    return Ok(());
                }
                self.end(None);
                Ok(())
            }
        }
    }

    /// Starts a chunked body.
    ///
    /// On HTTP/2 the chunks become DATA frames; an HTTP/1.0 peer gets a
    /// close-delimited body.
    pub async fn write_chunked_begin(&mut self, headers: &Headers, status: StatusCode) -> Result<(), ResponderError> {
        self.expect_state(ResponderState::Ready)?;

        let mut headers = headers.clone();
        headers.remove("content-length");
        let framing = self.unsized_framing(&mut headers);
        self.send_head(status, headers, framing)?;
        self.state = ResponderState::ChunkedTransferBegun;
        Ok(())
    }

    /// Sends one chunk. An empty chunk would end the body and is refused.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), ResponderError> {
        self.expect_chunked()?;
        if data.is_empty() {
            return Err(self.misuse(ResponderError::EmptyChunk));
        }

        self.send_chunk(data)?;
        self.drain().await
    }

    /// Sends `data` as the last chunk (if non-empty), the terminating
    /// zero-length chunk and `trailers`.
    pub async fn write_chunked_end(&mut self, data: &[u8], trailers: &Headers) -> Result<(), ResponderError> {
        self.expect_chunked()?;

        if !data.is_empty() {
            self.send_chunk(data)?;
        }
        self.end(Some(trailers));
        Ok(())
    }
}

// Internals
impl Responder {
    fn expect_state(&mut self, state: ResponderState) -> Result<(), ResponderError> {
        if self.is_closed() {
            return Err(self.zombie());
        }

        match (self.state, state) {
            (current, expected) if current == expected => Ok(()),
            (ResponderState::Finished, _) => Err(self.misuse(ResponderError::AlreadyResponded)),
            (ResponderState::Ready, _) => Err(self.misuse(ResponderError::HeadersNotSent)),
            (ResponderState::ChunkedTransferBegun, ResponderState::HeadersSent) => Err(self.misuse(ResponderError::NotChunked)),
            (_, _) => Err(self.misuse(ResponderError::HeadersAlreadySent)),
        }
    }

    fn expect_chunked(&mut self) -> Result<(), ResponderError> {
        match self.state {
            ResponderState::ChunkedTransferBegun => self.expect_state(ResponderState::ChunkedTransferBegun),
            ResponderState::Finished => Err(self.misuse(ResponderError::AlreadyResponded)),
            _ => Err(self.misuse(ResponderError::NotChunked)),
        }
    }

    fn misuse(&self, err: ResponderError) -> ResponderError {
        warn!(%err, state = ?self.state, "responder misuse");
        err
    }

    fn zombie(&mut self) -> ResponderError {
        debug!("write after disconnect discarded");
        self.state = ResponderState::Finished;
        ResponderError::Closed
    }

    fn unsized_framing(&self, headers: &mut Headers) -> Framing {
        match &self.target {
            Target::Http1(slot) if slot.version == Version::HTTP_10 => Framing::UntilClose,
            Target::Http1(_) => {
                headers.replace_or_append("Transfer-Encoding", "chunked");
                Framing::Chunked
            }
            Target::Http2(_) => Framing::Chunked,
        }
    }

    fn send_head(&mut self, status: StatusCode, mut headers: Headers, framing: Framing) -> Result<(), ResponderError> {
        self.framing = framing;
        self.remaining = match framing {
            Framing::Length(len) => len,
            _ => 0,
        };

        let sent = match &self.target {
            Target::Http1(slot) => {
                if framing == Framing::UntilClose {
                    self.close = true;
                }
                if self.close || slot.close {
                    headers.replace_or_append("Connection", "close");
                } else if slot.version == Version::HTTP_10 {
                    headers.replace_or_append("Connection", "keep-alive");
                }

                let mut head = Vec::with_capacity(128);
                status.write_status_line(&mut head);
                headers.write_to(&mut head);
                head.extend_from_slice(b"\r\n");
                slot.pipeline.write(slot.id, &head)
            }
            Target::Http2(queue) => queue.send_head(status, headers),
        };

        match sent {
            true => Ok(()),
            false => Err(self.zombie()),
        }
    }

    fn send_body(&mut self, data: &[u8]) -> Result<(), ResponderError> {
        let sent = match &self.target {
            Target::Http1(slot) if slot.head_only => !slot.pipeline.is_closed(),
            Target::Http1(slot) => slot.pipeline.write(slot.id, data),
            Target::Http2(queue) => queue.push(data),
        };

        match sent {
            true => Ok(()),
            false => Err(self.zombie()),
        }
    }

    fn send_chunk(&mut self, data: &[u8]) -> Result<(), ResponderError> {
        match (&self.target, self.framing) {
            (Target::Http1(_), Framing::Chunked) => {
                let mut framed = Vec::with_capacity(data.len() + 12);
                framed.extend_from_slice(format!("{:X}\r\n", data.len()).as_bytes());
                framed.extend_from_slice(data);
                framed.extend_from_slice(b"\r\n");
                self.send_body(&framed)
            }
            _ => self.send_body(data),
        }
    }

    /// Back-pressure: waits while too much of this response is unflushed.
    async fn drain(&mut self) -> Result<(), ResponderError> {
        let open = match &self.target {
            Target::Http1(slot) => match slot.pipeline.outstanding(slot.id) > self.high_water {
                true => slot.pipeline.wait_below(slot.id, self.high_water).await,
                false => true,
            },
            Target::Http2(queue) => match queue.outstanding() > self.high_water {
                true => queue.wait_below(self.high_water).await,
                false => true,
            },
        };

        match open {
            true => Ok(()),
            false => Err(self.zombie()),
        }
    }

    /// Terminates the body and releases the slot or stream.
    fn end(&mut self, trailers: Option<&Headers>) {
        match &self.target {
            Target::Http1(slot) => {
                if self.framing == Framing::Chunked && !slot.head_only {
                    let mut last = b"0\r\n".to_vec();
                    if let Some(trailers) = trailers {
                        trailers.write_to(&mut last);
                    }
                    last.extend_from_slice(b"\r\n");
                    slot.pipeline.write(slot.id, &last);
                }
                slot.pipeline.finish(slot.id, self.close || slot.close);
            }
            Target::Http2(queue) => match self.remaining {
                0 => queue.finish(trailers.filter(|t| !t.is_empty()).cloned()),
                _ => queue.abort(),
            },
        }
        self.state = ResponderState::Finished;
    }

    /// Gives up on a started body: the connection closes, the stream resets.
    fn abort(&mut self) {
        self.close = true;
        match &self.target {
            Target::Http1(slot) => slot.pipeline.finish(slot.id, true),
            Target::Http2(queue) => queue.abort(),
        }
        self.state = ResponderState::Finished;
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        match self.state {
            ResponderState::Finished => {}
            _ if self.is_closed() => {}
            ResponderState::Ready => {
                warn!("responder dropped without a response, sending 500");
                let headers = Headers::from([("Content-Type", EMPTY_MIME), ("Content-Length", "0")]);
                if self.send_head(StatusCode::INTERNAL_SERVER_ERROR, headers, Framing::Length(0)).is_ok() {
                    self.end(None);
                }
            }
            ResponderState::HeadersSent | ResponderState::ChunkedTransferBegun => {
                warn!(state = ?self.state, "responder dropped mid-body, closing");
                self.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device::ReaderDevice;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::{io::AsyncRead, time::sleep};

    fn http1(version: Version, head_only: bool) -> (Arc<Pipeline>, Responder) {
        let pipeline = Arc::new(Pipeline::new());
        let id = pipeline.reserve();
        let slot = Http1Slot {
            pipeline: pipeline.clone(),
            id,
            version,
            head_only,
            close: false,
        };
        (pipeline, Responder::new(Target::Http1(slot), &RespLimits::default()))
    }

    fn text(pipeline: &Pipeline) -> (String, bool) {
        let output = pipeline.take_output();
        (String::from_utf8(output.bytes).unwrap(), output.close)
    }

    #[tokio::test]
    async fn plain_write() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, false);
        let headers = Headers::from([("Content-Type", "text/plain"), ("Content-Length", "999")]);
        responder.write(b"hello", &headers, StatusCode::OK).await.unwrap();
        assert_eq!(responder.state(), ResponderState::Finished);

        assert_eq!(
            text(&pipeline),
            ("HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello".to_owned(), false)
        );
    }

    #[tokio::test]
    async fn status_only() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, false);
        responder.write_status_only(StatusCode::NO_CONTENT).await.unwrap();
        assert_eq!(
            text(&pipeline).0,
            "HTTP/1.1 204 No Content\r\nContent-Type: application/x-empty\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn chunked() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, false);
        responder.write_chunked_begin(&Headers::new(), StatusCode::OK).await.unwrap();
        responder.write_chunk(b"abc").await.unwrap();
        assert_eq!(responder.write_chunk(b"").await, Err(ResponderError::EmptyChunk));
        responder.write_chunk(&[b'x'; 16]).await.unwrap();
        responder
            .write_chunked_end(b"end", &Headers::from([("X-Sum", "22")]))
            .await
            .unwrap();

        assert_eq!(
            text(&pipeline).0,
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
             3\r\nabc\r\n10\r\nxxxxxxxxxxxxxxxx\r\n3\r\nend\r\n0\r\nX-Sum: 22\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn state_errors() {
        let (_pipeline, mut responder) = http1(Version::HTTP_11, false);

        #[rustfmt::skip]
        let before: [(ResponderError, Result<(), ResponderError>); 3] = [
            (ResponderError::HeadersNotSent, responder.write_data(b"x").await),
            (ResponderError::NotChunked, responder.write_chunk(b"x").await),
            (ResponderError::HeadersNotSent, responder.finish().await),
        ];
        for (expected, got) in before {
            assert_eq!(got, Err(expected));
        }

        responder.write_status(StatusCode::OK, &Headers::from([("Content-Length", "2")])).await.unwrap();
        assert_eq!(
            responder.write_status(StatusCode::OK, &Headers::new()).await,
            Err(ResponderError::HeadersAlreadySent)
        );
        assert_eq!(responder.write_chunked_end(b"", &Headers::new()).await, Err(ResponderError::NotChunked));
        responder.write_data(b"ok").await.unwrap();
        responder.finish().await.unwrap();

        assert_eq!(
            responder.write(b"", &Headers::new(), StatusCode::OK).await,
            Err(ResponderError::AlreadyResponded)
        );
    }

    #[tokio::test]
    async fn status_then_data() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, false);
        responder.write_status(StatusCode::OK, &Headers::from([("Content-Length", "4")])).await.unwrap();
        responder.write_data(b"ab").await.unwrap();
        responder.write_data(b"cdEXTRA").await.unwrap();
        responder.finish().await.unwrap();

        assert_eq!(
            text(&pipeline),
            ("HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nabcd".to_owned(), false)
        );
    }

    #[tokio::test]
    async fn head_request_keeps_length() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, true);
        responder.write(b"hidden", &Headers::new(), StatusCode::OK).await.unwrap();
        assert_eq!(text(&pipeline).0, "HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\n");
    }

    #[tokio::test]
    async fn http10_peers() {
        let (pipeline, mut responder) = http1(Version::HTTP_10, false);
        responder.write(b"", &Headers::new(), StatusCode::OK).await.unwrap();
        assert_eq!(
            text(&pipeline),
            ("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: keep-alive\r\n\r\n".to_owned(), false)
        );

        let (pipeline, mut responder) = http1(Version::HTTP_10, false);
        responder.write_chunked_begin(&Headers::new(), StatusCode::OK).await.unwrap();
        responder.write_chunk(b"raw").await.unwrap();
        responder.write_chunked_end(b"", &Headers::new()).await.unwrap();
        assert_eq!(
            text(&pipeline),
            ("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nraw".to_owned(), true)
        );
    }

    #[tokio::test]
    async fn stream_known_size() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, false);
        let body: &'static [u8] = b"streamed body";
        responder.write_stream(body, &Headers::new(), StatusCode::OK).await.unwrap();
        assert_eq!(
            text(&pipeline).0,
            "HTTP/1.1 200 OK\r\nContent-Length: 13\r\n\r\nstreamed body"
        );
    }

    #[tokio::test]
    async fn stream_unknown_size() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, false);
        let device = device::ReaderDevice::new(&b"abcdef"[..]);
        responder.write_stream(device, &Headers::new(), StatusCode::OK).await.unwrap();
        assert_eq!(
            text(&pipeline).0,
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n6\r\nabcdef\r\n0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn stream_device_failure() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, false);
        let device = device::FileDevice::new("/definitely/not/here");
        responder.write_stream(device, &Headers::new(), StatusCode::OK).await.unwrap();
        assert_eq!(
            text(&pipeline).0,
            "HTTP/1.1 500 Internal Server Error\r\nContent-Type: application/x-empty\r\nContent-Length: 0\r\n\r\n"
        );
    }

    /// Counts `poll_read` calls made by the responder.
    struct CountingReader {
        inner: std::io::Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            std::pin::Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    #[tokio::test]
    async fn stream_back_pressure() {
        let pipeline = Arc::new(Pipeline::new());
        let id = pipeline.reserve();
        let slot = Http1Slot {
            pipeline: pipeline.clone(),
            id,
            version: Version::HTTP_11,
            head_only: false,
            close: false,
        };
        let limits = RespLimits {
            stream_buffer_size: 8,
            ..RespLimits::default()
        };
        let high_water = limits.high_water();
        let mut responder = Responder::new(Target::Http1(slot), &limits);

        let body: Vec<u8> = (0..256u32).map(|i| b'a' + (i % 26) as u8).collect();
        let reads = Arc::new(AtomicUsize::new(0));
        let device = ReaderDevice::with_size(
            CountingReader {
                inner: std::io::Cursor::new(body.clone()),
                reads: reads.clone(),
            },
            body.len() as u64,
        );
        let task = tokio::spawn(async move { responder.write_stream(device, &Headers::new(), StatusCode::OK).await });

        let mut received = Vec::new();
        let mut rounds = 0;
        loop {
            sleep(Duration::from_millis(5)).await;
            if task.is_finished() {
                received.extend(pipeline.take_output().bytes);
                break;
            }

            // Nothing is taken, so the producer stays parked.
            let parked = reads.load(Ordering::SeqCst);
            sleep(Duration::from_millis(5)).await;
            assert_eq!(reads.load(Ordering::SeqCst), parked);
            if rounds > 0 {
                assert!(pipeline.outstanding(id) <= high_water * 2, "{}", pipeline.outstanding(id));
            }

            received.extend(pipeline.take_output().bytes);
            pipeline.written();
            rounds += 1;
        }
        task.await.unwrap().unwrap();

        assert!(rounds >= body.len() / (high_water * 2), "{rounds}");
        let text = String::from_utf8(received).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
        assert!(text.ends_with(std::str::from_utf8(&body).unwrap()), "{text}");
    }

    #[tokio::test]
    async fn dropped_without_response() {
        let (pipeline, responder) = http1(Version::HTTP_11, false);
        drop(responder);
        assert_eq!(
            text(&pipeline).0,
            "HTTP/1.1 500 Internal Server Error\r\nContent-Type: application/x-empty\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn dropped_mid_body() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, false);
        responder.write_chunked_begin(&Headers::new(), StatusCode::OK).await.unwrap();
        responder.write_chunk(b"part").await.unwrap();
        drop(responder);

        let (text, close) = text(&pipeline);
        assert!(text.ends_with("4\r\npart\r\n"), "{text}");
        assert!(close);
    }

    #[tokio::test]
    async fn zombie() {
        let (pipeline, mut responder) = http1(Version::HTTP_11, false);
        pipeline.close();

        assert!(responder.is_closed());
        assert_eq!(responder.write(b"x", &Headers::new(), StatusCode::OK).await, Err(ResponderError::Closed));
        assert_eq!(responder.state(), ResponderState::Finished);
        drop(responder);
        assert!(pipeline.take_output().bytes.is_empty());
    }
}
