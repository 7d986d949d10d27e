//! HTTP/2 over the `h2` codec.
//!
//! Every stream becomes one [`Request`] once the peer half-closes it, and its
//! handler runs in a task of its own. The [`Responder`] writes into a
//! [`StreamQueue`]; a writer task moves queued frames onto the stream as the
//! peer's flow-control window allows, in order, and sends end-of-stream only
//! after the last frame and any trailers.

use crate::{
    http::{
        request::{ConnInfo, Request},
        types::{Headers, Method, StatusCode},
    },
    responder::{Responder, Target},
    server::server_impl::{AllLimits, Handler},
};
use bytes::Bytes;
use h2::{
    server::{self, SendResponse},
    Reason, RecvStream, SendStream,
};
use http::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::Mutex;
use std::{collections::VecDeque, future::poll_fn, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::Notify,
};
use tracing::debug;

/// Client connection preface of prior-knowledge HTTP/2.
pub(crate) const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Fields that have no meaning on an HTTP/2 stream.
const CONNECTION_SPECIFIC: [&str; 6] = [
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-connection",
    "te",
];

pub(crate) async fn serve<T, H>(io: T, handler: Arc<H>, conn: ConnInfo, limits: Arc<AllLimits>) -> Result<(), h2::Error>
where
    T: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    let settings = &limits.4;
    let mut builder = server::Builder::new();
    builder
        .max_concurrent_streams(settings.max_concurrent_streams)
        .initial_window_size(settings.window_size())
        .max_frame_size(settings.frame_size());

    let mut connection = builder.handshake::<_, Bytes>(io).await?;
    let conn = Arc::new(conn);
    debug!(remote = ?conn.remote_addr, "http/2 connection established");

    while let Some(accepted) = connection.accept().await {
        let (request, respond) = accepted?;
        tokio::spawn(serve_stream(request, respond, handler.clone(), conn.clone(), limits.clone()));
    }
    Ok(())
}

async fn serve_stream<H: Handler>(
    request: http::Request<RecvStream>,
    mut respond: SendResponse<Bytes>,
    handler: Arc<H>,
    conn: Arc<ConnInfo>,
    limits: Arc<AllLimits>,
) {
    let stream_id = respond.stream_id().as_u32();
    let (parts, mut recv) = request.into_parts();

    let mut body = Vec::new();
    while let Some(chunk) = recv.data().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                debug!(stream_id, %err, "request body aborted");
                return;
            }
        };
        let _ = recv.flow_control().release_capacity(chunk.len());

        if body.len() + chunk.len() > limits.2.body_size {
            debug!(stream_id, "request body too large");
            let mut response = http::Response::new(());
            *response.status_mut() = http::StatusCode::PAYLOAD_TOO_LARGE;
            if respond.send_response(response, true).is_err() {
                respond.send_reset(Reason::CANCEL);
            }
            return;
        }
        body.extend_from_slice(&chunk);
    }

    let trailers = match recv.trailers().await {
        Ok(trailers) => trailers,
        Err(err) => {
            debug!(stream_id, %err, "request trailers aborted");
            return;
        }
    };

    let mut fields: Vec<(String, String)> = Vec::with_capacity(parts.headers.len() + 4);
    fields.push((":method".to_owned(), parts.method.as_str().to_owned()));
    if let Some(scheme) = parts.uri.scheme_str() {
        fields.push((":scheme".to_owned(), scheme.to_owned()));
    }
    if let Some(authority) = parts.uri.authority() {
        fields.push((":authority".to_owned(), authority.as_str().to_owned()));
    }
    let path = parts.uri.path_and_query().map_or("/", |p| p.as_str());
    fields.push((":path".to_owned(), path.to_owned()));
    fields.extend(field_list(&parts.headers));

    let mut request = Request::from_header_fields(fields.iter().map(|(n, v)| (n.as_str(), v.as_str())), body, &conn);
    if let Some(trailers) = trailers {
        request.trailers = field_list(&trailers).collect();
    }
    debug!(stream_id, method = %request.method(), path = %request.url().raw_path(), "stream request");

    let queue = Arc::new(StreamQueue::new(request.method() == Method::Head));
    tokio::spawn(write_stream(queue.clone(), respond));

    let responder = Responder::new(Target::Http2(queue), &limits.3);
    handler.handle(Arc::new(request), responder).await;
}

fn field_list(map: &HeaderMap) -> impl Iterator<Item = (String, String)> + '_ {
    map.iter()
        .map(|(name, value)| (name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
}

fn header_map(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if CONNECTION_SPECIFIC.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => debug!(name, "invalid header dropped from http/2 response"),
        }
    }
    map
}

fn response_head(status: StatusCode, headers: &Headers) -> http::Response<()> {
    let mut response = http::Response::new(());
    *response.status_mut() = http::StatusCode::from_u16(status.as_u16()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    *response.headers_mut() = header_map(headers);
    response
}

/// Outbound side of one stream, shared by its responder and writer task.
pub(crate) struct StreamQueue {
    state: Mutex<QueueState>,
    /// Wakes the writer.
    wake: Notify,
    /// Wakes producers waiting for queued bytes to be sent.
    drained: Notify,
    /// Response to `HEAD`: data is dropped.
    head_only: bool,
}

#[derive(Default)]
struct QueueState {
    head: Option<(StatusCode, Headers)>,
    frames: VecDeque<Bytes>,
    /// Bytes pushed and not yet handed to the codec.
    queued: usize,
    trailers: Option<Headers>,
    /// Nothing more will be pushed.
    done: bool,
    aborted: bool,
    /// The stream is gone; everything is discarded.
    closed: bool,
}

/// Next thing for the writer to do.
#[derive(Debug, PartialEq)]
enum Step {
    Head { status: StatusCode, headers: Headers, end: bool },
    Data { bytes: Bytes, end: bool },
    Trailers(Headers),
    End,
    Reset,
}

impl StreamQueue {
    pub(crate) fn new(head_only: bool) -> Self {
        Self {
            state: Mutex::default(),
            wake: Notify::new(),
            drained: Notify::new(),
            head_only,
        }
    }

    pub(crate) fn send_head(&self, status: StatusCode, headers: Headers) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.head = Some((status, headers));
        }
        self.wake.notify_one();
        true
    }

    pub(crate) fn push(&self, data: &[u8]) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            if self.head_only || data.is_empty() {
                return true;
            }
            state.frames.push_back(Bytes::copy_from_slice(data));
            state.queued += data.len();
        }
        self.wake.notify_one();
        true
    }

    /// Ends the stream after the queued frames, with optional trailers.
    pub(crate) fn finish(&self, trailers: Option<Headers>) {
        {
            let mut state = self.state.lock();
            state.done = true;
            state.trailers = trailers;
        }
        self.wake.notify_one();
    }

    /// Resets the stream instead of ending it.
    pub(crate) fn abort(&self) {
        self.state.lock().aborted = true;
        self.wake.notify_one();
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.state.lock().queued
    }

    /// Waits until at most `limit` bytes are queued; `false` once closed.
    pub(crate) async fn wait_below(&self, limit: usize) -> bool {
        loop {
            let drained = self.drained.notified();
            {
                let state = self.state.lock();
                if state.closed {
                    return false;
                }
                if state.queued <= limit {
                    return true;
                }
            }
            drained.await;
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Turns the responder into a zombie.
    pub(crate) fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.frames.clear();
            state.queued = 0;
        }
        self.drained.notify_waiters();
    }

    fn sent(&self, len: usize) {
        {
            let mut state = self.state.lock();
            state.queued = state.queued.saturating_sub(len);
        }
        self.drained.notify_waiters();
    }

    async fn next(&self) -> Step {
        loop {
            let wake = self.wake.notified();
            {
                let mut state = self.state.lock();
                if state.aborted {
                    return Step::Reset;
                }

                let last = state.done && state.trailers.is_none();
                if let Some((status, headers)) = state.head.take() {
                    let end = last && state.frames.is_empty();
                    return Step::Head { status, headers, end };
                }
                if let Some(bytes) = state.frames.pop_front() {
                    let end = last && state.frames.is_empty();
                    return Step::Data { bytes, end };
                }
                if state.done {
                    return match state.trailers.take() {
                        Some(trailers) => Step::Trailers(trailers),
                        None => Step::End,
                    };
                }
            }
            wake.await;
        }
    }
}

async fn write_stream(queue: Arc<StreamQueue>, mut respond: SendResponse<Bytes>) {
    let stream_id = respond.stream_id().as_u32();
    if let Err(err) = drive(&queue, &mut respond).await {
        debug!(stream_id, %err, "stream closed before the response completed");
    }
    queue.close();
}

async fn drive(queue: &StreamQueue, respond: &mut SendResponse<Bytes>) -> Result<(), h2::Error> {
    let step = tokio::select! {
        step = queue.next() => step,
        reason = poll_fn(|cx| respond.poll_reset(cx)) => return Err(reason?.into()),
    };

    let mut send = match step {
        Step::Head { status, headers, end } => {
            let send = respond.send_response(response_head(status, &headers), end)?;
            if end {
                return Ok(());
            }
            send
        }
        _ => {
            respond.send_reset(Reason::INTERNAL_ERROR);
            return Ok(());
        }
    };

    loop {
        let step = tokio::select! {
            step = queue.next() => step,
            reason = poll_fn(|cx| send.poll_reset(cx)) => return Err(reason?.into()),
        };

        match step {
            Step::Data { bytes, end } => {
                let len = bytes.len();
                send_data(&mut send, bytes, end).await?;
                queue.sent(len);
                if end {
                    return Ok(());
                }
            }
            Step::Trailers(trailers) => return send.send_trailers(header_map(&trailers)),
            Step::End => return send.send_data(Bytes::new(), true),
            Step::Head { .. } | Step::Reset => {
                send.send_reset(Reason::INTERNAL_ERROR);
                return Ok(());
            }
        }
    }
}

/// Sends `bytes` as the flow-control window opens.
async fn send_data(send: &mut SendStream<Bytes>, mut bytes: Bytes, end: bool) -> Result<(), h2::Error> {
    while !bytes.is_empty() {
        send.reserve_capacity(bytes.len());
        let available = loop {
            match send.capacity() {
                0 => match poll_fn(|cx| send.poll_capacity(cx)).await {
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Err(err),
                    None => return Err(Reason::STREAM_CLOSED.into()),
                },
                available => break available,
            }
        };

        let piece = bytes.split_to(available.min(bytes.len()));
        send.send_data(piece, end && bytes.is_empty())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Http2Limits;
    use std::time::Duration;

    #[test]
    fn settings_are_clamped() {
        #[rustfmt::skip]
        let cases = [
            // (max_frame_size, initial_window_size, frame, window)
            (16_384,     65_535,   16_384,     65_535),
            (0,          0,        16_384,     0),
            (1 << 20,    1 << 30,  1 << 20,    1 << 30),
            (u32::MAX,   u32::MAX, (1 << 24) - 1, (1 << 31) - 1),
        ];
        for (frame, window, expected_frame, expected_window) in cases {
            let limits = Http2Limits {
                max_frame_size: frame,
                initial_window_size: window,
                ..Http2Limits::default()
            };
            assert_eq!((limits.frame_size(), limits.window_size()), (expected_frame, expected_window));
        }
    }

    #[tokio::test]
    async fn steps_follow_writes() {
        let queue = StreamQueue::new(false);
        assert!(queue.send_head(StatusCode::OK, Headers::from([("a", "1")])));
        assert!(queue.push(b"one"));
        assert!(queue.push(b""));
        assert!(queue.push(b"two"));
        queue.finish(Some(Headers::from([("x-sum", "6")])));

        #[rustfmt::skip]
        let expected = [
            Step::Head { status: StatusCode::OK, headers: Headers::from([("a", "1")]), end: false },
            Step::Data { bytes: Bytes::from_static(b"one"), end: false },
            Step::Data { bytes: Bytes::from_static(b"two"), end: false },
            Step::Trailers(Headers::from([("x-sum", "6")])),
        ];
        for step in expected {
            assert_eq!(queue.next().await, step);
        }
    }

    #[tokio::test]
    async fn end_flag_rides_on_last_frame() {
        let queue = StreamQueue::new(false);
        queue.send_head(StatusCode::OK, Headers::new());
        queue.push(b"all");
        queue.finish(None);

        assert!(matches!(queue.next().await, Step::Head { end: false, .. }));
        assert_eq!(queue.next().await, Step::Data { bytes: Bytes::from_static(b"all"), end: true });

        let empty = StreamQueue::new(false);
        empty.send_head(StatusCode::NO_CONTENT, Headers::new());
        empty.finish(None);
        assert!(matches!(empty.next().await, Step::Head { end: true, .. }));
    }

    #[tokio::test]
    async fn head_only_drops_data() {
        let queue = StreamQueue::new(true);
        queue.send_head(StatusCode::OK, Headers::from([("content-length", "3")]));
        assert!(queue.push(b"abc"));
        assert_eq!(queue.outstanding(), 0);
        queue.finish(None);
        assert!(matches!(queue.next().await, Step::Head { end: true, .. }));
    }

    #[tokio::test]
    async fn abort_and_close() {
        let queue = Arc::new(StreamQueue::new(false));
        queue.send_head(StatusCode::OK, Headers::new());
        queue.push(&[0; 32]);
        queue.abort();
        assert_eq!(queue.next().await, Step::Reset);

        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.wait_below(8).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        queue.close();
        assert!(!waiter.await.unwrap());
        assert!(queue.is_closed());
        assert!(!queue.push(b"late"));
        assert!(!queue.send_head(StatusCode::OK, Headers::new()));
    }

    #[tokio::test]
    async fn sent_releases_producers() {
        let queue = Arc::new(StreamQueue::new(false));
        queue.send_head(StatusCode::OK, Headers::new());
        queue.push(&[0; 100]);

        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.wait_below(10).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        queue.sent(100);
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn response_headers() {
        let headers = Headers::from([
            ("Content-Type", "text/plain"),
            ("Connection", "close"),
            ("Transfer-Encoding", "chunked"),
            ("X-Multi", "a"),
            ("X-Multi", "b"),
            ("Bad Name", "x"),
        ]);
        let response = response_head(StatusCode::CREATED, &headers);

        assert_eq!(response.status(), http::StatusCode::CREATED);
        let map = response.headers();
        assert_eq!(map.len(), 3);
        assert_eq!(map["content-type"], "text/plain");
        assert_eq!(map.get_all("x-multi").iter().count(), 2);
        assert!(!map.contains_key("connection"));
    }
}
