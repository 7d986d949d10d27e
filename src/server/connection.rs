use crate::{
    errors::ErrorKind,
    http::{
        parser::RequestParser,
        request::{ConnInfo, Request},
        types::Method,
    },
    responder::{Http1Slot, Responder, Target},
    server::{
        http2,
        pipeline::Pipeline,
        server_impl::{AllLimits, Handler},
        upgrade::{self, Transport, UpgradeVerdict, Upgraded},
    },
};
use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    time::timeout,
};
use tracing::debug;

/// Drives one accepted transport until it closes.
pub(crate) struct HttpConnection<H: Handler> {
    handler: Arc<H>,
    limits: Arc<AllLimits>,
}

enum Sniffed {
    Closed,
    Http1,
    Http2,
}

impl<H: Handler> HttpConnection<H> {
    #[inline]
    pub(crate) fn new(handler: Arc<H>, limits: Arc<AllLimits>) -> Self {
        Self { handler, limits }
    }

    pub(crate) async fn run<T: Transport + 'static>(&self, mut io: T, info: ConnInfo) {
        let mut buffered = Vec::new();

        let sniffed = match self.limits.4.enabled {
            true => self.sniff(&mut io, &mut buffered).await,
            false => Ok(Sniffed::Http1),
        };

        match sniffed {
            Ok(Sniffed::Http1) => {
                let (reader, writer) = tokio::io::split(io);
                let parser = RequestParser::new(self.limits.2.clone(), info);
                Http1 {
                    handler: &self.handler,
                    limits: &self.limits,
                    reader,
                    writer,
                    parser,
                    pipeline: Arc::new(Pipeline::new()),
                    pending: buffered,
                    offset: 0,
                    started: Instant::now(),
                    served: 0,
                    closing: false,
                    failure: None,
                    upgrade: None,
                }
                .serve()
                .await;
            }
            Ok(Sniffed::Http2) => {
                let io = Upgraded::new(Box::new(io), Vec::new(), buffered);
                if let Err(err) = http2::serve(io, self.handler.clone(), info, self.limits.clone()).await {
                    debug!(%err, "http/2 connection closed");
                }
            }
            Ok(Sniffed::Closed) => {}
            Err(err) => debug!(%err, "connection closed before the first request"),
        }
    }

    /// Reads until the first bytes rule the HTTP/2 preface in or out.
    async fn sniff<T: Transport>(&self, io: &mut T, buffered: &mut Vec<u8>) -> Result<Sniffed, ErrorKind> {
        let mut chunk = vec![0; self.limits.1.read_buffer_size.max(http2::PREFACE.len())];
        loop {
            let read = read_some(io, &mut chunk, Some(self.limits.1.socket_read_timeout)).await?;
            if read == 0 {
                return Ok(Sniffed::Closed);
            }
            buffered.extend_from_slice(&chunk[..read]);

            let len = buffered.len().min(http2::PREFACE.len());
            if buffered[..len] != http2::PREFACE[..len] {
                return Ok(Sniffed::Http1);
            }
            if len == http2::PREFACE.len() {
                return Ok(Sniffed::Http2);
            }
        }
    }
}

/// State of one HTTP/1.x connection.
///
/// Requests are parsed from `pending` and dispatched to handler tasks while
/// fewer than `max_pipelined_requests` responses are outstanding. Responses
/// are flushed from the pipeline in request order.
struct Http1<'a, H: Handler, T: Transport> {
    handler: &'a Arc<H>,
    limits: &'a AllLimits,
    reader: ReadHalf<T>,
    writer: WriteHalf<T>,
    parser: RequestParser,
    pipeline: Arc<Pipeline>,

    /// Received and not yet parsed bytes start at `offset`.
    pending: Vec<u8>,
    offset: usize,

    started: Instant,
    served: usize,
    /// No further requests are read.
    closing: bool,
    /// Answered once every earlier response is out.
    failure: Option<ErrorKind>,
    /// Upgrade candidate with its raw head, verified once the pipeline is empty.
    upgrade: Option<(Request, Vec<u8>)>,
}

impl<H: Handler, T: Transport + 'static> Http1<'_, H, T> {
    async fn serve(mut self) {
        let upgrade = match self.impl_serve().await {
            Ok(upgrade) => upgrade,
            Err(err) => {
                debug!(%err, "connection closed");
                None
            }
        };
        self.pipeline.close();

        if let Some((request, head)) = upgrade {
            debug!(path = %request.url().raw_path(), "upgrade accepted");
            let Http1 { handler, reader, writer, pending, offset, .. } = self;
            let upgraded = Upgraded::new(Box::new(reader.unsplit(writer)), head, pending[offset..].to_vec());

            let handler = handler.clone();
            tokio::spawn(async move { handler.upgraded(upgraded, Arc::new(request)).await });
        }
    }

    /// Returns the accepted upgrade request, if any, with its raw head.
    async fn impl_serve(&mut self) -> Result<Option<(Request, Vec<u8>)>, ErrorKind> {
        let mut chunk = vec![0; self.limits.1.read_buffer_size];
        let mut eof = false;

        loop {
            if self.flush().await? {
                return Ok(None);
            }

            self.advance();

            if self.pipeline.in_flight() == 0 {
                if let Some(err) = self.failure.take() {
                    return self.fail(err).await.map(|_| None);
                }
                if let Some((request, head)) = self.upgrade.take() {
                    match self.handler.verify_upgrade(&request) {
                        UpgradeVerdict::Accept => return Ok(Some((request, head))),
                        UpgradeVerdict::Deny { status, message } => {
                            debug!(status = status.as_u16(), "upgrade denied");
                            self.write(&UpgradeVerdict::denial(status, &message)).await?;
                            return Ok(None);
                        }
                        UpgradeVerdict::PassToNext => {
                            self.dispatch(request, true);
                            continue;
                        }
                    }
                }
                if self.closing || eof {
                    return Ok(None);
                }
            }

            let can_read = !eof
                && !self.closing
                && self.failure.is_none()
                && self.upgrade.is_none()
                && self.pipeline.in_flight() < self.limits.1.max_pipelined_requests.max(1);
            let idle = match self.pipeline.in_flight() {
                0 => Some(self.limits.1.socket_read_timeout),
                _ => None,
            };

            tokio::select! {
                _ = self.pipeline.wait_output() => {}
                read = read_some(&mut self.reader, &mut chunk, idle), if can_read => match read? {
                    0 => {
                        if self.parser.is_mid_request() {
                            debug!("peer closed mid-request, dropping the partial request");
                        }
                        eof = true;
                    }
                    read => {
                        if self.offset == self.pending.len() {
                            self.pending.clear();
                            self.offset = 0;
                        }
                        self.pending.extend_from_slice(&chunk[..read]);
                    }
                },
            }
        }
    }

    /// Parses and dispatches buffered requests while the pipeline has room.
    fn advance(&mut self) {
        while !self.closing
            && self.failure.is_none()
            && self.upgrade.is_none()
            && self.pipeline.in_flight() < self.limits.1.max_pipelined_requests.max(1)
            && self.offset < self.pending.len()
        {
            let used = match self.parser.feed(&self.pending[self.offset..]) {
                Ok(used) => used,
                Err(err) => {
                    self.failure = Some(err);
                    break;
                }
            };
            self.offset += used;

            match self.parser.take_request() {
                Some(request) if upgrade::is_candidate(&request) => {
                    let head = self.parser.head_bytes().to_vec();
                    self.upgrade = Some((request, head));
                }
                Some(request) => self.dispatch(request, false),
                None if used == 0 => break,
                None => {}
            }
        }
    }

    fn dispatch(&mut self, request: Request, force_close: bool) {
        self.served += 1;
        let close = force_close
            || !request.is_keep_alive()
            || self.served >= self.limits.1.max_requests_per_connection
            || self.started.elapsed() >= self.limits.1.connection_lifetime;
        self.closing |= close;

        let slot = Http1Slot {
            pipeline: self.pipeline.clone(),
            id: self.pipeline.reserve(),
            version: request.version(),
            head_only: request.method() == Method::Head,
            close,
        };
        let responder = Responder::new(Target::Http1(slot), &self.limits.3);
        debug!(method = %request.method(), path = %request.url().raw_path(), close, "dispatching request");

        let handler = self.handler.clone();
        tokio::spawn(async move { handler.handle(Arc::new(request), responder).await });
    }

    /// Writes whatever the pipeline has ready. `true` when the connection ends.
    async fn flush(&mut self) -> Result<bool, ErrorKind> {
        let output = self.pipeline.take_output();
        if !output.bytes.is_empty() {
            self.write(&output.bytes).await?;
            self.pipeline.written();
        }
        Ok(output.close)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        let writer = &mut self.writer;
        let write = async move {
            writer.write_all(bytes).await?;
            writer.flush().await
        };
        timeout(self.limits.1.socket_write_timeout, write)
            .await
            .map_err(io::Error::from)??;
        Ok(())
    }

    async fn fail(&mut self, err: ErrorKind) -> Result<(), ErrorKind> {
        debug!(%err, "rejecting request");
        match err.as_http(self.limits.0.json_errors) {
            Some(response) => self.write(response).await,
            None => Ok(()),
        }
    }
}

async fn read_some<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8], limit: Option<Duration>) -> io::Result<usize> {
    match limit {
        Some(limit) => timeout(limit, reader.read(buf)).await?,
        None => reader.read(buf).await,
    }
}
