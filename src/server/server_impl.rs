use crate::{
    errors::ErrorKind,
    http::request::{ConnInfo, Request, TlsInfo},
    limits::{ConnLimits, Http2Limits, ReqLimits, RespLimits, ServerLimits, WaitStrategy},
    responder::Responder,
    server::{
        connection::HttpConnection,
        upgrade::{Transport, UpgradeVerdict, Upgraded},
    },
};
use crossbeam::queue::SegQueue;
use socket2::{Domain, Protocol, Socket, Type};
use std::{future::Future, io, net::SocketAddr, sync::Arc};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::yield_now,
    time::{sleep as tokio_sleep, timeout},
};
use tracing::{debug, warn};

/// Backlog of listeners created by [`ServerBuilder::bind`].
const BACKLOG: i32 = 1024;

/// Answers requests and decides on protocol upgrades.
///
/// [`Service`](crate::Service) implements this with a router and hooks;
/// implement it directly for full control. Each request is handled in a task
/// of its own, so `handle` may take as long as it needs: later pipelined
/// responses wait for it, other connections and HTTP/2 streams do not.
///
/// # Examples
/// ```
/// use duet_http::{Handler, Request, Responder, StatusCode};
/// use std::sync::Arc;
///
/// struct Echo;
///
/// impl Handler for Echo {
///     async fn handle(&self, request: Arc<Request>, mut responder: Responder) {
///         let headers = [("Content-Type", "application/octet-stream")].into();
///         let _ = responder.write(request.body(), &headers, StatusCode::OK).await;
///     }
/// }
/// ```
pub trait Handler: Sync + Send + 'static {
    /// Produces the response to `request` through `responder`.
    ///
    /// A responder dropped without a response answers `500`.
    fn handle(&self, request: Arc<Request>, responder: Responder) -> impl Future<Output = ()> + Send;

    /// Decides on a `GET` request carrying `Connection: upgrade` and
    /// `Upgrade: websocket`.
    ///
    /// Called once every earlier response on the connection is written.
    /// [`PassToNext`](UpgradeVerdict::PassToNext) (the default) dispatches the
    /// request to [`handle`](Self::handle) and closes the connection after it.
    fn verify_upgrade(&self, request: &Request) -> UpgradeVerdict {
        let _ = request;
        UpgradeVerdict::PassToNext
    }

    /// Takes over a connection whose upgrade was accepted.
    fn upgraded(&self, upgraded: Upgraded, request: Arc<Request>) -> impl Future<Output = ()> + Send {
        let _ = (upgraded, request);
        async {}
    }
}

/// An HTTP/1.1 and HTTP/2 server.
///
/// Accepted connections wait in a queue for one of
/// [`max_connections`](ServerLimits::max_connections) worker tasks; a full
/// queue answers `503`. See [`ServerLimits`] for the flow.
///
/// # Examples
///
/// ```no_run
/// use duet_http::{Handler, Request, Responder, Server, StatusCode};
/// use std::sync::Arc;
///
/// struct Hello;
///
/// impl Handler for Hello {
///     async fn handle(&self, _: Arc<Request>, mut responder: Responder) {
///         let _ = responder.write(b"Hello world!", &Default::default(), StatusCode::OK).await;
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     Server::builder()
///         .bind("127.0.0.1:8080".parse().unwrap())?
///         .handler(Hello)
///         .build()
///         .launch()
///         .await;
///     Ok(())
/// }
/// ```
pub struct Server<H: Handler> {
    listeners: Vec<TcpListener>,
    handler: Arc<H>,
    limits: Arc<AllLimits>,
}

impl<H: Handler> Server<H> {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder<H> {
        ServerBuilder {
            listeners: Vec::new(),
            handler: None,

            server_limits: None,
            request_limits: None,
            response_limits: None,
            connection_limits: None,
            http2_limits: None,
        }
    }

    /// Addresses of every listener, e.g. to learn the port chosen for `:0`.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|listener| listener.local_addr().ok())
            .collect()
    }

    /// Spawns the worker pool and accepts connections on every listener.
    ///
    /// Runs until the listeners fail; returns at once without listeners.
    pub async fn launch(self) {
        if self.listeners.is_empty() {
            warn!("server launched without listeners");
            return;
        }

        let stream_queue: TcpQueue = Arc::new(SegQueue::new());
        let error_queue: TcpQueue = Arc::new(SegQueue::new());
        let server_limits = &self.limits.0;

        for _ in 0..server_limits.max_connections {
            self.spawn_worker(&stream_queue);
        }
        match server_limits.count_503_handlers {
            0 => self.spawn_quiet_alarmist(&error_queue),
            count => (0..count).for_each(|_| self.spawn_alarmist(&error_queue)),
        }

        let accepting: Vec<_> = self
            .listeners
            .into_iter()
            .map(|listener| {
                let stream_queue = stream_queue.clone();
                let error_queue = error_queue.clone();
                let max_pending = server_limits.max_pending_connections;
                tokio::spawn(async move {
                    loop {
                        let value = match listener.accept().await {
                            Ok(value) => value,
                            Err(err) => {
                                debug!(%err, "accept failed");
                                continue;
                            }
                        };

                        match stream_queue.len() < max_pending {
                            true => stream_queue.push(value),
                            false => error_queue.push(value),
                        }
                    }
                })
            })
            .collect();

        for task in accepting {
            let _ = task.await;
        }
    }

    /// Serves one already-established transport, e.g. a decrypted TLS stream.
    ///
    /// `secure` selects the default URL scheme; `tls` is exposed to handlers
    /// through [`Request::tls`]. Bypasses the worker pool and its limits on
    /// concurrent connections.
    ///
    /// ```no_run
    /// # async fn demo(server: duet_http::Server<duet_http::Service>) {
    /// let (client, transport) = tokio::io::duplex(4096);
    /// # drop(client);
    /// server.serve_connection(transport, false, None).await;
    /// # }
    /// ```
    pub async fn serve_connection<T: Transport + 'static>(&self, io: T, secure: bool, tls: Option<TlsInfo>) {
        let info = ConnInfo {
            tls,
            secure,
            ..ConnInfo::default()
        };
        HttpConnection::new(self.handler.clone(), self.limits.clone())
            .run(io, info)
            .await
    }

    #[inline]
    async fn get_stream(queue: &TcpQueue, wait: &WaitStrategy) -> (TcpStream, SocketAddr) {
        loop {
            if let Some(value) = queue.pop() {
                return value;
            }

            match wait {
                WaitStrategy::Yield => yield_now().await,
                WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
            }
        }
    }

    #[inline]
    fn spawn_worker(&self, queue: &TcpQueue) {
        let queue = queue.clone();
        let limits = self.limits.clone();
        let conn = HttpConnection::new(self.handler.clone(), limits.clone());

        tokio::spawn(async move {
            loop {
                let (stream, remote_addr) = Self::get_stream(&queue, &limits.0.wait_strategy).await;

                let Ok(local_addr) = stream.local_addr() else {
                    continue;
                };
                let _ = stream.set_nodelay(true);
                debug!(%remote_addr, "connection accepted");

                let info = ConnInfo {
                    remote_addr: Some(remote_addr),
                    local_addr: Some(local_addr),
                    ..ConnInfo::default()
                };
                conn.run(stream, info).await;
            }
        });
    }

    #[inline]
    fn spawn_alarmist(&self, queue: &TcpQueue) {
        let queue = queue.clone();
        let limits = self.limits.clone();

        tokio::spawn(async move {
            let (server_limits, conn_limits, ..) = &*limits;
            let Some(response) = ErrorKind::ServiceUnavailable.as_http(server_limits.json_errors) else {
                return;
            };

            loop {
                let (mut stream, remote_addr) = Self::get_stream(&queue, &server_limits.wait_strategy).await;
                debug!(%remote_addr, "connection queue full, answering 503");

                let _ = timeout(conn_limits.socket_write_timeout, stream.write_all(response)).await;
            }
        });
    }

    #[inline]
    fn spawn_quiet_alarmist(&self, queue: &TcpQueue) {
        let queue = queue.clone();
        let limits = self.limits.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = Self::get_stream(&queue, &limits.0.wait_strategy).await;

                drop(stream);
            }
        });
    }
}

//

/// Builder for configuring and creating [`Server`] instances.
///
/// # Protocol Support
///
/// - `HTTP/1.X` (HTTP/1.0 or HTTP/1.1): Always enabled
/// - `HTTP/2` with prior knowledge: enabled by default, see
///   [`http2_limits`](Self::http2_limits)
pub struct ServerBuilder<H: Handler> {
    listeners: Vec<TcpListener>,
    handler: Option<Arc<H>>,

    server_limits: Option<ServerLimits>,
    request_limits: Option<ReqLimits>,
    response_limits: Option<RespLimits>,
    connection_limits: Option<ConnLimits>,
    http2_limits: Option<Http2Limits>,
}

impl<H: Handler> ServerBuilder<H> {
    /// Adds a TCP listener. May be called several times.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() {
    /// use duet_http::{Server, Service};
    /// use tokio::net::TcpListener;
    ///
    /// let server = Server::builder()
    ///     .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
    ///     .listener(TcpListener::bind("[::1]:8080").await.unwrap())
    ///     .handler(Service::new())
    ///     .build();
    /// # }
    /// ```
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Creates a listener on `addr` with `SO_REUSEADDR` set.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn bind(mut self, addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(BACKLOG)?;

        self.listeners.push(TcpListener::from_std(socket.into())?);
        Ok(self)
    }

    /// Sets the request handler that will process incoming requests.
    ///
    /// **This is a required component.**
    #[inline(always)]
    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Configures worker pool and admission queue.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() {
    /// use duet_http::{Server, Service, limits::ServerLimits};
    ///
    /// let server = Server::builder()
    ///     .handler(Service::new())
    ///     .server_limits(ServerLimits {
    ///         // Your changes
    ///         max_connections: 2500,
    ///         max_pending_connections: 10000,
    ///         ..ServerLimits::default() // Required line
    ///     })
    ///     .build();
    /// # }
    /// ```
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures per-connection timeouts and pipelining.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() {
    /// use duet_http::{Server, Service, limits::ConnLimits};
    /// use std::time::Duration;
    ///
    /// let server = Server::builder()
    ///     .handler(Service::new())
    ///     .connection_limits(ConnLimits {
    ///         // Your changes
    ///         socket_read_timeout: Duration::from_secs(5),
    ///         max_pipelined_requests: 16,
    ///         ..ConnLimits::default() // Required line
    ///     })
    ///     .build();
    /// # }
    /// ```
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures request parsing limits and line-ending strictness.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Configures response streaming.
    #[inline(always)]
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    /// Configures or disables HTTP/2.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() {
    /// use duet_http::{Server, Service, limits::Http2Limits};
    ///
    /// let server = Server::builder()
    ///     .handler(Service::new())
    ///     .http2_limits(Http2Limits {
    ///         enabled: false,
    ///         ..Http2Limits::default() // Required line
    ///     })
    ///     .build();
    /// # }
    /// ```
    #[inline(always)]
    pub fn http2_limits(mut self, limits: Http2Limits) -> Self {
        self.http2_limits = Some(limits);
        self
    }

    /// Finalizes the builder and constructs a [`Server`] instance.
    ///
    /// # Panics
    ///
    /// Panics with ``The `handler` method must be called to create`` when
    /// [`handler`](Self::handler) was not called.
    #[inline]
    #[track_caller]
    pub fn build(self) -> Server<H> {
        let handler = self
            .handler
            .expect("The `handler` method must be called to create");

        Server {
            listeners: self.listeners,
            handler,
            limits: Arc::new((
                self.server_limits.unwrap_or_default(),
                self.connection_limits.unwrap_or_default(),
                self.request_limits.unwrap_or_default(),
                self.response_limits.unwrap_or_default(),
                self.http2_limits.unwrap_or_default(),
            )),
        }
    }
}

type TcpQueue = Arc<SegQueue<(TcpStream, SocketAddr)>>;
pub(crate) type AllLimits = (ServerLimits, ConnLimits, ReqLimits, RespLimits, Http2Limits);
