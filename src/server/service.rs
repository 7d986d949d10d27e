use crate::{
    errors::RouteError,
    http::{request::Request, response::Response, types::{Methods, StatusCode}},
    responder::Responder,
    router::{
        converter::{Param, ParamKind, Params},
        BoxFuture, Owner, Router, Rule, RuleHandle, RuleHandler,
    },
    server::{
        server_impl::Handler,
        upgrade::{UpgradeVerdict, Upgraded, Verifiers},
    },
};
use parking_lot::RwLock;
use std::{future::Future, sync::Arc};
use tracing::debug;

type BeforeHook = Arc<dyn Fn(&Request) -> Option<Response> + Send + Sync>;
type AfterHook = Arc<dyn Fn(Response, &Request) -> Response + Send + Sync>;
type MissingFn = Arc<dyn Fn(&Request) -> Response + Send + Sync>;
type ConsumerFn = Arc<dyn Fn(Upgraded, Arc<Request>) -> BoxFuture<()> + Send + Sync>;

/// The ready-made [`Handler`]: a [`Router`] plus hooks.
///
/// For every request the service:
/// 1. runs the pre-request hooks in order; the first one returning a
///    response short-circuits routing,
/// 2. dispatches to the first matching rule, or to the missing handler
///    (`404 Not Found` by default),
/// 3. passes value responses through the after-request hooks in order.
///
/// Responder-driven rules write their own response and bypass step 3.
///
/// A `Service` is a cheap handle; clones share the same tables, so routes can
/// be added or removed while the server runs.
///
/// # Examples
/// ```no_run
/// use duet_http::{Methods, ParamKind, Response, Server, Service, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let service = Service::new();
///     service
///         .route("/hello/<arg>", Methods::GET, [ParamKind::String], |_req, params| async move {
///             format!("Hello, {}!", params.str(0).unwrap_or("stranger"))
///         })
///         .unwrap();
///     service.after_request(|mut resp, _req| {
///         resp.set_header("Server", "duet");
///         resp
///     });
///
///     Server::builder()
///         .bind("127.0.0.1:8080".parse().unwrap())?
///         .handler(service)
///         .build()
///         .launch()
///         .await;
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    router: RwLock<Router>,
    before: RwLock<Vec<BeforeHook>>,
    after: RwLock<Vec<AfterHook>>,
    missing: RwLock<MissingFn>,
    verifiers: RwLock<Verifiers>,
    consumer: RwLock<Option<ConsumerFn>>,
}

impl Default for ServiceInner {
    fn default() -> Self {
        Self {
            router: RwLock::new(Router::new()),
            before: RwLock::default(),
            after: RwLock::default(),
            missing: RwLock::new(Arc::new(|_: &Request| Response::new(StatusCode::NOT_FOUND))),
            verifiers: RwLock::default(),
            consumer: RwLock::default(),
        }
    }
}

// Routing
impl Service {
    pub fn new() -> Self {
        Self::default()
    }

    /// See [`Router::route`].
    pub fn route<P, F, Fut, R>(&self, pattern: &str, methods: Methods, params: P, handler: F) -> Result<RuleHandle, RouteError>
    where
        P: IntoIterator<Item = ParamKind>,
        F: Fn(Arc<Request>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Response>,
    {
        self.add_rule(Rule::new(pattern, methods, params, handler))
    }

    /// See [`Router::route_with_responder`].
    pub fn route_with_responder<P, F, Fut>(&self, pattern: &str, methods: Methods, params: P, handler: F) -> Result<RuleHandle, RouteError>
    where
        P: IntoIterator<Item = ParamKind>,
        F: Fn(Arc<Request>, Params, Responder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_rule(Rule::with_responder(pattern, methods, params, handler))
    }

    #[inline]
    pub fn add_rule(&self, rule: Rule) -> Result<RuleHandle, RouteError> {
        self.inner.router.write().add_rule(rule)
    }

    #[inline]
    pub fn remove_rule(&self, handle: RuleHandle) -> bool {
        self.inner.router.write().remove(handle)
    }

    /// See [`Router::add_converter`].
    pub fn add_converter<F>(&self, kind: ParamKind, fragment: &str, convert: F) -> Result<(), RouteError>
    where
        F: Fn(&str) -> Option<Param> + Send + Sync + 'static,
    {
        self.inner.router.write().add_converter(kind, fragment, convert)
    }
}

// Hooks
impl Service {
    /// Runs before routing; returning `Some` answers the request directly.
    pub fn before_request<F>(&self, hook: F)
    where
        F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
    {
        self.inner.before.write().push(Arc::new(hook));
    }

    /// Rewrites every value response, in registration order.
    pub fn after_request<F>(&self, hook: F)
    where
        F: Fn(Response, &Request) -> Response + Send + Sync + 'static,
    {
        self.inner.after.write().push(Arc::new(hook));
    }

    /// Answers requests no rule matched.
    pub fn set_missing_handler<F>(&self, handler: F)
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        *self.inner.missing.write() = Arc::new(handler);
    }
}

// Upgrades
impl Service {
    /// Adds a verifier consulted for `Upgrade: websocket` requests.
    ///
    /// Verifiers run in registration order; the first verdict other than
    /// [`UpgradeVerdict::PassToNext`] decides.
    pub fn add_upgrade_verifier<F>(&self, verify: F)
    where
        F: Fn(&Request) -> UpgradeVerdict + Send + Sync + 'static,
    {
        self.inner.verifiers.write().push(Arc::new(verify), None);
    }

    /// Like [`add_upgrade_verifier`](Self::add_upgrade_verifier), skipped once
    /// `owner` is dropped.
    pub fn add_upgrade_verifier_owned<F>(&self, owner: &Owner, verify: F)
    where
        F: Fn(&Request) -> UpgradeVerdict + Send + Sync + 'static,
    {
        self.inner.verifiers.write().push(Arc::new(verify), Some(owner.liveness()));
    }

    /// Receives connections whose upgrade was accepted.
    ///
    /// Without a consumer, verifiers are skipped and upgrade requests fall
    /// through to normal dispatch.
    pub fn on_upgrade<F, Fut>(&self, consumer: F)
    where
        F: Fn(Upgraded, Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let consumer: ConsumerFn = Arc::new(move |upgraded, request| Box::pin(consumer(upgraded, request)));
        *self.inner.consumer.write() = Some(consumer);
    }
}

impl Service {
    async fn dispatch(&self, request: Arc<Request>, mut responder: Responder) {
        let before = self.inner.before.read().clone();
        let early = before.iter().find_map(|hook| hook(&request));

        let response = match early {
            Some(response) => response,
            None => {
                let path = request.path();
                let found = self.inner.router.read().find(&request, &path);

                match found {
                    Some((RuleHandler::Value(handler), params)) => handler(request.clone(), params).await,
                    Some((RuleHandler::Responder(handler), params)) => {
                        return handler(request, params, responder).await;
                    }
                    None => {
                        debug!(method = %request.method(), path = %path, "no rule matched");
                        let missing = self.inner.missing.read().clone();
                        missing(&request)
                    }
                }
            }
        };

        let after = self.inner.after.read().clone();
        let response = after.iter().fold(response, |response, hook| hook(response, &request));
        let _ = responder.write_response(response).await;
    }
}

impl Handler for Service {
    async fn handle(&self, request: Arc<Request>, responder: Responder) {
        self.dispatch(request, responder).await
    }

    fn verify_upgrade(&self, request: &Request) -> UpgradeVerdict {
        if self.inner.consumer.read().is_none() {
            debug!(path = %request.url().raw_path(), "no upgrade consumer, routing as a plain request");
            return UpgradeVerdict::PassToNext;
        }
        self.inner.verifiers.read().verify(request)
    }

    async fn upgraded(&self, upgraded: Upgraded, request: Arc<Request>) {
        let consumer = self.inner.consumer.read().clone();
        if let Some(consumer) = consumer {
            consumer(upgraded, request).await;
        }
    }
}
