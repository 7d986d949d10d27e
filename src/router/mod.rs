//! Ordered path/method rules with typed placeholders.
//!
//! A pattern such as `/user/<arg>/posts/<arg>` is compiled into an anchored
//! regex: every `<arg>` is replaced, left to right, by the fragment of the
//! declared [`ParamKind`] wrapped in one capture group. Literal text is
//! matched verbatim.
//!
//! Rules are tried in registration order. A rule is skipped when:
//! - its method set excludes the request method,
//! - its owner was dropped,
//! - its pattern does not match the decoded path,
//! - a captured value fails to convert to its declared type,
//! - its guard rejects the request.
//!
//! The first rule left wins.

pub(crate) mod converter;

use crate::{
    errors::RouteError,
    http::{request::Request, response::Response, types::Methods},
    responder::Responder,
};
use converter::{ConvertFn, Converters, Param, ParamKind, Params};
use regex::Regex;
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Weak},
};

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub(crate) type ValueFn = Arc<dyn Fn(Arc<Request>, Params) -> BoxFuture<Response> + Send + Sync>;
pub(crate) type ResponderFn = Arc<dyn Fn(Arc<Request>, Params, Responder) -> BoxFuture<()> + Send + Sync>;
type GuardFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

const PLACEHOLDER: &str = "<arg>";

/// Keeps the callbacks registered with it alive.
///
/// Rules and upgrade verifiers registered with an owner stop being invoked
/// once every clone of the owner is dropped, and are pruned on the next
/// registration.
///
/// ```
/// use duet_http::Owner;
///
/// let owner = Owner::new();
/// let liveness = owner.liveness();
/// assert!(liveness.is_alive());
///
/// drop(owner);
/// assert!(!liveness.is_alive());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Owner(Arc<()>);

impl Owner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn liveness(&self) -> Liveness {
        Liveness(Arc::downgrade(&self.0))
    }
}

/// Weak side of an [`Owner`].
#[derive(Debug, Clone)]
pub struct Liveness(Weak<()>);

impl Liveness {
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Identifies a registered rule for [`Router::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleHandle(u64);

#[derive(Clone)]
pub(crate) enum RuleHandler {
    Value(ValueFn),
    Responder(ResponderFn),
}

/// A route before registration: pattern, methods, parameter types, handler.
///
/// ```
/// use duet_http::{Methods, ParamKind, Response, Router, Rule, StatusCode};
///
/// let rule = Rule::new("/user/<arg>/detail", Methods::GET, [ParamKind::I64], |_req, params| async move {
///     let id: i64 = params.get(0).unwrap_or_default();
///     Response::from(format!("user {id}"))
/// })
/// .guard(|req| req.header("authorization").is_some());
///
/// let mut router = Router::new();
/// router.add_rule(rule).unwrap();
/// ```
pub struct Rule {
    pattern: String,
    methods: Methods,
    kinds: Vec<ParamKind>,
    handler: RuleHandler,
    guard: Option<GuardFn>,
    liveness: Option<Liveness>,
}

impl Rule {
    /// A rule whose handler returns a response value.
    pub fn new<P, F, Fut, R>(pattern: &str, methods: Methods, params: P, handler: F) -> Self
    where
        P: IntoIterator<Item = ParamKind>,
        F: Fn(Arc<Request>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Response>,
    {
        let handler: ValueFn = Arc::new(move |request, params| {
            let fut = handler(request, params);
            Box::pin(async move { fut.await.into() })
        });
        Self::from_handler(pattern, methods, params, RuleHandler::Value(handler))
    }

    /// A rule whose handler writes through the [`Responder`] itself.
    pub fn with_responder<P, F, Fut>(pattern: &str, methods: Methods, params: P, handler: F) -> Self
    where
        P: IntoIterator<Item = ParamKind>,
        F: Fn(Arc<Request>, Params, Responder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: ResponderFn = Arc::new(move |request, params, responder| Box::pin(handler(request, params, responder)));
        Self::from_handler(pattern, methods, params, RuleHandler::Responder(handler))
    }

    fn from_handler<P: IntoIterator<Item = ParamKind>>(pattern: &str, methods: Methods, params: P, handler: RuleHandler) -> Self {
        Self {
            pattern: pattern.to_owned(),
            methods,
            kinds: params.into_iter().collect(),
            handler,
            guard: None,
            liveness: None,
        }
    }

    /// Extra acceptance check, run after pattern, method and conversion.
    pub fn guard<G>(mut self, guard: G) -> Self
    where
        G: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Ties the rule's lifetime to `owner`.
    pub fn owned_by(mut self, owner: &Owner) -> Self {
        self.liveness = Some(owner.liveness());
        self
    }
}

struct CompiledRule {
    id: u64,
    pattern: String,
    methods: Methods,
    matcher: Regex,
    /// One converter per capture group, in order.
    converters: Vec<ConvertFn>,
    handler: RuleHandler,
    guard: Option<GuardFn>,
    liveness: Option<Liveness>,
}

impl CompiledRule {
    #[inline]
    fn is_alive(&self) -> bool {
        self.liveness.as_ref().map_or(true, Liveness::is_alive)
    }

    fn bind(&self, path: &str) -> Option<Params> {
        let captures = self.matcher.captures(path)?;

        let mut params = Vec::with_capacity(self.converters.len());
        for (index, convert) in self.converters.iter().enumerate() {
            let text = captures.get(index + 1)?.as_str();
            params.push(convert(text)?);
        }
        Some(Params(params))
    }
}

/// Ordered rule table plus the converter registry.
pub struct Router {
    rules: Vec<CompiledRule>,
    converters: Converters,
    next_id: u64,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.iter().map(|r| (&r.pattern, r.methods))).finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            converters: Converters::default(),
            next_id: 0,
        }
    }

    /// Registers a converter for `kind`, replacing any existing one.
    ///
    /// `fragment` must not contain capture groups; use `(?:...)`.
    ///
    /// ```
    /// use duet_http::{Param, ParamKind, Router};
    ///
    /// let mut router = Router::new();
    /// router
    ///     .add_converter(ParamKind::Custom("hex"), "[0-9a-fA-F]+", |s| {
    ///         u64::from_str_radix(s, 16).ok().map(Param::Uint)
    ///     })
    ///     .unwrap();
    /// ```
    pub fn add_converter<F>(&mut self, kind: ParamKind, fragment: &str, convert: F) -> Result<(), RouteError>
    where
        F: Fn(&str) -> Option<Param> + Send + Sync + 'static,
    {
        self.converters.insert(kind, fragment, Arc::new(convert))
    }

    /// Compiles and appends `rule`. It is tried after every earlier rule.
    pub fn add_rule(&mut self, rule: Rule) -> Result<RuleHandle, RouteError> {
        self.rules.retain(CompiledRule::is_alive);

        if !rule.methods.has_known() {
            return Err(RouteError::NoMethods);
        }

        let (matcher, converters) = self.compile(&rule.pattern, &rule.kinds)?;
        let id = self.next_id;
        self.next_id += 1;

        self.rules.push(CompiledRule {
            id,
            pattern: rule.pattern,
            methods: rule.methods,
            matcher,
            converters,
            handler: rule.handler,
            guard: rule.guard,
            liveness: rule.liveness,
        });
        Ok(RuleHandle(id))
    }

    /// Shortcut for [`Rule::new`] plus [`add_rule`](Self::add_rule).
    pub fn route<P, F, Fut, R>(&mut self, pattern: &str, methods: Methods, params: P, handler: F) -> Result<RuleHandle, RouteError>
    where
        P: IntoIterator<Item = ParamKind>,
        F: Fn(Arc<Request>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Response>,
    {
        self.add_rule(Rule::new(pattern, methods, params, handler))
    }

    /// Shortcut for [`Rule::with_responder`] plus [`add_rule`](Self::add_rule).
    pub fn route_with_responder<P, F, Fut>(&mut self, pattern: &str, methods: Methods, params: P, handler: F) -> Result<RuleHandle, RouteError>
    where
        P: IntoIterator<Item = ParamKind>,
        F: Fn(Arc<Request>, Params, Responder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_rule(Rule::with_responder(pattern, methods, params, handler))
    }

    /// Removes a rule; `false` if it was already gone.
    pub fn remove(&mut self, handle: RuleHandle) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.id != handle.0);
        self.rules.len() != before
    }

    /// Number of registered rules, dead ones included until pruned.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule accepting `request`, with its bound parameters.
    pub(crate) fn find(&self, request: &Request, path: &str) -> Option<(RuleHandler, Params)> {
        self.rules
            .iter()
            .filter(|rule| rule.methods.contains(request.method()))
            .filter(|rule| rule.is_alive())
            .find_map(|rule| {
                let params = rule.bind(path)?;
                match &rule.guard {
                    Some(guard) if !guard(request) => None,
                    _ => Some((rule.handler.clone(), params)),
                }
            })
    }

    fn compile(&self, pattern: &str, kinds: &[ParamKind]) -> Result<(Regex, Vec<ConvertFn>), RouteError> {
        let placeholders = pattern.matches(PLACEHOLDER).count();
        if placeholders != kinds.len() {
            return Err(RouteError::PlaceholderMismatch {
                placeholders,
                params: kinds.len(),
            });
        }

        let mut regex = String::from("^");
        let mut converters = Vec::with_capacity(kinds.len());
        let mut literals = pattern.split(PLACEHOLDER);
        if let Some(first) = literals.next() {
            regex.push_str(&regex::escape(first));
        }

        for (kind, literal) in kinds.iter().zip(literals) {
            let converter = self.converters.get(*kind).ok_or(RouteError::MissingConverter(*kind))?;
            if *kind != ParamKind::Void {
                regex.push('(');
                regex.push_str(&converter.fragment);
                regex.push(')');
                converters.push(converter.convert.clone());
            }
            regex.push_str(&regex::escape(literal));
        }
        regex.push('$');

        Ok((Regex::new(&regex)?, converters))
    }
}
