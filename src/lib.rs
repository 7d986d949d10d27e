//! duet_http - Embeddable HTTP/1.1 and HTTP/2 server engine
//!
//! A Tokio-based server for applications that want to own their request
//! handling: parse, route, respond and hand off upgraded connections,
//! with every resource bounded by configurable limits.
//!
//! # Protocol Support
//!
//! - **HTTP/1.1**: persistent connections, pipelining with in-order
//!   responses, chunked request and response bodies with trailers
//! - **HTTP/1.0**: keep-alive on request, bodies delimited by length or close
//! - **HTTP/2**: prior-knowledge cleartext connections and any transport
//!   passed to [`Server::serve_connection`] (e.g. after TLS with ALPN `h2`)
//! - **Upgrades**: `Connection: upgrade` + `Upgrade: websocket` requests are
//!   verified and handed over as a raw [`Upgraded`] transport
//!
//! # Building blocks
//!
//! - [`Request`]: parsed, read-only view of one request
//! - [`Responder`]: writes one response, whole, streamed or chunked
//! - [`Router`] and [`Rule`]: ordered patterns with typed `<arg>` placeholders
//! - [`Service`]: router plus before/after hooks and upgrade verifiers
//! - [`Handler`]: the seam between the server and the application
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use duet_http::{Handler, Request, Responder, Server, StatusCode};
//! use std::sync::Arc;
//!
//! struct MyHandler;
//!
//! impl Handler for MyHandler {
//!     async fn handle(&self, _: Arc<Request>, mut responder: Responder) {
//!         let _ = responder.write(b"Hello World!", &Default::default(), StatusCode::OK).await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Server::builder()
//!         .bind("127.0.0.1:8080".parse().unwrap())?
//!         .handler(MyHandler)
//!         .build()
//!         .launch()
//!         .await;
//!     Ok(())
//! }
//! ```
//! With routing:
//! ```no_run
//! use duet_http::{Methods, ParamKind, Response, Server, Service, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let service = Service::new();
//!     service
//!         .route("/api/<arg>/name", Methods::GET, [ParamKind::String], |_, params| async move {
//!             params.str(0).unwrap_or_default().to_owned()
//!         })
//!         .unwrap();
//!     service
//!         .route("/api/<arg>/double", Methods::GET | Methods::POST, [ParamKind::I64], |_, params| async move {
//!             match params.get::<i64>(0) {
//!                 Some(value) => Response::from((value * 2).to_string()),
//!                 None => Response::new(StatusCode::BAD_REQUEST),
//!             }
//!         })
//!         .unwrap();
//!
//!     Server::builder()
//!         .bind("127.0.0.1:8080".parse().unwrap())?
//!         .handler(service)
//!         .build()
//!         .launch()
//!         .await;
//!     Ok(())
//! }
//! ```

pub(crate) mod http {
    pub(crate) mod parser;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
    pub(crate) mod url;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod http2;
    pub(crate) mod pipeline;
    pub(crate) mod server_impl;
    pub(crate) mod service;
    pub(crate) mod upgrade;
}
pub(crate) mod errors;
pub mod limits;
pub(crate) mod responder;
pub(crate) mod router;

pub use crate::{
    errors::{ResponderError, RouteError},
    http::{
        request::{Request, TlsInfo},
        response::Response,
        types::{Headers, Method, Methods, StatusCode, Version},
        url::Url,
    },
    responder::{
        device::{Device, FileDevice, ReaderDevice},
        Responder, ResponderState,
    },
    router::{
        converter::{ConvertFn, FromParam, Param, ParamKind, Params},
        Liveness, Owner, Router, Rule, RuleHandle,
    },
    server::{
        server_impl::{Handler, Server, ServerBuilder},
        service::Service,
        upgrade::{Transport, UpgradeVerdict, Upgraded},
    },
};
