//! Protocol upgrade hand-off (`Connection: upgrade`, `Upgrade: websocket`).
//!
//! The server never speaks the upgraded protocol. It asks the registered
//! verifiers whether to let the request through and, once one accepts,
//! hands the raw transport to the upgrade consumer together with every byte
//! it already read from it.

use crate::{
    http::{request::Request, types::StatusCode},
    router::Liveness,
};
use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Decision of one upgrade verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeVerdict {
    /// Hand the connection to the upgrade consumer.
    Accept,
    /// Answer with `status` and `message`, then close.
    ///
    /// An empty message is replaced by the status' reason phrase.
    Deny { status: StatusCode, message: String },
    /// No opinion; ask the next verifier.
    PassToNext,
}

impl UpgradeVerdict {
    /// `403 Forbidden`.
    pub fn deny() -> Self {
        UpgradeVerdict::Deny {
            status: StatusCode::FORBIDDEN,
            message: String::new(),
        }
    }

    /// The raw response a denial is answered with.
    ///
    /// CR and LF in `message` become spaces so it stays on the status line.
    pub(crate) fn denial(status: StatusCode, message: &str) -> Vec<u8> {
        let message = match message.is_empty() {
            true => status.reason().unwrap_or(""),
            false => message,
        };
        let message = message.replace(['\r', '\n'], " ");
        format!("HTTP/1.1 {} {}\r\n\r\n", status.as_u16(), message).into_bytes()
    }
}

/// Anything a connection can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// A connection handed over after an accepted upgrade.
///
/// Reading first replays the bytes the server had already received past the
/// request head, then continues with the transport. [`head`](Self::head)
/// holds the request line and header block of the upgrade request, for
/// consumers that perform their own handshake from the raw bytes.
pub struct Upgraded {
    io: Box<dyn Transport>,
    head: Vec<u8>,
    buffered: Vec<u8>,
    pos: usize,
}

impl Upgraded {
    pub(crate) fn new(io: Box<dyn Transport>, head: Vec<u8>, buffered: Vec<u8>) -> Self {
        Self {
            io,
            head,
            buffered,
            pos: 0,
        }
    }

    /// Raw request line and headers of the upgrade request.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    /// Bytes received after the request head and not yet read.
    pub fn buffered(&self) -> &[u8] {
        &self.buffered[self.pos..]
    }

    /// The transport plus the unread buffered bytes.
    pub fn into_parts(mut self) -> (Box<dyn Transport>, Vec<u8>) {
        self.buffered.drain(..self.pos);
        (self.io, self.buffered)
    }
}

impl std::fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgraded")
            .field("head", &self.head.len())
            .field("buffered", &self.buffered().len())
            .finish()
    }
}

impl AsyncRead for Upgraded {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.pos < this.buffered.len() {
            let take = (this.buffered.len() - this.pos).min(buf.remaining());
            buf.put_slice(&this.buffered[this.pos..this.pos + take]);
            this.pos += take;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for Upgraded {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

/// `true` for requests eligible for an upgrade hand-off.
pub(crate) fn is_candidate(request: &Request) -> bool {
    request.method() == crate::http::types::Method::Get
        && request.is_upgrade()
        && request
            .header("upgrade")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

type VerifyFn = Arc<dyn Fn(&Request) -> UpgradeVerdict + Send + Sync>;

struct Verifier {
    verify: VerifyFn,
    liveness: Option<Liveness>,
}

/// Verifiers consulted in registration order.
#[derive(Default)]
pub(crate) struct Verifiers {
    list: Vec<Verifier>,
}

impl Verifiers {
    pub(crate) fn push(&mut self, verify: VerifyFn, liveness: Option<Liveness>) {
        self.list.retain(|v| v.liveness.as_ref().map_or(true, Liveness::is_alive));
        self.list.push(Verifier { verify, liveness });
    }

    /// First verdict other than `PassToNext`.
    pub(crate) fn verify(&self, request: &Request) -> UpgradeVerdict {
        self.list
            .iter()
            .filter(|v| v.liveness.as_ref().map_or(true, Liveness::is_alive))
            .map(|v| (v.verify)(request))
            .find(|verdict| *verdict != UpgradeVerdict::PassToNext)
            .unwrap_or(UpgradeVerdict::PassToNext)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http::types::{Headers, Method},
        router::Owner,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn request(method: Method, headers: &[(&str, &str)], upgrade: bool) -> Request {
        Request {
            method,
            headers: headers.iter().copied().collect::<Headers>(),
            upgrade,
            ..Request::default()
        }
    }

    #[test]
    fn candidates() {
        #[rustfmt::skip]
        let cases = [
            (Method::Get, vec![("Upgrade", "websocket")], true, true),
            (Method::Get, vec![("Upgrade", "WebSocket")], true, true),
            (Method::Get, vec![("Upgrade", "h2c")], true, false),
            (Method::Get, vec![("Upgrade", "websocket")], false, false),
            (Method::Post, vec![("Upgrade", "websocket")], true, false),
            (Method::Get, vec![], true, false),
        ];

        for (method, headers, upgrade, expected) in cases {
            assert_eq!(is_candidate(&request(method, &headers, upgrade)), expected, "{method:?} {headers:?}");
        }
    }

    #[test]
    fn verifier_order() {
        let mut verifiers = Verifiers::default();
        assert_eq!(verifiers.verify(&Request::default()), UpgradeVerdict::PassToNext);

        let owner = Owner::new();
        verifiers.push(Arc::new(|_: &Request| UpgradeVerdict::PassToNext), None);
        verifiers.push(Arc::new(|_: &Request| UpgradeVerdict::deny()), Some(owner.liveness()));
        verifiers.push(Arc::new(|_: &Request| UpgradeVerdict::Accept), None);
        assert_eq!(verifiers.verify(&Request::default()), UpgradeVerdict::deny());

        drop(owner);
        assert_eq!(verifiers.verify(&Request::default()), UpgradeVerdict::Accept);
        verifiers.push(Arc::new(|_: &Request| UpgradeVerdict::PassToNext), None);
        assert_eq!(verifiers.len(), 3);
    }

    #[test]
    fn denial_bytes() {
        assert_eq!(
            UpgradeVerdict::denial(StatusCode::FORBIDDEN, ""),
            b"HTTP/1.1 403 Forbidden\r\n\r\n"
        );
        assert_eq!(
            UpgradeVerdict::denial(StatusCode::new(401).unwrap(), "Login first"),
            b"HTTP/1.1 401 Login first\r\n\r\n"
        );
        assert_eq!(
            UpgradeVerdict::denial(StatusCode::FORBIDDEN, "no\r\nSet-Cookie: x=1"),
            b"HTTP/1.1 403 no  Set-Cookie: x=1\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn replays_buffered_bytes() {
        let (client, server) = tokio::io::duplex(64);
        let mut upgraded = Upgraded::new(Box::new(server), b"GET / HTTP/1.1\r\n\r\n".to_vec(), b"early".to_vec());
        let mut client = client;
        client.write_all(b" late").await.unwrap();

        let mut buf = [0u8; 10];
        upgraded.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"early late");

        upgraded.write_all(b"pong").await.unwrap();
        let mut pong = [0u8; 4];
        client.read_exact(&mut pong).await.unwrap();
        assert_eq!(&pong, b"pong");
    }
}
