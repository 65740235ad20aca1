use anyhow::{Context as _, Result};
use hyper::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use pin_project_lite::pin_project;
use rand::seq::IndexedRandom;
use rand::Rng;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use socket2::{SockRef, TcpKeepalive};
use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tower_service::Service;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Where a single connection attempt goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialTarget {
    /// Resolve the URL's host and connect to it.
    Host { host: String, port: u16 },
    /// Connect straight to a pool address, the URL's host is never resolved.
    Addr(SocketAddr),
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialTarget::Host { host, port } => write!(f, "{host}:{port}"),
            DialTarget::Addr(addr) => write!(f, "{addr}"),
        }
    }
}

/// Connector handed to the HTTP client.
///
/// With an empty pool it dials the URL's host. Otherwise every connection
/// attempt, plaintext or TLS, goes to an address drawn uniformly from the
/// pool while the URL's host is kept for SNI and the `Host` header.
/// Certificates are not validated.
#[derive(Clone)]
pub struct Dialer {
    pool: Arc<[IpAddr]>,
    tls: TlsConnector,
}

impl Dialer {
    #[must_use]
    pub fn new(pool: Arc<[IpAddr]>, tls: Arc<ClientConfig>) -> Self {
        Self {
            pool,
            tls: TlsConnector::from(tls),
        }
    }

    /// Picks the destination for one connection attempt.
    pub fn target<R: Rng + ?Sized>(&self, uri: &Uri, rng: &mut R) -> Result<DialTarget> {
        let host = uri.host().context("Uri has no host")?;
        let port = port_for(uri);
        Ok(match self.pool.choose(rng) {
            Some(ip) => DialTarget::Addr(SocketAddr::new(*ip, port)),
            None => DialTarget::Host {
                host: bare_host(host).to_string(),
                port,
            },
        })
    }

    async fn dial(self, uri: Uri) -> Result<Dialed> {
        let target = self.target(&uri, &mut rand::rng())?;
        let tcp = tokio::time::timeout(CONNECT_TIMEOUT, connect(&target))
            .await
            .with_context(|| format!("Timed out connecting to {target}"))?
            .with_context(|| format!("Failed to connect to {target}"))?;
        tune(&tcp).context("Failed to configure socket")?;
        if !is_https(&uri) {
            return Ok(Dialed::new(MaybeTlsStream::Plain { tcp }));
        }
        let host = bare_host(uri.host().context("Uri has no host")?);
        let name = ServerName::try_from(host.to_owned())
            .with_context(|| format!("Invalid TLS server name `{host}`"))?;
        let tls = self
            .tls
            .connect(name, tcp)
            .await
            .with_context(|| format!("TLS handshake with {target} failed"))?;
        Ok(Dialed::new(MaybeTlsStream::Tls { tls }))
    }
}

impl Service<Uri> for Dialer {
    type Response = Dialed;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Dialed>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        Box::pin(self.clone().dial(uri))
    }
}

async fn connect(target: &DialTarget) -> io::Result<TcpStream> {
    match target {
        DialTarget::Host { host, port } => TcpStream::connect((host.as_str(), *port)).await,
        DialTarget::Addr(addr) => TcpStream::connect(*addr).await,
    }
}

fn tune(tcp: &TcpStream) -> io::Result<()> {
    tcp.set_nodelay(true)?;
    SockRef::from(tcp).set_tcp_keepalive(&TcpKeepalive::new().with_time(TCP_KEEPALIVE))
}

#[inline]
fn is_https(uri: &Uri) -> bool {
    uri.scheme_str() == Some("https")
}

/// Explicit port if the URL has one, else the scheme's default.
fn port_for(uri: &Uri) -> u16 {
    uri.port_u16()
        .unwrap_or(if is_https(uri) { 443 } else { 80 })
}

/// IPv6 literals come bracketed out of a `Uri`.
fn bare_host(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

pin_project! {
    #[project = MaybeTlsProj]
    pub enum MaybeTlsStream {
        Plain { #[pin] tcp: TcpStream },
        Tls { #[pin] tls: TlsStream<TcpStream> },
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsProj::Plain { tcp } => tcp.poll_read(cx, buf),
            MaybeTlsProj::Tls { tls } => tls.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            MaybeTlsProj::Plain { tcp } => tcp.poll_write(cx, buf),
            MaybeTlsProj::Tls { tls } => tls.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsProj::Plain { tcp } => tcp.poll_flush(cx),
            MaybeTlsProj::Tls { tls } => tls.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsProj::Plain { tcp } => tcp.poll_shutdown(cx),
            MaybeTlsProj::Tls { tls } => tls.poll_shutdown(cx),
        }
    }
}

/// A connected stream as hyper sees it.
pub struct Dialed {
    io: TokioIo<MaybeTlsStream>,
}

impl Dialed {
    fn new(stream: MaybeTlsStream) -> Self {
        Self {
            io: TokioIo::new(stream),
        }
    }

    #[must_use]
    pub fn is_tls(&self) -> bool {
        matches!(self.io.inner(), MaybeTlsStream::Tls { .. })
    }
}

impl hyper::rt::Read for Dialed {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        hyper::rt::Read::poll_read(Pin::new(&mut self.io), cx, buf)
    }
}

impl hyper::rt::Write for Dialed {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        hyper::rt::Write::poll_write(Pin::new(&mut self.io), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_flush(Pin::new(&mut self.io), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_shutdown(Pin::new(&mut self.io), cx)
    }
}

impl Connection for Dialed {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}
