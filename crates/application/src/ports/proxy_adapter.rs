use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProxyStream for T {}

/// Outbound proxy able to open TCP streams on behalf of DNS clients.
#[async_trait]
pub trait ProxyAdapter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn dial_tcp(&self, host: &str, port: u16) -> io::Result<Box<dyn ProxyStream>>;

    /// URL usable by HTTP clients (`http://`, `socks5://`), if the proxy has one.
    fn http_proxy_url(&self) -> Option<String> {
        None
    }
}

/// Resolves proxy names used in server URLs.
pub trait ProxyProvider: Send + Sync {
    fn proxy(&self, name: &str) -> Option<Arc<dyn ProxyAdapter>>;
}
