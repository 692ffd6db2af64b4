//! HTTP(S) transport: direct or through a SOCKS5 proxy
//!
//! - HTTP/1.1 only
//! - TCP_NODELAY, 90s keepalive, 10s connect timeout
//! - native-tls (OpenSSL) with optional custom roots and skip-verify

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::proxy::SocksV5;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Builder, Client as HyperClient, ResponseFuture};
use hyper_util::rt::TokioExecutor;
use native_tls::{Certificate, TlsConnector};
use std::time::Duration;

use super::error::Result;
use crate::config::ClientConfig;

type DirectClient = HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>;
type SocksClient = HyperClient<HttpsConnector<SocksV5<HttpConnector>>, Full<Bytes>>;

/// Pooled HTTP client. Clone is cheap; clones share the pool.
#[derive(Clone, Debug)]
pub enum HttpClient {
    Direct(DirectClient),
    Socks(SocksClient),
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let tls = tls_connector(config)?;
        let builder = pool_builder();

        match config.socks5_proxy.as_deref().filter(|p| !p.is_empty()) {
            Some(proxy) => {
                let proxy_uri = socks5_uri(proxy)?;
                tracing::debug!(proxy = %proxy_uri, "routing S3 traffic through SOCKS5 proxy");
                let socks = SocksV5::new(proxy_uri, tcp_connector());
                let https = HttpsConnector::from((socks, tls.into()));
                Ok(HttpClient::Socks(builder.build(https)))
            }
            None => {
                let https = HttpsConnector::from((tcp_connector(), tls.into()));
                Ok(HttpClient::Direct(builder.build(https)))
            }
        }
    }

    pub fn request(&self, request: Request<Full<Bytes>>) -> ResponseFuture {
        match self {
            HttpClient::Direct(client) => client.request(request),
            HttpClient::Socks(client) => client.request(request),
        }
    }
}

/// Configure TCP connector with performance settings
fn tcp_connector() -> HttpConnector {
    let mut http = HttpConnector::new();
    http.set_nodelay(true);
    http.enforce_http(false);
    http.set_connect_timeout(Some(Duration::from_secs(10)));
    http.set_keepalive(Some(Duration::from_secs(90)));
    http
}

fn pool_builder() -> Builder {
    let mut builder = HyperClient::builder(TokioExecutor::new());
    builder
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(64)
        .set_host(true);
    builder
}

/// Build TLS connector using native-tls (OpenSSL)
fn tls_connector(config: &ClientConfig) -> Result<TlsConnector> {
    let mut builder = TlsConnector::builder();

    if config.skip_system_cas {
        builder.disable_built_in_roots(true);
    }
    for pem in &config.ca_certificates {
        builder.add_root_certificate(Certificate::from_pem(pem.as_bytes())?);
    }
    if config.insecure_skip_verify {
        tracing::warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    Ok(builder.build()?)
}

/// `host:port` or a full `socks5://host:port` URI
fn socks5_uri(proxy: &str) -> Result<Uri> {
    if proxy.contains("://") {
        Ok(proxy.parse()?)
    } else {
        Ok(format!("socks5://{}", proxy).parse()?)
    }
}
