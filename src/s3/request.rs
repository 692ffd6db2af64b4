//! The raw request handed to the signer and then to the transport

use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Method, Request};

use super::error::Result;

/// An outgoing S3 request before it is turned into a `hyper::Request`.
///
/// Signers add `host`, `x-amz-date`, `x-amz-content-sha256` and the security
/// token to `headers` in place.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub scheme: String,
    /// Authority as written in the URL, port included
    pub host: String,
    /// Path as written in the URL (already percent-encoded)
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutgoingRequest {
    /// Split `url` into its parts without a full URL parse.
    ///
    /// The query is kept byte-for-byte; continuation tokens may carry
    /// characters that a normalizing parser would rewrite.
    pub fn new(method: Method, url: &str, body: Bytes) -> Self {
        let (scheme, after_scheme) = match url.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("https", url),
        };

        // Split authority from path+query at first '/'
        let (authority, path_and_query) = match after_scheme.find(['/', '?']) {
            Some(pos) => (&after_scheme[..pos], &after_scheme[pos..]),
            None => (after_scheme, "/"),
        };

        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path_and_query, ""),
        };
        let path = if path.is_empty() { "/" } else { path };

        Self {
            method,
            scheme: scheme.to_string(),
            host: authority.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Host without any `:port` suffix
    pub fn hostname(&self) -> &str {
        match self.host.find(':') {
            Some(pos) => &self.host[..pos],
            None => &self.host,
        }
    }

    /// Path plus `?query` when there is one
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path_and_query())
    }

    /// Re-encode literal `+` in the query so servers do not read it as a space.
    ///
    /// Must run after signing: the canonical query already encodes `+`.
    pub fn escape_query_plus(&mut self) {
        if self.query.contains('+') {
            self.query = self.query.replace('+', "%2B");
        }
    }

    pub fn into_hyper(self) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder().method(self.method.clone()).uri(self.url());
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        Ok(builder.body(Full::new(self.body))?)
    }
}
