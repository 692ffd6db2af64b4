//! S3 client: request pipeline and bucket/object operations
//!
//! Every call goes through [`S3Client::request`]:
//! URL assembly → header merge → signing → `+` re-encoding → trace → send →
//! collect body → trace. Status checks and error decoding happen per operation.

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, ETAG};
use hyper::{HeaderMap, Method, StatusCode};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

use super::error::{Result, S3Error};
use super::request::OutgoingRequest;
use super::signer::RequestSigner;
use super::trace::Tracer;
use super::transport::HttpClient;
use super::types::{Bucket, CannedAcl, Grant, Object};
use super::upload::Upload;
use super::validation::validate_bucket_name;
use super::xml;
use crate::config::{Addressing, ClientConfig};

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

const X_AMZ_ACL: HeaderName = HeaderName::from_static("x-amz-acl");

/// Status, headers and fully collected body of one exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    /// Pass the response through when it has the `expected` status,
    /// otherwise decode its `<Error>` body.
    pub fn expect(self, expected: StatusCode) -> Result<Self> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    pub fn into_error(self) -> S3Error {
        match xml::parse_error(&self.body) {
            Ok(err) => S3Error::Response {
                status: self.status,
                code: err.code,
                message: err.message,
                raw: String::from_utf8_lossy(&self.body).into_owned(),
            },
            Err(e) => e,
        }
    }

    /// `ETag` response header, verbatim
    pub fn etag(&self) -> Option<&str> {
        self.headers.get(ETAG).and_then(|v| v.to_str().ok())
    }
}

/// S3 client
///
/// Clone is cheap - the underlying HTTP client and signer are shared.
#[derive(Clone, Debug)]
pub struct S3Client {
    http: HttpClient,
    signer: Arc<RequestSigner>,
    bucket: Option<String>,
    domain: String,
    protocol: String,
    addressing: Addressing,
    tracer: Tracer,
}

impl S3Client {
    /// Build a client; the wire trace defaults to `S3_TRACE_LEVEL` on stderr.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        if config.domain.is_empty() {
            return Err(S3Error::Config("endpoint domain is empty".to_string()));
        }
        let signer = RequestSigner::new(config.signature_version, config.credentials(), &config.region)?;
        let http = HttpClient::new(config)?;

        Ok(Self {
            http,
            signer: Arc::new(signer),
            bucket: config.bucket.clone().filter(|b| !b.is_empty()),
            domain: config.domain.trim_end_matches('/').to_string(),
            protocol: if config.protocol.is_empty() {
                "https".to_string()
            } else {
                config.protocol.clone()
            },
            addressing: config.addressing(),
            tracer: Tracer::from_env(),
        })
    }

    /// Replace the wire trace sink and level
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Override the bucket name
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into()).filter(|b| !b.is_empty());
        self
    }

    /// A clone addressing the service rather than a bucket
    pub fn without_bucket(mut self) -> Self {
        self.bucket = None;
        self
    }

    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    pub fn signature_version(&self) -> u8 {
        self.signer.version()
    }

    /// Encode an S3 key, preserving forward slashes
    /// Returns Cow::Borrowed when no encoding is needed (common case = zero allocation)
    fn encode_s3_key(key: &str) -> Cow<'_, str> {
        let needs_encoding = key
            .bytes()
            .any(|b| !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/'));

        if !needs_encoding {
            return Cow::Borrowed(key);
        }

        let mut result = String::with_capacity(key.len() + 32);
        for byte in key.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                    result.push(byte as char);
                }
                _ => {
                    result.push('%');
                    result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
        Cow::Owned(result)
    }

    /// Absolute URL for `path` (an unencoded object path) and a raw query
    pub fn url(&self, path: &str, query: &str) -> String {
        let encoded = Self::encode_s3_key(path);
        let mut url = String::with_capacity(
            self.protocol.len() + self.domain.len() + encoded.len() + query.len() + 72,
        );
        url.push_str(&self.protocol);
        url.push_str("://");

        match (&self.bucket, self.addressing) {
            (Some(bucket), Addressing::VirtualHost) => {
                url.push_str(bucket);
                url.push('.');
                url.push_str(&self.domain);
            }
            (Some(bucket), Addressing::Path) => {
                url.push_str(&self.domain);
                url.push('/');
                url.push_str(bucket);
            }
            (None, _) => url.push_str(&self.domain),
        }

        if !encoded.starts_with('/') {
            url.push('/');
        }
        url.push_str(&encoded);

        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Bucket named in the V2 canonical resource (virtual-host style only)
    fn resource_bucket(&self) -> Option<&str> {
        match self.addressing {
            Addressing::VirtualHost => self.bucket.as_deref(),
            Addressing::Path => None,
        }
    }

    /// Sign, send and collect one request.
    ///
    /// Any status is returned as-is; callers decide what counts as success.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<RawResponse> {
        let url = self.url(path, query);
        let mut req = OutgoingRequest::new(method, &url, body);
        req.headers.extend(headers);
        req.headers.insert(CONTENT_LENGTH, HeaderValue::from(req.body.len()));

        self.signer.sign(&mut req, self.resource_bucket())?;
        req.escape_query_plus();
        self.tracer.request(&req);

        debug!(method = %req.method, url = %req.url(), bytes = req.body.len(), "sending S3 request");

        let response = self.http.request(req.into_hyper()?).await?;
        let (parts, incoming) = response.into_parts();
        let body = incoming.collect().await?.to_bytes();

        self.tracer.response(parts.status, &parts.headers, &body);
        debug!(status = %parts.status, bytes = body.len(), "received S3 response");

        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &str,
        headers: HeaderMap,
        body: Bytes,
        expected: StatusCode,
    ) -> Result<RawResponse> {
        self.request(method, path, query, headers, body)
            .await?
            .expect(expected)
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Fetch one ListObjectsV2 page; `token` is appended verbatim.
    pub async fn list_page(&self, token: Option<&str>) -> Result<xml::ListPage> {
        let mut query = String::from("list-type=2&fetch-owner=true");
        if let Some(token) = token {
            query.push_str("&continuation-token=");
            query.push_str(token);
        }

        let response = self
            .call(Method::GET, "/", &query, HeaderMap::new(), Bytes::new(), StatusCode::OK)
            .await?;
        xml::parse_list_page(&response.body)
    }

    /// Every object in the bucket, in server order.
    ///
    /// A failing page aborts the listing; objects from earlier pages are dropped.
    pub async fn list(&self) -> Result<Vec<Object>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.list_page(token.as_deref()).await?;
            pages += 1;
            objects.extend(page.objects);
            match page.next_continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!(pages, objects = objects.len(), "listing complete");
        Ok(objects)
    }

    /// Buckets owned by the caller (service-level `GET /`)
    pub async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let service = self.clone().without_bucket();
        let response = service
            .call(Method::GET, "/", "", HeaderMap::new(), Bytes::new(), StatusCode::OK)
            .await?;
        xml::parse_buckets(&response.body)
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Get object from S3 - returns Bytes (zero-copy, no .to_vec() needed)
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let response = self
            .call(Method::GET, key, "", HeaderMap::new(), Bytes::new(), StatusCode::OK)
            .await?;
        Ok(response.body)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.call(
            Method::DELETE,
            path,
            "",
            HeaderMap::new(),
            Bytes::new(),
            StatusCode::NO_CONTENT,
        )
        .await?;
        Ok(())
    }

    pub async fn get_acl(&self, key: &str) -> Result<Vec<Grant>> {
        let response = self
            .call(Method::GET, key, "acl", HeaderMap::new(), Bytes::new(), StatusCode::OK)
            .await?;
        xml::parse_acl(&response.body)
    }

    /// Apply a canned ACL to an object
    pub async fn change_acl(&self, path: &str, acl: CannedAcl) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(X_AMZ_ACL, HeaderValue::from_static(acl.as_str()));
        self.call(Method::PUT, path, "acl", headers, Bytes::new(), StatusCode::OK)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    /// Create bucket `name`; the name is checked before anything is sent.
    pub async fn create_bucket(&self, name: &str, region: Option<&str>, acl: CannedAcl) -> Result<()> {
        validate_bucket_name(name)?;

        let body = match region.filter(|r| !r.is_empty()) {
            Some(region) => Bytes::from(xml::create_bucket_body(region)),
            None => Bytes::new(),
        };
        let mut headers = HeaderMap::new();
        headers.insert(X_AMZ_ACL, HeaderValue::from_static(acl.as_str()));

        let scoped = self.clone().with_bucket(name);
        scoped
            .call(Method::PUT, "/", "", headers, body, StatusCode::OK)
            .await?;
        debug!(bucket = name, "bucket created");
        Ok(())
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        let scoped = self.clone().with_bucket(name);
        scoped
            .call(
                Method::DELETE,
                "/",
                "",
                HeaderMap::new(),
                Bytes::new(),
                StatusCode::NO_CONTENT,
            )
            .await?;
        debug!(bucket = name, "bucket deleted");
        Ok(())
    }

    // =========================================================================
    // Multipart Upload Operations
    // =========================================================================

    /// Initiate a multipart upload (CreateMultipartUpload) to `path`.
    ///
    /// `headers` (content type, canned ACL, metadata) go on the initiation request.
    pub async fn new_upload(&self, path: &str, headers: HeaderMap) -> Result<Upload> {
        let response = self
            .call(Method::POST, path, "uploads", headers, Bytes::new(), StatusCode::OK)
            .await?;
        let init = xml::parse_initiate_upload(&response.body)?;
        debug!(path, key = %init.key, upload_id = %init.upload_id, "multipart upload initiated");
        Ok(Upload::new(self.clone(), path, init.key, init.upload_id))
    }
}
