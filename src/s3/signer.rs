//! AWS request signing, Signature Version 2 and Version 4
//!
//! - V4 keeps pre-computed AWS4+secret_key bytes and a daily signing key cache
//!   (avoids 4 HMAC operations per request)
//! - Constant empty payload hash (avoids SHA256 for empty bodies)
//! - Fixed-size [u8; 32] arrays instead of Vec<u8> for HMAC results

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hyper::header::{HeaderName, HeaderValue, AUTHORIZATION, HOST};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use super::canonical;
use super::error::{Result, S3Error};
use super::request::OutgoingRequest;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Pre-computed SHA256 hash of empty payload (avoids hashing empty body on every GET/DELETE)
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const V4_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

const X_AMZ_DATE: HeaderName = HeaderName::from_static("x-amz-date");
const X_AMZ_CONTENT_SHA256: HeaderName = HeaderName::from_static("x-amz-content-sha256");
const X_AMZ_SECURITY_TOKEN: HeaderName = HeaderName::from_static("x-amz-security-token");

/// Access key pair plus an optional STS session token
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    fn token(&self) -> Option<&str> {
        self.session_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Signing scheme chosen once when the client is built
#[derive(Debug)]
pub enum RequestSigner {
    V2(SignerV2),
    V4(SignerV4),
}

impl RequestSigner {
    /// Resolve the signer for `version` (2 or 4).
    pub fn new(version: u8, credentials: Credentials, region: &str) -> Result<Self> {
        match version {
            2 => Ok(RequestSigner::V2(SignerV2::new(credentials))),
            4 => Ok(RequestSigner::V4(SignerV4::new(credentials, region)?)),
            other => Err(S3Error::UnsupportedSignatureVersion(other)),
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            RequestSigner::V2(_) => 2,
            RequestSigner::V4(_) => 4,
        }
    }

    /// Sign `req` with the current time.
    ///
    /// `bucket` is the virtual-host bucket, used only by the V2 resource.
    pub fn sign(&self, req: &mut OutgoingRequest, bucket: Option<&str>) -> Result<()> {
        self.sign_at(req, bucket, Utc::now())
    }

    /// Sign `req` as if it were sent at `now`.
    pub fn sign_at(
        &self,
        req: &mut OutgoingRequest,
        bucket: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self {
            RequestSigner::V2(signer) => signer.sign_at(req, bucket, now),
            RequestSigner::V4(signer) => signer.sign_at(req, now),
        }
    }
}

fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

fn set_header(req: &mut OutgoingRequest, name: HeaderName, value: &str) -> Result<()> {
    req.headers.insert(name, HeaderValue::from_str(value)?);
    Ok(())
}

fn header_str<'a>(req: &'a OutgoingRequest, name: &str) -> &'a str {
    req.headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// AWS Signature Version 2 signer (HMAC-SHA1)
#[derive(Debug, Clone)]
pub struct SignerV2 {
    credentials: Credentials,
}

impl SignerV2 {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn sign_at(
        &self,
        req: &mut OutgoingRequest,
        bucket: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        set_header(req, X_AMZ_DATE, &amz_date(now))?;
        let hostname = req.hostname().to_string();
        set_header(req, HOST, &hostname)?;
        if let Some(token) = self.credentials.token() {
            set_header(req, X_AMZ_SECURITY_TOKEN, token)?;
        }

        let string_to_sign = self.string_to_sign(req, bucket);
        let signature = self.signature(&string_to_sign);
        let authorization = format!("AWS {}:{}", self.credentials.access_key_id, signature);
        set_header(req, AUTHORIZATION, &authorization)
    }

    fn string_to_sign(&self, req: &OutgoingRequest, bucket: Option<&str>) -> String {
        let mut s = String::with_capacity(256);
        s.push_str(req.method.as_str());
        s.push('\n');
        s.push_str(header_str(req, "content-md5"));
        s.push('\n');
        s.push_str(header_str(req, "content-type"));
        s.push('\n');
        s.push_str(header_str(req, "date"));
        s.push('\n');
        s.push_str(&canonical::v2_headers(&req.headers));
        s.push_str(&canonical::v2_resource(bucket, &req.path, &req.query));
        s
    }

    fn signature(&self, string_to_sign: &str) -> String {
        let mut mac = <HmacSha1 as Mac>::new_from_slice(self.credentials.secret_access_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

/// AWS Signature Version 4 signer
pub struct SignerV4 {
    credentials: Credentials,
    region: String,
    /// Pre-computed "AWS4" + secret_key as bytes (avoids format!() per sign call)
    aws4_key: Vec<u8>,
    /// Cached signing key per day: (date_stamp, derived_key)
    cached_signing_key: Mutex<Option<(String, [u8; 32])>>,
}

impl fmt::Debug for SignerV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerV4")
            .field("credentials", &self.credentials)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl Clone for SignerV4 {
    fn clone(&self) -> Self {
        Self {
            credentials: self.credentials.clone(),
            region: self.region.clone(),
            aws4_key: self.aws4_key.clone(),
            // Each clone gets its own cache (populated on first use)
            cached_signing_key: Mutex::new(None),
        }
    }
}

impl SignerV4 {
    pub fn new(credentials: Credentials, region: &str) -> Result<Self> {
        if region.is_empty() {
            return Err(S3Error::Config(
                "signature version 4 requires a region".to_string(),
            ));
        }
        let aws4_key = format!("AWS4{}", credentials.secret_access_key).into_bytes();
        Ok(Self {
            credentials,
            region: region.to_string(),
            aws4_key,
            cached_signing_key: Mutex::new(None),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn sign_at(&self, req: &mut OutgoingRequest, now: DateTime<Utc>) -> Result<()> {
        let amz_date = amz_date(now);
        let date_stamp = now.format("%Y%m%d").to_string();

        set_header(req, X_AMZ_DATE, &amz_date)?;
        let host = req.host.clone();
        set_header(req, HOST, &host)?;
        if let Some(token) = self.credentials.token() {
            set_header(req, X_AMZ_SECURITY_TOKEN, token)?;
        }

        let payload_hash = if req.body.is_empty() {
            EMPTY_SHA256.to_string()
        } else {
            hex::encode(Sha256::digest(&req.body))
        };
        set_header(req, X_AMZ_CONTENT_SHA256, &payload_hash)?;

        let (signed_headers, header_block) = canonical::v4_headers(&req.headers);
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}",
            req.method,
            canonical::v4_path(&req.path),
            canonical::v4_query_string(&req.query),
            header_block,
            payload_hash
        );

        let scope = format!("{}/{}/{}/aws4_request", date_stamp, self.region, SERVICE);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            V4_ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self.calculate_signature(&date_stamp, &string_to_sign);
        let authorization = format!(
            "{} Credential={}/{},SignedHeaders={},Signature={}",
            V4_ALGORITHM, self.credentials.access_key_id, scope, signed_headers, signature
        );
        set_header(req, AUTHORIZATION, &authorization)
    }

    /// Calculate the signature with daily signing key cache
    fn calculate_signature(&self, date_stamp: &str, string_to_sign: &str) -> String {
        let signing_key = {
            let mut cache = self
                .cached_signing_key
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match cache.as_ref() {
                Some((cached_date, cached_key)) if cached_date == date_stamp => *cached_key,
                _ => {
                    let key = derive_signing_key(&self.aws4_key, date_stamp, &self.region, SERVICE);
                    *cache = Some((date_stamp.to_string(), key));
                    key
                }
            }
        };

        hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
    }
}

/// Derive signing key from date stamp (4 chained HMAC operations)
fn derive_signing_key(aws4_key: &[u8], date_stamp: &str, region: &str, service: &str) -> [u8; 32] {
    let k_date = hmac_sha256(aws4_key, date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// HMAC-SHA256 returning fixed-size array (no heap allocation)
fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    let result = mac.finalize().into_bytes();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}
