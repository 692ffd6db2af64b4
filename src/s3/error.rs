//! S3 client errors

use hyper::StatusCode;
use thiserror::Error;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Client error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] hyper::header::InvalidHeaderValue),

    /// Non-success status decoded from an `<Error>` body.
    #[error("{message} ({code}) [raw {raw}]")]
    Response {
        status: StatusCode,
        code: String,
        message: String,
        raw: String,
    },

    /// The error body of a non-success response could not be decoded.
    #[error("unable to parse response xml: {0}")]
    ErrorBody(String),

    /// A success body could not be decoded.
    #[error("unable to parse {what}: {reason}")]
    XmlParse { what: &'static str, reason: String },

    #[error("invalid s3 bucket name '{name}': {reason}")]
    InvalidBucketName { name: String, reason: &'static str },

    #[error("S3 requires block sizes of 5MB or higher (got {0} bytes)")]
    BlockTooSmall(usize),

    #[error("S3 limits the number of multipart upload segments to 10k (part {0})")]
    TooManyParts(u32),

    #[error("part {0} was never reserved for this upload")]
    UnreservedPart(u32),

    #[error("part {0} has not been uploaded")]
    IncompletePart(u32),

    #[error("unrecognized aws/s3 signature version {0}")]
    UnsupportedSignatureVersion(u8),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("upload worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// A streaming upload stopped early; `transferred` bytes were dispatched.
    #[error("upload interrupted after {transferred} bytes: {source}")]
    Interrupted {
        transferred: u64,
        #[source]
        source: Box<S3Error>,
    },
}

impl From<quick_xml::Error> for S3Error {
    fn from(err: quick_xml::Error) -> Self {
        S3Error::XmlParse {
            what: "response body",
            reason: err.to_string(),
        }
    }
}

impl S3Error {
    /// HTTP status of a protocol error, if this is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            S3Error::Response { status, .. } => Some(*status),
            S3Error::Interrupted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// S3 error code (`NoSuchKey`, `AccessDenied`, ...) of a protocol error.
    pub fn code(&self) -> Option<&str> {
        match self {
            S3Error::Response { code, .. } => Some(code),
            S3Error::Interrupted { source, .. } => source.code(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;
