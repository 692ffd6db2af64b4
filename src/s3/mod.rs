//! S3 client module with AWS SigV2/SigV4 signing
//!
//! This module provides:
//! - Canonical request forms and the two signature algorithms
//! - The request pipeline (sign, trace, send) over direct or SOCKS5 transport
//! - Listing, object, ACL and bucket operations
//! - Multipart upload sessions with bounded-parallel streaming

pub mod canonical;
pub mod client;
pub mod error;
pub mod request;
pub mod signer;
pub mod trace;
pub mod transport;
pub mod types;
pub mod upload;
pub mod validation;
pub mod xml;

// Re-export main types for convenience
pub use client::{RawResponse, S3Client};
pub use error::{Result, S3Error};
pub use signer::{Credentials, RequestSigner};
pub use trace::{TraceLevel, Tracer};
pub use types::{Bucket, CannedAcl, CompletedPart, Grant, GranteeGroup, Object, SizeInBytes};
pub use upload::{Upload, MAX_PARTS, MIN_BLOCK_SIZE};
pub use xml::ListPage;
