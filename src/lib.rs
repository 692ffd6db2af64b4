//! s2d3 - S3-compatible object storage client
//!
//! Signs requests with AWS Signature Version 2 or 4, follows paginated
//! listings, and streams multipart uploads through a bounded pool of workers.

pub mod cli;
pub mod config;
pub mod s3;

pub use config::{ClientConfig, Config};
pub use s3::{S3Client, S3Error};
