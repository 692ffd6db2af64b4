//! Command-line front end
//!
//! Each subcommand maps to one `cmd_*` function over a configured
//! [`S3Client`](crate::s3::S3Client). Object paths are given as
//! `s3://bucket/key` or as a bare key resolved against the profile's bucket.
//!
//! ```bash
//! s2d3 --profile minio ls s3://photos/2024/
//! s2d3 put ./disk.img s3://backups/disk.img --block-size 16 --workers 8
//! s2d3 set-acl s3://photos/cat.jpg public-read
//! ```

pub mod commands;

pub use commands::{parse_target, Target};
