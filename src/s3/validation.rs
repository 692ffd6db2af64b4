//! Local checks that run before a request is signed.

use super::error::{Result, S3Error};

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Validate a bucket name for creation.
///
/// Rules:
/// - 3-63 characters long
/// - Only lowercase letters, numbers and hyphens (no periods, so the name
///   stays valid under a wildcard TLS certificate)
/// - Must start and end with a letter or number
///
/// ```
/// use s2d3::s3::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("valid-bucket-1").is_ok());
/// assert!(validate_bucket_name("ab").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = |reason: &'static str| S3Error::InvalidBucketName {
        name: name.to_owned(),
        reason,
    };

    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&name.len()) {
        return Err(invalid("must be between 3 and 63 characters long"));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid("must only contain lowercase letters, numbers and hyphens"));
    }

    let first = name.as_bytes()[0];
    let last = name.as_bytes()[name.len() - 1];
    if first == b'-' || last == b'-' {
        return Err(invalid("must start and end with a letter or number"));
    }

    Ok(())
}
