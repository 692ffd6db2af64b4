//! S3 record types and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grantee URI of the well-known "all users" group.
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Object size with a compact, human-readable `Display`.
///
/// Units are powers of two and values are truncated: `2047` prints as `1k`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SizeInBytes(pub u64);

impl SizeInBytes {
    const KIB: u64 = 1 << 10;
    const MIB: u64 = 1 << 20;
    const GIB: u64 = 1 << 30;
    const TIB: u64 = 1 << 40;
    const PIB: u64 = 1 << 50;
    const EIB: u64 = 1 << 60;

    pub fn bytes(self) -> String {
        format!("{}b", self.0)
    }

    pub fn kilobytes(self) -> String {
        format!("{}k", self.0 / Self::KIB)
    }

    pub fn megabytes(self) -> String {
        format!("{}m", self.0 / Self::MIB)
    }

    pub fn gigabytes(self) -> String {
        format!("{}g", self.0 / Self::GIB)
    }

    pub fn terabytes(self) -> String {
        format!("{}t", self.0 / Self::TIB)
    }

    pub fn petabytes(self) -> String {
        format!("{}p", self.0 / Self::PIB)
    }

    pub fn exabytes(self) -> String {
        format!("{}x", self.0 / Self::EIB)
    }
}

impl fmt::Display for SizeInBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = match self.0 {
            n if n < Self::KIB => self.bytes(),
            n if n < Self::MIB => self.kilobytes(),
            n if n < Self::GIB => self.megabytes(),
            n if n < Self::TIB => self.gigabytes(),
            n if n < Self::PIB => self.terabytes(),
            n if n < Self::EIB => self.petabytes(),
            _ => self.exabytes(),
        };
        f.write_str(&formatted)
    }
}

impl From<u64> for SizeInBytes {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// S3 Object metadata, as returned by ListObjectsV2 with `fetch-owner=true`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    /// Object key
    pub key: String,
    /// Last modified timestamp; `None` when the server sent something unparseable
    pub last_modified: Option<DateTime<Utc>>,
    /// ETag without its surrounding quotes
    pub etag: String,
    pub size: SizeInBytes,
    /// Storage class (STANDARD, STANDARD_IA, GLACIER, etc.)
    pub storage_class: String,
    pub owner_id: String,
    pub owner_name: String,
}

impl Object {
    /// Create a new Object with only a key and size
    pub fn new(key: String, size: u64) -> Self {
        Self {
            key,
            last_modified: None,
            etag: String::new(),
            size: SizeInBytes(size),
            storage_class: String::new(),
            owner_id: String::new(),
            owner_name: String::new(),
        }
    }
}

/// Bucket entry from ListAllMyBuckets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub owner_id: String,
    pub owner_name: String,
}

/// Named group a grant applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GranteeGroup {
    #[serde(rename = "EVERYONE")]
    Everyone,
}

impl fmt::Display for GranteeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GranteeGroup::Everyone => f.write_str("EVERYONE"),
        }
    }
}

/// One entry of an object or bucket access control list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub grantee_id: String,
    pub grantee_name: String,
    pub group: Option<GranteeGroup>,
    /// READ, WRITE, READ_ACP, WRITE_ACP or FULL_CONTROL
    pub permission: String,
}

impl Grant {
    /// Build a grant, mapping the well-known group URI to its tag
    pub fn new(grantee_id: String, grantee_name: String, uri: &str, permission: String) -> Self {
        let group = (uri == ALL_USERS_URI).then_some(GranteeGroup::Everyone);
        Self {
            grantee_id,
            grantee_name,
            group,
            permission,
        }
    }
}

/// Decoded `<Error>` response body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Canned ACLs accepted by `x-amz-acl`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CannedAcl {
    #[default]
    Private,
    PublicRead,
    PublicReadWrite,
    AwsExecRead,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
    LogDeliveryWrite,
}

impl CannedAcl {
    pub const ALL: [CannedAcl; 8] = [
        CannedAcl::Private,
        CannedAcl::PublicRead,
        CannedAcl::PublicReadWrite,
        CannedAcl::AwsExecRead,
        CannedAcl::AuthenticatedRead,
        CannedAcl::BucketOwnerRead,
        CannedAcl::BucketOwnerFullControl,
        CannedAcl::LogDeliveryWrite,
    ];

    /// Wire value for the `x-amz-acl` header
    pub fn as_str(self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
            CannedAcl::AwsExecRead => "aws-exec-read",
            CannedAcl::AuthenticatedRead => "authenticated-read",
            CannedAcl::BucketOwnerRead => "bucket-owner-read",
            CannedAcl::BucketOwnerFullControl => "bucket-owner-full-control",
            CannedAcl::LogDeliveryWrite => "log-delivery-write",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CannedAcl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CannedAcl::ALL
            .into_iter()
            .find(|acl| acl.as_str() == s)
            .ok_or_else(|| format!("unknown canned ACL '{}'", s))
    }
}

// =============================================================================
// Multipart Upload Types
// =============================================================================

/// Response from CreateMultipartUpload operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMultipartUploadResponse {
    /// Bucket name
    pub bucket: String,
    /// Object key
    pub key: String,
    /// Upload ID for subsequent UploadPart and CompleteMultipartUpload requests
    pub upload_id: String,
}

impl CreateMultipartUploadResponse {
    /// Create a new response
    pub fn new(bucket: String, key: String, upload_id: String) -> Self {
        Self { bucket, key, upload_id }
    }
}

/// Part information for CompleteMultipartUpload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// Part number (1-10000)
    pub part_number: u32,
    /// ETag returned from UploadPart, verbatim
    pub etag: String,
}

impl CompletedPart {
    /// Create a new completed part
    pub fn new(part_number: u32, etag: String) -> Self {
        Self { part_number, etag }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_formatting() {
        assert_eq!(SizeInBytes(0).to_string(), "0b");
        assert_eq!(SizeInBytes(512).to_string(), "512b");
        assert_eq!(SizeInBytes(1023).to_string(), "1023b");
        assert_eq!(SizeInBytes(2048).to_string(), "2k");
        assert_eq!(SizeInBytes(2047).to_string(), "1k");
        assert_eq!(SizeInBytes(5_242_880).to_string(), "5m");
        assert_eq!(SizeInBytes(3 << 30).to_string(), "3g");
        assert_eq!(SizeInBytes(u64::MAX).to_string(), "15x");
    }

    #[test]
    fn test_size_unit_boundaries() {
        assert_eq!(SizeInBytes(1 << 10).to_string(), "1k");
        assert_eq!(SizeInBytes(1 << 20).to_string(), "1m");
        assert_eq!(SizeInBytes(1 << 30).to_string(), "1g");
        assert_eq!(SizeInBytes(1 << 40).to_string(), "1t");
        assert_eq!(SizeInBytes(1 << 50).to_string(), "1p");
        assert_eq!(SizeInBytes(1 << 60).to_string(), "1x");
    }

    #[test]
    fn test_canned_acl_round_trips_through_wire_name() {
        for acl in CannedAcl::ALL {
            assert_eq!(acl.as_str().parse::<CannedAcl>(), Ok(acl));
        }
        assert!("public".parse::<CannedAcl>().is_err());
    }

    #[test]
    fn test_grant_maps_all_users_group() {
        let everyone = Grant::new(String::new(), String::new(), ALL_USERS_URI, "READ".into());
        assert_eq!(everyone.group, Some(GranteeGroup::Everyone));

        let owner = Grant::new("id".into(), "me".into(), "", "FULL_CONTROL".into());
        assert_eq!(owner.group, None);
    }
}
