use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::HeaderMap;
use std::fmt::Write as FmtWrite;
use std::io::Write;
use std::path::Path;

use crate::s3::{Bucket, CannedAcl, Grant, Object, S3Client, MIN_BLOCK_SIZE};

/// Bucket and key named on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// `None` when the key was given without an `s3://bucket/` prefix
    pub bucket: Option<String>,
    pub key: String,
}

/// Parse `s3://bucket/key`, `s3/bucket/key` or a bare key.
pub fn parse_target(path: &str) -> Result<Target> {
    let path = path.trim();

    let stripped = match path.strip_prefix("s3://").or_else(|| path.strip_prefix("s3/")) {
        Some(p) => p,
        None => {
            return Ok(Target {
                bucket: None,
                key: path.trim_start_matches('/').to_string(),
            })
        }
    };

    let (bucket, key) = stripped.split_once('/').unwrap_or((stripped, ""));
    if bucket.is_empty() {
        anyhow::bail!("Bucket name cannot be empty");
    }

    Ok(Target {
        bucket: Some(bucket.to_string()),
        key: key.to_string(),
    })
}

/// Client scoped to the target's bucket, falling back to the configured one
fn scoped(client: &S3Client, target: &Target) -> Result<S3Client> {
    match (&target.bucket, client.bucket()) {
        (Some(bucket), _) => Ok(client.clone().with_bucket(bucket.clone())),
        (None, Some(_)) => Ok(client.clone()),
        (None, None) => anyhow::bail!("No bucket given: use s3://bucket/key, --bucket or the profile's bucket"),
    }
}

/// Write formatted date directly to a fmt::Write [YYYY-MM-DD HH:MM:SS UTC]
fn write_date(w: &mut dyn std::fmt::Write, date: Option<&DateTime<Utc>>) {
    match date {
        Some(date) => {
            let _ = write!(w, "{}", date.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => {
            let _ = w.write_str("                       "); // blank placeholder matching width
        }
    }
}

/// One `ls` line: date, size, storage class, key
pub fn format_object(obj: &Object) -> String {
    let mut line = String::with_capacity(64 + obj.key.len());
    line.push('[');
    write_date(&mut line, obj.last_modified.as_ref());
    let _ = write!(line, "] {:>6} {:<12} {}", obj.size.to_string(), obj.storage_class, obj.key);
    line
}

pub fn format_bucket(bucket: &Bucket) -> String {
    let mut line = String::with_capacity(48 + bucket.name.len());
    line.push('[');
    write_date(&mut line, bucket.creation_date.as_ref());
    let _ = write!(line, "] {}/", bucket.name);
    line
}

pub fn format_grant(grant: &Grant) -> String {
    let grantee = match (&grant.group, grant.grantee_name.is_empty()) {
        (Some(group), _) => group.to_string(),
        (None, false) => format!("{} ({})", grant.grantee_name, grant.grantee_id),
        (None, true) => grant.grantee_id.clone(),
    };
    format!("{:<12} {}", grant.permission, grantee)
}

/// List command
pub async fn cmd_ls(client: &S3Client, path: Option<&str>) -> Result<()> {
    let target = parse_target(path.unwrap_or(""))?;
    let client = scoped(client, &target)?;

    let objects = client.list().await.context("Failed to list objects")?;

    // Buffer stdout to avoid per-line flush syscalls
    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::with_capacity(64 * 1024, stdout.lock());
    let mut total = 0u64;
    for obj in objects.iter().filter(|o| o.key.starts_with(&target.key)) {
        writeln!(out, "{}", format_object(obj))?;
        total += obj.size.0;
    }
    out.flush()?;

    tracing::info!(objects = objects.len(), bytes = total, "listing finished");
    Ok(())
}

/// List buckets command
pub async fn cmd_buckets(client: &S3Client) -> Result<()> {
    let buckets = client.list_buckets().await.context("Failed to list buckets")?;
    for bucket in &buckets {
        println!("{}", format_bucket(bucket));
    }
    Ok(())
}

/// Download command: to `output`, or stdout when absent
pub async fn cmd_get(client: &S3Client, path: &str, output: Option<&Path>) -> Result<()> {
    let target = parse_target(path)?;
    let client = scoped(client, &target)?;

    let data = client
        .get(&target.key)
        .await
        .with_context(|| format!("Failed to get '{}'", target.key))?;

    match output {
        Some(file) => {
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(file, &data).await?;
            eprintln!("{} -> {} ({} bytes)", target.key, file.display(), data.len());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            out.write_all(&data)?;
            out.flush()?;
        }
    }
    Ok(())
}

/// Upload command: multipart stream of a local file
pub async fn cmd_put(
    client: &S3Client,
    file: &Path,
    path: &str,
    block_size_mib: usize,
    workers: usize,
    content_type: Option<&str>,
) -> Result<()> {
    let target = parse_target(path)?;
    let client = scoped(client, &target)?;
    if target.key.is_empty() {
        anyhow::bail!("Destination key cannot be empty");
    }

    let block_size = block_size_mib.saturating_mul(1024 * 1024);
    if block_size < MIN_BLOCK_SIZE {
        anyhow::bail!("Block size must be at least 5 MiB (got {} MiB)", block_size_mib);
    }

    let mut headers = HeaderMap::new();
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
    }

    let reader = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let upload = client
        .new_upload(&target.key, headers)
        .await
        .context("Failed to start multipart upload")?;
    let total = upload
        .parallel_stream(reader, block_size, workers)
        .await
        .with_context(|| format!("Upload {} failed", upload.id()))?;
    upload.done().await.context("Failed to complete multipart upload")?;

    println!(
        "{} -> {} ({} bytes in {} parts)",
        file.display(),
        upload.key(),
        total,
        upload.part_count()
    );
    Ok(())
}

/// Remove command
pub async fn cmd_rm(client: &S3Client, path: &str) -> Result<()> {
    let target = parse_target(path)?;
    let client = scoped(client, &target)?;
    client
        .delete(&target.key)
        .await
        .with_context(|| format!("Failed to delete '{}'", target.key))?;
    println!("Removed: {}", target.key);
    Ok(())
}

/// Make bucket command
pub async fn cmd_mb(client: &S3Client, bucket: &str, region: Option<&str>, acl: CannedAcl) -> Result<()> {
    let name = bucket.trim_start_matches("s3://").trim_end_matches('/');
    client.create_bucket(name, region, acl).await?;
    println!("Bucket created: s3://{}", name);
    Ok(())
}

/// Remove bucket command
pub async fn cmd_rb(client: &S3Client, bucket: &str) -> Result<()> {
    let name = bucket.trim_start_matches("s3://").trim_end_matches('/');
    client.delete_bucket(name).await?;
    println!("Bucket deleted: s3://{}", name);
    Ok(())
}

/// Show object ACL command
pub async fn cmd_acl(client: &S3Client, path: &str) -> Result<()> {
    let target = parse_target(path)?;
    let client = scoped(client, &target)?;
    let grants = client.get_acl(&target.key).await?;
    for grant in &grants {
        println!("{}", format_grant(grant));
    }
    Ok(())
}

/// Apply canned ACL command
pub async fn cmd_set_acl(client: &S3Client, path: &str, acl: CannedAcl) -> Result<()> {
    let target = parse_target(path)?;
    let client = scoped(client, &target)?;
    client.change_acl(&target.key, acl).await?;
    println!("{}: {}", target.key, acl);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::GranteeGroup;
    use chrono::TimeZone;

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("s3://mybucket/path/to/object.txt").unwrap(),
            Target {
                bucket: Some("mybucket".to_string()),
                key: "path/to/object.txt".to_string()
            }
        );
        assert_eq!(
            parse_target("s3/mybucket").unwrap(),
            Target {
                bucket: Some("mybucket".to_string()),
                key: String::new()
            }
        );
        assert_eq!(
            parse_target("/dir/file").unwrap(),
            Target {
                bucket: None,
                key: "dir/file".to_string()
            }
        );
        assert!(parse_target("s3:///key").is_err());
    }

    #[test]
    fn test_format_object() {
        let mut obj = Object::new("photos/cat.jpg".to_string(), 2048);
        obj.last_modified = Some(Utc.with_ymd_and_hms(2024, 1, 22, 20, 44, 33).unwrap());
        obj.storage_class = "STANDARD".to_string();
        assert_eq!(
            format_object(&obj),
            "[2024-01-22 20:44:33 UTC]     2k STANDARD     photos/cat.jpg"
        );
    }

    #[test]
    fn test_format_grant() {
        let grant = Grant {
            grantee_id: String::new(),
            grantee_name: String::new(),
            group: Some(GranteeGroup::Everyone),
            permission: "READ".to_string(),
        };
        assert_eq!(format_grant(&grant), "READ         EVERYONE");

        let grant = Grant {
            grantee_id: "abc".to_string(),
            grantee_name: "me".to_string(),
            group: None,
            permission: "FULL_CONTROL".to_string(),
        };
        assert_eq!(format_grant(&grant), "FULL_CONTROL me (abc)");
    }
}
