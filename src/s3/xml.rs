//! XML bodies: response decoding and request payload encoding
//!
//! Decoders use byte-slice tag matching on the quick-xml event stream and
//! check the root element before accepting a document.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Write as FmtWrite;

use super::error::{Result, S3Error};
use super::types::{Bucket, CompletedPart, CreateMultipartUploadResponse, ErrorResponse, Grant, Object};

/// One page of a ListObjectsV2 response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub objects: Vec<Object>,
    /// `None` once the listing is exhausted
    pub next_continuation_token: Option<String>,
}

fn reader(xml: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;
    reader
}

/// Fails unless the first element of the document is `expected`.
fn check_root(root_seen: &mut bool, e: &BytesStart<'_>, expected: &str, what: &'static str) -> Result<()> {
    if *root_seen {
        return Ok(());
    }
    *root_seen = true;
    if e.local_name().as_ref() != expected.as_bytes() {
        return Err(S3Error::XmlParse {
            what,
            reason: format!(
                "expected root element <{}>, found <{}>",
                expected,
                String::from_utf8_lossy(e.local_name().as_ref())
            ),
        });
    }
    Ok(())
}

fn missing_root(what: &'static str, expected: &str) -> S3Error {
    S3Error::XmlParse {
        what,
        reason: format!("missing root element <{}>", expected),
    }
}

/// `2006-01-02T15:04:05.000Z`-style timestamps; `None` when unparseable
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Remove one pair of surrounding double quotes, if present
pub fn strip_quotes(etag: &str) -> &str {
    if etag.len() >= 2 && etag.starts_with('"') && etag.ends_with('"') {
        &etag[1..etag.len() - 1]
    } else {
        etag
    }
}

/// Parse a ListObjectsV2 (`ListBucketResult`) page
pub fn parse_list_page(xml: &[u8]) -> Result<ListPage> {
    const WHAT: &str = "bucket listing";
    let mut reader = reader(xml);

    let mut page = ListPage::default();
    let mut current: Option<Object> = None;
    let mut in_owner = false;
    let mut root_seen = false;
    let mut current_text = String::with_capacity(256);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                check_root(&mut root_seen, &e, "ListBucketResult", WHAT)?;
                match e.local_name().as_ref() {
                    b"Contents" => current = Some(Object::new(String::new(), 0)),
                    b"Owner" => in_owner = true,
                    _ => {}
                }
                current_text.clear();
            }
            Event::Empty(e) => check_root(&mut root_seen, &e, "ListBucketResult", WHAT)?,
            Event::Text(e) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Event::End(e) => {
                let text = std::mem::take(&mut current_text);
                match e.local_name().as_ref() {
                    b"NextContinuationToken" => {
                        page.next_continuation_token = Some(text).filter(|t| !t.is_empty());
                    }
                    b"Contents" => {
                        if let Some(obj) = current.take() {
                            page.objects.push(obj);
                        }
                    }
                    b"Owner" => in_owner = false,
                    tag => {
                        if let Some(obj) = current.as_mut() {
                            match tag {
                                b"Key" => obj.key = text,
                                b"LastModified" => obj.last_modified = parse_timestamp(&text),
                                b"ETag" => obj.etag = strip_quotes(&text).to_string(),
                                b"Size" => {
                                    let size: u64 = text.parse().map_err(|_| S3Error::XmlParse {
                                        what: WHAT,
                                        reason: format!("invalid object size '{}'", text),
                                    })?;
                                    obj.size = size.into();
                                }
                                b"StorageClass" => obj.storage_class = text,
                                b"ID" if in_owner => obj.owner_id = text,
                                b"DisplayName" if in_owner => obj.owner_name = text,
                                _ => {}
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(missing_root(WHAT, "ListBucketResult"));
    }
    Ok(page)
}

/// Parse an `AccessControlPolicy` document into its grants
pub fn parse_acl(xml: &[u8]) -> Result<Vec<Grant>> {
    const WHAT: &str = "access control policy";
    let mut reader = reader(xml);

    let mut grants = Vec::new();
    let mut root_seen = false;
    let mut in_grant = false;
    let (mut id, mut name, mut uri, mut permission) =
        (String::new(), String::new(), String::new(), String::new());
    let mut current_text = String::with_capacity(128);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                check_root(&mut root_seen, &e, "AccessControlPolicy", WHAT)?;
                if e.local_name().as_ref() == b"Grant" {
                    in_grant = true;
                    id.clear();
                    name.clear();
                    uri.clear();
                    permission.clear();
                }
                current_text.clear();
            }
            Event::Empty(e) => check_root(&mut root_seen, &e, "AccessControlPolicy", WHAT)?,
            Event::Text(e) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Event::End(e) => {
                let text = std::mem::take(&mut current_text);
                if in_grant {
                    match e.local_name().as_ref() {
                        b"ID" => id = text,
                        b"DisplayName" => name = text,
                        b"URI" => uri = text,
                        b"Permission" => permission = text,
                        b"Grant" => {
                            in_grant = false;
                            grants.push(Grant::new(
                                std::mem::take(&mut id),
                                std::mem::take(&mut name),
                                &uri,
                                std::mem::take(&mut permission),
                            ));
                        }
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(missing_root(WHAT, "AccessControlPolicy"));
    }
    Ok(grants)
}

/// Parse `ListAllMyBucketsResult`; the document owner is copied onto every bucket
pub fn parse_buckets(xml: &[u8]) -> Result<Vec<Bucket>> {
    const WHAT: &str = "bucket list";
    let mut reader = reader(xml);

    let mut buckets: Vec<Bucket> = Vec::new();
    let mut root_seen = false;
    let mut in_owner = false;
    let mut current: Option<Bucket> = None;
    let (mut owner_id, mut owner_name) = (String::new(), String::new());
    let mut current_text = String::with_capacity(128);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                check_root(&mut root_seen, &e, "ListAllMyBucketsResult", WHAT)?;
                match e.local_name().as_ref() {
                    b"Owner" => in_owner = true,
                    b"Bucket" => {
                        current = Some(Bucket {
                            name: String::new(),
                            creation_date: None,
                            owner_id: String::new(),
                            owner_name: String::new(),
                        })
                    }
                    _ => {}
                }
                current_text.clear();
            }
            Event::Empty(e) => check_root(&mut root_seen, &e, "ListAllMyBucketsResult", WHAT)?,
            Event::Text(e) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Event::End(e) => {
                let text = std::mem::take(&mut current_text);
                match e.local_name().as_ref() {
                    b"Owner" => in_owner = false,
                    b"ID" if in_owner => owner_id = text,
                    b"DisplayName" if in_owner => owner_name = text,
                    b"Bucket" => {
                        if let Some(bucket) = current.take() {
                            buckets.push(bucket);
                        }
                    }
                    b"Name" => {
                        if let Some(bucket) = current.as_mut() {
                            bucket.name = text;
                        }
                    }
                    b"CreationDate" => {
                        if let Some(bucket) = current.as_mut() {
                            bucket.creation_date = parse_timestamp(&text);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(missing_root(WHAT, "ListAllMyBucketsResult"));
    }
    for bucket in &mut buckets {
        bucket.owner_id.clone_from(&owner_id);
        bucket.owner_name.clone_from(&owner_name);
    }
    Ok(buckets)
}

/// Parse CreateMultipartUpload (`InitiateMultipartUploadResult`) XML response
pub fn parse_initiate_upload(xml: &[u8]) -> Result<CreateMultipartUploadResponse> {
    const WHAT: &str = "multipart upload initiation";
    let mut reader = reader(xml);

    let mut bucket = String::new();
    let mut key = String::new();
    let mut upload_id = String::new();
    let mut root_seen = false;
    let mut current_text = String::with_capacity(256);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                check_root(&mut root_seen, &e, "InitiateMultipartUploadResult", WHAT)?;
                current_text.clear();
            }
            Event::Empty(e) => check_root(&mut root_seen, &e, "InitiateMultipartUploadResult", WHAT)?,
            Event::Text(e) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"Bucket" => bucket = std::mem::take(&mut current_text),
                    b"Key" => key = std::mem::take(&mut current_text),
                    b"UploadId" => upload_id = std::mem::take(&mut current_text),
                    _ => {}
                }
                current_text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(missing_root(WHAT, "InitiateMultipartUploadResult"));
    }
    if upload_id.is_empty() {
        return Err(S3Error::XmlParse {
            what: WHAT,
            reason: "missing UploadId".to_string(),
        });
    }
    Ok(CreateMultipartUploadResponse::new(bucket, key, upload_id))
}

/// Decode an `<Error>` body; anything else is `S3Error::ErrorBody`
pub fn parse_error(xml: &[u8]) -> Result<ErrorResponse> {
    let mut reader = reader(xml);

    let mut response = ErrorResponse::default();
    let mut root_seen = false;
    let mut depth = 0usize;
    let mut current_text = String::with_capacity(128);

    loop {
        let event = reader
            .read_event()
            .map_err(|e| S3Error::ErrorBody(e.to_string()))?;
        match event {
            Event::Start(e) | Event::Empty(e) if !root_seen => {
                root_seen = true;
                if e.local_name().as_ref() != b"Error" {
                    return Err(S3Error::ErrorBody(format!(
                        "expected root element <Error>, found <{}>",
                        String::from_utf8_lossy(e.local_name().as_ref())
                    )));
                }
                depth = 1;
            }
            Event::Start(_) => {
                depth += 1;
                current_text.clear();
            }
            Event::Text(e) => {
                current_text.clear();
                current_text.push_str(&e.unescape().map_err(|e| S3Error::ErrorBody(e.to_string()))?);
            }
            Event::End(e) => {
                // Only direct children of <Error>
                if depth == 2 {
                    match e.local_name().as_ref() {
                        b"Code" => response.code = std::mem::take(&mut current_text),
                        b"Message" => response.message = std::mem::take(&mut current_text),
                        _ => {}
                    }
                }
                current_text.clear();
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(S3Error::ErrorBody("empty document".to_string()));
    }
    Ok(response)
}

/// Escape XML special characters into an existing buffer (no intermediate allocation)
fn xml_escape_into(buf: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' => buf.push_str("&quot;"),
            '\'' => buf.push_str("&apos;"),
            _ => buf.push(ch),
        }
    }
}

/// `CompleteMultipartUpload` body; `parts` must already be in ascending order
pub fn complete_multipart_body(parts: &[CompletedPart]) -> String {
    let mut xml = String::with_capacity(64 + parts.len() * 96);
    xml.push_str("<CompleteMultipartUpload>");
    for part in parts {
        let _ = write!(xml, "<Part><PartNumber>{}</PartNumber><ETag>", part.part_number);
        xml_escape_into(&mut xml, &part.etag);
        xml.push_str("</ETag></Part>");
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}

/// `CreateBucketConfiguration` body carrying the location constraint
pub fn create_bucket_body(location: &str) -> String {
    let mut xml = String::with_capacity(128 + location.len());
    xml.push_str("<CreateBucketConfiguration><LocationConstraint>");
    xml_escape_into(&mut xml, location);
    xml.push_str("</LocationConstraint></CreateBucketConfiguration>");
    xml
}
