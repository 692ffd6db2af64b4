//! Canonical forms consumed by the request signers
//!
//! Every function here is pure: the output depends only on the headers,
//! path and query handed in. Header maps are `http::HeaderMap`, so names are
//! already lowercase and lookups return the first value of a repeated header.

use hyper::HeaderMap;
use std::borrow::Cow;

/// Hex lookup table for zero-allocation percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Whitespace stripped from both ends of a header value
const HEADER_TRIM: &[char] = &[' ', '\t', '\r', '\n', '\x0c'];

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).trim_matches(HEADER_TRIM).to_string())
        .unwrap_or_default()
}

/// Sorted, deduplicated header names selected by `keep`
fn selected_names<'a>(headers: &'a HeaderMap, keep: impl Fn(&str) -> bool) -> Vec<&'a str> {
    let mut names: Vec<&str> = headers.keys().map(|k| k.as_str()).filter(|k| keep(k)).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// CanonicalizedAmzHeaders for SigV2: `name:value\n` for every `x-amz-*` header.
pub fn v2_headers(headers: &HeaderMap) -> String {
    let mut result = String::with_capacity(headers.len() * 48);
    for name in selected_names(headers, |n| n.starts_with("x-amz-")) {
        result.push_str(name);
        result.push(':');
        result.push_str(&header_value(headers, name));
        result.push('\n');
    }
    result
}

/// CanonicalizedResource for SigV2.
///
/// `bucket` is the virtual-host bucket; pass `None` when the bucket is already
/// the first path segment (path-style) or there is no bucket at all.
pub fn v2_resource(bucket: Option<&str>, path: &str, query: &str) -> String {
    let mut resource = String::with_capacity(1 + path.len() + query.len() + 16);
    if let Some(bucket) = bucket {
        resource.push('/');
        resource.push_str(bucket);
    }
    resource.push_str(path);
    if query.is_empty() {
        return resource;
    }

    let mut params: Vec<&str> = query.split('&').collect();
    params.sort_unstable();

    resource.push('?');
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            resource.push('&');
        }
        match param.split_once('=') {
            Some((key, value)) => {
                uri_encode_into(&mut resource, key, true);
                resource.push('=');
                uri_encode_into(&mut resource, value, true);
            }
            None => uri_encode_into(&mut resource, param, true),
        }
    }
    resource
}

/// SigV4 canonical headers.
///
/// Returns `(signed_headers, block)` where `block` is the newline-joined
/// `name:value` lines, a blank line, and the signed header list again.
pub fn v4_headers(headers: &HeaderMap) -> (String, String) {
    let names = selected_names(headers, |n| n == "host" || n.starts_with("x-amz-"));
    let signed = names.join(";");

    let mut block = String::with_capacity(names.len() * 64 + signed.len() + 2);
    for name in &names {
        block.push_str(name);
        block.push(':');
        block.push_str(&header_value(headers, name));
        block.push('\n');
    }
    block.push('\n');
    block.push_str(&signed);

    (signed, block)
}

/// SigV4 canonical query string.
///
/// Parameters are ordered by their whole `key=value` text, then key and value
/// are encoded separately. A bare key becomes `key=`.
pub fn v4_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<&str> = query.split('&').collect();
    params.sort_unstable();

    let mut result = String::with_capacity(query.len() + 16);
    for (i, param) in params.into_iter().enumerate() {
        if i > 0 {
            result.push('&');
        }
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        uri_encode_into(&mut result, key, true);
        result.push('=');
        uri_encode_into(&mut result, value, true);
    }
    result
}

/// SigV4 canonical URI: the decoded path re-encoded with `/` preserved.
pub fn v4_path(path: &str) -> String {
    let decoded = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));
    uri_encode(&decoded, false)
}

/// URI encode a string (RFC 3986) using hex lookup table
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len() + 16);
    uri_encode_into(&mut result, s, encode_slash);
    result
}

fn uri_encode_into(buf: &mut String, s: &str, encode_slash: bool) {
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                buf.push(byte as char);
            }
            b'/' if !encode_slash => {
                buf.push('/');
            }
            _ => {
                buf.push('%');
                buf.push(HEX_UPPER[(byte >> 4) as usize] as char);
                buf.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("hello world", true), "hello%20world");
        assert_eq!(uri_encode("hello/world", true), "hello%2Fworld");
        assert_eq!(uri_encode("hello/world", false), "hello/world");
        assert_eq!(uri_encode("test@example.com", true), "test%40example.com");
        assert_eq!(uri_encode("a+b~c", true), "a%2Bb~c");
    }

    #[test]
    fn test_v2_headers_selects_sorts_and_trims() {
        let map = headers(&[
            ("X-Amz-Meta-Zeta", "  last\t"),
            ("content-type", "text/plain"),
            ("x-amz-acl", "private"),
            ("X-Amz-Date", "20240101T000000Z"),
        ]);
        assert_eq!(
            v2_headers(&map),
            "x-amz-acl:private\nx-amz-date:20240101T000000Z\nx-amz-meta-zeta:last\n"
        );
    }

    #[test]
    fn test_v2_headers_empty_without_amz_headers() {
        let map = headers(&[("host", "example.com"), ("content-md5", "abc")]);
        assert_eq!(v2_headers(&map), "");
    }

    #[test]
    fn test_v2_resource() {
        assert_eq!(v2_resource(Some("bucket"), "/key", ""), "/bucket/key");
        assert_eq!(v2_resource(None, "/bucket/key", ""), "/bucket/key");
        assert_eq!(
            v2_resource(Some("bucket"), "/key", "uploadId=a/b&partNumber=2"),
            "/bucket/key?partNumber=2&uploadId=a%2Fb"
        );
        assert_eq!(v2_resource(Some("bucket"), "/key", "acl"), "/bucket/key?acl");
    }

    #[test]
    fn test_v4_headers_block() {
        let map = headers(&[
            ("Host", "s3.example.com:9000"),
            ("x-amz-date", "20240101T000000Z"),
            ("content-length", "12"),
            ("x-amz-content-sha256", " abc "),
        ]);
        let (signed, block) = v4_headers(&map);
        assert_eq!(signed, "host;x-amz-content-sha256;x-amz-date");
        assert_eq!(
            block,
            "host:s3.example.com:9000\nx-amz-content-sha256:abc\nx-amz-date:20240101T000000Z\n\nhost;x-amz-content-sha256;x-amz-date"
        );
    }

    #[test]
    fn test_v4_query_string() {
        assert_eq!(v4_query_string(""), "");
        assert_eq!(v4_query_string("key=value"), "key=value");
        assert_eq!(v4_query_string("zebra=1&alpha=2"), "alpha=2&zebra=1");
        assert_eq!(v4_query_string("uploads"), "uploads=");
        assert_eq!(
            v4_query_string("list-type=2&fetch-owner=true&continuation-token=a+b/c="),
            "continuation-token=a%2Bb%2Fc%3D&fetch-owner=true&list-type=2"
        );
    }

    #[test]
    fn test_v4_query_sorts_whole_parameter_not_key() {
        // "a-b=1" < "a=2" because '-' sorts before '='
        assert_eq!(v4_query_string("a=2&a-b=1"), "a-b=1&a=2");
        assert_eq!(v4_query_string("k=b&k=a"), "k=a&k=b");
    }

    #[test]
    fn test_v4_query_escaping_is_one_way() {
        assert_eq!(v4_query_string("token=a%2Bb"), "token=a%252Bb");
    }

    #[test]
    fn test_v4_path() {
        assert_eq!(v4_path("/"), "/");
        assert_eq!(v4_path("/bucket/dir/file.txt"), "/bucket/dir/file.txt");
        assert_eq!(v4_path("/dir/my%20file"), "/dir/my%20file");
        assert_eq!(v4_path("/dir/a+b"), "/dir/a%2Bb");
    }
}
