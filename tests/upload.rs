mod common;

use common::{MockS3, Recorded, Reply};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::{Method, StatusCode};
use std::time::Duration;

use s2d3::s3::MIN_BLOCK_SIZE;
use s2d3::S3Error;

const MIB: usize = 1024 * 1024;

fn query_param<'a>(req: &'a Recorded, name: &str) -> Option<&'a str> {
    req.query
        .split('&')
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
}

/// Multipart happy path; part 1 answers slower than the others
fn multipart_handler(req: &Recorded) -> Reply {
    match (&req.method, req.query.as_str()) {
        (&Method::POST, "uploads") => Reply::xml(
            StatusCode::OK,
            "<InitiateMultipartUploadResult><Bucket>backups</Bucket><Key>disk.img</Key>\
             <UploadId>VXBsb2FkIElE+1</UploadId></InitiateMultipartUploadResult>",
        ),
        (&Method::PUT, _) => {
            let part = query_param(req, "partNumber").unwrap_or("0").to_string();
            let reply = Reply::ok().header("etag", format!("\"etag-{}\"", part));
            if part == "1" {
                reply.delayed(Duration::from_millis(200))
            } else {
                reply
            }
        }
        (&Method::POST, _) => Reply::xml(
            StatusCode::OK,
            "<CompleteMultipartUploadResult><Key>disk.img</Key></CompleteMultipartUploadResult>",
        ),
        _ => Reply::error(StatusCode::BAD_REQUEST, "InvalidRequest", "unexpected"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_stream_completes_parts_in_order() {
    let server = MockS3::start(multipart_handler).await;
    let client = server.client(Some("backups"));

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    let upload = client.new_upload("disk.img", headers).await.unwrap();
    assert_eq!(upload.id(), "VXBsb2FkIElE+1");
    assert_eq!(upload.key(), "disk.img");

    let data = vec![7u8; 12 * MIB];
    let total = upload.parallel_stream(&data[..], 5 * MIB, 2).await.unwrap();
    assert_eq!(total, 12 * MIB as u64);
    assert_eq!(upload.part_count(), 3);
    upload.done().await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0].query, "uploads");
    assert_eq!(requests[0].header("content-type"), Some("application/octet-stream"));

    let mut sizes: Vec<(String, usize)> = requests
        .iter()
        .filter(|r| r.method == Method::PUT)
        .map(|r| (query_param(r, "partNumber").unwrap().to_string(), r.body.len()))
        .collect();
    sizes.sort();
    assert_eq!(
        sizes,
        [("1".to_string(), 5 * MIB), ("2".to_string(), 5 * MIB), ("3".to_string(), 2 * MIB)]
    );
    // '+' in the upload id must reach the server percent-encoded
    assert!(requests
        .iter()
        .filter(|r| r.method == Method::PUT)
        .all(|r| query_param(r, "uploadId") == Some("VXBsb2FkIElE%2B1")));

    let complete = requests.last().unwrap();
    assert_eq!(complete.method, Method::POST);
    let body = complete.body_str();
    let first = body.find("<PartNumber>1</PartNumber>").unwrap();
    let second = body.find("<PartNumber>2</PartNumber>").unwrap();
    let third = body.find("<PartNumber>3</PartNumber>").unwrap();
    assert!(first < second && second < third, "{}", body);
    assert!(body.contains("<ETag>&quot;etag-1&quot;</ETag>"), "{}", body);
}

#[tokio::test]
async fn test_sequential_stream_exact_multiple() {
    let server = MockS3::start(multipart_handler).await;
    let upload = server
        .client(Some("backups"))
        .new_upload("disk.img", HeaderMap::new())
        .await
        .unwrap();

    let data = vec![1u8; 2 * MIN_BLOCK_SIZE];
    let total = upload.stream(&data[..], MIN_BLOCK_SIZE).await.unwrap();
    assert_eq!(total, data.len() as u64);
    assert_eq!(upload.part_count(), 2);
    upload.done().await.unwrap();
}

#[tokio::test]
async fn test_small_block_rejected_without_requests() {
    let server = MockS3::start(multipart_handler).await;
    let upload = server
        .client(Some("backups"))
        .new_upload("disk.img", HeaderMap::new())
        .await
        .unwrap();

    let data = vec![0u8; 8 * MIB];
    let err = upload.parallel_stream(&data[..], 4 * MIB, 4).await.unwrap_err();
    assert!(matches!(err, S3Error::BlockTooSmall(_)));
    // only the initiation went out
    assert_eq!(server.requests().len(), 1);
    assert_eq!(upload.part_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_failure_interrupts_stream() {
    let server = MockS3::start(|req| match (&req.method, query_param(req, "partNumber")) {
        (&Method::PUT, Some("2")) => Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "boom"),
        _ => multipart_handler(req),
    })
    .await;
    let upload = server
        .client(Some("backups"))
        .new_upload("disk.img", HeaderMap::new())
        .await
        .unwrap();

    let data = vec![3u8; 6 * MIN_BLOCK_SIZE];
    let err = upload.parallel_stream(&data[..], MIN_BLOCK_SIZE, 2).await.unwrap_err();
    match &err {
        S3Error::Interrupted { transferred, source } => {
            assert!(*transferred <= data.len() as u64);
            assert_eq!(source.code(), Some("InternalError"));
        }
        other => panic!("expected Interrupted, got {:?}", other),
    }
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));

    // part 2 never got an ETag
    assert!(matches!(upload.done().await, Err(S3Error::IncompletePart(2))));
}

#[tokio::test]
async fn test_write_part_rejects_non_ok_status() {
    let server = MockS3::start(|req| match req.method {
        Method::PUT => Reply::error(StatusCode::FORBIDDEN, "AccessDenied", "Access Denied"),
        _ => multipart_handler(req),
    })
    .await;
    let upload = server
        .client(Some("backups"))
        .new_upload("disk.img", HeaderMap::new())
        .await
        .unwrap();

    let err = upload.write(bytes::Bytes::from_static(b"hello")).await.unwrap_err();
    assert_eq!(err.code(), Some("AccessDenied"));
    assert_eq!(upload.part_count(), 1);
}
