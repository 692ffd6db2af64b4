//! In-process S3 stand-in for integration tests.
//!
//! Every request is recorded, then answered by a test-supplied handler.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use s2d3::s3::{S3Client, Tracer};
use s2d3::ClientConfig;

/// A request as the server saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Canned answer for one request
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub body: Bytes,
    pub delay: Option<Duration>,
}

impl Reply {
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            delay: None,
        }
    }

    pub fn ok() -> Self {
        Self::status(StatusCode::OK)
    }

    pub fn xml(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            body: Bytes::from(body.into()),
            ..Self::status(status)
        }
    }

    pub fn error(status: StatusCode, code: &str, message: &str) -> Self {
        Self::xml(
            status,
            format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{}</Code><Message>{}</Message></Error>", code, message),
        )
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Handler = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

pub struct MockS3 {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockS3 {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let log = Arc::clone(&log);
                let handler = Arc::clone(&handler);

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let log = Arc::clone(&log);
                        let handler = Arc::clone(&handler);
                        async move { respond(req, log, handler).await }
                    });
                    let _ = http1::Builder::new()
                        .keep_alive(true)
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, requests }
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Path-style plain-HTTP profile pointed at this server
    pub fn config(&self, bucket: Option<&str>) -> ClientConfig {
        ClientConfig {
            protocol: "http".to_string(),
            path_buckets: true,
            bucket: bucket.map(str::to_string),
            ..ClientConfig::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", self.addr.to_string())
        }
    }

    pub fn client(&self, bucket: Option<&str>) -> S3Client {
        S3Client::new(&self.config(bucket)).unwrap().with_tracer(Tracer::off())
    }
}

async fn respond(
    req: Request<Incoming>,
    log: Arc<Mutex<Vec<Recorded>>>,
    handler: Handler,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, incoming) = req.into_parts();
    let body = incoming
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    let recorded = Recorded {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().unwrap_or("").to_string(),
        headers: parts.headers,
        body,
    };
    log.lock().unwrap().push(recorded.clone());

    let reply = handler(&recorded);
    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    let mut response = Response::builder().status(reply.status);
    for (name, value) in &reply.headers {
        response = response.header(*name, value.as_str());
    }
    Ok(response.body(Full::new(reply.body)).unwrap())
}
