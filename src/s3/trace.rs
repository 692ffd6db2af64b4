//! Wire-level request/response dumps
//!
//! Separate from `tracing` events: a `Tracer` writes the raw HTTP exchange to
//! a sink owned by one client. Level 1 dumps headers, level 2 adds bodies.

use bytes::Bytes;
use hyper::{HeaderMap, StatusCode};
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use super::request::OutgoingRequest;

/// Environment variable that seeds the default trace level
pub const TRACE_LEVEL_ENV: &str = "S3_TRACE_LEVEL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    #[default]
    Off,
    Headers,
    All,
}

impl TraceLevel {
    /// `"1"` ⇒ headers, `"2"` ⇒ headers and bodies, anything else ⇒ off
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "1" => TraceLevel::Headers,
            "2" => TraceLevel::All,
            _ => TraceLevel::Off,
        }
    }

    pub fn from_env() -> Self {
        std::env::var(TRACE_LEVEL_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Trace sink plus level. Clones share the sink.
#[derive(Clone)]
pub struct Tracer {
    sink: Sink,
    level: TraceLevel,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer").field("level", &self.level).finish_non_exhaustive()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::off()
    }
}

impl Tracer {
    pub fn new(level: TraceLevel, sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
            level,
        }
    }

    pub fn stderr(level: TraceLevel) -> Self {
        Self::new(level, io::stderr())
    }

    pub fn off() -> Self {
        Self::new(TraceLevel::Off, io::sink())
    }

    /// Stderr tracer at the level named by `S3_TRACE_LEVEL`
    pub fn from_env() -> Self {
        Self::stderr(TraceLevel::from_env())
    }

    pub fn level(&self) -> TraceLevel {
        self.level
    }

    pub fn enabled(&self) -> bool {
        self.level != TraceLevel::Off
    }

    pub fn request(&self, req: &OutgoingRequest) {
        if !self.enabled() {
            return;
        }
        let mut dump = String::with_capacity(512);
        dump.push_str("---[ request ]---\n");
        dump.push_str(&format!("{} {} HTTP/1.1\n", req.method, req.path_and_query()));
        push_headers(&mut dump, &req.headers);
        self.push_body(&mut dump, &req.body);
        self.write(&dump);
    }

    pub fn response(&self, status: StatusCode, headers: &HeaderMap, body: &Bytes) {
        if !self.enabled() {
            return;
        }
        let mut dump = String::with_capacity(512);
        dump.push_str("---[ response ]---\n");
        dump.push_str(&format!("HTTP/1.1 {}\n", status));
        push_headers(&mut dump, headers);
        self.push_body(&mut dump, body);
        self.write(&dump);
    }

    fn push_body(&self, dump: &mut String, body: &Bytes) {
        dump.push('\n');
        if self.level == TraceLevel::All && !body.is_empty() {
            dump.push_str(&String::from_utf8_lossy(body));
            dump.push('\n');
        }
    }

    fn write(&self, dump: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        // Trace output is best effort
        let _ = sink.write_all(dump.as_bytes());
        let _ = sink.flush();
    }
}

fn push_headers(dump: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        dump.push_str(name.as_str());
        dump.push_str(": ");
        dump.push_str(&String::from_utf8_lossy(value.as_bytes()));
        dump.push('\n');
    }
}
