//! Multipart upload session and the bounded-parallel streaming engine
//!
//! Part numbers are reserved synchronously by the caller (or the streaming
//! producer) so they are gap-free and strictly increasing in read order.
//! Worker tasks upload reserved parts and fill their slot with the ETag.

use bytes::{Bytes, BytesMut};
use hyper::{HeaderMap, Method, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::client::S3Client;
use super::error::{Result, S3Error};
use super::types::CompletedPart;
use super::xml;

/// S3 limit on parts per upload
pub const MAX_PARTS: u32 = 10_000;

/// Smallest block accepted by the streaming engine (5 MiB)
pub const MIN_BLOCK_SIZE: usize = 5 * 1024 * 1024;

/// Ordered part slots; slot `n - 1` holds the ETag of part `n` once uploaded.
#[derive(Debug, Default)]
pub struct PartRegistry {
    slots: Mutex<Vec<Option<String>>>,
}

impl PartRegistry {
    fn slots(&self) -> MutexGuard<'_, Vec<Option<String>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an empty slot and return its 1-based part number
    pub fn reserve(&self) -> u32 {
        let mut slots = self.slots();
        slots.push(None);
        slots.len() as u32
    }

    /// Record the ETag of a reserved part
    pub fn fill(&self, part_number: u32, etag: String) -> Result<()> {
        let mut slots = self.slots();
        match slots.get_mut((part_number as usize).wrapping_sub(1)) {
            Some(slot) => {
                *slot = Some(etag);
                Ok(())
            }
            None => Err(S3Error::UnreservedPart(part_number)),
        }
    }

    pub fn is_reserved(&self, part_number: u32) -> bool {
        part_number >= 1 && part_number as usize <= self.slots().len()
    }

    /// Number of reserved parts
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every part in ascending order; fails on the first unfilled slot
    pub fn completed(&self) -> Result<Vec<CompletedPart>> {
        self.slots()
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let part_number = i as u32 + 1;
                slot.clone()
                    .map(|etag| CompletedPart::new(part_number, etag))
                    .ok_or(S3Error::IncompletePart(part_number))
            })
            .collect()
    }
}

#[derive(Debug)]
struct Session {
    client: S3Client,
    id: String,
    path: String,
    key: String,
    parts: PartRegistry,
}

/// An in-progress multipart upload. Clones share the session.
#[derive(Debug, Clone)]
pub struct Upload {
    session: Arc<Session>,
}

impl Upload {
    pub(crate) fn new(client: S3Client, path: &str, key: String, id: String) -> Self {
        Self {
            session: Arc::new(Session {
                client,
                id,
                path: path.to_string(),
                key,
                parts: PartRegistry::default(),
            }),
        }
    }

    /// Server-issued upload id
    pub fn id(&self) -> &str {
        &self.session.id
    }

    /// Object key echoed by the server
    pub fn key(&self) -> &str {
        &self.session.key
    }

    /// Request path the upload was started on
    pub fn path(&self) -> &str {
        &self.session.path
    }

    /// Parts reserved so far
    pub fn part_count(&self) -> usize {
        self.session.parts.len()
    }

    /// Reserve the next part number
    pub fn next_part(&self) -> u32 {
        self.session.parts.reserve()
    }

    /// Upload `body` as part `part_number`, which must already be reserved.
    pub async fn write_part(&self, body: Bytes, part_number: u32) -> Result<()> {
        if part_number > MAX_PARTS {
            return Err(S3Error::TooManyParts(part_number));
        }
        if !self.session.parts.is_reserved(part_number) {
            return Err(S3Error::UnreservedPart(part_number));
        }

        let query = format!("partNumber={}&uploadId={}", part_number, self.session.id);
        let size = body.len();
        let response = self
            .session
            .client
            .request(Method::PUT, &self.session.path, &query, HeaderMap::new(), body)
            .await?
            .expect(StatusCode::OK)?;

        let etag = response.etag().unwrap_or_default().to_string();
        if etag.is_empty() {
            warn!(part_number, "part uploaded without an ETag");
        }
        debug!(upload_id = %self.session.id, part_number, bytes = size, "part uploaded");
        self.session.parts.fill(part_number, etag)
    }

    /// Upload `body` as the next part
    pub async fn write(&self, body: Bytes) -> Result<()> {
        let part_number = self.next_part();
        self.write_part(body, part_number).await
    }

    /// Complete the upload (CompleteMultipartUpload)
    ///
    /// Fails locally if any reserved part has not been uploaded.
    pub async fn done(&self) -> Result<()> {
        let parts = self.session.parts.completed()?;
        let body = Bytes::from(xml::complete_multipart_body(&parts));
        let query = format!("uploadId={}", self.session.id);

        self.session
            .client
            .request(Method::POST, &self.session.path, &query, HeaderMap::new(), body)
            .await?
            .expect(StatusCode::OK)?;

        info!(key = %self.session.key, upload_id = %self.session.id, parts = parts.len(), "multipart upload completed");
        Ok(())
    }

    /// Sequential streaming: `parallel_stream` with one worker
    pub async fn stream<R>(&self, reader: R, block_size: usize) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        self.parallel_stream(reader, block_size, 1).await
    }

    /// Read `reader` in `block_size` chunks and upload them with `workers` tasks.
    ///
    /// Returns the number of bytes dispatched. On failure the count travels in
    /// `S3Error::Interrupted` and the call returns only after every worker exited.
    /// `done()` is left to the caller.
    pub async fn parallel_stream<R>(&self, mut reader: R, block_size: usize, workers: usize) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        if block_size < MIN_BLOCK_SIZE {
            return Err(S3Error::BlockTooSmall(block_size));
        }
        let workers = workers.max(1);

        // Single-slot work channel: at most `workers` in flight plus one queued
        let (chunk_tx, chunk_rx) = mpsc::channel::<(u32, Bytes)>(1);
        let chunk_rx = Arc::new(tokio::sync::Mutex::new(chunk_rx));
        let (err_tx, mut err_rx) = mpsc::channel::<S3Error>(workers);
        let halted = Arc::new(AtomicBool::new(false));

        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let upload = self.clone();
            let chunk_rx = Arc::clone(&chunk_rx);
            let err_tx = err_tx.clone();
            let halted = Arc::clone(&halted);

            tasks.spawn(async move {
                loop {
                    let next = chunk_rx.lock().await.recv().await;
                    let Some((part_number, block)) = next else {
                        break;
                    };
                    if halted.load(Ordering::Acquire) {
                        continue;
                    }
                    if let Err(e) = upload.write_part(block, part_number).await {
                        halted.store(true, Ordering::Release);
                        let _ = err_tx.try_send(e);
                        break;
                    }
                }
            });
        }
        drop(err_tx);
        drop(chunk_rx);

        let mut total: u64 = 0;
        let mut failure: Option<S3Error> = None;

        loop {
            let block = match read_block(&mut reader, block_size).await {
                Ok(block) => block,
                Err(e) => {
                    failure = Some(e.into());
                    break;
                }
            };
            if block.is_empty() {
                break;
            }

            let len = block.len();
            let part_number = self.next_part();
            if chunk_tx.send((part_number, block)).await.is_err() {
                // Every worker has exited; its error is collected below
                break;
            }
            total += len as u64;

            if len < block_size {
                break;
            }
            if let Ok(e) = err_rx.try_recv() {
                failure = Some(e);
                break;
            }
        }

        drop(chunk_tx);
        if failure.is_some() {
            halted.store(true, Ordering::Release);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if failure.is_none() {
                    failure = Some(S3Error::Worker(e));
                }
            }
        }
        if failure.is_none() {
            failure = err_rx.try_recv().ok();
        }

        match failure {
            Some(source) => {
                warn!(upload_id = %self.session.id, transferred = total, error = %source, "streaming upload interrupted");
                Err(S3Error::Interrupted {
                    transferred: total,
                    source: Box::new(source),
                })
            }
            None => {
                debug!(upload_id = %self.session.id, bytes = total, parts = self.part_count(), "stream dispatched");
                Ok(total)
            }
        }
    }
}

/// Fill up to `block_size` bytes; shorter only at end of input.
async fn read_block<R>(reader: &mut R, block_size: usize) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(block_size);
    while buf.len() < block_size {
        let mut limited = (&mut *reader).take((block_size - buf.len()) as u64);
        if limited.read_buf(&mut buf).await? == 0 {
            break;
        }
    }
    Ok(buf.freeze())
}
