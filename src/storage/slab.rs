//! Streaming byte container for a single file version.
//!
//! A [`Slab`] holds the bytes of one uploaded file. Exactly one producer
//! appends chunks while any number of consumers read from offset 0 forward.
//! Consumers that reach the append frontier block until the producer either
//! appends more bytes or reaches a terminal state.
//!
//! # Concurrency model
//!
//! ```text
//! Producer ──append──▶ ┌──────────────────────────┐
//!                      │ content (append-only)    │──read──▶ Consumer 1
//!                      │ terminal: none/complete/ │──read──▶ Consumer 2
//!                      │           failed         │──read──▶ Consumer N
//!                      └──────────────────────────┘
//! ```
//!
//! Content and terminal flags live under one `RwLock` that is never held
//! across an await point. Wakeups travel over a watch channel: the producer
//! bumps a revision counter after every append and terminal transition, and
//! blocked consumers re-check their predicates after each `changed()`.

use super::metrics::StorageMetrics;
use crate::error::{Error, Result};
use crate::signal::CancelToken;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Consumers copy out of the buffer in chunks of this size.
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Producer side of an upload: pulls chunks until end-of-stream or error.
#[async_trait]
pub trait ChunkSource: Send {
    /// Pull the next chunk. `Ok(None)` signals a clean end-of-stream.
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;
}

/// Consumer side of a download: delivers chunks to wherever they go.
#[async_trait]
pub trait ChunkSink: Send {
    /// Deliver one chunk. The flush may block on the consumer.
    async fn deliver(&mut self, chunk: Bytes) -> SinkStatus;
}

/// Result of a single sink delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// Chunk was accepted; keep going.
    Accepted,
    /// The consumer is gone; stop reading.
    Closed,
}

/// How an upload ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Source reached end-of-stream; the slab is complete.
    Completed,
    /// Source errored or the upload was cancelled; the slab is failed.
    Failed,
}

/// How a download ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// All bytes of a complete slab were delivered.
    Complete,
    /// The upload failed; the consumer got at most a prefix.
    Incomplete,
    /// The consumer went away before the slab was drained.
    SinkClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Complete,
    Failed,
}

#[derive(Debug)]
struct SlabInner {
    content: Vec<u8>,
    terminal: Option<Terminal>,
}

/// One version of a file: append-only content plus sticky terminal state.
///
/// `complete` and `failed` are mutually exclusive and permanent. Once either
/// is set the content length never changes again.
#[derive(Debug)]
pub struct Slab {
    path: String,
    content_type: String,
    inner: RwLock<SlabInner>,
    // Revision counter doubling as the consumer wakeup signal.
    rev: watch::Sender<u64>,
    append_claimed: AtomicBool,
    metrics: Arc<StorageMetrics>,
}

impl Slab {
    pub fn new(
        path: impl Into<String>,
        content_type: impl Into<String>,
        metrics: Arc<StorageMetrics>,
    ) -> Self {
        let (rev, _) = watch::channel(0);
        Self {
            path: path.into(),
            content_type: content_type.into(),
            inner: RwLock::new(SlabInner {
                content: Vec::new(),
                terminal: None,
            }),
            rev,
            append_claimed: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Current committed length. Never decreases.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().content.len()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.read().unwrap().terminal == Some(Terminal::Complete)
    }

    pub fn is_failed(&self) -> bool {
        self.inner.read().unwrap().terminal == Some(Terminal::Failed)
    }

    /// Feed the slab from a producer source until end-of-stream, source
    /// error, or cancellation.
    ///
    /// Every appended chunk and the final terminal transition wake all
    /// blocked consumers. May be called at most once per slab; a second call
    /// returns [`Error::AppendClaimed`].
    pub async fn append<S: ChunkSource>(
        &self,
        source: &mut S,
        cancel: &mut CancelToken,
    ) -> Result<AppendOutcome> {
        if self.append_claimed.swap(true, Ordering::SeqCst) {
            return Err(Error::AppendClaimed(self.path.clone()));
        }

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(path = %self.path, "upload cancelled");
                    self.finish(Terminal::Failed);
                    return Ok(AppendOutcome::Failed);
                }
                next = source.next_chunk() => next,
            };

            match next {
                Ok(Some(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    {
                        let mut inner = self.inner.write().unwrap();
                        inner.content.extend_from_slice(&chunk);
                        trace!(
                            path = %self.path,
                            chunk = chunk.len(),
                            total = inner.content.len(),
                            "appended chunk"
                        );
                    }
                    self.rev.send_modify(|r| *r += 1);
                }
                Ok(None) => {
                    self.finish(Terminal::Complete);
                    return Ok(AppendOutcome::Completed);
                }
                Err(e) => {
                    warn!(path = %self.path, error = %e, "upload source failed");
                    self.finish(Terminal::Failed);
                    return Ok(AppendOutcome::Failed);
                }
            }
        }
    }

    /// Deliver the slab's bytes to a consumer sink, from offset 0 forward.
    ///
    /// Runs the catch-up / blocked / terminal loop: copy while behind the
    /// frontier, wait at the frontier, return once a terminal state is
    /// drained or observed. Bytes are snapshotted under the content lock and
    /// flushed to the sink after the lock is released.
    pub async fn read_to<S: ChunkSink>(&self, sink: &mut S) -> ReadOutcome {
        let mut rx = self.rev.subscribe();
        let mut pos = 0usize;

        loop {
            let step = {
                let inner = self.inner.read().unwrap();
                if inner.terminal == Some(Terminal::Failed) {
                    return ReadOutcome::Incomplete;
                }
                if pos < inner.content.len() {
                    let end = usize::min(pos + READ_CHUNK_SIZE, inner.content.len());
                    Step::Flush(Bytes::copy_from_slice(&inner.content[pos..end]))
                } else if inner.terminal == Some(Terminal::Complete) {
                    Step::Done
                } else {
                    Step::Wait
                }
            };

            match step {
                Step::Flush(chunk) => {
                    pos += chunk.len();
                    if sink.deliver(chunk).await == SinkStatus::Closed {
                        return ReadOutcome::SinkClosed;
                    }
                }
                Step::Done => return ReadOutcome::Complete,
                Step::Wait => {
                    // Sender lives inside this slab, so this only resolves
                    // with Err if the slab is torn down mid-read.
                    if rx.changed().await.is_err() {
                        return ReadOutcome::Incomplete;
                    }
                }
            }
        }
    }

    fn finish(&self, terminal: Terminal) {
        {
            let mut inner = self.inner.write().unwrap();
            if inner.terminal.is_some() {
                return;
            }
            inner.terminal = Some(terminal);
            debug!(
                path = %self.path,
                bytes = inner.content.len(),
                outcome = ?terminal,
                "upload finished"
            );
        }
        match terminal {
            Terminal::Complete => self.metrics.record_upload_completed(),
            Terminal::Failed => self.metrics.record_upload_failed(),
        }
        self.rev.send_modify(|r| *r += 1);
    }
}

enum Step {
    Flush(Bytes),
    Done,
    Wait,
}
