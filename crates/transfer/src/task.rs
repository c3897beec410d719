//! Per-file upload state machine.
//!
//! `Pending → Uploading ⇄ Retrying → Completed | Failed`, with `Canceled`
//! reachable from every non-terminal state. Chunks of one file are sent
//! strictly in order; a failure restarts the file from part 0 until the
//! retry budget is spent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chunkup_protocol::{
    ChunkRequest, FileId, FileProgress, FileTaskSnapshot, TaskStatus, UploadEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TransferError;
use crate::chunked::{ChunkReader, FileSource};
use crate::counters::ByteCounters;
use crate::transport::{ChunkTransport, TransportError};

/// Channel the tasks and the queue publish lifecycle events on.
pub type EventSender = mpsc::UnboundedSender<UploadEvent>;

/// Everything a task needs from its queue while uploading.
#[derive(Clone)]
pub struct TransferContext {
    pub transport: Arc<dyn ChunkTransport>,
    pub counters: Arc<ByteCounters>,
    pub events: EventSender,
    /// Pause between consecutive chunk sends.
    pub slice_delay: Duration,
}

/// How a task settled.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Every part was acknowledged; carries the last response payload.
    Completed(serde_json::Value),
    /// Retries exhausted; carries the last failure payload.
    Failed(serde_json::Value),
    Canceled,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed(_) => TaskStatus::Completed,
            Self::Failed(_) => TaskStatus::Failed,
            Self::Canceled => TaskStatus::Canceled,
        }
    }
}

/// A single attempt to push one part.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("chunk read failed: {0}")]
    Read(#[from] TransferError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("upload canceled")]
    Canceled,
}

impl AttemptError {
    fn payload(&self) -> serde_json::Value {
        match self {
            Self::Transport(e) => e
                .payload()
                .cloned()
                .unwrap_or_else(|| serde_json::json!({ "error": e.to_string() })),
            Self::Read(_) | Self::Canceled => serde_json::json!({ "error": self.to_string() }),
        }
    }
}

enum Step {
    Continue,
    Done(TaskOutcome),
}

/// One file's transfer.
pub struct FileTask {
    id: FileId,
    source: Arc<dyn FileSource>,
    reader: ChunkReader,
    max_retries: u32,
    cancel: CancellationToken,
    inner: Mutex<TaskInner>,
}

struct TaskInner {
    status: TaskStatus,
    parts_uploaded: u64,
    retry_count: u32,
    /// Bytes this task has added to the shared uploaded counter.
    credited_bytes: u64,
    thumbnail: Option<String>,
    server_response: Option<serde_json::Value>,
}

impl FileTask {
    /// Creates a pending task.
    pub fn new(
        id: FileId,
        source: Arc<dyn FileSource>,
        chunk_size: u64,
        max_retries: u32,
    ) -> Self {
        let reader = ChunkReader::new(source.size(), chunk_size);
        Self {
            id,
            source,
            reader,
            max_retries,
            cancel: CancellationToken::new(),
            inner: Mutex::new(TaskInner {
                status: TaskStatus::Pending,
                parts_uploaded: 0,
                retry_count: 0,
                credited_bytes: 0,
                thumbnail: None,
                server_response: None,
            }),
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn size(&self) -> u64 {
        self.reader.file_size()
    }

    pub fn total_parts(&self) -> u64 {
        self.reader.total_parts()
    }

    pub fn source(&self) -> &Arc<dyn FileSource> {
        &self.source
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.lock().unwrap().status
    }

    pub fn thumbnail(&self) -> Option<String> {
        self.inner.lock().unwrap().thumbnail.clone()
    }

    /// Stores the thumbnail. Only the first call on a pending task wins.
    pub fn set_thumbnail(&self, thumbnail: String) -> bool {
        let mut s = self.inner.lock().unwrap();
        if s.status != TaskStatus::Pending || s.thumbnail.is_some() {
            return false;
        }
        s.thumbnail = Some(thumbnail);
        true
    }

    /// Returns a point-in-time view of the task.
    pub fn snapshot(&self) -> FileTaskSnapshot {
        let s = self.inner.lock().unwrap();
        FileTaskSnapshot {
            file_id: self.id,
            file_name: self.source.name().to_string(),
            size_bytes: self.size(),
            chunk_size: self.reader.chunk_size(),
            total_parts: self.total_parts(),
            parts_uploaded: s.parts_uploaded,
            retry_count: s.retry_count,
            progress_percent: self.percent(&s),
            status: s.status,
            thumbnail: s.thumbnail.clone(),
            server_response: s.server_response.clone(),
        }
    }

    /// Moves a pending task to Uploading and emits `fileupload.start`.
    ///
    /// Returns `false` if the task was not pending.
    pub fn start(&self, ctx: &TransferContext) -> bool {
        let mut s = self.inner.lock().unwrap();
        if s.status != TaskStatus::Pending {
            return false;
        }
        s.status = TaskStatus::Uploading;
        let _ = ctx
            .events
            .send(UploadEvent::FileStarted(self.progress_event(&s, ctx)));
        info!(
            file_id = self.id,
            name = %self.source.name(),
            total_parts = self.total_parts(),
            "upload started"
        );
        true
    }

    /// Cancels the task unless it already finished.
    ///
    /// Already credited bytes stay credited. A send that is in flight
    /// completes, but its result is discarded.
    pub fn cancel(&self, ctx: &TransferContext) -> bool {
        let mut s = self.inner.lock().unwrap();
        if s.status.is_terminal() || self.percent(&s) >= 100 {
            return false;
        }
        s.status = TaskStatus::Canceled;
        self.cancel.cancel();
        let _ = ctx
            .events
            .send(UploadEvent::FileCanceled(self.progress_event(&s, ctx)));
        info!(file_id = self.id, parts = s.parts_uploaded, "upload canceled");
        true
    }

    /// Starts the task if needed and uploads until it settles.
    pub async fn run(&self, ctx: &TransferContext) -> TaskOutcome {
        self.start(ctx);
        self.upload(ctx).await
    }

    /// Sends parts in order until the task completes, fails or is canceled.
    pub async fn upload(&self, ctx: &TransferContext) -> TaskOutcome {
        loop {
            let (part, retries) = {
                let mut s = self.inner.lock().unwrap();
                let status = s.status;
                match status {
                    TaskStatus::Pending => {
                        drop(s);
                        self.start(ctx);
                        continue;
                    }
                    TaskStatus::Canceled => return TaskOutcome::Canceled,
                    TaskStatus::Completed => {
                        return TaskOutcome::Completed(
                            s.server_response.clone().unwrap_or_default(),
                        );
                    }
                    TaskStatus::Failed => {
                        return TaskOutcome::Failed(s.server_response.clone().unwrap_or_default());
                    }
                    TaskStatus::Retrying => s.status = TaskStatus::Uploading,
                    TaskStatus::Uploading => {}
                }
                (s.parts_uploaded, s.retry_count)
            };

            let result = self.send_part(part, retries, ctx).await;
            if let Step::Done(outcome) = self.record_attempt(result, ctx) {
                return outcome;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(ctx.slice_delay) => {}
            }
        }
    }

    /// Reads and sends zero-based `part`. Returns the payload and the
    /// number of bytes sent.
    async fn send_part(
        &self,
        part: u64,
        retries: u32,
        ctx: &TransferContext,
    ) -> Result<(serde_json::Value, u64), AttemptError> {
        let data = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AttemptError::Canceled),
            data = self.reader.read_part(self.source.as_ref(), part) => data?,
        };
        // The read is a suspension point; a cancel may have landed during it.
        if self.status() == TaskStatus::Canceled {
            return Err(AttemptError::Canceled);
        }
        let len = data.len() as u64;

        let request = ChunkRequest {
            file_id: self.id,
            retries,
            file_name: self.source.name().to_string(),
            current_part: part + 1,
            total_parts: self.total_parts(),
            data,
        };
        debug!(
            file_id = self.id,
            part = request.current_part,
            total = request.total_parts,
            bytes = len,
            "sending chunk"
        );
        let payload = ctx.transport.send_chunk(&request).await?;
        Ok((payload, len))
    }

    /// Applies the result of one attempt. The canceled check and every
    /// mutation happen under the same lock `cancel` takes.
    fn record_attempt(
        &self,
        result: Result<(serde_json::Value, u64), AttemptError>,
        ctx: &TransferContext,
    ) -> Step {
        let mut s = self.inner.lock().unwrap();
        if s.status == TaskStatus::Canceled {
            debug!(file_id = self.id, "discarding chunk result for canceled upload");
            return Step::Done(TaskOutcome::Canceled);
        }

        match result {
            Ok((payload, len)) => {
                s.parts_uploaded += 1;
                s.credited_bytes += len;
                ctx.counters.credit(len);

                if self.percent(&s) == 100 {
                    s.status = TaskStatus::Completed;
                    s.server_response = Some(payload.clone());
                    let _ = ctx
                        .events
                        .send(UploadEvent::FileCompleted(self.progress_event(&s, ctx)));
                    info!(file_id = self.id, parts = s.parts_uploaded, "upload completed");
                    Step::Done(TaskOutcome::Completed(payload))
                } else {
                    let _ = ctx
                        .events
                        .send(UploadEvent::FileProgressed(self.progress_event(&s, ctx)));
                    Step::Continue
                }
            }
            Err(err) => {
                if s.retry_count < self.max_retries {
                    s.retry_count += 1;
                    ctx.counters.debit(s.credited_bytes);
                    s.credited_bytes = 0;
                    s.parts_uploaded = 0;
                    s.status = TaskStatus::Retrying;
                    let _ = ctx
                        .events
                        .send(UploadEvent::FileRetrying(self.progress_event(&s, ctx)));
                    warn!(
                        file_id = self.id,
                        attempt = s.retry_count,
                        max = self.max_retries,
                        error = %err,
                        "chunk failed, restarting file"
                    );
                    Step::Continue
                } else {
                    let payload = err.payload();
                    s.status = TaskStatus::Failed;
                    s.server_response = Some(payload.clone());
                    let _ = ctx
                        .events
                        .send(UploadEvent::FileFailed(self.progress_event(&s, ctx)));
                    warn!(file_id = self.id, error = %err, "upload failed, retries exhausted");
                    Step::Done(TaskOutcome::Failed(payload))
                }
            }
        }
    }

    fn percent(&self, s: &TaskInner) -> u8 {
        (s.parts_uploaded * 100 / self.total_parts()).min(100) as u8
    }

    fn progress_event(&self, s: &TaskInner, ctx: &TransferContext) -> FileProgress {
        FileProgress {
            file_id: self.id,
            file_progress: self.percent(s),
            total_progress: ctx.counters.percentage(),
        }
    }
}
