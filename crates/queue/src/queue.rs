//! Upload queue with a bounded number of files in flight.
//!
//! Files move `waiting → pending → active → settled`. `enqueue` registers
//! tasks in the waiting list, `start_uploads` admits them to the pending
//! list and a pump moves pending tasks into the active set while fewer
//! than `max_parallel_uploads` are uploading. Every settled task frees its
//! slot and kicks the pump again.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chunkup_events::{EventBus, SubscriptionId, prefixed};
use chunkup_protocol::{
    CancelRequest, FileId, FileTaskSnapshot, QueueCounts, QueueStats, ThumbReady, UploadEvent,
    events,
};
use chunkup_transfer::{
    ByteCounters, ChunkTransport, ExifThumbnailExtractor, FileSource, FileTask, HttpTransport,
    TaskOutcome, ThumbnailExtractor, TransferContext,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::UploaderConfig;
use crate::error::QueueError;

/// Cheaply cloneable handle to one upload queue.
#[derive(Clone)]
pub struct UploadQueue {
    shared: Arc<Shared>,
}

struct Shared {
    config: UploaderConfig,
    ctx: TransferContext,
    thumbnails: Arc<dyn ThumbnailExtractor>,
    runtime: Handle,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<UploadEvent>>>,
    state: Mutex<QueueState>,
}

struct QueueState {
    /// Last id handed out.
    next_id: FileId,
    tasks: HashMap<FileId, Arc<FileTask>>,
    /// Enqueued but not yet admitted by `start_uploads`.
    waiting: VecDeque<FileId>,
    /// Admitted, waiting for a slot. The front starts next.
    pending: VecDeque<FileId>,
    active: Vec<FileId>,
    completed_count: usize,
}

impl QueueState {
    fn counts(&self) -> QueueCounts {
        QueueCounts {
            files_in_queue: self.pending.len(),
            files_uploading: self.active.len(),
            files_uploaded: self.completed_count,
        }
    }

    fn in_flight(&self) -> usize {
        self.waiting.len() + self.pending.len() + self.active.len()
    }

    /// Drops `id` from whichever list holds it. Returns `false` if the
    /// task was already settled.
    fn remove(&mut self, id: FileId) -> bool {
        if let Some(pos) = self.active.iter().position(|&a| a == id) {
            self.active.remove(pos);
            return true;
        }
        for list in [&mut self.pending, &mut self.waiting] {
            if let Some(pos) = list.iter().position(|&p| p == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }
}

impl UploadQueue {
    /// Creates a queue that extracts thumbnails with [`ExifThumbnailExtractor`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: UploaderConfig,
        transport: Arc<dyn ChunkTransport>,
    ) -> Result<Self, QueueError> {
        let thumbnails = Arc::new(ExifThumbnailExtractor::new(config.default_thumb.clone()));
        Self::with_extractor(config, transport, thumbnails)
    }

    /// Creates a queue that sends chunks over HTTP to `config.upload_url`.
    pub fn http(config: UploaderConfig) -> Result<Self, QueueError> {
        config.validate()?;
        let transport = HttpTransport::new(
            &config.upload_url,
            &config.upload_method,
            config.request_timeout(),
        )?;
        info!(url = transport.url(), method = %config.upload_method, "http transport ready");
        Self::new(config, Arc::new(transport))
    }

    pub fn with_extractor(
        config: UploaderConfig,
        transport: Arc<dyn ChunkTransport>,
        thumbnails: Arc<dyn ThumbnailExtractor>,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let ctx = TransferContext {
            transport,
            counters: Arc::new(ByteCounters::new()),
            events: events_tx,
            slice_delay: config.slice_delay(),
        };
        let state = QueueState {
            next_id: config.init_file_id,
            tasks: HashMap::new(),
            waiting: VecDeque::new(),
            pending: VecDeque::new(),
            active: Vec::new(),
            completed_count: 0,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                ctx,
                thumbnails,
                runtime,
                events_rx: Mutex::new(Some(events_rx)),
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.shared.config
    }

    /// Takes the event receiver. Can only be called once; events buffer
    /// until it is taken.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.shared.events_rx.lock().unwrap().take()
    }

    // ------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------

    /// Registers `files` in selection order and returns their ids.
    ///
    /// Thumbnails are extracted before this returns when enabled. With
    /// `auto_start_upload` the batch is then admitted immediately.
    pub async fn enqueue(&self, files: Vec<Arc<dyn FileSource>>) -> Vec<FileId> {
        let config = &self.shared.config;
        let tasks: Vec<Arc<FileTask>> = {
            let mut st = self.shared.state.lock().unwrap();
            let mut tasks = Vec::with_capacity(files.len());
            for source in files {
                st.next_id += 1;
                let id = st.next_id;
                let task = Arc::new(FileTask::new(
                    id,
                    source,
                    config.slice_size,
                    config.upload_max_retries,
                ));
                st.tasks.insert(id, Arc::clone(&task));
                st.waiting.push_back(id);
                tasks.push(task);
            }
            tasks
        };
        let ids: Vec<FileId> = tasks.iter().map(|t| t.id()).collect();
        info!(count = ids.len(), "files enqueued");

        if config.extract_thumbnails {
            self.extract_thumbnails(&tasks).await;
        }
        if config.auto_start_upload {
            self.start_uploads();
        }
        ids
    }

    async fn extract_thumbnails(&self, tasks: &[Arc<FileTask>]) {
        let jobs = tasks.iter().map(|task| async move {
            let thumb = match self.shared.thumbnails.extract(task.source().as_ref()).await {
                Ok(thumb) => thumb,
                Err(e) => {
                    warn!(file_id = task.id(), error = %e, "thumbnail extraction failed");
                    self.shared.config.default_thumb.clone()
                }
            };
            if task.set_thumbnail(thumb) {
                let _ = self
                    .shared
                    .ctx
                    .events
                    .send(UploadEvent::ThumbReady(ThumbReady { file_id: task.id() }));
            }
        });
        futures_util::future::join_all(jobs).await;
    }

    /// Admits every waiting task and starts the pump.
    ///
    /// A batch that arrives while nothing is pending or active starts in
    /// reverse selection order. A batch that arrives while the queue is
    /// busy lines up behind the existing pending tasks in selection order.
    pub fn start_uploads(&self) {
        let max = self.shared.config.max_parallel_uploads;
        let admit = {
            let mut st = self.shared.state.lock().unwrap();
            if st.waiting.is_empty() {
                return;
            }
            let batch: Vec<FileId> = st.waiting.drain(..).collect();
            for id in &batch {
                if let Some(task) = st.tasks.get(id) {
                    self.shared.ctx.counters.queue(task.size());
                }
            }

            let idle = st.pending.is_empty() && st.active.is_empty();
            if idle {
                st.pending.extend(batch.iter().rev());
            } else {
                st.pending.extend(batch.iter());
            }
            info!(files = batch.len(), pending = st.pending.len(), "upload batch admitted");
            let _ = self
                .shared
                .ctx
                .events
                .send(UploadEvent::UploadStarted(st.counts()));
            st.active.len() < max
        };
        if admit {
            self.spawn_pump(Duration::ZERO);
        }
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Runs `process_next` on the runtime after `delay`.
    fn spawn_pump(&self, delay: Duration) {
        let queue = self.clone();
        self.shared.runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            queue.process_next().await;
        });
    }

    /// Fills free slots, pausing `queue_delay` between admissions.
    async fn process_next(&self) {
        let max = self.shared.config.max_parallel_uploads;
        while self.admit_one() {
            let more = {
                let st = self.shared.state.lock().unwrap();
                st.active.len() < max && !st.pending.is_empty()
            };
            if !more {
                break;
            }
            tokio::time::sleep(self.shared.config.queue_delay()).await;
        }
    }

    /// Moves the front pending task into the active set and spawns its
    /// upload. Returns `false` when no slot or no task is available.
    fn admit_one(&self) -> bool {
        let task = {
            let mut st = self.shared.state.lock().unwrap();
            if st.active.len() >= self.shared.config.max_parallel_uploads {
                return false;
            }
            let Some(id) = st.pending.pop_front() else {
                return false;
            };
            let Some(task) = st.tasks.get(&id).cloned() else {
                return false;
            };
            st.active.push(id);
            task
        };

        task.start(&self.shared.ctx);
        let queue = self.clone();
        let running = Arc::clone(&task);
        self.shared.runtime.spawn(async move {
            let outcome = running.upload(&queue.shared.ctx).await;
            queue.on_file_settled(running.id(), &outcome);
        });

        let st = self.shared.state.lock().unwrap();
        debug!(file_id = task.id(), active = st.active.len(), "file admitted");
        let _ = self
            .shared
            .ctx
            .events
            .send(UploadEvent::UploadProgressed(st.counts()));
        true
    }

    /// Releases the slot held by `id`. Idempotent: only the first call for
    /// a task counts it as settled.
    fn on_file_settled(&self, id: FileId, outcome: &TaskOutcome) {
        let max = self.shared.config.max_parallel_uploads;
        let admit = {
            let mut st = self.shared.state.lock().unwrap();
            if !st.remove(id) {
                return;
            }
            st.completed_count += 1;
            let counts = st.counts();
            let tx = &self.shared.ctx.events;
            let _ = tx.send(UploadEvent::UploadProgressed(counts));
            debug!(file_id = id, status = ?outcome.status(), "file settled");

            if st.in_flight() == 0 {
                let _ = tx.send(UploadEvent::UploadCompleted(counts));
                info!(files = st.completed_count, "upload batch finished");
            }
            !st.pending.is_empty() && st.active.len() < max
        };
        if admit {
            self.spawn_pump(self.shared.config.queue_delay());
        }
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    /// Cancels one file. Returns `Ok(false)` if it had already finished.
    ///
    /// The slot is released immediately either way.
    pub fn cancel(&self, id: FileId) -> Result<bool, QueueError> {
        let task = {
            let st = self.shared.state.lock().unwrap();
            st.tasks.get(&id).cloned().ok_or(QueueError::UnknownFile(id))?
        };
        let canceled = task.cancel(&self.shared.ctx);
        let outcome = if canceled {
            TaskOutcome::Canceled
        } else {
            TaskOutcome::Completed(serde_json::Value::Null)
        };
        self.on_file_settled(id, &outcome);
        Ok(canceled)
    }

    /// Routes `prefix + "fileupload.cancel"` requests from `bus` to
    /// [`cancel`](Self::cancel). The subscription does not keep the queue
    /// alive.
    pub fn listen_for_cancel(&self, bus: &dyn EventBus) -> SubscriptionId {
        let name = prefixed(&self.shared.config.event_prefix, events::FILE_CANCEL);
        let weak = Arc::downgrade(&self.shared);
        bus.subscribe(
            &name,
            Arc::new(move |payload: &serde_json::Value| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let queue = UploadQueue { shared };
                match serde_json::from_value::<CancelRequest>(payload.clone()) {
                    Ok(req) => {
                        if let Err(e) = queue.cancel(req.file_id) {
                            warn!(error = %e, "cancel request ignored");
                        }
                    }
                    Err(e) => warn!(error = %e, "malformed cancel request"),
                }
            }),
        )
    }

    /// Forgets every settled task and zeroes the byte counters.
    ///
    /// Ids are never reused, so numbering continues after a reset.
    pub fn reset(&self) -> Result<(), QueueError> {
        let mut st = self.shared.state.lock().unwrap();
        let in_flight = st.in_flight();
        if in_flight > 0 {
            return Err(QueueError::Busy(in_flight));
        }
        st.tasks.clear();
        st.completed_count = 0;
        self.shared.ctx.counters.reset();
        info!("queue reset");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn thumbnail(&self, id: FileId) -> Option<String> {
        let st = self.shared.state.lock().unwrap();
        st.tasks.get(&id).and_then(|t| t.thumbnail())
    }

    pub fn task(&self, id: FileId) -> Option<FileTaskSnapshot> {
        let task = self.shared.state.lock().unwrap().tasks.get(&id).cloned();
        task.map(|t| t.snapshot())
    }

    pub fn stats(&self) -> QueueStats {
        let st = self.shared.state.lock().unwrap();
        QueueStats {
            waiting: st.waiting.iter().copied().collect(),
            pending: st.pending.iter().copied().collect(),
            active: st.active.clone(),
            completed_count: st.completed_count,
            total_bytes_queued: self.shared.ctx.counters.total_queued(),
            uploaded_bytes: self.shared.ctx.counters.uploaded(),
        }
    }

    /// `true` while any task is waiting, pending or active.
    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().unwrap().in_flight() > 0
    }
}
