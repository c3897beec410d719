//! Application orchestrator: wires the queue, the bus and the transport.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chunkup_events::{EventBus, LocalBus, forward, prefixed};
use chunkup_protocol::{CancelRequest, FileId, TaskStatus, events};
use chunkup_queue::UploadQueue;
use chunkup_transfer::{DiskFile, FileSource};
use tokio::sync::Notify;

use crate::config::Config;

/// Uploads `paths` and waits until every file has settled.
pub async fn run(config: Config, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    let sources = open_sources(&paths).await?;

    let queue = UploadQueue::http(config.uploader.clone())?;
    let prefix = config.uploader.event_prefix.clone();
    let bus: Arc<dyn EventBus> = Arc::new(LocalBus::new());

    // -- Event logging --
    for name in events::ALL_EVENTS {
        if name == events::FILE_PROGRESS && !config.log_progress {
            continue;
        }
        bus.subscribe(
            &prefixed(&prefix, name),
            Arc::new(move |payload: &serde_json::Value| log_event(name, payload)),
        );
    }

    let done = Arc::new(Notify::new());
    let notify = Arc::clone(&done);
    bus.subscribe(
        &prefixed(&prefix, events::UPLOAD_COMPLETED),
        Arc::new(move |_: &serde_json::Value| notify.notify_one()),
    );

    queue.listen_for_cancel(bus.as_ref());
    let stream = queue
        .take_events()
        .context("queue event stream already taken")?;
    tokio::spawn(forward(stream, Arc::clone(&bus), prefix.clone()));

    // -- Upload --
    let ids = queue.enqueue(sources).await;
    if !config.uploader.auto_start_upload {
        queue.start_uploads();
    }

    tokio::select! {
        _ = done.notified() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, canceling uploads");
            let name = prefixed(&prefix, events::FILE_CANCEL);
            for &file_id in &ids {
                bus.publish(&name, serde_json::to_value(CancelRequest { file_id })?);
            }
            done.notified().await;
        }
    }

    report(&queue, &ids)
}

/// Opens every path as a disk-backed source, in the given order.
async fn open_sources(paths: &[PathBuf]) -> anyhow::Result<Vec<Arc<dyn FileSource>>> {
    let mut sources: Vec<Arc<dyn FileSource>> = Vec::with_capacity(paths.len());
    for path in paths {
        let file = DiskFile::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        tracing::debug!(path = %file.path().display(), bytes = file.size(), "file opened");
        sources.push(Arc::new(file));
    }
    Ok(sources)
}

fn log_event(name: &str, payload: &serde_json::Value) {
    match name {
        events::FILE_FAILED => tracing::warn!(event = name, %payload, "upload event"),
        events::FILE_PROGRESS | events::UPLOAD_PROGRESS => {
            tracing::debug!(event = name, %payload, "upload event")
        }
        _ => tracing::info!(event = name, %payload, "upload event"),
    }
}

/// Logs the final state of every file. Fails if any upload failed.
fn report(queue: &UploadQueue, ids: &[FileId]) -> anyhow::Result<()> {
    let mut failed = 0;
    for &id in ids {
        let Some(task) = queue.task(id) else {
            continue;
        };
        tracing::info!(
            file_id = id,
            name = %task.file_name,
            status = ?task.status,
            parts = task.parts_uploaded,
            total = task.total_parts,
            "file settled"
        );
        if task.status == TaskStatus::Failed {
            failed += 1;
        }
    }

    let stats = queue.stats();
    tracing::info!(
        files = stats.completed_count,
        bytes = stats.uploaded_bytes,
        "upload finished"
    );
    if failed > 0 {
        anyhow::bail!("{failed} upload(s) failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sources_keep_argument_order() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        std::fs::write(&a, [1u8; 10]).unwrap();
        std::fs::write(&b, [2u8; 3]).unwrap();

        let sources = open_sources(&[b.clone(), a.clone()]).await.unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["b.bin", "a.bin"]);
        assert_eq!(sources[0].size(), 3);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.bin");
        let err = open_sources(&[missing]).await.err().unwrap();
        assert!(err.to_string().contains("nope.bin"));
    }

    #[tokio::test]
    async fn directory_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(open_sources(&[tmp.path().to_path_buf()]).await.is_err());
    }
}
