use std::{
    fs::{self, File},
    io::{self, BufWriter, Write as _},
    path::PathBuf,
    sync::{
        Arc, Mutex, PoisonError,
        mpsc::{self, Sender},
    },
    thread::{self, JoinHandle},
};

use chrono::Utc;

use super::stage::SessionSnapshot;

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum SinkError {
    #[display("I/O error while persisting metrics: {_0}")]
    Io(io::Error),
    #[display("failed to encode metrics snapshot: {_0}")]
    Encode(serde_json::Error),
    #[display("metrics sink worker has shut down")]
    #[from(ignore)]
    Closed,
}

/// External store for session metrics snapshots.
///
/// The aggregator calls [`save`](Self::save) once per completed stage and only
/// logs a returned error: persistence is best-effort and never retried.
pub trait MetricsSink: Send {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SinkError>;
}

impl<S> MetricsSink for Box<S>
where
    S: MetricsSink + ?Sized,
{
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SinkError> {
        (**self).save(snapshot)
    }
}

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn save(&self, _snapshot: &SessionSnapshot) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps snapshots in memory; clones share the same storage.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    snapshots: Arc<Mutex<Vec<SessionSnapshot>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything saved so far, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MetricsSink for MemorySink {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SinkError> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
        Ok(())
    }
}

/// Writes each snapshot as a pretty-printed JSON file.
///
/// Files are named `{session_id}_{stages_completed}_{YYYYMMDD_HHMMSS}.json`
/// inside the target directory, which is created on first use.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MetricsSink for JsonDirSink {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir)?;
        let filename = format!(
            "{}_{:03}_{}.json",
            snapshot.session_id,
            snapshot.cumulative_metrics.stages_completed,
            Utc::now().format("%Y%m%d_%H%M%S"),
        );
        let path = self.dir.join(filename);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, snapshot)?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), "metrics snapshot written");
        Ok(())
    }
}

/// Runs another sink on a worker thread so that callers never block on I/O.
///
/// Snapshots are queued through a channel; failures inside the worker are
/// logged and dropped. Dropping the `BackgroundSink` drains the queue and
/// joins the worker.
#[derive(Debug)]
pub struct BackgroundSink {
    sender: Option<Sender<SessionSnapshot>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundSink {
    pub fn spawn<S>(inner: S) -> Self
    where
        S: MetricsSink + 'static,
    {
        let (sender, receiver) = mpsc::channel::<SessionSnapshot>();
        let worker = thread::spawn(move || {
            for snapshot in receiver {
                if let Err(e) = inner.save(&snapshot) {
                    tracing::warn!(
                        session_id = %snapshot.session_id,
                        error = %e,
                        "failed to persist metrics snapshot"
                    );
                }
            }
        });
        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }
}

impl MetricsSink for BackgroundSink {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SinkError> {
        let sender = self.sender.as_ref().ok_or(SinkError::Closed)?;
        sender
            .send(snapshot.clone())
            .map_err(|_| SinkError::Closed)
    }
}

impl Drop for BackgroundSink {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("metrics sink worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::stage::{CumulativeMetrics, CumulativeSnapshot};

    fn snapshot(session_id: &str) -> SessionSnapshot {
        SessionSnapshot {
            session_id: session_id.to_owned(),
            cumulative_metrics: CumulativeSnapshot::from(&CumulativeMetrics::new()),
            stage_metrics: vec![],
            skill_history: vec![],
        }
    }

    #[test]
    fn test_memory_sink_shares_storage_between_clones() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        sink.save(&snapshot("a")).unwrap();
        sink.save(&snapshot("b")).unwrap();
        let ids: Vec<_> = handle
            .snapshots()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_background_sink_flushes_on_drop() {
        let memory = MemorySink::new();
        let background = BackgroundSink::spawn(memory.clone());
        for i in 0..5 {
            background.save(&snapshot(&format!("s{i}"))).unwrap();
        }
        drop(background);
        assert_eq!(memory.snapshots().len(), 5);
    }

    #[test]
    fn test_json_dir_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDirSink::new(dir.path().join("metrics"));
        sink.save(&snapshot("session-1")).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path().join("metrics"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("session-1_000_"));

        let text = fs::read_to_string(&entries[0]).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back, snapshot("session-1"));
    }
}
