//! JSONL file writer for lifecycle events.
//!
//! Each [`LifecycleEvent`] is stamped into an [`EventRecord`] and serialized
//! as a single JSON line carrying `type` and an RFC3339 `timestamp`.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use taskpilot_application::LifecycleNotifier;
use taskpilot_domain::{EventRecord, LifecycleEvent};
use tracing::warn;

/// Appends one JSON object per lifecycle event. Flushes on `Drop`.
pub struct JsonlEventLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlEventLog {
    /// Open (or create) the log for appending.
    ///
    /// Creates parent directories as needed. Returns `None` when the file
    /// cannot be opened; the run continues without an event log.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create event log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open event log {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LifecycleNotifier for JsonlEventLog {
    fn notify(&self, event: &LifecycleEvent) {
        let record = EventRecord::now(event.clone());
        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };

        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{}", line);
        // terminal events are the ones a tailing client waits for
        if event.is_terminal() {
            let _ = writer.flush();
        }
    }
}

impl Drop for JsonlEventLog {
    fn drop(&mut self) {
        let _ = self.writer.lock().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpilot_domain::{PlanId, TaskId};

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_writes_one_record_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/events.jsonl");
        let log = JsonlEventLog::new(&path).unwrap();

        log.notify(&LifecycleEvent::TaskStarted {
            task_id: TaskId::new("t1"),
            description: "Build a greeter".into(),
        });
        log.notify(&LifecycleEvent::PlanCreated {
            task_id: TaskId::new("t1"),
            plan_id: PlanId::new("p1"),
            step_count: 2,
        });
        drop(log);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "taskStarted");
        assert_eq!(lines[0]["taskId"], "t1");
        assert!(lines[0]["timestamp"].is_string());
        assert_eq!(lines[1]["type"], "planCreated");
        assert_eq!(lines[1]["stepCount"], 2);
    }

    #[test]
    fn test_terminal_event_is_flushed_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = JsonlEventLog::new(&path).unwrap();

        log.notify(&LifecycleEvent::TaskStopped {
            task_id: TaskId::new("t1"),
            iterations: 4,
        });
        // still open
        let lines = read_lines(log.path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["type"], "taskStopped");
    }

    #[test]
    fn test_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        for _ in 0..2 {
            let log = JsonlEventLog::new(&path).unwrap();
            log.notify(&LifecycleEvent::TaskStopped {
                task_id: TaskId::new("t"),
                iterations: 0,
            });
        }
        assert_eq!(read_lines(&path).len(), 2);
    }
}
