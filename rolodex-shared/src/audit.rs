/// Append-only audit trail
///
/// Administrative and security-relevant actions are written as one JSON
/// object per line to a file kept apart from the relational store. Lines are
/// only ever appended.
///
/// Recording never fails the caller: I/O errors are logged and swallowed.
///
/// # Example
///
/// ```no_run
/// use rolodex_shared::audit::AuditRecorder;
/// use serde_json::json;
///
/// # async fn example() {
/// let audit = AuditRecorder::new("audit.log");
/// audit.record("account_created", Some(1), json!({"account_id": 7})).await;
///
/// for event in audit.recent(10).await {
///     println!("{} {}", event.timestamp, event.action);
/// }
/// # }
/// ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One audit line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,

    /// Action tag such as `login` or `opportunity_deleted`
    pub action: String,

    /// Acting user, if known
    pub actor_id: Option<i64>,

    /// Free-form JSON object
    pub details: Value,
}

/// Serialized writer and reader for the audit file
///
/// Cheap to clone; clones share the write lock.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AuditRecorder {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Arc::new(path.as_ref().to_path_buf()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one event
    pub async fn record(&self, action: &str, actor_id: Option<i64>, details: Value) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            action: action.to_string(),
            actor_id,
            details,
        };

        if let Err(e) = self.append(&event).await {
            tracing::error!(
                error = %e,
                path = %self.path.display(),
                action = %event.action,
                "Failed to write audit event"
            );
        } else {
            tracing::debug!(action = %event.action, actor_id = ?event.actor_id, "Audit event recorded");
        }
    }

    async fn append(&self, event: &AuditEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_ref())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Last `n` events, newest first
    ///
    /// A missing file reads as empty; lines that do not parse are skipped.
    pub async fn recent(&self, n: usize) -> Vec<AuditEvent> {
        let contents = {
            let _guard = self.lock.lock().await;
            match tokio::fs::read_to_string(self.path.as_ref()).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
                Err(e) => {
                    tracing::error!(error = %e, path = %self.path.display(), "Failed to read audit log");
                    return Vec::new();
                }
            }
        };

        contents
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<AuditEvent>(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unparseable audit line");
                    None
                }
            })
            .take(n)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_and_recent_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditRecorder::new(dir.path().join("audit.log"));

        audit.record("login", Some(1), json!({})).await;
        audit.record("account_created", Some(1), json!({"account_id": 5})).await;
        audit.record("logout", None, json!({"reason": "idle"})).await;

        let events = audit.recent(2).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "logout");
        assert_eq!(events[0].actor_id, None);
        assert_eq!(events[1].details["account_id"], 5);

        let contents = std::fs::read_to_string(audit.path()).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditRecorder::new(dir.path().join("never-written.log"));
        assert!(audit.recent(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let audit = AuditRecorder::new(&path);

        audit.record("first", Some(1), json!({})).await;
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap()
            .write_all(b"{not json}\n\n")
            .await
            .unwrap();
        audit.record("second", Some(2), json!({})).await;

        let events = audit.recent(10).await;
        let actions: Vec<_> = events.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let audit = AuditRecorder::new(dir.path());
        audit.record("login", Some(1), json!({})).await;
        assert!(audit.recent(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditRecorder::new(dir.path().join("audit.log"));

        let mut handles = Vec::new();
        for i in 0..20 {
            let audit = audit.clone();
            handles.push(tokio::spawn(async move {
                audit.record("contact_created", Some(i), json!({"n": i})).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(audit.recent(100).await.len(), 20);
    }
}
