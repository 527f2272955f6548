//! Outbound tech debt events.
//!
//! Events are handed to a [`NotificationSink`] on a background thread pool.
//! Delivery is best effort: a failed emit is logged with the context the
//! caller supplied and is never retried or reported back.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use threadpool::ThreadPool;

use crate::alerts::AlertType;
use crate::catalog::ResourceType;
use crate::config::{NotificationsConfig, SinkKind};
use crate::error::AlertError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechDebtEvent {
    pub resource_id: String,
    pub resource_name: String,
    pub workspace_id: String,
    pub project_id: String,
    pub created_at: i64, // epoch millis
    pub tech_debt_id: String,
    pub env_base_url: String,
    pub external_id: String,
    pub resource_type: ResourceType,
    pub project_name: String,
    pub alert_type: AlertType,
    pub alert_initiator: String,
}

/// Destination for tech debt events
pub trait NotificationSink: Send + Sync {
    fn emit(&self, topic: &str, event: &TechDebtEvent) -> Result<(), AlertError>;
}

/// Writes each event to the application log
pub struct LogSink;

impl NotificationSink for LogSink {
    fn emit(&self, topic: &str, event: &TechDebtEvent) -> Result<(), AlertError> {
        info!("[{}] {}", topic, serde_json::to_string(event)?);
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    topic: &'a str,
    event: &'a TechDebtEvent,
}

/// Appends one JSON document per event to a file
pub struct JsonLinesSink {
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self, AlertError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(JsonLinesSink {
            file: Mutex::new(file),
        })
    }
}

impl NotificationSink for JsonLinesSink {
    fn emit(&self, topic: &str, event: &TechDebtEvent) -> Result<(), AlertError> {
        let mut line = serde_json::to_string(&JsonLine { topic, event })?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| AlertError::Notification("event file lock poisoned".into()))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Keyed SHA-256 of the acting user id. Receivers get a stable identifier for
/// the actor without the platform user id itself.
pub fn external_id(secret: &str, user_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(user_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fire-and-forget dispatcher in front of a sink
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    pool: Mutex<ThreadPool>,
    topic: String,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, topic: impl Into<String>, threads: usize) -> Self {
        Notifier {
            sink,
            pool: Mutex::new(ThreadPool::with_name(
                "notifications".into(),
                threads.max(1),
            )),
            topic: topic.into(),
        }
    }

    pub fn from_config(config: &NotificationsConfig) -> Result<Self, AlertError> {
        let sink: Arc<dyn NotificationSink> = match config.sink_kind() {
            SinkKind::Log => Arc::new(LogSink),
            SinkKind::JsonLines => Arc::new(JsonLinesSink::open(&config.jsonl_path)?),
        };
        Ok(Self::new(sink, config.topic.clone(), config.threads()))
    }

    /// Queues `event` for emission and returns immediately. `context` names
    /// the service or installation the event is for, for the failure log.
    pub fn dispatch(&self, event: TechDebtEvent, context: String) {
        let sink = Arc::clone(&self.sink);
        let topic = self.topic.clone();

        let job = move || match sink.emit(&topic, &event) {
            Ok(()) => debug!(
                "Emitted tech debt event {} for {}",
                event.tech_debt_id, context
            ),
            Err(e) => error!(
                "Failed to emit tech debt event {} for {}: {}",
                event.tech_debt_id, context, e
            ),
        };

        match self.pool.lock() {
            Ok(pool) => pool.execute(job),
            Err(_) => error!("Notification pool lock poisoned; dropping event"),
        }
    }

    /// Blocks until every queued event has been handed to the sink
    pub fn join(&self) {
        let pool = match self.pool.lock() {
            Ok(pool) => pool.clone(),
            Err(_) => return,
        };
        pool.join();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashSet;

    /// Records every event; fails for the listed resource ids
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<(String, TechDebtEvent)>>,
        pub failing_resources: HashSet<String>,
    }

    impl RecordingSink {
        pub fn failing_for(resource_ids: &[&str]) -> Self {
            RecordingSink {
                events: Mutex::new(Vec::new()),
                failing_resources: resource_ids.iter().map(|s| s.to_string()).collect(),
            }
        }

        pub fn events(&self) -> Vec<TechDebtEvent> {
            let mut events: Vec<TechDebtEvent> = self
                .events
                .lock()
                .unwrap()
                .iter()
                .map(|(_, e)| e.clone())
                .collect();
            events.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
            events
        }
    }

    impl NotificationSink for RecordingSink {
        fn emit(&self, topic: &str, event: &TechDebtEvent) -> Result<(), AlertError> {
            self.events
                .lock()
                .unwrap()
                .push((topic.to_string(), event.clone()));
            if self.failing_resources.contains(&event.resource_id) {
                return Err(AlertError::Notification("sink unavailable".into()));
            }
            Ok(())
        }
    }

    pub fn event(resource_id: &str, tech_debt_id: &str) -> TechDebtEvent {
        TechDebtEvent {
            resource_id: resource_id.into(),
            resource_name: "Orders".into(),
            workspace_id: "ws".into(),
            project_id: "p1".into(),
            created_at: 1_700_000_000_000,
            tech_debt_id: tech_debt_id.into(),
            env_base_url: "http://localhost:3001".into(),
            external_id: external_id("secret", "user-1"),
            resource_type: ResourceType::Service,
            project_name: "Project One".into(),
            alert_type: AlertType::TemplateVersion,
            alert_initiator: "Node template".into(),
        }
    }
}
