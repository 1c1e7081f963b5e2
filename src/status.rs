//! Where session action logs are published.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TatkalError;
use crate::state_machine::{LogEntry, State};

/// Receives the full log snapshot of a session after every entry.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, instance_id: u32, entries: &[LogEntry]) -> Result<(), TatkalError>;
}

/// Writes `bot_<id>_status.json` (a JSON array of entries) per session.
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, instance_id: u32) -> PathBuf {
        status_file(&self.dir, instance_id)
    }
}

pub fn status_file(dir: &Path, instance_id: u32) -> PathBuf {
    dir.join(format!("bot_{instance_id}_status.json"))
}

/// Read back a status file written by [`JsonFileSink`].
pub fn read_status(path: &Path) -> Result<Vec<LogEntry>, TatkalError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[async_trait]
impl StatusSink for JsonFileSink {
    async fn publish(&self, instance_id: u32, entries: &[LogEntry]) -> Result<(), TatkalError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec(entries)?;
        // Write then rename so readers never see a half-written file.
        let path = self.path_for(instance_id);
        let partial = path.with_extension("json.tmp");
        tokio::fs::write(&partial, json).await?;
        tokio::fs::rename(&partial, &path).await?;
        Ok(())
    }
}

/// The latest state of one session, as a display would want it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub instance_id: u32,
    pub state: State,
    pub latest: Option<LogEntry>,
}

/// Forwards a compact update per snapshot into a channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StatusSink for ChannelSink {
    async fn publish(&self, instance_id: u32, entries: &[LogEntry]) -> Result<(), TatkalError> {
        let Some(latest) = entries.last() else {
            return Ok(());
        };
        // A closed receiver just means nobody is watching any more.
        let _ = self.tx.send(StatusUpdate {
            instance_id,
            state: latest.state,
            latest: Some(latest.clone()),
        });
        Ok(())
    }
}

/// Publishes to several sinks; one failing does not stop the others.
pub struct FanOut {
    sinks: Vec<Box<dyn StatusSink>>,
}

impl FanOut {
    pub fn new(sinks: Vec<Box<dyn StatusSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl StatusSink for FanOut {
    async fn publish(&self, instance_id: u32, entries: &[LogEntry]) -> Result<(), TatkalError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(instance_id, entries).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Local;

    use super::*;

    fn entry(state: State, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Local::now(),
            message: message.to_string(),
            state,
            is_error: false,
            is_state_change: true,
        }
    }

    #[tokio::test]
    async fn file_sink_writes_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("logs"));
        let entries = vec![
            entry(State::Starting, "State changed to: STARTING"),
            entry(State::Idle, "State changed to: IDLE"),
        ];

        sink.publish(4, &entries).await.unwrap();

        let path = dir.path().join("logs").join("bot_4_status.json");
        let read = read_status(&path).unwrap();
        assert_eq!(read, entries);

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[1]["state"], "IDLE");
        assert_eq!(raw[1]["is_state_change"], true);
    }

    #[tokio::test]
    async fn file_sink_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        sink.publish(1, &[entry(State::Starting, "a")]).await.unwrap();
        sink.publish(1, &[entry(State::Starting, "a"), entry(State::Idle, "b")])
            .await
            .unwrap();
        assert_eq!(read_status(&sink.path_for(1)).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn channel_sink_sends_latest_state() {
        let (sink, mut rx) = ChannelSink::new();
        sink.publish(2, &[entry(State::Idle, "a"), entry(State::LoggedOut, "b")])
            .await
            .unwrap();
        sink.publish(2, &[]).await.unwrap();
        drop(sink);

        let update = rx.recv().await.unwrap();
        assert_eq!(update.instance_id, 2);
        assert_eq!(update.state, State::LoggedOut);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn fan_out_reaches_every_sink() {
        let (first, mut rx1) = ChannelSink::new();
        let (second, mut rx2) = ChannelSink::new();
        let fan = FanOut::new(vec![Box::new(first) as Box<dyn StatusSink>, Box::new(second)]);
        fan.publish(1, &[entry(State::AtDashboard, "x")]).await.unwrap();
        assert_eq!(rx1.recv().await.unwrap().state, State::AtDashboard);
        assert_eq!(rx2.recv().await.unwrap().state, State::AtDashboard);
    }
}
