//! One plain-text log file per session, next to its status file.
//!
//! [`InstanceLogFiles`] is a `tracing` layer: every event that carries an
//! `instance` field is appended to `bot_<instance>.log`. Events without one
//! (fleet-level messages) only reach the other layers.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Context, Layer};

use crate::state_machine::lock;

pub struct InstanceLogFiles {
    dir: PathBuf,
    // `None` remembers a file that could not be opened.
    files: Mutex<HashMap<u64, Option<RollingFileAppender>>>,
}

impl InstanceLogFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(dir: &Path, instance_id: u64) -> PathBuf {
        dir.join(format!("bot_{instance_id}.log"))
    }

    fn open(&self, instance_id: u64) -> Option<RollingFileAppender> {
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(format!("bot_{instance_id}.log"))
            .build(&self.dir)
            .ok()
    }
}

impl<S: Subscriber> Layer<S> for InstanceLogFiles {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = EventFields::default();
        event.record(&mut fields);
        let Some(instance_id) = fields.instance else {
            return;
        };

        let line = format!(
            "{} {:>5} {}{}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            event.metadata().level().to_string(),
            fields.message,
            fields.rest
        );
        let mut files = lock(&self.files);
        let file = files
            .entry(instance_id)
            .or_insert_with(|| self.open(instance_id));
        if let Some(file) = file {
            // Nowhere left to report a failing log write.
            let _ = file.write_all(line.as_bytes());
        }
    }
}

#[derive(Default)]
struct EventFields {
    instance: Option<u64>,
    message: String,
    rest: String,
}

impl EventFields {
    fn push(&mut self, field: &Field, value: impl fmt::Display) {
        let _ = write!(self.rest, " {}={value}", field.name());
    }
}

impl Visit for EventFields {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "instance" {
            self.instance = Some(value);
        } else {
            self.push(field, value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push(field, value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push(field, format_args!("{value:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tracing::{info, warn};
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn events_land_in_their_instance_file() {
        let dir = tempfile::tempdir().unwrap();
        let subscriber = tracing_subscriber::registry().with(InstanceLogFiles::new(dir.path()));

        tracing::subscriber::with_default(subscriber, || {
            info!(instance = 3u32, state = "IDLE", "State changed to: IDLE");
            warn!(instance = 4u32, "engine loop did not stop in time, aborting");
            info!(instance = 3u32, retries = 2, "Dismissed popup: aadhaar_popup");
            info!("fleet finished");
        });

        let three = fs::read_to_string(InstanceLogFiles::path_for(dir.path(), 3)).unwrap();
        let lines: Vec<&str> = three.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" INFO State changed to: IDLE state=IDLE"));
        assert!(lines[1].contains("Dismissed popup: aadhaar_popup retries=2"));

        let four = fs::read_to_string(InstanceLogFiles::path_for(dir.path(), 4)).unwrap();
        assert!(four.contains(" WARN engine loop did not stop in time"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
