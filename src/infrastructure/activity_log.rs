use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const ACTIVITY_LOG_FILE: &str = "commands.log";

/// JSON-lines log of scheduling operations under `logs/`.
#[derive(Debug)]
pub struct ActivityLog {
    logs_dir: PathBuf,
    guard: Mutex<()>,
}

impl ActivityLog {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.logs_dir.join(ACTIVITY_LOG_FILE)
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn info(&self, command: &str, message: &str) {
        self.append("info", command, message);
    }

    pub fn warn(&self, command: &str, message: &str) {
        self.append("warn", command, message);
    }

    pub fn error(&self, command: &str, message: &str) {
        self.append("error", command, message);
    }

    // Logging never fails the caller.
    fn append(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        match OpenOptions::new().create(true).append(true).open(self.path()) {
            Ok(mut file) => {
                if let Err(error) = writeln!(file, "{payload}") {
                    tracing::debug!(%error, "failed to write activity log entry");
                }
            }
            Err(error) => tracing::debug!(%error, "failed to open activity log"),
        }
    }
}
