//! File-backed navigation state.
//!
//! Three JSON documents live under the state directory:
//!
//! ```text
//! <dir>/
//!   action_log.json     # { "<image>": [ {action, status, description, obstacles}, ... ] }
//!   last_success.json   # { "image": "<image>", "action": "<action>" }
//!   arrivals.json       # { "<image>": { "from": "<image>", "via": "<action>" } }
//! ```
//!
//! A missing file means "no prior state". There is no locking: concurrent
//! runs against the same directory race.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::StateConfig;
use crate::errors::{NavError, NavResult};
use crate::navigation::action::{strip_failure_marker, Status, LOST_TARGET_SUFFIX};
use crate::navigation::parser::{Obstacle, ParsedReply};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub action: String,
    pub status: Status,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
}

impl From<ParsedReply> for LogEntry {
    fn from(reply: ParsedReply) -> Self {
        Self {
            action: reply.action,
            status: reply.status,
            description: reply.description,
            obstacles: reply.obstacles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSuccess {
    pub image: String,
    pub action: String,
}

/// How a frame was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrival {
    pub from: String,
    pub via: String,
}

pub type Arrivals = BTreeMap<String, Arrival>;

/// Attempts per frame, keyed by image file name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionLog(BTreeMap<String, Vec<LogEntry>>);

impl ActionLog {
    pub fn entries(&self, image: &str) -> &[LogEntry] {
        self.0.get(image).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Actions that failed on `image`, with their failure marker stripped.
    pub fn failed_actions(&self, image: &str) -> Vec<String> {
        self.entries(image)
            .iter()
            .filter(|e| e.status == Status::Fail)
            .map(|e| strip_failure_marker(&e.action).to_string())
            .collect()
    }

    /// Append `entry` unless `image` already has an entry with the same action.
    /// Returns whether the entry was added.
    pub fn record(&mut self, image: &str, entry: LogEntry) -> bool {
        let entries = self.0.entry(image.to_string()).or_default();
        if entries.iter().any(|e| e.action == entry.action) {
            return false;
        }
        entries.push(entry);
        true
    }

    /// Flip the most recent successful entry matching `last` to failed and
    /// tag its action text. Returns whether an entry was changed.
    pub fn mark_lost(&mut self, last: &LastSuccess) -> bool {
        let Some(entries) = self.0.get_mut(&last.image) else {
            return false;
        };
        match entries
            .iter_mut()
            .rev()
            .find(|e| e.action == last.action && e.status == Status::Ok)
        {
            Some(entry) => {
                entry.status = Status::Fail;
                entry.action.push_str(LOST_TARGET_SUFFIX);
                true
            }
            None => false,
        }
    }
}

/// Paths of the three state documents.
#[derive(Debug, Clone)]
pub struct StateStore {
    action_log: PathBuf,
    last_success: PathBuf,
    arrivals: PathBuf,
}

impl StateStore {
    /// State files with their default names under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::from_config(&StateConfig {
            dir: dir.as_ref().to_path_buf(),
            ..StateConfig::default()
        })
    }

    pub fn from_config(cfg: &StateConfig) -> Self {
        Self {
            action_log: cfg.dir.join(&cfg.action_log),
            last_success: cfg.dir.join(&cfg.last_success),
            arrivals: cfg.dir.join(&cfg.arrivals),
        }
    }

    pub fn paths(&self) -> [&Path; 3] {
        [
            self.action_log.as_path(),
            self.last_success.as_path(),
            self.arrivals.as_path(),
        ]
    }

    // ── Action log ──

    pub fn load_action_log(&self) -> NavResult<ActionLog> {
        Ok(read_json(&self.action_log)?.unwrap_or_default())
    }

    pub fn save_action_log(&self, log: &ActionLog) -> NavResult<()> {
        write_json(&self.action_log, log)
    }

    // ── Last success ──

    pub fn last_success(&self) -> NavResult<Option<LastSuccess>> {
        read_json(&self.last_success)
    }

    pub fn set_last_success(&self, image: &str, action: &str) -> NavResult<()> {
        write_json(
            &self.last_success,
            &LastSuccess {
                image: image.to_string(),
                action: action.to_string(),
            },
        )
    }

    // ── Arrivals ──

    pub fn arrivals(&self) -> NavResult<Arrivals> {
        Ok(read_json(&self.arrivals)?.unwrap_or_default())
    }

    pub fn arrival(&self, image: &str) -> NavResult<Option<Arrival>> {
        Ok(self.arrivals()?.remove(image))
    }

    /// Record that `to` was reached from `from` via `via`. Last write wins.
    pub fn record_arrival(&self, to: &str, from: &str, via: &str) -> NavResult<()> {
        let mut arrivals = self.arrivals()?;
        arrivals.insert(
            to.to_string(),
            Arrival {
                from: from.to_string(),
                via: via.to_string(),
            },
        );
        write_json(&self.arrivals, &arrivals)
    }

    /// Delete every state file. Returns how many existed.
    pub fn reset(&self) -> NavResult<usize> {
        let mut removed = 0;
        for path in self.paths() {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> NavResult<Option<T>> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    // A `null` document reads the same as a missing one.
    serde_json::from_str::<Option<T>>(&json)
        .map_err(|e| NavError::State(format!("{}: {e}", path.display())))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> NavResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    tracing::debug!(path = %path.display(), "state written");
    Ok(())
}
