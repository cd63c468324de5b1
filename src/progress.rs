//! Sync progress reporting.
//!
//! Reports observable progress during `ssync sync` so users see which phase
//! is running and how far along it is. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for sync.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SyncProgressEvent {
    /// Listing the source for this subproject (or the whole project).
    Discovering { scope: String },
    /// Creating destination folders and file handles.
    Materializing { nodes: u64 },
    /// Applying one subproject's provenance document.
    Binding { subproject: String, relations: u64 },
    /// Storing files: n stored out of total leaves.
    Storing { n: u64, total: u64 },
}

impl SyncProgressEvent {
    fn phase(&self) -> &'static str {
        match self {
            SyncProgressEvent::Discovering { .. } => "discovering",
            SyncProgressEvent::Materializing { .. } => "materializing",
            SyncProgressEvent::Binding { .. } => "binding",
            SyncProgressEvent::Storing { .. } => "storing",
        }
    }
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync  storing  1,234 / 5,000 files".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Discovering { scope } => {
                format!("sync {}  discovering...\n", scope)
            }
            SyncProgressEvent::Materializing { nodes } => {
                format!("sync  materializing  {} nodes\n", format_number(*nodes))
            }
            SyncProgressEvent::Binding {
                subproject,
                relations,
            } => format!(
                "sync {}  binding  {} relations\n",
                subproject,
                format_number(*relations)
            ),
            SyncProgressEvent::Storing { n, total } => format!(
                "sync  storing  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &SyncProgressEvent) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "event": "progress",
            "phase": event.phase(),
        });
        let extra = match event {
            SyncProgressEvent::Discovering { scope } => serde_json::json!({ "scope": scope }),
            SyncProgressEvent::Materializing { nodes } => serde_json::json!({ "nodes": nodes }),
            SyncProgressEvent::Binding {
                subproject,
                relations,
            } => serde_json::json!({ "subproject": subproject, "relations": relations }),
            SyncProgressEvent::Storing { n, total } => {
                serde_json::json!({ "n": n, "total": total })
            }
        };
        if let (Some(map), serde_json::Value::Object(fields)) = (obj.as_object_mut(), extra) {
            map.extend(fields);
        }
        obj
    }
}

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_event_is_flat() {
        let v = JsonProgress::to_json(&SyncProgressEvent::Storing { n: 3, total: 10 });
        assert_eq!(v["event"], "progress");
        assert_eq!(v["phase"], "storing");
        assert_eq!(v["n"], 3);
        assert_eq!(v["total"], 10);

        let v = JsonProgress::to_json(&SyncProgressEvent::Binding {
            subproject: "QMP".into(),
            relations: 2,
        });
        assert_eq!(v["phase"], "binding");
        assert_eq!(v["subproject"], "QMP");
    }
}
