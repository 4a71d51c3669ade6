//! Structured progress events emitted by the coordinator and build orchestrator.
//!
//! Per-dependency event order is causal (`Cloning` before `CheckingOut`
//! before `Building`); a stream's terminal event is exactly one of
//! `Completed`, `Failed` or `Interrupted`.

use std::fmt;

/// A single progress event, tagged with the dependency it concerns where
/// applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Cloning(String),
    Fetching(String),
    DownloadingBinaries(String, String),
    SkippedDownloadingBinaries(String, String),
    CheckingOut(String, String),
    Building(String, String, String),
    Cached(String, String),
    Built(String, String, String),
    Failed(String, String),
    Completed,
    Interrupted,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cloning(d) => write!(f, "Cloning {d}"),
            Self::Fetching(d) => write!(f, "Fetching {d}"),
            Self::DownloadingBinaries(d, tag) => write!(f, "Downloading binaries for {d}@{tag}"),
            Self::SkippedDownloadingBinaries(d, reason) => {
                write!(f, "Skipped binary download for {d}: {reason}")
            }
            Self::CheckingOut(d, rev) => write!(f, "Checking out {d}@{rev}"),
            Self::Building(d, scheme, platform) => {
                write!(f, "Building {d} scheme {scheme} for {platform}")
            }
            Self::Cached(d, platform) => write!(f, "{d} for {platform} is up to date"),
            Self::Built(d, scheme, platform) => {
                write!(f, "Built {d} scheme {scheme} for {platform}")
            }
            Self::Failed(d, kind) => write!(f, "Failed {d}: {kind}"),
            Self::Completed => write!(f, "Completed"),
            Self::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// A sink that callers implement to observe an event stream. Given as a
/// trait object rather than a channel so both a CLI progress bar and a test
/// harness's `Vec<Event>` collector can implement it directly.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// An [`EventSink`] that drops everything, for call sites that don't care.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// An [`EventSink`] that records events in order, for tests.
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingSink::new();
        sink.emit(Event::Cloning("o/A".into()));
        sink.emit(Event::CheckingOut("o/A".into(), "1.0.0".into()));
        sink.emit(Event::Completed);
        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Event::Cloning("o/A".into()));
        assert_eq!(events[2], Event::Completed);
    }
}
