use std::fmt;
use std::sync::Mutex;

use log::Level;

/// Destination for the pipeline's diagnostics.
///
/// Every component receives its sink explicitly so tests can look at what was
/// reported without installing a global logger.
pub trait EventSink: Send + Sync {
    fn record(&self, level: Level, args: fmt::Arguments<'_>);

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Debug, args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Info, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Warn, args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Error, args);
    }
}

/// Forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(level, "{}", args);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Level, String)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// True if some event at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl EventSink for MemorySink {
    fn record(&self, level: Level, args: fmt::Arguments<'_>) {
        if let Ok(mut events) = self.events.lock() {
            events.push((level, args.to_string()));
        }
    }
}
