// logs.rs
//! Initialisation du logging
//!
//! Filtre de niveau rechargeable, buffer circulaire des dernières entrées
//! et sortie console optionnelle, configurés par `host.logger.*`.

use pmoconfig::get_config;
use std::{
    collections::VecDeque,
    fmt::Write as _,
    sync::{Arc, RwLock},
    time::SystemTime,
};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{
    Registry,
    filter::LevelFilter,
    layer::{Context, Layer, SubscriberExt},
    reload,
    util::SubscriberInitExt,
};

const DEFAULT_BUFFER_CAPACITY: usize = 500;

/// Représente une entrée de log
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Buffer circulaire partagé
#[derive(Clone)]
pub struct LogState {
    buffer: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

impl LogState {
    fn new(capacity: usize, reload_handle: reload::Handle<LevelFilter, Registry>) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            reload_handle,
        }
    }

    /// Change le niveau minimum à chaud
    pub fn set_max_level(&self, level: Level) {
        if let Err(e) = self.reload_handle.reload(LevelFilter::from_level(level)) {
            eprintln!("Failed to reload log level filter: {}", e);
        }
    }

    fn push(&self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut buf = self
            .buffer
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(entry);
    }

    pub fn dump(&self) -> Vec<LogEntry> {
        self.buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Entrées de niveau `level` ou plus grave
    pub fn dump_at_least(&self, level: Level) -> Vec<LogEntry> {
        self.dump()
            .into_iter()
            .filter(|entry| entry.level <= level)
            .collect()
    }
}

/// Layer qui alimente le buffer circulaire
struct BufferLayer {
    state: LogState,
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.state.push(LogEntry {
            timestamp: SystemTime::now(),
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.finish(),
        });
    }
}

/// Message suivi des champs structurés `clé=valeur`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

pub fn string_to_level(s: &str) -> Option<Level> {
    match s.to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

/// Installe le subscriber global et retourne l'état partagé
pub fn init_logging() -> LogState {
    let config = get_config();

    let log_level = config
        .get_log_min_level()
        .ok()
        .and_then(|l| string_to_level(&l))
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::INFO);

    let (filter, reload_handle) = reload::Layer::new(log_level);

    let buffer_capacity = config
        .get_log_cache_size()
        .unwrap_or(DEFAULT_BUFFER_CAPACITY);
    let log_state = LogState::new(buffer_capacity, reload_handle);

    // Le filtre rechargeable passe avant le buffer
    let subscriber = Registry::default().with(filter).with(BufferLayer {
        state: log_state.clone(),
    });

    if config.get_log_enable_console().unwrap_or(true) {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    } else {
        subscriber.init();
    }

    log_state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_level() {
        assert_eq!(string_to_level("debug"), Some(Level::DEBUG));
        assert_eq!(string_to_level("Warning"), Some(Level::WARN));
        assert_eq!(string_to_level("loud"), None);
    }

    #[test]
    fn test_ring_buffer_keeps_latest_entries() {
        let (_filter, handle) = reload::Layer::<LevelFilter, Registry>::new(LevelFilter::INFO);
        let state = LogState::new(2, handle);
        for (i, level) in [Level::INFO, Level::WARN, Level::ERROR].into_iter().enumerate() {
            state.push(LogEntry {
                timestamp: SystemTime::now(),
                level,
                target: "test".to_string(),
                message: format!("entry {}", i),
            });
        }
        let entries = state.dump();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "entry 1");
        assert_eq!(state.dump_at_least(Level::ERROR).len(), 1);
    }
}
